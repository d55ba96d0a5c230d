use std::io::{self, Write};

use serde::Serialize;

use crate::pipeline::{BatchReport, ItemStatus};

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_report(report: &BatchReport) -> io::Result<()> {
        Self::print_json(&ReportSummary::from(report))
    }

    fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}

#[derive(Debug, Serialize)]
struct ReportSummary<'a> {
    published: usize,
    skipped: usize,
    failed: usize,
    items: &'a [crate::pipeline::ItemReport],
}

impl<'a> From<&'a BatchReport> for ReportSummary<'a> {
    fn from(report: &'a BatchReport) -> Self {
        Self {
            published: report.count(ItemStatus::Published),
            skipped: report.count(ItemStatus::Skipped),
            failed: report.count(ItemStatus::Failed),
            items: &report.items,
        }
    }
}

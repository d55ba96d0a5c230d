use std::io::{BufRead, BufReader};

use camino::Utf8Path;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::BatchError;
use crate::fs_util;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadAssignment {
    pub header: String,
    pub taxonomy: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunMetadata {
    pub input_path: String,
    pub input_name: String,
    pub output_folder: String,
    pub logs: Vec<String>,
    pub ref_fasta_url: String,
    pub ref_tax_url: String,
    pub created_at: String,
}

/// One summary table row keyed by column name, in the tool's column order.
pub type SummaryRow = Map<String, Value>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub read_level: Vec<ReadAssignment>,
    pub summary: Vec<SummaryRow>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<RunMetadata>,
}

/// Parses the per-read assignments and the summary table into one result.
pub fn collect(per_read: &Utf8Path, summary: &Utf8Path) -> Result<ClassificationResult, BatchError> {
    Ok(ClassificationResult {
        read_level: parse_per_read(per_read)?,
        summary: parse_summary(summary)?,
        metadata: None,
    })
}

fn read_lines(path: &Utf8Path) -> Result<Vec<String>, BatchError> {
    if !path.exists() {
        return Err(BatchError::MissingOutput(path.as_std_path().to_path_buf()));
    }
    BufReader::new(fs_util::open(path)?)
        .lines()
        .collect::<Result<Vec<_>, _>>()
        .map_err(|err| BatchError::Filesystem(format!("read {path}: {err}")))
}

/// One `header<TAB>taxonomy` pair per line, in file order.
pub fn parse_per_read(path: &Utf8Path) -> Result<Vec<ReadAssignment>, BatchError> {
    read_lines(path)?
        .into_iter()
        .enumerate()
        .map(|(index, line)| {
            let fields: Vec<&str> = line.split('\t').collect();
            match fields.as_slice() {
                [header, taxonomy] => Ok(ReadAssignment {
                    header: header.to_string(),
                    taxonomy: taxonomy.to_string(),
                }),
                _ => Err(BatchError::MalformedOutput {
                    path: path.as_std_path().to_path_buf(),
                    line_number: index + 1,
                    line: line.clone(),
                }),
            }
        })
        .collect()
}

/// First line names the columns. Rows are zipped against it positionally, so a short
/// row lacks the trailing keys and extra cells are dropped.
pub fn parse_summary(path: &Utf8Path) -> Result<Vec<SummaryRow>, BatchError> {
    let mut lines = read_lines(path)?.into_iter();
    let Some(header) = lines.next() else {
        return Ok(Vec::new());
    };
    let columns: Vec<String> = header.split('\t').map(str::to_string).collect();
    Ok(lines
        .map(|line| {
            columns
                .iter()
                .cloned()
                .zip(line.split('\t').map(|cell| Value::String(cell.to_string())))
                .collect()
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use camino::Utf8PathBuf;

    use super::*;

    fn write(dir: &tempfile::TempDir, name: &str, content: &str) -> Utf8PathBuf {
        let path = Utf8PathBuf::from_path_buf(dir.path().join(name)).unwrap();
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn parses_both_outputs() {
        let dir = tempfile::tempdir().unwrap();
        let per_read = write(&dir, "r.taxonomy", "r1\tBacteria(100);\nr2\tBacteria(98);\n");
        let summary = write(
            &dir,
            "r.tax.summary",
            "taxlevel\trankID\ttaxon\ttotal\n1\t0.1\tBacteria\t2\n",
        );

        let result = collect(&per_read, &summary).unwrap();
        assert_eq!(result.read_level.len(), 2);
        assert_eq!(
            result.read_level[0],
            ReadAssignment {
                header: "r1".to_string(),
                taxonomy: "Bacteria(100);".to_string(),
            }
        );
        assert_eq!(result.summary.len(), 1);
        assert_eq!(result.summary[0]["taxon"], "Bacteria");
        assert_eq!(result.summary[0]["total"], "2");
    }

    #[test]
    fn short_summary_row_keeps_leading_keys() {
        let dir = tempfile::tempdir().unwrap();
        let summary = write(&dir, "s", "taxlevel\trankID\ttaxon\n0\t0\n");
        let rows = parse_summary(&summary).unwrap();
        assert_eq!(rows[0].len(), 2);
        assert!(!rows[0].contains_key("taxon"));
    }

    #[test]
    fn summary_keeps_column_order() {
        let dir = tempfile::tempdir().unwrap();
        let summary = write(&dir, "s", "taxlevel\trankID\ttaxon\tdaughterlevels\ttotal\n0\t0\tRoot\t1\t2\n");
        let rows = parse_summary(&summary).unwrap();
        let keys: Vec<&str> = rows[0].keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["taxlevel", "rankID", "taxon", "daughterlevels", "total"]);
        assert_eq!(
            serde_json::to_string(&rows[0]).unwrap(),
            r#"{"taxlevel":"0","rankID":"0","taxon":"Root","daughterlevels":"1","total":"2"}"#
        );
    }

    #[test]
    fn per_read_line_needs_two_fields() {
        let dir = tempfile::tempdir().unwrap();
        let per_read = write(&dir, "r.taxonomy", "r1\tBacteria;\nr2 Bacteria;\n");
        assert_matches!(
            parse_per_read(&per_read),
            Err(BatchError::MalformedOutput { line_number: 2, .. })
        );
    }

    #[test]
    fn missing_file_is_named() {
        let dir = tempfile::tempdir().unwrap();
        let summary = write(&dir, "s", "taxlevel\n");
        let absent = Utf8PathBuf::from_path_buf(dir.path().join("absent.taxonomy")).unwrap();
        let err = collect(&absent, &summary).unwrap_err();
        assert_matches!(err, BatchError::MissingOutput(path) if path.ends_with("absent.taxonomy"));
    }
}

use std::fmt;
use std::fs::File;
use std::io::Read;
use std::str::FromStr;

use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;

use crate::error::BatchError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LocatorScheme {
    Local,
    S3,
    Sra,
    Ftp,
    Http,
    Https,
}

impl LocatorScheme {
    const PREFIXES: [(&'static str, LocatorScheme); 5] = [
        ("s3://", LocatorScheme::S3),
        ("sra://", LocatorScheme::Sra),
        ("ftp://", LocatorScheme::Ftp),
        ("http://", LocatorScheme::Http),
        ("https://", LocatorScheme::Https),
    ];

    /// Prefix match is case-sensitive. Strings with a `scheme://` prefix that is not
    /// listed are rejected rather than treated as local paths.
    pub fn detect(value: &str) -> Result<Self, BatchError> {
        for (prefix, scheme) in Self::PREFIXES {
            if value.starts_with(prefix) {
                return Ok(scheme);
            }
        }
        if value.contains("://") {
            return Err(BatchError::UnsupportedSource(value.to_string()));
        }
        Ok(LocatorScheme::Local)
    }
}

impl fmt::Display for LocatorScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LocatorScheme::Local => write!(f, "local"),
            LocatorScheme::S3 => write!(f, "s3"),
            LocatorScheme::Sra => write!(f, "sra"),
            LocatorScheme::Ftp => write!(f, "ftp"),
            LocatorScheme::Http => write!(f, "http"),
            LocatorScheme::Https => write!(f, "https"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputLocator {
    raw: String,
    scheme: LocatorScheme,
}

impl InputLocator {
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn scheme(&self) -> LocatorScheme {
        self.scheme
    }

    /// Trailing path segment. Names the published artifact and, for `sra://`, is the
    /// accession.
    pub fn name(&self) -> &str {
        self.raw.rsplit('/').next().unwrap_or(&self.raw)
    }

    /// Name of the file the locator lands as in a workspace. Only HTTP URLs lose their
    /// query string and fragment; `?` and `#` are ordinary characters anywhere else.
    pub fn file_name(&self) -> &str {
        let name = self.name();
        match self.scheme {
            LocatorScheme::Http | LocatorScheme::Https => {
                name.split(['?', '#']).next().unwrap_or(name)
            }
            _ => name,
        }
    }
}

impl fmt::Display for InputLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.raw)
    }
}

impl FromStr for InputLocator {
    type Err = BatchError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let raw = value.trim().to_string();
        let scheme = LocatorScheme::detect(&raw)?;
        let locator = Self { raw, scheme };
        let name = locator.file_name();
        if name.is_empty() || name == "." || name == ".." {
            return Err(BatchError::InvalidLocator(value.to_string()));
        }
        Ok(locator)
    }
}

/// Splits the comma-separated `--input` value, ignoring empty entries.
pub fn parse_locators(value: &str) -> Result<Vec<InputLocator>, BatchError> {
    value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::parse)
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FileFormat {
    Fastq,
    Fasta,
    Gzipped,
    Unknown,
}

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

impl FileFormat {
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext {
            "gz" | "gzip" => Some(FileFormat::Gzipped),
            "fastq" | "fq" => Some(FileFormat::Fastq),
            "fasta" | "fa" | "fna" | "fas" => Some(FileFormat::Fasta),
            _ => None,
        }
    }

    /// Suffix first, then the leading bytes of the file.
    pub fn detect(path: &Utf8Path) -> Self {
        if let Some(format) = path.extension().and_then(Self::from_extension) {
            return format;
        }
        Self::sniff(path)
    }

    pub fn sniff(path: &Utf8Path) -> Self {
        let mut head = [0u8; 2];
        let read = File::open(path.as_std_path()).and_then(|mut file| file.read(&mut head));
        match read {
            Ok(n) if n >= 2 && head == GZIP_MAGIC => FileFormat::Gzipped,
            Ok(n) if n >= 1 && head[0] == b'@' => FileFormat::Fastq,
            Ok(n) if n >= 1 && head[0] == b'>' => FileFormat::Fasta,
            _ => FileFormat::Unknown,
        }
    }
}

impl fmt::Display for FileFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileFormat::Fastq => write!(f, "fastq"),
            FileFormat::Fasta => write!(f, "fasta"),
            FileFormat::Gzipped => write!(f, "gzipped"),
            FileFormat::Unknown => write!(f, "unknown"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalFile {
    pub path: Utf8PathBuf,
    pub format: FileFormat,
}

impl LocalFile {
    pub fn new(path: Utf8PathBuf) -> Self {
        let format = FileFormat::detect(&path);
        Self { path, format }
    }

    pub fn file_name(&self) -> &str {
        self.path.file_name().unwrap_or(self.path.as_str())
    }

    pub fn extension(&self) -> Option<&str> {
        self.path.extension()
    }
}

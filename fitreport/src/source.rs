use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;

use tracing::debug;

use crate::error::{ReportError, Result};
use crate::parser::parse_report;
use crate::types::ReportSummary;

/// Anything that can hand out parsed reports by identifier.
pub trait ReportSource {
    /// All report identifiers, sorted.
    fn ids(&self) -> Result<Vec<String>>;

    fn summary(&self, id: &str) -> Result<ReportSummary>;
}

/// Reports stored as files in one directory; the identifier is the file name.
#[derive(Debug, Clone)]
pub struct DirectoryReportSource {
    root: PathBuf,
}

impl DirectoryReportSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn path_for(&self, id: &str) -> PathBuf {
        self.root.join(id)
    }
}

impl ReportSource for DirectoryReportSource {
    fn ids(&self) -> Result<Vec<String>> {
        if !self.root.is_dir() {
            return Err(ReportError::NotFound(self.root.clone()));
        }
        let mut ids = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            if entry.file_type()?.is_file()
                && let Some(name) = entry.file_name().to_str()
            {
                ids.push(name.to_string());
            }
        }
        ids.sort();
        Ok(ids)
    }

    fn summary(&self, id: &str) -> Result<ReportSummary> {
        let path = self.path_for(id);
        if !path.is_file() {
            return Err(ReportError::NotFound(path));
        }
        debug!("reading report {}", path.display());
        let text = fs::read_to_string(&path)?;
        parse_report(id, &text)
    }
}

/// In-memory reports, keyed by identifier.
#[derive(Debug, Clone, Default)]
pub struct MemoryReportSource {
    reports: BTreeMap<String, String>,
}

impl MemoryReportSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: impl Into<String>, text: impl Into<String>) {
        self.reports.insert(id.into(), text.into());
    }
}

impl ReportSource for MemoryReportSource {
    fn ids(&self) -> Result<Vec<String>> {
        Ok(self.reports.keys().cloned().collect())
    }

    fn summary(&self, id: &str) -> Result<ReportSummary> {
        let text = self
            .reports
            .get(id)
            .ok_or_else(|| ReportError::NotFound(PathBuf::from(id)))?;
        parse_report(id, text)
    }
}

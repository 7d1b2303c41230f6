//! Archive sink: durable YAML storage of run outputs and reports

use std::path::PathBuf;

use chrono::NaiveDate;
use serde_json::Value;
use tracing::info;

use crate::error::Result;
use crate::events::write_yaml;
use crate::validation::ValidationReport;

/// Writes run artifacts under an archive directory, one pair of files per
/// date: `YYYY-MM-DD-analysis.yaml` and `YYYY-MM-DD-validation.yaml`.
#[derive(Debug, Clone)]
pub struct Archive {
    dir: PathBuf,
}

impl Archive {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn save_analysis(&self, date: NaiveDate, bundle: &Value) -> Result<PathBuf> {
        let path = self.dir.join(format!("{date}-analysis.yaml"));
        write_yaml(&path, bundle)?;
        info!(path = %path.display(), "saved pipeline output");
        Ok(path)
    }

    pub fn save_report(&self, date: NaiveDate, report: &ValidationReport) -> Result<PathBuf> {
        let path = self.dir.join(format!("{date}-validation.yaml"));
        write_yaml(&path, report)?;
        info!(path = %path.display(), "saved validation report");
        Ok(path)
    }

    pub fn load_analysis(&self, date: NaiveDate) -> Result<Option<Value>> {
        let path = self.dir.join(format!("{date}-analysis.yaml"));
        if !path.exists() {
            return Ok(None);
        }
        let contents = std::fs::read_to_string(path)?;
        let yaml: serde_yaml::Value = serde_yaml::from_str(&contents)?;
        Ok(Some(serde_json::to_value(yaml)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;

    #[test]
    fn analysis_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let archive = Archive::new(dir.path());
        let date = NaiveDate::from_ymd_opt(2026, 8, 21).unwrap();
        let bundle = json!({"date": "2026-08-21", "steps": {"brief": "quiet day"}});

        let path = archive.save_analysis(date, &bundle).unwrap();
        assert!(path.exists());

        let loaded = archive.load_analysis(date).unwrap().unwrap();
        assert_eq!(loaded["steps"]["brief"], "quiet day");
    }

    #[test]
    fn missing_analysis_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let archive = Archive::new(dir.path());
        let date = NaiveDate::from_ymd_opt(2026, 1, 1).unwrap();
        assert!(archive.load_analysis(date).unwrap().is_none());
    }

    #[test]
    fn report_written() {
        let dir = tempfile::tempdir().unwrap();
        let archive = Archive::new(dir.path());
        let date = NaiveDate::from_ymd_opt(2026, 8, 21).unwrap();
        let report = ValidationReport {
            timestamp: Utc::now(),
            schema_valid: true,
            schema_errors: vec![],
            constraints_met: true,
            constraint_violations: vec![],
            overall_valid: true,
        };

        let path = archive.save_report(date, &report).unwrap();
        let contents = std::fs::read_to_string(path).unwrap();
        assert!(contents.contains("overall_valid: true"));
    }
}

use anyhow::{Context, Result};
use csv::ReaderBuilder;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use crate::error::LoadError;
use crate::io::timestamp::parse_timestamp;
use crate::signal::{EventEntry, EventLog};

/// Layout of a protocol event log.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogFormat {
    pub delimiter: char,
    pub has_header: bool,
    /// Trailing rows written by the stimulus software that are not events.
    pub footer_rows: usize,
    pub timestamp_column: usize,
    pub label_column: usize,
    pub extension: String,
}

impl Default for LogFormat {
    fn default() -> Self {
        Self {
            delimiter: ',',
            has_header: true,
            footer_rows: 2,
            timestamp_column: 0,
            label_column: 1,
            extension: "txt".into(),
        }
    }
}

/// Read one event log. The log's source name is its file stem.
pub fn read_event_log(path: &Path, format: &LogFormat) -> Result<EventLog> {
    if !path.exists() {
        return Err(LoadError::NotFound(path.to_path_buf()).into());
    }
    let delimiter = if format.delimiter.is_ascii() {
        format.delimiter as u8
    } else {
        b','
    };
    let mut reader = ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(format.has_header)
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("opening {}", path.display()))?;
    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.with_context(|| format!("reading {}", path.display()))?;
        if record.iter().all(|field| field.trim().is_empty()) {
            continue;
        }
        rows.push(record);
    }
    rows.truncate(rows.len().saturating_sub(format.footer_rows));

    let mut entries = Vec::with_capacity(rows.len());
    for (idx, record) in rows.iter().enumerate() {
        let raw_ts = record
            .get(format.timestamp_column)
            .ok_or_else(|| anyhow::anyhow!("event {} has no timestamp", idx + 1))?;
        let timestamp = parse_timestamp(raw_ts)
            .with_context(|| format!("event {} of {}", idx + 1, path.display()))?;
        let label = record
            .get(format.label_column)
            .map(|l| l.trim().to_string())
            .unwrap_or_default();
        entries.push(EventEntry { timestamp, label });
    }
    if entries.is_empty() {
        return Err(LoadError::EmptyLog(path.to_path_buf()).into());
    }
    let source = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    Ok(EventLog { source, entries })
}

/// Load the named logs (`<dir>/<name>.<ext>`) in the order given.
pub fn read_named_logs(dir: &Path, names: &[String], format: &LogFormat) -> Result<Vec<EventLog>> {
    names
        .iter()
        .map(|name| {
            let path = dir.join(format!("{}.{}", name, format.extension));
            read_event_log(&path, format).with_context(|| format!("loading event log '{}'", name))
        })
        .collect()
}

/// Load every log in `dir`, keyed by file stem.
pub fn read_log_dir(dir: &Path, format: &LogFormat) -> Result<BTreeMap<String, EventLog>> {
    let mut logs = BTreeMap::new();
    for entry in fs::read_dir(dir).with_context(|| format!("listing {}", dir.display()))? {
        let path = entry?.path();
        let matches = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.eq_ignore_ascii_case(&format.extension))
            .unwrap_or(false);
        if !matches {
            continue;
        }
        let log = read_event_log(&path, format)?;
        logs.insert(log.source.clone(), log);
    }
    Ok(logs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tempfile::tempdir;

    fn log_dir() -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR"))
            .parent()
            .and_then(|p| p.parent())
            .expect("workspace root")
            .join("test_data/logs")
    }

    #[test]
    fn drops_footer_rows() {
        let log = read_event_log(&log_dir().join("lucca_breath_1.txt"), &LogFormat::default())
            .expect("read sample log");
        assert_eq!(log.source, "lucca_breath_1");
        assert_eq!(log.len(), 2);
        assert_eq!(log.entries[0].label, "breath_in");
    }

    #[test]
    fn loads_named_logs_in_order() {
        let names = vec!["lucca_startle_1".to_string(), "lucca_breath_1".to_string()];
        let logs = read_named_logs(&log_dir(), &names, &LogFormat::default()).unwrap();
        assert_eq!(logs[0].source, "lucca_startle_1");
        assert_eq!(logs[1].source, "lucca_breath_1");
    }

    #[test]
    fn loads_directory() {
        let logs = read_log_dir(&log_dir(), &LogFormat::default()).unwrap();
        assert!(logs.contains_key("lucca_breath_1"));
        assert!(logs.contains_key("lucca_startle_1"));
    }

    #[test]
    fn empty_log_is_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("empty.txt");
        fs::write(
            &path,
            "Timestamp,Event,\nsession end,,\nsaved by logger,,\n",
        )
        .unwrap();
        let err = read_event_log(&path, &LogFormat::default()).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<LoadError>(),
            Some(LoadError::EmptyLog(_))
        ));
    }

    #[test]
    fn missing_log_names_the_file() {
        let dir = tempdir().unwrap();
        let err = read_named_logs(dir.path(), &["absent".to_string()], &LogFormat::default())
            .unwrap_err();
        assert!(format!("{:#}", err).contains("absent"));
        assert!(matches!(
            err.downcast_ref::<LoadError>(),
            Some(LoadError::NotFound(_))
        ));
    }
}

use anyhow::{Context, Result};
use csv::{ReaderBuilder, StringRecord};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::LoadError;
use crate::io::timestamp::parse_timestamp;
use crate::signal::{find_column, Channel, SampleSeries};

/// Layout of a sensor export file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordingFormat {
    /// Field separator (`,` or `\t` in practice).
    pub delimiter: char,
    /// Whether a units row follows the column-name row.
    pub units_row: bool,
    /// Positional replacements for the exported column names.
    pub column_names: Vec<String>,
    /// Columns discarded after renaming; empty names are always discarded.
    pub drop_columns: Vec<String>,
    pub timestamp_column: String,
    pub conductance_column: String,
    /// Only files whose name contains this tag are treated as recordings.
    pub file_tag: Option<String>,
}

impl Default for RecordingFormat {
    fn default() -> Self {
        Self {
            delimiter: ',',
            units_row: true,
            column_names: Vec::new(),
            drop_columns: vec!["Junk".into()],
            timestamp_column: "Timestamp".into(),
            conductance_column: "GSR_Skin_Conductance(uS)".into(),
            file_tag: None,
        }
    }
}

impl RecordingFormat {
    pub fn delimiter_byte(&self) -> u8 {
        if self.delimiter.is_ascii() {
            self.delimiter as u8
        } else {
            b','
        }
    }

    pub fn accepts(&self, file_name: &str) -> bool {
        let is_csv = Path::new(file_name)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.eq_ignore_ascii_case("csv"))
            .unwrap_or(false);
        is_csv
            && self
                .file_tag
                .as_deref()
                .map(|tag| file_name.contains(tag))
                .unwrap_or(true)
    }
}

fn is_separator_hint(record: &StringRecord) -> bool {
    record
        .get(0)
        .map(|field| field.trim().trim_matches('"').starts_with("sep="))
        .unwrap_or(false)
}

/// Load a Shimmer-style export: optional `sep=` line, a column-name row, an
/// optional units row, then numeric rows with a timestamp column.
pub fn read_recording(path: &Path, format: &RecordingFormat, fs: u32) -> Result<SampleSeries> {
    if !path.exists() {
        return Err(LoadError::NotFound(path.to_path_buf()).into());
    }
    let mut reader = ReaderBuilder::new()
        .delimiter(format.delimiter_byte())
        .has_headers(false)
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("opening {}", path.display()))?;
    let mut records = reader.records();

    let mut header = records
        .next()
        .transpose()
        .context("reading header")?
        .ok_or_else(|| LoadError::EmptyRecording(path.to_path_buf()))?;
    if is_separator_hint(&header) {
        header = records
            .next()
            .transpose()
            .context("reading header")?
            .ok_or_else(|| LoadError::EmptyRecording(path.to_path_buf()))?;
    }
    let mut names: Vec<String> = header.iter().map(|h| h.trim().to_string()).collect();
    for (slot, name) in names.iter_mut().zip(&format.column_names) {
        *slot = name.clone();
    }
    if format.units_row {
        records.next().transpose().context("reading units row")?;
    }

    let keep: Vec<usize> = names
        .iter()
        .enumerate()
        .filter(|(_, name)| {
            !name.is_empty()
                && !format
                    .drop_columns
                    .iter()
                    .any(|drop| drop.eq_ignore_ascii_case(name))
        })
        .map(|(idx, _)| idx)
        .collect();
    let ts_idx = find_column(keep.iter().map(|&i| names[i].as_str()), &format.timestamp_column)
        .map(|pos| keep[pos])
        .ok_or_else(|| LoadError::MissingColumn {
            path: path.to_path_buf(),
            column: format.timestamp_column.clone(),
        })?;
    let value_cols: Vec<usize> = keep.into_iter().filter(|&i| i != ts_idx).collect();

    let mut timestamps = Vec::new();
    let mut channels: Vec<Channel> = value_cols
        .iter()
        .map(|&i| Channel {
            name: names[i].clone(),
            data: Vec::new(),
        })
        .collect();
    for (row, record) in records.enumerate() {
        let record = record.with_context(|| format!("reading row {}", row + 1))?;
        if record.iter().all(|field| field.trim().is_empty()) {
            continue;
        }
        let raw_ts = record
            .get(ts_idx)
            .ok_or_else(|| anyhow::anyhow!("row {} has no timestamp", row + 1))?;
        let ts = parse_timestamp(raw_ts)
            .with_context(|| format!("row {} of {}", row + 1, path.display()))?;
        timestamps.push(ts);
        for (channel, &col) in channels.iter_mut().zip(&value_cols) {
            let field = record.get(col).map(str::trim).unwrap_or("");
            let value = if field.is_empty() {
                f64::NAN
            } else {
                field.parse::<f64>().with_context(|| {
                    format!(
                        "parsing '{}' in column {} at row {}",
                        field,
                        channel.name,
                        row + 1
                    )
                })?
            };
            channel.data.push(value);
        }
    }
    if timestamps.is_empty() {
        return Err(LoadError::EmptyRecording(path.to_path_buf()).into());
    }
    Ok(SampleSeries {
        fs,
        timestamps,
        channels,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::PathBuf;
    use tempfile::tempdir;

    fn sample_path(relative: &str) -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR"))
            .parent()
            .and_then(|p| p.parent())
            .expect("workspace root")
            .join(relative)
    }

    #[test]
    fn parses_shimmer_export() {
        let path = sample_path("test_data/shimmer/20190314_palm_Session1_Shimmer.csv");
        let series = read_recording(&path, &RecordingFormat::default(), 1).expect("read sample");
        assert_eq!(series.len(), 10);
        assert_eq!(series.channels.len(), 3);
        let gsr = series.channel("GSR_Skin_Conductance(uS)").unwrap();
        assert!((gsr.data[0] - 2.31).abs() < 1e-9);
    }

    #[test]
    fn handles_tab_separated_device_columns() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("s_Shimmer_x.csv");
        fs::write(
            &path,
            "\"sep=\t\"\n\
             Shimmer_92EE_Timestamp_Unix_CAL\tShimmer_92EE_GSR_Skin_Conductance_CAL\t\n\
             ms\tuS\t\n\
             1552559025000\t1.25\t\n\
             1552559025008\t\t\n",
        )
        .unwrap();
        let format = RecordingFormat {
            delimiter: '\t',
            timestamp_column: "Timestamp_Unix_CAL".into(),
            ..RecordingFormat::default()
        };
        let series = read_recording(&path, &format, 128).unwrap();
        assert_eq!(series.len(), 2);
        assert_eq!(series.channels.len(), 1);
        let gsr = series.channel("GSR_Skin_Conductance_CAL").unwrap();
        assert_eq!(gsr.data[0], 1.25);
        assert!(gsr.data[1].is_nan());
    }

    #[test]
    fn applies_column_overrides() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("rec.csv");
        fs::write(
            &path,
            "a,b,c\nunits,units,units\n2019-03-14 10:00:00,1.0,x\n",
        )
        .unwrap();
        let format = RecordingFormat {
            column_names: vec!["Timestamp".into(), "GSR".into(), "Junk".into()],
            ..RecordingFormat::default()
        };
        let series = read_recording(&path, &format, 128).unwrap();
        assert_eq!(series.channels.len(), 1);
        assert_eq!(series.channels[0].name, "GSR");
    }

    #[test]
    fn missing_file_is_not_found() {
        let err = read_recording(
            Path::new("/definitely/not/here.csv"),
            &RecordingFormat::default(),
            128,
        )
        .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<LoadError>(),
            Some(LoadError::NotFound(_))
        ));
    }

    #[test]
    fn missing_timestamp_column_is_reported() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("rec.csv");
        fs::write(&path, "time,gsr\nms,uS\n1,2\n").unwrap();
        let err = read_recording(&path, &RecordingFormat::default(), 128).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<LoadError>(),
            Some(LoadError::MissingColumn { .. })
        ));
    }

    #[test]
    fn filters_file_names() {
        let mut format = RecordingFormat::default();
        assert!(format.accepts("x_Session1.csv"));
        assert!(!format.accepts("notes.txt"));
        format.file_tag = Some("_Shimmer_".into());
        assert!(!format.accepts("x_Session1.csv"));
        assert!(format.accepts("x_Shimmer_Session1.CSV"));
    }
}

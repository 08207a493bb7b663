use anyhow::{ensure, Context, Result};
use csv::WriterBuilder;
use std::fs;
use std::path::Path;

use crate::eda::Decomposition;
use crate::signal::{MarkerChannel, SampleSeries};

pub const TIMESTAMP_HEADER: &str = "Timestamp";
pub const MARKER_HEADER: &str = "Timestamp_Marks";
const TIMESTAMP_LAYOUT: &str = "%Y-%m-%d %H:%M:%S%.3f";

fn format_value(value: f64) -> String {
    if value.is_nan() {
        String::new()
    } else {
        value.to_string()
    }
}

fn create_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
    }
    Ok(())
}

/// Write the recording with the marker channel appended as the last column.
pub fn write_marked_csv(path: &Path, series: &SampleSeries, markers: &MarkerChannel) -> Result<()> {
    ensure!(
        markers.len() == series.len(),
        "marker channel has {} entries but series has {} samples",
        markers.len(),
        series.len()
    );
    create_parent(path)?;
    let mut writer = WriterBuilder::new()
        .from_path(path)
        .with_context(|| format!("creating {}", path.display()))?;
    let mut header = vec![TIMESTAMP_HEADER.to_string()];
    header.extend(series.channels.iter().map(|c| c.name.clone()));
    header.push(MARKER_HEADER.to_string());
    writer.write_record(&header)?;
    for (i, ts) in series.timestamps.iter().enumerate() {
        let mut row = Vec::with_capacity(header.len());
        row.push(ts.format(TIMESTAMP_LAYOUT).to_string());
        row.extend(series.channels.iter().map(|c| format_value(c.data[i])));
        row.push(markers.values[i].to_string());
        writer.write_record(&row)?;
    }
    writer.flush()?;
    Ok(())
}

/// Write tonic/phasic components, one row per sample.
pub fn write_decomposed_csv(path: &Path, decomposition: &Decomposition) -> Result<()> {
    create_parent(path)?;
    let mut writer = WriterBuilder::new()
        .from_path(path)
        .with_context(|| format!("creating {}", path.display()))?;
    writer.write_record(["sample", "EDA_Tonic", "EDA_Phasic"])?;
    for (i, (tonic, phasic)) in decomposition
        .tonic
        .iter()
        .zip(&decomposition.phasic)
        .enumerate()
    {
        writer.write_record(&[i.to_string(), format_value(*tonic), format_value(*phasic)])?;
    }
    writer.flush()?;
    Ok(())
}

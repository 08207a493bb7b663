use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Marker value written at samples without a logged event.
pub const NO_EVENT: u8 = 0;
/// Marker value written at samples where a logged event occurred.
pub const EVENT_MARKER: u8 = 5;

/// Basic typed time series.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeSeries {
    /// Uniform sampling frequency in Hz
    pub fs: f64,
    /// Samples
    pub data: Vec<f64>,
}

impl TimeSeries {
    pub fn len(&self) -> usize {
        self.data.len()
    }
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// One named numeric column of a recording.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Channel {
    pub name: String,
    pub data: Vec<f64>,
}

/// A wall-clock timestamped recording at a nominal sampling rate.
///
/// The rate is taken as exact; timestamps are only consulted for the first
/// sample when aligning events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SampleSeries {
    /// Nominal sampling rate in Hz
    pub fs: u32,
    pub timestamps: Vec<NaiveDateTime>,
    pub channels: Vec<Channel>,
}

impl SampleSeries {
    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    pub fn first_timestamp(&self) -> Option<NaiveDateTime> {
        self.timestamps.first().copied()
    }

    /// Look up a channel by name. Device exports prefix column names with a
    /// sensor id (`Shimmer_92EE_GSR_Skin_Conductance_CAL`), so a suffix match
    /// on a `_` boundary is accepted as well.
    pub fn channel(&self, name: &str) -> Option<&Channel> {
        let index = find_column(self.channels.iter().map(|c| c.name.as_str()), name)?;
        self.channels.get(index)
    }

    pub fn channel_series(&self, name: &str) -> Option<TimeSeries> {
        self.channel(name).map(|c| TimeSeries {
            fs: self.fs as f64,
            data: c.data.clone(),
        })
    }
}

/// Position of `wanted` among `names`: an exact case-insensitive match wins,
/// otherwise the first name ending in `_<wanted>`.
pub fn find_column<'a>(
    names: impl Iterator<Item = &'a str> + Clone,
    wanted: &str,
) -> Option<usize> {
    let wanted = wanted.to_ascii_lowercase();
    names
        .clone()
        .position(|have| have.eq_ignore_ascii_case(&wanted))
        .or_else(|| {
            names.clone().position(|have| {
                let have = have.to_ascii_lowercase();
                have.len() > wanted.len()
                    && have.ends_with(&wanted)
                    && have[..have.len() - wanted.len()].ends_with('_')
            })
        })
}

/// A single logged event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEntry {
    pub timestamp: NaiveDateTime,
    pub label: String,
}

/// Events read from one log source, in authored order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventLog {
    pub source: String,
    pub entries: Vec<EventEntry>,
}

impl EventLog {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Concatenate logs in the order given. Entries are never re-sorted.
    pub fn concat(logs: &[&EventLog]) -> EventLog {
        let source = logs
            .iter()
            .map(|log| log.source.as_str())
            .collect::<Vec<_>>()
            .join("+");
        let entries = logs
            .iter()
            .flat_map(|log| log.entries.iter().cloned())
            .collect();
        EventLog { source, entries }
    }

    pub fn timestamps(&self) -> Vec<NaiveDateTime> {
        self.entries.iter().map(|e| e.timestamp).collect()
    }
}

/// Per-sample event annotation, index-aligned with its series.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkerChannel {
    pub values: Vec<u8>,
    pub event_value: u8,
}

impl MarkerChannel {
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn marked_indices(&self) -> Vec<usize> {
        self.values
            .iter()
            .enumerate()
            .filter(|(_, v)| **v == self.event_value)
            .map(|(i, _)| i)
            .collect()
    }

    pub fn marked_count(&self) -> usize {
        self.values.iter().filter(|v| **v == self.event_value).count()
    }
}

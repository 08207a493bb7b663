//! Event-to-sample alignment.
//!
//! Maps wall-clock event timestamps onto sample indices of a recording that
//! is assumed to run at an exact nominal rate. Only the first sample's
//! timestamp is consulted: the first event is placed `offset_samples` into the
//! series and every later event is placed relative to the first event.

use crate::error::AlignError;
use crate::signal::{EventLog, MarkerChannel, SampleSeries, EVENT_MARKER, NO_EVENT};
use chrono::{NaiveDateTime, TimeDelta};
use log::{debug, warn};
use serde::{Deserialize, Serialize};

/// How the gap between the first sample and the first event becomes samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OffsetPrecision {
    /// Truncate the gap toward zero to whole seconds, then scale by the rate.
    /// Matches historical exports; error is bounded by one second.
    #[default]
    WholeSeconds,
    /// Use the fractional gap, converted with the configured rounding.
    Exact,
}

/// Conversion of a fractional sample position to an index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IndexRounding {
    #[default]
    Nearest,
    /// Truncate toward zero.
    Truncate,
}

/// What to do when concatenated events are not chronological.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OrderingPolicy {
    #[default]
    Reject,
    /// Stable-sort the events by timestamp and log a warning.
    SortWithWarning,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlignConfig {
    pub offset: OffsetPrecision,
    pub rounding: IndexRounding,
    pub ordering: OrderingPolicy,
    /// Value written at marked samples; must differ from [`NO_EVENT`].
    pub event_value: u8,
}

impl Default for AlignConfig {
    fn default() -> Self {
        Self {
            offset: OffsetPrecision::WholeSeconds,
            rounding: IndexRounding::Nearest,
            ordering: OrderingPolicy::Reject,
            event_value: EVENT_MARKER,
        }
    }
}

/// Accounting of where every input event ended up.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlignmentReport {
    pub total_events: usize,
    pub marked: usize,
    /// Events whose target index was negative (log started before the recording).
    pub dropped_before_start: usize,
    /// Events whose target index was at or past the series length.
    pub dropped_after_end: usize,
    /// Events that landed on an index already marked by an earlier event.
    pub collided: usize,
    pub offset_samples: i64,
}

impl AlignmentReport {
    pub fn dropped(&self) -> usize {
        self.dropped_before_start + self.dropped_after_end + self.collided
    }

    pub fn is_complete(&self) -> bool {
        self.marked == self.total_events
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alignment {
    pub markers: MarkerChannel,
    pub report: AlignmentReport,
}

/// Duration in fractional seconds.
pub fn total_seconds(delta: TimeDelta) -> f64 {
    match delta.num_microseconds() {
        Some(us) => us as f64 / 1e6,
        None => delta.num_milliseconds() as f64 / 1e3,
    }
}

fn to_samples(seconds: f64, rate: u32, rounding: IndexRounding) -> i64 {
    let position = seconds * rate as f64;
    match rounding {
        IndexRounding::Nearest => position.round() as i64,
        IndexRounding::Truncate => position.trunc() as i64,
    }
}

/// Samples between the first recorded sample and the first event. Negative
/// when the log starts before the recording.
pub fn offset_samples(
    first_sample: NaiveDateTime,
    first_event: NaiveDateTime,
    rate: u32,
    cfg: &AlignConfig,
) -> i64 {
    let gap = first_event - first_sample;
    match cfg.offset {
        OffsetPrecision::WholeSeconds => gap.num_seconds() * rate as i64,
        OffsetPrecision::Exact => to_samples(total_seconds(gap), rate, cfg.rounding),
    }
}

/// Target sample index for every event, in input order.
pub fn target_indices(
    first_sample: NaiveDateTime,
    events: &[NaiveDateTime],
    rate: u32,
    cfg: &AlignConfig,
) -> Vec<i64> {
    let Some(&first_event) = events.first() else {
        return Vec::new();
    };
    let offset = offset_samples(first_sample, first_event, rate, cfg);
    let mut targets = Vec::with_capacity(events.len());
    targets.push(offset);
    targets.extend(
        events[1..]
            .iter()
            .map(|ts| to_samples(total_seconds(*ts - first_event), rate, cfg.rounding) + offset),
    );
    targets
}

fn first_unordered(timestamps: &[NaiveDateTime]) -> Option<usize> {
    timestamps
        .windows(2)
        .position(|w| w[1] < w[0])
        .map(|pos| pos + 1)
}

/// Produce a marker channel for `series` from `events` at `rate` Hz.
///
/// The walk is a single merge of sample indices against the ascending target
/// list, terminated by a sentinel equal to the series length. Targets the walk
/// has already passed are counted as dropped instead of stalling the merge.
pub fn align(
    series: &SampleSeries,
    events: &EventLog,
    rate: u32,
    cfg: &AlignConfig,
) -> Result<Alignment, AlignError> {
    if rate == 0 {
        return Err(AlignError::InvalidRate(rate));
    }
    if cfg.event_value == NO_EVENT {
        return Err(AlignError::InvalidMarker);
    }
    if events.is_empty() {
        return Err(AlignError::NoEvents);
    }
    let first_sample = series.first_timestamp().ok_or(AlignError::EmptySeries)?;

    let mut timestamps = events.timestamps();
    if let Some(index) = first_unordered(&timestamps) {
        match cfg.ordering {
            OrderingPolicy::Reject => return Err(AlignError::UnorderedEvents { index }),
            OrderingPolicy::SortWithWarning => {
                warn!(
                    "{}: event {} precedes its predecessor; sorting {} events",
                    events.source,
                    index,
                    timestamps.len()
                );
                timestamps.sort();
            }
        }
    }

    let n = series.len();
    let mut targets = target_indices(first_sample, &timestamps, rate, cfg);
    let mut report = AlignmentReport {
        total_events: targets.len(),
        offset_samples: targets[0],
        ..AlignmentReport::default()
    };
    targets.push(n as i64);

    let mut values = Vec::with_capacity(n);
    let mut cursor = 0;
    for i in 0..n as i64 {
        while targets[cursor] < i {
            if targets[cursor] < 0 {
                report.dropped_before_start += 1;
            } else {
                report.collided += 1;
            }
            cursor += 1;
        }
        if targets[cursor] == i {
            values.push(cfg.event_value);
            report.marked += 1;
            cursor += 1;
        } else {
            values.push(NO_EVENT);
        }
    }
    for &target in &targets[cursor..targets.len() - 1] {
        if target >= n as i64 {
            report.dropped_after_end += 1;
        } else if target < 0 {
            report.dropped_before_start += 1;
        } else {
            report.collided += 1;
        }
    }

    debug!(
        "{}: offset {} samples, {} of {} events marked",
        events.source, report.offset_samples, report.marked, report.total_events
    );
    if !report.is_complete() {
        warn!(
            "{}: {} of {} events not marked ({} before start, {} after end, {} collided)",
            events.source,
            report.dropped(),
            report.total_events,
            report.dropped_before_start,
            report.dropped_after_end,
            report.collided
        );
    }

    Ok(Alignment {
        markers: MarkerChannel {
            values,
            event_value: cfg.event_value,
        },
        report,
    })
}

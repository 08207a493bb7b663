use std::path::PathBuf;
use thiserror::Error;

/// Failures of the event-to-sample alignment step.
#[derive(Debug, Error)]
pub enum AlignError {
    #[error("no events supplied; cannot compute an alignment offset")]
    NoEvents,

    #[error("series has no samples")]
    EmptySeries,

    #[error("sampling rate must be positive, got {0}")]
    InvalidRate(u32),

    #[error("event marker value must differ from the no-event value")]
    InvalidMarker,

    #[error("event {index} is earlier than the event before it; logs must be concatenated in chronological order")]
    UnorderedEvents { index: usize },
}

/// Failures while reading recordings or event logs.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("file not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("event log {} contains no events", .0.display())]
    EmptyLog(PathBuf),

    #[error("{} has no data rows", .0.display())]
    EmptyRecording(PathBuf),

    #[error("missing column '{column}' in {}", .path.display())]
    MissingColumn { path: PathBuf, column: String },

    #[error("unrecognised timestamp '{0}'")]
    Timestamp(String),
}

/// Failures of the on-disk feature store.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("failed to load cache {}: {source}", .path.display())]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to read cache {}: {source}", .path.display())]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("session route '{0}' lists no event logs")]
    RouteWithoutLogs(String),

    #[error("session tag '{0}' is routed more than once")]
    DuplicateTag(String),

    #[error(
        "recordings {} and {} both resolve to session {key}",
        .first.display(),
        .second.display()
    )]
    DuplicateRecording {
        key: String,
        first: PathBuf,
        second: PathBuf,
    },

    #[error("routes '{first}' and '{second}' both map to {participant} session {session}")]
    DuplicateSession {
        participant: String,
        session: u32,
        first: String,
        second: String,
    },
}

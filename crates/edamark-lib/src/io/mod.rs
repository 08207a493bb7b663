pub mod eventlog;
pub mod export;
pub mod shimmer;
pub mod timestamp;

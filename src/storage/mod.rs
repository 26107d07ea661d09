//! Storage helpers shared by the pipeline
//!
//! - `file_io`: atomic JSON persistence and path helpers
//! - `lock`: advisory lock serialising runs against one snapshot state

pub mod file_io;
pub mod lock;

pub use file_io::{read_json, remove_if_exists, with_suffix, write_json_atomic};
pub use lock::SnapshotLock;

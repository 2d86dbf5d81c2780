//! Storage index module.
//!
//! Provides:
//! - The persisted index of cached streams
//! - Scoped segment writers
//! - Local playlist generation for complete entries

mod entry;
mod index;
pub mod paths;
mod playlist;
mod writer;

pub use entry::{CacheEntry, Completeness};
pub use index::StorageIndex;
pub use writer::SegmentWriter;

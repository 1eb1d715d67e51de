//! Chunk partitioning.
//!
//! Splits a file into fixed-size byte ranges; each range becomes one task.

mod range;

pub use range::{plan_chunks, ChunkRange};

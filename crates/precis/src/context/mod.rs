//! Context size management for oversized inputs.
//!
//! 1. **[`budget`]**: [`ChunkBudget`] estimates the size of a message
//!    sequence and decides between a direct call and a chunked one.
//! 2. **[`chunker`]**: [`ContextChunker`] partitions an oversized sequence
//!    and carries a running synopsis from chunk to chunk.

pub mod budget;
pub mod chunker;

pub use budget::{ChunkBudget, DEFAULT_CHARS_PER_TOKEN, estimate_tokens};
pub use chunker::ContextChunker;

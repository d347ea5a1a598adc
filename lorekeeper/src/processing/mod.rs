mod chunker;

pub use chunker::{TurnChunk, TurnChunker};

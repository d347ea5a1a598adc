use crate::chat::ChatTurn;
use crate::config::ScanningConfig;

/// An overlapping window of chat turns sent to the LLM in one call.
/// Transient, created per scan.
#[derive(Debug, Clone)]
pub struct TurnChunk {
    /// Index of the first turn, in transcript coordinates.
    pub start_index: usize,
    /// Exclusive index past the last turn.
    pub end_index: usize,
    pub turns: Vec<ChatTurn>,
}

impl TurnChunk {
    /// Chunk text as presented to the extraction prompt, one turn per
    /// paragraph.
    pub fn text(&self) -> String {
        self.turns
            .iter()
            .map(ChatTurn::render)
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

/// Splits turns into overlapping chunks. Boundaries are a pure function of
/// turn count and configuration, which checkpoint resumption relies on.
#[derive(Debug, Clone)]
pub struct TurnChunker {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl TurnChunker {
    pub fn new(config: &ScanningConfig) -> Self {
        Self {
            chunk_size: config.chunk_size.max(1),
            chunk_overlap: config.chunk_overlap.min(config.chunk_size.saturating_sub(1)),
        }
    }

    pub fn with_params(chunk_size: usize, chunk_overlap: usize) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
            chunk_overlap: chunk_overlap.min(chunk_size.saturating_sub(1)),
        }
    }

    /// Lazy, restartable chunk sequence over `turns`. Every turn is
    /// covered at least once; consecutive chunks share exactly
    /// `chunk_overlap` turns. A window no larger than `chunk_size` yields
    /// a single chunk.
    pub fn chunks<'a>(&self, turns: &'a [ChatTurn]) -> Chunks<'a> {
        Chunks {
            turns,
            chunk_size: self.chunk_size,
            stride: self.chunk_size - self.chunk_overlap,
            cursor: 0,
            done: turns.is_empty(),
        }
    }
}

pub struct Chunks<'a> {
    turns: &'a [ChatTurn],
    chunk_size: usize,
    stride: usize,
    cursor: usize,
    done: bool,
}

impl Iterator for Chunks<'_> {
    type Item = TurnChunk;

    fn next(&mut self) -> Option<TurnChunk> {
        if self.done {
            return None;
        }

        let start = self.cursor;
        let end = (start + self.chunk_size).min(self.turns.len());
        let slice = &self.turns[start..end];

        if end >= self.turns.len() {
            self.done = true;
        } else {
            self.cursor += self.stride;
        }

        Some(TurnChunk {
            start_index: slice.first().map(|t| t.index).unwrap_or(0),
            end_index: slice.last().map(|t| t.index + 1).unwrap_or(0),
            turns: slice.to_vec(),
        })
    }
}

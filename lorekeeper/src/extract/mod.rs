//! Extraction pipeline: raw LLM text to review-ready entities.

mod parser;
mod scorer;
mod types;
mod validator;

pub use parser::ResponseParser;
pub use scorer::EntityScorer;
pub use types::{payload_attributes, ExtractedEntity, ExtractionDraft, ParseOutcome, RawEntity};
pub use validator::{EntityValidator, EntryRef, MatchDecision};

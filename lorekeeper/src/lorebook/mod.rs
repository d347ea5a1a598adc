//! SillyTavern character card and persona models, and the approval-time
//! merge engines for both.

mod document;
mod merge;
mod persona;

pub use document::{CardData, CharacterBook, CharacterCard, LorebookEntry};
pub use merge::MergeEngine;
pub use persona::PersonaEngine;

mod reader;

pub use reader::{ChatReader, ChatTurn};

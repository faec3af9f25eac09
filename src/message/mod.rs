//! Line parsing: tag block, prefix, command, parameters.

mod nom_parser;
mod parse;
pub mod tags;

pub use self::nom_parser::ParsedMessage;
pub use self::parse::MessageParser;
pub use self::tags::{TagRange, TagValue, Tags};

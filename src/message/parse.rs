//! Building [`Event`]s from lines.

use tracing::warn;

use crate::error::MessageParseError;
use crate::event::{Event, EventKind};
use crate::prefix::Prefix;

use super::nom_parser::ParsedMessage;
use super::tags::Tags;

/// Turns raw lines into [`Event`]s.
///
/// The parser knows the client's own identity because a whisper has no
/// channel: its `channel` is the identity it was addressed to.
#[derive(Debug, Clone, Default)]
pub struct MessageParser {
    identity: Option<String>,
}

impl MessageParser {
    /// Create a parser for the given (already lowercased) identity.
    pub fn new(identity: impl Into<String>) -> Self {
        Self {
            identity: Some(identity.into()),
        }
    }

    /// Create a parser with no identity. Whisper channels then fall back to
    /// the whisper's target parameter.
    pub fn anonymous() -> Self {
        Self::default()
    }

    /// Parse one line. A malformed tag block fails the whole line.
    pub fn parse(&self, line: &str) -> Result<Event, MessageParseError> {
        self.parse_inner(line, false)
    }

    /// Parse one line, dropping a malformed tag block with a warning instead
    /// of failing.
    pub fn parse_lossy(&self, line: &str) -> Result<Event, MessageParseError> {
        self.parse_inner(line, true)
    }

    fn parse_inner(&self, line: &str, lossy: bool) -> Result<Event, MessageParseError> {
        let trimmed = line.trim_end_matches(['\r', '\n']);
        if trimmed.trim().is_empty() {
            return Err(MessageParseError::EmptyMessage);
        }

        let parsed = ParsedMessage::parse(trimmed).map_err(|(position, context)| {
            MessageParseError::Malformed {
                position,
                context: context.unwrap_or("parsing line"),
            }
        })?;

        let tags = match parsed.tags.map(Tags::parse).transpose() {
            Ok(tags) => tags,
            Err(e) if lossy => {
                warn!(error = %e, line = trimmed, "dropping malformed tag block");
                None
            }
            Err(e) => return Err(e.into()),
        };

        let kind = EventKind::from_token(parsed.command);

        let author = parsed
            .prefix
            .map(Prefix::new_from_str)
            .and_then(|p| p.author().map(str::to_owned));

        let channel = if kind == EventKind::Whisper {
            self.identity
                .clone()
                .or_else(|| parsed.params.first().map(|t| (*t).to_owned()))
        } else {
            parsed
                .params
                .iter()
                .find_map(|p| p.strip_prefix('#'))
                .filter(|name| !name.is_empty())
                .map(str::to_owned)
        };

        Ok(Event::new(
            line.to_owned(),
            kind,
            tags,
            author,
            channel,
            parsed.trailing.map(str::to_owned),
            parsed.params.iter().map(|p| (*p).to_owned()).collect(),
        ))
    }
}

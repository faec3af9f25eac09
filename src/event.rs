//! Structured events produced from inbound lines.

use std::fmt;

use chrono::{DateTime, TimeZone, Utc};

use crate::message::tags::{TagValue, Tags};

/// RPL_WELCOME
pub const RPL_WELCOME: u16 = 1;
/// RPL_NAMREPLY, the membership snapshot.
pub const RPL_NAMREPLY: u16 = 353;
/// RPL_ENDOFMOTD, the readiness signal.
pub const RPL_ENDOFMOTD: u16 = 376;

/// The command of a line.
///
/// Commands Twitch sends get their own variant; any other all-uppercase
/// token is kept in [`EventKind::Other`]. A token with lowercase letters (or
/// no token at all) is [`EventKind::Unknown`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum EventKind {
    Cap,
    ClearChat,
    ClearMsg,
    GlobalUserState,
    HostTarget,
    Join,
    Mode,
    Notice,
    Part,
    Ping,
    Pong,
    Privmsg,
    Reconnect,
    RoomState,
    UserNotice,
    UserState,
    Whisper,
    /// A three-digit numeric reply.
    Numeric(u16),
    /// An uppercase command without a dedicated variant.
    Other(String),
    Unknown,
}

impl EventKind {
    /// Classify a command token.
    pub fn from_token(token: &str) -> Self {
        let is_upper = !token.is_empty()
            && token
                .bytes()
                .all(|b| b.is_ascii_uppercase() || b.is_ascii_digit());
        if !is_upper {
            return Self::Unknown;
        }
        match token {
            "CAP" => Self::Cap,
            "CLEARCHAT" => Self::ClearChat,
            "CLEARMSG" => Self::ClearMsg,
            "GLOBALUSERSTATE" => Self::GlobalUserState,
            "HOSTTARGET" => Self::HostTarget,
            "JOIN" => Self::Join,
            "MODE" => Self::Mode,
            "NOTICE" => Self::Notice,
            "PART" => Self::Part,
            "PING" => Self::Ping,
            "PONG" => Self::Pong,
            "PRIVMSG" => Self::Privmsg,
            "RECONNECT" => Self::Reconnect,
            "ROOMSTATE" => Self::RoomState,
            "USERNOTICE" => Self::UserNotice,
            "USERSTATE" => Self::UserState,
            "WHISPER" => Self::Whisper,
            t if t.len() == 3 && t.bytes().all(|b| b.is_ascii_digit()) => {
                // Three ASCII digits always fit
                Self::Numeric(t.parse().unwrap_or_default())
            }
            other => Self::Other(other.to_owned()),
        }
    }

    /// The wire token, `UNKNOWN` for [`EventKind::Unknown`].
    pub fn as_str(&self) -> std::borrow::Cow<'_, str> {
        use std::borrow::Cow;
        Cow::Borrowed(match self {
            Self::Cap => "CAP",
            Self::ClearChat => "CLEARCHAT",
            Self::ClearMsg => "CLEARMSG",
            Self::GlobalUserState => "GLOBALUSERSTATE",
            Self::HostTarget => "HOSTTARGET",
            Self::Join => "JOIN",
            Self::Mode => "MODE",
            Self::Notice => "NOTICE",
            Self::Part => "PART",
            Self::Ping => "PING",
            Self::Pong => "PONG",
            Self::Privmsg => "PRIVMSG",
            Self::Reconnect => "RECONNECT",
            Self::RoomState => "ROOMSTATE",
            Self::UserNotice => "USERNOTICE",
            Self::UserState => "USERSTATE",
            Self::Whisper => "WHISPER",
            Self::Numeric(n) => return Cow::Owned(format!("{:03}", n)),
            Self::Other(s) => s.as_str(),
            Self::Unknown => "UNKNOWN",
        })
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_str())
    }
}

/// One parsed inbound line. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Event {
    raw: String,
    kind: EventKind,
    tags: Option<Tags>,
    author: Option<String>,
    channel: Option<String>,
    content: Option<String>,
    params: Vec<String>,
}

impl Event {
    pub(crate) fn new(
        raw: String,
        kind: EventKind,
        tags: Option<Tags>,
        author: Option<String>,
        channel: Option<String>,
        content: Option<String>,
        params: Vec<String>,
    ) -> Self {
        Self {
            raw,
            kind,
            tags,
            author,
            channel,
            content,
            params,
        }
    }

    /// The verbatim line.
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// The command of the line.
    pub fn kind(&self) -> &EventKind {
        &self.kind
    }

    /// The tag block, `None` when the line had no `@` prefix.
    pub fn tags(&self) -> Option<&Tags> {
        self.tags.as_ref()
    }

    /// Look up a single tag.
    pub fn tag(&self, key: &str) -> Option<&TagValue> {
        self.tags.as_ref().and_then(|t| t.get(key))
    }

    /// The `user` part of a `nick!user@host` prefix.
    pub fn author(&self) -> Option<&str> {
        self.author.as_deref()
    }

    /// Target channel without `#`. For whispers, the client's own identity.
    pub fn channel(&self) -> Option<&str> {
        self.channel.as_deref()
    }

    /// The trailing payload.
    pub fn content(&self) -> Option<&str> {
        self.content.as_deref()
    }

    /// Middle parameters, in order.
    pub fn params(&self) -> &[String] {
        &self.params
    }

    /// When Twitch says the line was sent, from the `tmi-sent-ts` tag.
    pub fn sent_at(&self) -> Option<DateTime<Utc>> {
        let millis: i64 = self.tag("tmi-sent-ts")?.as_str()?.parse().ok()?;
        Utc.timestamp_millis_opt(millis).single()
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

//! # tmi-chat
//!
//! A client for Twitch chat (TMI), the IRC dialect Twitch speaks.
//!
//! ## Features
//!
//! - Line parsing with Twitch tag blocks (badges, emote ranges, escaping)
//! - Sans-IO connection state machine: login, capability negotiation,
//!   readiness, liveness and reconnect bookkeeping
//! - Event dispatch to handlers with per-channel membership tracking
//! - Optional Tokio client that reconnects with backoff and replays joins
//! - Optional serde support and TOML configuration

#![deny(clippy::all)]
#![cfg_attr(docsrs, feature(doc_cfg))]

//! ## Quick Start
//!
//! ### Parsing lines
//!
//! ```rust
//! use tmi_chat::{EventKind, MessageParser};
//!
//! let parser = MessageParser::new("mybot");
//! let raw = "@badges=subscriber/12;color=#FF0000 :streamer!streamer@streamer.tmi.twitch.tv PRIVMSG #streamer :hello world";
//! let event = parser.parse(raw).expect("valid line");
//!
//! assert_eq!(event.kind(), &EventKind::Privmsg);
//! assert_eq!(event.author(), Some("streamer"));
//! assert_eq!(event.channel(), Some("streamer"));
//! assert_eq!(event.content(), Some("hello world"));
//! assert_eq!(event.tag("color").and_then(|v| v.as_str()), Some("#FF0000"));
//! ```
//!
//! ### Running a client
//!
//! See [`client`] for the background client and its handle.

pub mod caps;
#[cfg(feature = "tokio")]
pub mod client;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod event;
pub mod line;
pub mod message;
pub mod observe;
pub mod prefix;
pub mod registry;
pub mod state;
#[cfg(feature = "tokio")]
pub mod transport;

pub use self::caps::{Capability, CapabilityAcks};
#[cfg(feature = "tokio")]
pub use self::client::{Client, ClientHandle};
pub use self::config::{ClientConfig, Credentials, RetryPolicy};
pub use self::dispatch::{Dispatcher, Handler, HandlerContext};
pub use self::error::{
    ClientError, ConfigurationError, MessageParseError, ProtocolError, RegistryError,
    TagParseError, TransportError,
};
pub use self::event::{Event, EventKind};
pub use self::line::{LineCodec, MAX_LINE_LEN};
pub use self::message::{MessageParser, TagRange, TagValue, Tags};
pub use self::observe::{Direction, LineObserver, TracingObserver};
pub use self::prefix::Prefix;
pub use self::registry::ChannelRegistry;
pub use self::state::{Connection, ConnectionState};
#[cfg(feature = "tokio")]
pub use self::transport::{Connector, TcpConnector};

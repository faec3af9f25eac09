//! Sans-IO connection state machine.
//!
//! [`Connection`] performs no I/O. The driver feeds it inbound lines (or raw
//! chunks), asks it for parsed events, and drains the outbound lines it
//! produced. Timers are the driver's job too: every time-dependent operation
//! takes the current [`Instant`].
//!
//! # Example
//!
//! ```
//! use std::time::Instant;
//! use tmi_chat::state::{Connection, ConnectionState};
//! use tmi_chat::{Capability, Credentials};
//!
//! let mut conn = Connection::new(Credentials::new("bot", "oauth:abc"), Capability::all());
//! conn.open().unwrap();
//! conn.connected(Instant::now());
//! assert_eq!(conn.state(), ConnectionState::NegotiatingCapabilities);
//!
//! let lines = conn.take_outbound();
//! assert_eq!(lines[1], "NICK bot");
//!
//! conn.push_line(":tmi.twitch.tv 376 bot :>");
//! let event = conn.next_event(Instant::now()).unwrap();
//! assert_eq!(event.kind().to_string(), "376");
//! assert!(conn.is_ready());
//! ```

use std::collections::VecDeque;
use std::fmt;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::caps::{Capability, CapabilityAcks};
use crate::config::Credentials;
use crate::error::{ConfigurationError, ProtocolError};
use crate::event::{Event, EventKind, RPL_ENDOFMOTD};
use crate::line::LineCodec;
use crate::message::MessageParser;
use crate::registry::ChannelRegistry;

/// Lifecycle state of a connection.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ConnectionState {
    /// No socket.
    #[default]
    Disconnected,
    /// Opening the socket.
    Connecting,
    /// Socket open, login being sent.
    Authenticating,
    /// Capabilities requested, waiting for the end of the MOTD.
    NegotiatingCapabilities,
    /// End of MOTD seen.
    Ready,
    /// Ready and waiting for input.
    Receiving,
    /// Ready and handing an event to handlers.
    Dispatching,
    /// The transport failed; a reconnect is due.
    Error,
}

impl ConnectionState {
    /// Whether the server has finished the login sequence.
    pub fn is_ready(self) -> bool {
        matches!(self, Self::Ready | Self::Receiving | Self::Dispatching)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Authenticating => "authenticating",
            Self::NegotiatingCapabilities => "negotiating capabilities",
            Self::Ready => "ready",
            Self::Receiving => "receiving",
            Self::Dispatching => "dispatching",
            Self::Error => "error",
        };
        f.write_str(name)
    }
}

/// Everything known about one connection, plus the caller's join intent.
///
/// Connection fields are rebuilt empty by [`Connection::reset`]; the join
/// intent survives and is replayed once the next session is ready.
#[derive(Debug)]
pub struct Connection {
    credentials: Credentials,
    capabilities: Vec<Capability>,
    state: ConnectionState,
    acks: CapabilityAcks,
    last_ping: Option<Instant>,
    clock: Option<Instant>,
    codec: LineCodec,
    inbound: VecDeque<String>,
    outbound: Vec<String>,
    registry: ChannelRegistry,
    parser: MessageParser,
    intents: Vec<String>,
    reconnect_requested: bool,
}

impl Connection {
    /// Create a disconnected connection that will request `capabilities`.
    pub fn new(credentials: Credentials, capabilities: Vec<Capability>) -> Self {
        let parser = MessageParser::new(credentials.identity());
        Self {
            acks: CapabilityAcks::new(&capabilities),
            credentials,
            capabilities,
            state: ConnectionState::Disconnected,
            last_ping: None,
            clock: None,
            codec: LineCodec::new(),
            inbound: VecDeque::new(),
            outbound: Vec::new(),
            registry: ChannelRegistry::new(),
            parser,
            intents: Vec::new(),
            reconnect_requested: false,
        }
    }

    /// Begin opening a socket. Fails unless disconnected.
    pub fn open(&mut self) -> Result<(), ConfigurationError> {
        if self.state != ConnectionState::Disconnected {
            return Err(ConfigurationError::AlreadyOpen(self.state));
        }
        self.state = ConnectionState::Connecting;
        Ok(())
    }

    /// The socket is open: queue the login and capability requests.
    ///
    /// The liveness window starts now.
    pub fn connected(&mut self, now: Instant) {
        if self.state != ConnectionState::Connecting {
            warn!(state = %self.state, "connected() outside of connecting state");
        }
        self.state = ConnectionState::Authenticating;
        self.outbound
            .push(format!("PASS {}", self.credentials.secret()));
        self.outbound
            .push(format!("NICK {}", self.credentials.identity()));

        self.state = ConnectionState::NegotiatingCapabilities;
        for cap in &self.capabilities {
            self.outbound.push(cap.request_line());
        }
        self.last_ping = Some(now);
        self.clock = Some(now);
        debug!(identity = self.credentials.identity(), "login queued");
    }

    /// Feed raw bytes from the socket.
    pub fn receive(&mut self, chunk: &[u8]) {
        let lines = self.codec.feed(chunk);
        self.inbound.extend(lines);
    }

    /// Queue one already-split inbound line.
    pub fn push_line(&mut self, line: impl Into<String>) {
        self.inbound.push_back(line.into());
    }

    /// Number of lines waiting to be parsed.
    pub fn pending_lines(&self) -> usize {
        self.inbound.len()
    }

    /// Parse the next queued line. Lines that fail to parse are logged and
    /// skipped. Connection-level effects (readiness, reconnect requests) are
    /// applied before the event is returned.
    pub fn next_event(&mut self, now: Instant) -> Option<Event> {
        self.clock = Some(now);
        while let Some(line) = self.inbound.pop_front() {
            match self.parser.parse_lossy(&line) {
                Ok(event) => {
                    self.observe(&event);
                    if self.state.is_ready() {
                        self.state = ConnectionState::Dispatching;
                    }
                    return Some(event);
                }
                Err(e) => warn!(error = %e, line = %line, "dropping unparseable line"),
            }
        }
        if self.state == ConnectionState::Dispatching {
            self.state = ConnectionState::Receiving;
        }
        None
    }

    fn observe(&mut self, event: &Event) {
        match event.kind() {
            EventKind::Numeric(RPL_ENDOFMOTD) if !self.state.is_ready() => {
                self.state = ConnectionState::Ready;
                info!(identity = self.credentials.identity(), "connection ready");
                self.replay_joins();
            }
            EventKind::Reconnect => {
                info!("server requested reconnect");
                self.reconnect_requested = true;
            }
            _ => {}
        }
    }

    fn replay_joins(&mut self) {
        for channel in &self.intents {
            self.outbound.push(format!("JOIN #{}", channel));
        }
    }

    /// Queue an outbound line. Embedded line breaks are refused.
    pub fn send_raw(&mut self, line: impl Into<String>) -> Result<(), ProtocolError> {
        let line = line.into();
        if line.contains(['\r', '\n']) {
            return Err(ProtocolError::IllegalLineBreak(line));
        }
        self.outbound.push(line);
        Ok(())
    }

    /// Queue a chat message for a channel. Messages sent before the
    /// connection is ready are dropped with a warning.
    pub fn privmsg(&mut self, channel: &str, text: &str) -> Result<(), ProtocolError> {
        let line = format!("PRIVMSG #{} :{}", normalize(channel), text);
        if !self.is_ready() {
            if line.contains(['\r', '\n']) {
                return Err(ProtocolError::IllegalLineBreak(line));
            }
            warn!(state = %self.state, channel, "dropping message, connection not ready");
            return Ok(());
        }
        self.send_raw(line)
    }

    /// Remember the channel and join it now if ready, otherwise on the
    /// next readiness.
    pub fn join(&mut self, channel: &str) {
        let channel = normalize(channel);
        if channel.is_empty() {
            warn!("ignoring join of empty channel name");
            return;
        }
        if !self.intents.iter().any(|c| *c == channel) {
            self.intents.push(channel.clone());
        }
        if self.state.is_ready() {
            self.outbound.push(format!("JOIN #{}", channel));
        }
    }

    /// Forget the channel and leave it if joined. Parting a channel that was
    /// never joined is a no-op.
    pub fn part(&mut self, channel: &str) {
        let channel = normalize(channel);
        let had_intent = self.intents.iter().any(|c| *c == channel);
        self.intents.retain(|c| *c != channel);
        if self.state.is_ready() && self.registry.contains(&channel) {
            self.outbound.push(format!("PART #{}", channel));
        } else if !had_intent {
            debug!(channel = %channel, "part of unknown channel ignored");
        }
    }

    /// Forget every channel and leave the joined ones.
    pub fn part_all(&mut self) {
        self.intents.clear();
        if self.state.is_ready() {
            for channel in self.registry.channels() {
                self.outbound.push(format!("PART #{}", channel));
            }
        }
    }

    /// Drain the lines queued for the socket.
    pub fn take_outbound(&mut self) -> Vec<String> {
        std::mem::take(&mut self.outbound)
    }

    /// Record a liveness probe at the time of the line being handled.
    pub fn mark_alive(&mut self) {
        self.last_ping = self.clock;
    }

    /// Whether no liveness probe arrived within `timeout`.
    pub fn is_stale(&self, now: Instant, timeout: Duration) -> bool {
        match self.last_ping {
            Some(last) => now.saturating_duration_since(last) >= timeout,
            None => false,
        }
    }

    /// Time of the last liveness probe (or of connecting).
    pub fn last_ping(&self) -> Option<Instant> {
        self.last_ping
    }

    /// Whether the server sent `RECONNECT`.
    pub fn reconnect_requested(&self) -> bool {
        self.reconnect_requested
    }

    /// The transport failed.
    pub fn fail(&mut self) {
        self.state = ConnectionState::Error;
    }

    /// Discard all connection state, keeping the join intent.
    pub fn reset(&mut self) {
        self.state = ConnectionState::Disconnected;
        self.acks.reset();
        self.last_ping = None;
        self.clock = None;
        self.codec.clear();
        self.inbound.clear();
        self.outbound.clear();
        self.registry.clear();
        self.reconnect_requested = false;
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Whether the login sequence finished.
    pub fn is_ready(&self) -> bool {
        self.state.is_ready()
    }

    /// The lowercased login name.
    pub fn identity(&self) -> &str {
        self.credentials.identity()
    }

    /// Capability acknowledgments.
    pub fn acks(&self) -> &CapabilityAcks {
        &self.acks
    }

    /// Mutable capability acknowledgments.
    pub(crate) fn acks_mut(&mut self) -> &mut CapabilityAcks {
        &mut self.acks
    }

    /// Joined channels and members.
    pub fn registry(&self) -> &ChannelRegistry {
        &self.registry
    }

    /// Mutable channel registry.
    pub(crate) fn registry_mut(&mut self) -> &mut ChannelRegistry {
        &mut self.registry
    }

    /// Channels the caller wants joined, in request order.
    pub fn intents(&self) -> &[String] {
        &self.intents
    }
}

/// Strip a leading `#` and lowercase.
pub(crate) fn normalize(channel: &str) -> String {
    channel.trim().trim_start_matches('#').to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conn() -> Connection {
        Connection::new(Credentials::new("Bot", "oauth:secret"), Capability::all())
    }

    fn ready(now: Instant) -> Connection {
        let mut c = conn();
        c.open().unwrap();
        c.connected(now);
        c.take_outbound();
        c.push_line(":tmi.twitch.tv 376 bot :>");
        c.next_event(now).unwrap();
        c
    }

    #[test]
    fn test_double_open_is_rejected() {
        let mut c = conn();
        c.open().unwrap();
        let err = c.open().unwrap_err();
        assert!(matches!(
            err,
            ConfigurationError::AlreadyOpen(ConnectionState::Connecting)
        ));
    }

    #[test]
    fn test_login_sequence() {
        let mut c = conn();
        c.open().unwrap();
        c.connected(Instant::now());
        assert_eq!(
            c.take_outbound(),
            vec![
                "PASS oauth:secret",
                "NICK bot",
                "CAP REQ :twitch.tv/commands",
                "CAP REQ :twitch.tv/tags",
                "CAP REQ :twitch.tv/membership",
            ]
        );
        assert_eq!(c.state(), ConnectionState::NegotiatingCapabilities);
    }

    #[test]
    fn test_ready_on_end_of_motd_replays_joins() {
        let now = Instant::now();
        let mut c = conn();
        c.join("#Ninja");
        c.open().unwrap();
        c.connected(now);
        c.take_outbound();

        c.push_line(":tmi.twitch.tv CAP * ACK :twitch.tv/tags");
        c.next_event(now).unwrap();
        assert!(!c.is_ready());
        assert!(c.take_outbound().is_empty());

        c.push_line(":tmi.twitch.tv 376 bot :>");
        c.next_event(now).unwrap();
        assert!(c.is_ready());
        assert_eq!(c.take_outbound(), vec!["JOIN #ninja"]);
    }

    #[test]
    fn test_receiving_dispatching_cycle() {
        let now = Instant::now();
        let mut c = ready(now);
        c.receive(b"PING :tmi.twitch.tv\r\n");
        assert!(c.next_event(now).is_some());
        assert_eq!(c.state(), ConnectionState::Dispatching);
        assert!(c.next_event(now).is_none());
        assert_eq!(c.state(), ConnectionState::Receiving);
    }

    #[test]
    fn test_unparseable_lines_are_skipped() {
        let now = Instant::now();
        let mut c = ready(now);
        c.push_line("   ");
        c.push_line("PING :tmi.twitch.tv");
        let event = c.next_event(now).unwrap();
        assert_eq!(event.kind(), &EventKind::Ping);
    }

    #[test]
    fn test_staleness() {
        let start = Instant::now();
        let mut c = ready(start);
        let timeout = Duration::from_secs(300);
        assert!(!c.is_stale(start + Duration::from_secs(299), timeout));
        assert!(c.is_stale(start + Duration::from_secs(300), timeout));

        let later = start + Duration::from_secs(200);
        c.push_line("PING :tmi.twitch.tv");
        c.next_event(later).unwrap();
        c.mark_alive();
        assert!(!c.is_stale(start + Duration::from_secs(400), timeout));
    }

    #[test]
    fn test_reconnect_command() {
        let now = Instant::now();
        let mut c = ready(now);
        c.push_line(":tmi.twitch.tv RECONNECT");
        c.next_event(now).unwrap();
        assert!(c.reconnect_requested());
        c.reset();
        assert!(!c.reconnect_requested());
    }

    #[test]
    fn test_reset_keeps_intent() {
        let now = Instant::now();
        let mut c = ready(now);
        c.join("ninja");
        c.registry_mut().add_channel("ninja");
        c.fail();
        assert_eq!(c.state(), ConnectionState::Error);
        c.reset();
        assert_eq!(c.state(), ConnectionState::Disconnected);
        assert!(c.registry().is_empty());
        assert_eq!(c.intents(), ["ninja"]);
        assert!(c.open().is_ok());
    }

    #[test]
    fn test_part() {
        let now = Instant::now();
        let mut c = ready(now);
        c.join("ninja");
        c.registry_mut().add_channel("ninja");
        c.take_outbound();
        c.part("#ninja");
        assert_eq!(c.take_outbound(), vec!["PART #ninja"]);
        assert!(c.intents().is_empty());

        c.part("nowhere");
        assert!(c.take_outbound().is_empty());
    }

    #[test]
    fn test_part_all_clears_intents() {
        let now = Instant::now();
        let mut c = ready(now);
        c.join("ninja");
        c.join("shroud");
        c.registry_mut().add_channel("ninja");
        c.take_outbound();
        c.part_all();
        assert_eq!(c.take_outbound(), vec!["PART #ninja"]);
        assert!(c.intents().is_empty());

        // while reconnecting nothing is joined, but intents still go
        let mut c = conn();
        c.join("ninja");
        c.part_all();
        c.open().unwrap();
        c.connected(now);
        c.take_outbound();
        c.push_line(":tmi.twitch.tv 376 bot :>");
        c.next_event(now).unwrap();
        assert!(c.take_outbound().is_empty());
    }

    #[test]
    fn test_send_raw_rejects_line_breaks() {
        let mut c = conn();
        assert!(matches!(
            c.send_raw("PRIVMSG #a :x\r\nQUIT"),
            Err(ProtocolError::IllegalLineBreak(_))
        ));
        c.privmsg("#Ninja", "hi").unwrap();
        assert!(c.take_outbound().is_empty());

        let mut c = ready(Instant::now());
        c.privmsg("#Ninja", "hi").unwrap();
        assert_eq!(c.take_outbound(), vec!["PRIVMSG #ninja :hi"]);
        assert!(c.privmsg("ninja", "a\nb").is_err());
    }
}

//! Routing events to handlers.
//!
//! Handlers are keyed by [`EventKind`] and run in registration order,
//! synchronously, on the task that owns the [`Connection`]. A handler that
//! returns an error or panics is logged and does not affect the others.
//!
//! [`Dispatcher::with_builtins`] registers the handlers that keep the
//! connection alive and the channel registry current; user handlers added
//! later run after them. Only the built-ins see the [`Connection`] itself.
//! User handlers get a [`HandlerContext`], which can queue lines and read
//! state but not change the registry, the acknowledgments or the lifecycle.

use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};

use tracing::{debug, error, warn};

use crate::caps::CapabilityAcks;
use crate::error::ProtocolError;
use crate::event::{Event, EventKind, RPL_NAMREPLY};
use crate::registry::ChannelRegistry;
use crate::state::{Connection, ConnectionState};

/// A registered user handler.
pub type Handler =
    Box<dyn for<'c> FnMut(&Event, &mut HandlerContext<'c>) -> anyhow::Result<()> + Send>;

type Builtin = fn(&Event, &mut Connection) -> anyhow::Result<()>;

/// Host answered when a PING has no payload.
const DEFAULT_PONG_HOST: &str = "tmi.twitch.tv";

/// What a user handler may do with the connection.
pub struct HandlerContext<'a> {
    conn: &'a mut Connection,
}

impl HandlerContext<'_> {
    /// Queue an outbound line. Embedded line breaks are refused.
    pub fn send_raw(&mut self, line: impl Into<String>) -> Result<(), ProtocolError> {
        self.conn.send_raw(line)
    }

    /// Queue a chat message for a channel.
    pub fn privmsg(&mut self, channel: &str, text: &str) -> Result<(), ProtocolError> {
        self.conn.privmsg(channel, text)
    }

    /// Join a channel now and after every reconnect.
    pub fn join(&mut self, channel: &str) {
        self.conn.join(channel);
    }

    /// Leave a channel and stop rejoining it.
    pub fn part(&mut self, channel: &str) {
        self.conn.part(channel);
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        self.conn.state()
    }

    /// The lowercased login name.
    pub fn identity(&self) -> &str {
        self.conn.identity()
    }

    /// Capability acknowledgments.
    pub fn acks(&self) -> &CapabilityAcks {
        self.conn.acks()
    }

    /// Joined channels and members.
    pub fn registry(&self) -> &ChannelRegistry {
        self.conn.registry()
    }
}

impl std::fmt::Debug for HandlerContext<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerContext")
            .field("state", &self.state())
            .field("identity", &self.identity())
            .finish()
    }
}

enum Entry {
    Builtin(Builtin),
    User(Handler),
}

impl Entry {
    fn call(&mut self, event: &Event, conn: &mut Connection) -> anyhow::Result<()> {
        match self {
            Self::Builtin(f) => f(event, conn),
            Self::User(handler) => handler(event, &mut HandlerContext { conn }),
        }
    }
}

/// Event kind → handlers in registration order.
#[derive(Default)]
pub struct Dispatcher {
    handlers: HashMap<EventKind, Vec<Entry>>,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let counts: HashMap<String, usize> = self
            .handlers
            .iter()
            .map(|(k, v)| (k.to_string(), v.len()))
            .collect();
        f.debug_struct("Dispatcher").field("handlers", &counts).finish()
    }
}

impl Dispatcher {
    /// A dispatcher with no handlers.
    pub fn new() -> Self {
        Self::default()
    }

    /// A dispatcher with the built-in protocol handlers registered.
    pub fn with_builtins() -> Self {
        let mut dispatcher = Self::new();
        dispatcher.builtin(EventKind::Ping, on_ping);
        dispatcher.builtin(EventKind::Cap, on_cap);
        dispatcher.builtin(EventKind::Join, on_join);
        dispatcher.builtin(EventKind::Part, on_part);
        dispatcher.builtin(EventKind::Numeric(RPL_NAMREPLY), on_names);
        dispatcher
    }

    fn builtin(&mut self, kind: EventKind, handler: Builtin) {
        self.handlers.entry(kind).or_default().push(Entry::Builtin(handler));
    }

    /// Register a handler for `kind`, after any already registered.
    pub fn on<F>(&mut self, kind: EventKind, handler: F)
    where
        F: for<'c> FnMut(&Event, &mut HandlerContext<'c>) -> anyhow::Result<()> + Send + 'static,
    {
        self.add(kind, Box::new(handler));
    }

    /// Register an already boxed handler.
    pub fn add(&mut self, kind: EventKind, handler: Handler) {
        self.handlers.entry(kind).or_default().push(Entry::User(handler));
    }

    /// Number of handlers registered for `kind`.
    pub fn handler_count(&self, kind: &EventKind) -> usize {
        self.handlers.get(kind).map_or(0, Vec::len)
    }

    /// Run every handler registered for the event's kind.
    ///
    /// Returns how many handlers failed.
    pub fn dispatch(&mut self, event: &Event, conn: &mut Connection) -> usize {
        let Some(handlers) = self.handlers.get_mut(event.kind()) else {
            return 0;
        };
        let mut failures = 0;
        for (index, handler) in handlers.iter_mut().enumerate() {
            match panic::catch_unwind(AssertUnwindSafe(|| handler.call(event, conn))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    failures += 1;
                    error!(kind = %event.kind(), handler = index, error = %e, "handler failed");
                }
                Err(payload) => {
                    failures += 1;
                    let reason = payload
                        .downcast_ref::<&str>()
                        .map(|s| (*s).to_owned())
                        .or_else(|| payload.downcast_ref::<String>().cloned())
                        .unwrap_or_else(|| "non-string panic payload".to_owned());
                    error!(kind = %event.kind(), handler = index, panic = %reason, "handler panicked");
                }
            }
        }
        failures
    }
}

fn on_ping(event: &Event, conn: &mut Connection) -> anyhow::Result<()> {
    let host = event.content().unwrap_or(DEFAULT_PONG_HOST);
    conn.send_raw(format!("PONG :{}", host))?;
    conn.mark_alive();
    debug!(host, "answered liveness probe");
    Ok(())
}

fn on_cap(event: &Event, conn: &mut Connection) -> anyhow::Result<()> {
    let sub = event.params().get(1).map(String::as_str);
    let names = event.content().unwrap_or_default();
    match sub {
        Some("ACK") => {
            for name in names.split_whitespace() {
                conn.acks_mut().acknowledge(name);
            }
        }
        Some("NAK") => warn!(capabilities = names, "capabilities rejected"),
        _ => debug!(line = event.raw(), "ignoring CAP line"),
    }
    Ok(())
}

fn is_self(event: &Event, conn: &Connection) -> bool {
    event.author() == Some(conn.identity())
}

fn on_join(event: &Event, conn: &mut Connection) -> anyhow::Result<()> {
    let (Some(channel), Some(author)) = (event.channel(), event.author()) else {
        warn!(line = event.raw(), "JOIN without channel or author");
        return Ok(());
    };
    if is_self(event, conn) {
        conn.registry_mut().add_channel(channel);
        debug!(channel, "joined");
    } else if let Err(e) = conn.registry_mut().add_member(channel, author) {
        warn!(error = %e, "membership update skipped");
    }
    Ok(())
}

fn on_part(event: &Event, conn: &mut Connection) -> anyhow::Result<()> {
    let (Some(channel), Some(author)) = (event.channel(), event.author()) else {
        warn!(line = event.raw(), "PART without channel or author");
        return Ok(());
    };
    let result = if is_self(event, conn) {
        conn.registry_mut().remove_channel(channel).map(|_| ())
    } else {
        conn.registry_mut().remove_member(channel, author)
    };
    if let Err(e) = result {
        warn!(error = %e, "membership update skipped");
    }
    Ok(())
}

fn on_names(event: &Event, conn: &mut Connection) -> anyhow::Result<()> {
    let Some(channel) = event.channel() else {
        warn!(line = event.raw(), "NAMES reply without channel");
        return Ok(());
    };
    if let Err(e) = conn
        .registry_mut()
        .add_snapshot(channel, event.content().unwrap_or_default())
    {
        warn!(error = %e, "membership snapshot skipped");
    }
    Ok(())
}

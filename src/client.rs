//! Async client driver.
//!
//! [`Client::spawn`] starts one background task that owns the socket, the
//! [`Connection`] and the [`Dispatcher`]. The returned [`ClientHandle`] is a
//! cheap clone that talks to the task over a channel and reads snapshots the
//! task publishes after every change.
//!
//! ```no_run
//! use tmi_chat::{Client, ClientConfig, Credentials, EventKind};
//!
//! # async fn run() -> Result<(), tmi_chat::ClientError> {
//! let config = ClientConfig::new(Credentials::new("mybot", "oauth:token"));
//! let handle = Client::new(config)
//!     .on(EventKind::Privmsg, |event, _ctx| {
//!         println!("{}: {}", event.author().unwrap_or("?"), event.content().unwrap_or(""));
//!         Ok(())
//!     })
//!     .spawn();
//! handle.join("ninja")?;
//! tokio::time::sleep(std::time::Duration::from_secs(30)).await;
//! for event in handle.get_events() {
//!     println!("{}", event);
//! }
//! handle.shutdown().await;
//! # Ok(())
//! # }
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use parking_lot::{Mutex, RwLock};
use tokio::io::AsyncWrite;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::codec::{FramedRead, FramedWrite};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::caps::Capability;
use crate::config::ClientConfig;
use crate::dispatch::{Dispatcher, Handler, HandlerContext};
use crate::error::{ClientError, ProtocolError, TransportError};
use crate::event::{Event, EventKind};
use crate::line::LineCodec;
use crate::observe::{redact, Direction, LineObserver, TracingObserver};
use crate::state::{Connection, ConnectionState};
use crate::transport::{Connector, TcpConnector};

/// Requests from handles to the background task.
enum Command {
    Join(String),
    Part(String),
    PartAll,
    Privmsg { channel: String, text: String },
    On(EventKind, Handler),
}

/// Read-only copies of connection state, refreshed by the task.
#[derive(Debug, Default)]
struct Snapshot {
    state: ConnectionState,
    channels: BTreeMap<String, Vec<String>>,
    capabilities: Vec<(Capability, bool)>,
    registry_generation: Option<u64>,
}

#[derive(Debug, Default)]
struct Shared {
    events: Mutex<Vec<Event>>,
    snapshot: RwLock<Snapshot>,
}

/// Builder for the background client.
pub struct Client<C: Connector = TcpConnector> {
    config: ClientConfig,
    connector: C,
    dispatcher: Dispatcher,
    observer: Arc<dyn LineObserver>,
}

impl Client<TcpConnector> {
    /// A client connecting over TCP to the configured host.
    pub fn new(config: ClientConfig) -> Self {
        let connector = TcpConnector::new(&config.host, config.port, config.connect_timeout);
        Self::with_connector(config, connector)
    }
}

impl<C: Connector> Client<C> {
    /// A client using a custom connector.
    pub fn with_connector(config: ClientConfig, connector: C) -> Self {
        Self {
            config,
            connector,
            dispatcher: Dispatcher::with_builtins(),
            observer: Arc::new(TracingObserver),
        }
    }

    /// Register a handler, after the built-in ones.
    pub fn on<F>(mut self, kind: EventKind, handler: F) -> Self
    where
        F: for<'c> FnMut(&Event, &mut HandlerContext<'c>) -> anyhow::Result<()> + Send + 'static,
    {
        self.dispatcher.on(kind, handler);
        self
    }

    /// Replace the wire observer.
    pub fn observer(mut self, observer: impl LineObserver + 'static) -> Self {
        self.observer = Arc::new(observer);
        self
    }

    /// Start the background task. Must be called inside a tokio runtime.
    pub fn spawn(self) -> ClientHandle {
        let (tx, rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let shared = Arc::new(Shared::default());

        let mut connection = Connection::new(
            self.config.credentials.clone(),
            self.config.capabilities.clone(),
        );
        for channel in &self.config.channels {
            connection.join(channel);
        }

        let driver = Driver {
            config: self.config,
            connector: self.connector,
            dispatcher: self.dispatcher,
            observer: self.observer,
            connection,
            commands: rx,
            cancel: cancel.clone(),
            shared: Arc::clone(&shared),
        };
        let task = tokio::spawn(driver.run());

        ClientHandle {
            commands: tx,
            cancel,
            shared,
            task: Arc::new(Mutex::new(Some(task))),
        }
    }
}

/// Cloneable handle to a running client.
#[derive(Clone)]
pub struct ClientHandle {
    commands: mpsc::UnboundedSender<Command>,
    cancel: CancellationToken,
    shared: Arc<Shared>,
    task: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl std::fmt::Debug for ClientHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientHandle")
            .field("state", &self.state())
            .field("stopped", &self.cancel.is_cancelled())
            .finish()
    }
}

impl ClientHandle {
    fn command(&self, command: Command) -> Result<(), ClientError> {
        if self.cancel.is_cancelled() {
            return Err(ClientError::Stopped);
        }
        self.commands.send(command).map_err(|_| ClientError::Stopped)
    }

    /// Join a channel now, and again after every reconnect.
    pub fn join(&self, channel: &str) -> Result<(), ClientError> {
        self.command(Command::Join(channel.to_owned()))
    }

    /// Leave a channel and stop rejoining it.
    pub fn part(&self, channel: &str) -> Result<(), ClientError> {
        self.command(Command::Part(channel.to_owned()))
    }

    /// Join several channels.
    pub fn join_all<I, S>(&self, channels: I) -> Result<(), ClientError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        channels
            .into_iter()
            .try_for_each(|c| self.join(c.as_ref()))
    }

    /// Leave every channel, including ones requested but not joined yet,
    /// and stop rejoining them.
    pub fn part_all(&self) -> Result<(), ClientError> {
        self.command(Command::PartAll)
    }

    /// Send a chat message.
    pub fn send(&self, channel: &str, text: &str) -> Result<(), ClientError> {
        if text.contains(['\r', '\n']) {
            return Err(ProtocolError::IllegalLineBreak(text.to_owned()).into());
        }
        self.command(Command::Privmsg {
            channel: channel.to_owned(),
            text: text.to_owned(),
        })
    }

    /// Register a handler on the running client.
    pub fn on<F>(&self, kind: EventKind, handler: F) -> Result<(), ClientError>
    where
        F: for<'c> FnMut(&Event, &mut HandlerContext<'c>) -> anyhow::Result<()> + Send + 'static,
    {
        self.command(Command::On(kind, Box::new(handler)))
    }

    /// Take every event received since the last call. Never blocks on I/O.
    pub fn get_events(&self) -> Vec<Event> {
        std::mem::take(&mut *self.shared.events.lock())
    }

    /// Joined channels and their members.
    pub fn channels(&self) -> BTreeMap<String, Vec<String>> {
        self.shared.snapshot.read().channels.clone()
    }

    /// Requested capabilities and whether each was acknowledged.
    pub fn capabilities(&self) -> Vec<(Capability, bool)> {
        self.shared.snapshot.read().capabilities.clone()
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        self.shared.snapshot.read().state
    }

    /// Ask the task to stop. Returns immediately.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    /// Stop the task and wait for it to exit.
    pub async fn shutdown(&self) {
        self.stop();
        let task = self.task.lock().take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                error!(error = %e, "client task ended abnormally");
            }
        }
    }
}

/// Why a session ended.
enum SessionEnd {
    Stopped,
    Failed(TransportError),
}

struct Driver<C: Connector> {
    config: ClientConfig,
    connector: C,
    dispatcher: Dispatcher,
    observer: Arc<dyn LineObserver>,
    connection: Connection,
    commands: mpsc::UnboundedReceiver<Command>,
    cancel: CancellationToken,
    shared: Arc<Shared>,
}

fn now() -> std::time::Instant {
    tokio::time::Instant::now().into_std()
}

impl<C: Connector> Driver<C> {
    async fn run(mut self) {
        let mut attempt: u32 = 0;
        info!(address = %self.config.address(), "client started");

        loop {
            if let Err(e) = self.connection.open() {
                error!(error = %e, "cannot open connection");
                break;
            }
            self.publish();

            let connected = tokio::select! {
                _ = self.cancel.cancelled() => break,
                result = self.connector.connect() => result,
            };

            let failure = match connected {
                Ok(stream) => match self.session(stream).await {
                    SessionEnd::Stopped => break,
                    SessionEnd::Failed(e) => e,
                },
                Err(e) => e,
            };

            if self.connection.is_ready() {
                attempt = 0;
            }
            warn!(error = %failure, "connection lost");
            self.connection.fail();
            self.publish();
            self.connection.reset();
            self.publish();

            let delay = self.config.retry.delay(attempt);
            attempt = attempt.saturating_add(1);
            info!(?delay, attempt, "reconnecting after backoff");
            if !self.idle(delay).await {
                break;
            }
        }

        self.connection.reset();
        self.publish();
        info!("client stopped");
    }

    /// Wait out a backoff while still accepting commands. Returns `false`
    /// when stopped.
    async fn idle(&mut self, delay: Duration) -> bool {
        let sleep = tokio::time::sleep(delay);
        tokio::pin!(sleep);
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => return false,
                _ = &mut sleep => return true,
                command = self.commands.recv() => match command {
                    Some(command) => self.apply(command),
                    None => return false,
                },
            }
        }
    }

    async fn session(&mut self, stream: C::Stream) -> SessionEnd {
        let (read, write) = tokio::io::split(stream);
        let mut reader = FramedRead::new(read, LineCodec::new());
        let mut writer = FramedWrite::new(write, LineCodec::new());

        self.connection.connected(now());
        if let Err(e) = self.flush(&mut writer).await {
            return SessionEnd::Failed(e);
        }
        self.publish();

        let mut tick = tokio::time::interval(self.config.poll_interval);
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    let _ = SinkExt::<String>::close(&mut writer).await;
                    return SessionEnd::Stopped;
                }
                frame = reader.next() => match frame {
                    Some(Ok(line)) => {
                        self.handle_line(line);
                        if self.connection.reconnect_requested() {
                            return SessionEnd::Failed(TransportError::ReconnectRequested);
                        }
                    }
                    Some(Err(e)) => return SessionEnd::Failed(e.into()),
                    None => return SessionEnd::Failed(TransportError::Closed),
                },
                command = self.commands.recv() => match command {
                    Some(command) => self.apply(command),
                    None => {
                        debug!("all handles dropped");
                        let _ = SinkExt::<String>::close(&mut writer).await;
                        return SessionEnd::Stopped;
                    }
                },
                _ = tick.tick() => {
                    let timeout = self.config.liveness_timeout;
                    if self.connection.is_stale(now(), timeout) {
                        return SessionEnd::Failed(TransportError::Stale(timeout));
                    }
                }
            }

            if let Err(e) = self.flush(&mut writer).await {
                return SessionEnd::Failed(e);
            }
        }
    }

    fn handle_line(&mut self, line: String) {
        self.observer.observe(Direction::Inbound, &redact(&line));
        self.connection.push_line(line);
        let now = now();
        while let Some(event) = self.connection.next_event(now) {
            self.dispatcher.dispatch(&event, &mut self.connection);
            self.shared.events.lock().push(event);
        }
        self.publish();
    }

    fn apply(&mut self, command: Command) {
        match command {
            Command::Join(channel) => self.connection.join(&channel),
            Command::Part(channel) => self.connection.part(&channel),
            Command::PartAll => self.connection.part_all(),
            Command::Privmsg { channel, text } => {
                if let Err(e) = self.connection.privmsg(&channel, &text) {
                    warn!(error = %e, "message rejected");
                }
            }
            Command::On(kind, handler) => self.dispatcher.add(kind, handler),
        }
    }

    async fn flush<W>(&mut self, writer: &mut FramedWrite<W, LineCodec>) -> Result<(), TransportError>
    where
        W: AsyncWrite + Unpin,
    {
        let lines = self.connection.take_outbound();
        if lines.is_empty() {
            return Ok(());
        }
        for line in lines {
            self.observer.observe(Direction::Outbound, &redact(&line));
            writer.feed(line).await?;
        }
        SinkExt::<String>::flush(writer).await?;
        Ok(())
    }

    fn publish(&self) {
        let mut snapshot = self.shared.snapshot.write();
        snapshot.state = self.connection.state();
        snapshot.capabilities = self
            .connection
            .acks()
            .iter()
            .map(|(cap, acked)| (cap.clone(), acked))
            .collect();

        let registry = self.connection.registry();
        if snapshot.registry_generation != Some(registry.generation()) {
            snapshot.channels = registry
                .channels()
                .into_iter()
                .map(|name| {
                    let members = registry.members(&name).map(<[String]>::to_vec).unwrap_or_default();
                    (name, members)
                })
                .collect();
            snapshot.registry_generation = Some(registry.generation());
        }
    }
}

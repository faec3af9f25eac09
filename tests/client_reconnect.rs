//! Client lifecycle against an in-memory server.
//!
//! Time is paused, so backoff and liveness timeouts elapse instantly while
//! still being measurable.

#![cfg(feature = "tokio")]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream, Lines, ReadHalf, WriteHalf};
use tokio::sync::mpsc;
use tokio::time::Instant;

use tmi_chat::{
    Capability, Client, ClientConfig, ClientHandle, Connector, ConnectionState, Credentials,
    Direction, EventKind, RetryPolicy, TransportError,
};

struct MockConnector {
    servers: mpsc::UnboundedSender<DuplexStream>,
    attempts: Arc<AtomicUsize>,
}

#[async_trait]
impl Connector for MockConnector {
    type Stream = DuplexStream;

    async fn connect(&self) -> Result<DuplexStream, TransportError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let (client, server) = tokio::io::duplex(64 * 1024);
        self.servers
            .send(server)
            .map_err(|_| TransportError::Closed)?;
        Ok(client)
    }
}

struct Server {
    lines: Lines<BufReader<ReadHalf<DuplexStream>>>,
    writer: WriteHalf<DuplexStream>,
}

impl Server {
    fn new(stream: DuplexStream) -> Self {
        let (read, writer) = tokio::io::split(stream);
        Self {
            lines: BufReader::new(read).lines(),
            writer,
        }
    }

    async fn expect(&mut self, expected: &str) {
        let line = self.lines.next_line().await.unwrap();
        assert_eq!(line.as_deref(), Some(expected));
    }

    async fn send(&mut self, line: &str) {
        self.writer.write_all(line.as_bytes()).await.unwrap();
        self.writer.write_all(b"\r\n").await.unwrap();
    }

    /// Walk through login up to readiness.
    async fn login(&mut self) {
        self.expect("PASS oauth:secret").await;
        self.expect("NICK bot").await;
        self.expect("CAP REQ :twitch.tv/commands").await;
        self.expect("CAP REQ :twitch.tv/tags").await;
        self.expect("CAP REQ :twitch.tv/membership").await;
        self.send(":tmi.twitch.tv CAP * ACK :twitch.tv/commands twitch.tv/tags").await;
        self.send(":tmi.twitch.tv 376 bot :>").await;
    }
}

struct Harness {
    handle: ClientHandle,
    servers: mpsc::UnboundedReceiver<DuplexStream>,
    attempts: Arc<AtomicUsize>,
    wire: Arc<Mutex<Vec<String>>>,
}

impl Harness {
    fn start(channels: &[&str]) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let attempts = Arc::new(AtomicUsize::new(0));
        let wire = Arc::new(Mutex::new(Vec::new()));

        let mut config = ClientConfig::new(Credentials::new("Bot", "oauth:secret"));
        config.channels = channels.iter().map(|c| c.to_string()).collect();
        config.retry = RetryPolicy::Fixed(Duration::from_secs(5));

        let connector = MockConnector {
            servers: tx,
            attempts: Arc::clone(&attempts),
        };
        let seen = Arc::clone(&wire);
        let handle = Client::with_connector(config, connector)
            .observer(move |direction: Direction, line: &str| {
                seen.lock().unwrap().push(format!("{} {}", direction, line));
            })
            .spawn();

        Self {
            handle,
            servers: rx,
            attempts,
            wire,
        }
    }

    async fn accept(&mut self) -> Server {
        Server::new(self.servers.recv().await.unwrap())
    }

    async fn wait_for(&self, mut done: impl FnMut(&ClientHandle) -> bool) {
        for _ in 0..1000 {
            if done(&self.handle) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not reached");
    }
}

#[tokio::test(start_paused = true)]
async fn login_join_and_drain_events() {
    let mut h = Harness::start(&["ninja"]);
    let mut server = h.accept().await;
    server.login().await;
    server.expect("JOIN #ninja").await;

    server.send(":bot!bot@bot.tmi.twitch.tv JOIN #ninja").await;
    server.send(":bot.tmi.twitch.tv 353 bot = #ninja :alice bob").await;
    server
        .send("@badges=subscriber/12 :alice!alice@alice.tmi.twitch.tv PRIVMSG #ninja :hi")
        .await;

    h.wait_for(|c| c.channels().get("ninja").map_or(false, |m| m.len() == 2))
        .await;
    assert_eq!(h.handle.state(), ConnectionState::Receiving);
    assert_eq!(
        h.handle.capabilities(),
        vec![
            (Capability::Membership, false),
            (Capability::Commands, true),
            (Capability::Tags, true),
        ]
    );

    let mut events = Vec::new();
    h.wait_for(|c| {
        events.extend(c.get_events());
        events.iter().any(|e| e.kind() == &EventKind::Privmsg)
    })
    .await;
    assert!(h.handle.get_events().is_empty());

    let kinds: Vec<String> = events.iter().map(|e| e.kind().to_string()).collect();
    assert_eq!(kinds, ["CAP", "376", "JOIN", "353", "PRIVMSG"]);
    assert_eq!(events[4].author(), Some("alice"));

    let wire = h.wire.lock().unwrap().clone();
    assert!(wire.contains(&">> PASS oaut***".to_string()));
    assert!(wire.iter().all(|l| !l.contains("oauth:secret")));

    h.handle.shutdown().await;
    assert_eq!(h.handle.state(), ConnectionState::Disconnected);
    assert!(h.handle.join("elsewhere").is_err());
}

#[tokio::test(start_paused = true)]
async fn ping_is_answered() {
    let mut h = Harness::start(&[]);
    let mut server = h.accept().await;
    server.login().await;
    server.send("PING :tmi.twitch.tv").await;
    server.expect("PONG :tmi.twitch.tv").await;
    h.handle.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn reconnects_after_reset_and_replays_joins() {
    let mut h = Harness::start(&[]);
    let mut server = h.accept().await;
    server.login().await;
    h.wait_for(|c| c.state().is_ready()).await;

    h.handle.join("#Ninja").unwrap();
    server.expect("JOIN #ninja").await;
    server.send(":bot!bot@bot.tmi.twitch.tv JOIN #ninja").await;
    h.wait_for(|c| c.channels().contains_key("ninja")).await;

    drop(server);
    let lost = Instant::now();
    let mut server = h.accept().await;
    let waited = lost.elapsed();
    assert!(waited >= Duration::from_secs(5), "reconnected too early: {:?}", waited);
    assert!(waited < Duration::from_secs(6), "reconnected too late: {:?}", waited);
    assert_eq!(h.attempts.load(Ordering::SeqCst), 2);

    // state from the first session is gone
    assert!(h.handle.channels().is_empty());

    server.login().await;
    server.expect("JOIN #ninja").await;
    h.handle.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn stale_connection_is_replaced() {
    let mut h = Harness::start(&["ninja"]);
    let mut server = h.accept().await;
    let opened = Instant::now();
    server.login().await;
    server.expect("JOIN #ninja").await;

    let _silent = server;
    let mut server = h.accept().await;
    assert!(opened.elapsed() >= Duration::from_secs(300));

    server.login().await;
    server.expect("JOIN #ninja").await;
    h.handle.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn server_reconnect_command() {
    let mut h = Harness::start(&["ninja"]);
    let mut server = h.accept().await;
    server.login().await;
    server.expect("JOIN #ninja").await;
    server.send(":tmi.twitch.tv RECONNECT").await;

    let mut server = h.accept().await;
    server.login().await;
    server.expect("JOIN #ninja").await;
    h.handle.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn part_stops_rejoining() {
    let mut h = Harness::start(&["ninja", "shroud"]);
    let mut server = h.accept().await;
    server.login().await;
    server.expect("JOIN #ninja").await;
    server.expect("JOIN #shroud").await;
    server.send(":bot!bot@bot.tmi.twitch.tv JOIN #ninja").await;
    h.wait_for(|c| c.channels().contains_key("ninja")).await;

    h.handle.part("ninja").unwrap();
    server.expect("PART #ninja").await;

    drop(server);
    let mut server = h.accept().await;
    server.login().await;
    server.expect("JOIN #shroud").await;
    h.handle.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn part_all_while_reconnecting() {
    let mut h = Harness::start(&["ninja"]);
    let mut server = h.accept().await;
    server.login().await;
    server.expect("JOIN #ninja").await;

    drop(server);
    h.wait_for(|c| !c.state().is_ready()).await;
    h.handle.part_all().unwrap();

    let mut server = h.accept().await;
    server.login().await;
    server.send("PING :tmi.twitch.tv").await;
    server.expect("PONG :tmi.twitch.tv").await;
    h.handle.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn part_all_leaves_joined_channels() {
    let mut h = Harness::start(&["ninja", "shroud"]);
    let mut server = h.accept().await;
    server.login().await;
    server.expect("JOIN #ninja").await;
    server.expect("JOIN #shroud").await;
    server.send(":bot!bot@bot.tmi.twitch.tv JOIN #ninja").await;
    h.wait_for(|c| c.channels().contains_key("ninja")).await;

    h.handle.part_all().unwrap();
    server.expect("PART #ninja").await;

    drop(server);
    let mut server = h.accept().await;
    server.login().await;
    server.send("PING :tmi.twitch.tv").await;
    server.expect("PONG :tmi.twitch.tv").await;
    h.handle.shutdown().await;
}

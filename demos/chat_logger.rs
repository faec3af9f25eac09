//! Chat logger example
//!
//! Joins the channels named on the command line and prints every chat line.
//! Credentials come from `TWITCH_LOGIN` and `TWITCH_TOKEN`; without them the
//! client logs in anonymously (read-only).
//!
//! Usage:
//!   RUST_LOG=tmi_chat=debug cargo run --example chat_logger -- ninja shroud

use std::time::Duration;

use tmi_chat::{Client, ClientConfig, Credentials, EventKind};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let credentials = match (std::env::var("TWITCH_LOGIN"), std::env::var("TWITCH_TOKEN")) {
        (Ok(login), Ok(token)) => Credentials::new(login, token),
        _ => Credentials::anonymous(),
    };
    let channels: Vec<String> = std::env::args().skip(1).collect();
    if channels.is_empty() {
        anyhow::bail!("usage: chat_logger <channel>...");
    }

    let handle = Client::new(ClientConfig::new(credentials))
        .on(EventKind::Notice, |event, _| {
            println!("! {}", event.content().unwrap_or_default());
            Ok(())
        })
        .spawn();
    handle.join_all(&channels)?;

    let mut ticker = tokio::time::interval(Duration::from_millis(500));
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = ticker.tick() => {
                for event in handle.get_events() {
                    if event.kind() != &EventKind::Privmsg {
                        continue;
                    }
                    let sent = event
                        .sent_at()
                        .map(|t| t.format("%H:%M:%S").to_string())
                        .unwrap_or_default();
                    let color = event.tag("color").and_then(|v| v.as_str()).unwrap_or("");
                    println!(
                        "{} #{} <{}{}> {}",
                        sent,
                        event.channel().unwrap_or_default(),
                        event.author().unwrap_or("?"),
                        if color.is_empty() { String::new() } else { format!(" {}", color) },
                        event.content().unwrap_or_default(),
                    );
                }
            }
        }
    }

    handle.shutdown().await;
    Ok(())
}

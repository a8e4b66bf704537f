//! unrealircd-log-stream - follow an UnrealIRCd server's log in real time.
//!
//! Connects to the RPC listener, subscribes to log sources and prints each
//! event as it arrives.
//!
//! # Environment
//!
//! | Variable | Default |
//! |----------|---------|
//! | `UNREALIRCD_RPC_URL` | `wss://127.0.0.1:8600/` |
//! | `UNREALIRCD_RPC_LOGIN` | (none, `user:password`) |
//! | `UNREALIRCD_TLS_VERIFY` | `true` |
//! | `UNREALIRCD_LOG_SOURCES` | `all` (comma-separated) |

use std::io::{self, Write};

use anyhow::{bail, Context, Result};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use unrealircd_rpc::{Connection, ConnectionOptions, Credentials, Event};

const DEFAULT_URL: &str = "wss://127.0.0.1:8600/";

/// Settings read from the environment.
struct Settings {
    url: String,
    credentials: Option<Credentials>,
    tls_verify: bool,
    sources: Vec<String>,
}

impl Settings {
    fn from_env() -> Result<Self> {
        let url = std::env::var("UNREALIRCD_RPC_URL").unwrap_or_else(|_| DEFAULT_URL.into());

        let credentials = match std::env::var("UNREALIRCD_RPC_LOGIN") {
            Ok(login) => Some(
                Credentials::from_api_login(&login)
                    .context("UNREALIRCD_RPC_LOGIN must look like user:password")?,
            ),
            Err(_) => None,
        };

        let tls_verify = match std::env::var("UNREALIRCD_TLS_VERIFY") {
            Ok(value) => parse_bool(&value)
                .with_context(|| format!("Invalid UNREALIRCD_TLS_VERIFY value: {}", value))?,
            Err(_) => true,
        };

        let sources = std::env::var("UNREALIRCD_LOG_SOURCES")
            .unwrap_or_else(|_| "all".into())
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect();

        Ok(Self {
            url,
            credentials,
            tls_verify,
            sources,
        })
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn print_event(count: u64, event: &Event) {
    println!(
        "\n[Event #{}] Received at {}:",
        count,
        chrono::Local::now().format("%H:%M:%S")
    );
    if let Some(method) = &event.method {
        println!("  method: {}", method);
    }
    match event.data.as_object() {
        Some(fields) => {
            for (key, value) in fields {
                println!("  {}: {}", key, value);
            }
        }
        None => println!("  Raw event: {}", event.data),
    }
    println!("----------------------------------------");
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "unrealircd_rpc=info".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    tracing::info!("Starting unrealircd-log-stream v{}", env!("CARGO_PKG_VERSION"));

    let settings = Settings::from_env()?;
    let options = ConnectionOptions::default().with_tls_verify(settings.tls_verify);

    let connection = Connection::connect(&settings.url, settings.credentials, options)
        .await
        .with_context(|| format!("Failed to connect to {}", settings.url))?;

    let sources: Vec<&str> = settings.sources.iter().map(String::as_str).collect();
    let ack = connection
        .subscribe(&sources)
        .await
        .context("Failed to subscribe to log events")?;
    println!("Subscription result: {}", ack);
    println!("Listening for log events (press Ctrl+C to stop)...");

    let mut count = 0u64;
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                // Best effort; the server may already be gone
                let _ = connection.unsubscribe().await;
                connection.close().await;
                return Ok(());
            }
            polled = connection.event_loop() => match polled {
                Ok(Some(event)) => {
                    count += 1;
                    print_event(count, &event);
                }
                Ok(None) => {
                    print!(".");
                    let _ = io::stdout().flush();
                }
                Err(e) if e.is_disconnect() => bail!("Connection to {} lost: {}", settings.url, e),
                Err(e) => tracing::warn!("Error in event loop: {}", e),
            },
        }
    }
}

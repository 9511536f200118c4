mod api;
mod config;
mod provider;

use std::fmt::Display;
use std::io::Write;

use anyhow::{Context, Result};
use clap::Parser;
use log::{info, warn, Level};
use time::format_description::BorrowedFormatItem;
use time::macros::format_description;
use time::{OffsetDateTime, UtcOffset};

const LOG_PREFIX: &str = "cloudflare-dns-updater:";
const LOG_TIMESTAMP: &[BorrowedFormatItem<'static>] =
    format_description!("[year]/[month]/[day] [hour]:[minute]:[second]");

#[derive(Parser, Debug)]
#[command(name = "cloudflare-ddns-relay")]
#[command(about = "Relays router IP changes to a Cloudflare DNS record")]
struct Args {
    /// Optional TOML configuration file; CLOUDFLARE_* variables override it
    #[arg(short, long, env = "DDNS_RELAY_CONFIG")]
    config: Option<String>,

    /// Address to listen on
    #[arg(long)]
    host: Option<String>,

    /// Port to listen on
    #[arg(short, long)]
    port: Option<u16>,
}

fn main() -> Result<()> {
    // The local offset can only be read reliably while the process is still
    // single-threaded, so resolve it before the runtime spawns workers.
    let offset = UtcOffset::current_local_offset().unwrap_or(UtcOffset::UTC);

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start tokio runtime")?
        .block_on(run(offset))
}

async fn run(offset: UtcOffset) -> Result<()> {
    let args = Args::parse();

    // Load configuration first (before logger init)
    let mut config = match &args.config {
        Some(path) => {
            let mut config = config::Config::load(path)?;
            config.apply_env(|key| std::env::var(key).ok());
            config
        }
        None => config::Config::from_env(),
    };
    if let Some(host) = args.host {
        config.server.host = host;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }

    init_logger(&config.server.log_level, offset);

    if let Some(path) = &args.config {
        info!("Loaded configuration from: {}", path);
    }
    for key in config.cloudflare.missing_keys() {
        warn!("{} is not set", key);
    }
    info!(
        "Updating record {} ({})",
        config.cloudflare.dns_name,
        config.cloudflare.record_url()
    );

    let client = provider::build_client(config.server.request_timeout())?;
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let app = api::create_router(api::AppState { config, client });

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    info!("Server listening on http://{}", addr);
    info!("Update endpoint: /update?ip={{ip}}&hostname={{hostname}}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("goodbye");
    Ok(())
}

/// Plain-text lines on stdout: fixed prefix, local timestamp, level, message.
/// `RUST_LOG` takes precedence over the configured level.
fn init_logger(default_level: &str, offset: UtcOffset) {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .target(env_logger::Target::Stdout)
        .format(move |buf, record| {
            let now = OffsetDateTime::now_utc().to_offset(offset);
            let line = format_log_line(now, record.level(), record.args());
            writeln!(buf, "{}", line)
        })
        .init();
}

fn format_log_line(at: OffsetDateTime, level: Level, message: impl Display) -> String {
    let timestamp = at
        .format(LOG_TIMESTAMP)
        .unwrap_or_default();
    format!("{} {} {} {}", LOG_PREFIX, timestamp, level, message)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for ctrl-c: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("quitting from ctrl-c"),
        _ = terminate => info!("quitting from SIGTERM"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::{datetime, offset};

    #[test]
    fn log_line_has_prefix_and_timestamp() {
        let line = format_log_line(datetime!(2024-03-05 07:08:09 UTC), Level::Info, "started");
        assert_eq!(line, "cloudflare-dns-updater: 2024/03/05 07:08:09 INFO started");
    }

    #[test]
    fn log_line_keeps_message_arguments() {
        let line = format_log_line(
            datetime!(2024-12-31 23:59:59 UTC),
            Level::Error,
            format_args!("error updating dns record: {}", "boom"),
        );
        assert!(line.starts_with(LOG_PREFIX));
        assert!(line.ends_with("ERROR error updating dns record: boom"));
    }

    #[test]
    fn log_line_uses_given_offset() {
        let at = datetime!(2024-03-05 23:30:00 UTC).to_offset(offset!(+2));
        let line = format_log_line(at, Level::Info, "tick");
        assert_eq!(line, "cloudflare-dns-updater: 2024/03/06 01:30:00 INFO tick");
    }

    #[test]
    fn current_time_matches_timestamp_layout() {
        let line = format_log_line(OffsetDateTime::now_utc(), Level::Warn, "tick");
        let timestamp = &line[LOG_PREFIX.len() + 1..LOG_PREFIX.len() + 20];
        let bytes = timestamp.as_bytes();
        assert_eq!(bytes[4], b'/');
        assert_eq!(bytes[7], b'/');
        assert_eq!(bytes[10], b' ');
        assert_eq!(bytes[13], b':');
        assert_eq!(bytes[16], b':');
        assert!(timestamp
            .chars()
            .enumerate()
            .all(|(i, c)| matches!(i, 4 | 7 | 10 | 13 | 16) || c.is_ascii_digit()));
    }
}

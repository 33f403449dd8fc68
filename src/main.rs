//! SetuNet daemon - message broker for external tool connections
//!
//! Accepts TCP connections from external client processes, decodes their
//! framed messages and logs the payloads. Hosts embedding the broker as a
//! library supply their own [`PeerEventHandler`] instead.

use setu_net::config::AppConfig;
use setu_net::error::Result;
use setu_net::{Broker, PeerEventHandler, PeerId};
use std::env;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

/// Parse config path from command line arguments.
///
/// Supports:
/// - `setu-net <path>` (positional)
/// - `setu-net --config <path>` (flag-based)
/// - `setu-net -c <path>` (short flag)
///
/// Defaults to `/etc/setunet.toml` if not specified.
fn parse_config_path() -> String {
    let args: Vec<String> = env::args().collect();

    // Look for --config or -c flag
    for i in 1..args.len() {
        if (args[i] == "--config" || args[i] == "-c") && i + 1 < args.len() {
            return args[i + 1].clone();
        }
    }

    // Fall back to first positional argument (if it doesn't start with -)
    if args.len() > 1 && !args[1].starts_with('-') {
        return args[1].clone();
    }

    // Default path
    "/etc/setunet.toml".to_string()
}

/// Handler that logs every decoded payload
struct LogHandler;

impl PeerEventHandler for LogHandler {
    fn on_data(&mut self, peer_id: PeerId, payload: &[u8]) {
        match std::str::from_utf8(payload) {
            Ok(text) => log::info!("Peer {} message: {}", peer_id, text),
            Err(_) => log::info!("Peer {} message: {} bytes of binary data", peer_id, payload.len()),
        }
    }

    fn on_disconnect(&mut self, peer_id: PeerId) {
        log::debug!("Peer {} teardown complete", peer_id);
    }
}

fn main() -> Result<()> {
    let config_path = parse_config_path();
    let config = if Path::new(&config_path).exists() {
        AppConfig::from_file(&config_path)?
    } else {
        AppConfig::default()
    };

    // Initialize logger; RUST_LOG overrides the configured level
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(config.logging.level.clone()),
    )
    .init();

    log::info!("SetuNet v{} starting...", env!("CARGO_PKG_VERSION"));
    log::info!("Using config: {}", config_path);

    // Set up shutdown signal handler
    let running = Arc::new(AtomicBool::new(true));
    let r = Arc::clone(&running);

    ctrlc::set_handler(move || {
        log::info!("Received shutdown signal");
        r.store(false, Ordering::Relaxed);
    })
    .map_err(|e| setu_net::Error::Other(format!("Error setting Ctrl-C handler: {}", e)))?;

    let mut broker = Broker::new(Box::new(LogHandler));
    broker.start(config.network.port)?;

    log::info!("SetuNet running. Press Ctrl-C to stop.");

    // Main loop - keep alive while the broker threads do the work
    let mut last_stats = Instant::now();
    while running.load(Ordering::Relaxed) {
        thread::sleep(Duration::from_millis(100));

        if last_stats.elapsed().as_secs() >= 10 {
            log::info!("{} peer(s) connected", broker.connection_count());
            last_stats = Instant::now();
        }
    }

    broker.stop();
    log::info!("SetuNet stopped");
    Ok(())
}

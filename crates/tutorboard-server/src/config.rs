//! Command-line and environment configuration.

use clap::Parser;
use std::net::SocketAddr;

/// Default per-session broadcast buffer.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone, Parser)]
#[command(name = "tutorboard-server", version, about = "WebSocket relay for Tutorboard sessions")]
pub struct Config {
    /// Address to listen on
    #[arg(long, env = "TUTORBOARD_ADDR", default_value = "0.0.0.0:3030")]
    pub addr: SocketAddr,

    /// Messages buffered per session before slow peers start missing them
    #[arg(
        long,
        env = "TUTORBOARD_CHANNEL_CAPACITY",
        default_value_t = DEFAULT_CHANNEL_CAPACITY,
        value_parser = parse_capacity
    )]
    pub channel_capacity: usize,
}

fn parse_capacity(raw: &str) -> Result<usize, String> {
    let capacity: usize = raw.parse().map_err(|e| format!("{e}"))?;
    if capacity == 0 {
        return Err("capacity must be at least 1".to_string());
    }
    Ok(capacity)
}

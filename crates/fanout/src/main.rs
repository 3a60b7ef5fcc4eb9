//! fanout — reliable one-to-many file delivery over IP multicast.
//!
//! One sender transmits a file's bytes once to the multicast group; each
//! receiver repairs its own losses over a private TCP control channel.

use std::net::IpAddr;
use std::path::PathBuf;

use anyhow::{Context, Result};

mod net;
mod session;

use fanout_core::config::FanoutConfig;

const DEFAULT_CONTROL_PORT: u16 = 18239;

fn print_usage() {
    println!("Usage: fanout <command> [options]");
    println!();
    println!("Commands:");
    println!("  send <file> --receivers <n>   Serve <file> to <n> receivers");
    println!("  recv <dir> --sender <addr>    Receive into directory <dir>");
    println!();
    println!("Options:");
    println!("  --receivers <n>   Number of receivers to wait for (default: 1)");
    println!("  --sender <addr>   The sender's IPv4 address");
    println!(
        "  --port <port>     TCP control port (default: {})",
        DEFAULT_CONTROL_PORT
    );
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = FanoutConfig::load().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "failed to load config, using defaults");
        FanoutConfig::default()
    });

    let args: Vec<String> = std::env::args().skip(1).collect();

    // Pull out options, leaving the positional words
    let mut port = DEFAULT_CONTROL_PORT;
    let mut receivers: usize = 1;
    let mut sender: Option<IpAddr> = None;
    let mut remaining: Vec<&str> = Vec::new();
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--port" => {
                i += 1;
                port = args
                    .get(i)
                    .context("--port requires a value")?
                    .parse()
                    .context("--port must be a number")?;
            }
            "--receivers" => {
                i += 1;
                receivers = args
                    .get(i)
                    .context("--receivers requires a value")?
                    .parse()
                    .context("--receivers must be a number")?;
            }
            "--sender" => {
                i += 1;
                sender = Some(
                    args.get(i)
                        .context("--sender requires a value")?
                        .parse()
                        .context("--sender must be an IP address")?,
                );
            }
            other => remaining.push(other),
        }
        i += 1;
    }

    match remaining.as_slice() {
        ["send", file] => {
            anyhow::ensure!(receivers > 0, "--receivers must be at least 1");
            session::run_sender(&config, &PathBuf::from(file), receivers, port).await
        }
        ["recv", dir] => {
            let sender = sender.context("recv requires --sender <addr>")?;
            session::run_receiver(&config, &PathBuf::from(dir), sender, port).await
        }
        ["help"] | ["--help"] | ["-h"] | [] => {
            print_usage();
            Ok(())
        }
        other => {
            eprintln!("Unknown command: {}", other.join(" "));
            eprintln!();
            print_usage();
            std::process::exit(1);
        }
    }
}

//! Session orchestration — the one-sender ↔ N-receivers lifecycle.

use std::net::{IpAddr, SocketAddr};
use std::path::Path;
use std::time::Instant;

use anyhow::{Context, Result};
use tokio::net::{TcpListener, TcpStream};

use fanout_core::config::FanoutConfig;
use fanout_core::integrity::checksum_file;
use fanout_core::wire::HeaderPacket;
use fanout_transport::{ControlChannel, FileStore, Receiver, Sender};

use crate::net;

/// Serve one file to `receivers` receivers: accept them all, hand each
/// the header, then drive the window loop until the final window has
/// converged everywhere.
pub async fn run_sender(
    config: &FanoutConfig,
    path: &Path,
    receivers: usize,
    port: u16,
) -> Result<()> {
    net::log_interfaces();

    let store =
        FileStore::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    let file_size = store.len()?;
    let checksum = checksum_file(store.file()).context("failed to checksum source file")?;

    let filename = path
        .file_name()
        .and_then(|n| n.to_str())
        .context("source path has no usable filename")?;
    let header = HeaderPacket::new(file_size, checksum, filename)?;
    log_header(&header);

    let listener = TcpListener::bind((config.network.bind_addr.as_str(), port))
        .await
        .with_context(|| format!("failed to bind control listener on port {port}"))?;
    tracing::info!(
        addr = %listener.local_addr()?,
        receivers,
        "waiting for receivers"
    );

    let mut controls = Vec::with_capacity(receivers);
    let mut started: Option<Instant> = None;
    while controls.len() < receivers {
        let (stream, peer) = listener
            .accept()
            .await
            .context("failed to accept receiver connection")?;
        let mut chan = ControlChannel::new(stream);
        chan.send_header(&header).await?;
        controls.push(chan);
        // the clock runs from the first receiver, as transfer time
        // includes waiting for stragglers to join
        started.get_or_insert_with(Instant::now);
        tracing::info!(%peer, connected = controls.len(), "receiver connected");
    }

    let data = net::multicast_send_socket().context("failed to create multicast socket")?;
    let group_ip: IpAddr = config
        .network
        .multicast_group
        .parse()
        .with_context(|| format!("invalid multicast group '{}'", config.network.multicast_group))?;
    let group = SocketAddr::new(group_ip, config.network.multicast_port);

    let mut sender = Sender::new(store, data, group, controls);
    let stats = sender.run().await.context("transfer failed")?;

    let elapsed = started.map(|t| t.elapsed().as_millis() as u64).unwrap_or(0);
    tracing::info!(
        windows = stats.windows,
        packets = stats.packets_sent,
        retries = stats.retries,
        elapsed_ms = elapsed,
        "transfer complete"
    );
    Ok(())
}

/// Receive one file into `dest_dir` from the sender at `sender_addr`.
pub async fn run_receiver(
    config: &FanoutConfig,
    dest_dir: &Path,
    sender_addr: IpAddr,
    port: u16,
) -> Result<()> {
    // join the group before the control handshake so no early data
    // packets are missed
    let data = net::multicast_recv_socket(&config.network)
        .context("failed to join multicast group")?;

    let stream = TcpStream::connect(SocketAddr::new(sender_addr, port))
        .await
        .with_context(|| format!("failed to connect to sender at {sender_addr}:{port}"))?;
    let mut control = ControlChannel::new(stream);

    let header = control.recv_header().await.context("header handshake failed")?;
    log_header(&header);

    // only the final component of the advertised name is trusted
    let filename = Path::new(header.filename()?)
        .file_name()
        .context("header carried an empty filename")?;
    let dest = dest_dir.join(filename);
    let store = FileStore::create(&dest)
        .with_context(|| format!("failed to create {}", dest.display()))?;
    tracing::info!(path = %dest.display(), "writing to destination");

    let mut receiver = Receiver::new(store, data, control, &header, &config.repair);
    let stats = receiver.run().await.context("transfer failed")?;

    tracing::info!(
        packets = stats.packets_received,
        retried_windows = stats.windows_retried,
        repair_rounds = stats.repair_rounds,
        "transfer complete"
    );

    // final whole-file comparison, diagnostic only; the per-window
    // verification already gated every advance
    let final_checksum = {
        let file = std::fs::File::open(&dest)?;
        checksum_file(&file).context("failed to checksum received file")?
    };
    if final_checksum == header.checksum() {
        tracing::info!(checksum = final_checksum, "whole-file checksum verified");
    } else {
        tracing::warn!(
            ours = final_checksum,
            theirs = header.checksum(),
            "whole-file checksum mismatch"
        );
    }
    Ok(())
}

fn log_header(header: &HeaderPacket) {
    tracing::info!(
        filename = header.filename().unwrap_or("<invalid>"),
        file_size = header.file_size(),
        packet_count = header.packet_count(),
        checksum = header.checksum(),
        "transfer header"
    );
}

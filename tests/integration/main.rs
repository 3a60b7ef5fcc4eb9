//! fanout integration test harness.
//!
//! Sender and receiver engines run in one process over loopback sockets.
//! The engines take pre-built sockets, so the multicast group is stood in
//! for by a UDP relay task: the sender transmits to the relay, and the
//! relay forwards every data packet to each receiver's socket, applying a
//! per-receiver tamper policy (drop, bit-flip) on the way. That gives the
//! tests deterministic loss and corruption without touching the network.

use std::net::SocketAddr;
use std::path::PathBuf;

use tokio::net::{TcpListener, TcpStream, UdpSocket};

use fanout_core::config::RepairConfig;
use fanout_core::integrity::checksum_file;
use fanout_core::wire::{DataPacket, HeaderPacket};
use fanout_transport::{ControlChannel, FileStore, ReceiveStats, Receiver, Sender, TransferStats};

mod loss;
mod transfer;

// ── Harness ───────────────────────────────────────────────────────────────────

/// What the relay should do with one data packet on one receiver's route.
#[derive(Clone, Copy, Debug)]
pub enum Tamper {
    Forward,
    Drop,
    /// Flip the first payload byte, leaving the packet decodable.
    FlipByte,
}

pub type TamperFn = Box<dyn FnMut(&DataPacket) -> Tamper + Send>;

/// A policy that forwards everything untouched.
pub fn clean() -> TamperFn {
    Box::new(|_| Tamper::Forward)
}

pub fn scratch_dir(tag: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("fanout-it-{}-{}", tag, std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

/// Deterministic non-repeating content so offset mistakes show up.
pub fn patterned(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

pub fn test_repair() -> RepairConfig {
    RepairConfig {
        timeout_ms: 50,
        max_rounds: 200,
    }
}

/// Offset of the first payload byte in a data packet's wire image.
const BODY_OFFSET: usize = 12;

async fn relay_loop(relay: UdpSocket, mut routes: Vec<(SocketAddr, TamperFn)>) {
    let mut buf = vec![0u8; DataPacket::WIRE_SIZE];
    loop {
        let (len, _) = match relay.recv_from(&mut buf).await {
            Ok(r) => r,
            Err(_) => return,
        };
        let packet = match DataPacket::decode(&buf[..len]) {
            Ok(p) => p,
            Err(_) => continue,
        };
        for (dest, tamper) in routes.iter_mut() {
            match tamper(&packet) {
                Tamper::Forward => {
                    let _ = relay.send_to(&buf[..len], *dest).await;
                }
                Tamper::Drop => {}
                Tamper::FlipByte => {
                    let mut copy = buf[..len].to_vec();
                    copy[BODY_OFFSET] ^= 0x01;
                    let _ = relay.send_to(&copy, *dest).await;
                }
            }
        }
    }
}

/// Run one complete transfer of `contents` to `tampers.len()` receivers.
/// Returns each side's outcome; receiver results carry the bytes that
/// landed on disk.
pub async fn run_transfer(
    tag: &str,
    contents: &[u8],
    tampers: Vec<TamperFn>,
    repair: RepairConfig,
) -> (
    anyhow::Result<TransferStats>,
    Vec<anyhow::Result<(ReceiveStats, Vec<u8>)>>,
) {
    let dir = scratch_dir(tag);
    let src_path = dir.join("source.bin");
    std::fs::write(&src_path, contents).unwrap();

    let count = tampers.len();

    // one data socket per receiver, routed through the relay
    let mut recv_socks = Vec::new();
    let mut routes = Vec::new();
    for tamper in tampers {
        let sock = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        routes.push((sock.local_addr().unwrap(), tamper));
        recv_socks.push(sock);
    }
    let relay = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let group = relay.local_addr().unwrap();
    tokio::spawn(relay_loop(relay, routes));

    // control connections, paired in accept order
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let ctrl_addr = listener.local_addr().unwrap();
    let mut sender_chans = Vec::new();
    let mut recv_chans = Vec::new();
    for _ in 0..count {
        let (connected, accepted) =
            tokio::join!(TcpStream::connect(ctrl_addr), listener.accept());
        recv_chans.push(ControlChannel::new(connected.unwrap()));
        sender_chans.push(ControlChannel::new(accepted.unwrap().0));
    }

    // header handshake, exactly as the orchestrator performs it
    let store = FileStore::open(&src_path).unwrap();
    let checksum = checksum_file(store.file()).unwrap();
    let header = HeaderPacket::new(contents.len() as u64, checksum, "source.bin").unwrap();
    for chan in &mut sender_chans {
        chan.send_header(&header).await.unwrap();
    }

    let send_sock = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let mut sender = Sender::new(store, send_sock, group, sender_chans);

    let receiver_futs: Vec<_> = recv_socks
        .into_iter()
        .zip(recv_chans)
        .enumerate()
        .map(|(i, (data, mut chan))| {
            let dest = dir.join(format!("out-{i}.bin"));
            let repair = repair.clone();
            async move {
                let header = chan.recv_header().await?;
                let store = FileStore::create(&dest)?;
                let mut receiver = Receiver::new(store, data, chan, &header, &repair);
                let stats = receiver.run().await?;
                let bytes = std::fs::read(&dest)?;
                Ok::<_, anyhow::Error>((stats, bytes))
            }
        })
        .collect();

    let (send_result, recv_results) = tokio::join!(
        sender.run(),
        futures::future::join_all(receiver_futs)
    );

    (send_result.map_err(Into::into), recv_results)
}

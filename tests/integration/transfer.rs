use crate::*;

use fanout_core::wire::{BUFFER_SIZE, WINDOW_SPAN};

// ══════════════════════════════════════════════════════════════════════════════
//  Clean transfers — no loss, no corruption
// ══════════════════════════════════════════════════════════════════════════════

/// The canonical small case: 10000 bytes is two packets (8192 + 1808) in
/// a single window. One round, no retries, byte-identical output.
#[tokio::test]
async fn small_file_single_window() {
    let contents = patterned(10_000);
    let (send, mut recv) =
        run_transfer("small", &contents, vec![clean()], test_repair()).await;

    let send = send.unwrap();
    let (stats, bytes) = recv.remove(0).unwrap();

    assert_eq!(bytes, contents);
    assert_eq!(send.windows, 1);
    assert_eq!(send.retries, 0);
    assert_eq!(stats.packets_received, 2);
    assert_eq!(stats.windows_retried, 0);
}

#[tokio::test]
async fn empty_file_transfers_cleanly() {
    let (send, mut recv) = run_transfer("empty", &[], vec![clean()], test_repair()).await;

    let send = send.unwrap();
    let (stats, bytes) = recv.remove(0).unwrap();

    assert!(bytes.is_empty());
    assert_eq!(stats.packets_received, 0);
    assert_eq!(send.retries, 0);
}

/// More packets than one window holds: the transfer must span windows
/// and still reproduce the file exactly.
#[tokio::test]
async fn multi_window_transfer() {
    // one full window plus four packets plus a ragged tail
    let len = WINDOW_SPAN as usize + 4 * BUFFER_SIZE + 123;
    let contents = patterned(len);
    let (send, mut recv) =
        run_transfer("multiwin", &contents, vec![clean()], test_repair()).await;

    let send = send.unwrap();
    let (stats, bytes) = recv.remove(0).unwrap();

    assert_eq!(bytes.len(), contents.len());
    assert_eq!(bytes, contents);
    assert_eq!(send.windows, 2);
    assert_eq!(send.retries, 0);
    assert_eq!(stats.packets_received as usize, 256 + 5);
}

/// A file that is an exact multiple of the window span ends with one
/// empty window round: WINDOW_DONE over the empty range, an empty NACK,
/// and a final ACK.
#[tokio::test]
async fn exact_window_multiple_ends_with_empty_round() {
    let contents = patterned(WINDOW_SPAN as usize);
    let (send, mut recv) =
        run_transfer("exactwin", &contents, vec![clean()], test_repair()).await;

    let send = send.unwrap();
    let (stats, bytes) = recv.remove(0).unwrap();

    assert_eq!(bytes, contents);
    // the data window plus the empty terminating round
    assert_eq!(send.windows, 2);
    assert_eq!(stats.packets_received, 256);
}

/// Several receivers, all clean: every one of them gets the same bytes.
#[tokio::test]
async fn three_receivers_all_converge() {
    let contents = patterned(60_000);
    let (send, recv) = run_transfer(
        "trio",
        &contents,
        vec![clean(), clean(), clean()],
        test_repair(),
    )
    .await;

    assert_eq!(send.unwrap().retries, 0);
    for result in recv {
        let (stats, bytes) = result.unwrap();
        assert_eq!(bytes, contents);
        assert_eq!(stats.windows_retried, 0);
    }
}

use crate::*;

use fanout_core::wire::BUFFER_SIZE;
use fanout_transport::TransportError;

// ══════════════════════════════════════════════════════════════════════════════
//  Repair — loss and corruption recovery
// ══════════════════════════════════════════════════════════════════════════════

/// Drop packet 1 on its first pass. The receiver's NACK must bring it
/// back without a full-window retry.
#[tokio::test]
async fn dropped_packet_is_repaired_by_nack() {
    let contents = patterned(10_000);

    let mut dropped = false;
    let tamper: TamperFn = Box::new(move |p| {
        if p.packet_number() == 1 && !dropped {
            dropped = true;
            Tamper::Drop
        } else {
            Tamper::Forward
        }
    });

    let (send, mut recv) = run_transfer("drop1", &contents, vec![tamper], test_repair()).await;

    let send = send.unwrap();
    let (stats, bytes) = recv.remove(0).unwrap();

    assert_eq!(bytes, contents);
    // repaired by targeted retransmission, not a window re-send
    assert_eq!(send.retries, 0);
    assert_eq!(stats.windows_retried, 0);
    assert_eq!(stats.packets_received, 2);
}

/// Roughly a third of the packets vanish on their first pass. Repair
/// rounds must recover every one.
#[tokio::test]
async fn heavy_first_pass_loss_still_completes() {
    let contents = patterned(50 * BUFFER_SIZE + 17);

    let mut seen = std::collections::HashSet::new();
    let tamper: TamperFn = Box::new(move |p| {
        let first_time = seen.insert((p.window_number(), p.packet_number()));
        if first_time && p.packet_number() % 3 == 0 {
            Tamper::Drop
        } else {
            Tamper::Forward
        }
    });

    let (send, mut recv) = run_transfer("heavy", &contents, vec![tamper], test_repair()).await;

    let send = send.unwrap();
    let (stats, bytes) = recv.remove(0).unwrap();

    assert_eq!(bytes, contents);
    assert_eq!(stats.packets_received, 51);
    assert_eq!(send.retries, 0);
}

/// A corrupted payload survives collection (nothing is missing) and is
/// only caught by the window checksum. The receiver votes RESEND and the
/// sender must re-send the window to *every* receiver, including the
/// one whose copy was already correct.
#[tokio::test]
async fn corrupted_window_is_resent_to_all_receivers() {
    let contents = patterned(10_000);

    let mut flipped = false;
    let corrupting: TamperFn = Box::new(move |p| {
        if p.packet_number() == 0 && !flipped {
            flipped = true;
            Tamper::FlipByte
        } else {
            Tamper::Forward
        }
    });

    let (send, recv) = run_transfer(
        "corrupt",
        &contents,
        vec![clean(), corrupting],
        test_repair(),
    )
    .await;

    let send = send.unwrap();
    assert_eq!(send.retries, 1);

    for result in recv {
        let (stats, bytes) = result.unwrap();
        assert_eq!(bytes, contents);
        // the clean receiver is dragged through the retry too
        assert_eq!(stats.windows_retried, 1);
    }
}

/// A packet that never arrives, no matter how many NACK rounds ask for
/// it, must end the transfer with a peer-lost error instead of spinning
/// forever.
#[tokio::test]
async fn unrecoverable_loss_hits_the_repair_bound() {
    let contents = patterned(10_000);

    let tamper: TamperFn = Box::new(|p| {
        if p.packet_number() == 1 {
            Tamper::Drop
        } else {
            Tamper::Forward
        }
    });

    let repair = RepairConfig {
        timeout_ms: 30,
        max_rounds: 3,
    };
    let (send, mut recv) = run_transfer("lost", &contents, vec![tamper], repair).await;

    let recv_err = recv.remove(0).unwrap_err();
    assert!(matches!(
        recv_err.downcast_ref::<TransportError>(),
        Some(TransportError::PeerLost(_))
    ));

    // the receiver is gone, so the sender's convergence wait fails too
    assert!(send.is_err());
}

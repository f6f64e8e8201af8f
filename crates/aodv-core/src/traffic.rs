//! Generated test traffic
//!
//! Each node periodically sends a short marker payload to a random other
//! node. The first transmission is delayed by a random jitter so that nodes
//! started together do not all flood at once.

use crate::error::Result;
use crate::packet::{DataPacket, Payload};
use crate::types::NodeId;
use rand::Rng;

/// Ten-character payload `"*** NN ***"` with a random two-digit number
pub fn random_payload<R: Rng + ?Sized>(rng: &mut R) -> Payload {
    let n: u8 = rng.gen_range(0..100);
    let mut text = *b"*** 00 ***";
    text[4] = b'0' + n / 10;
    text[5] = b'0' + n % 10;
    // Ten ASCII bytes always fit the payload slot
    Payload::from_bytes(&text).unwrap_or_default()
}

/// Random destination in `1..=network_size` other than `me`
///
/// A draw that lands on `me` moves to the next id, wrapping to 1.
pub fn random_destination<R: Rng + ?Sized>(rng: &mut R, me: NodeId, network_size: u8) -> Result<NodeId> {
    let mut dest = rng.gen_range(1..=network_size.max(1));
    if dest == me.get() {
        dest = if dest != network_size { dest + 1 } else { 1 };
    }
    NodeId::new(dest)
}

/// A generated data packet from `me`
pub fn random_packet<R: Rng + ?Sized>(rng: &mut R, me: NodeId, network_size: u8) -> Result<DataPacket> {
    let dest = random_destination(rng, me, network_size)?;
    Ok(DataPacket::new(dest, random_payload(rng)))
}

/// Initial delay in ticks, uniform in `0..interval`
pub fn initial_jitter<R: Rng + ?Sized>(rng: &mut R, interval: u16) -> u16 {
    if interval == 0 {
        0
    } else {
        rng.gen_range(0..interval)
    }
}

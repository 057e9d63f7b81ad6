//! Sample Buffer Ring: a fixed-size slot array per receive worker, each slot
//! holding one captured packet plus an atomic in-use flag.
//!
//! Claim/release use a CAS loop and relaxed-to-acquire/release ordering, the
//! same pattern this codebase's index ring and slab pool use for their hot
//! paths. No internal index arithmetic is exposed beyond `offset_of`; the
//! owning receive worker is the sole producer and the owning recorder is the
//! sole consumer for a given antenna's slots.

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicU8, Ordering};

use crate::packet::PacketHeader;

pub const FLAG_FREE: u8 = 0;
pub const FLAG_OWNED: u8 = 1;

/// Number of frames of history kept per receive worker before slots start
/// wrapping around and being reclaimed.
pub const DEFAULT_SAMPLE_BUFFER_FRAME_NUM: usize = 16;

/// A per-receive-worker ring of packet slots.
///
/// Capacity is `frame_num * symbols_per_frame * antennas_per_worker`. Each
/// slot stores a packet header plus raw IQ payload in a contiguous byte
/// buffer, paired with a parallel array of atomic flags. Storage is an
/// `UnsafeCell`, the same structure-of-arrays-owned-by-the-ring shape this
/// codebase's slab pool uses: the flag array is the real synchronization,
/// and `write_packet`/`read_packet` trust the claim/release protocol rather
/// than the borrow checker.
pub struct SampleBufferRing {
    packet_size: usize,
    capacity: usize,
    storage: UnsafeCell<Vec<u8>>,
    flags: Vec<AtomicU8>,
}

// SAFETY: slots are disjoint byte ranges of `storage`; the claim/release
// flag protocol guarantees at most one producer and one consumer ever touch
// a given slot's range at a time.
unsafe impl Sync for SampleBufferRing {}

impl SampleBufferRing {
    pub fn new(frame_num: usize, symbols_per_frame: usize, antennas_per_worker: usize, packet_size: usize) -> Self {
        let capacity = frame_num * symbols_per_frame * antennas_per_worker;
        let storage = UnsafeCell::new(vec![0u8; capacity * packet_size]);
        let flags = (0..capacity).map(|_| AtomicU8::new(FLAG_FREE)).collect();
        Self {
            packet_size,
            capacity,
            storage,
            flags,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn packet_size(&self) -> usize {
        self.packet_size
    }

    /// Byte offset of packet slot `pkt_idx` within the backing buffer.
    pub fn offset_of(&self, pkt_idx: usize) -> usize {
        (pkt_idx % self.capacity) * self.packet_size
    }

    /// Atomically transitions slot `slot_idx` from free (0) to owned (1).
    /// Returns `false` if the slot was already owned (backpressure signal).
    pub fn claim(&self, slot_idx: usize) -> bool {
        let idx = slot_idx % self.capacity;
        self.flags[idx]
            .compare_exchange(FLAG_FREE, FLAG_OWNED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Releases slot `slot_idx` back to free. Idempotent: releasing an
    /// already-free slot is a no-op observed by the next claimant.
    pub fn release(&self, slot_idx: usize) {
        let idx = slot_idx % self.capacity;
        self.flags[idx].store(FLAG_FREE, Ordering::Release);
    }

    pub fn is_owned(&self, slot_idx: usize) -> bool {
        self.flags[slot_idx % self.capacity].load(Ordering::Acquire) == FLAG_OWNED
    }

    /// Number of slots currently owned (non-free). Used by tests to check
    /// the ring invariant, not on any hot path.
    pub fn owned_count(&self) -> usize {
        self.flags
            .iter()
            .filter(|f| f.load(Ordering::Acquire) == FLAG_OWNED)
            .count()
    }

    /// Writes `header` and `iq_bytes` into the slot at `pkt_idx`. Caller must
    /// have already claimed the slot and must be the sole producer for it.
    pub fn write_packet(&self, pkt_idx: usize, header: &PacketHeader, iq_bytes: &[u8]) {
        let offset = self.offset_of(pkt_idx);
        // SAFETY: caller owns this slot exclusively per the claim protocol.
        let buf = unsafe { &mut (&mut *self.storage.get())[offset..offset + self.packet_size] };
        buf[0..4].copy_from_slice(&header.frame_id.to_le_bytes());
        buf[4..8].copy_from_slice(&header.slot_id.to_le_bytes());
        buf[8..10].copy_from_slice(&header.cell_id.to_le_bytes());
        buf[10..14].copy_from_slice(&header.antenna_id.to_le_bytes());
        let payload = &mut buf[PacketHeader::SIZE..];
        let n = iq_bytes.len().min(payload.len());
        payload[..n].copy_from_slice(&iq_bytes[..n]);
    }

    /// Reads the header and IQ payload back out of the slot at `pkt_idx`.
    /// Caller must be the sole consumer for this slot (the owning recorder).
    pub fn read_packet(&self, pkt_idx: usize) -> (PacketHeader, Vec<u8>) {
        let offset = self.offset_of(pkt_idx);
        // SAFETY: caller owns this slot exclusively per the claim protocol.
        let buf = unsafe { &(&*self.storage.get())[offset..offset + self.packet_size] };
        let header = PacketHeader {
            frame_id: u32::from_le_bytes(buf[0..4].try_into().unwrap()),
            slot_id: u32::from_le_bytes(buf[4..8].try_into().unwrap()),
            cell_id: u16::from_le_bytes(buf[8..10].try_into().unwrap()),
            antenna_id: u32::from_le_bytes(buf[10..14].try_into().unwrap()),
        };
        (header, buf[PacketHeader::SIZE..].to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn claim_then_release_roundtrip() {
        let ring = SampleBufferRing::new(2, 2, 2, 32);
        assert!(ring.claim(0));
        assert!(!ring.claim(0));
        ring.release(0);
        assert!(ring.claim(0));
    }

    #[test]
    fn offset_wraps_at_capacity() {
        let ring = SampleBufferRing::new(1, 1, 1, 16);
        assert_eq!(ring.capacity(), 1);
        assert_eq!(ring.offset_of(0), 0);
        assert_eq!(ring.offset_of(1), 0);
    }

    #[test]
    fn write_read_roundtrip() {
        let ring = SampleBufferRing::new(1, 1, 1, PacketHeader::SIZE + 8);
        let header = PacketHeader {
            frame_id: 7,
            slot_id: 3,
            cell_id: 1,
            antenna_id: 2,
        };
        ring.write_packet(0, &header, &[1, 2, 3, 4, 5, 6, 7, 8]);
        let (got_header, payload) = ring.read_packet(0);
        assert_eq!(got_header, header);
        assert_eq!(payload, vec![1, 2, 3, 4, 5, 6, 7, 8]);
    }

    #[test]
    fn ring_invariant_matches_claims_minus_releases() {
        let ring = SampleBufferRing::new(1, 1, 4, 16);
        assert!(ring.claim(0));
        assert!(ring.claim(1));
        assert_eq!(ring.owned_count(), 2);
        ring.release(0);
        assert_eq!(ring.owned_count(), 1);
    }
}

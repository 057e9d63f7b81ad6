//! Fixed-layout records carried through the ring, the dispatch queue, and
//! the per-recorder input queues.

use num_complex::Complex;

/// Header embedded at the front of every ring slot, followed by the raw IQ
/// payload (`2 * samps_per_symbol` interleaved `i16` samples).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketHeader {
    pub frame_id: u32,
    pub slot_id: u32,
    pub cell_id: u16,
    pub antenna_id: u32,
}

impl PacketHeader {
    pub const SIZE: usize = 4 + 4 + 2 + 4;
}

/// One captured symbol's header plus its IQ payload.
#[derive(Debug, Clone)]
pub struct Packet {
    pub header: PacketHeader,
    pub iq: Vec<Complex<i16>>,
}

impl Packet {
    pub fn payload_len_bytes(samps_per_symbol: usize) -> usize {
        2 * samps_per_symbol * std::mem::size_of::<i16>()
    }
}

/// Event type carried by the dispatch queue. Only `RxSymbol` flows through
/// the core queue; the enum exists so the wire-equivalent POD shape matches
/// the source system's event table even though only one variant is live.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchEventKind {
    RxSymbol,
}

/// Fixed-size event enqueued by a receive worker and drained by the
/// dispatcher.
#[derive(Debug, Clone, Copy)]
pub struct DispatchEvent {
    pub event_type: DispatchEventKind,
    pub antenna_id: u32,
    pub ring_offset: usize,
}

/// Command kind understood by a recorder worker's input queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    Record,
    Stop,
}

/// One entry on a recorder's bounded input queue.
#[derive(Debug, Clone, Copy)]
pub struct RecordEvent {
    pub kind: RecordKind,
    pub ring_offset: usize,
    pub ring_base: usize,
    pub ring_size: usize,
}

impl RecordEvent {
    pub fn record(ring_offset: usize, ring_base: usize, ring_size: usize) -> Self {
        Self {
            kind: RecordKind::Record,
            ring_offset,
            ring_base,
            ring_size,
        }
    }

    pub fn stop() -> Self {
        Self {
            kind: RecordKind::Stop,
            ring_offset: 0,
            ring_base: 0,
            ring_size: 0,
        }
    }
}

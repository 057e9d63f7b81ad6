//! Radio Transceiver capability: the abstract SDR driver boundary the
//! receive pipeline calls through.
//!
//! The production driver layer (two mutually exclusive hardware backends)
//! is external to this crate. `ReplayRadio` is a deterministic in-memory
//! implementation used by tests and local runs in its place.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;

use num_complex::Complex;

use crate::packet::PacketHeader;

/// One symbol captured for a single antenna.
#[derive(Debug, Clone)]
pub struct CapturedSymbol {
    pub header: PacketHeader,
    pub iq: Vec<Complex<i16>>,
}

/// Abstract capability consumed by the Receiver Pool.
pub trait RadioTransceiver: Send + Sync {
    /// Blocks until one symbol is available for `antenna_id`.
    fn recv_symbol(&self, antenna_id: u32) -> CapturedSymbol;

    /// Transmit-only beam-sweep loop, used when no schedule has a pilot or
    /// uplink slot and no receive/record pool is created. Implementations
    /// loop internally, observing `running`, and return once it clears.
    fn go(&self, running: &AtomicBool);
}

/// Deterministic, in-memory radio used for tests and local runs: each call
/// to `recv_symbol` synthesizes a symbol from a monotonically increasing
/// per-antenna frame counter instead of reading hardware.
pub struct ReplayRadio {
    samps_per_symbol: usize,
    counters: Vec<AtomicU32>,
    go_iterations: AtomicU32,
}

impl ReplayRadio {
    pub fn new(total_antennas: usize, samps_per_symbol: usize) -> Self {
        let counters = (0..total_antennas).map(|_| AtomicU32::new(0)).collect();
        Self {
            samps_per_symbol,
            counters,
            go_iterations: AtomicU32::new(0),
        }
    }

    /// Number of beam-sweep loop iterations `go` has run, for tests.
    pub fn go_iterations(&self) -> u32 {
        self.go_iterations.load(Ordering::Relaxed)
    }
}

impl RadioTransceiver for ReplayRadio {
    fn recv_symbol(&self, antenna_id: u32) -> CapturedSymbol {
        let idx = antenna_id as usize % self.counters.len().max(1);
        let frame_id = self.counters[idx].fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        let iq = (0..self.samps_per_symbol)
            .map(|k| Complex::new((k % 127) as i16, ((k + antenna_id as usize) % 127) as i16))
            .collect();
        CapturedSymbol {
            header: PacketHeader {
                frame_id,
                slot_id: 0,
                cell_id: 0,
                antenna_id,
            },
            iq,
        }
    }

    fn go(&self, running: &AtomicBool) {
        while running.load(Ordering::Acquire) {
            self.go_iterations.fetch_add(1, Ordering::Relaxed);
            std::thread::sleep(Duration::from_millis(5));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn replay_radio_advances_per_antenna_frame_counter() {
        let radio = ReplayRadio::new(2, 8);
        let first = radio.recv_symbol(0);
        let second = radio.recv_symbol(0);
        assert_eq!(first.header.frame_id, 0);
        assert_eq!(second.header.frame_id, 1);
        assert_eq!(first.iq.len(), 8);
    }

    #[test]
    fn go_loops_until_running_clears() {
        let radio = Arc::new(ReplayRadio::new(1, 8));
        let running = Arc::new(AtomicBool::new(true));

        let go_radio = radio.clone();
        let go_running = running.clone();
        let handle = std::thread::spawn(move || go_radio.go(&go_running));

        std::thread::sleep(Duration::from_millis(30));
        running.store(false, Ordering::Release);
        handle.join().unwrap();

        assert!(radio.go_iterations() >= 1);
    }
}

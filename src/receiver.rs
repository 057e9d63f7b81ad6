//! Receiver Pool: N workers, each reading IQ from an owned antenna range,
//! writing into its Sample Buffer Ring, and emitting `RxSymbol` events.
//!
//! Worker lifecycle mirrors this codebase's router thread: an
//! `Arc<AtomicBool>` stop flag, a spin-then-yield claim loop for
//! backpressure, and a `Drop` impl that joins every worker so shutdown is
//! never left dangling.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::affinity::Affinity;
use crate::dispatch::DispatchQueue;
use crate::packet::{DispatchEvent, DispatchEventKind};
use crate::radio::RadioTransceiver;
use crate::ring::SampleBufferRing;

/// Default number of receive workers, subject to the core-availability
/// rule in `plan_worker_count`.
pub const RX_THREAD_NUM_DEFAULT: usize = 2;

/// Number of spin iterations attempted before falling back to a short
/// sleep while waiting for a ring slot to free up.
const CLAIM_SPIN_ITERS: usize = 200;

/// Decides the receive worker count per the core-availability and
/// reciprocal-calibration rules. `desired_threads` is the configured
/// `rx_thread_num`, defaulting to [`RX_THREAD_NUM_DEFAULT`] when unset.
pub fn plan_worker_count(
    desired_threads: usize,
    total_sdrs: usize,
    available_cores: usize,
    reciprocal_calibration: bool,
) -> usize {
    if reciprocal_calibration {
        return 2;
    }
    let desired = desired_threads.min(total_sdrs.max(1));
    if 2 * desired_threads <= available_cores {
        desired
    } else {
        1
    }
}

/// Aggregate counters for a running receiver pool, all relaxed atomics
/// snapshotted on demand.
#[derive(Default)]
pub struct ReceiverMetrics {
    pub symbols_captured: AtomicU64,
    pub dispatch_drops: AtomicU64,
}

impl ReceiverMetrics {
    pub fn snapshot(&self) -> (u64, u64) {
        (
            self.symbols_captured.load(Ordering::Relaxed),
            self.dispatch_drops.load(Ordering::Relaxed),
        )
    }
}

struct Worker {
    stop_flag: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

/// Owns the per-worker threads reading from a shared radio and ring.
pub struct ReceiverPool {
    workers: Vec<Worker>,
    pub metrics: Arc<ReceiverMetrics>,
}

#[allow(clippy::too_many_arguments)]
impl ReceiverPool {
    /// Starts `worker_count` workers, worker `w` owning antennas
    /// `[w*antennas_per_worker, (w+1)*antennas_per_worker)`. Ranges that run
    /// past `total_antennas` are benign: that worker idles.
    pub fn start(
        worker_count: usize,
        antennas_per_worker: usize,
        total_antennas: usize,
        radio: Arc<dyn RadioTransceiver>,
        ring: Arc<SampleBufferRing>,
        queue: Arc<DispatchQueue>,
        affinity: Arc<dyn Affinity>,
        base_core: usize,
    ) -> Self {
        let metrics = Arc::new(ReceiverMetrics::default());
        let mut workers = Vec::with_capacity(worker_count);

        for w in 0..worker_count {
            let stop_flag = Arc::new(AtomicBool::new(false));
            let worker_stop = stop_flag.clone();
            let radio = radio.clone();
            let ring = ring.clone();
            let queue = queue.clone();
            let affinity = affinity.clone();
            let metrics = metrics.clone();

            let start = w * antennas_per_worker;
            let end = ((w + 1) * antennas_per_worker).min(total_antennas.max(start));

            let handle = thread::Builder::new()
                .name(format!("sounder-rx-{w}"))
                .spawn(move || {
                    affinity.pin_current_thread(base_core + w);
                    receive_loop(&worker_stop, start, end, &radio, &ring, &queue, &metrics);
                })
                .expect("failed to spawn receive worker");

            workers.push(Worker {
                stop_flag,
                handle: Some(handle),
            });
        }

        Self { workers, metrics }
    }

    /// Signals every worker to stop and joins them, per the shutdown order
    /// contract (receive workers exit before the receiver is dropped).
    pub fn stop(&mut self) {
        for worker in &self.workers {
            worker.stop_flag.store(true, Ordering::Release);
        }
        for worker in &mut self.workers {
            if let Some(handle) = worker.handle.take() {
                let _ = handle.join();
            }
        }
    }
}

impl Drop for ReceiverPool {
    fn drop(&mut self) {
        self.stop();
    }
}

fn receive_loop(
    stop_flag: &AtomicBool,
    antenna_start: usize,
    antenna_end: usize,
    radio: &Arc<dyn RadioTransceiver>,
    ring: &Arc<SampleBufferRing>,
    queue: &Arc<DispatchQueue>,
    metrics: &ReceiverMetrics,
) {
    if antenna_end <= antenna_start {
        // Tail worker with no owned antennas: idle until shutdown.
        while !stop_flag.load(Ordering::Acquire) {
            thread::sleep(Duration::from_millis(10));
        }
        return;
    }

    let mut next_slot: usize = antenna_start;

    while !stop_flag.load(Ordering::Acquire) {
        for antenna in antenna_start..antenna_end {
            if stop_flag.load(Ordering::Acquire) {
                return;
            }
            let captured = radio.recv_symbol(antenna as u32);

            let slot_idx = next_slot;
            next_slot = next_slot.wrapping_add(1);
            claim_with_backpressure(ring, slot_idx, stop_flag);

            let iq_bytes: Vec<u8> = captured
                .iq
                .iter()
                .flat_map(|s| [s.re.to_le_bytes(), s.im.to_le_bytes()])
                .flatten()
                .collect();

            ring.write_packet(slot_idx, &captured.header, &iq_bytes);

            metrics.symbols_captured.fetch_add(1, Ordering::Relaxed);

            let event = DispatchEvent {
                event_type: DispatchEventKind::RxSymbol,
                antenna_id: antenna as u32,
                ring_offset: ring.offset_of(slot_idx),
            };
            if queue.try_push(event).is_err() {
                tracing::warn!(antenna, slot_idx, "dispatch queue full, dropping capture");
                metrics.dispatch_drops.fetch_add(1, Ordering::Relaxed);
                ring.release(slot_idx);
            }
        }
    }
}

fn claim_with_backpressure(ring: &SampleBufferRing, slot_idx: usize, stop_flag: &AtomicBool) {
    for _ in 0..CLAIM_SPIN_ITERS {
        if ring.claim(slot_idx) {
            return;
        }
        if stop_flag.load(Ordering::Acquire) {
            return;
        }
        std::hint::spin_loop();
    }
    while !ring.claim(slot_idx) {
        if stop_flag.load(Ordering::Acquire) {
            return;
        }
        thread::yield_now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn worker_count_defaults_when_cores_plentiful() {
        assert_eq!(
            plan_worker_count(RX_THREAD_NUM_DEFAULT, 8, 64, false),
            RX_THREAD_NUM_DEFAULT
        );
    }

    #[test]
    fn worker_count_forced_to_one_when_cores_scarce() {
        assert_eq!(plan_worker_count(RX_THREAD_NUM_DEFAULT, 8, 2, false), 1);
    }

    #[test]
    fn worker_count_forced_to_two_in_reciprocal_mode() {
        assert_eq!(plan_worker_count(RX_THREAD_NUM_DEFAULT, 8, 2, true), 2);
    }
}

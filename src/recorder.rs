//! Recorder Pool: M workers, each owning an antenna shard, draining its
//! input queue and appending to the Trace Sink.
//!
//! The per-worker config/stats shape mirrors
//! `hdds_recording::recorder::{RecorderConfig, RecordingStats}`; lifecycle
//! (start/stop, lazy-open-on-first-append) mirrors `Recorder::start/stop`.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam::queue::ArrayQueue;

use crate::affinity::Affinity;
use crate::error::RecorderError;
use crate::packet::{RecordEvent, RecordKind};
use crate::ring::SampleBufferRing;
use crate::trace_sink::TraceSink;

const SPIN_ITERS: usize = 200;
const SLEEP_QUANTUM: Duration = Duration::from_micros(100);

/// Configuration for a single recorder worker, built with fluent setters.
#[derive(Debug, Clone)]
pub struct RecorderWorkerConfig {
    pub shard_start: usize,
    pub shard_end: usize,
    pub core_id: Option<usize>,
    pub queue_capacity: usize,
}

impl RecorderWorkerConfig {
    pub fn new(shard_start: usize, shard_end: usize) -> Self {
        Self {
            shard_start,
            shard_end,
            core_id: None,
            queue_capacity: 256,
        }
    }

    pub fn with_core_id(mut self, core_id: usize) -> Self {
        self.core_id = Some(core_id);
        self
    }

    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }
}

/// Running totals for one recorder worker, all relaxed atomics.
#[derive(Default)]
pub struct RecordingStats {
    pub records_written: AtomicU64,
    pub max_frame_number: AtomicU32,
}

impl RecordingStats {
    pub fn snapshot(&self) -> (u64, u32) {
        (
            self.records_written.load(Ordering::Relaxed),
            self.max_frame_number.load(Ordering::Relaxed),
        )
    }

    fn observe_frame(&self, frame_id: u32) {
        self.max_frame_number.fetch_max(frame_id, Ordering::Relaxed);
    }
}

/// One running recorder worker.
pub struct RecorderWorker {
    pub input_queue: Arc<ArrayQueue<RecordEvent>>,
    pub stats: Arc<RecordingStats>,
    handle: Option<JoinHandle<Result<(), RecorderError>>>,
}

impl RecorderWorker {
    pub fn start(
        config: RecorderWorkerConfig,
        ring: Arc<SampleBufferRing>,
        mut sink: Box<dyn TraceSink>,
        cell_id: u16,
        affinity: Arc<dyn Affinity>,
    ) -> Self {
        let input_queue = Arc::new(ArrayQueue::new(config.queue_capacity));
        let stats = Arc::new(RecordingStats::default());

        let worker_queue = input_queue.clone();
        let worker_stats = stats.clone();
        let core_id = config.core_id;

        let handle = thread::Builder::new()
            .name(format!("sounder-recorder-{}", config.shard_start))
            .spawn(move || {
                if let Some(core) = core_id {
                    affinity.pin_current_thread(core);
                }
                recorder_loop(&worker_queue, &ring, sink.as_mut(), cell_id, &worker_stats)
            })
            .expect("failed to spawn recorder worker");

        Self {
            input_queue,
            stats,
            handle: Some(handle),
        }
    }

    /// Sends the `Stop` event and joins the worker, surfacing any trace-sink
    /// error the worker hit while flushing.
    pub fn stop(&mut self) -> Result<(), RecorderError> {
        enqueue_with_backpressure(&self.input_queue, RecordEvent::stop());
        if let Some(handle) = self.handle.take() {
            return handle.join().unwrap_or(Ok(()));
        }
        Ok(())
    }
}

impl Drop for RecorderWorker {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

fn recorder_loop(
    queue: &ArrayQueue<RecordEvent>,
    ring: &SampleBufferRing,
    sink: &mut dyn TraceSink,
    cell_id: u16,
    stats: &RecordingStats,
) -> Result<(), RecorderError> {
    loop {
        let event = match dequeue_with_backpressure(queue) {
            Some(ev) => ev,
            None => continue,
        };

        match event.kind {
            RecordKind::Record => {
                let pkt_idx = event.ring_offset / ring.packet_size().max(1);
                let (header, payload) = ring.read_packet(pkt_idx);
                sink.append(cell_id, header.frame_id, header.slot_id, header.antenna_id, &payload)?;
                ring.release(pkt_idx);
                stats.records_written.fetch_add(1, Ordering::Relaxed);
                stats.observe_frame(header.frame_id);
            }
            RecordKind::Stop => {
                sink.flush()?;
                sink.close()?;
                return Ok(());
            }
        }
    }
}

fn dequeue_with_backpressure(queue: &ArrayQueue<RecordEvent>) -> Option<RecordEvent> {
    for _ in 0..SPIN_ITERS {
        if let Some(ev) = queue.pop() {
            return Some(ev);
        }
        std::hint::spin_loop();
    }
    thread::sleep(SLEEP_QUANTUM);
    queue.pop()
}

/// Retries `push` spin-then-sleep until it is accepted. A bounded queue can
/// be momentarily full under backpressure; the `Stop` sentinel must never be
/// dropped or the worker's `handle.join()` blocks forever.
fn enqueue_with_backpressure(queue: &ArrayQueue<RecordEvent>, mut event: RecordEvent) {
    loop {
        for _ in 0..SPIN_ITERS {
            match queue.push(event) {
                Ok(()) => return,
                Err(rejected) => {
                    event = rejected;
                    std::hint::spin_loop();
                }
            }
        }
        thread::sleep(SLEEP_QUANTUM);
    }
}

/// Computes the per-recorder antenna shard width `A_r = ceil(total / m)`.
pub fn shard_width(total_antennas: usize, recorder_count: usize) -> usize {
    total_antennas.div_ceil(recorder_count.max(1))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shard_width_rounds_up() {
        assert_eq!(shard_width(16, 4), 4);
        assert_eq!(shard_width(17, 4), 5);
    }

    #[test]
    fn config_builder_sets_fields() {
        let cfg = RecorderWorkerConfig::new(0, 4).with_core_id(3).with_queue_capacity(128);
        assert_eq!(cfg.shard_start, 0);
        assert_eq!(cfg.shard_end, 4);
        assert_eq!(cfg.core_id, Some(3));
        assert_eq!(cfg.queue_capacity, 128);
    }
}

//! Dispatcher: a single thread that drains the Dispatch Queue in bulk and
//! routes each `RxSymbol` event to the antenna's owning recorder.
//!
//! Grounded on this codebase's router loop: a fast-path drain, a bounded
//! spin before yielding, and a hard-fatal response to a saturated output
//! queue (never silently dropped, unlike the receive side).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam::queue::ArrayQueue;

use crate::affinity::Affinity;
use crate::dispatch::DispatchQueue;
use crate::error::SetupError;
use crate::packet::{DispatchEvent, RecordEvent};

const SPIN_ITERS: usize = 200;
const SLEEP_QUANTUM: Duration = Duration::from_micros(100);

/// Computes which recorder owns `antenna_id`, given `antennas_per_recorder`.
pub fn recorder_for_antenna(antenna_id: u32, antennas_per_recorder: usize) -> usize {
    antenna_id as usize / antennas_per_recorder.max(1)
}

/// Owns the single dispatcher thread.
pub struct Dispatcher {
    stop_flag: Arc<AtomicBool>,
    handle: Option<JoinHandle<Result<(), SetupError>>>,
}

impl Dispatcher {
    /// Starts the dispatcher loop. `running` is the process-wide flag; the
    /// loop exits within one bulk-dequeue cycle of it clearing.
    pub fn start(
        running: Arc<AtomicBool>,
        queue: Arc<DispatchQueue>,
        recorder_queues: Vec<Arc<ArrayQueue<RecordEvent>>>,
        antennas_per_recorder: usize,
        ring_base: usize,
        ring_size: usize,
        affinity: Arc<dyn Affinity>,
        main_dispatch_core: usize,
    ) -> Self {
        let stop_flag = Arc::new(AtomicBool::new(false));
        let worker_stop = stop_flag.clone();

        let handle = thread::Builder::new()
            .name("sounder-dispatch".to_string())
            .spawn(move || {
                affinity.pin_current_thread(main_dispatch_core);
                dispatch_loop(
                    &running,
                    &worker_stop,
                    &queue,
                    &recorder_queues,
                    antennas_per_recorder,
                    ring_base,
                    ring_size,
                )
            })
            .expect("failed to spawn dispatcher thread");

        Self {
            stop_flag,
            handle: Some(handle),
        }
    }

    /// Joins the dispatcher thread, propagating a fatal enqueue error if one
    /// occurred.
    pub fn join(&mut self) -> Result<(), SetupError> {
        self.stop_flag.store(true, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            return handle.join().unwrap_or(Ok(()));
        }
        Ok(())
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        let _ = self.join();
    }
}

fn dispatch_loop(
    running: &AtomicBool,
    stop_flag: &AtomicBool,
    queue: &DispatchQueue,
    recorder_queues: &[Arc<ArrayQueue<RecordEvent>>],
    antennas_per_recorder: usize,
    ring_base: usize,
    ring_size: usize,
) -> Result<(), SetupError> {
    let mut batch: Vec<DispatchEvent> = Vec::with_capacity(crate::dispatch::K_DEQUEUE_BULK_SIZE);

    while running.load(Ordering::Acquire) && !stop_flag.load(Ordering::Acquire) {
        batch.clear();
        let drained = queue.drain_bulk(&mut batch);

        if drained == 0 {
            if !spin_then_rest(running, stop_flag) {
                break;
            }
            continue;
        }

        for event in batch.drain(..) {
            route_event(event, recorder_queues, antennas_per_recorder, ring_base, ring_size)?;
        }
    }

    // Drain anything left once shutdown begins, per the shutdown contract
    // (dispatcher exits within one bulk-dequeue cycle of `running` clearing).
    loop {
        batch.clear();
        let drained = queue.drain_bulk(&mut batch);
        if drained == 0 {
            break;
        }
        for event in batch.drain(..) {
            route_event(event, recorder_queues, antennas_per_recorder, ring_base, ring_size)?;
        }
    }

    Ok(())
}

fn route_event(
    event: DispatchEvent,
    recorder_queues: &[Arc<ArrayQueue<RecordEvent>>],
    antennas_per_recorder: usize,
    ring_base: usize,
    ring_size: usize,
) -> Result<(), SetupError> {
    let recorder_idx = recorder_for_antenna(event.antenna_id, antennas_per_recorder);
    let queue = recorder_queues
        .get(recorder_idx)
        .ok_or(SetupError::DispatchEnqueueFailed(recorder_idx))?;

    queue
        .push(RecordEvent::record(event.ring_offset, ring_base, ring_size))
        .map_err(|_| SetupError::DispatchEnqueueFailed(recorder_idx))
}

/// Returns `false` once `running` has cleared and the caller should stop
/// spinning for more work.
fn spin_then_rest(running: &AtomicBool, stop_flag: &AtomicBool) -> bool {
    for _ in 0..SPIN_ITERS {
        if !running.load(Ordering::Acquire) || stop_flag.load(Ordering::Acquire) {
            return false;
        }
        std::hint::spin_loop();
    }
    thread::sleep(SLEEP_QUANTUM);
    running.load(Ordering::Acquire) && !stop_flag.load(Ordering::Acquire)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn s5_dispatch_routing_four_recorders_sixteen_antennas() {
        for antenna in 0..16u32 {
            let recorder = recorder_for_antenna(antenna, 4);
            assert_eq!(recorder, (antenna / 4) as usize);
        }
    }
}

//! Lifecycle Controller: boots the pools in dependency order, runs until
//! signaled, drains, and tears down.
//!
//! Startup order: config -> waveforms -> (optional) uplink data -> ring +
//! dispatch queue + receiver -> recorder pool -> receive pool (or
//! beam-sweep loop) -> dispatcher. Shutdown is the symmetric reverse, with
//! the `running` flag as the single cancellation signal every worker
//! observes, matching the re-architecture note to model it as an explicit
//! token rather than ambient global state.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam::queue::ArrayQueue;

use crate::affinity::{self, Affinity};
use crate::config::SounderConfig;
use crate::dispatch::DispatchQueue;
use crate::dispatcher::Dispatcher;
use crate::error::SounderError;
use crate::packet::RecordEvent;
use crate::radio::RadioTransceiver;
use crate::receiver::{self, ReceiverPool};
use crate::recorder::{self, RecorderWorker, RecorderWorkerConfig};
use crate::ring::{SampleBufferRing, DEFAULT_SAMPLE_BUFFER_FRAME_NUM};
use crate::schedule::{generate_reciprocal_schedule, CellSchedule};
use crate::trace_sink::{FileTraceSink, ModeTag, TraceSink};
use crate::waveform::{compose_beacon, compose_pilot, load_uplink_data, Beacon, Pilot, UplinkData};

const MAIN_DISPATCH_CORE: usize = 0;
const RECORDER_CORE_BASE: usize = 1;

/// Cancellation token shared by every worker the controller owns. A weak
/// reference is all an external signal handler needs to request shutdown.
#[derive(Clone)]
pub struct RunningFlag(Arc<AtomicBool>);

impl RunningFlag {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(true)))
    }

    pub fn is_running(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    pub fn stop(&self) {
        self.0.store(false, Ordering::Release);
    }

    pub fn shared(&self) -> Arc<AtomicBool> {
        self.0.clone()
    }
}

impl Default for RunningFlag {
    fn default() -> Self {
        Self::new()
    }
}

/// Waveforms composed once at startup and never mutated afterward.
pub struct ComposedWaveforms {
    pub beacon: Beacon,
    pub pilot: Pilot,
}

/// Builds one [`CellSchedule`] per cell (reciprocal-calibration-generated or
/// uniform) plus one for the client population, if any.
fn build_schedules(config: &SounderConfig) -> Result<Vec<CellSchedule>, SounderError> {
    let mut schedules = Vec::with_capacity(config.cells.len() + 1);
    for cell in &config.cells {
        if let Some(recip) = config.reciprocal_calibration {
            let frames = generate_reciprocal_schedule(cell.sdr_ids.len(), recip.ref_sdr_index, cell.channel_mask.channel_count())?;
            schedules.push(CellSchedule::per_sdr(frames)?);
        } else {
            schedules.push(CellSchedule::uniform(&cell.frame_schedule)?);
        }
    }
    if let Some(clients) = &config.clients {
        schedules.push(CellSchedule::uniform(&clients.frame_schedule)?);
    }
    Ok(schedules)
}

/// Loads one client SDR's worth of uplink data per client, if the config has
/// a client population, at least one schedule has a `U` slot, and
/// `ul_data_dir` is configured. Returns an empty vec otherwise.
fn load_client_uplink_data(config: &SounderConfig, schedules: &[CellSchedule]) -> Result<Vec<UplinkData>, SounderError> {
    let Some(clients) = &config.clients else {
        return Ok(Vec::new());
    };
    if !schedules.iter().any(CellSchedule::has_uplink) {
        return Ok(Vec::new());
    }
    let Some(dir) = &config.ul_data_dir else {
        return Ok(Vec::new());
    };

    let client_schedule = CellSchedule::uniform(&clients.frame_schedule)?;
    let ul_slots: Vec<usize> = (0..client_schedule.frame_len())
        .filter(|&slot| client_schedule.role_at(0, slot) == Some('U'))
        .collect();

    let mut loaded = Vec::with_capacity(clients.sdr_ids.len());
    for sdr_index in 0..clients.sdr_ids.len() {
        let data = load_uplink_data(
            Path::new(dir),
            &config.modulation,
            config.subcarrier_num,
            &config.phy,
            &ul_slots,
            config.ul_data_frame_num,
            clients.channel_mask.channel_count(),
            sdr_index,
        )?;
        loaded.push(data);
    }
    Ok(loaded)
}

/// Owns every pool and resource for one run of the ingest pipeline. In
/// beam-sweep-only mode (no cell or client schedule has a pilot or uplink
/// slot) `ring`/`dispatch_queue`/`receiver_pool`/`dispatcher`/`recorders`
/// are absent and `beam_sweep` instead owns the dedicated transmit thread.
pub struct SounderRuntime {
    running: RunningFlag,
    ring: Option<Arc<SampleBufferRing>>,
    dispatch_queue: Option<Arc<DispatchQueue>>,
    receiver_pool: Option<ReceiverPool>,
    dispatcher: Option<Dispatcher>,
    recorders: Vec<RecorderWorker>,
    beam_sweep: Option<JoinHandle<()>>,
    pub waveforms: ComposedWaveforms,
    pub uplink_data: Vec<UplinkData>,
}

impl SounderRuntime {
    /// Builds and starts the pipeline for `config`, using `radio` as the
    /// capture source and opening one `FileTraceSink` directory for the
    /// whole run. `mode_tag` is derived from `config`: reciprocal
    /// calibration wins if configured, then uplink if any schedule has a
    /// `U` slot, else plain. If no schedule has a `P` or `U` slot at all,
    /// no receive/record pool is built and `radio.go` runs a transmit-only
    /// beam-sweep loop instead.
    pub fn start(
        config: &mut SounderConfig,
        radio: Arc<dyn RadioTransceiver>,
        trace_dir: impl AsRef<std::path::Path>,
        run_timestamp: &str,
        available_cores: usize,
    ) -> Result<Self, SounderError> {
        let beacon = compose_beacon(&config.phy)?;
        config.validate_and_clamp(beacon.ci16.len())?;
        let pilot = compose_pilot(&config.phy)?;

        let schedules = build_schedules(config)?;
        let has_pilot_or_uplink = schedules.iter().any(|s| s.has_pilot() || s.has_uplink());

        if !has_pilot_or_uplink {
            tracing::info!("no pilot or uplink slots scheduled, running beam-sweep-only transmit loop");
            let running = RunningFlag::new();
            let go_running = running.shared();
            let handle = thread::Builder::new()
                .name("sounder-beam-sweep".to_string())
                .spawn(move || radio.go(&go_running))
                .expect("failed to spawn beam-sweep thread");

            return Ok(Self {
                running,
                ring: None,
                dispatch_queue: None,
                receiver_pool: None,
                dispatcher: None,
                recorders: Vec::new(),
                beam_sweep: Some(handle),
                waveforms: ComposedWaveforms { beacon, pilot },
                uplink_data: Vec::new(),
            });
        }

        let mode_tag = if config.reciprocal_calibration.is_some() {
            ModeTag::ReciprocalCalib
        } else if schedules.iter().any(CellSchedule::has_uplink) {
            ModeTag::Uplink
        } else {
            ModeTag::Plain
        };
        let uplink_data = load_client_uplink_data(config, &schedules)?;

        let total_antennas = config.total_antennas();
        let recorder_count = config.task_thread_num.max(1);
        let shard = recorder::shard_width(total_antennas, recorder_count);

        let reciprocal = config.reciprocal_calibration.is_some();
        let rx_worker_count = receiver::plan_worker_count(
            config.rx_thread_num,
            config.cells.iter().map(|c| c.sdr_ids.len()).sum(),
            available_cores,
            reciprocal,
        );
        let antennas_per_rx_worker = total_antennas.div_ceil(rx_worker_count.max(1));

        let required_threads = 1 + recorder_count + rx_worker_count;
        let affinity: Arc<dyn Affinity> = Arc::from(affinity::select(config.affinity_enabled, required_threads));

        let packet_size = crate::packet::PacketHeader::SIZE + crate::packet::Packet::payload_len_bytes(config.phy.samps_per_symbol());
        let ring = Arc::new(SampleBufferRing::new(
            DEFAULT_SAMPLE_BUFFER_FRAME_NUM,
            config.phy.symbols_per_subframe,
            total_antennas.max(1),
            packet_size,
        ));
        let dispatch_queue = Arc::new(DispatchQueue::new(ring.capacity()));

        let running = RunningFlag::new();

        // Recorder pool starts before the receive pool: every recorder must
        // be ready to accept `Record` events before a dispatcher can exist
        // to route them.
        let mut recorder_queues: Vec<Arc<ArrayQueue<RecordEvent>>> = Vec::with_capacity(recorder_count);
        let mut recorders = Vec::with_capacity(recorder_count);
        for i in 0..recorder_count {
            let shard_start = i * shard;
            let shard_end = ((i + 1) * shard).min(total_antennas.max(shard_start));
            let sink: Box<dyn TraceSink> = Box::new(
                FileTraceSink::new(&trace_dir, mode_tag, run_timestamp)
                    .map_err(crate::error::SounderError::Recorder)?,
            );
            let worker_config = RecorderWorkerConfig::new(shard_start, shard_end).with_core_id(RECORDER_CORE_BASE + i);
            let worker = RecorderWorker::start(worker_config, ring.clone(), sink, 0, affinity.clone());
            recorder_queues.push(worker.input_queue.clone());
            recorders.push(worker);
        }

        let receiver_pool = ReceiverPool::start(
            rx_worker_count,
            antennas_per_rx_worker,
            total_antennas,
            radio,
            ring.clone(),
            dispatch_queue.clone(),
            affinity.clone(),
            RECORDER_CORE_BASE + recorder_count,
        );

        let dispatcher = Dispatcher::start(
            running.shared(),
            dispatch_queue.clone(),
            recorder_queues,
            shard.max(1),
            0,
            ring.capacity(),
            affinity,
            MAIN_DISPATCH_CORE,
        );

        Ok(Self {
            running,
            ring: Some(ring),
            dispatch_queue: Some(dispatch_queue),
            receiver_pool: Some(receiver_pool),
            dispatcher: Some(dispatcher),
            recorders,
            beam_sweep: None,
            waveforms: ComposedWaveforms { beacon, pilot },
            uplink_data,
        })
    }

    pub fn running_flag(&self) -> RunningFlag {
        self.running.clone()
    }

    /// `None` in beam-sweep-only mode, where no ring is built.
    pub fn ring(&self) -> Option<&Arc<SampleBufferRing>> {
        self.ring.as_ref()
    }

    /// `None` in beam-sweep-only mode, where no dispatch queue is built.
    pub fn dispatch_queue(&self) -> Option<&Arc<DispatchQueue>> {
        self.dispatch_queue.as_ref()
    }

    /// `true` if this runtime is running the transmit-only beam-sweep loop
    /// instead of the full receive/record pipeline.
    pub fn is_beam_sweep_only(&self) -> bool {
        self.beam_sweep.is_some()
    }

    /// Idempotent shutdown: clears `running`, waits for receive workers,
    /// drops the receiver, stops every recorder, and releases ring memory.
    /// Calling this twice is a no-op (the second call finds every handle
    /// already taken).
    pub fn shutdown(&mut self) -> Result<(), SounderError> {
        self.running.stop();

        if let Some(handle) = self.beam_sweep.take() {
            let _ = handle.join();
        }

        if let Some(mut receiver) = self.receiver_pool.take() {
            receiver.stop();
        }

        if let Some(mut dispatcher) = self.dispatcher.take() {
            dispatcher.join().map_err(crate::error::SounderError::Setup)?;
        }

        for recorder in &mut self.recorders {
            recorder.stop().map_err(crate::error::SounderError::Recorder)?;
        }

        Ok(())
    }
}

impl Drop for SounderRuntime {
    fn drop(&mut self) {
        let _ = self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Cell, ChannelMask, PhyParams};
    use crate::radio::ReplayRadio;

    fn config() -> SounderConfig {
        let phy = PhyParams {
            center_freq_hz: 3.5e9,
            sample_rate_hz: 30.72e6,
            nco_offset_hz: 0.0,
            fft_size: 64,
            cp_size: 16,
            symbols_per_subframe: 1,
            prefix: 0,
            postfix: 1000,
        };
        SounderConfig::new(phy)
            .with_cell(Cell {
                sdr_ids: vec!["sdr0".into(), "sdr1".into()],
                channel_mask: ChannelMask::A,
                frame_schedule: "BGPGUGDGN".into(),
            })
            .with_task_thread_num(2)
            .with_rx_thread_num(1)
            .with_affinity_enabled(false)
    }

    #[test]
    fn s6_shutdown_is_idempotent_and_clean() {
        let mut cfg = config();
        let dir = tempfile::tempdir().unwrap();
        let radio = Arc::new(ReplayRadio::new(2, cfg.phy.samps_per_symbol()));

        let mut runtime = SounderRuntime::start(&mut cfg, radio, dir.path(), "20260801", 1).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(20));

        runtime.shutdown().unwrap();
        runtime.shutdown().unwrap();

        assert_eq!(runtime.ring().unwrap().owned_count(), 0);
    }

    #[test]
    fn beam_sweep_only_path_runs_go_and_builds_no_pools() {
        let mut cfg = config();
        cfg.cells[0].frame_schedule = "BGDGNGG".into();
        let dir = tempfile::tempdir().unwrap();
        let radio = Arc::new(ReplayRadio::new(2, cfg.phy.samps_per_symbol()));

        let mut runtime = SounderRuntime::start(&mut cfg, radio.clone(), dir.path(), "20260801", 1).unwrap();
        assert!(runtime.is_beam_sweep_only());
        assert!(runtime.ring().is_none());
        assert!(runtime.dispatch_queue().is_none());

        std::thread::sleep(std::time::Duration::from_millis(30));
        runtime.shutdown().unwrap();

        assert!(radio.go_iterations() >= 1);
    }
}

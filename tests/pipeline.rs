//! Integration tests for the concurrency-sensitive properties that don't
//! fit cleanly as colocated unit tests: ring backpressure under a slow
//! recorder, and a full start/shutdown cycle through the public API.

use std::sync::Arc;
use std::time::Duration;

use sounder::config::{Cell, ChannelMask, PhyParams, SounderConfig};
use sounder::lifecycle::SounderRuntime;
use sounder::radio::ReplayRadio;

fn small_config() -> SounderConfig {
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
            sdr_ids: vec!["sdr0".into(), "sdr1".into(), "sdr2".into(), "sdr3".into()],
            channel_mask: ChannelMask::A,
            frame_schedule: "BGPGUGDGN".into(),
        })
        .with_task_thread_num(4)
        .with_rx_thread_num(1)
        .with_affinity_enabled(false)
}

#[test]
fn s4_ring_backpressure_no_events_lost() {
    let mut cfg = small_config();
    let dir = tempfile::tempdir().unwrap();
    let total_antennas = cfg.total_antennas();
    let radio = Arc::new(ReplayRadio::new(total_antennas, cfg.phy.samps_per_symbol()));

    let mut runtime = SounderRuntime::start(&mut cfg, radio, dir.path(), "20260801_000000", 1).unwrap();

    // Let the pipeline run long enough to push well past the ring's
    // capacity through the dispatch queue and into the recorders.
    std::thread::sleep(Duration::from_millis(200));

    runtime.shutdown().unwrap();

    // After a clean shutdown every slot the receivers claimed must have
    // been released back to the ring.
    assert_eq!(runtime.ring().unwrap().owned_count(), 0);
}

#[test]
fn full_pipeline_starts_and_stops_cleanly() {
    let mut cfg = small_config();
    let dir = tempfile::tempdir().unwrap();
    let total_antennas = cfg.total_antennas();
    assert_eq!(total_antennas, 4);

    let radio = Arc::new(ReplayRadio::new(total_antennas, cfg.phy.samps_per_symbol()));
    let mut runtime = SounderRuntime::start(&mut cfg, radio, dir.path(), "20260801_000001", 1).unwrap();

    std::thread::sleep(Duration::from_millis(50));
    runtime.shutdown().unwrap();

    let entries: Vec<_> = std::fs::read_dir(dir.path().join("20260801_000001"))
        .unwrap()
        .collect();
    assert!(!entries.is_empty(), "expected at least one trace segment file");
}

//! Runtime configuration surface for the sounder core.
//!
//! `SounderConfig` is built with a fluent/builder pattern, mirroring
//! `hdds_recording::recorder::RecorderConfig`. It can be constructed
//! directly by callers or loaded from a minimal JSON rendering via
//! [`SounderConfig::from_json`] for the shipped binaries and tests.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Per-role TX gain caps, in dB.
pub const BASE_STATION_GAIN_CAP: f64 = 81.0;
pub const DEFAULT_UE_GAIN_CAP: f64 = 81.0;

/// Channel mask selecting which RF chains of an SDR are active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChannelMask {
    A,
    B,
    Ab,
}

impl ChannelMask {
    pub fn channel_count(self) -> usize {
        match self {
            ChannelMask::A | ChannelMask::B => 1,
            ChannelMask::Ab => 2,
        }
    }

    pub fn parse(s: &str) -> Result<Self, ConfigError> {
        match s {
            "A" => Ok(ChannelMask::A),
            "B" => Ok(ChannelMask::B),
            "AB" => Ok(ChannelMask::Ab),
            other => Err(ConfigError::InvalidChannelMask(other.to_string())),
        }
    }
}

/// Physical-layer parameters, immutable after config load.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhyParams {
    pub center_freq_hz: f64,
    pub sample_rate_hz: f64,
    pub nco_offset_hz: f64,
    pub fft_size: usize,
    pub cp_size: usize,
    pub symbols_per_subframe: usize,
    pub prefix: usize,
    pub postfix: usize,
}

impl PhyParams {
    pub fn ofdm_symbol_size(&self) -> usize {
        self.fft_size + self.cp_size
    }

    pub fn subframe_size(&self) -> usize {
        self.symbols_per_subframe * self.ofdm_symbol_size()
    }

    pub fn samps_per_symbol(&self) -> usize {
        self.subframe_size() + self.prefix + self.postfix
    }

    /// Clamps `fft_size` to `[64, 2048]` and `cp_size` to `<= 128`, logging a
    /// warning when a clamp actually changes the value.
    pub fn clamp(&mut self) {
        let clamped_fft = self.fft_size.clamp(64, 2048);
        if clamped_fft != self.fft_size {
            tracing::warn!(
                requested = self.fft_size,
                clamped = clamped_fft,
                "fft_size clamped to supported range"
            );
            self.fft_size = clamped_fft;
        }
        let clamped_cp = self.cp_size.min(128);
        if clamped_cp != self.cp_size {
            tracing::warn!(
                requested = self.cp_size,
                clamped = clamped_cp,
                "cp_size clamped to supported maximum"
            );
            self.cp_size = clamped_cp;
        }
    }

    /// Validates `samps_per_symbol >= beacon_size + prefix + postfix`.
    ///
    /// Run after `clamp()`: if both the FFT/CP clamp and this assertion would
    /// fire, report the clamp first (it silently repairs the config) and this
    /// check second (it is fatal), matching the order a caller would observe
    /// a first failing constraint.
    pub fn validate_against_beacon(&self, beacon_size: usize) -> Result<(), ConfigError> {
        let samps = self.samps_per_symbol();
        if samps < beacon_size + self.prefix + self.postfix {
            return Err(ConfigError::SampsPerSymbolTooSmall {
                samps_per_symbol: samps,
                beacon_size,
                prefix: self.prefix,
                postfix: self.postfix,
            });
        }
        Ok(())
    }
}

/// One cell: an ordered set of SDRs sharing a frame schedule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cell {
    pub sdr_ids: Vec<String>,
    pub channel_mask: ChannelMask,
    pub frame_schedule: String,
}

impl Cell {
    pub fn antenna_count(&self) -> usize {
        self.sdr_ids.len() * self.channel_mask.channel_count()
    }
}

/// Optional independent client population, mutually exclusive with
/// reciprocal calibration mode.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientPopulation {
    pub sdr_ids: Vec<String>,
    pub channel_mask: ChannelMask,
    pub frame_schedule: String,
}

/// Reciprocal calibration mode parameters.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ReciprocalCalibration {
    pub ref_sdr_index: usize,
}

/// Per-channel TX gain table plus the cap each entry must respect.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GainTable {
    pub base_station_gain: f64,
    pub ue_gain: f64,
    pub ue_gain_cap: Option<f64>,
}

impl GainTable {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.base_station_gain > BASE_STATION_GAIN_CAP {
            return Err(ConfigError::GainOverCap {
                channel: "base_station".to_string(),
                gain: self.base_station_gain,
                cap: BASE_STATION_GAIN_CAP,
            });
        }
        let ue_cap = self.ue_gain_cap.unwrap_or(DEFAULT_UE_GAIN_CAP);
        if self.ue_gain > ue_cap {
            return Err(ConfigError::GainOverCap {
                channel: "ue".to_string(),
                gain: self.ue_gain,
                cap: ue_cap,
            });
        }
        Ok(())
    }
}

/// Top-level, typed configuration object consumed by the sounder core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SounderConfig {
    pub phy: PhyParams,
    pub cells: Vec<Cell>,
    pub clients: Option<ClientPopulation>,
    pub reciprocal_calibration: Option<ReciprocalCalibration>,
    pub gains: GainTable,
    pub trace_file: Option<String>,
    pub task_thread_num: usize,
    pub rx_thread_num: usize,
    pub ul_data_dir: Option<String>,
    pub ul_data_frame_num: usize,
    pub modulation: String,
    pub subcarrier_num: usize,
    pub affinity_enabled: bool,
}

impl SounderConfig {
    /// Builds a config from PHY parameters and an empty topology, to be
    /// extended with the fluent setters below.
    pub fn new(phy: PhyParams) -> Self {
        Self {
            phy,
            cells: Vec::new(),
            clients: None,
            reciprocal_calibration: None,
            gains: GainTable::default(),
            trace_file: None,
            task_thread_num: 4,
            rx_thread_num: 2,
            ul_data_dir: None,
            ul_data_frame_num: 0,
            modulation: "QPSK".to_string(),
            subcarrier_num: 0,
            affinity_enabled: true,
        }
    }

    pub fn with_cell(mut self, cell: Cell) -> Self {
        self.cells.push(cell);
        self
    }

    pub fn with_clients(mut self, clients: ClientPopulation) -> Self {
        self.clients = Some(clients);
        self
    }

    pub fn with_reciprocal_calibration(mut self, ref_sdr_index: usize) -> Self {
        self.reciprocal_calibration = Some(ReciprocalCalibration { ref_sdr_index });
        self
    }

    pub fn with_gains(mut self, gains: GainTable) -> Self {
        self.gains = gains;
        self
    }

    pub fn with_trace_file(mut self, path: impl Into<String>) -> Self {
        self.trace_file = Some(path.into());
        self
    }

    pub fn with_task_thread_num(mut self, n: usize) -> Self {
        self.task_thread_num = n;
        self
    }

    pub fn with_rx_thread_num(mut self, n: usize) -> Self {
        self.rx_thread_num = n;
        self
    }

    pub fn with_ul_data_dir(mut self, dir: impl Into<String>) -> Self {
        self.ul_data_dir = Some(dir.into());
        self
    }

    pub fn with_affinity_enabled(mut self, enabled: bool) -> Self {
        self.affinity_enabled = enabled;
        self
    }

    /// Loads a minimal JSON rendering of this object. The on-disk
    /// permissive-object-with-comments format used in production is out of
    /// scope; this exists only so the shipped binaries can run end to end.
    pub fn from_json(data: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(data)?;
        Ok(config)
    }

    pub fn total_antennas(&self) -> usize {
        self.cells.iter().map(Cell::antenna_count).sum()
    }

    /// Validates and clamps all cross-field invariants.
    ///
    /// Reports the FFT/CP clamp (a silent repair) before the
    /// `samps_per_symbol` assertion (fatal), per the order chosen in
    /// DESIGN.md for that ambiguity.
    pub fn validate_and_clamp(&mut self, beacon_size: usize) -> Result<(), ConfigError> {
        if self.reciprocal_calibration.is_some() && self.clients.is_some() {
            return Err(ConfigError::ReciprocalWithClients);
        }
        self.phy.clamp();
        self.phy.validate_against_beacon(beacon_size)?;
        self.gains.validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn phy() -> PhyParams {
        PhyParams {
            center_freq_hz: 3.5e9,
            sample_rate_hz: 30.72e6,
            nco_offset_hz: 0.0,
            fft_size: 64,
            cp_size: 16,
            symbols_per_subframe: 1,
            prefix: 0,
            postfix: 0,
        }
    }

    #[test]
    fn derived_sizes() {
        let p = phy();
        assert_eq!(p.ofdm_symbol_size(), 80);
        assert_eq!(p.subframe_size(), 80);
        assert_eq!(p.samps_per_symbol(), 80);
    }

    #[test]
    fn clamp_applies_bounds() {
        let mut p = phy();
        p.fft_size = 16;
        p.cp_size = 512;
        p.clamp();
        assert_eq!(p.fft_size, 64);
        assert_eq!(p.cp_size, 128);
    }

    #[test]
    fn beacon_assertion_fires_after_clamp() {
        let mut p = phy();
        p.fft_size = 10;
        p.cp_size = 0;
        p.symbols_per_subframe = 1;
        p.clamp();
        assert_eq!(p.fft_size, 64);
        assert!(p.validate_against_beacon(464).is_err());
    }

    #[test]
    fn reciprocal_and_clients_are_exclusive() {
        let mut cfg = SounderConfig::new(phy())
            .with_clients(ClientPopulation {
                sdr_ids: vec!["c0".into()],
                channel_mask: ChannelMask::A,
                frame_schedule: "B".into(),
            })
            .with_reciprocal_calibration(0);
        assert!(matches!(
            cfg.validate_and_clamp(464),
            Err(ConfigError::ReciprocalWithClients)
        ));
    }

    #[test]
    fn gain_over_cap_is_rejected() {
        let mut cfg = SounderConfig::new(phy()).with_gains(GainTable {
            base_station_gain: 90.0,
            ue_gain: 10.0,
            ue_gain_cap: None,
        });
        assert!(matches!(
            cfg.validate_and_clamp(64),
            Err(ConfigError::GainOverCap { .. })
        ));
    }
}

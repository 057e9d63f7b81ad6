//! Waveform Composer: deterministic generation of the beacon, pilot, and
//! (optional) uplink-data sample buffers the radios transmit.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use num_complex::Complex;

use crate::config::PhyParams;
use crate::error::WaveformError;

/// Size of the radio's packed transmit-RAM buffer, in samples.
pub const K_FPGA_TX_RAM_SIZE: usize = 4096;

const STS_PERIOD_LEN: usize = 16;
const STS_REPEATS: usize = 15;
const GOLD_IFFT_PERIOD_LEN: usize = 128;
const GOLD_IFFT_REPEATS: usize = 2;

/// `15 * 16 + 2 * 128 = 464`.
pub const BEACON_LEN: usize = STS_REPEATS * STS_PERIOD_LEN + GOLD_IFFT_REPEATS * GOLD_IFFT_PERIOD_LEN;

/// Pilot sequence identifier selected by `fft_size`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PilotSequence {
    Lts,
    ZadoffChu,
}

impl PilotSequence {
    pub fn select(fft_size: usize) -> Self {
        if fft_size == 64 {
            PilotSequence::Lts
        } else {
            PilotSequence::ZadoffChu
        }
    }
}

/// Deterministic short training sequence, one period.
fn sts_period() -> [Complex<i16>; STS_PERIOD_LEN] {
    let mut out = [Complex::new(0i16, 0i16); STS_PERIOD_LEN];
    for (n, slot) in out.iter_mut().enumerate() {
        let phase = 2.0 * std::f64::consts::PI * (n as f64) / (STS_PERIOD_LEN as f64);
        *slot = Complex::new((phase.cos() * 16000.0) as i16, (phase.sin() * 16000.0) as i16);
    }
    out
}

/// Deterministic Gold-code IFFT period. A real IFFT of a Gold sequence is
/// out of scope for this crate's test fixtures; this produces a fixed,
/// reproducible 128-sample sequence with the same amplitude envelope.
fn gold_ifft_period() -> [Complex<i16>; GOLD_IFFT_PERIOD_LEN] {
    let mut out = [Complex::new(0i16, 0i16); GOLD_IFFT_PERIOD_LEN];
    let mut lfsr: u32 = 0x1;
    for slot in out.iter_mut() {
        lfsr = lfsr.wrapping_mul(1_103_515_245).wrapping_add(12345);
        let bit = ((lfsr >> 16) & 1) as i16;
        *slot = Complex::new(if bit == 0 { 16000 } else { -16000 }, 0);
    }
    out
}

/// Zadoff-Chu sequence of length `n` and root index `u`, scaled into
/// `i16` amplitude.
fn zadoff_chu(n: usize, u: usize) -> Vec<Complex<i16>> {
    (0..n)
        .map(|k| {
            let phase = std::f64::consts::PI * (u as f64) * (k as f64) * (k as f64 + 1.0) / (n as f64);
            Complex::new((phase.cos() * 16000.0) as i16, (-phase.sin() * 16000.0) as i16)
        })
        .collect()
}

/// Full beacon waveform: `15*STS + 2*gold_ifft`, zero-padded to the
/// subframe size with `prefix`/`postfix` surrounding zeros.
#[derive(Debug, Clone)]
pub struct Beacon {
    /// The bare 464-sample beacon body, before padding.
    pub ci16: Vec<Complex<i16>>,
    /// Prefix + body + zero-pad-to-subframe + postfix.
    pub padded: Vec<Complex<i16>>,
    /// Packed uint32 "QI" component-interleaved form for the radio's
    /// transmit RAM.
    pub packed: Vec<u32>,
}

fn pack_qi(sample: Complex<i16>) -> u32 {
    ((sample.re as u16 as u32) << 16) | (sample.im as u16 as u32)
}

pub fn compose_beacon(phy: &PhyParams) -> Result<Beacon, WaveformError> {
    let sts = sts_period();
    let gold = gold_ifft_period();

    let mut ci16 = Vec::with_capacity(BEACON_LEN);
    for _ in 0..STS_REPEATS {
        ci16.extend_from_slice(&sts);
    }
    for _ in 0..GOLD_IFFT_REPEATS {
        ci16.extend_from_slice(&gold);
    }

    let subframe_size = phy.subframe_size();
    let mut padded = vec![Complex::new(0i16, 0i16); phy.prefix];
    padded.extend_from_slice(&ci16);
    if subframe_size > ci16.len() {
        padded.extend(std::iter::repeat(Complex::new(0i16, 0i16)).take(subframe_size - ci16.len()));
    }
    padded.extend(std::iter::repeat(Complex::new(0i16, 0i16)).take(phy.postfix));

    let packed = padded.iter().map(|s| pack_qi(*s)).collect();

    Ok(Beacon { ci16, padded, packed })
}

/// Pilot waveform in both packed-uint32 and cf32 representations.
#[derive(Debug, Clone)]
pub struct Pilot {
    pub cf32: Vec<Complex<f32>>,
    pub packed: Vec<u32>,
}

fn pilot_time_domain(phy: &PhyParams) -> Vec<Complex<i16>> {
    match PilotSequence::select(phy.fft_size) {
        PilotSequence::Lts => {
            // A long training sequence the same length as one OFDM symbol.
            (0..phy.fft_size)
                .map(|k| {
                    let phase = std::f64::consts::PI * (k as f64) / (phy.fft_size as f64);
                    Complex::new((phase.cos() * 16000.0) as i16, (phase.sin() * 16000.0) as i16)
                })
                .collect()
        }
        PilotSequence::ZadoffChu => zadoff_chu(phy.fft_size, 25),
    }
}

pub fn compose_pilot(phy: &PhyParams) -> Result<Pilot, WaveformError> {
    if phy.fft_size == 0 {
        return Err(WaveformError::UnsupportedPilotSequence(phy.fft_size));
    }
    let base = pilot_time_domain(phy);

    let cp: Vec<Complex<i16>> = base[base.len() - phy.cp_size.min(base.len())..].to_vec();
    let mut symbol = cp;
    symbol.extend_from_slice(&base);

    let mut body_i16: Vec<Complex<i16>> = Vec::with_capacity(phy.symbols_per_subframe * symbol.len());
    for _ in 0..phy.symbols_per_subframe {
        body_i16.extend_from_slice(&symbol);
    }

    let mut padded = vec![Complex::new(0i16, 0i16); phy.prefix];
    padded.extend_from_slice(&body_i16);
    padded.extend(std::iter::repeat(Complex::new(0i16, 0i16)).take(phy.postfix));

    let cf32: Vec<Complex<f32>> = padded
        .iter()
        .map(|s| Complex::new(s.re as f32 / 16000.0, s.im as f32 / 16000.0))
        .collect();

    let mut packed: Vec<u32> = padded.iter().map(|s| pack_qi(*s)).collect();
    if packed.len() < K_FPGA_TX_RAM_SIZE {
        packed.resize(K_FPGA_TX_RAM_SIZE, 0);
    }

    Ok(Pilot { cf32, packed })
}

/// One client SDR's uplink-data sample vectors, loaded from the configured
/// directory.
#[derive(Debug, Clone)]
pub struct UplinkData {
    /// `fft_size * symbols_per_subframe` complex-float per slot, per
    /// uplink slot.
    pub freq_domain: Vec<Complex<f32>>,
    /// `samps_per_symbol` complex-float per slot, per uplink slot.
    pub time_domain: Vec<Complex<f32>>,
}

#[allow(clippy::too_many_arguments)]
pub fn uplink_file_name(
    kind: &str,
    modulation: &str,
    subcarrier_num: usize,
    fft_size: usize,
    symbols_per_subframe: usize,
    ul_slots: usize,
    ul_data_frame_num: usize,
    channel: usize,
    sdr_index: usize,
) -> String {
    format!(
        "{kind}_{modulation}_{subcarrier_num}_{fft_size}_{symbols_per_subframe}_{ul_slots}_{ul_data_frame_num}_{channel}_{sdr_index}.bin"
    )
}

fn read_complex_f32(path: &Path, expected_samples: usize) -> Result<Vec<Complex<f32>>, WaveformError> {
    if !path.exists() {
        return Err(WaveformError::MissingFile(path.display().to_string()));
    }
    let mut file = File::open(path)?;
    let mut bytes = Vec::new();
    file.read_to_end(&mut bytes)?;

    let got_samples = bytes.len() / 8;
    if got_samples < expected_samples {
        tracing::warn!(
            path = %path.display(),
            expected = expected_samples,
            got = got_samples,
            "short read of uplink data file, continuing with what was read"
        );
    }

    let n = got_samples.min(expected_samples);
    let mut out = Vec::with_capacity(n);
    for i in 0..n {
        let off = i * 8;
        let re = f32::from_le_bytes(bytes[off..off + 4].try_into().unwrap());
        let im = f32::from_le_bytes(bytes[off + 4..off + 8].try_into().unwrap());
        out.push(Complex::new(re, im));
    }
    Ok(out)
}

#[allow(clippy::too_many_arguments)]
pub fn load_uplink_data(
    dir: &Path,
    modulation: &str,
    subcarrier_num: usize,
    phy: &PhyParams,
    ul_slots: &[usize],
    ul_data_frame_num: usize,
    channel: usize,
    sdr_index: usize,
) -> Result<UplinkData, WaveformError> {
    let freq_name = uplink_file_name(
        "ul_data_f",
        modulation,
        subcarrier_num,
        phy.fft_size,
        phy.symbols_per_subframe,
        ul_slots.len(),
        ul_data_frame_num,
        channel,
        sdr_index,
    );
    let time_name = uplink_file_name(
        "ul_data_t",
        modulation,
        subcarrier_num,
        phy.fft_size,
        phy.symbols_per_subframe,
        ul_slots.len(),
        ul_data_frame_num,
        channel,
        sdr_index,
    );

    let freq_domain = read_complex_f32(
        &dir.join(freq_name),
        ul_slots.len() * channel * phy.fft_size * phy.symbols_per_subframe,
    )?;
    let time_domain = read_complex_f32(
        &dir.join(time_name),
        ul_slots.len() * channel * phy.samps_per_symbol(),
    )?;

    Ok(UplinkData {
        freq_domain,
        time_domain,
    })
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
    fn s3_beacon_composition_sizes() {
        let beacon = compose_beacon(&phy()).unwrap();
        assert_eq!(beacon.ci16.len(), BEACON_LEN);
        assert_eq!(BEACON_LEN, 464);

        let sts = sts_period();
        assert_eq!(&beacon.ci16[0..16], &sts);

        let gold = gold_ifft_period();
        assert_eq!(&beacon.ci16[240..368], &gold);
    }

    #[test]
    fn pilot_packed_is_zero_extended_to_fpga_ram_size() {
        let pilot = compose_pilot(&phy()).unwrap();
        assert_eq!(pilot.packed.len(), K_FPGA_TX_RAM_SIZE);
    }

    #[test]
    fn pilot_cf32_len_matches_formula() {
        let mut p = phy();
        p.symbols_per_subframe = 2;
        let pilot = compose_pilot(&p).unwrap();
        let expected = p.prefix + p.symbols_per_subframe * (p.fft_size + p.cp_size) + p.postfix;
        assert_eq!(pilot.cf32.len(), expected);
    }

    #[test]
    fn missing_uplink_file_is_fatal() {
        let dir = std::env::temp_dir().join("sounder-missing-ul-test");
        let err = load_uplink_data(&dir, "QPSK", 64, &phy(), &[4], 0, 1, 0).unwrap_err();
        assert!(matches!(err, WaveformError::MissingFile(_)));
    }
}

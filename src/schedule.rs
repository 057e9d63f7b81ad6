//! Slot schedule: parses per-cell frame strings into typed slot tables and
//! answers slot-role queries.
//!
//! Frame indexing is circular and out-of-range slot queries return `None`
//! (or `-1`-equivalent ordinals) rather than propagating an error, matching
//! the "never surfaced to callers" rule for category 5 errors.

use std::collections::HashMap;

use crate::error::ScheduleError;

/// A single slot role in the `{B,P,U,D,N,G,R,C}` alphabet.
pub const ALPHABET: &[char] = &['B', 'P', 'U', 'D', 'N', 'G', 'R', 'C'];

fn validate_alphabet(frame: &str) -> Result<(), ScheduleError> {
    for c in frame.chars() {
        if !ALPHABET.contains(&c) {
            return Err(ScheduleError::UnknownRole(c));
        }
    }
    Ok(())
}

/// Per-role ordered positions derived from a single frame string.
#[derive(Debug, Clone)]
struct FrameTable {
    frame: Vec<char>,
    positions: HashMap<char, Vec<usize>>,
}

impl FrameTable {
    fn new(frame: &str) -> Result<Self, ScheduleError> {
        validate_alphabet(frame)?;
        let frame: Vec<char> = frame.chars().collect();
        let mut positions: HashMap<char, Vec<usize>> = HashMap::new();
        for (idx, role) in frame.iter().enumerate() {
            positions.entry(*role).or_default().push(idx);
        }
        Ok(Self { frame, positions })
    }

    fn role_at(&self, slot_id: usize) -> Option<char> {
        self.frame.get(slot_id).copied()
    }

    fn index_of(&self, role: char, slot_id: usize) -> Option<usize> {
        self.positions
            .get(&role)
            .and_then(|slots| slots.iter().position(|&s| s == slot_id))
    }

    fn count(&self, role: char) -> usize {
        self.positions.get(&role).map_or(0, Vec::len)
    }
}

/// One cell's schedule: a sequence of per-SDR frame strings (one table per
/// SDR in reciprocal calibration mode; otherwise a single shared frame for
/// every SDR in the cell).
#[derive(Debug, Clone)]
pub struct CellSchedule {
    frames: Vec<FrameTable>,
    /// `true` when each entry in `frames` belongs to a distinct SDR
    /// (reciprocal calibration mode), in which case `client_id` is the
    /// identity function rather than a frame lookup.
    reciprocal: bool,
}

impl CellSchedule {
    /// A schedule where every SDR in the cell shares the same frame string.
    pub fn uniform(frame: &str) -> Result<Self, ScheduleError> {
        Ok(Self {
            frames: vec![FrameTable::new(frame)?],
            reciprocal: false,
        })
    }

    /// A schedule with one distinct frame string per SDR, as produced by
    /// [`generate_reciprocal_schedule`].
    pub fn per_sdr(frames: Vec<String>) -> Result<Self, ScheduleError> {
        let tables = frames
            .iter()
            .map(|f| FrameTable::new(f))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            frames: tables,
            reciprocal: true,
        })
    }

    pub fn frame_len(&self) -> usize {
        self.frames.first().map_or(0, |t| t.frame.len())
    }

    fn table_for(&self, sdr_or_zero: usize) -> &FrameTable {
        if self.reciprocal {
            &self.frames[sdr_or_zero % self.frames.len()]
        } else {
            &self.frames[0]
        }
    }

    /// `role_at(frame_id, slot_id)`. `frame_id` selects the SDR's frame
    /// string in reciprocal mode (frame indexing is circular); it is
    /// otherwise unused since all SDRs share one frame.
    pub fn role_at(&self, frame_id: usize, slot_id: usize) -> Option<char> {
        if self.frames.is_empty() {
            return None;
        }
        self.table_for(frame_id).role_at(slot_id)
    }

    pub fn index_of(&self, frame_id: usize, role: char, slot_id: usize) -> Option<usize> {
        if self.frames.is_empty() {
            return None;
        }
        self.table_for(frame_id).index_of(role, slot_id)
    }

    pub fn count(&self, frame_id: usize, role: char) -> usize {
        if self.frames.is_empty() {
            return 0;
        }
        self.table_for(frame_id).count(role)
    }

    /// In reciprocal mode, returns `slot` unchanged (client identity equals
    /// slot index). Otherwise returns the frame-local ordinal.
    pub fn client_id(&self, frame: usize, slot: usize) -> i64 {
        if self.reciprocal {
            return slot as i64;
        }
        frame as i64 % self.frames.len().max(1) as i64
    }

    pub fn is_pilot(&self, frame_id: usize, slot_id: usize) -> bool {
        self.role_at(frame_id, slot_id) == Some('P')
    }

    pub fn is_data(&self, frame_id: usize, slot_id: usize) -> bool {
        self.role_at(frame_id, slot_id) == Some('U')
    }

    pub fn has_uplink(&self) -> bool {
        self.frames
            .iter()
            .any(|t| t.positions.get(&'U').is_some_and(|v| !v.is_empty()))
    }

    pub fn has_pilot(&self) -> bool {
        self.frames
            .iter()
            .any(|t| t.positions.get(&'P').is_some_and(|v| !v.is_empty()))
    }
}

/// Generates the N synthetic per-SDR frame strings for reciprocal
/// calibration mode.
///
/// SDR `r` (the reference) gets a frame of `G`s with a single `P` at offset
/// `c*r` and an `R` at every other SDR's slot. Every non-reference SDR `i`
/// gets `P`s at `c*i .. c*i+c`, an `R` at `c*r`, and `G` elsewhere. Frame
/// length is `c*N - (c-1)` because the reference's own `c`-wide pilot
/// collapses to a single `P` plus `c-1` fewer slots than a full pilot block.
pub fn generate_reciprocal_schedule(
    n_sdrs: usize,
    ref_sdr: usize,
    channels: usize,
) -> Result<Vec<String>, ScheduleError> {
    if n_sdrs < 2 {
        return Err(ScheduleError::TooFewSdrs(n_sdrs));
    }
    if ref_sdr >= n_sdrs {
        return Err(ScheduleError::RefOutOfRange(ref_sdr, n_sdrs));
    }

    let frame_len = channels * n_sdrs - (channels - 1);
    let mut frames = Vec::with_capacity(n_sdrs);

    for sdr in 0..n_sdrs {
        let mut frame = vec!['G'; frame_len];
        if sdr == ref_sdr {
            frame[channels * ref_sdr] = 'P';
            for other in 0..n_sdrs {
                if other == ref_sdr {
                    continue;
                }
                frame[pilot_slot_offset(other, ref_sdr, channels)] = 'R';
            }
        } else {
            let start = pilot_slot_offset(sdr, ref_sdr, channels);
            for ch in 0..channels {
                frame[start + ch] = 'P';
            }
            frame[channels * ref_sdr] = 'R';
        }
        frames.push(frame.into_iter().collect());
    }
    Ok(frames)
}

/// Maps SDR `other`'s pilot block start to its position in the
/// reference-compressed frame (the reference's own block is one slot wide,
/// so every SDR index past the reference shifts left by `channels - 1`).
fn pilot_slot_offset(other: usize, ref_sdr: usize, channels: usize) -> usize {
    if other < ref_sdr {
        channels * other
    } else {
        channels * other - (channels - 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn s1_pure_schedule() {
        let sched = CellSchedule::uniform("BGPGUGDGN").unwrap();
        assert_eq!(sched.role_at(0, 2), Some('P'));
        assert!(sched.is_pilot(0, 2));
        assert_eq!(sched.client_id(0, 2), 0);
        assert!(sched.is_data(0, 4));
    }

    #[test]
    fn schedule_consistency_invariant() {
        let sched = CellSchedule::uniform("BGPGUGDGNGRC").unwrap();
        for role in ALPHABET {
            let count = sched.count(0, *role);
            let positions: Vec<usize> = (0..sched.frame_len())
                .filter(|&s| sched.role_at(0, s) == Some(*role))
                .collect();
            assert_eq!(count, positions.len());
        }
    }

    #[test]
    fn out_of_range_is_none() {
        let sched = CellSchedule::uniform("BGPG").unwrap();
        assert_eq!(sched.role_at(0, 99), None);
        assert_eq!(sched.index_of(0, 'X', 0), None);
    }

    #[test]
    fn s2_reciprocal_gen_n3_ref1_c2() {
        let frames = generate_reciprocal_schedule(3, 1, 2).unwrap();
        assert_eq!(frames.len(), 3);
        for f in &frames {
            assert_eq!(f.len(), 2 * 3 - 1);
        }
        // SDR 1 is the reference: one P at offset c*r=2, and N-1=2 Rs elsewhere.
        let ref_frame = &frames[1];
        assert_eq!(ref_frame.matches('P').count(), 1);
        assert_eq!(ref_frame.chars().nth(2), Some('P'));
        assert_eq!(ref_frame.matches('R').count(), 2);

        // Every non-reference SDR i has c Ps starting at c*i (after shift) and one R at the ref slot.
        for (i, frame) in frames.iter().enumerate() {
            if i == 1 {
                continue;
            }
            assert_eq!(frame.matches('P').count(), 2);
            assert_eq!(frame.matches('R').count(), 1);
        }
    }

    #[test]
    fn has_pilot_and_uplink_reflect_frame_contents() {
        let with_both = CellSchedule::uniform("BGPGUGDGN").unwrap();
        assert!(with_both.has_pilot());
        assert!(with_both.has_uplink());

        let beam_sweep_only = CellSchedule::uniform("BGDGNGG").unwrap();
        assert!(!beam_sweep_only.has_pilot());
        assert!(!beam_sweep_only.has_uplink());
    }

    #[test]
    fn reciprocal_rejects_too_few_sdrs() {
        assert!(matches!(
            generate_reciprocal_schedule(1, 0, 2),
            Err(ScheduleError::TooFewSdrs(1))
        ));
    }

    #[test]
    fn reciprocal_rejects_ref_out_of_range() {
        assert!(matches!(
            generate_reciprocal_schedule(3, 5, 2),
            Err(ScheduleError::RefOutOfRange(5, 3))
        ));
    }
}

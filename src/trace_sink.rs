//! Trace Sink capability: the abstract hierarchical columnar dataset the
//! Recorder Pool appends to.
//!
//! The production sink (a full HDF5-compatible writer) is external to this
//! crate. `FileTraceSink` is a directory-of-binary-segments default
//! implementation: one segment file per `(cell, antenna)` coordinate, each
//! with a fixed binary header and a CRC32 trailer per append, following the
//! same magic-bytes/fixed-header/byteorder layout this codebase's recording
//! crate uses for its own on-disk format.

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use byteorder::{LittleEndian, WriteBytesExt};

use crate::error::RecorderError;

const MAGIC: &[u8; 8] = b"SNDRTRC\0";
const FORMAT_VERSION: u32 = 1;

/// Abstract capability consumed by a recorder worker.
pub trait TraceSink: Send {
    fn append(
        &mut self,
        cell: u16,
        frame: u32,
        slot: u32,
        antenna: u32,
        iq_bytes: &[u8],
    ) -> Result<(), RecorderError>;

    fn flush(&mut self) -> Result<(), RecorderError>;

    fn close(&mut self) -> Result<(), RecorderError>;
}

/// One open segment file for a single `(cell, antenna)` coordinate.
struct Segment {
    writer: BufWriter<File>,
    record_count: u64,
}

impl Segment {
    fn create(path: &Path) -> Result<Self, RecorderError> {
        let file = OpenOptions::new().create(true).write(true).truncate(true).open(path)?;
        let mut writer = BufWriter::new(file);
        writer.write_all(MAGIC)?;
        writer.write_u32::<LittleEndian>(FORMAT_VERSION)?;
        Ok(Self {
            writer,
            record_count: 0,
        })
    }

    fn append_record(&mut self, frame: u32, slot: u32, iq_bytes: &[u8]) -> Result<(), RecorderError> {
        let mut crc = crc32fast::Hasher::new();
        crc.update(&frame.to_le_bytes());
        crc.update(&slot.to_le_bytes());
        crc.update(iq_bytes);
        let checksum = crc.finalize();

        self.writer.write_u32::<LittleEndian>(frame)?;
        self.writer.write_u32::<LittleEndian>(slot)?;
        self.writer.write_u32::<LittleEndian>(iq_bytes.len() as u32)?;
        self.writer.write_all(iq_bytes)?;
        self.writer.write_u32::<LittleEndian>(checksum)?;
        self.record_count += 1;
        Ok(())
    }
}

/// Path-component tag distinguishing reciprocal calibration / uplink runs
/// from an ordinary capture, mirroring the `mode_tag` rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModeTag {
    ReciprocalCalib,
    Uplink,
    Plain,
}

impl ModeTag {
    pub fn as_str(self) -> &'static str {
        match self {
            ModeTag::ReciprocalCalib => "reciprocal-calib-",
            ModeTag::Uplink => "uplink-",
            ModeTag::Plain => "",
        }
    }
}

/// Default trace sink: one directory per run, one segment file per
/// `(cell, antenna)` pair opened lazily on first append.
pub struct FileTraceSink {
    root: PathBuf,
    segments: HashMap<(u16, u32), Segment>,
}

impl FileTraceSink {
    pub fn new(directory: impl AsRef<Path>, mode_tag: ModeTag, timestamp: &str) -> Result<Self, RecorderError> {
        let root = directory
            .as_ref()
            .join(format!("{}{}", mode_tag.as_str(), timestamp));
        fs::create_dir_all(&root)?;
        Ok(Self {
            root,
            segments: HashMap::new(),
        })
    }

    fn segment_path(&self, cell: u16, antenna: u32) -> PathBuf {
        self.root.join(format!("cell{cell}_ant{antenna}.bin"))
    }

    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }

    pub fn record_count(&self, cell: u16, antenna: u32) -> u64 {
        self.segments
            .get(&(cell, antenna))
            .map_or(0, |s| s.record_count)
    }
}

impl TraceSink for FileTraceSink {
    fn append(
        &mut self,
        cell: u16,
        frame: u32,
        slot: u32,
        antenna: u32,
        iq_bytes: &[u8],
    ) -> Result<(), RecorderError> {
        let key = (cell, antenna);
        if !self.segments.contains_key(&key) {
            let path = self.segment_path(cell, antenna);
            self.segments.insert(key, Segment::create(&path)?);
        }
        let segment = self.segments.get_mut(&key).expect("just inserted");
        segment.append_record(frame, slot, iq_bytes)
    }

    fn flush(&mut self) -> Result<(), RecorderError> {
        for segment in self.segments.values_mut() {
            segment.writer.flush()?;
        }
        Ok(())
    }

    fn close(&mut self) -> Result<(), RecorderError> {
        self.flush()?;
        self.segments.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn append_creates_one_segment_per_antenna() {
        let dir = tempdir().unwrap();
        let mut sink = FileTraceSink::new(dir.path(), ModeTag::Plain, "20260801").unwrap();
        sink.append(0, 0, 0, 0, &[1, 2, 3, 4]).unwrap();
        sink.append(0, 1, 0, 1, &[5, 6, 7, 8]).unwrap();
        assert_eq!(sink.segment_count(), 2);
        assert_eq!(sink.record_count(0, 0), 1);
    }

    #[test]
    fn close_flushes_and_clears_segments() {
        let dir = tempdir().unwrap();
        let mut sink = FileTraceSink::new(dir.path(), ModeTag::Uplink, "20260801").unwrap();
        sink.append(0, 0, 0, 0, &[9, 9]).unwrap();
        sink.close().unwrap();
        assert_eq!(sink.segment_count(), 0);

        let path = dir.path().join("uplink-20260801").join("cell0_ant0.bin");
        assert!(path.exists());
    }
}

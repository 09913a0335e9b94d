use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crc32fast::Hasher as Crc32;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// One WAL record: the flattened document plus the reserved keys the spec
/// requires (`_id`, `_action`, `_shard`, `_timestamp`). Kept as raw JSON
/// bytes on disk (self-describing, per spec §3) rather than a binary
/// encoding, so a record can be replayed without this crate's types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Action {
    Insert,
    Update,
    Delete,
}

/// Append-only durable log for one primary shard. Each record is framed as
/// `[len:u32 LE][json bytes][crc32:u32 LE]` — the length prefix matches the
/// framing already used by the codebase's segment writer; the trailer adds
/// a checksum so a torn write is detectable rather than merely
/// length-plausible.
pub struct Wal {
    file: File,
    path: PathBuf,
    position: u64,
}

impl Wal {
    /// Opens (creating if absent) the WAL file for a primary shard,
    /// truncating a partial trailing record and reporting it, per the
    /// spec's corruption policy. Leading corruption (record 0 unreadable)
    /// is returned as an error instead.
    pub fn open(dir: &Path) -> Result<Self> {
        fs::create_dir_all(dir)?;
        let path = dir.join("wal.log");
        let valid_len = Self::scan_and_truncate(&path)?;

        let file = OpenOptions::new().create(true).append(true).read(true).open(&path)?;
        Ok(Wal { file, path, position: valid_len })
    }

    fn scan_and_truncate(path: &Path) -> Result<u64> {
        if !path.exists() {
            return Ok(0);
        }
        let mut file = File::open(path)?;
        let total_len = file.metadata()?.len();
        let mut offset = 0u64;
        let mut first_record = true;

        loop {
            if offset == total_len {
                break;
            }
            match Self::try_read_record(&mut file, offset, total_len) {
                Ok(Some(next_offset)) => {
                    offset = next_offset;
                    first_record = false;
                }
                Ok(None) | Err(_) if first_record => {
                    return Err(Error::runtime(format!(
                        "WAL {} has unreadable leading record, fatal for this shard",
                        path.display()
                    )));
                }
                Ok(None) | Err(_) => {
                    tracing::warn!(path = %path.display(), offset, "truncating partial trailing WAL record");
                    break;
                }
            }
        }

        if offset != total_len {
            let file = OpenOptions::new().write(true).open(path)?;
            file.set_len(offset)?;
        }
        Ok(offset)
    }

    /// Returns `Ok(Some(next_offset))` on a well-formed record at `offset`,
    /// `Ok(None)` if there isn't enough trailing data for a full record.
    fn try_read_record(file: &mut File, offset: u64, total_len: u64) -> Result<Option<u64>> {
        if total_len - offset < 8 {
            return Ok(None);
        }
        file.seek(SeekFrom::Start(offset))?;
        let mut len_buf = [0u8; 4];
        file.read_exact(&mut len_buf)?;
        let len = u32::from_le_bytes(len_buf) as u64;
        if total_len - offset - 4 < len + 4 {
            return Ok(None);
        }
        let mut payload = vec![0u8; len as usize];
        file.read_exact(&mut payload)?;
        let mut crc_buf = [0u8; 4];
        file.read_exact(&mut crc_buf)?;
        let expected = u32::from_le_bytes(crc_buf);
        let mut hasher = Crc32::new();
        hasher.update(&payload);
        if hasher.finalize() != expected {
            return Ok(None);
        }
        Ok(Some(offset + 8 + len))
    }

    /// Appends a JSON record; returns only once the write is durable.
    pub fn append(&mut self, record: &[u8]) -> Result<()> {
        let len = record.len() as u32;
        let mut hasher = Crc32::new();
        hasher.update(record);
        let crc = hasher.finalize();

        let mut frame = Vec::with_capacity(8 + record.len());
        frame.extend_from_slice(&len.to_le_bytes());
        frame.extend_from_slice(record);
        frame.extend_from_slice(&crc.to_le_bytes());

        self.file.write_all(&frame)?;
        self.file.sync_all()?;
        self.position += frame.len() as u64;
        Ok(())
    }

    pub fn size(&self) -> u64 {
        self.position
    }

    pub fn close(&mut self) -> Result<()> {
        self.file.sync_all()?;
        Ok(())
    }

    /// Replays records from `offset` onward as `(offset, bytes)` pairs.
    pub fn iter_from(&self, offset: u64) -> Result<Vec<(u64, Vec<u8>)>> {
        let mut file = File::open(&self.path)?;
        let total_len = file.metadata()?.len();
        let mut out = Vec::new();
        let mut pos = offset;

        while pos < total_len {
            file.seek(SeekFrom::Start(pos))?;
            let mut len_buf = [0u8; 4];
            file.read_exact(&mut len_buf)?;
            let len = u32::from_le_bytes(len_buf) as usize;
            let mut payload = vec![0u8; len];
            file.read_exact(&mut payload)?;
            let mut crc_buf = [0u8; 4];
            file.read_exact(&mut crc_buf)?;
            out.push((pos, payload));
            pos += 8 + len as u64;
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_then_replay_roundtrips() {
        let dir = tempfile::tempdir().unwrap();
        let mut wal = Wal::open(dir.path()).unwrap();
        wal.append(b"{\"_id\":\"a\"}").unwrap();
        wal.append(b"{\"_id\":\"b\"}").unwrap();

        let records = wal.iter_from(0).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].1, b"{\"_id\":\"a\"}");
        assert_eq!(records[1].1, b"{\"_id\":\"b\"}");
        assert_eq!(wal.size(), records.iter().map(|(_, r)| r.len() as u64 + 8).sum::<u64>());
    }

    #[test]
    fn reopen_after_close_preserves_records() {
        let dir = tempfile::tempdir().unwrap();
        {
            let mut wal = Wal::open(dir.path()).unwrap();
            wal.append(b"{\"_id\":\"a\"}").unwrap();
            wal.close().unwrap();
        }
        let wal = Wal::open(dir.path()).unwrap();
        assert_eq!(wal.iter_from(0).unwrap().len(), 1);
    }

    #[test]
    fn truncates_partial_trailing_record() {
        let dir = tempfile::tempdir().unwrap();
        {
            let mut wal = Wal::open(dir.path()).unwrap();
            wal.append(b"{\"_id\":\"a\"}").unwrap();
        }
        // Corrupt: append a few stray bytes simulating a torn write.
        let path = dir.path().join("wal.log");
        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(&[1, 2, 3]).unwrap();
        drop(file);

        let wal = Wal::open(dir.path()).unwrap();
        let records = wal.iter_from(0).unwrap();
        assert_eq!(records.len(), 1);
    }

    #[test]
    fn leading_corruption_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("wal.log"), [9, 9, 9]).unwrap();
        let result = Wal::open(dir.path());
        assert!(result.is_err());
    }
}

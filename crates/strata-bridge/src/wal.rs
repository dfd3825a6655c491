use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::{debug, warn};

use crate::error::BridgeResult;

/// Flush strategy for a partition log.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SyncMode {
    /// `fsync` after every append.
    EveryWrite,
    /// Flush to the OS and let the page cache decide.
    #[default]
    OsDefault,
}

/// Header size: 4 bytes length + 4 bytes CRC.
const HEADER_SIZE: usize = 8;

struct LogWriter {
    writer: BufWriter<File>,
    offset: u64,
}

/// Append-only, CRC-framed log file backing one partition.
///
/// On-disk format, repeated per entry:
/// ```text
/// [4 bytes: payload length (little-endian u32)]
/// [4 bytes: CRC32 of payload (little-endian u32)]
/// [N bytes: payload]
/// ```
///
/// Recovery reads front-to-back. A CRC mismatch skips the entry; a torn
/// tail (length running past end of file) stops recovery.
pub struct PartitionLog {
    path: PathBuf,
    writer: Mutex<LogWriter>,
    sync_mode: SyncMode,
}

impl PartitionLog {
    /// Open (or create) the log file at `path`.
    pub fn open(path: &Path, sync_mode: SyncMode) -> BridgeResult<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(path)?;
        let offset = file.metadata()?.len();

        Ok(Self {
            path: path.to_path_buf(),
            writer: Mutex::new(LogWriter {
                writer: BufWriter::new(file),
                offset,
            }),
            sync_mode,
        })
    }

    /// Append one payload. Returns the byte offset of the entry.
    pub fn append(&self, payload: &[u8]) -> BridgeResult<u64> {
        let mut w = self.writer.lock().expect("log mutex poisoned");
        let entry_offset = w.offset;
        write_entry(&mut w.writer, payload)?;
        w.writer.flush()?;
        if self.sync_mode == SyncMode::EveryWrite {
            w.writer.get_ref().sync_all()?;
        }
        w.offset += (HEADER_SIZE + payload.len()) as u64;

        debug!(path = %self.path.display(), offset = entry_offset, len = payload.len(), "log append");
        Ok(entry_offset)
    }

    /// Read every intact payload, in append order.
    pub fn recover(&self) -> BridgeResult<Vec<Vec<u8>>> {
        let mut file = BufReader::new(File::open(&self.path)?);
        let file_len = file.get_ref().metadata()?.len();
        let mut payloads = Vec::new();
        let mut offset: u64 = 0;

        while offset + HEADER_SIZE as u64 <= file_len {
            file.seek(SeekFrom::Start(offset))?;

            let mut header = [0u8; HEADER_SIZE];
            match file.read_exact(&mut header) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => break,
                Err(e) => return Err(e.into()),
            }
            let length = u32::from_le_bytes([header[0], header[1], header[2], header[3]]);
            let expected_crc = u32::from_le_bytes([header[4], header[5], header[6], header[7]]);
            let next = offset + HEADER_SIZE as u64 + length as u64;

            if length == 0 || next > file_len {
                warn!(path = %self.path.display(), offset, length, file_len, "torn log tail; stopping recovery");
                break;
            }

            let mut payload = vec![0u8; length as usize];
            file.read_exact(&mut payload)?;

            let actual_crc = crc32fast::hash(&payload);
            if actual_crc != expected_crc {
                warn!(
                    path = %self.path.display(),
                    offset,
                    expected = expected_crc,
                    actual = actual_crc,
                    "CRC mismatch; skipping entry"
                );
            } else {
                payloads.push(payload);
            }
            offset = next;
        }

        debug!(path = %self.path.display(), recovered = payloads.len(), "log recovery complete");
        Ok(payloads)
    }

    /// Rewrite the file keeping only the payloads for which `keep` returns
    /// `true`. Returns the number of entries dropped.
    pub fn retain(&self, mut keep: impl FnMut(&[u8]) -> bool) -> BridgeResult<usize> {
        let mut w = self.writer.lock().expect("log mutex poisoned");
        w.writer.flush()?;
        let payloads = self.recover()?;
        let before = payloads.len();

        let tmp = self.path.with_extension("compact");
        let mut out = BufWriter::new(File::create(&tmp)?);
        let mut offset = 0u64;
        let mut kept = 0;
        for payload in payloads.iter().filter(|p| keep(p)) {
            write_entry(&mut out, payload)?;
            offset += (HEADER_SIZE + payload.len()) as u64;
            kept += 1;
        }
        out.flush()?;
        out.get_ref().sync_all()?;
        drop(out);
        fs::rename(&tmp, &self.path)?;

        let file = OpenOptions::new().read(true).append(true).open(&self.path)?;
        w.writer = BufWriter::new(file);
        w.offset = offset;

        let dropped = before - kept;
        debug!(path = %self.path.display(), dropped, "log compacted");
        Ok(dropped)
    }

    /// Remove all entries.
    pub fn truncate(&self) -> BridgeResult<()> {
        let mut w = self.writer.lock().expect("log mutex poisoned");
        let file = OpenOptions::new()
            .write(true)
            .truncate(true)
            .open(&self.path)?;
        drop(file);
        let file = OpenOptions::new().read(true).append(true).open(&self.path)?;
        w.writer = BufWriter::new(file);
        w.offset = 0;
        debug!(path = %self.path.display(), "log truncated");
        Ok(())
    }

    /// Current write offset.
    pub fn offset(&self) -> u64 {
        self.writer.lock().expect("log mutex poisoned").offset
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl std::fmt::Debug for PartitionLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PartitionLog")
            .field("path", &self.path)
            .field("sync_mode", &self.sync_mode)
            .finish()
    }
}

fn write_entry(w: &mut impl Write, payload: &[u8]) -> io::Result<()> {
    let length = payload.len() as u32;
    let crc = crc32fast::hash(payload);
    w.write_all(&length.to_le_bytes())?;
    w.write_all(&crc.to_le_bytes())?;
    w.write_all(payload)
}

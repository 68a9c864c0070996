use crate::error::{LocusError, Result};
use crate::types::{Address, AddressId, SyncPolicy};
use bincode::Options;
use bytes::{BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::fs::{File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Size of the big-endian length prefix in front of every frame.
const FRAME_HEADER_LEN: u64 = 4;

/// Interval between syncs under [`SyncPolicy::EverySecond`].
const SYNC_INTERVAL: Duration = Duration::from_secs(1);

/// A single logged mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AOFCommand {
    /// A freshly inserted address
    Insert(Address),
    /// The full record after an update
    Update(Address),
    Delete { id: AddressId },
    /// Lower bound for the next id; keeps ids unique across compactions
    Sequence { next_id: AddressId },
}

/// Append-only file holding the store's mutation log.
///
/// Each frame is a `u32` big-endian payload length followed by the
/// `bincode` encoding of an [`AOFCommand`].
pub struct AOFFile {
    file: File,
    writer: BufWriter<File>,
    path: PathBuf,
    size: u64,
    sync_policy: SyncPolicy,
    last_sync: Instant,
    sync_count: u64,
    rewrite_in_progress: bool,
}

impl AOFFile {
    /// Open AOF file with the default sync policy
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_with_policy(path, SyncPolicy::default())
    }

    pub fn open_with_policy<P: AsRef<Path>>(path: P, sync_policy: SyncPolicy) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let (file, writer, size) = Self::open_handles(&path)?;

        Ok(AOFFile {
            file,
            writer,
            path,
            size,
            sync_policy,
            last_sync: Instant::now(),
            sync_count: 0,
            rewrite_in_progress: false,
        })
    }

    fn open_handles(path: &Path) -> Result<(File, BufWriter<File>, u64)> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .read(true)
            .open(path)?;

        let size = file.metadata()?.len();
        let writer = BufWriter::new(file.try_clone()?);
        Ok((file, writer, size))
    }

    /// Get current file size
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Get the file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of fsyncs issued since the file was opened
    pub fn sync_count(&self) -> u64 {
        self.sync_count
    }

    /// Append a command, then sync as the policy demands.
    pub fn append(&mut self, command: &AOFCommand) -> Result<()> {
        if self.rewrite_in_progress {
            return Err(LocusError::RewriteInProgress);
        }

        let frame = encode_frame(command)?;
        self.writer.write_all(&frame)?;
        self.size += frame.len() as u64;

        match self.sync_policy {
            SyncPolicy::Never => {}
            SyncPolicy::Always => self.sync()?,
            SyncPolicy::EverySecond => {
                if self.last_sync.elapsed() >= SYNC_INTERVAL {
                    self.sync()?;
                }
            }
        }

        Ok(())
    }

    /// Read back every command in the file.
    ///
    /// A frame cut short at the end of the file (a crash mid-append) is
    /// dropped and the file truncated to the last complete frame. A frame that
    /// fails to decode, or a length header that overruns the file while
    /// complete frames still follow it, is reported as `InvalidFormat` and the
    /// file is left untouched.
    pub fn replay(&mut self) -> Result<Vec<AOFCommand>> {
        self.writer.flush()?;
        let file_len = self.file.metadata()?.len();
        self.file.seek(SeekFrom::Start(0))?;

        let mut reader = BufReader::new(&mut self.file);
        let mut commands = Vec::new();
        let mut offset = 0u64;

        loop {
            let mut header = [0u8; FRAME_HEADER_LEN as usize];
            if read_full(&mut reader, &mut header)? < header.len() {
                break;
            }

            let len = u32::from_be_bytes(header) as u64;
            if offset + FRAME_HEADER_LEN + len > file_len {
                let mut rest = Vec::new();
                reader.read_to_end(&mut rest)?;
                if contains_complete_frame(&rest) {
                    warn!(offset, len, file_len, "AOF frame length overruns the file");
                    return Err(LocusError::InvalidFormat);
                }
                break;
            }

            let mut payload = vec![0u8; len as usize];
            if read_full(&mut reader, &mut payload)? < payload.len() {
                break;
            }

            let command = decode_command(&payload).map_err(|e| {
                warn!(offset, error = %e, "undecodable AOF frame");
                LocusError::InvalidFormat
            })?;
            commands.push(command);
            offset += FRAME_HEADER_LEN + len;
        }

        if offset < file_len {
            warn!(
                path = %self.path.display(),
                valid_len = offset,
                file_len,
                "truncating incomplete AOF tail"
            );
            self.file.set_len(offset)?;
            self.file.sync_all()?;
            self.size = offset;
        }

        debug!(commands = commands.len(), "replayed AOF");
        Ok(commands)
    }

    /// Replace the file's contents with `commands`.
    ///
    /// The new log is written next to the old one, synced, and renamed over it.
    pub fn rewrite<I>(&mut self, commands: I) -> Result<()>
    where
        I: IntoIterator<Item = AOFCommand>,
    {
        if self.rewrite_in_progress {
            return Err(LocusError::RewriteInProgress);
        }

        self.rewrite_in_progress = true;
        let result = self.perform_rewrite(commands);
        self.rewrite_in_progress = false;
        result
    }

    fn perform_rewrite<I>(&mut self, commands: I) -> Result<()>
    where
        I: IntoIterator<Item = AOFCommand>,
    {
        self.sync()?;
        let old_size = self.size;

        let rewrite_path = rewrite_path(&self.path);
        {
            let rewrite_file = OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(&rewrite_path)?;
            let mut writer = BufWriter::new(rewrite_file);
            for command in commands {
                writer.write_all(&encode_frame(&command)?)?;
            }
            writer.flush()?;
            writer.get_ref().sync_all()?;
        }

        std::fs::rename(&rewrite_path, &self.path)?;

        let (file, writer, size) = Self::open_handles(&self.path)?;
        self.file = file;
        self.writer = writer;
        self.size = size;

        info!(
            path = %self.path.display(),
            old_size,
            new_size = size,
            "rewrote AOF"
        );
        Ok(())
    }

    /// Flush buffered writes to the OS
    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }

    /// Flush and sync to disk
    pub fn sync(&mut self) -> Result<()> {
        self.writer.flush()?;
        self.file.sync_all()?;
        self.last_sync = Instant::now();
        self.sync_count += 1;
        Ok(())
    }
}

impl Drop for AOFFile {
    fn drop(&mut self) {
        // Best effort flush on drop, ignore errors
        let _ = self.writer.flush();
    }
}

/// Fixed-width integers, little endian; trailing bytes in a frame are an error.
fn codec() -> impl Options {
    bincode::DefaultOptions::new().with_fixint_encoding()
}

fn decode_command(payload: &[u8]) -> bincode::Result<AOFCommand> {
    codec().deserialize(payload)
}

/// Whether `bytes` holds a whole decodable frame at any offset. A torn final
/// append never does, so finding one means an earlier header is corrupt.
fn contains_complete_frame(bytes: &[u8]) -> bool {
    let header_len = FRAME_HEADER_LEN as usize;
    (0..bytes.len().saturating_sub(header_len)).any(|start| {
        let mut header = [0u8; FRAME_HEADER_LEN as usize];
        header.copy_from_slice(&bytes[start..start + header_len]);
        let len = u32::from_be_bytes(header) as usize;
        let payload_start = start + header_len;
        len > 0
            && len <= bytes.len() - payload_start
            && decode_command(&bytes[payload_start..payload_start + len]).is_ok()
    })
}

fn encode_frame(command: &AOFCommand) -> Result<Bytes> {
    let payload = codec().serialize(command)?;
    let len = u32::try_from(payload.len())
        .map_err(|_| LocusError::Serialization("AOF frame exceeds 4 GiB".to_string()))?;

    let mut buf = BytesMut::with_capacity(FRAME_HEADER_LEN as usize + payload.len());
    buf.put_u32(len);
    buf.put_slice(&payload);
    Ok(buf.freeze())
}

/// Like `read_exact`, but reports how much was read instead of failing at EOF.
fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

fn rewrite_path(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(".rewrite");
    PathBuf::from(name)
}

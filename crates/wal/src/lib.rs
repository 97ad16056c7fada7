//! # Wal — write-ahead log
//!
//! Durability for in-flight memtable writes between flushes. The log is a
//! directory of generation-numbered files (`wal00000000000000000001`, ...,
//! ascending), each holding a plain sequence of [`segment::KeyValueEntry`]
//! encodings — there is no CRC framing here, unlike the block format the
//! `segment` crate uses for on-disk segments. A truncated trailing record
//! (the tell-tale sign of a crash mid-append) is tolerated by replay and
//! simply dropped; only a structurally invalid length field is reported
//! as corruption.
//!
//! ```text
//! wal-dir/
//!   wal00000000000000000001   <- oldest, fully flushed, eligible for deletion
//!   wal00000000000000000002
//!   wal00000000000000000003   <- current, still being appended to
//! ```
//!
//! [`WalWriter::start_next`] rolls over to a new generation without
//! touching older files; the caller (the engine's flush path) deletes a
//! generation only after its memtable contents are durably flushed to a
//! segment and recorded in the manifest.

mod error;

pub use error::WalError;

use segment::KeyValueEntry;
use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

const FILE_PREFIX: &str = "wal";

fn generation_path(dir: &Path, generation: u64) -> PathBuf {
    dir.join(format!("{FILE_PREFIX}{generation:020}"))
}

fn parse_generation(file_name: &str) -> Option<u64> {
    file_name.strip_prefix(FILE_PREFIX)?.parse().ok()
}

/// Lists existing WAL generations under `dir`, ascending.
pub fn list_generations(dir: &Path) -> Result<Vec<u64>, WalError> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut generations = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if let Some(name) = entry.file_name().to_str() {
            if let Some(gen) = parse_generation(name) {
                generations.push(gen);
            }
        }
    }
    generations.sort_unstable();
    Ok(generations)
}

/// Appends records to the current WAL generation.
pub struct WalWriter {
    dir: PathBuf,
    generation: u64,
    file: BufWriter<File>,
    fsync: bool,
    bytes_written: u64,
}

impl WalWriter {
    /// Opens (creating if absent) the file for `generation`, appending to
    /// it if it already has content.
    pub fn open(dir: &Path, generation: u64, fsync: bool) -> Result<Self, WalError> {
        fs::create_dir_all(dir)?;
        let path = generation_path(dir, generation);
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let bytes_written = file.metadata()?.len();
        Ok(Self {
            dir: dir.to_path_buf(),
            generation,
            file: BufWriter::new(file),
            fsync,
            bytes_written,
        })
    }

    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    #[must_use]
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    /// Appends one record, flushing the stream buffer (and, if `fsync` is
    /// enabled, calling `fsync` on the file) before returning.
    pub fn append(&mut self, key: &str, value: &str) -> Result<(), WalError> {
        let entry = KeyValueEntry::set(key.to_string(), value.to_string())?;
        entry.write_to(&mut self.file)?;
        self.file.flush()?;
        if self.fsync {
            self.file.get_ref().sync_all()?;
        }
        self.bytes_written += entry.encoded_len() as u64;
        Ok(())
    }

    /// Closes the current generation and opens the next one, returning the
    /// new writer. The caller decides when the old generation's file can
    /// be deleted — only after its contents are flushed to a segment and
    /// durably recorded in the manifest.
    pub fn start_next(self) -> Result<Self, WalError> {
        let next_generation = self.generation + 1;
        let dir = self.dir.clone();
        let fsync = self.fsync;
        drop(self.file);
        Self::open(&dir, next_generation, fsync)
    }
}

/// Replays every record across all WAL generations in `dir`, oldest
/// first, invoking `on_record` for each. Used at startup to rebuild the
/// memtable before the engine accepts new writes.
pub fn replay<F: FnMut(&str, &str)>(dir: &Path, mut on_record: F) -> Result<(), WalError> {
    for generation in list_generations(dir)? {
        let path = generation_path(dir, generation);
        let mut reader = BufReader::new(File::open(&path)?);
        loop {
            match KeyValueEntry::try_read_from(&mut reader)? {
                Some(entry) => on_record(&entry.key, &entry.value),
                None => break,
            }
        }
    }
    Ok(())
}

/// Deletes the WAL file for `generation`. Called once its contents are
/// durably persisted elsewhere. Missing files are not an error — a
/// generation may already have been removed by a prior crash-recovery run.
pub fn remove_generation(dir: &Path, generation: u64) -> Result<(), WalError> {
    let path = generation_path(dir, generation);
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(WalError::Io(e)),
    }
}

//! # Manifest — durable record of which segments are live
//!
//! The manifest is an append-only ledger of `+path` / `-path` lines, one
//! segment-path operation per line (`level<n>/seg<num>`, matching the
//! on-disk layout the engine's level directories use). Replaying the
//! ledger in order yields the current live-segment set; the manifest
//! itself never has to be rewritten for an ordinary add or remove, only
//! appended to, which keeps the common-case write cheap.
//!
//! ```text
//! +level0/seg00000000000000000001
//! +level0/seg00000000000000000002
//! -level0/seg00000000000000000001
//! +level1/seg00000000000000000010
//! ```
//!
//! Left unchecked, the ledger grows without bound as segments are
//! compacted away. [`Manifest::add`] and [`Manifest::remove`] count lines
//! written since the last rewrite and, once that count passes
//! [`SNAPSHOT_THRESHOLD`], collapse the ledger down to a `+`-only listing
//! of the current live set via [`Manifest::rewrite_snapshot`] — the same
//! write-tmp-fsync-rename idiom used for segment files.
//!
//! A truncated final line (the ledger file cut off mid-append by a crash)
//! is dropped rather than treated as corruption; only a malformed
//! complete line is.

mod error;

pub use error::ManifestError;

use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

/// Number of ledger lines appended before the next add/remove triggers a
/// snapshot rewrite.
pub const SNAPSHOT_THRESHOLD: u64 = 1000;

const MANIFEST_FILENAME: &str = "MANIFEST";
const MANIFEST_TMP_FILENAME: &str = "MANIFEST.tmp";

/// Durable, append-only ledger of live segment paths.
#[derive(Debug)]
pub struct Manifest {
    path: PathBuf,
    live: Vec<String>,
    lines_since_snapshot: u64,
}

impl Manifest {
    /// Loads an existing manifest from `dir/MANIFEST`, or starts an empty
    /// one if the file does not exist yet.
    pub fn load_or_create(dir: &Path) -> Result<Self, ManifestError> {
        let path = dir.join(MANIFEST_FILENAME);
        if !path.exists() {
            return Ok(Self {
                path,
                live: Vec::new(),
                lines_since_snapshot: 0,
            });
        }

        let file = File::open(&path)?;
        let reader = BufReader::new(file);
        let mut live: Vec<String> = Vec::new();
        let mut lines_since_snapshot = 0u64;

        let raw_lines: Vec<String> = reader.lines().collect::<Result<_, _>>()?;
        let file_ends_with_newline = {
            let bytes = fs::read(&path)?;
            bytes.last() == Some(&b'\n')
        };

        for (i, line) in raw_lines.iter().enumerate() {
            let is_last = i + 1 == raw_lines.len();
            let trimmed = line.trim_end();
            if trimmed.is_empty() {
                continue;
            }

            let (op, segment_path) = if trimmed.len() >= 2 {
                trimmed.split_at(1)
            } else {
                if is_last && !file_ends_with_newline {
                    continue; // truncated tail, not an error
                }
                return Err(ManifestError::Corrupt(format!(
                    "malformed ledger line: {trimmed:?}"
                )));
            };

            match op {
                "+" => {
                    if !live.iter().any(|p| p == segment_path) {
                        live.push(segment_path.to_string());
                    }
                    lines_since_snapshot += 1;
                }
                "-" => {
                    live.retain(|p| p != segment_path);
                    lines_since_snapshot += 1;
                }
                _ => {
                    if is_last && !file_ends_with_newline {
                        continue;
                    }
                    return Err(ManifestError::Corrupt(format!(
                        "unknown ledger op in line: {trimmed:?}"
                    )));
                }
            }
        }

        Ok(Self {
            path,
            live,
            lines_since_snapshot,
        })
    }

    /// Currently live segment paths, in the order they first appeared.
    #[must_use]
    pub fn live_segments(&self) -> &[String] {
        &self.live
    }

    /// Records that `segment_path` is now live, appending a `+` line and
    /// rewriting the full snapshot if the ledger has grown past
    /// [`SNAPSHOT_THRESHOLD`] lines since the last rewrite.
    pub fn add(&mut self, segment_path: String) -> Result<(), ManifestError> {
        self.append_line(&format!("+{segment_path}"))?;
        if !self.live.iter().any(|p| p == &segment_path) {
            self.live.push(segment_path);
        }
        self.lines_since_snapshot += 1;
        self.maybe_snapshot()
    }

    /// Records that `segment_path` is no longer live.
    pub fn remove(&mut self, segment_path: &str) -> Result<(), ManifestError> {
        self.append_line(&format!("-{segment_path}"))?;
        self.live.retain(|p| p != segment_path);
        self.lines_since_snapshot += 1;
        self.maybe_snapshot()
    }

    /// Atomically removes `old_paths` and adds `new_paths` as a single
    /// ledger transaction (each still its own line, but flushed together
    /// before any caller can observe a partially-applied state in memory).
    pub fn replace(&mut self, old_paths: &[String], new_paths: &[String]) -> Result<(), ManifestError> {
        let mut body = String::new();
        for p in old_paths {
            body.push('-');
            body.push_str(p);
            body.push('\n');
        }
        for p in new_paths {
            body.push('+');
            body.push_str(p);
            body.push('\n');
        }
        self.append_raw(&body)?;

        self.live.retain(|p| !old_paths.contains(p));
        for p in new_paths {
            if !self.live.iter().any(|existing| existing == p) {
                self.live.push(p.clone());
            }
        }
        self.lines_since_snapshot += (old_paths.len() + new_paths.len()) as u64;
        self.maybe_snapshot()
    }

    fn maybe_snapshot(&mut self) -> Result<(), ManifestError> {
        if self.lines_since_snapshot > SNAPSHOT_THRESHOLD {
            self.rewrite_snapshot()?;
        }
        Ok(())
    }

    fn append_line(&self, line: &str) -> Result<(), ManifestError> {
        let mut body = String::with_capacity(line.len() + 1);
        body.push_str(line);
        body.push('\n');
        self.append_raw(&body)
    }

    fn append_raw(&self, body: &str) -> Result<(), ManifestError> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(body.as_bytes())?;
        file.flush()?;
        file.sync_all()?;
        Ok(())
    }

    /// Collapses the ledger to a `+`-only listing of the current live set.
    pub fn rewrite_snapshot(&mut self) -> Result<(), ManifestError> {
        let tmp_path = self.path.with_file_name(MANIFEST_TMP_FILENAME);
        {
            let mut f = OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(&tmp_path)?;
            for p in &self.live {
                writeln!(f, "+{p}")?;
            }
            f.flush()?;
            f.sync_all()?;
        }
        fs::rename(&tmp_path, &self.path)?;
        if let Some(parent) = self.path.parent() {
            if let Ok(dir) = File::open(parent) {
                let _ = dir.sync_all();
            }
        }
        self.lines_since_snapshot = 0;
        Ok(())
    }
}

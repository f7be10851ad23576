//! Pool store — claim, read and list entries of a directory tree.
//!
//! Files in transit are stashed into a marker directory next to them so that
//! they stop appearing to concurrent or later listings, while staying readable
//! under their original logical path.
//!
//! ## On-disk layout
//!
//! ```text
//! <root>/incoming/report.csv          unclaimed, listed, claimable
//! <root>/incoming/.pop/archive.tar    claimed; still served as /incoming/archive.tar
//! ```
//!
//! A claim is a single `rename` from the directory into its marker directory.
//! When two processes race for the same file exactly one rename succeeds and
//! the other sees `NotFound` at the source. There is no in-process lock and no
//! cache: every call goes back to the filesystem.

use std::fs::{self, File};
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::error::{PopError, Result};
use crate::storage::census::PoolCensus;
use crate::storage::logical_path::LogicalPath;

// ─────────────────────────────── constants ───────────────────────────────────

/// Marker directory holding claimed entries under their original base name.
pub const MARKER_DIR: &str = ".pop";

/// Names starting with this are never claim candidates nor listed. Covers
/// [`MARKER_DIR`].
pub const RESERVED_PREFIX: char = '.';

pub fn is_reserved(name: &str) -> bool {
    name.starts_with(RESERVED_PREFIX)
}

fn is_missing(e: &io::Error) -> bool {
    matches!(e.kind(), ErrorKind::NotFound | ErrorKind::NotADirectory)
}

// ─────────────────────────────── types ───────────────────────────────────────

/// Where a logical path currently lives on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Located {
    /// A directory, always at its literal location.
    Dir(PathBuf),
    /// A file that has not been claimed.
    Unclaimed(PathBuf),
    /// A file that has been claimed and now sits in the marker directory.
    Claimed(PathBuf),
}

impl Located {
    pub fn path(&self) -> &Path {
        match self {
            Located::Dir(p) | Located::Unclaimed(p) | Located::Claimed(p) => p,
        }
    }
}

/// One visible child of a pool directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub name: String,
    pub is_dir: bool,
    /// File length in bytes; 0 for directories.
    pub len: u64,
}

// ─────────────────────────────── PoolStore ───────────────────────────────────

/// Maps logical paths under `root` to their physical location.
#[derive(Debug, Clone)]
pub struct PoolStore {
    root: PathBuf,
}

impl PoolStore {
    /// Open a store over an existing directory.
    pub fn new(root: &Path) -> Result<Self> {
        match fs::metadata(root) {
            Ok(meta) if meta.is_dir() => Ok(Self { root: root.to_path_buf() }),
            Ok(_) => Err(PopError::Config(format!("pool root {root:?} is not a directory"))),
            Err(e) => Err(PopError::Config(format!("pool root {root:?}: {e}"))),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Unclaimed location of `logical`.
    pub fn literal_path(&self, logical: &LogicalPath) -> PathBuf {
        self.root.join(logical.to_relative_path())
    }

    /// Claimed location of `logical`: same directory, marker subdirectory, same
    /// base name. `None` for the root.
    pub fn hidden_path(&self, logical: &LogicalPath) -> Option<PathBuf> {
        let name = logical.file_name()?;
        Some(self.literal_path(&logical.parent()).join(MARKER_DIR).join(name))
    }

    /// Move `logical` into its marker directory, creating the marker directory
    /// on first use. Returns the raw I/O error so the caller can tell a
    /// vanished source (`NotFound`) from a real failure.
    pub fn stash(&self, logical: &LogicalPath) -> io::Result<PathBuf> {
        let src = self.literal_path(logical);
        let dst = self.hidden_path(logical).ok_or_else(|| {
            io::Error::new(ErrorKind::InvalidInput, "cannot stash the pool root")
        })?;

        if let Some(marker) = dst.parent() {
            match fs::create_dir(marker) {
                Ok(()) => debug!(marker = ?marker, "Created marker directory"),
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {}
                Err(e) => return Err(e),
            }
        }

        fs::rename(&src, &dst)?;
        Ok(dst)
    }

    /// Pick one eligible file directly inside `dir` and stash it.
    ///
    /// Candidates are taken in `read_dir` order. Directories and reserved names
    /// are skipped, as is any file whose claimed form already exists (renaming
    /// over it would destroy a transfer in flight). Names with no logical path
    /// (non-UTF-8, NUL, or `\` on Windows) are skipped with a warning.
    /// A candidate that vanishes before the rename was taken by someone else
    /// and the scan moves on. Returns the claimed entry's logical path.
    pub fn claim(&self, dir: &LogicalPath) -> Result<LogicalPath> {
        let dir_path = self.literal_path(dir);
        let lookup = |source: io::Error| PopError::Lookup { path: dir.to_string(), source };

        for entry in fs::read_dir(&dir_path).map_err(lookup)? {
            let entry = entry.map_err(lookup)?;

            let file_type = match entry.file_type() {
                Ok(t) => t,
                Err(e) if is_missing(&e) => continue,
                Err(e) => return Err(lookup(e)),
            };
            if file_type.is_dir() {
                continue;
            }

            let Ok(name) = entry.file_name().into_string() else {
                warn!(entry = ?entry.path(), "Non-UTF-8 name has no logical path, never claimable");
                continue;
            };
            if is_reserved(&name) {
                continue;
            }
            let Ok(logical) = dir.join(&name) else {
                warn!(name, "Name has no logical path, never claimable");
                continue;
            };

            // Usually a concurrent claimant that just won; otherwise a namesake
            // deposited while the earlier copy is still being fetched.
            if self.hidden_path(&logical).is_some_and(|p| p.exists()) {
                debug!(entry = %logical, "Claimed form already present, skipping");
                continue;
            }

            match self.stash(&logical) {
                Ok(_) => {
                    info!(entry = %logical, "Entry claimed");
                    return Ok(logical);
                }
                Err(e) if e.kind() == ErrorKind::NotFound => {
                    debug!(entry = %logical, "Lost claim race");
                }
                Err(source) => {
                    return Err(PopError::Stash { path: logical.to_string(), source });
                }
            }
        }

        Err(PopError::PoolExhausted(dir.to_string()))
    }

    /// Resolve `logical` without opening it. Directories resolve literally and
    /// never into the marker directory; files fall back to their claimed form.
    pub fn locate(&self, logical: &LogicalPath) -> Result<Located> {
        let literal = self.literal_path(logical);
        match fs::metadata(&literal) {
            Ok(meta) if meta.is_dir() => return Ok(Located::Dir(literal)),
            Ok(_) => return Ok(Located::Unclaimed(literal)),
            Err(e) if is_missing(&e) => {}
            Err(e) => return Err(e.into()),
        }

        if let Some(hidden) = self.hidden_path(logical) {
            match fs::metadata(&hidden) {
                Ok(meta) if meta.is_file() => return Ok(Located::Claimed(hidden)),
                Ok(_) => {}
                Err(e) if is_missing(&e) => {}
                Err(e) => return Err(e.into()),
            }
        }

        Err(PopError::NotFound(logical.to_string()))
    }

    /// Open the bytes behind `logical`, claimed or not.
    ///
    /// Blocking reader for in-process consumers. The HTTP layer resolves with
    /// [`locate`](Self::locate) instead and hands the path to `ServeFile`, which
    /// owns Range and conditional handling.
    pub fn open(&self, logical: &LogicalPath) -> Result<File> {
        match File::open(self.literal_path(logical)) {
            Ok(file) => {
                if file.metadata()?.is_dir() {
                    return Err(PopError::NotAFile(logical.to_string()));
                }
                return Ok(file);
            }
            Err(e) if is_missing(&e) => {}
            Err(e) => return Err(e.into()),
        }

        let hidden = self
            .hidden_path(logical)
            .ok_or_else(|| PopError::NotFound(logical.to_string()))?;
        match File::open(&hidden) {
            Ok(file) => {
                if !file.metadata()?.is_file() {
                    return Err(PopError::NotFound(logical.to_string()));
                }
                Ok(file)
            }
            Err(e) if is_missing(&e) => Err(PopError::NotFound(logical.to_string())),
            Err(e) => Err(e.into()),
        }
    }

    /// Visible children of `dir`, sorted by name. Claimed entries and the
    /// marker directory never show up.
    pub fn list(&self, dir: &LogicalPath) -> Result<Vec<Entry>> {
        let dir_path = self.literal_path(dir);
        let lookup = |source: io::Error| PopError::Lookup { path: dir.to_string(), source };

        let mut entries = Vec::new();
        for entry in fs::read_dir(&dir_path).map_err(lookup)? {
            let entry = entry.map_err(lookup)?;
            let Ok(name) = entry.file_name().into_string() else {
                continue;
            };
            if is_reserved(&name) {
                continue;
            }
            // Follow symlinks so a linked directory lists as a directory.
            let meta = match fs::metadata(entry.path()) {
                Ok(m) => m,
                Err(e) if is_missing(&e) => continue,
                Err(e) => return Err(e.into()),
            };
            let is_dir = meta.is_dir();
            entries.push(Entry { name, is_dir, len: if is_dir { 0 } else { meta.len() } });
        }

        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    /// Walk the subtree under `dir` and count unclaimed and claimed files per
    /// directory. Marker directories are attributed to their parent; other
    /// reserved directories are not descended into.
    pub fn census(&self, dir: &LogicalPath) -> Result<PoolCensus> {
        let mut census = PoolCensus::new();
        self.walk(dir, &mut census)?;
        Ok(census)
    }

    fn walk(&self, dir: &LogicalPath, census: &mut PoolCensus) -> Result<()> {
        census.visit(dir);
        let dir_path = self.literal_path(dir);
        let lookup = |source: io::Error| PopError::Lookup { path: dir.to_string(), source };

        for entry in fs::read_dir(&dir_path).map_err(lookup)? {
            let entry = entry.map_err(lookup)?;
            let Ok(name) = entry.file_name().into_string() else {
                continue;
            };
            let file_type = match entry.file_type() {
                Ok(t) => t,
                Err(e) if is_missing(&e) => continue,
                Err(e) => return Err(lookup(e)),
            };

            if name == MARKER_DIR && file_type.is_dir() {
                count_claimed(dir, &entry.path(), census)?;
                continue;
            }
            if is_reserved(&name) {
                continue;
            }

            if file_type.is_dir() {
                let Ok(child) = dir.join(&name) else {
                    continue;
                };
                match self.walk(&child, census) {
                    // Removed while we were walking.
                    Err(PopError::Lookup { source, .. }) if is_missing(&source) => {}
                    other => other?,
                }
            } else {
                match entry.metadata() {
                    Ok(meta) => census.record_unclaimed(dir, meta.len()),
                    Err(e) if is_missing(&e) => {}
                    Err(e) => return Err(e.into()),
                }
            }
        }
        Ok(())
    }
}

fn count_claimed(dir: &LogicalPath, marker: &Path, census: &mut PoolCensus) -> Result<()> {
    let lookup = |source: io::Error| PopError::Lookup { path: format!("{marker:?}"), source };
    for entry in fs::read_dir(marker).map_err(lookup)? {
        let entry = entry.map_err(lookup)?;
        match entry.metadata() {
            Ok(meta) if !meta.is_dir() => census.record_claimed(dir, meta.len()),
            Ok(_) => {}
            Err(e) if is_missing(&e) => {}
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}

//! Persistent coordinate → postal code cache.
//!
//! Reverse geocoding is slow and rate limited, so every resolved coordinate
//! is remembered across runs. The cache is a flat JSON object keyed by
//! [`Coordinate::cache_key`]:
//!
//! ```json
//! { "(32.7969, -96.8014)": "75204", "(14.5995, 120.9842)": null }
//! ```
//!
//! A `null` value records that the coordinate was resolved but no postal code
//! could be found in the address, so the lookup is not repeated.
//!
//! # Lifecycle
//!
//! The file is read once by [`LocationCache::open`] and written once by
//! [`LocationCache::flush`]. Entries are only ever added; the first value
//! stored for a key wins. A cache with unsaved additions flushes itself when
//! dropped. Nothing coordinates concurrent runs against the same file: the
//! last one to flush overwrites the others.

use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::exif::Coordinate;

/// In-memory view of the location cache plus the file it came from.
#[derive(Debug)]
pub struct LocationCache {
    path: Option<PathBuf>,
    precision: u32,
    entries: BTreeMap<String, Option<String>>,
    dirty: bool,
}

impl LocationCache {
    /// Load the cache stored at `path`.
    ///
    /// A missing or unparsable file yields an empty cache; that is the normal
    /// state on a first run and never an error.
    pub fn open(path: &Path, precision: u32) -> Self {
        log::info!("Loading location cache from {}", path.display());

        let entries = match std::fs::read_to_string(path) {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(entries) => entries,
                Err(e) => {
                    log::warn!(
                        "Location cache {} is not valid JSON, starting empty: {e}",
                        path.display()
                    );
                    BTreeMap::new()
                }
            },
            Err(e) => {
                log::warn!(
                    "Location cache {} cannot be read ({e}). This is expected on a first run.",
                    path.display()
                );
                BTreeMap::new()
            }
        };

        Self {
            path: Some(path.to_path_buf()),
            precision,
            entries,
            dirty: false,
        }
    }

    /// A cache with no backing file. Deduplicates lookups within a run only.
    pub fn in_memory(precision: u32) -> Self {
        Self {
            path: None,
            precision,
            entries: BTreeMap::new(),
            dirty: false,
        }
    }

    /// Look up a coordinate.
    ///
    /// `None` is a miss. `Some(None)` is a cached "no postal code" result.
    pub fn get(&self, coordinate: &Coordinate) -> Option<Option<&str>> {
        self.entries
            .get(&coordinate.cache_key(self.precision))
            .map(|code| code.as_deref())
    }

    /// Record a resolution. Existing entries are never overwritten.
    ///
    /// Returns `true` if the entry was added.
    pub fn insert(&mut self, coordinate: &Coordinate, postal_code: Option<String>) -> bool {
        let key = coordinate.cache_key(self.precision);
        if self.entries.contains_key(&key) {
            log::debug!("Cache already holds {key}, keeping the existing value");
            return false;
        }
        self.entries.insert(key, postal_code);
        self.dirty = true;
        true
    }

    /// Write unsaved additions to disk.
    ///
    /// Failures are logged and swallowed: a cache that cannot be saved only
    /// costs extra lookups on the next run.
    pub fn flush(&mut self) {
        if !self.dirty {
            return;
        }
        let Some(path) = self.path.as_deref() else {
            return;
        };

        match self.save(path) {
            Ok(()) => {
                log::info!(
                    "Saved {} location(s) to {}",
                    self.entries.len(),
                    path.display()
                );
                self.dirty = false;
            }
            Err(e) => {
                log::warn!("Location cache {} cannot be written: {e:#}", path.display());
            }
        }
    }

    fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).context("Failed to create cache directory")?;
        }
        let contents =
            serde_json::to_string_pretty(&self.entries).context("Failed to serialize cache")?;
        std::fs::write(path, contents).context("Failed to write cache file")?;
        Ok(())
    }

    /// Number of cached coordinates.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether there are additions not yet written to disk.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn precision(&self) -> u32 {
        self.precision
    }
}

impl Drop for LocationCache {
    fn drop(&mut self) {
        self.flush();
    }
}

/*
    Copyright 2025 TII (SSRC) and the contributors
    SPDX-License-Identifier: Apache-2.0
*/
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use log::{debug, error, warn};
use tempfile::NamedTempFile;

use crate::model::LocationId;

/// Single-value store for the last location the user picked.
///
/// The file holds exactly one line: the location's display name.
#[derive(Debug, Clone)]
pub struct SettingsStore {
    path: PathBuf,
}

impl SettingsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Persisted location, if it is one of `known`.
    ///
    /// A missing file is created empty. A stale value is ignored but left in
    /// place until the next [`save`](Self::save).
    pub fn load<'a>(&self, known: impl IntoIterator<Item = &'a str>) -> Option<LocationId> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                if let Err(err) = self.create_empty() {
                    error!("Could not create {}: {err}", self.path.display());
                }
                return None;
            }
            Err(err) => {
                error!("Could not read file: {}: {err}", self.path.display());
                return None;
            }
        };

        let saved = content.lines().next()?.trim_end();
        if saved.is_empty() {
            return None;
        }

        if known.into_iter().any(|k| k == saved) {
            Some(saved.to_owned())
        } else {
            warn!("Ignoring saved location {saved:?}, it is not offered anymore");
            None
        }
    }

    /// Replace the persisted location. The file is swapped in whole, readers
    /// never see a partial write.
    pub fn save(&self, location: &str) -> io::Result<()> {
        let dir = self.parent_dir();
        fs::create_dir_all(dir)?;

        let mut tmp = NamedTempFile::new_in(dir)?;
        tmp.write_all(location.as_bytes())?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|e| e.error)?;

        debug!("Saved location {location:?} to {}", self.path.display());
        Ok(())
    }

    fn create_empty(&self) -> io::Result<()> {
        fs::create_dir_all(self.parent_dir())?;
        fs::File::create(&self.path)?;
        Ok(())
    }

    fn parent_dir(&self) -> &Path {
        match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        }
    }
}

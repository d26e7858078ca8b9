//! Durable persistence of the persona catalog and its backup history.
//!
//! Writes go through a temp-file-then-rename so a crash mid-write never leaves
//! a partial document behind. Backups are whole-file snapshots named with a
//! sortable UTC timestamp, newest N retained.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use chrono::Utc;

use crate::catalog::Catalog;
use crate::error::EngineError;

const BACKUP_PREFIX: &str = "personas-";
const BACKUP_SUFFIX: &str = ".json";

/// Opaque comparable value used to detect whether a cached catalog is stale
/// relative to its persisted source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FreshnessToken {
    modified_ns: u128,
    len: u64,
}

/// Immutable copy of a catalog document at a point in time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupSnapshot {
    /// Sortable timestamp identifier (the file stem).
    pub id: String,
    pub path: PathBuf,
}

pub struct CatalogStore {
    path: PathBuf,
    backup_dir: PathBuf,
    backup_count: usize,
}

impl CatalogStore {
    pub fn new(path: PathBuf, backup_dir: PathBuf, backup_count: usize) -> Self {
        Self {
            path,
            backup_dir,
            backup_count,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether a catalog document currently exists on disk.
    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Current freshness token of the persisted document, `None` if missing.
    pub fn current_token(&self) -> Result<Option<FreshnessToken>, EngineError> {
        match fs::metadata(&self.path) {
            Ok(meta) => {
                let modified = meta
                    .modified()
                    .map_err(|e| EngineError::storage(&self.path, e))?;
                let modified_ns = modified
                    .duration_since(UNIX_EPOCH)
                    .map(|d| d.as_nanos())
                    .unwrap_or(0);
                Ok(Some(FreshnessToken {
                    modified_ns,
                    len: meta.len(),
                }))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(EngineError::storage(&self.path, e)),
        }
    }

    /// Read and parse the persisted catalog.
    pub fn read(&self) -> Result<(Catalog, FreshnessToken), EngineError> {
        let text =
            fs::read_to_string(&self.path).map_err(|e| EngineError::storage(&self.path, e))?;
        let (catalog, _) = Catalog::parse_document(&text, false)?;
        let token = self
            .current_token()?
            .ok_or_else(|| {
                EngineError::storage(
                    &self.path,
                    std::io::Error::new(std::io::ErrorKind::NotFound, "catalog removed mid-read"),
                )
            })?;
        Ok((catalog, token))
    }

    /// Atomically replace the persisted document.
    pub fn write(&self, catalog: &Catalog) -> Result<FreshnessToken, EngineError> {
        let text = catalog.to_document_string()?;

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| EngineError::storage(parent, e))?;
        }

        let tmp_path = self.path.with_extension("json.tmp");
        fs::write(&tmp_path, text).map_err(|e| EngineError::storage(&tmp_path, e))?;
        fs::rename(&tmp_path, &self.path).map_err(|e| EngineError::storage(&self.path, e))?;

        self.current_token()?.ok_or_else(|| {
            EngineError::storage(
                &self.path,
                std::io::Error::new(std::io::ErrorKind::NotFound, "catalog missing after write"),
            )
        })
    }

    /// Copy the current document into the backup sequence, then prune beyond
    /// the retention count. Fails if there is no current document.
    pub fn snapshot(&self) -> Result<BackupSnapshot, EngineError> {
        fs::create_dir_all(&self.backup_dir)
            .map_err(|e| EngineError::storage(&self.backup_dir, e))?;

        // Ids must sort strictly after every id ever issued, not just those
        // still on disk: retention ordering relies on it, and a pruned base
        // name must never be reused within the same millisecond.
        let stamp = Utc::now().format("%Y%m%dT%H%M%S%3fZ").to_string();
        let mut id = format!("{BACKUP_PREFIX}{stamp}");
        if let Some(latest) = self.list_backups()?.into_iter().next() {
            if id <= latest.id {
                id = next_backup_id(&latest.id);
            }
        }
        let target = self.backup_dir.join(format!("{id}{BACKUP_SUFFIX}"));

        fs::copy(&self.path, &target).map_err(|e| EngineError::storage(&self.path, e))?;
        tracing::debug!("Catalog backup written to {:?}", target);

        self.prune_backups()?;
        Ok(BackupSnapshot { id, path: target })
    }

    /// Backups ordered newest first.
    pub fn list_backups(&self) -> Result<Vec<BackupSnapshot>, EngineError> {
        let entries = match fs::read_dir(&self.backup_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(EngineError::storage(&self.backup_dir, e)),
        };

        let mut backups = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| EngineError::storage(&self.backup_dir, e))?;
            let name = entry.file_name().to_string_lossy().to_string();
            if let Some(stem) = name
                .strip_suffix(BACKUP_SUFFIX)
                .filter(|stem| stem.starts_with(BACKUP_PREFIX))
            {
                backups.push(BackupSnapshot {
                    id: stem.to_string(),
                    path: entry.path(),
                });
            }
        }

        // Timestamp ids are zero-padded, so lexicographic order is temporal.
        backups.sort_by(|a, b| b.id.cmp(&a.id));
        Ok(backups)
    }

    /// Restore a snapshot as the current catalog (inverse of `write`).
    pub fn restore(&self, snapshot: &BackupSnapshot) -> Result<(Catalog, FreshnessToken), EngineError> {
        let text = fs::read_to_string(&snapshot.path)
            .map_err(|e| EngineError::storage(&snapshot.path, e))?;
        let (catalog, _) = Catalog::parse_document(&text, false)?;
        let token = self.write(&catalog)?;
        Ok((catalog, token))
    }

    fn prune_backups(&self) -> Result<(), EngineError> {
        let backups = self.list_backups()?;
        for stale in backups.iter().skip(self.backup_count) {
            fs::remove_file(&stale.path).map_err(|e| EngineError::storage(&stale.path, e))?;
            tracing::debug!("Pruned stale catalog backup {:?}", stale.path);
        }
        Ok(())
    }
}

/// Smallest id that sorts lexicographically strictly after `latest`. Bumps an
/// existing zero-padded sequence suffix when possible, otherwise appends one.
fn next_backup_id(latest: &str) -> String {
    if let Some((base, seq)) = latest.rsplit_once('-') {
        if seq.len() == 3 && seq.chars().all(|c| c.is_ascii_digit()) {
            if let Ok(n) = seq.parse::<u32>() {
                let bumped = format!("{base}-{:03}", n + 1);
                if bumped.as_str() > latest {
                    return bumped;
                }
            }
        }
    }
    format!("{latest}-001")
}

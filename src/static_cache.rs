//! Local cache of the static GTFS archive.
//!
//! One extracted copy is kept per archive version, named after the file the
//! download URL redirects to. Archives and extractions are written to
//! temporary paths inside the cache and renamed into place, so an
//! interrupted run never leaves a half-written version behind.

use anyhow::{Context, Result, bail};
use reqwest::Url;
use std::fs;
use std::io::{Cursor, Write};
use std::path::PathBuf;
use tracing::{debug, info};
use zip::ZipArchive;

use crate::fetch::{HttpClient, fetch_bytes, resolve_final_url};
use crate::schedule::tables::{GtfsTable, RouteRecord, StopRecord, StopTimeRecord, TripRecord};

pub const DEFAULT_VERSION: &str = "gtfs_static";

const REQUIRED_FILES: [&str; 4] = [
    RouteRecord::FILE_NAME,
    TripRecord::FILE_NAME,
    StopTimeRecord::FILE_NAME,
    StopRecord::FILE_NAME,
];

/// Version label for the archive at `url`: its file name without extension.
pub fn archive_version(url: &Url) -> String {
    url.path_segments()
        .and_then(|mut segments| segments.next_back())
        .map(|name| name.strip_suffix(".zip").unwrap_or(name))
        .filter(|name| !name.is_empty() && !name.starts_with('.'))
        .unwrap_or(DEFAULT_VERSION)
        .to_string()
}

pub struct StaticCache {
    dir: PathBuf,
}

impl StaticCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Directory holding the extracted tables of `version`.
    pub fn tables_dir(&self, version: &str) -> PathBuf {
        self.dir.join(version)
    }

    /// The extracted tables of `version`, if already installed.
    pub fn cached(&self, version: &str) -> Option<PathBuf> {
        let dir = self.tables_dir(version);
        dir.is_dir().then_some(dir)
    }

    /// Returns the tables directory for the current archive at `url`,
    /// downloading and installing it first when it is not cached yet.
    #[tracing::instrument(skip(self, client), fields(cache_dir = %self.dir.display()))]
    pub async fn ensure<C: HttpClient>(&self, client: &C, url: &str) -> Result<PathBuf> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("failed to create {}", self.dir.display()))?;

        let final_url = resolve_final_url(client, url).await?;
        let version = archive_version(&final_url);

        if let Some(dir) = self.cached(&version) {
            info!(version = %version, "Static schedule already up to date");
            return Ok(dir);
        }

        info!(version = %version, url = %final_url, "Downloading static schedule");
        let bytes = fetch_bytes(client, final_url.as_str()).await?;
        debug!(bytes = bytes.len(), "Static archive received");

        let dir = self.install(&version, &bytes)?;
        info!(version = %version, dir = %dir.display(), "Static schedule updated");
        Ok(dir)
    }

    /// Stores and extracts `archive` as `version`, then removes older versions.
    pub fn install(&self, version: &str, archive: &[u8]) -> Result<PathBuf> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("failed to create {}", self.dir.display()))?;

        let archive_path = self.dir.join(format!("{version}.zip"));
        let mut tmp = tempfile::NamedTempFile::new_in(&self.dir)?;
        tmp.write_all(archive)?;
        tmp.persist(&archive_path)
            .with_context(|| format!("failed to write {}", archive_path.display()))?;

        let staging = tempfile::TempDir::new_in(&self.dir)?;
        ZipArchive::new(Cursor::new(archive))
            .and_then(|mut zip| zip.extract(staging.path()))
            .context("failed to extract static archive")?;

        for file in REQUIRED_FILES {
            if !staging.path().join(file).is_file() {
                bail!("static archive {version} has no {file}");
            }
        }

        let target = self.tables_dir(version);
        fs::rename(staging.path(), &target)
            .with_context(|| format!("failed to install {}", target.display()))?;

        self.prune(version)?;
        Ok(target)
    }

    /// Deletes every cached file and directory that is not `version`.
    fn prune(&self, version: &str) -> Result<()> {
        let keep_archive = format!("{version}.zip");
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            let name = entry.file_name();
            if name == version || name == keep_archive.as_str() {
                continue;
            }
            let path = entry.path();
            debug!(path = %path.display(), "Removing stale cache entry");
            if entry.file_type()?.is_dir() {
                fs::remove_dir_all(&path)?;
            } else {
                fs::remove_file(&path)?;
            }
        }
        Ok(())
    }
}

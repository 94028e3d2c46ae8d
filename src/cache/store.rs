use std::{
    fs,
    io::ErrorKind,
    path::PathBuf,
};

use crate::{cache::YearCache, prelude::*};

/// One JSON document per device per year: `<base_dir>/<device_id>/<year>.json`.
///
/// Every operation is best-effort: failures are logged and never propagated.
#[derive(Clone, Debug)]
pub struct Store {
    base_dir: PathBuf,
}

impl Store {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self { base_dir: base_dir.into() }
    }

    fn device_dir(&self, device_id: &str) -> Result<PathBuf> {
        ensure!(!device_id.is_empty(), "empty device ID");
        ensure!(
            !device_id.contains(['/', '\\']) && device_id != "." && device_id != "..",
            "device ID `{device_id}` is not a valid directory name",
        );
        Ok(self.base_dir.join(device_id))
    }

    fn path(&self, device_id: &str, year: i32) -> Result<PathBuf> {
        Ok(self.device_dir(device_id)?.join(format!("{year}.json")))
    }

    /// Load the year, falling back to the empty document if it is absent or unusable.
    #[instrument(skip_all, fields(device_id = device_id, year = year))]
    pub fn load(&self, device_id: &str, year: i32) -> YearCache {
        self.load_fallibly(device_id, year).unwrap_or_else(|error| {
            warn!(error = format!("{error:#}"), "invalid cache, starting from scratch");
            YearCache::default()
        })
    }

    fn load_fallibly(&self, device_id: &str, year: i32) -> Result<YearCache> {
        let path = self.path(device_id, year)?;
        if !path.is_file() {
            debug!(path = %path.display(), "no cache yet");
            return Ok(YearCache::default());
        }
        let bytes =
            fs::read(&path).with_context(|| format!("failed to read `{}`", path.display()))?;
        let cache = YearCache::from_json(&bytes)
            .with_context(|| format!("failed to parse `{}`", path.display()))?;
        debug!(n_days = cache.daily.len(), n_empty = cache.meta.empty_dates.len(), "loaded");
        Ok(cache)
    }

    /// Rewrite the whole document.
    #[instrument(skip_all, fields(device_id = device_id, year = year))]
    pub fn save(&self, device_id: &str, year: i32, cache: &YearCache) {
        if let Err(error) = self.save_fallibly(device_id, year, cache) {
            error!(error = format!("{error:#}"), "failed to save the cache");
        }
    }

    fn save_fallibly(&self, device_id: &str, year: i32, cache: &YearCache) -> Result {
        let path = self.path(device_id, year)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create `{}`", parent.display()))?;
        }
        // Write next to the target first so that a crash does not leave a truncated document.
        let temporary_path = path.with_extension("json.tmp");
        fs::write(&temporary_path, cache.to_json()?)
            .with_context(|| format!("failed to write `{}`", temporary_path.display()))?;
        fs::rename(&temporary_path, &path)
            .with_context(|| format!("failed to replace `{}`", path.display()))?;
        debug!(n_days = cache.daily.len(), "saved");
        Ok(())
    }

    /// Delete one year, returns whether anything was deleted.
    #[instrument(skip_all, fields(device_id = device_id, year = year))]
    pub fn purge_year(&self, device_id: &str, year: i32) -> bool {
        let path = match self.path(device_id, year) {
            Ok(path) => path,
            Err(error) => {
                warn!(error = format!("{error:#}"), "cannot purge");
                return false;
            }
        };
        match fs::remove_file(&path) {
            Ok(()) => {
                info!(path = %path.display(), "purged");
                true
            }
            Err(error) if error.kind() == ErrorKind::NotFound => false,
            Err(error) => {
                warn!(path = %path.display(), %error, "failed to purge");
                false
            }
        }
    }

    /// Delete every year of the device, returns whether anything was deleted.
    #[instrument(skip_all, fields(device_id = device_id))]
    pub fn purge_device(&self, device_id: &str) -> bool {
        let path = match self.device_dir(device_id) {
            Ok(path) => path,
            Err(error) => {
                warn!(error = format!("{error:#}"), "cannot purge");
                return false;
            }
        };
        match fs::remove_dir_all(&path) {
            Ok(()) => {
                info!(path = %path.display(), "purged");
                true
            }
            Err(error) if error.kind() == ErrorKind::NotFound => false,
            Err(error) => {
                warn!(path = %path.display(), %error, "failed to purge");
                false
            }
        }
    }
}

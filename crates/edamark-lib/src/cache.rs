//! On-disk store of extracted SCR features keyed by session.
//!
//! A present cache is trusted verbatim; there is no staleness check against
//! the recordings it was computed from.

use anyhow::{Context, Result};
use log::info;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use crate::eda::ScrFeatures;
use crate::error::CacheError;
use crate::session::SessionKey;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeatureCache {
    pub entries: BTreeMap<SessionKey, ScrFeatures>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CacheStatus {
    Loaded,
    Computed,
}

impl FeatureCache {
    /// Read a cache file. `Ok(None)` when the file does not exist; a file that
    /// exists but cannot be read or decoded is an error.
    pub fn load(path: &Path) -> Result<Option<Self>, CacheError> {
        if !path.exists() {
            return Ok(None);
        }
        let text = fs::read_to_string(path).map_err(|source| CacheError::Unreadable {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&text)
            .map(Some)
            .map_err(|source| CacheError::Corrupt {
                path: path.to_path_buf(),
                source,
            })
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("creating {}", parent.display()))?;
            }
        }
        let file = fs::File::create(path).with_context(|| format!("creating {}", path.display()))?;
        serde_json::to_writer_pretty(file, self)?;
        Ok(())
    }

    /// Load the cache at `path`, or build it with `compute` and persist it.
    pub fn load_or_compute<F>(path: &Path, compute: F) -> Result<(Self, CacheStatus)>
    where
        F: FnOnce() -> Result<Self>,
    {
        if let Some(cache) = Self::load(path)? {
            info!("loaded {} cached feature sets from {}", cache.len(), path.display());
            return Ok((cache, CacheStatus::Loaded));
        }
        let cache = compute()?;
        cache.save(path)?;
        info!("computed {} feature sets into {}", cache.len(), path.display());
        Ok((cache, CacheStatus::Computed))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sample() -> FeatureCache {
        let mut entries = BTreeMap::new();
        entries.insert(
            "par1_s1_palm".parse().unwrap(),
            ScrFeatures {
                fs: 1024.0,
                onsets: vec![10],
                peaks: vec![40],
                amplitudes: vec![0.2],
            },
        );
        FeatureCache { entries }
    }

    #[test]
    fn computes_once_then_loads() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("pickled/feature_dicts.json");
        let (first, status) = FeatureCache::load_or_compute(&path, || Ok(sample())).unwrap();
        assert_eq!(status, CacheStatus::Computed);
        assert!(path.exists());
        let (second, status) =
            FeatureCache::load_or_compute(&path, || panic!("cache should be reused")).unwrap();
        assert_eq!(status, CacheStatus::Loaded);
        assert_eq!(first, second);
    }

    #[test]
    fn corrupt_cache_is_fatal() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("feature_dicts.json");
        fs::write(&path, "{ not json").unwrap();
        let err = FeatureCache::load_or_compute(&path, || Ok(sample())).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<CacheError>(),
            Some(CacheError::Corrupt { .. })
        ));
        assert!(err.to_string().contains("failed to load cache"));
    }

    #[test]
    fn absent_cache_loads_as_none() {
        let dir = tempdir().unwrap();
        assert!(FeatureCache::load(&dir.path().join("missing.json"))
            .unwrap()
            .is_none());
    }
}

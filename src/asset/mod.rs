use crate::error::{CallError, CallResult};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::{fmt, path::PathBuf, str::FromStr};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

pub mod ingest;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AudioCategory {
    Birthday,
    HouseWarming,
    Wedding,
    Naming,
    Love,
    Christmas,
    NewYear,
    Easter,
    Prayer,
    Sallah,
    Others,
}

impl AudioCategory {
    pub const ALL: [AudioCategory; 11] = [
        AudioCategory::Birthday,
        AudioCategory::HouseWarming,
        AudioCategory::Wedding,
        AudioCategory::Naming,
        AudioCategory::Love,
        AudioCategory::Christmas,
        AudioCategory::NewYear,
        AudioCategory::Easter,
        AudioCategory::Prayer,
        AudioCategory::Sallah,
        AudioCategory::Others,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AudioCategory::Birthday => "birthday",
            AudioCategory::HouseWarming => "house-warming",
            AudioCategory::Wedding => "wedding",
            AudioCategory::Naming => "naming",
            AudioCategory::Love => "love",
            AudioCategory::Christmas => "christmas",
            AudioCategory::NewYear => "new-year",
            AudioCategory::Easter => "easter",
            AudioCategory::Prayer => "prayer",
            AudioCategory::Sallah => "sallah",
            AudioCategory::Others => "others",
        }
    }
}

impl fmt::Display for AudioCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AudioCategory {
    type Err = CallError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AudioCategory::ALL
            .iter()
            .find(|c| c.as_str() == s)
            .copied()
            .ok_or_else(|| CallError::InvalidCategory(s.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioAsset {
    pub friendly_name: String,
    pub category: AudioCategory,
    pub asset_link: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub short_version_asset_link: Option<String>,
    pub upload_date: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetSummary {
    pub friendly_name: String,
    pub category: AudioCategory,
    pub asset_link: String,
    pub upload_date: DateTime<Utc>,
}

impl From<&AudioAsset> for AssetSummary {
    fn from(asset: &AudioAsset) -> Self {
        Self {
            friendly_name: asset.friendly_name.clone(),
            category: asset.category,
            asset_link: asset.asset_link.clone(),
            upload_date: asset.upload_date,
        }
    }
}

struct CatalogInner {
    assets: Vec<AudioAsset>,
    rng: StdRng,
}

/// Audio assets grouped by category.
///
/// Category resolution draws uniformly over the assets present at call time
/// using the injected generator, so a seeded `StdRng` makes selection
/// reproducible.
pub struct AssetCatalog {
    inner: Mutex<CatalogInner>,
    snapshot_path: Option<PathBuf>,
}

impl AssetCatalog {
    pub fn new(rng: StdRng) -> Self {
        Self {
            inner: Mutex::new(CatalogInner {
                assets: Vec::new(),
                rng,
            }),
            snapshot_path: None,
        }
    }

    pub fn rng_from_seed(seed: Option<u64>) -> StdRng {
        match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        }
    }

    /// Loads a catalog previously written to `path`; a missing file starts empty.
    pub fn with_snapshot(rng: StdRng, path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let assets: Vec<AudioAsset> = if path.exists() {
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("read asset catalog {}", path.display()))?;
            serde_json::from_str(&content)
                .with_context(|| format!("parse asset catalog {}", path.display()))?
        } else {
            Vec::new()
        };
        info!(
            path = %path.display(),
            assets = assets.len(),
            "asset catalog loaded"
        );
        Ok(Self {
            inner: Mutex::new(CatalogInner { assets, rng }),
            snapshot_path: Some(path),
        })
    }

    /// True when an asset already uses `name`, or `url` when one is given.
    pub async fn contains(&self, name: &str, url: Option<&str>) -> bool {
        let inner = self.inner.lock().await;
        inner
            .assets
            .iter()
            .any(|a| a.friendly_name == name || Some(a.asset_link.as_str()) == url)
    }

    pub async fn register_asset(
        &self,
        name: &str,
        category: AudioCategory,
        url: &str,
    ) -> CallResult<AudioAsset> {
        let mut inner = self.inner.lock().await;
        if inner
            .assets
            .iter()
            .any(|a| a.friendly_name == name || a.asset_link == url)
        {
            return Err(CallError::DuplicateAsset);
        }
        let asset = AudioAsset {
            friendly_name: name.to_string(),
            category,
            asset_link: url.to_string(),
            short_version_asset_link: None,
            upload_date: Utc::now(),
        };
        inner.assets.push(asset.clone());

        if let Some(path) = &self.snapshot_path {
            if let Err(e) = write_snapshot(path, &inner.assets).await {
                inner.assets.pop();
                return Err(CallError::internal(e));
            }
        }
        info!(name, %category, url, "asset registered");
        Ok(asset)
    }

    pub async fn resolve_by_category(&self, category: AudioCategory) -> CallResult<String> {
        let mut inner = self.inner.lock().await;
        let candidates: Vec<usize> = inner
            .assets
            .iter()
            .enumerate()
            .filter(|(_, a)| a.category == category)
            .map(|(idx, _)| idx)
            .collect();
        if candidates.is_empty() {
            warn!(%category, "no audio assets for category");
            return Err(CallError::NotFound(format!("audio for category {}", category)));
        }
        let pick = inner.rng.random_range(0..candidates.len());
        let asset = &inner.assets[candidates[pick]];
        debug!(%category, name = asset.friendly_name, "asset selected");
        Ok(asset.asset_link.clone())
    }

    pub async fn resolve_by_name(&self, name: &str) -> CallResult<String> {
        let inner = self.inner.lock().await;
        inner
            .assets
            .iter()
            .find(|a| a.friendly_name == name)
            .map(|a| a.asset_link.clone())
            .ok_or_else(|| CallError::NotFound(format!("asset {}", name)))
    }

    pub async fn list_by_category(&self, category: AudioCategory) -> Vec<AssetSummary> {
        let inner = self.inner.lock().await;
        inner
            .assets
            .iter()
            .filter(|a| a.category == category)
            .map(AssetSummary::from)
            .collect()
    }
}

async fn write_snapshot(path: &PathBuf, assets: &[AudioAsset]) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let content = serde_json::to_vec_pretty(assets)?;
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, content).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}

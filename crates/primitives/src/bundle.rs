//! Bundle planner
//!
//! Partitions one type's eligible assets into consecutive, non-overlapping
//! bundles of at most `max_assets_per_bundle` assets. Indices are 1-based
//! and assigned here, before any bundle runs, so keys derived from them do
//! not depend on completion order.

use qsbackup_core::config::{MAX_ASSETS_PER_BUNDLE, MIN_ASSETS_PER_BUNDLE};
use qsbackup_core::{AssetRecord, AssetType, ConfigError};
use serde::{Deserialize, Serialize};

/// One export unit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bundle {
    /// Asset type of every member
    pub asset_type: AssetType,
    /// 1-based position within the type's plan
    pub index: usize,
    /// Member ids in discovery order
    pub asset_ids: Vec<String>,
    /// Member ARNs, parallel to `asset_ids`
    pub asset_arns: Vec<String>,
    /// True iff the plan has exactly one bundle
    pub is_sole_bundle: bool,
}

impl Bundle {
    /// Number of assets in the bundle
    pub fn len(&self) -> usize {
        self.asset_ids.len()
    }

    /// Whether the bundle has no assets (never true for planned bundles)
    pub fn is_empty(&self) -> bool {
        self.asset_ids.is_empty()
    }

    /// Short reference used in logs and manifest error entries
    pub fn reference(&self) -> String {
        format!("{}#{}", self.asset_type.plural(), self.index)
    }
}

/// Ordered bundles for one asset type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundlePlan {
    /// Asset type
    pub asset_type: AssetType,
    /// Bundles in index order
    pub bundles: Vec<Bundle>,
}

impl BundlePlan {
    /// Whether there is nothing to export
    pub fn is_empty(&self) -> bool {
        self.bundles.is_empty()
    }

    /// Number of bundles
    pub fn len(&self) -> usize {
        self.bundles.len()
    }

    /// Total assets across all bundles
    pub fn asset_count(&self) -> usize {
        self.bundles.iter().map(Bundle::len).sum()
    }
}

/// Splits eligible assets into bundles
#[derive(Debug, Clone, Copy)]
pub struct BundlePlanner {
    max_assets_per_bundle: usize,
}

impl BundlePlanner {
    /// Create a planner, rejecting sizes outside `[1, 100]`
    pub fn new(max_assets_per_bundle: usize) -> Result<Self, ConfigError> {
        if !(MIN_ASSETS_PER_BUNDLE..=MAX_ASSETS_PER_BUNDLE).contains(&max_assets_per_bundle) {
            return Err(ConfigError::single(format!(
                "export.max_assets_per_bundle must be in [{}, {}], got {}",
                MIN_ASSETS_PER_BUNDLE, MAX_ASSETS_PER_BUNDLE, max_assets_per_bundle
            )));
        }
        Ok(BundlePlanner {
            max_assets_per_bundle,
        })
    }

    /// Configured bundle size
    pub fn max_assets_per_bundle(&self) -> usize {
        self.max_assets_per_bundle
    }

    /// Plan bundles for `eligible`, all of type `asset_type`
    ///
    /// An empty input yields an empty plan.
    pub fn plan(&self, asset_type: AssetType, eligible: &[AssetRecord]) -> BundlePlan {
        let chunks: Vec<&[AssetRecord]> = eligible.chunks(self.max_assets_per_bundle).collect();
        let sole = chunks.len() == 1;
        let bundles = chunks
            .into_iter()
            .enumerate()
            .map(|(i, chunk)| Bundle {
                asset_type,
                index: i + 1,
                asset_ids: chunk.iter().map(|a| a.id.clone()).collect(),
                asset_arns: chunk.iter().map(|a| a.arn.clone()).collect(),
                is_sole_bundle: sole,
            })
            .collect();
        BundlePlan {
            asset_type,
            bundles,
        }
    }
}

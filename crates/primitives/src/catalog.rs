//! Asset catalog filter
//!
//! Splits one type's discovery listing into the assets that can be exported
//! and the assets that cannot, with a reason for each exclusion. The filter
//! never reorders: eligible assets keep their discovery order.
//!
//! ## Rules
//!
//! | Rule | Applies to | Reason |
//! |------|-----------|--------|
//! | Uploaded-file source | datasets with `source_kind == FILE` | `UNSUPPORTED_SOURCE` |
//! | Cascade (opt-in) | any asset depending on an excluded id | `DEPENDS_ON_EXCLUDED` |
//!
//! Cascade needs memory across types, so it lives on [`CatalogFilter`] and
//! relies on types being filtered in dependency order.

use qsbackup_core::{AssetRecord, AssetType, SourceKind};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use tracing::debug;

/// Why an asset was left out of every bundle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExclusionReason {
    /// The export capability cannot bundle this asset's source
    UnsupportedSource,
    /// The asset reads from an asset that was itself excluded
    DependsOnExcluded,
}

impl fmt::Display for ExclusionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExclusionReason::UnsupportedSource => f.write_str("UNSUPPORTED_SOURCE"),
            ExclusionReason::DependsOnExcluded => f.write_str("DEPENDS_ON_EXCLUDED"),
        }
    }
}

/// One excluded asset
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Exclusion {
    /// The asset as discovered
    pub asset: AssetRecord,
    /// Why it was excluded
    pub reason: ExclusionReason,
}

/// Result of filtering one listing
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterOutcome {
    /// Exportable assets in discovery order
    pub eligible: Vec<AssetRecord>,
    /// Excluded assets in discovery order
    pub excluded: Vec<Exclusion>,
}

fn unsupported(asset: &AssetRecord) -> bool {
    asset.asset_type == AssetType::DataSet && asset.source_kind == SourceKind::File
}

/// Filter one listing with the uploaded-file rule only
pub fn filter_assets(assets: Vec<AssetRecord>) -> FilterOutcome {
    CatalogFilter::new(false).filter(assets)
}

/// Stateful filter carrying excluded ids across asset types
#[derive(Debug, Default)]
pub struct CatalogFilter {
    cascade: bool,
    excluded_ids: HashSet<String>,
}

impl CatalogFilter {
    /// Create a filter; `cascade` enables dependency-based exclusion
    pub fn new(cascade: bool) -> Self {
        CatalogFilter {
            cascade,
            excluded_ids: HashSet::new(),
        }
    }

    /// Ids excluded so far in this run
    pub fn excluded_ids(&self) -> &HashSet<String> {
        &self.excluded_ids
    }

    /// Filter one type's listing
    pub fn filter(&mut self, assets: Vec<AssetRecord>) -> FilterOutcome {
        let mut outcome = FilterOutcome::default();
        for asset in assets {
            let reason = if unsupported(&asset) {
                Some(ExclusionReason::UnsupportedSource)
            } else if self.cascade
                && asset
                    .dependency_ids
                    .iter()
                    .any(|dep| self.excluded_ids.contains(dep))
            {
                Some(ExclusionReason::DependsOnExcluded)
            } else {
                None
            };

            match reason {
                Some(reason) => {
                    debug!(asset_type = %asset.asset_type, id = %asset.id, %reason, "asset excluded");
                    self.excluded_ids.insert(asset.id.clone());
                    outcome.excluded.push(Exclusion { asset, reason });
                }
                None => outcome.eligible.push(asset),
            }
        }
        outcome
    }
}

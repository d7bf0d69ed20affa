//! Object keys, archive filenames and export job ids
//!
//! ```text
//! {prefix}/{YYYY}/{MM}/{DD}/{plural}/{plural}-{HHMMSS}.zip             sole bundle
//! {prefix}/{YYYY}/{MM}/{DD}/{plural}/{plural}_bundle_{index}-{HHMMSS}.zip
//! ```
//!
//! The date segment follows the configured [`PrefixFormat`]; the time is
//! when the bundle's export finished.

use chrono::{DateTime, NaiveDate, Utc};
use qsbackup_core::{AssetType, PrefixFormat};

/// Archive filename for one bundle
pub fn archive_filename(
    asset_type: AssetType,
    index: usize,
    is_sole_bundle: bool,
    finished_at: DateTime<Utc>,
) -> String {
    let plural = asset_type.plural();
    let hms = finished_at.format("%H%M%S");
    if is_sole_bundle {
        format!("{}-{}.zip", plural, hms)
    } else {
        format!("{}_bundle_{}-{}.zip", plural, index, hms)
    }
}

/// Full object key for an archive
pub fn object_key(
    prefix: &str,
    format: PrefixFormat,
    date: NaiveDate,
    asset_type: AssetType,
    filename: &str,
) -> String {
    format!(
        "{}/{}/{}/{}",
        prefix,
        format.format_date(date),
        asset_type.plural(),
        filename
    )
}

/// Export job id, unique per submission attempt
pub fn export_job_id(asset_type: AssetType, index: usize, epoch_secs: i64, attempt: u32) -> String {
    format!(
        "{}-bundle-{}-{}-{}",
        asset_type.plural(),
        index,
        epoch_secs,
        attempt
    )
}

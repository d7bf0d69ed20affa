//! Convenient imports for qsbackup.
//!
//! ```ignore
//! use qsbackup::prelude::*;
//!
//! let report = BackupEngine::new(clients).run(&config, BackupMode::Full).await?;
//! ```

// Main entry point
pub use crate::types::{BackupEngine, ServiceClients};

// Error handling
pub use crate::error::{Error, Result};

// Configuration
pub use crate::types::{BackupConfig, BackupConfigBuilder, PrefixFormat};

// Run inputs and outputs
pub use crate::types::{BackupMode, BackupReport, CancellationToken, Category, CategoryStatus};

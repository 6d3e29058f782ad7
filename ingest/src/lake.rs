//! The data-lake upload seam.
//!
//! The engine only ever calls [`Lake::upload`]; concrete transports live
//! outside the engine. An upload failure is logged and the bundle still ships
//! to the backup tree, so a broken lake never wedges ingestion.

use std::path::Path;

use async_trait::async_trait;
use stable_eyre::Result;

mod devnull;

pub use devnull::*;

/// A destination for finished bundles.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Lake: Send + Sync {
    /// Upload a finished bundle, erroring if the lake refuses it.
    async fn upload(&self, environment: &str, data_source: &str, archive: &Path) -> Result<()>;
}

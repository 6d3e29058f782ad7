//! A Lake implementation that just logs uploads and drops them.

use std::path::Path;

use async_trait::async_trait;
use derive_more::Constructor;
use log::debug;
use stable_eyre::Result;

/// Logs uploads and drops them. Meant for dry runs and basic sanity testing.
#[derive(Clone, Debug, Default, Constructor)]
pub struct Devnull {}

#[async_trait]
impl super::Lake for Devnull {
    async fn upload(&self, environment: &str, data_source: &str, archive: &Path) -> Result<()> {
        debug!("[devnull] upload {archive:?} for {data_source}/{environment}");
        Ok(())
    }
}

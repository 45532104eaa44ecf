//! Data source registry and factory
//!
//! This module provides:
//! - The `DataSource` capability trait
//! - Central registration of all supported sources
//! - A factory function resolving a source by its configured name
//!
//! All source-specific logic must live in dedicated modules. The polling
//! engine interacts exclusively through the `DataSource` trait.

pub mod bitstamp;
pub mod source;

use std::sync::Arc;
use std::time::Duration;

use crate::error::{CollectorError, Result};

pub use source::DataSource;

/// Connects a data source by name.
///
/// CONTRACT:
/// - `name` MUST match the `source` field in config.json
/// - Source names are lowercase and stable
///
/// RETURNS:
/// - A shared source ready to be bound by workers
/// - `CollectorError::Configuration` for unknown names
/// - Whatever the source's own start-up (e.g. loading its pair list) fails with
pub async fn connect_source(name: &str, budget: Duration) -> Result<Arc<dyn DataSource>> {
    match name {
        "bitstamp" => Ok(Arc::new(bitstamp::BitstampSource::connect(budget).await?)),
        other => Err(CollectorError::Configuration(format!(
            "data source '{other}' is not supported"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unknown_source_is_a_configuration_error() {
        let result = connect_source("nosuchexchange", Duration::from_secs(1)).await;
        assert!(matches!(result, Err(CollectorError::Configuration(_))));
    }
}

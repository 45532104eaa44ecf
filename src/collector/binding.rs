use std::sync::Arc;
use std::time::Duration;

use crate::{
    error::{CollectorError, Result},
    schema::{FlatRecord, RecordSequence, SeriesParams},
    sources::DataSource,
};

/// Pairing symbol used when none is configured.
pub const DEFAULT_PAIRING: &str = "USD";

/// An asset bound to a data source through a validated pair identifier.
///
/// Validation happens once, here, at construction: the composed
/// identifier must be one the source knows. It is never re-checked while
/// polling. The binding is immutable afterwards.
pub struct SourceBinding {
    symbol: String,
    pairing: String,
    identifier: String,
    source: Arc<dyn DataSource>,
}

impl std::fmt::Debug for SourceBinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceBinding")
            .field("symbol", &self.symbol)
            .field("pairing", &self.pairing)
            .field("identifier", &self.identifier)
            .field("source", &self.source.name())
            .finish()
    }
}

impl SourceBinding {
    /// Binds `symbol`/`pairing` to `source`.
    ///
    /// `budget`, when given, becomes the source's request-wait budget.
    ///
    /// Fails with `CollectorError::Configuration` if the source does not
    /// serve the composed pair.
    pub fn new(
        symbol: &str,
        pairing: &str,
        budget: Option<Duration>,
        source: Arc<dyn DataSource>,
    ) -> Result<Self> {
        if let Some(budget) = budget {
            source.set_request_budget(budget);
        }

        let identifier = source.compose_pair_identifier(symbol, pairing);
        if !source.known_identifiers().contains(&identifier) {
            return Err(CollectorError::Configuration(format!(
                "{} not among the {} identifiers",
                identifier,
                source.name()
            )));
        }

        Ok(Self {
            symbol: symbol.to_string(),
            pairing: pairing.to_string(),
            identifier,
            source,
        })
    }

    /// Binds with the default pairing symbol.
    pub fn with_default_pairing(
        symbol: &str,
        budget: Option<Duration>,
        source: Arc<dyn DataSource>,
    ) -> Result<Self> {
        Self::new(symbol, DEFAULT_PAIRING, budget, source)
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn pairing(&self) -> &str {
        &self.pairing
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    /// "BTC/USD"
    pub fn label(&self) -> String {
        format!("{}/{}", self.symbol, self.pairing)
    }

    pub async fn fetch_latest(&self) -> Result<FlatRecord> {
        self.source.fetch_latest(&self.identifier).await
    }

    pub async fn fetch_series(&self, params: &SeriesParams) -> Result<RecordSequence> {
        self.source.fetch_series(&self.identifier, params).await
    }
}

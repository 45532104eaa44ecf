use std::collections::HashSet;
use std::time::Duration;

use crate::error::Result;
use crate::schema::{FlatRecord, RecordSequence, SeriesParams};

/// DataSource is the capability boundary between:
/// - The generic polling engine
/// - A specific upstream market-data API
///
/// Each implementation must:
/// - Map a symbol + pairing symbol to its own identifier taxonomy
/// - Publish the set of identifiers it can serve
/// - Fetch and decode the latest record and record series
///
/// DESIGN GOALS:
/// - Zero source-specific logic inside the engine
/// - Adding a source never touches workers, barrier or aggregator
///
/// THREAD SAFETY:
/// - Must be Send + Sync
/// - One instance may be shared by several workers
#[async_trait::async_trait]
pub trait DataSource: Send + Sync {
    /// Canonical source name, as used in configuration.
    fn name(&self) -> &'static str;

    /// Fetches the most recent record for `identifier`.
    ///
    /// Network failures and timeouts map to `CollectorError::Transport`.
    /// A body that does not decode yields an empty record, not an error.
    async fn fetch_latest(&self, identifier: &str) -> Result<FlatRecord>;

    /// Fetches a time-ordered series for `identifier`.
    ///
    /// `params` are passed through to the upstream request untouched.
    async fn fetch_series(&self, identifier: &str, params: &SeriesParams) -> Result<RecordSequence>;

    /// Builds the source's identifier for a tradable pair.
    ///
    /// MUST NOT perform I/O.
    fn compose_pair_identifier(&self, symbol: &str, pairing: &str) -> String;

    /// Identifiers this source can serve.
    fn known_identifiers(&self) -> &HashSet<String>;

    /// Sets the maximum wait for a single upstream request.
    ///
    /// Applies to requests started after the call.
    fn set_request_budget(&self, budget: Duration);

    fn request_budget(&self) -> Duration;
}

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use log::{debug, info};

use crate::{
    decoder::{FlatRecordDecoder, RecordListDecoder},
    error::{CollectorError, Result},
    metrics::METRICS,
    schema::{FlatRecord, RecordSequence, SeriesParams},
};

use super::source::DataSource;

const BASE_URL: &str = "https://www.bitstamp.net/api/v2/";
const USER_AGENT: &str = "Mozilla/5.0";

/// Default wait budget for one request.
pub const DEFAULT_REQUEST_BUDGET: Duration = Duration::from_secs(100);

/// Bitstamp public REST API source
///
/// REST:
/// https://www.bitstamp.net/api/v2/
///
/// Notes:
/// - No auth
/// - Pair identifiers are lowercase, no separator: "btcusd"
/// - Every value comes back as a string (or a bare number); both are kept as text
/// - ticker/ without a pair lists every tradable pair, which is how the
///   known-identifier set is built
pub struct BitstampSource {
    client: reqwest::Client,
    base_url: String,
    budget_ms: AtomicU64,
    identifiers: HashSet<String>,
}

impl BitstampSource {
    /// Connects to the public API and loads the known pairs.
    ///
    /// Fails if the pair list cannot be retrieved; an empty pair list is
    /// accepted and simply makes every binding invalid.
    pub async fn connect(budget: Duration) -> Result<Self> {
        Self::connect_to(BASE_URL, budget).await
    }

    pub async fn connect_to(base_url: &str, budget: Duration) -> Result<Self> {
        let mut source = Self::with_identifiers(base_url, budget, HashSet::new())?;

        let url = format!("{}ticker/", source.base_url);
        let body = source.get_text(&url, "ticker/").await?;
        source.identifiers = RecordListDecoder::decode(&body)
            .iter()
            .filter_map(|r| r.get("pair"))
            .map(normalize_pair)
            .collect();

        info!(
            "bitstamp: {} tradable pairs loaded",
            source.identifiers.len()
        );

        Ok(source)
    }

    /// Builds a source with a fixed identifier set, without any network call.
    pub fn with_identifiers(
        base_url: &str,
        budget: Duration,
        identifiers: HashSet<String>,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| CollectorError::Configuration(format!("http client: {e}")))?;

        let mut base_url = base_url.to_string();
        if !base_url.ends_with('/') {
            base_url.push('/');
        }

        Ok(Self {
            client,
            base_url,
            budget_ms: AtomicU64::new(budget.as_millis() as u64),
            identifiers,
        })
    }

    fn latest_url(&self, identifier: &str) -> String {
        format!("{}ticker/{}/", self.base_url, identifier)
    }

    fn series_url(&self, identifier: &str, params: &SeriesParams) -> String {
        let mut url = format!("{}ohlc/{}/", self.base_url, identifier);
        if !params.is_empty() {
            let query: Vec<String> = params.iter().map(|(k, v)| format!("{k}={v}")).collect();
            url.push('?');
            url.push_str(&query.join("&"));
        }
        url
    }

    async fn get_text(&self, url: &str, identifier: &str) -> Result<String> {
        debug!("bitstamp GET {}", url);

        let response = self
            .client
            .get(url)
            .timeout(self.request_budget())
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| {
                METRICS.fetch_errors.fetch_add(1, Ordering::Relaxed);
                CollectorError::transport(identifier, e)
            })?;

        response.text().await.map_err(|e| {
            METRICS.fetch_errors.fetch_add(1, Ordering::Relaxed);
            CollectorError::transport(identifier, e)
        })
    }
}

#[async_trait::async_trait]
impl DataSource for BitstampSource {
    fn name(&self) -> &'static str {
        "bitstamp"
    }

    async fn fetch_latest(&self, identifier: &str) -> Result<FlatRecord> {
        let body = self.get_text(&self.latest_url(identifier), identifier).await?;
        let record = FlatRecordDecoder::decode(&body);

        METRICS.records_decoded.fetch_add(1, Ordering::Relaxed);
        Ok(record)
    }

    async fn fetch_series(&self, identifier: &str, params: &SeriesParams) -> Result<RecordSequence> {
        let body = self
            .get_text(&self.series_url(identifier, params), identifier)
            .await?;
        let records = RecordListDecoder::decode(&body);

        METRICS.records_decoded.fetch_add(records.len(), Ordering::Relaxed);
        Ok(records)
    }

    fn compose_pair_identifier(&self, symbol: &str, pairing: &str) -> String {
        format!("{}{}", symbol.to_lowercase(), pairing.to_lowercase())
    }

    fn known_identifiers(&self) -> &HashSet<String> {
        &self.identifiers
    }

    fn set_request_budget(&self, budget: Duration) {
        self.budget_ms
            .store(budget.as_millis() as u64, Ordering::Relaxed);
    }

    fn request_budget(&self) -> Duration {
        Duration::from_millis(self.budget_ms.load(Ordering::Relaxed))
    }
}

/// "BTC/USD" -> "btcusd"
fn normalize_pair(pair: &str) -> String {
    pair.chars()
        .filter(|c| *c != '/')
        .flat_map(char::to_lowercase)
        .collect()
}

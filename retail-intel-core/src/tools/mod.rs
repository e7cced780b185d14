//! Tool adapters
//!
//! Each adapter wraps one upstream data API behind the same contract: typed
//! optional parameters in, a JSON string out. Adapters never fail. Missing
//! inputs, missing credentials, rate limits and transport errors all become
//! an error-shaped payload (`{"error": true, "error_message": ...}`) or a
//! deterministic synthetic payload, so callers can always parse the result.

mod alpha_vantage;
mod bigquery;
mod fake_store;
mod fred;
mod rest_countries;
pub mod upstream;

pub use upstream::{CannedUpstream, HttpUpstream, Upstream};

use crate::config::{ApiConfig, Config};
use crate::error::Result;
use crate::linelog::LineLog;
use crate::metrics::ServerMetrics;
use serde_json::{json, Map, Value};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// The tools exposed by the tool server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToolKind {
    BigQuery,
    RestCountries,
    AlphaVantage,
    Fred,
    FakeStore,
}

impl ToolKind {
    pub const ALL: [ToolKind; 5] = [
        ToolKind::BigQuery,
        ToolKind::RestCountries,
        ToolKind::AlphaVantage,
        ToolKind::Fred,
        ToolKind::FakeStore,
    ];

    /// Protocol-level tool name
    pub fn name(&self) -> &'static str {
        match self {
            ToolKind::BigQuery => "bigquery",
            ToolKind::RestCountries => "rest_countries_api",
            ToolKind::AlphaVantage => "alpha_vantage_api",
            ToolKind::Fred => "fred_api",
            ToolKind::FakeStore => "fake_store_api",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.name() == name)
    }

    /// Upstream API name used in metrics
    pub fn api_name(&self) -> &'static str {
        match self {
            ToolKind::BigQuery => "BigQuery",
            ToolKind::RestCountries => "REST Countries",
            ToolKind::AlphaVantage => "Alpha Vantage",
            ToolKind::Fred => "FRED",
            ToolKind::FakeStore => "Fake Store",
        }
    }

    /// Name the analysis agents know the tool by
    pub fn display_name(&self) -> &'static str {
        match self {
            ToolKind::BigQuery => "BigQuery Tool",
            ToolKind::RestCountries => "REST Countries Tool",
            ToolKind::AlphaVantage => "Alpha Vantage Tool",
            ToolKind::Fred => "FRED Tool",
            ToolKind::FakeStore => "Fake Store Tool",
        }
    }

    /// Line log file for this tool (shared naming on both sides)
    pub fn log_file(&self) -> &'static str {
        match self {
            ToolKind::BigQuery => "bigquery.log",
            ToolKind::RestCountries => "rest_countries.log",
            ToolKind::AlphaVantage => "alpha_vantage.log",
            ToolKind::Fred => "fred.log",
            ToolKind::FakeStore => "fake_store.log",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            ToolKind::BigQuery => {
                "Execute a BigQuery SQL query against bigquery-public-data datasets. \
                 Available table: bigquery-public-data.census_bureau_international.midyear_population \
                 (columns: country_name, country_code, year, midyear_population). \
                 Returns JSON with the result rows."
            }
            ToolKind::RestCountries => {
                "Retrieve country/region data from the REST Countries API. \
                 Both 'country' and 'region' must be provided; pass an empty string when not needed. \
                 Returns supply chain network metrics and a regional breakdown."
            }
            ToolKind::AlphaVantage => {
                "Retrieve financial market data from Alpha Vantage. \
                 Optional 'stock_symbol' (e.g. 'WMT', 'AMZN'); omit for general market indicators."
            }
            ToolKind::Fred => {
                "Retrieve macroeconomic indicators from FRED. \
                 Optional 'series_id' (e.g. 'GDP', 'UNRATE'); optional 'industry' context, \
                 not used in the API call."
            }
            ToolKind::FakeStore => {
                "Retrieve product data from the Fake Store API. \
                 Optional 'category' (electronics, jewelery, men's clothing, women's clothing); \
                 omit for all products. Returns portfolio, category and price metrics."
            }
        }
    }

    /// JSON schema of the tool arguments
    pub fn input_schema(&self) -> Value {
        match self {
            ToolKind::BigQuery => json!({
                "type": "object",
                "properties": {
                    "query": {"type": "string", "description": "SQL query over bigquery-public-data"}
                },
                "required": ["query"]
            }),
            ToolKind::RestCountries => json!({
                "type": "object",
                "properties": {
                    "country": {"type": "string", "description": "Country name, or \"\""},
                    "region": {"type": "string", "description": "Region name, or \"\""}
                },
                "required": ["country", "region"]
            }),
            ToolKind::AlphaVantage => json!({
                "type": "object",
                "properties": {
                    "stock_symbol": {"type": ["string", "null"], "description": "Ticker symbol"}
                }
            }),
            ToolKind::Fred => json!({
                "type": "object",
                "properties": {
                    "series_id": {"type": ["string", "null"], "description": "FRED series id"},
                    "industry": {"type": ["string", "null"], "description": "Industry context"}
                }
            }),
            ToolKind::FakeStore => json!({
                "type": "object",
                "properties": {
                    "category": {"type": ["string", "null"], "description": "Product category"}
                }
            }),
        }
    }

    fn required_fields(&self) -> &'static [&'static str] {
        match self {
            ToolKind::BigQuery => &["query"],
            ToolKind::RestCountries => &["country", "region"],
            _ => &[],
        }
    }

    fn optional_fields(&self) -> &'static [&'static str] {
        match self {
            ToolKind::AlphaVantage => &["stock_symbol"],
            ToolKind::Fred => &["series_id", "industry"],
            ToolKind::FakeStore => &["category"],
            _ => &[],
        }
    }
}

/// A validated tool invocation
#[derive(Debug, Clone, PartialEq)]
pub enum ToolCall {
    BigQuery {
        query: String,
    },
    RestCountries {
        country: Option<String>,
        region: Option<String>,
    },
    AlphaVantage {
        stock_symbol: Option<String>,
    },
    Fred {
        series_id: Option<String>,
        industry: Option<String>,
    },
    FakeStore {
        category: Option<String>,
    },
}

impl ToolCall {
    /// Validate raw arguments against the tool schema.
    ///
    /// On failure returns the validator message, e.g.
    /// `1 validation error for rest_countries_api\nregion\n  Field required`.
    pub fn parse(kind: ToolKind, arguments: &Map<String, Value>) -> std::result::Result<Self, String> {
        let mut errors: Vec<(String, &'static str)> = Vec::new();

        for field in kind.required_fields() {
            match arguments.get(*field) {
                None => errors.push((field.to_string(), "Field required")),
                Some(Value::String(_)) => {}
                Some(_) => errors.push((field.to_string(), "Input should be a valid string")),
            }
        }
        for field in kind.optional_fields() {
            match arguments.get(*field) {
                None | Some(Value::Null) | Some(Value::String(_)) => {}
                Some(_) => errors.push((field.to_string(), "Input should be a valid string")),
            }
        }

        if !errors.is_empty() {
            let header = if errors.len() == 1 {
                format!("1 validation error for {}", kind.name())
            } else {
                format!("{} validation errors for {}", errors.len(), kind.name())
            };
            let body: Vec<String> = errors
                .iter()
                .map(|(field, msg)| format!("{}\n  {}", field, msg))
                .collect();
            return Err(format!("{}\n{}", header, body.join("\n")));
        }

        let text = |field: &str| arguments.get(field).and_then(Value::as_str).map(str::to_string);

        Ok(match kind {
            ToolKind::BigQuery => ToolCall::BigQuery {
                query: text("query").unwrap_or_default(),
            },
            ToolKind::RestCountries => ToolCall::RestCountries {
                country: text("country"),
                region: text("region"),
            },
            ToolKind::AlphaVantage => ToolCall::AlphaVantage {
                stock_symbol: text("stock_symbol"),
            },
            ToolKind::Fred => ToolCall::Fred {
                series_id: text("series_id"),
                industry: text("industry"),
            },
            ToolKind::FakeStore => ToolCall::FakeStore {
                category: text("category"),
            },
        })
    }

    pub fn kind(&self) -> ToolKind {
        match self {
            ToolCall::BigQuery { .. } => ToolKind::BigQuery,
            ToolCall::RestCountries { .. } => ToolKind::RestCountries,
            ToolCall::AlphaVantage { .. } => ToolKind::AlphaVantage,
            ToolCall::Fred { .. } => ToolKind::Fred,
            ToolCall::FakeStore { .. } => ToolKind::FakeStore,
        }
    }
}

/// Everything an adapter needs: upstream access, credentials, metrics, logs
pub struct ToolContext {
    upstream: Arc<dyn Upstream>,
    apis: ApiConfig,
    metrics: Arc<ServerMetrics>,
    log_dir: PathBuf,
}

impl ToolContext {
    pub fn new(
        upstream: Arc<dyn Upstream>,
        apis: ApiConfig,
        metrics: Arc<ServerMetrics>,
        log_dir: PathBuf,
    ) -> Self {
        Self {
            upstream,
            apis,
            metrics,
            log_dir,
        }
    }

    /// Context backed by real HTTP with the configured upstream timeout
    pub fn from_config(config: &Config, metrics: Arc<ServerMetrics>) -> Result<Self> {
        let upstream = HttpUpstream::new(Duration::from_secs(config.apis.upstream_timeout_secs))?;
        Ok(Self::new(
            Arc::new(upstream),
            config.apis.clone(),
            metrics,
            config.server_log_dir(),
        ))
    }

    pub fn metrics(&self) -> &Arc<ServerMetrics> {
        &self.metrics
    }

    pub(crate) fn upstream(&self) -> &dyn Upstream {
        self.upstream.as_ref()
    }

    pub(crate) fn apis(&self) -> &ApiConfig {
        &self.apis
    }

    /// Line log for one tool; also mirrored to tracing
    pub(crate) fn log(&self, kind: ToolKind, message: &str) {
        tracing::info!(tool = kind.name(), "{}", message);
        LineLog::in_dir(&self.log_dir, kind.log_file()).write(message);
    }

    /// Run a validated call through its adapter
    pub async fn run(&self, call: ToolCall) -> String {
        match call {
            ToolCall::BigQuery { query } => bigquery::run(self, &query).await,
            ToolCall::RestCountries { country, region } => {
                rest_countries::run(self, country.as_deref(), region.as_deref()).await
            }
            ToolCall::AlphaVantage { stock_symbol } => {
                alpha_vantage::run(self, stock_symbol.as_deref()).await
            }
            ToolCall::Fred { series_id, industry } => {
                fred::run(self, series_id.as_deref(), industry.as_deref()).await
            }
            ToolCall::FakeStore { category } => fake_store::run(self, category.as_deref()).await,
        }
    }
}

/// `None` for missing or whitespace-only input
pub(crate) fn non_blank(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}

/// First `limit` characters, with `...` appended when cut
pub(crate) fn truncate(text: &str, limit: usize) -> String {
    if text.chars().count() > limit {
        let head: String = text.chars().take(limit).collect();
        format!("{}...", head)
    } else {
        text.to_string()
    }
}

/// `{"error": true, "error_message": message}` plus extra fields
pub(crate) fn error_payload(message: impl Into<String>, extra: Value) -> Value {
    let mut payload = json!({
        "error": true,
        "error_message": message.into(),
    });
    if let (Some(map), Value::Object(extra)) = (payload.as_object_mut(), extra) {
        map.extend(extra);
    }
    payload
}

/// Serialize a payload; serialization of a `Value` does not fail in practice
pub(crate) fn to_text(payload: &Value) -> String {
    serde_json::to_string(payload).unwrap_or_else(|_| {
        r#"{"error":true,"error_message":"failed to encode payload"}"#.to_string()
    })
}

/// Round to `places` decimal places
pub(crate) fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

/// Milliseconds elapsed since `start`
pub(crate) fn elapsed_ms(start: std::time::Instant) -> f64 {
    start.elapsed().as_secs_f64() * 1000.0
}


#[cfg(test)]
mod tests {
    use super::*;

    fn args(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_tool_names_roundtrip() {
        for kind in ToolKind::ALL {
            assert_eq!(ToolKind::from_name(kind.name()), Some(kind));
        }
        assert_eq!(ToolKind::from_name("weather"), None);
    }

    #[test]
    fn test_rest_countries_requires_both_fields() {
        let err = ToolCall::parse(ToolKind::RestCountries, &args(json!({"country": "France"})))
            .unwrap_err();
        assert_eq!(
            err,
            "1 validation error for rest_countries_api\nregion\n  Field required"
        );

        let err = ToolCall::parse(ToolKind::RestCountries, &args(json!({}))).unwrap_err();
        assert!(err.starts_with("2 validation errors for rest_countries_api"));
    }

    #[test]
    fn test_optional_fields_accept_null() {
        let call = ToolCall::parse(ToolKind::Fred, &args(json!({"series_id": null}))).unwrap();
        assert_eq!(
            call,
            ToolCall::Fred {
                series_id: None,
                industry: None
            }
        );
    }

    #[test]
    fn test_wrong_type_rejected() {
        let err = ToolCall::parse(ToolKind::FakeStore, &args(json!({"category": 3}))).unwrap_err();
        assert!(err.contains("Input should be a valid string"));
    }

    #[test]
    fn test_helpers() {
        assert_eq!(non_blank(Some("  ")), None);
        assert_eq!(non_blank(Some(" x ")), Some(" x "));
        assert_eq!(truncate("abcdef", 3), "abc...");
        assert_eq!(truncate("abc", 3), "abc");
        assert_eq!(round_to(33.333, 1), 33.3);

        let payload = error_payload("bad", json!({"category": "x"}));
        assert_eq!(payload["error"], true);
        assert_eq!(payload["category"], "x");
    }
}

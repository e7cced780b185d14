//! Alpha Vantage adapter: equity quotes, with synthetic market indicators as fallback

use super::{elapsed_ms, non_blank, to_text, truncate, ToolContext, ToolKind};
use crate::metrics::{params, ApiCallRecord};
use serde_json::{json, Map, Value};
use std::time::Instant;

const QUERY_URL: &str = "https://www.alphavantage.co/query";

const KIND: ToolKind = ToolKind::AlphaVantage;

fn market_indicators() -> Value {
    json!({
        "retail_sector_performance": "Stable",
        "consumer_spending_index": "Moderate Growth",
        "market_volatility": "Low to Medium",
    })
}

fn sales_performance_metrics() -> Value {
    json!({
        "estimated_market_size": "Based on general market conditions",
        "revenue_potential": "Moderate to High (retail sector)",
        "profitability_outlook": "Positive with proper execution",
    })
}

fn financial_insights() -> Value {
    json!({
        "sector_growth": "Retail sector shows steady growth potential",
        "consumer_confidence": "Consumer confidence indicators are favorable",
        "market_conditions": "Market conditions support new retail ventures",
        "recommendation": "Monitor quarterly earnings and market trends",
    })
}

pub(super) async fn run(ctx: &ToolContext, stock_symbol: Option<&str>) -> String {
    let stock_symbol = non_blank(stock_symbol);
    ctx.log(
        KIND,
        &format!("Function called with stock_symbol={}", stock_symbol.unwrap_or("None")),
    );

    let api_key = non_blank(ctx.apis().alpha_vantage_key.as_deref());

    let mut data = Map::new();
    data.insert("stock_symbol".into(), json!(stock_symbol));
    data.insert("api_key_available".into(), json!(api_key.is_some()));

    match (api_key, stock_symbol) {
        (Some(key), Some(symbol)) => {
            let url = format!(
                "{}?function=GLOBAL_QUOTE&symbol={}&apikey={}",
                QUERY_URL,
                urlencoding::encode(symbol),
                urlencoding::encode(key)
            );

            let start = Instant::now();
            let result = ctx.upstream().get_json(&url).await;
            let latency = elapsed_ms(start);
            let call_params = params([("stock_symbol", Some(symbol))]);

            let record = match result {
                Ok(mut quote) => {
                    if let Some(q) = quote.get_mut("Global Quote") {
                        data.insert("quote".into(), q.take());
                        ApiCallRecord::success(KIND.api_name(), KIND.name(), latency, call_params)
                    } else if let Some(message) = quote.get("Error Message").cloned() {
                        let text = message.as_str().unwrap_or("upstream error").to_string();
                        data.insert("error".into(), message);
                        ApiCallRecord::failure(KIND.api_name(), KIND.name(), latency, text, call_params)
                    } else if quote.get("Note").is_some() {
                        data.insert(
                            "note".into(),
                            json!("API rate limit reached. Using simulated data."),
                        );
                        data.insert("market_indicators".into(), market_indicators());
                        ApiCallRecord::failure(
                            KIND.api_name(),
                            KIND.name(),
                            latency,
                            "rate limit reached",
                            call_params,
                        )
                    } else {
                        data.insert("raw_response".into(), quote);
                        ApiCallRecord::success(KIND.api_name(), KIND.name(), latency, call_params)
                    }
                }
                Err(e) => {
                    data.insert("api_error".into(), json!(e.to_string()));
                    data.insert("market_indicators".into(), market_indicators());
                    ApiCallRecord::failure(KIND.api_name(), KIND.name(), latency, e.to_string(), call_params)
                }
            };
            ctx.metrics().track_api_call(record);
        }
        _ => {
            data.insert("market_indicators".into(), market_indicators());
            data.insert("sales_performance_metrics".into(), sales_performance_metrics());
            data.insert("financial_insights".into(), financial_insights());
        }
    }

    let text = to_text(&Value::Object(data));
    ctx.log(KIND, "SUCCESS: Financial data retrieved");
    ctx.log(KIND, &format!("Response: {}...", truncate(&text, 500)));
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ApiConfig;
    use crate::tools::testing::{context, parse};
    use crate::tools::CannedUpstream;

    fn keyed() -> ApiConfig {
        ApiConfig {
            alpha_vantage_key: Some("demo".into()),
            ..ApiConfig::default()
        }
    }

    #[tokio::test]
    async fn test_no_key_returns_synthetic_payload() {
        let (ctx, upstream, _dir) = context(CannedUpstream::new(), ApiConfig::default());

        let out = parse(&run(&ctx, Some("WMT")).await);
        assert_eq!(out["api_key_available"], false);
        assert_eq!(out["market_indicators"]["retail_sector_performance"], "Stable");
        assert!(out["sales_performance_metrics"].is_object());
        assert!(out["financial_insights"].is_object());
        assert!(upstream.requests().is_empty());
    }

    #[tokio::test]
    async fn test_blank_key_returns_synthetic_payload() {
        let apis = ApiConfig {
            alpha_vantage_key: Some(String::new()),
            ..ApiConfig::default()
        };
        let (ctx, upstream, _dir) = context(CannedUpstream::new(), apis);

        let out = parse(&run(&ctx, Some("WMT")).await);
        assert_eq!(out["api_key_available"], false);
        assert!(out["sales_performance_metrics"].is_object());
        assert!(upstream.requests().is_empty());
    }

    #[tokio::test]
    async fn test_quote_returned() {
        let (ctx, upstream, _dir) = context(
            CannedUpstream::new().with_route(
                QUERY_URL,
                json!({"Global Quote": {"01. symbol": "WMT", "05. price": "67.10"}}),
            ),
            keyed(),
        );

        let out = parse(&run(&ctx, Some("WMT")).await);
        assert_eq!(out["quote"]["01. symbol"], "WMT");
        assert!(out.get("market_indicators").is_none());
        assert!(upstream.requests()[0].contains("symbol=WMT"));
        assert_eq!(ctx.metrics().summary().summary.successful_calls, 1);
    }

    #[tokio::test]
    async fn test_rate_limit_note_falls_back() {
        let (ctx, _upstream, _dir) = context(
            CannedUpstream::new().with_route(QUERY_URL, json!({"Note": "Thank you for using Alpha Vantage!"})),
            keyed(),
        );

        let out = parse(&run(&ctx, Some("AMZN")).await);
        assert_eq!(out["note"], "API rate limit reached. Using simulated data.");
        assert_eq!(out["market_indicators"]["market_volatility"], "Low to Medium");
    }

    #[tokio::test]
    async fn test_error_message_and_transport_failure() {
        let (ctx, _upstream, _dir) = context(
            CannedUpstream::new().with_route(QUERY_URL, json!({"Error Message": "Invalid API call"})),
            keyed(),
        );
        let out = parse(&run(&ctx, Some("ZZZZ")).await);
        assert_eq!(out["error"], "Invalid API call");

        let (ctx, _upstream, _dir) = context(
            CannedUpstream::new().with_failure(QUERY_URL, "timed out"),
            keyed(),
        );
        let out = parse(&run(&ctx, Some("WMT")).await);
        assert!(out["api_error"].as_str().unwrap().contains("timed out"));
        assert!(out["market_indicators"].is_object());
        assert_eq!(ctx.metrics().summary().summary.failed_calls, 1);
    }
}

//! FRED adapter: macroeconomic series, with synthetic indicators as fallback

use super::{elapsed_ms, non_blank, to_text, truncate, ToolContext, ToolKind};
use crate::metrics::{params, ApiCallRecord};
use serde_json::{json, Map, Value};
use std::time::Instant;

const OBSERVATIONS_URL: &str = "https://api.stlouisfed.org/fred/series/observations";

const KIND: ToolKind = ToolKind::Fred;

fn macroeconomic_indicators() -> Value {
    json!({
        "gdp_growth_rate": 2.5,
        "gdp_growth_rate_unit": "percent",
        "gdp_growth_rate_description": "moderate growth",
        "unemployment_rate": 3.7,
        "unemployment_rate_unit": "percent",
        "unemployment_rate_description": "low, favorable for retail",
        "consumer_price_index": "Stable inflation",
        "retail_sales_growth": 4.2,
        "retail_sales_growth_unit": "percent YoY",
    })
}

fn market_trends() -> Value {
    json!([
        "E-commerce continues to grow but in-store retail remains strong",
        "Consumer preferences shifting toward sustainable products",
        "Omnichannel retail strategies becoming essential",
        "Local retail experiencing resurgence in urban areas",
    ])
}

fn industry_insights(industry: Option<&str>) -> Value {
    json!({
        "sector_growth": format!("{} sector shows positive growth trajectory", industry.unwrap_or("Retail")),
        "competition_level": "moderate to high",
        "pricing_strategy_note": "Pricing strategies need to balance value and quality",
        "long_term_outlook": "Favorable for well-positioned retailers",
    })
}

fn strategic_recommendations() -> Value {
    json!([
        "Monitor macroeconomic trends for timing decisions",
        "Focus on consumer behavior shifts and preferences",
        "Consider competitive positioning and differentiation",
        "Leverage economic indicators for demand forecasting",
    ])
}

pub(super) async fn run(ctx: &ToolContext, series_id: Option<&str>, industry: Option<&str>) -> String {
    let series_id = non_blank(series_id);
    let industry = non_blank(industry);
    ctx.log(
        KIND,
        &format!(
            "Function called with series_id={}, industry={}",
            series_id.unwrap_or("None"),
            industry.unwrap_or("None")
        ),
    );

    let api_key = non_blank(ctx.apis().fred_key.as_deref());

    let mut data = Map::new();
    data.insert("series_id".into(), json!(series_id));
    data.insert("industry".into(), json!(industry));
    data.insert("api_key_available".into(), json!(api_key.is_some()));

    match (api_key, series_id) {
        (Some(key), Some(series)) => {
            let url = format!(
                "{}?series_id={}&api_key={}&file_type=json&limit=10&sort_order=desc",
                OBSERVATIONS_URL,
                urlencoding::encode(series),
                urlencoding::encode(key)
            );

            let start = Instant::now();
            let result = ctx.upstream().get_json(&url).await;
            let latency = elapsed_ms(start);
            let call_params = params([("series_id", Some(series)), ("industry", industry)]);

            let record = match result {
                Ok(mut body) => {
                    if let Some(observations) = body.get_mut("observations").map(Value::take) {
                        data.insert("observations".into(), observations);
                        data.insert(
                            "series_info".into(),
                            json!({
                                "series_id": series,
                                "title": body.get("title").and_then(Value::as_str).unwrap_or(""),
                                "units": body.get("units").and_then(Value::as_str).unwrap_or(""),
                            }),
                        );
                        ApiCallRecord::success(KIND.api_name(), KIND.name(), latency, call_params)
                    } else if let Some(message) = body.get("error_message").cloned() {
                        let text = message.as_str().unwrap_or("upstream error").to_string();
                        data.insert("error".into(), message);
                        ApiCallRecord::failure(KIND.api_name(), KIND.name(), latency, text, call_params)
                    } else {
                        data.insert("raw_response".into(), body);
                        ApiCallRecord::success(KIND.api_name(), KIND.name(), latency, call_params)
                    }
                }
                Err(e) => {
                    data.insert("api_error".into(), json!(e.to_string()));
                    data.insert("macroeconomic_indicators".into(), macroeconomic_indicators());
                    ApiCallRecord::failure(KIND.api_name(), KIND.name(), latency, e.to_string(), call_params)
                }
            };
            ctx.metrics().track_api_call(record);
        }
        _ => {
            data.insert("macroeconomic_indicators".into(), macroeconomic_indicators());
            data.insert("market_trends".into(), market_trends());
            data.insert("industry_insights".into(), industry_insights(industry));
            data.insert("strategic_recommendations".into(), strategic_recommendations());
        }
    }

    let text = to_text(&Value::Object(data));
    ctx.log(KIND, "SUCCESS: Market intelligence data retrieved");
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
            fred_key: Some("demo".into()),
            ..ApiConfig::default()
        }
    }

    #[tokio::test]
    async fn test_fallback_mentions_industry() {
        let (ctx, upstream, _dir) = context(CannedUpstream::new(), ApiConfig::default());

        let out = parse(&run(&ctx, None, Some("Grocery")).await);
        assert_eq!(out["macroeconomic_indicators"]["gdp_growth_rate"], 2.5);
        assert_eq!(out["macroeconomic_indicators"]["unemployment_rate"], 3.7);
        assert_eq!(
            out["industry_insights"]["sector_growth"],
            "Grocery sector shows positive growth trajectory"
        );
        assert_eq!(out["market_trends"].as_array().unwrap().len(), 4);
        assert!(upstream.requests().is_empty());
    }

    #[tokio::test]
    async fn test_key_without_series_is_synthetic() {
        let (ctx, upstream, _dir) = context(CannedUpstream::new(), keyed());
        let out = parse(&run(&ctx, Some(" "), None).await);
        assert_eq!(out["api_key_available"], true);
        assert_eq!(
            out["industry_insights"]["sector_growth"],
            "Retail sector shows positive growth trajectory"
        );
        assert!(upstream.requests().is_empty());
    }

    #[tokio::test]
    async fn test_observations() {
        let (ctx, upstream, _dir) = context(
            CannedUpstream::new().with_route(
                OBSERVATIONS_URL,
                json!({"observations": [{"date": "2024-01-01", "value": "3.7"}], "units": "lin"}),
            ),
            keyed(),
        );

        let out = parse(&run(&ctx, Some("UNRATE"), None).await);
        assert_eq!(out["observations"][0]["value"], "3.7");
        assert_eq!(out["series_info"]["series_id"], "UNRATE");
        assert_eq!(out["series_info"]["units"], "lin");
        assert!(upstream.requests()[0].contains("limit=10&sort_order=desc"));
    }

    #[tokio::test]
    async fn test_upstream_error_message() {
        let (ctx, _upstream, _dir) = context(
            CannedUpstream::new().with_route(
                OBSERVATIONS_URL,
                json!({"error_code": 400, "error_message": "Bad Request. The series does not exist."}),
            ),
            keyed(),
        );

        let out = parse(&run(&ctx, Some("NOPE"), None).await);
        assert_eq!(out["error"], "Bad Request. The series does not exist.");
        assert_eq!(ctx.metrics().summary().summary.failed_calls, 1);
    }

    #[tokio::test]
    async fn test_request_failure_falls_back() {
        let (ctx, _upstream, _dir) = context(
            CannedUpstream::new().with_failure(OBSERVATIONS_URL, "connection refused"),
            keyed(),
        );

        let out = parse(&run(&ctx, Some("GDP"), Some("Retail")).await);
        assert!(out["api_error"].as_str().unwrap().contains("connection refused"));
        assert_eq!(out["macroeconomic_indicators"]["retail_sales_growth"], 4.2);
    }
}

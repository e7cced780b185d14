//! REST Countries adapter: country and region reference data for supply chain analysis

use super::{elapsed_ms, error_payload, non_blank, round_to, to_text, truncate, ToolContext, ToolKind};
use crate::metrics::{params, ApiCallRecord};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::time::Instant;

const BASE_URL: &str = "https://restcountries.com/v3.1";
const FIELDS: &str = "fields=name,region,subregion,population,area,capital";
const MAX_COUNTRIES: usize = 50;
const UNKNOWN_REGION: &str = "Unknown";

const KIND: ToolKind = ToolKind::RestCountries;

fn endpoint(country: Option<&str>, region: Option<&str>) -> String {
    match (country, region) {
        (Some(country), _) => format!("{}/name/{}?{}", BASE_URL, urlencoding::encode(country), FIELDS),
        (None, Some(region)) => format!("{}/region/{}?{}", BASE_URL, urlencoding::encode(region), FIELDS),
        (None, None) => format!("{}/all?{}", BASE_URL, FIELDS),
    }
}

pub(super) async fn run(ctx: &ToolContext, country: Option<&str>, region: Option<&str>) -> String {
    let country = non_blank(country);
    let region = non_blank(region);

    ctx.log(
        KIND,
        &format!(
            "Function called with country={}, region={}",
            country.unwrap_or("None"),
            region.unwrap_or("None")
        ),
    );

    let start = Instant::now();
    let result = ctx.upstream().get_json(&endpoint(country, region)).await;
    let latency = elapsed_ms(start);
    let call_params = params([("country", country), ("region", region)]);

    let countries = match result {
        Ok(Value::Array(items)) => items,
        Ok(object @ Value::Object(_)) => vec![object],
        Ok(other) => {
            let message = format!("unexpected response shape: {}", truncate(&other.to_string(), 100));
            return failure(ctx, latency, message, country, region, call_params);
        }
        Err(e) => return failure(ctx, latency, e.to_string(), country, region, call_params),
    };

    ctx.metrics()
        .track_api_call(ApiCallRecord::success(KIND.api_name(), KIND.name(), latency, call_params));

    let payload = summarize(&countries, country, region);
    let text = to_text(&payload);
    ctx.log(KIND, &format!("SUCCESS: Retrieved {} countries", countries.len()));
    ctx.log(KIND, &format!("Response: {}...", truncate(&text, 500)));
    text
}

fn failure(
    ctx: &ToolContext,
    latency: f64,
    message: String,
    country: Option<&str>,
    region: Option<&str>,
    call_params: crate::metrics::Parameters,
) -> String {
    ctx.metrics().track_api_call(ApiCallRecord::failure(
        KIND.api_name(),
        KIND.name(),
        latency,
        message.clone(),
        call_params,
    ));
    ctx.log(KIND, &format!("ERROR: Request failed - {}", message));
    to_text(&error_payload(
        format!("Error fetching country data: {}", message),
        json!({ "country": country, "region": region }),
    ))
}

#[derive(Default)]
struct RegionTotals {
    countries: u64,
    population: u64,
}

/// Supply chain network metrics over the returned countries
fn summarize(countries: &[Value], country: Option<&str>, region: Option<&str>) -> Value {
    let mut regions: BTreeMap<String, RegionTotals> = BTreeMap::new();
    let mut total_population: u64 = 0;

    for item in countries {
        let name = item
            .get("region")
            .and_then(Value::as_str)
            .filter(|r| !r.is_empty())
            .unwrap_or(UNKNOWN_REGION);
        let population = item.get("population").and_then(Value::as_u64).unwrap_or(0);

        let totals = regions.entry(name.to_string()).or_default();
        totals.countries += 1;
        totals.population += population;
        total_population += population;
    }

    let avg_countries_per_region = if regions.is_empty() {
        0.0
    } else {
        countries.len() as f64 / regions.len() as f64
    };

    let regional_breakdown: Vec<Value> = regions
        .iter()
        .filter(|(name, _)| name.as_str() != UNKNOWN_REGION)
        .map(|(name, totals)| {
            json!({
                "region": name,
                "countries_count": totals.countries,
                "total_population": totals.population,
                "avg_population_per_country":
                    round_to(totals.population as f64 / totals.countries as f64, 0),
                "complexity": complexity(totals.countries),
            })
        })
        .collect();

    json!({
        "filter": { "country": country, "region": region },
        "supply_chain_network": {
            "total_countries": countries.len(),
            "total_regions": regions.len(),
            "avg_countries_per_region": round_to(avg_countries_per_region, 2),
            "total_market_population": total_population,
        },
        "regional_breakdown": regional_breakdown,
        "countries": &countries[..countries.len().min(MAX_COUNTRIES)],
    })
}

fn complexity(countries: u64) -> &'static str {
    if countries > 10 {
        "High"
    } else if countries > 5 {
        "Medium"
    } else {
        "Low"
    }
}

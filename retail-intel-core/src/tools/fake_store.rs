//! Fake Store adapter: product catalog with portfolio, category and price metrics

use super::{elapsed_ms, error_payload, non_blank, round_to, to_text, truncate, ToolContext, ToolKind};
use crate::metrics::{params, ApiCallRecord};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::time::Instant;

const PRODUCTS_URL: &str = "https://fakestoreapi.com/products";

const KIND: ToolKind = ToolKind::FakeStore;

fn endpoint(category: Option<&str>) -> String {
    match category {
        Some(category) => format!("{}/category/{}", PRODUCTS_URL, urlencoding::encode(category)),
        None => PRODUCTS_URL.to_string(),
    }
}

pub(super) async fn run(ctx: &ToolContext, category: Option<&str>) -> String {
    let category = non_blank(category);
    ctx.log(
        KIND,
        &format!("Function called with category={}", category.unwrap_or("None")),
    );

    let start = Instant::now();
    let result = ctx.upstream().get_json(&endpoint(category)).await;
    let latency = elapsed_ms(start);
    let call_params = params([("category", category)]);

    let products = match result {
        Ok(Value::Array(products)) => products,
        Ok(other) => {
            let message = format!("unexpected response: {}", truncate(&other.to_string(), 100));
            return failure(ctx, latency, message, category, call_params);
        }
        Err(e) => return failure(ctx, latency, e.to_string(), category, call_params),
    };

    ctx.metrics()
        .track_api_call(ApiCallRecord::success(KIND.api_name(), KIND.name(), latency, call_params));

    let payload = summarize(products, category);
    let text = to_text(&payload);
    ctx.log(
        KIND,
        &format!(
            "SUCCESS: Retrieved {} products",
            payload["product_portfolio_metrics"]["total_products"]
        ),
    );
    ctx.log(KIND, &format!("Response: {}...", truncate(&text, 500)));
    text
}

fn failure(
    ctx: &ToolContext,
    latency: f64,
    message: String,
    category: Option<&str>,
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
        format!("Error fetching product data: {}", message),
        json!({ "category": category }),
    ))
}

/// Price bands, in display order
const PRICE_BANDS: [(&str, &str); 3] = [("Low", "<$20"), ("Medium", "<$100"), ("High", "$100+")];

fn price_band(price: f64) -> usize {
    if price < 20.0 {
        0
    } else if price < 100.0 {
        1
    } else {
        2
    }
}

fn positioning(average: f64) -> &'static str {
    if average < 50.0 {
        "value"
    } else if average < 150.0 {
        "mid-market"
    } else {
        "premium"
    }
}

fn share(count: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        round_to(count as f64 / total as f64 * 100.0, 1)
    }
}

fn summarize(products: Vec<Value>, category: Option<&str>) -> Value {
    let total = products.len();
    let prices: Vec<f64> = products
        .iter()
        .map(|p| p.get("price").and_then(Value::as_f64).unwrap_or(0.0))
        .collect();

    // Category counts, keeping first-seen order for stable tie-breaking
    let mut order: Vec<String> = Vec::new();
    let mut counts: HashMap<String, usize> = HashMap::new();
    for product in &products {
        let name = product
            .get("category")
            .and_then(Value::as_str)
            .unwrap_or("Unknown")
            .to_string();
        let count = counts.entry(name.clone()).or_insert(0);
        if *count == 0 {
            order.push(name);
        }
        *count += 1;
    }
    let mut categories: Vec<(String, usize)> = order
        .into_iter()
        .map(|name| {
            let count = counts.get(&name).copied().unwrap_or(0);
            (name, count)
        })
        .collect();
    categories.sort_by(|a, b| b.1.cmp(&a.1));

    let mut bands = [0usize; 3];
    for price in &prices {
        bands[price_band(*price)] += 1;
    }

    let sum: f64 = prices.iter().sum();
    let average = if total == 0 { 0.0 } else { sum / total as f64 };
    let min = prices.iter().copied().reduce(f64::min).unwrap_or(0.0);
    let max = prices.iter().copied().reduce(f64::max).unwrap_or(0.0);

    let category_breakdown: Vec<Value> = categories
        .iter()
        .map(|(name, count)| {
            json!({
                "category": name,
                "product_count": count,
                "percentage": share(*count, total),
            })
        })
        .collect();

    let price_distribution: Vec<Value> = PRICE_BANDS
        .iter()
        .zip(bands)
        .map(|((range, label), count)| {
            json!({
                "range": range,
                "price_label": label,
                "product_count": count,
                "percentage": share(count, total),
            })
        })
        .collect();

    json!({
        "filter": { "category": category },
        "product_portfolio_metrics": {
            "total_products": total,
            "product_categories": categories.len(),
            "average_product_price": round_to(average, 2),
            "min_price": round_to(min, 2),
            "max_price": round_to(max, 2),
            "price_positioning": positioning(average),
        },
        "category_breakdown": category_breakdown,
        "price_distribution": price_distribution,
        "products": products,
    })
}

//! BigQuery adapter: SQL over the public census dataset via the REST `jobs.query` call

use super::{elapsed_ms, error_payload, non_blank, to_text, truncate, ToolContext, ToolKind};
use crate::metrics::{ApiCallRecord, Parameters};
use serde_json::{json, Map, Value};
use std::time::Instant;

const PUBLIC_NAMESPACE: &str = "BIGQUERY-PUBLIC-DATA";
const QUERY_ENDPOINT: &str = "https://bigquery.googleapis.com/bigquery/v2/projects";
const TABLE_NOTE: &str = "Available table: census_bureau_international.midyear_population \
     (columns: country_name, country_code, year, midyear_population)";
const QUERY_TIMEOUT_MS: u64 = 10_000;

const KIND: ToolKind = ToolKind::BigQuery;

pub(super) async fn run(ctx: &ToolContext, query: &str) -> String {
    ctx.log(
        KIND,
        &format!("Function called with query: {}...", truncate(query, 200)),
    );

    if query.trim().is_empty() {
        ctx.log(KIND, "ERROR: No query provided");
        return to_text(&error_payload(
            "No BigQuery query provided. The client agent must construct and provide a SQL query.",
            json!({
                "note": format!("The query should select from bigquery-public-data datasets. {}", TABLE_NOTE)
            }),
        ));
    }

    if !query.to_uppercase().contains(PUBLIC_NAMESPACE) {
        ctx.log(KIND, "ERROR: Query outside bigquery-public-data rejected");
        return to_text(&error_payload(
            "Query must only access bigquery-public-data datasets for security.",
            json!({ "query_provided": truncate(query, 200) }),
        ));
    }

    let apis = ctx.apis();
    let (project, token) = match (
        non_blank(apis.bigquery_project.as_deref()),
        non_blank(apis.bigquery_token.as_deref()),
    ) {
        (Some(project), Some(token)) => (project, token),
        _ => {
            ctx.log(KIND, "ERROR: Credentials not found");
            return to_text(&error_payload(
                "Google Cloud credentials not found",
                json!({
                    "api_key_available": false,
                    "note": "Set GOOGLE_CLOUD_PROJECT and GOOGLE_OAUTH_ACCESS_TOKEN \
                             (e.g. from `gcloud auth print-access-token`) to run BigQuery queries."
                }),
            ));
        }
    };

    let url = format!("{}/{}/queries", QUERY_ENDPOINT, urlencoding::encode(project));
    let body = json!({
        "query": query,
        "useLegacySql": false,
        "timeoutMs": QUERY_TIMEOUT_MS,
    });

    let start = Instant::now();
    let outcome = ctx
        .upstream()
        .post_json(&url, token, &body)
        .await
        .map_err(|e| e.to_string())
        .and_then(|response| parse_response(&response));
    let latency = elapsed_ms(start);

    let mut params = Parameters::new();
    params.insert("query_length".into(), json!(query.chars().count()));

    match outcome {
        Ok((rows, job_id)) => {
            params.insert("rows_returned".into(), json!(rows.len()));
            ctx.metrics()
                .track_api_call(ApiCallRecord::success(KIND.api_name(), KIND.name(), latency, params));

            let payload = json!({
                "query_executed": query,
                "data_source": "Google Cloud BigQuery Public Datasets",
                "row_count": rows.len(),
                "results": rows,
                "query_job_id": job_id,
            });
            let text = to_text(&payload);
            ctx.log(
                KIND,
                &format!("SUCCESS: Query executed, returned {} rows", payload["row_count"]),
            );
            ctx.log(KIND, &format!("Response: {}...", truncate(&text, 500)));
            text
        }
        Err(message) => {
            ctx.metrics().track_api_call(ApiCallRecord::failure(
                KIND.api_name(),
                KIND.name(),
                latency,
                message.clone(),
                params,
            ));
            ctx.log(KIND, &format!("ERROR: BigQuery error - {}", message));
            to_text(&error_payload(
                format!("BigQuery error: {}", message),
                json!({
                    "query": truncate(query, 200),
                    "note": format!(
                        "Check that the query syntax is correct and the table exists in bigquery-public-data. {}",
                        TABLE_NOTE
                    ),
                }),
            ))
        }
    }
}

/// Flatten a `jobs.query` response into `{column: value}` rows
fn parse_response(response: &Value) -> Result<(Vec<Value>, Option<String>), String> {
    if let Some(message) = response.pointer("/error/message").and_then(Value::as_str) {
        return Err(message.to_string());
    }
    if response.get("jobComplete").and_then(Value::as_bool) == Some(false) {
        return Err("query did not complete within the timeout".to_string());
    }

    let fields: Vec<(&str, &str)> = response
        .pointer("/schema/fields")
        .and_then(Value::as_array)
        .map(|fields| {
            fields
                .iter()
                .map(|f| {
                    (
                        f.get("name").and_then(Value::as_str).unwrap_or(""),
                        f.get("type").and_then(Value::as_str).unwrap_or("STRING"),
                    )
                })
                .collect()
        })
        .unwrap_or_default();

    let rows = response
        .get("rows")
        .and_then(Value::as_array)
        .map(|rows| {
            rows.iter()
                .map(|row| {
                    let cells = row.get("f").and_then(Value::as_array);
                    let mut object = Map::new();
                    for (i, (name, kind)) in fields.iter().enumerate() {
                        let raw = cells
                            .and_then(|c| c.get(i))
                            .and_then(|c| c.get("v"))
                            .cloned()
                            .unwrap_or(Value::Null);
                        object.insert(name.to_string(), typed_cell(raw, kind));
                    }
                    Value::Object(object)
                })
                .collect()
        })
        .unwrap_or_default();

    let job_id = response
        .pointer("/jobReference/jobId")
        .and_then(Value::as_str)
        .map(str::to_string);

    Ok((rows, job_id))
}

/// BigQuery encodes every scalar as a string; restore numbers and booleans
fn typed_cell(raw: Value, kind: &str) -> Value {
    let Value::String(text) = &raw else {
        return raw;
    };
    match kind {
        "INTEGER" | "INT64" => text.parse::<i64>().map(Value::from).unwrap_or(raw),
        "FLOAT" | "FLOAT64" | "NUMERIC" => text
            .parse::<f64>()
            .ok()
            .and_then(|f| serde_json::Number::from_f64(f).map(Value::Number))
            .unwrap_or(raw),
        "BOOLEAN" | "BOOL" => match text.as_str() {
            "true" => Value::Bool(true),
            "false" => Value::Bool(false),
            _ => raw,
        },
        _ => raw,
    }
}

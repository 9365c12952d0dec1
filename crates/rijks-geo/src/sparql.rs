//! Shared Wikidata SPARQL query helper (phases 1b, 1c, 3b).

use serde_json::Value;

use crate::error::{GeoError, Result};

/// Execute a SPARQL query against `endpoint`, returning the `results.bindings`
/// array from the standard SPARQL JSON results format.
pub async fn query(client: &reqwest::Client, endpoint: &str, sparql: &str) -> Result<Vec<Value>> {
    let resp = client
        .get(endpoint)
        .query(&[("query", sparql), ("format", "json")])
        .header(reqwest::header::ACCEPT, "application/sparql-results+json")
        .header(reqwest::header::USER_AGENT, super::USER_AGENT)
        .timeout(std::time::Duration::from_secs(60))
        .send()
        .await?;
    if !resp.status().is_success() {
        return Err(GeoError::RateLimited(format!(
            "sparql query to {endpoint} returned {}",
            resp.status()
        )));
    }
    let data: Value = resp.json().await?;
    Ok(data
        .get("results")
        .and_then(|r| r.get("bindings"))
        .and_then(|b| b.as_array())
        .cloned()
        .unwrap_or_default())
}

/// Pull a binding's `name.value` as a string.
pub fn binding_str<'a>(binding: &'a Value, name: &str) -> Option<&'a str> {
    binding.get(name)?.get("value")?.as_str()
}

pub fn binding_f64(binding: &Value, name: &str) -> Option<f64> {
    binding_str(binding, name)?.parse().ok()
}

/// Last path segment of a URI (`.../entity/Q727` -> `Q727`).
pub fn last_segment(uri: &str) -> &str {
    uri.rsplit('/').next().unwrap_or(uri)
}

//! Phase 4: JSON-LD artwork Tier-2 enrichment resolver (spec.md §4.4).

use once_cell::sync::Lazy;
use reqwest::header::{ACCEPT, USER_AGENT};
use serde_json::Value;
use tracing::warn;

use crate::model::MappingEdge;

const LINKED_ART_PROFILE: &str = "https://linked.art/ns/v1/linked-art.json";
const USER_AGENT_VALUE: &str = "rijks-harvest/0.1";

const AAT_INSCRIPTION: &str = "300435414";
const AAT_PROVENANCE: &str = "300444174";
const AAT_CREDIT_LINE: &str = "300026687";
const AAT_DESCRIPTION: &str = "300435452";
const AAT_ESSAY: &str = "300048722";
const AAT_HEIGHT: &str = "300055644";
const AAT_WIDTH: &str = "300055647";
const LANG_EN: &str = "http://vocab.getty.edu/aat/300388277";
const LANG_NL: &str = "http://vocab.getty.edu/aat/300388256";

/// Getty AAT measurement-unit URI suffix → conversion factor to centimeters.
/// Open question resolved in favor of a literal `{cm, mm, m}` table (spec.md
/// §9): an unrecognized unit keeps the raw value (factor 1.0) and is counted
/// rather than silently dropped.
static UNIT_FACTORS: Lazy<Vec<(&str, f64)>> = Lazy::new(|| {
    vec![
        ("300379098", 1.0),   // centimeters
        ("300379100", 0.1),   // millimeters
        ("300379101", 100.0), // meters
    ]
});

fn unit_factor(unit_id: &str) -> Option<f64> {
    UNIT_FACTORS
        .iter()
        .find(|(suffix, _)| unit_id.ends_with(suffix))
        .map(|(_, factor)| *factor)
}

/// Outcome of attempting to fetch one artwork's Linked Art JSON-LD.
pub enum FetchOutcome {
    Found(Value),
    /// Authoritative absence — mark `tier2_done = true`, never retry.
    NotFound,
    /// Transient transport failure — leave `tier2_done = false` for resume.
    Transient,
}

pub async fn fetch_artwork(client: &reqwest::Client, linked_art_uri: &str) -> FetchOutcome {
    let result = client
        .get(linked_art_uri)
        .header(ACCEPT, "application/ld+json")
        .header("Profile", LINKED_ART_PROFILE)
        .header(USER_AGENT, USER_AGENT_VALUE)
        .timeout(std::time::Duration::from_secs(30))
        .send()
        .await;

    match result {
        Ok(resp) if resp.status() == reqwest::StatusCode::NOT_FOUND => FetchOutcome::NotFound,
        Ok(resp) if resp.status().is_success() => match resp.json::<Value>().await {
            Ok(v) => FetchOutcome::Found(v),
            Err(e) => {
                warn!(error = %e, "parse error fetching artwork JSON-LD");
                FetchOutcome::Transient
            }
        },
        Ok(resp) => {
            warn!(status = %resp.status(), linked_art_uri, "unexpected status fetching artwork");
            FetchOutcome::Transient
        }
        Err(e) => {
            warn!(error = %e, linked_art_uri, "transport error fetching artwork");
            FetchOutcome::Transient
        }
    }
}

/// Everything the Tier-2 resolver extracts from one artwork's JSON-LD.
#[derive(Debug, Default)]
pub struct Tier2Fields {
    pub inscription: Option<String>,
    pub provenance: Option<String>,
    pub credit_line: Option<String>,
    pub description: Option<String>,
    pub narrative: Option<String>,
    pub all_titles: Option<String>,
    pub height_cm: Option<f64>,
    pub width_cm: Option<f64>,
    pub date_earliest: Option<i32>,
    pub date_latest: Option<i32>,
    pub mappings: Vec<MappingEdge>,
    pub unknown_unit_count: u32,
}

fn classification_ids(entry: &Value) -> Vec<String> {
    entry
        .get("classified_as")
        .and_then(|v| v.as_array())
        .map(|arr| {
            arr.iter()
                .filter_map(|c| c.get("id").and_then(|v| v.as_str()).map(String::from))
                .collect()
        })
        .unwrap_or_default()
}

fn content_strings(entry: &Value) -> Vec<String> {
    match entry.get("content") {
        Some(Value::String(s)) => vec![s.clone()],
        Some(Value::Array(arr)) => arr.iter().filter_map(|v| v.as_str().map(String::from)).collect(),
        _ => vec![],
    }
}

fn extract_text_statement(data: &Value, aat_id: &str) -> Option<String> {
    let statements = data.get("referred_to_by").and_then(|v| v.as_array())?;
    let mut parts = Vec::new();
    for s in statements {
        if classification_ids(s).iter().any(|c| c.ends_with(aat_id)) {
            parts.extend(content_strings(s));
        }
    }
    if parts.is_empty() {
        None
    } else {
        Some(parts.join(" | "))
    }
}

fn extract_dimensions(data: &Value, out: &mut Tier2Fields) {
    let Some(dims) = data.get("dimension").and_then(|v| v.as_array()) else { return };
    for dim in dims {
        let classes = classification_ids(dim);
        let is_height = classes.iter().any(|c| c.ends_with(AAT_HEIGHT));
        let is_width = classes.iter().any(|c| c.ends_with(AAT_WIDTH));
        if !is_height && !is_width {
            continue;
        }
        let Some(value) = dim.get("value").and_then(|v| v.as_f64()) else { continue };
        let unit_id = dim
            .get("unit")
            .and_then(|u| u.get("id"))
            .and_then(|v| v.as_str())
            .unwrap_or("");
        let (converted, had_factor) = match unit_factor(unit_id) {
            Some(factor) => (value * factor, true),
            None => {
                out.unknown_unit_count += 1;
                (value, false)
            }
        };
        let rounded = if had_factor {
            (converted * 100.0).round() / 100.0
        } else {
            converted
        };
        if is_height && out.height_cm.is_none() {
            out.height_cm = Some(rounded);
        } else if is_width && out.width_cm.is_none() {
            out.width_cm = Some(rounded);
        }
    }
}

fn extract_narrative(data: &Value) -> Option<String> {
    let subject_of = data.get("subject_of").and_then(|v| v.as_array())?;
    let mut en = None;
    let mut nl = None;
    let mut other = None;
    for so in subject_of {
        let Some(parts) = so.get("part").and_then(|v| v.as_array()) else { continue };
        for part in parts {
            if !classification_ids(part).iter().any(|c| c.ends_with(AAT_ESSAY)) {
                continue;
            }
            let Some(content) = part.get("content").and_then(|v| v.as_str()) else { continue };
            let lang_ids: Vec<&str> = part
                .get("language")
                .and_then(|v| v.as_array())
                .map(|langs| {
                    langs
                        .iter()
                        .filter_map(|l| l.get("id").and_then(|v| v.as_str()))
                        .collect()
                })
                .unwrap_or_default();
            if lang_ids.contains(&LANG_EN) {
                en.get_or_insert_with(|| content.to_string());
            } else if lang_ids.contains(&LANG_NL) {
                nl.get_or_insert_with(|| content.to_string());
            } else {
                other.get_or_insert_with(|| content.to_string());
            }
        }
    }
    en.or(nl).or(other)
}

fn extract_production(object_number: &str, data: &Value, out: &mut Vec<MappingEdge>) {
    let Some(produced_by) = data.get("produced_by") else { return };
    let parts: Vec<&Value> = produced_by
        .get("part")
        .and_then(|v| v.as_array())
        .map(|arr| arr.iter().collect())
        .unwrap_or_else(|| vec![produced_by]);

    for part in parts {
        if let Some(techniques) = part.get("technique").and_then(|v| v.as_array()) {
            for t in techniques {
                if let Some(id) = t.get("id").and_then(|v| v.as_str()) {
                    out.push(MappingEdge {
                        object_number: object_number.to_string(),
                        vocab_id: id.rsplit('/').next().unwrap_or(id).to_string(),
                        field: "production_role".to_string(),
                    });
                }
            }
        }
        for c in classification_ids(part) {
            out.push(MappingEdge {
                object_number: object_number.to_string(),
                vocab_id: c.rsplit('/').next().unwrap_or(&c).to_string(),
                field: "attribution_qualifier".to_string(),
            });
        }
    }
}

fn parse_year(s: &str) -> Option<i32> {
    // e.g. "1642-07-26T00:00:00" or "-0044-01-01T00:00:00" (BCE)
    let (sign, rest) = if let Some(stripped) = s.strip_prefix('-') {
        (-1, stripped)
    } else {
        (1, s)
    };
    let year_str = rest.split('-').next()?;
    year_str.parse::<i32>().ok().map(|y| y * sign)
}

fn extract_timespan(data: &Value, out: &mut Tier2Fields) {
    let Some(timespan) = data.get("produced_by").and_then(|p| p.get("timespan")) else { return };
    let begin = timespan
        .get("begin_of_the_begin")
        .and_then(|v| v.as_str())
        .and_then(parse_year);
    let end = timespan
        .get("end_of_the_end")
        .and_then(|v| v.as_str())
        .and_then(parse_year);
    out.date_earliest = begin.or(end);
    out.date_latest = end.or(begin);
}

fn extract_all_titles(data: &Value) -> Option<String> {
    let names = data.get("identified_by").and_then(|v| v.as_array())?;
    let titles: Vec<String> = names
        .iter()
        .filter(|n| n.get("type").and_then(|v| v.as_str()) == Some("Name"))
        .filter_map(|n| n.get("content").and_then(|v| v.as_str()).map(String::from))
        .collect();
    if titles.is_empty() {
        None
    } else {
        Some(titles.join("\n"))
    }
}

/// Extract every Tier-2 field from one artwork's resolved JSON-LD document.
pub fn resolve_tier2(object_number: &str, data: &Value) -> Tier2Fields {
    let mut out = Tier2Fields {
        inscription: extract_text_statement(data, AAT_INSCRIPTION),
        provenance: extract_text_statement(data, AAT_PROVENANCE),
        credit_line: extract_text_statement(data, AAT_CREDIT_LINE),
        description: extract_text_statement(data, AAT_DESCRIPTION),
        narrative: extract_narrative(data),
        all_titles: extract_all_titles(data),
        ..Default::default()
    };
    extract_dimensions(data, &mut out);
    extract_timespan(data, &mut out);
    extract_production(object_number, data, &mut out.mappings);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn extracts_text_statements_concatenated_in_document_order() {
        let data = json!({
            "referred_to_by": [
                {"classified_as": [{"id": format!("http://vocab.getty.edu/aat/{AAT_INSCRIPTION}")}], "content": "foo"},
                {"classified_as": [{"id": format!("http://vocab.getty.edu/aat/{AAT_INSCRIPTION}")}], "content": "bar"},
            ]
        });
        let fields = resolve_tier2("SK-A-1", &data);
        assert_eq!(fields.inscription.as_deref(), Some("foo | bar"));
    }

    #[test]
    fn converts_dimensions_to_centimeters() {
        let data = json!({
            "dimension": [
                {"classified_as": [{"id": format!("http://vocab.getty.edu/aat/{AAT_HEIGHT}")}],
                 "value": 1.2, "unit": {"id": format!("http://vocab.getty.edu/aat/300379101")}},
            ]
        });
        let fields = resolve_tier2("SK-A-1", &data);
        assert_eq!(fields.height_cm, Some(120.0));
    }

    #[test]
    fn unknown_unit_keeps_raw_value_and_counts() {
        let data = json!({
            "dimension": [
                {"classified_as": [{"id": format!("http://vocab.getty.edu/aat/{AAT_WIDTH}")}],
                 "value": 42.0, "unit": {"id": "http://vocab.getty.edu/aat/999999"}},
            ]
        });
        let fields = resolve_tier2("SK-A-1", &data);
        assert_eq!(fields.width_cm, Some(42.0));
        assert_eq!(fields.unknown_unit_count, 1);
    }

    #[test]
    fn parses_bce_timespan() {
        let data = json!({
            "produced_by": {
                "timespan": {
                    "begin_of_the_begin": "-0044-01-01T00:00:00",
                    "end_of_the_end": "-0043-12-31T00:00:00",
                }
            }
        });
        let fields = resolve_tier2("SK-A-1", &data);
        assert_eq!(fields.date_earliest, Some(-44));
        assert_eq!(fields.date_latest, Some(-43));
    }

    #[test]
    fn production_structure_emits_role_and_qualifier_mappings() {
        let data = json!({
            "produced_by": {
                "part": [
                    {"technique": [{"id": "https://vocab.getty.edu/aat/300053099"}],
                     "classified_as": [{"id": "https://id.rijksmuseum.nl/q1"}]},
                ]
            }
        });
        let fields = resolve_tier2("SK-A-1", &data);
        assert!(fields
            .mappings
            .iter()
            .any(|m| m.field == "production_role" && m.vocab_id == "300053099"));
        assert!(fields
            .mappings
            .iter()
            .any(|m| m.field == "attribution_qualifier" && m.vocab_id == "q1"));
    }

    #[test]
    fn all_titles_concatenates_name_entries_newline_separated() {
        let data = json!({
            "identified_by": [
                {"type": "Name", "content": "The Night Watch"},
                {"type": "Name", "content": "De Nachtwacht"},
                {"type": "Identifier", "content": "SK-A-1"},
            ]
        });
        let fields = resolve_tier2("SK-A-1", &data);
        assert_eq!(fields.all_titles.as_deref(), Some("The Night Watch\nDe Nachtwacht"));
    }
}

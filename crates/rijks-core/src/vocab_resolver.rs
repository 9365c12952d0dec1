//! Phase 2 / Phase 2-bis: JSON-LD vocabulary resolution (spec.md §4.3).
//!
//! Resolves vocabulary ids referenced by mapping edges but absent from the
//! `vocabulary` table by fetching their Linked Art JSON-LD representation.

use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::header::{ACCEPT, USER_AGENT};
use serde_json::Value;

use crate::model::{NameClassification, PersonNameVariant, VocabularyTerm};
use crate::ntriples::la_type_to_vocab_type;

const LANG_EN: &str = "http://vocab.getty.edu/aat/300388277";
const LANG_NL: &str = "http://vocab.getty.edu/aat/300388256";
const LINKED_ART_PROFILE: &str = "https://linked.art/ns/v1/linked-art.json";
const USER_AGENT_VALUE: &str = "rijks-harvest/0.1";

static POINT_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"POINT\(([-\d.]+)\s+([-\d.]+)\)").unwrap());

/// AAT name-classification URI suffix → classification.
fn classification_from_aat(id: &str) -> Option<NameClassification> {
    if id.ends_with("300404670") {
        Some(NameClassification::Display)
    } else if id.ends_with("300404671") {
        Some(NameClassification::Preferred)
    } else if id.ends_with("300404672") {
        Some(NameClassification::Inverted)
    } else {
        None
    }
}

/// Fetch one entity's Linked Art JSON-LD representation. Any transport or
/// decode failure is folded into `None` — the caller treats it as "nothing
/// resolved for this id, try again next run" (spec.md §4.3 failure semantics).
pub async fn fetch_entity(client: &reqwest::Client, linked_art_base: &str, id: &str) -> Option<Value> {
    let url = format!("{linked_art_base}/{id}");
    let resp = client
        .get(&url)
        .header(ACCEPT, "application/ld+json")
        .header("Profile", LINKED_ART_PROFILE)
        .header(USER_AGENT, USER_AGENT_VALUE)
        .timeout(std::time::Duration::from_secs(15))
        .send()
        .await
        .ok()?;
    if !resp.status().is_success() {
        return None;
    }
    resp.json::<Value>().await.ok()
}

/// Translate a resolved JSON-LD document into a [`VocabularyTerm`]. Returns
/// `None` when the `type` field doesn't map to a known vocabulary type.
pub fn resolve_term(id: &str, data: &Value) -> Option<VocabularyTerm> {
    let la_type = data.get("type")?.as_str()?;
    let vocab_type = la_type_to_vocab_type(la_type)?;

    let mut label_en = None;
    let mut label_nl = None;
    if let Some(names) = data.get("identified_by").and_then(|v| v.as_array()) {
        for name in names {
            let Some(content) = name.get("content").and_then(|v| v.as_str()) else { continue };
            let lang_ids: Vec<&str> = name
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
                label_en.get_or_insert_with(|| content.to_string());
            } else if lang_ids.contains(&LANG_NL) {
                label_nl.get_or_insert_with(|| content.to_string());
            } else if label_en.is_none() && label_nl.is_none() {
                label_en = Some(content.to_string());
            }
        }
    }

    let mut external_id = None;
    if let Some(equivalents) = data.get("equivalent").and_then(|v| v.as_array()) {
        for eq in equivalents {
            let Some(eq_id) = eq.get("id").and_then(|v| v.as_str()) else { continue };
            if eq_id.contains("wikidata.org") {
                external_id = Some(eq_id.to_string());
                break;
            } else if external_id.is_none() {
                external_id = Some(eq_id.to_string());
            }
        }
    }

    let mut lat = None;
    let mut lon = None;
    let mut notation = None;
    if vocab_type == "place" {
        if let Some(defined_by) = data.get("defined_by").and_then(|v| v.as_str()) {
            if defined_by.starts_with("POINT") {
                notation = Some(defined_by.to_string());
                if let Some(caps) = POINT_PATTERN.captures(defined_by) {
                    lon = caps[1].parse::<f64>().ok();
                    lat = caps[2].parse::<f64>().ok();
                }
            }
        }
    }

    if label_en.is_none() && label_nl.is_none() {
        return None;
    }

    Some(VocabularyTerm {
        id: id.to_string(),
        vocab_type: Some(vocab_type.to_string()),
        label_en,
        label_nl,
        external_id,
        broader_id: None,
        notation,
        lat,
        lon,
    })
}

/// Extract every Name-typed `identified_by[]` entry, excluding
/// Identifier-typed entries, deduplicated on (content, lang) (spec.md §4.3,
/// `harvest-person-names.py`).
pub fn extract_name_variants(person_id: &str, data: &Value) -> Vec<PersonNameVariant> {
    let mut seen = std::collections::HashSet::new();
    let mut variants = Vec::new();

    let Some(entries) = data.get("identified_by").and_then(|v| v.as_array()) else {
        return variants;
    };
    for entry in entries {
        if entry.get("type").and_then(|v| v.as_str()) != Some("Name") {
            continue;
        }
        let Some(content) = entry.get("content").and_then(|v| v.as_str()) else { continue };

        let lang = entry
            .get("language")
            .and_then(|v| v.as_array())
            .and_then(|langs| {
                langs.iter().find_map(|l| {
                    let id = l.get("id").and_then(|v| v.as_str())?;
                    match id {
                        LANG_EN => Some("en"),
                        LANG_NL => Some("nl"),
                        _ => None,
                    }
                })
            })
            .map(String::from);

        let classification = entry
            .get("classified_as")
            .and_then(|v| v.as_array())
            .and_then(|classes| {
                classes
                    .iter()
                    .find_map(|c| classification_from_aat(c.get("id").and_then(|v| v.as_str())?))
            })
            .unwrap_or(NameClassification::Display);

        let key = (content.to_string(), lang.clone());
        if seen.insert(key) {
            variants.push(PersonNameVariant {
                person_id: person_id.to_string(),
                content: content.to_string(),
                lang,
                classification,
            });
        }
    }

    variants
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn resolves_place_with_point_wkt() {
        let data = json!({
            "type": "Place",
            "identified_by": [
                {"content": "Amsterdam", "language": [{"id": LANG_EN}]},
            ],
            "defined_by": "POINT(4.895 52.370)",
            "equivalent": [{"id": "https://www.wikidata.org/wiki/Q727"}],
        });
        let term = resolve_term("p1", &data).unwrap();
        assert_eq!(term.vocab_type.as_deref(), Some("place"));
        assert_eq!(term.lat, Some(52.370));
        assert_eq!(term.lon, Some(4.895));
        assert_eq!(term.external_id.as_deref(), Some("https://www.wikidata.org/wiki/Q727"));
    }

    #[test]
    fn unknown_type_resolves_to_none() {
        let data = json!({"type": "SomeUnknownType", "identified_by": []});
        assert!(resolve_term("x1", &data).is_none());
    }

    #[test]
    fn extracts_deduplicated_name_variants_skipping_identifiers() {
        let data = json!({
            "identified_by": [
                {"type": "Name", "content": "Rembrandt van Rijn", "language": [{"id": LANG_EN}],
                 "classified_as": [{"id": "http://vocab.getty.edu/aat/300404670"}]},
                {"type": "Name", "content": "Rembrandt van Rijn", "language": [{"id": LANG_EN}]},
                {"type": "Identifier", "content": "ULAN-500011051"},
            ]
        });
        let variants = extract_name_variants("p1", &data);
        assert_eq!(variants.len(), 1);
        assert_eq!(variants[0].content, "Rembrandt van Rijn");
        assert_eq!(variants[0].classification, NameClassification::Display);
    }
}

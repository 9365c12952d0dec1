//! Phase 0: bulk N-Triples dump parsing (spec.md §4.1).
//!
//! Each entity is a small per-file N-Triples dump with triples on the subject
//! URI plus a handful of blank nodes carrying `P190_has_symbolic_content`
//! labels. We walk both kinds of lines with a pair of regexes rather than a
//! general RDF parser, same as the dump harvester this is ported from.

use std::collections::HashMap;
use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::model::VocabularyTerm;

const P_LABEL: &str = "http://www.cidoc-crm.org/cidoc-crm/P190_has_symbolic_content";
const P_LANGUAGE: &str = "http://www.cidoc-crm.org/cidoc-crm/P72_has_language";
const P_EQUIVALENT: &str = "https://linked.art/ns/terms/equivalent";
const P_BROADER: &str = "http://www.w3.org/2004/02/skos/core#broader";
const P_HAS_TYPE: &str = "http://www.cidoc-crm.org/cidoc-crm/P2_has_type";
const P_DEFINED_BY: &str = "http://www.cidoc-crm.org/cidoc-crm/P168_place_is_defined_by";
const P_RDF_TYPE: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#type";
const LANG_EN: &str = "http://vocab.getty.edu/aat/300388277";
const LANG_NL: &str = "http://vocab.getty.edu/aat/300388256";
const AAT_DISPLAY_NAME: &str = "http://vocab.getty.edu/aat/300404670";
const AAT_IDENTIFIER_TYPE: &str = "http://www.cidoc-crm.org/cidoc-crm/E42_Identifier";

static NT_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"^<([^>]+)>\s+<([^>]+)>\s+(?:<([^>]+)>|"([^"]*)")\s*\.\s*$"#).unwrap()
});
static BNODE_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"^_:(\S+)\s+<([^>]+)>\s+(?:<([^>]+)>|"([^"]*)")\s*\.\s*$"#).unwrap()
});
static POINT_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"POINT\(([-\d.]+)\s+([-\d.]+)\)").unwrap());

/// Linked Art `type` → vocabulary type, used both here (rdf:type triples) and
/// by the JSON-LD resolver (spec.md §4.1/§4.3 share this table).
pub fn la_type_to_vocab_type(la_type: &str) -> Option<&'static str> {
    match la_type {
        "Person" | "Group" | "Actor" => Some("person"),
        "Place" => Some("place"),
        "Activity" => Some("event"),
        "Set" | "Type" | "Material" | "MeasurementUnit" | "Language" | "Currency" => {
            Some("classification")
        }
        _ => None,
    }
}

#[derive(Default)]
struct BnodeData {
    label: Option<String>,
    language: Option<String>,
    is_display_name: bool,
    is_identifier: bool,
}

/// Parse a single entity's N-Triples dump file into a [`VocabularyTerm`].
/// Returns `None` when the file carries no usable label (spec.md §4.1 edge
/// case: "no label in dump" is silently dropped, not an error).
pub fn parse_entity_file(path: &Path, default_type: &str) -> Option<VocabularyTerm> {
    let entity_id = path.file_name()?.to_str()?.to_string();
    let entity_uri = format!("https://id.rijksmuseum.nl/{entity_id}");
    let contents = std::fs::read_to_string(path).ok()?;
    parse_entity_contents(&entity_id, &entity_uri, &contents, default_type)
}

fn parse_entity_contents(
    entity_id: &str,
    entity_uri: &str,
    contents: &str,
    default_type: &str,
) -> Option<VocabularyTerm> {
    let mut bnodes: HashMap<String, BnodeData> = HashMap::new();
    let mut equivalents: Vec<String> = Vec::new();
    let mut broader_id: Option<String> = None;
    let mut defined_by: Option<String> = None;
    let mut rdf_type: Option<String> = None;

    for line in contents.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        if let Some(caps) = NT_PATTERN.captures(line) {
            if &caps[1] == entity_uri {
                let pred = &caps[2];
                let obj_uri = caps.get(3).map(|m| m.as_str());
                let obj_lit = caps.get(4).map(|m| m.as_str());
                match pred {
                    p if p == P_EQUIVALENT => {
                        if let Some(u) = obj_uri {
                            equivalents.push(u.to_string());
                        }
                    }
                    p if p == P_BROADER => {
                        if let Some(u) = obj_uri {
                            broader_id = u.rsplit('/').next().map(String::from);
                        }
                    }
                    p if p == P_DEFINED_BY => {
                        if let Some(l) = obj_lit {
                            defined_by = Some(l.to_string());
                        }
                    }
                    p if p == P_RDF_TYPE => {
                        if let Some(u) = obj_uri {
                            rdf_type = Some(u.to_string());
                        }
                    }
                    _ => {}
                }
            }
        }

        if let Some(caps) = BNODE_PATTERN.captures(line) {
            let bnode_id = caps[1].to_string();
            let pred = &caps[2];
            let obj_uri = caps.get(3).map(|m| m.as_str());
            let obj_lit = caps.get(4).map(|m| m.as_str());
            let entry = bnodes.entry(bnode_id).or_default();

            if pred == P_LABEL {
                if let Some(l) = obj_lit {
                    entry.label = Some(l.to_string());
                }
            } else if pred == P_LANGUAGE {
                if let Some(u) = obj_uri {
                    entry.language = Some(u.to_string());
                }
            } else if pred == P_HAS_TYPE && obj_uri == Some(AAT_DISPLAY_NAME) {
                entry.is_display_name = true;
            } else if pred == P_RDF_TYPE && obj_uri == Some(AAT_IDENTIFIER_TYPE) {
                entry.is_identifier = true;
            }
        }
    }

    let mut label_en = None;
    let mut label_nl = None;
    let mut notation = None;

    for data in bnodes.values() {
        let Some(label) = &data.label else { continue };
        if data.is_identifier {
            notation = Some(label.clone());
        } else if data.is_display_name {
            match data.language.as_deref() {
                Some(LANG_EN) => label_en = Some(label.clone()),
                Some(LANG_NL) => label_nl = Some(label.clone()),
                _ => {}
            }
        }
    }

    let vocab_type = rdf_type
        .as_deref()
        .and_then(|t| {
            let name = t.rsplit(['/', '#']).next().unwrap_or(t);
            la_type_to_vocab_type(name)
        })
        .unwrap_or(default_type);

    let external_id = equivalents
        .iter()
        .find(|e| e.contains("iconclass.org"))
        .or_else(|| equivalents.iter().find(|e| e.contains("wikidata.org")))
        .or_else(|| equivalents.first())
        .cloned();

    let (lat, lon, notation) = if let Some(wkt) = defined_by.as_deref().filter(|d| d.starts_with("POINT")) {
        match POINT_PATTERN.captures(wkt) {
            Some(caps) => (
                caps[2].parse::<f64>().ok(),
                caps[1].parse::<f64>().ok(),
                Some(wkt.to_string()),
            ),
            None => (None, None, notation),
        }
    } else {
        (None, None, notation)
    };

    if label_en.is_none() && label_nl.is_none() {
        return None;
    }

    Some(VocabularyTerm {
        id: entity_id.to_string(),
        vocab_type: Some(vocab_type.to_string()),
        label_en,
        label_nl,
        external_id,
        broader_id,
        notation,
        lat,
        lon,
    })
}

/// Getty AAT entries referenced directly from `dc:type` that 404 against the
/// Rijksmuseum Linked Art API because they are not Rijksmuseum entities
/// (spec.md §4.1 "external vocabulary" edge case).
pub fn external_vocab_seed() -> Vec<VocabularyTerm> {
    vec![
        VocabularyTerm {
            id: "300078817".to_string(),
            vocab_type: Some("classification".to_string()),
            label_en: Some("rectos".to_string()),
            label_nl: Some("rectozijden".to_string()),
            external_id: Some("http://vocab.getty.edu/aat/300078817".to_string()),
            broader_id: None,
            notation: None,
            lat: None,
            lon: None,
        },
        VocabularyTerm {
            id: "300010292".to_string(),
            vocab_type: Some("classification".to_string()),
            label_en: Some("versos".to_string()),
            label_nl: Some("versozijden".to_string()),
            external_id: Some("http://vocab.getty.edu/aat/300010292".to_string()),
            broader_id: None,
            notation: None,
            lat: None,
            lon: None,
        },
    ]
}

/// Walk a directory of per-entity N-Triples dump files, parsing each.
pub fn parse_dump_dir(dir: &Path, default_type: &str) -> Vec<VocabularyTerm> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Vec::new();
    };
    entries
        .filter_map(|e| e.ok())
        .filter(|e| e.path().is_file())
        .filter(|e| !e.file_name().to_string_lossy().starts_with('.'))
        .filter_map(|e| parse_entity_file(&e.path(), default_type))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_place_with_coordinates_and_broader() {
        let contents = format!(
            r#"<https://id.rijksmuseum.nl/p1> <http://www.w3.org/2004/02/skos/core#broader> <https://id.rijksmuseum.nl/p0> .
<https://id.rijksmuseum.nl/p1> <http://www.cidoc-crm.org/cidoc-crm/P168_place_is_defined_by> "POINT(4.895 52.370)" .
<https://id.rijksmuseum.nl/p1> <{P_RDF_TYPE}> <http://www.example.org/Place> .
_:b1 <{P_LABEL}> "Amsterdam" .
_:b1 <{P_LANGUAGE}> <{LANG_EN}> .
_:b1 <{P_HAS_TYPE}> <{AAT_DISPLAY_NAME}> .
"#
        );
        let term = parse_entity_contents("p1", "https://id.rijksmuseum.nl/p1", &contents, "place").unwrap();
        assert_eq!(term.label_en.as_deref(), Some("Amsterdam"));
        assert_eq!(term.broader_id.as_deref(), Some("p0"));
        assert_eq!(term.lat, Some(52.370));
        assert_eq!(term.lon, Some(4.895));
        assert_eq!(term.vocab_type.as_deref(), Some("place"));
    }

    #[test]
    fn identifier_bnode_becomes_notation_not_label() {
        let contents = format!(
            r#"_:b1 <{P_LABEL}> "34B11" .
_:b1 <{P_RDF_TYPE}> <{AAT_IDENTIFIER_TYPE}> .
_:b2 <{P_LABEL}> "Dog" .
_:b2 <{P_LANGUAGE}> <{LANG_EN}> .
_:b2 <{P_HAS_TYPE}> <{AAT_DISPLAY_NAME}> .
"#
        );
        let term =
            parse_entity_contents("c1", "https://id.rijksmuseum.nl/c1", &contents, "classification")
                .unwrap();
        assert_eq!(term.notation.as_deref(), Some("34B11"));
        assert_eq!(term.label_en.as_deref(), Some("Dog"));
    }

    #[test]
    fn no_label_returns_none() {
        let contents = "_:b1 <http://example.org/unrelated> \"value\" .\n";
        assert!(parse_entity_contents("x1", "https://id.rijksmuseum.nl/x1", contents, "place").is_none());
    }

    #[test]
    fn external_vocab_seed_has_two_entries() {
        assert_eq!(external_vocab_seed().len(), 2);
    }
}

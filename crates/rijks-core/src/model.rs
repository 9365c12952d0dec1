//! Data model types shared by every phase (spec.md §3).

use serde::{Deserialize, Serialize};

/// Vocabulary term type discriminant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VocabType {
    Classification,
    Person,
    Place,
    Event,
    Set,
}

impl VocabType {
    pub fn as_str(&self) -> &'static str {
        match self {
            VocabType::Classification => "classification",
            VocabType::Person => "person",
            VocabType::Place => "place",
            VocabType::Event => "event",
            VocabType::Set => "set",
        }
    }

    pub fn from_str_opt(s: &str) -> Option<Self> {
        match s {
            "classification" => Some(VocabType::Classification),
            "person" => Some(VocabType::Person),
            "place" => Some(VocabType::Place),
            "event" => Some(VocabType::Event),
            "set" => Some(VocabType::Set),
            _ => None,
        }
    }
}

/// A vocabulary term (spec.md §3 "Vocabulary term").
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VocabularyTerm {
    /// Stable string id
    pub id: String,
    pub vocab_type: Option<String>,
    pub label_en: Option<String>,
    pub label_nl: Option<String>,
    pub external_id: Option<String>,
    pub broader_id: Option<String>,
    pub notation: Option<String>,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
}

impl VocabularyTerm {
    /// `label_en`/`label_nl` lowercased and whitespace-stripped for
    /// diacritic-insensitive fallback lookup.
    pub fn normalized_label(&self) -> Option<String> {
        let label = self.label_en.as_ref().or(self.label_nl.as_ref())?;
        Some(
            label
                .chars()
                .filter(|c| !c.is_whitespace())
                .flat_map(|c| c.to_lowercase())
                .collect(),
        )
    }

    /// Invariant 2: at least one of label_en/label_nl is present.
    pub fn has_label(&self) -> bool {
        self.label_en.as_deref().is_some_and(|s| !s.is_empty())
            || self.label_nl.as_deref().is_some_and(|s| !s.is_empty())
    }

    /// Invariant 3: lat/lon range and co-presence.
    pub fn has_valid_coords(&self) -> bool {
        match (self.lat, self.lon) {
            (Some(lat), Some(lon)) => (-90.0..=90.0).contains(&lat) && (-180.0..=180.0).contains(&lon),
            (None, None) => true,
            _ => false,
        }
    }
}

/// An artwork (spec.md §3 "Artwork").
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Artwork {
    pub object_number: String,
    pub title: Option<String>,
    pub creator: Option<String>,
    pub rights_uri: Option<String>,
    pub linked_art_uri: Option<String>,
    // Tier-2 fields
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
    pub tier2_done: bool,
}

impl Artwork {
    /// Invariant 5: date_earliest <= date_latest once both are resolved.
    pub fn normalize_dates(&mut self) {
        match (self.date_earliest, self.date_latest) {
            (Some(e), None) => self.date_latest = Some(e),
            (None, Some(l)) => self.date_earliest = Some(l),
            _ => {}
        }
    }

    /// Whether any Tier-2 field carries a non-null value.
    pub fn has_tier2_content(&self) -> bool {
        self.inscription.is_some()
            || self.provenance.is_some()
            || self.credit_line.is_some()
            || self.description.is_some()
            || self.narrative.is_some()
            || self.height_cm.is_some()
            || self.width_cm.is_some()
            || self.date_earliest.is_some()
    }
}

/// The mapping-edge field-name enumeration (spec.md §3 "Mapping edge").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MappingField {
    Subject,
    Material,
    Type,
    Creator,
    Spatial,
    Technique,
    BirthPlace,
    DeathPlace,
    Profession,
    CollectionSet,
    ProductionRole,
    AttributionQualifier,
}

impl MappingField {
    pub fn as_str(&self) -> &'static str {
        match self {
            MappingField::Subject => "subject",
            MappingField::Material => "material",
            MappingField::Type => "type",
            MappingField::Creator => "creator",
            MappingField::Spatial => "spatial",
            MappingField::Technique => "technique",
            MappingField::BirthPlace => "birth_place",
            MappingField::DeathPlace => "death_place",
            MappingField::Profession => "profession",
            MappingField::CollectionSet => "collection_set",
            MappingField::ProductionRole => "production_role",
            MappingField::AttributionQualifier => "attribution_qualifier",
        }
    }
}

/// An ingest-time mapping edge: (artwork, vocab, field) as strings (spec.md §3 invariant 8,
/// "ingest shape"). Normalization (P3) rewrites this into integer surrogates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MappingEdge {
    pub object_number: String,
    pub vocab_id: String,
    pub field: String,
}

/// Person-name variant classification (spec.md §3 "Person-name variant").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NameClassification {
    Display,
    Preferred,
    Inverted,
}

impl NameClassification {
    pub fn as_str(&self) -> &'static str {
        match self {
            NameClassification::Display => "display",
            NameClassification::Preferred => "preferred",
            NameClassification::Inverted => "inverted",
        }
    }
}

/// A person-name variant row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersonNameVariant {
    pub person_id: String,
    pub content: String,
    pub lang: Option<String>,
    pub classification: NameClassification,
}

/// An artwork embedding row (spec.md §3 "Artwork embedding").
#[derive(Debug, Clone)]
pub struct ArtworkEmbedding {
    pub object_number: String,
    pub source_text: String,
    pub source_hash: String,
    /// L2-normalized, int8-quantized vector, length D.
    pub vector: Vec<i8>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn has_label_requires_one_of_en_nl() {
        let mut t = VocabularyTerm::default();
        assert!(!t.has_label());
        t.label_nl = Some("Amsterdam".to_string());
        assert!(t.has_label());
    }

    #[test]
    fn coords_must_be_co_present_and_in_range() {
        let mut t = VocabularyTerm {
            lat: Some(52.37),
            ..Default::default()
        };
        assert!(!t.has_valid_coords());
        t.lon = Some(4.89);
        assert!(t.has_valid_coords());
        t.lat = Some(200.0);
        assert!(!t.has_valid_coords());
    }

    #[test]
    fn normalize_dates_copies_single_bound() {
        let mut a = Artwork {
            date_earliest: Some(1650),
            ..Default::default()
        };
        a.normalize_dates();
        assert_eq!(a.date_latest, Some(1650));
    }
}

//! External-id extraction helpers shared across geocoding phases, grounded on
//! `geocode_places.py`'s `extract_qid`/`extract_geonames_id`/`extract_tgn_id`/
//! `extract_rijks_id`.

pub fn extract_qid(uri: &str) -> Option<&str> {
    for prefix in [
        "http://www.wikidata.org/entity/",
        "https://www.wikidata.org/entity/",
        "http://www.wikidata.org/wiki/",
        "https://www.wikidata.org/wiki/",
    ] {
        if let Some(rest) = uri.strip_prefix(prefix) {
            return Some(rest);
        }
    }
    None
}

pub fn extract_geonames_id(uri: &str) -> Option<&str> {
    for prefix in [
        "http://sws.geonames.org/",
        "https://sws.geonames.org/",
        "http://www.geonames.org/",
        "https://www.geonames.org/",
    ] {
        if let Some(rest) = uri.strip_prefix(prefix) {
            return Some(rest.trim_end_matches('/'));
        }
    }
    None
}

pub fn extract_tgn_id(uri: &str) -> Option<&str> {
    uri.strip_prefix("http://vocab.getty.edu/tgn/")
}

pub fn extract_rijks_id(uri: &str) -> Option<&str> {
    for prefix in ["https://id.rijksmuseum.nl/", "http://id.rijksmuseum.nl/"] {
        if let Some(rest) = uri.strip_prefix(prefix) {
            return Some(rest.trim_end_matches('/'));
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_each_id_family() {
        assert_eq!(extract_qid("https://www.wikidata.org/wiki/Q727"), Some("Q727"));
        assert_eq!(extract_geonames_id("http://sws.geonames.org/2759794/"), Some("2759794"));
        assert_eq!(extract_tgn_id("http://vocab.getty.edu/tgn/7006934"), Some("7006934"));
        assert_eq!(extract_rijks_id("https://id.rijksmuseum.nl/123"), Some("123"));
        assert_eq!(extract_qid("http://example.com/other"), None);
    }
}

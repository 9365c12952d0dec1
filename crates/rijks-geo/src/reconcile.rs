//! Phase 3: Wikidata entity reconciliation, grounded on
//! `geocode_places.py::phase_3_reconciliation` (search → SPARQL validation →
//! weighted scoring → accept/review/reject CSVs → auto-apply accepted rows).

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use regex::Regex;
use rusqlite::Connection;
use serde_json::Value;
use tokio::sync::Semaphore;
use tracing::{info, warn};

use crate::error::Result;
use crate::sparql::{binding_f64, binding_str, last_segment, query};

const WIKIDATA_API: &str = "https://www.wikidata.org/w/api.php";
const SEARCH_BATCH_LOG_EVERY: usize = 200;
const VALIDATE_BATCH_SIZE: usize = 300;

/// P31 allowlist for geographic entities (scoring step 2).
const GEOGRAPHIC_TYPES: &[&str] = &[
    "Q515", "Q3957", "Q532", "Q5119", "Q1549591", "Q486972", "Q839954", "Q34442", "Q41176",
    "Q35657", "Q4294693", "Q23397", "Q4022", "Q34763", "Q23442", "Q6256", "Q10864048", "Q33506",
    "Q16970", "Q23413", "Q57821", "Q12280", "Q44782", "Q55488", "Q82794", "Q7930989", "Q123705",
    "Q15284", "Q2983893", "Q3024240", "Q1187580", "Q17334923", "Q15221", "Q16560", "Q751876",
    "Q24354",
];

/// Non-geographic types that veto a candidate outright.
const NON_GEOGRAPHIC_TYPES: &[&str] = &[
    "Q523", "Q318", "Q17362920", "Q4167410", "Q13442814", "Q5", "Q16521", "Q11424", "Q7725634",
];

/// Countries scored at 50% country-context weight (France, Germany, Italy,
/// UK, Spain, US, Indonesia, Japan, China) when the match isn't the
/// Netherlands itself.
const MAJOR_COUNTRIES: &[&str] = &[
    "Q142", "Q183", "Q38", "Q145", "Q29", "Q30", "Q252", "Q17", "Q148",
];
const NETHERLANDS: &str = "Q55";

#[derive(Debug, Clone)]
pub struct Candidate {
    pub qid: String,
    pub label: String,
}

#[derive(Debug, Clone, Default)]
struct QidInfo {
    types: HashSet<String>,
    country_qid: Option<String>,
    lat: Option<f64>,
    lon: Option<f64>,
    label_en: Option<String>,
}

#[derive(Debug, Clone)]
struct ScoredCandidate {
    candidate: Candidate,
    score: f64,
    lat: Option<f64>,
    lon: Option<f64>,
    types: Vec<String>,
}

#[derive(Debug, Default)]
pub struct ReconcileStats {
    pub candidates_searched: usize,
    pub accepted: usize,
    pub review: usize,
    pub rejected: usize,
    pub applied: usize,
}

fn strip_parenthetical(name: &str) -> Option<String> {
    let re = Regex::new(r"^(.+?)\s*\(").unwrap();
    re.captures(name).map(|c| c[1].trim().to_string())
}

fn string_similarity(a: &str, b: &str) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let a_norm = a.to_lowercase();
    let a_norm = a_norm.trim();
    let b_norm = b.to_lowercase();
    let b_norm = b_norm.trim();
    if a_norm == b_norm {
        return 100.0;
    }
    strsim::normalized_levenshtein(a_norm, b_norm) * 100.0
}

fn unreconciled_places(conn: &Connection) -> Result<Vec<(String, String)>> {
    let mut stmt = conn.prepare(
        "SELECT v.id, COALESCE(NULLIF(v.label_en, ''), v.label_nl) AS name
         FROM vocabulary v
         WHERE v.vocab_type = 'place'
           AND v.lat IS NULL
           AND (v.external_id IS NULL OR v.external_id = '')
           AND EXISTS (SELECT 1 FROM mappings m WHERE m.vocab_id = v.id)",
    )?;
    let rows: Vec<(String, Option<String>)> = stmt
        .query_map([], |r| Ok((r.get(0)?, r.get(1)?)))?
        .filter_map(std::result::Result::ok)
        .collect();

    let mut out = Vec::new();
    let mut skipped = 0usize;
    for (id, name) in rows {
        let name = name.unwrap_or_default();
        let lowered = name.to_lowercase();
        if name.is_empty() || matches!(lowered.as_str(), "unknown" | "onbekend" | "?" | "??") || name.chars().count() < 2 {
            skipped += 1;
            continue;
        }
        out.push((id, name));
    }
    info!(candidates = out.len(), skipped, "phase 3: places to reconcile");
    Ok(out)
}

fn parse_search_items(data: &Value) -> Vec<Candidate> {
    data.get("search")
        .and_then(|v| v.as_array())
        .map(|items| {
            items
                .iter()
                .filter_map(|item| {
                    Some(Candidate {
                        qid: item.get("id")?.as_str()?.to_string(),
                        label: item.get("label").and_then(|v| v.as_str()).unwrap_or_default().to_string(),
                    })
                })
                .collect()
        })
        .unwrap_or_default()
}

fn dedupe_candidates(candidates: Vec<Candidate>, limit: usize) -> Vec<Candidate> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for c in candidates {
        if seen.insert(c.qid.clone()) {
            out.push(c);
            if out.len() >= limit {
                break;
            }
        }
    }
    out
}

fn build_search_url(name: &str, lang: &str) -> (String, Vec<(&'static str, String)>) {
    (
        WIKIDATA_API.to_string(),
        vec![
            ("action", "wbsearchentities".to_string()),
            ("search", name.to_string()),
            ("language", lang.to_string()),
            ("uselang", lang.to_string()),
            ("limit", "5".to_string()),
            ("format", "json".to_string()),
        ],
    )
}

/// GET with shared exponential backoff on 429/5xx (5s, 10s, 20s, capped 60s).
async fn get_with_retry(
    client: &reqwest::Client,
    url: &str,
    params: &[(&str, String)],
    backoff_until: &Arc<Mutex<std::time::Instant>>,
    max_retries: u32,
) -> Option<Value> {
    for attempt in 0..=max_retries {
        let wait_until = *backoff_until.lock().unwrap();
        let now = std::time::Instant::now();
        if wait_until > now {
            tokio::time::sleep(wait_until - now).await;
        }
        tokio::time::sleep(Duration::from_millis(200)).await;

        let resp = client
            .get(url)
            .query(params)
            .header(reqwest::header::USER_AGENT, super::USER_AGENT)
            .send()
            .await;
        match resp {
            Ok(r) if r.status() == reqwest::StatusCode::TOO_MANY_REQUESTS => {
                let wait = Duration::from_secs((5u64 << attempt.min(3)).min(60));
                *backoff_until.lock().unwrap() = std::time::Instant::now() + wait;
                warn!(attempt, wait_secs = wait.as_secs(), "wikidata rate limited, backing off");
                tokio::time::sleep(wait).await;
            }
            Ok(r) if r.status().is_server_error() => {
                tokio::time::sleep(Duration::from_secs(1 << attempt.min(5))).await;
            }
            Ok(r) => return r.json::<Value>().await.ok(),
            Err(_) if attempt < max_retries => {
                tokio::time::sleep(Duration::from_secs(1 << attempt.min(5))).await;
            }
            Err(_) => return None,
        }
    }
    None
}

/// Phase 3a: search Wikidata for entity candidates, bounded concurrency
/// `concurrency`, Dutch-then-English with a bare-name parenthetical retry.
async fn search_wikidata_entities(
    client: &reqwest::Client,
    names: &[(String, String)],
    concurrency: usize,
) -> HashMap<String, Vec<Candidate>> {
    let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));
    let backoff_until = Arc::new(Mutex::new(std::time::Instant::now()));
    let client = client.clone();

    let mut handles = Vec::with_capacity(names.len());
    for (vocab_id, name) in names {
        let semaphore = Arc::clone(&semaphore);
        let backoff_until = Arc::clone(&backoff_until);
        let client = client.clone();
        let vocab_id = vocab_id.clone();
        let name = name.clone();
        handles.push(tokio::spawn(async move {
            let _permit = semaphore.acquire_owned().await.unwrap();
            let mut candidates = Vec::new();
            for lang in ["nl", "en"] {
                let (url, params) = build_search_url(&name, lang);
                if let Some(data) = get_with_retry(&client, &url, &params, &backoff_until, 4).await {
                    candidates.extend(parse_search_items(&data));
                }
                if !candidates.is_empty() {
                    break;
                }
            }
            if candidates.is_empty() {
                if let Some(bare) = strip_parenthetical(&name) {
                    let (url, params) = build_search_url(&bare, "nl");
                    if let Some(data) = get_with_retry(&client, &url, &params, &backoff_until, 4).await {
                        candidates.extend(parse_search_items(&data));
                    }
                }
            }
            (vocab_id, dedupe_candidates(candidates, 5))
        }));
    }

    let mut results = HashMap::new();
    let mut done = 0usize;
    for h in handles {
        if let Ok((vocab_id, candidates)) = h.await {
            results.insert(vocab_id, candidates);
        }
        done += 1;
        if done % SEARCH_BATCH_LOG_EVERY == 0 {
            info!(done, total = names.len(), "phase 3a: wikidata search progress");
        }
    }
    results
}

/// Phase 3b: validate every candidate QID's types, country, admin area,
/// coordinate, and English label via batched SPARQL.
async fn validate_candidates_sparql(
    client: &reqwest::Client,
    sparql_endpoint: &str,
    candidates: &HashMap<String, Vec<Candidate>>,
) -> HashMap<String, QidInfo> {
    let mut all_qids: Vec<String> = candidates
        .values()
        .flatten()
        .map(|c| c.qid.clone())
        .collect::<HashSet<_>>()
        .into_iter()
        .collect();
    all_qids.sort();
    if all_qids.is_empty() {
        return HashMap::new();
    }
    info!(qids = all_qids.len(), "phase 3b: validating candidates via SPARQL");

    let mut qid_info: HashMap<String, QidInfo> = HashMap::new();
    for chunk in all_qids.chunks(VALIDATE_BATCH_SIZE) {
        let values = chunk.iter().map(|q| format!("wd:{q}")).collect::<Vec<_>>().join(" ");
        let sparql = format!(
            r#"SELECT ?item ?lat ?lon ?type ?country ?admin ?label WHERE {{
              VALUES ?item {{ {values} }}
              OPTIONAL {{ ?item wdt:P625 ?coord .
                          BIND(geof:latitude(?coord) AS ?lat)
                          BIND(geof:longitude(?coord) AS ?lon) }}
              OPTIONAL {{ ?item wdt:P31 ?type }}
              OPTIONAL {{ ?item wdt:P17 ?country }}
              OPTIONAL {{ ?item wdt:P131 ?admin }}
              OPTIONAL {{ ?item rdfs:label ?label . FILTER(LANG(?label) = "en") }}
            }}"#
        );
        if let Ok(bindings) = query(client, sparql_endpoint, &sparql).await {
            for b in &bindings {
                let Some(item_uri) = binding_str(b, "item") else { continue };
                let qid = last_segment(item_uri).to_string();
                let info = qid_info.entry(qid).or_default();
                if let Some(t) = binding_str(b, "type") {
                    info.types.insert(last_segment(t).to_string());
                }
                if info.country_qid.is_none() {
                    if let Some(c) = binding_str(b, "country") {
                        info.country_qid = Some(last_segment(c).to_string());
                    }
                }
                if info.lat.is_none() {
                    if let (Some(lat), Some(lon)) = (binding_f64(b, "lat"), binding_f64(b, "lon")) {
                        info.lat = Some(lat);
                        info.lon = Some(lon);
                    }
                }
                if info.label_en.is_none() {
                    if let Some(l) = binding_str(b, "label") {
                        info.label_en = Some(l.to_string());
                    }
                }
            }
        }
        tokio::time::sleep(Duration::from_secs(2)).await;
    }
    qid_info
}

/// Phase 3c: weighted score (string similarity 40%, geo type 25%, has-coords
/// 20%, country context 15%).
fn score_candidate(name: &str, candidate: &Candidate, info: Option<&QidInfo>) -> f64 {
    let label = info.and_then(|i| i.label_en.clone()).unwrap_or_else(|| candidate.label.clone());

    let mut sim = string_similarity(name, &label);
    if let Some(bare) = strip_parenthetical(name) {
        sim = sim.max(string_similarity(&bare, &label));
    }
    let sim_score = sim * 0.40;

    let types = info.map(|i| &i.types);
    let type_score = match types {
        Some(t) if t.iter().any(|ty| GEOGRAPHIC_TYPES.contains(&ty.as_str())) => 100.0 * 0.25,
        Some(t) if t.iter().any(|ty| NON_GEOGRAPHIC_TYPES.contains(&ty.as_str())) => 0.0,
        Some(t) if t.is_empty() => 25.0 * 0.25,
        None => 25.0 * 0.25,
        Some(_) => 50.0 * 0.25,
    };

    let has_coords = info.map(|i| i.lat.is_some()).unwrap_or(false);
    let coord_score = if has_coords { 100.0 * 0.20 } else { 0.0 };

    let country_score = match info.and_then(|i| i.country_qid.as_deref()) {
        Some(NETHERLANDS) => 100.0 * 0.15,
        Some(q) if MAJOR_COUNTRIES.contains(&q) => 50.0 * 0.15,
        Some(_) => 40.0 * 0.15,
        None => 25.0 * 0.15,
    };

    sim_score + type_score + coord_score + country_score
}

/// Run phases 3a-3d end to end: search, validate, score, write CSVs, apply
/// accepted rows. Returns the categorized outcome plus the applied count.
pub async fn run(
    conn: &mut Connection,
    client: &reqwest::Client,
    sparql_endpoint: &str,
    output_dir: &Path,
    search_concurrency: usize,
    dry_run: bool,
) -> Result<ReconcileStats> {
    let candidates_input = unreconciled_places(conn)?;
    if candidates_input.is_empty() || dry_run {
        return Ok(ReconcileStats {
            candidates_searched: candidates_input.len(),
            ..Default::default()
        });
    }

    let search_results = search_wikidata_entities(client, &candidates_input, search_concurrency).await;
    let qid_info = validate_candidates_sparql(client, sparql_endpoint, &search_results).await;
    let name_lookup: HashMap<String, String> = candidates_input.into_iter().collect();

    let mut accepted = Vec::new();
    let mut review = Vec::new();
    let mut rejected = Vec::new();

    for (vocab_id, cands) in &search_results {
        let name = name_lookup.get(vocab_id).cloned().unwrap_or_default();
        if cands.is_empty() {
            rejected.push((vocab_id.clone(), name, "no_candidates".to_string()));
            continue;
        }

        let mut scored: Vec<ScoredCandidate> = cands
            .iter()
            .map(|c| {
                let info = qid_info.get(&c.qid);
                ScoredCandidate {
                    candidate: c.clone(),
                    score: score_candidate(&name, c, info),
                    lat: info.and_then(|i| i.lat),
                    lon: info.and_then(|i| i.lon),
                    types: info.map(|i| i.types.iter().cloned().collect()).unwrap_or_default(),
                }
            })
            .collect();
        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap());

        let top = &scored[0];
        let gap = if scored.len() > 1 { top.score - scored[1].score } else { 100.0 };
        let has_coords = top.lat.is_some();

        if top.score >= 80.0 && has_coords && gap >= 20.0 {
            accepted.push((
                vocab_id.clone(),
                name,
                top.candidate.qid.clone(),
                top.lat.unwrap(),
                top.lon.unwrap(),
                top.score,
            ));
        } else if top.score >= 60.0 || (has_coords && top.score >= 50.0) {
            review.push((vocab_id.clone(), name, scored));
        } else {
            rejected.push((vocab_id.clone(), name, format!("low_score:{:.0}", top.score)));
        }
    }

    info!(accepted = accepted.len(), review = review.len(), rejected = rejected.len(), "phase 3c complete");

    write_outcome_csvs(output_dir, &accepted, &review, &rejected)?;

    let mut updates: HashMap<String, (f64, f64, String)> = HashMap::new();
    for (vocab_id, _name, qid, lat, lon, _score) in &accepted {
        updates.insert(vocab_id.clone(), (*lat, *lon, format!("http://www.wikidata.org/entity/{qid}")));
    }
    let applied = apply_coord_and_id_updates(conn, &updates)?;
    info!(applied, "phase 3d: accepted matches applied");

    Ok(ReconcileStats {
        candidates_searched: search_results.len(),
        accepted: accepted.len(),
        review: review.len(),
        rejected: rejected.len(),
        applied,
    })
}

fn apply_coord_and_id_updates(
    conn: &mut Connection,
    updates: &HashMap<String, (f64, f64, String)>,
) -> Result<usize> {
    if updates.is_empty() {
        return Ok(0);
    }
    let tx = conn.transaction()?;
    let mut applied = 0usize;
    {
        let mut stmt = tx.prepare(
            "UPDATE vocabulary SET lat = ?1, lon = ?2, external_id = ?3 WHERE id = ?4 AND lat IS NULL",
        )?;
        for (vocab_id, (lat, lon, ext_id)) in updates {
            applied += stmt.execute((lat, lon, ext_id, vocab_id))?;
        }
    }
    tx.commit()?;
    Ok(applied)
}

fn write_outcome_csvs(
    output_dir: &Path,
    accepted: &[(String, String, String, f64, f64, f64)],
    review: &[(String, String, Vec<ScoredCandidate>)],
    rejected: &[(String, String, String)],
) -> Result<()> {
    std::fs::create_dir_all(output_dir)?;

    let mut w = csv::Writer::from_path(output_dir.join("reconciled_accepted.csv"))?;
    w.write_record(["vocab_id", "name", "qid", "lat", "lon", "score"])?;
    for (vocab_id, name, qid, lat, lon, score) in accepted {
        w.write_record([vocab_id, name, qid, &lat.to_string(), &lon.to_string(), &format!("{score:.0}")])?;
    }
    w.flush()?;

    let mut w = csv::Writer::from_path(output_dir.join("reconciled_review.csv"))?;
    w.write_record([
        "vocab_id", "name", "decision", "qid_1", "label_1", "score_1", "lat_1", "lon_1", "types_1", "qid_2",
        "label_2", "score_2", "lat_2", "lon_2", "types_2",
    ])?;
    for (vocab_id, name, scored) in review {
        let mut row = vec![vocab_id.clone(), name.clone(), String::new()];
        for i in 0..2 {
            if let Some(s) = scored.get(i) {
                row.push(s.candidate.qid.clone());
                row.push(s.candidate.label.clone());
                row.push(format!("{:.0}", s.score));
                row.push(s.lat.map(|v| v.to_string()).unwrap_or_default());
                row.push(s.lon.map(|v| v.to_string()).unwrap_or_default());
                row.push(s.types.iter().take(3).cloned().collect::<Vec<_>>().join(";"));
            } else {
                row.extend(std::iter::repeat(String::new()).take(6));
            }
        }
        w.write_record(&row)?;
    }
    w.flush()?;

    let mut w = csv::Writer::from_path(output_dir.join("reconciled_rejected.csv"))?;
    w.write_record(["vocab_id", "name", "reason"])?;
    for (vocab_id, name, reason) in rejected {
        w.write_record([vocab_id, name, reason])?;
    }
    w.flush()?;

    Ok(())
}

/// Apply a manually reviewed CSV with a `decision` column (accepted values:
/// y/yes/1/accept), reading `qid_1`/`lat_1`/`lon_1` as the chosen candidate.
pub fn apply_reviewed(conn: &mut Connection, csv_path: &Path, dry_run: bool) -> Result<usize> {
    let mut reader = csv::Reader::from_path(csv_path)?;
    let mut updates: HashMap<String, (f64, f64, String)> = HashMap::new();

    for record in reader.deserialize::<HashMap<String, String>>() {
        let Ok(record) = record else { continue };
        let decision = record.get("decision").map(|s| s.trim().to_lowercase()).unwrap_or_default();
        if !matches!(decision.as_str(), "y" | "yes" | "1" | "accept") {
            continue;
        }
        let Some(vocab_id) = record.get("vocab_id") else { continue };
        let Some(qid) = record.get("qid_1").filter(|s| !s.is_empty()) else { continue };
        let (Some(lat), Some(lon)) = (
            record.get("lat_1").and_then(|s| s.parse::<f64>().ok()),
            record.get("lon_1").and_then(|s| s.parse::<f64>().ok()),
        ) else {
            continue;
        };
        updates.insert(vocab_id.clone(), (lat, lon, format!("http://www.wikidata.org/entity/{qid}")));
    }

    info!(approved = updates.len(), "apply-reviewed: approved entries");
    if dry_run {
        return Ok(0);
    }
    apply_coord_and_id_updates(conn, &updates)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rijks_core::store;

    #[test]
    fn string_similarity_exact_match_is_100() {
        assert_eq!(string_similarity("Amsterdam", "amsterdam"), 100.0);
    }

    #[test]
    fn string_similarity_partial_match_is_between() {
        let sim = string_similarity("Domkerk", "Dom Church");
        assert!(sim > 0.0 && sim < 100.0);
    }

    #[test]
    fn strips_parenthetical_context() {
        assert_eq!(strip_parenthetical("Domkerk (Utrecht)"), Some("Domkerk".to_string()));
        assert_eq!(strip_parenthetical("Plain Name"), None);
    }

    #[test]
    fn scores_known_geographic_type_higher_than_non_geographic() {
        let geo = QidInfo {
            types: ["Q515".to_string()].into_iter().collect(),
            country_qid: Some("Q55".to_string()),
            lat: Some(52.0),
            lon: Some(4.0),
            label_en: Some("Amsterdam".to_string()),
        };
        let non_geo = QidInfo {
            types: ["Q5".to_string()].into_iter().collect(),
            ..Default::default()
        };
        let candidate = Candidate { qid: "Q727".to_string(), label: "Amsterdam".to_string() };
        let geo_score = score_candidate("Amsterdam", &candidate, Some(&geo));
        let non_geo_score = score_candidate("Amsterdam", &candidate, Some(&non_geo));
        assert!(geo_score > non_geo_score);
        assert!(geo_score >= 80.0);
    }

    #[test]
    fn finds_unreconciled_places_excluding_unknown_and_short_names() {
        let conn = store::open_in_memory().unwrap();
        store::init_ingest_schema(&conn).unwrap();
        conn.execute(
            "INSERT INTO vocabulary (id, vocab_type, label_en) VALUES
             ('p1', 'place', 'Domkerk'), ('p2', 'place', 'Unknown'), ('p3', 'place', 'X')",
            [],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO artworks (object_number) VALUES ('SK-A-1')",
            [],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO mappings (object_number, vocab_id, field) VALUES
             ('SK-A-1', 'p1', 'subject'), ('SK-A-1', 'p2', 'subject'), ('SK-A-1', 'p3', 'subject')",
            [],
        )
        .unwrap();

        let places = unreconciled_places(&conn).unwrap();
        assert_eq!(places.len(), 1);
        assert_eq!(places[0].1, "Domkerk");
    }

    #[test]
    fn apply_reviewed_skips_non_accepted_decisions() {
        let dir = tempfile::tempdir().unwrap();
        let csv_path = dir.path().join("review.csv");
        std::fs::write(
            &csv_path,
            "vocab_id,decision,qid_1,lat_1,lon_1\np1,yes,Q727,52.37,4.89\np2,no,Q1,1.0,1.0\n",
        )
        .unwrap();

        let mut conn = store::open_in_memory().unwrap();
        store::init_ingest_schema(&conn).unwrap();
        conn.execute(
            "INSERT INTO vocabulary (id, vocab_type) VALUES ('p1', 'place'), ('p2', 'place')",
            [],
        )
        .unwrap();

        let applied = apply_reviewed(&mut conn, &csv_path, false).unwrap();
        assert_eq!(applied, 1);
        let external_id: String = conn
            .query_row("SELECT external_id FROM vocabulary WHERE id = 'p1'", [], |r| r.get(0))
            .unwrap();
        assert_eq!(external_id, "http://www.wikidata.org/entity/Q727");
    }
}

//! Phase 4: validation, grounded on `geocode_places.py::phase_4_validation`.
//! Reports are never auto-fixed — this only surfaces issues for manual review.

use std::collections::HashMap;
use std::path::Path;

use regex::Regex;
use rusqlite::Connection;
use tracing::info;

use crate::error::Result;

const DUTCH_CITIES: &[&str] = &[
    "amsterdam", "rotterdam", "den haag", "utrecht", "leiden", "haarlem", "delft", "groningen",
    "breda", "maastricht", "dordrecht",
];
const CARIBBEAN_KEYWORDS: &[&str] =
    &["curaçao", "curacao", "bonaire", "sint-eustatius", "sint maarten", "aruba", "suriname"];

#[derive(Debug, Clone)]
pub struct Issue {
    pub id: String,
    pub name: String,
    pub lat: f64,
    pub lon: f64,
    pub issue: &'static str,
    pub detail: String,
}

struct Place {
    id: String,
    name: String,
    lat: f64,
    lon: f64,
}

fn geocoded_places(conn: &Connection) -> Result<Vec<Place>> {
    let mut stmt = conn.prepare(
        "SELECT id, COALESCE(NULLIF(label_en, ''), label_nl), lat, lon
         FROM vocabulary WHERE vocab_type = 'place' AND lat IS NOT NULL",
    )?;
    let rows = stmt
        .query_map([], |r| {
            Ok(Place {
                id: r.get(0)?,
                name: r.get::<_, Option<String>>(1)?.unwrap_or_default(),
                lat: r.get(2)?,
                lon: r.get(3)?,
            })
        })?
        .filter_map(std::result::Result::ok)
        .collect();
    Ok(rows)
}

fn is_caribbean(name_lower: &str, word_boundary: &Regex) -> bool {
    CARIBBEAN_KEYWORDS.contains(&name_lower)
        || CARIBBEAN_KEYWORDS.iter().any(|kw| name_lower.starts_with(&format!("{kw} ")) || name_lower.starts_with(&format!("{kw},")))
        || word_boundary.is_match(name_lower)
}

/// Run all checks over every geocoded place: null island, out-of-range
/// lat/lon, Dutch-city lat/lon swap, Caribbean/Suriname bounding box, and
/// duplicate-coordinate clusters (5+ distinct-looking names at one point).
pub fn run(conn: &Connection) -> Result<Vec<Issue>> {
    let places = geocoded_places(conn)?;
    info!(places = places.len(), "phase 4: validating geocoded places");

    let caribbean_word_boundary = Regex::new(r"\b(?:curaçao|curacao|bonaire|aruba)\b").unwrap();
    let mut issues = Vec::new();
    let mut coord_map: HashMap<(i64, i64), Vec<&Place>> = HashMap::new();

    for p in &places {
        if p.lat.abs() < 0.01 && p.lon.abs() < 0.01 {
            issues.push(Issue {
                id: p.id.clone(),
                name: p.name.clone(),
                lat: p.lat,
                lon: p.lon,
                issue: "null_island",
                detail: format!("Coordinates ({}, {}) are at or near Null Island", p.lat, p.lon),
            });
        }
        if p.lat.abs() > 90.0 {
            issues.push(Issue {
                id: p.id.clone(),
                name: p.name.clone(),
                lat: p.lat,
                lon: p.lon,
                issue: "lat_out_of_range",
                detail: format!("Latitude {} exceeds ±90°", p.lat),
            });
        }
        if p.lon.abs() > 180.0 {
            issues.push(Issue {
                id: p.id.clone(),
                name: p.name.clone(),
                lat: p.lat,
                lon: p.lon,
                issue: "lon_out_of_range",
                detail: format!("Longitude {} exceeds ±180°", p.lon),
            });
        }

        let name_lower = p.name.to_lowercase();
        if DUTCH_CITIES.contains(&name_lower.as_str()) {
            let in_range = (47.0..=54.0).contains(&p.lat) && (3.0..=8.0).contains(&p.lon);
            if !in_range {
                let swapped = (47.0..=54.0).contains(&p.lon) && (3.0..=8.0).contains(&p.lat);
                if swapped {
                    issues.push(Issue {
                        id: p.id.clone(),
                        name: p.name.clone(),
                        lat: p.lat,
                        lon: p.lon,
                        issue: "lat_lon_swap",
                        detail: format!(
                            "Likely swapped: ({}, {}) → should be ({}, {})",
                            p.lat, p.lon, p.lon, p.lat
                        ),
                    });
                } else if p.lat < 0.0 {
                    issues.push(Issue {
                        id: p.id.clone(),
                        name: p.name.clone(),
                        lat: p.lat,
                        lon: p.lon,
                        issue: "negative_lat",
                        detail: format!("Dutch place with negative latitude: {}", p.lat),
                    });
                }
            }
        }

        if is_caribbean(&name_lower, &caribbean_word_boundary) {
            let caribbean_range = (10.0..=20.0).contains(&p.lat) && (-71.0..=-55.0).contains(&p.lon);
            let suriname_range = (-10.0..=10.0).contains(&p.lat) && (-60.0..=-45.0).contains(&p.lon);
            if !caribbean_range && !suriname_range {
                issues.push(Issue {
                    id: p.id.clone(),
                    name: p.name.clone(),
                    lat: p.lat,
                    lon: p.lon,
                    issue: "caribbean_outlier",
                    detail: "Caribbean/Suriname place outside expected range".to_string(),
                });
            }
        }

        let key = ((p.lat * 10_000.0).round() as i64, (p.lon * 10_000.0).round() as i64);
        coord_map.entry(key).or_default().push(p);
    }

    for (coord, entries) in &coord_map {
        if entries.len() >= 5 && *coord != (0, 0) {
            let names: Vec<&str> = entries.iter().take(5).map(|e| e.name.as_str()).collect();
            let first_words: std::collections::HashSet<&str> =
                names.iter().filter_map(|n| n.split_whitespace().next()).collect();
            if first_words.len() >= 3 {
                issues.push(Issue {
                    id: entries[0].id.clone(),
                    name: format!("{} entries", entries.len()),
                    lat: entries[0].lat,
                    lon: entries[0].lon,
                    issue: "duplicate_coords",
                    detail: format!(
                        "{} places at ({}, {}): {}...",
                        entries.len(),
                        entries[0].lat,
                        entries[0].lon,
                        names.join(", ")
                    ),
                });
            }
        }
    }

    info!(issues = issues.len(), "phase 4 complete");
    Ok(issues)
}

/// Render the issue list as a Markdown validation report (spec.md §4.5).
pub fn write_report(conn: &Connection, issues: &[Issue], output_dir: &Path) -> Result<()> {
    std::fs::create_dir_all(output_dir)?;

    let total: i64 = conn.query_row("SELECT COUNT(*) FROM vocabulary WHERE vocab_type = 'place'", [], |r| r.get(0))?;
    let with_coords: i64 =
        conn.query_row("SELECT COUNT(*) FROM vocabulary WHERE vocab_type = 'place' AND lat IS NOT NULL", [], |r| r.get(0))?;

    let mut lines = vec![
        "# Geocoding Validation Report".to_string(),
        String::new(),
        "## Coverage".to_string(),
        format!("- Total places: {total}"),
        format!(
            "- With coordinates: {with_coords} ({:.1}%)",
            if total > 0 { with_coords as f64 / total as f64 * 100.0 } else { 0.0 }
        ),
        format!("- Without coordinates: {}", total - with_coords),
        String::new(),
        format!("## Issues Found: {}", issues.len()),
    ];

    if issues.is_empty() {
        lines.push(String::new());
        lines.push("No issues found.".to_string());
    } else {
        let mut by_type: HashMap<&str, Vec<&Issue>> = HashMap::new();
        for issue in issues {
            by_type.entry(issue.issue).or_default().push(issue);
        }
        let mut types: Vec<&&str> = by_type.keys().collect();
        types.sort();
        for issue_type in types {
            let items = &by_type[*issue_type];
            lines.push(String::new());
            lines.push(format!("### {issue_type} ({})", items.len()));
            lines.push(String::new());
            lines.push("| ID | Name | Lat | Lon | Detail |".to_string());
            lines.push("|---|---|---|---|---|".to_string());
            for item in items.iter().take(50) {
                lines.push(format!("| {} | {} | {} | {} | {} |", item.id, item.name, item.lat, item.lon, item.detail));
            }
            if items.len() > 50 {
                lines.push(format!("| ... | *{} more* | | | |", items.len() - 50));
            }
        }
    }

    std::fs::write(output_dir.join("validation_report.md"), lines.join("\n") + "\n")?;
    Ok(())
}

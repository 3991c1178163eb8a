//! Database seeders for built-in reference data
//!
//! Default crops are inserted on every startup (existing names are left
//! alone). Barangay boundaries are loaded on demand from a GeoJSON file.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use sqlx::SqlitePool;
use std::path::Path;
use tracing::info;

use super::models::upsert_barangay_by_code;

/// Seed the crops the municipal agriculture office tracks out of the box
pub async fn seed_default_crops(pool: &SqlitePool) -> Result<()> {
    // (name, category)
    let crops: [(&str, &str); 10] = [
        ("Rice", "Cereal"),
        ("Corn", "Cereal"),
        ("Sugarcane", "Industrial"),
        ("Eggplant", "Vegetable"),
        ("Ampalaya", "Vegetable"),
        ("Okra", "Vegetable"),
        ("String Beans", "Vegetable"),
        ("Tomato", "Vegetable"),
        ("Mango", "Fruit"),
        ("Banana", "Fruit"),
    ];

    let mut inserted = 0u64;
    for (name, category) in crops {
        inserted += sqlx::query("INSERT OR IGNORE INTO crops (name, category) VALUES (?, ?)")
            .bind(name)
            .bind(category)
            .execute(pool)
            .await?
            .rows_affected();
    }

    if inserted > 0 {
        info!("Seeded {} default crops", inserted);
    }
    Ok(())
}

#[derive(Debug, Deserialize)]
struct GeoJsonCollection {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    features: Vec<GeoJsonFeature>,
}

#[derive(Debug, Deserialize)]
struct GeoJsonFeature {
    #[serde(default)]
    properties: serde_json::Map<String, serde_json::Value>,
    geometry: Option<serde_json::Value>,
}

impl GeoJsonFeature {
    fn property(&self, keys: &[&str]) -> Option<String> {
        keys.iter().find_map(|key| {
            self.properties
                .get(*key)
                .and_then(|v| match v {
                    serde_json::Value::String(s) => Some(s.trim().to_string()),
                    serde_json::Value::Number(n) => Some(n.to_string()),
                    _ => None,
                })
                .filter(|s| !s.is_empty())
        })
    }
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct BarangayImportSummary {
    pub imported: usize,
    pub skipped: usize,
}

/// Load barangays from a GeoJSON FeatureCollection.
///
/// Features are matched on `ADM4_PCODE` (falling back to `code`) and named
/// from `ADM4_EN` (falling back to `name`). Features missing either are skipped.
pub async fn import_barangays_geojson(
    pool: &SqlitePool,
    path: &Path,
    municipality: Option<&str>,
) -> Result<BarangayImportSummary> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read GeoJSON file: {}", path.display()))?;
    let collection: GeoJsonCollection =
        serde_json::from_str(&raw).context("Failed to parse GeoJSON")?;

    if collection.kind != "FeatureCollection" {
        bail!("Expected a GeoJSON FeatureCollection, found {}", collection.kind);
    }

    let mut summary = BarangayImportSummary::default();
    for feature in &collection.features {
        let code = feature.property(&["ADM4_PCODE", "code", "psgc_code"]);
        let name = feature.property(&["ADM4_EN", "name", "barangay"]);
        let (Some(code), Some(name)) = (code, name) else {
            summary.skipped += 1;
            continue;
        };

        let feature_municipality = municipality
            .map(str::to_string)
            .or_else(|| feature.property(&["ADM3_EN", "municipality"]));
        let geometry = feature.geometry.as_ref().map(|g| g.to_string());

        upsert_barangay_by_code(
            pool,
            &code,
            &name,
            feature_municipality.as_deref(),
            geometry.as_deref(),
        )
        .await?;
        summary.imported += 1;
    }

    info!(
        imported = summary.imported,
        skipped = summary.skipped,
        "Imported barangays from {}",
        path.display()
    );
    Ok(summary)
}

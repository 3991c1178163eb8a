//! Barangay reference data and its GeoJSON projection.

use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Barangay {
    pub id: i64,
    /// PSGC code (ADM4_PCODE in the municipal boundary files)
    pub code: Option<String>,
    pub name: String,
    pub municipality: Option<String>,
    /// Raw GeoJSON geometry, kept only for map display
    #[serde(skip_serializing)]
    pub geometry: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct BarangayOption {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateBarangayRequest {
    pub name: Option<String>,
    pub code: Option<String>,
    pub municipality: Option<String>,
    pub geometry: Option<serde_json::Value>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateBarangayRequest {
    pub name: Option<String>,
    pub code: Option<String>,
    pub municipality: Option<String>,
    pub geometry: Option<serde_json::Value>,
}

impl UpdateBarangayRequest {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.code.is_none() && self.municipality.is_none() && self.geometry.is_none()
    }
}

#[derive(Debug, Serialize)]
pub struct FeatureCollection {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub features: Vec<Feature>,
}

#[derive(Debug, Serialize)]
pub struct Feature {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub properties: serde_json::Value,
    pub geometry: serde_json::Value,
}

impl Barangay {
    /// Project the row into a GeoJSON feature. Unparseable geometry becomes `null`.
    pub fn to_feature(&self) -> Feature {
        let geometry = self
            .geometry
            .as_deref()
            .and_then(|g| serde_json::from_str(g).ok())
            .unwrap_or(serde_json::Value::Null);

        Feature {
            kind: "Feature",
            properties: serde_json::json!({
                "id": self.id,
                "code": self.code,
                "name": self.name,
                "municipality": self.municipality,
            }),
            geometry,
        }
    }
}

impl FromIterator<Feature> for FeatureCollection {
    fn from_iter<I: IntoIterator<Item = Feature>>(iter: I) -> Self {
        Self {
            kind: "FeatureCollection",
            features: iter.into_iter().collect(),
        }
    }
}

pub async fn list_barangays(db: &SqlitePool) -> Result<Vec<Barangay>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM barangays ORDER BY name ASC")
        .fetch_all(db)
        .await
}

pub async fn barangay_options(db: &SqlitePool) -> Result<Vec<BarangayOption>, sqlx::Error> {
    sqlx::query_as("SELECT id, name FROM barangays ORDER BY name ASC")
        .fetch_all(db)
        .await
}

pub async fn find_barangay(db: &SqlitePool, id: i64) -> Result<Option<Barangay>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM barangays WHERE id = ?")
        .bind(id)
        .fetch_optional(db)
        .await
}

pub async fn insert_barangay(
    db: &SqlitePool,
    name: &str,
    code: Option<&str>,
    municipality: Option<&str>,
    geometry: Option<&str>,
) -> Result<Barangay, sqlx::Error> {
    let id = sqlx::query("INSERT INTO barangays (name, code, municipality, geometry) VALUES (?, ?, ?, ?)")
        .bind(name)
        .bind(code)
        .bind(municipality)
        .bind(geometry)
        .execute(db)
        .await?
        .last_insert_rowid();

    sqlx::query_as("SELECT * FROM barangays WHERE id = ?")
        .bind(id)
        .fetch_one(db)
        .await
}

/// Insert or refresh a barangay keyed by its PSGC code
pub async fn upsert_barangay_by_code(
    db: &SqlitePool,
    code: &str,
    name: &str,
    municipality: Option<&str>,
    geometry: Option<&str>,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO barangays (code, name, municipality, geometry)
        VALUES (?, ?, ?, ?)
        ON CONFLICT(code) DO UPDATE SET
            name = excluded.name,
            municipality = COALESCE(excluded.municipality, barangays.municipality),
            geometry = COALESCE(excluded.geometry, barangays.geometry),
            updated_at = datetime('now')
        "#,
    )
    .bind(code)
    .bind(name)
    .bind(municipality)
    .bind(geometry)
    .execute(db)
    .await?;
    Ok(())
}

pub async fn update_barangay(
    db: &SqlitePool,
    id: i64,
    req: &UpdateBarangayRequest,
) -> Result<Option<Barangay>, sqlx::Error> {
    let geometry = req.geometry.as_ref().map(|g| g.to_string());
    let result = sqlx::query(
        r#"
        UPDATE barangays SET
            name = COALESCE(?, name),
            code = COALESCE(?, code),
            municipality = COALESCE(?, municipality),
            geometry = COALESCE(?, geometry),
            updated_at = datetime('now')
        WHERE id = ?
        "#,
    )
    .bind(req.name.as_deref().map(str::trim))
    .bind(req.code.as_deref().map(str::trim))
    .bind(req.municipality.as_deref().map(str::trim))
    .bind(geometry)
    .bind(id)
    .execute(db)
    .await?;

    if result.rows_affected() == 0 {
        return Ok(None);
    }
    find_barangay(db, id).await
}

pub async fn delete_barangay(db: &SqlitePool, id: i64) -> Result<Option<Barangay>, sqlx::Error> {
    let Some(barangay) = find_barangay(db, id).await? else {
        return Ok(None);
    };
    sqlx::query("DELETE FROM barangays WHERE id = ?")
        .bind(id)
        .execute(db)
        .await?;
    Ok(Some(barangay))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_feature_projection() {
        let db = crate::db::init_in_memory().await.unwrap();
        let with_geometry = insert_barangay(
            &db,
            "San Roque",
            Some("PH0305409001"),
            Some("Guagua"),
            Some(r#"{"type":"Point","coordinates":[120.6,14.9]}"#),
        )
        .await
        .unwrap();
        let without = insert_barangay(&db, "Ascomo", None, None, Some("not json")).await.unwrap();

        let feature = with_geometry.to_feature();
        assert_eq!(feature.geometry["type"], "Point");
        assert_eq!(feature.properties["name"], "San Roque");
        assert!(without.to_feature().geometry.is_null());

        let collection: FeatureCollection = list_barangays(&db)
            .await
            .unwrap()
            .iter()
            .map(Barangay::to_feature)
            .collect();
        assert_eq!(collection.kind, "FeatureCollection");
        assert_eq!(collection.features.len(), 2);
    }

    #[tokio::test]
    async fn test_upsert_by_code_refreshes_name() {
        let db = crate::db::init_in_memory().await.unwrap();
        upsert_barangay_by_code(&db, "PH1", "Old", Some("Guagua"), None).await.unwrap();
        upsert_barangay_by_code(&db, "PH1", "New", None, None).await.unwrap();

        let all = list_barangays(&db).await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].name, "New");
        assert_eq!(all[0].municipality.as_deref(), Some("Guagua"));
    }
}

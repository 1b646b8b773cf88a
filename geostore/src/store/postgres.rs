//! Backend PostgreSQL/PostGIS
//!
//! Deux tables par schéma: `collections` et `features`. La colonne `geom`
//! (`geography(Geometry, 4326)`, index GIST) est alimentée par la
//! représentation EWKT dérivée de la géométrie; la géométrie de référence
//! est conservée en `jsonb`. La suppression d'une collection est propagée
//! par la contrainte `ON DELETE CASCADE`.

use std::collections::HashSet;

use anyhow::{anyhow, Context};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use deadpool_postgres::Pool;
use futures::SinkExt;
use geo::Point;
use geofeature::{CollectionId, FeatureId, FeatureInput, Properties};
use serde_json::Value;
use tokio_postgres::error::SqlState;
use tokio_postgres::Row;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::model::{Collection, CollectionSummary, Feature};
use super::pool::{create_pool, server_info, DatabaseConfig};
use super::{DistanceMatch, StoreBackend, SRID};
use crate::error::{Result, StoreError};

const FEATURE_COLUMNS: &str =
    "id, collection_id, feature_type, properties, geometry, bounds, enabled, created_at, updated_at";

/// Ordre des colonnes produit par `csv_row`
const COPY_COLUMNS: &str =
    "id, collection_id, feature_type, properties, geometry, bounds, geom, enabled, created_at, updated_at";

const COLLECTION_COLUMNS: &str = "id, name, description, payload, created_at, updated_at";

/// Nombre de lignes par envoi COPY
const COPY_CHUNK_ROWS: usize = 500;

/// Backend PostGIS
pub struct PgBackend {
    pool: Pool,
    schema: String,
}

impl PgBackend {
    pub fn new(pool: Pool, schema: impl Into<String>) -> Self {
        Self {
            pool,
            schema: schema.into(),
        }
    }

    /// Crée le pool et vérifie la connexion
    pub async fn connect(config: &DatabaseConfig) -> anyhow::Result<Self> {
        let pool = create_pool(config)?;
        let server = server_info(&pool).await?;
        if server.postgis.is_none() {
            warn!("PostGIS is not installed in this database yet, run `geostore init`");
        }
        info!(host = %config.host, dbname = %config.dbname, schema = %config.schema, "Connected to PostgreSQL");
        Ok(Self::new(pool, config.schema.clone()))
    }

    pub fn pool(&self) -> &Pool {
        &self.pool
    }

    async fn client(&self) -> Result<deadpool_postgres::Object> {
        Ok(self
            .pool
            .get()
            .await
            .context("Failed to get connection from pool")?)
    }
}

fn row_to_collection(row: &Row) -> Collection {
    Collection {
        id: CollectionId(row.get("id")),
        name: row.get("name"),
        description: row.get("description"),
        payload: row.get("payload"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

fn row_to_feature(row: &Row) -> Result<Feature> {
    let id = FeatureId(row.get("id"));
    let geometry_json: Value = row.get("geometry");
    let geometry = geofeature::validate(&geometry_json)
        .map_err(|e| anyhow!("Stored geometry of feature {} is invalid: {}", id, e))?;

    let properties = match row.get::<_, Value>("properties") {
        Value::Object(map) => map,
        _ => Properties::new(),
    };

    let input = FeatureInput {
        collection_id: CollectionId(row.get("collection_id")),
        feature_type: row.get("feature_type"),
        properties,
        geometry,
        bounds: row.get("bounds"),
    };

    let created_at: DateTime<Utc> = row.get("created_at");
    let mut feature = Feature::from_input(id, input, created_at)
        .map_err(|e| anyhow!("Failed to index feature {}: {}", id, e))?;
    feature.enabled = row.get("enabled");
    feature.updated_at = row.get("updated_at");
    Ok(feature)
}

/// Mappe une violation de clé étrangère vers `NotFound`
fn map_write_error(
    err: tokio_postgres::Error,
    collection_id: CollectionId,
    context: &'static str,
) -> StoreError {
    if err.code() == Some(&SqlState::FOREIGN_KEY_VIOLATION) {
        StoreError::collection_not_found(collection_id)
    } else {
        StoreError::Unavailable(anyhow::Error::new(err).context(context))
    }
}

/// Champ CSV entre guillemets (format COPY csv)
fn csv_field(value: &str) -> String {
    format!("\"{}\"", value.replace('"', "\"\""))
}

fn csv_row(feature: &Feature) -> Result<String> {
    let properties = serde_json::to_string(&feature.properties).context("Failed to encode properties")?;
    let geometry = serde_json::to_string(feature.geometry()).context("Failed to encode geometry")?;
    let bounds = feature
        .bounds
        .as_ref()
        .map(|b| {
            let values: Vec<String> = b.iter().map(|v| v.to_string()).collect();
            csv_field(&format!("{{{}}}", values.join(",")))
        })
        .unwrap_or_default();

    Ok(format!(
        "{},{},{},{},{},{},{},{},{},{}\n",
        feature.id,
        feature.collection_id,
        csv_field(&feature.feature_type),
        csv_field(&properties),
        csv_field(&geometry),
        bounds,
        csv_field(feature.spatial_index().ewkt()),
        feature.enabled,
        feature.created_at.to_rfc3339(),
        feature.updated_at.to_rfc3339(),
    ))
}

#[async_trait]
impl StoreBackend for PgBackend {
    async fn ensure_schema(&self) -> Result<()> {
        let client = self.client().await?;
        let schema = &self.schema;

        client
            .execute(&format!("CREATE SCHEMA IF NOT EXISTS {}", schema), &[])
            .await
            .context("Failed to create schema")?;

        // Peut nécessiter des droits superuser: on vérifie alors que
        // l'extension est déjà installée
        if let Err(e) = client
            .execute("CREATE EXTENSION IF NOT EXISTS postgis", &[])
            .await
        {
            warn!("CREATE EXTENSION postgis failed (will check if already installed): {e}");
            let exists = client
                .query_opt("SELECT 1 FROM pg_extension WHERE extname = 'postgis'", &[])
                .await
                .context("Failed to check pg_extension")?
                .is_some();
            if !exists {
                return Err(anyhow!(
                    "PostGIS extension is not installed and could not be created: {e}"
                )
                .into());
            }
        }

        let sql = format!(
            r#"
            CREATE TABLE IF NOT EXISTS {schema}.collections (
                id UUID PRIMARY KEY,
                name TEXT NOT NULL,
                description TEXT,
                payload JSONB,
                created_at TIMESTAMPTZ NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL,
                seq BIGSERIAL
            );

            CREATE TABLE IF NOT EXISTS {schema}.features (
                id UUID PRIMARY KEY,
                collection_id UUID NOT NULL REFERENCES {schema}.collections(id) ON DELETE CASCADE,
                feature_type TEXT NOT NULL,
                properties JSONB NOT NULL DEFAULT '{{}}'::jsonb,
                geometry JSONB NOT NULL,
                bounds DOUBLE PRECISION[],
                geom GEOGRAPHY(Geometry, {srid}) NOT NULL,
                enabled BOOLEAN NOT NULL DEFAULT TRUE,
                created_at TIMESTAMPTZ NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL,
                seq BIGSERIAL
            );

            CREATE INDEX IF NOT EXISTS features_geom_idx ON {schema}.features USING GIST (geom);
            CREATE INDEX IF NOT EXISTS features_collection_idx ON {schema}.features (collection_id);
            "#,
            schema = schema,
            srid = SRID,
        );

        client
            .batch_execute(&sql)
            .await
            .context("Failed to create tables")?;

        info!(schema = %schema, "Schema ready");
        Ok(())
    }

    async fn insert_collection(&self, collection: &Collection) -> Result<()> {
        let client = self.client().await?;
        client
            .execute(
                &format!(
                    "INSERT INTO {}.collections ({}) VALUES ($1, $2, $3, $4, $5, $6)",
                    self.schema, COLLECTION_COLUMNS
                ),
                &[
                    &collection.id.0,
                    &collection.name,
                    &collection.description,
                    &collection.payload,
                    &collection.created_at,
                    &collection.updated_at,
                ],
            )
            .await
            .context("Failed to insert collection")?;
        Ok(())
    }

    async fn get_collection(&self, id: CollectionId) -> Result<Option<Collection>> {
        let client = self.client().await?;
        let row = client
            .query_opt(
                &format!(
                    "SELECT {} FROM {}.collections WHERE id = $1",
                    COLLECTION_COLUMNS, self.schema
                ),
                &[&id.0],
            )
            .await
            .context("Failed to fetch collection")?;
        Ok(row.as_ref().map(row_to_collection))
    }

    async fn list_collections(&self) -> Result<Vec<CollectionSummary>> {
        let client = self.client().await?;
        let rows = client
            .query(
                &format!(
                    r#"
                    SELECT c.id, c.name, c.description, c.payload, c.created_at, c.updated_at,
                           COUNT(f.id) AS feature_count
                    FROM {schema}.collections c
                    LEFT JOIN {schema}.features f ON f.collection_id = c.id
                    GROUP BY c.id
                    ORDER BY c.seq
                    "#,
                    schema = self.schema
                ),
                &[],
            )
            .await
            .context("Failed to list collections")?;

        Ok(rows
            .iter()
            .map(|row| {
                let count: i64 = row.get("feature_count");
                CollectionSummary {
                    collection: row_to_collection(row),
                    feature_count: count.max(0) as u64,
                }
            })
            .collect())
    }

    async fn update_collection(&self, collection: &Collection) -> Result<bool> {
        let client = self.client().await?;
        let updated = client
            .execute(
                &format!(
                    "UPDATE {}.collections SET name = $2, description = $3, payload = $4, updated_at = $5 WHERE id = $1",
                    self.schema
                ),
                &[
                    &collection.id.0,
                    &collection.name,
                    &collection.description,
                    &collection.payload,
                    &collection.updated_at,
                ],
            )
            .await
            .context("Failed to update collection")?;
        Ok(updated > 0)
    }

    async fn delete_collection(&self, id: CollectionId) -> Result<bool> {
        let client = self.client().await?;
        let deleted = client
            .execute(
                &format!("DELETE FROM {}.collections WHERE id = $1", self.schema),
                &[&id.0],
            )
            .await
            .context("Failed to delete collection")?;
        Ok(deleted > 0)
    }

    async fn insert_features(&self, features: &[Feature]) -> Result<()> {
        let Some(first) = features.first() else {
            return Ok(());
        };

        let mut client = self.client().await?;
        let tx = client
            .transaction()
            .await
            .context("Failed to begin transaction")?;

        // Verrouille les collections cibles jusqu'au commit
        let wanted: Vec<Uuid> = features
            .iter()
            .map(|f| f.collection_id.0)
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        let rows = tx
            .query(
                &format!(
                    "SELECT id FROM {}.collections WHERE id = ANY($1) FOR KEY SHARE",
                    self.schema
                ),
                &[&wanted],
            )
            .await
            .context("Failed to check collections")?;
        let existing: HashSet<Uuid> = rows.iter().map(|r| r.get(0)).collect();
        if let Some(missing) = wanted.iter().find(|id| !existing.contains(id)) {
            return Err(StoreError::collection_not_found(CollectionId(*missing)));
        }

        let copy_sql = format!(
            "COPY {}.features ({}) FROM STDIN WITH (FORMAT csv, NULL '')",
            self.schema, COPY_COLUMNS
        );

        let copy_in = tx
            .copy_in(&copy_sql)
            .await
            .map_err(|e| map_write_error(e, first.collection_id, "Failed to start COPY"))?;
        let mut pinned = std::pin::pin!(copy_in);

        for chunk in features.chunks(COPY_CHUNK_ROWS) {
            let mut data = String::new();
            for feature in chunk {
                data.push_str(&csv_row(feature)?);
            }
            pinned
                .as_mut()
                .send(bytes::Bytes::from(data))
                .await
                .map_err(|e| map_write_error(e, first.collection_id, "Failed to send COPY chunk"))?;
        }

        let copied = pinned
            .as_mut()
            .finish()
            .await
            .map_err(|e| map_write_error(e, first.collection_id, "Failed to finish COPY"))?;
        tx.commit().await.context("Failed to commit transaction")?;

        debug!(rows = copied, schema = %self.schema, "Features copied");
        Ok(())
    }

    async fn get_feature(&self, id: FeatureId) -> Result<Option<Feature>> {
        let client = self.client().await?;
        let row = client
            .query_opt(
                &format!(
                    "SELECT {} FROM {}.features WHERE id = $1",
                    FEATURE_COLUMNS, self.schema
                ),
                &[&id.0],
            )
            .await
            .context("Failed to fetch feature")?;
        row.as_ref().map(row_to_feature).transpose()
    }

    async fn list_features(&self, collection_id: CollectionId) -> Result<Vec<Feature>> {
        let client = self.client().await?;
        let rows = client
            .query(
                &format!(
                    "SELECT {} FROM {}.features WHERE collection_id = $1 ORDER BY seq",
                    FEATURE_COLUMNS, self.schema
                ),
                &[&collection_id.0],
            )
            .await
            .context("Failed to list features")?;
        rows.iter().map(row_to_feature).collect()
    }

    async fn count_features(&self, collection_id: CollectionId) -> Result<u64> {
        let client = self.client().await?;
        let row = client
            .query_one(
                &format!(
                    "SELECT COUNT(*) FROM {}.features WHERE collection_id = $1",
                    self.schema
                ),
                &[&collection_id.0],
            )
            .await
            .context("Failed to count features")?;
        let count: i64 = row.get(0);
        Ok(count.max(0) as u64)
    }

    async fn update_feature(&self, feature: &Feature) -> Result<bool> {
        let client = self.client().await?;
        let properties = Value::Object(feature.properties.clone());
        let geometry = serde_json::to_value(feature.geometry()).context("Failed to encode geometry")?;

        let updated = client
            .execute(
                &format!(
                    r#"
                    UPDATE {}.features
                    SET feature_type = $2, properties = $3, geometry = $4, bounds = $5,
                        geom = ST_GeogFromText($6), enabled = $7, updated_at = $8
                    WHERE id = $1
                    "#,
                    self.schema
                ),
                &[
                    &feature.id.0,
                    &feature.feature_type,
                    &properties,
                    &geometry,
                    &feature.bounds,
                    &feature.spatial_index().ewkt(),
                    &feature.enabled,
                    &feature.updated_at,
                ],
            )
            .await
            .context("Failed to update feature")?;
        Ok(updated > 0)
    }

    async fn delete_feature(&self, id: FeatureId) -> Result<bool> {
        let client = self.client().await?;
        let deleted = client
            .execute(
                &format!("DELETE FROM {}.features WHERE id = $1", self.schema),
                &[&id.0],
            )
            .await
            .context("Failed to delete feature")?;
        Ok(deleted > 0)
    }

    async fn within_distance(
        &self,
        center: Point,
        radius_m: f64,
        collection_id: Option<CollectionId>,
    ) -> Result<Vec<DistanceMatch>> {
        let client = self.client().await?;
        let collection: Option<Uuid> = collection_id.map(|c| c.0);

        let rows = client
            .query(
                &format!(
                    r#"
                    WITH center AS (
                        SELECT ST_SetSRID(ST_MakePoint($1, $2), {srid})::geography AS g
                    )
                    SELECT {columns}, ST_Distance(f.geom, center.g, true) AS distance_m
                    FROM {schema}.features f, center
                    WHERE ST_DWithin(f.geom, center.g, $3, true)
                      AND ($4::uuid IS NULL OR f.collection_id = $4)
                    ORDER BY distance_m, f.id
                    "#,
                    srid = SRID,
                    columns = FEATURE_COLUMNS,
                    schema = self.schema
                ),
                &[&center.x(), &center.y(), &radius_m, &collection],
            )
            .await
            .context("Failed to run radius query")?;

        rows.iter()
            .map(|row| {
                Ok(DistanceMatch {
                    feature: row_to_feature(row)?,
                    distance_m: row.get("distance_m"),
                })
            })
            .collect()
    }
}

//! Définition et implémentation des commandes CLI
//!
//! - `init`: crée les tables
//! - `import`: fichiers → collection (import par lots)
//! - `near`: recherche par rayon
//! - `collections`, `delete-collection`, `export`: gestion des collections

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use geofeature::CollectionId;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use geostore::store::pool::DatabaseConfig;
use geostore::store::TracingObserver;
use geostore::{
    BatchIngestor, IngestMode, PgBackend, RadiusQuery, Settings, SourceItem, SpatialStore,
};

#[derive(Subcommand)]
pub enum Commands {
    /// Create the collections and features tables
    Init,

    /// Ingest JSON files into a collection
    Import {
        /// Target collection id
        #[arg(long, conflicts_with = "new_collection", required_unless_present = "new_collection")]
        collection: Option<CollectionId>,

        /// Create a new collection ("" derives the name from the files' directory)
        #[arg(long)]
        new_collection: Option<String>,

        /// Source files (JSON array, FeatureCollection, Feature or tabular row)
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Items processed concurrently per chunk (default: config / 10)
        #[arg(long)]
        batch_size: Option<usize>,

        /// Continuous worker pool instead of delayed chunks
        #[arg(long)]
        pipelined: bool,

        /// Save the JSON report to this path
        #[arg(long)]
        report: Option<PathBuf>,
    },

    /// Find features within a radius of a point
    Near {
        /// Latitude of the centre, in degrees
        #[arg(long, allow_hyphen_values = true)]
        lat: f64,

        /// Longitude of the centre, in degrees
        #[arg(long, allow_hyphen_values = true)]
        lng: f64,

        /// Radius in kilometres (default: config / 100)
        #[arg(long)]
        radius: Option<f64>,

        /// Restrict to one collection
        #[arg(long)]
        collection: Option<CollectionId>,
    },

    /// List collections with their feature counts
    Collections,

    /// Delete a collection and all its features
    DeleteCollection {
        id: CollectionId,
    },

    /// Export a collection to GeoJSON
    Export {
        id: CollectionId,

        /// Output GeoJSON file
        #[arg(short, long)]
        output: PathBuf,
    },
}

/// Connection options (override the environment)
#[derive(Args, Debug, Default)]
pub struct DbArgs {
    /// PostgreSQL host (default: env PGHOST / localhost)
    #[arg(long, global = true)]
    pub host: Option<String>,

    /// PostgreSQL database name (default: env PGDATABASE / geostore)
    #[arg(long, global = true)]
    pub database: Option<String>,

    /// PostgreSQL user (default: env PGUSER / postgres)
    #[arg(long, global = true)]
    pub user: Option<String>,

    /// PostgreSQL password (default: env PGPASSWORD)
    #[arg(long, global = true)]
    pub password: Option<String>,

    /// PostgreSQL port (default: env PGPORT / 5432)
    #[arg(long, global = true)]
    pub port: Option<u16>,

    /// SSL mode: disable, prefer, require (default: env PGSSLMODE / disable)
    #[arg(long, global = true)]
    pub ssl: Option<String>,

    /// Target schema (default: config / public)
    #[arg(long, global = true)]
    pub schema: Option<String>,
}

/// Exécute une commande
pub async fn run(command: Commands, db: DbArgs, settings: Settings) -> Result<()> {
    let in_flight = match &command {
        Commands::Import {
            batch_size: Some(n),
            ..
        } => *n,
        _ => settings.batch_size,
    };
    let store = open_store(db, &settings, in_flight).await?;

    match command {
        Commands::Init => cmd_init(&store).await,
        Commands::Import {
            collection,
            new_collection,
            files,
            batch_size,
            pipelined,
            report,
        } => {
            cmd_import(
                &store,
                &settings,
                collection,
                new_collection,
                files,
                batch_size,
                pipelined,
                report.as_deref(),
            )
            .await
        }
        Commands::Near {
            lat,
            lng,
            radius,
            collection,
        } => cmd_near(&store, &settings, lat, lng, radius, collection).await,
        Commands::Collections => cmd_collections(&store).await,
        Commands::DeleteCollection { id } => cmd_delete_collection(&store, id).await,
        Commands::Export { id, output } => cmd_export(&store, id, &output).await,
    }
}

async fn open_store(db: DbArgs, settings: &Settings, in_flight: usize) -> Result<SpatialStore> {
    let mut db_config = DatabaseConfig::from_env().with_schema(settings.schema.clone());
    apply_database_overrides(&mut db_config, db);
    db_config.ensure_capacity(in_flight);

    println!("Database: {}", db_config);

    let backend = PgBackend::connect(&db_config).await?;
    Ok(SpatialStore::new(Arc::new(backend)).with_observer(Arc::new(TracingObserver)))
}

fn apply_database_overrides(config: &mut DatabaseConfig, db: DbArgs) {
    if let Some(host) = db.host {
        config.host = host;
    }
    if let Some(database) = db.database {
        config.dbname = database;
    }
    if let Some(user) = db.user {
        config.user = user;
    }
    if let Some(password) = db.password {
        config.password = Some(password);
    }
    if let Some(port) = db.port {
        config.port = port;
    }
    if let Some(ssl) = db.ssl {
        match ssl.parse() {
            Ok(mode) => config.ssl_mode = mode,
            Err(e) => warn!("{}", e),
        }
    }
    if let Some(schema) = db.schema {
        config.schema = schema;
    }
}

async fn cmd_init(store: &SpatialStore) -> Result<()> {
    store.ensure_schema().await.context("Failed to create tables")?;
    println!("Schema ready");
    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn cmd_import(
    store: &SpatialStore,
    settings: &Settings,
    collection: Option<CollectionId>,
    new_collection: Option<String>,
    files: Vec<PathBuf>,
    batch_size: Option<usize>,
    pipelined: bool,
    report_path: Option<&Path>,
) -> Result<()> {
    let mut options = settings.ingest_options();
    if let Some(batch_size) = batch_size {
        options = options.batch_size(batch_size);
    }
    if pipelined {
        options = options.mode(IngestMode::Pipelined);
    }

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, stopping after the current chunk");
            ctrl_c.cancel();
        }
    });

    let ingestor = BatchIngestor::new(store.clone())
        .with_options(options)
        .with_cancellation(cancel);
    let items: Vec<SourceItem> = files.into_iter().map(SourceItem::File).collect();

    info!(files = items.len(), "Starting import");

    let outcome = match (collection, new_collection) {
        (Some(id), _) => ingestor.ingest(&items, id).await?,
        (None, name) => {
            let name = name.filter(|n| !n.is_empty());
            let (collection, outcome) = ingestor.ingest_into_new_collection(&items, name).await?;
            println!("Collection: {} ({})", collection.name, collection.id);
            outcome
        }
    };

    outcome.display();

    if let Some(path) = report_path {
        outcome.save_to_file(path)?;
        println!("Report saved to {}", path.display());
    }

    Ok(())
}

async fn cmd_near(
    store: &SpatialStore,
    settings: &Settings,
    lat: f64,
    lng: f64,
    radius: Option<f64>,
    collection: Option<CollectionId>,
) -> Result<()> {
    let mut query = RadiusQuery::new(lat, lng).radius_km(radius.unwrap_or(settings.default_radius_km));
    query.collection_id = collection;

    let matches = store.find_within_radius_with_distance(&query).await?;
    for m in &matches {
        println!("{}", serde_json::to_string(m)?);
    }
    info!(matches = matches.len(), "Radius query done");
    Ok(())
}

async fn cmd_collections(store: &SpatialStore) -> Result<()> {
    let collections = store.list_collections().await?;
    if collections.is_empty() {
        println!("No collections");
    }
    for summary in &collections {
        println!(
            "{}  {:<30} {} features",
            summary.collection.id, summary.collection.name, summary.feature_count
        );
    }
    Ok(())
}

async fn cmd_delete_collection(store: &SpatialStore, id: CollectionId) -> Result<()> {
    let count = store.count_features(id).await?;
    store.delete_collection(id).await?;
    println!("Deleted collection {} ({} features)", id, count);
    Ok(())
}

async fn cmd_export(store: &SpatialStore, id: CollectionId, output: &Path) -> Result<()> {
    let count = geostore::export::export_collection(store, id, output).await?;
    println!("Exported {} features to {}", count, output.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_database_overrides() {
        let mut config = DatabaseConfig::default();
        apply_database_overrides(
            &mut config,
            DbArgs {
                host: Some("db.local".into()),
                port: Some(6543),
                ssl: Some("require".into()),
                schema: Some("geo".into()),
                ..Default::default()
            },
        );

        assert_eq!(config.host, "db.local");
        assert_eq!(config.port, 6543);
        assert_eq!(config.ssl_mode, geostore::store::pool::SslMode::Require);
        assert_eq!(config.schema, "geo");
        assert_eq!(config.user, "postgres");
    }

    #[test]
    fn test_help_text() {
        use clap::{CommandFactory, Parser};

        #[derive(Parser)]
        #[allow(dead_code)]
        struct Harness {
            #[command(flatten)]
            db: DbArgs,
            #[command(subcommand)]
            command: Commands,
        }

        Harness::command().debug_assert();

        let mut cmd = Harness::command();
        cmd.build();
        let mut pages = vec![cmd.render_long_help().to_string()];
        for sub in cmd.get_subcommands_mut() {
            pages.push(sub.render_long_help().to_string());
        }
        for page in &pages {
            assert!(!page.contains("défaut"), "{}", page);
        }
        assert!(pages.iter().any(|p| p.contains("(default: env PGHOST / localhost)")));
    }

    #[test]
    fn test_invalid_ssl_keeps_previous() {
        let mut config = DatabaseConfig::default();
        apply_database_overrides(
            &mut config,
            DbArgs {
                ssl: Some("sometimes".into()),
                ..Default::default()
            },
        );
        assert_eq!(config.ssl_mode, geostore::store::pool::SslMode::Disable);
    }
}

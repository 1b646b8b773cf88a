//! Connexion PostgreSQL du store
//!
//! Le pool est dimensionné pour l'import par lots: chaque élément en vol
//! tient une connexion le temps de son COPY. Le nom de schéma est interpolé
//! dans le SQL, il est donc restreint à un identifiant simple.

use std::fmt;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use deadpool_postgres::{Config, Pool, PoolConfig, Runtime, Timeouts};
use tokio_postgres::NoTls;
use tokio_postgres_rustls::MakeRustlsConnect;
use tracing::{debug, info};

const APPLICATION_NAME: &str = "geostore";

/// Connexions en plus des éléments en vol (requêtes de contrôle, lecture)
const SPARE_CONNECTIONS: usize = 2;

/// Mode SSL pour la connexion PostgreSQL
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SslMode {
    #[default]
    Disable,
    Prefer,
    Require,
}

impl std::str::FromStr for SslMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "disable" | "off" | "false" | "no" => Ok(SslMode::Disable),
            "prefer" => Ok(SslMode::Prefer),
            "require" | "on" | "true" | "yes" => Ok(SslMode::Require),
            _ => Err(format!("Invalid SSL mode: {}. Use: disable, prefer, require", s)),
        }
    }
}

/// Paramètres de connexion et schéma cible
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub dbname: String,
    pub user: String,
    pub password: Option<String>,
    pub pool_size: usize,
    pub ssl_mode: SslMode,
    /// Schéma des tables `collections` et `features`
    pub schema: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            host: "localhost".into(),
            port: 5432,
            dbname: "geostore".into(),
            user: "postgres".into(),
            password: None,
            pool_size: 16,
            ssl_mode: SslMode::Disable,
            schema: "public".into(),
        }
    }
}

/// Sans le mot de passe
impl fmt::Display for DatabaseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}@{}:{}/{} schema {} (SSL: {:?}, pool: {})",
            self.user, self.host, self.port, self.dbname, self.schema, self.ssl_mode, self.pool_size
        )
    }
}

impl DatabaseConfig {
    /// Variables PG* standard, plus `POOL_SIZE`
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let var = |name: &str| std::env::var(name).ok();
        Self {
            host: var("PGHOST").unwrap_or(defaults.host),
            port: var("PGPORT")
                .and_then(|p| p.parse().ok())
                .unwrap_or(defaults.port),
            dbname: var("PGDATABASE").unwrap_or(defaults.dbname),
            user: var("PGUSER").unwrap_or(defaults.user),
            password: var("PGPASSWORD"),
            pool_size: var("POOL_SIZE")
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.pool_size),
            ssl_mode: var("PGSSLMODE")
                .and_then(|s| s.parse().ok())
                .unwrap_or_default(),
            schema: defaults.schema,
        }
    }

    pub fn with_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = schema.into();
        self
    }

    /// Agrandit le pool pour `in_flight` éléments d'import simultanés
    ///
    /// Ne réduit jamais une taille configurée plus grande.
    pub fn ensure_capacity(&mut self, in_flight: usize) {
        let needed = in_flight + SPARE_CONNECTIONS;
        if self.pool_size < needed {
            debug!(from = self.pool_size, to = needed, "Growing pool for batch ingest");
            self.pool_size = needed;
        }
    }

    /// Vérifie que le schéma est un identifiant SQL simple
    pub fn validate_schema(&self) -> Result<()> {
        validate_identifier(&self.schema)
    }
}

/// `[A-Za-z_][A-Za-z0-9_]*`, 63 octets au plus
pub fn validate_identifier(name: &str) -> Result<()> {
    let mut chars = name.chars();
    let valid_start = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
    if !valid_start
        || name.len() > 63
        || !chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
    {
        bail!("Invalid schema name: {:?}", name);
    }
    Ok(())
}

fn make_tls_connector() -> MakeRustlsConnect {
    let root_store =
        rustls::RootCertStore::from_iter(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

    let config = rustls::ClientConfig::builder()
        .with_root_certificates(root_store)
        .with_no_client_auth();

    MakeRustlsConnect::new(config)
}

/// Crée un pool de connexions
pub fn create_pool(config: &DatabaseConfig) -> Result<Pool> {
    config.validate_schema()?;

    let mut cfg = Config::new();
    cfg.host = Some(config.host.clone());
    cfg.port = Some(config.port);
    cfg.dbname = Some(config.dbname.clone());
    cfg.user = Some(config.user.clone());
    cfg.password = config.password.clone();
    cfg.application_name = Some(APPLICATION_NAME.into());

    // Un COPY de lot peut attendre derrière les autres éléments en vol
    cfg.pool = Some(PoolConfig {
        max_size: config.pool_size,
        timeouts: Timeouts {
            wait: Some(Duration::from_secs(30)),
            create: Some(Duration::from_secs(10)),
            recycle: Some(Duration::from_secs(30)),
        },
        ..Default::default()
    });

    debug!(%config, "Creating database pool");

    match config.ssl_mode {
        SslMode::Disable => cfg
            .create_pool(Some(Runtime::Tokio1), NoTls)
            .context("Failed to create database pool"),
        SslMode::Prefer | SslMode::Require => cfg
            .create_pool(Some(Runtime::Tokio1), make_tls_connector())
            .context("Failed to create database pool with TLS"),
    }
}

/// Version du serveur et de PostGIS
#[derive(Debug, Clone)]
pub struct ServerInfo {
    pub version: String,
    /// `None` tant que l'extension n'est pas installée (`geostore init`)
    pub postgis: Option<String>,
}

/// Ouvre une connexion et lit les versions du serveur
pub async fn server_info(pool: &Pool) -> Result<ServerInfo> {
    let client = pool
        .get()
        .await
        .context("Failed to get connection from pool")?;
    let row = client
        .query_one(
            "SELECT current_setting('server_version'), \
             (SELECT extversion FROM pg_extension WHERE extname = 'postgis')",
            &[],
        )
        .await
        .context("Connection test failed")?;

    let info = ServerInfo {
        version: row.get(0),
        postgis: row.get(1),
    };
    info!(
        server = %info.version,
        postgis = info.postgis.as_deref().unwrap_or("missing"),
        "Database reachable"
    );
    Ok(info)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ssl_mode_parse() {
        assert_eq!("require".parse::<SslMode>(), Ok(SslMode::Require));
        assert_eq!("OFF".parse::<SslMode>(), Ok(SslMode::Disable));
        assert_eq!("prefer".parse::<SslMode>(), Ok(SslMode::Prefer));
        assert!("maybe".parse::<SslMode>().is_err());
    }

    #[test]
    fn test_default_config() {
        let config = DatabaseConfig::default().with_schema("geo");
        assert_eq!(config.port, 5432);
        assert_eq!(config.dbname, "geostore");
        assert_eq!(config.schema, "geo");
    }

    #[test]
    fn test_schema_identifier() {
        assert!(validate_identifier("public").is_ok());
        assert!(validate_identifier("_geo_2024").is_ok());
        assert!(validate_identifier("").is_err());
        assert!(validate_identifier("2024geo").is_err());
        assert!(validate_identifier("geo; DROP TABLE features").is_err());
        assert!(validate_identifier("géo").is_err());
        assert!(validate_identifier(&"a".repeat(64)).is_err());
    }

    #[test]
    fn test_create_pool_rejects_bad_schema() {
        let config = DatabaseConfig::default().with_schema("bad-name");
        assert!(create_pool(&config).is_err());
    }

    #[test]
    fn test_ensure_capacity() {
        let mut config = DatabaseConfig {
            pool_size: 4,
            ..Default::default()
        };
        config.ensure_capacity(10);
        assert_eq!(config.pool_size, 12);

        config.ensure_capacity(3);
        assert_eq!(config.pool_size, 12);
    }

    #[test]
    fn test_display_hides_password() {
        let config = DatabaseConfig {
            password: Some("s3cret".into()),
            ..Default::default()
        };
        let shown = config.to_string();
        assert!(shown.contains("postgres@localhost:5432/geostore"));
        assert!(!shown.contains("s3cret"));
    }
}

//! Process configuration.
//!
//! Every setting resolves as: command-line flag, then a `--env KEY=VALUE`
//! override, then the process environment, then the default. Overrides live
//! in memory only; the process environment is never modified.

use std::collections::HashMap;
use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use tracing::warn;

use toolgate_core::audit::DEFAULT_AUDIT_TABLE;
use toolgate_core::embedding::EmbeddingConfig;
use toolgate_core::store::DataApiConfig;
use toolgate_core::store::data_api::DEFAULT_KEYSPACE;

use crate::{Error, Result};

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 8000;
pub const DEFAULT_CATALOG_COLLECTION: &str = "tool_catalog";
pub const DEFAULT_LOG_LEVEL: &str = "info";

pub const TOKEN_KEY: &str = "ASTRA_DB_APPLICATION_TOKEN";
pub const ENDPOINT_KEY: &str = "ASTRA_DB_API_ENDPOINT";
pub const DB_NAME_KEY: &str = "ASTRA_DB_DB_NAME";
pub const KEYSPACE_KEY: &str = "ASTRA_DB_KEYSPACE";
pub const CATALOG_COLLECTION_KEY: &str = "ASTRA_DB_CATALOG_COLLECTION";
pub const SERVER_TOKEN_KEY: &str = "ASTRA_MCP_SERVER_TOKEN";
pub const LOG_LEVEL_KEY: &str = "LOG_LEVEL";
pub const LOG_FILE_KEY: &str = "LOG_FILE";

/// Keys `--env` may set.
pub const OVERRIDABLE_KEYS: &[&str] = &[
    TOKEN_KEY,
    ENDPOINT_KEY,
    DB_NAME_KEY,
    KEYSPACE_KEY,
    CATALOG_COLLECTION_KEY,
    SERVER_TOKEN_KEY,
    "OPENAI_API_KEY",
    "OPENAI_BASE_URL",
    "IBM_WATSONX_BASE_URL",
    "IBM_WATSONX_API_KEY",
    "IBM_WATSONX_PROJECT_ID",
    LOG_LEVEL_KEY,
    LOG_FILE_KEY,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Transport {
    Stdio,
    Http,
}

/// CLI arguments.
#[derive(Parser, Debug, Default)]
#[command(
    name = "toolgate",
    version,
    about = "Serve declarative data-query tools over MCP"
)]
pub struct Args {
    /// MCP transport.
    #[arg(long, short = 'r', value_enum)]
    pub transport: Option<Transport>,

    /// Bind address for the HTTP transport.
    #[arg(long)]
    pub host: Option<String>,

    /// Port for the HTTP transport.
    #[arg(long, short = 'p')]
    pub port: Option<u16>,

    /// Data API application token.
    #[arg(long, short = 't')]
    pub token: Option<String>,

    /// Data API endpoint of the default database.
    #[arg(long, short = 'e')]
    pub endpoint: Option<String>,

    /// Default database name (derived from the endpoint when omitted).
    #[arg(long)]
    pub db_name: Option<String>,

    #[arg(long)]
    pub keyspace: Option<String>,

    /// Load tools from this JSON file instead of the catalog collection.
    #[arg(long, short = 'f')]
    pub catalog_file: Option<PathBuf>,

    /// Collection holding tool documents.
    #[arg(long, short = 'c')]
    pub catalog_collection: Option<String>,

    /// Comma-separated tags; only tools carrying one of them are loaded.
    #[arg(long)]
    pub tags: Option<String>,

    /// Table receiving audit rows.
    #[arg(long)]
    pub audit_table: Option<String>,

    /// Do not record an audit trail.
    #[arg(long)]
    pub no_audit: bool,

    /// Bearer token required by the HTTP transport.
    #[arg(long)]
    pub server_token: Option<String>,

    /// Accept unauthenticated HTTP requests.
    #[arg(long)]
    pub no_auth: bool,

    /// Log filter used when RUST_LOG is unset.
    #[arg(long)]
    pub log_level: Option<String>,

    /// Append logs to this file instead of stderr.
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    /// Setting override in KEY=VALUE form (repeatable).
    #[arg(long = "env", value_name = "KEY=VALUE")]
    pub env: Vec<String>,
}

/// Allow-listed `--env` overrides.
#[derive(Debug, Default)]
pub struct EnvOverrides {
    values: HashMap<String, String>,
    rejected: Vec<String>,
}

impl EnvOverrides {
    pub fn parse(entries: &[String]) -> Self {
        let mut overrides = Self::default();
        for entry in entries {
            match entry.split_once('=') {
                Some((key, value)) if OVERRIDABLE_KEYS.contains(&key.trim()) => {
                    overrides
                        .values
                        .insert(key.trim().to_string(), value.to_string());
                }
                _ => overrides.rejected.push(entry.clone()),
            }
        }
        overrides
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }

    /// Log the entries that were ignored. Called once logging is up.
    pub fn report(&self) {
        for entry in &self.rejected {
            let key = entry.split_once('=').map_or(entry.as_str(), |(key, _)| key);
            warn!(key, "ignoring --env entry: expected KEY=VALUE with an allowed key");
        }
    }
}

/// Layered lookup: `--env` overrides, then the process environment.
pub struct Settings<'a> {
    overrides: &'a EnvOverrides,
    env: &'a dyn Fn(&str) -> Option<String>,
}

impl<'a> Settings<'a> {
    pub fn new(overrides: &'a EnvOverrides, env: &'a dyn Fn(&str) -> Option<String>) -> Self {
        Self { overrides, env }
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.overrides
            .get(key)
            .or_else(|| (self.env)(key))
            .filter(|value| !value.is_empty())
    }

    fn pick(&self, flag: Option<String>, key: &str) -> Option<String> {
        flag.or_else(|| self.get(key))
    }
}

/// Logging destination and filter.
#[derive(Debug, Clone, PartialEq)]
pub struct LogSettings {
    pub level: String,
    pub file: Option<PathBuf>,
}

impl LogSettings {
    pub fn resolve(args: &Args, settings: &Settings<'_>) -> Self {
        Self {
            level: settings
                .pick(args.log_level.clone(), LOG_LEVEL_KEY)
                .unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string()),
            file: args
                .log_file
                .clone()
                .or_else(|| settings.get(LOG_FILE_KEY).map(PathBuf::from)),
        }
    }
}

/// Fully resolved server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub transport: Transport,
    pub host: String,
    pub port: u16,
    pub store: DataApiConfig,
    pub catalog_file: Option<PathBuf>,
    pub catalog_collection: String,
    pub tags: Vec<String>,
    pub audit_table: String,
    pub audit: bool,
    pub server_token: Option<String>,
    pub auth: bool,
    pub embedding: EmbeddingConfig,
}

impl ServerConfig {
    pub fn resolve(args: Args, settings: &Settings<'_>) -> Result<Self> {
        let transport = args.transport.unwrap_or(Transport::Stdio);

        let token = settings.pick(args.token, TOKEN_KEY).ok_or_else(|| {
            Error::Custom(format!(
                "a Data API token is required (--token or {TOKEN_KEY})"
            ))
        })?;
        let endpoint = settings.pick(args.endpoint, ENDPOINT_KEY);
        let database = settings.pick(args.db_name, DB_NAME_KEY);
        if endpoint.is_none() && database.is_none() {
            return Err(Error::Custom(format!(
                "a database is required (--db-name/{DB_NAME_KEY} or --endpoint/{ENDPOINT_KEY})"
            )));
        }

        let auth = !args.no_auth;
        let server_token = settings.pick(args.server_token, SERVER_TOKEN_KEY);
        if transport == Transport::Http && auth && server_token.is_none() {
            return Err(Error::Custom(format!(
                "the HTTP transport needs --server-token or {SERVER_TOKEN_KEY} (or --no-auth)"
            )));
        }

        let mut store = DataApiConfig::new(token);
        store.endpoint = endpoint;
        store.database = database;
        store.keyspace = settings
            .pick(args.keyspace, KEYSPACE_KEY)
            .unwrap_or_else(|| DEFAULT_KEYSPACE.to_string());

        Ok(Self {
            transport,
            host: args.host.unwrap_or_else(|| DEFAULT_HOST.to_string()),
            port: args.port.unwrap_or(DEFAULT_PORT),
            store,
            catalog_file: args.catalog_file,
            catalog_collection: settings
                .pick(args.catalog_collection, CATALOG_COLLECTION_KEY)
                .unwrap_or_else(|| DEFAULT_CATALOG_COLLECTION.to_string()),
            tags: args.tags.as_deref().map(split_tags).unwrap_or_default(),
            audit_table: args
                .audit_table
                .unwrap_or_else(|| DEFAULT_AUDIT_TABLE.to_string()),
            audit: !args.no_audit,
            server_token,
            auth,
            embedding: EmbeddingConfig::from_lookup(|key| settings.get(key)),
        })
    }
}

fn split_tags(tags: &str) -> Vec<String> {
    tags.split(',')
        .map(str::trim)
        .filter(|tag| !tag.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(pairs: &'static [(&'static str, &'static str)]) -> impl Fn(&str) -> Option<String> {
        move |key| {
            pairs
                .iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| v.to_string())
        }
    }

    fn parse(argv: &[&str]) -> Args {
        Args::parse_from(std::iter::once("toolgate").chain(argv.iter().copied()))
    }

    #[test]
    fn flag_beats_override_beats_environment() {
        let lookup = env(&[(TOKEN_KEY, "from-env"), (DB_NAME_KEY, "env-db"), (KEYSPACE_KEY, "env_ks")]);
        let args = parse(&[
            "--token",
            "from-flag",
            "--env",
            "ASTRA_DB_DB_NAME=override-db",
            "--env",
            "ASTRA_DB_APPLICATION_TOKEN=override-token",
        ]);
        let overrides = EnvOverrides::parse(&args.env);
        let config = ServerConfig::resolve(args, &Settings::new(&overrides, &lookup)).unwrap();

        assert_eq!(config.store.token, "from-flag");
        assert_eq!(config.store.database.as_deref(), Some("override-db"));
        assert_eq!(config.store.keyspace, "env_ks");
    }

    #[test]
    fn defaults_apply_when_nothing_is_set() {
        let lookup = env(&[(TOKEN_KEY, "t"), (DB_NAME_KEY, "main")]);
        let overrides = EnvOverrides::default();
        let config = ServerConfig::resolve(Args::default(), &Settings::new(&overrides, &lookup)).unwrap();

        assert_eq!(config.transport, Transport::Stdio);
        assert_eq!(config.host, DEFAULT_HOST);
        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.store.keyspace, DEFAULT_KEYSPACE);
        assert_eq!(config.catalog_collection, DEFAULT_CATALOG_COLLECTION);
        assert_eq!(config.audit_table, DEFAULT_AUDIT_TABLE);
        assert!(config.audit);
        assert!(config.auth);
        assert!(config.tags.is_empty());
    }

    #[test]
    fn overrides_outside_the_allow_list_are_ignored() {
        let overrides = EnvOverrides::parse(&[
            "PATH=/tmp".to_string(),
            "no-equals-sign".to_string(),
            "OPENAI_API_KEY=sk-test".to_string(),
        ]);
        assert_eq!(overrides.get("PATH"), None);
        assert_eq!(overrides.get("OPENAI_API_KEY").as_deref(), Some("sk-test"));
        assert_eq!(overrides.rejected.len(), 2);

        let lookup = env(&[(TOKEN_KEY, "t"), (DB_NAME_KEY, "main")]);
        let config = ServerConfig::resolve(Args::default(), &Settings::new(&overrides, &lookup)).unwrap();
        assert_eq!(config.embedding.openai_api_key.as_deref(), Some("sk-test"));
    }

    #[test]
    fn token_and_database_are_required() {
        let overrides = EnvOverrides::default();
        let err = ServerConfig::resolve(Args::default(), &Settings::new(&overrides, &env(&[]))).unwrap_err();
        assert!(err.to_string().contains(TOKEN_KEY));

        let err = ServerConfig::resolve(Args::default(), &Settings::new(&overrides, &env(&[(TOKEN_KEY, "t")])))
            .unwrap_err();
        assert!(err.to_string().contains(DB_NAME_KEY));
    }

    #[test]
    fn http_needs_a_server_token_unless_auth_is_off() {
        let lookup = env(&[(TOKEN_KEY, "t"), (DB_NAME_KEY, "main")]);
        let overrides = EnvOverrides::default();
        let settings = Settings::new(&overrides, &lookup);

        assert!(ServerConfig::resolve(parse(&["--transport", "http"]), &settings).is_err());

        let config = ServerConfig::resolve(parse(&["--transport", "http", "--no-auth"]), &settings).unwrap();
        assert!(!config.auth);

        let config =
            ServerConfig::resolve(parse(&["-r", "http", "--server-token", "s3cret"]), &settings).unwrap();
        assert_eq!(config.server_token.as_deref(), Some("s3cret"));
    }

    #[test]
    fn tags_are_split_and_trimmed() {
        let lookup = env(&[(TOKEN_KEY, "t"), (DB_NAME_KEY, "main")]);
        let overrides = EnvOverrides::default();
        let config = ServerConfig::resolve(
            parse(&["--tags", "retail, ops,,"]),
            &Settings::new(&overrides, &lookup),
        )
        .unwrap();
        assert_eq!(config.tags, ["retail", "ops"]);
    }

    #[test]
    fn log_settings_follow_the_same_layering() {
        let lookup = env(&[(LOG_LEVEL_KEY, "warn"), (LOG_FILE_KEY, "/tmp/env.log")]);
        let overrides = EnvOverrides::parse(&["LOG_LEVEL=debug".to_string()]);
        let settings = Settings::new(&overrides, &lookup);

        let log = LogSettings::resolve(&Args::default(), &settings);
        assert_eq!(log.level, "debug");
        assert_eq!(log.file, Some(PathBuf::from("/tmp/env.log")));

        let log = LogSettings::resolve(&parse(&["--log-level", "trace"]), &settings);
        assert_eq!(log.level, "trace");
    }
}

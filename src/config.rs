// Runtime configuration, read from the environment (and a `.env` file when
// present). Chain definitions come from a JSON file named by CHAINS_FILE.

use crate::models::Chain;
use dotenv::dotenv;
use std::env;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Cannot read chains file {path}: {source}")]
    ChainsFile {
        path: String,
        source: std::io::Error,
    },

    #[error("Invalid chains file {path}: {source}")]
    ChainsFormat {
        path: String,
        source: serde_json::Error,
    },

    #[error("Duplicate chain id {0}")]
    DuplicateChain(i64),
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub server_host: String,
    pub server_port: u16,
    pub chains: Vec<Chain>,
    pub fetch_delay: Duration,
    pub http_timeout_secs: u64,
    pub fetch_max_retries: usize,
    pub api_rate_limit: Option<u32>,
    pub cache_ttl: Duration,
    pub cache_max_capacity: u64,
    pub crawl_workers: usize,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv().ok();

        let database_url =
            env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite:crawler.db".to_string());
        let server_host = env::var("SERVER_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let server_port = env::var("SERVER_PORT")
            .unwrap_or_else(|_| "8080".to_string())
            .parse()
            .unwrap_or(8080);
        let chains = match env::var("CHAINS_FILE") {
            Ok(path) => load_chains(&path)?,
            Err(_) => Vec::new(),
        };
        let fetch_delay = env::var("FETCH_DELAY_MS")
            .unwrap_or_else(|_| "200".to_string())
            .parse()
            .map(Duration::from_millis)
            .unwrap_or(Duration::from_millis(200));
        let http_timeout_secs = env::var("HTTP_TIMEOUT_SECS")
            .map(|v| v.parse().unwrap_or(30))
            .unwrap_or(30);
        let fetch_max_retries = env::var("FETCH_MAX_RETRIES")
            .map(|v| v.parse().unwrap_or(3))
            .unwrap_or(3);
        let api_rate_limit = env::var("API_RATE_LIMIT")
            .map(|v| v.parse().ok())
            .unwrap_or(None);
        let cache_ttl = env::var("CACHE_TTL")
            .unwrap_or_else(|_| "600".to_string())
            .parse()
            .map(Duration::from_secs)
            .unwrap_or(Duration::from_secs(600));
        let cache_max_capacity = env::var("CACHE_MAX_CAPACITY")
            .unwrap_or_else(|_| "100000".to_string())
            .parse()
            .unwrap_or(100_000);
        let crawl_workers = parse_workers(env::var("CRAWL_WORKERS").ok().as_deref());

        Ok(Self {
            database_url,
            server_host,
            server_port,
            chains,
            fetch_delay,
            http_timeout_secs,
            fetch_max_retries,
            api_rate_limit,
            cache_ttl,
            cache_max_capacity,
            crawl_workers,
        })
    }

    pub fn chain(&self, id: i64) -> Option<&Chain> {
        self.chains.iter().find(|chain| chain.id == id)
    }
}

/// `auto` uses one worker per CPU; anything unparsable falls back to sequential.
fn parse_workers(value: Option<&str>) -> usize {
    match value.map(str::trim) {
        Some("auto") => num_cpus::get(),
        Some(v) => v.parse().ok().filter(|n: &usize| *n > 0).unwrap_or(1),
        None => 1,
    }
}

pub fn load_chains<P: AsRef<Path>>(path: P) -> Result<Vec<Chain>, ConfigError> {
    let display = path.as_ref().display().to_string();
    let raw = std::fs::read_to_string(path.as_ref()).map_err(|source| ConfigError::ChainsFile {
        path: display.clone(),
        source,
    })?;

    parse_chains(&raw).map_err(|err| match err {
        ConfigError::ChainsFormat { source, .. } => ConfigError::ChainsFormat {
            path: display,
            source,
        },
        other => other,
    })
}

pub fn parse_chains(raw: &str) -> Result<Vec<Chain>, ConfigError> {
    let chains: Vec<Chain> =
        serde_json::from_str(raw).map_err(|source| ConfigError::ChainsFormat {
            path: String::new(),
            source,
        })?;

    let mut seen = std::collections::HashSet::new();
    for chain in &chains {
        if !seen.insert(chain.id) {
            return Err(ConfigError::DuplicateChain(chain.id));
        }
    }

    Ok(chains)
}

use std::path::PathBuf;

/// Default scheme for derived resource URIs.
const DEFAULT_URI_SCHEME: &str = "demo";

/// Where records live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Backend {
    /// In-process record store.
    Memory,
    /// Remote table API, authenticated with a bearer token.
    Remote { base_url: String, token: String },
}

/// Server configuration loaded from environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub uri_scheme: String,
    pub seed_demo: bool,
    pub seed_file: Option<PathBuf>,
    pub backend: Backend,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            uri_scheme: DEFAULT_URI_SCHEME.to_string(),
            seed_demo: true,
            seed_file: None,
            backend: Backend::Memory,
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment.
    ///
    /// - `RECORD_URI_SCHEME` (optional, default `demo`): scheme for resource URIs
    /// - `RECORD_SEED_DEMO` (optional, default true): seed demo resources and tools
    /// - `RECORD_SEED_FILE` (optional): JSON file of resources to load at startup
    /// - `RECORD_REMOTE_URL` / `RECORD_REMOTE_TOKEN` (optional): use the remote table API
    pub fn from_env() -> Result<Self, String> {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary variable source.
    pub fn from_vars<F>(var: F) -> Result<Self, String>
    where
        F: Fn(&str) -> Option<String>,
    {
        let uri_scheme = var("RECORD_URI_SCHEME").unwrap_or_else(|| DEFAULT_URI_SCHEME.to_string());
        if uri_scheme.is_empty() || !uri_scheme.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err("RECORD_URI_SCHEME must be non-empty and ASCII alphanumeric".to_string());
        }

        let seed_demo = match var("RECORD_SEED_DEMO") {
            Some(val) => parse_flag(&val)
                .ok_or_else(|| "RECORD_SEED_DEMO must be true/false, 1/0 or yes/no".to_string())?,
            None => true,
        };

        let seed_file = var("RECORD_SEED_FILE").map(PathBuf::from);

        let backend = match var("RECORD_REMOTE_URL") {
            Some(base_url) => {
                let token = var("RECORD_REMOTE_TOKEN").ok_or_else(|| {
                    "RECORD_REMOTE_TOKEN must be set when RECORD_REMOTE_URL is set".to_string()
                })?;
                Backend::Remote { base_url, token }
            }
            None => Backend::Memory,
        };

        Ok(Self {
            uri_scheme,
            seed_demo,
            seed_file,
            backend,
        })
    }
}

fn parse_flag(val: &str) -> Option<bool> {
    match val.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" => Some(true),
        "0" | "false" | "no" => Some(false),
        _ => None,
    }
}

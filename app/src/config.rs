use std::path::{Path, PathBuf};
use std::time::Duration;

use domain::error::ConfigError;
use domain::model::entity::Credentials;
use domain::service::EnvLookup;
use serde::*;
use typed_builder::TypedBuilder;
use url::Url;

pub const ENV_CLIENT_ID: &str = "UIT_ID";
pub const ENV_CLIENT_SECRET: &str = "UIT_SECRET";
pub const ENV_CA_FILE: &str = "UIT_CA_FILE";
pub const ENV_NODE_TYPES_FILE: &str = "UIT_NODE_TYPES_FILE";
pub const ENV_CONFIG_FILE: &str = "UIT_CONFIG_FILE";
pub const ENV_TOKEN_FILE: &str = "UIT_TOKEN_FILE";

const DEFAULT_CONFIG_FILE_NAME: &str = ".uit";

/// Contents of the YAML config file. Every key is optional.
#[derive(Debug, Clone, Deserialize)]
pub struct UitConfig {
    #[serde(default)]
    pub client_id: Option<String>,

    #[serde(default)]
    pub client_secret: Option<String>,

    #[serde(default)]
    pub ca_file: Option<PathBuf>,

    #[serde(default)]
    pub node_types_file: Option<PathBuf>,

    #[serde(default)]
    pub token_file: Option<PathBuf>,

    #[serde(default = "UitConfig::default_api_url")]
    pub api_url: Url,

    #[serde(default = "UitConfig::default_scope")]
    pub scope: String,

    #[serde(default = "UitConfig::default_callback_port")]
    pub callback_port: u16,

    /// Seconds to wait for the authorization redirect.
    #[serde(default = "UitConfig::default_callback_timeout")]
    pub callback_timeout: u64,

    #[serde(default = "UitConfig::default_request_timeout")]
    pub request_timeout: u64,

    #[serde(default = "UitConfig::default_retries")]
    pub retries: u32,

    #[serde(default = "UitConfig::default_refresh_margin")]
    pub refresh_margin: i64,
}

impl UitConfig {
    pub fn default_api_url() -> Url {
        Url::parse(service::auth::DEFAULT_API_URL).expect("default API URL is valid")
    }

    pub fn default_scope() -> String {
        service::auth::DEFAULT_SCOPE.to_owned()
    }

    pub fn default_callback_port() -> u16 {
        service::auth::DEFAULT_CALLBACK_PORT
    }

    pub fn default_callback_timeout() -> u64 {
        300
    }

    pub fn default_request_timeout() -> u64 {
        120
    }

    pub fn default_retries() -> u32 {
        1
    }

    pub fn default_refresh_margin() -> i64 {
        service::auth::DEFAULT_REFRESH_MARGIN
    }

    /// Reads `path` as YAML. A missing file yields the defaults.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let invalid = |e: config::ConfigError| ConfigError::InvalidFile {
            path: path.to_owned(),
            message: e.to_string(),
        };
        config::Config::builder()
            .add_source(
                config::File::new(&path.to_string_lossy(), config::FileFormat::Yaml)
                    .required(false),
            )
            .build()
            .map_err(invalid)?
            .try_deserialize()
            .map_err(invalid)
    }
}

impl Default for UitConfig {
    fn default() -> Self {
        Self {
            client_id: None,
            client_secret: None,
            ca_file: None,
            node_types_file: None,
            token_file: None,
            api_url: Self::default_api_url(),
            scope: Self::default_scope(),
            callback_port: Self::default_callback_port(),
            callback_timeout: Self::default_callback_timeout(),
            request_timeout: Self::default_request_timeout(),
            retries: Self::default_retries(),
            refresh_margin: Self::default_refresh_margin(),
        }
    }
}

/// Values passed in by the caller. They win over the environment and the
/// config file.
#[derive(Debug, Clone, Default, TypedBuilder)]
#[builder(field_defaults(default, setter(strip_option, into)))]
pub struct ConfigOverrides {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub ca_file: Option<PathBuf>,
    pub node_types_file: Option<PathBuf>,
    pub config_file: Option<PathBuf>,
    pub token_file: Option<PathBuf>,
    /// An access token obtained elsewhere; makes credentials optional.
    pub token: Option<String>,
}

/// Settings after merging arguments, environment and config file.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub credentials: Option<Credentials>,
    pub token: Option<String>,
    pub ca_file: Option<PathBuf>,
    pub node_types_file: Option<PathBuf>,
    pub config_file: PathBuf,
    pub token_file: PathBuf,
    pub api_url: Url,
    pub scope: String,
    pub callback_port: u16,
    pub callback_timeout: Duration,
    pub request_timeout: Duration,
    pub retries: u32,
    pub refresh_margin: chrono::Duration,
}

/// Reads the real process environment.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessEnv;

impl EnvLookup for ProcessEnv {
    fn get_env(&self, name: &str) -> Option<String> {
        std::env::var(name).ok()
    }
}

pub struct ConfigResolver<E = ProcessEnv> {
    env: E,
    home: Option<PathBuf>,
}

impl ConfigResolver<ProcessEnv> {
    pub fn from_process() -> Self {
        Self::new(ProcessEnv, dirs::home_dir())
    }
}

impl<E: EnvLookup> ConfigResolver<E> {
    pub fn new(env: E, home: Option<PathBuf>) -> Self {
        Self { env, home }
    }

    /// Each field independently: argument, then environment, then config file.
    pub fn resolve(&self, overrides: ConfigOverrides) -> Result<ResolvedConfig, ConfigError> {
        let env_path = |name: &str| self.env.get_env(name).filter(|v| !v.is_empty()).map(PathBuf::from);
        let env_text = |name: &str| self.env.get_env(name).filter(|v| !v.is_empty());

        let config_file = match overrides.config_file.or_else(|| env_path(ENV_CONFIG_FILE)) {
            Some(path) => path,
            None => self
                .home
                .as_ref()
                .map(|home| home.join(DEFAULT_CONFIG_FILE_NAME))
                .ok_or(ConfigError::InvalidValue {
                    field: "config_file",
                    message: "cannot determine the home directory".to_owned(),
                })?,
        };
        let file = UitConfig::from_file(&config_file)?;
        tracing::debug!(config_file = %config_file.display(), "Loaded config file");

        let client_id = overrides
            .client_id
            .or_else(|| env_text(ENV_CLIENT_ID))
            .or(file.client_id);
        let client_secret = overrides
            .client_secret
            .or_else(|| env_text(ENV_CLIENT_SECRET))
            .or(file.client_secret);
        let credentials = match (client_id, client_secret) {
            (Some(id), Some(secret)) => Some(Credentials::new(id, secret)),
            _ if overrides.token.is_some() => None,
            _ => return Err(ConfigError::MissingCredentials { config_file }),
        };

        let token_file = overrides
            .token_file
            .or_else(|| env_path(ENV_TOKEN_FILE))
            .or(file.token_file)
            .unwrap_or_else(|| config_file.clone());

        let refresh_margin = chrono::Duration::try_seconds(file.refresh_margin)
            .filter(|margin| *margin >= chrono::Duration::zero())
            .ok_or_else(|| ConfigError::InvalidValue {
                field: "refresh_margin",
                message: format!(
                    "must be a non-negative number of seconds, got {}",
                    file.refresh_margin
                ),
            })?;

        Ok(ResolvedConfig {
            credentials,
            token: overrides.token,
            ca_file: overrides
                .ca_file
                .or_else(|| env_path(ENV_CA_FILE))
                .or(file.ca_file),
            node_types_file: overrides
                .node_types_file
                .or_else(|| env_path(ENV_NODE_TYPES_FILE))
                .or(file.node_types_file),
            config_file,
            token_file,
            api_url: file.api_url,
            scope: file.scope,
            callback_port: file.callback_port,
            callback_timeout: Duration::from_secs(file.callback_timeout),
            request_timeout: Duration::from_secs(file.request_timeout),
            retries: file.retries,
            refresh_margin,
        })
    }
}

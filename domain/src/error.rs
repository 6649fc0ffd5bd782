use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};

pub type Result<T, E = UitError> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum UitError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Remote(#[from] RemoteCommandError),
    #[error("must connect to a system before `{operation}`")]
    NotConnected { operation: &'static str },
    #[error("cannot connect: {0}")]
    Connect(String),
    #[error("unexpected response from `{endpoint}`: {message}")]
    Protocol { endpoint: String, message: String },
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Transport(#[from] anyhow::Error),
}

/// Missing or invalid credentials, settings, or file paths.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error(
        "please provide either client_id and client_secret as arguments, environment variables \
         (UIT_ID, UIT_SECRET) or in the config file {}, or provide an access token",
        config_file.display()
    )]
    MissingCredentials { config_file: PathBuf },
    #[error("invalid config file {}: {message}", path.display())]
    InvalidFile { path: PathBuf, message: String },
    #[error("invalid value for `{field}`: {message}")]
    InvalidValue { field: &'static str, message: String },
    #[error("invalid node types table {source_name}: {message}")]
    NodeTypes { source_name: String, message: String },
}

/// Authorization or refresh rejected by the service, or no usable callback.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("token request for `{system}` failed with status {status}: {body}")]
    Rejected {
        system: String,
        status: u16,
        body: String,
    },
    #[error("refresh token for `{system}` was rejected with status {status}: {body}")]
    RefreshRejected {
        system: String,
        status: u16,
        body: String,
    },
    #[error("refresh token for `{system}` expired at {expired_at}")]
    RefreshExpired {
        system: String,
        expired_at: DateTime<Utc>,
    },
    #[error("no authorization callback received within {0:?}")]
    Timeout(Duration),
    #[error("authorization callback carried an unexpected state")]
    StateMismatch,
    #[error("authorization callback carried no code")]
    MissingCode,
    #[error("authorization was denied: {0}")]
    Denied(String),
    #[error("malformed token response: {0}")]
    MalformedResponse(String),
    #[error("no valid access token for `{system}`, please authenticate first")]
    NotAuthenticated { system: String },
    #[error("authorization callback listener failed")]
    Listener(#[source] std::io::Error),
}

/// Token file read/write failure.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("cannot access token file {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("token file {} is malformed: {message}", path.display())]
    Format { path: PathBuf, message: String },
}

/// One line of command output that matched the column structure but could not
/// be coerced to the declared types.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("line {line}: {reason}")]
pub struct ParseError {
    pub line: usize,
    pub text: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("parameter `{0}` is required")]
    Required(&'static str),
    #[error("`{field}` must be a positive integer, got {value}")]
    NotPositive { field: &'static str, value: u32 },
    #[error("`max_time` must not be negative")]
    NegativeMaxTime,
    #[error("`max_time` must be a duration or a string in the form \"HH:MM:SS\", got `{0}`")]
    InvalidWalltime(String),
    #[error("unknown system `{system}`, must be one of: {known:?}")]
    UnknownSystem { system: String, known: Vec<String> },
    #[error("unknown node type `{node_type}` on `{system}`, must be one of: {known:?}")]
    UnknownNodeType {
        system: String,
        node_type: String,
        known: Vec<String>,
    },
    #[error(
        "invalid `processes_per_node` {value} for node type `{node_type}` on `{system}`, \
         must be one of: {allowed:?}"
    )]
    ProcessesPerNode {
        value: u32,
        system: String,
        node_type: String,
        allowed: Vec<u32>,
    },
    #[error("invalid job array {start}-{end}")]
    JobArray { start: u32, end: u32 },
}

/// The remote execution reported failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("remote command `{command}` failed: {error}")]
pub struct RemoteCommandError {
    pub command: String,
    pub stdout: String,
    pub stderr: String,
    pub error: String,
}

impl RemoteCommandError {
    pub fn new(command: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            stdout: String::new(),
            stderr: String::new(),
            error: error.into(),
        }
    }
}

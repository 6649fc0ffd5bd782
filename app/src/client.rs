use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwapOption;
use domain::error::{AuthError, ConfigError, RemoteCommandError, Result, UitError};
use domain::model::entity::{Credentials, PbsScript, TokenRecord};
use domain::model::vo::ParsedRow;
use domain::repository::TokenRepository;
use domain::service::{AuthorizationCodeReceiver, HttpRequest, HttpTransport, RequestBody};
use rand::seq::SliceRandom;
use serde_json::json;
use service::prelude::*;
use typed_builder::TypedBuilder;
use url::Url;

use crate::config::{ConfigOverrides, ConfigResolver, ResolvedConfig, UitConfig};
use crate::dto::{DirEntry, DirectoryListing, ListingReply, Reply, UserInfo, UserInfoReply};
use crate::infrastructure::http::{ReqwestTransport, TransportOptions};
use crate::infrastructure::repository::YamlTokenStore;
use crate::login;

pub const DEFAULT_REMOTE_SCRIPT_NAME: &str = "run.pbs";

const DP_ROUTE_ERROR: &str = "DP Route error";
const CONNECT_RETRIES: usize = 3;
const SHOW_USAGE: &str = "module reload >/dev/null 2>&1; show_usage";

/// Where [`Client::connect`] should land.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// Any login node of the system.
    System(String),
    LoginNode(String),
}

/// A job script to submit.
#[derive(Debug, Clone, Copy)]
pub enum ScriptSource<'a> {
    Script(&'a PbsScript),
    Text(&'a str),
    /// A local file uploaded as is.
    File(&'a Path),
}

impl<'a> From<&'a PbsScript> for ScriptSource<'a> {
    fn from(script: &'a PbsScript) -> Self {
        Self::Script(script)
    }
}

impl<'a> From<&'a str> for ScriptSource<'a> {
    fn from(text: &'a str) -> Self {
        Self::Text(text)
    }
}

impl<'a> From<&'a Path> for ScriptSource<'a> {
    fn from(path: &'a Path) -> Self {
        Self::File(path)
    }
}

#[derive(Debug, Clone, PartialEq)]
enum AccessToken {
    /// Handed in by the caller, used until the service rejects it.
    Static(String),
    Managed(TokenRecord),
}

/// The login node the client talks to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Connection {
    pub system: String,
    pub login_node: String,
    pub username: String,
    pub uit_url: Url,
}

/// Collaborators and settings of a [`Client`].
#[derive(TypedBuilder)]
pub struct ClientParts {
    transport: Arc<dyn HttpTransport>,
    token_store: Arc<dyn TokenRepository>,
    #[builder(default, setter(strip_option))]
    credentials: Option<Credentials>,
    #[builder(default, setter(strip_option, into))]
    token: Option<String>,
    #[builder(default = UitConfig::default_api_url())]
    api_url: Url,
    #[builder(default = UitConfig::default_scope(), setter(into))]
    scope: String,
    #[builder(default = UitConfig::default_callback_port())]
    callback_port: u16,
    #[builder(default = Duration::from_secs(UitConfig::default_callback_timeout()))]
    callback_timeout: Duration,
    /// Attempts after a DP Route error.
    #[builder(default = UitConfig::default_retries())]
    retries: u32,
    #[builder(default = chrono::Duration::seconds(UitConfig::default_refresh_margin()))]
    refresh_margin: chrono::Duration,
    #[builder(default)]
    node_types: NodeTypes,
}

/// Client of the UIT+ service: authentication, remote commands, file
/// transfer and PBS jobs on one login node at a time.
pub struct Client {
    transport: Arc<dyn HttpTransport>,
    auth: Option<AuthSession>,
    api_url: Url,
    callback_port: u16,
    callback_timeout: Duration,
    retries: u32,
    token: ArcSwapOption<AccessToken>,
    connection: ArcSwapOption<Connection>,
    env: tokio::sync::Mutex<HashMap<String, String>>,
    queues: tokio::sync::Mutex<Option<ParseOutcome>>,
    builder: PbsScriptBuilder,
}

impl Client {
    /// Resolves settings from `overrides`, the environment and the config file.
    pub fn new(overrides: ConfigOverrides) -> Result<Self> {
        let config = ConfigResolver::from_process().resolve(overrides)?;
        Self::from_config(config)
    }

    pub fn from_config(config: ResolvedConfig) -> Result<Self> {
        let transport_options = TransportOptions::builder()
            .timeout(config.request_timeout)
            .retries(config.retries)
            .build();
        let transport_options = match config.ca_file.clone() {
            Some(ca_file) => TransportOptions {
                ca_file: Some(ca_file),
                ..transport_options
            },
            None => transport_options,
        };
        let transport = ReqwestTransport::new(&transport_options)?;
        let node_types = match &config.node_types_file {
            Some(path) => NodeTypes::from_path(path)?,
            None => NodeTypes::builtin(),
        };

        let parts = ClientParts {
            transport: Arc::new(transport),
            token_store: Arc::new(YamlTokenStore::new(&config.token_file)),
            credentials: config.credentials,
            token: config.token,
            api_url: config.api_url,
            scope: config.scope,
            callback_port: config.callback_port,
            callback_timeout: config.callback_timeout,
            retries: config.retries,
            refresh_margin: config.refresh_margin,
            node_types,
        };
        Self::from_parts(parts)
    }

    pub fn from_parts(parts: ClientParts) -> Result<Self> {
        let auth = match parts.credentials {
            Some(credentials) => {
                let mut settings = AuthSettings::new(&parts.api_url, parts.callback_port)
                    .map_err(|e| ConfigError::InvalidValue {
                        field: "api_url",
                        message: e.to_string(),
                    })?;
                settings.scope = parts.scope;
                settings.refresh_margin = parts.refresh_margin;
                Some(AuthSession::new(
                    parts.transport.clone(),
                    parts.token_store,
                    credentials,
                    settings,
                ))
            }
            None => None,
        };

        Ok(Self {
            transport: parts.transport,
            auth,
            api_url: parts.api_url,
            callback_port: parts.callback_port,
            callback_timeout: parts.callback_timeout,
            retries: parts.retries,
            token: ArcSwapOption::from_pointee(parts.token.map(AccessToken::Static)),
            connection: ArcSwapOption::empty(),
            env: Default::default(),
            queues: Default::default(),
            builder: PbsScriptBuilder::new(Arc::new(parts.node_types)),
        })
    }

    pub fn script_builder(&self) -> &PbsScriptBuilder {
        &self.builder
    }

    pub fn connection(&self) -> Option<Arc<Connection>> {
        self.connection.load_full()
    }

    pub fn is_authenticated(&self) -> bool {
        self.token.load_full().is_some()
    }

    /// Obtains tokens for `system`, through the local redirect listener when
    /// `interactive`, or by asking for the code on stdin otherwise.
    pub async fn authenticate(&self, system: &str, interactive: bool) -> Result<()> {
        let receiver = login::code_receiver(interactive, self.callback_port, self.callback_timeout);
        self.authenticate_with(system, receiver.as_ref()).await
    }

    pub async fn authenticate_with(
        &self,
        system: &str,
        receiver: &dyn AuthorizationCodeReceiver,
    ) -> Result<()> {
        if let Some(AccessToken::Static(_)) = self.token.load_full().as_deref() {
            tracing::debug!("Using the access token given at construction");
            return Ok(());
        }
        let auth = self.auth_session(system)?;
        let record = auth.authenticate(system, receiver).await?;
        self.token.store(Some(Arc::new(AccessToken::Managed(record))));
        Ok(())
    }

    /// Completes authorization with a code captured elsewhere.
    pub async fn exchange_code(&self, system: &str, code: &str) -> Result<()> {
        let record = self.auth_session(system)?.exchange_code(system, code).await?;
        self.token.store(Some(Arc::new(AccessToken::Managed(record))));
        Ok(())
    }

    /// Forgets the stored tokens of `system`, or of every system.
    pub async fn clear_tokens(&self, system: Option<&str>) -> Result<()> {
        if let Some(auth) = &self.auth {
            auth.clear_tokens(system).await?;
        }
        self.token.store(None);
        Ok(())
    }

    fn auth_session(&self, system: &str) -> Result<&AuthSession> {
        self.auth.as_ref().ok_or_else(|| {
            AuthError::NotAuthenticated {
                system: system.to_owned(),
            }
            .into()
        })
    }

    async fn access_token(&self) -> Result<String> {
        let not_authenticated = || AuthError::NotAuthenticated {
            system: self
                .connection
                .load_full()
                .map(|c| c.system.clone())
                .unwrap_or_default(),
        };

        let current = self.token.load_full().ok_or_else(not_authenticated)?;
        match current.as_ref() {
            AccessToken::Static(token) => Ok(token.clone()),
            AccessToken::Managed(record) => {
                let Some(auth) = &self.auth else {
                    return Ok(record.access_token.clone());
                };
                let refreshed = auth.refresh_if_needed(record.clone()).await?;
                let token = refreshed.access_token.clone();
                if &refreshed != record {
                    self.token
                        .store(Some(Arc::new(AccessToken::Managed(refreshed))));
                }
                Ok(token)
            }
        }
    }

    async fn userinfo(&self) -> Result<UserInfo> {
        let url = self.endpoint(&self.api_url, "userinfo")?;
        let request = HttpRequest::get(url).with_token(self.access_token().await?);
        let response = self.transport.send(request).await?;
        if !response.is_success() {
            return Err(protocol("userinfo", format!("status {}", response.status)));
        }
        let reply: UserInfoReply = response
            .json()
            .map_err(|e| protocol("userinfo", e.to_string()))?;
        match reply.userinfo {
            Some(info) if reply.is_ok() => {
                tracing::info!(user = %info.username, "Fetched user info");
                Ok(info)
            }
            _ => Err(AuthError::NotAuthenticated {
                system: String::new(),
            }
            .into()),
        }
    }

    /// Selects a login node and checks that commands run on it. When only a
    /// system is given, other nodes of it are tried if the first one fails.
    pub async fn connect(&self, target: Target, exclude: &[&str]) -> Result<String> {
        let userinfo = self.userinfo().await?;
        let mut excluded: Vec<String> = exclude.iter().map(|n| n.to_string()).collect();
        let mut retries_left = CONNECT_RETRIES;

        loop {
            let connection = select_node(&userinfo, &target, &excluded)?;
            let node = connection.login_node.clone();
            let system = connection.system.clone();
            self.connection.store(Some(Arc::new(connection)));
            self.env.lock().await.clear();
            *self.queues.lock().await = None;

            match self.check_environment().await {
                Ok(()) => {
                    let message = format!("Connected successfully to {node} on {system}");
                    tracing::info!("{message}");
                    return Ok(message);
                }
                Err(e) => {
                    self.connection.store(None);
                    let message = format!("Error while connecting to node {node}: {e}");
                    tracing::info!("{message}");
                    if matches!(target, Target::LoginNode(_)) || retries_left == 0 {
                        return Err(UitError::Connect(message));
                    }
                    tracing::debug!(retries_left, "Retrying on another login node of {system}");
                    retries_left -= 1;
                    excluded.push(node);
                }
            }
        }
    }

    async fn check_environment(&self) -> Result<()> {
        self.home().await?;
        self.env("WORKDIR").await?;
        Ok(())
    }

    fn connected(&self, operation: &'static str) -> Result<Arc<Connection>> {
        self.connection
            .load_full()
            .ok_or(UitError::NotConnected { operation })
    }

    fn endpoint(&self, base: &Url, name: &str) -> Result<Url> {
        base.join(name)
            .map_err(|e| protocol(name, format!("invalid endpoint URL: {e}")))
    }

    /// Runs `command` on the login node and returns its stdout followed by
    /// its stderr. Runs in the home directory unless `working_dir` is given.
    pub async fn call(&self, command: &str, working_dir: Option<&str>) -> Result<String> {
        self.connected("call")?;
        let working_dir = match working_dir {
            Some(dir) => self.resolve_path(dir).await?,
            None => self.home().await?,
        };
        self.run(command, &working_dir).await
    }

    async fn run(&self, command: &str, working_dir: &str) -> Result<String> {
        let mut attempt = 0;
        loop {
            match self.exec(command, working_dir).await {
                Err(UitError::Remote(e)) if e.error.contains(DP_ROUTE_ERROR) && attempt < self.retries => {
                    attempt += 1;
                    tracing::info!(
                        "'{DP_ROUTE_ERROR}' detected, retrying {} more time(s)",
                        self.retries - attempt + 1
                    );
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
                result => return result,
            }
        }
    }

    async fn exec(&self, command: &str, working_dir: &str) -> Result<String> {
        let connection = self.connected("call")?;
        let url = self.endpoint(&connection.uit_url, "exec")?;
        let options = json!({ "command": command, "workingdir": working_dir });
        tracing::info!(command, working_dir, "exec");

        let request = HttpRequest::form(url, [("options", options.to_string())])
            .with_token(self.access_token().await?);
        let response = self.transport.send(request).await?;
        if response.status == 504 {
            return Err(RemoteCommandError::new(command, "Gateway Timeout").into());
        }
        let reply: Reply = response.json().map_err(|e| {
            tracing::error!(status = response.status, body = %response.text(), "JSON parse error");
            protocol("exec", e.to_string())
        })?;

        if reply.is_ok() {
            return Ok(reply.stdout + &reply.stderr);
        }
        let error = reply.error_message();
        Err(RemoteCommandError {
            command: command.to_owned(),
            stdout: reply.stdout,
            stderr: reply.stderr,
            error,
        }
        .into())
    }

    /// Uploads `local` to `remote`, by default a file of the same name in the
    /// home directory. Returns the remote path.
    pub async fn put_file(&self, local: &Path, remote: Option<&str>) -> Result<String> {
        let connection = self.connected("put_file")?;
        if !local.is_file() {
            return Err(UitError::InvalidArgument(format!(
                "{} is not a file",
                local.display()
            )));
        }
        let remote = match remote {
            Some(remote) => self.resolve_path(remote).await?,
            None => {
                let name = local
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                format!("{}/{name}", self.home().await?)
            }
        };
        tracing::info!(local = %local.display(), remote, "put_file");

        let url = self.endpoint(&connection.uit_url, "putfile")?;
        let body = RequestBody::Multipart {
            fields: vec![("options".to_owned(), json!({ "file": remote }).to_string())],
            file_field: "file".to_owned(),
            file: local.to_owned(),
        };
        let request = HttpRequest::post(url, body).with_token(self.access_token().await?);
        let response = self.transport.send(request).await?;
        let reply: Reply = response.json().map_err(|e| {
            tracing::error!(status = response.status, body = %response.text(), "JSON parse error");
            protocol("putfile", format!("upload error: {e}"))
        })?;
        if reply.is_failure() || !response.is_success() {
            return Err(RemoteCommandError {
                command: format!("putfile {remote}"),
                stdout: reply.stdout.clone(),
                stderr: reply.stderr.clone(),
                error: reply.error_message(),
            }
            .into());
        }
        Ok(remote)
    }

    /// Downloads `remote` to `local`, by default a file of the same name in
    /// the current directory.
    pub async fn get_file(&self, remote: &str, local: Option<&Path>) -> Result<PathBuf> {
        let connection = self.connected("get_file")?;
        let remote = self.resolve_path(remote).await?;
        let local = match local {
            Some(local) => local.to_owned(),
            None => PathBuf::from(remote.rsplit('/').next().unwrap_or(&remote)),
        };
        tracing::info!(remote, local = %local.display(), "get_file");

        let url = self.endpoint(&connection.uit_url, "getfile")?;
        let request = HttpRequest::form(url, [("options", json!({ "file": remote }).to_string())])
            .with_token(self.access_token().await?);
        let status = self.transport.download(request, local.clone()).await?;
        if !(200..300).contains(&status) {
            return Err(RemoteCommandError::new(
                format!("getfile {remote}"),
                format!(
                    "UIT returned a non-success status code ({status}). The file may not exist, \
                     or you may not have permission to access it."
                ),
            )
            .into());
        }
        Ok(local)
    }

    /// Lists `path`, the home directory by default. Falls back to parsing
    /// `ls -l` when the endpoint reports an error.
    pub async fn list_dir(&self, path: Option<&str>) -> Result<DirectoryListing> {
        let connection = self.connected("list_dir")?;
        let path = match path {
            Some(path) => self.resolve_path(path).await?,
            None => self.home().await?,
        };
        tracing::info!(path, "list_dir");

        let url = self.endpoint(&connection.uit_url, "listdirectory")?;
        let request = HttpRequest::form(url, [("options", json!({ "directory": path }).to_string())])
            .with_token(self.access_token().await?);
        let response = self.transport.send(request).await?;
        let reply: ListingReply = response
            .json()
            .map_err(|e| protocol("listdirectory", e.to_string()))?;
        if let Some(listing) = reply.into_listing(&path) {
            return Ok(listing);
        }

        tracing::debug!(path, "listdirectory failed, falling back to ls");
        let output = self
            .run(&format!("ls -l --time-style=long-iso {path}"), &path)
            .await?;
        let outcome = parsed(parse(&output, &shapes::directory_listing()), "ls")?;
        let mut entries: Vec<DirEntry> = outcome
            .rows
            .iter()
            .filter_map(|row| DirEntry::from_ls_row(row, &path))
            .collect();
        entries.sort_by_key(|entry| !entry.is_dir());
        Ok(DirectoryListing { path, entries })
    }

    /// Subproject allocations of the connected system.
    pub async fn show_usage(&self) -> Result<ParseOutcome> {
        self.connected("show_usage")?;
        let output = self.call(SHOW_USAGE, None).await?;
        parsed(parse(&output, &shapes::usage()), "show_usage")
    }

    /// `qstat` rows of `username` (the connected user by default), limited
    /// to `job_ids` when given. `with_historic` adds finished jobs when no
    /// ids are given. Lines that could not be parsed are kept in
    /// [`ParseOutcome::rejected`].
    pub async fn status(
        &self,
        job_ids: &[&str],
        username: Option<&str>,
        with_historic: bool,
    ) -> Result<ParseOutcome> {
        let connection = self.connected("status")?;
        let username = username.unwrap_or(&connection.username);
        let mut command = format!("qstat -u {username}");
        let shape = shapes::job_status();

        if !job_ids.is_empty() {
            command.push_str(&format!(" -x {}", job_numbers(job_ids)));
            let output = self.call(&command, None).await?;
            return parsed(parse(&output, &shape), "qstat");
        }

        let output = self.call(&command, None).await?;
        let mut outcome = parsed(parse(&output, &shape), "qstat")?;
        if with_historic {
            command.push_str(" -x");
            let output = self.call(&command, None).await?;
            let historic = parsed(parse(&output, &shape), "qstat -x")?;
            outcome.rows.extend(historic.rows);
            outcome.rejected.extend(historic.rejected);
        }
        Ok(outcome)
    }

    /// `qstat -f` attributes, one row per job.
    pub async fn full_status(&self, job_ids: &[&str]) -> Result<Vec<ParsedRow>> {
        self.connected("full_status")?;
        let mut command = "qstat -f".to_owned();
        if !job_ids.is_empty() {
            command.push_str(&format!(" -x {}", job_numbers(job_ids)));
        }
        let output = self.call(&command, None).await?;
        Ok(parse_full_status(&output))
    }

    /// Uploads the script to `working_dir/remote_name` and queues it with
    /// `qsub`. Returns the job id.
    pub async fn submit(
        &self,
        script: ScriptSource<'_>,
        working_dir: Option<&str>,
        remote_name: Option<&str>,
    ) -> Result<String> {
        self.connected("submit")?;
        let working_dir = match working_dir {
            Some(dir) => self.resolve_path(dir).await?,
            None => self.workdir().await?,
        };
        let remote_name = remote_name.unwrap_or(DEFAULT_REMOTE_SCRIPT_NAME);

        let (local, temporary) = match script {
            ScriptSource::File(path) => (path.to_owned(), false),
            ScriptSource::Script(script) => (write_temp(&self.builder.render(script)?).await?, true),
            ScriptSource::Text(text) => (write_temp(text).await?, true),
        };

        let submitted = async {
            self.put_file(&local, Some(&format!("{working_dir}/{remote_name}")))
                .await?;
            self.call(&format!("qsub {remote_name}"), Some(&working_dir))
                .await
        }
        .await;

        if temporary {
            if let Err(e) = tokio::fs::remove_file(&local).await {
                tracing::warn!(path = %local.display(), "Cannot remove temporary script: {e}");
            }
        }

        let job_id = submitted?.trim().to_owned();
        tracing::info!(job_id, working_dir, "Submitted job");
        Ok(job_id)
    }

    /// `qstat -Q` rows, cached until `update_cache`.
    pub async fn get_queues(&self, update_cache: bool) -> Result<ParseOutcome> {
        self.connected("get_queues")?;
        let mut queues = self.queues.lock().await;
        if let (Some(queues), false) = (queues.as_ref(), update_cache) {
            return Ok(queues.clone());
        }
        let output = self.call("qstat -Q", None).await?;
        let outcome = parsed(parse(&output, &shapes::queue_summary()), "qstat -Q")?;
        *queues = Some(outcome.clone());
        Ok(outcome)
    }

    /// Value of an environment variable on the login node. Set values are
    /// cached for the lifetime of the connection.
    pub async fn env(&self, name: &str) -> Result<Option<String>> {
        self.connected("env")?;
        if !is_env_name(name) {
            return Err(UitError::InvalidArgument(format!(
                "`{name}` is not a valid environment variable name"
            )));
        }
        let mut env = self.env.lock().await;
        if let Some(value) = env.get(name) {
            return Ok(Some(value.clone()));
        }
        let output = self.run(&format!("echo ${name}"), ".").await?;
        let value = output.trim();
        if value.is_empty() {
            return Ok(None);
        }
        env.insert(name.to_owned(), value.to_owned());
        Ok(Some(value.to_owned()))
    }

    pub async fn home(&self) -> Result<String> {
        self.required_env("HOME").await
    }

    pub async fn workdir(&self) -> Result<String> {
        self.required_env("WORKDIR").await
    }

    async fn required_env(&self, name: &str) -> Result<String> {
        self.env(name)
            .await?
            .ok_or_else(|| protocol("exec", format!("${name} is not set on the login node")))
    }

    /// Relative paths are taken from the home directory.
    async fn resolve_path(&self, path: &str) -> Result<String> {
        if path.starts_with('/') {
            return Ok(path.to_owned());
        }
        let home = self.home().await?;
        let path = path.trim_start_matches("./");
        Ok(if path.is_empty() || path == "." {
            home
        } else {
            format!("{}/{path}", home.trim_end_matches('/'))
        })
    }
}

fn select_node(userinfo: &UserInfo, target: &Target, excluded: &[String]) -> Result<Connection> {
    let (system, node) = match target {
        Target::LoginNode(name) => userinfo.system_of(name).ok_or_else(|| {
            UitError::Connect(format!("unknown login node `{name}`"))
        })?,
        Target::System(name) => {
            let info = userinfo.system(name).ok_or_else(|| {
                UitError::Connect(format!(
                    "unknown system `{name}`, must be one of: {:?}",
                    userinfo.systems()
                ))
            })?;
            let candidates: Vec<_> = info
                .login_nodes
                .iter()
                .filter(|node| !excluded.iter().any(|e| e == node.name()))
                .collect();
            let node = candidates
                .choose(&mut rand::thread_rng())
                .ok_or_else(|| UitError::Connect(format!("no login nodes left to try on {name}")))?;
            (name.to_lowercase(), *node)
        }
    };

    let username = userinfo
        .system(&system)
        .and_then(|info| info.username.clone())
        .unwrap_or_else(|| userinfo.username.clone());
    Ok(Connection {
        system,
        login_node: node.name().to_owned(),
        username,
        uit_url: node.urls.uit.clone(),
    })
}

/// `1234.pbs01` -> `1234`
fn job_numbers(job_ids: &[&str]) -> String {
    job_ids
        .iter()
        .map(|id| id.split('.').next().unwrap_or(id))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Output where every data line was rejected fails, otherwise rejected lines
/// stay visible in the outcome.
fn parsed(outcome: ParseOutcome, command: &str) -> Result<ParseOutcome> {
    for rejected in &outcome.rejected {
        tracing::warn!(command, "Unparsable output {rejected}: {}", rejected.text);
    }
    Ok(outcome.checked()?)
}

/// `[A-Za-z_][A-Za-z0-9_]*`
fn is_env_name(name: &str) -> bool {
    let mut chars = name.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

async fn write_temp(text: &str) -> Result<PathBuf> {
    let path = std::env::temp_dir().join(uuid::Uuid::new_v4().to_string());
    tokio::fs::write(&path, text).await?;
    Ok(path)
}

fn protocol(endpoint: &str, message: impl Into<String>) -> UitError {
    UitError::Protocol {
        endpoint: endpoint.to_owned(),
        message: message.into(),
    }
}

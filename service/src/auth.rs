use std::fmt::Write;
use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use domain::{
    error::{AuthError, Result},
    model::entity::{Credentials, TokenRecord},
    repository::TokenRepository,
    service::{AuthorizationCodeReceiver, HttpRequest, HttpTransport},
};
use rand::Rng;
use serde::Deserialize;
use url::Url;

pub const DEFAULT_API_URL: &str = "https://www.uitplus.hpc.mil/uapi/";
pub const DEFAULT_SCOPE: &str = "UIT";
pub const DEFAULT_CALLBACK_PORT: u16 = 5000;
pub const DEFAULT_REFRESH_MARGIN: i64 = 60;

/// Endpoints and knobs of the authorization flow.
#[derive(Debug, Clone)]
pub struct AuthSettings {
    pub authorize_url: Url,
    pub token_url: Url,
    pub redirect_uri: Url,
    pub scope: String,
    /// A token this close to its expiry is treated as expired.
    pub refresh_margin: Duration,
}

impl AuthSettings {
    pub fn new(api_url: &Url, callback_port: u16) -> std::result::Result<Self, url::ParseError> {
        Ok(Self {
            authorize_url: api_url.join("authorize")?,
            token_url: api_url.join("token")?,
            redirect_uri: Url::parse(&format!("http://localhost:{callback_port}/save_token"))?,
            scope: DEFAULT_SCOPE.to_owned(),
            refresh_margin: Duration::seconds(DEFAULT_REFRESH_MARGIN),
        })
    }
}

/// OAuth2 authorization-code session against UIT+.
///
/// Tokens are looked up in and written back to the token repository, so a
/// session started in one process can be resumed by the next.
pub struct AuthSession {
    transport: Arc<dyn HttpTransport>,
    store: Arc<dyn TokenRepository>,
    credentials: Credentials,
    settings: AuthSettings,
    state: String,
}

impl AuthSession {
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        store: Arc<dyn TokenRepository>,
        credentials: Credentials,
        settings: AuthSettings,
    ) -> Self {
        let bytes = rand::thread_rng().gen::<[u8; 16]>();
        let state = bytes.iter().fold(String::with_capacity(32), |mut s, b| {
            let _ = write!(s, "{b:02x}");
            s
        });
        Self {
            transport,
            store,
            credentials,
            settings,
            state,
        }
    }

    pub fn with_state(mut self, state: impl Into<String>) -> Self {
        self.state = state.into();
        self
    }

    pub fn state(&self) -> &str {
        &self.state
    }

    pub fn settings(&self) -> &AuthSettings {
        &self.settings
    }

    pub fn build_authorization_url(&self) -> Url {
        let mut url = self.settings.authorize_url.clone();
        url.query_pairs_mut()
            .append_pair("client_id", &self.credentials.client_id)
            .append_pair("scope", &self.settings.scope)
            .append_pair("state", &self.state)
            .append_pair("redirect_uri", self.settings.redirect_uri.as_str());
        url
    }

    /// Returns usable tokens for `system_id`: the stored ones when still
    /// valid, refreshed ones when only the access token expired, or new ones
    /// from a full authorization through `receiver`.
    pub async fn authenticate(
        &self,
        system_id: &str,
        receiver: &dyn AuthorizationCodeReceiver,
    ) -> Result<TokenRecord> {
        let now = Utc::now();
        if let Some(record) = self.store.load(system_id).await? {
            if !record.is_expired_at(now, self.settings.refresh_margin) {
                tracing::debug!(system = system_id, "Using stored access token");
                return Ok(record);
            }
            if record.can_refresh_at(now) {
                match self.refresh(record).await {
                    Ok(record) => return Ok(record),
                    Err(e) => tracing::warn!(system = system_id, "Refresh failed: {e}"),
                }
            }
        }

        let url = self.build_authorization_url();
        let callback = receiver.receive(&url).await?;
        if callback.state.as_deref().is_some_and(|state| state != self.state) {
            return Err(AuthError::StateMismatch.into());
        }
        if callback.code.is_empty() {
            return Err(AuthError::MissingCode.into());
        }
        self.exchange_code(system_id, &callback.code).await
    }

    /// Trades an authorization code for tokens and stores them.
    pub async fn exchange_code(&self, system_id: &str, code: &str) -> Result<TokenRecord> {
        let request = HttpRequest::form(
            self.settings.token_url.clone(),
            [
                ("client_id", self.credentials.client_id.as_str()),
                ("client_secret", self.credentials.client_secret.as_str()),
                ("state", self.state.as_str()),
                ("scope", self.settings.scope.as_str()),
                ("code", code),
            ],
        );
        let response = self.transport.send(request).await?;
        if !response.is_success() {
            return Err(AuthError::Rejected {
                system: system_id.to_owned(),
                status: response.status,
                body: response.text(),
            }
            .into());
        }

        let grant: TokenGrant = response
            .json()
            .map_err(|e| AuthError::MalformedResponse(e.to_string()))?;
        let record = grant.into_record(system_id, Utc::now(), None)?;
        self.store.save(&record).await?;
        tracing::info!(system = system_id, "Obtained new tokens");
        Ok(record)
    }

    /// Refreshes `record` when it is expired or about to be.
    pub async fn refresh_if_needed(&self, record: TokenRecord) -> Result<TokenRecord> {
        self.refresh_if_needed_at(record, Utc::now()).await
    }

    pub async fn refresh_if_needed_at(
        &self,
        record: TokenRecord,
        now: DateTime<Utc>,
    ) -> Result<TokenRecord> {
        if !record.is_expired_at(now, self.settings.refresh_margin) {
            return Ok(record);
        }
        if !record.can_refresh_at(now) {
            let system = record.system_id.clone();
            return Err(match record.refresh_expiry {
                Some(expired_at) if !record.refresh_token.is_empty() => {
                    AuthError::RefreshExpired { system, expired_at }
                }
                _ => AuthError::NotAuthenticated { system },
            }
            .into());
        }
        self.refresh(record).await
    }

    async fn refresh(&self, record: TokenRecord) -> Result<TokenRecord> {
        let request = HttpRequest::form(
            self.settings.token_url.clone(),
            [
                ("client_id", self.credentials.client_id.as_str()),
                ("client_secret", self.credentials.client_secret.as_str()),
                ("grant_type", "refresh_token"),
                ("refresh_token", record.refresh_token.as_str()),
                ("scope", self.settings.scope.as_str()),
            ],
        );
        let response = self.transport.send(request).await?;
        if !response.is_success() {
            return Err(AuthError::RefreshRejected {
                system: record.system_id,
                status: response.status,
                body: response.text(),
            }
            .into());
        }

        let grant: TokenGrant = response
            .json()
            .map_err(|e| AuthError::MalformedResponse(e.to_string()))?;
        let refreshed = grant.into_record(&record.system_id, Utc::now(), Some(&record))?;
        self.store.save(&refreshed).await?;
        tracing::info!(system = %refreshed.system_id, "Refreshed access token");
        Ok(refreshed)
    }

    /// Forgets tokens of one system, or of all with `None`.
    pub async fn clear_tokens(&self, system_id: Option<&str>) -> Result<()> {
        self.store.clear(system_id).await?;
        Ok(())
    }

    pub async fn cached_token(&self, system_id: &str) -> Result<Option<TokenRecord>> {
        Ok(self.store.load(system_id).await?)
    }
}

/// Token endpoint response body.
#[derive(Debug, Deserialize)]
struct TokenGrant {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    access_token_expires_on: Option<String>,
    #[serde(default)]
    refresh_token_expires_on: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    refresh_expires_in: Option<i64>,
}

/// `now` plus `secs` seconds, rejecting lifetimes chrono can't represent.
fn after(
    now: DateTime<Utc>,
    secs: i64,
    field: &str,
) -> std::result::Result<DateTime<Utc>, AuthError> {
    Duration::try_seconds(secs)
        .and_then(|lifetime| now.checked_add_signed(lifetime))
        .ok_or_else(|| AuthError::MalformedResponse(format!("`{field}` out of range: {secs}")))
}

impl TokenGrant {
    fn into_record(
        self,
        system_id: &str,
        now: DateTime<Utc>,
        previous: Option<&TokenRecord>,
    ) -> std::result::Result<TokenRecord, AuthError> {
        let expiry = match (&self.access_token_expires_on, self.expires_in) {
            (Some(at), _) => parse_instant(at)?,
            (None, Some(secs)) => after(now, secs, "expires_in")?,
            (None, None) => {
                return Err(AuthError::MalformedResponse(
                    "no access token expiry".to_owned(),
                ))
            }
        };
        let refresh_expiry = match (&self.refresh_token_expires_on, self.refresh_expires_in) {
            (Some(at), _) => Some(parse_instant(at)?),
            (None, Some(secs)) => Some(after(now, secs, "refresh_expires_in")?),
            (None, None) => None,
        };

        let (refresh_token, refresh_expiry) = match (self.refresh_token, previous) {
            (Some(token), _) if !token.is_empty() => (token, refresh_expiry),
            (_, Some(previous)) => (previous.refresh_token.clone(), previous.refresh_expiry),
            _ => (String::new(), None),
        };

        Ok(TokenRecord {
            system_id: system_id.to_owned(),
            access_token: self.access_token,
            refresh_token,
            expiry,
            refresh_expiry,
        })
    }
}

/// RFC 3339, or an ISO timestamp without offset taken as UTC.
fn parse_instant(text: &str) -> std::result::Result<DateTime<Utc>, AuthError> {
    if let Ok(at) = DateTime::parse_from_rfc3339(text) {
        return Ok(at.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(text, format).ok())
        .map(|at| at.and_utc())
        .ok_or_else(|| AuthError::MalformedResponse(format!("invalid timestamp `{text}`")))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    use chrono::{Duration, TimeZone, Utc};
    use domain::{
        error::{AuthError, StorageError, UitError},
        model::entity::{Credentials, TokenRecord},
        repository::TokenRepository,
        service::{
            AuthorizationCallback, AuthorizationCodeReceiver, HttpResponse, MockHttpTransport,
        },
    };
    use url::Url;

    use super::{parse_instant, AuthSession, AuthSettings};

    #[derive(Default)]
    struct MemoryStore(Mutex<HashMap<String, TokenRecord>>);

    #[async_trait::async_trait]
    impl TokenRepository for MemoryStore {
        async fn load(&self, system_id: &str) -> Result<Option<TokenRecord>, StorageError> {
            Ok(self.0.lock().unwrap().get(system_id).cloned())
        }

        async fn save(&self, record: &TokenRecord) -> Result<(), StorageError> {
            self.0
                .lock()
                .unwrap()
                .insert(record.system_id.clone(), record.clone());
            Ok(())
        }

        async fn clear(&self, system_id: Option<&str>) -> Result<(), StorageError> {
            let mut map = self.0.lock().unwrap();
            match system_id {
                Some(id) => {
                    map.remove(id);
                }
                None => map.clear(),
            }
            Ok(())
        }
    }

    struct FixedCode(AuthorizationCallback);

    #[async_trait::async_trait]
    impl AuthorizationCodeReceiver for FixedCode {
        async fn receive(&self, _url: &Url) -> Result<AuthorizationCallback, AuthError> {
            Ok(self.0.clone())
        }
    }

    fn callback(state: Option<&str>) -> FixedCode {
        FixedCode(AuthorizationCallback {
            code: "abc".to_owned(),
            state: state.map(str::to_owned),
        })
    }

    fn session(transport: MockHttpTransport, store: Arc<MemoryStore>) -> AuthSession {
        let api = Url::parse("https://uit.example.com/uapi/").unwrap();
        AuthSession::new(
            Arc::new(transport),
            store,
            Credentials::new("my-id", "my-secret"),
            AuthSettings::new(&api, 5000).unwrap(),
        )
        .with_state("0123abcd")
    }

    fn record(expiry_from_now: i64) -> TokenRecord {
        TokenRecord {
            system_id: "narwhal".to_owned(),
            access_token: "old-access".to_owned(),
            refresh_token: "old-refresh".to_owned(),
            expiry: Utc::now() + Duration::seconds(expiry_from_now),
            refresh_expiry: Some(Utc::now() + Duration::days(1)),
        }
    }

    const GRANT: &str = r#"{
        "access_token": "new-access",
        "refresh_token": "new-refresh",
        "access_token_expires_on": "2099-01-01T00:00:00Z",
        "refresh_token_expires_on": "2099-01-02T00:00:00"
    }"#;

    #[test]
    fn authorization_url_has_no_secret() {
        let session = session(MockHttpTransport::new(), Default::default());
        let url = session.build_authorization_url();

        assert_eq!(url, session.build_authorization_url());
        assert_eq!("/uapi/authorize", url.path());
        let query = url.query_pairs().collect::<HashMap<_, _>>();
        assert_eq!("my-id", query["client_id"]);
        assert_eq!("UIT", query["scope"]);
        assert_eq!("0123abcd", query["state"]);
        assert_eq!("http://localhost:5000/save_token", query["redirect_uri"]);
        assert!(!url.as_str().contains("my-secret"));
    }

    #[test]
    fn generated_state_is_hex() {
        let api = Url::parse("https://uit.example.com/uapi/").unwrap();
        let session = AuthSession::new(
            Arc::new(MockHttpTransport::new()),
            Arc::new(MemoryStore::default()),
            Credentials::new("id", "secret"),
            AuthSettings::new(&api, 5000).unwrap(),
        );
        assert_eq!(32, session.state().len());
        assert!(session.state().chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[tokio::test]
    async fn stored_token_skips_network() {
        let mut transport = MockHttpTransport::new();
        transport.expect_send().never();
        let store = Arc::new(MemoryStore::default());
        store.save(&record(3600)).await.unwrap();

        let session = session(transport, store);
        let got = session.authenticate("narwhal", &callback(None)).await.unwrap();
        assert_eq!("old-access", got.access_token);
    }

    #[tokio::test]
    async fn full_flow_exchanges_and_persists() {
        let mut transport = MockHttpTransport::new();
        transport
            .expect_send()
            .times(1)
            .withf(|r| {
                r.url.path() == "/uapi/token"
                    && r.field("code") == Some("abc")
                    && r.field("client_secret") == Some("my-secret")
                    && r.field("state") == Some("0123abcd")
            })
            .returning(|_| Ok(HttpResponse::new(200, GRANT)));
        let store = Arc::new(MemoryStore::default());

        let session = session(transport, store.clone());
        let got = session
            .authenticate("narwhal", &callback(Some("0123abcd")))
            .await
            .unwrap();

        assert_eq!("new-access", got.access_token);
        assert_eq!(Utc.with_ymd_and_hms(2099, 1, 1, 0, 0, 0).unwrap(), got.expiry);
        assert_eq!(
            Some(Utc.with_ymd_and_hms(2099, 1, 2, 0, 0, 0).unwrap()),
            got.refresh_expiry
        );
        assert_eq!(Some(got), store.load("narwhal").await.unwrap());
    }

    #[tokio::test]
    async fn state_mismatch_is_rejected() {
        let mut transport = MockHttpTransport::new();
        transport.expect_send().never();

        let session = session(transport, Default::default());
        let err = session
            .authenticate("narwhal", &callback(Some("forged")))
            .await
            .unwrap_err();
        assert!(matches!(err, UitError::Auth(AuthError::StateMismatch)));
    }

    #[tokio::test]
    async fn rejected_exchange() {
        let mut transport = MockHttpTransport::new();
        transport
            .expect_send()
            .returning(|_| Ok(HttpResponse::new(400, "invalid code")));
        let store = Arc::new(MemoryStore::default());

        let session = session(transport, store.clone());
        let err = session.exchange_code("narwhal", "bad").await.unwrap_err();
        assert!(matches!(
            err,
            UitError::Auth(AuthError::Rejected { status: 400, .. })
        ));
        assert_eq!(None, store.load("narwhal").await.unwrap());
    }

    #[tokio::test]
    async fn expired_token_is_refreshed() {
        let mut transport = MockHttpTransport::new();
        transport
            .expect_send()
            .times(1)
            .withf(|r| {
                r.field("grant_type") == Some("refresh_token")
                    && r.field("refresh_token") == Some("old-refresh")
            })
            .returning(|_| {
                Ok(HttpResponse::new(
                    200,
                    r#"{"access_token": "fresh", "expires_in": 3600}"#,
                ))
            });
        let store = Arc::new(MemoryStore::default());

        let session = session(transport, store.clone());
        let stale = record(-10);
        let got = session.refresh_if_needed(stale.clone()).await.unwrap();

        assert_eq!("fresh", got.access_token);
        assert_eq!("old-refresh", got.refresh_token);
        assert_eq!(stale.refresh_expiry, got.refresh_expiry);
        assert!(got.expiry > Utc::now());
        assert_eq!(Some(got), store.load("narwhal").await.unwrap());
    }

    #[tokio::test]
    async fn out_of_range_lifetime_is_malformed() {
        let mut transport = MockHttpTransport::new();
        transport.expect_send().times(2).returning(|request| {
            let body = match request.field("grant_type") {
                Some("refresh_token") => {
                    r#"{"access_token": "x", "expires_in": 9223372036854775807}"#
                }
                _ => r#"{"access_token": "x", "expires_in": 60, "refresh_expires_in": -9223372036854775808}"#,
            };
            Ok(HttpResponse::new(200, body))
        });
        let store = Arc::new(MemoryStore::default());
        let session = session(transport, store.clone());

        let err = session.refresh_if_needed(record(-10)).await.unwrap_err();
        assert!(matches!(err, UitError::Auth(AuthError::MalformedResponse(_))));
        let err = session.exchange_code("narwhal", "abc").await.unwrap_err();
        assert!(matches!(err, UitError::Auth(AuthError::MalformedResponse(_))));
        assert_eq!(None, store.load("narwhal").await.unwrap());
    }

    #[tokio::test]
    async fn token_within_margin_is_refreshed() {
        let mut transport = MockHttpTransport::new();
        transport
            .expect_send()
            .times(1)
            .returning(|_| Ok(HttpResponse::new(200, GRANT)));

        let session = session(transport, Default::default());
        let got = session.refresh_if_needed(record(30)).await.unwrap();
        assert_eq!("new-refresh", got.refresh_token);
    }

    #[tokio::test]
    async fn valid_token_is_untouched() {
        let mut transport = MockHttpTransport::new();
        transport.expect_send().never();

        let session = session(transport, Default::default());
        let valid = record(3600);
        assert_eq!(valid, session.refresh_if_needed(valid.clone()).await.unwrap());
    }

    #[tokio::test]
    async fn dead_refresh_token_fails_without_network() {
        let mut transport = MockHttpTransport::new();
        transport.expect_send().never();

        let session = session(transport, Default::default());
        let mut stale = record(-10);
        stale.refresh_expiry = Some(Utc::now() - Duration::seconds(1));
        let err = session.refresh_if_needed(stale).await.unwrap_err();
        assert!(matches!(err, UitError::Auth(AuthError::RefreshExpired { .. })));
    }

    #[tokio::test]
    async fn rejected_refresh_falls_back_to_full_flow() {
        let mut transport = MockHttpTransport::new();
        transport
            .expect_send()
            .times(1)
            .withf(|r| r.field("grant_type") == Some("refresh_token"))
            .returning(|_| Ok(HttpResponse::new(401, "revoked")));
        transport
            .expect_send()
            .times(1)
            .withf(|r| r.field("code") == Some("abc"))
            .returning(|_| Ok(HttpResponse::new(200, GRANT)));
        let store = Arc::new(MemoryStore::default());
        store.save(&record(-10)).await.unwrap();

        let session = session(transport, store);
        let got = session.authenticate("narwhal", &callback(None)).await.unwrap();
        assert_eq!("new-access", got.access_token);
    }

    #[tokio::test]
    async fn clear_is_idempotent() {
        let store = Arc::new(MemoryStore::default());
        store.save(&record(3600)).await.unwrap();
        let session = session(MockHttpTransport::new(), store);

        session.clear_tokens(Some("narwhal")).await.unwrap();
        session.clear_tokens(Some("narwhal")).await.unwrap();
        session.clear_tokens(None).await.unwrap();
        assert_eq!(None, session.cached_token("narwhal").await.unwrap());
    }

    #[test]
    fn instants() {
        let expected = Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 0).unwrap();
        assert_eq!(expected, parse_instant("2024-05-01T12:30:00Z").unwrap());
        assert_eq!(expected, parse_instant("2024-05-01T14:30:00+02:00").unwrap());
        assert_eq!(expected, parse_instant("2024-05-01T12:30:00.000").unwrap());
        assert!(parse_instant("yesterday").is_err());
    }
}

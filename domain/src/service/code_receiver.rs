use url::Url;

use crate::error::AuthError;

/// What the authorization server handed back through the redirect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationCallback {
    pub code: String,
    /// Absent when the user pasted a bare code.
    pub state: Option<String>,
}

/// Shows the authorization URL to the user and waits for the redirected code.
#[async_trait::async_trait]
pub trait AuthorizationCodeReceiver: Send + Sync {
    async fn receive(&self, authorization_url: &Url) -> Result<AuthorizationCallback, AuthError>;
}

use std::path::PathBuf;

use bytes::Bytes;
use serde::de::DeserializeOwned;
use url::Url;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    Empty,
    Form(Vec<(String, String)>),
    Json(serde_json::Value),
    /// Form fields plus a single file part.
    Multipart {
        fields: Vec<(String, String)>,
        file_field: String,
        file: PathBuf,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub method: Method,
    pub url: Url,
    /// Sent as the UIT+ auth header when present.
    pub auth_token: Option<String>,
    pub body: RequestBody,
}

impl HttpRequest {
    pub fn get(url: Url) -> Self {
        Self {
            method: Method::Get,
            url,
            auth_token: None,
            body: RequestBody::Empty,
        }
    }

    pub fn post(url: Url, body: RequestBody) -> Self {
        Self {
            method: Method::Post,
            url,
            auth_token: None,
            body,
        }
    }

    pub fn form<K: Into<String>, V: Into<String>>(
        url: Url,
        fields: impl IntoIterator<Item = (K, V)>,
    ) -> Self {
        let fields = fields.into_iter().map(|(k, v)| (k.into(), v.into())).collect();
        Self::post(url, RequestBody::Form(fields))
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    /// Value of a form or multipart field.
    pub fn field(&self, name: &str) -> Option<&str> {
        let fields = match &self.body {
            RequestBody::Form(fields) | RequestBody::Multipart { fields, .. } => fields,
            _ => return None,
        };
        fields.iter().find(|(k, _)| k == name).map(|(_, v)| v.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Bytes,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn json<T: DeserializeOwned>(&self) -> serde_json::Result<T> {
        serde_json::from_slice(&self.body)
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// The HTTP client the library talks through.
#[cfg_attr(any(test, feature = "mock"), mockall::automock)]
#[async_trait::async_trait]
pub trait HttpTransport: Send + Sync {
    async fn send(&self, request: HttpRequest) -> anyhow::Result<HttpResponse>;
    /// Streams the response body into `dest` and returns the status code.
    /// Nothing is written for a non-success status.
    async fn download(&self, request: HttpRequest, dest: PathBuf) -> anyhow::Result<u16>;
}

#[cfg(test)]
mod tests {
    use url::Url;

    use super::{HttpRequest, HttpResponse};

    #[test]
    fn form_fields() {
        let url = Url::parse("https://example.com/token").unwrap();
        let request = HttpRequest::form(url, [("code", "abc"), ("scope", "UIT")]).with_token("t");
        assert_eq!(Some("abc"), request.field("code"));
        assert_eq!(None, request.field("state"));
        assert_eq!(Some("t"), request.auth_token.as_deref());
    }

    #[test]
    fn response_status() {
        assert!(HttpResponse::new(204, "").is_success());
        assert!(!HttpResponse::new(401, "denied").is_success());
        assert_eq!("denied", HttpResponse::new(401, "denied").text());
    }
}

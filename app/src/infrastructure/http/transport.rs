use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context};
use domain::service::{HttpRequest, HttpResponse, HttpTransport, Method, RequestBody};
use futures::StreamExt;
use reqwest::header::CONTENT_TYPE;
use reqwest::multipart::{Form, Part};
use reqwest_middleware::{ClientWithMiddleware, RequestBuilder};
use reqwest_retry::policies::ExponentialBackoff;
use tokio::io::AsyncWriteExt;
use typed_builder::TypedBuilder;

use super::middleware::{MiddlewareMenu, RetryOnError, RetryStreamClient};

pub const UIT_AUTH_HEADER: &str = "x-uit-auth-token";

#[derive(Debug, Clone, TypedBuilder)]
pub struct TransportOptions {
    /// PEM bundle trusted in addition to the system roots.
    #[builder(default, setter(strip_option))]
    pub ca_file: Option<PathBuf>,
    #[builder(default = Duration::from_secs(120))]
    pub timeout: Duration,
    #[builder(default = 1)]
    pub retries: u32,
}

/// [`HttpTransport`] over `reqwest`, with retries and per-attempt timeouts.
pub struct ReqwestTransport {
    client: ClientWithMiddleware,
    stream_client: RetryStreamClient<ExponentialBackoff, RetryOnError>,
}

impl ReqwestTransport {
    pub fn new(options: &TransportOptions) -> anyhow::Result<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(ca_file) = &options.ca_file {
            let pem = std::fs::read(ca_file)
                .with_context(|| format!("cannot read CA bundle {}", ca_file.display()))?;
            for cert in reqwest::Certificate::from_pem_bundle(&pem)? {
                builder = builder.add_root_certificate(cert);
            }
        }
        let base = builder.build()?;

        let client = MiddlewareMenu::builder()
            .client(base.clone())
            .retries(options.retries)
            .timeout(options.timeout)
            .build()
            .make();
        let policy = ExponentialBackoff::builder().build_with_max_retries(options.retries);
        let stream_client = RetryStreamClient::new(
            MiddlewareMenu::builder()
                .client(base)
                .timeout(options.timeout)
                .build()
                .make(),
            policy,
            RetryOnError,
        );

        Ok(Self {
            client,
            stream_client,
        })
    }

    fn prepare(&self, request: HttpRequest) -> anyhow::Result<RequestBuilder> {
        let HttpRequest {
            method,
            url,
            auth_token,
            body,
        } = request;

        let builder = match method {
            Method::Get => self.client.get(url),
            Method::Post => self.client.post(url),
        };
        let builder = with_token(builder, auth_token.as_deref());
        Ok(match body {
            RequestBody::Empty => builder,
            RequestBody::Form(fields) => builder.form(&fields),
            RequestBody::Json(value) => builder
                .header(CONTENT_TYPE, "application/json")
                .body(serde_json::to_vec(&value)?),
            RequestBody::Multipart { .. } => bail!("multipart bodies are sent by `send_multipart`"),
        })
    }

    async fn send_multipart(
        &self,
        url: url::Url,
        auth_token: Option<String>,
        fields: Vec<(String, String)>,
        file_field: String,
        file: PathBuf,
    ) -> anyhow::Result<reqwest::Response> {
        let buf = tokio::fs::read(&file)
            .await
            .with_context(|| format!("cannot read {}", file.display()))?;
        let file_name = file
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();

        let response = self
            .stream_client
            .execute(|client| {
                let form = fields
                    .iter()
                    .fold(Form::new(), |form, (k, v)| form.text(k.clone(), v.clone()))
                    .part(
                        file_field.clone(),
                        Part::bytes(buf.clone()).file_name(file_name.clone()),
                    );
                let request = with_token(client.post(url.clone()), auth_token.as_deref())
                    .multipart(form);
                async move { request.send().await }
            })
            .await?;
        Ok(response)
    }
}

fn with_token(builder: RequestBuilder, token: Option<&str>) -> RequestBuilder {
    match token {
        Some(token) => builder.header(UIT_AUTH_HEADER, token),
        None => builder,
    }
}

#[async_trait::async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: HttpRequest) -> anyhow::Result<HttpResponse> {
        let response = match request.body {
            RequestBody::Multipart {
                fields,
                file_field,
                file,
            } => {
                self.send_multipart(request.url, request.auth_token, fields, file_field, file)
                    .await?
            }
            _ => self.prepare(request)?.send().await?,
        };

        let status = response.status().as_u16();
        let body = response.bytes().await?;
        tracing::trace!(status, len = body.len(), "Received response");
        Ok(HttpResponse { status, body })
    }

    async fn download(&self, request: HttpRequest, dest: PathBuf) -> anyhow::Result<u16> {
        let response = self.prepare(request)?.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Ok(status.as_u16());
        }

        let mut file = tokio::fs::File::create(&dest)
            .await
            .with_context(|| format!("cannot create {}", dest.display()))?;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            file.write_all(&chunk?).await?;
        }
        file.flush().await?;
        Ok(status.as_u16())
    }
}

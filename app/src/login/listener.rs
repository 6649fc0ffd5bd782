use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Mutex;
use std::time::Duration;

use colored::Colorize;
use domain::error::AuthError;
use domain::service::{AuthorizationCallback, AuthorizationCodeReceiver};
use indoc::indoc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use url::Url;

use super::counter::{counter, recover_cursor};

pub const CALLBACK_PATH: &str = "/save_token";

const SUCCESS_PAGE: &str = indoc! {"
    <!doctype html>
    <title>UIT Authentication Succeeded</title>
    <h1>UIT Authentication Succeeded!</h1>
    <h2>You may close this window and return to your terminal.</h2>
"};

const FAILURE_PAGE: &str = indoc! {"
    <!doctype html>
    <title>UIT Authentication Failed</title>
    <h1>UIT Authentication Failed</h1>
    <h2>Return to your terminal for details.</h2>
"};

/// Receives the authorization redirect on `127.0.0.1:<port>`.
///
/// The socket only exists for the duration of one [`receive`] call and is
/// closed once a code arrives, the timeout passes, or accepting fails.
///
/// [`receive`]: AuthorizationCodeReceiver::receive
pub struct CallbackListener {
    port: u16,
    timeout: Duration,
    show_countdown: bool,
    bound: Mutex<Option<oneshot::Sender<SocketAddr>>>,
}

enum Handled {
    /// Anything other than the callback path, e.g. `/favicon.ico`.
    Ignored,
    Callback(Result<AuthorizationCallback, AuthError>),
}

impl CallbackListener {
    pub fn new(port: u16, timeout: Duration) -> Self {
        Self {
            port,
            timeout,
            show_countdown: true,
            bound: Mutex::new(None),
        }
    }

    /// Skips the terminal countdown.
    pub fn quiet(mut self) -> Self {
        self.show_countdown = false;
        self
    }

    /// Reports the bound address once the socket is listening.
    pub fn notify_bound(self, tx: oneshot::Sender<SocketAddr>) -> Self {
        *self.bound.lock().unwrap_or_else(|e| e.into_inner()) = Some(tx);
        self
    }

    async fn accept_callback(
        &self,
        listener: TcpListener,
    ) -> Result<AuthorizationCallback, AuthError> {
        loop {
            let (stream, peer) = listener.accept().await.map_err(AuthError::Listener)?;
            match handle(stream).await {
                Ok(Handled::Callback(callback)) => return callback,
                Ok(Handled::Ignored) => tracing::debug!(%peer, "Ignored request"),
                Err(e) => tracing::warn!(%peer, "Bad callback request: {e}"),
            }
        }
    }
}

#[async_trait::async_trait]
impl AuthorizationCodeReceiver for CallbackListener {
    async fn receive(&self, authorization_url: &Url) -> Result<AuthorizationCallback, AuthError> {
        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, self.port))
            .await
            .map_err(AuthError::Listener)?;
        let local = listener.local_addr().map_err(AuthError::Listener)?;
        if let Some(tx) = self.bound.lock().unwrap_or_else(|e| e.into_inner()).take() {
            let _ = tx.send(local);
        }

        println!(
            "Please visit the following URL to authorize this client:\n{}",
            authorization_url.as_str().cyan()
        );

        let timed_out = AuthError::Timeout(self.timeout);
        if !self.show_countdown {
            return tokio::time::timeout(self.timeout, self.accept_callback(listener))
                .await
                .map_err(|_| timed_out)?;
        }

        let result = tokio::select! {
            done = counter(self.timeout.as_secs()) => {
                done.map_err(AuthError::Listener)?;
                Err(timed_out)
            }
            callback = self.accept_callback(listener) => callback,
        };
        recover_cursor().map_err(AuthError::Listener)?;
        println!();
        result
    }
}

async fn handle(stream: TcpStream) -> std::io::Result<Handled> {
    let mut stream = BufReader::new(stream);
    let mut request_line = String::new();
    stream.read_line(&mut request_line).await?;
    // drain headers
    let mut header = String::new();
    while stream.read_line(&mut header).await? > 2 {
        header.clear();
    }

    let target = request_line.split_whitespace().nth(1).unwrap_or("/");
    let Ok(url) = Url::parse("http://localhost").and_then(|base| base.join(target)) else {
        respond(stream.get_mut(), "400 Bad Request", "").await?;
        return Ok(Handled::Ignored);
    };
    if url.path() != CALLBACK_PATH {
        respond(stream.get_mut(), "404 Not Found", "").await?;
        return Ok(Handled::Ignored);
    }

    let callback = callback_from_query(&url);
    let page = if callback.is_ok() { SUCCESS_PAGE } else { FAILURE_PAGE };
    respond(stream.get_mut(), "200 OK", page).await?;
    Ok(Handled::Callback(callback))
}

/// Reads `code`, `state` and `error` from a redirect URL.
pub(super) fn callback_from_query(url: &Url) -> Result<AuthorizationCallback, AuthError> {
    let mut code = None;
    let mut state = None;
    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "code" => code = Some(value.into_owned()),
            "state" => state = Some(value.into_owned()),
            "error" => return Err(AuthError::Denied(value.into_owned())),
            _ => {}
        }
    }
    match code {
        Some(code) if !code.is_empty() => Ok(AuthorizationCallback { code, state }),
        _ => Err(AuthError::MissingCode),
    }
}

async fn respond(stream: &mut TcpStream, status: &str, body: &str) -> std::io::Result<()> {
    let response = format!(
        "HTTP/1.1 {status}\r\nContent-Type: text/html; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    );
    stream.write_all(response.as_bytes()).await?;
    stream.shutdown().await
}

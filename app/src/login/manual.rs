use std::time::Duration;

use colored::Colorize;
use domain::error::AuthError;
use domain::service::{AuthorizationCallback, AuthorizationCodeReceiver};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Stdin};
use tokio::sync::Mutex;
use url::Url;

use super::listener::callback_from_query;

/// Asks the user to paste the code, or the whole redirect URL, after
/// authorizing in a browser on another machine.
pub struct ManualCodeEntry<R> {
    input: Mutex<R>,
    timeout: Duration,
}

impl ManualCodeEntry<BufReader<Stdin>> {
    pub fn stdin(timeout: Duration) -> Self {
        Self::new(BufReader::new(tokio::io::stdin()), timeout)
    }
}

impl<R> ManualCodeEntry<R> {
    pub fn new(input: R, timeout: Duration) -> Self {
        Self {
            input: Mutex::new(input),
            timeout,
        }
    }
}

#[async_trait::async_trait]
impl<R> AuthorizationCodeReceiver for ManualCodeEntry<R>
where
    R: AsyncBufRead + Unpin + Send,
{
    async fn receive(&self, authorization_url: &Url) -> Result<AuthorizationCallback, AuthError> {
        println!(
            "Please visit the following URL to authorize this client:\n{}",
            authorization_url.as_str().cyan()
        );
        println!("Then paste the code, or the URL you were redirected to:");

        let mut line = String::new();
        let mut input = self.input.lock().await;
        tokio::time::timeout(self.timeout, input.read_line(&mut line))
            .await
            .map_err(|_| AuthError::Timeout(self.timeout))?
            .map_err(AuthError::Listener)?;

        parse_pasted(line.trim())
    }
}

fn parse_pasted(text: &str) -> Result<AuthorizationCallback, AuthError> {
    if text.is_empty() {
        return Err(AuthError::MissingCode);
    }
    match Url::parse(text) {
        Ok(url) if url.query().is_some() => callback_from_query(&url),
        _ => Ok(AuthorizationCallback {
            code: text.to_owned(),
            state: None,
        }),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use domain::error::AuthError;
    use domain::service::AuthorizationCodeReceiver;
    use url::Url;

    use super::ManualCodeEntry;

    fn url() -> Url {
        Url::parse("https://uit.example/uapi/authorize").unwrap()
    }

    #[tokio::test]
    async fn bare_code() {
        let entry = ManualCodeEntry::new(&b"  abc123 \n"[..], Duration::from_secs(1));
        let callback = entry.receive(&url()).await.unwrap();
        assert_eq!("abc123", callback.code);
        assert_eq!(None, callback.state);
    }

    #[tokio::test]
    async fn redirect_url() {
        let entry = ManualCodeEntry::new(
            &b"http://localhost:5000/save_token?code=xyz&state=st\n"[..],
            Duration::from_secs(1),
        );
        let callback = entry.receive(&url()).await.unwrap();
        assert_eq!("xyz", callback.code);
        assert_eq!(Some("st"), callback.state.as_deref());
    }

    #[tokio::test]
    async fn empty_input() {
        let entry = ManualCodeEntry::new(&b""[..], Duration::from_secs(1));
        let err = entry.receive(&url()).await.unwrap_err();
        assert!(matches!(err, AuthError::MissingCode));
    }
}

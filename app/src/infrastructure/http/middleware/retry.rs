use std::future::Future;

use chrono::Utc;
use reqwest::Response;
use reqwest_middleware::ClientWithMiddleware;
use reqwest_retry::{
    default_on_request_failure, default_on_request_success, RetryPolicy, Retryable,
    RetryableStrategy,
};
use retry_policies::RetryDecision;

/// Retries transport failures and timeouts. Status codes are left to
/// [`default_on_request_success`], so server errors are retried and client
/// errors are not.
pub struct RetryOnError;

impl RetryableStrategy for RetryOnError {
    fn handle(&self, res: &reqwest_middleware::Result<Response>) -> Option<Retryable> {
        match res {
            // `TimeoutMiddleware` fails with `Error::Middleware`, which
            // [`reqwest_retry::DefaultRetryableStrategy`] treats as fatal.
            Err(reqwest_middleware::Error::Middleware(_)) => Some(Retryable::Transient),
            Err(e @ reqwest_middleware::Error::Reqwest(_)) => default_on_request_failure(e),
            Ok(resp) => default_on_request_success(resp),
        }
    }
}

/// **(Not a middleware)**
/// [`reqwest_retry::RetryTransientMiddleware`] clones each request before
/// sending, which fails for multipart bodies (see [`reqwest::Request::try_clone`]).
/// This client takes a closure that builds and sends the request, and calls it
/// again for each retry.
pub struct RetryStreamClient<T, R> {
    base: ClientWithMiddleware,
    retry_policy: T,
    retryable_strategy: R,
}

impl<T, R> RetryStreamClient<T, R>
where
    T: RetryPolicy,
    R: RetryableStrategy,
{
    pub fn new(client: ClientWithMiddleware, retry_policy: T, retryable_strategy: R) -> Self {
        Self {
            base: client,
            retry_policy,
            retryable_strategy,
        }
    }

    /// Sends through `send` until the result isn't transient or the policy
    /// gives up.
    pub async fn execute<'a, F, Res>(&'a self, send: F) -> reqwest_middleware::Result<Response>
    where
        F: Fn(&'a ClientWithMiddleware) -> Res,
        Res: Future<Output = reqwest_middleware::Result<Response>>,
    {
        let mut n_past_retries = 0;
        loop {
            let result = send(&self.base).await;

            break match self.retryable_strategy.handle(&result) {
                Some(Retryable::Transient) => {
                    let retry_decision = self.retry_policy.should_retry(n_past_retries);
                    if let RetryDecision::Retry { execute_after } = retry_decision {
                        let duration = (execute_after - Utc::now())
                            .to_std()
                            .map_err(reqwest_middleware::Error::middleware)?;
                        tracing::warn!(
                            attempt = n_past_retries + 1,
                            "Upload failed, retrying in {duration:?}"
                        );
                        tokio::time::sleep(duration).await;

                        n_past_retries += 1;
                        continue;
                    } else {
                        result
                    }
                }
                Some(_) | None => result,
            };
        }
    }
}

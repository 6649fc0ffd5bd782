mod retry;
mod timeout;

use std::time::Duration;

use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::{policies::ExponentialBackoff, RetryTransientMiddleware};
use typed_builder::TypedBuilder;

#[rustfmt::skip]
pub use self::{
    retry::{RetryOnError, RetryStreamClient},
    timeout::TimeoutMiddleware,
};

#[derive(TypedBuilder)]
pub struct MiddlewareMenu {
    client: reqwest::Client,
    #[builder(default, setter(strip_option))]
    retries: Option<u32>,
    timeout: Duration,
}

impl MiddlewareMenu {
    pub fn make(self) -> ClientWithMiddleware {
        let Self {
            client,
            retries,
            timeout,
        } = self;

        /*
         * Retry must be attached before Timeout, so that every attempt
         * gets its own deadline.
         *
         * Requests with a multipart body can't be cloned, don't send them
         * through Retry. Use [`RetryStreamClient`] instead.
         */

        let cb = ClientBuilder::new(client);
        let cb = if let Some(retries) = retries {
            let policy = ExponentialBackoff::builder().build_with_max_retries(retries);
            let mdw = RetryTransientMiddleware::new_with_policy_and_strategy(policy, RetryOnError);
            cb.with(mdw)
        } else {
            cb
        };

        cb.with(TimeoutMiddleware::new(timeout)).build()
    }
}

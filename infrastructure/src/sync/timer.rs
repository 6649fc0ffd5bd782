use std::future::Future;
use std::ops::ControlFlow;
use std::time::Duration;

/// Runs `f` once per `interval`, starting immediately, until it breaks.
pub async fn poll<T, F, Fut>(interval: Duration, mut f: F) -> T
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ControlFlow<T>>,
{
    let mut interval = tokio::time::interval(interval);

    loop {
        interval.tick().await;

        if let ControlFlow::Break(ret) = f().await {
            break ret;
        }
    }
}

pub async fn poll_fn<T, F>(interval: Duration, mut f: F) -> T
where
    F: FnMut() -> ControlFlow<T>,
{
    let mut interval = tokio::time::interval(interval);

    loop {
        interval.tick().await;

        if let ControlFlow::Break(ret) = f() {
            break ret;
        }
    }
}

/// Calls `f` with `from`, `from - 1`, …, `0`, one call per `interval`.
/// Stops early on the first error.
pub async fn countdown<E, F>(from: u64, interval: Duration, mut f: F) -> Result<(), E>
where
    F: FnMut(u64) -> Result<(), E>,
{
    let mut remaining = from;
    poll_fn(interval, || {
        if let Err(e) = f(remaining) {
            return ControlFlow::Break(Err(e));
        }
        if remaining == 0 {
            ControlFlow::Break(Ok(()))
        } else {
            remaining -= 1;
            ControlFlow::Continue(())
        }
    })
    .await
}

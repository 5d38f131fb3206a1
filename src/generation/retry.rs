use std::{sync::Arc, time::Duration};

use futures::{future::BoxFuture, FutureExt};
use log::{info, warn};

use super::{GenerationError, GenerationProvider, GenerationRequest};

/// Waits off the UI thread. Injected so tests can observe backoff without sleeping.
pub trait Delay: Send + Sync {
    fn wait(&self, duration: Duration) -> BoxFuture<'static, ()>;
}

pub struct ThreadDelay;

impl Delay for ThreadDelay {
    fn wait(&self, duration: Duration) -> BoxFuture<'static, ()> {
        let (tx, rx) = futures::channel::oneshot::channel();
        std::thread::spawn(move || {
            std::thread::sleep(duration);
            let _ = tx.send(());
        });
        async move {
            let _ = rx.await;
        }
        .boxed()
    }
}

/// Retries rate limited requests with linear backoff. Other failures are final.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay_ms: 2000,
        }
    }
}

impl RetryPolicy {
    /// Wait before retry number `retry` (starting at 1). A provider hint
    /// can lengthen but never shorten it.
    pub fn delay_for(&self, retry: u32, error: &GenerationError) -> Duration {
        let backoff = Duration::from_millis(self.base_delay_ms.saturating_mul(retry as u64));
        match error {
            GenerationError::RateLimited {
                retry_after: Some(hint),
            } => backoff.max(*hint),
            _ => backoff,
        }
    }
}

pub fn generate_with_retry(
    provider: Arc<dyn GenerationProvider>,
    request: GenerationRequest,
    policy: RetryPolicy,
    delay: Arc<dyn Delay>,
) -> BoxFuture<'static, Result<Vec<u8>, GenerationError>> {
    async move {
        let mut retry = 0;
        loop {
            match provider.generate(request.clone()).await {
                Ok(bytes) => {
                    info!("{} returned {} bytes", provider.name(), bytes.len());
                    return Ok(bytes);
                }
                Err(e) if e.is_retryable() && retry < policy.max_retries => {
                    retry += 1;
                    let wait = policy.delay_for(retry, &e);
                    warn!(
                        "{} rate limited, retry {retry}/{} in {wait:?}",
                        provider.name(),
                        policy.max_retries
                    );
                    delay.wait(wait).await;
                }
                Err(e) => {
                    warn!("{} failed: {e}", provider.name());
                    return Err(e);
                }
            }
        }
    }
    .boxed()
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use futures::executor::block_on;

    use super::*;
    use crate::generation::{ArtStyle, Capabilities, Quality};

    struct Scripted(Mutex<Vec<Result<Vec<u8>, GenerationError>>>, Mutex<usize>);

    impl GenerationProvider for Scripted {
        fn name(&self) -> &str {
            "scripted"
        }

        fn capabilities(&self) -> Capabilities {
            Capabilities::default()
        }

        fn generate(&self, _request: GenerationRequest) -> BoxFuture<'static, Result<Vec<u8>, GenerationError>> {
            *self.1.lock().unwrap() += 1;
            let next = self.0.lock().unwrap().remove(0);
            async move { next }.boxed()
        }
    }

    #[derive(Default)]
    struct Recorded(Mutex<Vec<Duration>>);

    impl Delay for Recorded {
        fn wait(&self, duration: Duration) -> BoxFuture<'static, ()> {
            self.0.lock().unwrap().push(duration);
            async {}.boxed()
        }
    }

    fn request() -> GenerationRequest {
        GenerationRequest {
            image: None,
            style: ArtStyle::Cartoon,
            quality: Quality::Standard,
            instructions: String::new(),
            references: vec![],
        }
    }

    fn run(script: Vec<Result<Vec<u8>, GenerationError>>) -> (Result<Vec<u8>, GenerationError>, usize, Vec<Duration>) {
        let provider = Arc::new(Scripted(Mutex::new(script), Mutex::new(0)));
        let delay = Arc::new(Recorded::default());
        let result = block_on(generate_with_retry(
            provider.clone(),
            request(),
            RetryPolicy::default(),
            delay.clone(),
        ));
        let calls = *provider.1.lock().unwrap();
        let waits = delay.0.lock().unwrap().clone();
        (result, calls, waits)
    }

    #[test]
    fn rate_limit_is_retried_twice_with_growing_delay() {
        let limited = || Err(GenerationError::RateLimited { retry_after: None });
        let (result, calls, waits) = run(vec![limited(), limited(), limited()]);
        assert_eq!(Err(GenerationError::RateLimited { retry_after: None }), result);
        assert_eq!(3, calls);
        assert_eq!(vec![Duration::from_secs(2), Duration::from_secs(4)], waits);
    }

    #[test]
    fn success_after_rate_limit() {
        let (result, calls, waits) = run(vec![
            Err(GenerationError::RateLimited { retry_after: None }),
            Ok(vec![1, 2, 3]),
        ]);
        assert_eq!(Ok(vec![1, 2, 3]), result);
        assert_eq!(2, calls);
        assert_eq!(vec![Duration::from_secs(2)], waits);
    }

    #[test]
    fn other_failures_surface_immediately() {
        let (result, calls, waits) = run(vec![Err(GenerationError::ContentBlocked)]);
        assert_eq!(Err(GenerationError::ContentBlocked), result);
        assert_eq!(1, calls);
        assert!(waits.is_empty());
    }

    #[test]
    fn provider_hint_extends_backoff() {
        let policy = RetryPolicy::default();
        let hinted = GenerationError::RateLimited {
            retry_after: Some(Duration::from_secs(10)),
        };
        let short_hint = GenerationError::RateLimited {
            retry_after: Some(Duration::from_millis(10)),
        };
        assert_eq!(Duration::from_secs(10), policy.delay_for(1, &hinted));
        assert_eq!(Duration::from_secs(4), policy.delay_for(2, &short_hint));
    }
}

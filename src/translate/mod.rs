mod openai;

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use thiserror::Error;
use tokio::time::sleep;
use tracing::{info, warn};

pub use openai::ChatTranslator;

pub const DEFAULT_PLACEHOLDER: &str = "[translation failed]";

#[derive(Debug, Error)]
pub enum TranslateError {
    #[error("rate limited by translation service")]
    RateLimited { retry_after: Option<Duration> },

    #[error("translation request failed: {0}")]
    Request(String),

    #[error("invalid translation response: {0}")]
    InvalidResponse(String),
}

pub type TranslateFuture<'a> =
    Pin<Box<dyn Future<Output = Result<Vec<String>, TranslateError>> + Send + 'a>>;

/// Translates a batch of strings, returning one output per input, in order.
pub trait BatchTranslator: Send + Sync {
    fn name(&self) -> &str;
    fn translate_batch<'a>(&'a self, texts: &'a [String]) -> TranslateFuture<'a>;
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retries after the first rate-limited attempt.
    pub max_retries: usize,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub placeholder: String,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(60),
            placeholder: DEFAULT_PLACEHOLDER.to_string(),
        }
    }
}

/// Translates the whole batch or nothing.
///
/// Rate limits are retried with exponential backoff up to
/// `policy.max_retries` times. Any other failure, an exhausted retry budget,
/// or a reply of the wrong length yields the placeholder for every input.
pub async fn translate_or_placeholder(
    translator: &dyn BatchTranslator,
    texts: &[String],
    policy: &RetryPolicy,
) -> Vec<String> {
    if texts.is_empty() {
        return Vec::new();
    }
    let placeholders = || vec![policy.placeholder.clone(); texts.len()];

    let mut retries = 0usize;
    let mut delay = policy.base_delay;
    loop {
        match translator.translate_batch(texts).await {
            Ok(translated) if translated.len() == texts.len() => {
                info!("{} translated {} bubbles", translator.name(), texts.len());
                return translated;
            }
            Ok(translated) => {
                warn!(
                    "{} returned {} translations for {} inputs",
                    translator.name(),
                    translated.len(),
                    texts.len()
                );
                return placeholders();
            }
            Err(TranslateError::RateLimited { retry_after }) if retries < policy.max_retries => {
                retries += 1;
                let wait = retry_after
                    .map(|after| after.min(policy.max_delay))
                    .map_or(delay, |after| after.max(delay));
                warn!(
                    "{} rate limited; retrying in {:.1}s (attempt {}/{})",
                    translator.name(),
                    wait.as_secs_f32(),
                    retries,
                    policy.max_retries
                );
                sleep(wait).await;
                delay = delay.saturating_mul(2).min(policy.max_delay);
            }
            Err(err) => {
                warn!("{}: {}", translator.name(), err);
                return placeholders();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    enum Reply {
        RateLimited,
        RateLimitedFor(u64),
        Fail,
        Echo,
        Short,
    }

    struct Scripted {
        replies: Mutex<Vec<Reply>>,
        calls: AtomicUsize,
    }

    impl Scripted {
        fn new(mut replies: Vec<Reply>) -> Self {
            replies.reverse();
            Self {
                replies: Mutex::new(replies),
                calls: AtomicUsize::new(0),
            }
        }
    }

    impl BatchTranslator for Scripted {
        fn name(&self) -> &str {
            "scripted"
        }

        fn translate_batch<'a>(&'a self, texts: &'a [String]) -> TranslateFuture<'a> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let reply = self.replies.lock().unwrap().pop().unwrap_or(Reply::Echo);
            Box::pin(async move {
                match reply {
                    Reply::RateLimited => Err(TranslateError::RateLimited { retry_after: None }),
                    Reply::RateLimitedFor(secs) => Err(TranslateError::RateLimited {
                        retry_after: Some(Duration::from_secs(secs)),
                    }),
                    Reply::Fail => Err(TranslateError::Request("boom".to_string())),
                    Reply::Echo => Ok(texts.iter().map(|t| format!("EN:{}", t)).collect()),
                    Reply::Short => Ok(vec!["only one".to_string()]),
                }
            })
        }
    }

    fn inputs() -> Vec<String> {
        vec!["おはよう".to_string(), "またね".to_string()]
    }

    #[tokio::test(start_paused = true)]
    async fn retries_rate_limits_with_doubling_delays() {
        let translator = Scripted::new(vec![
            Reply::RateLimited,
            Reply::RateLimited,
            Reply::RateLimited,
            Reply::Echo,
        ]);
        let started = tokio::time::Instant::now();
        let out = translate_or_placeholder(&translator, &inputs(), &RetryPolicy::default()).await;
        let elapsed = started.elapsed();
        assert_eq!(out, vec!["EN:おはよう", "EN:またね"]);
        assert_eq!(translator.calls.load(Ordering::SeqCst), 4);
        assert!(elapsed >= Duration::from_secs(14));
        assert!(elapsed < Duration::from_secs(15));
    }

    #[tokio::test(start_paused = true)]
    async fn retry_after_extends_the_wait_up_to_the_cap() {
        let translator = Scripted::new(vec![
            Reply::RateLimitedFor(5),
            Reply::RateLimitedFor(1),
            Reply::RateLimitedFor(600),
            Reply::Echo,
        ]);
        let policy = RetryPolicy {
            max_delay: Duration::from_secs(30),
            ..RetryPolicy::default()
        };
        let started = tokio::time::Instant::now();
        let out = translate_or_placeholder(&translator, &inputs(), &policy).await;
        let elapsed = started.elapsed();
        assert_eq!(out, vec!["EN:おはよう", "EN:またね"]);
        // 5s (header over 2s), 4s (backoff over 1s), 30s (capped header)
        assert!(elapsed >= Duration::from_secs(39));
        assert!(elapsed < Duration::from_secs(40));
    }

    #[tokio::test(start_paused = true)]
    async fn backoff_delay_stops_at_max_delay() {
        let translator = Scripted::new(vec![
            Reply::RateLimited,
            Reply::RateLimited,
            Reply::RateLimited,
            Reply::Echo,
        ]);
        let policy = RetryPolicy {
            max_delay: Duration::from_secs(3),
            ..RetryPolicy::default()
        };
        let started = tokio::time::Instant::now();
        translate_or_placeholder(&translator, &inputs(), &policy).await;
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(8));
        assert!(elapsed < Duration::from_secs(9));
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_three_retries() {
        let translator = Scripted::new(vec![
            Reply::RateLimited,
            Reply::RateLimited,
            Reply::RateLimited,
            Reply::RateLimited,
            Reply::Echo,
        ]);
        let out = translate_or_placeholder(&translator, &inputs(), &RetryPolicy::default()).await;
        assert_eq!(out, vec![DEFAULT_PLACEHOLDER; 2]);
        assert_eq!(translator.calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn other_failures_are_not_retried() {
        let translator = Scripted::new(vec![Reply::Fail, Reply::Echo]);
        let out = translate_or_placeholder(&translator, &inputs(), &RetryPolicy::default()).await;
        assert_eq!(out, vec![DEFAULT_PLACEHOLDER; 2]);
        assert_eq!(translator.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn partial_replies_become_placeholders() {
        let translator = Scripted::new(vec![Reply::Short]);
        let policy = RetryPolicy {
            placeholder: "???".to_string(),
            ..RetryPolicy::default()
        };
        let out = translate_or_placeholder(&translator, &inputs(), &policy).await;
        assert_eq!(out, vec!["???", "???"]);
    }

    #[tokio::test]
    async fn empty_batch_skips_the_service() {
        let translator = Scripted::new(vec![]);
        let out = translate_or_placeholder(&translator, &[], &RetryPolicy::default()).await;
        assert!(out.is_empty());
        assert_eq!(translator.calls.load(Ordering::SeqCst), 0);
    }
}

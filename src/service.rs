//! Answers one prompt while respecting rate limits and reusing cached answers.
//!
//! Every request walks the same states in order: rate check, cache lookup, upstream call.  Each
//! can end the request early; none is visited twice.

use crate::{
    cache::TtlCache,
    config::Config,
    helper::truncate,
    llm::{Generate, UpstreamError},
    rate_limit::{Admission, FixedWindowLimiter},
    retry::{RetryAttempt, RetryError, RetryPolicy},
};
use sha2::{Digest, Sha256};
use std::{sync::Arc, time::Duration};

/// Guild key shared by all direct messages
const DIRECT_MESSAGE_KEY: &str = "dm";

/// One prompt, extracted from a chat message.
pub struct Request {
    pub author_id: String,
    /// None for direct messages
    pub guild_id: Option<String>,
    pub prompt: String,
}

impl Request {
    /// None if there is nothing to ask, i.e. the prompt is empty or only whitespace.
    pub fn new(author_id: String, guild_id: Option<String>, prompt: String) -> Option<Self> {
        if prompt.trim().is_empty() {
            return None;
        }
        Some(Self {
            author_id,
            guild_id,
            prompt,
        })
    }
}

#[derive(Debug)]
pub enum RequestResult {
    Success(String),
    CachedHit(String),
    RateLimited { cooldown: Duration },
    UpstreamFailed(RetryError),
}

impl RequestResult {
    /// Text to show the user.  Upstream failure details stay out of the chat.
    pub fn reply_text(&self, max_chars: usize) -> String {
        match self {
            RequestResult::Success(text) | RequestResult::CachedHit(text) => {
                truncate(text, max_chars).into_owned()
            }
            RequestResult::RateLimited { cooldown } => {
                let seconds = cooldown.as_secs() + u64::from(cooldown.subsec_nanos() > 0);
                format!(
                    "You're sending requests too quickly. Please try again in {} second{}.",
                    seconds,
                    if seconds == 1 { "" } else { "s" }
                )
            }
            RequestResult::UpstreamFailed(_) => {
                "Sorry, I couldn't come up with an answer right now. Please try again later."
                    .to_owned()
            }
        }
    }
}

pub struct Orchestrator {
    upstream: Arc<dyn Generate>,
    system_prompt: String,
    cache: Option<(TtlCache<String>, Duration)>,
    limiters: Option<Limiters>,
    retry: RetryPolicy,
    attempt_timeout: Duration,
}

struct Limiters {
    user: FixedWindowLimiter,
    guild: FixedWindowLimiter,
}

impl Orchestrator {
    pub fn new(cfg: &Config, upstream: Arc<dyn Generate>) -> Self {
        let cache = cfg
            .cache
            .enabled
            .then(|| (TtlCache::new(), Duration::from_secs(cfg.cache.ttl_seconds)));

        let window = Duration::from_secs(cfg.rate_limit.window_seconds);
        let limiters = cfg.rate_limit.enabled.then(|| Limiters {
            user: FixedWindowLimiter::new(cfg.rate_limit.user_max, window),
            guild: FixedWindowLimiter::new(cfg.rate_limit.guild_max, window),
        });

        Self {
            upstream,
            system_prompt: cfg.llm.system.clone(),
            cache,
            limiters,
            retry: RetryPolicy::new(
                cfg.llm.max_retries,
                Duration::from_millis(cfg.llm.base_delay_ms),
            ),
            attempt_timeout: Duration::from_secs(cfg.llm.timeout_seconds),
        }
    }

    pub async fn handle(&self, request: &Request) -> RequestResult {
        let guild_key = request.guild_id.as_deref().unwrap_or(DIRECT_MESSAGE_KEY);

        if let Some(cooldown) = self.rate_check(&request.author_id, guild_key) {
            return RequestResult::RateLimited { cooldown };
        }

        let key = cache_key(&self.system_prompt, &request.prompt);
        if let Some((cache, _)) = &self.cache {
            if let Some(cached) = cache.get(&key) {
                tracing::debug!(user = %request.author_id, "cache hit");
                return RequestResult::CachedHit(cached);
            }
        }

        let mut attempts = 0;
        let result = self
            .retry
            .execute(
                || self.generate_once(&request.prompt),
                |attempt| {
                    attempts = attempt.attempt;
                    log_attempt(&request.author_id, attempt);
                },
            )
            .await;

        match result {
            Ok(response) => {
                tracing::info!(
                    user = %request.author_id,
                    guild = %guild_key,
                    attempts,
                    "got LLM response"
                );
                if let Some((cache, ttl)) = &self.cache {
                    cache.set(key, response.clone(), *ttl);
                }
                RequestResult::Success(response)
            }
            Err(e) => {
                tracing::error!(
                    user = %request.author_id,
                    guild = %guild_key,
                    error = %e,
                    "LLM request failed"
                );
                RequestResult::UpstreamFailed(e)
            }
        }
    }

    /// Empties the response cache, returning how many entries it held.
    pub fn clear_cache(&self) -> usize {
        match &self.cache {
            Some((cache, _)) => {
                let cleared = cache.len();
                cache.clear();
                cleared
            }
            None => 0,
        }
    }

    /// Consults both limiters.  Returns the longer cooldown if either denies.  A request only
    /// counts against the limits when both admit it.
    fn rate_check(&self, user_key: &str, guild_key: &str) -> Option<Duration> {
        let limiters = self.limiters.as_ref()?;

        let user = limiters.user.check(user_key);
        let guild = match user {
            Admission::Admitted => {
                let guild = limiters.guild.check(guild_key);
                if guild != Admission::Admitted {
                    limiters.user.refund(user_key);
                }
                guild
            }
            Admission::Denied { .. } => limiters.guild.peek(guild_key),
        };

        let mut cooldown = None;
        if let Admission::Denied { retry_after } = user {
            tracing::warn!(user = %user_key, cooldown_s = retry_after.as_secs_f64(), "user rate limited");
            cooldown = Some(retry_after);
        }
        if let Admission::Denied { retry_after } = guild {
            tracing::warn!(guild = %guild_key, cooldown_s = retry_after.as_secs_f64(), "guild rate limited");
            cooldown = cooldown.max(Some(retry_after));
        }
        cooldown
    }

    async fn generate_once(&self, prompt: &str) -> Result<String, UpstreamError> {
        tokio::time::timeout(
            self.attempt_timeout,
            self.upstream.generate(prompt, &self.system_prompt),
        )
        .await
        .unwrap_or(Err(UpstreamError::Timeout))
    }
}

fn log_attempt(user: &str, attempt: &RetryAttempt<'_>) {
    match (attempt.error, attempt.delay_before_next) {
        (None, _) => tracing::debug!(user = %user, attempt = attempt.attempt, "upstream call succeeded"),
        (Some(error), Some(delay)) => tracing::warn!(
            user = %user,
            attempt = attempt.attempt,
            error = %error,
            retry_in_ms = delay.as_millis() as u64,
            "upstream call failed, retrying"
        ),
        (Some(error), None) => tracing::warn!(
            user = %user,
            attempt = attempt.attempt,
            error = %error,
            retryable = error.is_retryable(),
            "upstream call failed, giving up"
        ),
    }
}

/// Identical questions under the same system prompt share an answer.  Surrounding and repeated
/// whitespace does not make a question different.
pub fn cache_key(system_prompt: &str, prompt: &str) -> String {
    let normalized = prompt.split_whitespace().collect::<Vec<_>>().join(" ");

    let mut hasher = Sha256::new();
    hasher.update(system_prompt.as_bytes());
    hasher.update([0u8]);
    hasher.update(normalized.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    /// Plays back scripted results, then answers by echoing the prompt.
    #[derive(Default)]
    struct FakeLlm {
        calls: AtomicU32,
        script: Mutex<Vec<Result<String, UpstreamError>>>,
        delay: Option<Duration>,
    }

    impl FakeLlm {
        fn scripted(script: Vec<Result<String, UpstreamError>>) -> Self {
            Self {
                script: Mutex::new(script.into_iter().rev().collect()),
                ..Default::default()
            }
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[serenity::async_trait]
    impl Generate for FakeLlm {
        async fn generate(
            &self,
            prompt: &str,
            _system_prompt: &str,
        ) -> Result<String, UpstreamError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            let scripted = self.script.lock().unwrap().pop();
            scripted.unwrap_or_else(|| Ok(format!("answer to {}", prompt)))
        }
    }

    fn config() -> Config {
        let mut cfg = Config::default();
        cfg.llm.base_delay_ms = 10;
        cfg
    }

    fn orchestrator(cfg: &Config, llm: &Arc<FakeLlm>) -> Orchestrator {
        Orchestrator::new(cfg, llm.clone())
    }

    fn request(user: &str, guild: Option<&str>, prompt: &str) -> Request {
        Request::new(
            user.to_owned(),
            guild.map(str::to_owned),
            prompt.to_owned(),
        )
        .unwrap()
    }

    #[test]
    fn blank_prompt_makes_no_request() {
        assert!(Request::new("u1".into(), None, String::new()).is_none());
        assert!(Request::new("u1".into(), None, " \n\t ".into()).is_none());
        assert!(Request::new("u1".into(), None, "hi".into()).is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn first_request_calls_upstream() {
        let llm = Arc::new(FakeLlm::default());
        let service = orchestrator(&config(), &llm);

        let result = service.handle(&request("u1", Some("g1"), "hello")).await;
        assert!(matches!(result, RequestResult::Success(ref s) if s == "answer to hello"));
        assert_eq!(llm.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn repeated_prompt_is_served_from_cache() {
        let llm = Arc::new(FakeLlm::default());
        let service = orchestrator(&config(), &llm);

        service.handle(&request("u1", Some("g1"), "hello")).await;
        let result = service
            .handle(&request("u2", Some("g2"), "  hello  "))
            .await;

        assert!(matches!(result, RequestResult::CachedHit(ref s) if s == "answer to hello"));
        assert_eq!(llm.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cached_answer_expires_after_ttl() {
        let llm = Arc::new(FakeLlm::default());
        let mut cfg = config();
        cfg.cache.ttl_seconds = 60;
        let service = orchestrator(&cfg, &llm);

        service.handle(&request("u1", None, "hello")).await;
        tokio::time::advance(Duration::from_secs(61)).await;
        let result = service.handle(&request("u1", None, "hello")).await;

        assert!(matches!(result, RequestResult::Success(_)));
        assert_eq!(llm.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn disabled_cache_always_calls_upstream() {
        let llm = Arc::new(FakeLlm::default());
        let mut cfg = config();
        cfg.cache.enabled = false;
        let service = orchestrator(&cfg, &llm);

        service.handle(&request("u1", None, "hello")).await;
        service.handle(&request("u1", None, "hello")).await;
        assert_eq!(llm.calls(), 2);
        assert_eq!(service.clear_cache(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn sixth_request_in_a_minute_is_rate_limited() {
        let llm = Arc::new(FakeLlm::default());
        let service = orchestrator(&config(), &llm);

        for i in 0..5 {
            let result = service
                .handle(&request("u1", Some("g1"), &format!("question {}", i)))
                .await;
            assert!(matches!(result, RequestResult::Success(_)));
        }

        let result = service.handle(&request("u1", Some("g1"), "question 5")).await;
        match result {
            RequestResult::RateLimited { cooldown } => assert!(cooldown > Duration::ZERO),
            other => panic!("expected rate limiting, got {:?}", other),
        }
        assert_eq!(llm.calls(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn rate_limit_applies_before_cache() {
        let llm = Arc::new(FakeLlm::default());
        let mut cfg = config();
        cfg.rate_limit.user_max = 1;
        let service = orchestrator(&cfg, &llm);

        service.handle(&request("u1", Some("g1"), "hello")).await;
        let result = service.handle(&request("u1", Some("g1"), "hello")).await;
        assert!(matches!(result, RequestResult::RateLimited { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn guild_limit_spans_users() {
        let llm = Arc::new(FakeLlm::default());
        let mut cfg = config();
        cfg.rate_limit.guild_max = 2;
        let service = orchestrator(&cfg, &llm);

        assert!(matches!(
            service.handle(&request("u1", Some("g1"), "a")).await,
            RequestResult::Success(_)
        ));
        assert!(matches!(
            service.handle(&request("u2", Some("g1"), "b")).await,
            RequestResult::Success(_)
        ));
        assert!(matches!(
            service.handle(&request("u3", Some("g1"), "c")).await,
            RequestResult::RateLimited { .. }
        ));
        // Another guild is unaffected
        assert!(matches!(
            service.handle(&request("u3", Some("g2"), "c")).await,
            RequestResult::Success(_)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn denied_requests_do_not_use_up_the_other_limit() {
        let llm = Arc::new(FakeLlm::default());
        let service = orchestrator(&config(), &llm);

        // 5 answered, 15 denied by the user limit
        for i in 0..20 {
            service
                .handle(&request("spammer", Some("g1"), &format!("spam {}", i)))
                .await;
        }
        assert_eq!(llm.calls(), 5);
        assert!(matches!(
            service.handle(&request("bystander", Some("g1"), "hello")).await,
            RequestResult::Success(_)
        ));

        // The other way round: a full guild does not eat into a user's own allowance.
        let mut cfg = config();
        cfg.rate_limit.guild_max = 1;
        let service = orchestrator(&cfg, &llm);
        service.handle(&request("u1", Some("g2"), "a")).await;
        for _ in 0..10 {
            assert!(matches!(
                service.handle(&request("u2", Some("g2"), "b")).await,
                RequestResult::RateLimited { .. }
            ));
        }
        assert!(matches!(
            service.handle(&request("u2", Some("g3"), "b")).await,
            RequestResult::Success(_)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn longer_cooldown_wins() {
        let llm = Arc::new(FakeLlm::default());
        let mut cfg = config();
        cfg.rate_limit.user_max = 1;
        cfg.rate_limit.guild_max = 1;
        let service = orchestrator(&cfg, &llm);

        // Guild window starts now, user u2's window starts 30s later.
        service.handle(&request("u1", Some("g1"), "a")).await;
        tokio::time::advance(Duration::from_secs(30)).await;
        service.handle(&request("u2", Some("g2"), "b")).await;

        let result = service.handle(&request("u2", Some("g1"), "c")).await;
        match result {
            RequestResult::RateLimited { cooldown } => {
                assert_eq!(cooldown, Duration::from_secs(60))
            }
            other => panic!("expected rate limiting, got {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failures_are_retried() {
        let llm = Arc::new(FakeLlm::scripted(vec![
            Err(UpstreamError::Timeout),
            Err(UpstreamError::ConnectionFailure("reset".into())),
        ]));
        let service = orchestrator(&config(), &llm);

        let result = service.handle(&request("u1", None, "hello")).await;
        assert!(matches!(result, RequestResult::Success(_)));
        assert_eq!(llm.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn fatal_failure_is_reported_without_retry() {
        let llm = Arc::new(FakeLlm::scripted(vec![Err(UpstreamError::Api {
            status: 403,
            message: "forbidden".into(),
        })]));
        let service = orchestrator(&config(), &llm);

        let result = service.handle(&request("u1", None, "hello")).await;
        assert!(matches!(
            result,
            RequestResult::UpstreamFailed(RetryError::Fatal { .. })
        ));
        assert_eq!(llm.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn failures_are_not_cached() {
        let llm = Arc::new(FakeLlm::scripted(vec![
            Err(UpstreamError::Timeout),
            Err(UpstreamError::Timeout),
            Err(UpstreamError::Timeout),
        ]));
        let service = orchestrator(&config(), &llm);

        let result = service.handle(&request("u1", None, "hello")).await;
        assert!(matches!(
            result,
            RequestResult::UpstreamFailed(RetryError::Exhausted { attempts: 3, .. })
        ));

        let result = service.handle(&request("u1", None, "hello")).await;
        assert!(matches!(result, RequestResult::Success(_)));
        assert_eq!(llm.calls(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_upstream_times_out_each_attempt() {
        let llm = Arc::new(FakeLlm {
            delay: Some(Duration::from_secs(120)),
            ..Default::default()
        });
        let service = orchestrator(&config(), &llm);

        let result = service.handle(&request("u1", None, "hello")).await;
        match result {
            RequestResult::UpstreamFailed(RetryError::Exhausted { attempts, last }) => {
                assert_eq!(attempts, 3);
                assert_eq!(last, UpstreamError::Timeout);
            }
            other => panic!("expected timeouts, got {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn clear_cache_reports_entries() {
        let llm = Arc::new(FakeLlm::default());
        let service = orchestrator(&config(), &llm);

        service.handle(&request("u1", None, "one")).await;
        service.handle(&request("u1", None, "two")).await;
        assert_eq!(service.clear_cache(), 2);

        service.handle(&request("u1", None, "one")).await;
        assert_eq!(llm.calls(), 3);
    }

    #[test]
    fn cache_key_normalizes_whitespace() {
        assert_eq!(
            cache_key("sys", "what   is\nrust?"),
            cache_key("sys", " what is rust? ")
        );
        assert_ne!(cache_key("sys", "what is rust?"), cache_key("sys", "what is go?"));
        assert_ne!(
            cache_key("sys a", "what is rust?"),
            cache_key("sys b", "what is rust?")
        );
    }

    #[test]
    fn reply_texts() {
        let limited = RequestResult::RateLimited {
            cooldown: Duration::from_millis(12_300),
        };
        assert_eq!(
            limited.reply_text(1900),
            "You're sending requests too quickly. Please try again in 13 seconds."
        );

        let failed = RequestResult::UpstreamFailed(RetryError::Fatal {
            attempt: 1,
            source: UpstreamError::Api {
                status: 401,
                message: "invalid api key sk-...".into(),
            },
        });
        let text = failed.reply_text(1900);
        assert!(text.starts_with("Sorry"));
        assert!(!text.contains("401"));

        let long = RequestResult::CachedHit("x".repeat(50));
        assert_eq!(long.reply_text(10), "xxxxxxx...");
    }
}

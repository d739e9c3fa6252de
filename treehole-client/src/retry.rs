use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{debug, error, info, warn};
use treehole_core::{CoreError, ForumApiError};

/// Configuration for retry behavior
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts, the first one included
    pub max_attempts: u32,
    /// Base delay for exponential backoff (in milliseconds)
    pub base_delay_ms: u64,
    /// Maximum delay between retries (in milliseconds)
    pub max_delay_ms: u64,
    /// Multiplier for exponential backoff
    pub backoff_multiplier: f64,
    /// Maximum jitter factor (0.0 to 1.0)
    pub jitter_factor: f64,
    /// Circuit breaker failure threshold
    pub failure_threshold: u32,
    /// Circuit breaker recovery timeout (in seconds)
    pub recovery_timeout_s: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1000,
            max_delay_ms: 30000,
            backoff_multiplier: 2.0,
            jitter_factor: 0.1,
            failure_threshold: 5,
            recovery_timeout_s: 60,
        }
    }
}

impl RetryConfig {
    pub fn treehole(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay_ms: 1000,
            max_delay_ms: 10000,
            backoff_multiplier: 2.0,
            jitter_factor: 0.2,
            failure_threshold: 5,
            recovery_timeout_s: 60,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CircuitBreakerState {
    Closed,   // Normal operation
    Open,     // Blocking requests
    HalfOpen, // Testing recovery
}

#[derive(Debug)]
pub struct CircuitBreaker {
    state: CircuitBreakerState,
    failure_count: u32,
    last_failure_time: Option<Instant>,
    config: RetryConfig,
}

impl CircuitBreaker {
    pub fn new(config: RetryConfig) -> Self {
        Self {
            state: CircuitBreakerState::Closed,
            failure_count: 0,
            last_failure_time: None,
            config,
        }
    }

    pub fn allow_request(&mut self) -> bool {
        match self.state {
            CircuitBreakerState::Closed | CircuitBreakerState::HalfOpen => true,
            CircuitBreakerState::Open => {
                let recovery = Duration::from_secs(self.config.recovery_timeout_s);
                match self.last_failure_time {
                    Some(last_failure) if last_failure.elapsed() >= recovery => {
                        debug!("Circuit breaker transitioning to half-open for recovery test");
                        self.state = CircuitBreakerState::HalfOpen;
                        true
                    }
                    _ => false,
                }
            }
        }
    }

    pub fn record_success(&mut self) {
        if self.state == CircuitBreakerState::HalfOpen {
            info!("Circuit breaker recovery successful, returning to closed state");
            self.state = CircuitBreakerState::Closed;
            self.last_failure_time = None;
        }
        self.failure_count = 0;
    }

    pub fn record_failure(&mut self) {
        self.failure_count += 1;
        self.last_failure_time = Some(Instant::now());

        match self.state {
            CircuitBreakerState::Closed => {
                if self.failure_count >= self.config.failure_threshold {
                    warn!(
                        "Circuit breaker opening due to {} consecutive failures",
                        self.failure_count
                    );
                    self.state = CircuitBreakerState::Open;
                }
            }
            CircuitBreakerState::HalfOpen => {
                warn!("Circuit breaker recovery failed, returning to open state");
                self.state = CircuitBreakerState::Open;
            }
            CircuitBreakerState::Open => {}
        }
    }

    pub fn get_state(&self) -> CircuitBreakerState {
        self.state.clone()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RetryStrategy {
    Retry,
    RetryWithDelay(Duration),
    NoRetry,
}

pub fn get_retry_strategy(error: &CoreError) -> RetryStrategy {
    match error {
        CoreError::ForumApi(forum_error) => match forum_error {
            ForumApiError::RateLimitExceeded { retry_after } => {
                RetryStrategy::RetryWithDelay(Duration::from_secs(*retry_after))
            }
            ForumApiError::ServerError { .. } => RetryStrategy::Retry,
            ForumApiError::RequestTimeout => RetryStrategy::Retry,
            // A body that failed to decode is usually a truncated transfer
            ForumApiError::InvalidResponse { .. } => RetryStrategy::Retry,
            ForumApiError::InvalidToken
            | ForumApiError::Forbidden { .. }
            | ForumApiError::Upstream { .. } => RetryStrategy::NoRetry,
        },
        CoreError::Network(reqwest_error) => {
            if reqwest_error.is_timeout() || reqwest_error.is_connect() {
                RetryStrategy::Retry
            } else {
                RetryStrategy::NoRetry
            }
        }
        _ => RetryStrategy::NoRetry,
    }
}

/// Exponential backoff with jitter, capped at `max_delay_ms`.
pub fn calculate_delay(attempt: u32, config: &RetryConfig) -> Duration {
    let max_delay = Duration::from_millis(config.max_delay_ms);

    let multiplier = config.backoff_multiplier.powi(attempt as i32);
    let delay_ms = ((config.base_delay_ms as f64 * multiplier) as u64).min(config.max_delay_ms);
    let exponential_delay = Duration::from_millis(delay_ms);

    let jitter_range = (exponential_delay.as_millis() as f64 * config.jitter_factor) as u64;
    let jitter = fastrand::u64(0..=jitter_range);

    (exponential_delay + Duration::from_millis(jitter)).min(max_delay)
}

#[derive(Debug, Clone, Default)]
pub struct RetryMetrics {
    pub total_retries: u64,
    pub successful_retries: u64,
    pub failed_operations: u64,
    pub circuit_breaker_trips: u64,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Wraps forum calls with backoff retries and a circuit breaker.
#[derive(Debug)]
pub struct RetryExecutor {
    config: RetryConfig,
    circuit_breaker: Mutex<CircuitBreaker>,
    metrics: Mutex<RetryMetrics>,
}

impl RetryExecutor {
    pub fn new(config: RetryConfig) -> Self {
        let circuit_breaker = Mutex::new(CircuitBreaker::new(config.clone()));

        Self {
            config,
            circuit_breaker,
            metrics: Mutex::new(RetryMetrics::default()),
        }
    }

    pub async fn execute<F, Fut, T>(&self, operation_name: &str, operation: F) -> Result<T, CoreError>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<T, CoreError>>,
    {
        if !lock(&self.circuit_breaker).allow_request() {
            lock(&self.metrics).circuit_breaker_trips += 1;
            warn!(
                "Circuit breaker is open, blocking request for {}",
                operation_name
            );
            return Err(CoreError::Internal {
                message: "Circuit breaker is open".to_string(),
            });
        }

        let mut attempt = 0;
        loop {
            if attempt > 0 {
                debug!("Retry attempt {} for {}", attempt, operation_name);
            }

            let error = match operation().await {
                Ok(result) => {
                    lock(&self.circuit_breaker).record_success();
                    if attempt > 0 {
                        let mut metrics = lock(&self.metrics);
                        metrics.total_retries += attempt as u64;
                        metrics.successful_retries += 1;
                        info!(
                            "Operation {} succeeded after {} retries",
                            operation_name, attempt
                        );
                    }
                    return Ok(result);
                }
                Err(error) => error,
            };

            let has_attempts_left = attempt + 1 < self.config.max_attempts;
            let max_delay = Duration::from_millis(self.config.max_delay_ms);
            let delay = match get_retry_strategy(&error) {
                RetryStrategy::Retry if has_attempts_left => calculate_delay(attempt, &self.config),
                // A server-requested wait longer than max_delay fails the call instead
                RetryStrategy::RetryWithDelay(delay) if has_attempts_left && delay <= max_delay => {
                    delay
                }
                _ => {
                    // Upstream "success: false" answers are not transport faults
                    if !matches!(error, CoreError::ForumApi(ForumApiError::Upstream { .. })) {
                        lock(&self.circuit_breaker).record_failure();
                    }
                    let mut metrics = lock(&self.metrics);
                    metrics.total_retries += attempt as u64;
                    metrics.failed_operations += 1;
                    error!(
                        "Operation {} failed after {} attempts: {}",
                        operation_name,
                        attempt + 1,
                        error
                    );
                    return Err(error);
                }
            };

            info!("Retrying {} in {:?} due to: {}", operation_name, delay, error);
            sleep(delay).await;
            attempt += 1;
        }
    }

    pub fn get_metrics(&self) -> RetryMetrics {
        lock(&self.metrics).clone()
    }

    pub fn get_circuit_breaker_state(&self) -> CircuitBreakerState {
        lock(&self.circuit_breaker).get_state()
    }
}

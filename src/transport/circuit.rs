//! Per-host circuit breaker (spec §4.3, §4.10).

use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;
use tokio::sync::Mutex;

use crate::config::CircuitBreakerConfig;
use crate::error::Error;
use crate::observability::Clock;

#[derive(Debug, Clone)]
enum State {
    Closed { consecutive_failures: u32 },
    Open { until: Instant },
    HalfOpen { in_flight: u32 },
}

/// A permit that must be reported back via [`CircuitBreaker::on_success`]
/// or [`CircuitBreaker::on_failure`] once the guarded operation finishes.
pub struct Admission {
    host: String,
    was_half_open: bool,
}

pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    hosts: DashMap<String, Arc<Mutex<State>>>,
    clock: Arc<dyn Clock>,
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig, clock: Arc<dyn Clock>) -> Self {
        Self { config, hosts: DashMap::new(), clock }
    }

    fn state_for(&self, host: &str) -> Arc<Mutex<State>> {
        self.hosts
            .entry(host.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(State::Closed { consecutive_failures: 0 })))
            .clone()
    }

    /// Admits a call, or rejects immediately with [`Error::CircuitOpen`].
    /// The observe-decide-update sequence happens under one lock
    /// (spec §5 "state transitions MUST be atomic").
    pub async fn admit(&self, host: &str, context: &'static str) -> Result<Admission, Error> {
        let cell = self.state_for(host);
        let mut state = cell.lock().await;

        match &mut *state {
            State::Closed { .. } => Ok(Admission { host: host.to_string(), was_half_open: false }),
            State::Open { until } => {
                if self.clock.now() >= *until {
                    *state = State::HalfOpen { in_flight: 1 };
                    Ok(Admission { host: host.to_string(), was_half_open: true })
                } else {
                    Err(Error::CircuitOpen { context, host: host.to_string() })
                }
            }
            State::HalfOpen { in_flight } => {
                if *in_flight < self.config.max_half_open_requests {
                    *in_flight += 1;
                    Ok(Admission { host: host.to_string(), was_half_open: true })
                } else {
                    Err(Error::CircuitOpen { context, host: host.to_string() })
                }
            }
        }
    }

    pub async fn on_success(&self, admission: Admission) {
        let cell = self.state_for(&admission.host);
        let mut state = cell.lock().await;
        *state = State::Closed { consecutive_failures: 0 };
    }

    pub async fn on_failure(&self, admission: Admission) {
        let cell = self.state_for(&admission.host);
        let mut state = cell.lock().await;

        match &*state {
            State::Closed { consecutive_failures } => {
                let failures = consecutive_failures + 1;
                if failures >= self.config.max_failures {
                    *state = State::Open { until: self.clock.now() + self.config.timeout() };
                } else {
                    *state = State::Closed { consecutive_failures: failures };
                }
            }
            State::HalfOpen { .. } => {
                *state = State::Open { until: self.clock.now() + self.config.timeout() };
            }
            State::Open { .. } => {
                // Already open; another probe failing doesn't extend the window.
            }
        }
        let _ = admission.was_half_open;
    }

    #[cfg(test)]
    pub(crate) async fn is_open(&self, host: &str) -> bool {
        let cell = self.state_for(host);
        let state = cell.lock().await;
        matches!(&*state, State::Open { .. })
    }
}

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};

use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, Clone)]
pub struct BreakerConfig {
    /// Consecutive breaker-relevant failures before opening.
    pub failure_threshold: u32,
    /// Minimum dwell time in open before a probe is allowed.
    pub cooldown: Duration,
    /// Probe successes required to close from half-open.
    pub half_open_success_threshold: u32,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            cooldown: Duration::from_secs(30),
            half_open_success_threshold: 2,
        }
    }
}

/// Result of asking the breaker for admission at attempt time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Closed; proceed normally.
    Allowed,
    /// This call is the single half-open probe.
    Probe,
    /// Open (or a probe is already in flight); skip the candidate.
    Rejected,
}

/// Read-only availability, used by the balancer without state transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Availability {
    Available,
    /// Cooldown has elapsed; a probe would be admitted.
    ProbeDue,
    Open,
}

#[derive(Debug)]
struct Inner {
    state: BreakerState,
    failure_count: u32,
    success_count_in_half_open: u32,
    opened_at: Option<Instant>,
    cooldown_until: Option<Instant>,
    probe_in_flight: bool,
}

/// Per-(provider, model) three-state breaker. All transitions, including
/// claiming the single half-open probe, happen under one mutex.
#[derive(Debug)]
pub struct CircuitBreaker {
    key: (String, String),
    config: BreakerConfig,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    pub fn new(key: (String, String), config: BreakerConfig) -> Self {
        Self {
            key,
            config,
            inner: Mutex::new(Inner {
                state: BreakerState::Closed,
                failure_count: 0,
                success_count_in_half_open: 0,
                opened_at: None,
                cooldown_until: None,
                probe_in_flight: false,
            }),
        }
    }

    pub fn state(&self) -> BreakerState {
        self.inner.lock().expect("breaker lock").state
    }

    pub fn failure_count(&self) -> u32 {
        self.inner.lock().expect("breaker lock").failure_count
    }

    /// Peek without transitioning; selection uses this to omit open
    /// candidates and rank probe-due ones last.
    pub fn availability(&self) -> Availability {
        let inner = self.inner.lock().expect("breaker lock");
        match inner.state {
            BreakerState::Closed => Availability::Available,
            BreakerState::HalfOpen => {
                if inner.probe_in_flight {
                    Availability::Open
                } else {
                    Availability::ProbeDue
                }
            }
            BreakerState::Open => match inner.cooldown_until {
                Some(until) if Instant::now() >= until => Availability::ProbeDue,
                _ => Availability::Open,
            },
        }
    }

    /// Claim admission for one attempt. At most one caller receives `Probe`
    /// until that probe resolves via record_success/record_failure.
    pub fn try_acquire(&self) -> Admission {
        let mut inner = self.inner.lock().expect("breaker lock");
        match inner.state {
            BreakerState::Closed => Admission::Allowed,
            BreakerState::HalfOpen => {
                if inner.probe_in_flight {
                    Admission::Rejected
                } else {
                    inner.probe_in_flight = true;
                    Admission::Probe
                }
            }
            BreakerState::Open => {
                let due = inner
                    .cooldown_until
                    .is_some_and(|until| Instant::now() >= until);
                if due {
                    inner.state = BreakerState::HalfOpen;
                    inner.success_count_in_half_open = 0;
                    inner.probe_in_flight = true;
                    info!(
                        provider = %self.key.0,
                        model = %self.key.1,
                        "breaker half-open, probing"
                    );
                    Admission::Probe
                } else {
                    Admission::Rejected
                }
            }
        }
    }

    pub fn record_success(&self) {
        let mut inner = self.inner.lock().expect("breaker lock");
        match inner.state {
            BreakerState::Closed => inner.failure_count = 0,
            BreakerState::HalfOpen => {
                inner.probe_in_flight = false;
                inner.success_count_in_half_open += 1;
                if inner.success_count_in_half_open >= self.config.half_open_success_threshold {
                    inner.state = BreakerState::Closed;
                    inner.failure_count = 0;
                    inner.opened_at = None;
                    inner.cooldown_until = None;
                    info!(provider = %self.key.0, model = %self.key.1, "breaker closed");
                }
            }
            BreakerState::Open => {}
        }
    }

    pub fn record_failure(&self) {
        let mut inner = self.inner.lock().expect("breaker lock");
        match inner.state {
            BreakerState::Closed => {
                inner.failure_count += 1;
                if inner.failure_count >= self.config.failure_threshold {
                    Self::open(&mut inner, &self.config);
                    warn!(
                        provider = %self.key.0,
                        model = %self.key.1,
                        cooldown_secs = self.config.cooldown.as_secs(),
                        "breaker opened"
                    );
                }
            }
            BreakerState::HalfOpen => {
                inner.probe_in_flight = false;
                Self::open(&mut inner, &self.config);
                warn!(
                    provider = %self.key.0,
                    model = %self.key.1,
                    "probe failed, breaker reopened"
                );
            }
            BreakerState::Open => {}
        }
    }

    /// Release a claimed probe without recording an outcome (the attempt
    /// resolved with a client-attributable error, which must not move the
    /// breaker either way).
    pub fn abort_probe(&self) {
        let mut inner = self.inner.lock().expect("breaker lock");
        if inner.state == BreakerState::HalfOpen {
            inner.probe_in_flight = false;
        }
    }

    fn open(inner: &mut Inner, config: &BreakerConfig) {
        let now = Instant::now();
        inner.state = BreakerState::Open;
        inner.failure_count = 0;
        inner.success_count_in_half_open = 0;
        inner.probe_in_flight = false;
        inner.opened_at = Some(now);
        inner.cooldown_until = Some(now + config.cooldown);
    }
}

/// Process-wide breaker registry. Breakers reference adapters by key, not
/// by handle, and are created lazily on first use.
#[derive(Debug)]
pub struct BreakerMap {
    config: BreakerConfig,
    map: RwLock<HashMap<(String, String), Arc<CircuitBreaker>>>,
}

impl BreakerMap {
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            config,
            map: RwLock::new(HashMap::new()),
        }
    }

    pub fn get(&self, provider: &str, model: &str) -> Arc<CircuitBreaker> {
        if let Some(existing) = self
            .map
            .read()
            .expect("breaker map lock")
            .get(&(provider.to_string(), model.to_string()))
        {
            return existing.clone();
        }
        let mut guard = self.map.write().expect("breaker map lock");
        guard
            .entry((provider.to_string(), model.to_string()))
            .or_insert_with(|| {
                Arc::new(CircuitBreaker::new(
                    (provider.to_string(), model.to_string()),
                    self.config.clone(),
                ))
            })
            .clone()
    }
}

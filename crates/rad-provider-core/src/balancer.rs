use std::collections::HashMap;
use std::sync::Mutex;

use rand::Rng;

use rad_transform::UnifiedRequest;

use crate::breaker::{Availability, BreakerMap};
use crate::health::ErrorWindows;
use crate::inflight::InflightCounters;
use crate::routes::CandidateRoute;

/// Shared runtime state strategies may consult when scoring.
pub struct Observed<'a> {
    pub inflight: &'a InflightCounters,
    pub errors: &'a ErrorWindows,
    pub breakers: &'a BreakerMap,
}

/// One pluggable scoring dimension. Scores compose as a weighted sum; the
/// candidate ranked first is reported back through `on_selected`.
pub trait ScoreStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    fn score(
        &self,
        candidate: &CandidateRoute,
        request: &UnifiedRequest,
        observed: &Observed,
    ) -> f64;

    fn on_selected(&self, _selected: &CandidateRoute, _candidates: &[CandidateRoute]) {}
}

fn candidate_key(candidate: &CandidateRoute) -> (String, String) {
    (candidate.provider.clone(), candidate.provider_model.clone())
}

/// Smooth weighted round-robin: every scoring pass accrues `weight` credit,
/// the selected candidate pays back the round total. Higher credit ranks
/// earlier, so traffic interleaves proportionally to weight.
#[derive(Debug, Default)]
pub struct WeightedRoundRobin {
    credits: Mutex<HashMap<(String, String), f64>>,
}

impl WeightedRoundRobin {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ScoreStrategy for WeightedRoundRobin {
    fn name(&self) -> &'static str {
        "weighted_round_robin"
    }

    fn score(
        &self,
        candidate: &CandidateRoute,
        _request: &UnifiedRequest,
        _observed: &Observed,
    ) -> f64 {
        let mut credits = self.credits.lock().expect("wrr lock");
        let credit = credits.entry(candidate_key(candidate)).or_insert(0.0);
        *credit += candidate.weight as f64;
        // Normalized so one round of credit is ~1.0 for the heaviest peer.
        *credit / (candidate.weight.max(1) as f64)
    }

    fn on_selected(&self, selected: &CandidateRoute, candidates: &[CandidateRoute]) {
        let round_total: f64 = candidates
            .iter()
            .map(|candidate| candidate.weight as f64)
            .sum();
        let mut credits = self.credits.lock().expect("wrr lock");
        if let Some(credit) = credits.get_mut(&candidate_key(selected)) {
            *credit -= round_total;
        }
    }
}

/// Penalty proportional to in-flight requests against the candidate.
#[derive(Debug, Default)]
pub struct ConnectionAware;

impl ScoreStrategy for ConnectionAware {
    fn name(&self) -> &'static str {
        "connection_aware"
    }

    fn score(
        &self,
        candidate: &CandidateRoute,
        _request: &UnifiedRequest,
        observed: &Observed,
    ) -> f64 {
        let inflight = observed
            .inflight
            .count(&candidate.provider, &candidate.provider_model)
            .max(0) as f64;
        // Bounded to (-1, 0] so one busy candidate cannot dominate the sum.
        -(inflight / (inflight + 1.0))
    }
}

/// Penalty proportional to the recent error rate.
#[derive(Debug, Default)]
pub struct ErrorAware;

impl ScoreStrategy for ErrorAware {
    fn name(&self) -> &'static str {
        "error_aware"
    }

    fn score(
        &self,
        candidate: &CandidateRoute,
        _request: &UnifiedRequest,
        observed: &Observed,
    ) -> f64 {
        -observed
            .errors
            .error_rate(&candidate.provider, &candidate.provider_model)
    }
}

/// Open breaker sinks the candidate entirely; a probe-due breaker demotes
/// it so it is attempted only after healthy candidates.
#[derive(Debug, Default)]
pub struct BreakerAware;

impl ScoreStrategy for BreakerAware {
    fn name(&self) -> &'static str {
        "breaker_aware"
    }

    fn score(
        &self,
        candidate: &CandidateRoute,
        _request: &UnifiedRequest,
        observed: &Observed,
    ) -> f64 {
        match observed
            .breakers
            .get(&candidate.provider, &candidate.provider_model)
            .availability()
        {
            Availability::Available => 0.0,
            Availability::ProbeDue => -100.0,
            Availability::Open => f64::NEG_INFINITY,
        }
    }
}

/// Small random jitter so equal-score candidates rotate.
#[derive(Debug, Default)]
pub struct RandomTiebreak;

impl ScoreStrategy for RandomTiebreak {
    fn name(&self) -> &'static str {
        "random_tiebreak"
    }

    fn score(
        &self,
        _candidate: &CandidateRoute,
        _request: &UnifiedRequest,
        _observed: &Observed,
    ) -> f64 {
        rand::rng().random::<f64>() * 1e-3
    }
}

/// Composes strategies into `S = Σ wᵢ·sᵢ` and returns the top-K candidates.
/// Candidates with an open breaker are omitted, not demoted; ties break on
/// priority, then weight, then input order.
pub struct LoadBalancer {
    strategies: Vec<(f64, Box<dyn ScoreStrategy>)>,
}

impl LoadBalancer {
    pub fn new(strategies: Vec<(f64, Box<dyn ScoreStrategy>)>) -> Self {
        Self { strategies }
    }

    /// The default composition used by the gateway.
    pub fn standard(wrr_weight: f64, connection_weight: f64, error_weight: f64) -> Self {
        Self::new(vec![
            (wrr_weight, Box::new(WeightedRoundRobin::new())),
            (connection_weight, Box::new(ConnectionAware)),
            (error_weight, Box::new(ErrorAware)),
            (1.0, Box::new(BreakerAware)),
            (1.0, Box::new(RandomTiebreak)),
        ])
    }

    pub fn select(
        &self,
        request: &UnifiedRequest,
        candidates: Vec<CandidateRoute>,
        observed: &Observed,
        k: usize,
    ) -> Vec<CandidateRoute> {
        let mut scored: Vec<(f64, usize, CandidateRoute)> = candidates
            .iter()
            .enumerate()
            .map(|(position, candidate)| {
                let score: f64 = self
                    .strategies
                    .iter()
                    .map(|(weight, strategy)| weight * strategy.score(candidate, request, observed))
                    .sum();
                (score, position, candidate.clone())
            })
            .filter(|(score, _, _)| score.is_finite())
            .collect();

        scored.sort_by(|(score_a, position_a, a), (score_b, position_b, b)| {
            score_b
                .partial_cmp(score_a)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| b.priority.cmp(&a.priority))
                .then_with(|| b.weight.cmp(&a.weight))
                .then_with(|| position_a.cmp(position_b))
        });

        let selected: Vec<CandidateRoute> = scored
            .into_iter()
            .take(k.max(1))
            .map(|(_, _, candidate)| candidate)
            .collect();

        if let Some(first) = selected.first() {
            for (_, strategy) in &self.strategies {
                strategy.on_selected(first, &candidates);
            }
        }

        selected
    }
}

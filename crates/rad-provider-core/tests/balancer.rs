use std::time::Duration;

use rad_provider_core::{
    BreakerConfig, BreakerMap, CandidateRoute, ErrorWindows, InflightCounters, LoadBalancer,
    Observed,
};
use rad_transform::{ApiType, Message, Metadata, Parameters, Role, UnifiedRequest};

fn request(model: &str) -> UnifiedRequest {
    UnifiedRequest {
        api_type: ApiType::Chat,
        model: model.to_string(),
        messages: vec![Message::text(Role::User, "hi")],
        parameters: Parameters::default(),
        tools: Vec::new(),
        metadata: Metadata::default(),
    }
}

fn candidate(provider: &str, weight: u32, priority: i32) -> CandidateRoute {
    CandidateRoute {
        provider: provider.to_string(),
        provider_model: "m".to_string(),
        weight,
        priority,
    }
}

struct World {
    inflight: InflightCounters,
    errors: ErrorWindows,
    breakers: BreakerMap,
}

impl World {
    fn new() -> Self {
        Self {
            inflight: InflightCounters::new(),
            errors: ErrorWindows::new(),
            breakers: BreakerMap::new(BreakerConfig {
                failure_threshold: 1,
                cooldown: Duration::from_secs(60),
                half_open_success_threshold: 1,
            }),
        }
    }

    fn observed(&self) -> Observed<'_> {
        Observed {
            inflight: &self.inflight,
            errors: &self.errors,
            breakers: &self.breakers,
        }
    }
}

#[test]
fn returns_top_k_candidates() {
    let world = World::new();
    let balancer = LoadBalancer::standard(1.0, 1.0, 1.0);
    let candidates = vec![
        candidate("a", 1, 0),
        candidate("b", 1, 0),
        candidate("c", 1, 0),
    ];
    let selected = balancer.select(&request("m"), candidates, &world.observed(), 2);
    assert_eq!(selected.len(), 2);
}

#[test]
fn open_breaker_candidates_are_omitted() {
    let world = World::new();
    // One failure trips the breaker for provider "bad".
    world.breakers.get("bad", "m").record_failure();

    let balancer = LoadBalancer::standard(1.0, 1.0, 1.0);
    let candidates = vec![candidate("bad", 10, 10), candidate("good", 1, 0)];
    let selected = balancer.select(&request("m"), candidates, &world.observed(), 3);
    assert_eq!(selected.len(), 1);
    assert_eq!(selected[0].provider, "good");
}

#[test]
fn higher_priority_wins_ties() {
    let world = World::new();
    // Tiebreak-only composition keeps scores equal across candidates.
    let balancer = LoadBalancer::new(vec![]);
    let candidates = vec![
        candidate("low", 1, 0),
        candidate("high", 1, 5),
        candidate("mid", 1, 2),
    ];
    let selected = balancer.select(&request("m"), candidates, &world.observed(), 3);
    let providers: Vec<&str> = selected.iter().map(|c| c.provider.as_str()).collect();
    assert_eq!(providers, vec!["high", "mid", "low"]);
}

#[test]
fn weight_breaks_remaining_ties() {
    let world = World::new();
    let balancer = LoadBalancer::new(vec![]);
    let candidates = vec![candidate("light", 1, 0), candidate("heavy", 8, 0)];
    let selected = balancer.select(&request("m"), candidates, &world.observed(), 2);
    assert_eq!(selected[0].provider, "heavy");
}

#[test]
fn inflight_load_demotes_a_candidate() {
    let world = World::new();
    let _busy1 = world.inflight.acquire("busy", "m");
    let _busy2 = world.inflight.acquire("busy", "m");
    let _busy3 = world.inflight.acquire("busy", "m");

    // Connection-aware only, no jitter.
    let balancer = LoadBalancer::new(vec![(
        1.0,
        Box::new(rad_provider_core::ConnectionAware),
    )]);
    let candidates = vec![candidate("busy", 1, 0), candidate("idle", 1, 0)];
    let selected = balancer.select(&request("m"), candidates, &world.observed(), 2);
    assert_eq!(selected[0].provider, "idle");
}

#[test]
fn recent_errors_demote_a_candidate() {
    let world = World::new();
    for _ in 0..10 {
        world.errors.record("flaky", "m", false);
        world.errors.record("steady", "m", true);
    }
    let balancer = LoadBalancer::new(vec![(1.0, Box::new(rad_provider_core::ErrorAware))]);
    let candidates = vec![candidate("flaky", 1, 0), candidate("steady", 1, 0)];
    let selected = balancer.select(&request("m"), candidates, &world.observed(), 2);
    assert_eq!(selected[0].provider, "steady");
}

#[test]
fn weighted_round_robin_rotates_by_weight() {
    let world = World::new();
    let balancer = LoadBalancer::new(vec![(
        1.0,
        Box::new(rad_provider_core::WeightedRoundRobin::new()),
    )]);
    let candidates = vec![candidate("heavy", 3, 0), candidate("light", 1, 0)];

    let mut heavy_first = 0;
    for _ in 0..8 {
        let selected = balancer.select(&request("m"), candidates.clone(), &world.observed(), 1);
        if selected[0].provider == "heavy" {
            heavy_first += 1;
        }
    }
    // 3:1 weights should translate into roughly 3 of 4 rounds.
    assert_eq!(heavy_first, 6);
}

#[test]
fn empty_candidate_set_yields_empty_selection() {
    let world = World::new();
    let balancer = LoadBalancer::standard(1.0, 1.0, 1.0);
    let selected = balancer.select(&request("m"), Vec::new(), &world.observed(), 3);
    assert!(selected.is_empty());
}

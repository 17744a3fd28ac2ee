use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

const WINDOW: usize = 50;

/// Bounded window of recent attempt outcomes per candidate, feeding the
/// error-aware balancer strategy.
#[derive(Debug, Default)]
pub struct ErrorWindows {
    map: Mutex<HashMap<(String, String), VecDeque<bool>>>,
}

impl ErrorWindows {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, provider: &str, model: &str, ok: bool) {
        let mut guard = self.map.lock().expect("error window lock");
        let window = guard
            .entry((provider.to_string(), model.to_string()))
            .or_default();
        if window.len() == WINDOW {
            window.pop_front();
        }
        window.push_back(ok);
    }

    /// Fraction of recent attempts that failed, in [0, 1].
    pub fn error_rate(&self, provider: &str, model: &str) -> f64 {
        let guard = self.map.lock().expect("error window lock");
        match guard.get(&(provider.to_string(), model.to_string())) {
            Some(window) if !window.is_empty() => {
                let failures = window.iter().filter(|ok| !**ok).count();
                failures as f64 / window.len() as f64
            }
            _ => 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_over_recent_outcomes() {
        let windows = ErrorWindows::new();
        assert_eq!(windows.error_rate("p", "m"), 0.0);
        windows.record("p", "m", true);
        windows.record("p", "m", false);
        windows.record("p", "m", false);
        windows.record("p", "m", true);
        assert!((windows.error_rate("p", "m") - 0.5).abs() < 1e-9);
    }

    #[test]
    fn window_is_bounded() {
        let windows = ErrorWindows::new();
        for _ in 0..WINDOW {
            windows.record("p", "m", false);
        }
        assert_eq!(windows.error_rate("p", "m"), 1.0);
        for _ in 0..WINDOW {
            windows.record("p", "m", true);
        }
        assert_eq!(windows.error_rate("p", "m"), 0.0);
    }
}

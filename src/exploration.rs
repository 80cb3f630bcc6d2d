//! Epsilon-greedy action selection with decay and plateau reset.

use std::collections::VecDeque;

use rand::Rng;

use crate::action::{ACTION_COUNT, Action};
use crate::config::Config;
use crate::dqn::QNetwork;
use crate::encoder::State;

/// Sliding window of recent episode totals.
///
/// Counts consecutive bad episodes; one good episode breaks the run.
#[derive(Debug, Clone)]
pub struct PerformanceTracker {
    window: usize,  // bad episodes in a row before a plateau
    threshold: f64, // totals strictly below this count as bad
    recent: VecDeque<f64>, // only ever holds a run of bad totals
}

impl PerformanceTracker {
    pub fn new(window: usize, threshold: f64) -> Self {
        Self { window, threshold, recent: VecDeque::with_capacity(window) }
    }

    /// Records an episode total. Returns true when the last `window` totals
    /// were all below the threshold; the window is then cleared.
    pub fn record(&mut self, total: f64) -> bool {
        if total >= self.threshold {
            self.recent.clear();
            return false;
        }
        self.recent.push_back(total);
        if self.recent.len() >= self.window {
            self.recent.clear();
            return true;
        }
        false
    }

    pub fn bad_streak(&self) -> usize {
        self.recent.len()
    }
}

pub struct ExplorationController {
    epsilon: f32,                 // current exploration rate
    min: f32,                     // decay never goes below this
    decay: f32,                   // multiplier per training step
    reset_floor: f32,             // epsilon is raised to at least this on a plateau
    tracker: PerformanceTracker,  // plateau detector
}

impl ExplorationController {
    pub fn new(cfg: &Config) -> Self {
        Self {
            epsilon: cfg.epsilon_start,
            min: cfg.epsilon_min,
            decay: cfg.epsilon_decay,
            reset_floor: cfg.epsilon_reset_floor,
            tracker: PerformanceTracker::new(cfg.plateau_window, cfg.plateau_reward_threshold),
        }
    }

    pub fn epsilon(&self) -> f32 {
        self.epsilon
    }

    /// Used when resuming from a saved bundle. Values outside
    /// `[epsilon_min, 1]` are clamped with a warning. Returns the value applied.
    pub fn set_epsilon(&mut self, eps: f32) -> f32 {
        let clamped = eps.clamp(self.min, 1.0);
        if clamped != eps {
            log::warn!("loaded epsilon {eps} is outside [{}, 1], using {clamped}", self.min);
        }
        self.epsilon = clamped;
        clamped
    }

    pub fn tracker(&self) -> &PerformanceTracker {
        &self.tracker
    }

    /// With probability epsilon a uniform random action, otherwise greedy.
    pub fn select_action<R: Rng + ?Sized>(&self, rng: &mut R, state: &State, q: &QNetwork) -> Action {
        if rng.r#gen::<f32>() < self.epsilon {
            Action::ALL[rng.gen_range(0..ACTION_COUNT)]
        } else {
            q.choose_greedy_action(state)
        }
    }

    /// Multiplicative decay, once per training step, floored at the minimum.
    pub fn on_training_step(&mut self) {
        self.epsilon = (self.epsilon * self.decay).max(self.min);
    }

    /// Feeds the episode total to the plateau detector. Returns true if
    /// exploration was boosted.
    pub fn on_episode_end(&mut self, total: f64) -> bool {
        if !self.tracker.record(total) {
            return false;
        }
        let before = self.epsilon;
        self.epsilon = self.epsilon.max(self.reset_floor);
        log::info!(
            "plateau detected: epsilon {:.3} -> {:.3}",
            before,
            self.epsilon
        );
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::seeded_rng;

    #[test]
    fn decay_is_monotonic_and_floored() {
        let cfg = Config::default();
        let mut ex = ExplorationController::new(&cfg);
        let mut prev = ex.epsilon();
        for _ in 0..5000 {
            ex.on_training_step();
            assert!(ex.epsilon() <= prev);
            assert!(ex.epsilon() >= cfg.epsilon_min);
            prev = ex.epsilon();
        }
        assert_eq!(ex.epsilon(), cfg.epsilon_min);
    }

    #[test]
    fn set_epsilon_keeps_in_range_values_and_clamps_others() {
        let cfg = Config::default();
        let mut ex = ExplorationController::new(&cfg);
        assert_eq!(ex.set_epsilon(0.3), 0.3);
        assert_eq!(ex.epsilon(), 0.3);

        // saved under a lower floor than the current config allows
        assert_eq!(ex.set_epsilon(0.01), cfg.epsilon_min);
        assert_eq!(ex.epsilon(), cfg.epsilon_min);
    }

    #[test]
    fn first_decay_step() {
        let mut ex = ExplorationController::new(&Config::default());
        ex.on_training_step();
        assert!((ex.epsilon() - 0.995).abs() < 1e-6);
    }

    #[test]
    fn plateau_raises_epsilon_after_window_of_bad_episodes() {
        let cfg = Config { epsilon_start: 0.05, ..Config::default() };
        let mut ex = ExplorationController::new(&cfg);
        for i in 0..24 {
            assert!(!ex.on_episode_end(-30.0), "early reset at episode {i}");
        }
        assert!(ex.on_episode_end(-30.0));
        assert!((ex.epsilon() - 0.4).abs() < 1e-6);
        assert_eq!(ex.tracker().bad_streak(), 0);
    }

    #[test]
    fn plateau_never_lowers_epsilon() {
        let cfg = Config { plateau_window: 2, ..Config::default() };
        let mut ex = ExplorationController::new(&cfg);
        ex.on_episode_end(-50.0);
        assert!(ex.on_episode_end(-50.0));
        assert_eq!(ex.epsilon(), 1.0);
    }

    #[test]
    fn good_episode_breaks_the_streak() {
        let cfg = Config { epsilon_start: 0.1, plateau_window: 3, ..Config::default() };
        let mut ex = ExplorationController::new(&cfg);
        ex.on_episode_end(-20.0);
        ex.on_episode_end(-20.0);
        assert!(!ex.on_episode_end(5.0));
        assert_eq!(ex.tracker().bad_streak(), 0);
        ex.on_episode_end(-20.0);
        ex.on_episode_end(-20.0);
        assert!(ex.on_episode_end(-20.0));
    }

    #[test]
    fn threshold_is_strict() {
        let mut t = PerformanceTracker::new(1, -10.0);
        assert!(!t.record(-10.0));
        assert!(t.record(-10.01));
    }

    #[test]
    fn greedy_when_epsilon_zero() {
        let cfg = Config { epsilon_start: 0.0, epsilon_min: 0.0, hidden: 8, ..Config::default() };
        let mut rng = seeded_rng(11);
        let q = QNetwork::new(&cfg, &mut rng).unwrap();
        let ex = ExplorationController::new(&cfg);
        let s = [0.3, -0.2, 0.1, 0.0, -0.5, 0.0, 0.5, 0.0];
        for _ in 0..20 {
            assert_eq!(ex.select_action(&mut rng, &s, &q), q.choose_greedy_action(&s));
        }
    }

    #[test]
    fn random_when_epsilon_one_covers_all_actions() {
        let cfg = Config { hidden: 8, ..Config::default() };
        let mut rng = seeded_rng(12);
        let q = QNetwork::new(&cfg, &mut rng).unwrap();
        let ex = ExplorationController::new(&cfg);
        let mut seen = [false; ACTION_COUNT];
        for _ in 0..500 {
            seen[ex.select_action(&mut rng, &[0.0; 8], &q).index()] = true;
        }
        assert!(seen.iter().all(|&s| s));
    }
}

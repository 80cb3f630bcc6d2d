//! Hyperparameters and tuning constants for the agent.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::action::ACTION_COUNT;
use crate::encoder::STATE_DIM;
use crate::error::{Error, Result};

/// Everything the learning core can be tuned with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub state_dim: usize,              // encoder output size (K)
    pub action_count: usize,           // discrete actions (A)
    pub hidden: usize,                 // width of both hidden layers
    pub replay_capacity: usize,        // N
    pub batch_size: usize,             // B
    pub train_every_ticks: u64,        // one training step every N ticks
    pub target_sync_steps: u64,        // copy online -> target every N training steps
    pub gamma: f32,                    // discount factor
    pub learning_rate: f32,            // Adam step size
    pub epsilon_start: f32,
    pub epsilon_min: f32,
    pub epsilon_decay: f32,            // multiplicative, applied per training step
    pub plateau_window: usize,         // consecutive bad episodes before a reset
    pub plateau_reward_threshold: f64, // episode total below this counts as bad
    pub epsilon_reset_floor: f32,      // epsilon is raised to at least this on plateau
    pub seed: u64,
    pub reward: RewardConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            state_dim: STATE_DIM,
            action_count: ACTION_COUNT,
            hidden: 64,
            replay_capacity: 10_000,
            batch_size: 64,
            train_every_ticks: 4,
            target_sync_steps: 1000,
            gamma: 0.95,
            learning_rate: 0.001,
            epsilon_start: 1.0,
            epsilon_min: 0.05,
            epsilon_decay: 0.995,
            plateau_window: 25,
            plateau_reward_threshold: -10.0,
            epsilon_reset_floor: 0.4,
            seed: 0x5EED,
            reward: RewardConfig::default(),
        }
    }
}

/// Terminal rewards and shaping weights.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RewardConfig {
    pub scored: f64,
    pub conceded: f64,
    pub foul: f64,
    pub home_control_weight: f64,
    pub proximity_weight: f64,
    pub progress_weight: f64,
    pub shot_weight: f64,
}

impl Default for RewardConfig {
    fn default() -> Self {
        Self {
            scored: 50.0,
            conceded: -50.0,
            foul: -25.0,
            home_control_weight: 0.4,
            proximity_weight: 0.2,
            progress_weight: 0.8,
            shot_weight: 1.5,
        }
    }
}

impl Config {
    /// Read a JSON config; missing keys fall back to defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        let cfg: Config = serde_json::from_str(&text)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if self.state_dim != STATE_DIM {
            return Err(Error::Config(format!(
                "state_dim must be {STATE_DIM} (encoder output), got {}",
                self.state_dim
            )));
        }
        if self.action_count != ACTION_COUNT {
            return Err(Error::Config(format!(
                "action_count must be {ACTION_COUNT}, got {}",
                self.action_count
            )));
        }
        if self.hidden == 0 {
            return Err(Error::Config("hidden must be > 0".into()));
        }
        if self.replay_capacity == 0 {
            return Err(Error::Config("replay_capacity must be > 0".into()));
        }
        if self.batch_size == 0 || self.batch_size > self.replay_capacity {
            return Err(Error::Config(format!(
                "batch_size must be in 1..={}, got {}",
                self.replay_capacity, self.batch_size
            )));
        }
        if self.train_every_ticks == 0 || self.target_sync_steps == 0 {
            return Err(Error::Config("cadences must be > 0".into()));
        }
        if !(0.0..=1.0).contains(&self.gamma) {
            return Err(Error::Config(format!("gamma must be in [0, 1], got {}", self.gamma)));
        }
        if !(self.learning_rate.is_finite() && self.learning_rate > 0.0) {
            return Err(Error::Config("learning_rate must be a positive number".into()));
        }
        let eps_ok = 0.0 <= self.epsilon_min
            && self.epsilon_min <= self.epsilon_reset_floor
            && self.epsilon_reset_floor <= 1.0
            && self.epsilon_min <= self.epsilon_start
            && self.epsilon_start <= 1.0;
        if !eps_ok {
            return Err(Error::Config(
                "epsilon bounds must satisfy 0 <= min <= reset_floor <= 1 and min <= start <= 1".into(),
            ));
        }
        if !(self.epsilon_decay > 0.0 && self.epsilon_decay <= 1.0) {
            return Err(Error::Config(format!(
                "epsilon_decay must be in (0, 1], got {}",
                self.epsilon_decay
            )));
        }
        if self.plateau_window == 0 {
            return Err(Error::Config("plateau_window must be > 0".into()));
        }
        let r = &self.reward;
        let all_finite = [
            self.plateau_reward_threshold,
            r.scored,
            r.conceded,
            r.foul,
            r.home_control_weight,
            r.proximity_weight,
            r.progress_weight,
            r.shot_weight,
        ]
        .iter()
        .all(|v| v.is_finite());
        if !all_finite {
            return Err(Error::Config("reward constants must be finite".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_are_valid() {
        Config::default().validate().unwrap();
    }

    #[test]
    fn rejects_batch_larger_than_capacity() {
        let cfg = Config { replay_capacity: 10, batch_size: 64, ..Config::default() };
        assert!(matches!(cfg.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn rejects_inverted_epsilon_bounds() {
        let cfg = Config { epsilon_min: 0.5, epsilon_reset_floor: 0.4, ..Config::default() };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn partial_json_uses_defaults() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        write!(f, r#"{{ "batch_size": 32, "reward": {{ "scored": 10.0 }} }}"#).unwrap();
        let cfg = Config::from_json_file(f.path()).unwrap();
        assert_eq!(cfg.batch_size, 32);
        assert_eq!(cfg.reward.scored, 10.0);
        assert_eq!(cfg.reward.conceded, -50.0);
        assert_eq!(cfg.replay_capacity, 10_000);
    }
}

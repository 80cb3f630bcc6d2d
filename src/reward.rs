//! Reward shaping for the agent paddle.
//!
//! Terminal events override everything, in order: scored, conceded, foul.
//! Otherwise the reward is a weighted sum of shaping terms. The breakdown
//! always sums to the total.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Serialize, Serializer};

use crate::config::RewardConfig;
use crate::encoder::{TableSnapshot, Touch};

/// Flags reported by the environment for one step.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StepFlags {
    pub scored: bool,       // agent put the puck in the opponent goal
    pub conceded: bool,     // opponent scored
    pub caused_foul: bool,  // agent committed a foul this step
    pub episode_done: bool, // goal or clock expiry
}

/// Named reward contributions, used for the diagnostic breakdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RewardComponent {
    Scored,
    Conceded,
    Foul,
    HomeControl,
    Proximity,
    Progress,
    Shot,
}

impl RewardComponent {
    /// Stable name used in logs, JSON and the SQLite run log.
    pub fn as_str(self) -> &'static str {
        match self {
            RewardComponent::Scored => "scored",
            RewardComponent::Conceded => "conceded",
            RewardComponent::Foul => "foul",
            RewardComponent::HomeControl => "home_control",
            RewardComponent::Proximity => "proximity",
            RewardComponent::Progress => "progress",
            RewardComponent::Shot => "shot",
        }
    }
}

impl fmt::Display for RewardComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for RewardComponent {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(self.as_str())
    }
}

/// Scalar reward plus where it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct RewardBreakdown {
    pub total: f64,
    pub components: BTreeMap<RewardComponent, f64>,
}

impl RewardBreakdown {
    fn single(c: RewardComponent, v: f64) -> Self {
        let mut components = BTreeMap::new();
        components.insert(c, v);
        Self { total: v, components }
    }

    fn from_components(components: BTreeMap<RewardComponent, f64>) -> Self {
        let total = components.values().sum();
        Self { total, components }
    }
}

pub struct RewardShaper {
    cfg: RewardConfig,
}

impl RewardShaper {
    pub fn new(cfg: RewardConfig) -> Self {
        Self { cfg }
    }

    pub fn config(&self) -> &RewardConfig {
        &self.cfg
    }

    /// Scores the post-step world. Pure.
    pub fn shape(&self, snap: &TableSnapshot, flags: StepFlags) -> RewardBreakdown {
        if flags.scored {
            return RewardBreakdown::single(RewardComponent::Scored, self.cfg.scored);
        }
        if flags.conceded {
            return RewardBreakdown::single(RewardComponent::Conceded, self.cfg.conceded);
        }
        if flags.caused_foul {
            return RewardBreakdown::single(RewardComponent::Foul, self.cfg.foul);
        }

        let t = &snap.table;
        let width = t.width() as f64;
        let height = t.height() as f64;
        let (agent, puck) = (&snap.agent, &snap.puck);
        let mut parts = BTreeMap::new();

        // stay level with the middle of the home goal
        let off_centre = (agent.y as f64 - t.center_y() as f64).abs();
        parts.insert(
            RewardComponent::HomeControl,
            (1.0 - off_centre / (height / 2.0)) * self.cfg.home_control_weight,
        );

        let dist = ((agent.x - puck.x) as f64).hypot((agent.y - puck.y) as f64);
        parts.insert(
            RewardComponent::Proximity,
            (1.0 - dist / width) * self.cfg.proximity_weight,
        );

        let progress = (puck.x as f64 - t.left as f64) / width;
        parts.insert(RewardComponent::Progress, progress * self.cfg.progress_weight);

        if snap.last_touch == Some(Touch::Agent) {
            let toward_goal = puck.vx as f64 * (t.right as f64 - puck.x as f64);
            if toward_goal > 0.0 {
                let shot = toward_goal / (width * t.puck_max_speed as f64);
                parts.insert(RewardComponent::Shot, shot * self.cfg.shot_weight);
            }
        }

        RewardBreakdown::from_components(parts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::{test_snapshot, Puck};

    fn shaper() -> RewardShaper {
        RewardShaper::new(RewardConfig::default())
    }

    #[test]
    fn json_name_is_display_name() {
        let all = [
            RewardComponent::Scored,
            RewardComponent::Conceded,
            RewardComponent::Foul,
            RewardComponent::HomeControl,
            RewardComponent::Proximity,
            RewardComponent::Progress,
            RewardComponent::Shot,
        ];
        for c in all {
            assert_eq!(serde_json::to_string(&c).unwrap(), format!("\"{c}\""));
        }
        assert_eq!(serde_json::to_string(&RewardComponent::HomeControl).unwrap(), "\"home_control\"");
    }

    #[test]
    fn scored_wins_over_every_other_flag() {
        let all = StepFlags { scored: true, conceded: true, caused_foul: true, episode_done: true };
        let r = shaper().shape(&test_snapshot(), all);
        assert_eq!(r.total, 50.0);
        assert_eq!(r.components.len(), 1);
        assert_eq!(r.components[&RewardComponent::Scored], 50.0);
    }

    #[test]
    fn conceded_then_foul_precedence() {
        let s = shaper();
        let r = s.shape(&test_snapshot(), StepFlags { conceded: true, caused_foul: true, ..Default::default() });
        assert_eq!(r.total, -50.0);
        let r = s.shape(&test_snapshot(), StepFlags { caused_foul: true, ..Default::default() });
        assert_eq!(r.total, -25.0);
        assert_eq!(r.components.keys().copied().collect::<Vec<_>>(), vec![RewardComponent::Foul]);
    }

    #[test]
    fn breakdown_sums_to_total() {
        let s = shaper();
        let mut snap = test_snapshot();
        for (px, vx, touch) in [
            (10.0, 0.0, None),
            (150.0, 40.0, Some(Touch::Agent)),
            (60.0, -30.0, Some(Touch::Agent)),
            (199.0, 5.0, Some(Touch::Opponent)),
        ] {
            snap.puck = Puck { x: px, y: 37.5, vx, vy: 3.0 };
            snap.last_touch = touch;
            let r = s.shape(&snap, StepFlags::default());
            let sum: f64 = r.components.values().sum();
            assert!((sum - r.total).abs() < 1e-9);
        }
    }

    #[test]
    fn shaping_terms_at_centre() {
        // agent at (30, 50), puck at the centre spot, no touch
        let r = shaper().shape(&test_snapshot(), StepFlags::default());
        assert!((r.components[&RewardComponent::HomeControl] - 0.4).abs() < 1e-9);
        assert!((r.components[&RewardComponent::Proximity] - (1.0 - 70.0 / 200.0) * 0.2).abs() < 1e-9);
        assert!((r.components[&RewardComponent::Progress] - 0.4).abs() < 1e-9);
        assert!(!r.components.contains_key(&RewardComponent::Shot));
    }

    #[test]
    fn shot_bonus_needs_agent_touch_and_goalward_velocity() {
        let s = shaper();
        let mut snap = test_snapshot();
        snap.puck.vx = 25.0;
        snap.last_touch = Some(Touch::Agent);
        let r = s.shape(&snap, StepFlags::default());
        // 25 * (200 - 100) / (200 * 50) * 1.5
        assert!((r.components[&RewardComponent::Shot] - 0.375).abs() < 1e-9);

        snap.puck.vx = -25.0;
        assert!(!s.shape(&snap, StepFlags::default()).components.contains_key(&RewardComponent::Shot));

        snap.puck.vx = 25.0;
        snap.last_touch = Some(Touch::Opponent);
        assert!(!s.shape(&snap, StepFlags::default()).components.contains_key(&RewardComponent::Shot));
    }
}

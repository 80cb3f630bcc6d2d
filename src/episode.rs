//! Per-episode reward accounting.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Serialize, Serializer};

use crate::reward::{RewardBreakdown, RewardComponent, StepFlags};

/// Why an episode finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndReason {
    Scored,
    Conceded,
    TimeUp,
}

impl EndReason {
    pub fn from_flags(flags: StepFlags) -> Self {
        if flags.scored {
            EndReason::Scored
        } else if flags.conceded {
            EndReason::Conceded
        } else {
            EndReason::TimeUp
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            EndReason::Scored => "scored",
            EndReason::Conceded => "conceded",
            EndReason::TimeUp => "time_up",
        }
    }
}

impl fmt::Display for EndReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for EndReason {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(self.as_str())
    }
}

/// Running totals for the episode in progress.
#[derive(Debug, Clone, Default)]
pub struct EpisodeStats {
    pub total_reward: f64,                           // sum of shaped rewards
    pub by_component: BTreeMap<RewardComponent, f64>, // same sum, split by source
    pub step_count: u64,                             // transitions this episode
}

impl EpisodeStats {
    pub fn add(&mut self, r: &RewardBreakdown) {
        self.total_reward += r.total;
        for (&c, &v) in &r.components {
            *self.by_component.entry(c).or_insert(0.0) += v;
        }
        self.step_count += 1;
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Emitted once per finished episode.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EpisodeSummary {
    pub index: u64,
    pub total: f64,
    /// Component totals, most negative first.
    pub breakdown: Vec<(RewardComponent, f64)>,
    pub steps: u64,
    pub epsilon: f32,         // after any plateau reset
    pub reason: EndReason,
    pub plateau_reset: bool,  // this episode triggered a reset
}

impl EpisodeSummary {
    pub fn new(index: u64, stats: &EpisodeStats, epsilon: f32, reason: EndReason) -> Self {
        let mut breakdown: Vec<(RewardComponent, f64)> =
            stats.by_component.iter().map(|(&c, &v)| (c, v)).collect();
        breakdown.sort_by(|a, b| a.1.total_cmp(&b.1));
        Self {
            index,
            total: stats.total_reward,
            breakdown,
            steps: stats.step_count,
            epsilon,
            reason,
            plateau_reset: false,
        }
    }

    /// `component=value` pairs for log lines.
    pub fn breakdown_line(&self) -> String {
        self.breakdown
            .iter()
            .map(|(c, v)| format!("{c}={v:.3}"))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breakdown(pairs: &[(RewardComponent, f64)]) -> RewardBreakdown {
        let components: BTreeMap<_, _> = pairs.iter().copied().collect();
        RewardBreakdown { total: components.values().sum(), components }
    }

    #[test]
    fn accumulates_per_component() {
        let mut st = EpisodeStats::default();
        st.add(&breakdown(&[(RewardComponent::Progress, 0.4), (RewardComponent::Proximity, 0.1)]));
        st.add(&breakdown(&[(RewardComponent::Progress, 0.2)]));
        st.add(&breakdown(&[(RewardComponent::Foul, -25.0)]));
        assert_eq!(st.step_count, 3);
        assert!((st.total_reward - (-24.3)).abs() < 1e-9);
        assert!((st.by_component[&RewardComponent::Progress] - 0.6).abs() < 1e-9);
        let sum: f64 = st.by_component.values().sum();
        assert!((sum - st.total_reward).abs() < 1e-9);
    }

    #[test]
    fn summary_sorts_most_negative_first() {
        let mut st = EpisodeStats::default();
        st.add(&breakdown(&[
            (RewardComponent::Progress, 3.0),
            (RewardComponent::Conceded, -50.0),
            (RewardComponent::HomeControl, 1.0),
        ]));
        let s = EpisodeSummary::new(7, &st, 0.5, EndReason::Conceded);
        let order: Vec<_> = s.breakdown.iter().map(|(c, _)| *c).collect();
        assert_eq!(order, vec![RewardComponent::Conceded, RewardComponent::HomeControl, RewardComponent::Progress]);
        assert_eq!(s.breakdown_line(), "conceded=-50.000 home_control=1.000 progress=3.000");
    }

    #[test]
    fn end_reason_follows_flag_precedence() {
        let f = StepFlags { scored: true, conceded: true, episode_done: true, ..Default::default() };
        assert_eq!(EndReason::from_flags(f), EndReason::Scored);
        let f = StepFlags { conceded: true, episode_done: true, ..Default::default() };
        assert_eq!(EndReason::from_flags(f), EndReason::Conceded);
        let f = StepFlags { episode_done: true, caused_foul: true, ..Default::default() };
        assert_eq!(EndReason::from_flags(f), EndReason::TimeUp);
    }

    #[test]
    fn summary_json_uses_display_names() {
        let mut st = EpisodeStats::default();
        st.add(&breakdown(&[(RewardComponent::HomeControl, 1.0)]));
        let s = EpisodeSummary::new(2, &st, 0.5, EndReason::TimeUp);
        let v = serde_json::to_value(&s).unwrap();
        assert_eq!(v["reason"], "time_up");
        assert_eq!(v["breakdown"][0][0], "home_control");
        for r in [EndReason::Scored, EndReason::Conceded, EndReason::TimeUp] {
            assert_eq!(serde_json::to_value(r).unwrap(), r.to_string());
        }
    }

    #[test]
    fn reset_clears_everything() {
        let mut st = EpisodeStats::default();
        st.add(&breakdown(&[(RewardComponent::Shot, 1.0)]));
        st.reset();
        assert_eq!(st.step_count, 0);
        assert!(st.by_component.is_empty());
        assert_eq!(st.total_reward, 0.0);
    }
}

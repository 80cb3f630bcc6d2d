//! Glue between a table simulation and the training scheduler.

use crate::action::Action;
use crate::encoder::{TableSnapshot, encode};
use crate::episode::EpisodeSummary;
use crate::error::Result;
use crate::reward::StepFlags;
use crate::scheduler::{TrainingOutcome, TrainingScheduler, Transition};

/// What the learning core needs from the game.
pub trait Environment {
    /// Current world, read after every step.
    fn snapshot(&self) -> TableSnapshot;

    /// Queues the agent's action for the next `step`.
    fn apply_action(&mut self, action: Action);

    /// Advances the world one tick.
    fn step(&mut self) -> StepFlags;

    /// New rally: entities back to their start positions.
    fn reset(&mut self);
}

/// Runs the observe / act / step / learn cycle, one call per frame.
pub struct TickDriver<E: Environment> {
    env: E,                       // the game
    scheduler: TrainingScheduler, // the learner
}

impl<E: Environment> TickDriver<E> {
    pub fn new(env: E, scheduler: TrainingScheduler) -> Self {
        Self { env, scheduler }
    }

    pub fn env(&self) -> &E {
        &self.env
    }

    pub fn scheduler(&self) -> &TrainingScheduler {
        &self.scheduler
    }

    pub fn scheduler_mut(&mut self) -> &mut TrainingScheduler {
        &mut self.scheduler
    }

    pub fn into_parts(self) -> (E, TrainingScheduler) {
        (self.env, self.scheduler)
    }

    pub fn tick(&mut self) -> Result<TrainingOutcome> {
        let state = encode(&self.env.snapshot())?;
        let action = self.scheduler.select_action(&state);
        self.env.apply_action(action);
        let flags = self.env.step();

        let outcome = self.scheduler.tick(Transition { state, action, next: self.env.snapshot(), flags })?;
        if flags.episode_done {
            self.env.reset();
        }
        Ok(outcome)
    }

    /// Ticks until the environment ends the episode.
    pub fn run_episode(&mut self) -> Result<EpisodeSummary> {
        if !self.scheduler.episode_active() {
            self.scheduler.begin_episode();
        }
        loop {
            if let Some(summary) = self.tick()?.episode {
                return Ok(summary);
            }
        }
    }

    /// Abandons the running rally without recording it.
    pub fn restart_match(&mut self) {
        self.scheduler.cancel_episode();
        self.env.reset();
        self.scheduler.begin_episode();
    }
}

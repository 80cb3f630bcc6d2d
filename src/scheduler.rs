//! Per-tick training loop integration.
//!
//! All mutable learning state lives in one `TrainingContext` owned by the
//! scheduler. `tick` is synchronous and runs at most one training step.

use rand::rngs::StdRng;

use crate::action::Action;
use crate::config::Config;
use crate::dqn::{QNetwork, TargetNetwork, TrainReport};
use crate::encoder::{State, TableSnapshot, encode};
use crate::episode::{EndReason, EpisodeStats, EpisodeSummary};
use crate::error::{Error, Result};
use crate::exploration::ExplorationController;
use crate::metrics::MetricsSink;
use crate::persistence::{self, ModelBundle};
use crate::replay_buffer::{Experience, ReplayBuffer};
use crate::reward::{RewardShaper, StepFlags};
use crate::utils::seeded_rng;

/// What the environment produced for one tick.
#[derive(Debug, Clone)]
pub struct Transition {
    pub state: State,          // encoded state the action was chosen from
    pub action: Action,        // what the agent did
    pub next: TableSnapshot,   // world after the step
    pub flags: StepFlags,      // goal / foul / done reported by the game
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,       // nothing stored yet
    Collecting, // storing, no training step yet
    Training,   // at least one gradient step taken
}

/// What the training half of a tick did.
#[derive(Debug, Clone, PartialEq)]
pub enum TrainStatus {
    /// Episode was cancelled; nothing was stored.
    Ignored,
    /// Buffer below batch size.
    Collecting { have: usize, need: usize },
    /// Off-cadence tick.
    Waiting,
    Trained { step: u64, report: TrainReport, synced: bool },
    /// Non-finite loss or gradient; the update was skipped.
    Diverged,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrainingOutcome {
    pub status: TrainStatus,
    pub reward: f64,
    /// Set on the tick that finished an episode.
    pub episode: Option<EpisodeSummary>,
}

/// Everything that changes while training.
pub struct TrainingContext {
    pub buffer: ReplayBuffer,               // FIFO experience store
    pub online: QNetwork,                   // trained every train_every_ticks
    pub target: TargetNetwork,              // TD bootstrap, synced every target_sync_steps
    pub exploration: ExplorationController, // epsilon + plateau reset
    pub shaper: RewardShaper,               // snapshot + flags -> reward
    pub rng: StdRng,                        // exploration and replay sampling
    pub ticks: u64,                         // transitions stored since start
    pub train_steps: u64,                   // gradient steps taken
    pub episodes: u64,                      // finished episodes
    pub stats: EpisodeStats,                // totals for the running episode
    pub episode_active: bool,               // false after cancel_episode
}

impl TrainingContext {
    pub fn new(cfg: &Config) -> Result<Self> {
        let mut rng = seeded_rng(cfg.seed);
        let online = QNetwork::new(cfg, &mut rng)?;
        let target = TargetNetwork::from_online(&online);
        Ok(Self {
            buffer: ReplayBuffer::new(cfg.replay_capacity)?,
            online,
            target,
            exploration: ExplorationController::new(cfg),
            shaper: RewardShaper::new(cfg.reward.clone()),
            rng,
            ticks: 0,
            train_steps: 0,
            episodes: 0,
            stats: EpisodeStats::default(),
            episode_active: true,
        })
    }
}

pub struct TrainingScheduler {
    cfg: Config,                // validated once in new
    ctx: TrainingContext,       // mutable training state
    sink: Box<dyn MetricsSink>, // scalars and episode summaries
}

impl TrainingScheduler {
    pub fn new(cfg: Config, sink: Box<dyn MetricsSink>) -> Result<Self> {
        cfg.validate()?;
        let ctx = TrainingContext::new(&cfg)?;
        log::info!(
            "scheduler ready: topology={:?} capacity={} batch={} train_every={} sync_every={}",
            ctx.online.topology(),
            cfg.replay_capacity,
            cfg.batch_size,
            cfg.train_every_ticks,
            cfg.target_sync_steps
        );
        Ok(Self { cfg, ctx, sink })
    }

    pub fn config(&self) -> &Config {
        &self.cfg
    }

    pub fn context(&self) -> &TrainingContext {
        &self.ctx
    }

    pub fn epsilon(&self) -> f32 {
        self.ctx.exploration.epsilon()
    }

    pub fn episode_active(&self) -> bool {
        self.ctx.episode_active
    }

    pub fn phase(&self) -> Phase {
        if self.ctx.train_steps > 0 {
            Phase::Training
        } else if self.ctx.buffer.is_empty() {
            Phase::Idle
        } else {
            Phase::Collecting
        }
    }

    /// Epsilon-greedy over the online network.
    pub fn select_action(&mut self, state: &State) -> Action {
        let ctx = &mut self.ctx;
        ctx.exploration.select_action(&mut ctx.rng, state, &ctx.online)
    }

    /// Copies online weights into the target network.
    pub fn sync_target(&mut self) {
        self.ctx.target.sync_from(&self.ctx.online);
        log::debug!("target synced at training step {}", self.ctx.train_steps);
    }

    /// Drops the running episode. Ticks are ignored until `begin_episode`.
    /// The replay buffer is kept.
    pub fn cancel_episode(&mut self) {
        if self.ctx.episode_active {
            log::info!("episode {} cancelled after {} steps", self.ctx.episodes, self.ctx.stats.step_count);
        }
        self.ctx.stats.reset();
        self.ctx.episode_active = false;
    }

    pub fn begin_episode(&mut self) {
        self.ctx.stats.reset();
        self.ctx.episode_active = true;
    }

    /// Applies a loaded bundle to the online network and epsilon. On error
    /// the live model is unchanged. The caller syncs the target afterwards.
    pub fn restore(&mut self, bundle: &ModelBundle) -> Result<()> {
        let topology = self.ctx.online.topology();
        if bundle.topology != topology {
            return Err(Error::MalformedBundle(format!(
                "topology {:?} does not match network {:?}",
                bundle.topology, topology
            )));
        }
        self.ctx.online.set_weights(&bundle.weights)?;
        let applied = self.ctx.exploration.set_epsilon(bundle.epsilon);
        log::info!("restored model (epsilon={applied:.4})");
        Ok(())
    }

    pub fn save(&self, dir: impl AsRef<std::path::Path>) -> Result<()> {
        persistence::save(dir, &self.ctx.online, self.epsilon())
    }

    /// Consumes one environment transition: shape, store, maybe train,
    /// maybe sync, and close the episode when it is done.
    pub fn tick(&mut self, tr: Transition) -> Result<TrainingOutcome> {
        if !self.ctx.episode_active {
            return Ok(TrainingOutcome { status: TrainStatus::Ignored, reward: 0.0, episode: None });
        }

        // encode first so a bad snapshot stores nothing
        let next_state = encode(&tr.next)?;
        let reward = self.ctx.shaper.shape(&tr.next, tr.flags);
        self.ctx.stats.add(&reward);

        // store (s, a, r, s', done)
        self.ctx.buffer.push(Experience {
            state: tr.state,
            action: tr.action,
            reward: reward.total as f32,
            next_state,
            done: tr.flags.episode_done,
        });
        self.ctx.ticks += 1;

        let status = self.maybe_train()?;

        // episode bookkeeping runs after the step that ended it
        let episode = if tr.flags.episode_done {
            Some(self.finish_episode(tr.flags))
        } else {
            None
        };

        Ok(TrainingOutcome { status, reward: reward.total, episode })
    }

    // -------- helpers (module-private) --------

    fn maybe_train(&mut self) -> Result<TrainStatus> {
        let need = self.cfg.batch_size;
        let have = self.ctx.buffer.len();
        if have < need {
            log::trace!("collecting {have}/{need}");
            return Ok(TrainStatus::Collecting { have, need });
        }
        if self.ctx.ticks % self.cfg.train_every_ticks != 0 {
            return Ok(TrainStatus::Waiting);
        }

        // uniform minibatch, with replacement
        let ctx = &mut self.ctx;
        let batch = match ctx.buffer.sample_batch(need, &mut ctx.rng) {
            Ok(b) => b,
            Err(Error::InsufficientData { have, need }) => return Ok(TrainStatus::Collecting { have, need }),
            Err(e) => return Err(e),
        };
        let report = match ctx.online.train_step(&batch, &ctx.target, self.cfg.gamma) {
            Ok(r) => r,
            Err(Error::Diverged(why)) => {
                log::error!("skipping update at tick {}: {why}", ctx.ticks);
                return Ok(TrainStatus::Diverged);
            }
            Err(e) => return Err(e),
        };

        // epsilon decays per gradient step, not per tick
        ctx.train_steps += 1;
        ctx.exploration.on_training_step();
        let step = ctx.train_steps;

        let synced = step % self.cfg.target_sync_steps == 0;
        if synced {
            self.sync_target();
        }

        // per-step scalars
        let eps = self.epsilon();
        self.sink.scalar(step, "loss", report.loss);
        self.sink.scalar(step, "grad_norm", report.grad_norm);
        self.sink.scalar(step, "td_mean", report.td.mean);
        self.sink.scalar(step, "q_sel_mean", report.q_sel.mean);
        self.sink.scalar(step, "epsilon", eps);

        Ok(TrainStatus::Trained { step, report, synced })
    }

    fn finish_episode(&mut self, flags: StepFlags) -> EpisodeSummary {
        let ctx = &mut self.ctx;
        let total = ctx.stats.total_reward;
        // plateau check sees the finished total before the summary is built
        let plateau_reset = ctx.exploration.on_episode_end(total);

        let mut summary = EpisodeSummary::new(ctx.episodes, &ctx.stats, ctx.exploration.epsilon(), EndReason::from_flags(flags));
        summary.plateau_reset = plateau_reset;
        self.sink.episode(&summary);

        ctx.episodes += 1;
        ctx.stats.reset();
        summary
    }
}

//! Deep Q-learning core for an air-hockey paddle agent.
//!
//! The game itself stays outside: it hands over table snapshots and step
//! flags through [`runner::Environment`], and gets an [`action::Action`]
//! back each tick. Everything that learns lives in
//! [`scheduler::TrainingScheduler`].

pub mod action;
pub mod config;
pub mod dqn;
pub mod encoder;
pub mod episode;
pub mod error;
pub mod exploration;
pub mod metrics;
pub mod network;
pub mod persistence;
pub mod replay_buffer;
pub mod reward;
pub mod runner;
pub mod scheduler;
pub mod sim;
pub mod utils;

pub use action::{ACTION_COUNT, Action};
pub use config::{Config, RewardConfig};
pub use dqn::{QNetwork, TargetNetwork, TrainReport};
pub use encoder::{STATE_DIM, State, TableSnapshot, encode};
pub use episode::{EndReason, EpisodeSummary};
pub use error::{Error, Result};
pub use metrics::{FanOut, LogSink, MemorySink, MetricsSink, NoopSink, SqliteSink};
pub use persistence::ModelBundle;
pub use replay_buffer::{Experience, ReplayBuffer};
pub use reward::{RewardBreakdown, RewardShaper, StepFlags};
pub use runner::{Environment, TickDriver};
pub use scheduler::{TrainStatus, TrainingOutcome, TrainingScheduler, Transition};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

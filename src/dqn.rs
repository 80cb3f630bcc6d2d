//! Online Q-network (trained) and target Q-network (frozen copy).

use rand::Rng;

use crate::action::Action;
use crate::config::Config;
use crate::encoder::State;
use crate::error::{Error, Result};
use crate::network::{Net, Weights};
use crate::replay_buffer::Experience;
use crate::utils::{Stats, argmax, has_non_finite, max_value, vec_stats};

/// Numbers from one training step, for metrics.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrainReport {
    pub loss: f32,      // masked MSE over the batch
    pub grad_norm: f32, // L2 norm before the optimizer step
    pub td: Stats,      // Q(s,a) - y over the batch
    pub q_sel: Stats,   // Q(s,a) for the taken actions
}

/// Online network: maps a state to one Q-value per action. The only network
/// that is ever trained.
pub struct QNetwork {
    net: Net, // [K, hidden, hidden, A] MLP
    lr: f32,  // Adam step size
}

impl QNetwork {
    /// K -> hidden -> hidden -> A, ReLU hidden layers. A zero width in
    /// `cfg` is an [`Error::Config`].
    pub fn new<R: Rng + ?Sized>(cfg: &Config, rng: &mut R) -> Result<Self> {
        let sizes = [cfg.state_dim, cfg.hidden, cfg.hidden, cfg.action_count];
        Ok(Self { net: Net::new(&sizes, rng)?, lr: cfg.learning_rate })
    }

    pub fn topology(&self) -> Vec<usize> {
        self.net.topology()
    }

    /// Q-values for a batch of states. No side effects.
    pub fn predict(&self, states: &[State]) -> Vec<Vec<f32>> {
        self.net.forward_batch(states)
    }

    pub fn q_values(&self, state: &State) -> Vec<f32> {
        self.net.forward(state)
    }

    /// argmax_a Q(s, a); ties go to the lowest action index.
    pub fn choose_greedy_action(&self, state: &State) -> Action {
        let q = self.q_values(state);
        // argmax never exceeds the output width, which equals ACTION_COUNT
        Action::from_index(argmax(&q)).unwrap_or(Action::NoOp)
    }

    /// One gradient step toward bootstrapped targets
    /// `y = r + gamma * max_a' Q_target(s', a') * (1 - done)`.
    ///
    /// Only the taken action's output carries error; the other outputs are
    /// given their own prediction as target, so they get zero gradient.
    /// On non-finite values nothing is applied and `Diverged` is returned.
    pub fn train_step(&mut self, batch: &[&Experience], target: &TargetNetwork, gamma: f32) -> Result<TrainReport> {
        if batch.is_empty() {
            return Err(Error::InsufficientData { have: 0, need: 1 });
        }
        let n = batch.len() as f32;
        let act_dim = self.net.output_dim() as f32;

        // y for every sample, target network only
        let next_states: Vec<State> = batch.iter().map(|e| e.next_state).collect();
        let next_q = target.predict(&next_states);
        let ys: Vec<f32> = batch
            .iter()
            .zip(&next_q)
            .map(|(e, q)| {
                let not_done = if e.done { 0.0 } else { 1.0 };
                e.reward + gamma * max_value(q) * not_done
            })
            .collect();
        if has_non_finite(&ys) {
            return Err(Error::Diverged("TD targets".into()));
        }

        self.net.zero_grad();
        let mut loss = 0.0f32;
        let mut td_errs = Vec::with_capacity(batch.len());
        let mut q_sel = Vec::with_capacity(batch.len());

        for (e, &y) in batch.iter().zip(&ys) {
            // Q(s, ·)
            let trace = self.net.forward_trace(&e.state);
            let a = e.action.index();
            let q = trace.output()[a];

            // TD error on chosen action.
            let err = q - y;
            td_errs.push(err);
            q_sel.push(q);
            loss += err * err / (n * act_dim);

            // dL/dQ(s, ·) is zero except at the taken action.
            let mut d_q = vec![0.0f32; self.net.output_dim()];
            d_q[a] = 2.0 * err / (n * act_dim);
            self.net.backward_from_output_grad(&trace, &d_q);
        }

        // health check before the optimizer step
        let grad_norm = self.net.grad_l2_sum_all().sqrt();
        if !loss.is_finite() || !grad_norm.is_finite() || self.net.non_finite_any() {
            self.net.zero_grad();
            return Err(Error::Diverged(format!("loss={loss} grad_norm={grad_norm}")));
        }

        // apply the accumulated gradients
        self.net.step_adam(self.lr);

        Ok(TrainReport {
            loss,
            grad_norm,
            td: vec_stats(&td_errs),
            q_sel: vec_stats(&q_sel),
        })
    }

    pub fn weights(&self) -> Weights {
        self.net.weights()
    }

    pub fn set_weights(&mut self, w: &Weights) -> Result<()> {
        self.net.set_weights(w)
    }
}

/// Point-in-time copy of the online network used for TD targets.
/// Has no training API: it only changes through `sync_from`.
pub struct TargetNetwork {
    net: Net, // frozen copy, refreshed only by sync_from
}

impl TargetNetwork {
    pub fn from_online(online: &QNetwork) -> Self {
        Self { net: online.net.clone() }
    }

    pub fn predict(&self, states: &[State]) -> Vec<Vec<f32>> {
        self.net.forward_batch(states)
    }

    /// Copies the online network's current parameters.
    pub fn sync_from(&mut self, online: &QNetwork) {
        self.net.copy_from(&online.net);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::replay_buffer::experience;
    use crate::utils::seeded_rng;

    fn small_cfg() -> Config {
        Config { hidden: 16, ..Config::default() }
    }

    fn probes() -> Vec<State> {
        (0..4)
            .map(|i| {
                let mut s = [0.0; crate::encoder::STATE_DIM];
                s.iter_mut().enumerate().for_each(|(j, v)| *v = ((i * 3 + j) as f32 * 0.37).sin());
                s
            })
            .collect()
    }

    #[test]
    fn greedy_is_argmax_of_predict() {
        let q = QNetwork::new(&small_cfg(), &mut seeded_rng(1)).unwrap();
        for s in probes() {
            let values = &q.predict(&[s])[0];
            assert_eq!(q.choose_greedy_action(&s).index(), argmax(values));
        }
    }

    #[test]
    fn target_starts_equal_to_online() {
        let q = QNetwork::new(&small_cfg(), &mut seeded_rng(2)).unwrap();
        let t = TargetNetwork::from_online(&q);
        assert_eq!(q.predict(&probes()), t.predict(&probes()));
    }

    #[test]
    fn train_step_moves_only_online() {
        let mut q = QNetwork::new(&small_cfg(), &mut seeded_rng(3)).unwrap();
        let t = TargetNetwork::from_online(&q);
        let frozen = t.predict(&probes());
        let before = q.weights();

        let exps: Vec<Experience> = (0..8)
            .map(|i| experience(i as f32 * 0.1, Action::ALL[i % 6], 1.0, i % 2 == 0))
            .collect();
        let batch: Vec<&Experience> = exps.iter().collect();
        for _ in 0..3 {
            let r = q.train_step(&batch, &t, 0.95).unwrap();
            assert!(r.loss.is_finite());
        }
        assert_ne!(q.weights(), before);
        assert_eq!(t.predict(&probes()), frozen);
    }

    #[test]
    fn repeated_steps_fit_terminal_reward() {
        // done transitions: target is exactly the reward
        let cfg = Config { learning_rate: 0.01, ..small_cfg() };
        let mut q = QNetwork::new(&cfg, &mut seeded_rng(4)).unwrap();
        let t = TargetNetwork::from_online(&q);
        let e = experience(0.5, Action::Shoot, 3.0, true);
        let start_gap = (q.q_values(&e.state)[Action::Shoot.index()] - 3.0).abs();
        let first = q.train_step(&[&e], &t, 0.9).unwrap().loss;
        let mut last = first;
        for _ in 0..200 {
            last = q.train_step(&[&e], &t, 0.9).unwrap().loss;
        }
        assert!(last < first);
        let end_gap = (q.q_values(&e.state)[Action::Shoot.index()] - 3.0).abs();
        assert!(end_gap < start_gap);
    }

    #[test]
    fn loss_only_counts_taken_action() {
        let mut q = QNetwork::new(&small_cfg(), &mut seeded_rng(5)).unwrap();
        let t = TargetNetwork::from_online(&q);
        let e = experience(0.2, Action::MoveUp, 10.0, true);
        let before = q.q_values(&e.state)[Action::MoveUp.index()];
        let r = q.train_step(&[&e], &t, 0.9).unwrap();
        // one sample, one non-zero output error: loss = (q - y)^2 / A
        let err = before - 10.0;
        assert!((r.td.mean - err).abs() < 1e-5);
        let expected = err * err / crate::action::ACTION_COUNT as f32;
        assert!((r.loss - expected).abs() < 1e-3);
    }

    #[test]
    fn sync_copies_weights() {
        let mut q = QNetwork::new(&small_cfg(), &mut seeded_rng(6)).unwrap();
        let mut t = TargetNetwork::from_online(&q);
        let e = experience(0.3, Action::NoOp, -1.0, true);
        q.train_step(&[&e], &t, 0.9).unwrap();
        assert_ne!(q.predict(&probes()), t.predict(&probes()));
        t.sync_from(&q);
        assert_eq!(q.predict(&probes()), t.predict(&probes()));
    }

    #[test]
    fn empty_batch_is_rejected() {
        let mut q = QNetwork::new(&small_cfg(), &mut seeded_rng(7)).unwrap();
        let t = TargetNetwork::from_online(&q);
        assert!(matches!(q.train_step(&[], &t, 0.9), Err(Error::InsufficientData { .. })));
    }

    #[test]
    fn zero_hidden_width_is_a_config_error() {
        let cfg = Config { hidden: 0, ..Config::default() };
        assert!(matches!(QNetwork::new(&cfg, &mut seeded_rng(8)), Err(Error::Config(_))));
    }
}

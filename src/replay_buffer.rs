use rand::Rng;

use crate::action::Action;
use crate::encoder::State;
use crate::error::{Error, Result};

/// A single experience tuple (s, a, r, s', done). Never mutated after creation.
#[derive(Clone, Debug, PartialEq)]
pub struct Experience {
    pub state: State,
    pub action: Action,
    pub reward: f32,
    pub next_state: State,
    pub done: bool,
}

/// Ring replay buffer: fixed capacity, oldest entry evicted first.
///
/// No prioritisation: eviction is strictly by arrival order and sampling is
/// uniform with replacement.
pub struct ReplayBuffer {
    cap: usize,
    buf: Vec<Experience>,
    idx: usize, // next overwrite position == oldest entry once full
}

impl ReplayBuffer {
    pub fn new(capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(Error::Config("replay buffer capacity must be > 0".into()));
        }
        Ok(Self { cap: capacity, buf: Vec::with_capacity(capacity), idx: 0 })
    }

    pub fn len(&self) -> usize { self.buf.len() }

    pub fn is_empty(&self) -> bool { self.buf.is_empty() }

    pub fn capacity(&self) -> usize { self.cap }

    /// Append; once full, overwrite the oldest entry. O(1).
    pub fn push(&mut self, exp: Experience) {
        if self.buf.len() < self.cap {
            self.buf.push(exp);
        } else {
            self.buf[self.idx] = exp;
            self.idx = (self.idx + 1) % self.cap;
        }
    }

    /// Contents from oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = &Experience> + '_ {
        let (newer, older) = self.buf.split_at(self.idx);
        older.iter().chain(newer.iter())
    }

    /// Draws `size` experiences independently and uniformly, with replacement.
    /// Fails with `InsufficientData` (never a partial batch) when fewer than
    /// `size` experiences are stored.
    pub fn sample_batch<R: Rng + ?Sized>(&self, size: usize, rng: &mut R) -> Result<Vec<&Experience>> {
        if self.buf.len() < size {
            return Err(Error::InsufficientData { have: self.buf.len(), need: size });
        }
        let n = self.buf.len();
        Ok((0..size).map(|_| &self.buf[rng.gen_range(0..n)]).collect())
    }
}

#[cfg(test)]
pub(crate) fn experience(tag: f32, action: Action, reward: f32, done: bool) -> Experience {
    let mut state = [0.0; crate::encoder::STATE_DIM];
    state[0] = tag;
    let mut next_state = state;
    next_state[1] = tag;
    Experience { state, action, reward, next_state, done }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::seeded_rng;

    #[test]
    fn never_exceeds_capacity_and_keeps_last_n_in_order() {
        let cap = 5;
        let mut rb = ReplayBuffer::new(cap).unwrap();
        for i in 0..(cap + 3) {
            rb.push(experience(i as f32, Action::NoOp, 0.0, false));
            assert!(rb.len() <= cap);
        }
        let tags: Vec<f32> = rb.iter().map(|e| e.state[0]).collect();
        assert_eq!(tags, vec![3.0, 4.0, 5.0, 6.0, 7.0]);
    }

    #[test]
    fn zero_capacity_is_a_config_error() {
        assert!(matches!(ReplayBuffer::new(0), Err(Error::Config(_))));
    }

    #[test]
    fn iter_before_full_is_arrival_order() {
        let mut rb = ReplayBuffer::new(10).unwrap();
        for i in 0..4 {
            rb.push(experience(i as f32, Action::Shoot, 1.0, false));
        }
        let tags: Vec<f32> = rb.iter().map(|e| e.state[0]).collect();
        assert_eq!(tags, vec![0.0, 1.0, 2.0, 3.0]);
    }

    #[test]
    fn empty_buffer_refuses_to_sample() {
        let rb = ReplayBuffer::new(100).unwrap();
        let mut rng = seeded_rng(1);
        match rb.sample_batch(10, &mut rng) {
            Err(Error::InsufficientData { have, need }) => {
                assert_eq!(have, 0);
                assert_eq!(need, 10);
            }
            other => panic!("expected InsufficientData, got {:?}", other.map(|b| b.len())),
        }
    }

    #[test]
    fn below_batch_size_refuses_to_sample() {
        let mut rb = ReplayBuffer::new(100).unwrap();
        for i in 0..9 {
            rb.push(experience(i as f32, Action::NoOp, 0.0, false));
        }
        let mut rng = seeded_rng(1);
        assert!(rb.sample_batch(10, &mut rng).is_err());
        rb.push(experience(9.0, Action::NoOp, 0.0, false));
        assert_eq!(rb.sample_batch(10, &mut rng).unwrap().len(), 10);
    }

    #[test]
    fn sampling_is_with_replacement_and_seeded() {
        let mut rb = ReplayBuffer::new(4).unwrap();
        for i in 0..2 {
            rb.push(experience(i as f32, Action::NoOp, 0.0, false));
        }
        let a: Vec<f32> = rb.sample_batch(2, &mut seeded_rng(9)).unwrap().iter().map(|e| e.state[0]).collect();
        let b: Vec<f32> = rb.sample_batch(2, &mut seeded_rng(9)).unwrap().iter().map(|e| e.state[0]).collect();
        assert_eq!(a, b);

        let mut rng = seeded_rng(3);
        let mut seen = [0usize; 2];
        let mut repeats = 0;
        for _ in 0..200 {
            let batch = rb.sample_batch(2, &mut rng).unwrap();
            if batch[0].state[0] == batch[1].state[0] {
                repeats += 1;
            }
            for e in batch {
                seen[e.state[0] as usize] += 1;
            }
        }
        assert!(repeats > 0);
        assert!(seen[0] > 100 && seen[1] > 100);
    }
}

//! Small kinematic air-hockey table. Drives the binary and the end-to-end
//! tests; the real game simulation plugs in through `runner::Environment`.

use rand::Rng;
use rand::rngs::StdRng;

use crate::action::{Action, ActionEffect};
use crate::encoder::{Paddle, Puck, TableGeometry, TableSnapshot, Touch};
use crate::reward::StepFlags;
use crate::runner::Environment;
use crate::utils::seeded_rng;

const TABLE_W: f32 = 400.0;
const TABLE_H: f32 = 200.0;
const PUCK_MAX_SPEED: f32 = 12.0;
const PADDLE_SPEED: f32 = 4.0;
const OPPONENT_SPEED: f32 = 2.5;
const REACH: f32 = 16.0;      // paddle radius + puck radius
const SHOT_SPEED: f32 = 10.0;
const PUSH_SPEED: f32 = 5.0;
const FRICTION: f32 = 0.995;
const GOAL_HALF: f32 = 40.0;  // half of the goal mouth
const HOME_OFFSET: f32 = 30.0;

/// Default clock: one minute at 60 ticks per second.
pub const DEFAULT_EPISODE_TICKS: u64 = 3600;

pub struct PuckTable {
    snap: TableSnapshot,   // current world state
    pending: ActionEffect, // agent move applied on the next step
    rng: StdRng,           // serve direction after a reset
    ticks: u64,            // steps since the last reset
    max_ticks: u64,        // episode clock
}

impl PuckTable {
    pub fn new(seed: u64, max_ticks: u64) -> Self {
        let table = TableGeometry {
            left: 0.0,
            right: TABLE_W,
            top: 0.0,
            bottom: TABLE_H,
            puck_max_speed: PUCK_MAX_SPEED,
        };
        let mut t = Self {
            snap: TableSnapshot {
                table,
                puck: Puck::default(),
                agent: Paddle::default(),
                opponent: Paddle::default(),
                last_touch: None,
            },
            pending: Action::NoOp.effect(),
            rng: seeded_rng(seed),
            ticks: 0,
            max_ticks,
        };
        t.reset();
        t
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    fn move_agent(&mut self) -> bool {
        let t = self.snap.table;
        let a = &mut self.snap.agent;
        a.x = (a.x + self.pending.dx * PADDLE_SPEED).clamp(t.left, t.right);
        a.y = (a.y + self.pending.dy * PADDLE_SPEED).clamp(t.top, t.bottom);
        // crossing the centre line is a foul; the paddle is put back
        if a.x > t.center_x() {
            a.x = t.center_x();
            return true;
        }
        false
    }

    fn agent_contact(&mut self) {
        let (agent, puck) = (self.snap.agent, self.snap.puck);
        if dist(agent.x, agent.y, puck.x, puck.y) > REACH {
            return;
        }
        let t = self.snap.table;
        let (ux, uy) = if self.pending.shoot {
            unit(t.right - puck.x, t.center_y() - puck.y)
        } else {
            unit(puck.x - agent.x, puck.y - agent.y)
        };
        let speed = if self.pending.shoot { SHOT_SPEED } else { PUSH_SPEED };
        self.snap.puck.vx = ux * speed;
        self.snap.puck.vy = uy * speed;
        self.snap.last_touch = Some(Touch::Agent);
    }

    fn move_opponent(&mut self) {
        let t = self.snap.table;
        let puck = self.snap.puck;
        let o = &mut self.snap.opponent;
        let goal_x = if puck.x > t.center_x() { puck.x } else { t.right - HOME_OFFSET };
        o.x += (goal_x - o.x).clamp(-OPPONENT_SPEED, OPPONENT_SPEED);
        o.y += (puck.y - o.y).clamp(-OPPONENT_SPEED, OPPONENT_SPEED);
        o.x = o.x.clamp(t.center_x(), t.right);
        o.y = o.y.clamp(t.top, t.bottom);

        if dist(o.x, o.y, puck.x, puck.y) <= REACH {
            let (ux, uy) = unit(t.left - puck.x, t.center_y() - puck.y);
            self.snap.puck.vx = ux * SHOT_SPEED * 0.8;
            self.snap.puck.vy = uy * SHOT_SPEED * 0.8;
            self.snap.last_touch = Some(Touch::Opponent);
        }
    }

    /// Moves the puck and reports `(scored, conceded)`.
    fn move_puck(&mut self) -> (bool, bool) {
        let t = self.snap.table;
        let p = &mut self.snap.puck;
        let speed = p.vx.hypot(p.vy);
        if speed > PUCK_MAX_SPEED {
            p.vx *= PUCK_MAX_SPEED / speed;
            p.vy *= PUCK_MAX_SPEED / speed;
        }
        p.x += p.vx;
        p.y += p.vy;
        p.vx *= FRICTION;
        p.vy *= FRICTION;

        if p.y < t.top {
            p.y = 2.0 * t.top - p.y;
            p.vy = -p.vy;
        } else if p.y > t.bottom {
            p.y = 2.0 * t.bottom - p.y;
            p.vy = -p.vy;
        }

        let in_mouth = (p.y - t.center_y()).abs() <= GOAL_HALF;
        if p.x >= t.right {
            if in_mouth {
                return (true, false);
            }
            p.x = 2.0 * t.right - p.x;
            p.vx = -p.vx;
        } else if p.x <= t.left {
            if in_mouth {
                return (false, true);
            }
            p.x = 2.0 * t.left - p.x;
            p.vx = -p.vx;
        }
        (false, false)
    }
}

impl Environment for PuckTable {
    fn snapshot(&self) -> TableSnapshot {
        self.snap
    }

    fn apply_action(&mut self, action: Action) {
        self.pending = action.effect();
    }

    fn step(&mut self) -> StepFlags {
        let caused_foul = self.move_agent();
        self.agent_contact();
        self.move_opponent();
        let (scored, conceded) = self.move_puck();
        self.pending = Action::NoOp.effect();
        self.ticks += 1;

        let time_up = self.ticks >= self.max_ticks;
        StepFlags { scored, conceded, caused_foul, episode_done: scored || conceded || time_up }
    }

    /// Paddles back home, puck on the centre spot with a small random serve.
    fn reset(&mut self) {
        let t = self.snap.table;
        self.snap.agent = Paddle { x: t.left + HOME_OFFSET, y: t.center_y() };
        self.snap.opponent = Paddle { x: t.right - HOME_OFFSET, y: t.center_y() };
        self.snap.puck = Puck {
            x: t.center_x(),
            y: t.center_y(),
            vx: self.rng.gen_range(-3.0..3.0),
            vy: self.rng.gen_range(-2.0..2.0),
        };
        self.snap.last_touch = None;
        self.pending = Action::NoOp.effect();
        self.ticks = 0;
    }
}

// -------- helpers (module-private) --------

fn dist(ax: f32, ay: f32, bx: f32, by: f32) -> f32 {
    (ax - bx).hypot(ay - by)
}

/// Unit vector; points right when the input is degenerate.
fn unit(x: f32, y: f32) -> (f32, f32) {
    let n = x.hypot(y);
    if n < 1e-6 { (1.0, 0.0) } else { (x / n, y / n) }
}

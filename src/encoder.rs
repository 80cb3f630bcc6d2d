//! Raw table entities and their encoding into the network's input vector.
//!
//! The agent always plays the left half; the opponent goal is on the right
//! edge. Coordinates are in table units with `y` growing downward.

use crate::error::{Error, Result};

/// Length of the encoded state (K).
pub const STATE_DIM: usize = 8;

/// Encoded, normalized observation.
pub type State = [f32; STATE_DIM];

/// Playing-field extents.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TableGeometry {
    pub left: f32,   // agent goal line
    pub right: f32,  // opponent goal line
    pub top: f32,
    pub bottom: f32,
    pub puck_max_speed: f32, // velocities are divided by this
}

impl TableGeometry {
    /// Field laid out inside a `w` x `h` viewport the way the game screen
    /// does it: side padding, a header band on top and a thin footer.
    pub fn from_viewport(w: f32, h: f32, puck_max_speed: f32) -> Self {
        let padding = (w * 0.06).min(60.0);
        Self {
            left: padding,
            right: w - padding,
            top: h * 0.18,
            bottom: h - h * 0.08,
            puck_max_speed,
        }
    }

    pub fn width(&self) -> f32 { self.right - self.left }
    pub fn height(&self) -> f32 { self.bottom - self.top }
    pub fn center_x(&self) -> f32 { (self.left + self.right) / 2.0 }
    pub fn center_y(&self) -> f32 { (self.top + self.bottom) / 2.0 }

    fn validate(&self) -> Result<()> {
        for (field, v) in [
            ("table.left", self.left),
            ("table.right", self.right),
            ("table.top", self.top),
            ("table.bottom", self.bottom),
            ("table.puck_max_speed", self.puck_max_speed),
        ] {
            if !v.is_finite() {
                return Err(Error::NonFiniteInput { field });
            }
        }
        if self.width() <= 0.0 || self.height() <= 0.0 || self.puck_max_speed <= 0.0 {
            return Err(Error::Config(format!("degenerate table geometry: {self:?}")));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Puck {
    pub x: f32,
    pub y: f32,
    pub vx: f32,
    pub vy: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Paddle {
    pub x: f32,
    pub y: f32,
}

/// Which paddle touched the puck last.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Touch {
    Agent,
    Opponent,
}

/// Everything the learning core reads from the simulation after a step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TableSnapshot {
    pub table: TableGeometry,
    pub puck: Puck,
    pub agent: Paddle,
    pub opponent: Paddle,
    pub last_touch: Option<Touch>, // None until someone hits the puck
}

/// Encodes a snapshot into
/// `[puck.x, puck.y, puck.vx, puck.vy, agent.x, agent.y, opponent.x, opponent.y]`.
///
/// Positions are offsets from the table centre divided by the half-extents,
/// velocities are divided by the puck's top speed, so every component is
/// roughly in `[-1, 1]`. Pure: the same snapshot always gives the same vector.
///
/// Non-finite inputs are rejected instead of clamped.
pub fn encode(snap: &TableSnapshot) -> Result<State> {
    let t = &snap.table;
    t.validate()?;

    let raw = [
        ("puck.x", snap.puck.x),
        ("puck.y", snap.puck.y),
        ("puck.vx", snap.puck.vx),
        ("puck.vy", snap.puck.vy),
        ("agent.x", snap.agent.x),
        ("agent.y", snap.agent.y),
        ("opponent.x", snap.opponent.x),
        ("opponent.y", snap.opponent.y),
    ];
    if let Some((field, _)) = raw.iter().find(|(_, v)| !v.is_finite()) {
        return Err(Error::NonFiniteInput { field: *field });
    }

    let half_w = t.width() / 2.0;
    let half_h = t.height() / 2.0;
    let (cx, cy) = (t.center_x(), t.center_y());
    let nx = |x: f32| (x - cx) / half_w;
    let ny = |y: f32| (y - cy) / half_h;

    Ok([
        nx(snap.puck.x),
        ny(snap.puck.y),
        snap.puck.vx / t.puck_max_speed,
        snap.puck.vy / t.puck_max_speed,
        nx(snap.agent.x),
        ny(snap.agent.y),
        nx(snap.opponent.x),
        ny(snap.opponent.y),
    ])
}

#[cfg(test)]
pub(crate) fn test_snapshot() -> TableSnapshot {
    let table = TableGeometry { left: 0.0, right: 200.0, top: 0.0, bottom: 100.0, puck_max_speed: 50.0 };
    TableSnapshot {
        table,
        puck: Puck { x: 100.0, y: 50.0, vx: 0.0, vy: 0.0 },
        agent: Paddle { x: 30.0, y: 50.0 },
        opponent: Paddle { x: 170.0, y: 50.0 },
        last_touch: None,
    }
}

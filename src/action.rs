//! Discrete action space of the agent's paddle.

/// Number of actions the network outputs Q-values for.
pub const ACTION_COUNT: usize = 6;

#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum Action {
    MoveUp,
    MoveDown,
    MoveLeft,
    MoveRight,
    Shoot,
    NoOp,
}

/// What an action asks the environment to do this tick.
/// `dx`/`dy` are unit steering directions (screen coordinates, y grows downward).
#[derive(Copy, Clone, PartialEq, Debug)]
pub struct ActionEffect {
    pub dx: f32,
    pub dy: f32,
    pub shoot: bool,
}

/// Index order is the network's output order and must not change between
/// saved models.
const TABLE: [(Action, ActionEffect); ACTION_COUNT] = [
    (Action::MoveUp,    ActionEffect { dx: 0.0,  dy: -1.0, shoot: false }),
    (Action::MoveDown,  ActionEffect { dx: 0.0,  dy: 1.0,  shoot: false }),
    (Action::MoveLeft,  ActionEffect { dx: -1.0, dy: 0.0,  shoot: false }),
    (Action::MoveRight, ActionEffect { dx: 1.0,  dy: 0.0,  shoot: false }),
    (Action::Shoot,     ActionEffect { dx: 0.0,  dy: 0.0,  shoot: true }),
    (Action::NoOp,      ActionEffect { dx: 0.0,  dy: 0.0,  shoot: false }),
];

impl Action {
    pub const ALL: [Action; ACTION_COUNT] = [
        Action::MoveUp,
        Action::MoveDown,
        Action::MoveLeft,
        Action::MoveRight,
        Action::Shoot,
        Action::NoOp,
    ];

    /// Network output index -> action. `None` outside `0..ACTION_COUNT`.
    pub fn from_index(i: usize) -> Option<Action> {
        Self::ALL.get(i).copied()
    }

    pub fn index(self) -> usize {
        match self {
            Action::MoveUp => 0,
            Action::MoveDown => 1,
            Action::MoveLeft => 2,
            Action::MoveRight => 3,
            Action::Shoot => 4,
            Action::NoOp => 5,
        }
    }

    pub fn effect(self) -> ActionEffect {
        TABLE[self.index()].1
    }
}

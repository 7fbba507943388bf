//! ---
//! sim_section: "03-cell-lifecycle"
//! sim_subsection: "module"
//! sim_type: "source"
//! sim_scope: "code"
//! sim_description: "Cell lifecycle, directories, and automatic failure transitions."
//! sim_version: "v0.0.0-prealpha"
//! sim_owner: "tbd"
//! ---
use serde::{Deserialize, Serialize};

/// Operational states, ordered `Dormant < Active < Draining < Asleep`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CellState {
    #[default]
    Dormant,
    Active,
    Draining,
    Asleep,
}

impl CellState {
    fn forward(self) -> Option<CellState> {
        match self {
            CellState::Dormant => Some(CellState::Active),
            CellState::Active => Some(CellState::Draining),
            CellState::Draining => Some(CellState::Asleep),
            CellState::Asleep => None,
        }
    }

    fn backward(self) -> Option<CellState> {
        match self {
            CellState::Dormant => None,
            CellState::Active => Some(CellState::Dormant),
            CellState::Draining => Some(CellState::Active),
            CellState::Asleep => Some(CellState::Draining),
        }
    }
}

impl std::fmt::Display for CellState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            CellState::Dormant => "DORMANT",
            CellState::Active => "ACTIVE",
            CellState::Draining => "DRAINING",
            CellState::Asleep => "ASLEEP",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum LifecycleAction {
    Activate,
    MarkDegraded,
    Retreat,
    /// Reserved for the failure watcher.
    AdvanceAutomatically,
}

impl LifecycleAction {
    /// States from which the action is accepted.
    pub fn required(self) -> &'static [CellState] {
        match self {
            LifecycleAction::Activate => &[CellState::Dormant],
            LifecycleAction::MarkDegraded => &[CellState::Active],
            LifecycleAction::Retreat => &[CellState::Active, CellState::Draining, CellState::Asleep],
            LifecycleAction::AdvanceAutomatically => &[CellState::Draining],
        }
    }
}

/// Immutable lifecycle value. Transitions yield a new value instead of mutating this one.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CellLifecycle {
    state: CellState,
}

/// Result of applying a [`LifecycleAction`].
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Transition {
    Changed {
        from: CellState,
        to: CellLifecycle,
    },
    Rejected {
        state: CellState,
        action: LifecycleAction,
        required: &'static [CellState],
    },
}

impl Transition {
    pub fn is_changed(&self) -> bool {
        matches!(self, Transition::Changed { .. })
    }
}

impl CellLifecycle {
    pub const fn new(state: CellState) -> Self {
        Self { state }
    }

    pub fn state(&self) -> CellState {
        self.state
    }

    pub fn apply(self, action: LifecycleAction) -> Transition {
        match transition(self.state, action) {
            Some(next) => Transition::Changed {
                from: self.state,
                to: CellLifecycle::new(next),
            },
            None => Transition::Rejected {
                state: self.state,
                action,
                required: action.required(),
            },
        }
    }
}

/// Pure transition function. Every accepted move is exactly one step in the ordering.
pub fn transition(state: CellState, action: LifecycleAction) -> Option<CellState> {
    if !action.required().contains(&state) {
        return None;
    }
    match action {
        LifecycleAction::Activate
        | LifecycleAction::MarkDegraded
        | LifecycleAction::AdvanceAutomatically => state.forward(),
        LifecycleAction::Retreat => state.backward(),
    }
}

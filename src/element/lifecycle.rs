//! Stage lifecycle: `Inactive -> Active -> Inactive`.
//!
//! The scheduler calls [`Lifecycle::activate`] before the first cycle and
//! [`Lifecycle::deactivate`] on teardown. Configuration setters that change
//! what a live stage reads or writes run a deactivate + reconfigure +
//! activate sequence while holding the stage's lock, so the scheduler never
//! observes the intermediate state.

use crate::error::Result;

/// Lifecycle state of a stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StageState {
    /// Not running; holds no file or descriptor.
    #[default]
    Inactive,
    /// Running; cycles may be issued.
    Active,
}

impl StageState {
    /// Whether the stage is active.
    #[inline]
    pub fn is_active(self) -> bool {
        self == StageState::Active
    }
}

impl std::fmt::Display for StageState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StageState::Inactive => f.write_str("inactive"),
            StageState::Active => f.write_str("active"),
        }
    }
}

/// Activation control for a stage.
pub trait Lifecycle {
    /// Open or map the stage's file and start accepting cycles.
    ///
    /// Configuration errors are raised here, before any cycle runs.
    fn activate(&self) -> Result<()>;

    /// Release the mapping or close the descriptor. Idempotent.
    fn deactivate(&self) -> Result<()>;

    /// Current lifecycle state.
    fn state(&self) -> StageState;

    /// Whether the stage is active.
    fn is_active(&self) -> bool {
        self.state().is_active()
    }
}

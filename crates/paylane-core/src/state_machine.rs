use std::fmt;

use crate::error::CoreError;

/// The 5 states of a payment channel lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum ChannelState {
    /// Channel has been opened but not yet confirmed.
    Pending,
    /// Channel is live: micropayments, streams, and usage charges apply.
    Active,
    /// Channel is paused: balances frozen, streams suspended.
    Paused,
    /// Close requested; awaiting settlement. Streams are stopped.
    Closing,
    /// Settled and archived. Final state.
    Closed,
}

impl ChannelState {
    /// Whether this is the terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Closed)
    }
}

impl fmt::Display for ChannelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "Pending"),
            Self::Active => write!(f, "Active"),
            Self::Paused => write!(f, "Paused"),
            Self::Closing => write!(f, "Closing"),
            Self::Closed => write!(f, "Closed"),
        }
    }
}

/// Events that trigger channel state transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelEvent {
    /// The opening deposit was confirmed.
    Confirm,
    /// The channel owner paused the channel.
    Pause,
    /// The channel owner resumed a paused channel.
    Resume,
    /// Close was requested.
    Close,
    /// Settlement completed successfully.
    Settle,
}

impl ChannelEvent {
    /// The state this event drives a channel toward.
    pub fn target(&self) -> ChannelState {
        match self {
            Self::Confirm => ChannelState::Active,
            Self::Pause => ChannelState::Paused,
            Self::Resume => ChannelState::Active,
            Self::Close => ChannelState::Closing,
            Self::Settle => ChannelState::Closed,
        }
    }
}

/// Result of a transition attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionOutcome {
    /// The channel moved to a new state.
    Applied(ChannelState),
    /// The event was a repeat of an already-applied transition; no change.
    NoChange,
}

/// Manages channel state transitions.
///
/// Valid transitions:
/// - Pending → Active (Confirm)
/// - Active → Paused (Pause)
/// - Paused → Active (Resume)
/// - Active | Paused → Closing (Close)
/// - Closing → Closed (Settle)
///
/// Repeating an already-applied transition (Confirm on Active, Pause on
/// Paused, Resume on Active, Close on Closing) is a no-op success. Settle
/// requires forward progress and is only valid from Closing. No transition
/// leaves Closed.
pub struct ChannelStateMachine;

impl ChannelStateMachine {
    /// Attempt a state transition based on an event.
    ///
    /// Returns the outcome on success, or `InvalidTransition` for illegal
    /// moves — the caller's state is left untouched in that case.
    pub fn transition(
        current: ChannelState,
        event: ChannelEvent,
    ) -> Result<TransitionOutcome, CoreError> {
        use ChannelEvent as E;
        use ChannelState as S;

        let outcome = match (current, event) {
            (S::Pending, E::Confirm) => TransitionOutcome::Applied(S::Active),
            (S::Active, E::Pause) => TransitionOutcome::Applied(S::Paused),
            (S::Paused, E::Resume) => TransitionOutcome::Applied(S::Active),
            (S::Active, E::Close) | (S::Paused, E::Close) => {
                TransitionOutcome::Applied(S::Closing)
            }
            (S::Closing, E::Settle) => TransitionOutcome::Applied(S::Closed),

            // Idempotent repeats of already-applied transitions.
            (S::Active, E::Confirm)
            | (S::Paused, E::Pause)
            | (S::Active, E::Resume)
            | (S::Closing, E::Close) => TransitionOutcome::NoChange,

            _ => {
                return Err(CoreError::InvalidTransition {
                    from: current,
                    to: event.target(),
                });
            }
        };

        if let TransitionOutcome::Applied(new_state) = outcome {
            tracing::debug!(
                from = %current,
                to = %new_state,
                event = ?event,
                "channel state transition"
            );
        }

        Ok(outcome)
    }

    /// Check if a transition is valid without performing it.
    pub fn can_transition(current: ChannelState, event: ChannelEvent) -> bool {
        Self::transition(current, event).is_ok()
    }
}

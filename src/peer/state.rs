use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle of one peer negotiation round.
///
/// `Created -> OfferPending -> Stable` for offerers,
/// `Created -> AnswerPending -> Stable` for answerers. `Failed` and
/// `Closed` are reachable from anywhere; nothing leaves `Closed`.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum NegotiationState {
    Created,
    OfferPending,
    AnswerPending,
    Stable,
    Failed,
    Closed,
}

impl NegotiationState {
    /// True once the session no longer reacts to negotiation input.
    pub fn is_terminal(self) -> bool {
        matches!(self, NegotiationState::Failed | NegotiationState::Closed)
    }
}

impl fmt::Display for NegotiationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            NegotiationState::Created => "created",
            NegotiationState::OfferPending => "offer-pending",
            NegotiationState::AnswerPending => "answer-pending",
            NegotiationState::Stable => "stable",
            NegotiationState::Failed => "failed",
            NegotiationState::Closed => "closed",
        };
        f.write_str(name)
    }
}

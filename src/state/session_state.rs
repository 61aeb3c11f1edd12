/// Session state definitions for the per-session crawl state machine
///
/// This module defines every state a session can occupy and which
/// transitions between them are legal.
use std::fmt;

/// Represents the current state of a harvesting session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    // ===== Active States =====
    /// Cookie scope and rendering context are being allocated
    Init,

    /// Capability probe is being built and submitted to the gate
    Handshake,

    /// Start URL is being visited to establish the session
    Home,

    /// First listing page of the session's partition
    Listing,

    /// A listing page reached through a pagination link
    Pagination,

    /// An accommodation detail page
    Detail,

    // ===== Terminal States =====
    /// Every scheduled visit completed
    Done,

    /// A navigation failed permanently or exhausted its retry budget
    Failed,
}

impl SessionState {
    /// Returns true if no further transitions are possible
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }

    /// Returns true if the session is still running
    pub fn is_active(&self) -> bool {
        !self.is_terminal()
    }

    /// Returns true if `next` is a legal successor of this state
    ///
    /// `Failed` is reachable from every active state.
    pub fn can_transition_to(&self, next: SessionState) -> bool {
        use SessionState::*;

        if self.is_active() && next == Failed {
            return true;
        }

        matches!(
            (self, next),
            (Init, Handshake)
                | (Init, Home)
                | (Handshake, Home)
                | (Home, Listing)
                | (Listing, Detail)
                | (Listing, Pagination)
                | (Listing, Done)
                | (Pagination, Detail)
                | (Pagination, Pagination)
                | (Pagination, Done)
                | (Detail, Detail)
                | (Detail, Pagination)
                | (Detail, Done)
        )
    }

    /// Short lowercase label used in logs
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Init => "init",
            Self::Handshake => "handshake",
            Self::Home => "home",
            Self::Listing => "listing",
            Self::Pagination => "pagination",
            Self::Detail => "detail",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }

    /// Returns all possible session states
    pub fn all_states() -> Vec<Self> {
        vec![
            Self::Init,
            Self::Handshake,
            Self::Home,
            Self::Listing,
            Self::Pagination,
            Self::Detail,
            Self::Done,
            Self::Failed,
        ]
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

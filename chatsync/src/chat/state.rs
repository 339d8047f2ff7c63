//! Relationship lifecycle seen from one user.

/// Where a pair of users stands, from the current user's point of view.
///
/// ```text
/// None ──send_request──▶ WaitingSent      (sender)
///                        WaitingReceived  (receiver) ──accept──▶ Active
///                                                    └─reject──▶ Rejected
/// ```
///
/// `Rejected` is terminal and never read back from the store: the
/// relationship is deleted, so a later query reports `None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RelationshipState {
    /// No relationship in either namespace.
    None,
    /// The current user sent a request that is still pending.
    WaitingSent,
    /// The peer sent a request the current user has not answered.
    WaitingReceived,
    /// Both users can message each other.
    Active,
    /// The request was rejected and deleted.
    Rejected,
}

impl RelationshipState {
    /// Derives the state from which rows exist.
    ///
    /// An active row wins over any stale waiting row.
    #[must_use]
    pub const fn from_rows(active: bool, waiting_received: bool, waiting_sent: bool) -> Self {
        if active {
            Self::Active
        } else if waiting_received {
            Self::WaitingReceived
        } else if waiting_sent {
            Self::WaitingSent
        } else {
            Self::None
        }
    }

    /// Whether a new request may be sent in this state.
    #[must_use]
    pub const fn can_request(self) -> bool {
        matches!(self, Self::None | Self::Rejected)
    }

    /// Whether messages may be exchanged in this state.
    #[must_use]
    pub const fn can_message(self) -> bool {
        matches!(self, Self::Active)
    }
}

impl std::fmt::Display for RelationshipState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::None => "none",
            Self::WaitingSent => "waiting_sent",
            Self::WaitingReceived => "waiting_received",
            Self::Active => "active",
            Self::Rejected => "rejected",
        };
        f.write_str(name)
    }
}

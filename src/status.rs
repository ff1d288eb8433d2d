//! Listing and withdrawal status machines
//!
//! Statuses are stored as their lowercase symbolic value (`TEXT` column,
//! JSON string in the cache).
//!
//! ```text
//! Listing:     PENDING ──approve──▶ APPROVED ──purchase──▶ SOLD
//!                 └─────reject────▶ REJECTED
//!
//! Withdrawal:  PENDING ──fulfil──▶ COMPLETED
//! ```
//!
//! Every transition is applied by the store as a guarded update: the write
//! only happens if the row still carries the expected pre-state, checked in
//! the same transaction. A lost race reports `Conflict`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("unknown status value: {0}")]
pub struct UnknownStatus(pub String);

/// A status enum usable by the guarded-update machinery
pub trait StatusMachine: Copy + Eq + fmt::Display + 'static {
    /// Status every new row starts in
    const INITIAL: Self;

    /// Whether `self -> to` is an edge of the machine
    fn can_transition_to(self, to: Self) -> bool;

    /// No more transitions possible
    fn is_terminal(self) -> bool;

    /// Stored symbolic value
    fn as_str(self) -> &'static str;
}

// ============================================================================
// Listing
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ListingStatus {
    /// Awaiting moderation; the only status where field edits are allowed
    Pending,
    /// Visible in the catalogue and purchasable
    Approved,
    /// Terminal: refused by moderation
    Rejected,
    /// Terminal: bought through the ledger
    Sold,
}

impl ListingStatus {
    pub const ALL: [ListingStatus; 4] = [
        ListingStatus::Pending,
        ListingStatus::Approved,
        ListingStatus::Rejected,
        ListingStatus::Sold,
    ];

    /// Fields may only be edited before moderation
    #[inline]
    pub fn is_editable(&self) -> bool {
        matches!(self, ListingStatus::Pending)
    }
}

impl StatusMachine for ListingStatus {
    const INITIAL: Self = ListingStatus::Pending;

    fn can_transition_to(self, to: Self) -> bool {
        matches!(
            (self, to),
            (ListingStatus::Pending, ListingStatus::Approved)
                | (ListingStatus::Pending, ListingStatus::Rejected)
                | (ListingStatus::Approved, ListingStatus::Sold)
        )
    }

    #[inline]
    fn is_terminal(self) -> bool {
        matches!(self, ListingStatus::Rejected | ListingStatus::Sold)
    }

    fn as_str(self) -> &'static str {
        match self {
            ListingStatus::Pending => "pending",
            ListingStatus::Approved => "approved",
            ListingStatus::Rejected => "rejected",
            ListingStatus::Sold => "sold",
        }
    }
}

impl fmt::Display for ListingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ListingStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ListingStatus::Pending),
            "approved" => Ok(ListingStatus::Approved),
            "rejected" => Ok(ListingStatus::Rejected),
            "sold" => Ok(ListingStatus::Sold),
            _ => Err(UnknownStatus(s.to_string())),
        }
    }
}

// ============================================================================
// Withdrawal
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WithdrawalStatus {
    /// Funds already debited, payout not yet made
    Pending,
    /// Terminal: payout confirmed
    Completed,
}

impl StatusMachine for WithdrawalStatus {
    const INITIAL: Self = WithdrawalStatus::Pending;

    fn can_transition_to(self, to: Self) -> bool {
        matches!(
            (self, to),
            (WithdrawalStatus::Pending, WithdrawalStatus::Completed)
        )
    }

    #[inline]
    fn is_terminal(self) -> bool {
        matches!(self, WithdrawalStatus::Completed)
    }

    fn as_str(self) -> &'static str {
        match self {
            WithdrawalStatus::Pending => "pending",
            WithdrawalStatus::Completed => "completed",
        }
    }
}

impl fmt::Display for WithdrawalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WithdrawalStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(WithdrawalStatus::Pending),
            "completed" => Ok(WithdrawalStatus::Completed),
            _ => Err(UnknownStatus(s.to_string())),
        }
    }
}

// ============================================================================
// Transitions
// ============================================================================

/// A checked `from -> to` edge
///
/// Construction fails for edges the machine does not have, so a store only
/// ever receives legal guarded updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition<S: StatusMachine> {
    from: S,
    to: S,
}

impl<S: StatusMachine> Transition<S> {
    pub fn new(from: S, to: S) -> Option<Self> {
        from.can_transition_to(to).then_some(Self { from, to })
    }

    #[inline]
    pub fn from(&self) -> S {
        self.from
    }

    #[inline]
    pub fn to(&self) -> S {
        self.to
    }
}

impl<S: StatusMachine> fmt::Display for Transition<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.from, self.to)
    }
}

/// Moderation verdict on a pending listing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Approve,
    Reject,
}

impl Decision {
    pub fn transition(self) -> Transition<ListingStatus> {
        match self {
            Decision::Approve => LISTING_APPROVE,
            Decision::Reject => LISTING_REJECT,
        }
    }
}

pub const LISTING_APPROVE: Transition<ListingStatus> = Transition {
    from: ListingStatus::Pending,
    to: ListingStatus::Approved,
};

pub const LISTING_REJECT: Transition<ListingStatus> = Transition {
    from: ListingStatus::Pending,
    to: ListingStatus::Rejected,
};

pub const LISTING_SELL: Transition<ListingStatus> = Transition {
    from: ListingStatus::Approved,
    to: ListingStatus::Sold,
};

pub const WITHDRAWAL_FULFIL: Transition<WithdrawalStatus> = Transition {
    from: WithdrawalStatus::Pending,
    to: WithdrawalStatus::Completed,
};

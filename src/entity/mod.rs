//! Entity descriptors
//!
//! The four tables are a closed set, so generic access dispatches over
//! [`EntityKind`] instead of runtime reflection. Each kind carries its table
//! name, the cache-key scheme (`<table>:<id>`) and the snapshot codec.

pub mod models;

pub use models::{
    Account, Listing, ListingEdit, ListingStats, Purchase, UNSAVED_ID, WithdrawalRequest,
};

use serde::Serialize;
use std::fmt;

/// Account primary key
pub type AccountId = i64;

/// Identity of the participant in the conversational front-end
pub type ExternalId = i64;

pub type ListingId = i64;

pub type PurchaseId = i64;

pub type WithdrawalId = i64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Account,
    Listing,
    Purchase,
    Withdrawal,
}

impl EntityKind {
    pub const ALL: [EntityKind; 4] = [
        EntityKind::Account,
        EntityKind::Listing,
        EntityKind::Purchase,
        EntityKind::Withdrawal,
    ];

    /// Backing table name
    pub fn table(&self) -> &'static str {
        match self {
            EntityKind::Account => "accounts",
            EntityKind::Listing => "listings",
            EntityKind::Purchase => "purchases",
            EntityKind::Withdrawal => "withdrawal_requests",
        }
    }

    /// Stable cache key for one row
    pub fn cache_key(&self, id: i64) -> String {
        format!("{}:{}", self.table(), id)
    }

    /// Decode a cached snapshot of this kind
    ///
    /// A payload written for another kind or an older schema fails here and
    /// the caller treats it as a miss.
    pub fn decode(&self, payload: &str) -> serde_json::Result<Entity> {
        Ok(match self {
            EntityKind::Account => Entity::Account(serde_json::from_str(payload)?),
            EntityKind::Listing => Entity::Listing(serde_json::from_str(payload)?),
            EntityKind::Purchase => Entity::Purchase(serde_json::from_str(payload)?),
            EntityKind::Withdrawal => Entity::Withdrawal(serde_json::from_str(payload)?),
        })
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.table())
    }
}

/// One row of any table
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Entity {
    Account(Account),
    Listing(Listing),
    Purchase(Purchase),
    Withdrawal(WithdrawalRequest),
}

impl Entity {
    pub fn kind(&self) -> EntityKind {
        match self {
            Entity::Account(_) => EntityKind::Account,
            Entity::Listing(_) => EntityKind::Listing,
            Entity::Purchase(_) => EntityKind::Purchase,
            Entity::Withdrawal(_) => EntityKind::Withdrawal,
        }
    }

    pub fn id(&self) -> i64 {
        match self {
            Entity::Account(a) => a.id,
            Entity::Listing(l) => l.id,
            Entity::Purchase(p) => p.id,
            Entity::Withdrawal(w) => w.id,
        }
    }

    /// Not yet written to the store
    #[inline]
    pub fn is_unsaved(&self) -> bool {
        self.id() == UNSAVED_ID
    }

    pub fn cache_key(&self) -> String {
        self.kind().cache_key(self.id())
    }

    /// Snapshot for the cache tier
    pub fn encode(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn into_account(self) -> Option<Account> {
        match self {
            Entity::Account(a) => Some(a),
            _ => None,
        }
    }

    pub fn into_listing(self) -> Option<Listing> {
        match self {
            Entity::Listing(l) => Some(l),
            _ => None,
        }
    }

    pub fn into_purchase(self) -> Option<Purchase> {
        match self {
            Entity::Purchase(p) => Some(p),
            _ => None,
        }
    }

    pub fn into_withdrawal(self) -> Option<WithdrawalRequest> {
        match self {
            Entity::Withdrawal(w) => Some(w),
            _ => None,
        }
    }
}

impl From<Account> for Entity {
    fn from(v: Account) -> Self {
        Entity::Account(v)
    }
}

impl From<Listing> for Entity {
    fn from(v: Listing) -> Self {
        Entity::Listing(v)
    }
}

impl From<Purchase> for Entity {
    fn from(v: Purchase) -> Self {
        Entity::Purchase(v)
    }
}

impl From<WithdrawalRequest> for Entity {
    fn from(v: WithdrawalRequest) -> Self {
        Entity::Withdrawal(v)
    }
}

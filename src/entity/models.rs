//! Row models for the four marketplace tables

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{AccountId, ExternalId, ListingId, PurchaseId, WithdrawalId};
use crate::status::{ListingStatus, WithdrawalStatus};

/// Id carried by a model that has not been written to the store yet.
pub const UNSAVED_ID: i64 = 0;

// ============================================================================
// Account
// ============================================================================

/// Market participant
///
/// `balance` never goes below zero in a committed state. It is only moved by
/// the ledger (purchase settlement, withdrawal opening).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Account {
    pub id: AccountId,
    pub external_id: ExternalId,
    pub display_name: Option<String>,
    pub balance: Decimal,
    pub is_admin: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Account {
    /// New account on first contact, zero balance
    pub fn new(external_id: ExternalId, display_name: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            id: UNSAVED_ID,
            external_id,
            display_name,
            balance: Decimal::ZERO,
            is_admin: false,
            created_at: now,
            updated_at: now,
        }
    }

    /// Opening balance for seeded accounts
    pub fn with_balance(mut self, balance: Decimal) -> Self {
        self.balance = balance;
        self
    }

    pub fn with_admin(mut self, is_admin: bool) -> Self {
        self.is_admin = is_admin;
        self
    }
}

// ============================================================================
// Listing
// ============================================================================

/// A good offered for sale
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Listing {
    pub id: ListingId,
    pub owner_id: AccountId,
    pub title: String,
    pub description: String,
    pub price: Decimal,
    pub media: Option<String>,
    pub status: ListingStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Listing {
    /// New listing awaiting moderation
    pub fn new(
        owner_id: AccountId,
        title: impl Into<String>,
        description: impl Into<String>,
        price: Decimal,
        media: Option<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: UNSAVED_ID,
            owner_id,
            title: title.into(),
            description: description.into(),
            price,
            media,
            status: ListingStatus::Pending,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Single-field edit of a pending listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListingEdit {
    Title(String),
    Description(String),
    Price(Decimal),
    Media(Option<String>),
}

impl ListingEdit {
    /// Column touched by this edit
    pub fn field(&self) -> &'static str {
        match self {
            ListingEdit::Title(_) => "title",
            ListingEdit::Description(_) => "description",
            ListingEdit::Price(_) => "price",
            ListingEdit::Media(_) => "media",
        }
    }

    /// Apply the edit to an in-memory copy
    pub fn apply(&self, listing: &mut Listing) {
        match self {
            ListingEdit::Title(v) => listing.title = v.clone(),
            ListingEdit::Description(v) => listing.description = v.clone(),
            ListingEdit::Price(v) => listing.price = *v,
            ListingEdit::Media(v) => listing.media = v.clone(),
        }
        listing.updated_at = Utc::now();
    }
}

// ============================================================================
// Purchase
// ============================================================================

/// Immutable receipt of a completed sale
///
/// `buyer_id` / `listing_id` become `None` when the referenced row is deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Purchase {
    pub id: PurchaseId,
    pub buyer_id: Option<AccountId>,
    pub listing_id: Option<ListingId>,
    pub amount: Decimal,
    pub created_at: DateTime<Utc>,
}

// ============================================================================
// WithdrawalRequest
// ============================================================================

/// Cash-out instruction. Money leaves the account when the request is opened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WithdrawalRequest {
    pub id: WithdrawalId,
    pub account_id: AccountId,
    pub amount: Decimal,
    pub requisites: String,
    pub status: WithdrawalStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Per-account listing counters for the admin report
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ListingStats {
    pub account_id: AccountId,
    pub display_name: Option<String>,
    pub total: i64,
    pub approved: i64,
    pub rejected: i64,
}

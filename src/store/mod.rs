//! Entity Store
//!
//! The durable source of truth. Every multi-row mutation (status transition,
//! purchase settlement, withdrawal opening) runs inside one store transaction
//! and re-reads the rows it guards; the cache is never consulted here.
//!
//! Two implementations share the contract:
//! - [`PgStore`]: PostgreSQL via sqlx, row locks + guarded `UPDATE`s
//! - [`MemoryStore`]: one async mutex over all tables, for tests and local runs

pub mod memory;
pub mod postgres;
pub mod schema;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::entity::{
    Account, AccountId, Entity, EntityKind, ExternalId, Listing, ListingEdit, ListingId,
    ListingStats, Purchase, WithdrawalId, WithdrawalRequest,
};
use crate::error::MarketResult;
use crate::status::{ListingStatus, Transition, WithdrawalStatus};

/// Status predicate for queue queries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusFilter {
    Listings(ListingStatus),
    Withdrawals(WithdrawalStatus),
}

impl StatusFilter {
    pub fn kind(&self) -> EntityKind {
        match self {
            StatusFilter::Listings(_) => EntityKind::Listing,
            StatusFilter::Withdrawals(_) => EntityKind::Withdrawal,
        }
    }

    /// Stored symbolic value to match
    pub fn status_str(&self) -> &'static str {
        use crate::status::StatusMachine;
        match self {
            StatusFilter::Listings(s) => s.as_str(),
            StatusFilter::Withdrawals(s) => s.as_str(),
        }
    }
}

/// Rows matching a filter, ordered by ascending id
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusQuery {
    pub filter: StatusFilter,
    pub offset: i64,
    pub limit: i64,
}

/// Committed effects of one purchase
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settlement {
    pub purchase: Purchase,
    pub buyer: Account,
    pub seller: Account,
    pub listing: Listing,
}

/// Committed effects of opening a withdrawal
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WithdrawalOpened {
    pub request: WithdrawalRequest,
    pub account: Account,
    /// Amount the caller asked for, before clamping
    pub requested: Decimal,
}

#[async_trait]
pub trait EntityStore: Send + Sync {
    /// Idempotent schema creation
    async fn ensure_schema(&self) -> MarketResult<()>;

    async fn health_check(&self) -> MarketResult<()>;

    async fn fetch(&self, kind: EntityKind, id: i64) -> MarketResult<Option<Entity>>;

    /// Insert (unsaved id) or update an entity, returning the stored state
    ///
    /// New listings and withdrawals are always inserted in their initial
    /// status. Updates never write listing/withdrawal `status` or account
    /// `balance`; purchases are insert-only.
    async fn save(&self, entity: Entity) -> MarketResult<Entity>;

    /// Delete one row, applying cascade/nullify rules
    ///
    /// Returns every row the delete touched (the row itself first, then
    /// cascaded or nullified rows) so cached copies can be dropped. Empty
    /// if the row did not exist.
    async fn remove(&self, kind: EntityKind, id: i64) -> MarketResult<Vec<(EntityKind, i64)>>;

    async fn account_by_identity(&self, external_id: ExternalId)
    -> MarketResult<Option<Account>>;

    async fn query(&self, query: StatusQuery) -> MarketResult<Vec<Entity>>;

    async fn count(&self, filter: StatusFilter) -> MarketResult<i64>;

    /// Guarded listing transition: `Conflict` if the row left `from()`
    async fn transition_listing(
        &self,
        id: ListingId,
        transition: Transition<ListingStatus>,
    ) -> MarketResult<Listing>;

    /// Guarded withdrawal transition: `Conflict` if the row left `from()`
    async fn transition_withdrawal(
        &self,
        id: WithdrawalId,
        transition: Transition<WithdrawalStatus>,
    ) -> MarketResult<WithdrawalRequest>;

    /// Edit one field of a listing that is still pending
    async fn edit_listing(&self, id: ListingId, edit: &ListingEdit) -> MarketResult<Listing>;

    /// Purchase settlement in one transaction (see [`crate::ledger`])
    async fn settle_purchase(
        &self,
        buyer_id: AccountId,
        listing_id: ListingId,
    ) -> MarketResult<Settlement>;

    /// Debit the account and insert a pending request in one transaction
    async fn open_withdrawal(
        &self,
        account_id: AccountId,
        requested: Decimal,
        requisites: &str,
    ) -> MarketResult<WithdrawalOpened>;

    /// Per-account listing counters, ordered by account id
    async fn listing_stats(&self) -> MarketResult<Vec<ListingStats>>;
}

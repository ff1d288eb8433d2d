//! Listing Market - transactional core of a peer-to-peer listing marketplace
//!
//! Participants submit listings for moderation, browse approved listings,
//! buy them with their balance, and cash out. This crate is the part with
//! real correctness hazards: money movement, double moderation, stale cache.
//!
//! # Modules
//!
//! - [`entity`] - The four tables (Account, Listing, Purchase, WithdrawalRequest)
//! - [`status`] - Listing and withdrawal status machines, guarded transitions
//! - [`ledger`] - Purchase and withdrawal balance rules
//! - [`store`] - Entity Store contract, PostgreSQL and in-memory implementations
//! - [`cache`] - Best-effort cache tier (Redis, in-memory)
//! - [`repository`] - Cache-aside accessor
//! - [`queue`] - One-item-per-page status queues with lookahead
//! - [`notifier`] - Post-commit counterparty notifications
//! - [`market`] - Operations exposed to the conversational front-end
//!
//! ```text
//! front-end ──▶ Marketplace ──▶ EntityStore (tx, guarded updates)
//!                   │  └──────▶ EntityRepository ──▶ CacheTier
//!                   └─────────▶ NotificationDispatcher ──▶ Notifier
//! ```

// Domain model
pub mod amount;
pub mod entity;
pub mod error;
pub mod ledger;
pub mod status;

// Backends
pub mod cache;
pub mod store;

// Services
pub mod context;
pub mod market;
pub mod notifier;
pub mod queue;
pub mod repository;

// Ambient
pub mod config;
pub mod logging;

// Convenient re-exports at crate root
pub use context::{Health, MarketContext};
pub use entity::{
    Account, AccountId, Entity, EntityKind, ExternalId, Listing, ListingEdit, ListingId,
    ListingStats, Purchase, WithdrawalId, WithdrawalRequest,
};
pub use error::{MarketError, MarketResult};
pub use market::Marketplace;
pub use notifier::{Delivery, LogNotifier, Notice, NotificationDispatcher, Notifier, NotifyError};
pub use queue::{Navigation, Page};
pub use status::{Decision, ListingStatus, StatusMachine, Transition, WithdrawalStatus};

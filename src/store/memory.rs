//! In-memory Entity Store
//!
//! All four tables sit behind one async mutex. Every operation takes the lock
//! once, validates against the current rows, then mutates without awaiting,
//! so no other task ever observes a half-applied change. Cascade and nullify
//! rules match the PostgreSQL foreign keys.

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use tokio::sync::Mutex;

use super::{EntityStore, Settlement, StatusFilter, StatusQuery, WithdrawalOpened};
use crate::entity::{
    Account, AccountId, Entity, EntityKind, ExternalId, Listing, ListingEdit, ListingId,
    ListingStats, Purchase, UNSAVED_ID, WithdrawalId, WithdrawalRequest,
};
use crate::error::{MarketError, MarketResult};
use crate::ledger;
use crate::status::{
    LISTING_SELL, ListingStatus, StatusMachine, Transition, WithdrawalStatus,
};

#[derive(Default)]
struct Tables {
    accounts: BTreeMap<AccountId, Account>,
    listings: BTreeMap<ListingId, Listing>,
    purchases: BTreeMap<i64, Purchase>,
    withdrawals: BTreeMap<WithdrawalId, WithdrawalRequest>,
    last_id: [i64; 4],
}

impl Tables {
    fn next_id(&mut self, kind: EntityKind) -> i64 {
        let slot = match kind {
            EntityKind::Account => 0,
            EntityKind::Listing => 1,
            EntityKind::Purchase => 2,
            EntityKind::Withdrawal => 3,
        };
        self.last_id[slot] += 1;
        self.last_id[slot]
    }

    fn account(&self, id: AccountId) -> MarketResult<&Account> {
        self.accounts
            .get(&id)
            .ok_or_else(|| MarketError::not_found(EntityKind::Account, id))
    }

    fn listing(&self, id: ListingId) -> MarketResult<&Listing> {
        self.listings
            .get(&id)
            .ok_or_else(|| MarketError::not_found(EntityKind::Listing, id))
    }

    fn pending_listing(&self, id: ListingId) -> MarketResult<&Listing> {
        let listing = self.listing(id)?;
        if !listing.status.is_editable() {
            return Err(MarketError::InvalidState {
                kind: EntityKind::Listing,
                id,
                status: listing.status.as_str(),
                reason: "only pending listings can be edited",
            });
        }
        Ok(listing)
    }
}

/// Store for tests and local runs without PostgreSQL
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn save_account(t: &mut Tables, mut account: Account) -> MarketResult<Account> {
        let identity_taken = t
            .accounts
            .values()
            .any(|a| a.external_id == account.external_id && a.id != account.id);

        if account.id == UNSAVED_ID {
            if identity_taken {
                return Err(MarketError::Conflict {
                    kind: EntityKind::Account,
                    id: account.external_id,
                    expected: "unregistered",
                });
            }
            if account.balance < Decimal::ZERO {
                return Err(MarketError::validation("balance must not be negative"));
            }
            account.id = t.next_id(EntityKind::Account);
            t.accounts.insert(account.id, account.clone());
            return Ok(account);
        }

        let stored = t
            .accounts
            .get_mut(&account.id)
            .ok_or_else(|| MarketError::not_found(EntityKind::Account, account.id))?;
        stored.display_name = account.display_name;
        stored.is_admin = account.is_admin;
        stored.updated_at = Utc::now();
        Ok(stored.clone())
    }

    fn save_listing(t: &mut Tables, mut listing: Listing) -> MarketResult<Listing> {
        if listing.price <= Decimal::ZERO {
            return Err(MarketError::validation("price must be greater than zero"));
        }

        if listing.id == UNSAVED_ID {
            t.account(listing.owner_id)?;
            let now = Utc::now();
            listing.id = t.next_id(EntityKind::Listing);
            listing.status = ListingStatus::INITIAL;
            listing.created_at = now;
            listing.updated_at = now;
            t.listings.insert(listing.id, listing.clone());
            return Ok(listing);
        }

        t.pending_listing(listing.id)?;
        let stored = t
            .listings
            .get_mut(&listing.id)
            .ok_or_else(|| MarketError::not_found(EntityKind::Listing, listing.id))?;
        stored.title = listing.title;
        stored.description = listing.description;
        stored.price = listing.price;
        stored.media = listing.media;
        stored.updated_at = Utc::now();
        Ok(stored.clone())
    }

    fn save_withdrawal(
        t: &mut Tables,
        request: WithdrawalRequest,
    ) -> MarketResult<WithdrawalRequest> {
        if request.id == UNSAVED_ID {
            return Err(MarketError::validation(
                "withdrawal requests are opened through the ledger",
            ));
        }

        let stored = t
            .withdrawals
            .get_mut(&request.id)
            .ok_or_else(|| MarketError::not_found(EntityKind::Withdrawal, request.id))?;
        if stored.status.is_terminal() {
            return Err(MarketError::InvalidState {
                kind: EntityKind::Withdrawal,
                id: request.id,
                status: stored.status.as_str(),
                reason: "completed requests are immutable",
            });
        }
        stored.requisites = request.requisites;
        stored.updated_at = Utc::now();
        Ok(stored.clone())
    }
}

#[async_trait]
impl EntityStore for MemoryStore {
    async fn ensure_schema(&self) -> MarketResult<()> {
        Ok(())
    }

    async fn health_check(&self) -> MarketResult<()> {
        Ok(())
    }

    async fn fetch(&self, kind: EntityKind, id: i64) -> MarketResult<Option<Entity>> {
        let t = self.tables.lock().await;
        Ok(match kind {
            EntityKind::Account => t.accounts.get(&id).cloned().map(Entity::from),
            EntityKind::Listing => t.listings.get(&id).cloned().map(Entity::from),
            EntityKind::Purchase => t.purchases.get(&id).cloned().map(Entity::from),
            EntityKind::Withdrawal => t.withdrawals.get(&id).cloned().map(Entity::from),
        })
    }

    async fn save(&self, entity: Entity) -> MarketResult<Entity> {
        let mut t = self.tables.lock().await;
        Ok(match entity {
            Entity::Account(a) => Self::save_account(&mut t, a)?.into(),
            Entity::Listing(l) => Self::save_listing(&mut t, l)?.into(),
            Entity::Purchase(_) => {
                return Err(MarketError::validation(
                    "purchases are recorded by the ledger only",
                ));
            }
            Entity::Withdrawal(w) => Self::save_withdrawal(&mut t, w)?.into(),
        })
    }

    async fn remove(&self, kind: EntityKind, id: i64) -> MarketResult<Vec<(EntityKind, i64)>> {
        let mut t = self.tables.lock().await;
        let mut touched = Vec::new();

        match kind {
            EntityKind::Account => {
                if t.accounts.remove(&id).is_none() {
                    return Ok(touched);
                }
                touched.push((kind, id));

                let owned: Vec<ListingId> = t
                    .listings
                    .values()
                    .filter(|l| l.owner_id == id)
                    .map(|l| l.id)
                    .collect();
                for listing_id in &owned {
                    t.listings.remove(listing_id);
                    touched.push((EntityKind::Listing, *listing_id));
                }

                let withdrawals: Vec<WithdrawalId> = t
                    .withdrawals
                    .values()
                    .filter(|w| w.account_id == id)
                    .map(|w| w.id)
                    .collect();
                for withdrawal_id in withdrawals {
                    t.withdrawals.remove(&withdrawal_id);
                    touched.push((EntityKind::Withdrawal, withdrawal_id));
                }

                for p in t.purchases.values_mut() {
                    let mut changed = false;
                    if p.buyer_id == Some(id) {
                        p.buyer_id = None;
                        changed = true;
                    }
                    if p.listing_id.is_some_and(|l| owned.contains(&l)) {
                        p.listing_id = None;
                        changed = true;
                    }
                    if changed {
                        touched.push((EntityKind::Purchase, p.id));
                    }
                }
            }
            EntityKind::Listing => {
                if t.listings.remove(&id).is_none() {
                    return Ok(touched);
                }
                touched.push((kind, id));
                for p in t.purchases.values_mut() {
                    if p.listing_id == Some(id) {
                        p.listing_id = None;
                        touched.push((EntityKind::Purchase, p.id));
                    }
                }
            }
            EntityKind::Purchase => {
                if t.purchases.remove(&id).is_some() {
                    touched.push((kind, id));
                }
            }
            EntityKind::Withdrawal => {
                if t.withdrawals.remove(&id).is_some() {
                    touched.push((kind, id));
                }
            }
        }
        Ok(touched)
    }

    async fn account_by_identity(
        &self,
        external_id: ExternalId,
    ) -> MarketResult<Option<Account>> {
        let t = self.tables.lock().await;
        Ok(t
            .accounts
            .values()
            .find(|a| a.external_id == external_id)
            .cloned())
    }

    async fn query(&self, query: StatusQuery) -> MarketResult<Vec<Entity>> {
        let t = self.tables.lock().await;
        let offset = query.offset.max(0) as usize;
        let limit = query.limit.max(0) as usize;

        Ok(match query.filter {
            StatusFilter::Listings(status) => t
                .listings
                .values()
                .filter(|l| l.status == status)
                .skip(offset)
                .take(limit)
                .cloned()
                .map(Entity::from)
                .collect(),
            StatusFilter::Withdrawals(status) => t
                .withdrawals
                .values()
                .filter(|w| w.status == status)
                .skip(offset)
                .take(limit)
                .cloned()
                .map(Entity::from)
                .collect(),
        })
    }

    async fn count(&self, filter: StatusFilter) -> MarketResult<i64> {
        let t = self.tables.lock().await;
        let n = match filter {
            StatusFilter::Listings(s) => t.listings.values().filter(|l| l.status == s).count(),
            StatusFilter::Withdrawals(s) => {
                t.withdrawals.values().filter(|w| w.status == s).count()
            }
        };
        Ok(n as i64)
    }

    async fn transition_listing(
        &self,
        id: ListingId,
        transition: Transition<ListingStatus>,
    ) -> MarketResult<Listing> {
        if transition == LISTING_SELL {
            return Err(MarketError::validation(
                "listings are sold through the ledger only",
            ));
        }

        let mut t = self.tables.lock().await;
        let listing = t
            .listings
            .get_mut(&id)
            .ok_or_else(|| MarketError::not_found(EntityKind::Listing, id))?;
        if listing.status != transition.from() {
            return Err(MarketError::Conflict {
                kind: EntityKind::Listing,
                id,
                expected: transition.from().as_str(),
            });
        }
        listing.status = transition.to();
        listing.updated_at = Utc::now();
        tracing::debug!(listing_id = id, %transition, "Listing transitioned");
        Ok(listing.clone())
    }

    async fn transition_withdrawal(
        &self,
        id: WithdrawalId,
        transition: Transition<WithdrawalStatus>,
    ) -> MarketResult<WithdrawalRequest> {
        let mut t = self.tables.lock().await;
        let request = t
            .withdrawals
            .get_mut(&id)
            .ok_or_else(|| MarketError::not_found(EntityKind::Withdrawal, id))?;
        if request.status != transition.from() {
            return Err(MarketError::Conflict {
                kind: EntityKind::Withdrawal,
                id,
                expected: transition.from().as_str(),
            });
        }
        request.status = transition.to();
        request.updated_at = Utc::now();
        tracing::debug!(withdrawal_id = id, %transition, "Withdrawal transitioned");
        Ok(request.clone())
    }

    async fn edit_listing(&self, id: ListingId, edit: &ListingEdit) -> MarketResult<Listing> {
        let mut t = self.tables.lock().await;
        t.pending_listing(id)?;
        let listing = t
            .listings
            .get_mut(&id)
            .ok_or_else(|| MarketError::not_found(EntityKind::Listing, id))?;
        edit.apply(listing);
        Ok(listing.clone())
    }

    async fn settle_purchase(
        &self,
        buyer_id: AccountId,
        listing_id: ListingId,
    ) -> MarketResult<Settlement> {
        let mut t = self.tables.lock().await;

        let mut listing = t.listing(listing_id)?.clone();
        let mut buyer = t.account(buyer_id)?.clone();
        let mut seller = t.account(listing.owner_id)?.clone();

        let plan = ledger::plan_purchase(&buyer, &seller, &listing)?;
        let mut purchase = plan.apply(&mut buyer, &mut seller, &mut listing);
        purchase.id = t.next_id(EntityKind::Purchase);

        t.accounts.insert(buyer.id, buyer.clone());
        t.accounts.insert(seller.id, seller.clone());
        t.listings.insert(listing.id, listing.clone());
        t.purchases.insert(purchase.id, purchase.clone());

        tracing::info!(
            purchase_id = purchase.id,
            buyer_id,
            seller_id = seller.id,
            listing_id,
            amount = %plan.amount,
            "Purchase settled"
        );

        Ok(Settlement {
            purchase,
            buyer,
            seller,
            listing,
        })
    }

    async fn open_withdrawal(
        &self,
        account_id: AccountId,
        requested: Decimal,
        requisites: &str,
    ) -> MarketResult<WithdrawalOpened> {
        let mut t = self.tables.lock().await;

        let mut account = t.account(account_id)?.clone();
        let plan = ledger::plan_withdrawal(&account, requested, requisites)?;
        let mut request = plan.apply(&mut account);
        request.id = t.next_id(EntityKind::Withdrawal);

        t.accounts.insert(account.id, account.clone());
        t.withdrawals.insert(request.id, request.clone());

        tracing::info!(
            withdrawal_id = request.id,
            account_id,
            requested = %requested,
            amount = %plan.amount,
            clamped = plan.was_clamped(),
            "Withdrawal opened"
        );

        Ok(WithdrawalOpened {
            request,
            account,
            requested,
        })
    }

    async fn listing_stats(&self) -> MarketResult<Vec<ListingStats>> {
        let t = self.tables.lock().await;
        let listings = &t.listings;
        Ok(t
            .accounts
            .values()
            .map(|a| {
                let owned = || listings.values().filter(move |l| l.owner_id == a.id);
                ListingStats {
                    account_id: a.id,
                    display_name: a.display_name.clone(),
                    total: owned().count() as i64,
                    approved: owned()
                        .filter(|l| l.status == ListingStatus::Approved)
                        .count() as i64,
                    rejected: owned()
                        .filter(|l| l.status == ListingStatus::Rejected)
                        .count() as i64,
                }
            })
            .collect())
    }
}

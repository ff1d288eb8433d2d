//! Marketplace service
//!
//! The operations the conversational front-end calls. Each one validates its
//! input, evicts the cache entries of the rows it is about to change, runs
//! exactly one store mutation (a transaction or a single guarded statement),
//! publishes the committed rows to the cache, and only then hands
//! notifications to the dispatcher.
//!
//! Evicting first means a caller dropped between commit and refresh leaves
//! misses behind, never pre-commit snapshots.

use rust_decimal::Decimal;
use std::sync::Arc;

use crate::amount::{non_empty_text, validate_amount};
use crate::context::MarketContext;
use crate::entity::{
    Account, AccountId, Entity, EntityKind, ExternalId, Listing, ListingEdit, ListingId,
    ListingStats, Purchase, WithdrawalId, WithdrawalRequest,
};
use crate::error::{MarketError, MarketResult};
use crate::notifier::{Notice, NotificationDispatcher, Notifier};
use crate::queue::{ListingQueue, Page};
use crate::repository::EntityRepository;
use crate::status::{Decision, ListingStatus, WITHDRAWAL_FULFIL, WithdrawalStatus};
use crate::store::{EntityStore, StatusFilter};

pub struct Marketplace {
    store: Arc<dyn EntityStore>,
    repo: EntityRepository,
    queue: ListingQueue,
    notifications: NotificationDispatcher,
}

impl Marketplace {
    pub fn new(ctx: &MarketContext, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            store: ctx.store.clone(),
            repo: EntityRepository::new(ctx.store.clone(), ctx.cache.clone(), ctx.cache_ttl),
            queue: ListingQueue::new(ctx.store.clone()),
            notifications: NotificationDispatcher::new(notifier, ctx.notifier.clone()),
        }
    }

    pub fn repository(&self) -> &EntityRepository {
        &self.repo
    }

    // ========================================================================
    // Accounts
    // ========================================================================

    pub async fn lookup_account(
        &self,
        external_id: ExternalId,
    ) -> MarketResult<Option<Account>> {
        self.repo.find_account_by_identity(external_id).await
    }

    /// `Conflict` if the identity is already registered
    pub async fn create_account(
        &self,
        external_id: ExternalId,
        display_name: Option<&str>,
    ) -> MarketResult<Account> {
        let display_name = display_name
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(str::to_string);

        let account = self
            .repo
            .upsert(Account::new(external_id, display_name).into())
            .await?
            .into_account()
            .ok_or_else(|| MarketError::Transient("store returned a non-account row".into()))?;

        tracing::info!(account_id = account.id, external_id, "Account created");
        Ok(account)
    }

    /// Look up, creating on first contact
    ///
    /// Two first contacts racing on the same identity both end up with the
    /// one row that won the insert.
    pub async fn ensure_account(
        &self,
        external_id: ExternalId,
        display_name: Option<&str>,
    ) -> MarketResult<Account> {
        if let Some(account) = self.lookup_account(external_id).await? {
            return Ok(account);
        }
        match self.create_account(external_id, display_name).await {
            Ok(account) => Ok(account),
            Err(MarketError::Conflict { .. }) => self
                .lookup_account(external_id)
                .await?
                .ok_or(MarketError::not_found(EntityKind::Account, external_id)),
            Err(e) => Err(e),
        }
    }

    /// `false` for unknown identities
    pub async fn is_admin(&self, external_id: ExternalId) -> MarketResult<bool> {
        Ok(self
            .lookup_account(external_id)
            .await?
            .is_some_and(|account| account.is_admin))
    }

    // ========================================================================
    // Listings
    // ========================================================================

    /// New listing, always `pending`
    pub async fn submit_listing(
        &self,
        owner_id: AccountId,
        title: &str,
        description: &str,
        price: Decimal,
        media: Option<String>,
    ) -> MarketResult<Listing> {
        let title = non_empty_text("title", title)?;
        let description = non_empty_text("description", description)?;
        let price = validate_amount(price)?;

        let listing = self
            .repo
            .upsert(Listing::new(owner_id, title, description, price, media).into())
            .await?
            .into_listing()
            .ok_or_else(|| MarketError::Transient("store returned a non-listing row".into()))?;

        tracing::info!(
            listing_id = listing.id,
            owner_id,
            price = %listing.price,
            "Listing submitted"
        );
        Ok(listing)
    }

    /// Replace one field while the listing is still `pending`
    pub async fn edit_listing(
        &self,
        listing_id: ListingId,
        edit: ListingEdit,
    ) -> MarketResult<Listing> {
        let edit = match edit {
            ListingEdit::Title(v) => ListingEdit::Title(non_empty_text("title", &v)?),
            ListingEdit::Description(v) => {
                ListingEdit::Description(non_empty_text("description", &v)?)
            }
            ListingEdit::Price(v) => ListingEdit::Price(validate_amount(v)?),
            ListingEdit::Media(v) => ListingEdit::Media(v),
        };

        self.repo.invalidate(EntityKind::Listing, listing_id).await;
        let listing = self.store.edit_listing(listing_id, &edit).await?;
        self.repo.refresh([Entity::from(listing.clone())]).await;

        tracing::info!(listing_id, field = edit.field(), "Listing edited");
        Ok(listing)
    }

    /// Moderation verdict on a `pending` listing
    ///
    /// `Conflict` if another decision already landed.
    pub async fn decide_listing(
        &self,
        listing_id: ListingId,
        decision: Decision,
    ) -> MarketResult<Listing> {
        let transition = decision.transition();
        self.repo.invalidate(EntityKind::Listing, listing_id).await;
        let listing = self.store.transition_listing(listing_id, transition).await?;
        self.repo.refresh([Entity::from(listing.clone())]).await;

        tracing::info!(listing_id, %transition, "Listing moderated");

        let notice = match decision {
            Decision::Approve => Notice::ListingApproved {
                title: listing.title.clone(),
            },
            Decision::Reject => Notice::ListingRejected {
                title: listing.title.clone(),
            },
        };
        self.notify_account(listing.owner_id, notice).await;
        Ok(listing)
    }

    pub async fn browse_listings(
        &self,
        status: ListingStatus,
        offset: i64,
    ) -> MarketResult<Page<Listing>> {
        self.queue
            .listings(StatusFilter::Listings(status), offset)
            .await
    }

    pub async fn count_listings(&self, status: ListingStatus) -> MarketResult<i64> {
        self.store.count(StatusFilter::Listings(status)).await
    }

    /// Per-account listing counters for the admin report
    pub async fn listing_stats(&self) -> MarketResult<Vec<ListingStats>> {
        self.store.listing_stats().await
    }

    // ========================================================================
    // Ledger
    // ========================================================================

    pub async fn purchase_listing(
        &self,
        buyer_id: AccountId,
        listing_id: ListingId,
    ) -> MarketResult<Purchase> {
        // Ownership never changes, so the seller read here is the one settled
        let seller_id = self
            .store
            .fetch(EntityKind::Listing, listing_id)
            .await?
            .and_then(Entity::into_listing)
            .map(|listing| listing.owner_id);
        self.repo
            .invalidate_all(
                [
                    Some((EntityKind::Account, buyer_id)),
                    Some((EntityKind::Listing, listing_id)),
                    seller_id.map(|id| (EntityKind::Account, id)),
                ]
                .into_iter()
                .flatten(),
            )
            .await;

        let settlement = match self.store.settle_purchase(buyer_id, listing_id).await {
            Ok(settlement) => settlement,
            Err(e) => {
                tracing::info!(buyer_id, listing_id, code = e.code(), "Purchase refused");
                return Err(e);
            }
        };

        self.repo
            .refresh([
                Entity::from(settlement.buyer.clone()),
                Entity::from(settlement.seller.clone()),
                Entity::from(settlement.listing.clone()),
                Entity::from(settlement.purchase.clone()),
            ])
            .await;

        self.notifications.dispatch(
            settlement.seller.external_id,
            Notice::ListingSold {
                title: settlement.listing.title.clone(),
                amount: settlement.purchase.amount,
            },
        );
        Ok(settlement.purchase)
    }

    /// Open a cash-out request, debiting the balance immediately
    ///
    /// An amount above the balance is clamped to the balance.
    pub async fn request_withdrawal(
        &self,
        account_id: AccountId,
        amount: Decimal,
        requisites: &str,
    ) -> MarketResult<WithdrawalRequest> {
        let amount = validate_amount(amount)?;
        let requisites = non_empty_text("requisites", requisites)?;

        self.repo.invalidate(EntityKind::Account, account_id).await;
        let opened = self
            .store
            .open_withdrawal(account_id, amount, &requisites)
            .await?;
        if opened.request.amount < opened.requested {
            tracing::warn!(
                account_id,
                requested = %opened.requested,
                granted = %opened.request.amount,
                "Withdrawal clamped to balance"
            );
        }

        self.repo
            .refresh([
                Entity::from(opened.account),
                Entity::from(opened.request.clone()),
            ])
            .await;
        Ok(opened.request)
    }

    /// Mark a `pending` request as paid out. Moves no money.
    pub async fn fulfil_withdrawal(
        &self,
        request_id: WithdrawalId,
    ) -> MarketResult<WithdrawalRequest> {
        self.repo.invalidate(EntityKind::Withdrawal, request_id).await;
        let request = self
            .store
            .transition_withdrawal(request_id, WITHDRAWAL_FULFIL)
            .await?;
        self.repo.refresh([Entity::from(request.clone())]).await;

        tracing::info!(
            withdrawal_id = request_id,
            amount = %request.amount,
            "Withdrawal fulfilled"
        );

        self.notify_account(
            request.account_id,
            Notice::WithdrawalPaid {
                amount: request.amount,
            },
        )
        .await;
        Ok(request)
    }

    /// Pending cash-out requests, one per page
    pub async fn browse_withdrawals(&self, offset: i64) -> MarketResult<Page<WithdrawalRequest>> {
        self.queue
            .withdrawals(StatusFilter::Withdrawals(WithdrawalStatus::Pending), offset)
            .await
    }

    // ========================================================================
    // Notifications
    // ========================================================================

    /// Resolve the recipient and dispatch; never fails the caller
    async fn notify_account(&self, account_id: AccountId, notice: Notice) {
        match self.repo.get(EntityKind::Account, account_id).await {
            Ok(Some(Entity::Account(account))) => {
                self.notifications.dispatch(account.external_id, notice);
            }
            Ok(_) => {
                tracing::warn!(
                    account_id,
                    notice = notice.kind(),
                    "Recipient account missing, notification skipped"
                );
            }
            Err(e) => {
                tracing::warn!(
                    account_id,
                    notice = notice.kind(),
                    error = %e,
                    "Recipient lookup failed, notification skipped"
                );
            }
        }
    }
}

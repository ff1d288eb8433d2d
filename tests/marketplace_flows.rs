//! End-to-end flows through `Marketplace` on the in-memory backends

mod common;

use common::{admin, approved_listing, cached_account, cached_listing, dec, funded, harness};
use listing_market::store::EntityStore;
use listing_market::{
    Decision, EntityKind, ListingEdit, ListingStatus, MarketError, Navigation,
    WithdrawalStatus,
};

// ============================================================================
// Ledger scenarios
// ============================================================================

#[tokio::test]
async fn purchase_moves_price_from_buyer_to_seller() {
    let h = harness();
    let buyer = funded(&h.market, 100, "100.00").await;
    let seller = funded(&h.market, 200, "0.00").await;
    let listing = approved_listing(&h.market, &seller, "40.00").await;

    let purchase = h.market.purchase_listing(buyer.id, listing.id).await.unwrap();
    assert_eq!(purchase.amount, dec("40.00"));
    assert_eq!(purchase.buyer_id, Some(buyer.id));
    assert_eq!(purchase.listing_id, Some(listing.id));

    let buyer = cached_account(&h.market, buyer.id).await;
    let seller = cached_account(&h.market, seller.id).await;
    let listing = cached_listing(&h.market, listing.id).await;

    assert_eq!(buyer.balance, dec("60.00"));
    assert_eq!(seller.balance, dec("40.00"));
    assert_eq!(listing.status, ListingStatus::Sold);

    // approval notice + sale notice, both to the seller
    let sent = h.notifier.wait_for(2).await;
    assert!(
        sent.iter()
            .any(|(to, text)| *to == 200 && text.contains("purchased") && text.contains("40.00"))
    );
}

#[tokio::test]
async fn insufficient_funds_changes_nothing() {
    let h = harness();
    let buyer = funded(&h.market, 1, "10.00").await;
    let seller = funded(&h.market, 2, "0.00").await;
    let listing = approved_listing(&h.market, &seller, "40.00").await;

    let err = h.market.purchase_listing(buyer.id, listing.id).await.unwrap_err();
    assert_eq!(
        err,
        MarketError::InsufficientFunds {
            required: dec("40.00"),
            available: dec("10.00"),
        }
    );

    let repo = h.market.repository();
    let buyer = cached_account(&h.market, buyer.id).await;
    assert_eq!(buyer.balance, dec("10.00"));
    assert_eq!(h.market.count_listings(ListingStatus::Approved).await.unwrap(), 1);
    assert!(repo.store().fetch(EntityKind::Purchase, 1).await.unwrap().is_none());
}

#[tokio::test]
async fn owner_cannot_buy_own_listing() {
    let h = harness();
    let owner = funded(&h.market, 1, "500.00").await;
    let listing = approved_listing(&h.market, &owner, "40.00").await;

    let err = h.market.purchase_listing(owner.id, listing.id).await.unwrap_err();
    assert_eq!(err, MarketError::SelfTrade);
}

#[tokio::test]
async fn pending_listing_cannot_be_bought() {
    let h = harness();
    let buyer = funded(&h.market, 1, "500.00").await;
    let seller = funded(&h.market, 2, "0").await;
    let listing = h
        .market
        .submit_listing(seller.id, "Kettle", "Steel", dec("5"), None)
        .await
        .unwrap();

    let err = h.market.purchase_listing(buyer.id, listing.id).await.unwrap_err();
    assert_eq!(err.code(), "INVALID_STATE");

    let err = h.market.purchase_listing(buyer.id, 999).await.unwrap_err();
    assert_eq!(err, MarketError::not_found(EntityKind::Listing, 999));
}

#[tokio::test]
async fn sold_listing_cannot_be_bought_twice() {
    let h = harness();
    let first = funded(&h.market, 1, "100.00").await;
    let second = funded(&h.market, 2, "100.00").await;
    let seller = funded(&h.market, 3, "0").await;
    let listing = approved_listing(&h.market, &seller, "40.00").await;

    h.market.purchase_listing(first.id, listing.id).await.unwrap();
    let err = h.market.purchase_listing(second.id, listing.id).await.unwrap_err();
    assert_eq!(err.code(), "INVALID_STATE");
}

// ============================================================================
// Withdrawals
// ============================================================================

#[tokio::test]
async fn withdrawal_above_balance_is_clamped() {
    let h = harness();
    let account = funded(&h.market, 1, "30.00").await;

    let request = h
        .market
        .request_withdrawal(account.id, dec("50.00"), "  card 4242 4242  ")
        .await
        .unwrap();
    assert_eq!(request.amount, dec("30.00"));
    assert_eq!(request.status, WithdrawalStatus::Pending);
    assert_eq!(request.requisites, "card 4242 4242");

    let account = h
        .market
        .lookup_account(1)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(account.balance, dec("0.00"));

    let err = h
        .market
        .request_withdrawal(account.id, dec("1.00"), "card")
        .await
        .unwrap_err();
    assert_eq!(err.code(), "INSUFFICIENT_FUNDS");
}

#[tokio::test]
async fn withdrawal_input_is_validated() {
    let h = harness();
    let account = funded(&h.market, 1, "30.00").await;

    for (amount, requisites) in [("0", "card"), ("1.005", "card"), ("5", "   ")] {
        let err = h
            .market
            .request_withdrawal(account.id, dec(amount), requisites)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "VALIDATION_ERROR", "{amount} / {requisites:?}");
    }
}

#[tokio::test]
async fn fulfilment_is_single_shot_and_notifies() {
    let h = harness();
    let account = funded(&h.market, 77, "30.00").await;
    let request = h
        .market
        .request_withdrawal(account.id, dec("12.50"), "IBAN DE00")
        .await
        .unwrap();

    let page = h.market.browse_withdrawals(0).await.unwrap();
    assert_eq!(page.item.as_ref().map(|w| w.id), Some(request.id));

    let done = h.market.fulfil_withdrawal(request.id).await.unwrap();
    assert_eq!(done.status, WithdrawalStatus::Completed);
    assert_eq!(done.amount, dec("12.50"));

    let err = h.market.fulfil_withdrawal(request.id).await.unwrap_err();
    assert_eq!(err.code(), "CONFLICT");
    let err = h.market.fulfil_withdrawal(404).await.unwrap_err();
    assert_eq!(err.code(), "NOT_FOUND");

    // Fulfilment moves no money
    let account = h.market.lookup_account(77).await.unwrap().unwrap();
    assert_eq!(account.balance, dec("17.50"));

    assert!(h.market.browse_withdrawals(0).await.unwrap().is_empty());
    let sent = h.notifier.wait_for(1).await;
    assert_eq!(sent, vec![(77, "Your withdrawal of 12.50 has been paid out.".to_string())]);
}

// ============================================================================
// Moderation
// ============================================================================

#[tokio::test]
async fn second_decision_conflicts() {
    let h = harness();
    let owner = funded(&h.market, 5, "0").await;
    let listing = h
        .market
        .submit_listing(owner.id, "Lamp", "Brass", dec("12.50"), Some("photo-1".into()))
        .await
        .unwrap();
    assert_eq!(listing.status, ListingStatus::Pending);

    h.market.decide_listing(listing.id, Decision::Approve).await.unwrap();
    let err = h.market.decide_listing(listing.id, Decision::Reject).await.unwrap_err();
    assert!(matches!(err, MarketError::Conflict { .. }));

    let stored = cached_listing(&h.market, listing.id).await;
    assert_eq!(stored.status, ListingStatus::Approved);

    let sent = h.notifier.wait_for(1).await;
    assert_eq!(sent.len(), 1);
    assert!(sent[0].1.contains("approved"));
}

#[tokio::test]
async fn edits_only_while_pending() {
    let h = harness();
    let owner = funded(&h.market, 5, "0").await;
    let listing = h
        .market
        .submit_listing(owner.id, "Lamp", "Brass", dec("12.50"), None)
        .await
        .unwrap();

    let edited = h
        .market
        .edit_listing(listing.id, ListingEdit::Title("  Desk lamp ".into()))
        .await
        .unwrap();
    assert_eq!(edited.title, "Desk lamp");

    let err = h
        .market
        .edit_listing(listing.id, ListingEdit::Price(dec("-1")))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "VALIDATION_ERROR");

    h.market.decide_listing(listing.id, Decision::Reject).await.unwrap();
    let err = h
        .market
        .edit_listing(listing.id, ListingEdit::Description("Copper".into()))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "INVALID_STATE");

    // Terminal: no further decision either
    let err = h.market.decide_listing(listing.id, Decision::Approve).await.unwrap_err();
    assert_eq!(err.code(), "CONFLICT");
}

#[tokio::test]
async fn sold_listing_is_frozen() {
    let h = harness();
    let buyer = funded(&h.market, 1, "50.00").await;
    let seller = funded(&h.market, 2, "0").await;
    let listing = approved_listing(&h.market, &seller, "20.00").await;
    h.market.purchase_listing(buyer.id, listing.id).await.unwrap();

    let err = h
        .market
        .edit_listing(listing.id, ListingEdit::Title("Track bike".into()))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "INVALID_STATE");

    for decision in [Decision::Approve, Decision::Reject] {
        let err = h.market.decide_listing(listing.id, decision).await.unwrap_err();
        assert_eq!(err.code(), "CONFLICT");
    }

    let stored = cached_listing(&h.market, listing.id).await;
    assert_eq!(stored.status, ListingStatus::Sold);
    assert_eq!(stored.title, listing.title);
}

#[tokio::test]
async fn submit_rejects_bad_input() {
    let h = harness();
    let owner = funded(&h.market, 5, "0").await;

    assert!(h.market.submit_listing(owner.id, " ", "d", dec("1"), None).await.is_err());
    assert!(h.market.submit_listing(owner.id, "t", "", dec("1"), None).await.is_err());
    assert!(h.market.submit_listing(owner.id, "t", "d", dec("0"), None).await.is_err());
    let err = h
        .market
        .submit_listing(9_999, "t", "d", dec("1"), None)
        .await
        .unwrap_err();
    assert_eq!(err, MarketError::not_found(EntityKind::Account, 9_999));
}

#[tokio::test]
async fn moderation_queue_walks_forward_and_back() {
    let h = harness();
    let owner = funded(&h.market, 5, "0").await;
    let mut ids = Vec::new();
    for i in 0..4 {
        let listing = h
            .market
            .submit_listing(owner.id, &format!("Item {i}"), "d", dec("3"), None)
            .await
            .unwrap();
        ids.push(listing.id);
    }
    assert_eq!(h.market.count_listings(ListingStatus::Pending).await.unwrap(), 4);

    let mut offset = Navigation::First.resolve();
    let mut seen = Vec::new();
    loop {
        let page = h.market.browse_listings(ListingStatus::Pending, offset).await.unwrap();
        seen.push(page.item.unwrap().id);
        assert_eq!(page.has_prev, offset > 0);
        if !page.has_next {
            break;
        }
        offset = Navigation::Next(offset).resolve();
    }
    assert_eq!(seen, ids);

    let back = Navigation::Prev(offset).resolve();
    let page = h.market.browse_listings(ListingStatus::Pending, back).await.unwrap();
    assert_eq!(page.item.unwrap().id, ids[2]);
    assert!(page.has_next);

    // Approving the head shifts the queue
    h.market.decide_listing(ids[0], Decision::Approve).await.unwrap();
    let page = h.market.browse_listings(ListingStatus::Pending, 0).await.unwrap();
    assert_eq!(page.item.unwrap().id, ids[1]);
    let page = h.market.browse_listings(ListingStatus::Approved, 0).await.unwrap();
    assert!(!page.has_prev && !page.has_next);
}

// ============================================================================
// Accounts and reporting
// ============================================================================

#[tokio::test]
async fn ensure_account_is_idempotent() {
    let h = harness();
    let first = h.market.ensure_account(42, Some(" alice ")).await.unwrap();
    let second = h.market.ensure_account(42, Some("other")).await.unwrap();

    assert_eq!(first.id, second.id);
    assert_eq!(second.display_name.as_deref(), Some("alice"));
    assert_eq!(first.balance, dec("0"));

    let err = h.market.create_account(42, None).await.unwrap_err();
    assert_eq!(err.code(), "CONFLICT");
    assert!(h.market.lookup_account(43).await.unwrap().is_none());
}

#[tokio::test]
async fn admin_gate() {
    let h = harness();
    admin(&h.market, 1).await;
    h.market.ensure_account(2, None).await.unwrap();

    assert!(h.market.is_admin(1).await.unwrap());
    assert!(!h.market.is_admin(2).await.unwrap());
    assert!(!h.market.is_admin(3).await.unwrap());
}

#[tokio::test]
async fn listing_stats_per_account() {
    let h = harness();
    let a = funded(&h.market, 1, "0").await;
    let b = funded(&h.market, 2, "0").await;

    approved_listing(&h.market, &a, "1").await;
    let rejected = h.market.submit_listing(a.id, "t", "d", dec("1"), None).await.unwrap();
    h.market.decide_listing(rejected.id, Decision::Reject).await.unwrap();
    h.market.submit_listing(b.id, "t", "d", dec("1"), None).await.unwrap();

    let stats = h.market.listing_stats().await.unwrap();
    assert_eq!(stats.len(), 2);
    let row = |i: usize| {
        let s = &stats[i];
        (s.account_id, s.total, s.approved, s.rejected)
    };
    assert_eq!(row(0), (a.id, 2, 1, 1));
    assert_eq!(row(1), (b.id, 1, 0, 0));
}

// ============================================================================
// Cache behaviour
// ============================================================================

#[tokio::test]
async fn cached_reads_follow_every_write() {
    let h = harness();
    let buyer = funded(&h.market, 1, "100.00").await;
    let seller = funded(&h.market, 2, "0").await;
    let listing = approved_listing(&h.market, &seller, "40.00").await;

    // Warm the cache with pre-purchase state
    let repo = h.market.repository();
    repo.get(EntityKind::Account, buyer.id).await.unwrap();
    repo.get(EntityKind::Listing, listing.id).await.unwrap();

    h.market.purchase_listing(buyer.id, listing.id).await.unwrap();

    let hits_before = repo.metrics().hits;
    let buyer = cached_account(&h.market, buyer.id).await;
    let listing = cached_listing(&h.market, listing.id).await;
    assert_eq!(repo.metrics().hits, hits_before + 2);
    assert_eq!(buyer.balance, dec("60.00"));
    assert_eq!(listing.status, ListingStatus::Sold);
}

#[tokio::test]
async fn cache_outage_never_fails_operations() {
    let h = harness();
    let buyer = funded(&h.market, 1, "100.00").await;
    let seller = funded(&h.market, 2, "0").await;
    let listing = approved_listing(&h.market, &seller, "40.00").await;

    h.cache.set_unavailable(true);
    h.market.purchase_listing(buyer.id, listing.id).await.unwrap();
    let account = h.market.lookup_account(1).await.unwrap().unwrap();
    assert_eq!(account.balance, dec("60.00"));

    // Snapshots written before the outage are not reconciled on recovery;
    // they stay until evicted or expired
    h.cache.set_unavailable(false);
    assert_eq!(
        cached_listing(&h.market, listing.id).await.status,
        ListingStatus::Approved
    );
    assert_eq!(cached_account(&h.market, buyer.id).await.balance, dec("100.00"));

    let repo = h.market.repository();
    repo.invalidate(EntityKind::Listing, listing.id).await;
    repo.invalidate(EntityKind::Account, buyer.id).await;
    assert_eq!(
        cached_listing(&h.market, listing.id).await.status,
        ListingStatus::Sold
    );
    assert_eq!(cached_account(&h.market, buyer.id).await.balance, dec("60.00"));
}

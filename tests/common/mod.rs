#![allow(dead_code)]

use async_trait::async_trait;
use rust_decimal::Decimal;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use listing_market::cache::MemoryCache;
use listing_market::config::NotifierConfig;
use listing_market::store::MemoryStore;
use listing_market::{
    Account, Entity, EntityKind, ExternalId, Listing, MarketContext, Marketplace, Notifier,
    NotifyError,
};

/// Keeps every delivered message
#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<(ExternalId, String)>>,
}

impl RecordingNotifier {
    pub fn sent(&self) -> Vec<(ExternalId, String)> {
        self.sent.lock().unwrap().clone()
    }

    /// Wait for background deliveries to land
    pub async fn wait_for(&self, count: usize) -> Vec<(ExternalId, String)> {
        for _ in 0..200 {
            if self.sent.lock().unwrap().len() >= count {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        self.sent()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    fn name(&self) -> &'static str {
        "recording"
    }

    async fn notify(&self, recipient: ExternalId, text: &str) -> Result<(), NotifyError> {
        self.sent.lock().unwrap().push((recipient, text.to_string()));
        Ok(())
    }
}

pub struct Harness {
    pub market: Arc<Marketplace>,
    pub cache: Arc<MemoryCache>,
    pub notifier: Arc<RecordingNotifier>,
}

pub fn harness() -> Harness {
    let cache = Arc::new(MemoryCache::new());
    let ctx = MarketContext::new(Arc::new(MemoryStore::new()), cache.clone())
        .with_notifier_config(NotifierConfig {
            max_attempts: 2,
            retry_backoff_ms: 1,
        });
    let notifier = Arc::new(RecordingNotifier::default());
    let market = Arc::new(Marketplace::new(&ctx, notifier.clone()));
    Harness {
        market,
        cache,
        notifier,
    }
}

pub fn dec(s: &str) -> Decimal {
    s.parse().unwrap()
}

/// Account with an opening balance
pub async fn funded(market: &Marketplace, identity: ExternalId, balance: &str) -> Account {
    market
        .repository()
        .upsert(
            Account::new(identity, Some(format!("user{identity}")))
                .with_balance(dec(balance))
                .into(),
        )
        .await
        .unwrap()
        .into_account()
        .unwrap()
}

pub async fn admin(market: &Marketplace, identity: ExternalId) -> Account {
    market
        .repository()
        .upsert(Account::new(identity, Some("admin".into())).with_admin(true).into())
        .await
        .unwrap()
        .into_account()
        .unwrap()
}

/// Submitted and approved listing
pub async fn approved_listing(market: &Marketplace, owner: &Account, price: &str) -> Listing {
    let listing = market
        .submit_listing(owner.id, "Road bike", "Aluminium frame, 54cm", dec(price), None)
        .await
        .unwrap();
    market
        .decide_listing(listing.id, listing_market::Decision::Approve)
        .await
        .unwrap()
}

/// Read an account through the cache-aside accessor
pub async fn cached_account(market: &Marketplace, id: i64) -> Account {
    market
        .repository()
        .get(EntityKind::Account, id)
        .await
        .unwrap()
        .and_then(Entity::into_account)
        .unwrap()
}

/// Read a listing through the cache-aside accessor
pub async fn cached_listing(market: &Marketplace, id: i64) -> Listing {
    market
        .repository()
        .get(EntityKind::Listing, id)
        .await
        .unwrap()
        .and_then(Entity::into_listing)
        .unwrap()
}

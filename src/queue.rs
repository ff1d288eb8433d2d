//! Moderation / listing queue
//!
//! One item per page, ordered by ascending id. The offset is caller-held
//! state (it rides in the front-end's button payloads), so it is untrusted:
//! every entry point clamps it to `>= 0` and never assumes it moved by one.
//!
//! Each page fetches one row of lookahead, so `has_next` needs no count
//! query.

use serde::Serialize;
use std::sync::Arc;

use crate::entity::{Entity, Listing, WithdrawalRequest};
use crate::error::{MarketError, MarketResult};
use crate::store::{EntityStore, StatusFilter, StatusQuery};

/// Items shown per page
pub const PAGE_SIZE: i64 = 1;

/// Rows fetched per page: the visible item plus one lookahead row
pub const PAGE_FETCH: i64 = PAGE_SIZE + 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Page<T> {
    /// `None` when the offset points past the last matching row
    pub item: Option<T>,
    pub offset: i64,
    pub has_prev: bool,
    pub has_next: bool,
}

impl<T> Page<T> {
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Page<U> {
        Page {
            item: self.item.map(f),
            offset: self.offset,
            has_prev: self.has_prev,
            has_next: self.has_next,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.item.is_none()
    }
}

/// Button press on a queue page
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Navigation {
    First,
    Prev(i64),
    Next(i64),
}

impl Navigation {
    /// Offset to show next, never negative
    pub fn resolve(self) -> i64 {
        match self {
            Navigation::First => 0,
            Navigation::Prev(offset) => offset.saturating_sub(1).max(0),
            Navigation::Next(offset) => offset.saturating_add(1).max(0),
        }
    }
}

pub struct ListingQueue {
    store: Arc<dyn EntityStore>,
}

impl ListingQueue {
    pub fn new(store: Arc<dyn EntityStore>) -> Self {
        Self { store }
    }

    /// Page of rows matching `filter` at `offset`
    ///
    /// Always reads the store: the cache holds single rows, not orderings.
    pub async fn page(&self, filter: StatusFilter, offset: i64) -> MarketResult<Page<Entity>> {
        let offset = offset.max(0);
        let mut rows = self
            .store
            .query(StatusQuery {
                filter,
                offset,
                limit: PAGE_FETCH,
            })
            .await?;

        let has_next = rows.len() as i64 > PAGE_SIZE;
        rows.truncate(PAGE_SIZE as usize);

        Ok(Page {
            item: rows.into_iter().next(),
            offset,
            has_prev: offset > 0,
            has_next,
        })
    }

    pub async fn listings(&self, filter: StatusFilter, offset: i64) -> MarketResult<Page<Listing>> {
        let page = self.page(filter, offset).await?;
        typed(page, Entity::into_listing)
    }

    pub async fn withdrawals(
        &self,
        filter: StatusFilter,
        offset: i64,
    ) -> MarketResult<Page<WithdrawalRequest>> {
        let page = self.page(filter, offset).await?;
        typed(page, Entity::into_withdrawal)
    }
}

fn typed<T>(page: Page<Entity>, cast: fn(Entity) -> Option<T>) -> MarketResult<Page<T>> {
    let item = match page.item {
        Some(entity) => {
            let kind = entity.kind();
            Some(cast(entity).ok_or_else(|| {
                MarketError::validation(format!("filter returned {} rows", kind))
            })?)
        }
        None => None,
    };
    Ok(Page {
        item,
        offset: page.offset,
        has_prev: page.has_prev,
        has_next: page.has_next,
    })
}

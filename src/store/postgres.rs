//! PostgreSQL Entity Store
//!
//! Runtime-checked sqlx queries with explicit row mapping. Status changes
//! are single guarded statements (`UPDATE .. WHERE id = $ AND status = $`);
//! ledger operations lock the rows they move money between with
//! `SELECT .. FOR UPDATE`, accounts always in ascending id order.

use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::{Postgres, Row, Transaction};
use std::time::Duration;

use super::schema::SCHEMA;
use super::{EntityStore, Settlement, StatusFilter, StatusQuery, WithdrawalOpened};
use crate::config::PostgresConfig;
use crate::entity::{
    Account, AccountId, Entity, EntityKind, ExternalId, Listing, ListingEdit, ListingId,
    ListingStats, Purchase, WithdrawalId, WithdrawalRequest,
};
use crate::error::{MarketError, MarketResult};
use crate::ledger;
use crate::status::{
    LISTING_SELL, ListingStatus, StatusMachine, Transition, WithdrawalStatus,
};

const ACCOUNT_COLUMNS: &str =
    "id, external_id, display_name, balance, is_admin, created_at, updated_at";
const LISTING_COLUMNS: &str =
    "id, owner_id, title, description, price, media, status, created_at, updated_at";
const PURCHASE_COLUMNS: &str = "id, buyer_id, listing_id, amount, created_at";
const WITHDRAWAL_COLUMNS: &str =
    "id, account_id, amount, requisites, status, created_at, updated_at";

const UNIQUE_VIOLATION: &str = "23505";
const FOREIGN_KEY_VIOLATION: &str = "23503";

fn db_code(e: &sqlx::Error) -> Option<String> {
    match e {
        sqlx::Error::Database(db) => db.code().map(|c| c.into_owned()),
        _ => None,
    }
}

/// PostgreSQL-backed store
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create the connection pool from config
    pub async fn connect(config: &PostgresConfig) -> MarketResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
            .connect(&config.url)
            .await?;

        tracing::info!(
            max_connections = config.max_connections,
            "PostgreSQL connection pool established"
        );
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    // ========================================================================
    // Row mapping
    // ========================================================================

    fn row_to_account(row: &PgRow) -> MarketResult<Account> {
        Ok(Account {
            id: row.try_get("id")?,
            external_id: row.try_get("external_id")?,
            display_name: row.try_get("display_name")?,
            balance: row.try_get("balance")?,
            is_admin: row.try_get("is_admin")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn row_to_listing(row: &PgRow) -> MarketResult<Listing> {
        let status: String = row.try_get("status")?;
        let status = status
            .parse::<ListingStatus>()
            .map_err(|e| MarketError::Transient(format!("corrupt listings row: {}", e)))?;

        Ok(Listing {
            id: row.try_get("id")?,
            owner_id: row.try_get("owner_id")?,
            title: row.try_get("title")?,
            description: row.try_get("description")?,
            price: row.try_get("price")?,
            media: row.try_get("media")?,
            status,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn row_to_purchase(row: &PgRow) -> MarketResult<Purchase> {
        Ok(Purchase {
            id: row.try_get("id")?,
            buyer_id: row.try_get("buyer_id")?,
            listing_id: row.try_get("listing_id")?,
            amount: row.try_get("amount")?,
            created_at: row.try_get("created_at")?,
        })
    }

    fn row_to_withdrawal(row: &PgRow) -> MarketResult<WithdrawalRequest> {
        let status: String = row.try_get("status")?;
        let status = status.parse::<WithdrawalStatus>().map_err(|e| {
            MarketError::Transient(format!("corrupt withdrawal_requests row: {}", e))
        })?;

        Ok(WithdrawalRequest {
            id: row.try_get("id")?,
            account_id: row.try_get("account_id")?,
            amount: row.try_get("amount")?,
            requisites: row.try_get("requisites")?,
            status,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn row_to_entity(kind: EntityKind, row: &PgRow) -> MarketResult<Entity> {
        Ok(match kind {
            EntityKind::Account => Self::row_to_account(row)?.into(),
            EntityKind::Listing => Self::row_to_listing(row)?.into(),
            EntityKind::Purchase => Self::row_to_purchase(row)?.into(),
            EntityKind::Withdrawal => Self::row_to_withdrawal(row)?.into(),
        })
    }

    fn columns(kind: EntityKind) -> &'static str {
        match kind {
            EntityKind::Account => ACCOUNT_COLUMNS,
            EntityKind::Listing => LISTING_COLUMNS,
            EntityKind::Purchase => PURCHASE_COLUMNS,
            EntityKind::Withdrawal => WITHDRAWAL_COLUMNS,
        }
    }

    /// Current status of a row that a guarded statement did not match
    async fn current_status(&self, kind: EntityKind, id: i64) -> MarketResult<Option<String>> {
        let sql = format!("SELECT status FROM {} WHERE id = $1", kind.table());
        let status = sqlx::query_scalar::<_, String>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(status)
    }

    /// Explain why a guarded update on a listing matched no row
    async fn listing_miss(
        &self,
        id: ListingId,
        expected: ListingStatus,
        reason: Option<&'static str>,
    ) -> MarketError {
        match self.current_status(EntityKind::Listing, id).await {
            Ok(None) => MarketError::not_found(EntityKind::Listing, id),
            Ok(Some(status)) => match (reason, status.parse::<ListingStatus>()) {
                (Some(reason), Ok(status)) => MarketError::InvalidState {
                    kind: EntityKind::Listing,
                    id,
                    status: status.as_str(),
                    reason,
                },
                _ => MarketError::Conflict {
                    kind: EntityKind::Listing,
                    id,
                    expected: expected.as_str(),
                },
            },
            Err(e) => e,
        }
    }

    async fn lock_listing(
        tx: &mut Transaction<'_, Postgres>,
        id: ListingId,
    ) -> MarketResult<Listing> {
        let sql = format!("SELECT {} FROM listings WHERE id = $1 FOR UPDATE", LISTING_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&mut **tx)
            .await?
            .ok_or_else(|| MarketError::not_found(EntityKind::Listing, id))?;
        Self::row_to_listing(&row)
    }

    /// Lock accounts in ascending id order
    async fn lock_accounts(
        tx: &mut Transaction<'_, Postgres>,
        ids: &[AccountId],
    ) -> MarketResult<Vec<Account>> {
        let mut ids = ids.to_vec();
        ids.sort_unstable();
        ids.dedup();

        let sql = format!(
            "SELECT {} FROM accounts WHERE id = ANY($1) ORDER BY id FOR UPDATE",
            ACCOUNT_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(ids.as_slice())
            .fetch_all(&mut **tx)
            .await?;
        rows.iter().map(Self::row_to_account).collect()
    }

    async fn move_balance(
        tx: &mut Transaction<'_, Postgres>,
        id: AccountId,
        delta: Decimal,
    ) -> MarketResult<Account> {
        let sql = format!(
            "UPDATE accounts SET balance = balance + $1, updated_at = NOW() \
             WHERE id = $2 RETURNING {}",
            ACCOUNT_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(delta)
            .bind(id)
            .fetch_one(&mut **tx)
            .await?;
        Self::row_to_account(&row)
    }

    // ========================================================================
    // save() per kind
    // ========================================================================

    async fn save_account(&self, account: Account) -> MarketResult<Account> {
        let row = if account.id == crate::entity::UNSAVED_ID {
            let sql = format!(
                "INSERT INTO accounts (external_id, display_name, balance, is_admin) \
                 VALUES ($1, $2, $3, $4) RETURNING {}",
                ACCOUNT_COLUMNS
            );
            sqlx::query(&sql)
                .bind(account.external_id)
                .bind(&account.display_name)
                .bind(account.balance)
                .bind(account.is_admin)
                .fetch_one(&self.pool)
                .await
                .map_err(|e| {
                    if db_code(&e).as_deref() == Some(UNIQUE_VIOLATION) {
                        MarketError::Conflict {
                            kind: EntityKind::Account,
                            id: account.external_id,
                            expected: "unregistered",
                        }
                    } else {
                        e.into()
                    }
                })?
        } else {
            let sql = format!(
                "UPDATE accounts SET display_name = $1, is_admin = $2, updated_at = NOW() \
                 WHERE id = $3 RETURNING {}",
                ACCOUNT_COLUMNS
            );
            sqlx::query(&sql)
                .bind(&account.display_name)
                .bind(account.is_admin)
                .bind(account.id)
                .fetch_optional(&self.pool)
                .await?
                .ok_or_else(|| MarketError::not_found(EntityKind::Account, account.id))?
        };
        Self::row_to_account(&row)
    }

    async fn save_listing(&self, listing: Listing) -> MarketResult<Listing> {
        if listing.id == crate::entity::UNSAVED_ID {
            let sql = format!(
                "INSERT INTO listings (owner_id, title, description, price, media, status) \
                 VALUES ($1, $2, $3, $4, $5, $6) RETURNING {}",
                LISTING_COLUMNS
            );
            let row = sqlx::query(&sql)
                .bind(listing.owner_id)
                .bind(&listing.title)
                .bind(&listing.description)
                .bind(listing.price)
                .bind(&listing.media)
                .bind(ListingStatus::INITIAL.as_str())
                .fetch_one(&self.pool)
                .await
                .map_err(|e| {
                    if db_code(&e).as_deref() == Some(FOREIGN_KEY_VIOLATION) {
                        MarketError::not_found(EntityKind::Account, listing.owner_id)
                    } else {
                        e.into()
                    }
                })?;
            return Self::row_to_listing(&row);
        }

        let sql = format!(
            "UPDATE listings SET title = $1, description = $2, price = $3, media = $4, \
             updated_at = NOW() WHERE id = $5 AND status = $6 RETURNING {}",
            LISTING_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(&listing.title)
            .bind(&listing.description)
            .bind(listing.price)
            .bind(&listing.media)
            .bind(listing.id)
            .bind(ListingStatus::Pending.as_str())
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Self::row_to_listing(&row),
            None => Err(self
                .listing_miss(
                    listing.id,
                    ListingStatus::Pending,
                    Some("only pending listings can be edited"),
                )
                .await),
        }
    }

    async fn save_withdrawal(&self, request: WithdrawalRequest) -> MarketResult<WithdrawalRequest> {
        if request.id == crate::entity::UNSAVED_ID {
            return Err(MarketError::validation(
                "withdrawal requests are opened through the ledger",
            ));
        }

        let sql = format!(
            "UPDATE withdrawal_requests SET requisites = $1, updated_at = NOW() \
             WHERE id = $2 AND status = $3 RETURNING {}",
            WITHDRAWAL_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(&request.requisites)
            .bind(request.id)
            .bind(WithdrawalStatus::Pending.as_str())
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Self::row_to_withdrawal(&row),
            None => match self.current_status(EntityKind::Withdrawal, request.id).await? {
                None => Err(MarketError::not_found(EntityKind::Withdrawal, request.id)),
                Some(_) => Err(MarketError::InvalidState {
                    kind: EntityKind::Withdrawal,
                    id: request.id,
                    status: WithdrawalStatus::Completed.as_str(),
                    reason: "completed requests are immutable",
                }),
            },
        }
    }
}

#[async_trait]
impl EntityStore for PgStore {
    async fn ensure_schema(&self) -> MarketResult<()> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        tracing::info!(tables = EntityKind::ALL.len(), "Schema ensured");
        Ok(())
    }

    async fn health_check(&self) -> MarketResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn fetch(&self, kind: EntityKind, id: i64) -> MarketResult<Option<Entity>> {
        let sql = format!(
            "SELECT {} FROM {} WHERE id = $1",
            Self::columns(kind),
            kind.table()
        );
        let row = sqlx::query(&sql).bind(id).fetch_optional(&self.pool).await?;

        match row {
            Some(row) => Ok(Some(Self::row_to_entity(kind, &row)?)),
            None => Ok(None),
        }
    }

    async fn save(&self, entity: Entity) -> MarketResult<Entity> {
        Ok(match entity {
            Entity::Account(a) => self.save_account(a).await?.into(),
            Entity::Listing(l) => self.save_listing(l).await?.into(),
            Entity::Purchase(_) => {
                return Err(MarketError::validation(
                    "purchases are recorded by the ledger only",
                ));
            }
            Entity::Withdrawal(w) => self.save_withdrawal(w).await?.into(),
        })
    }

    async fn remove(&self, kind: EntityKind, id: i64) -> MarketResult<Vec<(EntityKind, i64)>> {
        let mut tx = self.pool.begin().await?;

        // Rows the foreign keys will cascade to or nullify
        let mut dependents = Vec::new();
        match kind {
            EntityKind::Account => {
                let listings: Vec<i64> = sqlx::query_scalar(
                    "SELECT id FROM listings WHERE owner_id = $1 FOR UPDATE",
                )
                .bind(id)
                .fetch_all(&mut *tx)
                .await?;
                let withdrawals: Vec<i64> = sqlx::query_scalar(
                    "SELECT id FROM withdrawal_requests WHERE account_id = $1",
                )
                .bind(id)
                .fetch_all(&mut *tx)
                .await?;
                let purchases: Vec<i64> = sqlx::query_scalar(
                    "SELECT id FROM purchases WHERE buyer_id = $1 OR listing_id = ANY($2)",
                )
                .bind(id)
                .bind(listings.as_slice())
                .fetch_all(&mut *tx)
                .await?;

                dependents.extend(listings.into_iter().map(|i| (EntityKind::Listing, i)));
                dependents.extend(withdrawals.into_iter().map(|i| (EntityKind::Withdrawal, i)));
                dependents.extend(purchases.into_iter().map(|i| (EntityKind::Purchase, i)));
            }
            EntityKind::Listing => {
                let purchases: Vec<i64> =
                    sqlx::query_scalar("SELECT id FROM purchases WHERE listing_id = $1")
                        .bind(id)
                        .fetch_all(&mut *tx)
                        .await?;
                dependents.extend(purchases.into_iter().map(|i| (EntityKind::Purchase, i)));
            }
            EntityKind::Purchase | EntityKind::Withdrawal => {}
        }

        let sql = format!("DELETE FROM {} WHERE id = $1", kind.table());
        let result = sqlx::query(&sql).bind(id).execute(&mut *tx).await?;
        if result.rows_affected() == 0 {
            return Ok(Vec::new());
        }
        tx.commit().await?;

        tracing::info!(%kind, id, dependents = dependents.len(), "Row deleted");

        let mut touched = Vec::with_capacity(dependents.len() + 1);
        touched.push((kind, id));
        touched.extend(dependents);
        Ok(touched)
    }

    async fn account_by_identity(
        &self,
        external_id: ExternalId,
    ) -> MarketResult<Option<Account>> {
        let sql = format!(
            "SELECT {} FROM accounts WHERE external_id = $1",
            ACCOUNT_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(external_id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Ok(Some(Self::row_to_account(&row)?)),
            None => Ok(None),
        }
    }

    async fn query(&self, query: StatusQuery) -> MarketResult<Vec<Entity>> {
        let kind = query.filter.kind();
        let sql = format!(
            "SELECT {} FROM {} WHERE status = $1 ORDER BY id ASC OFFSET $2 LIMIT $3",
            Self::columns(kind),
            kind.table()
        );
        let rows = sqlx::query(&sql)
            .bind(query.filter.status_str())
            .bind(query.offset.max(0))
            .bind(query.limit.max(0))
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(|row| Self::row_to_entity(kind, row)).collect()
    }

    async fn count(&self, filter: StatusFilter) -> MarketResult<i64> {
        let sql = format!(
            "SELECT COUNT(*) FROM {} WHERE status = $1",
            filter.kind().table()
        );
        let count = sqlx::query_scalar::<_, i64>(&sql)
            .bind(filter.status_str())
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
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

        let sql = format!(
            "UPDATE listings SET status = $1, updated_at = NOW() \
             WHERE id = $2 AND status = $3 RETURNING {}",
            LISTING_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(transition.to().as_str())
            .bind(id)
            .bind(transition.from().as_str())
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => {
                tracing::debug!(listing_id = id, %transition, "Listing transitioned");
                Self::row_to_listing(&row)
            }
            None => Err(self.listing_miss(id, transition.from(), None).await),
        }
    }

    async fn transition_withdrawal(
        &self,
        id: WithdrawalId,
        transition: Transition<WithdrawalStatus>,
    ) -> MarketResult<WithdrawalRequest> {
        let sql = format!(
            "UPDATE withdrawal_requests SET status = $1, updated_at = NOW() \
             WHERE id = $2 AND status = $3 RETURNING {}",
            WITHDRAWAL_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(transition.to().as_str())
            .bind(id)
            .bind(transition.from().as_str())
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => {
                tracing::debug!(withdrawal_id = id, %transition, "Withdrawal transitioned");
                Self::row_to_withdrawal(&row)
            }
            None => match self.current_status(EntityKind::Withdrawal, id).await? {
                None => Err(MarketError::not_found(EntityKind::Withdrawal, id)),
                Some(_) => Err(MarketError::Conflict {
                    kind: EntityKind::Withdrawal,
                    id,
                    expected: transition.from().as_str(),
                }),
            },
        }
    }

    async fn edit_listing(&self, id: ListingId, edit: &ListingEdit) -> MarketResult<Listing> {
        // Column name comes from a closed enum, never from input
        let sql = format!(
            "UPDATE listings SET {} = $1, updated_at = NOW() \
             WHERE id = $2 AND status = $3 RETURNING {}",
            edit.field(),
            LISTING_COLUMNS
        );
        let query = sqlx::query(&sql);
        let query = match edit {
            ListingEdit::Title(v) | ListingEdit::Description(v) => query.bind(v.clone()),
            ListingEdit::Price(v) => query.bind(*v),
            ListingEdit::Media(v) => query.bind(v.clone()),
        };
        let row = query
            .bind(id)
            .bind(ListingStatus::Pending.as_str())
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Self::row_to_listing(&row),
            None => Err(self
                .listing_miss(
                    id,
                    ListingStatus::Pending,
                    Some("only pending listings can be edited"),
                )
                .await),
        }
    }

    async fn settle_purchase(
        &self,
        buyer_id: AccountId,
        listing_id: ListingId,
    ) -> MarketResult<Settlement> {
        let mut tx = self.pool.begin().await?;

        let listing = Self::lock_listing(&mut tx, listing_id).await?;
        let accounts = Self::lock_accounts(&mut tx, &[buyer_id, listing.owner_id]).await?;

        let find = |id: AccountId| {
            accounts
                .iter()
                .find(|a| a.id == id)
                .cloned()
                .ok_or_else(|| MarketError::not_found(EntityKind::Account, id))
        };
        let buyer = find(buyer_id)?;
        let seller = find(listing.owner_id)?;

        // Any error from here on drops `tx`, which rolls it back
        let plan = ledger::plan_purchase(&buyer, &seller, &listing)?;

        let buyer = Self::move_balance(&mut tx, plan.buyer_id, -plan.amount).await?;
        let seller = Self::move_balance(&mut tx, plan.seller_id, plan.amount).await?;

        let sql = format!(
            "UPDATE listings SET status = $1, updated_at = NOW() \
             WHERE id = $2 AND status = $3 RETURNING {}",
            LISTING_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(LISTING_SELL.to().as_str())
            .bind(listing_id)
            .bind(LISTING_SELL.from().as_str())
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(MarketError::Conflict {
                kind: EntityKind::Listing,
                id: listing_id,
                expected: LISTING_SELL.from().as_str(),
            })?;
        let listing = Self::row_to_listing(&row)?;

        let sql = format!(
            "INSERT INTO purchases (buyer_id, listing_id, amount) VALUES ($1, $2, $3) RETURNING {}",
            PURCHASE_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(plan.buyer_id)
            .bind(plan.listing_id)
            .bind(plan.amount)
            .fetch_one(&mut *tx)
            .await?;
        let purchase = Self::row_to_purchase(&row)?;

        tx.commit().await?;

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
        let mut tx = self.pool.begin().await?;

        let account = Self::lock_accounts(&mut tx, &[account_id])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| MarketError::not_found(EntityKind::Account, account_id))?;

        let plan = ledger::plan_withdrawal(&account, requested, requisites)?;
        let account = Self::move_balance(&mut tx, account_id, -plan.amount).await?;

        let sql = format!(
            "INSERT INTO withdrawal_requests (account_id, amount, requisites, status) \
             VALUES ($1, $2, $3, $4) RETURNING {}",
            WITHDRAWAL_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(account_id)
            .bind(plan.amount)
            .bind(&plan.requisites)
            .bind(WithdrawalStatus::INITIAL.as_str())
            .fetch_one(&mut *tx)
            .await?;
        let request = Self::row_to_withdrawal(&row)?;

        tx.commit().await?;

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
        let rows = sqlx::query(
            r#"
            SELECT a.id, a.display_name,
                   COUNT(l.id) AS total,
                   COUNT(l.id) FILTER (WHERE l.status = 'approved') AS approved,
                   COUNT(l.id) FILTER (WHERE l.status = 'rejected') AS rejected
            FROM accounts a
            LEFT JOIN listings l ON l.owner_id = a.id
            GROUP BY a.id, a.display_name
            ORDER BY a.id ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                Ok(ListingStats {
                    account_id: row.try_get("id")?,
                    display_name: row.try_get("display_name")?,
                    total: row.try_get("total")?,
                    approved: row.try_get("approved")?,
                    rejected: row.try_get("rejected")?,
                })
            })
            .collect()
    }
}

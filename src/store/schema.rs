//! Idempotent DDL, applied once at startup

/// Executed in order; every statement is safe to re-run.
pub const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS accounts (
        id            BIGSERIAL PRIMARY KEY,
        external_id   BIGINT NOT NULL UNIQUE,
        display_name  TEXT,
        balance       NUMERIC(18,2) NOT NULL DEFAULT 0 CHECK (balance >= 0),
        is_admin      BOOLEAN NOT NULL DEFAULT FALSE,
        created_at    TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        updated_at    TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS listings (
        id           BIGSERIAL PRIMARY KEY,
        owner_id     BIGINT NOT NULL REFERENCES accounts(id) ON DELETE CASCADE,
        title        TEXT NOT NULL,
        description  TEXT NOT NULL,
        price        NUMERIC(18,2) NOT NULL CHECK (price > 0),
        media        TEXT,
        status       TEXT NOT NULL DEFAULT 'pending'
                     CHECK (status IN ('pending', 'approved', 'rejected', 'sold')),
        created_at   TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        updated_at   TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS purchases (
        id          BIGSERIAL PRIMARY KEY,
        buyer_id    BIGINT REFERENCES accounts(id) ON DELETE SET NULL,
        listing_id  BIGINT REFERENCES listings(id) ON DELETE SET NULL,
        amount      NUMERIC(18,2) NOT NULL CHECK (amount > 0),
        created_at  TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS withdrawal_requests (
        id          BIGSERIAL PRIMARY KEY,
        account_id  BIGINT NOT NULL REFERENCES accounts(id) ON DELETE CASCADE,
        amount      NUMERIC(18,2) NOT NULL CHECK (amount > 0),
        requisites  TEXT NOT NULL,
        status      TEXT NOT NULL DEFAULT 'pending'
                    CHECK (status IN ('pending', 'completed')),
        created_at  TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        updated_at  TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_listings_status_id ON listings(status, id)",
    "CREATE INDEX IF NOT EXISTS idx_listings_owner ON listings(owner_id)",
    "CREATE INDEX IF NOT EXISTS idx_withdrawals_status_id ON withdrawal_requests(status, id)",
    "CREATE INDEX IF NOT EXISTS idx_withdrawals_account ON withdrawal_requests(account_id)",
];

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::EntityKind;

    #[test]
    fn test_every_table_is_created_idempotently() {
        for kind in EntityKind::ALL {
            let ddl = format!("CREATE TABLE IF NOT EXISTS {} (", kind.table());
            assert!(
                SCHEMA.iter().any(|s| s.contains(&ddl)),
                "missing table {}",
                kind
            );
        }
        assert!(SCHEMA.iter().all(|s| s.contains("IF NOT EXISTS")));
    }
}

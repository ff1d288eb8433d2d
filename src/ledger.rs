//! Balance movement rules
//!
//! Pure validation and arithmetic shared by every store implementation. The
//! store loads (and locks) the rows inside its transaction, asks the ledger
//! for a plan, then writes the plan's effects in that same transaction. No
//! partial transfer is ever observable outside it.
//!
//! Invariants kept here:
//! 1. buyer debit == seller credit == listing price, exactly
//! 2. no account balance goes below zero
//! 3. only an `approved` listing can be sold

use chrono::Utc;
use rust_decimal::Decimal;

use crate::amount::max_amount;
use crate::entity::{Account, EntityKind, Listing, Purchase, UNSAVED_ID, WithdrawalRequest};
use crate::error::{MarketError, MarketResult};
use crate::status::{ListingStatus, StatusMachine, WithdrawalStatus};

/// Validated purchase, ready to be written
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PurchasePlan {
    pub buyer_id: i64,
    pub seller_id: i64,
    pub listing_id: i64,
    pub amount: Decimal,
}

/// Validate a purchase against freshly read rows
///
/// Checks run in a fixed order so a caller always gets the same error for
/// the same state: listing status, ownership, self-trade, funds, credit range.
pub fn plan_purchase(
    buyer: &Account,
    seller: &Account,
    listing: &Listing,
) -> MarketResult<PurchasePlan> {
    if listing.status != ListingStatus::Approved {
        return Err(MarketError::InvalidState {
            kind: EntityKind::Listing,
            id: listing.id,
            status: listing.status.as_str(),
            reason: "only approved listings can be purchased",
        });
    }
    if listing.owner_id != seller.id {
        return Err(MarketError::validation(format!(
            "listing {} is not owned by account {}",
            listing.id, seller.id
        )));
    }
    if buyer.id == seller.id {
        return Err(MarketError::SelfTrade);
    }
    if buyer.balance < listing.price {
        return Err(MarketError::InsufficientFunds {
            required: listing.price,
            available: buyer.balance,
        });
    }
    if seller.balance + listing.price > max_amount() {
        return Err(MarketError::validation(format!(
            "crediting {} would overflow the balance of account {}",
            listing.price, seller.id
        )));
    }

    Ok(PurchasePlan {
        buyer_id: buyer.id,
        seller_id: seller.id,
        listing_id: listing.id,
        amount: listing.price,
    })
}

impl PurchasePlan {
    /// Apply the plan to in-memory copies of the locked rows
    ///
    /// Returns the receipt to insert; its id is assigned by the store.
    pub fn apply(
        &self,
        buyer: &mut Account,
        seller: &mut Account,
        listing: &mut Listing,
    ) -> Purchase {
        let now = Utc::now();

        buyer.balance -= self.amount;
        buyer.updated_at = now;
        seller.balance += self.amount;
        seller.updated_at = now;
        listing.status = ListingStatus::Sold;
        listing.updated_at = now;

        Purchase {
            id: UNSAVED_ID,
            buyer_id: Some(self.buyer_id),
            listing_id: Some(self.listing_id),
            amount: self.amount,
            created_at: now,
        }
    }
}

/// Validated withdrawal, ready to be written
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WithdrawalPlan {
    pub account_id: i64,
    pub requested: Decimal,
    /// Amount actually debited: `min(requested, balance)`
    pub amount: Decimal,
    pub requisites: String,
}

impl WithdrawalPlan {
    #[inline]
    pub fn was_clamped(&self) -> bool {
        self.amount < self.requested
    }

    /// Debit the account copy and build the request row
    pub fn apply(&self, account: &mut Account) -> WithdrawalRequest {
        let now = Utc::now();
        account.balance -= self.amount;
        account.updated_at = now;

        WithdrawalRequest {
            id: UNSAVED_ID,
            account_id: self.account_id,
            amount: self.amount,
            requisites: self.requisites.clone(),
            status: WithdrawalStatus::INITIAL,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Validate a cash-out against the current balance
///
/// A request above the balance is clamped down to the balance rather than
/// refused. An empty balance has nothing to clamp to and is refused.
pub fn plan_withdrawal(
    account: &Account,
    requested: Decimal,
    requisites: &str,
) -> MarketResult<WithdrawalPlan> {
    if requested <= Decimal::ZERO {
        return Err(MarketError::validation("withdrawal amount must be greater than zero"));
    }
    if account.balance <= Decimal::ZERO {
        return Err(MarketError::InsufficientFunds {
            required: requested,
            available: account.balance,
        });
    }

    Ok(WithdrawalPlan {
        account_id: account.id,
        requested,
        amount: requested.min(account.balance),
        requisites: requisites.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    fn account(id: i64, balance: &str) -> Account {
        let mut a = Account::new(1000 + id, None).with_balance(dec(balance));
        a.id = id;
        a
    }

    fn approved_listing(owner: i64, price: &str) -> Listing {
        let mut l = Listing::new(owner, "Bike", "City bike", dec(price), None);
        l.id = 50;
        l.status = ListingStatus::Approved;
        l
    }

    #[test]
    fn test_purchase_moves_exact_price() {
        let mut buyer = account(1, "100.00");
        let mut seller = account(2, "0.00");
        let mut listing = approved_listing(2, "40.00");

        let plan = plan_purchase(&buyer, &seller, &listing).unwrap();
        let receipt = plan.apply(&mut buyer, &mut seller, &mut listing);

        assert_eq!(buyer.balance, dec("60.00"));
        assert_eq!(seller.balance, dec("40.00"));
        assert_eq!(listing.status, ListingStatus::Sold);
        assert_eq!(receipt.amount, dec("40.00"));
        assert_eq!(receipt.buyer_id, Some(1));
        assert_eq!(receipt.listing_id, Some(50));
    }

    #[test]
    fn test_insufficient_funds() {
        let buyer = account(1, "10.00");
        let seller = account(2, "0.00");
        let listing = approved_listing(2, "40.00");

        let err = plan_purchase(&buyer, &seller, &listing).unwrap_err();
        assert_eq!(
            err,
            MarketError::InsufficientFunds {
                required: dec("40.00"),
                available: dec("10.00")
            }
        );
    }

    #[test]
    fn test_exact_balance_is_enough() {
        let buyer = account(1, "40.00");
        let seller = account(2, "0.00");
        assert!(plan_purchase(&buyer, &seller, &approved_listing(2, "40.00")).is_ok());
    }

    #[test]
    fn test_self_trade() {
        let owner = account(2, "500.00");
        let listing = approved_listing(2, "40.00");
        assert_eq!(
            plan_purchase(&owner, &owner, &listing).unwrap_err(),
            MarketError::SelfTrade
        );
    }

    #[test]
    fn test_only_approved_listings_sell() {
        let buyer = account(1, "100.00");
        let seller = account(2, "0.00");

        for status in [ListingStatus::Pending, ListingStatus::Rejected, ListingStatus::Sold] {
            let mut listing = approved_listing(2, "40.00");
            listing.status = status;
            let err = plan_purchase(&buyer, &seller, &listing).unwrap_err();
            assert_eq!(err.code(), "INVALID_STATE", "status {status}");
        }
    }

    #[test]
    fn test_seller_credit_cannot_exceed_column_range() {
        let buyer = account(1, "100.00");
        let mut seller = account(2, "0.00");
        seller.balance = max_amount() - dec("10.00");
        let listing = approved_listing(2, "40.00");

        let err = plan_purchase(&buyer, &seller, &listing).unwrap_err();
        assert_eq!(err.code(), "VALIDATION_ERROR");
        assert!(!err.is_retryable());

        seller.balance = max_amount() - dec("40.00");
        assert!(plan_purchase(&buyer, &seller, &listing).is_ok());
    }

    #[test]
    fn test_withdrawal_is_clamped_to_balance() {
        let mut acc = account(1, "30.00");
        let plan = plan_withdrawal(&acc, dec("50.00"), "card 4242").unwrap();

        assert!(plan.was_clamped());
        assert_eq!(plan.amount, dec("30.00"));

        let request = plan.apply(&mut acc);
        assert_eq!(acc.balance, dec("0.00"));
        assert_eq!(request.amount, dec("30.00"));
        assert_eq!(request.status, WithdrawalStatus::Pending);
    }

    #[test]
    fn test_withdrawal_within_balance_is_not_clamped() {
        let acc = account(1, "30.00");
        let plan = plan_withdrawal(&acc, dec("12.00"), "card").unwrap();
        assert!(!plan.was_clamped());
        assert_eq!(plan.amount, dec("12.00"));
    }

    #[test]
    fn test_withdrawal_from_empty_balance() {
        let acc = account(1, "0.00");
        let err = plan_withdrawal(&acc, dec("5.00"), "card").unwrap_err();
        assert_eq!(err.code(), "INSUFFICIENT_FUNDS");
        assert!(plan_withdrawal(&acc, Decimal::ZERO, "card").is_err());
    }
}

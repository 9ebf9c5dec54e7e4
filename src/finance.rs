//! Double-entry ledger value objects: accounts and transactions.
//!
//! These are plain validated data carried around by callers; they have no
//! store of their own and no expiry. Identifiers come from the same injected
//! generator as everything else.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult, Violation};
use crate::uid::{Uid, UidGenerator};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AccountType {
    Asset,
    Liability,
    Equity,
    Revenue,
    Expense,
}

impl std::fmt::Display for AccountType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            AccountType::Asset => "ASSET",
            AccountType::Liability => "LIABILITY",
            AccountType::Equity => "EQUITY",
            AccountType::Revenue => "REVENUE",
            AccountType::Expense => "EXPENSE",
        };
        f.write_str(s)
    }
}

/// A ledger account owned by a user, optionally nested under a parent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub uuid: Uid,
    pub name: String,
    pub kind: AccountType,
    pub user: Uid,
    pub parent: Option<Uid>,
}

impl Account {
    pub fn new(
        gen: &UidGenerator,
        name: impl Into<String>,
        kind: AccountType,
        user: Uid,
        parent: Option<Uid>,
    ) -> Account {
        Account { uuid: gen.next(), name: name.into(), kind, user, parent }
    }
}

/// A double-entry movement: `amount` leaves `credit_account` and enters
/// `debit_account` on `transaction_date`, settling on `settlement_date`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub uuid: Uid,
    pub user: Uid,
    pub description: String,
    pub amount: f64,
    pub debit_account: Uid,
    pub credit_account: Uid,
    pub transaction_date: DateTime<Utc>,
    pub settlement_date: DateTime<Utc>,
}

/// Builder input for [`Transaction::new`]; every field is validated and
/// violations are aggregated.
#[derive(Debug, Clone, Deserialize)]
pub struct TransactionDraft {
    pub user: Uid,
    pub description: String,
    pub amount: f64,
    pub debit_account: Uid,
    pub credit_account: Uid,
    pub transaction_date: DateTime<Utc>,
    pub settlement_date: DateTime<Utc>,
}

impl Transaction {
    pub fn new(gen: &UidGenerator, draft: TransactionDraft) -> AppResult<Transaction> {
        let mut violations = Vec::new();
        if draft.user.is_nil() {
            violations.push(Violation::new("nil-user", "user cannot be the nil identifier"));
        }
        if !(draft.amount >= 0.0) {
            violations.push(Violation::new("negative-amount", "amount cannot be negative"));
        }
        if !violations.is_empty() {
            return Err(AppError::invalid_many(violations));
        }

        Ok(Transaction {
            uuid: gen.next(),
            user: draft.user,
            description: draft.description,
            amount: draft.amount,
            debit_account: draft.debit_account,
            credit_account: draft.credit_account,
            transaction_date: draft.transaction_date,
            settlement_date: draft.settlement_date,
        })
    }
}

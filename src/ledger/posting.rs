use std::collections::HashMap;

use uuid::Uuid;

use super::{
    error::LedgerError,
    repo_types::{LedgerEntry, TransactionType},
};

/// One entry of a posting batch together with the balance it leaves behind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedEntry {
    pub entry: LedgerEntry,
    pub transaction_type: TransactionType,
    pub balance_after: i64,
}

/// Applies `entries` in order to `balances`, which must hold the current
/// balance of every existing user the batch touches.
///
/// On error `balances` may be partially updated; callers throw it away
/// together with the surrounding transaction.
pub fn plan_postings(
    balances: &mut HashMap<Uuid, i64>,
    entries: &[LedgerEntry],
) -> Result<Vec<PlannedEntry>, LedgerError> {
    if entries.is_empty() {
        return Err(LedgerError::Validation("nothing to post".into()));
    }

    let mut planned = Vec::with_capacity(entries.len());
    for entry in entries {
        if entry.amount == 0 {
            return Err(LedgerError::Validation("amount must be nonzero".into()));
        }
        let balance = balances
            .get_mut(&entry.user_id)
            .ok_or(LedgerError::UserNotFound)?;
        let next = balance
            .checked_add(entry.amount)
            .ok_or_else(|| LedgerError::Validation("balance overflow".into()))?;
        if next < 0 {
            return Err(LedgerError::InsufficientBalance {
                user_id: entry.user_id,
                balance: *balance,
                requested: entry.amount,
            });
        }
        *balance = next;
        planned.push(PlannedEntry {
            entry: entry.clone(),
            transaction_type: TransactionType::for_amount(entry.amount),
            balance_after: next,
        });
    }
    Ok(planned)
}

/// Sorted, deduplicated user ids of a batch. Rows are locked in this order.
pub fn lock_order(entries: &[LedgerEntry]) -> Vec<Uuid> {
    let mut ids: Vec<Uuid> = entries.iter().map(|e| e.user_id).collect();
    ids.sort();
    ids.dedup();
    ids
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(user_id: Uuid, amount: i64) -> LedgerEntry {
        LedgerEntry {
            user_id,
            amount,
            description: "test".into(),
            admin_id: None,
        }
    }

    #[test]
    fn transfer_pair_moves_coins() {
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let mut balances = HashMap::from([(a, 50), (b, 10)]);
        let planned = plan_postings(&mut balances, &[entry(a, -20), entry(b, 20)]).unwrap();

        assert_eq!(planned.len(), 2);
        assert_eq!(planned[0].balance_after, 30);
        assert_eq!(planned[0].transaction_type, TransactionType::Subtract);
        assert_eq!(planned[1].balance_after, 30);
        assert_eq!(planned[1].transaction_type, TransactionType::Add);
        assert_eq!(balances[&a], 30);
        assert_eq!(balances[&b], 30);
    }

    #[test]
    fn overdraft_is_refused_with_current_balance() {
        let a = Uuid::new_v4();
        let mut balances = HashMap::from([(a, 100)]);
        let err = plan_postings(&mut balances, &[entry(a, -150)]).unwrap_err();
        assert_eq!(
            err,
            LedgerError::InsufficientBalance {
                user_id: a,
                balance: 100,
                requested: -150
            }
        );
    }

    #[test]
    fn running_balance_is_checked_per_entry() {
        let a = Uuid::new_v4();
        let mut balances = HashMap::from([(a, 10)]);
        // credit first, then the debit fits
        let ok = plan_postings(&mut balances, &[entry(a, 5), entry(a, -15)]).unwrap();
        assert_eq!(ok[1].balance_after, 0);

        let mut balances = HashMap::from([(a, 10)]);
        let err = plan_postings(&mut balances, &[entry(a, -15), entry(a, 5)]).unwrap_err();
        assert!(matches!(err, LedgerError::InsufficientBalance { .. }));
    }

    #[test]
    fn unknown_user_and_zero_amount_are_rejected() {
        let mut balances = HashMap::new();
        assert_eq!(
            plan_postings(&mut balances, &[entry(Uuid::new_v4(), 5)]).unwrap_err(),
            LedgerError::UserNotFound
        );

        let a = Uuid::new_v4();
        let mut balances = HashMap::from([(a, 10)]);
        assert!(matches!(
            plan_postings(&mut balances, &[entry(a, 0)]).unwrap_err(),
            LedgerError::Validation(_)
        ));
        assert!(matches!(
            plan_postings(&mut balances, &[]).unwrap_err(),
            LedgerError::Validation(_)
        ));
    }

    #[test]
    fn lock_order_is_sorted_and_unique() {
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let ids = lock_order(&[entry(b, 1), entry(a, 1), entry(b, -1)]);
        assert_eq!(ids.len(), 2);
        assert!(ids[0] < ids[1]);
    }
}

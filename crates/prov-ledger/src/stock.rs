use tracing::debug;

use prov_store::{Transaction, TransactionExt};
use prov_types::{Grams, LotId};

use crate::error::{LedgerError, LedgerResult};
use crate::records::{lot_key, BalanceRecord};

/// Per-lot available quantity.
///
/// There is no `credit`: new material only appears by initializing a freshly
/// created lot, so a balance never increases after creation.
pub struct StockLedger;

impl StockLedger {
    /// One-time balance creation for a new lot.
    pub fn initialize<T: Transaction>(tx: &mut T, lot: LotId, quantity: Grams) -> LedgerResult<()> {
        if quantity.is_zero() {
            return Err(LedgerError::InvalidQuantity(format!(
                "initial quantity of {lot} must be positive"
            )));
        }
        let key = lot_key(&lot);
        if tx.get::<BalanceRecord>(&key)?.is_some() {
            return Err(LedgerError::InvalidInput(format!(
                "balance for {lot} already initialized"
            )));
        }
        tx.put(
            &key,
            &BalanceRecord {
                lot,
                available: quantity,
            },
        )?;
        debug!(lot = %lot, %quantity, "initialized balance");
        Ok(())
    }

    pub fn available<T: Transaction>(tx: &mut T, lot: LotId) -> LedgerResult<Grams> {
        tx.get::<BalanceRecord>(&lot_key(&lot))?
            .map(|b| b.available)
            .ok_or_else(|| LedgerError::not_found("balance", lot))
    }

    /// Validate a debit without applying it. Returns the balance that would
    /// remain.
    pub fn check<T: Transaction>(tx: &mut T, lot: LotId, quantity: Grams) -> LedgerResult<Grams> {
        if quantity.is_zero() {
            return Err(LedgerError::InvalidQuantity(format!(
                "debit from {lot} must be positive"
            )));
        }
        let available = Self::available(tx, lot)?;
        available
            .checked_sub(quantity)
            .ok_or(LedgerError::InsufficientStock {
                lot,
                requested: quantity,
                available,
            })
    }

    /// Reduce `lot`'s balance by `quantity` and return the new balance.
    pub fn debit<T: Transaction>(tx: &mut T, lot: LotId, quantity: Grams) -> LedgerResult<Grams> {
        let remaining = Self::check(tx, lot, quantity)?;
        tx.put(
            &lot_key(&lot),
            &BalanceRecord {
                lot,
                available: remaining,
            },
        )?;
        debug!(lot = %lot, %quantity, %remaining, "debited balance");
        Ok(remaining)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prov_store::{InMemoryStore, Store};

    fn g(grams: u64) -> Grams {
        Grams::from_grams(grams).unwrap()
    }

    fn with_lot(available: u64) -> (InMemoryStore, LotId) {
        let store = InMemoryStore::new();
        let lot = LotId::new();
        let mut tx = store.begin_transaction().unwrap();
        StockLedger::initialize(&mut tx, lot, g(available)).unwrap();
        tx.commit().unwrap();
        (store, lot)
    }

    #[test]
    fn initialize_is_one_time() {
        let (store, lot) = with_lot(1000);
        let mut tx = store.begin_transaction().unwrap();
        assert!(matches!(
            StockLedger::initialize(&mut tx, lot, g(5)),
            Err(LedgerError::InvalidInput(_))
        ));
        assert!(matches!(
            StockLedger::initialize(&mut tx, LotId::new(), Grams::ZERO),
            Err(LedgerError::InvalidQuantity(_))
        ));
    }

    #[test]
    fn debit_reduces_balance() {
        let (store, lot) = with_lot(1000);
        let mut tx = store.begin_transaction().unwrap();
        assert_eq!(StockLedger::debit(&mut tx, lot, g(400)).unwrap(), g(600));
        assert_eq!(StockLedger::debit(&mut tx, lot, g(600)).unwrap(), Grams::ZERO);
        tx.commit().unwrap();

        let mut tx = store.begin_transaction().unwrap();
        assert_eq!(StockLedger::available(&mut tx, lot).unwrap(), Grams::ZERO);
    }

    #[test]
    fn overdraw_fails_and_leaves_balance() {
        let (store, lot) = with_lot(1000);
        let mut tx = store.begin_transaction().unwrap();
        let err = StockLedger::debit(&mut tx, lot, g(1200)).unwrap_err();
        assert_eq!(
            err,
            LedgerError::InsufficientStock {
                lot,
                requested: g(1200),
                available: g(1000),
            }
        );
        assert_eq!(StockLedger::available(&mut tx, lot).unwrap(), g(1000));
    }

    #[test]
    fn zero_debit_is_invalid() {
        let (store, lot) = with_lot(10);
        let mut tx = store.begin_transaction().unwrap();
        assert!(matches!(
            StockLedger::debit(&mut tx, lot, Grams::ZERO),
            Err(LedgerError::InvalidQuantity(_))
        ));
    }

    #[test]
    fn unknown_lot_is_not_found() {
        let store = InMemoryStore::new();
        let mut tx = store.begin_transaction().unwrap();
        assert!(matches!(
            StockLedger::available(&mut tx, LotId::new()),
            Err(LedgerError::NotFound { kind: "balance", .. })
        ));
    }
}

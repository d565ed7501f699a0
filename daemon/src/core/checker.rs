// Double-spend exclusion over pending pools.

use std::collections::HashSet;

use crest_common::transaction::{Transaction, TxInput};

/// True when `tx` spends an input already spent by any transaction in the
/// pool. Called while holding the pool mutex so the answer stays valid for
/// the insert that follows.
pub fn has_conflict<'a>(
    tx: &Transaction,
    pool: impl Iterator<Item = &'a Transaction>,
) -> bool {
    if tx.get_inputs().is_empty() {
        return false;
    }
    let inputs: HashSet<&TxInput> = tx.get_inputs().iter().collect();
    for pending in pool {
        if pending.get_inputs().iter().any(|input| inputs.contains(input)) {
            return true;
        }
    }
    false
}

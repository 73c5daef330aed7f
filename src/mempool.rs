//! Pending transaction pool

use crate::transaction::Transaction;

/// Transactions staged for the next block, in arrival order.
#[derive(Debug, Clone, Default)]
pub struct Mempool {
    transactions: Vec<Transaction>,
}

impl Mempool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_transaction(&mut self, tx: Transaction) {
        self.transactions.push(tx);
    }

    /// Takes the whole pool, leaving a fresh empty one behind.
    pub fn take_all(&mut self) -> Vec<Transaction> {
        std::mem::take(&mut self.transactions)
    }

    pub fn get_all_transactions(&self) -> &[Transaction] {
        &self.transactions
    }

    pub fn len(&self) -> usize {
        self.transactions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_take_all_preserves_order_and_clears() {
        let mut pool = Mempool::new();
        pool.add_transaction(Transaction::new("a", "b", 1));
        pool.add_transaction(Transaction::new("b", "c", 2));

        let taken = pool.take_all();
        assert_eq!(taken[0].sender, "a");
        assert_eq!(taken[1].sender, "b");
        assert!(pool.is_empty());
        assert_eq!(pool.len(), 0);
    }
}

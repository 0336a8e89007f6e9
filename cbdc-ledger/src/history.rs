//! Append-only transaction history
//!
//! Each value movement writes one [`TransactionHistory`] under
//! `tx_<txId>`. Queries by participant go through the store's selector
//! facility and come back in store order, not in commit order; callers that
//! need a timeline sort by `timestamp` themselves.

use crate::{
    stub::{ChaincodeStub, Selector},
    types::{history_key, AccountId, Amount, DocType, TransactionHistory, TransactionType},
    Error, Result,
};

/// Transaction log over one invocation's stub
pub struct TransactionLog<'s> {
    stub: &'s mut dyn ChaincodeStub,
}

impl std::fmt::Debug for TransactionLog<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionLog")
            .field("tx_id", &self.stub.tx_id())
            .finish_non_exhaustive()
    }
}

impl<'s> TransactionLog<'s> {
    /// Wrap a stub
    pub fn new(stub: &'s mut dyn ChaincodeStub) -> Self {
        Self { stub }
    }

    /// Record a movement under the invocation's transaction id
    ///
    /// `from_id` is the empty string for minted value.
    pub fn append(
        &mut self,
        from_id: &str,
        to_id: &AccountId,
        amount: Amount,
        tx_type: TransactionType,
    ) -> Result<TransactionHistory> {
        let tx_id = self.stub.tx_id().to_string();
        let key = history_key(&tx_id);
        if self.stub.get_state(&key)?.is_some() {
            return Err(Error::StateStore(format!(
                "history entry {} already recorded",
                tx_id
            )));
        }

        let entry = TransactionHistory {
            doc_type: DocType::Transaction,
            tx_id,
            from_id: from_id.to_string(),
            to_id: to_id.to_string(),
            amount,
            tx_type,
            timestamp: self.stub.tx_unix_time(),
        };

        self.stub.put_state(&key, serde_json::to_vec(&entry)?)?;

        tracing::debug!(
            tx_id = %entry.tx_id,
            from = %entry.from_id,
            to = %entry.to_id,
            amount = %amount,
            tx_type = %tx_type,
            "Transaction recorded"
        );

        Ok(entry)
    }

    /// Every entry where the account is the source or the destination
    pub fn query_by_participant(&mut self, account_id: &AccountId) -> Result<Vec<TransactionHistory>> {
        let selector = Selector::doc_type(DocType::Transaction)
            .or_field("fromId", account_id.as_str())
            .or_field("toId", account_id.as_str());

        self.stub
            .query(&selector)?
            .into_iter()
            .map(|(key, bytes)| {
                serde_json::from_slice(&bytes).map_err(|e| {
                    Error::StateStore(format!("corrupt history document {}: {}", key, e))
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{MemoryWorldState, WorldState};
    use crate::stub::Simulation;
    use chrono::Utc;

    fn record(world: &MemoryWorldState, tx_id: &str, from: &str, to: &str, cents: i64) {
        let mut sim = Simulation::new(world, tx_id, Utc::now());
        TransactionLog::new(&mut sim)
            .append(
                from,
                &AccountId::parse(to).unwrap(),
                Amount::from_minor_units(cents),
                TransactionType::Transfer,
            )
            .unwrap();
        world.commit(&sim.into_rwset()).unwrap();
    }

    #[test]
    fn test_append_writes_namespaced_key() {
        let world = MemoryWorldState::new();
        record(&world, "abc", "", "central-bank", 100);
        assert!(world.get("tx_abc").unwrap().is_some());
    }

    #[test]
    fn test_query_by_participant_matches_either_side() {
        let world = MemoryWorldState::new();
        record(&world, "t1", "alice", "bob", 100);
        record(&world, "t2", "bob", "carol", 200);
        record(&world, "t3", "carol", "alice", 300);

        let mut sim = Simulation::new(&world, "q", Utc::now());
        let mut log = TransactionLog::new(&mut sim);

        let mut alice: Vec<String> = log
            .query_by_participant(&AccountId::parse("alice").unwrap())
            .unwrap()
            .into_iter()
            .map(|e| e.tx_id)
            .collect();
        alice.sort();
        assert_eq!(alice, vec!["t1".to_string(), "t3".to_string()]);

        let dave = log
            .query_by_participant(&AccountId::parse("dave").unwrap())
            .unwrap();
        assert!(dave.is_empty());
    }

    #[test]
    fn test_second_append_in_same_tx_rejected() {
        let world = MemoryWorldState::new();
        let mut sim = Simulation::new(&world, "t1", Utc::now());
        let mut log = TransactionLog::new(&mut sim);
        let bob = AccountId::parse("bob").unwrap();

        log.append("alice", &bob, Amount::from_minor_units(1), TransactionType::Transfer)
            .unwrap();
        assert!(log
            .append("alice", &bob, Amount::from_minor_units(1), TransactionType::Transfer)
            .is_err());
    }
}

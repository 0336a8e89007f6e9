//! Account balance bookkeeping
//!
//! Balances live under `balance_<accountId>`. A missing document is an
//! explicit zero balance, never an error. Debits check funds before writing
//! anything, so a failed transfer leaves both sides untouched.

use crate::{
    stub::ChaincodeStub,
    types::{balance_key, AccountBalance, AccountId, Amount, DocType},
    Error, Result,
};

/// Balance accessor over one invocation's stub
pub struct AccountLedger<'s> {
    stub: &'s mut dyn ChaincodeStub,
}

impl std::fmt::Debug for AccountLedger<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccountLedger")
            .field("tx_id", &self.stub.tx_id())
            .finish_non_exhaustive()
    }
}

impl<'s> AccountLedger<'s> {
    /// Wrap a stub
    pub fn new(stub: &'s mut dyn ChaincodeStub) -> Self {
        Self { stub }
    }

    /// Current balance, or a zero record if the account was never credited
    pub fn get(&mut self, account_id: &AccountId) -> Result<AccountBalance> {
        match self.stub.get_state(&balance_key(account_id))? {
            Some(bytes) => {
                let balance: AccountBalance = serde_json::from_slice(&bytes).map_err(|e| {
                    Error::StateStore(format!(
                        "corrupt balance document for {}: {}",
                        account_id, e
                    ))
                })?;
                if balance.doc_type != DocType::Balance || balance.account_id != account_id.as_str() {
                    return Err(Error::StateStore(format!(
                        "balance key for {} holds a foreign document",
                        account_id
                    )));
                }
                Ok(balance)
            }
            None => Ok(AccountBalance::zero(account_id, self.stub.tx_unix_time())),
        }
    }

    /// Increase a balance
    pub fn credit(&mut self, account_id: &AccountId, amount: Amount) -> Result<AccountBalance> {
        let mut balance = self.get(account_id)?;
        balance.balance = balance.balance.checked_add(amount).ok_or_else(|| {
            Error::validation(format!("balance overflow crediting {}", account_id))
        })?;
        self.put(account_id, balance)
    }

    /// Decrease a balance, failing with `InsufficientFunds` before any write
    pub fn debit(&mut self, account_id: &AccountId, amount: Amount) -> Result<AccountBalance> {
        let mut balance = self.get(account_id)?;
        if balance.balance < amount {
            return Err(Error::InsufficientFunds {
                available: balance.balance,
                requested: amount,
            });
        }
        balance.balance = balance.balance.checked_sub(amount).ok_or_else(|| {
            Error::validation(format!("balance underflow debiting {}", account_id))
        })?;
        self.put(account_id, balance)
    }

    /// Move value between two accounts
    ///
    /// The debit goes first; the credit re-reads through the invocation's own
    /// pending writes, so `from == to` leaves the balance where it was.
    pub fn transfer(&mut self, from: &AccountId, to: &AccountId, amount: Amount) -> Result<()> {
        self.debit(from, amount)?;
        self.credit(to, amount)?;
        Ok(())
    }

    fn put(&mut self, account_id: &AccountId, mut balance: AccountBalance) -> Result<AccountBalance> {
        balance.modified_at = self.stub.tx_unix_time();
        self.stub
            .put_state(&balance_key(account_id), serde_json::to_vec(&balance)?)?;
        Ok(balance)
    }
}

//! Mint records
//!
//! One immutable [`TokenAsset`] per IssueTokens call, keyed by the minting
//! invocation's transaction id. Nothing updates or burns a record.

use crate::{
    stub::ChaincodeStub,
    types::{check_tx_id, AccountId, Amount, DocType, TokenAsset, TokenStatus, TransactionType},
    Error, Result,
};
use std::collections::BTreeMap;

/// Token registry over one invocation's stub
pub struct TokenRegistry<'s> {
    stub: &'s mut dyn ChaincodeStub,
}

impl std::fmt::Debug for TokenRegistry<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenRegistry")
            .field("tx_id", &self.stub.tx_id())
            .finish_non_exhaustive()
    }
}

impl<'s> TokenRegistry<'s> {
    /// Wrap a stub
    pub fn new(stub: &'s mut dyn ChaincodeStub) -> Self {
        Self { stub }
    }

    /// Record a mint of `amount` by `owner` on behalf of `issuer`
    pub fn mint(&mut self, owner: &AccountId, amount: Amount, issuer: &AccountId) -> Result<TokenAsset> {
        let id = self.stub.tx_id().to_string();
        check_tx_id(&id)?;
        if self.stub.get_state(&id)?.is_some() {
            return Err(Error::StateStore(format!("token {} already exists", id)));
        }

        let now = self.stub.tx_unix_time();
        let token = TokenAsset {
            doc_type: DocType::Token,
            id,
            owner: owner.to_string(),
            amount,
            issuer_id: issuer.to_string(),
            status: TokenStatus::Active,
            created_at: now,
            modified_at: now,
            transaction_type: TransactionType::Issue,
            metadata: BTreeMap::new(),
        };

        self.stub.put_state(&token.id, serde_json::to_vec(&token)?)?;

        tracing::debug!(token_id = %token.id, owner = %owner, amount = %amount, "Token minted");

        Ok(token)
    }

    /// Read a mint record
    pub fn get(&mut self, token_id: &str) -> Result<Option<TokenAsset>> {
        match self.stub.get_state(token_id)? {
            Some(bytes) => {
                let token: TokenAsset = serde_json::from_slice(&bytes)?;
                if token.doc_type != DocType::Token {
                    return Ok(None);
                }
                Ok(Some(token))
            }
            None => Ok(None),
        }
    }
}

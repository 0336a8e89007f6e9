//! Contract operations
//!
//! Every state transition runs the same pipeline against one stub:
//!
//! 1. amount must be positive
//! 2. identifiers must be well formed
//! 3. caller is resolved and authorized
//! 4. balances are read, checked and written
//! 5. the movement is appended to the history
//!
//! Any failure returns before the stub's write-set is committed, so a
//! rejected call leaves no trace in the world state.

use crate::{
    config::Config,
    history::TransactionLog,
    ledger::AccountLedger,
    policy::{AuthorizationPolicy, Caller, CallerIdentity},
    registry::TokenRegistry,
    stub::ChaincodeStub,
    types::{AccountBalance, AccountId, Amount, TransactionHistory, TransactionType, MINT_SOURCE},
    Error, Result,
};

/// The CBDC ledger contract
#[derive(Debug, Clone)]
pub struct LedgerContract {
    policy: AuthorizationPolicy,
}

impl LedgerContract {
    /// Create contract with an authorization policy
    pub fn new(policy: AuthorizationPolicy) -> Self {
        Self { policy }
    }

    /// Build from configuration
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self::new(AuthorizationPolicy::from_config(config)?))
    }

    /// Authorization policy in use
    pub fn policy(&self) -> &AuthorizationPolicy {
        &self.policy
    }

    /// No state to initialize; only checks the caller is enrolled
    pub fn init_ledger(&self, stub: &mut dyn ChaincodeStub, identity: &CallerIdentity) -> Result<()> {
        let caller = self.policy.resolve(identity)?;
        tracing::info!(tx_id = %stub.tx_id(), caller = %caller.principal, "Ledger initialized");
        Ok(())
    }

    /// Mint `amount` into the issuer account
    pub fn issue_tokens(
        &self,
        stub: &mut dyn ChaincodeStub,
        identity: &CallerIdentity,
        amount: Amount,
    ) -> Result<()> {
        require_positive(amount)?;
        let caller = self.policy.resolve(identity)?;
        self.policy.require_issuer(&caller)?;

        let issuer = self.policy.issuer_id().clone();
        AccountLedger::new(stub).credit(&issuer, amount)?;
        TokenRegistry::new(stub).mint(&caller.principal, amount, &issuer)?;
        TransactionLog::new(stub).append(MINT_SOURCE, &issuer, amount, TransactionType::Issue)?;

        tracing::info!(
            tx_id = %stub.tx_id(),
            caller = %caller.principal,
            amount = %amount,
            "Tokens issued"
        );
        Ok(())
    }

    /// Distribute from the issuer to an intermediary
    pub fn transfer_to_cb(
        &self,
        stub: &mut dyn ChaincodeStub,
        identity: &CallerIdentity,
        bank_id: &str,
        amount: Amount,
    ) -> Result<()> {
        require_positive(amount)?;
        let bank_id = AccountId::parse(bank_id)?;
        let caller = self.policy.resolve(identity)?;
        self.policy.require_issuer(&caller)?;
        self.policy.require_intermediary_account(&bank_id)?;

        let issuer = self.policy.issuer_id().clone();
        self.move_value(stub, &caller, &issuer, &bank_id, amount, TransactionType::CBToCommercial)
    }

    /// Distribute from the calling intermediary to a holder
    pub fn transfer_to_user(
        &self,
        stub: &mut dyn ChaincodeStub,
        identity: &CallerIdentity,
        user_id: &str,
        amount: Amount,
    ) -> Result<()> {
        require_positive(amount)?;
        let user_id = AccountId::parse(user_id)?;
        let caller = self.policy.resolve(identity)?;
        self.policy.require_intermediary(&caller)?;

        let bank = caller.principal.clone();
        self.move_value(stub, &caller, &bank, &user_id, amount, TransactionType::CommercialToUser)
    }

    /// Peer-to-peer transfer out of the caller's own account
    pub fn transfer_tokens(
        &self,
        stub: &mut dyn ChaincodeStub,
        identity: &CallerIdentity,
        from_id: &str,
        to_id: &str,
        amount: Amount,
    ) -> Result<()> {
        require_positive(amount)?;
        let from_id = AccountId::parse(from_id)?;
        let to_id = AccountId::parse(to_id)?;
        let caller = self.policy.resolve(identity)?;
        self.policy.require_holder(&caller)?;
        self.policy.require_owner(&caller, &from_id)?;

        self.move_value(stub, &caller, &from_id, &to_id, amount, TransactionType::Transfer)
    }

    /// Return value from the caller's own account to the issuer
    ///
    /// The issuer balance is not credited: redeemed value leaves circulation.
    pub fn redeem_tokens(
        &self,
        stub: &mut dyn ChaincodeStub,
        identity: &CallerIdentity,
        account_id: &str,
        amount: Amount,
    ) -> Result<()> {
        require_positive(amount)?;
        let account_id = AccountId::parse(account_id)?;
        let caller = self.policy.resolve(identity)?;
        self.policy.require_owner(&caller, &account_id)?;

        let issuer = self.policy.issuer_id().clone();
        AccountLedger::new(stub).debit(&account_id, amount)?;
        TransactionLog::new(stub).append(
            account_id.as_str(),
            &issuer,
            amount,
            TransactionType::Redeem,
        )?;

        tracing::info!(
            tx_id = %stub.tx_id(),
            caller = %caller.principal,
            account = %account_id,
            amount = %amount,
            "Tokens redeemed"
        );
        Ok(())
    }

    /// Balance of any account; zero if it was never credited
    pub fn get_balance(
        &self,
        stub: &mut dyn ChaincodeStub,
        identity: &CallerIdentity,
        account_id: &str,
    ) -> Result<AccountBalance> {
        let account_id = AccountId::parse(account_id)?;
        self.policy.resolve(identity)?;
        AccountLedger::new(stub).get(&account_id)
    }

    /// History of any account, in store order
    pub fn get_transaction_history(
        &self,
        stub: &mut dyn ChaincodeStub,
        identity: &CallerIdentity,
        account_id: &str,
    ) -> Result<Vec<TransactionHistory>> {
        let account_id = AccountId::parse(account_id)?;
        self.policy.resolve(identity)?;
        TransactionLog::new(stub).query_by_participant(&account_id)
    }

    fn move_value(
        &self,
        stub: &mut dyn ChaincodeStub,
        caller: &Caller,
        from: &AccountId,
        to: &AccountId,
        amount: Amount,
        tx_type: TransactionType,
    ) -> Result<()> {
        AccountLedger::new(stub).transfer(from, to, amount)?;
        TransactionLog::new(stub).append(from.as_str(), to, amount, tx_type)?;

        tracing::info!(
            tx_id = %stub.tx_id(),
            caller = %caller.principal,
            from = %from,
            to = %to,
            amount = %amount,
            tx_type = %tx_type,
            "Tokens transferred"
        );
        Ok(())
    }
}

fn require_positive(amount: Amount) -> Result<()> {
    if amount.is_positive() {
        Ok(())
    } else {
        Err(Error::validation(format!("amount must be positive, got {}", amount)))
    }
}

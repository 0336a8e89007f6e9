//! Function-name dispatch and the gateway response envelope
//!
//! The platform delivers `(function, args, identity)`. [`Operation::parse`]
//! maps the name and positional string arguments onto a typed operation;
//! [`invoke`] runs it and returns a JSON payload.

use crate::{
    contract::LedgerContract,
    error::ErrorKind,
    policy::CallerIdentity,
    stub::ChaincodeStub,
    types::Amount,
    Error, Result,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A parsed contract call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    /// `InitLedger()`
    InitLedger,
    /// `IssueTokens(amount)`
    IssueTokens {
        /// Amount to mint
        amount: Amount,
    },
    /// `TransferToCB(bankID, amount)`
    TransferToCb {
        /// Receiving intermediary
        bank_id: String,
        /// Amount to move
        amount: Amount,
    },
    /// `TransferToUser(userID, amount)`
    TransferToUser {
        /// Receiving holder
        user_id: String,
        /// Amount to move
        amount: Amount,
    },
    /// `TransferTokens(fromID, toID, amount)`
    TransferTokens {
        /// Debited account (must be the caller)
        from_id: String,
        /// Credited account
        to_id: String,
        /// Amount to move
        amount: Amount,
    },
    /// `RedeemTokens(accountID, amount)`
    RedeemTokens {
        /// Debited account (must be the caller)
        account_id: String,
        /// Amount to retire
        amount: Amount,
    },
    /// `GetBalance(accountID)`
    GetBalance {
        /// Account to read
        account_id: String,
    },
    /// `GetTransactionHistory(accountID)`
    GetTransactionHistory {
        /// Account to read
        account_id: String,
    },
}

impl Operation {
    /// Parse a function name and its positional arguments
    pub fn parse(function: &str, args: &[String]) -> Result<Self> {
        let op = match (function, args) {
            ("InitLedger", []) => Operation::InitLedger,
            ("IssueTokens", [amount]) => Operation::IssueTokens {
                amount: Amount::parse(amount)?,
            },
            ("TransferToCB", [bank_id, amount]) => Operation::TransferToCb {
                bank_id: bank_id.clone(),
                amount: Amount::parse(amount)?,
            },
            ("TransferToUser", [user_id, amount]) => Operation::TransferToUser {
                user_id: user_id.clone(),
                amount: Amount::parse(amount)?,
            },
            ("TransferTokens", [from_id, to_id, amount]) => Operation::TransferTokens {
                from_id: from_id.clone(),
                to_id: to_id.clone(),
                amount: Amount::parse(amount)?,
            },
            ("RedeemTokens", [account_id, amount]) => Operation::RedeemTokens {
                account_id: account_id.clone(),
                amount: Amount::parse(amount)?,
            },
            ("GetBalance", [account_id]) => Operation::GetBalance {
                account_id: account_id.clone(),
            },
            ("GetTransactionHistory", [account_id]) => Operation::GetTransactionHistory {
                account_id: account_id.clone(),
            },
            (name, _) => {
                return Err(match Self::arity(name) {
                    Some(expected) => Error::validation(format!(
                        "{} expects {} argument(s), got {}",
                        name,
                        expected,
                        args.len()
                    )),
                    None => Error::validation(format!("unknown function {:?}", name)),
                })
            }
        };
        Ok(op)
    }

    /// True for any exposed function name, whatever its arguments
    pub fn is_known(function: &str) -> bool {
        Self::arity(function).is_some()
    }

    fn arity(function: &str) -> Option<usize> {
        match function {
            "InitLedger" => Some(0),
            "IssueTokens" | "GetBalance" | "GetTransactionHistory" => Some(1),
            "TransferToCB" | "TransferToUser" | "RedeemTokens" => Some(2),
            "TransferTokens" => Some(3),
            _ => None,
        }
    }

    /// Execute against a stub
    pub fn execute(
        &self,
        contract: &LedgerContract,
        stub: &mut dyn ChaincodeStub,
        identity: &CallerIdentity,
    ) -> Result<Value> {
        match self {
            Operation::InitLedger => contract.init_ledger(stub, identity).map(|_| Value::Null),
            Operation::IssueTokens { amount } => contract
                .issue_tokens(stub, identity, *amount)
                .map(|_| Value::Null),
            Operation::TransferToCb { bank_id, amount } => contract
                .transfer_to_cb(stub, identity, bank_id, *amount)
                .map(|_| Value::Null),
            Operation::TransferToUser { user_id, amount } => contract
                .transfer_to_user(stub, identity, user_id, *amount)
                .map(|_| Value::Null),
            Operation::TransferTokens {
                from_id,
                to_id,
                amount,
            } => contract
                .transfer_tokens(stub, identity, from_id, to_id, *amount)
                .map(|_| Value::Null),
            Operation::RedeemTokens { account_id, amount } => contract
                .redeem_tokens(stub, identity, account_id, *amount)
                .map(|_| Value::Null),
            Operation::GetBalance { account_id } => {
                let balance = contract.get_balance(stub, identity, account_id)?;
                Ok(serde_json::to_value(balance)?)
            }
            Operation::GetTransactionHistory { account_id } => {
                let history = contract.get_transaction_history(stub, identity, account_id)?;
                Ok(serde_json::to_value(history)?)
            }
        }
    }
}

/// Entry point used by the hosting platform
pub fn invoke(
    contract: &LedgerContract,
    stub: &mut dyn ChaincodeStub,
    identity: &CallerIdentity,
    function: &str,
    args: &[String],
) -> Result<Value> {
    let result = Operation::parse(function, args)
        .and_then(|op| op.execute(contract, stub, identity));

    if let Err(ref e) = result {
        tracing::warn!(
            tx_id = %stub.tx_id(),
            function,
            caller = %identity.common_name,
            kind = ?e.kind(),
            error = %e,
            "Invocation rejected"
        );
    }

    result
}

/// Structured failure returned to the gateway
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    /// Error class
    pub kind: ErrorKind,
    /// Human-readable message
    pub message: String,
    /// Whether the client can fix the condition itself
    pub client_correctable: bool,
    /// Balance at the time of a failed debit
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub available: Option<Amount>,
    /// Amount of a failed debit
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requested: Option<Amount>,
}

/// Outcome of one proposal as seen by the gateway
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    /// 200 on success, otherwise the error's status code
    pub status: u16,
    /// Transaction id assigned by the platform
    #[serde(rename = "txId")]
    pub tx_id: String,
    /// Result payload (null for state transitions)
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub payload: Value,
    /// Failure details
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

impl Response {
    /// Successful response
    pub fn success(tx_id: impl Into<String>, payload: Value) -> Self {
        Self {
            status: 200,
            tx_id: tx_id.into(),
            payload,
            error: None,
        }
    }

    /// Failure response; store-level detail is not exposed
    pub fn failure(tx_id: impl Into<String>, error: &Error) -> Self {
        let (message, available, requested) = match error {
            Error::InsufficientFunds {
                available,
                requested,
            } => (error.to_string(), Some(*available), Some(*requested)),
            Error::Validation(_) | Error::Authorization(_) => (error.to_string(), None, None),
            _ => ("internal ledger error".to_string(), None, None),
        };

        Self {
            status: error.status_code(),
            tx_id: tx_id.into(),
            payload: Value::Null,
            error: Some(ErrorBody {
                kind: error.kind(),
                message,
                client_correctable: error.is_client_correctable(),
                available,
                requested,
            }),
        }
    }

    /// True for status 200
    pub fn is_success(&self) -> bool {
        self.status == 200
    }
}

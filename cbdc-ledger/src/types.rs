//! Core types for the ledger
//!
//! All types are designed for:
//! - Deterministic serialization (JSON documents with a fixed field order)
//! - Exact arithmetic (two-place `Decimal` for money)
//! - The stored document shape shared with other ledger clients (camelCase, `docType`)

use crate::{Error, Result};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Key prefix of balance documents
pub const BALANCE_KEY_PREFIX: &str = "balance_";

/// Key prefix of transaction history documents
pub const HISTORY_KEY_PREFIX: &str = "tx_";

/// `fromId` of an Issue record: minted value has no source account
pub const MINT_SOURCE: &str = "";

/// World-state key of an account balance
pub fn balance_key(account_id: &AccountId) -> String {
    format!("{}{}", BALANCE_KEY_PREFIX, account_id)
}

/// World-state key of a transaction history entry
pub fn history_key(tx_id: &str) -> String {
    format!("{}{}", HISTORY_KEY_PREFIX, tx_id)
}

/// Reject a transaction id that would collide with balance or history keys
///
/// Mint records are stored under the bare transaction id, so it must stay out
/// of the prefixed namespaces.
pub fn check_tx_id(tx_id: &str) -> Result<()> {
    if tx_id.is_empty() {
        return Err(Error::validation("transaction id must not be empty"));
    }
    if tx_id.starts_with(BALANCE_KEY_PREFIX) || tx_id.starts_with(HISTORY_KEY_PREFIX) {
        return Err(Error::validation(format!(
            "transaction id {:?} uses a reserved key prefix",
            tx_id
        )));
    }
    Ok(())
}

/// Account identifier (principal name, bank id, issuer id)
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AccountId(String);

impl AccountId {
    /// Parse an identifier, rejecting empty ids and characters outside `[A-Za-z0-9._@-]`
    pub fn parse(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        if id.is_empty() {
            return Err(Error::validation("account id must not be empty"));
        }
        if let Some(c) = id
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '@' | '-')))
        {
            return Err(Error::validation(format!(
                "account id {:?} contains invalid character {:?}",
                id, c
            )));
        }
        Ok(Self(id))
    }

    /// Get as string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for AccountId {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(value)
    }
}

impl From<AccountId> for String {
    fn from(id: AccountId) -> Self {
        id.0
    }
}

impl PartialEq<str> for AccountId {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

/// Currency amount with exactly two decimal places
///
/// Values are rounded half away from zero to two places on construction, so
/// every comparison and every displayed value agrees on the same cents.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Amount(Decimal);

impl Amount {
    /// Decimal places carried by every amount
    pub const SCALE: u32 = 2;

    /// Zero
    pub const ZERO: Amount = Amount(Decimal::ZERO);

    /// Normalize a decimal to two places
    pub fn new(value: Decimal) -> Self {
        let mut value =
            value.round_dp_with_strategy(Self::SCALE, RoundingStrategy::MidpointAwayFromZero);
        value.rescale(Self::SCALE);
        Self(value)
    }

    /// Build from minor units (cents)
    pub fn from_minor_units(units: i64) -> Self {
        Self(Decimal::new(units, Self::SCALE))
    }

    /// Parse a decimal string such as `"1000.00"` or `"1e3"`
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();
        Decimal::from_str(s)
            .or_else(|_| Decimal::from_scientific(s))
            .map(Self::new)
            .map_err(|_| Error::validation(format!("invalid amount {:?}", s)))
    }

    /// Underlying decimal
    pub fn as_decimal(&self) -> Decimal {
        self.0
    }

    /// Strictly greater than zero
    pub fn is_positive(&self) -> bool {
        self.0 > Decimal::ZERO
    }

    /// Checked addition
    pub fn checked_add(self, other: Amount) -> Option<Amount> {
        self.0.checked_add(other.0).map(Self::new)
    }

    /// Checked subtraction
    pub fn checked_sub(self, other: Amount) -> Option<Amount> {
        self.0.checked_sub(other.0).map(Self::new)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}

impl FromStr for Amount {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl From<Decimal> for Amount {
    fn from(value: Decimal) -> Self {
        Self::new(value)
    }
}

impl Serialize for Amount {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Amount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        // Accepts both "12.50" and 12.5
        Decimal::deserialize(deserializer).map(Self::new)
    }
}

impl std::iter::Sum for Amount {
    fn sum<I: Iterator<Item = Amount>>(iter: I) -> Self {
        Self::new(iter.map(|a| a.0).sum())
    }
}

/// Discriminator of the documents sharing the world state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocType {
    /// Mint record
    Token,
    /// Account balance
    Balance,
    /// Transaction history entry
    Transaction,
}

impl DocType {
    /// Value stored in the `docType` field
    pub fn as_str(&self) -> &'static str {
        match self {
            DocType::Token => "token",
            DocType::Balance => "balance",
            DocType::Transaction => "transaction",
        }
    }
}

/// Kind of value movement recorded in the history
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransactionType {
    /// Mint by the issuer
    Issue,
    /// Peer-to-peer transfer
    Transfer,
    /// Issuer to intermediary
    CBToCommercial,
    /// Intermediary to holder
    CommercialToUser,
    /// Return of value to the issuer
    Redeem,
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TransactionType::Issue => "Issue",
            TransactionType::Transfer => "Transfer",
            TransactionType::CBToCommercial => "CBToCommercial",
            TransactionType::CommercialToUser => "CommercialToUser",
            TransactionType::Redeem => "Redeem",
        };
        f.write_str(name)
    }
}

/// Lifecycle status of a mint record
///
/// Only `Active` is ever written; no operation moves a token to another status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TokenStatus {
    /// Freshly minted
    Active,
    /// Reserved
    Frozen,
    /// Reserved
    Burned,
}

/// Balance of one account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountBalance {
    /// Always [`DocType::Balance`]
    pub doc_type: DocType,
    /// Owning account
    pub account_id: String,
    /// Non-negative balance
    pub balance: Amount,
    /// Last modification (platform timestamp, Unix seconds)
    pub modified_at: i64,
}

impl AccountBalance {
    /// Zero balance for an account that has never been credited
    pub fn zero(account_id: &AccountId, modified_at: i64) -> Self {
        Self {
            doc_type: DocType::Balance,
            account_id: account_id.to_string(),
            balance: Amount::ZERO,
            modified_at,
        }
    }
}

/// Immutable record of one mint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenAsset {
    /// Always [`DocType::Token`]
    pub doc_type: DocType,
    /// Transaction id of the minting invocation
    pub id: String,
    /// Caller principal at mint time
    pub owner: String,
    /// Minted amount
    pub amount: Amount,
    /// Configured issuer account
    pub issuer_id: String,
    /// Always [`TokenStatus::Active`]
    pub status: TokenStatus,
    /// Creation time (Unix seconds)
    pub created_at: i64,
    /// Equal to `created_at`; records are never modified
    pub modified_at: i64,
    /// Always [`TransactionType::Issue`]
    pub transaction_type: TransactionType,
    /// Free-form annotations
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
}

/// Immutable history entry, one per value movement
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionHistory {
    /// Always [`DocType::Transaction`]
    pub doc_type: DocType,
    /// Transaction id of the invocation
    pub tx_id: String,
    /// Debited account, or [`MINT_SOURCE`] for an issue
    pub from_id: String,
    /// Credited account
    pub to_id: String,
    /// Moved amount
    pub amount: Amount,
    /// Kind of movement
    #[serde(rename = "type")]
    pub tx_type: TransactionType,
    /// Platform timestamp (Unix seconds)
    pub timestamp: i64,
}

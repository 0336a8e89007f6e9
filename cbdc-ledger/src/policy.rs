//! Caller identity and role-scoped authorization
//!
//! The hosting platform hands every invocation the caller's organization tag
//! (MSP id) and the subject common name of its verified credential. The policy
//! turns these into a [`Caller`] once per invocation; all permission checks
//! then work on the resolved [`Role`] and principal, never on raw strings.

use crate::{config::Config, types::AccountId, Error, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Role of an organization in the distribution hierarchy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    /// Central bank: mints and distributes to intermediaries
    Issuer,
    /// Commercial bank: receives from the issuer, distributes to holders
    Intermediary,
    /// End user
    Holder,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Identity attributes supplied by the platform for one invocation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallerIdentity {
    /// Organization affiliation tag
    pub msp_id: String,
    /// Credential subject common name, e.g. `user12211@org1.example.com`
    pub common_name: String,
}

impl CallerIdentity {
    /// Create identity
    pub fn new(msp_id: impl Into<String>, common_name: impl Into<String>) -> Self {
        Self {
            msp_id: msp_id.into(),
            common_name: common_name.into(),
        }
    }

    /// Portion of the common name before the first `@`
    pub fn principal(&self) -> &str {
        self.common_name
            .split('@')
            .next()
            .unwrap_or_default()
    }
}

/// Caller resolved against the role table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    /// Role of the caller's organization
    pub role: Role,
    /// Principal name, used as the caller's own account id
    pub principal: AccountId,
}

/// Role lookup and permission rules
#[derive(Debug, Clone)]
pub struct AuthorizationPolicy {
    roles: HashMap<String, Role>,
    issuer_id: AccountId,
    intermediary_pattern: Regex,
}

impl AuthorizationPolicy {
    /// Create policy from a role table, the issuer account and the intermediary id convention
    pub fn new(
        roles: impl IntoIterator<Item = (String, Role)>,
        issuer_id: AccountId,
        intermediary_pattern: &str,
    ) -> Result<Self> {
        let intermediary_pattern = Regex::new(intermediary_pattern).map_err(|e| {
            Error::Config(format!("invalid intermediary id pattern: {}", e))
        })?;
        Ok(Self {
            roles: roles.into_iter().collect(),
            issuer_id,
            intermediary_pattern,
        })
    }

    /// Build from configuration
    pub fn from_config(config: &Config) -> Result<Self> {
        let issuer_id = AccountId::parse(config.chaincode.issuer_id.clone())
            .map_err(|e| Error::Config(format!("invalid issuer id: {}", e)))?;
        Self::new(
            config
                .organizations
                .iter()
                .map(|(msp, role)| (msp.clone(), *role)),
            issuer_id,
            &config.chaincode.intermediary_id_pattern,
        )
    }

    /// Account that holds issued value
    pub fn issuer_id(&self) -> &AccountId {
        &self.issuer_id
    }

    /// Resolve the caller's role and principal
    pub fn resolve(&self, identity: &CallerIdentity) -> Result<Caller> {
        let role = *self.roles.get(&identity.msp_id).ok_or_else(|| {
            Error::unauthorized(format!(
                "organization {:?} is not enrolled in this ledger",
                identity.msp_id
            ))
        })?;

        let principal = identity.principal();
        if principal.is_empty() {
            return Err(Error::unauthorized("certificate common name not found"));
        }
        let principal = AccountId::parse(principal).map_err(|_| {
            Error::unauthorized(format!("unusable principal name {:?}", principal))
        })?;

        Ok(Caller { role, principal })
    }

    /// Caller must belong to the issuing organization
    pub fn require_issuer(&self, caller: &Caller) -> Result<()> {
        match caller.role {
            Role::Issuer => Ok(()),
            role => Err(Error::unauthorized(format!(
                "caller {} ({}) is not the central bank",
                caller.principal, role
            ))),
        }
    }

    /// Caller must belong to an intermediary organization
    pub fn require_intermediary(&self, caller: &Caller) -> Result<()> {
        match caller.role {
            Role::Intermediary => Ok(()),
            role => Err(Error::unauthorized(format!(
                "caller {} ({}) is not a commercial bank",
                caller.principal, role
            ))),
        }
    }

    /// Caller must be able to act as a holder
    pub fn require_holder(&self, caller: &Caller) -> Result<()> {
        match caller.role {
            Role::Holder | Role::Intermediary => Ok(()),
            role => Err(Error::unauthorized(format!(
                "caller {} ({}) cannot transfer peer-to-peer",
                caller.principal, role
            ))),
        }
    }

    /// Caller may only debit its own account
    pub fn require_owner(&self, caller: &Caller, account: &AccountId) -> Result<()> {
        if caller.principal == *account {
            Ok(())
        } else {
            Err(Error::unauthorized(format!(
                "caller {} not authorized to debit account {}",
                caller.principal, account
            )))
        }
    }

    /// Recipient of an issuer distribution must follow the intermediary id convention
    pub fn require_intermediary_account(&self, account: &AccountId) -> Result<()> {
        if *account != self.issuer_id && self.intermediary_pattern.is_match(account.as_str()) {
            Ok(())
        } else {
            Err(Error::unauthorized(format!(
                "account {} is not a commercial bank",
                account
            )))
        }
    }
}

//! Peer host: endorsement and commit
//!
//! This module ties together the contract, the world state and the committer
//! actor into the request/response surface used by a gateway.
//!
//! # Example
//!
//! ```no_run
//! use cbdc_ledger::{CallerIdentity, Config, Peer, Proposal};
//!
//! #[tokio::main]
//! async fn main() -> cbdc_ledger::Result<()> {
//!     let config = Config::default();
//!     let peer = Peer::open(config)?;
//!
//!     let issuer = CallerIdentity::new("Org1MSP", "admin@org1.example.com");
//!     let response = peer
//!         .submit(Proposal::new("IssueTokens", ["1000.00"], issuer))
//!         .await;
//!     assert!(response.is_success());
//!
//!     peer.shutdown().await
//! }
//! ```

use crate::{
    committer::{spawn_committer, CommitterHandle},
    contract::LedgerContract,
    dispatch::{self, Operation, Response},
    metrics::Metrics,
    policy::CallerIdentity,
    state::{MemoryWorldState, ReadWriteSet, WorldState},
    storage::RocksWorldState,
    stub::Simulation,
    types::check_tx_id,
    Config, Error, Result,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinHandle;
use uuid::Uuid;

/// A client request as delivered by the gateway
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Proposal {
    /// Contract function name
    pub function: String,

    /// Positional arguments; JSON numbers are accepted and kept as their text
    #[serde(default, deserialize_with = "string_args")]
    pub args: Vec<String>,

    /// Caller identity attributes
    pub identity: CallerIdentity,

    /// Transaction id; assigned by the peer when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tx_id: Option<String>,

    /// Platform timestamp (Unix seconds); assigned by the peer when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
}

impl Proposal {
    /// Proposal with peer-assigned transaction id and timestamp
    pub fn new<I, S>(function: impl Into<String>, args: I, identity: CallerIdentity) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            function: function.into(),
            args: args.into_iter().map(Into::into).collect(),
            identity,
            tx_id: None,
            timestamp: None,
        }
    }

    /// Pin the transaction id and timestamp (replay, tests)
    pub fn with_tx(mut self, tx_id: impl Into<String>, timestamp: i64) -> Self {
        self.tx_id = Some(tx_id.into());
        self.timestamp = Some(timestamp);
        self
    }
}

fn string_args<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Vec<String>, D::Error> {
    let values = Vec::<Value>::deserialize(deserializer)?;
    values
        .into_iter()
        .map(|value| match value {
            Value::String(s) => Ok(s),
            Value::Number(n) => Ok(n.to_string()),
            other => Err(serde::de::Error::custom(format!(
                "argument must be a string or number, got {}",
                other
            ))),
        })
        .collect()
}

/// Result of simulating a proposal, not yet committed
#[derive(Debug)]
pub struct Endorsement {
    /// Transaction id used during simulation
    pub tx_id: String,
    /// Function that was invoked
    pub function: String,
    /// Contract result
    pub result: Result<Value>,
    /// Reads and buffered writes; empty when the invocation failed
    pub rwset: ReadWriteSet,
}

/// Peer host
pub struct Peer {
    /// Contract instance
    contract: LedgerContract,

    /// Committed state
    world: Arc<dyn WorldState>,

    /// Actor handle for commits
    committer: CommitterHandle,

    /// Committer task
    committer_task: JoinHandle<()>,

    /// Metrics
    metrics: Metrics,

    /// Configuration
    config: Config,
}

impl std::fmt::Debug for Peer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Peer")
            .field("service", &self.config.service_name)
            .field("height", &self.world.height())
            .finish_non_exhaustive()
    }
}

impl Peer {
    /// Create a peer over an existing world state
    ///
    /// Must be called from within a Tokio runtime (the committer is spawned).
    pub fn new(config: Config, world: Arc<dyn WorldState>) -> Result<Self> {
        config.validate()?;
        let contract = LedgerContract::from_config(&config)?;
        let metrics = Metrics::new()
            .map_err(|e| Error::Config(format!("failed to register metrics: {}", e)))?;
        let (committer, committer_task) = spawn_committer(
            world.clone(),
            config.committer.mailbox_capacity,
            metrics.clone(),
        );

        tracing::info!(
            service = %config.service_name,
            issuer = %contract.policy().issuer_id(),
            height = world.height().0,
            "Peer started"
        );

        Ok(Self {
            contract,
            world,
            committer,
            committer_task,
            metrics,
            config,
        })
    }

    /// Open a peer backed by RocksDB at `config.data_dir`
    pub fn open(config: Config) -> Result<Self> {
        let world = Arc::new(RocksWorldState::open(&config)?);
        Self::new(config, world)
    }

    /// Peer over an empty in-memory world state
    pub fn in_memory(config: Config) -> Result<Self> {
        Self::new(config, Arc::new(MemoryWorldState::new()))
    }

    /// Simulate a proposal against the current world state
    pub fn endorse(&self, proposal: Proposal) -> Endorsement {
        let tx_id = proposal
            .tx_id
            .unwrap_or_else(|| Uuid::now_v7().to_string());
        let function = proposal.function;
        let label = if Operation::is_known(&function) {
            function.as_str()
        } else {
            "unknown"
        };

        let timestamp = check_tx_id(&tx_id).and_then(|_| match proposal.timestamp {
            Some(secs) => DateTime::from_timestamp(secs, 0)
                .ok_or_else(|| Error::validation(format!("timestamp {} out of range", secs))),
            None => DateTime::from_timestamp(Utc::now().timestamp(), 0)
                .ok_or_else(|| Error::validation("clock out of range")),
        });
        let timestamp = match timestamp {
            Ok(ts) => ts,
            Err(e) => {
                self.metrics.record_invocation(label, "ValidationError");
                return Endorsement {
                    rwset: ReadWriteSet::new(tx_id.clone()),
                    tx_id,
                    function,
                    result: Err(e),
                };
            }
        };

        let started = Instant::now();
        let mut simulation = Simulation::new(self.world.as_ref(), tx_id.clone(), timestamp);
        let result = dispatch::invoke(
            &self.contract,
            &mut simulation,
            &proposal.identity,
            &function,
            &proposal.args,
        );
        self.metrics
            .record_invoke_duration(started.elapsed().as_secs_f64());

        let outcome = match &result {
            Ok(_) => "ok".to_string(),
            Err(e) => format!("{:?}", e.kind()),
        };
        self.metrics.record_invocation(label, &outcome);

        // A failed invocation must not leave anything to commit
        let rwset = if result.is_ok() {
            simulation.into_rwset()
        } else {
            ReadWriteSet::new(tx_id.clone())
        };

        Endorsement {
            tx_id,
            function,
            result,
            rwset,
        }
    }

    /// Commit an endorsement and build the gateway response
    pub async fn commit(&self, endorsement: Endorsement) -> Response {
        let Endorsement {
            tx_id,
            function,
            result,
            rwset,
        } = endorsement;

        let payload = match result {
            Ok(payload) => payload,
            Err(e) => return Response::failure(tx_id, &e),
        };

        if rwset.is_read_only() {
            return Response::success(tx_id, payload);
        }

        match self.committer.commit(rwset).await {
            Ok(version) => {
                tracing::debug!(tx_id = %tx_id, function = %function, version = version.0, "Transaction committed");
                Response::success(tx_id, payload)
            }
            Err(e) => Response::failure(tx_id, &e),
        }
    }

    /// Endorse and commit
    pub async fn submit(&self, proposal: Proposal) -> Response {
        let endorsement = self.endorse(proposal);
        self.commit(endorsement).await
    }

    /// Endorse only; never commits, even for state transitions
    pub fn evaluate(&self, proposal: Proposal) -> Response {
        let endorsement = self.endorse(proposal);
        match endorsement.result {
            Ok(payload) => Response::success(endorsement.tx_id, payload),
            Err(e) => Response::failure(endorsement.tx_id, &e),
        }
    }

    /// Committed world state
    pub fn world_state(&self) -> &Arc<dyn WorldState> {
        &self.world
    }

    /// Metrics collector
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Configuration in use
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Stop the committer and wait until it has released the world state
    pub async fn shutdown(self) -> Result<()> {
        self.committer.shutdown().await?;
        self.committer_task
            .await
            .map_err(|e| Error::Concurrency(format!("committer task failed: {}", e)))?;
        tracing::info!(height = self.world.height().0, "Peer stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn issuer() -> CallerIdentity {
        CallerIdentity::new("Org1MSP", "admin@org1.example.com")
    }

    fn holder(name: &str) -> CallerIdentity {
        CallerIdentity::new("Org3MSP", name)
    }

    #[tokio::test]
    async fn test_submit_and_query() {
        let peer = Peer::in_memory(Config::default()).unwrap();

        let response = peer
            .submit(Proposal::new("IssueTokens", ["1000.00"], issuer()))
            .await;
        assert!(response.is_success(), "{:?}", response);

        let response = peer.evaluate(Proposal::new("GetBalance", ["central-bank"], holder("alice")));
        assert_eq!(response.payload["balance"], "1000.00");

        peer.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_failed_endorsement_has_empty_write_set() {
        let peer = Peer::in_memory(Config::default()).unwrap();

        let endorsement = peer.endorse(Proposal::new(
            "TransferTokens",
            ["alice", "bob", "70.00"],
            holder("alice"),
        ));
        assert!(matches!(
            endorsement.result,
            Err(Error::InsufficientFunds { .. })
        ));
        assert!(endorsement.rwset.writes.is_empty());

        let response = peer.commit(endorsement).await;
        let error = response.error.unwrap();
        assert_eq!(error.kind, ErrorKind::InsufficientFunds);
        assert_eq!(error.available.unwrap().to_string(), "0.00");
        assert_eq!(error.requested.unwrap().to_string(), "70.00");

        peer.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_evaluate_does_not_commit() {
        let peer = Peer::in_memory(Config::default()).unwrap();

        let response = peer.evaluate(Proposal::new("IssueTokens", ["5"], issuer()));
        assert!(response.is_success());
        assert_eq!(peer.world_state().height().0, 0);

        peer.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_pinned_tx_id_and_timestamp() {
        let peer = Peer::in_memory(Config::default()).unwrap();

        let response = peer
            .submit(Proposal::new("IssueTokens", ["5"], issuer()).with_tx("fixed-1", 1_700_000_000))
            .await;
        assert_eq!(response.tx_id, "fixed-1");

        let token = peer.world_state().get("fixed-1").unwrap().unwrap();
        let token: Value = serde_json::from_slice(&token.value).unwrap();
        assert_eq!(token["createdAt"], 1_700_000_000);

        peer.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_pinned_tx_id_cannot_shadow_reserved_keys() {
        let peer = Peer::in_memory(Config::default()).unwrap();

        for tx_id in ["balance_bank9", "tx_abc", ""] {
            let response = peer
                .submit(Proposal::new("IssueTokens", ["5"], issuer()).with_tx(tx_id, 1_700_000_000))
                .await;
            assert_eq!(response.status, 400, "{:?}", response);
            assert_eq!(response.error.unwrap().kind, ErrorKind::ValidationError);
        }
        assert_eq!(peer.world_state().height().0, 0);
        assert!(peer.world_state().get("balance_bank9").unwrap().is_none());

        // The account behind the rejected id stays usable
        peer.submit(Proposal::new("IssueTokens", ["5"], issuer())).await;
        let response = peer
            .submit(Proposal::new("TransferToCB", ["bank9", "2.50"], issuer()))
            .await;
        assert!(response.is_success(), "{:?}", response);
        let response = peer.evaluate(Proposal::new("GetBalance", ["bank9"], holder("alice")));
        assert_eq!(response.payload["balance"], "2.50");

        peer.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_metrics_recorded() {
        let peer = Peer::in_memory(Config::default()).unwrap();

        peer.submit(Proposal::new("IssueTokens", ["5"], issuer())).await;
        peer.submit(Proposal::new("IssueTokens", ["5"], holder("alice"))).await;

        let metrics = peer.metrics();
        assert_eq!(
            metrics
                .invocations_total
                .with_label_values(&["IssueTokens", "ok"])
                .get(),
            1
        );
        assert_eq!(
            metrics
                .invocations_total
                .with_label_values(&["IssueTokens", "AuthorizationError"])
                .get(),
            1
        );
        assert_eq!(metrics.commits_total.with_label_values(&["committed"]).get(), 1);

        peer.shutdown().await.unwrap();
    }

    #[test]
    fn test_proposal_accepts_numeric_args() {
        let proposal: Proposal = serde_json::from_str(
            r#"{"function":"TransferToCB","args":["bank1", 400.5],
                "identity":{"mspId":"Org1MSP","commonName":"admin"}}"#,
        )
        .unwrap();
        assert_eq!(proposal.args, vec!["bank1".to_string(), "400.5".to_string()]);
        assert!(proposal.tx_id.is_none());

        let bad: std::result::Result<Proposal, _> = serde_json::from_str(
            r#"{"function":"GetBalance","args":[null],
                "identity":{"mspId":"Org1MSP","commonName":"admin"}}"#,
        );
        assert!(bad.is_err());
    }
}

//! Configuration for the ledger chaincode and its peer host

use crate::policy::Role;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Ledger configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Data directory for RocksDB
    pub data_dir: PathBuf,

    /// Service name
    pub service_name: String,

    /// Chaincode constants
    pub chaincode: ChaincodeConfig,

    /// Organization (MSP id) to role table
    pub organizations: BTreeMap<String, Role>,

    /// RocksDB configuration
    pub rocksdb: RocksDBConfig,

    /// Committer configuration
    pub committer: CommitterConfig,
}

impl Default for Config {
    fn default() -> Self {
        let organizations = [
            ("Org1MSP", Role::Issuer),
            ("Org2MSP", Role::Intermediary),
            ("Org3MSP", Role::Holder),
        ]
        .into_iter()
        .map(|(msp, role)| (msp.to_string(), role))
        .collect();

        Self {
            data_dir: PathBuf::from("./data/cbdc"),
            service_name: "cbdc-ledger".to_string(),
            chaincode: ChaincodeConfig::default(),
            organizations,
            rocksdb: RocksDBConfig::default(),
            committer: CommitterConfig::default(),
        }
    }
}

/// Constants injected into the contract
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChaincodeConfig {
    /// Account credited by IssueTokens and named in Redeem records
    pub issuer_id: String,

    /// Regular expression an intermediary account id must match
    pub intermediary_id_pattern: String,
}

impl Default for ChaincodeConfig {
    fn default() -> Self {
        Self {
            issuer_id: "central-bank".to_string(),
            intermediary_id_pattern: "^bank[A-Za-z0-9_-]*$".to_string(),
        }
    }
}

/// RocksDB configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RocksDBConfig {
    /// Write buffer size (MB)
    pub write_buffer_size_mb: usize,

    /// Max write buffers
    pub max_write_buffer_number: i32,

    /// Max background jobs (compaction + flush)
    pub max_background_jobs: i32,

    /// Enable statistics
    pub enable_statistics: bool,
}

impl Default for RocksDBConfig {
    fn default() -> Self {
        Self {
            write_buffer_size_mb: 64,
            max_write_buffer_number: 4,
            max_background_jobs: 2,
            enable_statistics: false,
        }
    }
}

/// Committer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CommitterConfig {
    /// Bounded mailbox size of the committer actor
    pub mailbox_capacity: usize,
}

impl Default for CommitterConfig {
    fn default() -> Self {
        Self {
            mailbox_capacity: 1000,
        }
    }
}

impl Config {
    /// Load from file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| crate::Error::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from environment variables
    ///
    /// Starts from the file named by `CBDC_CONFIG` when set, otherwise from defaults.
    pub fn from_env() -> crate::Result<Self> {
        let mut config = match std::env::var("CBDC_CONFIG") {
            Ok(path) => Config::from_file(path)?,
            Err(_) => Config::default(),
        };

        if let Ok(data_dir) = std::env::var("CBDC_DATA_DIR") {
            config.data_dir = PathBuf::from(data_dir);
        }

        if let Ok(issuer_id) = std::env::var("CBDC_ISSUER_ID") {
            config.chaincode.issuer_id = issuer_id;
        }

        if let Ok(pattern) = std::env::var("CBDC_INTERMEDIARY_PATTERN") {
            config.chaincode.intermediary_id_pattern = pattern;
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the contract cannot run with
    pub fn validate(&self) -> crate::Result<()> {
        if self.chaincode.issuer_id.trim().is_empty() {
            return Err(crate::Error::Config("issuer_id must not be empty".to_string()));
        }

        regex::Regex::new(&self.chaincode.intermediary_id_pattern).map_err(|e| {
            crate::Error::Config(format!("invalid intermediary_id_pattern: {}", e))
        })?;

        if !self.organizations.values().any(|role| *role == Role::Issuer) {
            return Err(crate::Error::Config(
                "no organization is mapped to the Issuer role".to_string(),
            ));
        }

        if self.committer.mailbox_capacity == 0 {
            return Err(crate::Error::Config(
                "committer mailbox_capacity must be positive".to_string(),
            ));
        }

        Ok(())
    }
}

//! Configuration loading and validation for Flotilla runs
//!
//! This module parses an optional TOML file into a [`RunConfig`]: the worker
//! command every instance runs and the fixed set of parameters forwarded to
//! each worker as environment variables. Missing tables and keys fall back to
//! serde defaults. Validation only covers what the orchestrator itself needs
//! to launch processes; worker parameter values are forwarded verbatim.

use crate::{CoreError, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// Placeholder replaced by the instance home directory in worker arguments
pub const HOME_PLACEHOLDER: &str = "{home}";
/// Placeholder replaced by the instance index in worker arguments
pub const INDEX_PLACEHOLDER: &str = "{index}";

/// Top-level TOML structure for a run configuration
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct RunConfig {
    /// Worker command launched for every instance
    pub worker: WorkerCommand,
    /// Consensus parameters
    pub consensus: ConsensusParams,
    /// Mempool parameters
    pub mempool: MempoolParams,
    /// Synthetic load parameters
    pub test: TestParams,
    /// Extra variables forwarded verbatim to every worker
    pub env: BTreeMap<String, String>,
}

/// Program and argument template for the worker binary
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct WorkerCommand {
    /// Program to execute (resolved through PATH when not absolute)
    pub program: String,
    /// Arguments; `{home}` and `{index}` are substituted per instance
    pub args: Vec<String>,
    /// Prefix for the generated parameter variables
    pub env_prefix: String,
}

impl Default for WorkerCommand {
    fn default() -> Self {
        Self {
            program: "malachite-cli".to_string(),
            args: vec![
                "start".to_string(),
                "--home".to_string(),
                HOME_PLACEHOLDER.to_string(),
            ],
            env_prefix: "MALACHITE".to_string(),
        }
    }
}

impl WorkerCommand {
    /// Arguments for one instance with placeholders substituted
    pub fn render_args(&self, index: usize, home: &Path) -> Vec<String> {
        let home = home.display().to_string();
        let index = index.to_string();
        self.args
            .iter()
            .map(|arg| {
                arg.replace(HOME_PLACEHOLDER, &home)
                    .replace(INDEX_PLACEHOLDER, &index)
            })
            .collect()
    }
}

/// Block, message and round timing parameters
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct ConsensusParams {
    /// Largest block a proposer may build
    pub max_block_size: String,
    /// Largest network message accepted
    pub max_message_size: String,
    /// Propose step timeout
    pub timeout_propose: String,
    /// Prevote step timeout
    pub timeout_prevote: String,
    /// Precommit step timeout
    pub timeout_precommit: String,
    /// Delay after commit before the next height
    pub timeout_commit: String,
}

impl Default for ConsensusParams {
    fn default() -> Self {
        Self {
            max_block_size: "50KiB".to_string(),
            max_message_size: "1MiB".to_string(),
            timeout_propose: "5s".to_string(),
            timeout_prevote: "1s".to_string(),
            timeout_precommit: "1s".to_string(),
            timeout_commit: "0s".to_string(),
        }
    }
}

/// A worker parameter as written in the config file
///
/// Strings are forwarded unchanged. TOML numbers are accepted too: integers
/// keep their decimal form and floats always keep a fractional part, so
/// `1.0` reaches the worker as `1.0` rather than `1`.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum ParamValue {
    /// Quoted value, forwarded as-is
    Text(String),
    /// Integer literal
    Integer(i64),
    /// Float literal
    Float(f64),
}

impl std::fmt::Display for ParamValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParamValue::Text(s) => f.write_str(s),
            ParamValue::Integer(n) => write!(f, "{n}"),
            // Debug never drops the fractional part of a float
            ParamValue::Float(x) => write!(f, "{x:?}"),
        }
    }
}

/// Outstanding-item limits
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct MempoolParams {
    /// Maximum number of pending transactions
    pub max_tx_count: ParamValue,
    /// Transactions per gossip batch (0 disables batching)
    pub gossip_batch_size: ParamValue,
}

impl Default for MempoolParams {
    fn default() -> Self {
        Self {
            max_tx_count: ParamValue::Integer(10_000),
            gossip_batch_size: ParamValue::Integer(0),
        }
    }
}

/// Synthetic payload and work-estimate parameters
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct TestParams {
    /// Size of each synthetic transaction
    pub tx_size: String,
    /// Transactions packed into one block part
    pub txs_per_part: ParamValue,
    /// Share of the round time a proposer may spend building
    pub time_allowance_factor: ParamValue,
    /// Simulated execution time per transaction
    pub exec_time_per_tx: String,
}

impl Default for TestParams {
    fn default() -> Self {
        Self {
            tx_size: "1KiB".to_string(),
            txs_per_part: ParamValue::Integer(1024),
            time_allowance_factor: ParamValue::Float(0.5),
            exec_time_per_tx: "1ms".to_string(),
        }
    }
}

/// Immutable environment handed to every worker of a run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkerEnv {
    vars: BTreeMap<String, String>,
}

impl WorkerEnv {
    /// Look up a single variable
    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    /// Iterate variables in key order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.vars.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Number of variables
    pub fn len(&self) -> usize {
        self.vars.len()
    }

    /// Whether no variables are set
    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }
}

impl FromIterator<(String, String)> for WorkerEnv {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self {
            vars: iter.into_iter().collect(),
        }
    }
}

impl RunConfig {
    /// Replace the worker program and arguments, keeping the env prefix
    pub fn with_command(mut self, program: String, args: Vec<String>) -> Self {
        self.worker.program = program;
        self.worker.args = args;
        self
    }

    /// Build the environment forwarded to every worker.
    ///
    /// Parameter keys are `<PREFIX>__<SECTION>__<NAME>`; entries from the
    /// `[env]` table are added as-is and win over generated keys.
    pub fn worker_env(&self) -> WorkerEnv {
        let prefix = &self.worker.env_prefix;
        let c = &self.consensus;
        let m = &self.mempool;
        let t = &self.test;

        let params: [(&str, &str, String); 12] = [
            ("CONSENSUS", "MAX_BLOCK_SIZE", c.max_block_size.clone()),
            ("CONSENSUS", "MAX_MESSAGE_SIZE", c.max_message_size.clone()),
            ("CONSENSUS", "TIMEOUT_PROPOSE", c.timeout_propose.clone()),
            ("CONSENSUS", "TIMEOUT_PREVOTE", c.timeout_prevote.clone()),
            ("CONSENSUS", "TIMEOUT_PRECOMMIT", c.timeout_precommit.clone()),
            ("CONSENSUS", "TIMEOUT_COMMIT", c.timeout_commit.clone()),
            ("MEMPOOL", "MAX_TX_COUNT", m.max_tx_count.to_string()),
            ("MEMPOOL", "GOSSIP_BATCH_SIZE", m.gossip_batch_size.to_string()),
            ("TEST", "TX_SIZE", t.tx_size.clone()),
            ("TEST", "TXS_PER_PART", t.txs_per_part.to_string()),
            ("TEST", "TIME_ALLOWANCE_FACTOR", t.time_allowance_factor.to_string()),
            ("TEST", "EXEC_TIME_PER_TX", t.exec_time_per_tx.clone()),
        ];

        params
            .into_iter()
            .map(|(section, name, value)| (format!("{prefix}__{section}__{name}"), value))
            .chain(self.env.iter().map(|(k, v)| (k.clone(), v.clone())))
            .collect()
    }

    /// Validate the configuration and return `Result<()>` with field-path errors
    pub fn validate(&self) -> Result<()> {
        if self.worker.program.trim().is_empty() {
            return Err(CoreError::ValidationError(
                "worker.program: cannot be empty".to_string(),
            ));
        }
        if self.worker.env_prefix.trim().is_empty() {
            return Err(CoreError::ValidationError(
                "worker.envPrefix: cannot be empty".to_string(),
            ));
        }
        validate_env_name("worker.envPrefix", &self.worker.env_prefix)?;
        for key in self.env.keys() {
            if key.trim().is_empty() {
                return Err(CoreError::ValidationError(
                    "env: keys cannot be empty".to_string(),
                ));
            }
            validate_env_name(&format!("env.{key}"), key)?;
        }
        Ok(())
    }
}

fn validate_env_name(field: &str, name: &str) -> Result<()> {
    if name.contains('=') || name.contains('\0') {
        return Err(CoreError::ValidationError(format!(
            "{field}: must not contain '=' or NUL"
        )));
    }
    Ok(())
}

/// Load a run configuration from a TOML file path
pub fn load_config_from_toml_path(path: impl AsRef<Path>) -> Result<RunConfig> {
    let data = fs::read_to_string(&path).map_err(|e| {
        CoreError::ConfigurationError(format!("Failed to read config {:?}: {}", path.as_ref(), e))
    })?;
    load_config_from_toml_str(&data)
}

/// Load a run configuration from a TOML string
pub fn load_config_from_toml_str(input: &str) -> Result<RunConfig> {
    let cfg: RunConfig = toml::from_str(input)
        .map_err(|e| CoreError::ConfigurationError(format!("TOML parse error: {}", e)))?;
    cfg.validate()?;
    Ok(cfg)
}

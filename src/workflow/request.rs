use crate::network::{ChaincodeHandle, DeployRequest, SubmittedTx};
use serde::{Deserialize, Serialize};
use std::fmt;

/// What to deploy: code locator, entry function and its arguments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentDescriptor {
    #[serde(rename = "chaincodePath")]
    pub code_path: String,
    #[serde(rename = "fcn")]
    pub function: String,
    pub args: Vec<String>,
}

impl DeploymentDescriptor {
    pub fn new(code_path: &str, function: &str, args: &[&str]) -> Self {
        Self {
            code_path: code_path.to_string(),
            function: function.to_string(),
            args: args.iter().map(|arg| arg.to_string()).collect(),
        }
    }
}

impl From<DeploymentDescriptor> for DeployRequest {
    fn from(descriptor: DeploymentDescriptor) -> Self {
        DeployRequest {
            chaincode_path: descriptor.code_path,
            fcn: descriptor.function,
            args: descriptor.args,
        }
    }
}

/// A chaincode function call. Without an explicit chaincode ID it targets
/// the chaincode deployed by the run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChaincodeCall {
    #[serde(rename = "chaincodeID")]
    pub chaincode_id: Option<ChaincodeHandle>,
    #[serde(rename = "fcn")]
    pub function: String,
    pub args: Vec<String>,
}

impl ChaincodeCall {
    pub fn new(function: &str, args: Vec<String>) -> Self {
        Self {
            chaincode_id: None,
            function: function.to_string(),
            args,
        }
    }

    pub fn on(mut self, chaincode_id: ChaincodeHandle) -> Self {
        self.chaincode_id = Some(chaincode_id);
        self
    }
}

impl fmt::Display for ChaincodeCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let json = serde_json::to_string(self).map_err(|_| fmt::Error)?;
        f.write_str(&json)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransactionRequest {
    Invoke(ChaincodeCall),
    Query(ChaincodeCall),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransactionOutcome {
    /// A query's result.
    Completed { payload: Vec<u8> },
    /// An invocation accepted for processing, not yet known to be committed.
    Submitted { receipt: SubmittedTx },
    Failed { cause: String },
}

/// An invocation observed committed through the event hub.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommittedTx {
    pub tx_id: String,
    pub block_number: u64,
}

/// Inputs for a complete enroll, register and deploy run.
#[derive(Debug, Clone)]
pub struct WorkflowPlan {
    pub admin_name: String,
    pub admin_secret: String,
    pub user_name: String,
    pub affiliation: String,
    pub deployment: DeploymentDescriptor,
}

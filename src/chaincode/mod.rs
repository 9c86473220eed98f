//! Chaincode programs executed by the simulated peers.

pub mod crowd_fund;
pub mod example02;

pub use crowd_fund::CrowdFundChaincode;
pub use example02::Example02Chaincode;

use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{0}")]
pub struct ChaincodeError(pub String);

impl ChaincodeError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

pub type ChaincodeResult = Result<Vec<u8>, ChaincodeError>;

/// Key/value state of one chaincode instance as seen by a single
/// transaction.
#[derive(Debug, Clone, Default)]
pub struct ChaincodeStub {
    state: HashMap<String, Vec<u8>>,
}

impl ChaincodeStub {
    pub fn get_state(&self, key: &str) -> Option<&[u8]> {
        self.state.get(key).map(Vec::as_slice)
    }

    pub fn put_state(&mut self, key: &str, value: Vec<u8>) {
        self.state.insert(key.to_string(), value);
    }

    pub fn del_state(&mut self, key: &str) {
        self.state.remove(key);
    }
}

pub trait Chaincode: Send + Sync {
    fn init(&self, stub: &mut ChaincodeStub, function: &str, args: &[String]) -> ChaincodeResult;
    fn invoke(&self, stub: &mut ChaincodeStub, function: &str, args: &[String])
    -> ChaincodeResult;
    fn query(&self, stub: &ChaincodeStub, function: &str, args: &[String]) -> ChaincodeResult;
}

/// Parses a decimal integer argument or state value.
pub(crate) fn parse_int(raw: &[u8], message: &str) -> Result<i64, ChaincodeError> {
    std::str::from_utf8(raw)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .ok_or_else(|| ChaincodeError::new(message))
}

/// Chaincode programs installed on the peers, keyed by code path.
#[derive(Clone, Default)]
pub struct ChaincodeRegistry {
    installed: HashMap<String, Arc<dyn Chaincode>>,
}

impl ChaincodeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the bundled example and crowd-fund chaincodes.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        let example02: Arc<dyn Chaincode> = Arc::new(Example02Chaincode);
        registry.install("chaincode_example02", example02.clone());
        registry.install(
            "github.com/hyperledger/fabric/examples/chaincode/go/chaincode_example02",
            example02,
        );
        registry.install("crowd_fund_chaincode", Arc::new(CrowdFundChaincode));
        registry
    }

    pub fn install(&mut self, code_path: &str, chaincode: Arc<dyn Chaincode>) {
        self.installed.insert(code_path.to_string(), chaincode);
    }

    pub fn resolve(&self, code_path: &str) -> Option<Arc<dyn Chaincode>> {
        self.installed.get(code_path).cloned()
    }
}

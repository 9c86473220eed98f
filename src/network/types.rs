use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier assigned to a chaincode instance by a successful deployment.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChaincodeHandle(String);

impl ChaincodeHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChaincodeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Writes a request as compact JSON, the form it takes in logs and error
/// payloads.
fn write_json<T: Serialize>(value: &T, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let json = serde_json::to_string(value).map_err(|_| fmt::Error)?;
    f.write_str(&json)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationRequest {
    #[serde(rename = "enrollmentID")]
    pub enrollment_id: String,
    pub affiliation: String,
}

impl RegistrationRequest {
    pub fn new(enrollment_id: impl Into<String>, affiliation: impl Into<String>) -> Self {
        Self {
            enrollment_id: enrollment_id.into(),
            affiliation: affiliation.into(),
        }
    }
}

impl fmt::Display for RegistrationRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_json(self, f)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeployRequest {
    #[serde(rename = "chaincodePath")]
    pub chaincode_path: String,
    pub fcn: String,
    pub args: Vec<String>,
}

impl fmt::Display for DeployRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_json(self, f)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvokeRequest {
    #[serde(rename = "chaincodeID")]
    pub chaincode_id: ChaincodeHandle,
    pub fcn: String,
    pub args: Vec<String>,
}

impl fmt::Display for InvokeRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_json(self, f)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryRequest {
    #[serde(rename = "chaincodeID")]
    pub chaincode_id: ChaincodeHandle,
    pub fcn: String,
    pub args: Vec<String>,
}

impl fmt::Display for QueryRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_json(self, f)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeployResults {
    #[serde(rename = "chaincodeID")]
    pub chaincode_id: ChaincodeHandle,
    pub tx_id: String,
}

/// Acknowledgment that an invocation was accepted for processing. It says
/// nothing about whether the transaction has been committed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmittedTx {
    pub tx_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryResults {
    pub result: Vec<u8>,
}

impl QueryResults {
    pub fn result_string(&self) -> String {
        String::from_utf8_lossy(&self.result).into_owned()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TxValidation {
    Committed,
    Rejected(String),
}

/// Where and how a transaction was committed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxStatus {
    pub block_number: u64,
    pub validation: TxValidation,
}

/// Events delivered by the event hub once transactions are committed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChainEvent {
    Transaction {
        tx_id: String,
        chaincode_id: ChaincodeHandle,
        block_number: u64,
        validation: TxValidation,
    },
    Block {
        number: u64,
        hash: String,
        tx_ids: Vec<String>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn requests_display_with_sdk_field_names() {
        let request = InvokeRequest {
            chaincode_id: ChaincodeHandle::new("abc"),
            fcn: "invoke".to_string(),
            args: vec!["a".to_string(), "b".to_string(), "10".to_string()],
        };

        assert_eq!(
            request.to_string(),
            r#"{"chaincodeID":"abc","fcn":"invoke","args":["a","b","10"]}"#
        );
        assert_eq!(
            RegistrationRequest::new("WebApp_user1", "bank_a").to_string(),
            r#"{"enrollmentID":"WebApp_user1","affiliation":"bank_a"}"#
        );
    }
}

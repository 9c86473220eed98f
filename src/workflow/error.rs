use super::request::ChaincodeCall;
use super::stage::WorkflowStage;
use crate::network::{ChaincodeHandle, DeployRequest, LedgerError, RegistrationRequest};
use serde::Serialize;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Identity of an enrollment attempt; the secret is deliberately absent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EnrollRequest {
    #[serde(rename = "enrollmentID")]
    pub enrollment_id: String,
}

impl fmt::Display for EnrollRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let json = serde_json::to_string(self).map_err(|_| fmt::Error)?;
        f.write_str(&json)
    }
}

/// A stage was attempted without what it depends on. Raised before any
/// network request is made.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PreconditionError {
    #[error("no registrar has been enrolled in this run")]
    NoRegistrar,

    #[error("registrar '{0}' is already set for this run")]
    RegistrarAlreadySet(String),

    #[error("'{0}' lacks registrar capability")]
    NotARegistrar(String),

    #[error("identity '{0}' is not enrolled")]
    NotEnrolled(String),

    #[error("no chaincode has been deployed in this run")]
    NotDeployed,

    #[error("chaincode {0} is already deployed in this run")]
    AlreadyDeployed(ChaincodeHandle),

    #[error("chaincode {0} was not deployed by this run")]
    UnknownHandle(ChaincodeHandle),

    #[error("workflow run has {0}")]
    RunFailed(WorkflowStage),

    #[error("expected stage {expected}, but the run is at {actual}")]
    OutOfOrder {
        expected: WorkflowStage,
        actual: WorkflowStage,
    },
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FailureCause {
    #[error("precondition failed: {0}")]
    Precondition(#[from] PreconditionError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error("timed out after {0:?}")]
    TimedOut(Duration),
}

impl FailureCause {
    pub fn is_precondition(&self) -> bool {
        matches!(self, FailureCause::Precondition(_))
    }

    pub fn is_resource_exhausted(&self) -> bool {
        matches!(self, FailureCause::Ledger(e) if e.is_resource_exhausted())
    }
}

/// Failure of one workflow operation, carrying the request that failed.
#[derive(Debug, Clone)]
pub struct OperationError<R> {
    pub operation: &'static str,
    pub request: R,
    pub cause: FailureCause,
}

impl<R> OperationError<R> {
    pub fn new(operation: &'static str, request: R, cause: impl Into<FailureCause>) -> Self {
        Self {
            operation,
            request,
            cause: cause.into(),
        }
    }
}

impl<R: fmt::Display> fmt::Display for OperationError<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "failed to {}: request={}, error={}",
            self.operation, self.request, self.cause
        )
    }
}

impl<R: fmt::Debug + fmt::Display> std::error::Error for OperationError<R> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.cause)
    }
}

pub type EnrollError = OperationError<EnrollRequest>;
pub type RegistrationError = OperationError<RegistrationRequest>;
pub type DeployError = OperationError<DeployRequest>;
pub type InvokeError = OperationError<ChaincodeCall>;
pub type QueryError = OperationError<ChaincodeCall>;

/// Failure of a whole enroll, register and deploy run.
#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error(transparent)]
    Enroll(#[from] EnrollError),

    #[error(transparent)]
    Registration(#[from] RegistrationError),

    #[error(transparent)]
    Deploy(#[from] DeployError),
}

impl WorkflowError {
    pub fn cause(&self) -> &FailureCause {
        match self {
            WorkflowError::Enroll(e) => &e.cause,
            WorkflowError::Registration(e) => &e.cause,
            WorkflowError::Deploy(e) => &e.cause,
        }
    }
}

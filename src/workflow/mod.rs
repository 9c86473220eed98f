pub mod context;
pub mod engine;
pub mod error;
pub mod request;
pub mod session;
pub mod stage;

pub use context::{EnrolledIdentity, WorkflowRunContext};
pub use engine::{EngineOptions, ReadyWorkflow, WorkflowEngine};
pub use error::{
    DeployError, EnrollError, EnrollRequest, FailureCause, InvokeError, OperationError,
    PreconditionError, QueryError, RegistrationError, WorkflowError,
};
pub use request::{
    ChaincodeCall, CommittedTx, DeploymentDescriptor, TransactionOutcome, TransactionRequest,
    WorkflowPlan,
};
pub use session::ChainSession;
pub use stage::WorkflowStage;

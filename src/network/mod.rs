pub mod error;
pub mod event_hub;
pub mod fabric;
pub mod gateway;
pub mod pending;
pub mod types;

pub use error::LedgerError;
pub use event_hub::EventHub;
pub use fabric::{FabricProfile, NetworkLatency, SimulatedFabric};
pub use gateway::{Chain, Member};
pub use pending::{Completer, PendingTx, pending};
pub use types::{
    ChainEvent, ChaincodeHandle, DeployRequest, DeployResults, InvokeRequest, QueryRequest,
    QueryResults, RegistrationRequest, SubmittedTx, TxStatus, TxValidation,
};

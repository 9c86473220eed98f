use crate::membership::EnrollmentCertificate;
use crate::network::pending::PendingTx;
use crate::network::{
    ChainEvent, DeployRequest, DeployResults, InvokeRequest, LedgerError, QueryRequest,
    QueryResults, RegistrationRequest, SubmittedTx, TxStatus,
};
use async_trait::async_trait;
use std::num::NonZeroUsize;
use std::sync::Arc;
use tokio::sync::broadcast;

/// Chain-level half of the ledger client: member lookup, the registrar,
/// peer addresses and the event hub.
pub trait Chain: Send + Sync {
    fn name(&self) -> &str;

    /// Returns the local handle for `name`, creating it on first lookup.
    /// Does not contact the network.
    fn get_member(&self, name: &str) -> Arc<dyn Member>;

    fn set_registrar(&self, registrar: Arc<dyn Member>);
    fn registrar(&self) -> Option<Arc<dyn Member>>;

    fn add_peer(&self, address: &str);
    fn peers(&self) -> Vec<String>;

    fn event_hub_connect(&self, address: &str) -> Result<(), LedgerError>;
    fn event_hub_disconnect(&self);
    fn is_event_hub_connected(&self) -> bool;

    /// Subscribes to committed-transaction and block events.
    fn subscribe(&self) -> Result<broadcast::Receiver<ChainEvent>, LedgerError>;
}

/// Identity-level half of the ledger client.
#[async_trait]
pub trait Member: Send + Sync {
    fn name(&self) -> &str;
    fn is_enrolled(&self) -> bool;

    /// Whether the enrollment grants the right to register other
    /// identities. False until enrolled.
    fn is_registrar(&self) -> bool;

    async fn enroll(&self, secret: &str) -> Result<EnrollmentCertificate, LedgerError>;

    /// Registers this identity through the chain's registrar and enrolls
    /// it with the returned secret. A no-op for an already enrolled member.
    async fn register_and_enroll(&self, request: &RegistrationRequest) -> Result<(), LedgerError>;

    fn set_tcert_batch_size(&self, size: NonZeroUsize);
    fn tcert_batch_size(&self) -> NonZeroUsize;

    fn deploy(&self, request: DeployRequest) -> PendingTx<DeployResults>;
    fn invoke(&self, request: InvokeRequest) -> PendingTx<SubmittedTx>;
    fn query(&self, request: QueryRequest) -> PendingTx<QueryResults>;

    /// Asks a peer how `tx_id` was committed. `None` while it is still
    /// waiting to be ordered.
    async fn transaction_status(&self, tx_id: &str) -> Result<Option<TxStatus>, LedgerError>;
}

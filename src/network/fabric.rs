//! In-process Hyperledger Fabric network used by the binary and the tests
//! in place of a remote membership service and peers.

use crate::chaincode::ChaincodeRegistry;
use crate::crypto::Keystore;
use crate::ledger::{Transaction, TransactionType, ValidatingLedger};
use crate::membership::{
    EnrollmentCertificate, MembershipProfile, MembershipService, TransactionCertificate,
};
use crate::network::pending::{PendingTx, pending};
use crate::network::{
    Chain, ChainEvent, DeployRequest, DeployResults, EventHub, InvokeRequest, LedgerError, Member,
    QueryRequest, QueryResults, RegistrationRequest, SubmittedTx, TxStatus,
};
use async_trait::async_trait;
use chrono::Utc;
use log::{debug, info};
use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock, PoisonError, RwLock, Weak};
use tokio::sync::{Mutex as AsyncMutex, broadcast};
use tokio::time::{Duration, sleep};

const DEFAULT_TCERT_BATCH_SIZE: usize = 200;
const ENROLLMENT_KEY_ID: &str = "ecert";

/// Simulated round-trip times.
#[derive(Debug, Clone)]
pub struct NetworkLatency {
    pub membership: Duration,
    pub peer: Duration,
    /// How long the committer waits to batch invocations into a block.
    pub commit_batch: Duration,
}

impl Default for NetworkLatency {
    fn default() -> Self {
        Self {
            membership: Duration::from_millis(20),
            peer: Duration::from_millis(10),
            commit_batch: Duration::from_millis(100),
        }
    }
}

#[derive(Clone)]
pub struct FabricProfile {
    pub membership: MembershipProfile,
    pub chaincodes: ChaincodeRegistry,
    pub latency: NetworkLatency,
}

impl Default for FabricProfile {
    fn default() -> Self {
        Self {
            membership: MembershipProfile::default(),
            chaincodes: ChaincodeRegistry::with_defaults(),
            latency: NetworkLatency::default(),
        }
    }
}

struct FabricCore {
    name: String,
    membership: MembershipService,
    ledger: ValidatingLedger,
    event_hub: Arc<EventHub>,
    peers: RwLock<Vec<String>>,
    registrar: RwLock<Option<Arc<dyn Member>>>,
    latency: NetworkLatency,
    requests: AtomicU64,
}

impl FabricCore {
    async fn membership_call(&self) {
        self.requests.fetch_add(1, Ordering::Relaxed);
        sleep(self.latency.membership).await;
    }

    async fn peer_call(&self) -> Result<(), LedgerError> {
        let no_peers = self
            .peers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_empty();
        if no_peers {
            return Err(LedgerError::NoPeers);
        }
        self.requests.fetch_add(1, Ordering::Relaxed);
        sleep(self.latency.peer).await;
        Ok(())
    }

    fn registrar(&self) -> Option<Arc<dyn Member>> {
        self.registrar
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

pub struct SimulatedFabric {
    core: Arc<FabricCore>,
    members: Mutex<HashMap<String, Arc<SimMember>>>,
}

impl SimulatedFabric {
    /// Creates the network and starts its committer; must be called inside
    /// a tokio runtime.
    pub fn new(name: &str, profile: FabricProfile) -> Self {
        info!("Starting simulated Fabric network '{}'", name);
        let membership = MembershipService::new(format!("{}-membersrvc", name), &profile.membership);
        let event_hub = Arc::new(EventHub::new());
        let ledger = ValidatingLedger::new(
            profile.chaincodes,
            membership.ca_public_key(),
            event_hub.clone(),
            profile.latency.commit_batch,
        );

        Self {
            core: Arc::new(FabricCore {
                name: name.to_string(),
                membership,
                ledger,
                event_hub,
                peers: RwLock::new(Vec::new()),
                registrar: RwLock::new(None),
                latency: profile.latency,
                requests: AtomicU64::new(0),
            }),
            members: Mutex::new(HashMap::new()),
        }
    }

    /// Number of requests that reached the membership service or a peer.
    pub fn request_count(&self) -> u64 {
        self.core.requests.load(Ordering::Relaxed)
    }

    pub async fn block_height(&self) -> u64 {
        self.core.ledger.height().await
    }
}

impl Chain for SimulatedFabric {
    fn name(&self) -> &str {
        &self.core.name
    }

    fn get_member(&self, name: &str) -> Arc<dyn Member> {
        let mut members = self.members.lock().unwrap_or_else(PoisonError::into_inner);
        let member = members
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(SimMember::new(name, Arc::downgrade(&self.core))));
        member.clone()
    }

    fn set_registrar(&self, registrar: Arc<dyn Member>) {
        info!("Setting {} as chain registrar", registrar.name());
        *self
            .core
            .registrar
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(registrar);
    }

    fn registrar(&self) -> Option<Arc<dyn Member>> {
        self.core.registrar()
    }

    fn add_peer(&self, address: &str) {
        let mut peers = self
            .core
            .peers
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if !peers.iter().any(|peer| peer == address) {
            info!("Adding peer address: {}", address);
            peers.push(address.to_string());
        }
    }

    fn peers(&self) -> Vec<String> {
        self.core
            .peers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn event_hub_connect(&self, address: &str) -> Result<(), LedgerError> {
        self.core.event_hub.connect(address)
    }

    fn event_hub_disconnect(&self) {
        self.core.event_hub.disconnect();
    }

    fn is_event_hub_connected(&self) -> bool {
        self.core.event_hub.is_connected()
    }

    fn subscribe(&self) -> Result<broadcast::Receiver<ChainEvent>, LedgerError> {
        self.core.event_hub.subscribe()
    }
}

struct MemberState {
    name: String,
    core: Weak<FabricCore>,
    enrollment: OnceLock<EnrollmentCertificate>,
    keystore: Keystore,
    tcert_batch_size: AtomicUsize,
    tcerts: AsyncMutex<VecDeque<TransactionCertificate>>,
}

impl MemberState {
    fn core(&self, operation: &'static str) -> Result<Arc<FabricCore>, LedgerError> {
        self.core.upgrade().ok_or(LedgerError::Abandoned(operation))
    }

    fn batch_size(&self) -> usize {
        self.tcert_batch_size.load(Ordering::Relaxed).max(1)
    }

    async fn enroll(&self, secret: &str) -> Result<EnrollmentCertificate, LedgerError> {
        if let Some(cert) = self.enrollment.get() {
            return Ok(cert.clone());
        }
        let core = self.core("enroll")?;
        core.membership_call().await;

        let public_key = self.keystore.generate_key_pair(ENROLLMENT_KEY_ID).await;
        let cert = core.membership.enroll(&self.name, secret, public_key).await?;
        Ok(self.enrollment.get_or_init(|| cert).clone())
    }

    /// Drops pooled TCerts that have expired, along with their keys.
    async fn purge_expired(&self, pool: &mut VecDeque<TransactionCertificate>) {
        let now = Utc::now();
        let mut expired = Vec::new();
        pool.retain(|cert| {
            let live = cert.expires_at > now;
            if !live {
                expired.push(cert.id.clone());
            }
            live
        });
        if expired.is_empty() {
            return;
        }
        debug!("{} discarding {} expired tcerts", self.name, expired.len());
        for id in expired {
            self.keystore.secure_erase(&id).await;
        }
    }

    /// Takes one unused TCert, fetching a fresh batch when no unexpired
    /// certificate is pooled.
    async fn next_tcert(&self, core: &FabricCore) -> Result<TransactionCertificate, LedgerError> {
        let mut pool = self.tcerts.lock().await;
        self.purge_expired(&mut pool).await;
        if pool.is_empty() {
            core.membership_call().await;
            let batch = core
                .membership
                .issue_tcerts(&self.name, self.batch_size())
                .await?;
            debug!("{} received a batch of {} tcerts", self.name, batch.len());
            for issued in batch {
                self.keystore
                    .import(&issued.certificate.id, issued.secret_key)
                    .await;
                pool.push_back(issued.certificate);
            }
        }
        pool.pop_front()
            .ok_or_else(|| LedgerError::CertificatesExhausted(self.name.clone()))
    }

    async fn signed_transaction(
        &self,
        core: &FabricCore,
        tx_type: TransactionType,
        target: String,
        function: String,
        args: Vec<String>,
    ) -> Result<Transaction, LedgerError> {
        let cert = self.next_tcert(core).await?;
        let cert_id = cert.id.clone();
        let mut tx = Transaction::new(tx_type, target, function, args, cert);
        let signed = tx.sign(&self.keystore).await;
        self.keystore.secure_erase(&cert_id).await;
        if !signed {
            return Err(LedgerError::InvalidSignature);
        }
        Ok(tx)
    }

    fn require_enrolled(&self) -> Result<(), LedgerError> {
        if self.enrollment.get().is_none() {
            return Err(LedgerError::NotEnrolled(self.name.clone()));
        }
        Ok(())
    }
}

/// Member handle of [`SimulatedFabric`].
pub struct SimMember {
    state: Arc<MemberState>,
}

impl SimMember {
    fn new(name: &str, core: Weak<FabricCore>) -> Self {
        Self {
            state: Arc::new(MemberState {
                name: name.to_string(),
                core,
                enrollment: OnceLock::new(),
                keystore: Keystore::new(),
                tcert_batch_size: AtomicUsize::new(DEFAULT_TCERT_BATCH_SIZE),
                tcerts: AsyncMutex::new(VecDeque::new()),
            }),
        }
    }

    /// Runs `operation` in the background and hands back its pending result.
    fn spawn_operation<T, F, Fut>(&self, operation: &'static str, run: F) -> PendingTx<T>
    where
        T: Send + 'static,
        F: FnOnce(Arc<MemberState>) -> Fut,
        Fut: Future<Output = Result<T, LedgerError>> + Send + 'static,
    {
        let (completer, pending) = pending(operation);
        let task = run(self.state.clone());
        tokio::spawn(async move {
            match task.await {
                Ok(value) => completer.complete(value),
                Err(e) => completer.fail(e),
            };
        });
        pending
    }
}

#[async_trait]
impl Member for SimMember {
    fn name(&self) -> &str {
        &self.state.name
    }

    fn is_enrolled(&self) -> bool {
        self.state.enrollment.get().is_some()
    }

    fn is_registrar(&self) -> bool {
        self.state
            .enrollment
            .get()
            .is_some_and(EnrollmentCertificate::is_registrar)
    }

    async fn enroll(&self, secret: &str) -> Result<EnrollmentCertificate, LedgerError> {
        self.state.enroll(secret).await
    }

    async fn register_and_enroll(&self, request: &RegistrationRequest) -> Result<(), LedgerError> {
        if self.is_enrolled() {
            return Ok(());
        }
        let core = self.state.core("register")?;
        let registrar = core.registrar().ok_or(LedgerError::NoRegistrar)?;

        core.membership_call().await;
        let secret = core.membership.register(registrar.name(), request).await?;
        self.state.enroll(&secret).await.map(|_| ())
    }

    fn set_tcert_batch_size(&self, size: NonZeroUsize) {
        self.state
            .tcert_batch_size
            .store(size.get(), Ordering::Relaxed);
    }

    fn tcert_batch_size(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.state.batch_size()).unwrap_or(NonZeroUsize::MIN)
    }

    fn deploy(&self, request: DeployRequest) -> PendingTx<DeployResults> {
        self.spawn_operation("deploy", |member| async move {
            member.require_enrolled()?;
            let core = member.core("deploy")?;
            core.peer_call().await?;
            let tx = member
                .signed_transaction(
                    &core,
                    TransactionType::Deploy,
                    request.chaincode_path,
                    request.fcn,
                    request.args,
                )
                .await?;
            core.ledger.deploy(tx).await
        })
    }

    fn invoke(&self, request: InvokeRequest) -> PendingTx<SubmittedTx> {
        self.spawn_operation("invoke", |member| async move {
            member.require_enrolled()?;
            let core = member.core("invoke")?;
            core.peer_call().await?;
            let tx = member
                .signed_transaction(
                    &core,
                    TransactionType::Invoke,
                    request.chaincode_id.as_str().to_string(),
                    request.fcn,
                    request.args,
                )
                .await?;
            core.ledger.submit(tx).await
        })
    }

    fn query(&self, request: QueryRequest) -> PendingTx<QueryResults> {
        self.spawn_operation("query", |member| async move {
            member.require_enrolled()?;
            let core = member.core("query")?;
            core.peer_call().await?;
            let tx = member
                .signed_transaction(
                    &core,
                    TransactionType::Query,
                    request.chaincode_id.as_str().to_string(),
                    request.fcn,
                    request.args,
                )
                .await?;
            core.ledger.query(tx).await
        })
    }

    async fn transaction_status(&self, tx_id: &str) -> Result<Option<TxStatus>, LedgerError> {
        let core = self.state.core("transaction status")?;
        core.peer_call().await?;
        Ok(core.ledger.transaction_status(tx_id).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::ChaincodeHandle;

    fn fabric() -> SimulatedFabric {
        let fabric = SimulatedFabric::new("testChain", FabricProfile::default());
        fabric.add_peer("grpc://localhost:7051");
        fabric
    }

    #[tokio::test(start_paused = true)]
    async fn members_are_cached_per_name() {
        let fabric = fabric();
        let first = fabric.get_member("WebAppAdmin");
        let second = fabric.get_member("WebAppAdmin");

        first.enroll("DJY27pEnl16d").await.unwrap();
        assert!(second.is_enrolled());
        assert!(second.is_registrar());
    }

    #[tokio::test(start_paused = true)]
    async fn operations_need_peers_and_enrollment() {
        let fabric = SimulatedFabric::new("testChain", FabricProfile::default());
        let admin = fabric.get_member("WebAppAdmin");

        let request = DeployRequest {
            chaincode_path: "chaincode_example02".to_string(),
            fcn: "init".to_string(),
            args: vec!["a".into(), "1".into(), "b".into(), "2".into()],
        };
        assert_eq!(
            admin.deploy(request.clone()).await.err(),
            Some(LedgerError::NotEnrolled("WebAppAdmin".to_string()))
        );

        admin.enroll("DJY27pEnl16d").await.unwrap();
        assert_eq!(admin.deploy(request).await.err(), Some(LedgerError::NoPeers));
    }

    #[tokio::test(start_paused = true)]
    async fn each_transaction_consumes_one_tcert() {
        let profile = FabricProfile {
            membership: MembershipProfile {
                tcert_quota: 2,
                ..MembershipProfile::default()
            },
            ..FabricProfile::default()
        };
        let fabric = SimulatedFabric::new("testChain", profile);
        fabric.add_peer("grpc://localhost:7051");
        let admin = fabric.get_member("WebAppAdmin");
        admin.enroll("DJY27pEnl16d").await.unwrap();

        let deployed = admin
            .deploy(DeployRequest {
                chaincode_path: "crowd_fund_chaincode".to_string(),
                fcn: "init".to_string(),
                args: vec!["account".into(), "0".into()],
            })
            .await
            .unwrap();

        let query = QueryRequest {
            chaincode_id: deployed.chaincode_id.clone(),
            fcn: "query".to_string(),
            args: vec!["account".into()],
        };
        assert_eq!(admin.query(query.clone()).await.unwrap().result, b"0");
        assert_eq!(
            admin.query(query).await.err(),
            Some(LedgerError::CertificatesExhausted("WebAppAdmin".to_string()))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn unknown_code_paths_and_chaincodes_are_rejected() {
        let fabric = fabric();
        let admin = fabric.get_member("WebAppAdmin");
        admin.enroll("DJY27pEnl16d").await.unwrap();

        let missing = admin
            .deploy(DeployRequest {
                chaincode_path: "no_such_chaincode".to_string(),
                fcn: "init".to_string(),
                args: vec![],
            })
            .await;
        assert_eq!(
            missing.err(),
            Some(LedgerError::UnknownCodePath("no_such_chaincode".to_string()))
        );

        let invoke = admin
            .invoke(InvokeRequest {
                chaincode_id: ChaincodeHandle::new("deadbeef"),
                fcn: "invoke".to_string(),
                args: vec![],
            })
            .await;
        assert_eq!(
            invoke.err(),
            Some(LedgerError::UnknownChaincode("deadbeef".to_string()))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn expired_tcerts_are_discarded_before_use() {
        let fabric = fabric();
        let member = SimMember::new("WebAppAdmin", Arc::downgrade(&fabric.core));
        member.state.enroll("DJY27pEnl16d").await.unwrap();

        let issued_at = Utc::now() - chrono::Duration::days(2);
        let stale = TransactionCertificate {
            id: "stale-tcert".to_string(),
            public_key: vec![],
            issued_at,
            expires_at: issued_at + chrono::Duration::days(1),
            signature: vec![],
        };
        member.state.keystore.import(&stale.id, [7; 32]).await;
        member.state.tcerts.lock().await.push_back(stale);

        let cert = member.state.next_tcert(&fabric.core).await.unwrap();
        assert_ne!(cert.id, "stale-tcert");
        assert!(cert.is_valid(&fabric.core.membership.ca_public_key()));
        assert!(
            member
                .state
                .keystore
                .sign("stale-tcert", b"payload")
                .await
                .is_none()
        );
        assert_eq!(
            member.state.tcerts.lock().await.len(),
            DEFAULT_TCERT_BATCH_SIZE - 1
        );
    }

    #[tokio::test(start_paused = true)]
    async fn transaction_status_appears_once_committed() {
        let fabric = fabric();
        let admin = fabric.get_member("WebAppAdmin");
        admin.enroll("DJY27pEnl16d").await.unwrap();
        let deployed = admin
            .deploy(DeployRequest {
                chaincode_path: "crowd_fund_chaincode".to_string(),
                fcn: "init".to_string(),
                args: vec!["account".into(), "0".into()],
            })
            .await
            .unwrap();
        assert_eq!(
            admin.transaction_status(&deployed.tx_id).await.unwrap(),
            Some(TxStatus {
                block_number: 1,
                validation: crate::network::TxValidation::Committed,
            })
        );

        let submitted = admin
            .invoke(InvokeRequest {
                chaincode_id: deployed.chaincode_id,
                fcn: "invoke".to_string(),
                args: vec!["account".into(), "5".into()],
            })
            .await
            .unwrap();
        assert_eq!(admin.transaction_status(&submitted.tx_id).await.unwrap(), None);

        sleep(Duration::from_secs(1)).await;
        let status = admin.transaction_status(&submitted.tx_id).await.unwrap();
        assert_eq!(status.map(|s| s.block_number), Some(2));
    }
}

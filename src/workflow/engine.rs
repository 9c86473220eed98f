use super::context::{EnrolledIdentity, WorkflowRunContext};
use super::error::{
    DeployError, EnrollError, EnrollRequest, FailureCause, InvokeError, OperationError,
    PreconditionError, QueryError, RegistrationError, WorkflowError,
};
use super::request::{
    ChaincodeCall, CommittedTx, DeploymentDescriptor, TransactionOutcome, TransactionRequest,
    WorkflowPlan,
};
use super::stage::WorkflowStage;
use crate::network::{
    Chain, ChainEvent, ChaincodeHandle, DeployRequest, InvokeRequest, LedgerError, QueryRequest,
    QueryResults, RegistrationRequest, SubmittedTx, TxStatus, TxValidation,
};
use log::{debug, error, info, warn};
use std::fmt;
use std::future::Future;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;

const ENROLL: &str = "enroll";
const REGISTER: &str = "register and enroll";
const DEPLOY: &str = "deploy chaincode";
const INVOKE: &str = "submit chaincode invoke transaction";
const QUERY: &str = "query existing chaincode state";

#[derive(Debug, Clone, Default)]
pub struct EngineOptions {
    /// Upper bound on each ledger operation. Unbounded when absent.
    pub operation_timeout: Option<Duration>,
    /// TCert batch size applied to the registered user.
    pub tcert_batch_size: Option<NonZeroUsize>,
}

/// Outputs of a completed enroll, register and deploy run.
#[derive(Debug, Clone)]
pub struct ReadyWorkflow {
    pub admin: EnrolledIdentity,
    pub user: EnrolledIdentity,
    pub chaincode: ChaincodeHandle,
}

/// Drives one workflow run: each stage starts only after its predecessor
/// succeeded, and a failed stage ends the run.
pub struct WorkflowEngine {
    chain: Arc<dyn Chain>,
    context: WorkflowRunContext,
    options: EngineOptions,
}

impl WorkflowEngine {
    pub fn new(chain: Arc<dyn Chain>, options: EngineOptions) -> Self {
        Self {
            chain,
            context: WorkflowRunContext::new(),
            options,
        }
    }

    pub fn context(&self) -> &WorkflowRunContext {
        &self.context
    }

    pub fn stage(&self) -> WorkflowStage {
        self.context.stage()
    }

    pub fn chaincode_handle(&self) -> Option<ChaincodeHandle> {
        self.context.chaincode().cloned()
    }

    async fn bounded<T, F>(&self, operation: F) -> Result<T, FailureCause>
    where
        F: Future<Output = Result<T, LedgerError>>,
    {
        match self.options.operation_timeout {
            Some(limit) => match tokio::time::timeout(limit, operation).await {
                Ok(outcome) => outcome.map_err(FailureCause::from),
                Err(_) => Err(FailureCause::TimedOut(limit)),
            },
            None => operation.await.map_err(FailureCause::from),
        }
    }

    /// Ends the run at its current stage.
    fn stage_failed<R: fmt::Display>(&self, failure: OperationError<R>) -> OperationError<R> {
        self.context.fail(&failure.cause.to_string());
        error!("ERROR: {}", failure);
        failure
    }

    /// Enrolls a pre-registered identity and makes it the run's registrar.
    pub async fn enroll_admin(
        &self,
        name: &str,
        secret: &str,
    ) -> Result<EnrolledIdentity, EnrollError> {
        let request = EnrollRequest {
            enrollment_id: name.to_string(),
        };
        let fail = |cause: FailureCause| EnrollError::new(ENROLL, request.clone(), cause);

        if let Some(registrar) = self.context.registrar() {
            let current = registrar.name().to_string();
            return Err(fail(PreconditionError::RegistrarAlreadySet(current).into()));
        }
        self.context
            .advance(WorkflowStage::Init, WorkflowStage::AdminEnrolling)
            .map_err(|e| fail(e.into()))?;

        let member = self.chain.get_member(name);
        if member.is_enrolled() {
            debug!("{} is already enrolled", name);
        } else if let Err(cause) = self.bounded(member.enroll(secret)).await {
            return Err(self.stage_failed(fail(cause)));
        }

        if !member.is_registrar() {
            let cause = PreconditionError::NotARegistrar(name.to_string());
            return Err(self.stage_failed(fail(cause.into())));
        }

        let identity = EnrolledIdentity::new(member.clone());
        self.context
            .set_registrar(identity.clone())
            .map_err(|e| self.stage_failed(fail(e.into())))?;
        self.chain.set_registrar(member);
        self.context
            .advance(WorkflowStage::AdminEnrolling, WorkflowStage::AdminEnrolled)
            .map_err(|e| fail(e.into()))?;

        info!("Successfully enrolled {} as registrar", name);
        Ok(identity)
    }

    /// Registers `name` through the run's registrar and enrolls it. An
    /// identity that is already enrolled needs no registrar and succeeds
    /// without a network request.
    pub async fn register_and_enroll_user(
        &self,
        name: &str,
        affiliation: &str,
    ) -> Result<EnrolledIdentity, RegistrationError> {
        let request = RegistrationRequest::new(name, affiliation);
        let fail = |cause: FailureCause| RegistrationError::new(REGISTER, request.clone(), cause);

        let member = self.chain.get_member(name);
        if member.is_enrolled() {
            info!("{} is already enrolled; registration skipped", name);
            let identity = EnrolledIdentity::new(member);
            if self.context.stage() == WorkflowStage::AdminEnrolled {
                self.context
                    .advance(WorkflowStage::AdminEnrolled, WorkflowStage::UserRegistered)
                    .map_err(|e| fail(e.into()))?;
            }
            self.adopt_user(&identity);
            return Ok(identity);
        }

        if self.context.registrar().is_none() {
            return Err(fail(PreconditionError::NoRegistrar.into()));
        }
        self.context
            .advance(WorkflowStage::AdminEnrolled, WorkflowStage::UserRegistering)
            .map_err(|e| fail(e.into()))?;

        info!("Registering user {}", request);
        if let Err(cause) = self.bounded(member.register_and_enroll(&request)).await {
            return Err(self.stage_failed(fail(cause)));
        }

        let identity = EnrolledIdentity::new(member);
        self.adopt_user(&identity);
        self.context
            .advance(WorkflowStage::UserRegistering, WorkflowStage::UserRegistered)
            .map_err(|e| fail(e.into()))?;

        info!("Successfully registered and enrolled {}", name);
        Ok(identity)
    }

    fn adopt_user(&self, identity: &EnrolledIdentity) {
        if let Some(size) = self.options.tcert_batch_size {
            identity.set_certificate_batch_size(size);
        }
        self.context.set_user(identity.clone());
    }

    /// Deploys the run's chaincode. Succeeds at most once per run.
    pub async fn deploy(
        &self,
        identity: &EnrolledIdentity,
        descriptor: DeploymentDescriptor,
    ) -> Result<ChaincodeHandle, DeployError> {
        let request = DeployRequest::from(descriptor);
        let fail = |cause: FailureCause| DeployError::new(DEPLOY, request.clone(), cause);

        if !identity.member().is_enrolled() {
            let cause = PreconditionError::NotEnrolled(identity.name().to_string());
            return Err(fail(cause.into()));
        }
        if let Some(existing) = self.context.chaincode() {
            let cause = PreconditionError::AlreadyDeployed(existing.clone());
            return Err(fail(cause.into()));
        }
        self.context
            .advance(WorkflowStage::UserRegistered, WorkflowStage::Deploying)
            .map_err(|e| fail(e.into()))?;

        info!("Deploying chaincode: request={}", request);
        let results = match self.bounded(identity.member().deploy(request.clone())).await {
            Ok(results) => results,
            Err(cause) => return Err(self.stage_failed(fail(cause))),
        };

        self.context
            .set_chaincode(results.chaincode_id.clone())
            .map_err(|e| self.stage_failed(fail(e.into())))?;
        self.context
            .advance(WorkflowStage::Deploying, WorkflowStage::Ready)
            .map_err(|e| fail(e.into()))?;

        info!(
            "Successfully deployed chaincode: request={}, chaincodeID={}",
            request, results.chaincode_id
        );
        Ok(results.chaincode_id)
    }

    /// The handle a call targets: the run's deployed chaincode, which an
    /// explicitly pinned handle must match.
    fn resolve_handle(&self, call: &ChaincodeCall) -> Result<ChaincodeHandle, PreconditionError> {
        let deployed = self
            .context
            .chaincode()
            .ok_or(PreconditionError::NotDeployed)?;
        match &call.chaincode_id {
            Some(pinned) if pinned != deployed => Err(PreconditionError::UnknownHandle(pinned.clone())),
            _ => Ok(deployed.clone()),
        }
    }

    fn check_transactor(
        &self,
        identity: &EnrolledIdentity,
        call: &ChaincodeCall,
    ) -> Result<ChaincodeHandle, PreconditionError> {
        let handle = self.resolve_handle(call)?;
        if !identity.member().is_enrolled() {
            return Err(PreconditionError::NotEnrolled(identity.name().to_string()));
        }
        Ok(handle)
    }

    /// Submits an invocation. The receipt confirms acceptance only; use
    /// [`WorkflowEngine::invoke_and_confirm`] to wait for the commit.
    pub async fn invoke(
        &self,
        identity: &EnrolledIdentity,
        call: ChaincodeCall,
    ) -> Result<SubmittedTx, InvokeError> {
        let handle = self
            .check_transactor(identity, &call)
            .map_err(|e| InvokeError::new(INVOKE, call.clone(), e))?;

        let request = InvokeRequest {
            chaincode_id: handle,
            fcn: call.function.clone(),
            args: call.args.clone(),
        };
        match self.bounded(identity.member().invoke(request)).await {
            Ok(receipt) => {
                info!(
                    "Successfully submitted chaincode invoke transaction: request={}, tx_id={}",
                    call, receipt.tx_id
                );
                Ok(receipt)
            }
            Err(cause) => {
                let failure = InvokeError::new(INVOKE, call, cause);
                error!("ERROR: {}", failure);
                Err(failure)
            }
        }
    }

    /// Submits an invocation and waits for the event hub to report it
    /// committed. Rejection by the chaincode at commit time is an error.
    pub async fn invoke_and_confirm(
        &self,
        identity: &EnrolledIdentity,
        call: ChaincodeCall,
    ) -> Result<CommittedTx, InvokeError> {
        let fail = |cause: FailureCause| InvokeError::new(INVOKE, call.clone(), cause);

        self.check_transactor(identity, &call)
            .map_err(|e| fail(e.into()))?;
        // Subscribe first so the commit event cannot be missed.
        let mut events = self.chain.subscribe().map_err(|e| fail(e.into()))?;
        let receipt = self.invoke(identity, call.clone()).await?;

        let commit = async {
            loop {
                match events.recv().await {
                    Ok(ChainEvent::Transaction {
                        tx_id,
                        block_number,
                        validation,
                        ..
                    }) if tx_id == receipt.tx_id => {
                        return settle_commit(tx_id, TxStatus {
                            block_number,
                            validation,
                        });
                    }
                    Ok(_) => continue,
                    // The skipped events may include ours. Outcomes are
                    // recorded before publication, so either the ledger
                    // knows it now or its event is still ahead.
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(
                            "event stream lagged by {} events; asking a peer for {}",
                            skipped, receipt.tx_id
                        );
                        let member = identity.member();
                        if let Some(status) = member.transaction_status(&receipt.tx_id).await? {
                            return settle_commit(receipt.tx_id.clone(), status);
                        }
                    }
                    Err(RecvError::Closed) => return Err(LedgerError::EventHubNotConnected),
                }
            }
        };

        match self.bounded(commit).await {
            Ok(committed) => {
                info!(
                    "Transaction {} committed in block {}",
                    committed.tx_id, committed.block_number
                );
                Ok(committed)
            }
            Err(cause) => {
                let failure = fail(cause);
                error!("ERROR: {}", failure);
                Err(failure)
            }
        }
    }

    pub async fn query(
        &self,
        identity: &EnrolledIdentity,
        call: ChaincodeCall,
    ) -> Result<QueryResults, QueryError> {
        let handle = self
            .check_transactor(identity, &call)
            .map_err(|e| QueryError::new(QUERY, call.clone(), e))?;

        let request = QueryRequest {
            chaincode_id: handle,
            fcn: call.function.clone(),
            args: call.args.clone(),
        };
        match self.bounded(identity.member().query(request)).await {
            Ok(results) => {
                info!(
                    "Successfully queried existing chaincode state: request={}, value={}",
                    call,
                    results.result_string()
                );
                Ok(results)
            }
            Err(cause) => {
                let failure = QueryError::new(QUERY, call, cause);
                error!("ERROR: {}", failure);
                Err(failure)
            }
        }
    }

    pub async fn execute(
        &self,
        identity: &EnrolledIdentity,
        request: TransactionRequest,
    ) -> TransactionOutcome {
        match request {
            TransactionRequest::Query(call) => match self.query(identity, call).await {
                Ok(results) => TransactionOutcome::Completed {
                    payload: results.result,
                },
                Err(e) => TransactionOutcome::Failed {
                    cause: e.to_string(),
                },
            },
            TransactionRequest::Invoke(call) => match self.invoke(identity, call).await {
                Ok(receipt) => TransactionOutcome::Submitted { receipt },
                Err(e) => TransactionOutcome::Failed {
                    cause: e.to_string(),
                },
            },
        }
    }

    /// Enrolls the admin, registers the user and deploys, stopping at the
    /// first failure.
    pub async fn bootstrap(&self, plan: &WorkflowPlan) -> Result<ReadyWorkflow, WorkflowError> {
        let admin = self
            .enroll_admin(&plan.admin_name, &plan.admin_secret)
            .await?;
        let user = self
            .register_and_enroll_user(&plan.user_name, &plan.affiliation)
            .await?;
        let chaincode = self.deploy(&user, plan.deployment.clone()).await?;

        Ok(ReadyWorkflow {
            admin,
            user,
            chaincode,
        })
    }
}

fn settle_commit(tx_id: String, status: TxStatus) -> Result<CommittedTx, LedgerError> {
    match status.validation {
        TxValidation::Committed => Ok(CommittedTx {
            tx_id,
            block_number: status.block_number,
        }),
        TxValidation::Rejected(reason) => Err(LedgerError::Chaincode(reason)),
    }
}

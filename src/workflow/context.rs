use super::error::PreconditionError;
use super::stage::WorkflowStage;
use crate::network::{ChaincodeHandle, Member};
use log::{info, warn};
use std::fmt;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, OnceLock, PoisonError};

/// An identity whose enrollment has completed. Only the workflow engine
/// constructs these.
#[derive(Clone)]
pub struct EnrolledIdentity {
    member: Arc<dyn Member>,
}

impl EnrolledIdentity {
    pub(crate) fn new(member: Arc<dyn Member>) -> Self {
        debug_assert!(member.is_enrolled());
        Self { member }
    }

    pub fn name(&self) -> &str {
        self.member.name()
    }

    pub fn is_registrar(&self) -> bool {
        self.member.is_registrar()
    }

    pub fn member(&self) -> &Arc<dyn Member> {
        &self.member
    }

    /// Number of transaction certificates fetched per batch. A size of 1
    /// gives every request a freshly issued certificate.
    pub fn set_certificate_batch_size(&self, size: NonZeroUsize) {
        info!("{} tcert batch size set to {}", self.name(), size);
        self.member.set_tcert_batch_size(size);
    }

    pub fn certificate_batch_size(&self) -> NonZeroUsize {
        self.member.tcert_batch_size()
    }
}

impl fmt::Debug for EnrolledIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EnrolledIdentity")
            .field("name", &self.name())
            .field("registrar", &self.is_registrar())
            .finish()
    }
}

/// State shared by the stages of one workflow run. The registrar, user and
/// chaincode handle are each assigned at most once.
pub struct WorkflowRunContext {
    stage: Mutex<WorkflowStage>,
    registrar: OnceLock<EnrolledIdentity>,
    user: OnceLock<EnrolledIdentity>,
    chaincode: OnceLock<ChaincodeHandle>,
}

impl WorkflowRunContext {
    pub fn new() -> Self {
        Self {
            stage: Mutex::new(WorkflowStage::Init),
            registrar: OnceLock::new(),
            user: OnceLock::new(),
            chaincode: OnceLock::new(),
        }
    }

    pub fn stage(&self) -> WorkflowStage {
        self.stage
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn registrar(&self) -> Option<&EnrolledIdentity> {
        self.registrar.get()
    }

    pub fn user(&self) -> Option<&EnrolledIdentity> {
        self.user.get()
    }

    pub fn chaincode(&self) -> Option<&ChaincodeHandle> {
        self.chaincode.get()
    }

    /// Moves from `expected` to `next`, refusing if the run is elsewhere.
    pub(crate) fn advance(
        &self,
        expected: WorkflowStage,
        next: WorkflowStage,
    ) -> Result<(), PreconditionError> {
        let mut stage = self.stage.lock().unwrap_or_else(PoisonError::into_inner);
        if stage.is_failed() {
            return Err(PreconditionError::RunFailed(stage.clone()));
        }
        if *stage != expected {
            return Err(PreconditionError::OutOfOrder {
                expected,
                actual: stage.clone(),
            });
        }
        info!("workflow stage {} -> {}", *stage, next);
        *stage = next;
        Ok(())
    }

    /// Records a terminal failure of the stage in progress. The first
    /// failure is kept.
    pub(crate) fn fail(&self, cause: &str) {
        let mut stage = self.stage.lock().unwrap_or_else(PoisonError::into_inner);
        if stage.is_failed() {
            return;
        }
        let failed = WorkflowStage::Failed {
            stage: Box::new(stage.clone()),
            cause: cause.to_string(),
        };
        warn!("workflow {}", failed);
        *stage = failed;
    }

    pub(crate) fn set_registrar(&self, identity: EnrolledIdentity) -> Result<(), PreconditionError> {
        self.registrar
            .set(identity)
            .map_err(|rejected| PreconditionError::RegistrarAlreadySet(rejected.name().to_string()))
    }

    pub(crate) fn set_user(&self, identity: EnrolledIdentity) {
        if let Err(rejected) = self.user.set(identity) {
            warn!("user already set for this run; ignoring {}", rejected.name());
        }
    }

    /// Assigns the chaincode handle once. A second assignment, or one
    /// arriving after the run failed, is refused and logged.
    pub(crate) fn set_chaincode(&self, handle: ChaincodeHandle) -> Result<(), PreconditionError> {
        let stage = self.stage.lock().unwrap_or_else(PoisonError::into_inner);
        if stage.is_failed() {
            warn!("late deployment of {} after the run failed; ignored", handle);
            return Err(PreconditionError::RunFailed(stage.clone()));
        }
        match self.chaincode.set(handle) {
            Ok(()) => Ok(()),
            Err(rejected) => {
                warn!(
                    "inconsistent deployment: chaincode already set, ignoring {}",
                    rejected
                );
                Err(PreconditionError::AlreadyDeployed(rejected))
            }
        }
    }
}

impl Default for WorkflowRunContext {
    fn default() -> Self {
        Self::new()
    }
}

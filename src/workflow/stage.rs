use serde::Serialize;
use std::fmt;

/// Progress of one workflow run. `Ready` and `Failed` are terminal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum WorkflowStage {
    Init,
    AdminEnrolling,
    AdminEnrolled,
    UserRegistering,
    UserRegistered,
    Deploying,
    Ready,
    Failed {
        stage: Box<WorkflowStage>,
        cause: String,
    },
}

impl WorkflowStage {
    pub fn is_failed(&self) -> bool {
        matches!(self, WorkflowStage::Failed { .. })
    }
}

impl fmt::Display for WorkflowStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkflowStage::Init => f.write_str("init"),
            WorkflowStage::AdminEnrolling => f.write_str("admin-enrolling"),
            WorkflowStage::AdminEnrolled => f.write_str("admin-enrolled"),
            WorkflowStage::UserRegistering => f.write_str("user-registering"),
            WorkflowStage::UserRegistered => f.write_str("user-registered"),
            WorkflowStage::Deploying => f.write_str("deploying"),
            WorkflowStage::Ready => f.write_str("ready"),
            WorkflowStage::Failed { stage, cause } => write!(f, "failed in {}: {}", stage, cause),
        }
    }
}

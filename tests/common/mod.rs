#![allow(dead_code)]

use ledger_webapp::network::{Chain, FabricProfile, SimulatedFabric};
use ledger_webapp::workflow::{ChainSession, DeploymentDescriptor, WorkflowPlan};
use std::sync::Arc;

pub const PEER: &str = "grpc://192.168.99.100:7051";
pub const EVENT_HUB: &str = "grpc://192.168.99.100:7053";

pub struct Network {
    pub fabric: Arc<SimulatedFabric>,
    pub chain: Arc<dyn Chain>,
    pub session: ChainSession,
}

pub fn network(profile: FabricProfile) -> Network {
    let fabric = Arc::new(SimulatedFabric::new("testChain", profile));
    let chain: Arc<dyn Chain> = fabric.clone();
    let session = ChainSession::open(chain.clone(), &[PEER.to_string()], EVENT_HUB)
        .expect("event hub connects");
    Network {
        fabric,
        chain,
        session,
    }
}

pub fn plan(deployment: DeploymentDescriptor) -> WorkflowPlan {
    WorkflowPlan {
        admin_name: "WebAppAdmin".to_string(),
        admin_secret: "DJY27pEnl16d".to_string(),
        user_name: "WebApp_user1".to_string(),
        affiliation: "bank_a".to_string(),
        deployment,
    }
}

pub fn example02() -> DeploymentDescriptor {
    DeploymentDescriptor::new("chaincode_example02", "init", &["a", "100", "b", "200"])
}

pub fn crowd_fund() -> DeploymentDescriptor {
    DeploymentDescriptor::new("crowd_fund_chaincode", "init", &["account", "0"])
}

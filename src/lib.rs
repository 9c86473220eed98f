pub mod api;
pub mod chaincode;
pub mod config;
pub mod crypto;
pub mod ledger;
pub mod membership;
pub mod network;
pub mod workflow;

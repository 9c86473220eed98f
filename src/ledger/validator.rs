use super::block::Block;
use super::transaction::{Transaction, TransactionType};
use crate::chaincode::{Chaincode, ChaincodeRegistry, ChaincodeStub};
use crate::network::{
    ChainEvent, ChaincodeHandle, DeployResults, EventHub, LedgerError, QueryResults, SubmittedTx,
    TxStatus, TxValidation,
};
use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{RwLock, mpsc};
use tokio::time::{Duration, sleep};

struct DeployedChaincode {
    program: Arc<dyn Chaincode>,
    stub: ChaincodeStub,
}

struct LedgerState {
    blocks: Vec<Block>,
    world: HashMap<ChaincodeHandle, DeployedChaincode>,
    committed: HashMap<String, TxStatus>,
}

impl LedgerState {
    fn append_block(&mut self, tx_ids: Vec<String>) -> Block {
        let number = self.blocks.len() as u64;
        let previous_hash = self
            .blocks
            .last()
            .map(|block| block.hash.clone())
            .unwrap_or_default();
        let block = Block::new(number, tx_ids, previous_hash);
        self.blocks.push(block.clone());
        block
    }
}

/// TCerts already used in a transaction, kept until they expire. Expired
/// certificates fail signature validation, so forgetting them is safe.
#[derive(Default)]
struct SpentCertificates {
    expiry_by_id: HashMap<String, DateTime<Utc>>,
}

impl SpentCertificates {
    /// Records `id` as spent; false if it was spent before.
    fn mark(&mut self, id: &str, expires_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        self.expiry_by_id.retain(|_, expiry| *expiry > now);
        if self.expiry_by_id.contains_key(id) {
            return false;
        }
        self.expiry_by_id.insert(id.to_string(), expires_at);
        true
    }
}

/// The validating peers of the simulated network, collapsed into one
/// replicated ledger: transaction validation, chaincode execution and an
/// ordered committer that seals invocations into blocks.
pub struct ValidatingLedger {
    state: Arc<RwLock<LedgerState>>,
    chaincodes: ChaincodeRegistry,
    ca_public_key: Vec<u8>,
    spent_tcerts: Mutex<SpentCertificates>,
    events: Arc<EventHub>,
    queue: mpsc::UnboundedSender<Transaction>,
}

impl ValidatingLedger {
    /// Starts the committer task; must be called inside a tokio runtime.
    pub fn new(
        chaincodes: ChaincodeRegistry,
        ca_public_key: Vec<u8>,
        events: Arc<EventHub>,
        batch_delay: Duration,
    ) -> Self {
        let state = Arc::new(RwLock::new(LedgerState {
            blocks: vec![Block::genesis()],
            world: HashMap::new(),
            committed: HashMap::new(),
        }));
        let (queue, rx) = mpsc::unbounded_channel();
        tokio::spawn(run_committer(state.clone(), rx, events.clone(), batch_delay));

        Self {
            state,
            chaincodes,
            ca_public_key,
            spent_tcerts: Mutex::new(SpentCertificates::default()),
            events,
            queue,
        }
    }

    fn validate(&self, tx: &Transaction) -> Result<(), LedgerError> {
        if !tx.verify(&self.ca_public_key) {
            return Err(LedgerError::InvalidSignature);
        }
        let fresh = self
            .spent_tcerts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .mark(&tx.cert.id, tx.cert.expires_at, Utc::now());
        if !fresh {
            return Err(LedgerError::CertificateReused(tx.cert.id.clone()));
        }
        Ok(())
    }

    /// Resolves the code path, runs `init` and records the new instance.
    pub async fn deploy(&self, tx: Transaction) -> Result<DeployResults, LedgerError> {
        debug_assert_eq!(tx.tx_type, TransactionType::Deploy);
        self.validate(&tx)?;

        let program = self
            .chaincodes
            .resolve(&tx.target)
            .ok_or_else(|| LedgerError::UnknownCodePath(tx.target.clone()))?;

        let mut stub = ChaincodeStub::default();
        program
            .init(&mut stub, &tx.function, &tx.args)
            .map_err(|e| LedgerError::Chaincode(e.0))?;

        let mut hasher = Sha256::new();
        hasher.update(&tx.target);
        hasher.update(&tx.function);
        for arg in &tx.args {
            hasher.update(arg);
        }
        hasher.update(tx.nonce);
        let chaincode_id = ChaincodeHandle::new(format!("{:x}", hasher.finalize()));

        let block = {
            let mut ledger = self.state.write().await;
            ledger
                .world
                .insert(chaincode_id.clone(), DeployedChaincode { program, stub });
            let block = ledger.append_block(vec![tx.tx_id.clone()]);
            ledger.committed.insert(
                tx.tx_id.clone(),
                TxStatus {
                    block_number: block.number,
                    validation: TxValidation::Committed,
                },
            );
            block
        };

        info!("deployed {} as chaincode {}", tx.target, chaincode_id);
        self.events.publish(ChainEvent::Transaction {
            tx_id: tx.tx_id.clone(),
            chaincode_id: chaincode_id.clone(),
            block_number: block.number,
            validation: TxValidation::Committed,
        });
        self.events.publish(ChainEvent::Block {
            number: block.number,
            hash: block.hash,
            tx_ids: block.tx_ids,
        });

        Ok(DeployResults {
            chaincode_id,
            tx_id: tx.tx_id,
        })
    }

    /// Accepts an invocation for ordering. Returning does not mean the
    /// transaction is committed.
    pub async fn submit(&self, tx: Transaction) -> Result<SubmittedTx, LedgerError> {
        debug_assert_eq!(tx.tx_type, TransactionType::Invoke);
        self.validate(&tx)?;

        let chaincode_id = ChaincodeHandle::new(tx.target.clone());
        if !self.state.read().await.world.contains_key(&chaincode_id) {
            return Err(LedgerError::UnknownChaincode(tx.target.clone()));
        }

        let tx_id = tx.tx_id.clone();
        self.queue
            .send(tx)
            .map_err(|_| LedgerError::Abandoned("invoke"))?;
        Ok(SubmittedTx { tx_id })
    }

    /// Evaluates a query against committed state.
    pub async fn query(&self, tx: Transaction) -> Result<QueryResults, LedgerError> {
        debug_assert_eq!(tx.tx_type, TransactionType::Query);
        self.validate(&tx)?;

        let ledger = self.state.read().await;
        let deployed = ledger
            .world
            .get(&ChaincodeHandle::new(tx.target.clone()))
            .ok_or_else(|| LedgerError::UnknownChaincode(tx.target.clone()))?;

        deployed
            .program
            .query(&deployed.stub, &tx.function, &tx.args)
            .map(|result| QueryResults { result })
            .map_err(|e| LedgerError::Chaincode(e.0))
    }

    pub async fn height(&self) -> u64 {
        self.state.read().await.blocks.len() as u64
    }

    /// Commit outcome of `tx_id`, recorded before its event is published.
    pub async fn transaction_status(&self, tx_id: &str) -> Option<TxStatus> {
        self.state.read().await.committed.get(tx_id).cloned()
    }
}

fn apply_invoke(
    world: &mut HashMap<ChaincodeHandle, DeployedChaincode>,
    tx: &Transaction,
) -> TxValidation {
    let Some(deployed) = world.get_mut(&ChaincodeHandle::new(tx.target.clone())) else {
        let missing = LedgerError::UnknownChaincode(tx.target.clone());
        return TxValidation::Rejected(missing.to_string());
    };

    // Invocations run against a copy so a failing one leaves no partial writes.
    let mut stub = deployed.stub.clone();
    match deployed.program.invoke(&mut stub, &tx.function, &tx.args) {
        Ok(_) => {
            deployed.stub = stub;
            TxValidation::Committed
        }
        Err(e) => TxValidation::Rejected(e.0),
    }
}

async fn run_committer(
    state: Arc<RwLock<LedgerState>>,
    mut rx: mpsc::UnboundedReceiver<Transaction>,
    events: Arc<EventHub>,
    batch_delay: Duration,
) {
    while let Some(first) = rx.recv().await {
        sleep(batch_delay).await;

        let mut batch = vec![first];
        while let Ok(tx) = rx.try_recv() {
            batch.push(tx);
        }

        let (block, outcomes) = {
            let mut ledger = state.write().await;
            let outcomes: Vec<(Transaction, TxValidation)> = batch
                .into_iter()
                .map(|tx| {
                    let validation = apply_invoke(&mut ledger.world, &tx);
                    (tx, validation)
                })
                .collect();
            let tx_ids = outcomes.iter().map(|(tx, _)| tx.tx_id.clone()).collect();
            let block = ledger.append_block(tx_ids);
            for (tx, validation) in &outcomes {
                ledger.committed.insert(
                    tx.tx_id.clone(),
                    TxStatus {
                        block_number: block.number,
                        validation: validation.clone(),
                    },
                );
            }
            (block, outcomes)
        };

        debug!(
            "committed block {} with {} transactions",
            block.number,
            block.tx_ids.len()
        );
        for (tx, validation) in outcomes {
            if let TxValidation::Rejected(reason) = &validation {
                warn!("transaction {} rejected by chaincode: {}", tx.tx_id, reason);
            }
            events.publish(ChainEvent::Transaction {
                tx_id: tx.tx_id,
                chaincode_id: ChaincodeHandle::new(tx.target),
                block_number: block.number,
                validation,
            });
        }
        events.publish(ChainEvent::Block {
            number: block.number,
            hash: block.hash,
            tx_ids: block.tx_ids,
        });
    }
    debug!("committer stopped");
}

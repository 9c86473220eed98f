use crate::crypto::{Keystore, verify_signature};
use crate::membership::TransactionCertificate;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum TransactionType {
    Deploy,
    Invoke,
    Query,
}

/// A chaincode transaction signed with a single-use transaction
/// certificate. For deployments `target` is the code path; otherwise it is
/// the chaincode ID.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub tx_id: String,
    pub tx_type: TransactionType,
    pub target: String,
    pub function: String,
    pub args: Vec<String>,
    pub nonce: [u8; 24],
    pub timestamp: DateTime<Utc>,
    pub cert: TransactionCertificate,
    pub signature: Vec<u8>,
}

impl Transaction {
    pub fn new(
        tx_type: TransactionType,
        target: String,
        function: String,
        args: Vec<String>,
        cert: TransactionCertificate,
    ) -> Self {
        let nonce = rand::random::<[u8; 24]>();
        let mut hasher = Sha256::new();
        hasher.update(nonce);
        hasher.update(&target);
        hasher.update(&function);
        let tx_id = format!("{:x}", hasher.finalize());

        Self {
            tx_id,
            tx_type,
            target,
            function,
            args,
            nonce,
            timestamp: Utc::now(),
            cert,
            signature: vec![],
        }
    }

    fn signed_bytes(&self) -> Vec<u8> {
        bincode::serialize(&(
            &self.tx_id,
            self.tx_type,
            &self.target,
            &self.function,
            &self.args,
            self.nonce,
            self.timestamp.timestamp_millis(),
            &self.cert.id,
        ))
        .unwrap_or_default()
    }

    /// Signs with the private key stored under the certificate's ID.
    /// Returns false when the keystore no longer holds that key.
    pub async fn sign(&mut self, keystore: &Keystore) -> bool {
        match keystore.sign(&self.cert.id, &self.signed_bytes()).await {
            Some(signature) => {
                self.signature = signature;
                true
            }
            None => false,
        }
    }

    pub fn verify(&self, ca_public_key: &[u8]) -> bool {
        self.cert.is_valid(ca_public_key)
            && verify_signature(&self.cert.public_key, &self.signed_bytes(), &self.signature)
    }
}

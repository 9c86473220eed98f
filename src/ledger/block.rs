use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Block {
    pub number: u64,
    pub timestamp: DateTime<Utc>,
    pub tx_ids: Vec<String>,
    pub previous_hash: String,
    pub hash: String,
}

impl Block {
    pub fn new(number: u64, tx_ids: Vec<String>, previous_hash: String) -> Self {
        let mut block = Self {
            number,
            timestamp: Utc::now(),
            tx_ids,
            previous_hash,
            hash: String::new(),
        };
        block.hash = block.calculate_hash();
        block
    }

    pub fn genesis() -> Self {
        Self {
            number: 0,
            timestamp: Utc::now(),
            tx_ids: vec![],
            previous_hash: "0".to_string(),
            hash: "genesis_hash".to_string(),
        }
    }

    pub fn calculate_hash(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.number.to_be_bytes());
        hasher.update(self.timestamp.to_rfc3339());
        for tx_id in &self.tx_ids {
            hasher.update(tx_id);
        }
        hasher.update(&self.previous_hash);
        format!("{:x}", hasher.finalize())
    }
}

use ed25519_dalek::{Signer, SigningKey};
use rand::rngs::OsRng;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Private keys held by a member: its enrollment key and any unspent
/// transaction certificate keys.
pub struct Keystore {
    private_keys: Arc<RwLock<HashMap<String, SigningKey>>>,
}

impl Keystore {
    pub fn new() -> Self {
        Self {
            private_keys: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Generates a key pair under `key_id` and returns its public half.
    pub async fn generate_key_pair(&self, key_id: &str) -> Vec<u8> {
        let mut csprng = OsRng;
        let signing_key = SigningKey::generate(&mut csprng);
        let public_key = signing_key.verifying_key().to_bytes().to_vec();

        self.private_keys
            .write()
            .await
            .insert(key_id.to_string(), signing_key);

        public_key
    }

    /// Stores key material handed out by the membership service.
    pub async fn import(&self, key_id: &str, secret: [u8; 32]) {
        self.private_keys
            .write()
            .await
            .insert(key_id.to_string(), SigningKey::from_bytes(&secret));
    }

    pub async fn sign(&self, key_id: &str, data: &[u8]) -> Option<Vec<u8>> {
        let keys = self.private_keys.read().await;
        keys.get(key_id)
            .map(|key| key.sign(data).to_bytes().to_vec())
    }

    pub async fn secure_erase(&self, key_id: &str) -> bool {
        self.private_keys.write().await.remove(key_id).is_some()
    }
}

impl Default for Keystore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::verify_signature;

    #[tokio::test]
    async fn erased_keys_can_no_longer_sign() {
        let keystore = Keystore::new();
        let public_key = keystore.generate_key_pair("tcert-1").await;

        let signature = keystore.sign("tcert-1", b"payload").await.unwrap();
        assert!(verify_signature(&public_key, b"payload", &signature));

        assert!(keystore.secure_erase("tcert-1").await);
        assert!(keystore.sign("tcert-1", b"payload").await.is_none());
        assert!(!keystore.secure_erase("tcert-1").await);
    }
}

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;

/// Signing key held by the membership service's certificate authority.
pub struct CertificateSigner {
    signing_key: SigningKey,
}

impl CertificateSigner {
    pub fn generate() -> Self {
        let mut csprng = OsRng;
        Self {
            signing_key: SigningKey::generate(&mut csprng),
        }
    }

    pub fn public_key(&self) -> Vec<u8> {
        self.signing_key.verifying_key().to_bytes().to_vec()
    }

    pub fn sign(&self, data: &[u8]) -> Vec<u8> {
        self.signing_key.sign(data).to_bytes().to_vec()
    }
}

/// Checks an ed25519 signature; malformed keys or signatures never verify.
pub fn verify_signature(public_key: &[u8], data: &[u8], signature: &[u8]) -> bool {
    let Ok(key_bytes) = <&[u8; 32]>::try_from(public_key) else {
        return false;
    };
    let Ok(sig_bytes) = <&[u8; 64]>::try_from(signature) else {
        return false;
    };
    match VerifyingKey::from_bytes(key_bytes) {
        Ok(key) => key.verify(data, &Signature::from_bytes(sig_bytes)).is_ok(),
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signatures_verify_only_for_the_signed_bytes() {
        let signer = CertificateSigner::generate();
        let signature = signer.sign(b"ecert:WebAppAdmin");

        assert!(verify_signature(&signer.public_key(), b"ecert:WebAppAdmin", &signature));
        assert!(!verify_signature(&signer.public_key(), b"ecert:WebApp_user1", &signature));
        assert!(!verify_signature(&[0u8; 3], b"ecert:WebAppAdmin", &signature));
    }
}

pub mod hsm;
pub mod keystore;

pub use hsm::{CertificateSigner, verify_signature};
pub use keystore::Keystore;

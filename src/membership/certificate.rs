use crate::crypto::verify_signature;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Role {
    Client,
    Peer,
    Validator,
    Auditor,
}

/// Long-term certificate binding an identity to its enrollment key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrollmentCertificate {
    pub id: String,
    pub enrollment_id: String,
    pub affiliation: String,
    pub roles: Vec<Role>,
    pub registrar_roles: Vec<Role>,
    pub public_key: Vec<u8>,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub signature: Vec<u8>,
}

impl EnrollmentCertificate {
    pub fn can_register(&self, role: Role) -> bool {
        self.registrar_roles.contains(&role)
    }

    pub fn is_registrar(&self) -> bool {
        !self.registrar_roles.is_empty()
    }

    pub(crate) fn signed_bytes(&self) -> Vec<u8> {
        bincode::serialize(&(
            &self.id,
            &self.enrollment_id,
            &self.affiliation,
            &self.roles,
            &self.registrar_roles,
            &self.public_key,
            self.issued_at.timestamp_millis(),
            self.expires_at.timestamp_millis(),
        ))
        .unwrap_or_default()
    }
}

/// Single-use certificate carried by one transaction. It names no
/// identity, so transactions signed with distinct TCerts are unlinkable.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TransactionCertificate {
    pub id: String,
    pub public_key: Vec<u8>,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub signature: Vec<u8>,
}

impl TransactionCertificate {
    pub fn is_valid(&self, ca_public_key: &[u8]) -> bool {
        self.expires_at > Utc::now()
            && verify_signature(ca_public_key, &self.signed_bytes(), &self.signature)
    }

    pub(crate) fn signed_bytes(&self) -> Vec<u8> {
        bincode::serialize(&(
            &self.id,
            &self.public_key,
            self.issued_at.timestamp_millis(),
            self.expires_at.timestamp_millis(),
        ))
        .unwrap_or_default()
    }
}

use super::certificate::{EnrollmentCertificate, Role, TransactionCertificate};
use crate::crypto::CertificateSigner;
use crate::network::{LedgerError, RegistrationRequest};
use chrono::{Duration, Utc};
use ed25519_dalek::SigningKey;
use log::{debug, info};
use rand::Rng;
use rand::distributions::Alphanumeric;
use rand::rngs::OsRng;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;

const SECRET_LEN: usize = 12;

/// An identity provisioned out-of-band in the membership service's
/// configuration.
#[derive(Debug, Clone)]
pub struct IdentityProfile {
    pub name: String,
    pub secret: String,
    pub affiliation: String,
    pub roles: Vec<Role>,
    pub registrar_roles: Vec<Role>,
}

impl IdentityProfile {
    pub fn client(name: &str, secret: &str, affiliation: &str) -> Self {
        Self {
            name: name.to_string(),
            secret: secret.to_string(),
            affiliation: affiliation.to_string(),
            roles: vec![Role::Client],
            registrar_roles: vec![],
        }
    }

    pub fn registrar(mut self, roles: &[Role]) -> Self {
        self.registrar_roles = roles.to_vec();
        self
    }
}

#[derive(Debug, Clone)]
pub struct MembershipProfile {
    pub identities: Vec<IdentityProfile>,
    pub affiliations: Vec<String>,
    /// Upper bound on transaction certificates issued to one identity.
    pub tcert_quota: usize,
}

impl Default for MembershipProfile {
    fn default() -> Self {
        Self {
            identities: vec![
                IdentityProfile::client("admin", "Xurw3yU9zI0l", "institution_a")
                    .registrar(&[Role::Client, Role::Peer, Role::Validator, Role::Auditor]),
                IdentityProfile::client("WebAppAdmin", "DJY27pEnl16d", "institution_a")
                    .registrar(&[Role::Client]),
                IdentityProfile::client("lukas", "NPKYL39uKbkj", "bank_a"),
            ],
            affiliations: ["bank_a", "bank_b", "bank_c", "institution_a"]
                .into_iter()
                .map(String::from)
                .collect(),
            tcert_quota: 10_000,
        }
    }
}

#[derive(Debug)]
struct MemberRecord {
    secret: Option<String>,
    affiliation: String,
    roles: Vec<Role>,
    registrar_roles: Vec<Role>,
    enrollment: Option<EnrollmentCertificate>,
    tcerts_issued: usize,
}

/// A TCert together with the private key the member signs with.
pub struct IssuedTCert {
    pub certificate: TransactionCertificate,
    pub secret_key: [u8; 32],
}

/// Certificate authority of the simulated network: enrollment,
/// registration and transaction certificate issuance.
pub struct MembershipService {
    ca_id: String,
    signer: CertificateSigner,
    registry: Arc<RwLock<HashMap<String, MemberRecord>>>,
    affiliations: HashSet<String>,
    tcert_quota: usize,
}

impl MembershipService {
    pub fn new(ca_id: impl Into<String>, profile: &MembershipProfile) -> Self {
        let registry = profile
            .identities
            .iter()
            .map(|identity| {
                (
                    identity.name.clone(),
                    MemberRecord {
                        secret: Some(identity.secret.clone()),
                        affiliation: identity.affiliation.clone(),
                        roles: identity.roles.clone(),
                        registrar_roles: identity.registrar_roles.clone(),
                        enrollment: None,
                        tcerts_issued: 0,
                    },
                )
            })
            .collect();

        Self {
            ca_id: ca_id.into(),
            signer: CertificateSigner::generate(),
            registry: Arc::new(RwLock::new(registry)),
            affiliations: profile.affiliations.iter().cloned().collect(),
            tcert_quota: profile.tcert_quota,
        }
    }

    pub fn ca_public_key(&self) -> Vec<u8> {
        self.signer.public_key()
    }

    /// Exchanges a one-time secret for an enrollment certificate over
    /// `public_key`.
    pub async fn enroll(
        &self,
        name: &str,
        secret: &str,
        public_key: Vec<u8>,
    ) -> Result<EnrollmentCertificate, LedgerError> {
        let mut registry = self.registry.write().await;
        let record = registry
            .get_mut(name)
            .ok_or_else(|| LedgerError::UnknownIdentity(name.to_string()))?;

        if record.secret.as_deref() != Some(secret) {
            return Err(LedgerError::InvalidSecret(name.to_string()));
        }

        let issued_at = Utc::now();
        let mut cert = EnrollmentCertificate {
            id: format!("ECERT-{}-{}", name, issued_at.timestamp_millis()),
            enrollment_id: name.to_string(),
            affiliation: record.affiliation.clone(),
            roles: record.roles.clone(),
            registrar_roles: record.registrar_roles.clone(),
            public_key,
            issued_at,
            expires_at: issued_at + Duration::days(365),
            signature: vec![],
        };
        cert.signature = self.signer.sign(&cert.signed_bytes());

        record.secret = None;
        record.enrollment = Some(cert.clone());
        info!("{} issued enrollment certificate {}", self.ca_id, cert.id);
        Ok(cert)
    }

    /// Registers a new client identity on behalf of `registrar` and returns
    /// its one-time enrollment secret.
    pub async fn register(
        &self,
        registrar: &str,
        request: &RegistrationRequest,
    ) -> Result<String, LedgerError> {
        let mut registry = self.registry.write().await;

        let registrar_record = registry
            .get(registrar)
            .ok_or_else(|| LedgerError::UnknownIdentity(registrar.to_string()))?;
        let Some(registrar_cert) = registrar_record.enrollment.as_ref() else {
            return Err(LedgerError::NotEnrolled(registrar.to_string()));
        };
        if !registrar_cert.can_register(Role::Client) {
            return Err(LedgerError::NotARegistrar(registrar.to_string()));
        }
        if !self.affiliations.contains(&request.affiliation) {
            return Err(LedgerError::UnknownAffiliation(request.affiliation.clone()));
        }
        if registry.contains_key(&request.enrollment_id) {
            return Err(LedgerError::AlreadyRegistered(request.enrollment_id.clone()));
        }

        let secret: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(SECRET_LEN)
            .map(char::from)
            .collect();

        registry.insert(
            request.enrollment_id.clone(),
            MemberRecord {
                secret: Some(secret.clone()),
                affiliation: request.affiliation.clone(),
                roles: vec![Role::Client],
                registrar_roles: vec![],
                enrollment: None,
                tcerts_issued: 0,
            },
        );
        info!(
            "{} registered {} ({}) for registrar {}",
            self.ca_id, request.enrollment_id, request.affiliation, registrar
        );
        Ok(secret)
    }

    /// Issues up to `count` transaction certificates, bounded by the
    /// identity's remaining quota.
    pub async fn issue_tcerts(
        &self,
        name: &str,
        count: usize,
    ) -> Result<Vec<IssuedTCert>, LedgerError> {
        let mut registry = self.registry.write().await;
        let record = registry
            .get_mut(name)
            .ok_or_else(|| LedgerError::UnknownIdentity(name.to_string()))?;
        if record.enrollment.is_none() {
            return Err(LedgerError::NotEnrolled(name.to_string()));
        }

        let remaining = self.tcert_quota.saturating_sub(record.tcerts_issued);
        if remaining == 0 {
            return Err(LedgerError::CertificatesExhausted(name.to_string()));
        }
        let count = count.min(remaining);

        let mut csprng = OsRng;
        let issued_at = Utc::now();
        let batch: Vec<IssuedTCert> = (0..count)
            .map(|_| {
                let key = SigningKey::generate(&mut csprng);
                let mut certificate = TransactionCertificate {
                    id: hex::encode(rand::random::<[u8; 16]>()),
                    public_key: key.verifying_key().to_bytes().to_vec(),
                    issued_at,
                    expires_at: issued_at + Duration::days(1),
                    signature: vec![],
                };
                certificate.signature = self.signer.sign(&certificate.signed_bytes());
                IssuedTCert {
                    certificate,
                    secret_key: key.to_bytes(),
                }
            })
            .collect();

        record.tcerts_issued += batch.len();
        debug!(
            "{} issued {} tcerts to {} ({} of {} used)",
            self.ca_id,
            batch.len(),
            name,
            record.tcerts_issued,
            self.tcert_quota
        );
        Ok(batch)
    }

    pub async fn is_enrolled(&self, name: &str) -> bool {
        self.registry
            .read()
            .await
            .get(name)
            .is_some_and(|record| record.enrollment.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::verify_signature;

    fn service() -> MembershipService {
        MembershipService::new("membersrvc", &MembershipProfile::default())
    }

    #[tokio::test]
    async fn enrollment_consumes_the_one_time_secret() {
        let ca = service();

        assert_eq!(
            ca.enroll("WebAppAdmin", "wrong", vec![1; 32]).await.err(),
            Some(LedgerError::InvalidSecret("WebAppAdmin".to_string()))
        );

        let cert = ca.enroll("WebAppAdmin", "DJY27pEnl16d", vec![1; 32]).await.unwrap();
        assert!(cert.can_register(Role::Client));
        assert!(verify_signature(&ca.ca_public_key(), &cert.signed_bytes(), &cert.signature));

        assert!(ca.enroll("WebAppAdmin", "DJY27pEnl16d", vec![1; 32]).await.is_err());
        assert_eq!(
            ca.enroll("nobody", "x", vec![]).await.err(),
            Some(LedgerError::UnknownIdentity("nobody".to_string()))
        );
    }

    #[tokio::test]
    async fn registration_is_checked_against_registrar_and_affiliation() {
        let ca = service();
        let request = RegistrationRequest::new("WebApp_user1", "bank_a");

        assert_eq!(
            ca.register("WebAppAdmin", &request).await.err(),
            Some(LedgerError::NotEnrolled("WebAppAdmin".to_string()))
        );

        ca.enroll("lukas", "NPKYL39uKbkj", vec![2; 32]).await.unwrap();
        assert_eq!(
            ca.register("lukas", &request).await.err(),
            Some(LedgerError::NotARegistrar("lukas".to_string()))
        );

        ca.enroll("WebAppAdmin", "DJY27pEnl16d", vec![1; 32]).await.unwrap();
        assert_eq!(
            ca.register("WebAppAdmin", &RegistrationRequest::new("u2", "bank_z"))
                .await
                .err(),
            Some(LedgerError::UnknownAffiliation("bank_z".to_string()))
        );

        let secret = ca.register("WebAppAdmin", &request).await.unwrap();
        assert_eq!(secret.len(), SECRET_LEN);
        assert_eq!(
            ca.register("WebAppAdmin", &request).await.err(),
            Some(LedgerError::AlreadyRegistered("WebApp_user1".to_string()))
        );

        ca.enroll("WebApp_user1", &secret, vec![3; 32]).await.unwrap();
        assert!(ca.is_enrolled("WebApp_user1").await);
    }

    #[tokio::test]
    async fn tcert_issuance_stops_at_the_quota() {
        let profile = MembershipProfile {
            tcert_quota: 3,
            ..MembershipProfile::default()
        };
        let ca = MembershipService::new("membersrvc", &profile);
        ca.enroll("lukas", "NPKYL39uKbkj", vec![2; 32]).await.unwrap();

        let first = ca.issue_tcerts("lukas", 2).await.unwrap();
        assert_eq!(first.len(), 2);
        assert!(first[0].certificate.is_valid(&ca.ca_public_key()));

        assert_eq!(ca.issue_tcerts("lukas", 2).await.unwrap().len(), 1);
        assert_eq!(
            ca.issue_tcerts("lukas", 1).await.err(),
            Some(LedgerError::CertificatesExhausted("lukas".to_string()))
        );
    }
}

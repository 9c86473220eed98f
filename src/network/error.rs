use thiserror::Error;

/// Failures reported by the ledger client: the membership service, the
/// validating peers, or the event hub.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LedgerError {
    #[error("identity '{0}' is not registered with the membership service")]
    UnknownIdentity(String),

    #[error("enrollment secret rejected for '{0}'")]
    InvalidSecret(String),

    #[error("identity '{0}' is not enrolled")]
    NotEnrolled(String),

    #[error("no registrar has been set on the chain")]
    NoRegistrar,

    #[error("identity '{0}' is not allowed to register other identities")]
    NotARegistrar(String),

    #[error("affiliation '{0}' is not recognized")]
    UnknownAffiliation(String),

    #[error("identity '{0}' is already registered")]
    AlreadyRegistered(String),

    #[error("transaction certificates exhausted for '{0}'")]
    CertificatesExhausted(String),

    #[error("transaction signature or certificate is invalid")]
    InvalidSignature,

    #[error("transaction certificate {0} was already used")]
    CertificateReused(String),

    #[error("no chaincode found at code path '{0}'")]
    UnknownCodePath(String),

    #[error("chaincode '{0}' is not deployed")]
    UnknownChaincode(String),

    #[error("chaincode error: {0}")]
    Chaincode(String),

    #[error("no peers configured on the chain")]
    NoPeers,

    #[error("event hub is not connected")]
    EventHubNotConnected,

    #[error("{0} was abandoned before it completed")]
    Abandoned(&'static str),
}

impl LedgerError {
    /// True when the failure comes from an exhausted credential resource
    /// rather than from the request itself.
    pub fn is_resource_exhausted(&self) -> bool {
        matches!(self, LedgerError::CertificatesExhausted(_))
    }
}

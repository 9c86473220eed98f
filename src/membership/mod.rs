pub mod certificate;
pub mod service;

pub use certificate::{EnrollmentCertificate, Role, TransactionCertificate};
pub use service::{IdentityProfile, IssuedTCert, MembershipProfile, MembershipService};

//! X.509 certificates: parsing, building, signing keys and chain building.

mod builder;
mod certificate;
mod chain;
mod signing;

pub use builder::CertificateBuilder;
pub use certificate::{
    AlgorithmIdentifier, Certificate, DistinguishedName, SubjectPublicKeyInfo, X509Extension,
};
pub use chain::{build_chain, MAX_CHAIN_DEPTH};
pub use signing::{verify_signature, SignatureAlgorithm, SigningKey};

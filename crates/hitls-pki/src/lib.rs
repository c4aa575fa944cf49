#![forbid(unsafe_code)]
#![doc = "X.509 certificates and CRMF structures for the openHiTLS CMP crates."]

pub mod digest;
mod encoding;
mod oid_mapping;

#[cfg(feature = "x509")]
pub mod x509;

#[cfg(feature = "crmf")]
pub mod crmf;

pub use oid_mapping::{hash_to_oid, mac_to_oid, oid_to_hash, oid_to_mac};

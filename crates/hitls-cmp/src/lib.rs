#![forbid(unsafe_code)]
#![doc = "CMP (RFC 4210) message protection and a mock CMP server for the openHiTLS CMP crates."]

pub mod ctx;
pub mod kem;
pub mod msg;
pub mod protect;
pub mod server;

#[cfg(feature = "http")]
pub mod http;

pub use ctx::{KemMode, ProtectionContext};
pub use msg::{BodyType, PkiBody, PkiHeader, PkiMessage};
pub use protect::{protect, verify_protection, Protection, ProtectionAlgorithm};
pub use server::{ErrorInjection, MockServer, ServerConfig, TransactionPhase};

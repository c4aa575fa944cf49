//! Certificate Request Message Format (RFC 4211) structures used by CMP.

mod pbm;
mod request;

pub use pbm::{PbmParameter, MAX_ITERATION_COUNT, MIN_ITERATION_COUNT};
pub use request::{CertId, CertReqMsg, CertTemplate};

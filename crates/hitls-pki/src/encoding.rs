//! Shared DER helpers for the PKI crate.

use hitls_types::{CryptoError, PkiError};
use hitls_utils::asn1::Encoder;

/// Map a decoder failure into the PKI error space.
pub(crate) fn asn1_err(e: CryptoError) -> PkiError {
    PkiError::Asn1Error(e.to_string())
}

/// Encode a SEQUENCE containing `content`.
pub(crate) fn enc_seq(content: &[u8]) -> Vec<u8> {
    let mut e = Encoder::new();
    e.write_sequence(content);
    e.finish()
}

/// Encode an OCTET STRING.
pub(crate) fn enc_octet(content: &[u8]) -> Vec<u8> {
    let mut e = Encoder::new();
    e.write_octet_string(content);
    e.finish()
}

/// Content octets of a non-negative INTEGER, for IMPLICIT tagging.
pub(crate) fn integer_content(value: &[u8]) -> Vec<u8> {
    let mut e = Encoder::new();
    e.write_integer(value);
    let der = e.finish();
    // identifier plus a short-form length; serials never reach 128 octets
    let header = if der[1] & 0x80 == 0 {
        2
    } else {
        2 + (der[1] & 0x7F) as usize
    };
    der[header..].to_vec()
}

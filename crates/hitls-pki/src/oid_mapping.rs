//! OID-to-algorithm mapping helpers.

use hitls_types::{HashAlgId, MacAlgId};
use hitls_utils::oid::{known, Oid};

/// Map a one-way function OID to its `HashAlgId`.
pub fn oid_to_hash(oid: &Oid) -> Option<HashAlgId> {
    if *oid == known::sha1() {
        Some(HashAlgId::Sha1)
    } else if *oid == known::sha224() {
        Some(HashAlgId::Sha224)
    } else if *oid == known::sha256() {
        Some(HashAlgId::Sha256)
    } else if *oid == known::sha384() {
        Some(HashAlgId::Sha384)
    } else if *oid == known::sha512() {
        Some(HashAlgId::Sha512)
    } else {
        None
    }
}

pub fn hash_to_oid(alg: HashAlgId) -> Oid {
    match alg {
        HashAlgId::Sha1 => known::sha1(),
        HashAlgId::Sha224 => known::sha224(),
        HashAlgId::Sha256 => known::sha256(),
        HashAlgId::Sha384 => known::sha384(),
        HashAlgId::Sha512 => known::sha512(),
    }
}

/// Map an HMAC OID to its `MacAlgId`. Both the RFC 3370 and the
/// PKCS#5 spelling of HMAC-SHA1 are accepted.
pub fn oid_to_mac(oid: &Oid) -> Option<MacAlgId> {
    if *oid == known::hmac_sha1() || *oid == known::hmac_with_sha1() {
        Some(MacAlgId::HmacSha1)
    } else if *oid == known::hmac_with_sha224() {
        Some(MacAlgId::HmacSha224)
    } else if *oid == known::hmac_with_sha256() {
        Some(MacAlgId::HmacSha256)
    } else if *oid == known::hmac_with_sha384() {
        Some(MacAlgId::HmacSha384)
    } else if *oid == known::hmac_with_sha512() {
        Some(MacAlgId::HmacSha512)
    } else {
        None
    }
}

pub fn mac_to_oid(alg: MacAlgId) -> Oid {
    match alg {
        MacAlgId::HmacSha1 => known::hmac_sha1(),
        MacAlgId::HmacSha224 => known::hmac_with_sha224(),
        MacAlgId::HmacSha256 => known::hmac_with_sha256(),
        MacAlgId::HmacSha384 => known::hmac_with_sha384(),
        MacAlgId::HmacSha512 => known::hmac_with_sha512(),
    }
}

/// Short name for a DN attribute OID.
pub(crate) fn oid_to_dn_short_name(oid: &Oid) -> Option<&'static str> {
    DN_ATTRIBUTES
        .iter()
        .find(|(_, make)| make() == *oid)
        .map(|(name, _)| *name)
}

/// OID for a DN attribute short name; dotted notation is accepted too.
pub(crate) fn dn_short_name_to_oid(name: &str) -> Option<Oid> {
    DN_ATTRIBUTES
        .iter()
        .find(|(n, _)| n.eq_ignore_ascii_case(name))
        .map(|(_, make)| make())
        .or_else(|| Oid::from_dot_string(name).ok())
}

const DN_ATTRIBUTES: &[(&str, fn() -> Oid)] = &[
    ("CN", known::common_name),
    ("serialNumber", known::serial_number),
    ("C", known::country_name),
    ("L", known::locality_name),
    ("ST", known::state_or_province_name),
    ("O", known::organization_name),
    ("OU", known::organizational_unit_name),
    ("emailAddress", known::email_address),
];

//! Digest and HMAC primitives used by certificate handling and CMP
//! protection.

use hitls_types::{CryptoError, HashAlgId, MacAlgId};
use hmac::{Hmac, Mac};
use sha1::Sha1;
use sha2::{Digest, Sha224, Sha256, Sha384, Sha512};
use subtle::ConstantTimeEq;

/// Hash `data` with `alg`.
pub fn compute_hash(alg: HashAlgId, data: &[u8]) -> Vec<u8> {
    match alg {
        HashAlgId::Sha1 => Sha1::digest(data).to_vec(),
        HashAlgId::Sha224 => Sha224::digest(data).to_vec(),
        HashAlgId::Sha256 => Sha256::digest(data).to_vec(),
        HashAlgId::Sha384 => Sha384::digest(data).to_vec(),
        HashAlgId::Sha512 => Sha512::digest(data).to_vec(),
    }
}

macro_rules! hmac_with {
    ($d:ty, $key:expr, $data:expr) => {{
        let mut mac =
            <Hmac<$d> as Mac>::new_from_slice($key).map_err(|_| CryptoError::InvalidKey)?;
        mac.update($data);
        mac.finalize().into_bytes().to_vec()
    }};
}

/// HMAC `data` under `key`.
pub fn hmac(alg: MacAlgId, key: &[u8], data: &[u8]) -> Result<Vec<u8>, CryptoError> {
    Ok(match alg {
        MacAlgId::HmacSha1 => hmac_with!(Sha1, key, data),
        MacAlgId::HmacSha224 => hmac_with!(Sha224, key, data),
        MacAlgId::HmacSha256 => hmac_with!(Sha256, key, data),
        MacAlgId::HmacSha384 => hmac_with!(Sha384, key, data),
        MacAlgId::HmacSha512 => hmac_with!(Sha512, key, data),
    })
}

/// Constant-time comparison of two tags.
pub fn tags_equal(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && bool::from(a.ct_eq(b))
}

//! Password-based MAC (RFC 4211 §4.4).

use hitls_types::{CryptoError, HashAlgId, MacAlgId, PkiError};
use hitls_utils::asn1::{tags, Decoder, Encoder};
use zeroize::Zeroizing;

use crate::digest::{compute_hash, hmac};
use crate::encoding::asn1_err;
use crate::oid_mapping::{hash_to_oid, mac_to_oid, oid_to_hash, oid_to_mac};
use crate::x509::AlgorithmIdentifier;

/// Lowest accepted iterationCount.
pub const MIN_ITERATION_COUNT: u32 = 100;
/// Highest accepted iterationCount.
pub const MAX_ITERATION_COUNT: u32 = 100_000;

/// PBMParameter ::= SEQUENCE { salt, owf, iterationCount, mac }
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PbmParameter {
    pub salt: Vec<u8>,
    pub owf: HashAlgId,
    pub iteration_count: u32,
    pub mac: MacAlgId,
}

fn check_iterations(count: u32) -> Result<(), CryptoError> {
    if (MIN_ITERATION_COUNT..=MAX_ITERATION_COUNT).contains(&count) {
        Ok(())
    } else {
        Err(CryptoError::InvalidIterationCount(count))
    }
}

impl PbmParameter {
    /// Fresh parameters with a random salt of `salt_len` bytes.
    pub fn new(
        salt_len: usize,
        owf: HashAlgId,
        iteration_count: u32,
        mac: MacAlgId,
    ) -> Result<Self, PkiError> {
        check_iterations(iteration_count)?;
        if salt_len == 0 {
            return Err(CryptoError::InvalidArg.into());
        }
        let mut salt = vec![0u8; salt_len];
        getrandom::getrandom(&mut salt).map_err(|_| CryptoError::DrbgEntropyFail)?;
        Ok(Self {
            salt,
            owf,
            iteration_count,
            mac,
        })
    }

    pub fn to_der(&self) -> Vec<u8> {
        let mut enc = Encoder::new();
        enc.write_nested(tags::SEQUENCE, |seq| {
            seq.write_octet_string(&self.salt);
            seq.write_raw(&AlgorithmIdentifier::new(hash_to_oid(self.owf)).to_der());
            seq.write_i64(i64::from(self.iteration_count));
            seq.write_raw(&AlgorithmIdentifier::new(mac_to_oid(self.mac)).to_der());
        });
        enc.finish()
    }

    /// Decode and validate. Unknown owf or MAC algorithms give
    /// `UnsupportedAlgorithm`, an out-of-range count gives
    /// `InvalidIterationCount`.
    pub fn from_der(der: &[u8]) -> Result<Self, PkiError> {
        let mut outer = Decoder::new(der);
        let mut seq = outer.read_sequence().map_err(asn1_err)?;
        outer.finish().map_err(asn1_err)?;

        let salt = seq.read_octet_string().map_err(asn1_err)?.to_vec();
        let owf_alg = AlgorithmIdentifier::from_decoder(&mut seq)?;
        let owf = oid_to_hash(&owf_alg.oid)
            .ok_or_else(|| PkiError::UnsupportedAlgorithm(format!("owf {}", owf_alg.oid)))?;
        let count = seq.read_i64().map_err(asn1_err)?;
        let mac_alg = AlgorithmIdentifier::from_decoder(&mut seq)?;
        let mac = oid_to_mac(&mac_alg.oid)
            .ok_or_else(|| PkiError::UnsupportedAlgorithm(format!("mac {}", mac_alg.oid)))?;
        seq.finish().map_err(asn1_err)?;

        let iteration_count = u32::try_from(count)
            .map_err(|_| CryptoError::InvalidIterationCount(u32::MAX))?;
        check_iterations(iteration_count)?;
        Ok(Self {
            salt,
            owf,
            iteration_count,
            mac,
        })
    }

    /// basekey = owf applied `iteration_count` times to secret ‖ salt.
    pub fn derive_key(&self, secret: &[u8]) -> Result<Zeroizing<Vec<u8>>, PkiError> {
        check_iterations(self.iteration_count)?;
        let mut input = Zeroizing::new(Vec::with_capacity(secret.len() + self.salt.len()));
        input.extend_from_slice(secret);
        input.extend_from_slice(&self.salt);
        let mut key = Zeroizing::new(compute_hash(self.owf, &input));
        for _ in 1..self.iteration_count {
            key = Zeroizing::new(compute_hash(self.owf, &key));
        }
        Ok(key)
    }

    /// MAC `data` under the key derived from `secret`.
    pub fn mac(&self, secret: &[u8], data: &[u8]) -> Result<Vec<u8>, PkiError> {
        let key = self.derive_key(secret)?;
        Ok(hmac(self.mac, &key, data)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixed() -> PbmParameter {
        PbmParameter {
            salt: b"0123456789abcdef".to_vec(),
            owf: HashAlgId::Sha256,
            iteration_count: 500,
            mac: MacAlgId::HmacSha1,
        }
    }

    #[test]
    fn test_derive_key_matches_manual_iteration() {
        let p = PbmParameter {
            iteration_count: 100,
            ..fixed()
        };
        let mut expect = compute_hash(HashAlgId::Sha256, b"secret0123456789abcdef");
        for _ in 1..100 {
            expect = compute_hash(HashAlgId::Sha256, &expect);
        }
        assert_eq!(p.derive_key(b"secret").unwrap().as_slice(), expect.as_slice());
    }

    #[test]
    fn test_der_roundtrip() {
        let p = fixed();
        let der = p.to_der();
        assert_eq!(PbmParameter::from_der(&der).unwrap(), p);
    }

    #[test]
    fn test_iteration_bounds() {
        for bad in [0u32, 99, 100_001] {
            let p = PbmParameter {
                iteration_count: bad,
                ..fixed()
            };
            assert!(matches!(
                PbmParameter::from_der(&p.to_der()),
                Err(PkiError::CryptoError(CryptoError::InvalidIterationCount(_)))
            ));
            assert!(PbmParameter::new(16, HashAlgId::Sha256, bad, MacAlgId::HmacSha1).is_err());
        }
        assert!(PbmParameter::new(16, HashAlgId::Sha256, 100, MacAlgId::HmacSha1).is_ok());
    }

    #[test]
    fn test_unknown_owf() {
        // owf = hmacWithSHA256, which is not a hash
        let mut enc = Encoder::new();
        enc.write_nested(tags::SEQUENCE, |seq| {
            seq.write_octet_string(b"salt");
            seq.write_raw(&AlgorithmIdentifier::new(mac_to_oid(MacAlgId::HmacSha256)).to_der());
            seq.write_i64(500);
            seq.write_raw(&AlgorithmIdentifier::new(mac_to_oid(MacAlgId::HmacSha1)).to_der());
        });
        assert!(matches!(
            PbmParameter::from_der(&enc.finish()),
            Err(PkiError::UnsupportedAlgorithm(_))
        ));
    }

    #[test]
    fn test_fresh_salts_differ() {
        let a = PbmParameter::new(16, HashAlgId::Sha256, 500, MacAlgId::HmacSha1).unwrap();
        let b = PbmParameter::new(16, HashAlgId::Sha256, 500, MacAlgId::HmacSha1).unwrap();
        assert_eq!(a.salt.len(), 16);
        assert_ne!(a.salt, b.salt);
    }

    #[test]
    fn test_mac_depends_on_secret() {
        let p = fixed();
        let a = p.mac(b"secret", b"data").unwrap();
        assert_eq!(a.len(), 20);
        assert_eq!(a, p.mac(b"secret", b"data").unwrap());
        assert_ne!(a, p.mac(b"Secret", b"data").unwrap());
    }
}

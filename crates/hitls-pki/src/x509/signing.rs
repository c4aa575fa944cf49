//! Signature algorithms, the `SigningKey` abstraction and verification.

use ed25519_dalek::{Signer, Verifier};
use hitls_types::{CryptoError, HashAlgId, PkiError};
use hitls_utils::oid::{known, Oid};
use p256::ecdsa::signature::hazmat::{PrehashSigner, PrehashVerifier};

use super::{AlgorithmIdentifier, Certificate, SubjectPublicKeyInfo};
use crate::digest::compute_hash;
use crate::encoding::asn1_err;

// ---------------------------------------------------------------------------
// Signature algorithm identifiers
// ---------------------------------------------------------------------------

/// Supported signature algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignatureAlgorithm {
    /// PureEdDSA; signs the message itself.
    Ed25519,
    EcdsaWithSha256,
    EcdsaWithSha384,
    EcdsaWithSha512,
}

impl SignatureAlgorithm {
    pub fn oid(self) -> Oid {
        match self {
            SignatureAlgorithm::Ed25519 => known::ed25519(),
            SignatureAlgorithm::EcdsaWithSha256 => known::ecdsa_with_sha256(),
            SignatureAlgorithm::EcdsaWithSha384 => known::ecdsa_with_sha384(),
            SignatureAlgorithm::EcdsaWithSha512 => known::ecdsa_with_sha512(),
        }
    }

    pub fn from_oid(oid: &Oid) -> Option<Self> {
        [
            SignatureAlgorithm::Ed25519,
            SignatureAlgorithm::EcdsaWithSha256,
            SignatureAlgorithm::EcdsaWithSha384,
            SignatureAlgorithm::EcdsaWithSha512,
        ]
        .into_iter()
        .find(|alg| alg.oid() == *oid)
    }

    /// The pre-hash digest, `None` for Ed25519.
    pub fn digest(self) -> Option<HashAlgId> {
        match self {
            SignatureAlgorithm::Ed25519 => None,
            SignatureAlgorithm::EcdsaWithSha256 => Some(HashAlgId::Sha256),
            SignatureAlgorithm::EcdsaWithSha384 => Some(HashAlgId::Sha384),
            SignatureAlgorithm::EcdsaWithSha512 => Some(HashAlgId::Sha512),
        }
    }

    /// Both schemes use absent parameters.
    pub fn algorithm_identifier(self) -> AlgorithmIdentifier {
        AlgorithmIdentifier::new(self.oid())
    }
}

// ---------------------------------------------------------------------------
// SigningKey - unified signing dispatch
// ---------------------------------------------------------------------------

/// A private key that can sign data.
#[derive(Clone)]
pub enum SigningKey {
    Ed25519(ed25519_dalek::SigningKey),
    /// NIST P-256, signing a caller-chosen digest.
    EcdsaP256(p256::ecdsa::SigningKey),
}

impl std::fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SigningKey::Ed25519(_) => f.write_str("SigningKey::Ed25519(..)"),
            SigningKey::EcdsaP256(_) => f.write_str("SigningKey::EcdsaP256(..)"),
        }
    }
}

fn random_bytes<const N: usize>() -> Result<[u8; N], PkiError> {
    let mut buf = [0u8; N];
    getrandom::getrandom(&mut buf).map_err(|_| CryptoError::DrbgEntropyFail)?;
    Ok(buf)
}

impl SigningKey {
    /// Generate a fresh Ed25519 key from the OS RNG.
    pub fn generate_ed25519() -> Result<Self, PkiError> {
        let seed = zeroize::Zeroizing::new(random_bytes::<32>()?);
        Ok(SigningKey::Ed25519(ed25519_dalek::SigningKey::from_bytes(
            &seed,
        )))
    }

    /// Generate a fresh P-256 key from the OS RNG.
    pub fn generate_p256() -> Result<Self, PkiError> {
        // rejection sampling: zero and values >= n are not scalars
        for _ in 0..8 {
            let candidate = zeroize::Zeroizing::new(random_bytes::<32>()?);
            if let Ok(key) = p256::ecdsa::SigningKey::from_slice(candidate.as_slice()) {
                return Ok(SigningKey::EcdsaP256(key));
            }
        }
        Err(CryptoError::DrbgEntropyFail.into())
    }

    /// Create a SigningKey from PKCS#8 DER bytes.
    pub fn from_pkcs8_der(der: &[u8]) -> Result<Self, PkiError> {
        use ed25519_dalek::pkcs8::DecodePrivateKey as _;
        if let Ok(key) = ed25519_dalek::SigningKey::from_pkcs8_der(der) {
            return Ok(SigningKey::Ed25519(key));
        }
        p256::ecdsa::SigningKey::from_pkcs8_der(der)
            .map(SigningKey::EcdsaP256)
            .map_err(|_| PkiError::UnsupportedAlgorithm("private key type".into()))
    }

    /// Create a SigningKey from a PKCS#8 PEM string.
    pub fn from_pkcs8_pem(pem: &str) -> Result<Self, PkiError> {
        let blocks = hitls_utils::pem::parse_label(pem, "PRIVATE KEY").map_err(asn1_err)?;
        let der = blocks
            .first()
            .ok_or_else(|| PkiError::InvalidCert("no PRIVATE KEY block found".into()))?;
        Self::from_pkcs8_der(der)
    }

    /// The digest a signature uses when the caller does not pick one.
    pub fn default_digest(&self) -> Option<HashAlgId> {
        match self {
            SigningKey::Ed25519(_) => None,
            SigningKey::EcdsaP256(_) => Some(HashAlgId::Sha256),
        }
    }

    /// Resolve the signature algorithm for `digest`. Ed25519 ignores the
    /// digest; ECDSA supports SHA-256, SHA-384 and SHA-512.
    pub fn signature_algorithm(
        &self,
        digest: Option<HashAlgId>,
    ) -> Result<SignatureAlgorithm, PkiError> {
        match self {
            SigningKey::Ed25519(_) => Ok(SignatureAlgorithm::Ed25519),
            SigningKey::EcdsaP256(_) => match digest.unwrap_or(HashAlgId::Sha256) {
                HashAlgId::Sha256 => Ok(SignatureAlgorithm::EcdsaWithSha256),
                HashAlgId::Sha384 => Ok(SignatureAlgorithm::EcdsaWithSha384),
                HashAlgId::Sha512 => Ok(SignatureAlgorithm::EcdsaWithSha512),
                other => Err(PkiError::UnsupportedAlgorithm(format!(
                    "ecdsa with {}",
                    other.name()
                ))),
            },
        }
    }

    /// Sign `data` under `alg`, which must belong to this key type.
    pub fn sign(&self, alg: SignatureAlgorithm, data: &[u8]) -> Result<Vec<u8>, PkiError> {
        match (self, alg.digest()) {
            (SigningKey::Ed25519(key), None) => Ok(key.sign(data).to_bytes().to_vec()),
            (SigningKey::EcdsaP256(key), Some(hash)) => {
                let digest = compute_hash(hash, data);
                let sig: p256::ecdsa::Signature = key
                    .sign_prehash(&digest)
                    .map_err(|_| CryptoError::InvalidKey)?;
                Ok(sig.to_der().as_bytes().to_vec())
            }
            _ => Err(PkiError::UnsupportedAlgorithm(format!(
                "{alg:?} with {self:?}"
            ))),
        }
    }

    /// Extract the SubjectPublicKeyInfo for this key.
    pub fn public_key_info(&self) -> SubjectPublicKeyInfo {
        match self {
            SigningKey::Ed25519(key) => SubjectPublicKeyInfo {
                algorithm: AlgorithmIdentifier::new(known::ed25519()),
                public_key: key.verifying_key().to_bytes().to_vec(),
            },
            SigningKey::EcdsaP256(key) => SubjectPublicKeyInfo {
                algorithm: AlgorithmIdentifier::with_params(
                    known::ec_public_key(),
                    known::prime256v1().to_der(),
                ),
                public_key: key
                    .verifying_key()
                    .to_encoded_point(false)
                    .as_bytes()
                    .to_vec(),
            },
        }
    }

    /// True when `cert` certifies this key's public half.
    pub fn matches_certificate(&self, cert: &Certificate) -> bool {
        cert.public_key == self.public_key_info()
    }
}

// ---------------------------------------------------------------------------
// Verification
// ---------------------------------------------------------------------------

/// Verify `signature` over `data` with the public key in `spki`.
/// Returns `Ok(false)` for a well-formed signature that does not verify.
pub fn verify_signature(
    spki: &SubjectPublicKeyInfo,
    alg: SignatureAlgorithm,
    data: &[u8],
    signature: &[u8],
) -> Result<bool, PkiError> {
    match alg.digest() {
        None => {
            if spki.algorithm.oid != known::ed25519() {
                return Err(PkiError::UnsupportedAlgorithm("key is not ed25519".into()));
            }
            let key_bytes: [u8; 32] = spki
                .public_key
                .as_slice()
                .try_into()
                .map_err(|_| CryptoError::InvalidKey)?;
            let vk = ed25519_dalek::VerifyingKey::from_bytes(&key_bytes)
                .map_err(|_| CryptoError::InvalidKey)?;
            let Ok(sig) = ed25519_dalek::Signature::from_slice(signature) else {
                return Ok(false);
            };
            Ok(vk.verify(data, &sig).is_ok())
        }
        Some(hash) => {
            if spki.algorithm.oid != known::ec_public_key() {
                return Err(PkiError::UnsupportedAlgorithm("key is not ecdsa".into()));
            }
            let vk = p256::ecdsa::VerifyingKey::from_sec1_bytes(&spki.public_key)
                .map_err(|_| CryptoError::InvalidKey)?;
            let Ok(sig) = p256::ecdsa::Signature::from_der(signature) else {
                return Ok(false);
            };
            let digest = compute_hash(hash, data);
            Ok(vk.verify_prehash(&digest, &sig).is_ok())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_pkcs8_der_key_types() {
        use ed25519_dalek::pkcs8::EncodePrivateKey as _;
        let ed = ed25519_dalek::SigningKey::from_bytes(&[7; 32]);
        let der = ed.to_pkcs8_der().unwrap();
        assert!(matches!(
            SigningKey::from_pkcs8_der(der.as_bytes()).unwrap(),
            SigningKey::Ed25519(_)
        ));
        let ec = p256::ecdsa::SigningKey::from_slice(&[7; 32]).unwrap();
        let der = ec.to_pkcs8_der().unwrap();
        assert!(matches!(
            SigningKey::from_pkcs8_der(der.as_bytes()).unwrap(),
            SigningKey::EcdsaP256(_)
        ));
        assert!(SigningKey::from_pkcs8_der(b"junk").is_err());
    }

    #[test]
    fn test_ed25519_sign_verify() {
        let key = SigningKey::generate_ed25519().unwrap();
        assert_eq!(key.default_digest(), None);
        let alg = key.signature_algorithm(Some(HashAlgId::Sha384)).unwrap();
        assert_eq!(alg, SignatureAlgorithm::Ed25519);
        let sig = key.sign(alg, b"protected part").unwrap();
        assert_eq!(sig.len(), 64);
        let spki = key.public_key_info();
        assert!(verify_signature(&spki, alg, b"protected part", &sig).unwrap());
        assert!(!verify_signature(&spki, alg, b"tampered", &sig).unwrap());
    }

    #[test]
    fn test_ecdsa_digest_selection() {
        let key = SigningKey::generate_p256().unwrap();
        let spki = key.public_key_info();
        assert_eq!(spki.public_key.len(), 65);
        for (digest, alg) in [
            (None, SignatureAlgorithm::EcdsaWithSha256),
            (Some(HashAlgId::Sha384), SignatureAlgorithm::EcdsaWithSha384),
            (Some(HashAlgId::Sha512), SignatureAlgorithm::EcdsaWithSha512),
        ] {
            assert_eq!(key.signature_algorithm(digest).unwrap(), alg);
            let sig = key.sign(alg, b"data").unwrap();
            assert!(verify_signature(&spki, alg, b"data", &sig).unwrap());
        }
        assert!(key.signature_algorithm(Some(HashAlgId::Sha1)).is_err());
    }

    #[test]
    fn test_sign_rejects_foreign_algorithm() {
        let key = SigningKey::generate_ed25519().unwrap();
        assert!(key.sign(SignatureAlgorithm::EcdsaWithSha256, b"x").is_err());
    }

    #[test]
    fn test_verify_with_wrong_key_type() {
        let ed = SigningKey::generate_ed25519().unwrap();
        let ec = SigningKey::generate_p256().unwrap();
        let sig = ed.sign(SignatureAlgorithm::Ed25519, b"x").unwrap();
        assert!(verify_signature(&ec.public_key_info(), SignatureAlgorithm::Ed25519, b"x", &sig)
            .is_err());
    }

    #[test]
    fn test_algorithm_oid_mapping() {
        let oid = SignatureAlgorithm::EcdsaWithSha384.oid();
        assert_eq!(
            SignatureAlgorithm::from_oid(&oid),
            Some(SignatureAlgorithm::EcdsaWithSha384)
        );
        assert_eq!(SignatureAlgorithm::from_oid(&known::sha256()), None);
    }
}

//! KEM-based message authentication (RFC 9810 §5.1.3.4).
//!
//! The sender encapsulates to the recipient's KEM key, derives the shared
//! secret key `ssk` from the KEM output and the transactionID, and MACs the
//! protected part with it. The ciphertext travels in the header's
//! generalInfo as `id-it-KemCiphertextInfo`.

use hitls_pki::x509::AlgorithmIdentifier;
use hitls_pki::{mac_to_oid, oid_to_mac};
use hitls_types::{CmpError, CryptoError, MacAlgId};
use hitls_utils::asn1::{tags, Decoder, Encoder};
use hitls_utils::oid::known;
use hkdf::Hkdf;
use sha2::Sha256;
use x25519_dalek::{PublicKey, StaticSecret};
use zeroize::Zeroizing;

use crate::msg::{der_err, InfoTypeAndValue, PkiMessage};

/// Result of one encapsulation.
pub struct KemOutput {
    pub ciphertext: Vec<u8>,
    pub shared_secret: Zeroizing<Vec<u8>>,
}

/// The sending half of a KEM bound to one recipient public key.
pub trait KemEncapsulator: std::fmt::Debug + Send + Sync {
    /// Identifier placed into KemCiphertextInfo.
    fn algorithm(&self) -> AlgorithmIdentifier;

    fn encapsulate(&self) -> Result<KemOutput, CmpError>;
}

fn x25519_shared(
    dh: &[u8; 32],
    ct: &[u8],
    recipient: &[u8],
) -> Result<Zeroizing<Vec<u8>>, CmpError> {
    let mut info = Vec::with_capacity(ct.len() + recipient.len());
    info.extend_from_slice(ct);
    info.extend_from_slice(recipient);
    let hk = Hkdf::<Sha256>::new(None, dh);
    let mut ss = Zeroizing::new(vec![0u8; 32]);
    hk.expand(&info, &mut ss)
        .map_err(|_| CryptoError::KdfDkLenOverflow)?;
    Ok(ss)
}

/// X25519 used as a KEM: the ciphertext is an ephemeral public key and
/// the shared secret is HKDF-SHA256 over the DH output.
#[derive(Debug, Clone)]
pub struct X25519Kem {
    recipient: PublicKey,
}

impl X25519Kem {
    pub fn new(recipient_public: [u8; 32]) -> Self {
        Self {
            recipient: PublicKey::from(recipient_public),
        }
    }
}

impl KemEncapsulator for X25519Kem {
    fn algorithm(&self) -> AlgorithmIdentifier {
        AlgorithmIdentifier::new(known::x25519())
    }

    fn encapsulate(&self) -> Result<KemOutput, CmpError> {
        let mut seed = Zeroizing::new([0u8; 32]);
        getrandom::getrandom(&mut seed[..]).map_err(|_| CryptoError::DrbgEntropyFail)?;
        let ephemeral = StaticSecret::from(*seed);
        let ciphertext = PublicKey::from(&ephemeral).to_bytes().to_vec();
        let dh = ephemeral.diffie_hellman(&self.recipient);
        if !dh.was_contributory() {
            return Err(CryptoError::InvalidKey.into());
        }
        let shared_secret = x25519_shared(dh.as_bytes(), &ciphertext, self.recipient.as_bytes())?;
        Ok(KemOutput {
            ciphertext,
            shared_secret,
        })
    }
}

/// The receiving half of [`X25519Kem`].
#[derive(Clone)]
pub struct X25519KemKey {
    secret: StaticSecret,
}

impl std::fmt::Debug for X25519KemKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("X25519KemKey")
            .field("public", &self.public_key())
            .finish_non_exhaustive()
    }
}

impl X25519KemKey {
    pub fn generate() -> Result<Self, CmpError> {
        let mut seed = Zeroizing::new([0u8; 32]);
        getrandom::getrandom(&mut seed[..]).map_err(|_| CryptoError::DrbgEntropyFail)?;
        Ok(Self::from_bytes(*seed))
    }

    pub fn from_bytes(secret: [u8; 32]) -> Self {
        Self {
            secret: StaticSecret::from(secret),
        }
    }

    pub fn public_key(&self) -> [u8; 32] {
        PublicKey::from(&self.secret).to_bytes()
    }

    /// An encapsulator addressed to this key.
    pub fn encapsulator(&self) -> X25519Kem {
        X25519Kem::new(self.public_key())
    }

    pub fn decapsulate(&self, ciphertext: &[u8]) -> Result<Zeroizing<Vec<u8>>, CmpError> {
        let eph: [u8; 32] = ciphertext
            .try_into()
            .map_err(|_| CmpError::EncodingFailure("bad X25519 ciphertext length".into()))?;
        let dh = self.secret.diffie_hellman(&PublicKey::from(eph));
        if !dh.was_contributory() {
            return Err(CryptoError::InvalidKey.into());
        }
        x25519_shared(dh.as_bytes(), ciphertext, &self.public_key())
    }
}

/// KemBMParameter ::= SEQUENCE { kdf, len, mac }. The KDF is always
/// HKDF-SHA256.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KemBmParameter {
    /// Length of `ssk` in bytes.
    pub len: u32,
    pub mac: MacAlgId,
}

impl KemBmParameter {
    pub fn to_der(&self) -> Vec<u8> {
        let mut enc = Encoder::new();
        enc.write_nested(tags::SEQUENCE, |seq| {
            seq.write_raw(&AlgorithmIdentifier::new(known::hkdf_with_sha256()).to_der());
            seq.write_i64(i64::from(self.len));
            seq.write_raw(&AlgorithmIdentifier::new(mac_to_oid(self.mac)).to_der());
        });
        enc.finish()
    }

    pub fn from_der(der: &[u8]) -> Result<Self, CmpError> {
        let malformed =
            |e: &dyn std::fmt::Display| CmpError::MalformedAlgorithmParameters(e.to_string());
        let mut outer = Decoder::new(der);
        let mut seq = outer.read_sequence().map_err(|e| malformed(&e))?;
        outer.finish().map_err(|e| malformed(&e))?;
        let kdf = AlgorithmIdentifier::from_decoder(&mut seq).map_err(|e| malformed(&e))?;
        if kdf.oid != known::hkdf_with_sha256() {
            return Err(CmpError::UnsupportedAlgorithm(format!("kdf {}", kdf.oid)));
        }
        let len = seq.read_i64().map_err(|e| malformed(&e))?;
        let len = u32::try_from(len)
            .ok()
            .filter(|l| (1..=255 * 32).contains(l))
            .ok_or_else(|| CmpError::MalformedAlgorithmParameters(format!("ssk length {len}")))?;
        let mac = AlgorithmIdentifier::from_decoder(&mut seq).map_err(|e| malformed(&e))?;
        let mac = oid_to_mac(&mac.oid)
            .ok_or_else(|| CmpError::UnsupportedAlgorithm(format!("mac {}", mac.oid)))?;
        seq.finish().map_err(|e| malformed(&e))?;
        Ok(Self { len, mac })
    }
}

/// KemCiphertextInfo ::= SEQUENCE { kem AlgorithmIdentifier, ct OCTET STRING }
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KemCiphertextInfo {
    pub kem: AlgorithmIdentifier,
    pub ct: Vec<u8>,
}

impl KemCiphertextInfo {
    pub fn to_itav(&self) -> InfoTypeAndValue {
        let mut enc = Encoder::new();
        enc.write_nested(tags::SEQUENCE, |seq| {
            seq.write_raw(&self.kem.to_der());
            seq.write_octet_string(&self.ct);
        });
        InfoTypeAndValue::new(known::it_kem_ciphertext_info(), Some(enc.finish()))
    }

    /// Find and decode the entry in `msg`'s generalInfo.
    pub fn from_message(msg: &PkiMessage) -> Result<Self, CmpError> {
        let value = msg
            .header
            .general_info(&known::it_kem_ciphertext_info())
            .and_then(|itav| itav.info_value.as_deref())
            .ok_or_else(|| CmpError::InvalidArgs("no KEM ciphertext in generalInfo".into()))?;
        let mut dec = Decoder::new(value);
        let mut seq = dec.read_sequence().map_err(der_err)?;
        let kem = AlgorithmIdentifier::from_decoder(&mut seq)?;
        let ct = seq.read_octet_string().map_err(der_err)?.to_vec();
        seq.finish().map_err(der_err)?;
        Ok(Self { kem, ct })
    }
}

/// ssk = HKDF-SHA256(ss, info = KemOtherInfo { "CMP-KEM", transactionID }).
pub fn derive_ssk(
    shared_secret: &[u8],
    transaction_id: &[u8],
    len: usize,
) -> Result<Zeroizing<Vec<u8>>, CmpError> {
    let mut info = Encoder::new();
    info.write_nested(tags::SEQUENCE, |seq| {
        seq.write_nested(tags::SEQUENCE, |text| {
            text.write_utf8_string("CMP-KEM");
        });
        seq.write_octet_string(transaction_id);
    });
    let hk = Hkdf::<Sha256>::new(None, shared_secret);
    let mut ssk = Zeroizing::new(vec![0u8; len]);
    hk.expand(&info.finish(), &mut ssk)
        .map_err(|_| CryptoError::KdfDkLenOverflow)?;
    Ok(ssk)
}

/// Receiver side: recover `ssk` from the ciphertext carried in `msg`.
pub fn recover_ssk(
    key: &X25519KemKey,
    msg: &PkiMessage,
    len: usize,
) -> Result<Zeroizing<Vec<u8>>, CmpError> {
    let info = KemCiphertextInfo::from_message(msg)?;
    if info.kem.oid != known::x25519() {
        return Err(CmpError::UnsupportedAlgorithm(format!("kem {}", info.kem.oid)));
    }
    let tid = msg
        .header
        .transaction_id
        .as_deref()
        .ok_or_else(|| CmpError::InvalidArgs("transactionID required for KEM".into()))?;
    let ss = key.decapsulate(&info.ct)?;
    derive_ssk(&ss, tid, len)
}

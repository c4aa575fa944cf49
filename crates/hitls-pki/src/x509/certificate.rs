//! Core X.509 types and DER/PEM parsing.

use chrono::{DateTime, Utc};
use hitls_types::{HashAlgId, PkiError};
use hitls_utils::asn1::{tags, Decoder, Encoder};
use hitls_utils::oid::{known, Oid};

use super::signing::{verify_signature, SignatureAlgorithm};
use crate::digest::compute_hash;
use crate::encoding::{asn1_err, enc_seq};
use crate::oid_mapping::{dn_short_name_to_oid, oid_to_dn_short_name};

// ---------------------------------------------------------------------------
// Core type definitions
// ---------------------------------------------------------------------------

/// An X.509 certificate.
#[derive(Debug, Clone)]
pub struct Certificate {
    /// DER-encoded certificate data.
    pub raw: Vec<u8>,
    /// Certificate version (typically 3, encoded as 2).
    pub version: u8,
    /// Serial number content octets.
    pub serial_number: Vec<u8>,
    pub issuer: DistinguishedName,
    pub subject: DistinguishedName,
    pub not_before: DateTime<Utc>,
    pub not_after: DateTime<Utc>,
    pub public_key: SubjectPublicKeyInfo,
    pub extensions: Vec<X509Extension>,
    /// Raw TBS certificate bytes (for signature verification).
    pub tbs_raw: Vec<u8>,
    /// Outer signatureAlgorithm.
    pub signature_algorithm: AlgorithmIdentifier,
    pub signature_value: Vec<u8>,
}

/// Two certificates are the same when their encodings are.
impl PartialEq for Certificate {
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}

impl Eq for Certificate {}

/// A distinguished name as an ordered list of (attribute, value) pairs.
/// An empty list is the NULL-DN.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DistinguishedName {
    pub entries: Vec<(String, String)>,
}

/// AlgorithmIdentifier with parameters kept as a complete DER element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlgorithmIdentifier {
    pub oid: Oid,
    pub params: Option<Vec<u8>>,
}

/// Subject public key info.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubjectPublicKeyInfo {
    pub algorithm: AlgorithmIdentifier,
    pub public_key: Vec<u8>,
}

/// An X.509 extension.
#[derive(Debug, Clone)]
pub struct X509Extension {
    pub oid: Oid,
    pub critical: bool,
    pub value: Vec<u8>,
}

// ---------------------------------------------------------------------------
// Distinguished Name
// ---------------------------------------------------------------------------

impl std::fmt::Display for DistinguishedName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let parts: Vec<String> = self
            .entries
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect();
        write!(f, "{}", parts.join(", "))
    }
}

impl DistinguishedName {
    /// Build from `(attribute, value)` pairs, e.g. `[("CN", "leaf")]`.
    pub fn new(entries: &[(&str, &str)]) -> Self {
        Self {
            entries: entries
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }

    /// Parse the OpenSSL one-line form `/CN=leaf/O=Example`.
    pub fn parse_slashed(s: &str) -> Result<Self, PkiError> {
        let mut entries = Vec::new();
        for part in s.split('/').filter(|p| !p.is_empty()) {
            let (k, v) = part
                .split_once('=')
                .ok_or_else(|| PkiError::InvalidCert(format!("bad name component: {part}")))?;
            if dn_short_name_to_oid(k).is_none() {
                return Err(PkiError::InvalidCert(format!("unknown attribute: {k}")));
            }
            entries.push((k.to_string(), v.to_string()));
        }
        Ok(Self { entries })
    }

    /// Get the value for a given attribute short name (e.g., "CN").
    pub fn get(&self, attr: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == attr)
            .map(|(_, v)| v.as_str())
    }

    /// True for the NULL-DN.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Encode as a Name (SEQUENCE OF single-valued RDNs).
    pub fn to_der(&self) -> Vec<u8> {
        let mut rdns = Encoder::new();
        for (attr, value) in &self.entries {
            // Unknown short names never get past `parse_slashed`; a name
            // built by hand with one falls back to CN.
            let oid = dn_short_name_to_oid(attr).unwrap_or_else(known::common_name);
            rdns.write_nested(tags::SET, |set| {
                set.write_nested(tags::SEQUENCE, |atav| {
                    atav.write_oid(&oid.to_der_value());
                    if attr == "C" {
                        atav.write_printable_string(value);
                    } else {
                        atav.write_utf8_string(value);
                    }
                });
            });
        }
        enc_seq(&rdns.finish())
    }

    pub fn from_der(data: &[u8]) -> Result<Self, PkiError> {
        let mut dec = Decoder::new(data);
        let dn = parse_name(&mut dec)?;
        dec.finish().map_err(asn1_err)?;
        Ok(dn)
    }
}

pub(crate) fn parse_name(dec: &mut Decoder) -> Result<DistinguishedName, PkiError> {
    let mut name_dec = dec.read_sequence().map_err(asn1_err)?;
    let mut entries = Vec::new();
    while !name_dec.is_empty() {
        let mut rdn_dec = name_dec.read_set().map_err(asn1_err)?;
        while !rdn_dec.is_empty() {
            let mut atav_dec = rdn_dec.read_sequence().map_err(asn1_err)?;
            let oid = Oid::from_der_value(atav_dec.read_oid().map_err(asn1_err)?)
                .map_err(asn1_err)?;
            let attr_name = oid_to_dn_short_name(&oid)
                .map(|s| s.to_string())
                .unwrap_or_else(|| oid.to_dot_string());
            let value = atav_dec.read_string().map_err(asn1_err)?;
            entries.push((attr_name, value));
        }
    }
    Ok(DistinguishedName { entries })
}

// ---------------------------------------------------------------------------
// AlgorithmIdentifier / SubjectPublicKeyInfo
// ---------------------------------------------------------------------------

impl AlgorithmIdentifier {
    /// An identifier without parameters.
    pub fn new(oid: Oid) -> Self {
        Self { oid, params: None }
    }

    pub fn with_params(oid: Oid, params: Vec<u8>) -> Self {
        Self {
            oid,
            params: Some(params),
        }
    }

    pub fn to_der(&self) -> Vec<u8> {
        let mut enc = Encoder::new();
        enc.write_nested(tags::SEQUENCE, |seq| {
            seq.write_oid(&self.oid.to_der_value());
            if let Some(p) = &self.params {
                seq.write_raw(p);
            }
        });
        enc.finish()
    }

    /// Read an AlgorithmIdentifier. An explicit NULL parameter is kept.
    pub fn from_decoder(dec: &mut Decoder) -> Result<Self, PkiError> {
        let mut alg_dec = dec.read_sequence().map_err(asn1_err)?;
        let oid = Oid::from_der_value(alg_dec.read_oid().map_err(asn1_err)?).map_err(asn1_err)?;
        let params = if alg_dec.is_empty() {
            None
        } else {
            Some(alg_dec.read_raw_tlv().map_err(asn1_err)?.to_vec())
        };
        alg_dec.finish().map_err(asn1_err)?;
        Ok(Self { oid, params })
    }
}

impl SubjectPublicKeyInfo {
    pub fn to_der(&self) -> Vec<u8> {
        let mut inner = Encoder::new();
        inner.write_raw(&self.algorithm.to_der());
        inner.write_bit_string(0, &self.public_key);
        enc_seq(&inner.finish())
    }

    pub fn from_decoder(dec: &mut Decoder) -> Result<Self, PkiError> {
        let mut spki_dec = dec.read_sequence().map_err(asn1_err)?;
        Self::from_contents(&mut spki_dec)
    }

    /// Parse the SEQUENCE contents; CRMF carries them under an implicit tag.
    pub(crate) fn from_contents(dec: &mut Decoder) -> Result<Self, PkiError> {
        let algorithm = AlgorithmIdentifier::from_decoder(dec)?;
        let (_, key) = dec.read_bit_string().map_err(asn1_err)?;
        Ok(Self {
            algorithm,
            public_key: key.to_vec(),
        })
    }
}

// ---------------------------------------------------------------------------
// Extensions parsing
// ---------------------------------------------------------------------------

fn parse_extensions(ext_data: &[u8]) -> Result<Vec<X509Extension>, PkiError> {
    let mut ext_seq = Decoder::new(ext_data).read_sequence().map_err(asn1_err)?;
    let mut extensions = Vec::new();
    while !ext_seq.is_empty() {
        let mut ext_dec = ext_seq.read_sequence().map_err(asn1_err)?;
        let oid = Oid::from_der_value(ext_dec.read_oid().map_err(asn1_err)?).map_err(asn1_err)?;
        // critical BOOLEAN DEFAULT FALSE
        let critical = match ext_dec.peek_tag() {
            Ok(tag) if tag.is_universal(u32::from(tags::BOOLEAN)) => {
                ext_dec.read_boolean().map_err(asn1_err)?
            }
            _ => false,
        };
        let value = ext_dec.read_octet_string().map_err(asn1_err)?.to_vec();
        extensions.push(X509Extension {
            oid,
            critical,
            value,
        });
    }
    Ok(extensions)
}

// ---------------------------------------------------------------------------
// Certificate implementation
// ---------------------------------------------------------------------------

impl Certificate {
    /// Parse a certificate from DER-encoded bytes.
    pub fn from_der(data: &[u8]) -> Result<Self, PkiError> {
        let mut top = Decoder::new(data);
        let mut outer = top.read_sequence().map_err(asn1_err)?;
        top.finish().map_err(asn1_err)?;

        let tbs_tlv = outer.read_tlv().map_err(asn1_err)?;
        let tbs_raw = tbs_tlv.raw.to_vec();
        let mut tbs_dec = Decoder::new(tbs_tlv.value);

        // version [0] EXPLICIT INTEGER DEFAULT v1
        let version = match tbs_dec.try_read_explicit(0).map_err(asn1_err)? {
            Some(mut v_dec) => v_dec.read_i64().map_err(asn1_err)? as u8 + 1,
            None => 1,
        };

        let serial_number = tbs_dec.read_integer().map_err(asn1_err)?.to_vec();
        // inner signature, must equal the outer one
        let inner_sig = AlgorithmIdentifier::from_decoder(&mut tbs_dec)?;
        let issuer = parse_name(&mut tbs_dec)?;

        let mut validity = tbs_dec.read_sequence().map_err(asn1_err)?;
        let not_before = validity.read_time().map_err(asn1_err)?;
        let not_after = validity.read_time().map_err(asn1_err)?;

        let subject = parse_name(&mut tbs_dec)?;
        let public_key = SubjectPublicKeyInfo::from_decoder(&mut tbs_dec)?;

        // issuerUniqueID [1], subjectUniqueID [2]: skipped
        tbs_dec
            .try_read_context_specific(1, false)
            .map_err(asn1_err)?;
        tbs_dec
            .try_read_context_specific(2, false)
            .map_err(asn1_err)?;

        let extensions = match tbs_dec.try_read_context_specific(3, true).map_err(asn1_err)? {
            Some(ext_tlv) => parse_extensions(ext_tlv.value)?,
            None => Vec::new(),
        };

        let signature_algorithm = AlgorithmIdentifier::from_decoder(&mut outer)?;
        if signature_algorithm != inner_sig {
            return Err(PkiError::InvalidCert(
                "signature algorithm mismatch between TBS and outer".into(),
            ));
        }
        let (_, sig_bytes) = outer.read_bit_string().map_err(asn1_err)?;

        Ok(Certificate {
            raw: data.to_vec(),
            version,
            serial_number,
            issuer,
            subject,
            not_before,
            not_after,
            public_key,
            extensions,
            tbs_raw,
            signature_algorithm,
            signature_value: sig_bytes.to_vec(),
        })
    }

    /// Parse the first CERTIFICATE block of a PEM string.
    pub fn from_pem(pem: &str) -> Result<Self, PkiError> {
        Self::from_pem_all(pem)?
            .into_iter()
            .next()
            .ok_or_else(|| PkiError::InvalidCert("no CERTIFICATE block found".into()))
    }

    /// Parse every CERTIFICATE block of a PEM string, in order.
    pub fn from_pem_all(pem: &str) -> Result<Vec<Self>, PkiError> {
        hitls_utils::pem::parse_label(pem, "CERTIFICATE")
            .map_err(asn1_err)?
            .iter()
            .map(|der| Self::from_der(der))
            .collect()
    }

    pub fn to_der(&self) -> Vec<u8> {
        self.raw.clone()
    }

    pub fn to_pem(&self) -> String {
        hitls_utils::pem::encode("CERTIFICATE", &self.raw)
    }

    /// Find an extension by OID.
    pub fn extension(&self, oid: &Oid) -> Option<&X509Extension> {
        self.extensions.iter().find(|e| e.oid == *oid)
    }

    /// The subjectKeyIdentifier extension value, if present.
    pub fn subject_key_id(&self) -> Option<Vec<u8>> {
        let ext = self.extension(&known::subject_key_identifier())?;
        Decoder::new(&ext.value)
            .read_octet_string()
            .ok()
            .map(|v| v.to_vec())
    }

    /// keyIdentifier of the authorityKeyIdentifier extension, if present.
    pub fn authority_key_id(&self) -> Option<Vec<u8>> {
        let ext = self.extension(&known::authority_key_identifier())?;
        let mut seq = Decoder::new(&ext.value).read_sequence().ok()?;
        seq.try_read_context_specific(0, false)
            .ok()
            .flatten()
            .map(|tlv| tlv.value.to_vec())
    }

    /// The signature algorithm, when supported.
    pub fn signature_alg(&self) -> Result<SignatureAlgorithm, PkiError> {
        SignatureAlgorithm::from_oid(&self.signature_algorithm.oid).ok_or_else(|| {
            PkiError::UnsupportedAlgorithm(self.signature_algorithm.oid.to_dot_string())
        })
    }

    /// Verify the certificate signature against an issuer's public key.
    pub fn verify_signature(&self, issuer: &Certificate) -> Result<bool, PkiError> {
        verify_signature(
            &issuer.public_key,
            self.signature_alg()?,
            &self.tbs_raw,
            &self.signature_value,
        )
    }

    /// Issuer equals subject, and the key identifiers agree when both are
    /// present. The signature itself is not checked.
    pub fn is_self_signed(&self) -> bool {
        if self.issuer != self.subject {
            return false;
        }
        match (self.authority_key_id(), self.subject_key_id()) {
            (Some(akid), Some(skid)) => akid == skid,
            _ => true,
        }
    }

    /// Digest over the whole certificate using the hash of its signature
    /// algorithm: SHA-512 for Ed25519, SHA-256 when the algorithm has no
    /// usable digest.
    pub fn digest_sig(&self) -> Vec<u8> {
        let alg = match self.signature_alg() {
            Ok(SignatureAlgorithm::Ed25519) => HashAlgId::Sha512,
            Ok(sig) => sig.digest().unwrap_or(HashAlgId::Sha256),
            Err(_) => HashAlgId::Sha256,
        };
        compute_hash(alg, &self.raw)
    }
}

#[cfg(test)]
mod tests {
    use super::super::{CertificateBuilder, SigningKey};
    use super::*;

    fn issue(cn: &str) -> (SigningKey, Certificate) {
        let key = SigningKey::generate_ed25519().unwrap();
        let cert = CertificateBuilder::self_signed(DistinguishedName::new(&[("CN", cn)]), &key)
            .unwrap();
        (key, cert)
    }

    #[test]
    fn test_parse_built_certificate() {
        let (key, cert) = issue("root");
        assert_eq!(cert.version, 3);
        assert_eq!(cert.subject.get("CN"), Some("root"));
        assert!(cert.is_self_signed());
        assert!(cert.subject_key_id().is_some());
        assert_eq!(cert.public_key, key.public_key_info());
        assert!(cert.verify_signature(&cert).unwrap());
        assert!(cert.not_before < cert.not_after);
    }

    #[test]
    fn test_digest_sig_uses_sha512_for_ed25519() {
        let (_, cert) = issue("root");
        assert_eq!(cert.digest_sig(), compute_hash(HashAlgId::Sha512, &cert.raw));
    }

    #[test]
    fn test_digest_sig_ecdsa() {
        let key = SigningKey::generate_p256().unwrap();
        let cert =
            CertificateBuilder::self_signed(DistinguishedName::new(&[("CN", "ec")]), &key).unwrap();
        assert_eq!(cert.digest_sig().len(), 32);
        assert!(cert.verify_signature(&cert).unwrap());
    }

    #[test]
    fn test_pem_roundtrip_many() {
        let (_, a) = issue("a");
        let (_, b) = issue("b");
        let pem = format!("{}{}", a.to_pem(), b.to_pem());
        let certs = Certificate::from_pem_all(&pem).unwrap();
        assert_eq!(certs, vec![a.clone(), b]);
        assert_eq!(Certificate::from_pem(&pem).unwrap(), a);
    }

    #[test]
    fn test_trailing_garbage_rejected() {
        let (_, cert) = issue("root");
        let mut der = cert.raw.clone();
        der.push(0x00);
        assert!(Certificate::from_der(&der).is_err());
    }

    #[test]
    fn test_dn_der_roundtrip_and_null_dn() {
        let dn = DistinguishedName::parse_slashed("/CN=leaf/O=Example/C=DE").unwrap();
        assert_eq!(DistinguishedName::from_der(&dn.to_der()).unwrap(), dn);
        let null = DistinguishedName::default();
        assert!(null.is_empty());
        assert_eq!(null.to_der(), vec![0x30, 0x00]);
        assert!(DistinguishedName::parse_slashed("/XX=1").is_err());
    }
}

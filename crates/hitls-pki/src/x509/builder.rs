//! `CertificateBuilder` for X.509 v3 certificates.

use chrono::{DateTime, Duration, Utc};
use hitls_types::{CryptoError, HashAlgId, PkiError};
use hitls_utils::asn1::{tags, Encoder};
use hitls_utils::oid::{known, Oid};

use super::certificate::{Certificate, DistinguishedName, SubjectPublicKeyInfo, X509Extension};
use super::signing::SigningKey;
use crate::digest::compute_hash;
use crate::encoding::{enc_octet, enc_seq};

/// Builder for creating X.509 v3 certificates.
pub struct CertificateBuilder {
    serial_number: Vec<u8>,
    issuer: DistinguishedName,
    subject: DistinguishedName,
    not_before: DateTime<Utc>,
    not_after: DateTime<Utc>,
    subject_public_key: Option<SubjectPublicKeyInfo>,
    extensions: Vec<X509Extension>,
}

impl CertificateBuilder {
    /// A builder valid from now for one year.
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            serial_number: vec![0x01],
            issuer: DistinguishedName::default(),
            subject: DistinguishedName::default(),
            not_before: now,
            not_after: now + Duration::days(365),
            subject_public_key: None,
            extensions: Vec::new(),
        }
    }

    pub fn serial_number(mut self, serial: &[u8]) -> Self {
        self.serial_number = serial.to_vec();
        self
    }

    pub fn issuer(mut self, dn: DistinguishedName) -> Self {
        self.issuer = dn;
        self
    }

    pub fn subject(mut self, dn: DistinguishedName) -> Self {
        self.subject = dn;
        self
    }

    pub fn validity(mut self, not_before: DateTime<Utc>, not_after: DateTime<Utc>) -> Self {
        self.not_before = not_before;
        self.not_after = not_after;
        self
    }

    pub fn subject_public_key(mut self, spki: SubjectPublicKeyInfo) -> Self {
        self.subject_public_key = Some(spki);
        self
    }

    /// Add a raw extension.
    pub fn add_extension(mut self, oid: Oid, critical: bool, value: Vec<u8>) -> Self {
        self.extensions.push(X509Extension {
            oid,
            critical,
            value,
        });
        self
    }

    /// Add a critical BasicConstraints extension.
    pub fn add_basic_constraints(self, is_ca: bool) -> Self {
        let mut inner = Encoder::new();
        if is_ca {
            inner.write_boolean(true);
        }
        let value = enc_seq(&inner.finish());
        self.add_extension(known::basic_constraints(), true, value)
    }

    /// Add a SubjectKeyIdentifier extension.
    pub fn add_subject_key_identifier(self, key_id: &[u8]) -> Self {
        let value = enc_octet(key_id);
        self.add_extension(known::subject_key_identifier(), false, value)
    }

    /// Add an AuthorityKeyIdentifier extension carrying only keyIdentifier.
    pub fn add_authority_key_identifier(self, key_id: &[u8]) -> Self {
        let mut inner = Encoder::new();
        inner.write_context_specific(0, false, key_id);
        let value = enc_seq(&inner.finish());
        self.add_extension(known::authority_key_identifier(), false, value)
    }

    /// Build the certificate, signing with the issuer's key and its default
    /// digest.
    pub fn build(self, signing_key: &SigningKey) -> Result<Certificate, PkiError> {
        let spki = self
            .subject_public_key
            .ok_or_else(|| PkiError::InvalidCert("subject public key not set".into()))?;
        let sig_alg = signing_key.signature_algorithm(signing_key.default_digest())?;
        let alg_id = sig_alg.algorithm_identifier().to_der();

        let mut tbs = Encoder::new();
        tbs.write_nested(tags::SEQUENCE, |t| {
            // version [0] EXPLICIT v3
            t.write_explicit(0, &[0x02, 0x01, 0x02]);
            t.write_integer(&self.serial_number);
            t.write_raw(&alg_id);
            t.write_raw(&self.issuer.to_der());
            t.write_nested(tags::SEQUENCE, |v| {
                v.write_time(&self.not_before);
                v.write_time(&self.not_after);
            });
            t.write_raw(&self.subject.to_der());
            t.write_raw(&spki.to_der());
            if !self.extensions.is_empty() {
                let mut exts = Encoder::new();
                for ext in &self.extensions {
                    exts.write_nested(tags::SEQUENCE, |e| {
                        e.write_oid(&ext.oid.to_der_value());
                        if ext.critical {
                            e.write_boolean(true);
                        }
                        e.write_octet_string(&ext.value);
                    });
                }
                t.write_explicit(3, &enc_seq(&exts.finish()));
            }
        });
        let tbs_raw = tbs.finish();
        let signature = signing_key.sign(sig_alg, &tbs_raw)?;

        let mut outer = Encoder::new();
        outer.write_nested(tags::SEQUENCE, |c| {
            c.write_raw(&tbs_raw);
            c.write_raw(&alg_id);
            c.write_bit_string(0, &signature);
        });
        // Re-parse so every field is populated the same way as for
        // certificates read from the wire.
        Certificate::from_der(&outer.finish())
    }

    /// Self-signed CA certificate with SKI and AKI derived from the key.
    pub fn self_signed(
        subject: DistinguishedName,
        signing_key: &SigningKey,
    ) -> Result<Certificate, PkiError> {
        let spki = signing_key.public_key_info();
        let key_id = key_identifier(&spki);
        CertificateBuilder::new()
            .serial_number(&random_serial()?)
            .issuer(subject.clone())
            .subject(subject)
            .subject_public_key(spki)
            .add_basic_constraints(true)
            .add_subject_key_identifier(&key_id)
            .add_authority_key_identifier(&key_id)
            .build(signing_key)
    }

    /// Certificate for `subject_key` issued by `issuer`.
    pub fn issued_by(
        subject: DistinguishedName,
        subject_key: &SubjectPublicKeyInfo,
        is_ca: bool,
        issuer: &Certificate,
        issuer_key: &SigningKey,
    ) -> Result<Certificate, PkiError> {
        let mut builder = CertificateBuilder::new()
            .serial_number(&random_serial()?)
            .issuer(issuer.subject.clone())
            .subject(subject)
            .subject_public_key(subject_key.clone())
            .add_basic_constraints(is_ca)
            .add_subject_key_identifier(&key_identifier(subject_key));
        if let Some(akid) = issuer.subject_key_id() {
            builder = builder.add_authority_key_identifier(&akid);
        }
        builder.build(issuer_key)
    }
}

impl Default for CertificateBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// RFC 5280 method 1: SHA-1 over the subjectPublicKey bits.
pub(crate) fn key_identifier(spki: &SubjectPublicKeyInfo) -> Vec<u8> {
    compute_hash(HashAlgId::Sha1, &spki.public_key)
}

fn random_serial() -> Result<[u8; 16], PkiError> {
    let mut serial = [0u8; 16];
    getrandom::getrandom(&mut serial).map_err(|_| CryptoError::DrbgEntropyFail)?;
    // positive, and no leading zero octet to trim
    serial[0] = (serial[0] & 0x7F) | 0x01;
    Ok(serial)
}

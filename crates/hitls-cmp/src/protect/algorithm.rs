//! Protection algorithm identifiers and selection.

use hitls_pki::crmf::PbmParameter;
use hitls_pki::x509::{AlgorithmIdentifier, SignatureAlgorithm};
use hitls_types::{CmpError, CryptoError, PkiError};
use hitls_utils::oid::known;
use tracing::debug;

use crate::ctx::{KemMode, ProtectionContext};
use crate::kem::KemBmParameter;
use crate::msg::{PkiMessage, PVNO_CMP2021};

/// A parsed protectionAlg.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtectionAlgorithm {
    PasswordMac(PbmParameter),
    KemMac(KemBmParameter),
    Signature(SignatureAlgorithm),
}

/// Outcome of protection selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Protection {
    Unprotected,
    Protected(ProtectionAlgorithm),
}

fn pbm_error(e: PkiError) -> CmpError {
    match e {
        PkiError::CryptoError(CryptoError::InvalidIterationCount(n)) => {
            CmpError::BadIterationCount(n)
        }
        PkiError::UnsupportedAlgorithm(what) => CmpError::UnsupportedAlgorithm(what),
        other => CmpError::MalformedAlgorithmParameters(other.to_string()),
    }
}

impl ProtectionAlgorithm {
    pub fn algorithm_identifier(&self) -> AlgorithmIdentifier {
        match self {
            ProtectionAlgorithm::PasswordMac(p) => {
                AlgorithmIdentifier::with_params(known::password_based_mac(), p.to_der())
            }
            ProtectionAlgorithm::KemMac(p) => {
                AlgorithmIdentifier::with_params(known::kem_based_mac(), p.to_der())
            }
            ProtectionAlgorithm::Signature(sig) => sig.algorithm_identifier(),
        }
    }

    pub fn from_algorithm_identifier(alg: &AlgorithmIdentifier) -> Result<Self, CmpError> {
        if alg.oid == known::password_based_mac() {
            let params = alg.params.as_deref().ok_or_else(|| {
                CmpError::MalformedAlgorithmParameters("PBM without parameters".into())
            })?;
            return PbmParameter::from_der(params)
                .map(ProtectionAlgorithm::PasswordMac)
                .map_err(pbm_error);
        }
        if alg.oid == known::kem_based_mac() {
            let params = alg.params.as_deref().ok_or_else(|| {
                CmpError::MalformedAlgorithmParameters("KEM-MAC without parameters".into())
            })?;
            return KemBmParameter::from_der(params).map(ProtectionAlgorithm::KemMac);
        }
        SignatureAlgorithm::from_oid(&alg.oid)
            .map(ProtectionAlgorithm::Signature)
            .ok_or_else(|| CmpError::UnsupportedAlgorithm(alg.oid.to_dot_string()))
    }
}

/// senderKID := `id`, else the reference value, else unchanged.
pub(crate) fn set_sender_kid(ctx: &ProtectionContext, msg: &mut PkiMessage, id: Option<&[u8]>) {
    if let Some(kid) = id.or(ctx.reference_value.as_deref()) {
        msg.header.sender_kid = Some(kid.to_vec());
    }
}

/// Pick the protection for `msg` and write protectionAlg and senderKID.
///
/// Checked in order: unprotected send (or our KEM key still in flight),
/// shared secret, established KEM secret, signer certificate and key.
pub fn select_protection(
    ctx: &ProtectionContext,
    msg: &mut PkiMessage,
) -> Result<Protection, CmpError> {
    if ctx.unprotected_send || ctx.kem_mode == KemMode::UsingClientKemKey {
        set_sender_kid(ctx, msg, None);
        return Ok(Protection::Unprotected);
    }

    let alg = if ctx.secret_value.is_some() {
        let pbm = PbmParameter::new(
            ctx.pbm_salt_len,
            ctx.pbm_owf,
            ctx.pbm_iterations,
            ctx.pbm_mac,
        )
        .map_err(pbm_error)?;
        set_sender_kid(ctx, msg, None);
        ProtectionAlgorithm::PasswordMac(pbm)
    } else if ctx.ssk.is_some() && ctx.kem_mode == KemMode::EstablishedUsingClient {
        let len = u32::try_from(ctx.ssk_len)
            .map_err(|_| CmpError::InvalidArgs(format!("ssk length {}", ctx.ssk_len)))?;
        msg.header.pvno = PVNO_CMP2021;
        set_sender_kid(ctx, msg, None);
        ProtectionAlgorithm::KemMac(KemBmParameter {
            len,
            mac: ctx.kem_mac,
        })
    } else if let (Some(cert), Some(pkey)) = (&ctx.cert, &ctx.pkey) {
        if !pkey.matches_certificate(cert) {
            return Err(CmpError::CertKeyMismatch);
        }
        let sig = pkey
            .signature_algorithm(Some(ctx.digest))
            .map_err(|e| CmpError::UnsupportedAlgorithm(e.to_string()))?;
        set_sender_kid(ctx, msg, cert.subject_key_id().as_deref());
        ProtectionAlgorithm::Signature(sig)
    } else {
        return Err(CmpError::MissingCredentials);
    };

    debug!(algorithm = %alg.algorithm_identifier().oid, "selected message protection");
    msg.header.protection_alg = Some(alg.algorithm_identifier());
    Ok(Protection::Protected(alg))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::msg::{GeneralName, PkiBody, PkiHeader};
    use hitls_pki::x509::{CertificateBuilder, DistinguishedName, SigningKey};
    use hitls_types::{HashAlgId, MacAlgId};

    fn msg() -> PkiMessage {
        PkiMessage::new(
            PkiHeader::new(GeneralName::null_dn(), GeneralName::null_dn()),
            PkiBody::PkiConf,
        )
    }

    #[test]
    fn test_unprotected_send_uses_reference() {
        let mut ctx = ProtectionContext::new();
        ctx.set_unprotected_send(true)
            .set_reference_value(b"ref")
            .set_secret_value(b"ignored");
        let mut m = msg();
        assert_eq!(select_protection(&ctx, &mut m).unwrap(), Protection::Unprotected);
        assert_eq!(m.header.sender_kid.as_deref(), Some(&b"ref"[..]));
        assert!(m.header.protection_alg.is_none());
    }

    #[test]
    fn test_secret_beats_signature() {
        let key = SigningKey::generate_ed25519().unwrap();
        let cert =
            CertificateBuilder::self_signed(DistinguishedName::new(&[("CN", "a")]), &key).unwrap();
        let mut ctx = ProtectionContext::new();
        ctx.set_secret_value(b"pass").set_cert(cert).set_pkey(key);
        let mut m = msg();
        let sel = select_protection(&ctx, &mut m).unwrap();
        assert!(matches!(
            sel,
            Protection::Protected(ProtectionAlgorithm::PasswordMac(_))
        ));
        // no reference value: senderKID stays unset
        assert!(m.header.sender_kid.is_none());
        assert_eq!(
            m.header.protection_alg.as_ref().unwrap().oid,
            known::password_based_mac()
        );
    }

    #[test]
    fn test_kem_mac_bumps_pvno() {
        let mut ctx = ProtectionContext::new();
        ctx.set_ssk(&[1; 32])
            .set_kem_mode(KemMode::EstablishedUsingClient)
            .set_kem_mac(MacAlgId::HmacSha512);
        let mut m = msg();
        let sel = select_protection(&ctx, &mut m).unwrap();
        assert_eq!(
            sel,
            Protection::Protected(ProtectionAlgorithm::KemMac(KemBmParameter {
                len: 32,
                mac: MacAlgId::HmacSha512
            }))
        );
        assert_eq!(m.header.pvno, PVNO_CMP2021);
    }

    #[test]
    fn test_ssk_needs_established_mode() {
        let mut ctx = ProtectionContext::new();
        ctx.set_ssk(&[1; 32]);
        assert!(matches!(
            select_protection(&ctx, &mut msg()),
            Err(CmpError::MissingCredentials)
        ));
    }

    #[test]
    fn test_signature_sender_kid_is_ski() {
        let key = SigningKey::generate_p256().unwrap();
        let cert =
            CertificateBuilder::self_signed(DistinguishedName::new(&[("CN", "a")]), &key).unwrap();
        let ski = cert.subject_key_id().unwrap();
        let mut ctx = ProtectionContext::new();
        ctx.set_cert(cert)
            .set_pkey(key)
            .set_digest(HashAlgId::Sha384)
            .set_reference_value(b"ref");
        let mut m = msg();
        let sel = select_protection(&ctx, &mut m).unwrap();
        assert_eq!(
            sel,
            Protection::Protected(ProtectionAlgorithm::Signature(
                SignatureAlgorithm::EcdsaWithSha384
            ))
        );
        assert_eq!(m.header.sender_kid, Some(ski));
    }

    #[test]
    fn test_cert_key_mismatch() {
        let key = SigningKey::generate_ed25519().unwrap();
        let other = SigningKey::generate_ed25519().unwrap();
        let cert =
            CertificateBuilder::self_signed(DistinguishedName::new(&[("CN", "a")]), &key).unwrap();
        let mut ctx = ProtectionContext::new();
        ctx.set_cert(cert).set_pkey(other);
        assert!(matches!(
            select_protection(&ctx, &mut msg()),
            Err(CmpError::CertKeyMismatch)
        ));
    }

    #[test]
    fn test_identifier_parse_errors() {
        let no_params = AlgorithmIdentifier::new(known::password_based_mac());
        assert!(matches!(
            ProtectionAlgorithm::from_algorithm_identifier(&no_params),
            Err(CmpError::MalformedAlgorithmParameters(_))
        ));
        let unknown = AlgorithmIdentifier::new(known::sha256());
        assert!(matches!(
            ProtectionAlgorithm::from_algorithm_identifier(&unknown),
            Err(CmpError::UnsupportedAlgorithm(_))
        ));
        let mut low = PbmParameter::new(16, HashAlgId::Sha256, 100, MacAlgId::HmacSha1).unwrap();
        low.iteration_count = 5;
        let alg = AlgorithmIdentifier::with_params(known::password_based_mac(), low.to_der());
        assert!(matches!(
            ProtectionAlgorithm::from_algorithm_identifier(&alg),
            Err(CmpError::BadIterationCount(5))
        ));
    }
}

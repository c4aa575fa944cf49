//! Computing and checking the protection value.

use hitls_pki::digest::{hmac, tags_equal};
use hitls_pki::x509::{verify_signature, Certificate, SignatureAlgorithm};
use hitls_types::{CmpError, PkiError};
use hitls_utils::oid::known;
use tracing::debug;
use zeroize::Zeroizing;

use super::algorithm::ProtectionAlgorithm;
use crate::ctx::{KemMode, ProtectionContext};
use crate::kem;
use crate::msg::PkiMessage;

fn parsed_algorithm(msg: &PkiMessage) -> Result<ProtectionAlgorithm, CmpError> {
    let alg = msg
        .header
        .protection_alg
        .as_ref()
        .ok_or(CmpError::UnknownAlgorithmId)?;
    ProtectionAlgorithm::from_algorithm_identifier(alg)
}

fn signing_error(e: PkiError) -> CmpError {
    match e {
        PkiError::UnsupportedAlgorithm(what) => CmpError::UnsupportedAlgorithm(what),
        other => CmpError::Pki(other),
    }
}

/// Compute the protection of `msg` under the algorithm already named in its
/// header. The message itself is not modified.
pub fn compute_protection(ctx: &ProtectionContext, msg: &PkiMessage) -> Result<Vec<u8>, CmpError> {
    let alg = parsed_algorithm(msg)?;
    let part = msg.protected_part_der()?;
    match alg {
        ProtectionAlgorithm::PasswordMac(pbm) => {
            let secret = ctx.secret_value.as_ref().ok_or(CmpError::MissingSecret)?;
            Ok(pbm.mac(secret, &part)?)
        }
        ProtectionAlgorithm::KemMac(param) => {
            let ssk = ctx.ssk.as_ref().ok_or(CmpError::MissingSecret)?;
            Ok(hmac(param.mac, ssk, &part)?)
        }
        ProtectionAlgorithm::Signature(sig) => {
            let key = ctx.pkey.as_ref().ok_or(CmpError::MissingKey)?;
            key.sign(sig, &part).map_err(signing_error)
        }
    }
}

/// `ssk` for checking a KEM-MAC: recovered from the message's ciphertext
/// when we hold a KEM key, else the one already in the context.
fn kem_ssk(
    ctx: &mut ProtectionContext,
    msg: &PkiMessage,
    len: usize,
) -> Result<Zeroizing<Vec<u8>>, CmpError> {
    let carries_ct = msg
        .header
        .general_info(&known::it_kem_ciphertext_info())
        .is_some();
    if let (true, Some(key)) = (carries_ct, &ctx.kem_key) {
        let ssk = kem::recover_ssk(key, msg, len)?;
        ctx.ssk = Some(ssk.clone());
        ctx.kem_mode = KemMode::EstablishedUsingClient;
        return Ok(ssk);
    }
    ctx.ssk.clone().ok_or(CmpError::MissingSecret)
}

fn signer_verifies(
    cert: &Certificate,
    sig: SignatureAlgorithm,
    part: &[u8],
    protection: &[u8],
) -> bool {
    matches!(
        verify_signature(&cert.public_key, sig, part, protection),
        Ok(true)
    )
}

/// Check the protection of a received message.
///
/// MACs are recomputed and compared in constant time. Signatures are
/// checked against the trusted sender certificate, then against each
/// extraCert in order. A KEM secret recovered from the message stays in
/// `ctx` for protecting the reply.
pub fn verify_protection(ctx: &mut ProtectionContext, msg: &PkiMessage) -> Result<(), CmpError> {
    let protection = msg
        .protection
        .as_deref()
        .ok_or(CmpError::MissingProtection)?;
    if msg.header.protection_alg.is_none() {
        return Err(CmpError::MissingProtection);
    }
    let alg = parsed_algorithm(msg)?;
    let part = msg.protected_part_der()?;

    let ok = match alg {
        ProtectionAlgorithm::PasswordMac(pbm) => {
            let secret = ctx.secret_value.as_ref().ok_or(CmpError::MissingSecret)?;
            tags_equal(&pbm.mac(secret, &part)?, protection)
        }
        ProtectionAlgorithm::KemMac(param) => {
            let ssk = kem_ssk(ctx, msg, param.len as usize)?;
            tags_equal(&hmac(param.mac, &ssk, &part)?, protection)
        }
        ProtectionAlgorithm::Signature(sig) => ctx
            .trusted_sender
            .iter()
            .chain(msg.extra_certs.iter().flatten())
            .any(|cert| signer_verifies(cert, sig, &part, protection)),
    };
    if ok {
        debug!(body = %msg.body_type(), "message protection verified");
        Ok(())
    } else {
        Err(CmpError::ProtectionMismatch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::msg::{GeneralName, PkiBody, PkiHeader};
    use crate::protect::select_protection;
    use hitls_pki::x509::AlgorithmIdentifier;

    fn msg() -> PkiMessage {
        let mut header = PkiHeader::new(GeneralName::null_dn(), GeneralName::null_dn());
        header.transaction_id = Some(vec![1; 16]);
        PkiMessage::new(header, PkiBody::PkiConf)
    }

    #[test]
    fn test_missing_algorithm() {
        let ctx = ProtectionContext::new();
        assert!(matches!(
            compute_protection(&ctx, &msg()),
            Err(CmpError::UnknownAlgorithmId)
        ));
    }

    #[test]
    fn test_pbm_missing_secret() {
        let mut ctx = ProtectionContext::new();
        ctx.set_secret_value(b"s");
        let mut m = msg();
        select_protection(&ctx, &mut m).unwrap();
        ctx.clear_secret_value();
        assert!(matches!(
            compute_protection(&ctx, &m),
            Err(CmpError::MissingSecret)
        ));
    }

    #[test]
    fn test_signature_missing_key() {
        let mut m = msg();
        m.header.protection_alg = Some(AlgorithmIdentifier::new(known::ed25519()));
        assert!(matches!(
            compute_protection(&ProtectionContext::new(), &m),
            Err(CmpError::MissingKey)
        ));
    }

    #[test]
    fn test_signature_key_algorithm_mismatch() {
        let mut ctx = ProtectionContext::new();
        ctx.set_pkey(hitls_pki::x509::SigningKey::generate_ed25519().unwrap());
        let mut m = msg();
        m.header.protection_alg = Some(AlgorithmIdentifier::new(known::ecdsa_with_sha256()));
        assert!(matches!(
            compute_protection(&ctx, &m),
            Err(CmpError::UnsupportedAlgorithm(_))
        ));
    }

    #[test]
    fn test_signing_error_keeps_key_failures() {
        assert!(matches!(
            signing_error(PkiError::UnsupportedAlgorithm("x".into())),
            CmpError::UnsupportedAlgorithm(_)
        ));
        assert!(matches!(
            signing_error(hitls_types::CryptoError::InvalidKey.into()),
            CmpError::Pki(PkiError::CryptoError(hitls_types::CryptoError::InvalidKey))
        ));
    }

    #[test]
    fn test_pbm_is_deterministic_for_fixed_salt() {
        let mut ctx = ProtectionContext::new();
        ctx.set_secret_value(b"insta");
        let mut m = msg();
        select_protection(&ctx, &mut m).unwrap();
        let a = compute_protection(&ctx, &m).unwrap();
        let b = compute_protection(&ctx, &m).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 20);
    }

    #[test]
    fn test_verify_requires_protection() {
        let mut ctx = ProtectionContext::new();
        assert!(matches!(
            verify_protection(&mut ctx, &msg()),
            Err(CmpError::MissingProtection)
        ));
    }

    #[test]
    fn test_kem_mac_with_shared_ssk() {
        let mut client = ProtectionContext::new();
        client
            .set_ssk(&[7; 32])
            .set_kem_mode(KemMode::EstablishedUsingClient);
        let mut m = msg();
        select_protection(&client, &mut m).unwrap();
        m.protection = Some(compute_protection(&client, &m).unwrap());

        let mut server = ProtectionContext::new();
        server.set_ssk(&[7; 32]);
        verify_protection(&mut server, &m).unwrap();

        let mut wrong = ProtectionContext::new();
        wrong.set_ssk(&[8; 32]);
        assert!(matches!(
            verify_protection(&mut wrong, &m),
            Err(CmpError::ProtectionMismatch)
        ));
    }
}

//! Message protection: algorithm selection, protection computation and
//! extraCerts assembly.

mod algorithm;
mod compute;
mod extra_certs;

pub use algorithm::{select_protection, Protection, ProtectionAlgorithm};
pub use compute::{compute_protection, verify_protection};
pub use extra_certs::add_extra_certs;

use hitls_types::CmpError;
use tracing::debug;

use crate::ctx::{KemMode, ProtectionContext};
use crate::kem::{self, KemCiphertextInfo};
use crate::msg::PkiMessage;

/// Encapsulate to the peer's KEM key, derive `ssk` and put the ciphertext
/// into generalInfo. Leaves the context in `EstablishedUsingClient`.
pub fn establish_kem_secret(
    ctx: &mut ProtectionContext,
    msg: &mut PkiMessage,
) -> Result<(), CmpError> {
    let encapsulator = ctx
        .kem_encapsulator
        .as_ref()
        .ok_or(CmpError::MissingCredentials)?;
    let tid = msg
        .header
        .transaction_id
        .as_deref()
        .ok_or_else(|| CmpError::InvalidArgs("transactionID required for KEM".into()))?;
    let out = encapsulator.encapsulate()?;
    let ssk = kem::derive_ssk(&out.shared_secret, tid, ctx.ssk_len)?;
    let info = KemCiphertextInfo {
        kem: encapsulator.algorithm(),
        ct: out.ciphertext,
    };
    let itav = info.to_itav();
    msg.header
        .general_info
        .retain(|i| i.info_type != itav.info_type);
    msg.header.general_info.push(itav);
    ctx.ssk = Some(ssk);
    ctx.kem_mode = KemMode::EstablishedUsingClient;
    debug!("KEM shared secret established");
    Ok(())
}

/// Protect `msg` in place.
///
/// Clears any previous protection, selects the algorithm, sets senderKID
/// and protectionAlg, computes the protection and attaches extraCerts.
/// On error the message is left exactly as it was.
pub fn protect(ctx: &mut ProtectionContext, msg: &mut PkiMessage) -> Result<(), CmpError> {
    let header = msg.header.clone();
    let protection = msg.protection.clone();
    let extra_certs = msg.extra_certs.clone();
    let result = protect_in_place(ctx, msg);
    if result.is_err() {
        msg.header = header;
        msg.protection = protection;
        msg.extra_certs = extra_certs;
    }
    result
}

fn protect_in_place(ctx: &mut ProtectionContext, msg: &mut PkiMessage) -> Result<(), CmpError> {
    msg.header.protection_alg = None;
    msg.protection = None;

    if ctx.kem_mode == KemMode::UsingServerKemKey {
        establish_kem_secret(ctx, msg)?;
    }
    if let Protection::Protected(_) = select_protection(ctx, msg)? {
        msg.protection = Some(compute_protection(ctx, msg)?);
    }
    add_extra_certs(ctx, msg);

    // a NULL-DN sender must at least be identified by senderKID
    if msg.header.sender.is_null_dn() && msg.header.sender_kid.is_none() {
        return Err(CmpError::MissingSenderIdentification);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kem::X25519KemKey;
    use crate::msg::{GeneralName, PkiBody, PkiHeader, PVNO_CMP2021};
    use hitls_pki::x509::{DistinguishedName, SigningKey};
    use hitls_utils::oid::known;

    fn msg(sender: GeneralName) -> PkiMessage {
        let mut header = PkiHeader::new(sender, GeneralName::null_dn());
        header.transaction_id = Some(vec![3; 16]);
        PkiMessage::new(header, PkiBody::PkiConf)
    }

    #[test]
    fn test_null_dn_needs_sender_kid() {
        let mut ctx = ProtectionContext::new();
        ctx.set_secret_value(b"pass");
        let mut m = msg(GeneralName::null_dn());
        let before = m.clone();
        assert!(matches!(
            protect(&mut ctx, &mut m),
            Err(CmpError::MissingSenderIdentification)
        ));
        assert_eq!(m, before);

        ctx.set_reference_value(b"client-1");
        protect(&mut ctx, &mut m).unwrap();
        assert_eq!(m.header.sender_kid.as_deref(), Some(&b"client-1"[..]));
        assert!(m.protection.is_some());
    }

    #[test]
    fn test_failure_keeps_old_protection() {
        let mut ctx = ProtectionContext::new();
        ctx.set_secret_value(b"pass");
        let mut m = msg(DistinguishedName::new(&[("CN", "c")]).into());
        protect(&mut ctx, &mut m).unwrap();
        let protected = m.clone();

        let mut broken = ProtectionContext::new();
        broken.set_pkey(SigningKey::generate_ed25519().unwrap());
        assert!(matches!(
            protect(&mut broken, &mut m),
            Err(CmpError::MissingCredentials)
        ));
        assert_eq!(m, protected);
    }

    #[test]
    fn test_server_kem_key_mode() {
        let server_key = X25519KemKey::generate().unwrap();
        let mut ctx = ProtectionContext::new();
        ctx.set_kem_encapsulator(Box::new(server_key.encapsulator()))
            .set_kem_mode(KemMode::UsingServerKemKey)
            .set_reference_value(b"kid");
        let mut m = msg(GeneralName::null_dn());
        protect(&mut ctx, &mut m).unwrap();

        assert_eq!(ctx.kem_mode(), KemMode::EstablishedUsingClient);
        assert_eq!(m.header.pvno, PVNO_CMP2021);
        assert_eq!(
            m.header.protection_alg.as_ref().unwrap().oid,
            known::kem_based_mac()
        );
        assert!(m.header.general_info(&known::it_kem_ciphertext_info()).is_some());

        let mut server = ProtectionContext::new();
        server.set_kem_key(server_key);
        verify_protection(&mut server, &m).unwrap();
        assert_eq!(server.ssk(), ctx.ssk());
    }

    #[test]
    fn test_client_kem_key_mode_is_unprotected() {
        let mut ctx = ProtectionContext::new();
        ctx.set_kem_mode(KemMode::UsingClientKemKey)
            .set_secret_value(b"pass");
        let mut m = msg(DistinguishedName::new(&[("CN", "c")]).into());
        protect(&mut ctx, &mut m).unwrap();
        assert!(m.protection.is_none());
        assert!(m.header.protection_alg.is_none());
    }

    #[test]
    fn test_kem_without_encapsulator() {
        let mut ctx = ProtectionContext::new();
        ctx.set_kem_mode(KemMode::UsingServerKemKey);
        let mut m = msg(DistinguishedName::new(&[("CN", "c")]).into());
        assert!(matches!(
            protect(&mut ctx, &mut m),
            Err(CmpError::MissingCredentials)
        ));
    }
}

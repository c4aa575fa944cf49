//! extraCerts assembly.

use hitls_pki::x509::{build_chain, Certificate};
use tracing::warn;

use crate::ctx::{KemMode, ProtectionContext};
use crate::msg::PkiMessage;

/// Attach certificates to `msg.extra_certs`.
///
/// With signature protection the signer certificate and as much of its
/// chain as can be built from the untrusted pool go first, self-signed
/// certificates excluded. The configured extra certificates follow.
/// Duplicates are dropped and an empty list is stored as `None`.
pub fn add_extra_certs(ctx: &mut ProtectionContext, msg: &mut PkiMessage) {
    let existing = msg.extra_certs.take().unwrap_or_default();
    let mut out: Vec<Certificate> = Vec::new();

    let signature_based = !ctx.unprotected_send
        && ctx.secret_value.is_none()
        && ctx.kem_mode != KemMode::EstablishedUsingClient;
    if let (true, Some(cert), Some(_)) = (signature_based, &ctx.cert, &ctx.pkey) {
        if ctx.chain.is_none() {
            match build_chain(cert, &ctx.untrusted) {
                Ok(chain) => ctx.chain = Some(chain),
                Err(e) => warn!(error = %e, "could not build chain for own certificate"),
            }
        }
        let own = match &ctx.chain {
            Some(chain) => chain.as_slice(),
            None => std::slice::from_ref(cert),
        };
        for c in own {
            if !c.is_self_signed() && !out.contains(c) && !existing.contains(c) {
                out.push(c.clone());
            }
        }
    }

    out.extend(existing);
    for c in &ctx.extra_certs_out {
        if !out.contains(c) {
            out.push(c.clone());
        }
    }
    msg.extra_certs = if out.is_empty() { None } else { Some(out) };
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::msg::{GeneralName, PkiBody, PkiHeader};
    use hitls_pki::x509::{CertificateBuilder, DistinguishedName, SigningKey};

    struct Pki {
        root: Certificate,
        sub: Certificate,
        leaf: Certificate,
        leaf_key: SigningKey,
    }

    fn pki() -> Pki {
        let root_key = SigningKey::generate_ed25519().unwrap();
        let root =
            CertificateBuilder::self_signed(DistinguishedName::new(&[("CN", "root")]), &root_key)
                .unwrap();
        let sub_key = SigningKey::generate_ed25519().unwrap();
        let sub = CertificateBuilder::issued_by(
            DistinguishedName::new(&[("CN", "sub")]),
            &sub_key.public_key_info(),
            true,
            &root,
            &root_key,
        )
        .unwrap();
        let leaf_key = SigningKey::generate_ed25519().unwrap();
        let leaf = CertificateBuilder::issued_by(
            DistinguishedName::new(&[("CN", "leaf")]),
            &leaf_key.public_key_info(),
            false,
            &sub,
            &sub_key,
        )
        .unwrap();
        Pki {
            root,
            sub,
            leaf,
            leaf_key,
        }
    }

    fn msg() -> PkiMessage {
        PkiMessage::new(
            PkiHeader::new(GeneralName::null_dn(), GeneralName::null_dn()),
            PkiBody::PkiConf,
        )
    }

    #[test]
    fn test_chain_without_self_signed() {
        let p = pki();
        let mut ctx = ProtectionContext::new();
        ctx.set_cert(p.leaf.clone())
            .set_pkey(p.leaf_key)
            .set_untrusted(vec![p.root.clone(), p.sub.clone()]);
        let mut m = msg();
        add_extra_certs(&mut ctx, &mut m);
        assert_eq!(m.extra_certs, Some(vec![p.leaf.clone(), p.sub.clone()]));
        assert_eq!(ctx.chain().map(|c| c.len()), Some(3));
    }

    #[test]
    fn test_extra_certs_out_appended_without_duplicates() {
        let p = pki();
        let mut ctx = ProtectionContext::new();
        ctx.set_cert(p.leaf.clone())
            .set_pkey(p.leaf_key)
            .set_extra_certs_out(vec![p.sub.clone(), p.root.clone()]);
        let mut m = msg();
        add_extra_certs(&mut ctx, &mut m);
        // partial chain is the leaf alone; sub and root come from extra_certs_out
        assert_eq!(m.extra_certs, Some(vec![p.leaf, p.sub, p.root]));
    }

    #[test]
    fn test_mac_protection_skips_own_cert() {
        let p = pki();
        let mut ctx = ProtectionContext::new();
        ctx.set_secret_value(b"pass")
            .set_cert(p.leaf)
            .set_pkey(p.leaf_key);
        let mut m = msg();
        add_extra_certs(&mut ctx, &mut m);
        assert_eq!(m.extra_certs, None);
    }

    #[test]
    fn test_existing_certs_kept_after_chain() {
        let p = pki();
        let mut ctx = ProtectionContext::new();
        ctx.set_cert(p.leaf.clone()).set_pkey(p.leaf_key);
        let mut m = msg();
        m.extra_certs = Some(vec![p.root.clone()]);
        add_extra_certs(&mut ctx, &mut m);
        assert_eq!(m.extra_certs, Some(vec![p.leaf, p.root]));
    }

    #[test]
    fn test_empty_stays_absent() {
        let mut ctx = ProtectionContext::new();
        let mut m = msg();
        m.extra_certs = Some(Vec::new());
        add_extra_certs(&mut ctx, &mut m);
        assert!(m.extra_certs.is_none());
    }
}

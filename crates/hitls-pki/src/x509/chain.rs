//! Best-effort certificate chain building from an untrusted pool.

use hitls_types::PkiError;

use super::Certificate;

/// Chains longer than this are rejected.
pub const MAX_CHAIN_DEPTH: usize = 10;

/// Build the chain for `leaf` as far as `untrusted` allows, leaf first.
///
/// Building stops at a self-signed certificate or when no issuer is found;
/// a partial chain is not an error. An issuer candidate is only accepted
/// when it verifies the signature of the certificate below it. Fails when
/// candidates with a matching subject exist but none verifies, or when the
/// chain would exceed [`MAX_CHAIN_DEPTH`].
pub fn build_chain(
    leaf: &Certificate,
    untrusted: &[Certificate],
) -> Result<Vec<Certificate>, PkiError> {
    let mut chain = vec![leaf.clone()];
    loop {
        let next = {
            let current = &chain[chain.len() - 1];
            if current.is_self_signed() {
                break;
            }
            let mut candidates = untrusted
                .iter()
                .filter(|c| c.subject == current.issuer && !chain.contains(c))
                .peekable();
            if candidates.peek().is_none() {
                break;
            }
            candidates
                .find(|c| current.verify_signature(c).unwrap_or(false))
                .cloned()
                .ok_or_else(|| {
                    PkiError::ChainVerifyFailed(format!(
                        "no issuer candidate verifies {}",
                        current.subject
                    ))
                })?
        };
        if chain.len() >= MAX_CHAIN_DEPTH {
            return Err(PkiError::MaxDepthExceeded(MAX_CHAIN_DEPTH));
        }
        chain.push(next);
    }
    Ok(chain)
}

#[cfg(test)]
mod tests {
    use super::super::{CertificateBuilder, DistinguishedName, SigningKey};
    use super::*;

    struct Pki {
        root: Certificate,
        inter: Certificate,
        leaf: Certificate,
    }

    fn pki() -> Pki {
        let root_key = SigningKey::generate_ed25519().unwrap();
        let root =
            CertificateBuilder::self_signed(DistinguishedName::new(&[("CN", "root")]), &root_key)
                .unwrap();
        let inter_key = SigningKey::generate_ed25519().unwrap();
        let inter = CertificateBuilder::issued_by(
            DistinguishedName::new(&[("CN", "inter")]),
            &inter_key.public_key_info(),
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
            &inter,
            &inter_key,
        )
        .unwrap();
        Pki { root, inter, leaf }
    }

    #[test]
    fn test_full_chain() {
        let p = pki();
        let chain = build_chain(&p.leaf, &[p.root.clone(), p.inter.clone()]).unwrap();
        assert_eq!(chain, vec![p.leaf, p.inter, p.root]);
    }

    #[test]
    fn test_partial_chain_without_root() {
        let p = pki();
        let chain = build_chain(&p.leaf, &[p.inter.clone()]).unwrap();
        assert_eq!(chain, vec![p.leaf, p.inter]);
    }

    #[test]
    fn test_empty_pool() {
        let p = pki();
        assert_eq!(build_chain(&p.leaf, &[]).unwrap(), vec![p.leaf]);
    }

    #[test]
    fn test_impostor_issuer_fails() {
        let p = pki();
        let fake_key = SigningKey::generate_ed25519().unwrap();
        let impostor = CertificateBuilder::self_signed(
            DistinguishedName::new(&[("CN", "inter")]),
            &fake_key,
        )
        .unwrap();
        assert!(matches!(
            build_chain(&p.leaf, &[impostor]),
            Err(PkiError::ChainVerifyFailed(_))
        ));
    }
}

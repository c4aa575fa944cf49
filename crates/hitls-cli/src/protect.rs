//! Offline PBM protection of a DER PKIMessage (`protect`).

use hitls_cmp::{protect, PkiMessage, ProtectionContext};
use tracing::info;

fn protect_der(
    der: &[u8],
    secret: &str,
    reference: Option<&str>,
    iterations: u32,
) -> Result<Vec<u8>, Box<dyn std::error::Error>> {
    let mut msg =
        PkiMessage::from_der(der).map_err(|e| format!("failed to parse PKIMessage: {e}"))?;

    let mut ctx = ProtectionContext::new();
    ctx.set_secret_value(secret.as_bytes())
        .set_pbm_iteration_count(iterations)?;
    if let Some(r) = reference {
        ctx.set_reference_value(r.as_bytes());
    }
    protect(&mut ctx, &mut msg)?;
    info!(body = %msg.body_type(), "message protected");
    Ok(msg.to_der()?)
}

pub fn run(
    secret: &str,
    input: &str,
    output: &str,
    reference: Option<&str>,
    iterations: u32,
) -> Result<(), Box<dyn std::error::Error>> {
    let der = std::fs::read(input).map_err(|e| format!("cannot read '{input}': {e}"))?;
    let out = protect_der(&der, secret, reference, iterations)?;
    std::fs::write(output, &out).map_err(|e| format!("cannot write '{output}': {e}"))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use hitls_cmp::msg::{GeneralName, PkiBody, PkiHeader};
    use hitls_cmp::verify_protection;
    use hitls_pki::x509::DistinguishedName;

    fn pkiconf_der() -> Vec<u8> {
        let header = PkiHeader::new(
            DistinguishedName::new(&[("CN", "client")]).into(),
            GeneralName::null_dn(),
        );
        PkiMessage::new(header, PkiBody::PkiConf).to_der().unwrap()
    }

    #[test]
    fn test_protect_der() {
        let out = protect_der(&pkiconf_der(), "insta", Some("kid"), 100).unwrap();
        let msg = PkiMessage::from_der(&out).unwrap();
        assert_eq!(msg.header.sender_kid.as_deref(), Some(&b"kid"[..]));
        let mut ctx = ProtectionContext::new();
        ctx.set_secret_value(b"insta");
        verify_protection(&mut ctx, &msg).unwrap();
    }

    #[test]
    fn test_protect_rejects_bad_input() {
        assert!(protect_der(&hex::decode("3000").unwrap(), "s", None, 500).is_err());
        assert!(protect_der(&pkiconf_der(), "s", None, 5).is_err());
    }

    #[test]
    fn test_run_roundtrip_files() {
        let dir = std::env::temp_dir();
        let input = dir.join(format!("hitls_protect_in_{}.der", std::process::id()));
        let output = dir.join(format!("hitls_protect_out_{}.der", std::process::id()));
        std::fs::write(&input, pkiconf_der()).unwrap();
        run(
            "insta",
            input.to_str().unwrap(),
            output.to_str().unwrap(),
            None,
            500,
        )
        .unwrap();
        let msg = PkiMessage::from_der(&std::fs::read(&output).unwrap()).unwrap();
        assert!(msg.protection.is_some());
        let _ = std::fs::remove_file(input);
        let _ = std::fs::remove_file(output);
    }
}

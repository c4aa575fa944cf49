//! Protection context: credentials and knobs consulted when protecting or
//! verifying a message.

use hitls_pki::crmf::{MAX_ITERATION_COUNT, MIN_ITERATION_COUNT};
use hitls_pki::x509::{Certificate, SigningKey};
use hitls_types::{CmpError, HashAlgId, MacAlgId};
use zeroize::Zeroizing;

use crate::kem::{KemEncapsulator, X25519KemKey};

/// Default PBM salt length in bytes.
pub const DEFAULT_PBM_SALT_LEN: usize = 16;
/// Default PBM iterationCount.
pub const DEFAULT_PBM_ITERATIONS: u32 = 500;
/// Default length of a KEM-derived `ssk`.
pub const DEFAULT_SSK_LEN: usize = 32;

/// Where a KEM-based exchange stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KemMode {
    #[default]
    Inactive,
    /// Our KEM public key is on its way to the peer; messages go unprotected.
    UsingClientKemKey,
    /// Encapsulate to the peer's KEM key before the next protection.
    UsingServerKemKey,
    /// `ssk` is established and KEM-based MAC applies.
    EstablishedUsingClient,
}

/// Everything protection selection, computation and verification read.
///
/// Setters return `&mut Self` so configuration can be chained.
pub struct ProtectionContext {
    pub(crate) secret_value: Option<Zeroizing<Vec<u8>>>,
    pub(crate) ssk: Option<Zeroizing<Vec<u8>>>,
    pub(crate) kem_mode: KemMode,
    pub(crate) kem_mac: MacAlgId,
    pub(crate) ssk_len: usize,
    pub(crate) kem_encapsulator: Option<Box<dyn KemEncapsulator>>,
    pub(crate) kem_key: Option<X25519KemKey>,
    pub(crate) cert: Option<Certificate>,
    pub(crate) pkey: Option<SigningKey>,
    pub(crate) digest: HashAlgId,
    pub(crate) untrusted: Vec<Certificate>,
    pub(crate) chain: Option<Vec<Certificate>>,
    pub(crate) extra_certs_out: Vec<Certificate>,
    pub(crate) reference_value: Option<Vec<u8>>,
    pub(crate) unprotected_send: bool,
    pub(crate) pbm_salt_len: usize,
    pub(crate) pbm_owf: HashAlgId,
    pub(crate) pbm_iterations: u32,
    pub(crate) pbm_mac: MacAlgId,
    pub(crate) trusted_sender: Option<Certificate>,
}

impl std::fmt::Debug for ProtectionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProtectionContext")
            .field("secret_value", &self.secret_value.as_ref().map(|_| "<redacted>"))
            .field("ssk", &self.ssk.as_ref().map(|_| "<redacted>"))
            .field("kem_mode", &self.kem_mode)
            .field("kem_mac", &self.kem_mac)
            .field("cert", &self.cert.as_ref().map(|c| c.subject.to_string()))
            .field("pkey", &self.pkey)
            .field("digest", &self.digest)
            .field("untrusted", &self.untrusted.len())
            .field("extra_certs_out", &self.extra_certs_out.len())
            .field("unprotected_send", &self.unprotected_send)
            .finish_non_exhaustive()
    }
}

impl Default for ProtectionContext {
    fn default() -> Self {
        Self::new()
    }
}

impl ProtectionContext {
    pub fn new() -> Self {
        Self {
            secret_value: None,
            ssk: None,
            kem_mode: KemMode::Inactive,
            kem_mac: MacAlgId::HmacSha256,
            ssk_len: DEFAULT_SSK_LEN,
            kem_encapsulator: None,
            kem_key: None,
            cert: None,
            pkey: None,
            digest: HashAlgId::Sha256,
            untrusted: Vec::new(),
            chain: None,
            extra_certs_out: Vec::new(),
            reference_value: None,
            unprotected_send: false,
            pbm_salt_len: DEFAULT_PBM_SALT_LEN,
            pbm_owf: HashAlgId::Sha256,
            pbm_iterations: DEFAULT_PBM_ITERATIONS,
            pbm_mac: MacAlgId::HmacSha1,
            trusted_sender: None,
        }
    }

    /// Shared secret for password-based MAC.
    pub fn set_secret_value(&mut self, secret: &[u8]) -> &mut Self {
        self.secret_value = Some(Zeroizing::new(secret.to_vec()));
        self
    }

    pub fn clear_secret_value(&mut self) -> &mut Self {
        self.secret_value = None;
        self
    }

    /// Install an already established KEM shared secret key.
    pub fn set_ssk(&mut self, ssk: &[u8]) -> &mut Self {
        self.ssk = Some(Zeroizing::new(ssk.to_vec()));
        self
    }

    pub fn set_kem_mode(&mut self, mode: KemMode) -> &mut Self {
        self.kem_mode = mode;
        self
    }

    pub fn set_kem_mac(&mut self, mac: MacAlgId) -> &mut Self {
        self.kem_mac = mac;
        self
    }

    pub fn set_ssk_len(&mut self, len: usize) -> Result<&mut Self, CmpError> {
        if len == 0 || len > 255 * 32 {
            return Err(CmpError::InvalidArgs(format!("ssk length {len}")));
        }
        self.ssk_len = len;
        Ok(self)
    }

    /// Encapsulator addressed to the peer's KEM key.
    pub fn set_kem_encapsulator(&mut self, kem: Box<dyn KemEncapsulator>) -> &mut Self {
        self.kem_encapsulator = Some(kem);
        self
    }

    /// Our own KEM key, used to recover `ssk` from incoming messages.
    pub fn set_kem_key(&mut self, key: X25519KemKey) -> &mut Self {
        self.kem_key = Some(key);
        self
    }

    /// Signer certificate. Drops any cached chain.
    pub fn set_cert(&mut self, cert: Certificate) -> &mut Self {
        self.cert = Some(cert);
        self.chain = None;
        self
    }

    pub fn set_pkey(&mut self, key: SigningKey) -> &mut Self {
        self.pkey = Some(key);
        self
    }

    /// Digest for signature protection; ignored for Ed25519.
    pub fn set_digest(&mut self, digest: HashAlgId) -> &mut Self {
        self.digest = digest;
        self
    }

    /// Pool for building the signer's chain. Drops any cached chain.
    pub fn set_untrusted(&mut self, certs: Vec<Certificate>) -> &mut Self {
        self.untrusted = certs;
        self.chain = None;
        self
    }

    pub fn set_extra_certs_out(&mut self, certs: Vec<Certificate>) -> &mut Self {
        self.extra_certs_out = certs;
        self
    }

    /// senderKID fallback when no key identifier is known.
    pub fn set_reference_value(&mut self, value: &[u8]) -> &mut Self {
        self.reference_value = Some(value.to_vec());
        self
    }

    pub fn set_unprotected_send(&mut self, on: bool) -> &mut Self {
        self.unprotected_send = on;
        self
    }

    pub fn set_pbm_salt_len(&mut self, len: usize) -> Result<&mut Self, CmpError> {
        if len == 0 {
            return Err(CmpError::InvalidArgs("empty PBM salt".into()));
        }
        self.pbm_salt_len = len;
        Ok(self)
    }

    pub fn set_pbm_owf(&mut self, owf: HashAlgId) -> &mut Self {
        self.pbm_owf = owf;
        self
    }

    pub fn set_pbm_iteration_count(&mut self, count: u32) -> Result<&mut Self, CmpError> {
        if !(MIN_ITERATION_COUNT..=MAX_ITERATION_COUNT).contains(&count) {
            return Err(CmpError::BadIterationCount(count));
        }
        self.pbm_iterations = count;
        Ok(self)
    }

    pub fn set_pbm_mac(&mut self, mac: MacAlgId) -> &mut Self {
        self.pbm_mac = mac;
        self
    }

    /// Certificate that signature-protected messages from the peer are
    /// checked against before any extraCerts.
    pub fn set_trusted_sender(&mut self, cert: Certificate) -> &mut Self {
        self.trusted_sender = Some(cert);
        self
    }

    pub fn kem_mode(&self) -> KemMode {
        self.kem_mode
    }

    pub fn ssk(&self) -> Option<&[u8]> {
        self.ssk.as_ref().map(|s| s.as_slice())
    }

    /// The chain cached by the last signature-protected message.
    pub fn chain(&self) -> Option<&[Certificate]> {
        self.chain.as_deref()
    }

    pub fn cert(&self) -> Option<&Certificate> {
        self.cert.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let ctx = ProtectionContext::new();
        assert_eq!(ctx.pbm_salt_len, 16);
        assert_eq!(ctx.pbm_owf, HashAlgId::Sha256);
        assert_eq!(ctx.pbm_iterations, 500);
        assert_eq!(ctx.pbm_mac, MacAlgId::HmacSha1);
        assert_eq!(ctx.digest, HashAlgId::Sha256);
        assert_eq!(ctx.kem_mode(), KemMode::Inactive);
        assert!(!ctx.unprotected_send);
    }

    #[test]
    fn test_iteration_bounds() {
        let mut ctx = ProtectionContext::new();
        assert!(matches!(
            ctx.set_pbm_iteration_count(99),
            Err(CmpError::BadIterationCount(99))
        ));
        assert!(ctx.set_pbm_iteration_count(100_001).is_err());
        assert!(ctx.set_pbm_iteration_count(100).is_ok());
        assert_eq!(ctx.pbm_iterations, 100);
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let mut ctx = ProtectionContext::new();
        ctx.set_secret_value(b"hunter2").set_ssk(b"topsecret");
        let dbg = format!("{ctx:?}");
        assert!(!dbg.contains("hunter2"));
        assert!(dbg.contains("<redacted>"));
    }

    #[test]
    fn test_set_cert_drops_chain() {
        let key = SigningKey::generate_ed25519().unwrap();
        let cert = hitls_pki::x509::CertificateBuilder::self_signed(
            hitls_pki::x509::DistinguishedName::new(&[("CN", "a")]),
            &key,
        )
        .unwrap();
        let mut ctx = ProtectionContext::new();
        ctx.chain = Some(vec![cert.clone()]);
        ctx.set_cert(cert);
        assert!(ctx.chain().is_none());
    }
}

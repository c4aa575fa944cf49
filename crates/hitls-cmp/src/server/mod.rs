//! Mock CMP server.
//!
//! A [`MockServer`] couples a persistent [`ServerConfig`] with per-transaction
//! state. The handlers in this module implement the canned behaviour of a test
//! CA: fixed certificate output, optional polling, error injection and
//! reference-certificate checks. [`MockServer::process`] wraps them into a
//! request/response dispatcher.

mod dispatch;
mod handlers;

pub use handlers::{CertRequestOutcome, PollOutcome};

use hitls_pki::x509::{Certificate, DistinguishedName};
use hitls_types::CmpError;

use crate::ctx::ProtectionContext;
use crate::msg::{BodyType, PkiFailureInfo, PkiMessage, PkiStatus, PkiStatusInfo};

/// certReqId value meaning "no request recorded".
pub const CERT_REQ_ID_INVALID: i64 = -1;

/// Which requests fail with an injected error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorInjection {
    Any,
    Body(BodyType),
}

impl ErrorInjection {
    /// Parse `"any"` or a body type name such as `"ir"` or `"certConf"`.
    pub fn parse(name: &str) -> Option<Self> {
        if name.eq_ignore_ascii_case("any") {
            return Some(ErrorInjection::Any);
        }
        BodyType::from_name(name).map(ErrorInjection::Body)
    }

    pub fn applies_to(self, body: BodyType) -> bool {
        match self {
            ErrorInjection::Any => true,
            ErrorInjection::Body(b) => b == body,
        }
    }
}

/// Canned outputs and behaviour switches that outlive a transaction.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub(crate) server_name: DistinguishedName,
    pub(crate) ref_cert: Option<Certificate>,
    pub(crate) cert_out: Option<Certificate>,
    pub(crate) chain_out: Option<Vec<Certificate>>,
    pub(crate) ca_pubs_out: Option<Vec<Certificate>>,
    pub(crate) status_out: PkiStatusInfo,
    pub(crate) send_error: Option<ErrorInjection>,
    pub(crate) poll_count: u32,
    pub(crate) check_after: i64,
    pub(crate) accept_unprotected: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            server_name: DistinguishedName::new(&[("CN", "mock server")]),
            ref_cert: None,
            cert_out: None,
            chain_out: None,
            ca_pubs_out: None,
            status_out: PkiStatusInfo::accepted(),
            send_error: None,
            poll_count: 0,
            check_after: 1,
            accept_unprotected: false,
        }
    }
}

impl ServerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Name placed in the sender field of responses.
    pub fn set_server_name(&mut self, name: DistinguishedName) -> &mut Self {
        self.server_name = name;
        self
    }

    /// Certificate that kur oldCertId and rr identities must refer to.
    pub fn set_ref_cert(&mut self, cert: Option<Certificate>) -> &mut Self {
        self.ref_cert = cert;
        self
    }

    pub fn set_cert_out(&mut self, cert: Option<Certificate>) -> &mut Self {
        self.cert_out = cert;
        self
    }

    pub fn set_chain_out(&mut self, chain: Option<Vec<Certificate>>) -> &mut Self {
        self.chain_out = chain;
        self
    }

    pub fn set_ca_pubs_out(&mut self, ca_pubs: Option<Vec<Certificate>>) -> &mut Self {
        self.ca_pubs_out = ca_pubs;
        self
    }

    /// Status returned for certificate and revocation requests.
    pub fn set_status_info(
        &mut self,
        status: PkiStatus,
        fail_info: PkiFailureInfo,
        text: Option<&str>,
    ) -> &mut Self {
        self.status_out = PkiStatusInfo::new(status, fail_info, text);
        self
    }

    pub fn set_send_error(&mut self, injection: Option<ErrorInjection>) -> &mut Self {
        self.send_error = injection;
        self
    }

    /// Number of pollReq rounds before a delayed answer is released.
    pub fn set_poll_count(&mut self, count: i64) -> Result<&mut Self, CmpError> {
        self.poll_count = u32::try_from(count)
            .map_err(|_| CmpError::InvalidArgs(format!("poll count {count}")))?;
        Ok(self)
    }

    /// Seconds announced in pollRep.
    pub fn set_check_after(&mut self, seconds: i64) -> Result<&mut Self, CmpError> {
        if seconds < 0 {
            return Err(CmpError::InvalidArgs(format!("check after {seconds}")));
        }
        self.check_after = seconds;
        Ok(self)
    }

    pub fn set_accept_unprotected(&mut self, on: bool) -> &mut Self {
        self.accept_unprotected = on;
        self
    }

    pub fn poll_count(&self) -> u32 {
        self.poll_count
    }

    pub fn send_error(&self) -> Option<ErrorInjection> {
        self.send_error
    }
}

/// State scoped to one CMP transaction.
#[derive(Debug, Clone)]
pub(crate) struct TransactionState {
    pub(crate) req: Option<PkiMessage>,
    pub(crate) cert_req_id: i64,
    pub(crate) curr_poll_count: u32,
}

impl Default for TransactionState {
    fn default() -> Self {
        Self {
            req: None,
            cert_req_id: CERT_REQ_ID_INVALID,
            curr_poll_count: 0,
        }
    }
}

/// Coarse view of the transaction state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionPhase {
    Idle,
    /// A certificate was issued and certConf is outstanding.
    AwaitingConfirmation,
    /// A request is buffered until the poll budget is spent.
    Polling,
}

#[derive(Debug)]
pub struct MockServer {
    pub(crate) config: ServerConfig,
    pub(crate) txn: TransactionState,
    pub(crate) protector: ProtectionContext,
}

impl MockServer {
    /// `protector` protects responses and verifies requests.
    pub fn new(config: ServerConfig, protector: ProtectionContext) -> Self {
        Self {
            config,
            txn: TransactionState::default(),
            protector,
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut ServerConfig {
        &mut self.config
    }

    pub fn protector_mut(&mut self) -> &mut ProtectionContext {
        &mut self.protector
    }

    pub fn phase(&self) -> TransactionPhase {
        if self.txn.req.is_some() {
            TransactionPhase::Polling
        } else if self.txn.cert_req_id != CERT_REQ_ID_INVALID {
            TransactionPhase::AwaitingConfirmation
        } else {
            TransactionPhase::Idle
        }
    }

    /// Drop everything scoped to the current transaction. Configuration is
    /// kept.
    pub fn reset_transaction(&mut self) {
        self.txn = TransactionState::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_injection_parse() {
        assert_eq!(ErrorInjection::parse("ANY"), Some(ErrorInjection::Any));
        assert_eq!(
            ErrorInjection::parse("certConf"),
            Some(ErrorInjection::Body(BodyType::CertConf))
        );
        assert_eq!(ErrorInjection::parse("bogus"), None);
        assert!(ErrorInjection::Any.applies_to(BodyType::Genm));
        assert!(!ErrorInjection::Body(BodyType::Ir).applies_to(BodyType::Cr));
    }

    #[test]
    fn test_config_rejects_negative_values() {
        let mut cfg = ServerConfig::new();
        assert!(matches!(
            cfg.set_poll_count(-1),
            Err(CmpError::InvalidArgs(_))
        ));
        assert!(cfg.set_check_after(-5).is_err());
        cfg.set_poll_count(3).unwrap();
        assert_eq!(cfg.poll_count, 3);
    }

    #[test]
    fn test_reset_keeps_config() {
        let mut cfg = ServerConfig::new();
        cfg.set_poll_count(2).unwrap();
        let mut srv = MockServer::new(cfg, ProtectionContext::new());
        srv.txn.cert_req_id = 0;
        srv.txn.curr_poll_count = 1;
        assert_eq!(srv.phase(), TransactionPhase::AwaitingConfirmation);
        srv.reset_transaction();
        assert_eq!(srv.phase(), TransactionPhase::Idle);
        assert_eq!(srv.txn.curr_poll_count, 0);
        assert_eq!(srv.config().poll_count, 2);
    }
}

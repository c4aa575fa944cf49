//! Per-message handlers of the mock server.

use hitls_pki::crmf::CertReqMsg;
use hitls_pki::x509::{Certificate, DistinguishedName};
use hitls_types::CmpError;
use tracing::{debug, info, warn};

use super::MockServer;
use crate::msg::{BodyType, InfoTypeAndValue, PkiMessage, PkiStatusInfo};

/// Answer to a certificate request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertRequestOutcome {
    pub status: PkiStatusInfo,
    pub cert: Option<Certificate>,
    pub chain: Option<Vec<Certificate>>,
    pub ca_pubs: Option<Vec<Certificate>>,
}

impl CertRequestOutcome {
    fn waiting() -> Self {
        Self {
            status: PkiStatusInfo::waiting(),
            cert: None,
            chain: None,
            ca_pubs: None,
        }
    }
}

/// Answer to a pollReq. `request` is the buffered request once the poll
/// budget is spent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollOutcome {
    pub request: Option<PkiMessage>,
    pub check_after: i64,
}

/// Every identity component given must match the reference certificate. A
/// missing component does not match.
fn refcert_matches(
    ref_cert: Option<&Certificate>,
    issuer: Option<&DistinguishedName>,
    serial: Option<&[u8]>,
) -> bool {
    let Some(rc) = ref_cert else {
        return true;
    };
    issuer == Some(&rc.issuer) && serial == Some(rc.serial_number.as_slice())
}

impl MockServer {
    fn check_injection(&self, body: BodyType) -> Result<(), CmpError> {
        match self.config.send_error {
            Some(inj) if inj.applies_to(body) => {
                info!(%body, "injecting error");
                Err(CmpError::Injected(body.name().to_string()))
            }
            _ => Ok(()),
        }
    }

    /// Start polling for `request` unless a request is already buffered.
    fn start_polling(&mut self, request: &PkiMessage) -> Result<(), CmpError> {
        if self.txn.req.is_some() {
            return Err(CmpError::AlreadyPolling);
        }
        self.txn.req = Some(request.clone());
        info!(body = %request.body_type(), polls = self.config.poll_count, "delaying response");
        Ok(())
    }

    /// ir, cr, p10cr or kur. `requested` is `None` for p10cr.
    pub fn handle_cert_request(
        &mut self,
        request: &PkiMessage,
        cert_req_id: i64,
        requested: Option<&CertReqMsg>,
    ) -> Result<CertRequestOutcome, CmpError> {
        self.check_injection(request.body_type())?;
        self.txn.cert_req_id = cert_req_id;

        if self.config.poll_count > 0 && self.txn.curr_poll_count == 0 {
            self.start_polling(request)?;
            return Ok(CertRequestOutcome::waiting());
        }
        if self.txn.curr_poll_count >= self.config.poll_count {
            self.txn.curr_poll_count = 0;
        }

        if let (BodyType::Kur, Some(crm), Some(rc)) = (
            request.body_type(),
            requested,
            self.config.ref_cert.as_ref(),
        ) {
            let old = crm.old_cert_id.as_ref().ok_or(CmpError::MissingCertId)?;
            if !refcert_matches(Some(rc), Some(&old.issuer), Some(&old.serial_number)) {
                return Err(CmpError::WrongCertId);
            }
        }

        debug!(cert_req_id, status = %self.config.status_out.status.name(), "answering certificate request");
        Ok(CertRequestOutcome {
            status: self.config.status_out.clone(),
            cert: self.config.cert_out.clone(),
            chain: self.config.chain_out.clone(),
            ca_pubs: self.config.ca_pubs_out.clone(),
        })
    }

    pub fn handle_revocation_request(
        &mut self,
        request: &PkiMessage,
        issuer: Option<&DistinguishedName>,
        serial: Option<&[u8]>,
    ) -> Result<PkiStatusInfo, CmpError> {
        self.check_injection(request.body_type())?;
        if (issuer.is_some() || serial.is_some())
            && !refcert_matches(self.config.ref_cert.as_ref(), issuer, serial)
        {
            return Err(CmpError::RequestRejected(
                "wrong certificate to revoke".into(),
            ));
        }
        Ok(self.config.status_out.clone())
    }

    /// Echo the single info value back.
    pub fn handle_general_message(
        &mut self,
        request: &PkiMessage,
        info_values: &[InfoTypeAndValue],
    ) -> Result<Vec<InfoTypeAndValue>, CmpError> {
        self.check_injection(request.body_type())?;
        if info_values.len() > 1 {
            return Err(CmpError::TooManyInfoValues(info_values.len()));
        }
        Ok(info_values.to_vec())
    }

    pub fn handle_error_report(
        &mut self,
        request: &PkiMessage,
        status_info: &PkiStatusInfo,
        error_code: Option<i64>,
        details: &[String],
    ) {
        warn!(
            body = %request.body_type(),
            status = %status_info,
            error_code = ?error_code,
            details = ?details,
            "client reported an error"
        );
    }

    pub fn handle_cert_confirmation(
        &mut self,
        request: &PkiMessage,
        cert_req_id: i64,
        cert_hash: &[u8],
        status_info: Option<&PkiStatusInfo>,
    ) -> Result<(), CmpError> {
        self.check_injection(request.body_type())?;
        let cert = self
            .config
            .cert_out
            .as_ref()
            .ok_or(CmpError::NoCertToConfirm)?;
        if cert_req_id != self.txn.cert_req_id {
            return Err(CmpError::BadRequestId {
                expected: self.txn.cert_req_id,
                got: cert_req_id,
            });
        }
        if cert.digest_sig() != cert_hash {
            return Err(CmpError::HashMismatch);
        }
        if let Some(si) = status_info {
            debug!(status = %si, "certificate confirmation status");
        }
        Ok(())
    }

    pub fn handle_poll_request(
        &mut self,
        request: &PkiMessage,
        cert_req_id: i64,
    ) -> Result<PollOutcome, CmpError> {
        self.check_injection(request.body_type())?;
        if self.txn.req.is_none() {
            return Err(CmpError::NotPolling);
        }
        self.txn.curr_poll_count += 1;
        debug!(
            cert_req_id,
            poll = self.txn.curr_poll_count,
            of = self.config.poll_count,
            "poll request"
        );
        if self.txn.curr_poll_count >= self.config.poll_count {
            return Ok(PollOutcome {
                request: self.txn.req.take(),
                check_after: 0,
            });
        }
        Ok(PollOutcome {
            request: None,
            check_after: self.config.check_after,
        })
    }

    /// Whether a request other than a certificate request or error report
    /// should be answered later. Buffers the request when it is.
    pub fn delayed_delivery_check(&mut self, request: &PkiMessage) -> Result<bool, CmpError> {
        let body = request.body_type();
        if body.is_cert_request() || body == BodyType::Error {
            return Ok(false);
        }
        if self.config.poll_count > 0 && self.txn.curr_poll_count == 0 {
            self.start_polling(request)?;
            return Ok(true);
        }
        Ok(false)
    }
}

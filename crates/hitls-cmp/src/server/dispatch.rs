//! Request/response dispatch of the mock server.

use chrono::Utc;
use hitls_pki::x509::Certificate;
use hitls_types::{CmpError, CmpErrorKind};
use tracing::{debug, info, warn};

use super::{CertRequestOutcome, MockServer, CERT_REQ_ID_INVALID};
use crate::msg::{
    BodyType, CertRepMessage, CertResponse, ErrorMsgContent, GeneralName, PkiBody,
    PkiFailureInfo, PkiHeader, PkiMessage, PkiStatus, PkiStatusInfo, PollRepEntry,
    RevRepContent,
};
use crate::protect::{protect, verify_protection};

const NONCE_LEN: usize = 16;

/// Body and extraCerts of a response, before the header is filled in.
struct Reply {
    body: PkiBody,
    extra_certs: Option<Vec<Certificate>>,
}

impl Reply {
    fn new(body: PkiBody) -> Self {
        Self {
            body,
            extra_certs: None,
        }
    }

    /// Whether the transaction ends with this response.
    fn terminates(&self) -> bool {
        match &self.body {
            PkiBody::Rp(_) | PkiBody::PkiConf | PkiBody::Genp(_) => true,
            PkiBody::Error(e) => e.status.status != PkiStatus::Waiting,
            _ => false,
        }
    }
}

fn fail_info_for(err: &CmpError) -> PkiFailureInfo {
    match err {
        CmpError::ProtectionMismatch | CmpError::MissingProtection => {
            PkiFailureInfo::BAD_MESSAGE_CHECK
        }
        CmpError::MissingCertId | CmpError::WrongCertId | CmpError::HashMismatch => {
            PkiFailureInfo::BAD_CERT_ID
        }
        CmpError::UnsupportedAlgorithm(_) | CmpError::UnknownAlgorithmId => {
            PkiFailureInfo::BAD_ALG
        }
        e => match e.kind() {
            CmpErrorKind::ProtocolViolation => PkiFailureInfo::BAD_REQUEST,
            CmpErrorKind::Encoding => PkiFailureInfo::BAD_DATA_FORMAT,
            CmpErrorKind::Transport => PkiFailureInfo::SYSTEM_UNAVAIL,
            CmpErrorKind::Configuration | CmpErrorKind::Injected => {
                PkiFailureInfo::SYSTEM_FAILURE
            }
        },
    }
}

fn error_body(err: &CmpError) -> PkiBody {
    let text = err.to_string();
    let status = PkiStatusInfo::new(PkiStatus::Rejection, fail_info_for(err), Some(&text));
    let mut content = ErrorMsgContent::new(status);
    content.error_details.push(text);
    PkiBody::Error(content)
}

fn fresh_nonce() -> Result<Vec<u8>, CmpError> {
    let mut nonce = vec![0u8; NONCE_LEN];
    getrandom::getrandom(&mut nonce)
        .map_err(|e| CmpError::InvalidArgs(format!("random source failed: {e}")))?;
    Ok(nonce)
}

/// The single element of a request list that may only carry one.
fn single<'a, T>(items: &'a [T], what: &str) -> Result<&'a T, CmpError> {
    match items {
        [one] => Ok(one),
        [] => Err(CmpError::UnexpectedBody(format!("empty {what}"))),
        _ => Err(CmpError::MultipleRequestsNotSupported),
    }
}

impl MockServer {
    /// Handle one request and produce the protected response.
    ///
    /// Handler failures are answered with an error message and end the
    /// transaction. If the response itself cannot be protected it is
    /// returned unprotected.
    pub fn process(&mut self, request: &PkiMessage) -> PkiMessage {
        let body_type = request.body_type();
        info!(body = %body_type, "received request");

        let reply = match self.check_request(request).and_then(|()| self.dispatch(request)) {
            Ok(reply) => reply,
            Err(e) => {
                warn!(body = %body_type, error = %e, "request failed");
                self.reset_transaction();
                Reply::new(error_body(&e))
            }
        };
        if reply.terminates() {
            self.reset_transaction();
        }

        let mut response = self.response_for(request, reply);
        if let Err(e) = protect(&mut self.protector, &mut response) {
            warn!(error = %e, "sending response unprotected");
        }
        info!(body = %response.body_type(), "sending response");
        response
    }

    fn check_request(&mut self, request: &PkiMessage) -> Result<(), CmpError> {
        if request.protection.is_some() {
            verify_protection(&mut self.protector, request)?;
        } else if !self.config.accept_unprotected {
            return Err(CmpError::MissingProtection);
        } else {
            debug!("accepting unprotected request");
        }

        let body = request.body_type();
        if self.txn.req.is_some() && !matches!(body, BodyType::PollReq | BodyType::Error) {
            return Err(CmpError::UnexpectedBody(format!(
                "{body} while polling, expected pollReq"
            )));
        }
        Ok(())
    }

    fn dispatch(&mut self, request: &PkiMessage) -> Result<Reply, CmpError> {
        if request.body_type() != BodyType::PollReq && self.delayed_delivery_check(request)? {
            return Ok(Reply::new(PkiBody::Error(ErrorMsgContent::new(
                PkiStatusInfo::waiting(),
            ))));
        }

        match &request.body {
            PkiBody::Ir(reqs) | PkiBody::Cr(reqs) | PkiBody::Kur(reqs) => {
                let crm = single(reqs, "certificate request")?;
                let outcome = self.handle_cert_request(request, crm.cert_req_id, Some(crm))?;
                Ok(self.cert_reply(request.body_type(), crm.cert_req_id, outcome))
            }
            PkiBody::P10cr(_) => {
                let outcome = self.handle_cert_request(request, CERT_REQ_ID_INVALID, None)?;
                Ok(self.cert_reply(BodyType::P10cr, CERT_REQ_ID_INVALID, outcome))
            }
            PkiBody::Rr(details) => {
                let template = &single(details, "revocation request")?.cert_details;
                let status = self.handle_revocation_request(
                    request,
                    template.issuer.as_ref(),
                    template.serial_number.as_deref(),
                )?;
                Ok(Reply::new(PkiBody::Rp(RevRepContent {
                    status: vec![status],
                })))
            }
            PkiBody::Genm(itavs) => {
                let out = self.handle_general_message(request, itavs)?;
                Ok(Reply::new(PkiBody::Genp(out)))
            }
            PkiBody::Error(content) => {
                self.handle_error_report(
                    request,
                    &content.status,
                    content.error_code,
                    &content.error_details,
                );
                Ok(Reply::new(PkiBody::PkiConf))
            }
            PkiBody::CertConf(statuses) => {
                match statuses.as_slice() {
                    [] => info!("certificate rejected by client"),
                    [cs] => self.handle_cert_confirmation(
                        request,
                        cs.cert_req_id,
                        &cs.cert_hash,
                        cs.status_info.as_ref(),
                    )?,
                    _ => return Err(CmpError::MultipleRequestsNotSupported),
                }
                Ok(Reply::new(PkiBody::PkiConf))
            }
            PkiBody::PollReq(ids) => {
                let id = *single(ids, "pollReq")?;
                let outcome = self.handle_poll_request(request, id)?;
                match outcome.request {
                    Some(buffered) => {
                        debug!(body = %buffered.body_type(), "answering buffered request");
                        self.dispatch(&buffered)
                    }
                    None => Ok(Reply::new(PkiBody::PollRep(vec![PollRepEntry {
                        cert_req_id: id,
                        check_after: outcome.check_after,
                        reason: Vec::new(),
                    }]))),
                }
            }
            other => Err(CmpError::UnexpectedBody(other.body_type().to_string())),
        }
    }

    fn cert_reply(
        &self,
        req_type: BodyType,
        cert_req_id: i64,
        outcome: CertRequestOutcome,
    ) -> Reply {
        let waiting = outcome.status.status == PkiStatus::Waiting;
        let rep = CertRepMessage {
            ca_pubs: if req_type == BodyType::Ir {
                outcome.ca_pubs
            } else {
                None
            },
            response: vec![CertResponse {
                cert_req_id,
                status: outcome.status,
                certificate: if waiting { None } else { outcome.cert },
            }],
        };
        let body = match req_type {
            BodyType::Ir => PkiBody::Ip(rep),
            BodyType::Kur => PkiBody::Kup(rep),
            _ => PkiBody::Cp(rep),
        };
        Reply {
            body,
            extra_certs: if waiting { None } else { outcome.chain },
        }
    }

    fn response_for(&self, request: &PkiMessage, reply: Reply) -> PkiMessage {
        let mut header = PkiHeader::new(
            GeneralName::DirectoryName(self.config.server_name.clone()),
            request.header.sender.clone(),
        );
        header.message_time = Some(Utc::now());
        header.transaction_id = request.header.transaction_id.clone();
        header.recip_nonce = request.header.sender_nonce.clone();
        match fresh_nonce() {
            Ok(nonce) => header.sender_nonce = Some(nonce),
            Err(e) => warn!(error = %e, "no senderNonce"),
        }
        let mut response = PkiMessage::new(header, reply.body);
        response.extra_certs = reply.extra_certs;
        response
    }
}

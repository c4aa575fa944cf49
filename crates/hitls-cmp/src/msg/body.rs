//! PKIBody and the content types of the modelled body alternatives.

use hitls_pki::crmf::{CertReqMsg, CertTemplate};
use hitls_pki::x509::Certificate;
use hitls_types::CmpError;
use hitls_utils::asn1::{tags, Decoder, Encoder, TagClass};

use super::header::{itavs_from_decoder, itavs_to_der, InfoTypeAndValue};
use super::status::PkiStatusInfo;
use super::{check_element, der_err};

/// PKIBody CHOICE tags of the supported body types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BodyType {
    Ir = 0,
    Ip = 1,
    Cr = 2,
    Cp = 3,
    P10cr = 4,
    Kur = 7,
    Kup = 8,
    Rr = 11,
    Rp = 12,
    PkiConf = 19,
    Genm = 21,
    Genp = 22,
    Error = 23,
    CertConf = 24,
    PollReq = 25,
    PollRep = 26,
}

const ALL_BODY_TYPES: [BodyType; 16] = [
    BodyType::Ir,
    BodyType::Ip,
    BodyType::Cr,
    BodyType::Cp,
    BodyType::P10cr,
    BodyType::Kur,
    BodyType::Kup,
    BodyType::Rr,
    BodyType::Rp,
    BodyType::PkiConf,
    BodyType::Genm,
    BodyType::Genp,
    BodyType::Error,
    BodyType::CertConf,
    BodyType::PollReq,
    BodyType::PollRep,
];

impl BodyType {
    pub fn tag(self) -> u8 {
        self as u8
    }

    pub fn from_tag(tag: u32) -> Option<Self> {
        ALL_BODY_TYPES.into_iter().find(|t| u32::from(t.tag()) == tag)
    }

    pub fn name(self) -> &'static str {
        match self {
            BodyType::Ir => "ir",
            BodyType::Ip => "ip",
            BodyType::Cr => "cr",
            BodyType::Cp => "cp",
            BodyType::P10cr => "p10cr",
            BodyType::Kur => "kur",
            BodyType::Kup => "kup",
            BodyType::Rr => "rr",
            BodyType::Rp => "rp",
            BodyType::PkiConf => "pkiconf",
            BodyType::Genm => "genm",
            BodyType::Genp => "genp",
            BodyType::Error => "error",
            BodyType::CertConf => "certConf",
            BodyType::PollReq => "pollReq",
            BodyType::PollRep => "pollRep",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        ALL_BODY_TYPES
            .into_iter()
            .find(|t| t.name().eq_ignore_ascii_case(name))
    }

    /// ir, cr, p10cr and kur.
    pub fn is_cert_request(self) -> bool {
        matches!(
            self,
            BodyType::Ir | BodyType::Cr | BodyType::P10cr | BodyType::Kur
        )
    }
}

impl std::fmt::Display for BodyType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// CertResponse with the certificate of certifiedKeyPair, if any.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertResponse {
    pub cert_req_id: i64,
    pub status: PkiStatusInfo,
    pub certificate: Option<Certificate>,
}

/// CertRepMessage ::= SEQUENCE { caPubs [1] OPTIONAL, response }
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CertRepMessage {
    pub ca_pubs: Option<Vec<Certificate>>,
    pub response: Vec<CertResponse>,
}

/// RevDetails; crlEntryDetails is not modelled.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RevDetails {
    pub cert_details: CertTemplate,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevRepContent {
    pub status: Vec<PkiStatusInfo>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorMsgContent {
    pub status: PkiStatusInfo,
    pub error_code: Option<i64>,
    pub error_details: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertStatus {
    pub cert_hash: Vec<u8>,
    pub cert_req_id: i64,
    pub status_info: Option<PkiStatusInfo>,
}

/// One entry of PollRepContent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollRepEntry {
    pub cert_req_id: i64,
    /// Seconds the client should wait before polling again.
    pub check_after: i64,
    pub reason: Vec<String>,
}

/// PKIBody.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PkiBody {
    Ir(Vec<CertReqMsg>),
    Ip(CertRepMessage),
    Cr(Vec<CertReqMsg>),
    Cp(CertRepMessage),
    /// PKCS#10 CertificationRequest, complete DER element.
    P10cr(Vec<u8>),
    Kur(Vec<CertReqMsg>),
    Kup(CertRepMessage),
    Rr(Vec<RevDetails>),
    Rp(RevRepContent),
    PkiConf,
    Genm(Vec<InfoTypeAndValue>),
    Genp(Vec<InfoTypeAndValue>),
    Error(ErrorMsgContent),
    CertConf(Vec<CertStatus>),
    PollReq(Vec<i64>),
    PollRep(Vec<PollRepEntry>),
}

impl PkiBody {
    pub fn body_type(&self) -> BodyType {
        match self {
            PkiBody::Ir(_) => BodyType::Ir,
            PkiBody::Ip(_) => BodyType::Ip,
            PkiBody::Cr(_) => BodyType::Cr,
            PkiBody::Cp(_) => BodyType::Cp,
            PkiBody::P10cr(_) => BodyType::P10cr,
            PkiBody::Kur(_) => BodyType::Kur,
            PkiBody::Kup(_) => BodyType::Kup,
            PkiBody::Rr(_) => BodyType::Rr,
            PkiBody::Rp(_) => BodyType::Rp,
            PkiBody::PkiConf => BodyType::PkiConf,
            PkiBody::Genm(_) => BodyType::Genm,
            PkiBody::Genp(_) => BodyType::Genp,
            PkiBody::Error(_) => BodyType::Error,
            PkiBody::CertConf(_) => BodyType::CertConf,
            PkiBody::PollReq(_) => BodyType::PollReq,
            PkiBody::PollRep(_) => BodyType::PollRep,
        }
    }

    /// The explicitly tagged body element.
    pub fn to_der(&self) -> Result<Vec<u8>, CmpError> {
        let content = match self {
            PkiBody::Ir(reqs) | PkiBody::Cr(reqs) | PkiBody::Kur(reqs) => {
                seq_of(reqs.iter().map(CertReqMsg::to_der))
            }
            PkiBody::P10cr(csr) => {
                check_element(csr, "p10cr")?;
                csr.clone()
            }
            PkiBody::Ip(rep) | PkiBody::Cp(rep) | PkiBody::Kup(rep) => rep.to_der(),
            PkiBody::Rr(details) => seq_of(
                details
                    .iter()
                    .map(|d| seq_of(std::iter::once(d.cert_details.to_der()))),
            ),
            PkiBody::Rp(rp) => {
                let status = seq_of(rp.status.iter().map(PkiStatusInfo::to_der));
                seq_of(std::iter::once(status))
            }
            PkiBody::PkiConf => vec![tags::NULL, 0x00],
            PkiBody::Genm(itavs) | PkiBody::Genp(itavs) => itavs_to_der(itavs)?,
            PkiBody::Error(err) => err.to_der(),
            PkiBody::CertConf(statuses) => seq_of(statuses.iter().map(CertStatus::to_der)),
            PkiBody::PollReq(ids) => seq_of(ids.iter().map(|id| {
                let mut enc = Encoder::new();
                enc.write_nested(tags::SEQUENCE, |s| {
                    s.write_i64(*id);
                });
                enc.finish()
            })),
            PkiBody::PollRep(entries) => seq_of(entries.iter().map(PollRepEntry::to_der)),
        };
        let mut enc = Encoder::new();
        enc.write_explicit(self.body_type().tag(), &content);
        Ok(enc.finish())
    }

    pub fn from_decoder(dec: &mut Decoder) -> Result<Self, CmpError> {
        let tlv = dec.read_tlv().map_err(der_err)?;
        if tlv.tag.class != TagClass::ContextSpecific || !tlv.tag.constructed {
            return Err(CmpError::EncodingFailure("PKIBody is not a tagged choice".into()));
        }
        let body_type = BodyType::from_tag(tlv.tag.number).ok_or_else(|| {
            CmpError::UnexpectedBody(format!("unsupported body type {}", tlv.tag.number))
        })?;
        let mut inner = Decoder::new(tlv.value);
        let body = match body_type {
            BodyType::Ir => PkiBody::Ir(read_cert_req_msgs(&mut inner)?),
            BodyType::Cr => PkiBody::Cr(read_cert_req_msgs(&mut inner)?),
            BodyType::Kur => PkiBody::Kur(read_cert_req_msgs(&mut inner)?),
            BodyType::P10cr => PkiBody::P10cr(inner.read_raw_tlv().map_err(der_err)?.to_vec()),
            BodyType::Ip => PkiBody::Ip(CertRepMessage::from_decoder(&mut inner)?),
            BodyType::Cp => PkiBody::Cp(CertRepMessage::from_decoder(&mut inner)?),
            BodyType::Kup => PkiBody::Kup(CertRepMessage::from_decoder(&mut inner)?),
            BodyType::Rr => {
                let mut seq = inner.read_sequence().map_err(der_err)?;
                let mut details = Vec::new();
                while !seq.is_empty() {
                    // crlEntryDetails is skipped
                    let mut rd = seq.read_sequence().map_err(der_err)?;
                    details.push(RevDetails {
                        cert_details: CertTemplate::from_decoder(&mut rd)?,
                    });
                }
                PkiBody::Rr(details)
            }
            BodyType::Rp => {
                let mut seq = inner.read_sequence().map_err(der_err)?;
                let mut list = seq.read_sequence().map_err(der_err)?;
                let mut status = Vec::new();
                while !list.is_empty() {
                    status.push(PkiStatusInfo::from_decoder(&mut list)?);
                }
                // revCerts and crls are skipped
                PkiBody::Rp(RevRepContent { status })
            }
            BodyType::PkiConf => {
                inner.read_null().map_err(der_err)?;
                PkiBody::PkiConf
            }
            BodyType::Genm => PkiBody::Genm(itavs_from_decoder(&mut inner)?),
            BodyType::Genp => PkiBody::Genp(itavs_from_decoder(&mut inner)?),
            BodyType::Error => PkiBody::Error(ErrorMsgContent::from_decoder(&mut inner)?),
            BodyType::CertConf => {
                let mut seq = inner.read_sequence().map_err(der_err)?;
                let mut statuses = Vec::new();
                while !seq.is_empty() {
                    statuses.push(CertStatus::from_decoder(&mut seq)?);
                }
                PkiBody::CertConf(statuses)
            }
            BodyType::PollReq => {
                let mut seq = inner.read_sequence().map_err(der_err)?;
                let mut ids = Vec::new();
                while !seq.is_empty() {
                    let mut entry = seq.read_sequence().map_err(der_err)?;
                    ids.push(entry.read_i64().map_err(der_err)?);
                    entry.finish().map_err(der_err)?;
                }
                PkiBody::PollReq(ids)
            }
            BodyType::PollRep => {
                let mut seq = inner.read_sequence().map_err(der_err)?;
                let mut entries = Vec::new();
                while !seq.is_empty() {
                    entries.push(PollRepEntry::from_decoder(&mut seq)?);
                }
                PkiBody::PollRep(entries)
            }
        };
        inner.finish().map_err(der_err)?;
        Ok(body)
    }
}

fn seq_of(items: impl Iterator<Item = Vec<u8>>) -> Vec<u8> {
    let contents: Vec<u8> = items.flatten().collect();
    let mut enc = Encoder::new();
    enc.write_sequence(&contents);
    enc.finish()
}

fn read_cert_req_msgs(dec: &mut Decoder) -> Result<Vec<CertReqMsg>, CmpError> {
    let mut seq = dec.read_sequence().map_err(der_err)?;
    let mut out = Vec::new();
    while !seq.is_empty() {
        out.push(CertReqMsg::from_decoder(&mut seq)?);
    }
    Ok(out)
}

fn read_free_text(dec: &mut Decoder) -> Result<Vec<String>, CmpError> {
    let mut seq = dec.read_sequence().map_err(der_err)?;
    let mut out = Vec::new();
    while !seq.is_empty() {
        out.push(seq.read_string().map_err(der_err)?);
    }
    Ok(out)
}

fn write_free_text(enc: &mut Encoder, texts: &[String]) {
    enc.write_nested(tags::SEQUENCE, |seq| {
        for t in texts {
            seq.write_utf8_string(t);
        }
    });
}

pub(crate) fn read_certs(dec: &mut Decoder) -> Result<Vec<Certificate>, CmpError> {
    let mut seq = dec.read_sequence().map_err(der_err)?;
    let mut out = Vec::new();
    while !seq.is_empty() {
        out.push(Certificate::from_der(seq.read_raw_tlv().map_err(der_err)?)?);
    }
    Ok(out)
}

pub(crate) fn certs_to_der(certs: &[Certificate]) -> Vec<u8> {
    seq_of(certs.iter().map(|c| c.raw.clone()))
}

impl CertResponse {
    fn to_der(&self) -> Vec<u8> {
        let mut enc = Encoder::new();
        enc.write_nested(tags::SEQUENCE, |seq| {
            seq.write_i64(self.cert_req_id);
            seq.write_raw(&self.status.to_der());
            if let Some(cert) = &self.certificate {
                seq.write_nested(tags::SEQUENCE, |ckp| {
                    ckp.write_explicit(0, &cert.raw);
                });
            }
        });
        enc.finish()
    }

    fn from_decoder(dec: &mut Decoder) -> Result<Self, CmpError> {
        let mut seq = dec.read_sequence().map_err(der_err)?;
        let cert_req_id = seq.read_i64().map_err(der_err)?;
        let status = PkiStatusInfo::from_decoder(&mut seq)?;
        let mut certificate = None;
        if !seq.is_empty() && seq.peek_tag().map_err(der_err)?.is_universal(0x10) {
            let mut ckp = seq.read_sequence().map_err(der_err)?;
            // encryptedCert [1] is not supported
            let mut cert = ckp.read_explicit(0).map_err(der_err)?;
            certificate = Some(Certificate::from_der(
                cert.read_raw_tlv().map_err(der_err)?,
            )?);
        }
        // rspInfo is ignored
        Ok(Self {
            cert_req_id,
            status,
            certificate,
        })
    }
}

impl CertRepMessage {
    fn to_der(&self) -> Vec<u8> {
        let mut enc = Encoder::new();
        enc.write_nested(tags::SEQUENCE, |seq| {
            if let Some(ca_pubs) = &self.ca_pubs {
                seq.write_explicit(1, &certs_to_der(ca_pubs));
            }
            seq.write_raw(&seq_of(self.response.iter().map(CertResponse::to_der)));
        });
        enc.finish()
    }

    fn from_decoder(dec: &mut Decoder) -> Result<Self, CmpError> {
        let mut seq = dec.read_sequence().map_err(der_err)?;
        let ca_pubs = match seq.try_read_explicit(1).map_err(der_err)? {
            Some(mut e) => Some(read_certs(&mut e)?),
            None => None,
        };
        let mut list = seq.read_sequence().map_err(der_err)?;
        let mut response = Vec::new();
        while !list.is_empty() {
            response.push(CertResponse::from_decoder(&mut list)?);
        }
        seq.finish().map_err(der_err)?;
        Ok(Self { ca_pubs, response })
    }
}

impl ErrorMsgContent {
    pub fn new(status: PkiStatusInfo) -> Self {
        Self {
            status,
            error_code: None,
            error_details: Vec::new(),
        }
    }

    fn to_der(&self) -> Vec<u8> {
        let mut enc = Encoder::new();
        enc.write_nested(tags::SEQUENCE, |seq| {
            seq.write_raw(&self.status.to_der());
            if let Some(code) = self.error_code {
                seq.write_i64(code);
            }
            if !self.error_details.is_empty() {
                write_free_text(seq, &self.error_details);
            }
        });
        enc.finish()
    }

    fn from_decoder(dec: &mut Decoder) -> Result<Self, CmpError> {
        let mut seq = dec.read_sequence().map_err(der_err)?;
        let mut content = Self::new(PkiStatusInfo::from_decoder(&mut seq)?);
        if !seq.is_empty() && seq.peek_tag().map_err(der_err)?.is_universal(0x02) {
            content.error_code = Some(seq.read_i64().map_err(der_err)?);
        }
        if !seq.is_empty() {
            content.error_details = read_free_text(&mut seq)?;
        }
        seq.finish().map_err(der_err)?;
        Ok(content)
    }
}

impl CertStatus {
    fn to_der(&self) -> Vec<u8> {
        let mut enc = Encoder::new();
        enc.write_nested(tags::SEQUENCE, |seq| {
            seq.write_octet_string(&self.cert_hash);
            seq.write_i64(self.cert_req_id);
            if let Some(si) = &self.status_info {
                seq.write_raw(&si.to_der());
            }
        });
        enc.finish()
    }

    fn from_decoder(dec: &mut Decoder) -> Result<Self, CmpError> {
        let mut seq = dec.read_sequence().map_err(der_err)?;
        let cert_hash = seq.read_octet_string().map_err(der_err)?.to_vec();
        let cert_req_id = seq.read_i64().map_err(der_err)?;
        let status_info = if !seq.is_empty() && seq.peek_tag().map_err(der_err)?.is_universal(0x10)
        {
            Some(PkiStatusInfo::from_decoder(&mut seq)?)
        } else {
            None
        };
        // hashAlg [0] is ignored
        Ok(Self {
            cert_hash,
            cert_req_id,
            status_info,
        })
    }
}

impl PollRepEntry {
    fn to_der(&self) -> Vec<u8> {
        let mut enc = Encoder::new();
        enc.write_nested(tags::SEQUENCE, |seq| {
            seq.write_i64(self.cert_req_id);
            seq.write_i64(self.check_after);
            if !self.reason.is_empty() {
                write_free_text(seq, &self.reason);
            }
        });
        enc.finish()
    }

    fn from_decoder(dec: &mut Decoder) -> Result<Self, CmpError> {
        let mut seq = dec.read_sequence().map_err(der_err)?;
        let cert_req_id = seq.read_i64().map_err(der_err)?;
        let check_after = seq.read_i64().map_err(der_err)?;
        let reason = if seq.is_empty() {
            Vec::new()
        } else {
            read_free_text(&mut seq)?
        };
        seq.finish().map_err(der_err)?;
        Ok(Self {
            cert_req_id,
            check_after,
            reason,
        })
    }
}

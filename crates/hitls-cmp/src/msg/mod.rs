//! CMP message model and DER codec (RFC 4210 §5.1).

mod body;
mod header;
mod status;

pub use body::{
    BodyType, CertRepMessage, CertResponse, CertStatus, ErrorMsgContent, PkiBody, PollRepEntry,
    RevDetails, RevRepContent,
};
pub use header::{GeneralName, InfoTypeAndValue, PkiHeader, PVNO_CMP2000, PVNO_CMP2021};
pub use status::{PkiFailureInfo, PkiStatus, PkiStatusInfo};

use hitls_pki::x509::Certificate;
use hitls_types::CmpError;
use hitls_utils::asn1::{tags, Decoder, Encoder};

pub(crate) fn der_err(e: impl std::fmt::Display) -> CmpError {
    CmpError::EncodingFailure(e.to_string())
}

/// `raw` must be exactly one well-formed DER element.
pub(crate) fn check_element(raw: &[u8], what: &str) -> Result<(), CmpError> {
    let mut dec = Decoder::new(raw);
    dec.read_tlv()
        .and_then(|_| dec.finish())
        .map_err(|_| CmpError::EncodingFailure(format!("malformed {what}")))
}

/// PKIMessage ::= SEQUENCE { header, body, protection [0]?, extraCerts [1]? }
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PkiMessage {
    pub header: PkiHeader,
    pub body: PkiBody,
    /// Content of the protection BIT STRING (no unused bits).
    pub protection: Option<Vec<u8>>,
    /// `None` and an empty list both encode as an absent field.
    pub extra_certs: Option<Vec<Certificate>>,
}

impl PkiMessage {
    pub fn new(header: PkiHeader, body: PkiBody) -> Self {
        Self {
            header,
            body,
            protection: None,
            extra_certs: None,
        }
    }

    pub fn body_type(&self) -> BodyType {
        self.body.body_type()
    }

    /// DER of ProtectedPart ::= SEQUENCE { header, body }, the input of
    /// every protection algorithm.
    pub fn protected_part_der(&self) -> Result<Vec<u8>, CmpError> {
        let mut contents = self.header.to_der()?;
        contents.extend_from_slice(&self.body.to_der()?);
        let mut enc = Encoder::new();
        enc.write_sequence(&contents);
        Ok(enc.finish())
    }

    pub fn to_der(&self) -> Result<Vec<u8>, CmpError> {
        let header = self.header.to_der()?;
        let body = self.body.to_der()?;
        let mut enc = Encoder::new();
        enc.write_nested(tags::SEQUENCE, |seq| {
            seq.write_raw(&header);
            seq.write_raw(&body);
            if let Some(p) = &self.protection {
                seq.write_nested(0xA0, |e| {
                    e.write_bit_string(0, p);
                });
            }
            if let Some(certs) = self.extra_certs.as_ref().filter(|c| !c.is_empty()) {
                seq.write_explicit(1, &body::certs_to_der(certs));
            }
        });
        Ok(enc.finish())
    }

    pub fn from_der(der: &[u8]) -> Result<Self, CmpError> {
        let mut outer = Decoder::new(der);
        let mut seq = outer.read_sequence().map_err(der_err)?;
        outer.finish().map_err(der_err)?;

        let header = PkiHeader::from_decoder(&mut seq)?;
        let body = PkiBody::from_decoder(&mut seq)?;
        let mut msg = PkiMessage::new(header, body);
        if let Some(mut e) = seq.try_read_explicit(0).map_err(der_err)? {
            let (unused, bits) = e.read_bit_string().map_err(der_err)?;
            if unused != 0 {
                return Err(CmpError::EncodingFailure(
                    "protection has unused bits".into(),
                ));
            }
            msg.protection = Some(bits.to_vec());
        }
        if let Some(mut e) = seq.try_read_explicit(1).map_err(der_err)? {
            let certs = body::read_certs(&mut e)?;
            if !certs.is_empty() {
                msg.extra_certs = Some(certs);
            }
        }
        seq.finish().map_err(der_err)?;
        Ok(msg)
    }
}

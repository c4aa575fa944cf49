//! CertReqMsg, CertTemplate and CertId.

use hitls_types::PkiError;
use hitls_utils::asn1::{tags, Decoder, Encoder, TagClass};
use hitls_utils::oid::{known, Oid};

use crate::encoding::{asn1_err, integer_content};
use crate::x509::{Certificate, DistinguishedName, SubjectPublicKeyInfo};

/// CertId ::= SEQUENCE { issuer GeneralName, serialNumber INTEGER }
///
/// Only the directoryName form of the issuer is supported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertId {
    pub issuer: DistinguishedName,
    pub serial_number: Vec<u8>,
}

impl CertId {
    /// The id naming `cert`.
    pub fn of(cert: &Certificate) -> Self {
        Self {
            issuer: cert.issuer.clone(),
            serial_number: cert.serial_number.clone(),
        }
    }

    pub fn to_der(&self) -> Vec<u8> {
        let mut enc = Encoder::new();
        enc.write_nested(tags::SEQUENCE, |seq| {
            seq.write_explicit(4, &self.issuer.to_der());
            seq.write_integer(&self.serial_number);
        });
        enc.finish()
    }

    pub fn from_der(der: &[u8]) -> Result<Self, PkiError> {
        let mut dec = Decoder::new(der);
        let mut seq = dec.read_sequence().map_err(asn1_err)?;
        dec.finish().map_err(asn1_err)?;
        let name = seq
            .read_context_specific(4, true)
            .map_err(|_| PkiError::InvalidCert("CertId issuer is not a directoryName".into()))?;
        let issuer = DistinguishedName::from_der(name.value)?;
        let serial_number = seq.read_integer().map_err(asn1_err)?.to_vec();
        Ok(Self {
            issuer,
            serial_number,
        })
    }
}

/// The CertTemplate fields CMP servers look at. Absent fields are `None`;
/// other template fields are skipped when decoding.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CertTemplate {
    pub serial_number: Option<Vec<u8>>,
    pub issuer: Option<DistinguishedName>,
    pub subject: Option<DistinguishedName>,
    pub public_key: Option<SubjectPublicKeyInfo>,
}

impl CertTemplate {
    /// Encode as a SEQUENCE (IMPLICIT tags as in RFC 4211).
    pub fn to_der(&self) -> Vec<u8> {
        let mut enc = Encoder::new();
        enc.write_nested(tags::SEQUENCE, |seq| {
            if let Some(serial) = &self.serial_number {
                seq.write_context_specific(1, false, &integer_content(serial));
            }
            if let Some(issuer) = &self.issuer {
                // Name is a CHOICE, so the tag stays explicit
                seq.write_explicit(3, &issuer.to_der());
            }
            if let Some(subject) = &self.subject {
                seq.write_explicit(5, &subject.to_der());
            }
            if let Some(spki) = &self.public_key {
                let mut inner = Encoder::new();
                inner.write_raw(&spki.algorithm.to_der());
                inner.write_bit_string(0, &spki.public_key);
                seq.write_context_specific(6, true, &inner.finish());
            }
        });
        enc.finish()
    }

    pub fn from_decoder(dec: &mut Decoder) -> Result<Self, PkiError> {
        let mut seq = dec.read_sequence().map_err(asn1_err)?;
        let mut template = CertTemplate::default();
        while !seq.is_empty() {
            let tlv = seq.read_tlv().map_err(asn1_err)?;
            if tlv.tag.class != TagClass::ContextSpecific {
                return Err(PkiError::Asn1Error("unexpected CertTemplate field".into()));
            }
            match tlv.tag.number {
                1 => template.serial_number = Some(tlv.value.to_vec()),
                3 => template.issuer = Some(DistinguishedName::from_der(tlv.value)?),
                5 => template.subject = Some(DistinguishedName::from_der(tlv.value)?),
                6 => {
                    let mut inner = Decoder::new(tlv.value);
                    template.public_key = Some(SubjectPublicKeyInfo::from_contents(&mut inner)?);
                }
                _ => {}
            }
        }
        Ok(template)
    }
}

/// CertReqMsg with the CertRequest flattened into it. Proof-of-possession
/// and regInfo are not modelled; the only control kept is oldCertID.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertReqMsg {
    pub cert_req_id: i64,
    pub template: CertTemplate,
    pub old_cert_id: Option<CertId>,
}

impl CertReqMsg {
    pub fn new(cert_req_id: i64, template: CertTemplate) -> Self {
        Self {
            cert_req_id,
            template,
            old_cert_id: None,
        }
    }

    pub fn to_der(&self) -> Vec<u8> {
        let mut enc = Encoder::new();
        enc.write_nested(tags::SEQUENCE, |msg| {
            msg.write_nested(tags::SEQUENCE, |req| {
                req.write_i64(self.cert_req_id);
                req.write_raw(&self.template.to_der());
                if let Some(id) = &self.old_cert_id {
                    req.write_nested(tags::SEQUENCE, |controls| {
                        controls.write_nested(tags::SEQUENCE, |atv| {
                            atv.write_oid(&known::reg_ctrl_old_cert_id().to_der_value());
                            atv.write_raw(&id.to_der());
                        });
                    });
                }
            });
        });
        enc.finish()
    }

    pub fn from_decoder(dec: &mut Decoder) -> Result<Self, PkiError> {
        let mut msg = dec.read_sequence().map_err(asn1_err)?;
        let mut req = msg.read_sequence().map_err(asn1_err)?;
        let cert_req_id = req.read_i64().map_err(asn1_err)?;
        let template = CertTemplate::from_decoder(&mut req)?;

        let mut old_cert_id = None;
        if !req.is_empty() {
            let mut controls = req.read_sequence().map_err(asn1_err)?;
            while !controls.is_empty() {
                let mut atv = controls.read_sequence().map_err(asn1_err)?;
                let oid = Oid::from_der_value(atv.read_oid().map_err(asn1_err)?)
                    .map_err(asn1_err)?;
                let value = atv.read_raw_tlv().map_err(asn1_err)?;
                if oid == known::reg_ctrl_old_cert_id() {
                    old_cert_id = Some(CertId::from_der(value)?);
                }
            }
        }
        // popo and regInfo are ignored
        Ok(Self {
            cert_req_id,
            template,
            old_cert_id,
        })
    }
}

//! PKIHeader, GeneralName and InfoTypeAndValue.

use chrono::{DateTime, Utc};
use hitls_pki::x509::{AlgorithmIdentifier, DistinguishedName};
use hitls_types::CmpError;
use hitls_utils::asn1::{tags, Decoder, Encoder, Tag};
use hitls_utils::oid::Oid;

use super::{check_element, der_err};

/// pvno for messages using only RFC 4210 features.
pub const PVNO_CMP2000: i64 = 2;
/// pvno required once a KEM-based MAC is used.
pub const PVNO_CMP2021: i64 = 3;

/// A GeneralName. Only directoryName is interpreted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GeneralName {
    DirectoryName(DistinguishedName),
    /// Any other alternative, kept as its complete DER element.
    Other(Vec<u8>),
}

impl GeneralName {
    /// directoryName with an empty RDN sequence.
    pub fn null_dn() -> Self {
        GeneralName::DirectoryName(DistinguishedName::default())
    }

    pub fn is_null_dn(&self) -> bool {
        matches!(self, GeneralName::DirectoryName(dn) if dn.is_empty())
    }

    pub fn directory_name(&self) -> Option<&DistinguishedName> {
        match self {
            GeneralName::DirectoryName(dn) => Some(dn),
            GeneralName::Other(_) => None,
        }
    }

    pub fn to_der(&self) -> Result<Vec<u8>, CmpError> {
        match self {
            GeneralName::DirectoryName(dn) => {
                let mut enc = Encoder::new();
                enc.write_explicit(4, &dn.to_der());
                Ok(enc.finish())
            }
            GeneralName::Other(raw) => {
                check_element(raw, "GeneralName")?;
                Ok(raw.clone())
            }
        }
    }

    pub fn from_decoder(dec: &mut Decoder) -> Result<Self, CmpError> {
        let tlv = dec.read_tlv().map_err(der_err)?;
        if tlv.tag == Tag::context(4, true) {
            Ok(GeneralName::DirectoryName(DistinguishedName::from_der(
                tlv.value,
            )?))
        } else {
            Ok(GeneralName::Other(tlv.raw.to_vec()))
        }
    }
}

impl From<DistinguishedName> for GeneralName {
    fn from(dn: DistinguishedName) -> Self {
        GeneralName::DirectoryName(dn)
    }
}

/// InfoTypeAndValue ::= SEQUENCE { infoType OID, infoValue ANY OPTIONAL }
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InfoTypeAndValue {
    pub info_type: Oid,
    /// Complete DER element of the value.
    pub info_value: Option<Vec<u8>>,
}

impl InfoTypeAndValue {
    pub fn new(info_type: Oid, info_value: Option<Vec<u8>>) -> Self {
        Self {
            info_type,
            info_value,
        }
    }

    pub fn to_der(&self) -> Result<Vec<u8>, CmpError> {
        if let Some(v) = &self.info_value {
            check_element(v, "infoValue")?;
        }
        let mut enc = Encoder::new();
        enc.write_nested(tags::SEQUENCE, |seq| {
            seq.write_oid(&self.info_type.to_der_value());
            if let Some(v) = &self.info_value {
                seq.write_raw(v);
            }
        });
        Ok(enc.finish())
    }

    pub fn from_decoder(dec: &mut Decoder) -> Result<Self, CmpError> {
        let mut seq = dec.read_sequence().map_err(der_err)?;
        let info_type = Oid::from_der_value(seq.read_oid().map_err(der_err)?).map_err(der_err)?;
        let info_value = if seq.is_empty() {
            None
        } else {
            Some(seq.read_raw_tlv().map_err(der_err)?.to_vec())
        };
        seq.finish().map_err(der_err)?;
        Ok(Self {
            info_type,
            info_value,
        })
    }
}

/// Encode `SEQUENCE OF InfoTypeAndValue` contents.
pub(crate) fn itavs_to_der(itavs: &[InfoTypeAndValue]) -> Result<Vec<u8>, CmpError> {
    let mut items = Vec::new();
    for itav in itavs {
        items.extend_from_slice(&itav.to_der()?);
    }
    let mut enc = Encoder::new();
    enc.write_sequence(&items);
    Ok(enc.finish())
}

pub(crate) fn itavs_from_decoder(dec: &mut Decoder) -> Result<Vec<InfoTypeAndValue>, CmpError> {
    let mut seq = dec.read_sequence().map_err(der_err)?;
    let mut out = Vec::new();
    while !seq.is_empty() {
        out.push(InfoTypeAndValue::from_decoder(&mut seq)?);
    }
    Ok(out)
}

/// PKIHeader. Every optional field uses an explicit context tag [0]..[8].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PkiHeader {
    pub pvno: i64,
    pub sender: GeneralName,
    pub recipient: GeneralName,
    pub message_time: Option<DateTime<Utc>>,
    pub protection_alg: Option<AlgorithmIdentifier>,
    pub sender_kid: Option<Vec<u8>>,
    pub recip_kid: Option<Vec<u8>>,
    pub transaction_id: Option<Vec<u8>>,
    pub sender_nonce: Option<Vec<u8>>,
    pub recip_nonce: Option<Vec<u8>>,
    pub free_text: Vec<String>,
    pub general_info: Vec<InfoTypeAndValue>,
}

impl PkiHeader {
    pub fn new(sender: GeneralName, recipient: GeneralName) -> Self {
        Self {
            pvno: PVNO_CMP2000,
            sender,
            recipient,
            message_time: None,
            protection_alg: None,
            sender_kid: None,
            recip_kid: None,
            transaction_id: None,
            sender_nonce: None,
            recip_nonce: None,
            free_text: Vec::new(),
            general_info: Vec::new(),
        }
    }

    /// Find a generalInfo entry by type.
    pub fn general_info(&self, info_type: &Oid) -> Option<&InfoTypeAndValue> {
        self.general_info.iter().find(|i| i.info_type == *info_type)
    }

    pub fn to_der(&self) -> Result<Vec<u8>, CmpError> {
        let sender = self.sender.to_der()?;
        let recipient = self.recipient.to_der()?;
        if let Some(p) = self.protection_alg.as_ref().and_then(|a| a.params.as_ref()) {
            check_element(p, "protectionAlg parameters")?;
        }
        let general_info = if self.general_info.is_empty() {
            None
        } else {
            Some(itavs_to_der(&self.general_info)?)
        };

        let mut enc = Encoder::new();
        enc.write_nested(tags::SEQUENCE, |seq| {
            seq.write_i64(self.pvno);
            seq.write_raw(&sender);
            seq.write_raw(&recipient);
            if let Some(t) = &self.message_time {
                seq.write_nested(0xA0, |e| {
                    e.write_generalized_time(t);
                });
            }
            if let Some(alg) = &self.protection_alg {
                seq.write_explicit(1, &alg.to_der());
            }
            let octets = [
                (2u8, &self.sender_kid),
                (3, &self.recip_kid),
                (4, &self.transaction_id),
                (5, &self.sender_nonce),
                (6, &self.recip_nonce),
            ];
            for (tag, value) in octets {
                if let Some(v) = value {
                    seq.write_nested(0xA0 | tag, |e| {
                        e.write_octet_string(v);
                    });
                }
            }
            if !self.free_text.is_empty() {
                seq.write_nested(0xA7, |e| {
                    e.write_nested(tags::SEQUENCE, |texts| {
                        for t in &self.free_text {
                            texts.write_utf8_string(t);
                        }
                    });
                });
            }
            if let Some(gi) = &general_info {
                seq.write_explicit(8, gi);
            }
        });
        Ok(enc.finish())
    }

    pub fn from_decoder(dec: &mut Decoder) -> Result<Self, CmpError> {
        let mut seq = dec.read_sequence().map_err(der_err)?;
        let pvno = seq.read_i64().map_err(der_err)?;
        let sender = GeneralName::from_decoder(&mut seq)?;
        let recipient = GeneralName::from_decoder(&mut seq)?;
        let mut header = PkiHeader::new(sender, recipient);
        header.pvno = pvno;

        if let Some(mut e) = seq.try_read_explicit(0).map_err(der_err)? {
            header.message_time = Some(e.read_time().map_err(der_err)?);
        }
        if let Some(mut e) = seq.try_read_explicit(1).map_err(der_err)? {
            header.protection_alg = Some(AlgorithmIdentifier::from_decoder(&mut e)?);
        }
        let mut read_octets = |n: u32| -> Result<Option<Vec<u8>>, CmpError> {
            match seq.try_read_explicit(n).map_err(der_err)? {
                Some(mut e) => Ok(Some(e.read_octet_string().map_err(der_err)?.to_vec())),
                None => Ok(None),
            }
        };
        header.sender_kid = read_octets(2)?;
        header.recip_kid = read_octets(3)?;
        header.transaction_id = read_octets(4)?;
        header.sender_nonce = read_octets(5)?;
        header.recip_nonce = read_octets(6)?;
        if let Some(mut e) = seq.try_read_explicit(7).map_err(der_err)? {
            let mut texts = e.read_sequence().map_err(der_err)?;
            while !texts.is_empty() {
                header.free_text.push(texts.read_string().map_err(der_err)?);
            }
        }
        if let Some(mut e) = seq.try_read_explicit(8).map_err(der_err)? {
            header.general_info = itavs_from_decoder(&mut e)?;
        }
        seq.finish().map_err(der_err)?;
        Ok(header)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use hitls_utils::oid::known;

    fn full_header() -> PkiHeader {
        let mut h = PkiHeader::new(
            DistinguishedName::new(&[("CN", "client")]).into(),
            DistinguishedName::new(&[("CN", "ca"), ("O", "Example")]).into(),
        );
        h.message_time = Some(Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap());
        h.protection_alg = Some(AlgorithmIdentifier::new(known::ed25519()));
        h.sender_kid = Some(vec![1, 2, 3]);
        h.transaction_id = Some(vec![0xAA; 16]);
        h.sender_nonce = Some(vec![0xBB; 16]);
        h.recip_nonce = Some(vec![0xCC; 16]);
        h.free_text = vec!["hello".into()];
        h.general_info = vec![InfoTypeAndValue::new(known::it_implicit_confirm(), None)];
        h
    }

    #[test]
    fn test_header_der() {
        let h = full_header();
        let der = h.to_der().unwrap();
        let back = PkiHeader::from_decoder(&mut Decoder::new(&der)).unwrap();
        assert_eq!(back, h);
    }

    #[test]
    fn test_null_dn_encoding() {
        let name = GeneralName::null_dn();
        assert!(name.is_null_dn());
        // [4] { SEQUENCE {} }
        assert_eq!(name.to_der().unwrap(), [0xA4, 0x02, 0x30, 0x00]);
        let back = GeneralName::from_decoder(&mut Decoder::new(&[0xA4, 0x02, 0x30, 0x00])).unwrap();
        assert!(back.is_null_dn());
    }

    #[test]
    fn test_other_general_name_kept() {
        // rfc822Name [1] IMPLICIT IA5String
        let raw = vec![0x81, 0x03, b'a', b'@', b'b'];
        let name = GeneralName::from_decoder(&mut Decoder::new(&raw)).unwrap();
        assert_eq!(name, GeneralName::Other(raw.clone()));
        assert!(!name.is_null_dn());
        assert_eq!(name.to_der().unwrap(), raw);
    }

    #[test]
    fn test_malformed_raw_element_rejected() {
        let mut h = full_header();
        h.general_info = vec![InfoTypeAndValue::new(
            known::it_ca_certs(),
            Some(vec![0x30, 0x05, 0x01]),
        )];
        assert!(matches!(h.to_der(), Err(CmpError::EncodingFailure(_))));
    }

    #[test]
    fn test_minimal_header() {
        let h = PkiHeader::new(GeneralName::null_dn(), GeneralName::null_dn());
        let der = h.to_der().unwrap();
        // SEQUENCE { INTEGER 2, [4]{SEQ{}}, [4]{SEQ{}} }
        assert_eq!(
            der,
            [0x30, 0x0B, 0x02, 0x01, 0x02, 0xA4, 0x02, 0x30, 0x00, 0xA4, 0x02, 0x30, 0x00]
        );
    }
}

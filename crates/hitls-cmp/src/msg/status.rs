//! PKIStatusInfo and its components (RFC 4210 §5.2.3).

use bitflags::bitflags;
use hitls_types::CmpError;
use hitls_utils::asn1::{tags, Decoder, Encoder};

use super::der_err;

/// PKIStatus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PkiStatus {
    Accepted = 0,
    GrantedWithMods = 1,
    Rejection = 2,
    Waiting = 3,
    RevocationWarning = 4,
    RevocationNotification = 5,
    KeyUpdateWarning = 6,
}

impl PkiStatus {
    pub fn from_i64(v: i64) -> Option<Self> {
        Some(match v {
            0 => PkiStatus::Accepted,
            1 => PkiStatus::GrantedWithMods,
            2 => PkiStatus::Rejection,
            3 => PkiStatus::Waiting,
            4 => PkiStatus::RevocationWarning,
            5 => PkiStatus::RevocationNotification,
            6 => PkiStatus::KeyUpdateWarning,
            _ => return None,
        })
    }

    pub fn name(self) -> &'static str {
        match self {
            PkiStatus::Accepted => "accepted",
            PkiStatus::GrantedWithMods => "grantedWithMods",
            PkiStatus::Rejection => "rejection",
            PkiStatus::Waiting => "waiting",
            PkiStatus::RevocationWarning => "revocationWarning",
            PkiStatus::RevocationNotification => "revocationNotification",
            PkiStatus::KeyUpdateWarning => "keyUpdateWarning",
        }
    }
}

bitflags! {
    /// PKIFailureInfo named bits; bit `n` of the BIT STRING is `1 << n`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct PkiFailureInfo: u32 {
        const BAD_ALG = 1 << 0;
        const BAD_MESSAGE_CHECK = 1 << 1;
        const BAD_REQUEST = 1 << 2;
        const BAD_TIME = 1 << 3;
        const BAD_CERT_ID = 1 << 4;
        const BAD_DATA_FORMAT = 1 << 5;
        const WRONG_AUTHORITY = 1 << 6;
        const INCORRECT_DATA = 1 << 7;
        const MISSING_TIME_STAMP = 1 << 8;
        const BAD_POP = 1 << 9;
        const CERT_REVOKED = 1 << 10;
        const CERT_CONFIRMED = 1 << 11;
        const WRONG_INTEGRITY = 1 << 12;
        const BAD_RECIPIENT_NONCE = 1 << 13;
        const TIME_NOT_AVAILABLE = 1 << 14;
        const UNACCEPTED_POLICY = 1 << 15;
        const UNACCEPTED_EXTENSION = 1 << 16;
        const ADD_INFO_NOT_AVAILABLE = 1 << 17;
        const BAD_SENDER_NONCE = 1 << 18;
        const BAD_CERT_TEMPLATE = 1 << 19;
        const SIGNER_NOT_TRUSTED = 1 << 20;
        const TRANSACTION_ID_IN_USE = 1 << 21;
        const UNSUPPORTED_VERSION = 1 << 22;
        const NOT_AUTHORIZED = 1 << 23;
        const SYSTEM_UNAVAIL = 1 << 24;
        const SYSTEM_FAILURE = 1 << 25;
        const DUPLICATE_CERT_REQ = 1 << 26;
    }
}

impl PkiFailureInfo {
    /// DER NamedBitList form: bit 0 is the MSB of the first octet and
    /// trailing zero bits are dropped. Returns (unused_bits, octets).
    pub fn to_bit_string(self) -> (u8, Vec<u8>) {
        let bits = self.bits();
        if bits == 0 {
            return (0, Vec::new());
        }
        let highest = 31 - bits.leading_zeros() as usize;
        let mut octets = vec![0u8; highest / 8 + 1];
        for i in 0..=highest {
            if bits & (1 << i) != 0 {
                octets[i / 8] |= 0x80 >> (i % 8);
            }
        }
        let unused = (7 - highest % 8) as u8;
        (unused, octets)
    }

    /// Inverse of [`PkiFailureInfo::to_bit_string`]; unknown bits are dropped.
    pub fn from_bit_string(octets: &[u8]) -> Self {
        let mut bits = 0u32;
        for (i, byte) in octets.iter().enumerate().take(4) {
            for j in 0..8 {
                if byte & (0x80 >> j) != 0 {
                    bits |= 1 << (i * 8 + j);
                }
            }
        }
        PkiFailureInfo::from_bits_truncate(bits)
    }
}

/// PKIStatusInfo ::= SEQUENCE { status, statusString?, failInfo? }
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PkiStatusInfo {
    pub status: PkiStatus,
    pub status_string: Vec<String>,
    pub fail_info: PkiFailureInfo,
}

impl Default for PkiStatusInfo {
    fn default() -> Self {
        Self::accepted()
    }
}

impl PkiStatusInfo {
    pub fn new(status: PkiStatus, fail_info: PkiFailureInfo, text: Option<&str>) -> Self {
        Self {
            status,
            status_string: text.map(|t| vec![t.to_string()]).unwrap_or_default(),
            fail_info,
        }
    }

    pub fn accepted() -> Self {
        Self::new(PkiStatus::Accepted, PkiFailureInfo::empty(), None)
    }

    pub fn waiting() -> Self {
        Self::new(PkiStatus::Waiting, PkiFailureInfo::empty(), None)
    }

    pub fn to_der(&self) -> Vec<u8> {
        let mut enc = Encoder::new();
        enc.write_nested(tags::SEQUENCE, |seq| {
            seq.write_i64(self.status as i64);
            if !self.status_string.is_empty() {
                seq.write_nested(tags::SEQUENCE, |texts| {
                    for t in &self.status_string {
                        texts.write_utf8_string(t);
                    }
                });
            }
            if !self.fail_info.is_empty() {
                let (unused, octets) = self.fail_info.to_bit_string();
                seq.write_bit_string(unused, &octets);
            }
        });
        enc.finish()
    }

    pub fn from_decoder(dec: &mut Decoder) -> Result<Self, CmpError> {
        let mut seq = dec.read_sequence().map_err(der_err)?;
        let raw = seq.read_i64().map_err(der_err)?;
        let status = PkiStatus::from_i64(raw)
            .ok_or_else(|| CmpError::EncodingFailure(format!("unknown PKIStatus {raw}")))?;
        let mut info = Self::new(status, PkiFailureInfo::empty(), None);
        if !seq.is_empty() && seq.peek_tag().map_err(der_err)?.is_universal(0x10) {
            let mut texts = seq.read_sequence().map_err(der_err)?;
            while !texts.is_empty() {
                info.status_string.push(texts.read_string().map_err(der_err)?);
            }
        }
        if !seq.is_empty() {
            let (_, octets) = seq.read_bit_string().map_err(der_err)?;
            info.fail_info = PkiFailureInfo::from_bit_string(octets);
        }
        seq.finish().map_err(der_err)?;
        Ok(info)
    }
}

impl std::fmt::Display for PkiStatusInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PKIStatus: {}", self.status.name())?;
        if !self.fail_info.is_empty() {
            write!(f, "; PKIFailureInfo: {:#x}", self.fail_info.bits())?;
        }
        if !self.status_string.is_empty() {
            write!(f, "; StatusString: \"{}\"", self.status_string.join("\", \""))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fail_info_named_bits() {
        let (unused, octets) = PkiFailureInfo::BAD_ALG.to_bit_string();
        assert_eq!((unused, octets), (7, vec![0x80]));

        let (unused, octets) = PkiFailureInfo::BAD_POP.to_bit_string();
        assert_eq!((unused, octets), (6, vec![0x00, 0x40]));

        let both = PkiFailureInfo::BAD_REQUEST | PkiFailureInfo::SYSTEM_FAILURE;
        let (_, octets) = both.to_bit_string();
        assert_eq!(PkiFailureInfo::from_bit_string(&octets), both);
    }

    #[test]
    fn test_status_info_der() {
        let si = PkiStatusInfo::new(
            PkiStatus::Rejection,
            PkiFailureInfo::BAD_CERT_ID,
            Some("wrong certificate"),
        );
        let der = si.to_der();
        let back = PkiStatusInfo::from_decoder(&mut Decoder::new(&der)).unwrap();
        assert_eq!(back, si);
    }

    #[test]
    fn test_accepted_is_minimal() {
        // SEQUENCE { INTEGER 0 }
        assert_eq!(PkiStatusInfo::accepted().to_der(), [0x30, 0x03, 0x02, 0x01, 0x00]);
    }

    #[test]
    fn test_unknown_status_rejected() {
        let der = [0x30, 0x03, 0x02, 0x01, 0x09];
        assert!(PkiStatusInfo::from_decoder(&mut Decoder::new(&der)).is_err());
    }

    #[test]
    fn test_display() {
        let si = PkiStatusInfo::new(PkiStatus::Waiting, PkiFailureInfo::empty(), Some("later"));
        assert_eq!(si.to_string(), "PKIStatus: waiting; StatusString: \"later\"");
    }
}

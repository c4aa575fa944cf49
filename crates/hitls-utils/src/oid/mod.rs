//! Object identifiers.

use hitls_types::CryptoError;

/// A parsed OID represented as a sequence of arc values.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Oid {
    arcs: Vec<u32>,
}

impl Oid {
    /// Create an OID from a slice of arc values.
    pub fn new(arcs: &[u32]) -> Self {
        Self {
            arcs: arcs.to_vec(),
        }
    }

    /// Return the arc values.
    pub fn arcs(&self) -> &[u32] {
        &self.arcs
    }

    /// Encode the content octets (no tag or length).
    pub fn to_der_value(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        if let [first, second, rest @ ..] = self.arcs.as_slice() {
            encode_arc(&mut buf, first * 40 + second);
            for &arc in rest {
                encode_arc(&mut buf, arc);
            }
        }
        buf
    }

    /// Encode as a complete OBJECT IDENTIFIER element.
    pub fn to_der(&self) -> Vec<u8> {
        let value = self.to_der_value();
        let mut out = Vec::with_capacity(value.len() + 2);
        out.push(0x06);
        if value.len() >= 0x80 {
            out.push(0x81);
        }
        out.push(value.len() as u8);
        out.extend_from_slice(&value);
        out
    }

    /// Parse an OID from its content octets.
    pub fn from_der_value(data: &[u8]) -> Result<Self, CryptoError> {
        let (first, mut pos) = decode_arc(data)?;
        let mut arcs = if first < 80 {
            vec![first / 40, first % 40]
        } else {
            vec![2, first - 80]
        };
        while pos < data.len() {
            let (arc, consumed) = decode_arc(&data[pos..])?;
            arcs.push(arc);
            pos += consumed;
        }
        Ok(Self { arcs })
    }

    /// Parse dotted-decimal notation such as `1.3.6.1.5.5.7.4.3`.
    pub fn from_dot_string(s: &str) -> Result<Self, CryptoError> {
        let arcs = s
            .split('.')
            .map(|a| a.parse::<u32>().map_err(|_| CryptoError::InvalidArg))
            .collect::<Result<Vec<_>, _>>()?;
        if arcs.len() < 2 || arcs[0] > 2 || (arcs[0] < 2 && arcs[1] >= 40) {
            return Err(CryptoError::InvalidArg);
        }
        Ok(Self { arcs })
    }

    /// Return the dotted-string representation.
    pub fn to_dot_string(&self) -> String {
        self.arcs
            .iter()
            .map(|a| a.to_string())
            .collect::<Vec<_>>()
            .join(".")
    }
}

impl std::fmt::Display for Oid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_dot_string())
    }
}

fn encode_arc(buf: &mut Vec<u8>, value: u32) {
    let mut groups = [0u8; 5];
    let mut n = 0;
    let mut v = value;
    loop {
        groups[n] = (v & 0x7F) as u8;
        n += 1;
        v >>= 7;
        if v == 0 {
            break;
        }
    }
    for i in (0..n).rev() {
        buf.push(if i > 0 { groups[i] | 0x80 } else { groups[i] });
    }
}

fn decode_arc(data: &[u8]) -> Result<(u32, usize), CryptoError> {
    if data.first() == Some(&0x80) {
        // non-minimal encoding
        return Err(CryptoError::DecodeAsn1Fail);
    }
    let mut value: u32 = 0;
    for (i, &byte) in data.iter().enumerate() {
        value = value
            .checked_mul(128)
            .ok_or(CryptoError::DecodeAsn1Fail)?
            | u32::from(byte & 0x7F);
        if byte & 0x80 == 0 {
            return Ok((value, i + 1));
        }
    }
    Err(CryptoError::DecodeAsn1Fail)
}

/// Well-known OIDs used by CMP, CRMF and X.509.
pub mod known {
    use super::Oid;

    // Hash functions
    pub fn sha1() -> Oid {
        Oid::new(&[1, 3, 14, 3, 2, 26])
    }
    pub fn sha224() -> Oid {
        Oid::new(&[2, 16, 840, 1, 101, 3, 4, 2, 4])
    }
    pub fn sha256() -> Oid {
        Oid::new(&[2, 16, 840, 1, 101, 3, 4, 2, 1])
    }
    pub fn sha384() -> Oid {
        Oid::new(&[2, 16, 840, 1, 101, 3, 4, 2, 2])
    }
    pub fn sha512() -> Oid {
        Oid::new(&[2, 16, 840, 1, 101, 3, 4, 2, 3])
    }

    // HMAC
    /// hmac-sha1 from RFC 3370, the CRMF default.
    pub fn hmac_sha1() -> Oid {
        Oid::new(&[1, 3, 6, 1, 5, 5, 8, 1, 2])
    }
    pub fn hmac_with_sha1() -> Oid {
        Oid::new(&[1, 2, 840, 113549, 2, 7])
    }
    pub fn hmac_with_sha224() -> Oid {
        Oid::new(&[1, 2, 840, 113549, 2, 8])
    }
    pub fn hmac_with_sha256() -> Oid {
        Oid::new(&[1, 2, 840, 113549, 2, 9])
    }
    pub fn hmac_with_sha384() -> Oid {
        Oid::new(&[1, 2, 840, 113549, 2, 10])
    }
    pub fn hmac_with_sha512() -> Oid {
        Oid::new(&[1, 2, 840, 113549, 2, 11])
    }

    // Keys and signatures
    pub fn ec_public_key() -> Oid {
        Oid::new(&[1, 2, 840, 10045, 2, 1])
    }
    pub fn prime256v1() -> Oid {
        Oid::new(&[1, 2, 840, 10045, 3, 1, 7])
    }
    pub fn ecdsa_with_sha256() -> Oid {
        Oid::new(&[1, 2, 840, 10045, 4, 3, 2])
    }
    pub fn ecdsa_with_sha384() -> Oid {
        Oid::new(&[1, 2, 840, 10045, 4, 3, 3])
    }
    pub fn ecdsa_with_sha512() -> Oid {
        Oid::new(&[1, 2, 840, 10045, 4, 3, 4])
    }
    pub fn ed25519() -> Oid {
        Oid::new(&[1, 3, 101, 112])
    }
    pub fn x25519() -> Oid {
        Oid::new(&[1, 3, 101, 110])
    }

    // KDF
    pub fn hkdf_with_sha256() -> Oid {
        Oid::new(&[1, 2, 840, 113549, 1, 9, 16, 3, 28])
    }

    // CMP / CRMF
    pub fn password_based_mac() -> Oid {
        Oid::new(&[1, 2, 840, 113533, 7, 66, 13])
    }
    pub fn kem_based_mac() -> Oid {
        Oid::new(&[1, 2, 840, 113533, 7, 66, 16])
    }
    pub fn reg_ctrl_old_cert_id() -> Oid {
        Oid::new(&[1, 3, 6, 1, 5, 5, 7, 5, 1, 5])
    }
    pub fn it_sign_key_pair_types() -> Oid {
        Oid::new(&[1, 3, 6, 1, 5, 5, 7, 4, 3])
    }
    pub fn it_implicit_confirm() -> Oid {
        Oid::new(&[1, 3, 6, 1, 5, 5, 7, 4, 13])
    }
    pub fn it_ca_certs() -> Oid {
        Oid::new(&[1, 3, 6, 1, 5, 5, 7, 4, 17])
    }
    pub fn it_kem_ciphertext_info() -> Oid {
        Oid::new(&[1, 3, 6, 1, 5, 5, 7, 4, 24])
    }

    // X.509 extensions
    pub fn subject_key_identifier() -> Oid {
        Oid::new(&[2, 5, 29, 14])
    }
    pub fn key_usage() -> Oid {
        Oid::new(&[2, 5, 29, 15])
    }
    pub fn basic_constraints() -> Oid {
        Oid::new(&[2, 5, 29, 19])
    }
    pub fn authority_key_identifier() -> Oid {
        Oid::new(&[2, 5, 29, 35])
    }

    // Distinguished name attributes
    pub fn common_name() -> Oid {
        Oid::new(&[2, 5, 4, 3])
    }
    pub fn serial_number() -> Oid {
        Oid::new(&[2, 5, 4, 5])
    }
    pub fn country_name() -> Oid {
        Oid::new(&[2, 5, 4, 6])
    }
    pub fn locality_name() -> Oid {
        Oid::new(&[2, 5, 4, 7])
    }
    pub fn state_or_province_name() -> Oid {
        Oid::new(&[2, 5, 4, 8])
    }
    pub fn organization_name() -> Oid {
        Oid::new(&[2, 5, 4, 10])
    }
    pub fn organizational_unit_name() -> Oid {
        Oid::new(&[2, 5, 4, 11])
    }
    pub fn email_address() -> Oid {
        Oid::new(&[1, 2, 840, 113549, 1, 9, 1])
    }
}

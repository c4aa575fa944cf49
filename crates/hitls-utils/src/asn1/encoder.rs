//! ASN.1 DER encoder.

use chrono::{DateTime, Datelike, Utc};

/// A builder for constructing DER-encoded ASN.1 data.
pub struct Encoder {
    buf: Vec<u8>,
}

impl Encoder {
    /// Create a new encoder.
    pub fn new() -> Self {
        Self { buf: Vec::new() }
    }

    /// Consume the encoder and return the encoded bytes.
    pub fn finish(self) -> Vec<u8> {
        self.buf
    }

    /// Write a TLV with the given identifier octet and content.
    pub fn write_tlv(&mut self, tag: u8, value: &[u8]) -> &mut Self {
        self.buf.push(tag);
        self.write_length(value.len());
        self.buf.extend_from_slice(value);
        self
    }

    fn write_length(&mut self, length: usize) {
        if length < 0x80 {
            self.buf.push(length as u8);
            return;
        }
        let bytes = length.to_be_bytes();
        let skip = bytes.iter().take_while(|&&b| b == 0).count();
        self.buf.push(0x80 | (bytes.len() - skip) as u8);
        self.buf.extend_from_slice(&bytes[skip..]);
    }

    /// Build the content of a constructed element with `f` and write it
    /// under `tag`.
    pub fn write_nested<F>(&mut self, tag: u8, f: F) -> &mut Self
    where
        F: FnOnce(&mut Encoder),
    {
        let mut inner = Encoder::new();
        f(&mut inner);
        self.write_tlv(tag, &inner.buf)
    }

    /// Write a non-negative INTEGER from big-endian magnitude bytes.
    /// Redundant leading zeros are dropped, a zero is prepended when the
    /// high bit is set.
    pub fn write_integer(&mut self, value: &[u8]) -> &mut Self {
        let skip = value.iter().take_while(|&&b| b == 0).count();
        let trimmed = &value[skip..];
        if trimmed.is_empty() {
            return self.write_tlv(0x02, &[0x00]);
        }
        if trimmed[0] & 0x80 != 0 {
            let mut padded = Vec::with_capacity(trimmed.len() + 1);
            padded.push(0x00);
            padded.extend_from_slice(trimmed);
            self.write_tlv(0x02, &padded)
        } else {
            self.write_tlv(0x02, trimmed)
        }
    }

    /// Write a signed INTEGER in minimal two's complement form.
    pub fn write_i64(&mut self, value: i64) -> &mut Self {
        let bytes = value.to_be_bytes();
        let mut start = 0;
        while start < bytes.len() - 1 {
            let redundant = (bytes[start] == 0x00 && bytes[start + 1] & 0x80 == 0)
                || (bytes[start] == 0xFF && bytes[start + 1] & 0x80 != 0);
            if !redundant {
                break;
            }
            start += 1;
        }
        self.write_tlv(0x02, &bytes[start..])
    }

    /// Write an OCTET STRING.
    pub fn write_octet_string(&mut self, value: &[u8]) -> &mut Self {
        self.write_tlv(0x04, value)
    }

    /// Write a BIT STRING with the given unused_bits count.
    pub fn write_bit_string(&mut self, unused_bits: u8, value: &[u8]) -> &mut Self {
        let mut content = Vec::with_capacity(value.len() + 1);
        content.push(unused_bits);
        content.extend_from_slice(value);
        self.write_tlv(0x03, &content)
    }

    /// Write an OID from its content octets.
    pub fn write_oid(&mut self, oid_bytes: &[u8]) -> &mut Self {
        self.write_tlv(0x06, oid_bytes)
    }

    pub fn write_null(&mut self) -> &mut Self {
        self.write_tlv(0x05, &[])
    }

    /// Write a SEQUENCE wrapping already encoded contents.
    pub fn write_sequence(&mut self, contents: &[u8]) -> &mut Self {
        self.write_tlv(0x30, contents)
    }

    /// Write a SET wrapping already encoded contents.
    pub fn write_set(&mut self, contents: &[u8]) -> &mut Self {
        self.write_tlv(0x31, contents)
    }

    /// Write bytes that are already DER.
    pub fn write_raw(&mut self, data: &[u8]) -> &mut Self {
        self.buf.extend_from_slice(data);
        self
    }

    pub fn write_utf8_string(&mut self, s: &str) -> &mut Self {
        self.write_tlv(0x0C, s.as_bytes())
    }

    pub fn write_printable_string(&mut self, s: &str) -> &mut Self {
        self.write_tlv(0x13, s.as_bytes())
    }

    pub fn write_ia5_string(&mut self, s: &str) -> &mut Self {
        self.write_tlv(0x16, s.as_bytes())
    }

    pub fn write_boolean(&mut self, val: bool) -> &mut Self {
        self.write_tlv(0x01, &[if val { 0xFF } else { 0x00 }])
    }

    /// Write a context-specific tagged value.
    pub fn write_context_specific(
        &mut self,
        tag_num: u8,
        constructed: bool,
        content: &[u8],
    ) -> &mut Self {
        let tag = 0x80 | (if constructed { 0x20 } else { 0 }) | (tag_num & 0x1F);
        self.write_tlv(tag, content)
    }

    /// Write `[tag_num] EXPLICIT` around an already encoded element.
    pub fn write_explicit(&mut self, tag_num: u8, inner: &[u8]) -> &mut Self {
        self.write_context_specific(tag_num, true, inner)
    }

    /// Write a UTCTime, `YYMMDDHHMMSSZ`.
    pub fn write_utc_time(&mut self, time: &DateTime<Utc>) -> &mut Self {
        let s = time.format("%y%m%d%H%M%SZ").to_string();
        self.write_tlv(0x17, s.as_bytes())
    }

    /// Write a GeneralizedTime, `YYYYMMDDHHMMSSZ`.
    pub fn write_generalized_time(&mut self, time: &DateTime<Utc>) -> &mut Self {
        let s = time.format("%Y%m%d%H%M%SZ").to_string();
        self.write_tlv(0x18, s.as_bytes())
    }

    /// Write an X.509 Time: UTCTime for 1950..=2049, GeneralizedTime otherwise.
    pub fn write_time(&mut self, time: &DateTime<Utc>) -> &mut Self {
        if (1950..2050).contains(&time.year()) {
            self.write_utc_time(time)
        } else {
            self.write_generalized_time(time)
        }
    }
}

impl Default for Encoder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asn1::Decoder;
    use chrono::TimeZone;

    #[test]
    fn test_write_i64() {
        let encode = |v: i64| {
            let mut enc = Encoder::new();
            enc.write_i64(v);
            enc.finish()
        };
        assert_eq!(encode(0), vec![0x02, 0x01, 0x00]);
        assert_eq!(encode(-1), vec![0x02, 0x01, 0xFF]);
        assert_eq!(encode(127), vec![0x02, 0x01, 0x7F]);
        assert_eq!(encode(128), vec![0x02, 0x02, 0x00, 0x80]);
        assert_eq!(encode(-129), vec![0x02, 0x02, 0xFF, 0x7F]);
    }

    #[test]
    fn test_write_integer_trims_zeros() {
        let mut enc = Encoder::new();
        enc.write_integer(&[0x00, 0x00, 0x01]);
        enc.write_integer(&[0x80]);
        enc.write_integer(&[]);
        assert_eq!(
            enc.finish(),
            vec![0x02, 0x01, 0x01, 0x02, 0x02, 0x00, 0x80, 0x02, 0x01, 0x00]
        );
    }

    #[test]
    fn test_long_length() {
        let mut enc = Encoder::new();
        enc.write_octet_string(&[0xAB; 300]);
        let der = enc.finish();
        assert_eq!(&der[..4], &[0x04, 0x82, 0x01, 0x2C]);
        assert_eq!(der.len(), 304);
    }

    #[test]
    fn test_write_nested_explicit() {
        let mut enc = Encoder::new();
        enc.write_nested(0x30, |seq| {
            seq.write_i64(2);
            seq.write_explicit(4, &[0x04, 0x01, 0x07]);
        });
        assert_eq!(
            enc.finish(),
            vec![0x30, 0x08, 0x02, 0x01, 0x02, 0xA4, 0x03, 0x04, 0x01, 0x07]
        );
    }

    #[test]
    fn test_write_generalized_time() {
        let t = Utc.with_ymd_and_hms(2050, 6, 20, 0, 0, 0).unwrap();
        let mut enc = Encoder::new();
        enc.write_time(&t);
        let der = enc.finish();
        assert_eq!(der[0], 0x18);
        assert_eq!(&der[2..], b"20500620000000Z");
    }

    #[test]
    fn test_write_time_roundtrip() {
        let t = Utc.with_ymd_and_hms(2025, 1, 15, 12, 0, 0).unwrap();
        let mut enc = Encoder::new();
        enc.write_time(&t);
        let der = enc.finish();
        assert_eq!(&der[2..], b"250115120000Z");
        let mut dec = Decoder::new(&der);
        assert_eq!(dec.read_time().unwrap(), t);
    }
}

//! ASN.1 DER decoder.

use super::{Tag, TagClass, Tlv};
use chrono::{DateTime, NaiveDateTime, Utc};
use hitls_types::CryptoError;

/// A streaming ASN.1 DER decoder.
pub struct Decoder<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Decoder<'a> {
    /// Create a new decoder over the given data.
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Returns the remaining undecoded bytes.
    pub fn remaining(&self) -> &'a [u8] {
        &self.data[self.pos..]
    }

    /// Returns true if all data has been consumed.
    pub fn is_empty(&self) -> bool {
        self.pos >= self.data.len()
    }

    /// Fails if anything is left after the last element.
    pub fn finish(&self) -> Result<(), CryptoError> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(CryptoError::DecodeAsn1Fail)
        }
    }

    /// Parse the next TLV element.
    pub fn read_tlv(&mut self) -> Result<Tlv<'a>, CryptoError> {
        let start = self.pos;
        let (tag, tag_len) = Tag::from_bytes(self.remaining())?;
        self.pos += tag_len;

        let length = self.read_length()?;
        let end = self
            .pos
            .checked_add(length)
            .filter(|&end| end <= self.data.len())
            .ok_or(CryptoError::DecodeAsn1Fail)?;

        let value = &self.data[self.pos..end];
        self.pos = end;
        Ok(Tlv {
            tag,
            value,
            raw: &self.data[start..end],
        })
    }

    fn read_length(&mut self) -> Result<usize, CryptoError> {
        let first = *self
            .data
            .get(self.pos)
            .ok_or(CryptoError::DecodeAsn1Fail)?;
        self.pos += 1;

        if first < 0x80 {
            return Ok(first as usize);
        }
        // 0x80 is the BER indefinite form
        let num_bytes = (first & 0x7F) as usize;
        if num_bytes == 0 || num_bytes > 4 || self.pos + num_bytes > self.data.len() {
            return Err(CryptoError::DecodeAsn1Fail);
        }
        let length = self.data[self.pos..self.pos + num_bytes]
            .iter()
            .fold(0usize, |acc, &b| (acc << 8) | b as usize);
        self.pos += num_bytes;
        Ok(length)
    }

    /// Read the next element and return its complete encoding.
    pub fn read_raw_tlv(&mut self) -> Result<&'a [u8], CryptoError> {
        Ok(self.read_tlv()?.raw)
    }

    fn read_universal(&mut self, number: u32) -> Result<Tlv<'a>, CryptoError> {
        let tlv = self.read_tlv()?;
        if !tlv.tag.is_universal(number) {
            return Err(CryptoError::DecodeAsn1Fail);
        }
        Ok(tlv)
    }

    /// Read an INTEGER and return its content octets.
    pub fn read_integer(&mut self) -> Result<&'a [u8], CryptoError> {
        let tlv = self.read_universal(0x02)?;
        if tlv.value.is_empty() {
            return Err(CryptoError::DecodeAsn1Fail);
        }
        Ok(tlv.value)
    }

    /// Read an INTEGER that fits into an `i64`.
    pub fn read_i64(&mut self) -> Result<i64, CryptoError> {
        let value = self.read_integer()?;
        if value.len() > 8 {
            return Err(CryptoError::DecodeAsn1Fail);
        }
        let init: i64 = if value[0] & 0x80 != 0 { -1 } else { 0 };
        Ok(value
            .iter()
            .fold(init, |acc, &b| (acc << 8) | i64::from(b)))
    }

    /// Read an OCTET STRING.
    pub fn read_octet_string(&mut self) -> Result<&'a [u8], CryptoError> {
        Ok(self.read_universal(0x04)?.value)
    }

    /// Read a BIT STRING and return (unused_bits, data).
    pub fn read_bit_string(&mut self) -> Result<(u8, &'a [u8]), CryptoError> {
        let tlv = self.read_universal(0x03)?;
        match tlv.value.split_first() {
            Some((&unused, data)) if unused < 8 => Ok((unused, data)),
            _ => Err(CryptoError::DecodeAsn1Fail),
        }
    }

    /// Read an OID and return its content octets.
    pub fn read_oid(&mut self) -> Result<&'a [u8], CryptoError> {
        Ok(self.read_universal(0x06)?.value)
    }

    pub fn read_null(&mut self) -> Result<(), CryptoError> {
        let tlv = self.read_universal(0x05)?;
        if !tlv.value.is_empty() {
            return Err(CryptoError::DecodeAsn1Fail);
        }
        Ok(())
    }

    /// Read a SEQUENCE, returning a sub-decoder over its contents.
    pub fn read_sequence(&mut self) -> Result<Decoder<'a>, CryptoError> {
        let tlv = self.read_universal(0x10)?;
        if !tlv.tag.constructed {
            return Err(CryptoError::DecodeAsn1Fail);
        }
        Ok(Decoder::new(tlv.value))
    }

    /// Read a SET, returning a sub-decoder over its contents.
    pub fn read_set(&mut self) -> Result<Decoder<'a>, CryptoError> {
        let tlv = self.read_universal(0x11)?;
        if !tlv.tag.constructed {
            return Err(CryptoError::DecodeAsn1Fail);
        }
        Ok(Decoder::new(tlv.value))
    }

    /// Peek at the next tag without consuming it.
    pub fn peek_tag(&self) -> Result<Tag, CryptoError> {
        if self.is_empty() {
            return Err(CryptoError::DecodeAsn1Fail);
        }
        let (tag, _) = Tag::from_bytes(self.remaining())?;
        Ok(tag)
    }

    /// Read a BOOLEAN value (DER: 0x00=false, 0xFF=true).
    pub fn read_boolean(&mut self) -> Result<bool, CryptoError> {
        let tlv = self.read_universal(0x01)?;
        match tlv.value {
            [0x00] => Ok(false),
            [0xFF] => Ok(true),
            _ => Err(CryptoError::DecodeAsn1Fail),
        }
    }

    /// Read a context-specific tagged value with the expected tag number.
    pub fn read_context_specific(
        &mut self,
        tag_num: u32,
        constructed: bool,
    ) -> Result<Tlv<'a>, CryptoError> {
        let tlv = self.read_tlv()?;
        if tlv.tag != Tag::context(tag_num, constructed) {
            return Err(CryptoError::DecodeAsn1Fail);
        }
        Ok(tlv)
    }

    /// Try to read a context-specific tagged value. Returns `None` if
    /// the next tag does not match, without consuming any bytes.
    pub fn try_read_context_specific(
        &mut self,
        tag_num: u32,
        constructed: bool,
    ) -> Result<Option<Tlv<'a>>, CryptoError> {
        if self.is_empty() {
            return Ok(None);
        }
        if self.peek_tag()? == Tag::context(tag_num, constructed) {
            Ok(Some(self.read_tlv()?))
        } else {
            Ok(None)
        }
    }

    /// Read `[tag_num] EXPLICIT`, returning a decoder over the wrapped element.
    pub fn read_explicit(&mut self, tag_num: u32) -> Result<Decoder<'a>, CryptoError> {
        let tlv = self.read_context_specific(tag_num, true)?;
        Ok(Decoder::new(tlv.value))
    }

    /// Optional variant of [`Decoder::read_explicit`].
    pub fn try_read_explicit(&mut self, tag_num: u32) -> Result<Option<Decoder<'a>>, CryptoError> {
        Ok(self
            .try_read_context_specific(tag_num, true)?
            .map(|tlv| Decoder::new(tlv.value)))
    }

    /// Read a string value (UTF8String, PrintableString, IA5String,
    /// T61String or BMPString).
    pub fn read_string(&mut self) -> Result<String, CryptoError> {
        let tlv = self.read_tlv()?;
        if tlv.tag.class != TagClass::Universal {
            return Err(CryptoError::DecodeAsn1Fail);
        }
        match tlv.tag.number {
            0x0C | 0x13 | 0x16 => {
                String::from_utf8(tlv.value.to_vec()).map_err(|_| CryptoError::DecodeAsn1Fail)
            }
            // T61String, read as Latin-1
            0x14 => Ok(tlv.value.iter().map(|&b| b as char).collect()),
            // BMPString, UTF-16BE
            0x1E => {
                if tlv.value.len() % 2 != 0 {
                    return Err(CryptoError::DecodeAsn1Fail);
                }
                let units: Vec<u16> = tlv
                    .value
                    .chunks_exact(2)
                    .map(|c| u16::from_be_bytes([c[0], c[1]]))
                    .collect();
                String::from_utf16(&units).map_err(|_| CryptoError::DecodeAsn1Fail)
            }
            _ => Err(CryptoError::DecodeAsn1Fail),
        }
    }

    /// Read a UTCTime or GeneralizedTime.
    pub fn read_time(&mut self) -> Result<DateTime<Utc>, CryptoError> {
        let tlv = self.read_tlv()?;
        let s = core::str::from_utf8(tlv.value).map_err(|_| CryptoError::DecodeAsn1Fail)?;
        let s = s.strip_suffix('Z').ok_or(CryptoError::DecodeAsn1Fail)?;
        let full = if tlv.tag.is_universal(0x17) {
            // RFC 5280: 00-49 is 20xx, 50-99 is 19xx
            let yy: u32 = s
                .get(0..2)
                .and_then(|y| y.parse().ok())
                .ok_or(CryptoError::DecodeAsn1Fail)?;
            format!("{}{s}", if yy < 50 { "20" } else { "19" })
        } else if tlv.tag.is_universal(0x18) {
            // fractional seconds are dropped
            s.split('.').next().unwrap_or(s).to_string()
        } else {
            return Err(CryptoError::DecodeAsn1Fail);
        };
        NaiveDateTime::parse_from_str(&full, "%Y%m%d%H%M%S")
            .map(|t| t.and_utc())
            .map_err(|_| CryptoError::DecodeAsn1Fail)
    }
}

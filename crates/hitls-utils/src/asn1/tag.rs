//! Identifier octet parsing and encoding.

use super::{Tag, TagClass};
use hitls_types::CryptoError;

impl Tag {
    /// A context-specific tag `[number]`.
    pub fn context(number: u32, constructed: bool) -> Self {
        Self {
            class: TagClass::ContextSpecific,
            constructed,
            number,
        }
    }

    /// True for a universal tag with the given number.
    pub fn is_universal(&self, number: u32) -> bool {
        self.class == TagClass::Universal && self.number == number
    }

    /// True for a context-specific tag with the given number, either form.
    pub fn is_context(&self, number: u32) -> bool {
        self.class == TagClass::ContextSpecific && self.number == number
    }

    /// Parse the identifier octets at the start of `input`.
    /// Returns the tag and the number of bytes consumed.
    pub fn from_bytes(input: &[u8]) -> Result<(Self, usize), CryptoError> {
        let first = *input.first().ok_or(CryptoError::NullInput)?;
        let class = match first >> 6 {
            0 => TagClass::Universal,
            1 => TagClass::Application,
            2 => TagClass::ContextSpecific,
            _ => TagClass::Private,
        };
        let constructed = first & 0x20 != 0;

        if first & 0x1F != 0x1F {
            let tag = Tag {
                class,
                constructed,
                number: u32::from(first & 0x1F),
            };
            return Ok((tag, 1));
        }

        // High tag number form: base-128, most significant group first.
        let mut number: u32 = 0;
        for (i, &byte) in input.iter().enumerate().skip(1) {
            number = number
                .checked_mul(128)
                .ok_or(CryptoError::DecodeAsn1Fail)?
                | u32::from(byte & 0x7F);
            if byte & 0x80 == 0 {
                let tag = Tag {
                    class,
                    constructed,
                    number,
                };
                return Ok((tag, i + 1));
            }
        }
        Err(CryptoError::DecodeAsn1Fail)
    }

    /// Encode this tag as identifier octets.
    pub fn to_bytes(&self) -> Vec<u8> {
        let class_bits: u8 = match self.class {
            TagClass::Universal => 0x00,
            TagClass::Application => 0x40,
            TagClass::ContextSpecific => 0x80,
            TagClass::Private => 0xC0,
        };
        let lead = class_bits | (if self.constructed { 0x20 } else { 0x00 });
        if self.number < 0x1F {
            return vec![lead | self.number as u8];
        }

        let mut groups = Vec::new();
        let mut n = self.number;
        while n > 0 {
            groups.push((n & 0x7F) as u8);
            n >>= 7;
        }
        let mut out = Vec::with_capacity(groups.len() + 1);
        out.push(lead | 0x1F);
        let last = groups.len() - 1;
        for (i, g) in groups.iter().rev().enumerate() {
            out.push(if i < last { g | 0x80 } else { *g });
        }
        out
    }
}

/// Hash algorithm identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HashAlgId {
    Sha1,
    Sha224,
    Sha256,
    Sha384,
    Sha512,
}

impl HashAlgId {
    /// Digest length in bytes.
    pub fn output_size(self) -> usize {
        match self {
            HashAlgId::Sha1 => 20,
            HashAlgId::Sha224 => 28,
            HashAlgId::Sha256 => 32,
            HashAlgId::Sha384 => 48,
            HashAlgId::Sha512 => 64,
        }
    }

    /// Lower-case name as accepted on the command line.
    pub fn name(self) -> &'static str {
        match self {
            HashAlgId::Sha1 => "sha1",
            HashAlgId::Sha224 => "sha224",
            HashAlgId::Sha256 => "sha256",
            HashAlgId::Sha384 => "sha384",
            HashAlgId::Sha512 => "sha512",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().replace('-', "").as_str() {
            "sha1" => Some(HashAlgId::Sha1),
            "sha224" => Some(HashAlgId::Sha224),
            "sha256" => Some(HashAlgId::Sha256),
            "sha384" => Some(HashAlgId::Sha384),
            "sha512" => Some(HashAlgId::Sha512),
            _ => None,
        }
    }
}

/// MAC algorithm identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MacAlgId {
    HmacSha1,
    HmacSha224,
    HmacSha256,
    HmacSha384,
    HmacSha512,
}

impl MacAlgId {
    /// The digest the HMAC construction is keyed over.
    pub fn hash(self) -> HashAlgId {
        match self {
            MacAlgId::HmacSha1 => HashAlgId::Sha1,
            MacAlgId::HmacSha224 => HashAlgId::Sha224,
            MacAlgId::HmacSha256 => HashAlgId::Sha256,
            MacAlgId::HmacSha384 => HashAlgId::Sha384,
            MacAlgId::HmacSha512 => HashAlgId::Sha512,
        }
    }

    pub fn from_hash(hash: HashAlgId) -> Self {
        match hash {
            HashAlgId::Sha1 => MacAlgId::HmacSha1,
            HashAlgId::Sha224 => MacAlgId::HmacSha224,
            HashAlgId::Sha256 => MacAlgId::HmacSha256,
            HashAlgId::Sha384 => MacAlgId::HmacSha384,
            HashAlgId::Sha512 => MacAlgId::HmacSha512,
        }
    }

    /// Tag length in bytes.
    pub fn output_size(self) -> usize {
        self.hash().output_size()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mac_hash_pairing() {
        for h in [
            HashAlgId::Sha1,
            HashAlgId::Sha224,
            HashAlgId::Sha256,
            HashAlgId::Sha384,
            HashAlgId::Sha512,
        ] {
            assert_eq!(MacAlgId::from_hash(h).hash(), h);
        }
        assert_eq!(MacAlgId::HmacSha1.output_size(), 20);
    }

    #[test]
    fn test_hash_from_name() {
        assert_eq!(HashAlgId::from_name("SHA-256"), Some(HashAlgId::Sha256));
        assert_eq!(HashAlgId::from_name("sha512"), Some(HashAlgId::Sha512));
        assert_eq!(HashAlgId::from_name("md5"), None);
    }
}

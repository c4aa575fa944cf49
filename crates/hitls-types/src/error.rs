/// Cryptographic primitive errors.
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    #[error("null or empty input")]
    NullInput,
    #[error("invalid argument")]
    InvalidArg,
    #[error("operation not supported")]
    NotSupported,
    #[error("invalid key")]
    InvalidKey,
    #[error("signature verification failed")]
    VerifyFail,

    // DRBG errors
    #[error("drbg: failed to obtain entropy")]
    DrbgEntropyFail,

    // KDF errors
    #[error("kdf: derived key length overflow")]
    KdfDkLenOverflow,
    #[error("kdf: iteration count {0} out of range")]
    InvalidIterationCount(u32),

    // Encoding/Decoding errors
    #[error("decode: asn1 buffer failed")]
    DecodeAsn1Fail,
    #[error("decode: unknown oid")]
    DecodeUnknownOid,
}

/// PKI certificate errors.
#[derive(Debug, thiserror::Error)]
pub enum PkiError {
    #[error("invalid certificate: {0}")]
    InvalidCert(String),
    #[error("certificate chain verification failed: {0}")]
    ChainVerifyFailed(String),
    #[error("maximum chain depth {0} exceeded")]
    MaxDepthExceeded(usize),
    #[error("unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),
    #[error("asn1 parse error: {0}")]
    Asn1Error(String),
    #[error("crypto error: {0}")]
    CryptoError(#[from] CryptoError),
}

/// HTTP transfer errors.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("http status {code} {reason}")]
    HttpStatus { code: u16, reason: String },
    #[error("malformed http message: {0}")]
    MalformedHttp(String),
    #[error("missing content-length header")]
    MissingContentLength,
    #[error("message body exceeds limit of {limit} bytes")]
    BodyTooLarge { limit: usize },
    #[error("unexpected content type: {0}")]
    UnexpectedContentType(String),
    #[error("malformed CMP message: {0}")]
    MalformedMessage(String),
}

/// Coarse classification of [`CmpError`] values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CmpErrorKind {
    /// The caller supplied missing or inconsistent credentials/settings.
    Configuration,
    /// The peer sent something the transaction does not allow.
    ProtocolViolation,
    /// Encoding, decoding or primitive failure.
    Encoding,
    /// Deliberately injected by the mock server.
    Injected,
    /// HTTP transfer failure.
    Transport,
}

/// CMP protection and mock server errors.
#[derive(Debug, thiserror::Error)]
pub enum CmpError {
    // Configuration errors
    #[error("missing key input for creating protection")]
    MissingCredentials,
    #[error("missing shared secret")]
    MissingSecret,
    #[error("missing private key")]
    MissingKey,
    #[error("certificate does not match private key")]
    CertKeyMismatch,
    #[error("missing sender identification: NULL-DN sender without senderKID")]
    MissingSenderIdentification,
    #[error("missing or unknown protection algorithm identifier")]
    UnknownAlgorithmId,
    #[error("no certificate configured for confirmation")]
    NoCertToConfirm,
    #[error("invalid arguments: {0}")]
    InvalidArgs(String),

    // Encoding errors
    #[error("malformed algorithm parameters: {0}")]
    MalformedAlgorithmParameters(String),
    #[error("unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),
    #[error("encoding failure: {0}")]
    EncodingFailure(String),
    #[error("iteration count {0} out of range")]
    BadIterationCount(u32),
    #[error("pki error: {0}")]
    Pki(#[from] PkiError),
    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),

    // Protocol violations
    #[error("already in polling mode")]
    AlreadyPolling,
    #[error("not in polling mode")]
    NotPolling,
    #[error("missing certificate id")]
    MissingCertId,
    #[error("wrong certificate id")]
    WrongCertId,
    #[error("request rejected: {0}")]
    RequestRejected(String),
    #[error("bad request id: expected {expected}, got {got}")]
    BadRequestId { expected: i64, got: i64 },
    #[error("certificate hash mismatch")]
    HashMismatch,
    #[error("message protection verification failed")]
    ProtectionMismatch,
    #[error("message is not protected")]
    MissingProtection,
    #[error("unexpected message body: {0}")]
    UnexpectedBody(String),
    #[error("multiple requests not supported")]
    MultipleRequestsNotSupported,
    #[error("too many info values: {0}")]
    TooManyInfoValues(usize),

    #[error("injected error for {0} request")]
    Injected(String),

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
}

impl CmpError {
    pub fn kind(&self) -> CmpErrorKind {
        match self {
            CmpError::MissingCredentials
            | CmpError::MissingSecret
            | CmpError::MissingKey
            | CmpError::CertKeyMismatch
            | CmpError::MissingSenderIdentification
            | CmpError::UnknownAlgorithmId
            | CmpError::NoCertToConfirm
            | CmpError::InvalidArgs(_) => CmpErrorKind::Configuration,
            CmpError::MalformedAlgorithmParameters(_)
            | CmpError::UnsupportedAlgorithm(_)
            | CmpError::EncodingFailure(_)
            | CmpError::BadIterationCount(_)
            | CmpError::Pki(_)
            | CmpError::Crypto(_) => CmpErrorKind::Encoding,
            CmpError::AlreadyPolling
            | CmpError::NotPolling
            | CmpError::MissingCertId
            | CmpError::WrongCertId
            | CmpError::RequestRejected(_)
            | CmpError::BadRequestId { .. }
            | CmpError::HashMismatch
            | CmpError::ProtectionMismatch
            | CmpError::MissingProtection
            | CmpError::UnexpectedBody(_)
            | CmpError::MultipleRequestsNotSupported
            | CmpError::TooManyInfoValues(_) => CmpErrorKind::ProtocolViolation,
            CmpError::Injected(_) => CmpErrorKind::Injected,
            CmpError::Transport(_) => CmpErrorKind::Transport,
        }
    }
}

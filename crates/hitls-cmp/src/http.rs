//! CMP over HTTP (RFC 6712), one POST per message.
//!
//! Works on any `Read + Write` stream so the same code drives a
//! `TcpStream` or an in-memory pipe in tests.

use std::io::{Read, Write};

use hitls_types::TransportError;
use tracing::{debug, warn};

use crate::msg::PkiMessage;
use crate::server::MockServer;

pub const CONTENT_TYPE: &str = "application/pkixcmp";
/// Default bound on a received message body.
pub const DEFAULT_MAX_RESP_LEN: usize = 100 * 1024;
const MAX_HEAD_LEN: usize = 8 * 1024;
const MAX_HEADERS: usize = 32;

/// Header fields of an HTTP message.
struct Head {
    headers: Vec<(String, String)>,
}

impl Head {
    fn from_parsed(headers: &[httparse::Header<'_>]) -> Result<Self, TransportError> {
        let headers = headers
            .iter()
            .map(|h| {
                std::str::from_utf8(h.value)
                    .map(|v| (h.name.to_string(), v.trim().to_string()))
                    .map_err(|_| TransportError::MalformedHttp(format!("non-UTF-8 {}", h.name)))
            })
            .collect::<Result<_, _>>()?;
        Ok(Self { headers })
    }

    fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    fn content_length(&self) -> Result<usize, TransportError> {
        let value = self
            .header("Content-Length")
            .ok_or(TransportError::MissingContentLength)?;
        value
            .parse()
            .map_err(|_| TransportError::MalformedHttp(format!("Content-Length: {value}")))
    }

    fn check_content_type(&self) -> Result<(), TransportError> {
        match self.header("Content-Type") {
            Some(ct) if !media_type(ct).eq_ignore_ascii_case(CONTENT_TYPE) => {
                Err(TransportError::UnexpectedContentType(ct.to_string()))
            }
            _ => Ok(()),
        }
    }
}

struct RequestHead {
    method: String,
    head: Head,
}

struct ResponseHead {
    code: u16,
    reason: String,
    head: Head,
}

fn media_type(value: &str) -> &str {
    value.split(';').next().unwrap_or(value).trim()
}

fn malformed(e: httparse::Error) -> TransportError {
    TransportError::MalformedHttp(e.to_string())
}

fn parse_request_head(buf: &[u8]) -> Result<Option<(usize, RequestHead)>, TransportError> {
    let mut headers = [httparse::EMPTY_HEADER; MAX_HEADERS];
    let mut req = httparse::Request::new(&mut headers);
    let httparse::Status::Complete(len) = req.parse(buf).map_err(malformed)? else {
        return Ok(None);
    };
    let method = req.method.unwrap_or_default().to_string();
    Ok(Some((
        len,
        RequestHead {
            method,
            head: Head::from_parsed(req.headers)?,
        },
    )))
}

fn parse_response_head(buf: &[u8]) -> Result<Option<(usize, ResponseHead)>, TransportError> {
    let mut headers = [httparse::EMPTY_HEADER; MAX_HEADERS];
    let mut rsp = httparse::Response::new(&mut headers);
    let httparse::Status::Complete(len) = rsp.parse(buf).map_err(malformed)? else {
        return Ok(None);
    };
    Ok(Some((
        len,
        ResponseHead {
            code: rsp.code.unwrap_or_default(),
            reason: rsp.reason.unwrap_or_default().to_string(),
            head: Head::from_parsed(rsp.headers)?,
        },
    )))
}

/// Read until `parse` sees a complete head. At most `MAX_HEAD_LEN` bytes are
/// buffered; the bytes read past the head are returned with it.
fn read_head<R: Read, H>(
    reader: &mut R,
    parse: fn(&[u8]) -> Result<Option<(usize, H)>, TransportError>,
) -> Result<(H, Vec<u8>), TransportError> {
    let mut buf = vec![0u8; MAX_HEAD_LEN];
    let mut filled = 0;
    while filled < MAX_HEAD_LEN {
        let n = reader.read(&mut buf[filled..])?;
        if n == 0 {
            return Err(TransportError::MalformedHttp("connection closed in header".into()));
        }
        filled += n;
        if let Some((len, head)) = parse(&buf[..filled])? {
            return Ok((head, buf[len..filled].to_vec()));
        }
    }
    Err(TransportError::MalformedHttp("header too long".into()))
}

/// Complete the body from what followed the head plus the rest of `reader`.
fn read_body<R: Read>(
    reader: &mut R,
    head: &Head,
    mut body: Vec<u8>,
    limit: usize,
) -> Result<Vec<u8>, TransportError> {
    let len = head.content_length()?;
    if len > limit {
        return Err(TransportError::BodyTooLarge { limit });
    }
    let have = body.len().min(len);
    body.resize(len, 0);
    reader.read_exact(&mut body[have..])?;
    Ok(body)
}

fn decode(body: &[u8]) -> Result<PkiMessage, TransportError> {
    PkiMessage::from_der(body).map_err(|e| TransportError::MalformedMessage(e.to_string()))
}

/// Client side of the HTTP transfer.
#[derive(Debug, Clone)]
pub struct HttpTransfer {
    host: String,
    path: String,
    max_resp_len: usize,
}

impl HttpTransfer {
    pub fn new(host: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            path: path.into(),
            max_resp_len: DEFAULT_MAX_RESP_LEN,
        }
    }

    pub fn with_max_resp_len(mut self, max: usize) -> Self {
        self.max_resp_len = max;
        self
    }

    /// POST `request` and read back exactly one CMP message.
    pub fn send_receive<S: Read + Write>(
        &self,
        stream: &mut S,
        request: &PkiMessage,
    ) -> Result<PkiMessage, TransportError> {
        let der = request
            .to_der()
            .map_err(|e| TransportError::MalformedMessage(e.to_string()))?;
        let head = format!(
            "POST {} HTTP/1.0\r\nHost: {}\r\nContent-Type: {CONTENT_TYPE}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
            self.path,
            self.host,
            der.len()
        );
        stream.write_all(head.as_bytes())?;
        stream.write_all(&der)?;
        stream.flush()?;
        debug!(body = %request.body_type(), len = der.len(), "sent request");

        let (rsp, rest) = read_head(stream, parse_response_head)?;
        if !(200..300).contains(&rsp.code) {
            return Err(TransportError::HttpStatus {
                code: rsp.code,
                reason: rsp.reason,
            });
        }
        rsp.head.check_content_type()?;
        let body = read_body(stream, &rsp.head, rest, self.max_resp_len)?;
        let response = decode(&body)?;
        debug!(body = %response.body_type(), len = body.len(), "received response");
        Ok(response)
    }
}

fn write_response<S: Write>(
    stream: &mut S,
    code: u16,
    reason: &str,
    body: &[u8],
) -> Result<(), TransportError> {
    let mut head = format!("HTTP/1.0 {code} {reason}\r\n");
    if code == 200 {
        head.push_str(&format!("Content-Type: {CONTENT_TYPE}\r\n"));
    }
    head.push_str(&format!(
        "Content-Length: {}\r\nConnection: close\r\n\r\n",
        body.len()
    ));
    stream.write_all(head.as_bytes())?;
    stream.write_all(body)?;
    stream.flush()?;
    Ok(())
}

/// Read one POST from `stream`, let `server` answer it and write the reply.
///
/// A malformed request gets a 4xx status and ends the server's current
/// transaction before the error is returned.
pub fn serve_one<S: Read + Write>(
    stream: &mut S,
    server: &mut MockServer,
    max_req_len: usize,
) -> Result<(), TransportError> {
    let request = match read_request(stream, max_req_len) {
        Ok(req) => req,
        Err(e) => {
            warn!(error = %e, "rejecting HTTP request");
            server.reset_transaction();
            let (code, reason) = match e {
                TransportError::BodyTooLarge { .. } => (413, "Payload Too Large"),
                TransportError::UnexpectedContentType(_) => (415, "Unsupported Media Type"),
                TransportError::MissingContentLength => (411, "Length Required"),
                _ => (400, "Bad Request"),
            };
            write_response(stream, code, reason, &[])?;
            return Err(e);
        }
    };

    let response = server.process(&request);
    match response.to_der() {
        Ok(der) => write_response(stream, 200, "OK", &der),
        Err(e) => {
            server.reset_transaction();
            write_response(stream, 500, "Internal Server Error", &[])?;
            Err(TransportError::MalformedMessage(e.to_string()))
        }
    }
}

fn read_request<R: Read>(reader: &mut R, limit: usize) -> Result<PkiMessage, TransportError> {
    let (req, rest) = read_head(reader, parse_request_head)?;
    if req.method != "POST" {
        return Err(TransportError::MalformedHttp(format!(
            "unsupported method {}",
            req.method
        )));
    }
    req.head.check_content_type()?;
    let body = read_body(reader, &req.head, rest, limit)?;
    decode(&body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn response_head(raw: &[u8]) -> Result<(ResponseHead, Vec<u8>), TransportError> {
        read_head(&mut Cursor::new(raw), parse_response_head)
    }

    #[test]
    fn test_parse_status_line() {
        let (rsp, _) = response_head(b"HTTP/1.1 200 OK\r\n\r\n").unwrap();
        assert_eq!((rsp.code, rsp.reason.as_str()), (200, "OK"));
        let (rsp, _) = response_head(b"HTTP/1.0 404 Not Found\r\n\r\n").unwrap();
        assert_eq!(rsp.reason, "Not Found");
        assert!(response_head(b"SPDY/3 200 OK\r\n\r\n").is_err());
        assert!(response_head(b"HTTP/1.1 abc\r\n\r\n").is_err());
    }

    #[test]
    fn test_head_and_body_limits() {
        let raw = b"HTTP/1.0 200 OK\r\ncontent-length: 4\r\nContent-Type: application/pkixcmp; x=y\r\n\r\nabcd";
        let mut r = Cursor::new(&raw[..]);
        let (rsp, rest) = read_head(&mut r, parse_response_head).unwrap();
        rsp.head.check_content_type().unwrap();
        assert_eq!(read_body(&mut r, &rsp.head, rest, 10).unwrap(), b"abcd");

        let mut r = Cursor::new(&raw[..]);
        let (rsp, rest) = read_head(&mut r, parse_response_head).unwrap();
        assert!(matches!(
            read_body(&mut r, &rsp.head, rest, 3),
            Err(TransportError::BodyTooLarge { limit: 3 })
        ));
    }

    #[test]
    fn test_body_split_across_reads() {
        let mut rest = Cursor::new(&b"cd"[..]);
        let head = Head {
            headers: vec![("Content-Length".into(), "4".into())],
        };
        assert_eq!(
            read_body(&mut rest, &head, b"ab".to_vec(), 10).unwrap(),
            b"abcd"
        );
    }

    #[test]
    fn test_missing_content_length() {
        let (rsp, _) = response_head(b"HTTP/1.0 200 OK\r\n\r\n").unwrap();
        assert!(matches!(
            rsp.head.content_length(),
            Err(TransportError::MissingContentLength)
        ));
    }

    #[test]
    fn test_wrong_content_type() {
        let (rsp, _) = response_head(b"HTTP/1.0 200 OK\r\nContent-Type: text/html\r\n\r\n").unwrap();
        assert!(matches!(
            rsp.head.check_content_type(),
            Err(TransportError::UnexpectedContentType(_))
        ));
    }

    #[test]
    fn test_truncated_head() {
        assert!(matches!(
            response_head(b"HTTP/1.0 200 OK\r\nContent-Length: 3\r\n"),
            Err(TransportError::MalformedHttp(_))
        ));
    }

    #[test]
    fn test_endless_header_line_is_bounded() {
        let mut raw = b"POST / HTTP/1.0\r\nX-Junk: ".to_vec();
        raw.resize(raw.len() + 4 * 1024 * 1024, b'a');
        let mut r = Cursor::new(raw);
        assert!(matches!(
            read_request(&mut r, DEFAULT_MAX_RESP_LEN),
            Err(TransportError::MalformedHttp(_))
        ));
        assert!(r.position() as usize <= MAX_HEAD_LEN);
    }

    #[test]
    fn test_get_rejected() {
        let mut r = Cursor::new(&b"GET / HTTP/1.0\r\n\r\n"[..]);
        assert!(matches!(
            read_request(&mut r, 100),
            Err(TransportError::MalformedHttp(_))
        ));
    }
}

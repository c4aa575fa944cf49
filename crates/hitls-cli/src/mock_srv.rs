//! Mock CMP server command (`mock-srv`).

use std::net::TcpListener;

use clap::Args;
use hitls_cmp::http::{serve_one, DEFAULT_MAX_RESP_LEN};
use hitls_cmp::{ErrorInjection, MockServer, ProtectionContext, ServerConfig};
use hitls_pki::x509::{Certificate, DistinguishedName, SigningKey};
use tracing::{info, warn};

#[derive(Args, Debug)]
pub struct MockSrvArgs {
    /// Port to listen on.
    #[arg(short, long, default_value_t = 8080)]
    pub port: u16,
    /// Shared secret for PBM protection of responses and requests.
    #[arg(long)]
    pub secret: Option<String>,
    /// senderKID of responses.
    #[arg(long)]
    pub reference: Option<String>,
    /// Server certificate for signature protection (PEM).
    #[arg(long, requires = "srv_key")]
    pub srv_cert: Option<String>,
    /// Server private key (PKCS#8 PEM).
    #[arg(long, requires = "srv_cert")]
    pub srv_key: Option<String>,
    /// Server name, e.g. "/CN=mock server".
    #[arg(long)]
    pub srv_name: Option<String>,
    /// Reference certificate for kur and rr checks (PEM).
    #[arg(long)]
    pub ref_cert: Option<String>,
    /// Certificate returned for certificate requests (PEM).
    #[arg(long)]
    pub cert_out: Option<String>,
    /// Chain sent in extraCerts of certificate responses (PEM).
    #[arg(long)]
    pub chain_out: Option<String>,
    /// caPubs returned in ip (PEM).
    #[arg(long)]
    pub ca_pubs_out: Option<String>,
    /// Number of pollReq rounds before the answer is released.
    #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
    pub poll_count: i64,
    /// checkAfter seconds announced in pollRep.
    #[arg(long, default_value_t = 1, allow_negative_numbers = true)]
    pub check_after: i64,
    /// Fail requests of this body type ("any", "ir", "certConf", ...).
    #[arg(long)]
    pub send_error: Option<String>,
    /// Accept requests without protection.
    #[arg(long)]
    pub accept_unprotected: bool,
    /// Exit after this many messages (0 = serve forever).
    #[arg(long, default_value_t = 0)]
    pub max_msgs: usize,
}

fn read_certs(path: &str) -> Result<Vec<Certificate>, Box<dyn std::error::Error>> {
    let pem = std::fs::read_to_string(path)
        .map_err(|e| format!("cannot read certificate file '{path}': {e}"))?;
    let certs = Certificate::from_pem_all(&pem)
        .map_err(|e| format!("failed to parse certificate(s) in '{path}': {e}"))?;
    if certs.is_empty() {
        return Err(format!("no certificates found in '{path}'").into());
    }
    Ok(certs)
}

fn read_cert(path: &str) -> Result<Certificate, Box<dyn std::error::Error>> {
    let mut certs = read_certs(path)?;
    Ok(certs.remove(0))
}

fn protector(args: &MockSrvArgs) -> Result<ProtectionContext, Box<dyn std::error::Error>> {
    let mut ctx = ProtectionContext::new();
    if let Some(secret) = &args.secret {
        ctx.set_secret_value(secret.as_bytes());
    }
    if let Some(reference) = &args.reference {
        ctx.set_reference_value(reference.as_bytes());
    }
    if let (Some(cert_path), Some(key_path)) = (&args.srv_cert, &args.srv_key) {
        let key_pem = std::fs::read_to_string(key_path)
            .map_err(|e| format!("cannot read key file '{key_path}': {e}"))?;
        let key = SigningKey::from_pkcs8_pem(&key_pem)
            .map_err(|e| format!("failed to parse private key: {e}"))?;
        let mut certs = read_certs(cert_path)?;
        let cert = certs.remove(0);
        ctx.set_cert(cert).set_pkey(key).set_untrusted(certs);
    }
    if args.secret.is_none() && args.srv_cert.is_none() {
        warn!("no --secret or --srv-cert given; responses go out unprotected");
        ctx.set_unprotected_send(true);
    }
    Ok(ctx)
}

fn config(args: &MockSrvArgs) -> Result<ServerConfig, Box<dyn std::error::Error>> {
    let mut cfg = ServerConfig::new();
    if let Some(name) = &args.srv_name {
        let dn = DistinguishedName::parse_slashed(name)
            .map_err(|e| format!("invalid server name '{name}': {e}"))?;
        cfg.set_server_name(dn);
    }
    cfg.set_ref_cert(args.ref_cert.as_deref().map(read_cert).transpose()?)
        .set_cert_out(args.cert_out.as_deref().map(read_cert).transpose()?)
        .set_chain_out(args.chain_out.as_deref().map(read_certs).transpose()?)
        .set_ca_pubs_out(args.ca_pubs_out.as_deref().map(read_certs).transpose()?)
        .set_accept_unprotected(args.accept_unprotected)
        .set_poll_count(args.poll_count)?
        .set_check_after(args.check_after)?;
    if let Some(name) = &args.send_error {
        let injection = ErrorInjection::parse(name)
            .ok_or_else(|| format!("unknown message type for --send-error: '{name}'"))?;
        cfg.set_send_error(Some(injection));
    }
    Ok(cfg)
}

pub fn run(args: &MockSrvArgs) -> Result<(), Box<dyn std::error::Error>> {
    let mut server = MockServer::new(config(args)?, protector(args)?);

    let bind_addr = format!("0.0.0.0:{}", args.port);
    let listener =
        TcpListener::bind(&bind_addr).map_err(|e| format!("cannot bind to '{bind_addr}': {e}"))?;
    info!(addr = %bind_addr, "mock CMP server listening");

    let mut served = 0usize;
    for stream in listener.incoming() {
        let mut stream = match stream {
            Ok(s) => s,
            Err(e) => {
                warn!(error = %e, "accept failed");
                continue;
            }
        };
        if let Err(e) = serve_one(&mut stream, &mut server, DEFAULT_MAX_RESP_LEN) {
            warn!(error = %e, "exchange failed");
        }
        served += 1;
        if args.max_msgs != 0 && served >= args.max_msgs {
            info!(served, "message limit reached");
            break;
        }
    }
    Ok(())
}

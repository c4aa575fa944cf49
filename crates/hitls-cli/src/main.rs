use clap::{Parser, Subcommand};

mod mock_srv;
mod protect;

/// openHiTLS command-line tool for CMP testing.
#[derive(Parser)]
#[command(name = "hitls")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Log at debug level regardless of RUST_LOG.
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a mock CMP server over plain HTTP.
    MockSrv(mock_srv::MockSrvArgs),
    /// Protect a DER-encoded PKIMessage with a password-based MAC.
    Protect {
        /// Shared secret.
        #[arg(long)]
        secret: String,
        /// Input file (DER PKIMessage).
        #[arg(short, long = "in")]
        input: String,
        /// Output file.
        #[arg(short, long = "out")]
        output: String,
        /// senderKID to use when the message has none.
        #[arg(long)]
        reference: Option<String>,
        /// PBM iteration count (100..=100000).
        #[arg(long, default_value_t = 500)]
        iterations: u32,
    },
}

fn init_tracing(verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let filter = if verbose {
        EnvFilter::new("hitls_cmp=debug,hitls=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result = match &cli.command {
        Commands::MockSrv(args) => mock_srv::run(args),
        Commands::Protect {
            secret,
            input,
            output,
            reference,
            iterations,
        } => protect::run(secret, input, output, reference.as_deref(), *iterations),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

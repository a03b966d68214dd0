//! jess command line interface.
//!
//! # Usage
//!
//! ```bash
//! # Generate a new signing identity
//! jess --tsdir ~/.jess generate --name alice --scheme Ed25519
//!
//! # Configure an envelope and close a file with it
//! jess --tsdir ~/.jess envelope create mail --suite v1 --sender alice --recipient bob
//! jess --tsdir ~/.jess close notes.txt with mail
//!
//! # Open it again
//! jess --tsdir ~/.jess open notes.txt.letter
//! ```

mod commands;
mod dirstore;
#[cfg(feature = "hibp")]
mod hibp;
mod password;

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Authenticated and encrypted messaging with declarative cipher suites.
#[derive(Parser, Debug)]
#[command(name = "jess")]
#[command(about = "Close, open, sign, and verify letters")]
#[command(version)]
struct Cli {
    /// Trust store directory.
    #[arg(long, global = true, env = "JESS_TS_DIR")]
    tsdir: Option<String>,

    /// Use an OS keyring backed trust store (not supported by this build).
    #[arg(long, global = true, env = "JESS_TS_KEYRING")]
    tskeyring: Option<String>,

    /// Drop security requirements: letters of CIRS that are NOT required.
    #[arg(long, global = true, value_name = "CIRS")]
    no: Option<String>,

    /// Minimum security level to enforce.
    #[arg(long, global = true, value_name = "N")]
    seclevel: Option<i32>,

    /// Minimum symmetric key size in bytes to enforce.
    #[arg(long, global = true, value_name = "N")]
    symkeysize: Option<usize>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate a new signet.
    Generate {
        /// Name of the new signet.
        #[arg(long)]
        name: Option<String>,
        /// Tool scheme of the new signet.
        #[arg(long, default_value = "Ed25519")]
        scheme: String,
        /// Print the signet as text instead of storing it.
        #[arg(long)]
        textonly: bool,
    },

    /// Manage envelopes.
    #[command(subcommand)]
    Envelope(commands::EnvelopeCommand),

    /// Close (encrypt and sign) a file into a letter.
    Close {
        /// File to close, then the envelope to use: `<FILE> with <ENVELOPE>`.
        #[arg(required = true, num_args = 2..=3)]
        args: Vec<String>,
        /// Output file, defaults to `<FILE>.letter`.
        #[arg(short, long)]
        output: Option<String>,
    },

    /// Open a letter.
    Open {
        /// Letter file to open.
        file: String,
        /// Output file, defaults to the letter file without its extension.
        #[arg(short, long)]
        output: Option<String>,
    },

    /// Sign a file into a signature-only letter.
    Sign {
        /// File to sign, then the envelope to use: `<FILE> with <ENVELOPE>`.
        #[arg(required = true, num_args = 2..=3)]
        args: Vec<String>,
        /// Output file, defaults to `<FILE>.letter`.
        #[arg(short, long)]
        output: Option<String>,
    },

    /// Verify letter signatures.
    Verify {
        /// Letter files or directories to verify.
        #[arg(required = true)]
        files: Vec<String>,
    },

    /// Import a signet or envelope from text format.
    Import {
        /// The exported text.
        text: String,
    },

    /// Export the public part of a signet or an envelope as text.
    Export {
        /// Signet id or envelope name.
        id: String,
    },

    /// Export the private part of a signet as text.
    Backup {
        /// Signet id.
        id: String,
    },

    /// List stored signets and envelopes.
    List,

    /// List registered tools and hash tools.
    Tools,

    /// Check a password against the breach database (requires the `hibp`
    /// build feature).
    #[cfg(feature = "hibp")]
    Pwned,

    /// Print version information.
    Version,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    tracing_subscriber::registry().with(fmt::layer().with_target(false)).with(filter).init();

    if let Some(level) = cli.seclevel {
        jess_core::set_minimum_security_level(level);
    }
    if let Some(size) = cli.symkeysize {
        jess_core::set_default_key_size(size);
    }
    password::install_password_prompts();

    match commands::run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("jess: {err:#}");
            ExitCode::FAILURE
        }
    }
}

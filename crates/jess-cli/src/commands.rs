//! Subcommand implementations.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use clap::Subcommand;
use jess_core::{
    import_text, suites, Envelope, JessError, Letter, Requirements, Signet, SignetFilter,
    TextImport, TrustStore,
};

use crate::dirstore::DirTrustStore;
use crate::{Cli, Command};

/// Envelope management subcommands.
#[derive(Subcommand, Debug)]
pub enum EnvelopeCommand {
    /// Create and store an envelope.
    Create {
        /// Envelope name.
        name: String,
        /// Suite id to use.
        #[arg(long)]
        suite: String,
        /// Secret signet ids (keys or passwords).
        #[arg(long = "secret")]
        secrets: Vec<String>,
        /// Password secrets to create under the given ids; prompts on use.
        #[arg(long = "password")]
        passwords: Vec<String>,
        /// Sender signet ids.
        #[arg(long = "sender")]
        senders: Vec<String>,
        /// Recipient signet ids.
        #[arg(long = "recipient")]
        recipients: Vec<String>,
        /// Minimum security level for this envelope.
        #[arg(long)]
        seclevel: Option<i32>,
    },
    /// Delete a stored envelope.
    Delete {
        /// Envelope name.
        name: String,
    },
}

pub fn run(cli: Cli) -> Result<()> {
    if cli.tskeyring.is_some() {
        bail!("keyring trust stores are not supported by this build, use --tsdir");
    }

    let requirements = match &cli.no {
        Some(spec) => Some(
            Requirements::parse_from_no_spec(spec)
                .map_err(|c| anyhow!("unknown attribute identifier: {c}"))?,
        ),
        None => None,
    };

    match cli.command {
        Command::Generate { name, scheme, textonly } => {
            generate(cli.tsdir.as_deref(), name, &scheme, textonly)
        }
        Command::Envelope(cmd) => envelope_cmd(&open_store(cli.tsdir.as_deref())?, cmd),
        Command::Close { args, output } => {
            let (file, envelope) = split_with_args(&args)?;
            close(&open_store(cli.tsdir.as_deref())?, file, envelope, output, false)
        }
        Command::Sign { args, output } => {
            let (file, envelope) = split_with_args(&args)?;
            close(&open_store(cli.tsdir.as_deref())?, file, envelope, output, true)
        }
        Command::Open { file, output } => {
            open(&open_store(cli.tsdir.as_deref())?, &file, output, requirements)
        }
        Command::Verify { files } => verify(&open_store(cli.tsdir.as_deref())?, &files, requirements),
        Command::Import { text } => import(&open_store(cli.tsdir.as_deref())?, &text),
        Command::Export { id } => export(&open_store(cli.tsdir.as_deref())?, &id, false),
        Command::Backup { id } => export(&open_store(cli.tsdir.as_deref())?, &id, true),
        Command::List => list(&open_store(cli.tsdir.as_deref())?),
        Command::Tools => tools(),
        #[cfg(feature = "hibp")]
        Command::Pwned => pwned(),
        Command::Version => {
            println!("jess {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

fn open_store(tsdir: Option<&str>) -> Result<DirTrustStore> {
    // Accept the legacy environment variable as a fallback.
    let dir = match tsdir {
        Some(dir) => dir.to_string(),
        None => std::env::var("JESS_TSDIR")
            .context("no trust store configured, use --tsdir or JESS_TS_DIR")?,
    };
    Ok(DirTrustStore::open(dir)?)
}

/// Splits `<FILE> with <ENVELOPE>` positionals; the literal `with` is
/// optional.
fn split_with_args(args: &[String]) -> Result<(&str, &str)> {
    match args {
        [file, with, envelope] if with == "with" => Ok((file, envelope)),
        [file, envelope] => Ok((file, envelope)),
        _ => bail!("expected: <FILE> with <ENVELOPE>"),
    }
}

fn generate(
    tsdir: Option<&str>,
    name: Option<String>,
    scheme: &str,
    textonly: bool,
) -> Result<()> {
    let mut signet = jess_core::generate_signet(scheme)?;
    signet.assign_uuid()?;
    if let Some(name) = name {
        signet.info = Some(jess_core::SignetInfo { name, ..Default::default() });
    }
    signet.store_key()?;

    if textonly {
        println!("{}", signet.backup(false)?);
        println!("{}", signet.export(false)?);
        return Ok(());
    }

    let store = open_store(tsdir)?;
    let mut recipient = signet.as_recipient()?;
    recipient.store_key()?;
    store.store_signet(recipient)?;
    let id = signet.id.clone();
    store.store_signet(signet)?;

    println!("generated new {scheme} signet: {id}");
    Ok(())
}

fn envelope_cmd(store: &DirTrustStore, cmd: EnvelopeCommand) -> Result<()> {
    match cmd {
        EnvelopeCommand::Create { name, suite, secrets, passwords, senders, recipients, seclevel } => {
            let mut envelope = Envelope::new(&suite);
            envelope.name = name.clone();
            if let Some(level) = seclevel {
                envelope.security_level = level;
            }
            for id in secrets {
                let stored = lookup_secret(store, &id)?;
                envelope.secrets.push(Signet::stub(1, &stored.id, &stored.scheme));
            }
            for id in passwords {
                envelope.secrets.push(Signet::stub(1, &id, jess_core::SIGNET_SCHEME_PASSWORD));
            }
            for id in senders {
                envelope.senders.push(Signet::stub(1, &id, ""));
            }
            for id in recipients {
                envelope.recipients.push(Signet::stub(1, &id, ""));
            }

            // Refuse envelopes that cannot compile.
            envelope.check(store)?;
            store.store_envelope(envelope)?;
            println!("stored envelope {name}");
            Ok(())
        }
        EnvelopeCommand::Delete { name } => {
            store.delete_envelope(&name)?;
            println!("deleted envelope {name}");
            Ok(())
        }
    }
}

fn lookup_secret(store: &DirTrustStore, id: &str) -> Result<Signet> {
    store
        .get_signet(id, false)
        .with_context(|| format!("secret signet {id} not found in trust store"))
}

fn close(
    store: &DirTrustStore,
    file: &str,
    envelope_name: &str,
    output: Option<String>,
    expect_signature_only: bool,
) -> Result<()> {
    let data = fs::read(file).with_context(|| format!("failed to read {file}"))?;

    let envelope = store.get_envelope(envelope_name)?;
    let mut session = envelope.correspondence(store)?;

    if expect_signature_only && session.tool_requirements().has(jess_core::Requirement::Confidentiality)
    {
        bail!("envelope {envelope_name} encrypts; use `close` instead of `sign`");
    }

    let letter = session.close(&data)?;
    let output = output.unwrap_or_else(|| format!("{file}.letter"));
    fs::write(&output, letter.to_file_format()?)
        .with_context(|| format!("failed to write {output}"))?;

    println!("{file} -> {output}");
    Ok(())
}

fn open(
    store: &DirTrustStore,
    file: &str,
    output: Option<String>,
    requirements: Option<Requirements>,
) -> Result<()> {
    let data = fs::read(file).with_context(|| format!("failed to read {file}"))?;
    let letter = Letter::from_file_format(&data)?;

    let plaintext = letter.open(requirements, store)?;

    let output = output.unwrap_or_else(|| default_open_output(file));
    fs::write(&output, plaintext).with_context(|| format!("failed to write {output}"))?;

    println!("{file} -> {output}");
    Ok(())
}

fn default_open_output(file: &str) -> String {
    let path = Path::new(file);
    if path.extension().is_some_and(|ext| ext == "letter") {
        path.with_extension("").to_string_lossy().into_owned()
    } else {
        format!("{file}.plain")
    }
}

fn verify(
    store: &DirTrustStore,
    files: &[String],
    requirements: Option<Requirements>,
) -> Result<()> {
    // Verification only vouches for integrity and the sender; encryption
    // properties are not required unless asked for explicitly.
    let requirements = requirements.or_else(|| {
        Some(
            Requirements::none()
                .with(jess_core::Requirement::Integrity)
                .with(jess_core::Requirement::SenderAuthentication),
        )
    });

    let mut any_failed = false;

    for path in collect_letter_files(files)? {
        let display = path.display();
        let data = match fs::read(&path) {
            Ok(data) => data,
            Err(err) => {
                println!("[WARN] {display}: failed to read: {err}");
                any_failed = true;
                continue;
            }
        };
        let letter = match Letter::from_file_format(&data) {
            Ok(letter) => letter,
            Err(err) => {
                println!("[WARN] {display}: not a letter: {err}");
                any_failed = true;
                continue;
            }
        };
        match letter.verify(requirements, store) {
            Ok(()) => println!("[ OK ] {display}"),
            Err(err) => {
                println!("[FAIL] {display}: {err}");
                any_failed = true;
            }
        }
    }

    if any_failed {
        bail!("verification failed");
    }
    Ok(())
}

fn collect_letter_files(inputs: &[String]) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for input in inputs {
        let path = PathBuf::from(input);
        if path.is_dir() {
            for entry in fs::read_dir(&path)? {
                let entry = entry?.path();
                if entry.extension().is_some_and(|ext| ext == "letter") {
                    files.push(entry);
                }
            }
        } else {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

fn import(store: &DirTrustStore, text: &str) -> Result<()> {
    match import_text(text)? {
        TextImport::Signet(signet) | TextImport::Recipient(signet) => {
            if signet.id.is_empty() {
                bail!("imported signet has no ID");
            }
            let kind = if signet.public { "recipient" } else { "signet" };
            let id = signet.id.clone();
            store.store_signet(signet)?;
            println!("imported {kind} {id}");
        }
        TextImport::Envelope(envelope) => {
            let name = envelope.name.clone();
            store.store_envelope(envelope)?;
            println!("imported envelope {name}");
        }
    }
    Ok(())
}

fn export(store: &DirTrustStore, id: &str, private: bool) -> Result<()> {
    // Try signets first, then envelopes by name.
    match store.get_signet(id, false) {
        Ok(signet) => {
            let text = if private { signet.backup(false)? } else { signet.export(false)? };
            println!("{text}");
            return Ok(());
        }
        Err(JessError::MissingSignet { .. }) => {}
        Err(err) => return Err(err.into()),
    }
    if let Ok(signet) = store.get_signet(id, true) {
        if private {
            bail!("cannot backup (only export) a recipient");
        }
        println!("{}", signet.export(false)?);
        return Ok(());
    }

    let envelope = store
        .get_envelope(id)
        .map_err(|_| anyhow!("no signet or envelope with ID {id}"))?;
    if private {
        bail!("envelopes are exported, not backed up");
    }
    println!("{}", envelope.export(false)?);
    Ok(())
}

fn list(store: &DirTrustStore) -> Result<()> {
    println!("signets:");
    for signet in store.select_signets(SignetFilter::Any, &[])? {
        let kind = if signet.public { "recipient" } else { "signet   " };
        let name = signet
            .info
            .as_ref()
            .map(|info| info.name.as_str())
            .filter(|name| !name.is_empty())
            .unwrap_or("-");
        println!("  {kind}  {:12}  {}  {name}", signet.scheme, signet.id);
    }

    println!("envelopes:");
    for envelope in store.all_envelopes()? {
        println!(
            "  {}  suite={}  secrets={} senders={} recipients={}",
            envelope.name,
            envelope.suite_id,
            envelope.secrets.len(),
            envelope.senders.len(),
            envelope.recipients.len(),
        );
    }
    Ok(())
}

fn tools() -> Result<()> {
    println!("suites:");
    for suite in suites() {
        println!(
            "  {:12}  {:4}  level={}  tools={}",
            suite.id,
            suite.provides.short_string(),
            suite.security_level,
            suite.tools.join(", "),
        );
    }

    println!("tools:");
    for tool in jess_tools::tools() {
        println!(
            "  {:18}  {:16}  keysize={:2}  level={:3}  {}",
            tool.info.name,
            tool.info.purpose.as_str(),
            tool.info.key_size,
            tool.info.security_level,
            tool.info.comment,
        );
    }

    println!("hash tools:");
    for hash in jess_tools::hash_tools() {
        println!(
            "  {:12}  digest={:2}  level={:3}  {}",
            hash.name, hash.digest_size, hash.security_level, hash.comment,
        );
    }
    Ok(())
}

#[cfg(feature = "hibp")]
fn pwned() -> Result<()> {
    let password = rpassword::prompt_password("Enter password to check: ")?;
    let count = crate::hibp::breach_count(&password)?;
    if count > 0 {
        bail!("password appears in {count} known breaches, do not use it");
    }
    println!("password not found in the breach database");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn with_literal_is_optional() {
        let args: Vec<String> =
            vec!["file.txt".into(), "with".into(), "mail".into()];
        assert_eq!(split_with_args(&args).unwrap(), ("file.txt", "mail"));

        let args: Vec<String> = vec!["file.txt".into(), "mail".into()];
        assert_eq!(split_with_args(&args).unwrap(), ("file.txt", "mail"));
    }

    #[test]
    fn open_output_strips_letter_extension() {
        assert_eq!(default_open_output("notes.txt.letter"), "notes.txt");
        assert_eq!(default_open_output("blob"), "blob.plain");
    }
}

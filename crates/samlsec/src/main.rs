#![forbid(unsafe_code)]

//! samlsec CLI: SAML signing, verification and redirect-binding tools.

use clap::{Args, Parser, Subcommand};
use samlsec_bindings::{HttpRedirectBindingBuilder, HttpRedirectBindingParser};
use samlsec_core::Error;
use samlsec_crypto::{ShaHashingAlgorithm, SignatureProviderFactory};
use samlsec_dsig::{DsigContext, Scope, XmlSignatureProvider};
use samlsec_keys::{loader, KeyCandidateSet};
use samlsec_xml::XmlDocument;
use std::path::{Path, PathBuf};
use std::process;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "samlsec",
    about = "SAML 2.0 signatures and HTTP-Redirect binding tools",
    version
)]
struct Cli {
    /// Debug logging (overrides RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build a redirect-binding URL or query string
    RedirectBuild {
        #[command(flatten)]
        message: MessageFile,

        /// RelayState value
        #[arg(long = "relay-state")]
        relay_state: Option<String>,

        /// Sign the query with this private key (PEM or DER)
        #[arg(short = 'k', long)]
        key: Option<PathBuf>,

        /// Digest strength: SHA1, SHA256 or SHA512
        #[arg(long, default_value = "SHA256")]
        sha: ShaHashingAlgorithm,

        /// Append the query to this URL
        #[arg(long)]
        destination: Option<String>,
    },

    /// Decode a redirect-binding URL and optionally check its signature
    RedirectParse {
        /// Full URL or query string
        url: String,

        /// Candidate verification key or certificate (repeatable)
        #[arg(short = 'k', long)]
        key: Vec<PathBuf>,
    },

    /// Sign an assertion, protocol message or metadata document
    Sign {
        /// Input XML file
        file: PathBuf,

        /// ID of the element to sign
        #[arg(long)]
        id: String,

        /// Private key (PEM or DER; a PEM may carry the certificate chain)
        #[arg(short = 'k', long)]
        key: PathBuf,

        /// Certificate chain for KeyInfo
        #[arg(long)]
        cert: Option<PathBuf>,

        /// Place the signature first (EntityDescriptor) instead of after Issuer
        #[arg(long)]
        metadata: bool,

        /// Digest strength: SHA1, SHA256 or SHA512
        #[arg(long, default_value = "SHA256")]
        sha: ShaHashingAlgorithm,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Register additional ID attribute names
        #[arg(long = "id-attr")]
        id_attr: Vec<String>,
    },

    /// Verify a signed document
    Verify {
        /// Input XML file
        file: PathBuf,

        /// Candidate verification key or certificate (repeatable).
        /// Without one, the signature's own KeyInfo is used.
        #[arg(short = 'k', long)]
        key: Vec<PathBuf>,

        /// Verify the signature of the element with this ID
        #[arg(long)]
        id: Option<String>,

        /// Register additional ID attribute names
        #[arg(long = "id-attr")]
        id_attr: Vec<String>,
    },

    /// Show the KeyInfo of a signed document
    Keyinfo {
        /// Input XML file
        file: PathBuf,

        /// Element ID whose signature to read
        #[arg(long)]
        id: Option<String>,
    },
}

#[derive(Args)]
#[group(required = true, multiple = false)]
struct MessageFile {
    /// Request XML file
    #[arg(long)]
    request: Option<PathBuf>,

    /// Response XML file
    #[arg(long)]
    response: Option<PathBuf>,
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result = match cli.command {
        Commands::RedirectBuild {
            message,
            relay_state,
            key,
            sha,
            destination,
        } => cmd_redirect_build(message, relay_state, key, sha, destination),

        Commands::RedirectParse { url, key } => cmd_redirect_parse(&url, &key),

        Commands::Sign {
            file,
            id,
            key,
            cert,
            metadata,
            sha,
            output,
            id_attr,
        } => cmd_sign(&file, &id, &key, cert.as_deref(), metadata, sha, output, id_attr),

        Commands::Verify {
            file,
            key,
            id,
            id_attr,
        } => cmd_verify(&file, &key, id.as_deref(), id_attr),

        Commands::Keyinfo { file, id } => cmd_keyinfo(&file, id.as_deref()),
    };

    match result {
        Ok(true) => {}
        Ok(false) => process::exit(1),
        Err(e) => {
            eprintln!("Error: {e}");
            process::exit(1);
        }
    }
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn cmd_redirect_build(
    message: MessageFile,
    relay_state: Option<String>,
    key: Option<PathBuf>,
    sha: ShaHashingAlgorithm,
    destination: Option<String>,
) -> Result<bool, Error> {
    let mut builder = HttpRedirectBindingBuilder::new();
    match (message.request, message.response) {
        (Some(path), _) => builder.set_request(read_file(&path)?)?,
        (_, Some(path)) => builder.set_response(read_file(&path)?)?,
        (None, None) => {
            return Err(Error::Argument("either --request or --response is required".into()))
        }
    }
    if let Some(rs) = relay_state {
        builder.set_relay_state(rs);
    }
    if let Some(path) = key {
        builder.set_signing_key(loader::load_key_file(&path)?);
        builder.set_sha_hashing_algorithm(sha);
    }

    let out = match destination {
        Some(dest) => builder.to_url(&dest)?,
        None => builder.to_query()?,
    };
    println!("{out}");
    Ok(true)
}

fn cmd_redirect_parse(url: &str, keys: &[PathBuf]) -> Result<bool, Error> {
    let parser = HttpRedirectBindingParser::parse(url)?;
    let kind = if parser.is_request() { "request" } else { "response" };
    eprintln!("Type: {kind}");
    eprintln!("Signed: {}", parser.is_signed());
    if let Some(alg) = parser.sig_alg() {
        eprintln!("SigAlg: {alg}");
    }
    if let Some(rs) = parser.relay_state_decoded()? {
        eprintln!("RelayState: {rs}");
    }
    println!("{}", parser.message());

    if keys.is_empty() {
        return Ok(true);
    }
    report(parser.check_signature_with_keys(&load_candidates(keys))?)
}

#[allow(clippy::too_many_arguments)]
fn cmd_sign(
    file: &Path,
    id: &str,
    key_path: &Path,
    cert_path: Option<&Path>,
    metadata: bool,
    sha: ShaHashingAlgorithm,
    output: Option<PathBuf>,
    id_attr: Vec<String>,
) -> Result<bool, Error> {
    let mut doc = XmlDocument::parse(read_file(file)?)?;
    let key = match cert_path {
        Some(cert) => loader::load_key_and_cert_files(key_path, cert)?,
        None => loader::load_key_file(key_path)?,
    };

    if metadata {
        for attr in &id_attr {
            doc.add_id_attr(attr);
        }
        SignatureProviderFactory::create_from_hashing_algorithm(sha)
            .sign_metadata(&mut doc, id, &key)?;
    } else {
        let mut ctx = DsigContext::new().with_sha(sha);
        for attr in &id_attr {
            ctx.add_id_attr(attr);
        }
        samlsec_dsig::sign_document(&ctx, &mut doc, id, &key)?;
    }
    write_output(output, doc.text().as_bytes())?;
    Ok(true)
}

fn cmd_verify(
    file: &Path,
    keys: &[PathBuf],
    id: Option<&str>,
    id_attr: Vec<String>,
) -> Result<bool, Error> {
    let doc = XmlDocument::parse(read_file(file)?)?;
    let mut ctx = DsigContext::new();
    for attr in &id_attr {
        ctx.add_id_attr(attr);
    }
    let scope = id.map_or(Scope::Document, Scope::Element);

    if !samlsec_dsig::is_signed(&ctx, &doc, scope)? {
        println!("INVALID: document is not signed");
        return Ok(false);
    }
    let valid = if keys.is_empty() {
        let key_info = samlsec_dsig::extract_signature_keys(&ctx, &doc, scope)?;
        samlsec_dsig::check_signature_with_key_info(&ctx, &doc, scope, &key_info)?
    } else {
        samlsec_dsig::check_signature_with_keys(&ctx, &doc, scope, &load_candidates(keys))?
    };
    report(valid)
}

fn cmd_keyinfo(file: &Path, id: Option<&str>) -> Result<bool, Error> {
    let doc = XmlDocument::parse(read_file(file)?)?;
    let scope = id.map_or(Scope::Document, Scope::Element);
    let key_info = samlsec_dsig::extract_signature_keys(&DsigContext::new(), &doc, scope)?;
    for clause in key_info.clauses() {
        eprintln!("{clause:?}");
    }
    println!("{}", key_info.to_xml()?);
    Ok(true)
}

// ── Utility functions ────────────────────────────────────────────────

fn report(valid: bool) -> Result<bool, Error> {
    if valid {
        println!("OK");
    } else {
        println!("INVALID: signature does not verify");
    }
    Ok(valid)
}

/// Load each key file into its own slot; unreadable files leave the slot empty.
fn load_candidates(paths: &[PathBuf]) -> KeyCandidateSet {
    paths
        .iter()
        .map(|path| match loader::load_key_file(path) {
            Ok(key) => Some(key.with_name(path.display().to_string())),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "skipping key");
                None
            }
        })
        .collect()
}

fn read_file(path: &Path) -> Result<String, Error> {
    std::fs::read_to_string(path)
        .map_err(|e| Error::Io(std::io::Error::new(e.kind(), format!("{}: {e}", path.display()))))
}

fn write_output(path: Option<PathBuf>, data: &[u8]) -> Result<(), Error> {
    match path {
        Some(p) => std::fs::write(&p, data)
            .map_err(|e| Error::Io(std::io::Error::new(e.kind(), format!("{}: {e}", p.display())))),
        None => {
            use std::io::Write;
            let mut stdout = std::io::stdout();
            stdout.write_all(data)?;
            stdout.write_all(b"\n")?;
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn redirect_build_needs_exactly_one_message() {
        assert!(Cli::try_parse_from(["samlsec", "redirect-build"]).is_err());
        assert!(Cli::try_parse_from([
            "samlsec",
            "redirect-build",
            "--request",
            "a.xml",
            "--response",
            "b.xml"
        ])
        .is_err());
        assert!(Cli::try_parse_from(["samlsec", "redirect-build", "--request", "a.xml"]).is_ok());
    }

    #[test]
    fn sha_option_is_validated() {
        assert!(Cli::try_parse_from([
            "samlsec", "sign", "in.xml", "--id", "_a", "-k", "key.pem", "--sha", "sha512"
        ])
        .is_ok());
        assert!(Cli::try_parse_from([
            "samlsec", "sign", "in.xml", "--id", "_a", "-k", "key.pem", "--sha", "MD5"
        ])
        .is_err());
    }
}

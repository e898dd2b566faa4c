use anyhow::{bail, Context, Result};
use authkeys::config::store::{ConfigStore, FileConfigStore};
use authkeys::config::{Settings, TlsConfig, JWT_ALGORITHM};
use authkeys::keys::{self, PrivateKey};
use authkeys::loader::KeyLoader;
use authkeys::provision::KeyProvisioner;
use authkeys::token::TokenSigner;
use chrono::{Duration, TimeZone, Utc};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "Provision and load the token signing keypair", long_about = None)]
struct Args {
    /// Log as JSON lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Make sure a signing keypair is configured, deriving it from the TLS key if needed
    Ensure {
        /// TLS private key to fall back to (default: AUTHKEYS_TLS_KEY)
        #[arg(long)]
        tls_key: Option<PathBuf>,
    },

    /// Print the configured key paths and public key fingerprint
    Show,

    /// Check that the configured public key belongs to the private key
    Check,

    /// Issue an access token
    Issue {
        /// Token subject
        #[arg(short, long)]
        subject: String,

        /// Lifetime in seconds (default: AUTHKEYS_TOKEN_TTL)
        #[arg(short, long)]
        ttl: Option<i64>,
    },

    /// Verify an access token and print its claims
    Verify {
        token: String,
    },

    /// Print build information
    Version,
}

fn main() {
    let args = Args::parse();

    // Load .env file if it exists
    dotenvy::dotenv().ok();

    init_tracing(args.json);

    if let Err(e) = run(args.command) {
        error!("{:#}", e);
        std::process::exit(1);
    }
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn run(command: Command) -> Result<()> {
    let settings = Settings::new();
    let store = FileConfigStore::new(&settings.config_path);

    match command {
        Command::Ensure { tls_key } => {
            let tls = match tls_key {
                Some(path) => TlsConfig::new(path),
                None => settings.tls_config(),
            };

            let provisioner = KeyProvisioner::new(
                &store,
                settings.identity(),
                settings.default_public_key_path(),
            );
            let config = provisioner
                .ensure_keys(&tls)
                .context("Failed to provision signing keys")?;

            info!("Signing keys ready");
            print_paths(&config.private_key_path, &config.public_key_path);
        }

        Command::Show => {
            let config = store
                .signing_config()
                .with_context(|| format!("Failed to read {}", settings.config_path.display()))?;
            print_paths(&config.private_key_path, &config.public_key_path);

            if config.is_provisioned() {
                let keypair = KeyLoader::new(&store).get_keypair()?;
                println!("Fingerprint: {}", keys::fingerprint(&keypair.public_key)?);
            }
        }

        Command::Check => {
            let keypair = KeyLoader::new(&store)
                .get_keypair()
                .context("Failed to load signing keys")?;
            let private_key = PrivateKey::load(&keypair.private_key_path)?;

            if !keys::verify_pair(&private_key, &keypair.public_key)? {
                bail!(
                    "Public key {} does not belong to private key {}",
                    keypair.public_key_path.display(),
                    keypair.private_key_path.display()
                );
            }

            match private_key.algorithm().jwt_algorithm() {
                None => warn!(
                    "Signing key is {}, which cannot sign tokens",
                    private_key.algorithm()
                ),
                Some(algorithm) if algorithm != JWT_ALGORITHM => warn!(
                    "Signing key is {}, tokens will use {:?} instead of {:?}",
                    private_key.algorithm(),
                    algorithm,
                    JWT_ALGORITHM
                ),
                Some(_) => {}
            }

            println!("✅ Keypair OK ({})", private_key.algorithm());
            println!("Fingerprint: {}", keys::fingerprint(&keypair.public_key)?);
        }

        Command::Issue { subject, ttl } => {
            let signer = signer(&store, &settings)?;
            let ttl = ttl.unwrap_or(settings.token_ttl_secs as i64);
            if ttl <= 0 {
                bail!("Token lifetime must be positive");
            }

            let token = signer.issue(&subject, Duration::seconds(ttl))?;

            println!("Subject:    {}", subject);
            println!("Algorithm:  {:?}", signer.algorithm());
            println!("Expires in: {} seconds", ttl);
            println!("\nToken:");
            println!("{}", token);
        }

        Command::Verify { token } => {
            let claims = signer(&store, &settings)?
                .verify(&token)
                .context("Token rejected")?;

            println!("Issuer:  {}", claims.iss);
            println!("Subject: {}", claims.sub);
            println!("Issued:  {}", format_timestamp(claims.iat));
            println!("Expires: {}", format_timestamp(claims.exp));
        }

        Command::Version => {
            println!("authkeys {}", env!("CARGO_PKG_VERSION"));
            println!("Commit:  {} ({})", env!("GIT_HASH"), env!("GIT_DATE"));
            println!("Branch:  {}", env!("GIT_BRANCH"));
            println!("Dirty:   {}", env!("GIT_DIRTY"));
            println!("Built:   {}", env!("BUILD_TIMESTAMP"));
            println!("Rustc:   {}", env!("RUST_VERSION"));
        }
    }

    Ok(())
}

fn signer(store: &FileConfigStore, settings: &Settings) -> Result<TokenSigner> {
    let keypair = KeyLoader::new(store)
        .get_keypair()
        .context("Failed to load signing keys")?;
    Ok(TokenSigner::from_keypair(&keypair, settings.jwt_issuer.clone())?)
}

fn print_paths(private_key: &Option<PathBuf>, public_key: &Option<PathBuf>) {
    let show = |path: &Option<PathBuf>| {
        path.as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(not set)".to_string())
    };

    println!("Private key: {}", show(private_key));
    println!("Public key:  {}", show(public_key));
}

fn format_timestamp(ts: i64) -> String {
    Utc.timestamp_opt(ts, 0)
        .single()
        .map(|t| t.to_rfc3339())
        .unwrap_or_else(|| ts.to_string())
}

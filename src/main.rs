// ABOUTME: CLI entry point for account-export
// ABOUTME: Parses commands and routes to appropriate handlers

use account_export::commands::{
    self, DecryptOptions, ExportOptions, ImportKeyOptions, VerifySignatureOptions, KEYRING_ENV,
};
use account_export::crypto::{KdfParams, TrustLevel, VerificationResult};
use account_export::error::ExportError;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "account-export")]
#[command(about = "Signed and encrypted per-user account data exports", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

fn default_keyring() -> String {
    std::env::var(KEYRING_ENV).unwrap_or_else(|_| "keyring.json".to_string())
}

#[derive(Subcommand)]
enum Commands {
    /// Export one account into a signed, encrypted archive
    Export {
        /// Account database URL (falls back to DATABASE_URL)
        #[arg(long)]
        database_url: Option<String>,
        #[arg(long)]
        username: String,
        #[arg(long)]
        email: String,
        /// Keyring file holding the export key
        #[arg(long, default_value_t = default_keyring())]
        keyring: String,
        /// Key id, fingerprint or uid of the key to use (falls back to ACCOUNT_EXPORT_KEY_ID)
        #[arg(long)]
        key_id: Option<String>,
        /// Passphrase for the secret key (falls back to ACCOUNT_EXPORT_PASSPHRASE, then a prompt)
        #[arg(long)]
        passphrase: Option<String>,
        /// Path to an export policy TOML file
        #[arg(long)]
        policy: Option<PathBuf>,
        /// Directory the archive is written to
        #[arg(long, default_value = ".")]
        output_dir: PathBuf,
    },
    /// Decrypt an export archive and verify its signature
    Decrypt {
        /// Path to the {owner}_account_export.zip archive
        archive: PathBuf,
        /// Passphrase for the secret key (falls back to ACCOUNT_EXPORT_PASSPHRASE, then a prompt)
        #[arg(long)]
        passphrase: Option<String>,
        #[arg(long, default_value_t = default_keyring())]
        keyring: String,
        #[arg(long)]
        key_id: Option<String>,
        /// Directory for the decrypted dump (defaults to the archive's directory)
        #[arg(long)]
        output_dir: Option<PathBuf>,
        /// Refuse to write the dump unless the signature is valid and trusted
        #[arg(long)]
        require_valid: bool,
    },
    /// Verify a detached signature over a dump with a public key
    VerifySignature {
        dump: PathBuf,
        signature: PathBuf,
        /// Armored public key file
        #[arg(long)]
        public_key: PathBuf,
        /// Trust assigned to the public key (never, unknown, marginal, full, ultimate)
        #[arg(long, default_value = "full")]
        trust: TrustLevel,
    },
    /// Add a key to the keyring from a PKCS#8 PEM private key or an armored public key
    ImportKey {
        /// Ed25519 private key (openssl genpkey -algorithm ed25519) or armored public key
        key_file: PathBuf,
        /// Separate X25519 private key for encryption (openssl genpkey -algorithm x25519)
        #[arg(long)]
        encryption_key: Option<PathBuf>,
        #[arg(long, default_value_t = default_keyring())]
        keyring: String,
        /// User id stored with the key, e.g. "Exports <exports@example.com>"
        #[arg(long)]
        uid: Option<String>,
        #[arg(long, default_value = "ultimate")]
        trust: TrustLevel,
        /// Passphrase sealing the secret key (falls back to ACCOUNT_EXPORT_PASSPHRASE, then a prompt)
        #[arg(long)]
        passphrase: Option<String>,
        /// Store the secret key without passphrase protection
        #[arg(long)]
        no_passphrase: bool,
    },
    /// Print the armored public key for self-verification
    PublicKey {
        #[arg(long, default_value_t = default_keyring())]
        keyring: String,
        #[arg(long)]
        key_id: Option<String>,
    },
}

async fn run(command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::Export {
            database_url,
            username,
            email,
            keyring,
            key_id,
            passphrase,
            policy,
            output_dir,
        } => {
            commands::export(ExportOptions {
                database_url,
                username,
                email,
                keyring: PathBuf::from(keyring),
                key_id,
                passphrase,
                policy,
                output_dir,
            })
            .await?;
            Ok(())
        }
        Commands::Decrypt {
            archive,
            passphrase,
            keyring,
            key_id,
            output_dir,
            require_valid,
        } => {
            let report = commands::decrypt(DecryptOptions {
                archive,
                keyring: PathBuf::from(keyring),
                key_id,
                passphrase,
                output_dir,
                require_valid,
            })
            .await?;
            tracing::info!("Decrypted {} statements", report.statements);
            Ok(())
        }
        Commands::VerifySignature {
            dump,
            signature,
            public_key,
            trust,
        } => {
            let outcome = commands::verify_signature(&VerifySignatureOptions {
                dump,
                signature,
                public_key,
                trust,
            })?;
            if outcome == VerificationResult::Invalid {
                anyhow::bail!("Signature verification failed");
            }
            Ok(())
        }
        Commands::ImportKey {
            key_file,
            encryption_key,
            keyring,
            uid,
            trust,
            passphrase,
            no_passphrase,
        } => {
            commands::import_key(ImportKeyOptions {
                key_file,
                encryption_key,
                keyring: PathBuf::from(keyring),
                uid,
                trust,
                passphrase,
                no_passphrase,
                kdf: KdfParams::default(),
            })?;
            Ok(())
        }
        Commands::PublicKey { keyring, key_id } => {
            let armored = commands::public_key(&PathBuf::from(keyring), key_id)?;
            print!("{}", armored);
            Ok(())
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging - default to INFO level if RUST_LOG not set
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    if let Err(err) = run(cli.command).await {
        // Pipeline errors get their non-leaking message only
        if let Some(export_err) = err.chain().find_map(|e| e.downcast_ref::<ExportError>()) {
            tracing::error!("✗ {}", export_err.user_message());
            std::process::exit(1);
        }
        return Err(err);
    }
    Ok(())
}

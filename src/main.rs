//! Face Gate - Admin CLI
//!
//! Organization and credential administration against the service database.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use secrecy::ExposeSecret;

use face_gate::api::validate_organization_name;
use face_gate::credentials::ValidatorSettings;
use face_gate::{CredentialStore, CredentialValidator, MemoryCache, ServiceConfig, SqliteStore};

#[derive(Parser)]
#[command(name = "face-gate")]
#[command(author = "Karen Tonoyan")]
#[command(version = face_gate::VERSION)]
#[command(about = "Face Gate - tenant credentials for face recognition")]
struct Cli {
    /// Config file (JSON)
    #[arg(short, long, default_value = "./face_gate.json")]
    config: PathBuf,

    /// Override the database path from the config
    #[arg(long)]
    database: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write the effective config to the config path
    WriteConfig,

    /// Create an organization
    InitOrg {
        name: String,
    },

    /// List organizations
    ListOrgs,

    /// Issue a credential (the secret is printed once)
    IssueKey {
        organization: String,
        owner: String,
        key_name: String,
    },

    /// List active credentials of an organization
    ListKeys {
        organization: String,
    },

    /// Check a secret
    ValidateKey {
        organization: String,
        owner: String,
        key_name: String,

        /// Secret to check
        #[arg(short, long)]
        secret: String,
    },

    /// Revoke a credential by proving possession of its secret
    RevokeKey {
        organization: String,
        owner: String,
        key_name: String,

        /// Current secret
        #[arg(short, long)]
        secret: String,
    },

    /// Revoke a credential without its secret
    ForceRevoke {
        organization: String,
        owner: String,
        key_name: String,
    },
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = ServiceConfig::load(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;
    if let Some(database) = cli.database {
        config.database_path = database;
    }

    if let Commands::WriteConfig = cli.command {
        config.save(&cli.config)?;
        println!("✅ Config written to: {}", cli.config.display());
        return Ok(());
    }

    let store = Arc::new(
        SqliteStore::open(&config.database_path, config.embedding_dim)
            .with_context(|| format!("opening {}", config.database_path.display()))?
            .with_reserved(config.reserved_organizations.clone()),
    );
    let validator = CredentialValidator::new(
        store.clone(),
        Arc::new(MemoryCache::new()),
        ValidatorSettings::from(&config),
    );

    match cli.command {
        Commands::WriteConfig => {}

        Commands::InitOrg { name } => {
            validate_organization_name(&name, &config.reserved_organizations)?;
            store.create_organization(&name)?;
            println!("✅ Organization ready: {}", name);
        }

        Commands::ListOrgs => {
            let orgs = store.list_organizations()?;
            if orgs.is_empty() {
                println!("📭 No organizations");
            } else {
                println!("🏢 Organizations ({}):", orgs.len());
                for org in orgs {
                    println!("   {}", org);
                }
            }
        }

        Commands::IssueKey {
            organization,
            owner,
            key_name,
        } => {
            let issued = validator.issue(&organization, &owner, &key_name)?;
            println!("🔑 Credential issued for {}", issued.credential.key());
            println!("   Secret: {}", issued.secret.expose_secret());
            println!("   Store it now, it cannot be shown again.");
        }

        Commands::ListKeys { organization } => {
            let keys = store.list_credentials(&organization)?;
            if keys.is_empty() {
                println!("📭 No credentials in {}", organization);
            } else {
                println!("🔑 Credentials in {} ({}):", organization, keys.len());
                println!("{:-<60}", "");
                for key in keys {
                    let last_used = key
                        .last_used_at
                        .map(|t| t.to_rfc3339())
                        .unwrap_or_else(|| "never".into());
                    println!(
                        "   {}/{} - created {} - last used {}",
                        key.owner,
                        key.key_name,
                        key.created_at.to_rfc3339(),
                        last_used
                    );
                }
            }
        }

        Commands::ValidateKey {
            organization,
            owner,
            key_name,
            secret,
        } => {
            if validator.validate(&organization, &owner, &key_name, &secret)? {
                println!("✅ Credential valid");
            } else {
                bail!("credential rejected");
            }
        }

        Commands::RevokeKey {
            organization,
            owner,
            key_name,
            secret,
        } => {
            if validator.revoke(&organization, &owner, &key_name, &secret)? {
                println!("🗑️ Credential revoked");
            } else {
                bail!("credential rejected, nothing revoked");
            }
        }

        Commands::ForceRevoke {
            organization,
            owner,
            key_name,
        } => {
            if validator.force_revoke(&organization, &owner, &key_name)? {
                println!("🗑️ Credential revoked");
                println!("⚠️ Cached validations in running services stay valid until their TTL expires");
            } else {
                bail!("no active credential {}/{} in {}", owner, key_name, organization);
            }
        }
    }

    Ok(())
}

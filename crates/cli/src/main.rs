use anyhow::Context;
use api_shared::{DevTokenIssuer, TokenClaims};
use clap::{Parser, Subcommand};
use clinic_core::config::{database_path_from_env_value, store_timeout_from_env_value};
use clinic_core::{Clinic, Database, Role};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const PRIVATE_KEY_FILE: &str = "issuer-private.pem";
const PUBLIC_KEY_FILE: &str = "issuer-public.pem";

#[derive(Parser)]
#[command(name = "clinic")]
#[command(about = "Clinic backend operator CLI")]
struct Cli {
    /// SQLite database file (default: CLINIC_DATABASE_PATH, then clinic.db)
    #[arg(long, global = true)]
    database: Option<PathBuf>,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply default policy rules for roles whose baseline rule is missing
    SeedPolicies,
    /// List stored policy rules
    Policies,
    /// Add a policy rule
    AddPolicy {
        /// admin, doctor or patient
        role: String,
        /// Path pattern, e.g. /api/v1/appointments/:id
        resource: String,
        /// Verb pattern, e.g. (GET)|(POST)
        action: String,
    },
    /// Remove a policy rule
    RemovePolicy {
        role: String,
        resource: String,
        action: String,
    },
    /// List users
    Users,
    /// Change a user's role
    SetRole {
        user_id: i64,
        /// admin, doctor or patient
        role: String,
        #[arg(long)]
        department: Option<i64>,
        #[arg(long)]
        specialization: Option<String>,
    },
    /// Generate a P-256 issuer key pair for local development
    Keygen {
        /// Directory to write the PEM files into
        #[arg(long, default_value = ".")]
        out_dir: PathBuf,
    },
    /// Sign a development bearer token with a private issuer key
    MintToken {
        email: String,
        /// PKCS#8 private key written by `keygen`
        #[arg(long, default_value = PRIVATE_KEY_FILE)]
        key: PathBuf,
        #[arg(long, env = "CLINIC_ISSUER_AUDIENCE")]
        audience: String,
        #[arg(long, env = "CLINIC_ISSUER")]
        issuer: Option<String>,
        #[arg(long)]
        name: Option<String>,
        /// Lifetime in seconds
        #[arg(long, default_value_t = 3600)]
        ttl: u64,
    },
}

fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("clinic_core=warn".parse()?),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::SeedPolicies) => {
            let clinic = open(cli.database)?;
            let report = clinic.policy.seed_defaults()?;
            if report.roles_seeded.is_empty() {
                println!("Policy already seeded.");
            } else {
                let roles: Vec<&str> = report.roles_seeded.iter().map(|r| r.as_str()).collect();
                println!("Added {} rules for: {}", report.added, roles.join(", "));
            }
        }
        Some(Commands::Policies) => {
            let clinic = open(cli.database)?;
            let rules = clinic.policy.rules()?;
            if rules.is_empty() {
                println!("No policy rules found.");
            }
            for rule in rules {
                println!("{:<8} {:<40} {}", rule.role, rule.resource, rule.action);
            }
        }
        Some(Commands::AddPolicy {
            role,
            resource,
            action,
        }) => {
            let clinic = open(cli.database)?;
            let role: Role = role.parse()?;
            if clinic.policy.add(role, &resource, &action)? {
                println!("Added rule for {role}.");
            } else {
                println!("Rule already present.");
            }
        }
        Some(Commands::RemovePolicy {
            role,
            resource,
            action,
        }) => {
            let clinic = open(cli.database)?;
            let role: Role = role.parse()?;
            if clinic.policy.remove(role, &resource, &action)? {
                println!("Removed rule for {role}.");
            } else {
                println!("No such rule.");
            }
        }
        Some(Commands::Users) => {
            let clinic = open(cli.database)?;
            let users = clinic.users.list_users()?;
            if users.is_empty() {
                println!("No users found.");
            }
            for user in users {
                println!(
                    "ID: {}, Email: {}, Name: {}, Role: {}",
                    user.id, user.email, user.name, user.role
                );
            }
        }
        Some(Commands::SetRole {
            user_id,
            role,
            department,
            specialization,
        }) => {
            let clinic = open(cli.database)?;
            let role: Role = role.parse()?;
            let user = clinic
                .users
                .set_role(user_id, role, department, specialization)?;
            println!("User {} is now {}.", user.email, user.role);
        }
        Some(Commands::Keygen { out_dir }) => {
            let (private_path, public_path) = keygen(&out_dir)?;
            println!("Wrote {}", private_path.display());
            println!("Wrote {}", public_path.display());
            println!("Point CLINIC_ISSUER_KEYS at the public key.");
        }
        Some(Commands::MintToken {
            email,
            key,
            audience,
            issuer,
            name,
            ttl,
        }) => {
            let token = mint_token(&key, &audience, issuer, &email, name, ttl)?;
            println!("{token}");
        }
        None => {
            println!("Use 'clinic --help' for commands");
        }
    }

    Ok(())
}

fn open(database: Option<PathBuf>) -> anyhow::Result<Clinic> {
    let path = database.unwrap_or_else(|| {
        database_path_from_env_value(std::env::var("CLINIC_DATABASE_PATH").ok())
    });
    let timeout = store_timeout_from_env_value(std::env::var("CLINIC_STORE_TIMEOUT_MS").ok())?;
    let db = Database::open(&path, timeout)
        .with_context(|| format!("opening {}", path.display()))?;
    Ok(Clinic::with_database(db))
}

fn keygen(out_dir: &Path) -> anyhow::Result<(PathBuf, PathBuf)> {
    let issuer = DevTokenIssuer::generate("unused");
    let private_path = out_dir.join(PRIVATE_KEY_FILE);
    let public_path = out_dir.join(PUBLIC_KEY_FILE);
    std::fs::create_dir_all(out_dir)?;
    std::fs::write(&private_path, issuer.private_key_pem()?)?;
    std::fs::write(&public_path, issuer.public_key_pem()?)?;
    Ok((private_path, public_path))
}

fn mint_token(
    key: &Path,
    audience: &str,
    issuer: Option<String>,
    email: &str,
    name: Option<String>,
    ttl: u64,
) -> anyhow::Result<String> {
    let pem_text =
        std::fs::read_to_string(key).with_context(|| format!("reading {}", key.display()))?;
    let mut signer = DevTokenIssuer::from_pkcs8_pem(&pem_text, audience)?;
    if let Some(issuer) = issuer {
        signer = signer.with_issuer(issuer);
    }
    let mut claims = TokenClaims::for_email(email, Duration::from_secs(ttl));
    claims.name = name;
    Ok(signer.mint(&claims)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use api_shared::{Es256Verifier, IdentityVerifier};

    #[test]
    fn keygen_output_round_trips_through_mint_and_verify() {
        let dir = tempfile::tempdir().unwrap();
        let (private_path, public_path) = keygen(dir.path()).unwrap();

        let token = mint_token(
            &private_path,
            "clinic",
            None,
            "doc@clinic.test",
            Some("Dr Who".into()),
            60,
        )
        .unwrap();

        let public = std::fs::read_to_string(public_path).unwrap();
        let keys = api_shared::auth::parse_public_key_bundle(&public).unwrap();
        let identity = Es256Verifier::new(keys, "clinic", None)
            .verify(&token)
            .unwrap();
        assert_eq!(identity.email.as_str(), "doc@clinic.test");
        assert_eq!(identity.name, "Dr Who");
    }

    #[test]
    fn opens_file_database_and_seeds_policy() {
        let dir = tempfile::tempdir().unwrap();
        let clinic = open(Some(dir.path().join("clinic.db"))).unwrap();
        assert!(clinic.users.list_users().unwrap().is_empty());
        let report = clinic.policy.seed_defaults().unwrap();
        assert_eq!(report.roles_seeded.len(), 3);
    }
}

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use rand::{distributions::Alphanumeric, Rng};

use leadnest_gate::auth::{Identity, TokenCodec, DEFAULT_TTL_SECS};
use leadnest_gate::config::{load_config, loader::JWT_SECRET_ENV, RoutesConfig};
use leadnest_gate::routing::RouteClassifier;

#[derive(Parser)]
#[command(name = "gate-cli")]
#[command(about = "Operator CLI for the LeadNest admission gateway", long_about = None)]
struct Cli {
    /// Signing secret; falls back to the JWT_SECRET environment variable.
    #[arg(short, long, global = true)]
    secret: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Issue or inspect credential tokens
    Token {
        #[command(subcommand)]
        command: TokenCommands,
    },
    /// Show how the gateway classifies a request path
    Classify { path: String },
    /// Load and validate a configuration file
    CheckConfig { file: PathBuf },
    /// Print a fresh random signing secret
    Secret {
        #[arg(short, long, default_value_t = 64)]
        length: usize,
    },
}

#[derive(Subcommand)]
enum TokenCommands {
    /// Issue a token for a subject
    Issue {
        #[arg(long)]
        subject: String,
        #[arg(long)]
        email: Option<String>,
        #[arg(long)]
        role: Option<String>,
        #[arg(long, default_value_t = DEFAULT_TTL_SECS)]
        ttl_secs: i64,
    },
    /// Verify a token and print its identity
    Verify { token: String },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    match cli.command {
        Commands::Token { command } => {
            let secret = match cli.secret.or_else(|| std::env::var(JWT_SECRET_ENV).ok()) {
                Some(s) if !s.is_empty() => s,
                _ => return Err(format!("no signing secret: pass --secret or set {JWT_SECRET_ENV}").into()),
            };
            match command {
                TokenCommands::Issue { subject, email, role, ttl_secs } => {
                    let mut identity = Identity::new(subject);
                    if let Some(email) = email {
                        identity = identity.with_email(email);
                    }
                    if let Some(role) = role {
                        identity = identity.with_role(role);
                    }
                    let token = TokenCodec::new(&secret, ttl_secs).issue_for(&identity)?;
                    println!("{token}");
                }
                TokenCommands::Verify { token } => {
                    match TokenCodec::new(&secret, DEFAULT_TTL_SECS).verify(&token) {
                        Ok(identity) => {
                            println!("valid");
                            println!("  subject: {}", identity.subject_id);
                            if let Some(email) = identity.email {
                                println!("  email:   {email}");
                            }
                            if let Some(role) = identity.role {
                                println!("  role:    {role}");
                            }
                        }
                        Err(e) => {
                            eprintln!("{e}");
                            std::process::exit(1);
                        }
                    }
                }
            }
        }
        Commands::Classify { path } => {
            let classification = RouteClassifier::from_config(&RoutesConfig::default()).classify(&path);
            println!("class: {}", classification.class);
            println!("mode:  {:?}", classification.mode);
        }
        Commands::CheckConfig { file } => match load_config(&file) {
            Ok(config) => {
                println!("OK: {}", file.display());
                println!("  listener: {}", config.listener.bind_address);
                println!("  upstream: {}", config.upstream.url);
                println!("  rate limiting: {}", if config.rate_limit.enabled { "on" } else { "off" });
            }
            Err(e) => {
                eprintln!("Error: {e}");
                std::process::exit(1);
            }
        },
        Commands::Secret { length } => {
            let secret: String = rand::thread_rng()
                .sample_iter(&Alphanumeric)
                .take(length)
                .map(char::from)
                .collect();
            println!("{secret}");
        }
    }

    Ok(())
}

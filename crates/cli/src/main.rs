mod assessor;
mod config;
mod redeem;

use std::path::{Path, PathBuf};
use std::process;

use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;
use vault_engine::{hash_secret, RiskAssessment, Transaction};

use crate::config::VaultConfig;

/// Output format for CLI responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub(crate) enum OutputFormat {
    Text,
    Json,
}

/// VoucherVault voucher redemption.
#[derive(Parser)]
#[command(name = "vault", version, about = "VoucherVault voucher redemption")]
struct Cli {
    /// Output format (text or json)
    #[arg(long, global = true, default_value = "text", value_enum)]
    output: OutputFormat,

    /// Path to a vault TOML config (default: the bundled example)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Redeem a voucher code into the configured user's ledger
    Redeem {
        /// The 10-12 digit voucher code
        code: String,
        /// Authorization secret; repeat for successive attempts
        #[arg(long = "pin", required = true)]
        pins: Vec<String>,
        /// Run the configured risk assessor over the resulting history
        #[arg(long)]
        assess: bool,
    },

    /// Assess a JSON array of transactions with the configured assessor
    Assess {
        /// Path to the transaction history JSON file
        history: PathBuf,
    },

    /// Print the salted digest of a secret for a [credential] section
    HashSecret {
        /// User the credential belongs to
        #[arg(long)]
        user_id: String,
        /// Per-user salt
        #[arg(long)]
        salt: String,
        /// The plaintext secret (e.g. a 6-digit PIN)
        secret: String,
    },

    /// Print the bundled example config
    InitConfig,
}

fn main() {
    init_logging();
    let cli = Cli::parse();

    match cli.command {
        Commands::Redeem { code, pins, assess } => {
            cmd_redeem(cli.config.as_deref(), &code, &pins, assess, cli.output);
        }
        Commands::Assess { history } => {
            cmd_assess(cli.config.as_deref(), &history, cli.output);
        }
        Commands::HashSecret {
            user_id,
            salt,
            secret,
        } => {
            cmd_hash_secret(&user_id, &salt, &secret, cli.output);
        }
        Commands::InitConfig => {
            print!("{}", config::EXAMPLE_CONFIG);
        }
    }
}

/// Logs go to stderr so stdout stays parseable. Filter with `VAULT_LOG`.
fn init_logging() {
    let filter = EnvFilter::try_from_env("VAULT_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

fn runtime(output: OutputFormat) -> tokio::runtime::Runtime {
    match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            report_error(&format!("failed to create tokio runtime: {}", e), output);
            process::exit(1);
        }
    }
}

fn load_config(path: Option<&Path>, output: OutputFormat) -> VaultConfig {
    match config::load(path) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "configuration rejected");
            report_error(&format!("config error: {}", e), output);
            process::exit(1);
        }
    }
}

fn cmd_redeem(
    config_path: Option<&Path>,
    code: &str,
    pins: &[String],
    assess: bool,
    output: OutputFormat,
) {
    let config = load_config(config_path, output);
    let rt = runtime(output);

    let report = match rt.block_on(redeem::run(&config, code, pins, assess)) {
        Ok(report) => report,
        Err(e) => {
            report_error(&e, output);
            process::exit(1);
        }
    };

    match output {
        OutputFormat::Text => redeem::print_text(&report),
        OutputFormat::Json => print_json(&report),
    }
    if report.transaction.is_none() {
        process::exit(1);
    }
}

fn cmd_assess(config_path: Option<&Path>, history_path: &Path, output: OutputFormat) {
    let config = load_config(config_path, output);

    let content = match std::fs::read_to_string(history_path) {
        Ok(s) => s,
        Err(e) => {
            let msg = format!("error reading file '{}': {}", history_path.display(), e);
            report_error(&msg, output);
            process::exit(1);
        }
    };
    let history: Vec<Transaction> = match serde_json::from_str(&content) {
        Ok(h) => h,
        Err(e) => {
            let msg = format!("error parsing JSON in '{}': {}", history_path.display(), e);
            report_error(&msg, output);
            process::exit(1);
        }
    };

    let rt = runtime(output);
    let assessment = rt.block_on(assessor::assess(&config.assessor, &history));
    match output {
        OutputFormat::Text => print_assessment_text(&assessment),
        OutputFormat::Json => print_json(&assessment),
    }
}

fn cmd_hash_secret(user_id: &str, salt: &str, secret: &str, output: OutputFormat) {
    let secret_hash = hash_secret(salt, secret);
    match output {
        OutputFormat::Text => {
            println!("[credential]");
            println!("user_id = \"{}\"", user_id);
            println!("salt = \"{}\"", salt);
            println!("secret_hash = \"{}\"", secret_hash);
        }
        OutputFormat::Json => print_json(&serde_json::json!({
            "user_id": user_id,
            "salt": salt,
            "secret_hash": secret_hash,
        })),
    }
}

pub(crate) fn print_assessment_text(assessment: &RiskAssessment) {
    println!(
        "Risk: {} (score {})",
        assessment.risk_level, assessment.risk_score
    );
    println!("  Analysis: {}", assessment.analysis);
    println!("  Recommended action: {}", assessment.recommended_action);
}

fn print_json<T: serde::Serialize>(value: &T) {
    let pretty = serde_json::to_string_pretty(value)
        .unwrap_or_else(|e| format!("{{\"error\": \"serialization error: {}\"}}", e));
    println!("{}", pretty);
}

pub(crate) fn report_error(msg: &str, output: OutputFormat) {
    match output {
        OutputFormat::Text => eprintln!("{}", msg),
        OutputFormat::Json => {
            eprintln!("{}", serde_json::json!({ "error": msg }));
        }
    }
}

//! Zentinel WS-Security Layout validator binary.
//!
//! Run with: `zentinel-wss-layout --config config.yaml --results results.yaml`
//!
//! Validates the security results of one processed message against the
//! Layout policy configured for its operation.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;
use zentinel_wss_layout::{LayoutEnforcer, LayoutValidatorConfig, ResultsDocument};

/// WS-Security Layout policy validator for Zentinel.
///
/// Checks that timestamps, tokens and signatures appear in the security
/// header in the order the declared Layout policy requires.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file (YAML)
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// Path to the processed security results of a message (YAML)
    #[arg(short, long)]
    results: PathBuf,

    /// SOAP operation the message invoked (overrides the results document)
    #[arg(short, long)]
    operation: Option<String>,

    /// Message identifier used in logs (overrides the results document)
    #[arg(short, long)]
    message_id: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let log_level = args.log_level.parse().unwrap_or(Level::INFO);
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")?;

    info!("Starting Zentinel WS-Security Layout validator v{}", env!("CARGO_PKG_VERSION"));
    info!("Config file: {}", args.config.display());

    // Load configuration
    let config = if args.config.exists() {
        let content = tokio::fs::read_to_string(&args.config)
            .await
            .context("Failed to read config file")?;
        serde_yaml::from_str(&content).context("Failed to parse config file")?
    } else {
        info!("Config file not found, using defaults");
        LayoutValidatorConfig::default()
    };

    info!(
        policies = config.policies.len(),
        fail_action = ?config.settings.fail_action,
        "Configuration loaded"
    );

    let enforcer = LayoutEnforcer::new(config).context("Invalid configuration")?;

    // Load the processed results
    let content = tokio::fs::read_to_string(&args.results)
        .await
        .with_context(|| format!("Failed to read results file {}", args.results.display()))?;
    let document = ResultsDocument::from_yaml_str(&content).context("Failed to parse results file")?;

    let message_id = args
        .message_id
        .or_else(|| document.message_id.clone())
        .unwrap_or_else(|| "-".to_string());
    let operation = args.operation.or_else(|| document.operation.clone());
    let results = document
        .into_security_results()
        .context("Invalid results document")?;

    let outcome = enforcer.enforce(&message_id, operation.as_deref(), &results);

    for failure in &outcome.report.failures {
        warn!(
            message_id = %message_id,
            assertion = %failure.assertion,
            code = %failure.violation.code.as_str(),
            "{}",
            failure.violation.message
        );
    }

    if outcome.is_rejected() {
        anyhow::bail!(
            "Message {} rejected: security header layout does not satisfy policy",
            message_id
        );
    }

    info!(
        message_id = %message_id,
        assertions = outcome.report.assertions_checked,
        "Message accepted"
    );
    Ok(())
}

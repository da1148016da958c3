use anyhow::Context;
use clap::Parser;
use checkin::clients::create_ledger;
use checkin::session::ReqwestSessionProvider;
use checkin::{CheckinRunner, Config, ReconcileOptions, telemetry};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse CLI args
    let args = checkin::config::Args::parse();

    // Load configuration
    let config = Config::load(&args)?;

    // If --validate flag is set, exit successfully after config validation
    if args.validate {
        println!("Configuration is valid.");
        return Ok(());
    }

    telemetry::init_telemetry(config.enable_otel_export)?;

    tracing::debug!("{:?}", args);

    let accounts = config.selected_accounts(args.account.as_deref());
    if accounts.is_empty() {
        tracing::warn!(only = ?args.account, "No enabled accounts to process");
    }

    let options = config
        .ledger
        .as_ref()
        .map(|ledger| ReconcileOptions {
            key_type: ledger.key_type.clone(),
        })
        .unwrap_or_default();
    let runner = CheckinRunner::new(
        Box::new(ReqwestSessionProvider::new(config.console.clone())),
        create_ledger(config.ledger.as_ref())?,
        options,
    );

    let results = runner.run_all(&accounts).await;

    let succeeded = results.iter().filter(|r| r.outcome.success).count();
    for result in &results {
        match (&result.outcome.error, &result.outcome.user_info) {
            (Some(error), _) => tracing::warn!(account = %result.account, %error, "Check-in failed"),
            (None, Some(info)) => tracing::info!(
                account = %result.account,
                username = %info.username,
                quota = info.quota,
                banned = info.banned,
                tokens = info.tokens.len(),
                "Check-in finished"
            ),
            (None, None) => tracing::info!(account = %result.account, "Check-in finished"),
        }
    }
    tracing::info!(succeeded, total = results.len(), "All accounts processed");

    if let Some(path) = &args.output {
        let summary = serde_json::to_string_pretty(&results)?;
        std::fs::write(path, summary).with_context(|| format!("Failed to write summary to {}", path))?;
        tracing::info!(%path, "Summary written");
    }

    telemetry::shutdown_telemetry();
    Ok(())
}

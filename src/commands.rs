use chrono::Local;
use nyc_violations::config::AppConfig;
use nyc_violations::error::MonitorError;
use nyc_violations::monitor::notify::{parse_mailbox, SmtpRelay};
use nyc_violations::monitor::sources::ReqwestTransport;
use nyc_violations::monitor::{
    CsvViolationLedger, KnownViolationStore, PropertyKey, RunController, RunOptions,
    SocrataSource,
};
use std::sync::Arc;
use tracing::{info, warn};

use crate::{KnownArgs, RunArgs};

pub(crate) fn apply_overrides(config: &mut AppConfig, args: &RunArgs) {
    if args.block.is_some() || args.lot.is_some() {
        let block = args
            .block
            .clone()
            .unwrap_or_else(|| config.property.block.clone());
        let lot = args
            .lot
            .clone()
            .unwrap_or_else(|| config.property.lot.clone());
        config.property = PropertyKey::new(block.trim(), lot.trim());
    }
    if let Some(store) = &args.store {
        config.state.store_path = store.clone();
    }
}

pub(crate) fn run(config: &AppConfig, args: &RunArgs) -> Result<(), MonitorError> {
    let options = RunOptions {
        no_email: args.no_email,
    };
    let mut controller = RunController::from_config(config, &options)?;
    let report = controller.execute(Local::now())?;

    let summary = report.summary_line();
    println!("{summary}");
    info!(
        outcome = report.outcome.label(),
        stage = report.stage.label(),
        "run finished"
    );

    report.ensure_success()
}

pub(crate) fn check(config: &AppConfig) -> Result<(), MonitorError> {
    println!("Property: {}", config.property);
    println!("Store: {}", config.state.store_path.display());

    println!("\nData sources");
    let transport = Arc::new(ReqwestTransport::new(ReqwestTransport::DEFAULT_TIMEOUT)?);
    let mut reachable = 0;
    for source in &config.nyc_data.sources {
        let probe = SocrataSource::new(
            *source,
            config.nyc_data.base_url.clone(),
            config.nyc_data.api_token.clone(),
            transport.clone(),
        );
        match probe.probe() {
            Ok(rows) => {
                reachable += 1;
                println!(
                    "✓ {} ({}): reachable, {} sample row(s)",
                    source.label(),
                    probe.dataset().dataset_id,
                    rows
                );
            }
            Err(err) => {
                warn!(error = %err, "dataset probe failed");
                println!("✗ {} ({}): {}", source.label(), probe.dataset().dataset_id, err.failure);
            }
        }
    }

    println!("\nE-mail");
    let mut problems = config.email.problems();
    if let Err(err) = SmtpRelay::from_config(&config.email) {
        problems.push(err.to_string());
    }
    for recipient in &config.email.to_emails {
        if let Err(err) = parse_mailbox(recipient) {
            problems.push(err.to_string());
        }
    }
    if problems.is_empty() {
        println!(
            "✓ {}:{} as {} to {} recipient(s)",
            config.email.smtp_server,
            config.email.smtp_port,
            config.email.from_email,
            config.email.to_emails.len()
        );
    } else {
        for problem in &problems {
            println!("✗ {problem}");
        }
    }

    if reachable == 0 {
        return Err(MonitorError::AllSourcesFailed {
            failed: config.nyc_data.sources.len(),
        });
    }
    Ok(())
}

pub(crate) fn known(config: &AppConfig, args: &KnownArgs) -> Result<(), MonitorError> {
    let ledger = CsvViolationLedger::open(&config.state.store_path)?;
    let mut entries: Vec<_> = ledger
        .entries()
        .into_iter()
        .filter(|entry| args.source.map_or(true, |source| entry.source == source))
        .collect();
    entries.sort_by(|a, b| {
        a.source
            .cmp(&b.source)
            .then_with(|| a.first_seen.cmp(&b.first_seen))
            .then_with(|| a.native_id.cmp(&b.native_id))
    });

    if entries.is_empty() {
        println!("No known violations recorded in {}", ledger.path().display());
        return Ok(());
    }

    println!("{} known violation(s) in {}", entries.len(), ledger.path().display());
    for entry in &entries {
        let issued = entry
            .issued_date
            .map(|date| date.to_string())
            .unwrap_or_else(|| "unknown".to_string());
        println!(
            "- {} | {} | first seen {} | issued {} | block {} lot {}",
            entry.source.label(),
            entry.native_id,
            entry.first_seen.format("%Y-%m-%d %H:%M UTC"),
            issued,
            entry.block,
            entry.lot
        );
    }
    Ok(())
}

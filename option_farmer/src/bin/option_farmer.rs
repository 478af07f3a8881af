use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use option_farmer::{
    FarmerConfig,
    cli::commands::{Cli, Commands},
    farm::{Farmer, LiveFactory, RunSummary, snapshot_page},
    models::clock::RunClock,
    scheduler::UpdateLoopController,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => FarmerConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => FarmerConfig::default(),
    };

    match cli.command {
        Commands::Snapshot { page, page_size } => print_page(&config, page, page_size)?,
        Commands::Chain => report("chain", &farmer(config)?.run_chain_discovery().await?),
        Commands::Detail => report("detail", &farmer(config)?.run_contract_detail().await?),
        Commands::Update { repeat: false } => {
            report("update", &farmer(config)?.run_update_cycle().await?)
        }
        Commands::Update { repeat: true } => {
            let farmer = farmer(config)?;
            let mut controller = UpdateLoopController::new();
            controller.start(farmer.update_loop());
            info!("update loop running; press Ctrl-C to stop");
            tokio::signal::ctrl_c().await.context("waiting for Ctrl-C")?;
            info!("stopping after the current cycle");
            controller.stop().await;
            if let Some(Ok(summary)) = controller.status().last_result {
                report("update", &summary);
            }
        }
        Commands::Contract { symbol, option_id } => {
            let contract = farmer(config)?.fetch_contract(&symbol, &option_id).await?;
            println!("{contract:#?}");
        }
    }

    Ok(())
}

fn farmer(config: FarmerConfig) -> Result<Arc<Farmer>> {
    let factory = LiveFactory::from_config(&config).context("configuring Polygon/Redis access")?;
    Ok(Arc::new(Farmer::new(config, Arc::new(factory))))
}

fn print_page(config: &FarmerConfig, page: usize, page_size: usize) -> Result<()> {
    let page = snapshot_page(&config.output.chain_dir, &RunClock::now(), page, page_size)?;
    let mut out = csv::Writer::from_writer(std::io::stdout());
    for row in &page.rows {
        out.serialize(row)?;
    }
    out.flush()?;
    eprintln!(
        "page {} ({} rows per page), {} rows total",
        page.page, page.page_size, page.total
    );
    Ok(())
}

fn report(mode: &str, summary: &RunSummary) {
    let saved_to = summary
        .path
        .as_ref()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "-".to_string());
    println!(
        "{mode}: rows={} saved_to={saved_to} succeeded={}/{} elapsed={:.1}s",
        summary.rows,
        summary.success_count,
        summary.symbols,
        summary.elapsed.as_secs_f64()
    );
    if !summary.failed_symbols.is_empty() {
        println!("failed: {}", summary.failed_symbols.join(","));
    }
    if let Some(rec) = &summary.reconciliation {
        println!(
            "expected={} produced={} missing={}",
            rec.expected,
            rec.produced,
            rec.missing.len()
        );
    }
}

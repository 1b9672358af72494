use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info};

use fleximart_etl::config::Config;
use fleximart_etl::constants::DEFAULT_CONFIG_PATH;
use fleximart_etl::db::{SqliteSink, TABLES};
use fleximart_etl::error::EtlError;
use fleximart_etl::extract::CsvExtracts;
use fleximart_etl::logging;
use fleximart_etl::pipeline::Pipeline;
use fleximart_etl::report::{RunReport, StageReport};

#[derive(Parser)]
#[command(name = "fleximart_etl")]
#[command(about = "Load FlexiMart customer, product and sales extracts into the relational store")]
#[command(version)]
struct Cli {
    /// Configuration file (defaults apply when it does not exist)
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the customers, products and sales stages
    Run {
        /// SQLite database file
        #[arg(long)]
        db: Option<PathBuf>,
        #[arg(long)]
        customers: Option<PathBuf>,
        #[arg(long)]
        products: Option<PathBuf>,
        #[arg(long)]
        sales: Option<PathBuf>,
        /// Write the run report as JSON to this file
        #[arg(long)]
        report: Option<PathBuf>,
    },
    /// Create the four tables if they do not exist
    InitSchema {
        #[arg(long)]
        db: Option<PathBuf>,
    },
}

fn print_stage(report: &StageReport) {
    println!("\n📊 {} stage:", report.stage);
    println!("   Input rows:      {}", report.input_rows);
    println!("   Admissible rows: {}", report.admissible_rows);
    println!("   Committed rows:  {}", report.committed_rows);
    println!("   Dropped:         {}", report.dropped.len());
    println!("   Skipped:         {}", report.skipped_count());
    for record in &report.skipped {
        println!("   - {}: {}", record.record_id, record.reason);
    }
}

fn print_table_counts(sink: &SqliteSink) -> Result<()> {
    println!("\n🗄️  Table counts:");
    for table in TABLES {
        let count = sink
            .table_count(table)
            .with_context(|| format!("counting rows in {table}"))?;
        println!("   {table}: {count}");
    }
    Ok(())
}

fn write_report(path: &Path, report: &RunReport) -> Result<()> {
    let json = serde_json::to_string_pretty(report)?;
    std::fs::write(path, json)
        .with_context(|| format!("writing run report to {}", path.display()))?;
    info!("Wrote run report to {}", path.display());
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = Config::load(&cli.config)
        .with_context(|| format!("loading configuration from {}", cli.config.display()))?;

    let _log_guard = logging::init_logging(&config.logging.dir);

    match cli.command {
        Commands::InitSchema { db } => {
            if let Some(path) = db {
                config.database.path = path;
            }
            let sink = SqliteSink::open(&config.database).context("opening database")?;
            sink.ensure_schema().context("creating schema")?;
            println!("✅ Schema ready at {}", config.database.path.display());
        }
        Commands::Run {
            db,
            customers,
            products,
            sales,
            report,
        } => {
            if let Some(path) = db {
                config.database.path = path;
            }
            if let Some(path) = customers {
                config.extracts.customers = path;
            }
            if let Some(path) = products {
                config.extracts.products = path;
            }
            if let Some(path) = sales {
                config.extracts.sales = path;
            }

            let sink = Arc::new(SqliteSink::open(&config.database).context("opening database")?);
            let extracts = Arc::new(CsvExtracts::from_config(&config.extracts));
            let pipeline = Pipeline::new(sink.clone(), extracts);

            println!("🚀 Running FlexiMart ETL...");
            match pipeline.run().await {
                Ok(run_report) => {
                    for stage in &run_report.stages {
                        print_stage(stage);
                    }
                    println!(
                        "\n✅ Run {} completed: {} committed, {} skipped",
                        run_report.run_id,
                        run_report.total_committed(),
                        run_report.total_skipped()
                    );
                    print_table_counts(&sink)?;
                    if let Some(path) = report {
                        write_report(&path, &run_report)?;
                    }
                }
                Err(EtlError::StageAborted {
                    stage,
                    completed,
                    source,
                }) => {
                    for stage_report in &completed {
                        print_stage(stage_report);
                    }
                    error!("Run aborted at {} stage: {}", stage, source);
                    println!("\n❌ Run aborted at {} stage: {}", stage, source);
                    anyhow::bail!("run aborted at {stage} stage");
                }
                Err(e) => return Err(e).context("running pipeline"),
            }
        }
    }
    Ok(())
}

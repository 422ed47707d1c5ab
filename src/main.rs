mod batch;
mod cohort;
mod db;
mod document;
mod error;
mod filter;
mod gemini;
mod qa;
mod settings;
mod sink;
mod source;
mod utils;

use std::io::Read;
use std::path::PathBuf;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;

use crate::batch::{BatchRunner, CohortReport};
use crate::gemini::GeminiClient;
use crate::qa::QaGenerator;
use crate::settings::Settings;
use crate::sink::DocxSink;
use crate::source::{ClinicalTrialsClient, RecordSource};

#[derive(Parser)]
#[command(
    name = "trial_qa",
    about = "Clinical-trial eligibility excerpts with generated gene-mutation Q&A"
)]
struct Cli {
    /// Settings file (default: ./trial_qa.toml if present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch, filter, generate and write one document per trial
    Run {
        /// Only these gene cohorts (repeatable; default: all)
        #[arg(short, long)]
        gene: Vec<String>,
        /// Cohort file (overrides settings)
        #[arg(long)]
        cohorts: Option<PathBuf>,
    },
    /// Print the eligibility excerpt of a serialized record (file or stdin)
    Filter {
        file: Option<PathBuf>,
    },
    /// Fetch one trial and print its title and excerpt
    Preview {
        link: String,
    },
    /// Show ledger statistics
    Stats,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Run { gene, cohorts } => {
            let settings = Settings::load(cli.config.as_deref())?;
            run(&settings, &gene, cohorts).await
        }
        Commands::Filter { file } => {
            let raw = match file {
                Some(path) => std::fs::read_to_string(&path)
                    .with_context(|| format!("Failed to read {:?}", path))?,
                None => {
                    let mut buf = String::new();
                    std::io::stdin().read_to_string(&mut buf)?;
                    buf
                }
            };
            println!("{}", filter::filter_record(&raw));
            Ok(())
        }
        Commands::Preview { link } => {
            let settings = Settings::load(cli.config.as_deref())?;
            let trial_id = utils::trial_id_from_url(&link)?;
            let source =
                ClinicalTrialsClient::new(&settings.records_base_url, settings.request_timeout())?;
            let record = source
                .fetch(&trial_id)
                .await
                .with_context(|| format!("Failed to fetch data for {}", trial_id))?;
            println!("{}: {}\n", trial_id, record.title);
            println!("{}", filter::filter_record(&record.raw));
            Ok(())
        }
        Commands::Stats => {
            let settings = Settings::load(cli.config.as_deref())?;
            let conn = db::connect(&settings.db_path)?;
            db::init_schema(&conn)?;
            let s = db::get_stats(&conn)?;
            println!("Runs:           {}", s.runs);
            println!("Documents:      {}", s.written);
            println!("Unanswered:     {}", s.unanswered);
            println!("Fetch failures: {}", s.fetch_failed);
            println!("Malformed:      {}", s.malformed);
            println!("Save failures:  {}", s.sink_failed);

            let by_gene = db::written_by_gene(&conn)?;
            if !by_gene.is_empty() {
                println!("\n{:<8} | {:>9} | {:>14}", "Gene", "Documents", "Fetch failures");
                println!("{}", "-".repeat(37));
                for (gene, written, failed) in by_gene {
                    println!(
                        "{:<8} | {:>9} | {:>14}",
                        utils::truncate(&gene, 8),
                        written,
                        failed
                    );
                }
            }
            Ok(())
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", utils::format_duration(elapsed));
    }

    result
}

async fn run(settings: &Settings, genes: &[String], cohorts_path: Option<PathBuf>) -> Result<()> {
    let cohorts_path = cohorts_path.unwrap_or_else(|| settings.cohorts_path.clone());
    let cohorts = cohort::select(cohort::load(&cohorts_path)?, genes)?;
    if cohorts.is_empty() {
        println!("No cohorts in {:?}.", cohorts_path);
        return Ok(());
    }

    let api_key = settings.gemini_api_key.clone().context(
        "No Gemini API key: set GEMINI_API_KEY or gemini_api_key in the settings file",
    )?;
    let source = ClinicalTrialsClient::new(&settings.records_base_url, settings.request_timeout())?;
    let gemini = GeminiClient::new(
        &settings.gemini_base_url,
        &settings.model,
        api_key,
        settings.request_timeout(),
    )?;
    let model = gemini.model().to_string();
    let qa = QaGenerator::new(gemini, settings.retry_policy());
    let sink = DocxSink::new(&settings.output_folder())?;
    let mut runner = BatchRunner::new(source, qa, sink, &settings.file_prefix)
        .with_sink_failure(settings.sink_failure);

    let conn = db::connect(&settings.db_path)?;
    db::init_schema(&conn)?;
    let run_id = db::new_run_id();
    db::insert_run(&conn, &run_id, &model)?;
    info!(run_id = %run_id, model = %model, cohorts = cohorts.len(), "Starting run");

    let mut total = 0;
    for cohort in &cohorts {
        println!("{}: processing {} trial links...", cohort.gene, cohort.links.len());
        let mut report = CohortReport::new(cohort);
        let result = runner.run_cohort(cohort, &mut report).await;
        db::save_report(&conn, &run_id, &report)?;
        result?;

        for index in report.unanswered() {
            println!(
                "  Clinical Trials Data {} - Document {} could not get an answer",
                report.gene_short, index
            );
        }
        println!(
            "{}: wrote {} documents ({} fetch failures)",
            report.gene,
            report.written(),
            report.fetch_failures()
        );
        total += report.written();
    }

    println!(
        "\nSaved {} documents to {:?}.",
        total,
        settings.output_folder()
    );
    Ok(())
}

//! Batch entrypoint running the pipeline for documents named on the command line.
//!
//! Intended for re-enqueueing documents from cron jobs or an operator shell. Documents run
//! concurrently and each prints one JSON report line; the exit code is non-zero when any
//! document ends in `error` or is refused.
use anyhow::{Context, Result, bail};
use clap::Parser;
use docpipe::{
    config, logging,
    pipeline::{Pipeline, PipelineApi},
    store::DocumentStatus,
};
use futures_util::future::join_all;

#[derive(Parser)]
#[command(
    name = "process-document",
    about = "Run the ingestion pipeline for one or more documents"
)]
struct Cli {
    /// Document ids to process.
    #[arg(required = true)]
    document_ids: Vec<String>,
    /// Reprocess documents even when they are marked `processing`.
    #[arg(long)]
    force: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    config::init_config();
    logging::init_tracing();

    let pipeline = Pipeline::from_config(config::get_config())
        .context("failed to initialize pipeline collaborators")?;

    let runs = cli
        .document_ids
        .iter()
        .map(|document_id| pipeline.process_document(document_id, cli.force));
    let results = join_all(runs).await;

    let mut failures = 0_usize;
    for (document_id, result) in cli.document_ids.iter().zip(results) {
        match result {
            Ok(report) => {
                if report.status != DocumentStatus::Completed {
                    failures += 1;
                }
                let line = serde_json::to_string(&report)
                    .with_context(|| format!("failed to serialize report for {document_id}"))?;
                println!("{line}");
            }
            Err(error) => {
                failures += 1;
                eprintln!("{document_id}: {error}");
            }
        }
    }

    if failures > 0 {
        bail!("{failures} of {} documents did not complete", cli.document_ids.len());
    }
    Ok(())
}

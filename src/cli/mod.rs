//! The `ftdc` command-line tool (§4.K): ambient collaborator around the
//! library, built on `clap` the way the rest of this ecosystem builds CLIs.

pub mod csv_export;
pub mod json_export;
pub mod walker;

use std::fs::File;
use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};

use ftdc_tools::{diff_schema, Reader};

use csv_export::write_csv;
use json_export::{write_json, JsonExportOptions};
use walker::discover_ftdc_files;

#[derive(Parser)]
#[command(name = "ftdc", about = "Inspect and export MongoDB FTDC diagnostic files")]
pub struct Cli {
    /// Path to an FTDC file, or a directory containing `metrics.*` files.
    pub path: PathBuf,

    /// Only include samples at or after this RFC 3339 timestamp.
    #[arg(long, global = true)]
    pub start: Option<DateTime<Utc>>,

    /// Only include samples at or before this RFC 3339 timestamp.
    #[arg(long, global = true)]
    pub end: Option<DateTime<Utc>>,

    /// Continue past corrupt records instead of aborting the whole file.
    #[arg(long, global = true)]
    pub lenient: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Print metadata, time range, and metric counts.
    Info {
        /// Also diff each file's metric schema against the previous file.
        #[arg(long)]
        diff_previous: bool,
    },
    /// Export reconstructed samples as CSV.
    Csv { out: PathBuf },
    /// Export reconstructed samples as JSON.
    Json {
        out: PathBuf,
        #[arg(long)]
        pretty: bool,
        #[arg(long)]
        array: bool,
    },
}

pub fn run(cli: Cli) -> Result<()> {
    let files = discover_ftdc_files(&cli.path)
        .with_context(|| format!("discovering FTDC files under {}", cli.path.display()))?;
    if files.is_empty() {
        anyhow::bail!("no FTDC files found at {}", cli.path.display());
    }

    match &cli.command {
        Command::Info { diff_previous } => run_info(&files, &cli, *diff_previous),
        Command::Csv { out } => run_csv(&files, &cli, out),
        Command::Json { out, pretty, array } => run_json(&files, &cli, out, *pretty, *array),
    }
}

fn open_reader(path: &PathBuf, cli: &Cli) -> Result<Reader> {
    let mut reader = Reader::open(path).with_context(|| format!("opening {}", path.display()))?;
    reader.lenient(cli.lenient);
    Ok(reader)
}

fn run_info(files: &[PathBuf], cli: &Cli, diff_previous: bool) -> Result<()> {
    let mut previous_metrics = None;

    for path in files {
        let mut reader = open_reader(path, cli)?;
        let metadata = reader
            .metadata()
            .with_context(|| format!("reading metadata from {}", path.display()))?;
        let (start, end) = reader
            .time_range()
            .with_context(|| format!("reading time range from {}", path.display()))?;
        let chunks = reader
            .iter_chunks()
            .collect::<ftdc_tools::Result<Vec<_>>>()
            .with_context(|| format!("decoding chunks in {}", path.display()))?;
        let total_metrics: usize = chunks.iter().map(|c| c.num_metrics()).sum();
        let total_samples: usize = chunks.iter().map(|c| c.size()).sum();

        println!("{}", path.display());
        println!("  metadata documents: {}", metadata.len());
        println!("  chunks: {}", chunks.len());
        println!("  samples: {}", total_samples);
        println!("  metrics (summed across chunks): {}", total_metrics);
        if let (Some(start), Some(end)) = (start, end) {
            println!("  time range: {start} .. {end}");
        }

        if diff_previous {
            if let (Some(prev), Some(first_chunk)) = (&previous_metrics, chunks.first()) {
                let diff = diff_schema(prev, &first_chunk.metrics);
                if diff.is_empty() {
                    println!("  schema diff vs previous file: no changes");
                } else {
                    println!(
                        "  schema diff vs previous file: +{} -{} changed:{}",
                        diff.added.len(),
                        diff.removed.len(),
                        diff.type_changed.len()
                    );
                }
            }
            previous_metrics = chunks.last().map(|c| c.metrics.clone());
        }
    }

    Ok(())
}

fn run_csv(files: &[PathBuf], cli: &Cli, out: &PathBuf) -> Result<()> {
    let samples = collect_samples(files, cli)?;
    let file = File::create(out).with_context(|| format!("creating {}", out.display()))?;
    write_csv(&samples, file).context("writing CSV export")?;
    Ok(())
}

fn run_json(files: &[PathBuf], cli: &Cli, out: &PathBuf, pretty: bool, array: bool) -> Result<()> {
    let samples = collect_samples(files, cli)?;
    let file = File::create(out).with_context(|| format!("creating {}", out.display()))?;
    write_json(&samples, &JsonExportOptions { pretty, array }, file).context("writing JSON export")?;
    Ok(())
}

fn collect_samples(files: &[PathBuf], cli: &Cli) -> Result<Vec<bson::Document>> {
    let mut samples = Vec::new();
    for path in files {
        let mut reader = open_reader(path, cli)?;
        let batch = reader
            .iter_samples(cli.start, cli.end)
            .collect::<ftdc_tools::Result<Vec<_>>>()
            .with_context(|| format!("reconstructing samples from {}", path.display()))?;
        samples.extend(batch);
    }
    Ok(samples)
}

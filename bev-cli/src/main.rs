//! BEV beam-charge scanner CLI.
//!
//! Scans BEV banked-event files and reports the accumulated beam charge.

use anyhow::{Context, Result};
use bev_core::BeamChargeScan;
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::time::Instant;

/// Beam-charge scanner for BEV 1.0 banked-event files.
///
/// Scans each input file once, decoding the RUN::scaler bank where present,
/// and reports the maximum integrated charge per file. With several files the
/// overall maximum across all of them is reported as well.
#[derive(Parser, Debug)]
#[command(name = "bev")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Input BEV files to scan
    #[arg(value_name = "FILES", required = true)]
    files: Vec<PathBuf>,

    /// Suppress progress output
    #[arg(short, long)]
    quiet: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Setup progress bar
    let progress = if args.quiet {
        ProgressBar::hidden()
    } else {
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} [{elapsed_precise}] {msg}")
                .unwrap(),
        );
        pb.set_message("Scanning...");
        pb
    };

    let start_time = Instant::now();

    let mut max_charge = 0.0f64;
    let mut total_events = 0u64;
    let mut total_scaler_events = 0u64;

    for file in &args.files {
        progress.set_message(format!(
            "Scanning {:?}...",
            file.file_name().unwrap_or_default()
        ));

        let scan = BeamChargeScan::scan_file(file)
            .with_context(|| format!("Failed to scan {}", file.display()))?;

        println!("{}\t{:.6} nC", file.display(), scan.beam_charge());

        // Per-file maxima merge commutatively.
        max_charge = max_charge.max(scan.beam_charge());
        total_events += scan.events();
        total_scaler_events += scan.scaler_events();
    }

    let duration = start_time.elapsed();

    progress.finish_with_message(format!(
        "Done! Scanned {} files in {:.2}s",
        args.files.len(),
        duration.as_secs_f64()
    ));

    if args.files.len() > 1 {
        println!("overall\t{:.6} nC", max_charge);
    }

    if !args.quiet {
        let events_per_sec = total_events as f64 / duration.as_secs_f64();
        eprintln!();
        eprintln!("Summary:");
        eprintln!("  Files:          {}", args.files.len());
        eprintln!("  Events:         {}", total_events);
        eprintln!("  Scaler events:  {}", total_scaler_events);
        eprintln!("  Max charge:     {:.6} nC", max_charge);
        eprintln!("  Duration:       {:.3}s", duration.as_secs_f64());
        eprintln!("  Throughput:     {:.0} events/s", events_per_sec);
    }

    Ok(())
}

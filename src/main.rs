//! BamScope CLI entry point
//!
//! Indexed region queries, coverage and statistics over BAM/CRAM files.

use anyhow::Context;
use bamscope::formats::{BamCoverageTool, DEFAULT_TRACK_WINDOW};
use bamscope::{AlignmentFilters, AlignmentOptions, AlignmentValue, BamManager, OutputKind, Region};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Instant;

#[derive(Parser)]
#[command(name = "bamscope")]
#[command(about = "Indexed random-access queries, coverage and statistics for BAM/CRAM files")]
#[command(version)]
#[command(author = "BamScope Contributors")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the random-access index for a coordinate-sorted file
    Index {
        /// Input BAM/CRAM file
        input: PathBuf,
        /// Index output path (default: sibling <input>.bai / <input>.crai)
        output: Option<PathBuf>,
    },
    /// Query records overlapping a region
    Query {
        /// Input BAM/CRAM file (must be indexed)
        input: PathBuf,
        /// Region to query, e.g. chr1:100-200
        #[arg(short = 'r', long)]
        region: String,
        /// Output representation: native, structured or json
        #[arg(short = 'o', long = "output-kind", default_value = "structured")]
        output_kind: String,
        /// Maximum number of records to return (0 = ceiling-bounded)
        #[arg(short = 'l', long, default_value = "0")]
        limit: usize,
        /// Minimum mapping quality
        #[arg(long)]
        min_mapq: Option<u8>,
        /// Skip unmapped records
        #[arg(long)]
        mapped_only: bool,
        /// Skip PCR/optical duplicates
        #[arg(long)]
        no_duplicates: bool,
        /// Keep only properly paired records
        #[arg(long)]
        properly_paired: bool,
        /// Return only records fully contained in the region
        #[arg(long)]
        contained: bool,
        /// Quantize per-base qualities on structured output
        #[arg(long)]
        bin_qualities: bool,
    },
    /// Compute coverage over a region
    Coverage {
        /// Input BAM/CRAM file (must be indexed)
        input: PathBuf,
        /// Region to cover, e.g. chr1:100-200
        #[arg(short = 'r', long)]
        region: String,
        /// Averaging window size in bases
        #[arg(short = 'w', long, default_value = "1")]
        window: u32,
        /// Bases below this quality do not contribute (window size 1 only)
        #[arg(long, default_value = "0")]
        min_base_quality: u8,
        /// Explicit BigWig coverage track to read instead of probing siblings
        #[arg(long)]
        track: Option<PathBuf>,
    },
    /// Accumulate global alignment statistics
    Stats {
        /// Input BAM/CRAM file
        input: PathBuf,
        /// Restrict to a region (requires the index)
        #[arg(short = 'r', long)]
        region: Option<String>,
        /// Minimum mapping quality
        #[arg(long)]
        min_mapq: Option<u8>,
        /// Skip unmapped records
        #[arg(long)]
        mapped_only: bool,
    },
    /// Generate a downsampled BigWig coverage track via deepTools bamCoverage
    Track {
        /// Input BAM/CRAM file (must be indexed)
        input: PathBuf,
        /// Track output path (default: <input>.coverage.bw)
        output: Option<PathBuf>,
        /// Averaging window size in bases
        #[arg(short = 'w', long, default_value_t = DEFAULT_TRACK_WINDOW)]
        window: u32,
    },
}

fn build_filters(
    mapped_only: bool,
    min_mapq: Option<u8>,
    no_duplicates: bool,
    properly_paired: bool,
) -> AlignmentFilters {
    let mut filters = AlignmentFilters::none();
    if mapped_only {
        filters = filters.mapped_only();
    }
    if let Some(min) = min_mapq {
        filters = filters.min_mapping_quality(min);
    }
    if no_duplicates {
        filters = filters.no_duplicates();
    }
    if properly_paired {
        filters = filters.properly_paired();
    }
    filters
}

fn print_value(value: &AlignmentValue) -> anyhow::Result<()> {
    match value {
        AlignmentValue::Native(record) => {
            println!(
                "{}\t{}\t{}\t{}",
                String::from_utf8_lossy(record.qname()),
                record.pos() + 1,
                record.mapq(),
                record.insert_size()
            );
        }
        AlignmentValue::Structured(read) => {
            println!("{}", serde_json::to_string(read)?);
        }
        AlignmentValue::Json(json) => {
            println!("{}", json);
        }
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    let start = Instant::now();

    match cli.command {
        Commands::Index { input, output } => {
            let manager = BamManager::new(&input)?;
            let index_path = match output {
                Some(output) => manager.create_index_at(&output)?,
                None => manager.create_index()?,
            };
            eprintln!("Index written to {:?}", index_path);
            eprintln!("Time elapsed: {:.2}s", start.elapsed().as_secs_f64());
        }

        Commands::Query {
            input,
            region,
            output_kind,
            limit,
            min_mapq,
            mapped_only,
            no_duplicates,
            properly_paired,
            contained,
            bin_qualities,
        } => {
            let region: Region = region.parse()?;
            let kind: OutputKind = output_kind.parse()?;
            let filters = build_filters(mapped_only, min_mapq, no_duplicates, properly_paired);
            let options = AlignmentOptions::new()
                .with_limit(limit)
                .with_contained_only(contained)
                .with_bin_qualities(bin_qualities);

            let mut manager = BamManager::new(&input)?;
            let results = manager.query(&region, &filters, &options, kind)?;
            for value in &results {
                print_value(value)?;
            }
            manager.close();

            eprintln!("{} records from {}", results.len(), region);
            eprintln!("Time elapsed: {:.2}s", start.elapsed().as_secs_f64());
        }

        Commands::Coverage {
            input,
            region,
            window,
            min_base_quality,
            track,
        } => {
            let region: Region = region.parse()?;
            let mut manager = BamManager::new(&input)?;

            let coverage = if window == 1 && track.is_none() {
                let options = AlignmentOptions::new().with_min_base_quality(min_base_quality);
                manager.coverage(&region, &AlignmentFilters::none(), &options)?
            } else {
                manager.windowed_coverage(&region, window, track.as_deref())?
            };
            manager.close();

            let chromosome = coverage.region().chromosome();
            let region_start = coverage.region().start();
            let region_end = coverage.region().end();
            for (i, value) in coverage.values().iter().enumerate() {
                let window_start = region_start + i as u64 * window as u64;
                let window_end = (window_start + window as u64 - 1).min(region_end);
                println!("{}\t{}\t{}\t{}", chromosome, window_start, window_end, value);
            }
            eprintln!("Time elapsed: {:.2}s", start.elapsed().as_secs_f64());
        }

        Commands::Stats {
            input,
            region,
            min_mapq,
            mapped_only,
        } => {
            let filters = build_filters(mapped_only, min_mapq, false, false);
            let options = AlignmentOptions::new();
            let mut manager = BamManager::new(&input)?;

            let stats = match region {
                Some(region) => {
                    let region: Region = region.parse()?;
                    manager.region_stats(&region, &filters, &options)?
                }
                None => manager.stats(&filters, &options)?,
            };
            manager.close();

            println!("{}", serde_json::to_string_pretty(&stats)?);
            eprintln!("Time elapsed: {:.2}s", start.elapsed().as_secs_f64());
        }

        Commands::Track {
            input,
            output,
            window,
        } => {
            let manager = BamManager::new(&input)?;
            let track = manager
                .generate_coverage_track(&BamCoverageTool, output.as_deref(), window)
                .context("bamCoverage must be installed (pip install deepTools)")?;
            eprintln!("Coverage track written to {:?}", track);
            eprintln!("Time elapsed: {:.2}s", start.elapsed().as_secs_f64());
        }
    }

    Ok(())
}

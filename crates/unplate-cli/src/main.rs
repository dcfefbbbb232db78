//! unplate CLI
//!
//! Command-line tool for converting plate-reader instrument exports into
//! one tidy delimited-text (or JSON) table.

use clap::Parser;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use unplate_core::{convert, ConvertOptions};

#[derive(Parser)]
#[command(name = "unplate")]
#[command(about = "Convert plate-reader exports to tidy tables", long_about = None)]
#[command(version)]
struct Cli {
    /// Instrument export files (.csv, .txt or .xml)
    #[arg(required = true)]
    files: Vec<PathBuf>,

    /// Output file path
    #[arg(short, long)]
    output: PathBuf,

    /// Manifest listing metadata tables to join, one path per line
    #[arg(short, long)]
    metadata: Option<PathBuf>,

    /// Output format (csv, tsv or json)
    #[arg(long, default_value = "csv")]
    format: String,

    /// Allow a metadata join with no shared columns (full cross product)
    #[arg(long)]
    allow_cross_join: bool,

    /// Skip input files that fail to parse and report them at the end
    #[arg(long)]
    keep_going: bool,
}

fn main() {
    env_logger::init();
    if let Err(e) = run() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run() -> unplate_core::Result<()> {
    let cli = Cli::parse();

    let options = ConvertOptions {
        allow_cross_join: cli.allow_cross_join,
        keep_going: cli.keep_going,
    };

    for file in &cli.files {
        println!("Processing {}", file.display());
    }

    let (table, report) = convert(&cli.files, cli.metadata.as_deref(), &options)?;

    if !report.failures.is_empty() {
        println!("\nSkipped files ({}):", report.failures.len());
        for (path, reason) in &report.failures {
            println!("  {}: {}", path.display(), reason);
        }
    }

    if report.files_converted == 0 || table.headers().is_empty() {
        eprintln!("Error: no plate data found in the input files");
        std::process::exit(1);
    }

    println!(
        "\nConverted {} file(s): {} plates, {} tidy rows",
        report.files_converted, report.plates, report.rows
    );

    match cli.format.to_lowercase().as_str() {
        "csv" => table.write_delimited(&cli.output, b',')?,
        "tsv" => table.write_delimited(&cli.output, b'\t')?,
        "json" => {
            let file = File::create(&cli.output)?;
            let mut writer = BufWriter::new(file);
            writeln!(writer, "{}", table.to_json()?)?;
        }
        _ => {
            eprintln!("Unknown format: {}. Supported formats: csv, tsv, json", cli.format);
            std::process::exit(1);
        }
    }

    println!("Wrote tidy data to {}", cli.output.display());

    Ok(())
}

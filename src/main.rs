use anyhow::Context;
use anyhow::Result;
use clap::Parser;
use sheet_splitter::archive_file_name;
use sheet_splitter::split_workbook;
use sheet_splitter::ReadOptions;
use sheet_splitter::SplitOptions;
use sheet_splitter::SplitResult;
use sheet_splitter::Workbook;
use sheet_splitter::DEFAULT_LIMIT;
use sheet_splitter::DEFAULT_QUANTITY_COLUMN;
use std::path::PathBuf;
use tracing::info;

/// Split an order sheet into groups whose quantity totals stay under a limit, and
/// write the groups as `Sheet<k>.xls` files into one ZIP archive.
#[derive(Parser)]
#[command(version)]
struct Args {
    /// Workbook to split (.xlsx or .xls)
    input: PathBuf,

    /// Maximum quantity sum per output sheet
    #[arg(long, env = "SPLIT_LIMIT", default_value_t = DEFAULT_LIMIT)]
    limit: f64,

    /// Header of the quantity column
    #[arg(long, env = "SPLIT_QUANTITY_COLUMN", default_value = DEFAULT_QUANTITY_COLUMN)]
    quantity_column: String,

    /// Glob pattern selecting the worksheet; the first sheet is used when absent
    #[arg(long, value_name = "PATTERN")]
    sheet: Option<String>,

    /// Fail on error cells such as `#N/A` instead of reading them as blanks
    #[arg(long)]
    strict: bool,

    /// Archive path; defaults to the download name next to the input
    #[arg(short, long, value_name = "PATH")]
    output: Option<PathBuf>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();

    let args = Args::parse();
    let options = SplitOptions::new(args.limit, args.quantity_column);
    let mut read_options = ReadOptions {
        error_as_null: !args.strict,
        ..ReadOptions::default()
    };
    if let Some(pattern) = &args.sheet {
        read_options = read_options.with_sheet_pattern(pattern)?;
    }

    let mut workbook = Workbook::open(&args.input)?;
    let result = split_workbook(&mut workbook, &read_options, &options)
        .with_context(|| format!("Split '{}' failed", args.input.display()))?;

    let output = args
        .output
        .unwrap_or_else(|| args.input.with_file_name(archive_file_name(&workbook.name())));
    std::fs::write(&output, &result.archive)
        .with_context(|| format!("Write '{}' failed", output.display()))?;
    info!(path = %output.display(), "wrote archive");

    print_summary(&result);
    Ok(())
}

fn print_summary(result: &SplitResult) {
    let merged = result.merged_stats();
    println!(
        "input: {} rows, quantity {}, {} rows of quantity 1",
        result.input.rows, result.input.quantity_sum, result.input.ones
    );
    println!(
        "merged: {} rows, quantity {}, {} rows of quantity 1",
        merged.rows, merged.quantity_sum, merged.ones
    );
    println!("{} sheets, limit {}", result.summaries.len(), result.limit);
    for summary in &result.summaries {
        let mark = if summary.over_limit { "  over limit" } else { "" };
        println!(
            "{:<12} {:>6} rows {:>10}{}",
            summary.name, summary.rows, summary.quantity_sum, mark
        );
    }
}

//! 1C statement analyzer CLI
//!
//! Reads every `*.txt` statement in the data directory, detects which
//! accounts belong to our organizations, classifies the documents and
//! writes two self-contained HTML reports.
//!
//! # Usage
//!
//! ```bash
//! vypiska --data-dir data --out-dir reports
//! vypiska --debug --filter-name ромашка
//! ```
//!
//! # Environment Variables
//!
//! - `RUST_LOG`: overrides the default log filter (`info`, or `debug` when
//!   `--debug` is given)

use clap::Parser;
use log::{info, warn};
use std::fs;
use std::path::PathBuf;
use std::process;
use vypiska::aggregate::{group_by_counterparty, IdentityResolver};
use vypiska::classify::{process_documents, DebugCollector};
use vypiska::debug_export;
use vypiska::error::{AnalyzerError, Result};
use vypiska::organizations::detect_organizations;
use vypiska::report;
use vypiska::statement::{self, Document, ParsedFile};

#[derive(Parser, Debug)]
#[command(name = "vypiska", version, about = "Анализатор выписок 1С и генератор отчетов")]
struct Cli {
    /// Папка с файлами выписок (*.txt)
    #[arg(long = "data-dir", default_value = "data")]
    data_dir: PathBuf,

    /// Папка для готовых отчетов
    #[arg(long = "out-dir", default_value = "reports")]
    out_dir: PathBuf,

    /// Режим отладки: подробный лог плюс CSV-дампы имен и транзакций
    #[arg(long)]
    debug: bool,

    /// Часть имени контрагента (регистронезависимо) для фильтрации
    /// отладочного дампа транзакций
    #[arg(long = "filter-name")]
    filter_name: Option<String>,
}

fn main() {
    let cli = Cli::parse();

    let default_level = if cli.debug { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();

    if let Err(e) = run(&cli) {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

fn run(cli: &Cli) -> Result<()> {
    info!("starting 1C statement analysis");
    if cli.debug {
        warn!("*** debug mode active ***");
        if let Some(filter) = &cli.filter_name {
            warn!("*** debug name filter: '{}' ***", filter);
        }
    }

    let parsed_files = parse_data_dir(cli)?;

    let organizations = detect_organizations(&parsed_files);
    if organizations.is_empty() {
        return Err(AnalyzerError::NoOrganizations);
    }

    let documents: Vec<Document> = parsed_files
        .into_iter()
        .flat_map(|file| file.documents)
        .collect();
    if documents.is_empty() {
        return Err(AnalyzerError::NoDocuments);
    }

    fs::create_dir_all(&cli.out_dir)?;

    let mut collector = cli.debug.then(DebugCollector::default);
    let classification = process_documents(&documents, &organizations, collector.as_mut());

    if let Some(collector) = &collector {
        let names_path = cli.out_dir.join(debug_export::NAMES_CSV_FILENAME);
        debug_export::write_names_csv(collector, fs::File::create(&names_path)?)?;
        info!(" -> {}", names_path.display());

        let dump_path = cli.out_dir.join(debug_export::TRANSACTIONS_CSV_FILENAME);
        debug_export::write_transactions_csv(
            collector,
            cli.filter_name.as_deref(),
            fs::File::create(&dump_path)?,
        )?;
        info!(" -> {}", dump_path.display());
    }

    if classification.transactions.is_empty() {
        warn!("no meaningful transactions, generating empty reports");
    }

    let groups = group_by_counterparty(&classification.transactions);
    let mut resolver = IdentityResolver::new();

    let annual = report::render_annual_report(&groups, &mut resolver, &organizations)?;
    let annual_path = cli.out_dir.join(report::ANNUAL_REPORT_FILENAME);
    fs::write(&annual_path, annual)?;
    info!(" -> {}", annual_path.display());

    let comparison = report::render_comparison_report(&groups, &mut resolver, &organizations);
    let comparison_path = cli.out_dir.join(report::COMPARISON_REPORT_FILENAME);
    fs::write(&comparison_path, comparison)?;
    info!(" -> {}", comparison_path.display());

    info!("analysis finished");
    Ok(())
}

/// Parses every `*.txt` file in the data directory, in name order.
///
/// Individual parse failures are logged and counted; the run only fails
/// when the directory is missing or nothing parsed at all.
fn parse_data_dir(cli: &Cli) -> Result<Vec<ParsedFile>> {
    if !cli.data_dir.is_dir() {
        return Err(AnalyzerError::DataDirMissing {
            path: cli.data_dir.clone(),
        });
    }

    let mut paths: Vec<PathBuf> = fs::read_dir(&cli.data_dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.extension()
                .map(|ext| ext.to_string_lossy().eq_ignore_ascii_case("txt"))
                .unwrap_or(false)
        })
        .collect();
    paths.sort();
    info!(
        "found {} .txt files in {}",
        paths.len(),
        cli.data_dir.display()
    );

    let mut parsed_files = Vec::new();
    let mut error_count = 0usize;
    for path in &paths {
        match statement::parse_file(path) {
            Ok(file) => parsed_files.push(file),
            Err(e) => {
                warn!("{}: {}", path.display(), e);
                error_count += 1;
            }
        }
    }
    info!(
        "parsing done: {} ok, {} failed",
        parsed_files.len(),
        error_count
    );

    if parsed_files.is_empty() {
        return Err(AnalyzerError::NoInputFiles {
            path: cli.data_dir.clone(),
        });
    }
    Ok(parsed_files)
}

//! PDF suite command line
//!
//! Merge curated pages, extract question pages, validate question numbering
//! and pull regex matches out of PDFs, one file or a batch at a time.
//! `run` executes a JSON command and prints the JSON result.

use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use pdfsuite_core::batch::BatchOperationResult;
use pdfsuite_core::naming::{safe_artifact_name, UniqueNames};
use pdfsuite_core::report::{self, DEFAULT_ZIP_NAME};
use pdfsuite_core::{
    execute, extract_matching_pages, extract_questions, merge_pages, BatchRunner, LopdfRenderer,
    PageStore, RegexOptions, Session, SuiteCommand, SuiteConfig,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "pdfsuite")]
#[command(version, about = "Merge, extract and validate exam PDFs")]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Print structured JSON instead of a text summary
    #[arg(long, global = true)]
    json: bool,

    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Per-file size limit in MB (overrides PDF_SUITE_MAX_PDF_MB)
    #[arg(long, global = true)]
    max_pdf_mb: Option<u64>,

    /// Combined size limit in MB (overrides PDF_SUITE_MAX_BATCH_MB)
    #[arg(long, global = true)]
    max_batch_mb: Option<u64>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Merge the pages of several PDFs, optionally dropping page ranges
    Merge {
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Pages to leave out, as FILE:RANGES (e.g. exam.pdf:2,5-7)
        #[arg(long = "drop", value_parser = parse_drop)]
        drops: Vec<DropSpec>,

        #[arg(short, long, default_value = "merged_output.pdf")]
        output: PathBuf,
    },

    /// Keep the cover and every page with a "Question N" marker
    Extract {
        file: PathBuf,

        /// Defaults to a name derived from the input, in the current directory
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Check that question numbering is complete in each file
    Validate {
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Write a CSV report
        #[arg(long)]
        csv: Option<PathBuf>,

        /// Write a plain text summary
        #[arg(long)]
        summary: Option<PathBuf>,
    },

    /// Keep the pages whose text matches a regex
    Regex {
        #[arg(required = true)]
        files: Vec<PathBuf>,

        #[arg(short, long)]
        pattern: String,

        #[arg(long)]
        case_sensitive: bool,

        /// Do not keep the first page when it does not match
        #[arg(long)]
        no_first_page: bool,

        /// Write all outputs into one ZIP archive
        #[arg(long, conflicts_with = "out_dir")]
        zip: Option<PathBuf>,

        /// Directory for the output PDFs
        #[arg(short = 'o', long, default_value = ".")]
        out_dir: PathBuf,
    },

    /// Run question extraction over many files into a ZIP archive
    BatchExtract {
        #[arg(required = true)]
        files: Vec<PathBuf>,

        #[arg(long, default_value = DEFAULT_ZIP_NAME)]
        zip: PathBuf,
    },

    /// Execute a JSON command ("-" reads it from stdin) and print the JSON result
    Run {
        command: PathBuf,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct DropSpec {
    file: String,
    ranges: String,
}

fn parse_drop(value: &str) -> std::result::Result<DropSpec, String> {
    match value.rsplit_once(':') {
        Some((file, ranges)) if !file.trim().is_empty() && !ranges.trim().is_empty() => {
            Ok(DropSpec {
                file: file.trim().to_string(),
                ranges: ranges.trim().to_string(),
            })
        }
        _ => Err(format!("expected FILE:RANGES, got '{}'", value)),
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    let level = if args.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive(level.into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = SuiteConfig::from_env().with_overrides(args.max_pdf_mb, args.max_batch_mb);
    tracing::debug!(?config, "loaded limits");

    let renderer = LopdfRenderer::new();
    match args.command {
        Command::Merge {
            files,
            drops,
            output,
        } => {
            let uploads = read_inputs(&files)?;
            let loaded = PageStore::new(&renderer, config).load(uploads)?;
            let mut session = Session::new().add_documents(loaded);

            for spec in &drops {
                let id = session
                    .documents()
                    .iter()
                    .find(|doc| doc.name == spec.file)
                    .map(|doc| doc.id.clone())
                    .with_context(|| format!("--drop names {} which is not an input", spec.file))?;
                session = session
                    .remove_page_ranges(&id, &spec.ranges)
                    .with_context(|| format!("Invalid --drop for {}", spec.file))?;
            }

            let result = merge_pages(&renderer, session.documents(), session.page_refs())?;
            write_file(&output, &result.output_pdf)?;

            if args.json {
                print_json(&result)?;
            } else {
                println!(
                    "Merged {} page(s) into {}",
                    result.merged_pages,
                    output.display()
                );
            }
        }

        Command::Extract { file, output } => {
            let uploads = read_inputs(std::slice::from_ref(&file))?;
            config.check_uploads(&uploads)?;
            let (name, bytes) = &uploads[0];

            let result = extract_questions(&renderer, name, bytes)?;
            let output = output.unwrap_or_else(|| PathBuf::from(&result.output_name));
            write_file(&output, &result.output_pdf)?;

            if args.json {
                print_json(&result)?;
            } else {
                println!(
                    "Extracted {} of {} page(s) into {}",
                    result.extracted_page_count,
                    result.original_page_count,
                    output.display()
                );
                println!("Questions found: {:?}", result.found_questions);
                if result.validation.is_valid {
                    println!("Sequence complete");
                } else {
                    println!("Missing questions: {:?}", result.validation.missing_questions);
                }
            }
        }

        Command::Validate {
            files,
            csv,
            summary,
        } => {
            let uploads = read_inputs(&files)?;
            config.check_uploads(&uploads)?;

            let result = BatchRunner::new(&renderer)
                .with_progress(print_progress)
                .run_validation_batch(&uploads);

            if let Some(path) = csv {
                write_file(&path, &report::build_validation_csv(&result)?)?;
            }
            let text = report::build_validation_text_summary(&result);
            if let Some(path) = summary {
                write_file(&path, text.as_bytes())?;
            }

            if args.json {
                print_json(&result)?;
            } else {
                print!("{}", text);
            }
        }

        Command::Regex {
            files,
            pattern,
            case_sensitive,
            no_first_page,
            zip,
            out_dir,
        } => {
            let uploads = read_inputs(&files)?;
            config.check_uploads(&uploads)?;
            let options = RegexOptions {
                pattern,
                case_sensitive,
                keep_first_page: !no_first_page,
            };

            if uploads.len() == 1 && zip.is_none() {
                let (name, bytes) = &uploads[0];
                let result = extract_matching_pages(&renderer, name, bytes, &options)?;
                let output = out_dir.join(&result.output_name);
                write_file(&output, &result.output_pdf)?;

                if args.json {
                    print_json(&result)?;
                } else {
                    println!(
                        "Matched {} page(s); extracted {} page(s) into {}",
                        result.matched_pages.len(),
                        result.extracted_page_count,
                        output.display()
                    );
                    for hit in &result.matches {
                        println!(
                            "  page {} ({} match(es)): {}",
                            hit.page_number, hit.match_count, hit.snippet
                        );
                    }
                }
                return Ok(());
            }

            let result = BatchRunner::new(&renderer)
                .with_progress(print_progress)
                .run_regex_batch(&uploads, &options);

            match zip {
                Some(path) => write_file(&path, &report::build_zip(&result)?)?,
                None => write_artifacts(&out_dir, &result)?,
            }
            print_batch(&result, args.json)?;
        }

        Command::BatchExtract { files, zip } => {
            let uploads = read_inputs(&files)?;
            config.check_uploads(&uploads)?;

            let result = BatchRunner::new(&renderer)
                .with_progress(print_progress)
                .run_extraction_batch(&uploads);
            write_file(&zip, &report::build_zip(&result)?)?;
            print_batch(&result, args.json)?;
        }

        Command::Run { command } => {
            let result = execute(&renderer, &config, read_command(&command)?);
            print_json(&result)?;
            if !result.success {
                bail!("{}", result.error.as_deref().unwrap_or("Command failed"));
            }
        }
    }

    Ok(())
}

/// Read each path as `(file name, bytes)`
fn read_inputs(paths: &[PathBuf]) -> Result<Vec<(String, Vec<u8>)>> {
    paths
        .iter()
        .map(|path| {
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .with_context(|| format!("{} is not a file path", path.display()))?;
            let bytes =
                fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
            Ok((name, bytes))
        })
        .collect()
}

/// Parse a JSON command from a file, or from stdin when the path is "-"
fn read_command(path: &Path) -> Result<SuiteCommand> {
    let raw = if path.as_os_str() == "-" {
        let mut raw = Vec::new();
        std::io::stdin()
            .read_to_end(&mut raw)
            .context("Failed to read command from stdin")?;
        raw
    } else {
        fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?
    };
    serde_json::from_slice(&raw).context("Invalid command JSON")
}

fn write_file(path: &Path, bytes: &[u8]) -> Result<()> {
    fs::write(path, bytes).with_context(|| format!("Failed to write {}", path.display()))?;
    tracing::info!(path = %path.display(), bytes = bytes.len(), "wrote output");
    Ok(())
}

/// Write each batch artifact into `dir` under a sanitized, unique name
fn write_artifacts(dir: &Path, result: &BatchOperationResult) -> Result<()> {
    if !dir.is_dir() {
        bail!("Output directory {} does not exist", dir.display());
    }

    let mut names = UniqueNames::new();
    for item in &result.items {
        if let (Some(name), Some(bytes)) = (&item.artifact_name, &item.artifact_bytes) {
            let file_name = names.claim(&safe_artifact_name(name));
            write_file(&dir.join(file_name), bytes)?;
        }
    }
    Ok(())
}

fn print_progress(current: usize, total: usize, name: &str) {
    eprintln!("[{}/{}] {}", current, total, name);
}

fn print_batch(result: &BatchOperationResult, json: bool) -> Result<()> {
    if json {
        return print_json(result);
    }

    println!(
        "success={} warning={} error={}",
        result.success_count(),
        result.warning_count(),
        result.error_count()
    );
    for item in &result.items {
        println!("[{}] {}", item.status.as_str().to_uppercase(), item.source_name);
        for message in &item.messages {
            println!("  - {}", message.text);
        }
    }
    Ok(())
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("Failed to serialize result")?;
    println!("{}", json);
    Ok(())
}

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use dialoguer::Confirm;
use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use walkdir::WalkDir;

use veridoc::audit::{self, AuditRecord};
use veridoc::corpus::{self, REFERENCE_EXTENSIONS};
use veridoc::engine::{CancelToken, DecisionEngine, UploadEvidence, Verdict};
use veridoc::{EngineConfig, EngineError};

#[derive(Parser, Debug)]
#[command(name = "veridoc", version, about = "Screen document images for forgery")]
struct Cli {
    /// Engine configuration file (JSON)
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Verify one uploaded image against the reference corpus
    Verify {
        /// Image file to verify
        #[arg(short, long, value_name = "FILE")]
        file: PathBuf,

        /// Directory of trusted reference images
        #[arg(short, long, value_name = "DIR")]
        corpus: PathBuf,

        /// Print the full verdict as JSON
        #[arg(long)]
        json: bool,

        /// Give up after this many milliseconds (resolves to forged)
        #[arg(long, value_name = "MS")]
        timeout_ms: Option<u64>,

        /// Override the configured similarity threshold
        #[arg(long, value_name = "PCT")]
        threshold: Option<f64>,
    },

    /// Verify every image under a directory
    Batch {
        /// Directory containing the uploads
        #[arg(short, long, value_name = "DIR")]
        dir: PathBuf,

        /// Directory of trusted reference images
        #[arg(short, long, value_name = "DIR")]
        corpus: PathBuf,

        /// Print one JSON verdict per line instead of the summary
        #[arg(long)]
        json: bool,
    },

    /// Catalogue an image as a trusted reference
    AddReference {
        /// Image file to catalogue
        #[arg(short, long, value_name = "FILE")]
        file: PathBuf,

        /// Directory of trusted reference images
        #[arg(short, long, value_name = "DIR")]
        corpus: PathBuf,

        /// Replace an existing reference without asking
        #[arg(short, long)]
        yes: bool,
    },

    /// List the catalogued references
    ListReferences {
        /// Directory of trusted reference images
        #[arg(short, long, value_name = "DIR")]
        corpus: PathBuf,

        /// Also decode each reference and report unreadable ones
        #[arg(long)]
        check: bool,
    },

    /// Show the verification audit trail for a corpus
    History {
        /// Directory of trusted reference images
        #[arg(short, long, value_name = "DIR")]
        corpus: PathBuf,
    },
}

#[derive(Serialize)]
struct BatchLine<'a> {
    file: &'a str,
    verdict: &'a Verdict,
}

fn main() {
    let cli = Cli::parse();

    // Initialize logging
    if cli.debug {
        tracing_subscriber::fmt()
            .with_env_filter("veridoc=debug")
            .init();
    }

    match run(cli) {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("⚠️  Error: {err:#}");
            std::process::exit(2);
        }
    }
}

fn run(cli: Cli) -> Result<i32> {
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Verify {
            file,
            corpus,
            json,
            timeout_ms,
            threshold,
        } => {
            let mut config = config;
            if let Some(threshold) = threshold {
                config.similarity_threshold = threshold;
            }
            let engine = DecisionEngine::new(config).context("Invalid engine configuration")?;

            let upload = UploadEvidence::from_file(&file)
                .with_context(|| format!("Failed to read {:?}", file))?;
            let cancel = match timeout_ms {
                Some(ms) => CancelToken::with_deadline(Duration::from_millis(ms)),
                None => CancelToken::new(),
            };

            let verdict = engine.verify_with_cancel(&upload, &corpus, &cancel);
            audit::append(&corpus, &AuditRecord::capture(&upload, &verdict))?;

            if json {
                println!("{}", serde_json::to_string_pretty(&verdict)?);
            } else {
                print_verdict(&upload.original_filename, &verdict);
            }
            Ok(if verdict.is_forged { 1 } else { 0 })
        }

        Commands::Batch { dir, corpus, json } => {
            let uploads = scan_uploads(&dir)?;
            if uploads.is_empty() {
                println!("No images found in {}.", dir.display());
                return Ok(0);
            }

            let engine = DecisionEngine::new(config).context("Invalid engine configuration")?;
            println!("▶ Verifying {} upload(s)…", uploads.len());

            let pb = ProgressBar::new(uploads.len() as u64);
            pb.set_style(ProgressStyle::with_template(
                "{bar:40.green} {pos}/{len} {msg}",
            )?);

            let start = Instant::now();
            let outcomes: Vec<(UploadEvidence, Verdict)> = uploads
                .par_iter()
                .map(|path| -> Result<(UploadEvidence, Verdict)> {
                    let upload = UploadEvidence::from_file(path)
                        .with_context(|| format!("Failed to read {:?}", path))?;
                    let verdict = engine.verify(&upload, &corpus);
                    pb.inc(1);
                    Ok((upload, verdict))
                })
                .collect::<Result<_>>()?;
            pb.finish_and_clear();
            println!("⏱ verifying took {:.2?}", start.elapsed());

            let mut forged = 0usize;
            for (upload, verdict) in &outcomes {
                audit::append(&corpus, &AuditRecord::capture(upload, verdict))?;
                if verdict.is_forged {
                    forged += 1;
                }
                if json {
                    let line = BatchLine {
                        file: &upload.original_filename,
                        verdict,
                    };
                    println!("{}", serde_json::to_string(&line)?);
                } else {
                    print_verdict(&upload.original_filename, verdict);
                }
            }

            if !json {
                println!(
                    "\n✅ {} genuine, ⚠️  {} forged",
                    outcomes.len() - forged,
                    forged
                );
            }
            Ok(if forged > 0 { 1 } else { 0 })
        }

        Commands::AddReference { file, corpus, yes } => {
            println!("▶ Cataloguing {} in: {}", file.display(), corpus.display());
            let bytes = fs::read(&file).with_context(|| format!("Failed to read {:?}", file))?;
            image::load_from_memory(&bytes)
                .with_context(|| format!("{:?} is not a decodable image", file))?;

            let name = file
                .file_name()
                .map(|name| name.to_string_lossy().to_string())
                .context("File has no name")?;
            let stem = corpus::stem_lowercase(&name);

            let existing = match corpus::list_references(&corpus) {
                Ok(references) => references,
                Err(EngineError::CorpusUnavailable { .. }) => Vec::new(),
                Err(err) => return Err(err.into()),
            };
            if let Some(collision) = existing
                .iter()
                .find(|reference| reference.stem_lowercase() == stem)
            {
                println!(
                    "⚠️  A reference named {:?} is already catalogued.",
                    collision.name
                );
                if !yes {
                    let proceed = Confirm::new()
                        .with_prompt("Replace it?")
                        .default(false)
                        .interact()?;
                    if !proceed {
                        println!("Leaving corpus unchanged.");
                        return Ok(0);
                    }
                }
            }

            let reference = corpus::add_reference(&corpus, &name, &bytes)?;
            println!(
                "✅ Catalogued {} ({} bytes)",
                reference.name, reference.size_bytes
            );
            if !corpus::has_reference_extension(Path::new(&reference.name)) {
                println!(
                    "⚠️  {} has an unrecognized extension; listings will not include it.",
                    reference.name
                );
            }
            Ok(0)
        }

        Commands::ListReferences { corpus, check } => {
            let references = match corpus::list_references(&corpus) {
                Ok(references) => references,
                Err(EngineError::CorpusUnavailable { .. }) => {
                    println!("⚠️  No corpus at {} yet.", corpus.display());
                    return Ok(0);
                }
                Err(err) => return Err(err.into()),
            };

            println!(
                "🗂️  {} reference(s) in {}:",
                references.len(),
                corpus.display()
            );
            for reference in &references {
                println!("   ▶ {} ({} bytes)", reference.name, reference.size_bytes);
            }

            if check {
                let spinner = ProgressBar::new_spinner();
                spinner.set_style(ProgressStyle::with_template("{spinner:.green} {msg}")?);
                spinner.set_message("Decoding references…");
                spinner.enable_steady_tick(Duration::from_millis(100));

                let mut unreadable = 0usize;
                for reference in &references {
                    let readable = fs::read(&reference.path)
                        .ok()
                        .and_then(|bytes| image::load_from_memory(&bytes).ok())
                        .is_some();
                    if !readable {
                        spinner
                            .suspend(|| println!("⚠️  Unreadable reference: {}", reference.name));
                        unreadable += 1;
                    }
                }
                spinner.finish_and_clear();

                if unreadable > 0 {
                    println!("⚠️  {unreadable} reference(s) could not be decoded.");
                    return Ok(2);
                }
                println!("✅ All references decoded cleanly.");
            }
            Ok(0)
        }

        Commands::History { corpus } => {
            let records = audit::read_all(&corpus)?;
            println!("🗂️  Verification history:");
            for (index, record) in records.iter().enumerate() {
                let verdict = if record.is_forged { "forged" } else { "genuine" };
                println!(
                    "[{}] {} {:?}\n     verdict: {} ({:.1}%)\n     reason: {}\n",
                    index, record.timestamp, record.file, verdict, record.similarity, record.reason
                );
            }
            Ok(0)
        }
    }
}

/// Explicit path, then the per-user config file, then built-in defaults.
fn load_config(explicit: Option<&Path>) -> Result<EngineConfig> {
    if let Some(path) = explicit {
        return EngineConfig::from_file(path)
            .with_context(|| format!("Failed to load config {:?}", path));
    }
    if let Some(path) = EngineConfig::default_path() {
        if path.is_file() {
            return EngineConfig::from_file(&path)
                .with_context(|| format!("Failed to load config {:?}", path));
        }
    }
    Ok(EngineConfig::default())
}

fn print_verdict(file: &str, verdict: &Verdict) {
    if verdict.is_forged {
        println!(
            "⚠️  FORGED  {}: {} ({:.1}%)",
            file, verdict.reason, verdict.similarity
        );
    } else {
        println!(
            "✅ GENUINE {}: {} ({:.1}%)",
            file, verdict.reason, verdict.similarity
        );
    }
    if let Some(best) = &verdict.best_match {
        println!("   🏆 closest reference: {best}");
    }
}

/// Recursively walk `dir`, returning image file paths in a stable order.
fn scan_uploads(dir: &Path) -> Result<Vec<PathBuf>> {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(ProgressStyle::with_template("{spinner:.green} {msg}")?);
    spinner.set_message("Scanning for images…");
    spinner.enable_steady_tick(Duration::from_millis(100));

    let mut images = Vec::new();
    for entry in WalkDir::new(dir)
        .sort_by_file_name()
        .into_iter()
        .filter_map(Result::ok)
    {
        let path = entry.path();
        if path.is_file() {
            if let Some(ext) = path.extension().and_then(|s| s.to_str()) {
                if REFERENCE_EXTENSIONS.contains(&ext.to_lowercase().as_str()) {
                    images.push(path.to_path_buf());
                }
            }
        }
        spinner.tick();
    }
    spinner.finish_and_clear();
    Ok(images)
}

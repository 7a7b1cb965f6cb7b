//! hermod - generate promotional posts through the retry controller
//!
//! Reads policy from `generation_policy.yaml` and keys from `secrets.yaml`
//! in the config directory, and appends every call to a JSONL event ledger.

use std::fs;
use std::io::{self, IsTerminal, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use hermod::config::{self, GenerationPolicy, Secrets};
use hermod::ledger::MetricsSummary;
use hermod::posts::{self, AffiliateProduct};
use hermod::{
    BatchGenerator, GeminiClient, GenerationOutcome, JsonlEventSink, RetryController, RetryPolicy,
};

/// Default ledger location.
const DEFAULT_LEDGER: &str = "logs/ai_metrics.jsonl";

/// Hermod CLI
#[derive(Parser)]
#[command(name = "hermod")]
#[command(version)]
#[command(about = "Resilient text generation for promotional posts")]
struct Args {
    /// Config directory (default: ./config)
    #[arg(short, long, env = "HERMOD_CONFIG_DIR")]
    config_dir: Option<PathBuf>,

    /// Event ledger path
    #[arg(long, default_value = DEFAULT_LEDGER)]
    ledger: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, ValueEnum)]
enum Section {
    /// Theme-driven posts
    Normal,
    /// Product posts
    Affiliate,
}

#[derive(Subcommand)]
enum Command {
    /// Generate text for a single prompt
    Generate {
        /// Prompt (or omit to read from stdin)
        prompt: Option<String>,
        /// Policy section to use
        #[arg(short, long, value_enum, default_value = "normal")]
        section: Section,
        /// Model to use
        #[arg(short, long)]
        model: Option<String>,
    },

    /// Generate text for every prompt in a file (one per line)
    Batch {
        /// Input file: one prompt per line (normal), or one tab-separated
        /// product per line (affiliate: name, short url, price, rating,
        /// review count, point rate)
        input: PathBuf,
        /// Output file, one result per line
        #[arg(short, long)]
        output: PathBuf,
        /// Policy section to use
        #[arg(short, long, value_enum, default_value = "normal")]
        section: Section,
        /// Model to use
        #[arg(short, long)]
        model: Option<String>,
        /// Remove the ledger before starting
        #[arg(long)]
        reset_ledger: bool,
    },

    /// Summarise the event ledger
    Summary,

    /// Interleave two post files line by line
    Merge {
        /// First file (lines go first)
        first: PathBuf,
        /// Second file
        second: PathBuf,
        /// Output file
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Write a secrets.yaml template into the config directory
    InitSecrets,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialise tracing (default: warn for CLI; override with RUST_LOG).
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let args = Args::parse();

    match args.command {
        Command::Generate {
            prompt,
            section,
            model,
        } => {
            let prompt = resolve_text(prompt, "generate")?;
            let controller =
                build_controller(args.config_dir.as_deref(), &args.ledger, section, model)?.0;
            match controller.generate(&prompt).await {
                GenerationOutcome::Success { text, attempts } => {
                    println!("{text}");
                    eprintln!("attempts: {attempts}");
                }
                GenerationOutcome::Failure { reason, attempts } => {
                    return Err(format!("generation failed after {attempts} attempts: {reason}").into());
                }
            }
        }

        Command::Batch {
            input,
            output,
            section,
            model,
            reset_ledger,
        } => {
            if reset_ledger {
                JsonlEventSink::new(&args.ledger).reset()?;
            }
            let (controller, settings) =
                build_controller(args.config_dir.as_deref(), &args.ledger, section, model)?;

            let content = fs::read_to_string(&input)?;
            let batch = BatchGenerator::new(controller)
                .workers(settings.workers)
                .retry_passes(settings.retry_passes);

            let lines: Vec<String> = match section {
                Section::Normal => {
                    let prompts: Vec<String> = content
                        .lines()
                        .map(str::trim)
                        .filter(|line| !line.is_empty())
                        .flat_map(|line| std::iter::repeat_n(line.to_string(), settings.copies))
                        .collect();
                    batch
                        .run(&prompts)
                        .await
                        .into_iter()
                        .map(|entry| match entry.result {
                            Ok(text) => posts::escape_line_breaks(&text),
                            Err(reason) => posts::failed_post_line(&reason),
                        })
                        .collect()
                }
                Section::Affiliate => {
                    let products = content
                        .lines()
                        .filter(|line| !line.trim().is_empty())
                        .map(AffiliateProduct::from_tsv_line)
                        .collect::<hermod::Result<Vec<_>>>()?;
                    posts::generate_affiliate_posts(&batch, &products, settings.max_name_chars)
                        .await
                }
            };
            let failed = lines.iter().filter(|line| posts::is_failed_post(line)).count();
            write_lines(&output, &lines)?;

            println!("wrote {} results to {}", lines.len(), output.display());
            if failed > 0 {
                println!("failed: {failed}");
            }
        }

        Command::Summary => {
            let summary = MetricsSummary::load(&args.ledger)?;
            println!("{summary}");
        }

        Command::Merge {
            first,
            second,
            output,
        } => {
            let a = fs::read_to_string(&first)?;
            let b = fs::read_to_string(&second)?;
            let a: Vec<&str> = a.lines().collect();
            let b: Vec<&str> = b.lines().collect();
            let merged: Vec<String> = posts::merge_alternate(&a, &b)
                .iter()
                .map(|line| posts::flatten_line(line))
                .collect();
            write_lines(&output, &merged)?;
            println!("merged {} lines into {}", merged.len(), output.display());
        }

        Command::InitSecrets => {
            let dir = args
                .config_dir
                .unwrap_or_else(|| PathBuf::from("config"));
            let path = Secrets::write_template(&dir)?;
            println!("wrote {}", path.display());
        }
    }

    Ok(())
}

/// Batch settings pulled from the selected policy section.
struct BatchSettings {
    workers: usize,
    retry_passes: u32,
    copies: usize,
    max_name_chars: usize,
}

/// Load config and build a controller writing to `ledger`.
fn build_controller(
    config_dir: Option<&Path>,
    ledger: &Path,
    section: Section,
    model: Option<String>,
) -> Result<(RetryController, BatchSettings), Box<dyn std::error::Error>> {
    let dir = config::resolve_config_dir(config_dir)?;
    let policy = GenerationPolicy::load(&dir)?;
    let secrets = Secrets::load(&dir)?;

    let api_key = secrets.google_api_key().ok_or_else(|| {
        format!(
            "no Google API key: set google_api_key in {} or {}",
            config::SECRETS_FILE,
            config::GOOGLE_API_KEY_ENV
        )
    })?;

    let (retry, settings): (RetryPolicy, BatchSettings) = match section {
        Section::Normal => {
            let normal = policy.normal_post_generation;
            (
                normal.retry,
                BatchSettings {
                    workers: normal.workers,
                    retry_passes: normal.retry_passes,
                    copies: normal.posts_per_theme.max(1) as usize,
                    max_name_chars: 0,
                },
            )
        }
        Section::Affiliate => {
            let affiliate = policy.affiliate_post_generation;
            (
                affiliate.retry,
                BatchSettings {
                    workers: affiliate.workers,
                    retry_passes: affiliate.retry_passes,
                    copies: 1,
                    max_name_chars: affiliate.max_product_name_length,
                },
            )
        }
    };

    let mut client = GeminiClient::new(api_key)?;
    if let Some(model) = model {
        client = client.model(model);
    }

    let controller = RetryController::new(Arc::new(client), retry)
        .with_sink(Arc::new(JsonlEventSink::new(ledger)));
    Ok((controller, settings))
}

fn write_lines(path: &Path, lines: &[String]) -> io::Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)?;
    }
    let mut content = lines.join("\n");
    content.push('\n');
    fs::write(path, content)
}

/// Resolve text input from an optional CLI argument and/or stdin.
///
/// - arg only → arg
/// - stdin only → stdin
/// - both → `"{arg}\n\n{stdin}"`
/// - neither → error
fn resolve_text(arg: Option<String>, command: &str) -> Result<String, Box<dyn std::error::Error>> {
    let stdin_text = if io::stdin().is_terminal() {
        None
    } else {
        let mut buf = String::new();
        io::stdin().read_to_string(&mut buf)?;
        let trimmed = buf.trim().to_string();
        (!trimmed.is_empty()).then_some(trimmed)
    };

    match (arg, stdin_text) {
        (Some(a), Some(s)) => Ok(format!("{a}\n\n{s}")),
        (Some(a), None) => Ok(a),
        (None, Some(s)) => Ok(s),
        (None, None) => {
            Err(format!("{command}: no input provided (pass a prompt or pipe one via stdin)").into())
        }
    }
}

use std::io::{self, IsTerminal, Write};
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{ArgAction, Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use bookdiff_core::{
    Config, DocumentOutcome, PromptSet, PromptVariant, Session, Speaker, config_file,
};

mod export;
mod interactive;
mod output;

use export::{ExportFormat, Report};
use output::ColorMode;

/// Textbook Comparison - extract PDF textbooks (OCR for scanned pages) and compare them with Gemini
#[derive(Parser, Debug)]
#[command(name = "bookdiff", version, about, long_about = None)]
struct Cli {
    /// More log output on stderr (-v info, -vv debug); RUST_LOG takes precedence
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug)]
struct ChatArgs {
    /// Gemini model name
    #[arg(long)]
    model: Option<String>,

    /// Google API key (default: GOOGLE_API_KEY)
    #[arg(long)]
    api_key: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Extract the text of one or more PDFs
    Extract {
        /// PDF files to extract
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Write the text to this file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Compare two PDF textbooks
    Compare {
        /// First textbook
        first: PathBuf,

        /// Second textbook
        second: PathBuf,

        /// Comparison prompt: overview, structured, or curriculum-alignment
        #[arg(short, long)]
        prompt: Option<PromptVariant>,

        /// Custom comparison template with {book1_name}, {book1_text}, {book2_name}, {book2_text}
        #[arg(long)]
        template: Option<PathBuf>,

        #[command(flatten)]
        chat: ChatArgs,

        /// Save a report of the comparison and any follow-up questions
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Report format (default: from the output extension, else text)
        #[arg(long, value_enum)]
        format: Option<ExportFormat>,

        /// Ask follow-up questions after the comparison
        #[arg(short, long)]
        interactive: bool,
    },

    /// Ask one question about a PDF textbook
    Ask {
        /// The textbook
        file: PathBuf,

        /// The question
        question: String,

        #[command(flatten)]
        chat: ChatArgs,
    },

    /// Inspect or create the config file
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Print the effective settings
    Show,
    /// Print the config file location
    Path,
    /// Write a config file with the default settings
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present (silently ignore if missing)
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let color = ColorMode(!cli.no_color && io::stdout().is_terminal());

    match cli.command {
        Command::Extract { files, output } => run_extract(&files, output.as_deref(), color),
        Command::Compare {
            first,
            second,
            prompt,
            template,
            chat,
            output,
            format,
            interactive,
        } => {
            let config = resolve_config(Some(&chat));
            let variant = prompt.unwrap_or(config.prompt_variant);
            let template = template.or_else(|| config.template_path.clone());
            let prompts = build_prompts(variant, template.as_deref())?;
            let report = ReportTarget::new(output, format);
            run_compare(&config, [first, second], &prompts, report, interactive, color).await
        }
        Command::Ask {
            file,
            question,
            chat,
        } => run_ask(&resolve_config(Some(&chat)), &file, &question, color).await,
        Command::Config { action } => run_config(action, color),
    }
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(io::stderr)
                .with_target(false),
        )
        .init();
}

/// Defaults, then the config file, then the environment, then flags.
fn resolve_config(chat: Option<&ChatArgs>) -> Config {
    let mut config = Config::from_config_file(&config_file::load_config());
    config.apply_env();
    if let Some(chat) = chat {
        if let Some(ref model) = chat.model {
            config.model = model.clone();
        }
        if let Some(ref key) = chat.api_key {
            config.google_api_key = Some(key.clone());
        }
    }
    tracing::debug!(?config, "resolved configuration");
    config
}

fn build_prompts(variant: PromptVariant, template: Option<&Path>) -> anyhow::Result<PromptSet> {
    let prompts = PromptSet::new(variant);
    let Some(path) = template else {
        return Ok(prompts);
    };
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read template {}", path.display()))?;
    if text.trim().is_empty() {
        anyhow::bail!("Template {} is empty", path.display());
    }
    Ok(prompts.with_template(text))
}

/// Load and extract every file, printing one status line each on stderr.
fn extract_all(
    paths: &[PathBuf],
    config: &Config,
    color: ColorMode,
) -> anyhow::Result<Vec<DocumentOutcome>> {
    let splitter = config.splitter().context("Invalid chunking settings")?;
    let extractor = bookdiff_ingest::default_extractor(config);

    let bar = output::extraction_bar(paths.len());
    let outcomes =
        bookdiff_ingest::extract_paths_with_progress(&extractor, &splitter, paths, |i, name| {
            bar.set_position(i as u64);
            bar.set_message(name.to_string());
        });
    bar.finish_and_clear();

    let mut err = io::stderr();
    for outcome in &outcomes {
        output::print_outcome(&mut err, outcome, color)?;
    }
    Ok(outcomes)
}

fn run_extract(files: &[PathBuf], output: Option<&Path>, color: ColorMode) -> anyhow::Result<()> {
    let config = resolve_config(None);
    let outcomes = extract_all(files, &config, color)?;

    let mut writer: Box<dyn Write> = match output {
        Some(path) => Box::new(io::BufWriter::new(
            std::fs::File::create(path)
                .with_context(|| format!("Failed to create {}", path.display()))?,
        )),
        None => Box::new(io::stdout().lock()),
    };
    let text_color = ColorMode(color.enabled() && output.is_none());
    for outcome in &outcomes {
        if let DocumentOutcome::Extracted(book) = outcome {
            output::print_textbook(&mut *writer, book, text_color)?;
        }
    }
    writer.flush()?;

    let failed = outcomes.iter().filter(|o| !o.is_extracted()).count();
    if failed > 0 {
        anyhow::bail!("{failed} of {} files could not be extracted", outcomes.len());
    }
    Ok(())
}

/// Where and how to save the comparison report, if at all.
struct ReportTarget {
    path: Option<PathBuf>,
    format: ExportFormat,
}

impl ReportTarget {
    fn new(path: Option<PathBuf>, format: Option<ExportFormat>) -> Self {
        let format = format
            .or_else(|| path.as_deref().and_then(ExportFormat::from_path))
            .unwrap_or_default();
        Self { path, format }
    }
}

async fn run_compare(
    config: &Config,
    files: [PathBuf; 2],
    prompts: &PromptSet,
    report: ReportTarget,
    interactive: bool,
    color: ColorMode,
) -> anyhow::Result<()> {
    // Fail on a missing key before spending time on extraction.
    let client = config.chat_client()?;

    let mut session = Session::new();
    session.ingest(extract_all(&files, config, color)?);

    let bar = output::spinner("Comparing textbooks...");
    let result = session.compare(&client, prompts).await;
    bar.finish_and_clear();
    let result = result?;

    let mut out = io::stdout();
    output::print_comparison(&mut out, prompts.variant.title(), &result, color)?;

    if interactive {
        interactive::run(
            &mut session,
            &client,
            prompts,
            io::stdin().lock(),
            &mut out,
            color,
        )
        .await?;
    }

    if let Some(ref path) = report.path {
        let summary = Report::from_session(&session, prompts.variant, &config.model);
        export::export_report(&summary, report.format, path).map_err(anyhow::Error::msg)?;
        eprintln!("Saved {} report to {}", report.format.extension(), path.display());
    }
    Ok(())
}

async fn run_ask(
    config: &Config,
    file: &Path,
    question: &str,
    color: ColorMode,
) -> anyhow::Result<()> {
    let client = config.chat_client()?;

    let mut session = Session::new();
    session.ingest(extract_all(&[file.to_path_buf()], config, color)?);
    if session.textbooks().is_empty() {
        anyhow::bail!("No text could be extracted from {}", file.display());
    }

    let prompts = PromptSet::new(config.prompt_variant);
    let bar = output::spinner("Waiting for the model...");
    let answer = session.ask(&client, &prompts, 0, question).await;
    bar.finish_and_clear();
    let answer = answer?;

    let mut out = io::stdout();
    output::print_message(&mut out, Speaker::You, question.trim(), color)?;
    output::print_message(&mut out, Speaker::Bot, &answer, color)?;
    Ok(())
}

fn run_config(action: ConfigAction, color: ColorMode) -> anyhow::Result<()> {
    let mut out = io::stdout();
    match action {
        ConfigAction::Show => output::print_config(&mut out, &resolve_config(None), color)?,
        ConfigAction::Path => {
            let path = config_file::config_path()
                .context("Could not determine the platform config directory")?;
            writeln!(out, "{}", path.display())?;
            if !path.exists() {
                eprintln!("(not created yet; run `bookdiff config init`)");
            }
        }
        ConfigAction::Init { force } => {
            let path = config_file::config_path()
                .context("Could not determine the platform config directory")?;
            if path.exists() && !force {
                anyhow::bail!("{} already exists (use --force to overwrite)", path.display());
            }
            let written = config_file::save_config(&Config::default().to_config_file())
                .map_err(anyhow::Error::msg)?;
            writeln!(out, "Wrote {}", written.display())?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn compare_arguments_parse() {
        let cli = Cli::try_parse_from([
            "bookdiff",
            "compare",
            "a.pdf",
            "b.pdf",
            "--prompt",
            "ncert",
            "-o",
            "report.md",
            "-i",
            "-v",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 1);
        match cli.command {
            Command::Compare {
                prompt,
                output,
                format,
                interactive,
                ..
            } => {
                assert_eq!(prompt, Some(PromptVariant::CurriculumAlignment));
                assert!(interactive);
                let target = ReportTarget::new(output, format);
                assert_eq!(target.format, ExportFormat::Markdown);
            }
            other => panic!("expected compare, got {other:?}"),
        }
    }

    #[test]
    fn explicit_format_wins_over_extension() {
        let target = ReportTarget::new(Some("out.md".into()), Some(ExportFormat::Json));
        assert_eq!(target.format, ExportFormat::Json);
        assert_eq!(ReportTarget::new(None, None).format, ExportFormat::Text);
    }

    #[test]
    fn unknown_prompt_is_rejected() {
        let err = Cli::try_parse_from(["bookdiff", "compare", "a.pdf", "b.pdf", "-p", "essay"]);
        assert!(err.is_err());
    }

    #[test]
    fn missing_file_is_reported_with_the_rest_of_the_batch() {
        let dir = tempfile::tempdir().unwrap();
        let notes = dir.path().join("notes.txt");
        std::fs::write(&notes, "not a pdf").unwrap();
        let paths = vec![dir.path().join("missing.pdf"), notes];

        let outcomes = extract_all(&paths, &Config::default(), ColorMode(false)).unwrap();
        let names: Vec<&str> = outcomes.iter().map(|o| o.name()).collect();
        assert_eq!(names, vec!["missing.pdf", "notes.txt"]);
        assert!(outcomes.iter().all(|o| matches!(o, DocumentOutcome::Failed { .. })));
    }

    #[test]
    fn template_file_replaces_builtin_prompt() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("brief.txt");
        std::fs::write(&path, "{book1_name} vs {book2_name}").unwrap();

        let prompts = build_prompts(PromptVariant::Overview, Some(&path)).unwrap();
        assert_eq!(prompts.comparison([("A", "x"), ("B", "y")]), "A vs B");

        std::fs::write(&path, "  \n").unwrap();
        assert!(build_prompts(PromptVariant::Overview, Some(&path)).is_err());
        assert!(build_prompts(PromptVariant::Overview, Some(&dir.path().join("missing"))).is_err());
    }
}

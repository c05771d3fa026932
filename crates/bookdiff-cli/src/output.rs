use std::io::Write;
use std::time::Duration;

use bookdiff_core::{Config, DocumentOutcome, Speaker, Textbook, Transcript};
use indicatif::{ProgressBar, ProgressStyle};
use owo_colors::OwoColorize;

/// Whether to use colored output.
#[derive(Debug, Clone, Copy)]
pub struct ColorMode(pub bool);

impl ColorMode {
    pub fn enabled(&self) -> bool {
        self.0
    }
}

/// Spinner on stderr while a request is in flight. Hidden when stderr is
/// not a terminal.
pub fn spinner(message: &str) -> ProgressBar {
    let bar = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::with_template("{spinner:.green} {msg} {elapsed:.dim}") {
        bar.set_style(style);
    }
    bar.set_message(message.to_string());
    bar.enable_steady_tick(Duration::from_millis(120));
    bar
}

/// Bar over the documents being extracted.
pub fn extraction_bar(total: usize) -> ProgressBar {
    let bar = ProgressBar::new(total as u64);
    if let Ok(style) =
        ProgressStyle::with_template("{spinner:.green} [{bar:30.cyan/blue}] {pos}/{len} {msg}")
    {
        bar.set_style(style.progress_chars("=> "));
    }
    bar.enable_steady_tick(Duration::from_millis(120));
    bar
}

/// One status line per document after extraction.
pub fn print_outcome(
    w: &mut dyn Write,
    outcome: &DocumentOutcome,
    color: ColorMode,
) -> std::io::Result<()> {
    match outcome {
        DocumentOutcome::Extracted(book) => {
            let line = format!(
                "{}: {} characters, {} chunks",
                book.name,
                book.text.chars().count(),
                book.chunks.len()
            );
            if color.enabled() {
                writeln!(w, "{} {}", "\u{2713}".green(), line)
            } else {
                writeln!(w, "[ok] {line}")
            }
        }
        DocumentOutcome::Empty { name } => {
            let line = format!("Extraction failed for file {name}: no text found");
            if color.enabled() {
                writeln!(w, "{} {}", "\u{2717}".yellow(), line.yellow())
            } else {
                writeln!(w, "[empty] {line}")
            }
        }
        DocumentOutcome::Failed { name, error } => {
            let line = format!("Extraction failed for file {name}: {error}");
            if color.enabled() {
                writeln!(w, "{} {}", "\u{2717}".red(), line.red())
            } else {
                writeln!(w, "[failed] {line}")
            }
        }
    }
}

/// The full text of one textbook under a file-name banner.
pub fn print_textbook(w: &mut dyn Write, book: &Textbook, color: ColorMode) -> std::io::Result<()> {
    let banner = format!("==== {} ====", book.name);
    if color.enabled() {
        writeln!(w, "{}", banner.bold())?;
    } else {
        writeln!(w, "{banner}")?;
    }
    writeln!(w, "{}", book.text)?;
    writeln!(w)
}

pub fn print_comparison(
    w: &mut dyn Write,
    title: &str,
    result: &str,
    color: ColorMode,
) -> std::io::Result<()> {
    writeln!(w)?;
    if color.enabled() {
        writeln!(w, "{}", title.bold().underline())?;
    } else {
        writeln!(w, "{title}")?;
        writeln!(w, "{}", "=".repeat(title.chars().count()))?;
    }
    writeln!(w)?;
    writeln!(w, "{result}")?;
    writeln!(w)
}

pub fn print_message(
    w: &mut dyn Write,
    speaker: Speaker,
    text: &str,
    color: ColorMode,
) -> std::io::Result<()> {
    if !color.enabled() {
        return writeln!(w, "{speaker}: {text}");
    }
    match speaker {
        Speaker::You => writeln!(w, "{} {}", "You:".cyan().bold(), text),
        Speaker::Bot => writeln!(w, "{} {}", "Bot:".green().bold(), text),
    }
}

pub fn print_transcript(
    w: &mut dyn Write,
    transcript: &Transcript,
    color: ColorMode,
) -> std::io::Result<()> {
    if transcript.is_empty() {
        return writeln!(w, "No questions asked yet.");
    }
    for (speaker, text) in transcript.entries() {
        print_message(w, *speaker, text, color)?;
    }
    Ok(())
}

pub fn print_error(w: &mut dyn Write, message: &str, color: ColorMode) -> std::io::Result<()> {
    if color.enabled() {
        writeln!(w, "{} {}", "error:".red().bold(), message)
    } else {
        writeln!(w, "error: {message}")
    }
}

/// Effective settings after the file, environment and flags are merged.
pub fn print_config(w: &mut dyn Write, config: &Config, color: ColorMode) -> std::io::Result<()> {
    let key = match config.google_api_key {
        Some(ref k) if k.chars().count() > 4 => {
            format!("{}...", k.chars().take(4).collect::<String>())
        }
        Some(_) => "(set)".to_string(),
        None => "(not set)".to_string(),
    };
    let template = config
        .template_path
        .as_ref()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "(built-in)".to_string());
    let temperature = config
        .temperature
        .map(|t| t.to_string())
        .unwrap_or_else(|| "(model default)".to_string());

    let rows = [
        ("google_api_key", key),
        ("model", config.model.clone()),
        ("base_url", config.base_url.clone()),
        ("timeout_secs", config.timeout_secs.to_string()),
        ("temperature", temperature),
        ("chunk_size", config.chunk_size.to_string()),
        ("chunk_overlap", config.chunk_overlap.to_string()),
        ("tesseract_path", config.tesseract_path.display().to_string()),
        ("ocr_language", config.ocr_language.clone()),
        ("render_dpi", config.render_dpi.to_string()),
        ("header_exclusion", config.header_exclusion.to_string()),
        ("footer_exclusion", config.footer_exclusion.to_string()),
        ("prompt_variant", config.prompt_variant.to_string()),
        ("template_path", template),
    ];
    for (name, value) in rows {
        if color.enabled() {
            writeln!(w, "{:<18} {}", name.dimmed(), value)?;
        } else {
            writeln!(w, "{name:<18} {value}")?;
        }
    }
    Ok(())
}

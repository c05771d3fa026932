use std::fmt::Write as _;
use std::path::Path;

use bookdiff_core::{PromptVariant, Session, Speaker};
use clap::ValueEnum;
use serde::Serialize;

/// File formats a comparison report can be saved in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum ExportFormat {
    #[default]
    Text,
    Markdown,
    Json,
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Text => "txt",
            ExportFormat::Markdown => "md",
            ExportFormat::Json => "json",
        }
    }

    /// Guess the format from a file extension.
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "txt" | "text" => Some(ExportFormat::Text),
            "md" | "markdown" => Some(ExportFormat::Markdown),
            "json" => Some(ExportFormat::Json),
            _ => None,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct BookSummary<'a> {
    pub name: &'a str,
    pub characters: usize,
    pub chunks: usize,
}

#[derive(Debug, Serialize)]
pub struct Exchange<'a> {
    pub speaker: Speaker,
    pub text: &'a str,
}

/// Everything a saved report contains, borrowed from the session.
#[derive(Debug, Serialize)]
pub struct Report<'a> {
    pub title: &'a str,
    pub variant: PromptVariant,
    pub model: &'a str,
    pub textbooks: Vec<BookSummary<'a>>,
    pub comparison: Option<&'a str>,
    pub transcript: Vec<Exchange<'a>>,
}

impl<'a> Report<'a> {
    pub fn from_session(session: &'a Session, variant: PromptVariant, model: &'a str) -> Self {
        Self {
            title: variant.title(),
            variant,
            model,
            textbooks: session
                .textbooks()
                .iter()
                .map(|b| BookSummary {
                    name: &b.name,
                    characters: b.text.chars().count(),
                    chunks: b.chunks.len(),
                })
                .collect(),
            comparison: session.last_comparison(),
            transcript: session
                .transcript()
                .entries()
                .iter()
                .map(|(speaker, text)| Exchange {
                    speaker: *speaker,
                    text,
                })
                .collect(),
        }
    }
}

pub fn render(report: &Report<'_>, format: ExportFormat) -> Result<String, String> {
    match format {
        ExportFormat::Text => Ok(render_text(report)),
        ExportFormat::Markdown => Ok(render_markdown(report)),
        ExportFormat::Json => serde_json::to_string_pretty(report)
            .map_err(|e| format!("Failed to serialize report: {e}")),
    }
}

/// Render `report` and write it to `path`.
pub fn export_report(report: &Report<'_>, format: ExportFormat, path: &Path) -> Result<(), String> {
    let content = render(report, format)?;
    std::fs::write(path, content)
        .map_err(|e| format!("Failed to write {}: {e}", path.display()))
}

fn render_text(report: &Report<'_>) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}", report.title);
    let _ = writeln!(out, "{}", "=".repeat(report.title.chars().count()));
    let _ = writeln!(out);
    let _ = writeln!(out, "Model: {}", report.model);
    let _ = writeln!(out, "Prompt: {}", report.variant);
    for (i, book) in report.textbooks.iter().enumerate() {
        let _ = writeln!(
            out,
            "Textbook {}: {} ({} characters, {} chunks)",
            i + 1,
            book.name,
            book.characters,
            book.chunks
        );
    }
    let _ = writeln!(out);
    if let Some(comparison) = report.comparison {
        let _ = writeln!(out, "{comparison}");
        let _ = writeln!(out);
    }
    if !report.transcript.is_empty() {
        let _ = writeln!(out, "Questions");
        let _ = writeln!(out, "---------");
        for exchange in &report.transcript {
            let _ = writeln!(out, "{}: {}", exchange.speaker, exchange.text);
        }
    }
    out
}

fn render_markdown(report: &Report<'_>) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "# {}\n", report.title);
    let _ = writeln!(out, "- **Model:** {}", report.model);
    let _ = writeln!(out, "- **Prompt:** {}\n", report.variant);
    let _ = writeln!(out, "| # | Textbook | Characters | Chunks |");
    let _ = writeln!(out, "|---|----------|-----------:|-------:|");
    for (i, book) in report.textbooks.iter().enumerate() {
        let _ = writeln!(
            out,
            "| {} | {} | {} | {} |",
            i + 1,
            book.name.replace('|', "\\|"),
            book.characters,
            book.chunks
        );
    }
    if let Some(comparison) = report.comparison {
        let _ = writeln!(out, "\n## Comparison\n\n{comparison}");
    }
    if !report.transcript.is_empty() {
        let _ = writeln!(out, "\n## Questions\n");
        for exchange in &report.transcript {
            match exchange.speaker {
                Speaker::You => {
                    let _ = writeln!(out, "**You:** {}\n", exchange.text);
                }
                Speaker::Bot => {
                    let _ = writeln!(out, "> {}\n", exchange.text.replace('\n', "\n> "));
                }
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Report<'static> {
        Report {
            title: "Textbook Comparison",
            variant: PromptVariant::Structured,
            model: "gemini-1.5-flash",
            textbooks: vec![
                BookSummary {
                    name: "A.pdf",
                    characters: 1200,
                    chunks: 2,
                },
                BookSummary {
                    name: "B|2.pdf",
                    characters: 800,
                    chunks: 1,
                },
            ],
            comparison: Some("A covers more topics."),
            transcript: vec![
                Exchange {
                    speaker: Speaker::You,
                    text: "Which is simpler?",
                },
                Exchange {
                    speaker: Speaker::Bot,
                    text: "B uses shorter sentences.\nIt also has pictures.",
                },
            ],
        }
    }

    #[test]
    fn format_from_extension() {
        assert_eq!(ExportFormat::from_path(Path::new("r.MD")), Some(ExportFormat::Markdown));
        assert_eq!(ExportFormat::from_path(Path::new("r.json")), Some(ExportFormat::Json));
        assert_eq!(ExportFormat::from_path(Path::new("report")), None);
        assert_eq!(ExportFormat::Markdown.extension(), "md");
    }

    #[test]
    fn text_report() {
        let text = render(&sample(), ExportFormat::Text).unwrap();
        assert!(text.starts_with("Textbook Comparison\n===================\n"));
        assert!(text.contains("Prompt: structured"));
        assert!(text.contains("Textbook 1: A.pdf (1200 characters, 2 chunks)"));
        assert!(text.contains("A covers more topics."));
        assert!(text.contains("You: Which is simpler?\nBot: B uses shorter sentences."));
    }

    #[test]
    fn markdown_report() {
        let md = render(&sample(), ExportFormat::Markdown).unwrap();
        assert!(md.starts_with("# Textbook Comparison\n"));
        assert!(md.contains("| 2 | B\\|2.pdf | 800 | 1 |"));
        assert!(md.contains("## Comparison\n\nA covers more topics."));
        assert!(md.contains("> B uses shorter sentences.\n> It also has pictures."));
    }

    #[test]
    fn json_report() {
        let json = render(&sample(), ExportFormat::Json).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["variant"], "structured");
        assert_eq!(value["textbooks"][1]["name"], "B|2.pdf");
        assert_eq!(value["transcript"][0]["speaker"], "You");
        assert_eq!(value["comparison"], "A covers more topics.");
    }

    #[test]
    fn report_without_comparison_omits_sections() {
        let report = Report {
            comparison: None,
            transcript: Vec::new(),
            ..sample()
        };
        let text = render(&report, ExportFormat::Text).unwrap();
        assert!(!text.contains("Questions"));
        let md = render(&report, ExportFormat::Markdown).unwrap();
        assert!(!md.contains("## Comparison"));
    }

    #[test]
    fn report_is_written_to_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.md");
        export_report(&sample(), ExportFormat::Markdown, &path).unwrap();
        let written = std::fs::read_to_string(&path).unwrap();
        assert!(written.contains("## Questions"));
    }
}

//! Follow-up questions after a comparison, one line at a time.
//!
//! Plain lines are questions about the selected textbook. Lines starting with
//! `:` are commands: `:book <name|number>`, `:books`, `:history`, `:help`
//! and `:quit`.

use std::io::{BufRead, Write};

use bookdiff_core::{ChatClient, PromptSet, Session, Speaker};

use crate::output::{self, ColorMode};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Ask(String),
    SelectBook(String),
    ListBooks,
    History,
    Help,
    Quit,
    Unknown(String),
}

/// `None` for blank lines.
pub fn parse_line(line: &str) -> Option<Command> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    let Some(rest) = line.strip_prefix(':') else {
        return Some(Command::Ask(line.to_string()));
    };
    let (name, arg) = match rest.split_once(char::is_whitespace) {
        Some((name, arg)) => (name, arg.trim()),
        None => (rest, ""),
    };
    Some(match name {
        "book" | "b" if !arg.is_empty() => Command::SelectBook(arg.to_string()),
        "books" | "book" | "b" => Command::ListBooks,
        "history" | "h" => Command::History,
        "help" | "?" => Command::Help,
        "quit" | "q" | "exit" => Command::Quit,
        other => Command::Unknown(other.to_string()),
    })
}

/// Position of a loaded textbook, given its 1-based number or its name
/// (case-insensitive). A name shared by several books picks the first.
pub fn resolve_book(session: &Session, arg: &str) -> Option<usize> {
    let books = session.textbooks();
    if let Ok(n) = arg.parse::<usize>()
        && (1..=books.len()).contains(&n)
    {
        return Some(n - 1);
    }
    books
        .iter()
        .position(|b| b.name == arg)
        .or_else(|| books.iter().position(|b| b.name.eq_ignore_ascii_case(arg)))
}

/// `name`, or `name (#2)` when another loaded book has the same name.
fn label(session: &Session, index: usize) -> String {
    let books = session.textbooks();
    let Some(book) = books.get(index) else {
        return format!("#{}", index + 1);
    };
    if books.iter().filter(|b| b.name == book.name).count() > 1 {
        format!("{} (#{})", book.name, index + 1)
    } else {
        book.name.clone()
    }
}

fn print_help(out: &mut dyn Write) -> std::io::Result<()> {
    writeln!(out, "Type a question to ask about the selected textbook.")?;
    writeln!(out, "  :book <name|number>  select the textbook to ask about")?;
    writeln!(out, "  :books               list loaded textbooks")?;
    writeln!(out, "  :history             show questions and answers so far")?;
    writeln!(out, "  :quit                leave")
}

/// Read questions from `input` until `:quit` or end of input.
///
/// Chat failures are reported and the loop continues.
pub async fn run(
    session: &mut Session,
    client: &dyn ChatClient,
    prompts: &PromptSet,
    mut input: impl BufRead,
    out: &mut dyn Write,
    color: ColorMode,
) -> anyhow::Result<()> {
    if session.textbooks().is_empty() {
        anyhow::bail!("no textbooks loaded");
    }
    let mut current = 0;
    writeln!(out, "Ask about {} (:help for commands)", label(session, current))?;

    let mut line = String::new();
    loop {
        write!(out, "{}> ", label(session, current))?;
        out.flush()?;
        line.clear();
        if input.read_line(&mut line)? == 0 {
            writeln!(out)?;
            break;
        }
        let Some(command) = parse_line(&line) else {
            continue;
        };

        match command {
            Command::Quit => break,
            Command::Help => print_help(out)?,
            Command::ListBooks => {
                for (i, book) in session.textbooks().iter().enumerate() {
                    let marker = if i == current { '*' } else { ' ' };
                    writeln!(out, "{marker} {}. {}", i + 1, book.name)?;
                }
            }
            Command::SelectBook(arg) => match resolve_book(session, &arg) {
                Some(index) => {
                    current = index;
                    writeln!(out, "Asking about {}", label(session, current))?;
                }
                None => output::print_error(out, &format!("unknown textbook: {arg}"), color)?,
            },
            Command::History => output::print_transcript(out, session.transcript(), color)?,
            Command::Unknown(name) => output::print_error(
                out,
                &format!("unknown command :{name} (try :help)"),
                color,
            )?,
            Command::Ask(question) => {
                let bar = output::spinner("Waiting for the model...");
                let result = session.ask(client, prompts, current, &question).await;
                bar.finish_and_clear();
                match result {
                    Ok(answer) => output::print_message(out, Speaker::Bot, &answer, color)?,
                    Err(e) => {
                        tracing::warn!(book = current, error = %e, "question failed");
                        output::print_error(out, &e.to_string(), color)?;
                    }
                }
            }
        }
    }
    Ok(())
}

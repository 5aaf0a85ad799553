use std::path::PathBuf;

use crate::action::Action;

/// Slash commands shown in the popup and the help overlay.
pub const COMMANDS: &[(&str, &str)] = &[
    ("/upload", "Upload a lab report (PDF/PNG/JPG)"),
    ("/evidence", "Open evidence n of the last answer"),
    ("/close", "Close the evidence drawer"),
    ("/export", "Export analysis + chat to JSON"),
    ("/clear", "Clear chat history"),
    ("/help", "Show keys and commands"),
    ("/quit", "Exit MedRag"),
];

pub struct CommandParser;

impl CommandParser {
    pub fn parse(input: &str) -> Result<Action, String> {
        let input = input.trim();
        if !input.starts_with('/') {
            return Err("Not a command".to_string());
        }

        let (cmd, args) = input.split_once(' ').unwrap_or((input, ""));
        let args = args.trim();

        match cmd {
            "/help" => Ok(Action::Help),
            "/clear" => Ok(Action::ClearHistory),
            "/upload" => {
                if args.is_empty() {
                    Err("Usage: /upload <path>  e.g. /upload ./reports/cbc.pdf".to_string())
                } else {
                    Ok(Action::Upload { path: PathBuf::from(unquote(args)) })
                }
            }
            "/evidence" => match args.parse::<usize>() {
                Ok(position) if position > 0 => Ok(Action::OpenEvidence { position }),
                _ => Err("Usage: /evidence <n>  (n starts at 1)".to_string()),
            },
            "/close" => Ok(Action::CloseEvidence),
            "/export" => {
                let dir = if args.is_empty() {
                    None
                } else {
                    Some(PathBuf::from(unquote(args)))
                };
                Ok(Action::Export { dir })
            }
            "/quit" | "/exit" => Ok(Action::Quit),
            _ => Err(format!("Unknown command: {}. Type /help for available commands.", cmd)),
        }
    }
}

/// Paths dragged into a terminal often arrive wrapped in quotes.
fn unquote(arg: &str) -> &str {
    let arg = arg.trim();
    for quote in ['"', '\''] {
        if let Some(inner) = arg.strip_prefix(quote).and_then(|a| a.strip_suffix(quote)) {
            return inner;
        }
    }
    arg
}

//! Line-oriented terminal surface.
//!
//! Plain lines are submitted to the session; lines starting with `/` are
//! commands. Persistence and turn failures are reported and the loop goes on.

use crate::model_profiles::all_profiles;
use crate::persona::Persona;
use crate::protocol::{IndexReport, ReplySource};
use crate::session_registry::SharedSession;
use crate::transcript::{list_transcripts, load_transcript, new_transcript_path, save_transcript};
use chrono::Utc;
use std::io::Write;
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, BufReader};

pub const HELP_TEXT: &str = "\
Commands:
  /model <id>         switch model for the next turn
  /persona <id>       switch persona (see /personas)
  /personas           list personas
  /models             list known model families
  /reset              clear history
  /recover            leave offline mode and retry the hosted model
  /index <paths...>   index files or folders for retrieval
  /save [path]        save the transcript
  /load <path>        replace history with a saved transcript
  /transcripts        list saved transcripts
  /status             show session state
  /help               show this help
  /quit               exit";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Say(String),
    Model(String),
    Persona(String),
    Personas,
    Models,
    Reset,
    Recover,
    Index(Vec<PathBuf>),
    Save(Option<PathBuf>),
    Load(PathBuf),
    Transcripts,
    Status,
    Help,
    Quit,
    /// A command that needs an argument was given none
    Usage(&'static str),
    Unknown(String),
}

/// Parse one input line. Blank lines parse to `None`.
pub fn parse_command(line: &str) -> Option<Command> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    let Some(rest) = line.strip_prefix('/') else {
        return Some(Command::Say(line.to_string()));
    };

    let (name, arg) = match rest.split_once(char::is_whitespace) {
        Some((name, arg)) => (name, arg.trim()),
        None => (rest, ""),
    };
    let command = match name.to_lowercase().as_str() {
        "model" if arg.is_empty() => Command::Usage("/model <id>"),
        "model" => Command::Model(arg.to_string()),
        "persona" if arg.is_empty() => Command::Usage("/persona <id>"),
        "persona" => Command::Persona(arg.to_string()),
        "personas" => Command::Personas,
        "models" => Command::Models,
        "reset" | "clear" => Command::Reset,
        "recover" => Command::Recover,
        "index" if arg.is_empty() => Command::Usage("/index <paths...>"),
        "index" => Command::Index(arg.split_whitespace().map(PathBuf::from).collect()),
        "save" => Command::Save((!arg.is_empty()).then(|| PathBuf::from(arg))),
        "load" if arg.is_empty() => Command::Usage("/load <path>"),
        "load" => Command::Load(PathBuf::from(arg)),
        "transcripts" => Command::Transcripts,
        "status" => Command::Status,
        "help" | "?" => Command::Help,
        "quit" | "exit" => Command::Quit,
        _ => Command::Unknown(name.to_string()),
    };
    Some(command)
}

/// What the loop should do after a command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    Print(String),
    Quit,
}

pub struct Repl {
    session: SharedSession,
    transcripts_dir: PathBuf,
}

impl Repl {
    pub fn new(session: SharedSession, transcripts_dir: PathBuf) -> Self {
        Self {
            session,
            transcripts_dir,
        }
    }

    pub async fn execute(&self, command: Command) -> Step {
        let output = match command {
            Command::Say(text) => {
                let mut session = self.session.lock().await;
                match session.submit(&text).await {
                    Ok(reply) if reply.source == ReplySource::Fallback => format!("[offline] {}", reply.text),
                    Ok(reply) => reply.text,
                    Err(e) => format!("Error: {}", e),
                }
            }
            Command::Model(id) => match self.session.lock().await.switch_model(&id) {
                Ok(()) => format!("Model set to {}", id.trim()),
                Err(e) => e.to_string(),
            },
            Command::Persona(id) => match self.session.lock().await.switch_persona(&id) {
                Ok(persona) => format!("Persona set to {}", persona),
                Err(e) => e.to_string(),
            },
            Command::Personas => Persona::ALL
                .iter()
                .map(|p| format!("  {:<10} {}", p.id(), p.instruction()))
                .collect::<Vec<_>>()
                .join("\n"),
            Command::Models => all_profiles()
                .iter()
                .map(|p| format!("  {:<12} {:?} (e.g. {})", p.id, p.tier, p.example))
                .collect::<Vec<_>>()
                .join("\n"),
            Command::Reset => {
                self.session.lock().await.reset();
                "History cleared.".to_string()
            }
            Command::Recover => {
                if self.session.lock().await.recover() {
                    "Back online; the next turn goes to the hosted model.".to_string()
                } else {
                    "Session is not in offline mode.".to_string()
                }
            }
            Command::Index(paths) => match self.session.lock().await.build_index_from_paths(paths).await {
                Ok(report) => format_index_report(&report),
                Err(e) => {
                    tracing::warn!(error = %e, "Indexing failed");
                    format!("Indexing failed: {}", e)
                }
            },
            Command::Save(path) => {
                let path = match path {
                    Some(path) => path,
                    None => new_transcript_path(&self.transcripts_dir, Utc::now()).await,
                };
                let history = self.session.lock().await.history().to_vec();
                match save_transcript(&path, &history).await {
                    Ok(()) => format!("Saved {} messages to {}", history.len(), path.display()),
                    Err(e) => {
                        tracing::warn!(error = %e, "Transcript save failed");
                        e.to_string()
                    }
                }
            }
            Command::Load(path) => match load_transcript(&path).await {
                Ok(messages) => {
                    let count = messages.len();
                    self.session.lock().await.restore(messages);
                    format!("Loaded {} messages from {}", count, path.display())
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Transcript load failed");
                    e.to_string()
                }
            },
            Command::Transcripts => match list_transcripts(&self.transcripts_dir).await {
                Ok(list) if list.is_empty() => format!("No transcripts in {}", self.transcripts_dir.display()),
                Ok(list) => list
                    .iter()
                    .map(|t| format!("  {}", t.path.display()))
                    .collect::<Vec<_>>()
                    .join("\n"),
                Err(e) => {
                    tracing::warn!(error = %e, "Transcript listing failed");
                    e.to_string()
                }
            },
            Command::Status => {
                let session = self.session.lock().await;
                format!(
                    "model: {}\npersona: {}\nstate: {:?}\nresponder: {:?}\nmessages: {}\nindexed chunks: {}",
                    session.model(),
                    session.persona(),
                    session.state(),
                    session.responder_mode(),
                    session.history().len(),
                    session.index().map(|i| i.len()).unwrap_or(0)
                )
            }
            Command::Help => HELP_TEXT.to_string(),
            Command::Quit => return Step::Quit,
            Command::Usage(usage) => format!("Usage: {}", usage),
            Command::Unknown(name) => format!("Unknown command /{}. Type /help for a list.", name),
        };
        Step::Print(output)
    }

    /// Read stdin until EOF or `/quit`.
    pub async fn run(&self) -> std::io::Result<()> {
        println!("ragchat ready. Type /help for commands, /quit to exit.\n");
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            print!("You > ");
            std::io::stdout().flush()?;

            let Some(line) = lines.next_line().await? else {
                break;
            };
            let Some(command) = parse_command(&line) else {
                continue;
            };
            match self.execute(command).await {
                Step::Print(text) => println!("{}\n", text),
                Step::Quit => {
                    tracing::info!("User exited");
                    break;
                }
            }
        }
        Ok(())
    }
}

/// One-line summary of an index build, naming any skipped files
pub fn format_index_report(report: &IndexReport) -> String {
    let mut line = format!(
        "Indexed {} chunks from {} files ({} cached).",
        report.total_chunks, report.documents_processed, report.cache_hits
    );
    if !report.skipped.is_empty() {
        let names: Vec<String> = report.skipped.iter().map(|p| p.display().to_string()).collect();
        line.push_str(&format!(
            " Skipped {} unsupported: {}",
            report.skipped.len(),
            names.join(", ")
        ));
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_text_and_blank() {
        assert_eq!(parse_command("   "), None);
        assert_eq!(parse_command(" hello there "), Some(Command::Say("hello there".into())));
    }

    #[test]
    fn test_parse_commands() {
        assert_eq!(parse_command("/model gpt-4o-mini"), Some(Command::Model("gpt-4o-mini".into())));
        assert_eq!(parse_command("/PERSONA concise"), Some(Command::Persona("concise".into())));
        assert_eq!(parse_command("/model"), Some(Command::Usage("/model <id>")));
        assert_eq!(
            parse_command("/index docs  notes.md"),
            Some(Command::Index(vec![PathBuf::from("docs"), PathBuf::from("notes.md")]))
        );
        assert_eq!(parse_command("/save"), Some(Command::Save(None)));
        assert_eq!(parse_command("/save out.json"), Some(Command::Save(Some("out.json".into()))));
        assert_eq!(parse_command("/quit"), Some(Command::Quit));
        assert_eq!(parse_command("/bogus"), Some(Command::Unknown("bogus".into())));
    }

    #[test]
    fn test_index_report_lists_skipped_files() {
        let mut report = IndexReport {
            total_chunks: 4,
            documents_processed: 2,
            cache_hits: 1,
            skipped: Vec::new(),
        };
        assert_eq!(format_index_report(&report), "Indexed 4 chunks from 2 files (1 cached).");

        report.skipped = vec![PathBuf::from("docs/image.png"), PathBuf::from("docs/slides.pptx")];
        let line = format_index_report(&report);
        assert!(line.ends_with("Skipped 2 unsupported: docs/image.png, docs/slides.pptx"));
    }
}

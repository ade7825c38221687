//! Answering ssh prompts from the terminal

use std::io::{self, BufRead, IsTerminal, Write};

use async_trait::async_trait;
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::terminal;

use gebr_comm::Authenticator;

/// Asks on stderr and reads the answer from stdin
#[derive(Debug, Default, Clone, Copy)]
pub struct TerminalAuthenticator;

#[async_trait]
impl Authenticator for TerminalAuthenticator {
    async fn ask_password(&self, title: &str, description: &str) -> Option<String> {
        let prompt = format!("{}\n{}", title, description);
        match tokio::task::spawn_blocking(move || read_password(&prompt)).await {
            Ok(Ok(password)) => password,
            Ok(Err(e)) => {
                tracing::warn!("Failed to read password: {}", e);
                None
            }
            Err(e) => {
                tracing::warn!("Password prompt aborted: {}", e);
                None
            }
        }
    }

    async fn ask_question(&self, title: &str, question: &str) -> bool {
        let prompt = format!("{}\n{} [yes/no]", title, question);
        tokio::task::spawn_blocking(move || read_answer(&prompt))
            .await
            .ok()
            .and_then(Result::ok)
            .unwrap_or(false)
    }
}

/// Read a password without echo. `None` when the user gives up.
pub fn read_password(prompt: &str) -> io::Result<Option<String>> {
    let mut stderr = io::stderr();
    write!(stderr, "{} ", prompt)?;
    stderr.flush()?;

    if !io::stdin().is_terminal() {
        return read_line().map(|line| line.filter(|l| !l.is_empty()));
    }

    terminal::enable_raw_mode()?;
    let password = read_hidden();
    terminal::disable_raw_mode()?;
    writeln!(stderr)?;
    password
}

fn read_hidden() -> io::Result<Option<String>> {
    let mut password = String::new();
    loop {
        let Event::Key(KeyEvent {
            code,
            modifiers,
            kind,
            ..
        }) = event::read()?
        else {
            continue;
        };
        if kind == KeyEventKind::Release {
            continue;
        }
        match code {
            KeyCode::Enter => return Ok(Some(password)),
            KeyCode::Esc => return Ok(None),
            KeyCode::Char('c') if modifiers.contains(KeyModifiers::CONTROL) => return Ok(None),
            KeyCode::Backspace => {
                password.pop();
            }
            KeyCode::Char(c) => password.push(c),
            _ => {}
        }
    }
}

fn read_answer(prompt: &str) -> io::Result<bool> {
    let mut stderr = io::stderr();
    write!(stderr, "{} ", prompt)?;
    stderr.flush()?;
    Ok(read_line()?.is_some_and(|line| is_yes(&line)))
}

fn read_line() -> io::Result<Option<String>> {
    let mut line = String::new();
    if io::stdin().lock().read_line(&mut line)? == 0 {
        return Ok(None);
    }
    Ok(Some(line.trim_end_matches(['\r', '\n']).to_string()))
}

fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_yes() {
        assert!(is_yes("yes"));
        assert!(is_yes(" Y "));
        assert!(!is_yes("no"));
        assert!(!is_yes(""));
        assert!(!is_yes("yesterday"));
    }
}

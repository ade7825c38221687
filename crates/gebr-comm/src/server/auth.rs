//! Password and host-key question decisions
//!
//! [`Credentials`] decides what to do with a prompt; the server applies the
//! decision. Nothing here talks to a process.

use gebr_core::traits::{ProcessControl, QuestionCache};

pub const PASSWORD_TITLE: &str = "Please, enter password";
pub const QUESTION_TITLE: &str = "Please, answer the question";
pub const NO_PASSWORD: &str = "No password provided.";
pub const HOST_KEY_REJECTED: &str = "SSH host key rejected.";

/// Passwords tried in one connection attempt: the first one, cached or
/// typed, and a single re-prompt after it fails
const MAX_PASSWORD_TRIES: u32 = 2;

pub fn password_description(address: &str, retry: bool) -> String {
    if retry {
        format!("Wrong password for machine '{}', please try again.", address)
    } else {
        format!("Machine '{}' needs SSH login.", address)
    }
}

pub fn authentication_failed(address: &str) -> String {
    format!("Authentication failed for machine '{}'.", address)
}

/// Text written to ssh for a yes/no answer
pub fn answer_text(answer: bool) -> &'static str {
    if answer {
        "yes\n"
    } else {
        "no\n"
    }
}

/// What to do with a password prompt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PasswordAction {
    Write(String),
    Ask { retry: bool },
    NoPassword,
    TooManyAttempts,
}

/// What to do with a yes/no question
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuestionAction {
    Answer(bool),
    Ask,
}

/// Session scoped password state
#[derive(Debug, Default)]
pub struct Credentials {
    password: Option<String>,
    tried_cached: bool,
    tries: u32,
}

impl Credentials {
    /// Start a new connection attempt
    pub fn reset_attempt(&mut self) {
        self.tried_cached = false;
        self.tries = 0;
    }

    pub fn has_password(&self) -> bool {
        self.password.is_some()
    }

    pub fn set_password(&mut self, password: String) {
        self.password = Some(password);
    }

    pub fn on_password_prompt(
        &mut self,
        connected: bool,
        retry: bool,
        interactive: bool,
    ) -> PasswordAction {
        if let Some(password) = &self.password {
            // Tunnels and helper processes started after login reuse it
            if connected {
                return PasswordAction::Write(password.clone());
            }
            if !retry && !self.tried_cached {
                self.tried_cached = true;
                self.tries += 1;
                return PasswordAction::Write(password.clone());
            }
        }

        if !interactive {
            return PasswordAction::NoPassword;
        }
        if self.tries >= MAX_PASSWORD_TRIES {
            return PasswordAction::TooManyAttempts;
        }
        self.tries += 1;
        PasswordAction::Ask {
            retry: retry || self.tried_cached,
        }
    }

    pub fn on_question(
        &self,
        question: &str,
        interactive: bool,
        cache: &dyn QuestionCache,
    ) -> QuestionAction {
        if let Some(answer) = cache.answer(question) {
            return QuestionAction::Answer(answer);
        }
        if interactive {
            QuestionAction::Ask
        } else {
            QuestionAction::Answer(false)
        }
    }
}

/// Who raised a prompt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Origin {
    /// Control channel negotiation
    Control,
    X11,
    /// Helper process (kill, key install, port forward)
    Aux(u64),
}

/// Prompt waiting for the user
#[derive(Debug, Clone)]
pub enum PendingRequest {
    Password {
        origin: Origin,
        description: String,
        retry: bool,
        reply: ProcessControl,
    },
    Question {
        origin: Origin,
        question: String,
        reply: ProcessControl,
    },
}

impl PendingRequest {
    pub fn origin(&self) -> Origin {
        match self {
            PendingRequest::Password { origin, .. } | PendingRequest::Question { origin, .. } => {
                *origin
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gebr_core::traits::MemoryQuestionCache;

    #[test]
    fn test_first_prompt_asks() {
        let mut creds = Credentials::default();
        assert_eq!(
            creds.on_password_prompt(false, false, true),
            PasswordAction::Ask { retry: false }
        );
    }

    #[test]
    fn test_cached_password_tried_once() {
        let mut creds = Credentials::default();
        creds.set_password("pw".into());

        assert_eq!(
            creds.on_password_prompt(false, false, true),
            PasswordAction::Write("pw".into())
        );
        // Cached one was wrong
        assert_eq!(
            creds.on_password_prompt(false, true, true),
            PasswordAction::Ask { retry: true }
        );
        // So was the typed one
        assert_eq!(
            creds.on_password_prompt(false, true, true),
            PasswordAction::TooManyAttempts
        );
    }

    #[test]
    fn test_connected_reuses_cached_password() {
        let mut creds = Credentials::default();
        creds.set_password("pw".into());
        for _ in 0..3 {
            assert_eq!(
                creds.on_password_prompt(true, true, false),
                PasswordAction::Write("pw".into())
            );
        }
    }

    #[test]
    fn test_one_reprompt_then_failure() {
        let mut creds = Credentials::default();
        assert!(matches!(creds.on_password_prompt(false, false, true), PasswordAction::Ask { .. }));
        creds.set_password("wrong".into());
        assert_eq!(
            creds.on_password_prompt(false, true, true),
            PasswordAction::Ask { retry: true }
        );
        assert_eq!(
            creds.on_password_prompt(false, true, true),
            PasswordAction::TooManyAttempts
        );

        creds.reset_attempt();
        assert_eq!(
            creds.on_password_prompt(false, false, true),
            PasswordAction::Write("wrong".into())
        );
    }

    #[test]
    fn test_non_interactive_without_password() {
        let mut creds = Credentials::default();
        assert_eq!(
            creds.on_password_prompt(false, false, false),
            PasswordAction::NoPassword
        );
    }

    #[test]
    fn test_question_cache_first() {
        let creds = Credentials::default();
        let cache = MemoryQuestionCache::with_answers([("Trust host?", true)]);

        assert_eq!(
            creds.on_question("Trust host?", false, &cache),
            QuestionAction::Answer(true)
        );
        assert_eq!(creds.on_question("Other?", true, &cache), QuestionAction::Ask);
        assert_eq!(
            creds.on_question("Other?", false, &cache),
            QuestionAction::Answer(false)
        );
    }

    #[test]
    fn test_descriptions() {
        assert_eq!(password_description("node1", false), "Machine 'node1' needs SSH login.");
        assert_eq!(
            password_description("node1", true),
            "Wrong password for machine 'node1', please try again."
        );
        assert_eq!(answer_text(true), "yes\n");
        assert_eq!(answer_text(false), "no\n");
    }
}

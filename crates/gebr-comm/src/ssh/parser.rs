//! Classifier for text printed by ssh
//!
//! ssh talks to the user through its terminal: prompts end in `:`,
//! host-key questions end in `?`, fatal banners start with `@@@`. The rules
//! below are checked in order and the first match wins. The parser performs
//! no I/O, so it can be tested against captured transcripts.

/// Default token a server prints right before its port number
pub const DEFAULT_PORT_PREFIX: &str = "GEBR_PORT=";

/// What a chunk of ssh output means
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SshEvent {
    /// The launched server reported its port
    PortDefined(u16),
    /// ssh wants a password
    PasswordPrompt(String),
    /// ssh asks a yes/no question
    Question(String),
    /// `@@@` banner, e.g. a changed host key
    FatalBanner(String),
    /// `ssh:` or `channel ` error line
    SshError(String),
    /// Informational message worth showing
    Warning(String),
    /// Noise: very short chunks and the echo of our own `yes`
    Ignored,
    /// Anything else
    Unclassified(String),
}

impl SshEvent {
    /// Message for a fatal event, as reported to the user
    pub fn failure_message(&self) -> Option<String> {
        match self {
            SshEvent::FatalBanner(text) => Some(format!("SSH error: {}", text)),
            SshEvent::SshError(text) => {
                Some(format!("SSH reported the following error: \n{}", text))
            }
            _ => None,
        }
    }
}

type Rule = fn(&SshParser, &str) -> Option<SshEvent>;

/// Rules in priority order
const RULES: &[(&str, Rule)] = &[
    ("short", rule_short),
    ("port", rule_port),
    ("digits", rule_leading_digits),
    ("password", rule_password),
    ("question", rule_question),
    ("banner", rule_banner),
    ("warning", rule_warning),
    ("echo", rule_echo),
    ("error", rule_error),
];

/// Table driven ssh output classifier
#[derive(Debug, Clone)]
pub struct SshParser {
    port_prefix: String,
}

impl Default for SshParser {
    fn default() -> Self {
        Self::new(DEFAULT_PORT_PREFIX)
    }
}

impl SshParser {
    pub fn new(port_prefix: impl Into<String>) -> Self {
        Self {
            port_prefix: port_prefix.into(),
        }
    }

    /// Classify one chunk of output, normally a single line
    pub fn classify(&self, chunk: &str) -> SshEvent {
        for (name, rule) in RULES {
            if let Some(event) = rule(self, chunk) {
                tracing::trace!("ssh output matched rule '{}': {:?}", name, event);
                return event;
            }
        }
        SshEvent::Unclassified(chunk.to_string())
    }
}

/// Normalize terminal line endings and drop the final one
fn clean(chunk: &str) -> String {
    chunk
        .replace("\r\n", "\n")
        .replace('\r', "")
        .trim_end_matches('\n')
        .to_string()
}

fn rule_short(_: &SshParser, chunk: &str) -> Option<SshEvent> {
    (chunk.len() <= 2).then_some(SshEvent::Ignored)
}

fn rule_port(parser: &SshParser, chunk: &str) -> Option<SshEvent> {
    let start = chunk.rfind(&parser.port_prefix)? + parser.port_prefix.len();
    let digits: String = chunk[start..]
        .chars()
        .take_while(char::is_ascii_digit)
        .collect();
    digits.parse().ok().map(SshEvent::PortDefined)
}

// Lines starting with a digit are left alone: their meaning without the
// port token is unclear, so they are neither prompts nor ports.
fn rule_leading_digits(_: &SshParser, chunk: &str) -> Option<SshEvent> {
    chunk
        .starts_with(|c: char| c.is_ascii_digit())
        .then(|| SshEvent::Unclassified(chunk.to_string()))
}

fn rule_password(_: &SshParser, chunk: &str) -> Option<SshEvent> {
    let text = chunk.trim_end();
    text.ends_with(':')
        .then(|| SshEvent::PasswordPrompt(text.trim_start().to_string()))
}

fn rule_question(_: &SshParser, chunk: &str) -> Option<SshEvent> {
    let text = chunk.trim_end();
    text.ends_with('?')
        .then(|| SshEvent::Question(text.trim_start().to_string()))
}

fn rule_banner(_: &SshParser, chunk: &str) -> Option<SshEvent> {
    chunk
        .starts_with("@@@")
        .then(|| SshEvent::FatalBanner(clean(chunk)))
}

// A terminal turns the trailing "." into ".\r\r\n", putting the dot fourth
// from the end
fn rule_warning(_: &SshParser, chunk: &str) -> Option<SshEvent> {
    let bytes = chunk.as_bytes();
    (bytes.len() >= 4 && bytes[bytes.len() - 4] == b'.').then(|| SshEvent::Warning(clean(chunk)))
}

fn rule_echo(_: &SshParser, chunk: &str) -> Option<SshEvent> {
    (chunk.trim_end() == "yes").then_some(SshEvent::Ignored)
}

fn rule_error(_: &SshParser, chunk: &str) -> Option<SshEvent> {
    (chunk.starts_with("ssh:") || chunk.starts_with("channel "))
        .then(|| SshEvent::SshError(clean(chunk)))
}

//! A running ssh process seen through the parser

use std::sync::Arc;

use gebr_core::traits::{ProcessControl, ProcessEvent, SpawnedProcess};

use super::parser::{SshEvent, SshParser};

/// Events of one ssh process, after classification
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// Password prompt; `retry` when this process already asked before
    Password { prompt: String, retry: bool },
    Question(String),
    Warning(String),
    /// Unrecoverable ssh failure, message ready for the user
    Fatal(String),
    Port(u16),
    /// Output with no particular meaning
    Output(String),
    Exited(Option<i32>),
}

/// An ssh (or server) process whose output is classified as it arrives
#[derive(Debug)]
pub struct SshSession {
    process: SpawnedProcess,
    parser: Arc<SshParser>,
    password_prompts: u32,
    exited: bool,
}

impl SshSession {
    pub fn new(process: SpawnedProcess, parser: Arc<SshParser>) -> Self {
        Self {
            process,
            parser,
            password_prompts: 0,
            exited: false,
        }
    }

    pub fn control(&self) -> ProcessControl {
        self.process.control.clone()
    }

    pub fn pid(&self) -> Option<u32> {
        self.process.pid
    }

    pub fn kill(&self) {
        self.process.control.kill();
    }

    /// Next meaningful event, `None` once the process is gone
    pub async fn next(&mut self) -> Option<SessionEvent> {
        if self.exited {
            return None;
        }

        loop {
            let chunk = match self.process.events.recv().await {
                Some(ProcessEvent::Output(chunk)) => chunk,
                Some(ProcessEvent::Exited(code)) => {
                    self.exited = true;
                    return Some(SessionEvent::Exited(code));
                }
                None => {
                    self.exited = true;
                    return Some(SessionEvent::Exited(None));
                }
            };

            let event = self.parser.classify(&chunk);
            if let Some(message) = event.failure_message() {
                return Some(SessionEvent::Fatal(message));
            }
            let session_event = match event {
                SshEvent::Ignored => continue,
                SshEvent::PortDefined(port) => SessionEvent::Port(port),
                SshEvent::PasswordPrompt(prompt) => {
                    let retry = self.password_prompts > 0;
                    self.password_prompts += 1;
                    SessionEvent::Password { prompt, retry }
                }
                SshEvent::Question(question) => SessionEvent::Question(question),
                SshEvent::Warning(text) => SessionEvent::Warning(text),
                SshEvent::FatalBanner(text) | SshEvent::SshError(text) => SessionEvent::Fatal(text),
                SshEvent::Unclassified(text) => SessionEvent::Output(text),
            };
            return Some(session_event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gebr_core::traits::process_channel;

    #[tokio::test]
    async fn test_second_prompt_is_retry() {
        let (spawned, io) = process_channel(None);
        let mut session = SshSession::new(spawned, Arc::new(SshParser::default()));

        io.events
            .send(ProcessEvent::Output("a@b's password: ".into()))
            .unwrap();
        io.events
            .send(ProcessEvent::Output("Permission denied, please try again.\r\n".into()))
            .unwrap();
        io.events
            .send(ProcessEvent::Output("a@b's password: ".into()))
            .unwrap();
        io.events.send(ProcessEvent::Exited(Some(255))).unwrap();

        assert!(matches!(
            session.next().await,
            Some(SessionEvent::Password { retry: false, .. })
        ));
        assert_eq!(
            session.next().await,
            Some(SessionEvent::Output("Permission denied, please try again.\r\n".to_string()))
        );
        assert!(matches!(
            session.next().await,
            Some(SessionEvent::Password { retry: true, .. })
        ));
        assert_eq!(session.next().await, Some(SessionEvent::Exited(Some(255))));
        assert_eq!(session.next().await, None);
    }

    #[tokio::test]
    async fn test_noise_is_skipped() {
        let (spawned, io) = process_channel(None);
        let mut session = SshSession::new(spawned, Arc::new(SshParser::default()));

        io.events.send(ProcessEvent::Output("\r\n".into())).unwrap();
        io.events
            .send(ProcessEvent::Output("GEBR_PORT=4000\r\n".into()))
            .unwrap();
        assert_eq!(session.next().await, Some(SessionEvent::Port(4000)));

        drop(io);
        assert_eq!(session.next().await, Some(SessionEvent::Exited(None)));
    }
}

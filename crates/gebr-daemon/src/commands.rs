//! Queue commands carried as legacy messages
//!
//! | Code | Arguments         | Reply (`RET`)             |
//! |------|-------------------|---------------------------|
//! | SUB  | queue, command    | job number                |
//! | RMQ  | queue             | (none)                    |
//! | BSY  | queue             | `1` or `0`                |
//! | NXT  | queue             | `1` or `0`                |
//! | QNM  | (none)            | comma separated names     |
//!
//! An empty queue name in `SUB` runs the job right away.

use gebr_protocol::{LegacyMessage, MessageCode};

use crate::error::DaemonError;
use crate::job::JobId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueueCommand {
    Submit { queue: String, command: String },
    Remove { queue: String },
    IsBusy { queue: String },
    HasNext { queue: String },
    Names,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueueReply {
    Submitted(JobId),
    Removed,
    Flag(bool),
    Names(String),
}

impl QueueCommand {
    /// Interpret `msg`; `Ok(None)` when its code is not a queue command
    pub fn decode(msg: &LegacyMessage) -> Result<Option<Self>, DaemonError> {
        let command = match msg.code {
            MessageCode::SUB => match msg.args.as_slice() {
                [queue, command] => QueueCommand::Submit {
                    queue: queue.clone(),
                    command: command.clone(),
                },
                _ => return Err(invalid(msg, "expected queue and command")),
            },
            MessageCode::RMQ => QueueCommand::Remove {
                queue: single_queue(msg)?,
            },
            MessageCode::BSY => QueueCommand::IsBusy {
                queue: single_queue(msg)?,
            },
            MessageCode::NXT => QueueCommand::HasNext {
                queue: single_queue(msg)?,
            },
            MessageCode::QNM => QueueCommand::Names,
            _ => return Ok(None),
        };
        Ok(Some(command))
    }

    pub fn to_message(&self) -> LegacyMessage {
        match self {
            QueueCommand::Submit { queue, command } => {
                LegacyMessage::new(MessageCode::SUB, [queue.as_str(), command.as_str()])
            }
            QueueCommand::Remove { queue } => LegacyMessage::new(MessageCode::RMQ, [queue.as_str()]),
            QueueCommand::IsBusy { queue } => LegacyMessage::new(MessageCode::BSY, [queue.as_str()]),
            QueueCommand::HasNext { queue } => LegacyMessage::new(MessageCode::NXT, [queue.as_str()]),
            QueueCommand::Names => LegacyMessage::new(MessageCode::QNM, Vec::<String>::new()),
        }
    }
}

impl QueueReply {
    pub fn to_message(&self) -> LegacyMessage {
        let args = match self {
            QueueReply::Submitted(id) => vec![id.0.to_string()],
            QueueReply::Removed => vec![],
            QueueReply::Flag(flag) => vec![if *flag { "1" } else { "0" }.to_string()],
            QueueReply::Names(names) => vec![names.clone()],
        };
        LegacyMessage::new(MessageCode::RET, args)
    }
}

fn single_queue(msg: &LegacyMessage) -> Result<String, DaemonError> {
    match msg.args.as_slice() {
        [queue] => Ok(queue.clone()),
        _ => Err(invalid(msg, "expected a queue name")),
    }
}

fn invalid(msg: &LegacyMessage, reason: &str) -> DaemonError {
    DaemonError::InvalidCommand {
        code: msg.code,
        reason: format!("{} (got {} arguments)", reason, msg.args.len()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_submit() {
        let msg = LegacyMessage::new(MessageCode::SUB, ["nightly", "make all"]);
        assert_eq!(
            QueueCommand::decode(&msg).unwrap(),
            Some(QueueCommand::Submit {
                queue: "nightly".into(),
                command: "make all".into(),
            })
        );
    }

    #[test]
    fn test_decode_immediate_submit() {
        let msg = LegacyMessage::new(MessageCode::SUB, ["", "true"]);
        match QueueCommand::decode(&msg).unwrap() {
            Some(QueueCommand::Submit { queue, .. }) => assert!(queue.is_empty()),
            other => panic!("Unexpected {:?}", other),
        }
    }

    #[test]
    fn test_decode_rejects_bad_arity() {
        let msg = LegacyMessage::new(MessageCode::BSY, Vec::<String>::new());
        assert!(matches!(
            QueueCommand::decode(&msg),
            Err(DaemonError::InvalidCommand { code, .. }) if code == MessageCode::BSY
        ));
    }

    #[test]
    fn test_other_codes_are_not_queue_commands() {
        let msg = LegacyMessage::new(MessageCode::INI, ["0.4.0", "node1"]);
        assert_eq!(QueueCommand::decode(&msg).unwrap(), None);
    }

    #[test]
    fn test_command_message_decodes_back() {
        let command = QueueCommand::HasNext { queue: "q".into() };
        assert_eq!(
            QueueCommand::decode(&command.to_message()).unwrap(),
            Some(command)
        );
    }

    #[test]
    fn test_replies() {
        assert_eq!(QueueReply::Flag(true).to_message().args, vec!["1"]);
        assert_eq!(QueueReply::Submitted(JobId(12)).to_message().args, vec!["12"]);
        assert!(QueueReply::Removed.to_message().args.is_empty());
        assert_eq!(QueueReply::Names("a,b".into()).to_message().code, MessageCode::RET);
    }
}

//! Queue command implementation

use anyhow::Result;
use tokio::sync::broadcast::error::RecvError;

use gebr_comm::ServerEvent;
use gebr_core::config::GebrConfig;
use gebr_core::types::ServerRole;
use gebr_daemon::QueueCommand;
use gebr_protocol::{Frame, LegacyMessage, MessageCode};

use super::connect::login;
use super::Session;
use crate::output::print_success;

/// Send one queue command to the worker on `host` and print its reply
pub async fn queue_command(config: &GebrConfig, host: &str, command: QueueCommand, interactive: bool) -> Result<()> {
    let session = Session::open(host, ServerRole::Worker, config.comm.clone(), interactive, false);
    let server = &session.server;

    login(server, config).await?;

    let mut events = server.subscribe();
    server.send(command.to_message())?;

    let reply = tokio::time::timeout(config.cli.connect_timeout, async {
        loop {
            match events.recv().await {
                Ok(ServerEvent::Received(Frame::Legacy(msg))) if msg.code == MessageCode::RET => {
                    return Some(msg)
                }
                Ok(_) | Err(RecvError::Lagged(_)) => {}
                Err(RecvError::Closed) => return None,
            }
        }
    })
    .await;

    let reply = match reply {
        Ok(Some(reply)) => reply,
        Ok(None) => anyhow::bail!("Connection to {} closed", server.address()),
        Err(_) => anyhow::bail!("No reply from {}", server.address()),
    };
    server.disconnect()?;

    println!("{}", describe_reply(&command, &reply));
    if let QueueCommand::Submit { .. } = command {
        print_success("Job submitted");
    }
    Ok(())
}

/// Human readable form of the reply to `command`
pub fn describe_reply(command: &QueueCommand, reply: &LegacyMessage) -> String {
    let first = reply.arg(0).unwrap_or_default();
    let flag = |name: &str| {
        if first == "1" {
            format!("{}: yes", name)
        } else {
            format!("{}: no", name)
        }
    };
    match command {
        QueueCommand::Submit { queue, .. } if queue.is_empty() => format!("job {} started", first),
        QueueCommand::Submit { queue, .. } => format!("job {} queued on '{}'", first, queue),
        QueueCommand::Remove { queue } => format!("queue '{}' removed", queue),
        QueueCommand::IsBusy { queue } => flag(&format!("'{}' busy", queue)),
        QueueCommand::HasNext { queue } => flag(&format!("'{}' has pending jobs", queue)),
        QueueCommand::Names if first.is_empty() => "no queues".to_string(),
        QueueCommand::Names => first.split(',').collect::<Vec<_>>().join("\n"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ret(args: &[&str]) -> LegacyMessage {
        LegacyMessage::new(MessageCode::RET, args.iter().copied())
    }

    #[test]
    fn test_describe_submit() {
        let queued = QueueCommand::Submit {
            queue: "nightly".into(),
            command: "make".into(),
        };
        assert_eq!(describe_reply(&queued, &ret(&["3"])), "job 3 queued on 'nightly'");

        let immediate = QueueCommand::Submit {
            queue: String::new(),
            command: "make".into(),
        };
        assert_eq!(describe_reply(&immediate, &ret(&["4"])), "job 4 started");
    }

    #[test]
    fn test_describe_flags() {
        let busy = QueueCommand::IsBusy { queue: "q".into() };
        assert_eq!(describe_reply(&busy, &ret(&["1"])), "'q' busy: yes");
        assert_eq!(describe_reply(&busy, &ret(&["0"])), "'q' busy: no");
    }

    #[test]
    fn test_describe_names() {
        assert_eq!(describe_reply(&QueueCommand::Names, &ret(&["a,b"])), "a\nb");
        assert_eq!(describe_reply(&QueueCommand::Names, &ret(&[""])), "no queues");
    }
}

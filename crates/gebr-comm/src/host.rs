//! Shells on the machine a server runs on

use gebr_core::traits::{CommandLine, HostShell};

use crate::ssh::SshCommand;

/// Runs scripts on this machine
#[derive(Debug, Clone)]
pub struct LocalShell {
    program: String,
}

impl Default for LocalShell {
    fn default() -> Self {
        Self {
            program: "bash".to_string(),
        }
    }
}

impl LocalShell {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl HostShell for LocalShell {
    fn shell(&self, script: &str) -> CommandLine {
        CommandLine::new(&self.program).arg("-c").arg(script)
    }
}

/// Runs scripts on a remote host through ssh
#[derive(Debug, Clone)]
pub struct SshShell {
    ssh: SshCommand,
    host: String,
}

impl SshShell {
    pub fn new(ssh: SshCommand, host: impl Into<String>) -> Self {
        Self {
            ssh,
            host: host.into(),
        }
    }
}

impl HostShell for SshShell {
    fn shell(&self, script: &str) -> CommandLine {
        self.ssh.run(&self.host, script)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_kill() {
        let cmd = LocalShell::default().kill_process_group("$HOME/.gebr/gebrd/$(hostname)/lock");
        assert_eq!(cmd.program, "bash");
        assert_eq!(
            cmd.args,
            vec!["-c", "kill -TERM -- -$(cat \"$HOME/.gebr/gebrd/$(hostname)/lock\")"]
        );
    }

    #[test]
    fn test_remote_kill_goes_through_ssh() {
        let shell = SshShell::new(SshCommand::new("ssh"), "node1");
        let cmd = shell.kill_process_group("/lock");
        assert_eq!(cmd.program, "ssh");
        assert_eq!(&cmd.args[..2], ["-x", "node1"]);
        assert_eq!(cmd.args[2], "kill -TERM -- -$(cat \"/lock\")");
    }
}

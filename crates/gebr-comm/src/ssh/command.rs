//! ssh command lines

use std::path::PathBuf;

use gebr_core::config::CommConfig;
use gebr_core::traits::CommandLine;

/// Builds the ssh invocations used to reach a host
#[derive(Debug, Clone)]
pub struct SshCommand {
    program: String,
    options: Vec<String>,
    identities: Vec<PathBuf>,
}

impl SshCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            options: Vec::new(),
            identities: Vec::new(),
        }
    }

    /// Program, options and the identity files that exist on disk
    pub fn from_config(config: &CommConfig) -> Self {
        Self {
            program: config.ssh_program.clone(),
            options: config.ssh_options.clone(),
            identities: config.existing_identities(),
        }
    }

    pub fn with_identity(mut self, path: impl Into<PathBuf>) -> Self {
        self.identities.push(path.into());
        self
    }

    fn base(&self) -> CommandLine {
        let mut cmd = CommandLine::new(&self.program).args(self.options.iter().cloned());
        for identity in &self.identities {
            cmd = cmd.arg("-i").arg(identity.display().to_string());
        }
        cmd
    }

    /// `ssh -x <host> <remote_command>`
    pub fn run(&self, host: &str, remote_command: &str) -> CommandLine {
        self.base().arg("-x").arg(host).arg(remote_command)
    }

    /// `ssh -x -L <local_port>:<addr>:<remote_port> <host> -N`
    pub fn local_forward(&self, host: &str, local_port: u16, addr: &str, remote_port: u16) -> CommandLine {
        self.base()
            .arg("-x")
            .arg("-L")
            .arg(format!("{}:{}:{}", local_port, addr, remote_port))
            .arg(host)
            .arg("-N")
    }

    /// `ssh -x -R <remote_port>:<addr>:<local_port> <host> -N`
    pub fn remote_forward(&self, host: &str, remote_port: u16, addr: &str, local_port: u16) -> CommandLine {
        self.base()
            .arg("-x")
            .arg("-R")
            .arg(format!("{}:{}:{}", remote_port, addr, local_port))
            .arg(host)
            .arg("-N")
    }

    /// Append `key_line` to the host's authorized keys, creating `~/.ssh`
    /// with private permissions when missing
    pub fn append_key(&self, host: &str, key_line: &str) -> CommandLine {
        let script = format!(
            "umask 077; test -d $HOME/.ssh || mkdir $HOME/.ssh ; echo \"{}\" >> $HOME/.ssh/authorized_keys",
            key_line
        );
        self.base()
            .arg(host)
            .arg("-o")
            .arg("StrictHostKeyChecking=no")
            .arg(script)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ssh() -> SshCommand {
        let mut cmd = SshCommand::new("ssh");
        cmd.options = vec!["-o".into(), "NoHostAuthenticationForLocalhost=yes".into()];
        cmd.with_identity("/home/a/.ssh/id_rsa")
    }

    #[test]
    fn test_run() {
        let cmd = ssh().run("node1", "gebrd");
        assert_eq!(
            cmd.to_string(),
            "ssh -o NoHostAuthenticationForLocalhost=yes -i /home/a/.ssh/id_rsa -x node1 gebrd"
        );
    }

    #[test]
    fn test_forwards() {
        let local = SshCommand::new("ssh").local_forward("node1", 5555, "127.0.0.1", 4000);
        assert_eq!(local.args, vec!["-x", "-L", "5555:127.0.0.1:4000", "node1", "-N"]);

        let remote = SshCommand::new("ssh").remote_forward("node1", 6010, "127.0.0.1", 5555);
        assert_eq!(remote.args, vec!["-x", "-R", "6010:127.0.0.1:5555", "node1", "-N"]);
    }

    #[test]
    fn test_append_key_script() {
        let cmd = SshCommand::new("ssh").append_key("node1", "ssh-rsa AAAA (gebr)");
        assert_eq!(&cmd.args[..3], ["node1", "-o", "StrictHostKeyChecking=no"]);
        assert!(cmd.args[3].contains("echo \"ssh-rsa AAAA (gebr)\" >> $HOME/.ssh/authorized_keys"));
        assert!(cmd.args[3].starts_with("umask 077;"));
    }
}

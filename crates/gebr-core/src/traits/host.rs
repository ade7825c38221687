//! Host execution

use super::process::CommandLine;

/// Runs shell snippets on a particular host
pub trait HostShell: Send + Sync {
    /// Command that runs `script` through the host's shell
    fn shell(&self, script: &str) -> CommandLine;

    /// Command that sends SIGTERM to the process group whose id is stored
    /// in `lock_file` on the host
    fn kill_process_group(&self, lock_file: &str) -> CommandLine {
        self.shell(&kill_group_script(lock_file))
    }
}

/// Shell snippet terminating the process group recorded in `lock_file`
pub fn kill_group_script(lock_file: &str) -> String {
    format!("kill -TERM -- -$(cat \"{}\")", lock_file)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Bash;

    impl HostShell for Bash {
        fn shell(&self, script: &str) -> CommandLine {
            CommandLine::new("bash").arg("-c").arg(script)
        }
    }

    #[test]
    fn test_kill_process_group_uses_shell() {
        let cmd = Bash.kill_process_group("/tmp/lock");
        assert_eq!(cmd.program, "bash");
        assert_eq!(cmd.args, vec!["-c", "kill -TERM -- -$(cat \"/tmp/lock\")"]);
    }
}

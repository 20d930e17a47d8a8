use provision::{CommandOutput, CommandRunner};
use std::io;
use std::process::{Command, Stdio};

/// Runs commands on this host, capturing their output
#[derive(Debug, Clone, Copy, Default)]
pub struct HostRunner;

impl CommandRunner for HostRunner {
    fn run(&self, program: &str, args: &[&str]) -> io::Result<CommandOutput> {
        log::trace!("exec: {} {}", program, args.join(" "));

        let output = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .output()?;

        let output = CommandOutput::from(output);
        if !output.success {
            log::debug!(
                "{} exited unsuccessfully: {}",
                program,
                output.stderr_str().trim()
            );
        }
        Ok(output)
    }
}

/// Whether the process runs with an effective uid of 0
pub fn is_root() -> bool {
    nix::unistd::Uid::effective().is_root()
}

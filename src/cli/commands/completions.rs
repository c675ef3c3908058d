//! Shell completions generation.

use clap::CommandFactory;
use clap_complete::Shell;

use crate::cli::args::Cli;
use crate::error::FintrackError;

const BIN_NAME: &str = "fintrack-sync";

/// Generate the completion script for `shell`.
///
/// # Errors
///
/// Returns an error if the generated script is not valid UTF-8.
pub fn completions(shell: Shell) -> Result<String, FintrackError> {
    let mut cmd = Cli::command();
    let mut buf = Vec::new();
    clap_complete::generate(shell, &mut cmd, BIN_NAME, &mut buf);
    String::from_utf8(buf)
        .map_err(|e| FintrackError::Config(format!("completion script is not UTF-8: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generates_bash_and_zsh() {
        let bash = completions(Shell::Bash).unwrap();
        assert!(bash.contains(BIN_NAME));
        assert!(bash.contains("clear-failed"));

        let zsh = completions(Shell::Zsh).unwrap();
        assert!(zsh.contains("#compdef fintrack-sync"));
    }
}

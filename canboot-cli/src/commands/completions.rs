//! Shell completion generation.

use anyhow::Result;
use clap::CommandFactory;
use clap_complete::{Shell, generate};
use std::env;
use std::io;
use std::path::Path;

use crate::{Cli, CliError};

/// Generate shell completions to stdout.
pub(crate) fn cmd_completions(shell: Option<Shell>) -> Result<()> {
    let shell = shell
        .or_else(detect_shell_type)
        .ok_or_else(|| {
            CliError::Usage(
                "Could not detect the shell; specify one, e.g.: canboot completions bash"
                    .to_string(),
            )
        })?;

    let mut cmd = Cli::command();
    let name = cmd
        .get_name()
        .to_string();
    generate(shell, &mut cmd, name, &mut io::stdout());
    Ok(())
}

/// Shell named by `$SHELL`, or PowerShell when only `PSModulePath` is set on Windows.
fn detect_shell_type() -> Option<Shell> {
    match env::var("SHELL") {
        Ok(login_shell) => shell_from_path(&login_shell),
        Err(_) if cfg!(windows) => env::var_os("PSModulePath").map(|_| Shell::PowerShell),
        Err(_) => None,
    }
}

fn shell_from_path(path: &str) -> Option<Shell> {
    match Path::new(path)
        .file_name()?
        .to_str()?
    {
        "bash" => Some(Shell::Bash),
        "zsh" => Some(Shell::Zsh),
        "fish" => Some(Shell::Fish),
        "elvish" => Some(Shell::Elvish),
        "pwsh" | "powershell" => Some(Shell::PowerShell),
        _ => None,
    }
}

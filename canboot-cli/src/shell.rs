//! Interactive bootloader shell.
//!
//! A line-oriented prompt over a single open bus:
//! - Persistent line history stored in a plain text file
//! - Tab completion of command names
//! - Ctrl-C cancels a running upload, or leaves the shell at the prompt

use {
    crate::{
        Bus, CliError, Settings, clear_interrupted_flag,
        commands::{info::print_device_info, upload},
        open_uploader,
    },
    anyhow::Result,
    canboot::{TargetId, Uploader},
    console::style,
    dialoguer::{
        Completion, Confirm, Error as DialoguerError, History, Input,
        theme::{ColorfulTheme, Theme},
    },
    log::{debug, error, info, warn},
    std::{
        collections::VecDeque,
        fmt, fs,
        io::{self, IsTerminal},
        path::{Path, PathBuf},
    },
};

const PROMPT: &str = "bootloader> ";

/// Command names offered by tab completion.
const COMMANDS: &[&str] = &[
    "setid", "erase", "write", "crc", "info", "verbose", "help", "exit", "quit",
];

/// One parsed shell line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ShellCommand {
    Empty,
    SetId(Option<String>),
    Erase,
    Write(Option<PathBuf>),
    Crc,
    Info,
    Verbose(Option<String>),
    Help,
    Exit,
    Unknown(String),
}

impl ShellCommand {
    /// Parse a trimmed input line. The first word selects the command,
    /// the rest of the line is its argument.
    pub(crate) fn parse(line: &str) -> Self {
        let line = line.trim();
        let (name, rest) = match line.split_once(char::is_whitespace) {
            Some((name, rest)) => (name, rest.trim()),
            None => (line, ""),
        };
        let arg = (!rest.is_empty()).then(|| rest.to_string());

        match name {
            "" => Self::Empty,
            "setid" => Self::SetId(arg),
            "erase" => Self::Erase,
            "write" => Self::Write(arg.map(PathBuf::from)),
            "crc" => Self::Crc,
            "info" => Self::Info,
            "verbose" => Self::Verbose(arg),
            "help" => Self::Help,
            "exit" | "quit" => Self::Exit,
            _ => Self::Unknown(line.to_string()),
        }
    }
}

/// Line history backed by a text file, most recent entry first in memory.
pub(crate) struct FileHistory {
    path: Option<PathBuf>,
    entries: VecDeque<String>,
    max_entries: usize,
}

impl FileHistory {
    /// Load history from `path`, keeping at most `max_entries` lines.
    pub(crate) fn load(path: Option<PathBuf>, max_entries: usize) -> Self {
        let mut entries = VecDeque::new();
        if let Some(ref path) = path {
            match fs::read_to_string(path) {
                Ok(content) => {
                    for line in content.lines().filter(|l| !l.trim().is_empty()) {
                        entries.push_front(line.to_string());
                    }
                    entries.truncate(max_entries);
                    debug!("Loaded {} history entries from {}", entries.len(), path.display());
                },
                Err(e) if e.kind() == io::ErrorKind::NotFound => {},
                Err(e) => warn!("Failed to read history file {}: {e}", path.display()),
            }
        }

        Self {
            path,
            entries,
            max_entries,
        }
    }

    /// Write the history back, oldest entry first.
    pub(crate) fn save(&self) -> io::Result<()> {
        let Some(ref path) = self.path else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut content = String::new();
        for entry in self.entries.iter().rev() {
            content.push_str(entry);
            content.push('\n');
        }
        fs::write(path, content)
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}

impl<T: ToString> History<T> for FileHistory {
    fn read(&self, pos: usize) -> Option<String> {
        self.entries.get(pos).cloned()
    }

    fn write(&mut self, val: &T) {
        let line = val.to_string();
        let line = line.trim();
        if line.is_empty() || self.entries.front().is_some_and(|last| last == line) {
            return;
        }
        self.entries.push_front(line.to_string());
        self.entries.truncate(self.max_entries);
    }
}

/// Completes a unique command-name prefix at the start of the line.
pub(crate) struct CommandCompletion;

impl Completion for CommandCompletion {
    fn get(&self, input: &str) -> Option<String> {
        if input.is_empty() || input.contains(char::is_whitespace) {
            return None;
        }
        let mut matches = COMMANDS.iter().filter(|c| c.starts_with(input));
        let first = matches.next()?;
        matches.next().is_none().then(|| (*first).to_string())
    }
}

/// Plain `bootloader> ` prompt without decorations.
struct PromptTheme;

impl Theme for PromptTheme {
    fn format_input_prompt(
        &self,
        f: &mut dyn fmt::Write,
        prompt: &str,
        _default: Option<&str>,
    ) -> fmt::Result {
        write!(f, "{prompt}")
    }

    fn format_input_prompt_selection(
        &self,
        f: &mut dyn fmt::Write,
        prompt: &str,
        sel: &str,
    ) -> fmt::Result {
        write!(f, "{prompt}{sel}")
    }
}

/// Whether a prompt error means the user wants out (Ctrl-C or end of input).
fn is_exit_request(err: &DialoguerError) -> bool {
    match err {
        DialoguerError::IO(io_err) => matches!(
            io_err.kind(),
            io::ErrorKind::Interrupted | io::ErrorKind::UnexpectedEof
        ),
    }
}

enum Flow {
    Continue,
    Exit,
}

struct Shell<'a> {
    uploader: Uploader<Bus>,
    settings: &'a Settings,
}

impl Shell<'_> {
    fn print_welcome(&self) {
        eprintln!("==========================================");
        eprintln!(
            "         {} v{}",
            style("BootLoader Uploader").bold(),
            env!("CARGO_PKG_VERSION")
        );
        eprintln!("==========================================");
        eprintln!("Current Node ID: {}", style(self.uploader.target()).cyan());
        eprintln!("Available commands:");
        eprintln!("  setid   - Set CAN node ID");
        eprintln!("  erase   - Erase application flash");
        eprintln!("  write   - Upload firmware file");
        eprintln!("  crc     - Check application CRC");
        eprintln!("  info    - Show device information");
        eprintln!("  verbose - Toggle frame logging (on|off)");
        eprintln!("  exit    - Quit application");
        eprintln!("==========================================");
    }

    /// Ask for one line of free text. `None` means the prompt was cancelled.
    fn ask(&self, prompt: &str) -> Result<Option<String>> {
        match Input::<String>::with_theme(&PromptTheme)
            .with_prompt(prompt)
            .allow_empty(true)
            .interact_text()
        {
            Ok(line) => Ok(Some(line.trim().to_string())),
            Err(e) if is_exit_request(&e) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn execute(&mut self, command: ShellCommand) -> Result<Flow> {
        match command {
            ShellCommand::Empty => {},
            ShellCommand::SetId(arg) => self.set_id(arg)?,
            ShellCommand::Erase => {
                self.uploader.erase();
            },
            ShellCommand::Write(path) => self.write(path)?,
            ShellCommand::Crc => {
                self.uploader.query_checksum();
            },
            ShellCommand::Info => {
                let info = self.uploader.device_info();
                print_device_info(&info);
            },
            ShellCommand::Verbose(arg) => self.verbose(arg.as_deref()),
            ShellCommand::Help => self.print_welcome(),
            ShellCommand::Exit => return Ok(Flow::Exit),
            ShellCommand::Unknown(line) => {
                error!("Unknown command: {line}");
                info!("Type 'help' for available commands");
            },
        }
        Ok(Flow::Continue)
    }

    fn set_id(&mut self, arg: Option<String>) -> Result<()> {
        let raw = match arg {
            Some(raw) => raw,
            None => match self.ask("Enter node ID (hex, e.g., 0x01): ")? {
                Some(raw) => raw,
                None => return Ok(()),
            },
        };
        if raw.is_empty() {
            return Ok(());
        }

        match raw.parse::<TargetId>() {
            Ok(target) => self.uploader.set_target(target),
            Err(e) => error!("{e}"),
        }
        Ok(())
    }

    fn write(&mut self, path: Option<PathBuf>) -> Result<()> {
        let path = match path {
            Some(path) => path,
            None => match self.ask("Enter firmware file path: ")? {
                Some(raw) if !raw.is_empty() => PathBuf::from(raw),
                _ => {
                    error!("No firmware file given");
                    return Ok(());
                },
            },
        };

        let image = match upload::load_image(&path) {
            Ok(image) => image,
            Err(e) => {
                error!("{e}");
                return Ok(());
            },
        };

        if !self.settings.assume_yes && !self.confirm_upload(&path, image.len())? {
            info!("Upload cancelled");
            return Ok(());
        }

        if let Err(e) = upload::upload_with_progress(&mut self.uploader, &image, &path, self.settings) {
            error!("{e}");
        }
        clear_interrupted_flag();
        Ok(())
    }

    fn confirm_upload(&self, path: &Path, len: usize) -> Result<bool> {
        eprintln!(
            "{} {} ({len} bytes) -> node {}",
            style("Firmware:").bold(),
            path.display(),
            self.uploader.target()
        );
        match Confirm::with_theme(&ColorfulTheme::default())
            .with_prompt("Proceed with firmware upload?")
            .default(true)
            .interact_opt()
        {
            Ok(answer) => Ok(answer.unwrap_or(false)),
            Err(e) if is_exit_request(&e) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn verbose(&self, arg: Option<&str>) {
        match arg {
            Some("on") => {
                self.uploader.set_verbose(true);
                info!("Verbose logging enabled");
            },
            Some("off") => {
                self.uploader.set_verbose(false);
                info!("Verbose logging disabled");
            },
            Some(other) => error!("Usage: verbose on|off (got '{other}')"),
            None => info!(
                "Verbose logging is {}",
                if self.uploader.state().verbose() {
                    "on"
                } else {
                    "off"
                }
            ),
        }
    }
}

/// Run the interactive shell until `exit`, Ctrl-C or end of input.
pub(crate) fn run(settings: &Settings) -> Result<()> {
    if settings.non_interactive || !(io::stdin().is_terminal() && io::stderr().is_terminal()) {
        return Err(CliError::Usage(
            "The interactive shell requires a terminal; use a subcommand such as `canboot write <FILE>`"
                .to_string(),
        )
        .into());
    }

    let uploader = open_uploader(settings)?;
    info!("CAN interface {} ready", settings.interface);

    let mut shell = Shell { uploader, settings };
    let mut history = FileHistory::load(settings.history_path.clone(), settings.history_size);
    let completion = CommandCompletion;
    shell.print_welcome();

    loop {
        let line = Input::<String>::with_theme(&PromptTheme)
            .with_prompt(PROMPT)
            .allow_empty(true)
            .history_with(&mut history)
            .completion_with(&completion)
            .interact_text();

        let line = match line {
            Ok(line) => line,
            Err(e) if is_exit_request(&e) => break,
            Err(e) => {
                let _ = history.save();
                return Err(e.into());
            },
        };
        clear_interrupted_flag();

        if let Flow::Exit = shell.execute(ShellCommand::parse(&line))? {
            break;
        }
    }

    if let Err(e) = history.save() {
        warn!("Failed to save history: {e}");
    } else {
        debug!("Saved {} history entries", history.len());
    }
    info!("Goodbye!");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple_commands() {
        assert_eq!(ShellCommand::parse("erase"), ShellCommand::Erase);
        assert_eq!(ShellCommand::parse("  crc  "), ShellCommand::Crc);
        assert_eq!(ShellCommand::parse("info"), ShellCommand::Info);
        assert_eq!(ShellCommand::parse("help"), ShellCommand::Help);
        assert_eq!(ShellCommand::parse("exit"), ShellCommand::Exit);
        assert_eq!(ShellCommand::parse("quit"), ShellCommand::Exit);
    }

    #[test]
    fn test_parse_empty_line() {
        assert_eq!(ShellCommand::parse(""), ShellCommand::Empty);
        assert_eq!(ShellCommand::parse(" \t "), ShellCommand::Empty);
    }

    #[test]
    fn test_parse_arguments() {
        assert_eq!(ShellCommand::parse("setid"), ShellCommand::SetId(None));
        assert_eq!(
            ShellCommand::parse("setid 0x0A"),
            ShellCommand::SetId(Some("0x0A".to_string()))
        );
        assert_eq!(
            ShellCommand::parse("write  build/my app.bin "),
            ShellCommand::Write(Some(PathBuf::from("build/my app.bin")))
        );
        assert_eq!(
            ShellCommand::parse("verbose off"),
            ShellCommand::Verbose(Some("off".to_string()))
        );
    }

    #[test]
    fn test_parse_unknown() {
        assert_eq!(
            ShellCommand::parse("flash now"),
            ShellCommand::Unknown("flash now".to_string())
        );
        // Commands are case sensitive
        assert_eq!(
            ShellCommand::parse("ERASE"),
            ShellCommand::Unknown("ERASE".to_string())
        );
    }

    #[test]
    fn test_completion_unique_prefix() {
        let completion = CommandCompletion;
        assert_eq!(completion.get("se"), Some("setid".to_string()));
        assert_eq!(completion.get("w"), Some("write".to_string()));
        assert_eq!(completion.get("in"), Some("info".to_string()));
        assert_eq!(completion.get("crc"), Some("crc".to_string()));
    }

    #[test]
    fn test_completion_ambiguous_or_none() {
        let completion = CommandCompletion;
        // erase / exit
        assert_eq!(completion.get("e"), None);
        assert_eq!(completion.get("x"), None);
        assert_eq!(completion.get(""), None);
        assert_eq!(completion.get("write foo"), None);
    }

    #[test]
    fn test_history_skips_empty_and_repeats() {
        let mut history = FileHistory::load(None, 10);
        History::<String>::write(&mut history, &"erase".to_string());
        History::<String>::write(&mut history, &"   ".to_string());
        History::<String>::write(&mut history, &"erase".to_string());
        History::<String>::write(&mut history, &"crc".to_string());

        assert_eq!(history.len(), 2);
        assert_eq!(History::<String>::read(&history, 0), Some("crc".to_string()));
        assert_eq!(History::<String>::read(&history, 1), Some("erase".to_string()));
        assert_eq!(History::<String>::read(&history, 2), None);
    }

    #[test]
    fn test_history_limit() {
        let mut history = FileHistory::load(None, 2);
        for cmd in ["setid 1", "erase", "crc"] {
            History::<String>::write(&mut history, &cmd.to_string());
        }
        assert_eq!(history.len(), 2);
        assert_eq!(History::<String>::read(&history, 1), Some("erase".to_string()));
    }

    #[test]
    fn test_history_round_trip_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("history");

        let mut history = FileHistory::load(Some(path.clone()), 10);
        History::<String>::write(&mut history, &"setid 0x02".to_string());
        History::<String>::write(&mut history, &"write app.bin".to_string());
        history.save().unwrap();

        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "setid 0x02\nwrite app.bin\n"
        );

        let reloaded = FileHistory::load(Some(path), 10);
        assert_eq!(reloaded.len(), 2);
        assert_eq!(
            History::<String>::read(&reloaded, 0),
            Some("write app.bin".to_string())
        );
    }
}

//! Operator command input
//!
//! Reads one command per line and forwards it to the sampler.
//! Recognized commands: `lock`, `swap`, `reset`, `export [path]`,
//! `status`, `quit`.
//!
//! Reading runs on a plain thread: a blocking stdin read cannot be
//! cancelled, and it must not hold up runtime shutdown.

use crate::domain::types::Command;
use std::io::BufRead;
use std::path::PathBuf;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Parse a single command line. Unknown input yields `None`.
pub fn parse_command(line: &str) -> Option<Command> {
    let mut parts = line.split_whitespace();
    let verb = parts.next()?.to_ascii_lowercase();
    let command = match verb.as_str() {
        "lock" | "l" => Command::ManualLock,
        "swap" | "s" => Command::ToggleAxisSwap,
        "reset" | "r" => Command::Reset,
        "export" | "e" => Command::Export(parts.next().map(PathBuf::from)),
        "status" => Command::Status,
        "quit" | "q" | "exit" => Command::Quit,
        _ => return None,
    };
    Some(command)
}

/// Read commands until EOF or until the receiver goes away. Blocking.
pub fn read_commands<R: BufRead>(reader: R, cmd_tx: mpsc::Sender<Command>) {
    info!("command_reader_started");

    for line in reader.lines() {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                warn!(error = %e, "command_read_error");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }
        let Some(command) = parse_command(&line) else {
            warn!(input = %line.trim(), "command_unknown");
            continue;
        };
        debug!(command = ?command, "command_received");
        if cmd_tx.blocking_send(command).is_err() {
            break;
        }
    }

    info!("command_reader_stopped");
}

/// Spawn a thread reading commands from stdin
pub fn spawn_stdin_reader(cmd_tx: mpsc::Sender<Command>) -> std::io::Result<()> {
    std::thread::Builder::new()
        .name("commands".to_string())
        .spawn(move || read_commands(std::io::stdin().lock(), cmd_tx))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_commands() {
        assert_eq!(parse_command("lock"), Some(Command::ManualLock));
        assert_eq!(parse_command("  SWAP "), Some(Command::ToggleAxisSwap));
        assert_eq!(parse_command("r"), Some(Command::Reset));
        assert_eq!(parse_command("status"), Some(Command::Status));
        assert_eq!(parse_command("quit"), Some(Command::Quit));
    }

    #[test]
    fn test_parse_export_with_and_without_path() {
        assert_eq!(parse_command("export"), Some(Command::Export(None)));
        assert_eq!(
            parse_command("export out/locks.csv"),
            Some(Command::Export(Some(PathBuf::from("out/locks.csv"))))
        );
    }

    #[test]
    fn test_parse_unknown() {
        assert_eq!(parse_command("dance"), None);
        assert_eq!(parse_command(""), None);
    }

    #[test]
    fn test_read_commands_skips_unknown_and_blank_lines() {
        let (tx, mut rx) = mpsc::channel(8);
        let input = "lock\n\nfly away\nexport a.csv\nquit\n";

        read_commands(std::io::Cursor::new(input), tx);

        assert_eq!(rx.try_recv().unwrap(), Command::ManualLock);
        assert_eq!(rx.try_recv().unwrap(), Command::Export(Some(PathBuf::from("a.csv"))));
        assert_eq!(rx.try_recv().unwrap(), Command::Quit);
        assert!(rx.try_recv().is_err());
    }
}

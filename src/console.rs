//! Operator console for the demo binary.
//!
//! Input lines are read on a plain OS thread and forwarded over a tokio
//! channel. A blocked read never holds up runtime shutdown: the thread is
//! detached and dies with the process.

use std::future::Future;
use std::io::BufRead;

use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::models::demo::DemoRecord;
use crate::SharedObject;

/// One line of operator input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    /// Set `TestDataString`.
    Text(String),
    /// Set `TestDataInt`.
    Int(i64),
    /// Print the local object.
    Show,
    /// Leave the operator loop.
    Quit,
}

impl ConsoleCommand {
    /// Parse one input line.
    ///
    /// # Errors
    ///
    /// Returns a printable message for unknown verbs and bad integers.
    pub fn parse(line: &str) -> std::result::Result<Self, String> {
        let line = line.trim();
        let (verb, rest) = line.split_once(' ').unwrap_or((line, ""));
        match verb {
            "text" => Ok(Self::Text(rest.to_owned())),
            "int" => rest
                .trim()
                .parse()
                .map(Self::Int)
                .map_err(|err| format!("invalid integer '{}': {err}", rest.trim())),
            "show" => Ok(Self::Show),
            "quit" | "exit" => Ok(Self::Quit),
            other => Err(format!(
                "unknown command '{other}' (text <value>, int <number>, show, quit)"
            )),
        }
    }
}

/// Why [`run_console`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleExit {
    /// The operator typed `quit`.
    Quit,
    /// Input reached end of file or failed.
    InputClosed,
    /// The shutdown future resolved first.
    Shutdown,
}

/// Forward lines from `input` over a channel from a dedicated thread.
///
/// The channel closes when the input hits end of file or a read fails.
/// Dropping the receiver stops the thread after its next line.
#[must_use]
pub fn spawn_line_reader<R>(input: R) -> mpsc::UnboundedReceiver<String>
where
    R: BufRead + Send + 'static,
{
    let (tx, rx) = mpsc::unbounded_channel();

    std::thread::spawn(move || {
        for line in input.lines() {
            match line {
                Ok(line) => {
                    if tx.send(line).is_err() {
                        break;
                    }
                }
                Err(err) => {
                    warn!(%err, "console input failed");
                    break;
                }
            }
        }
        debug!("console reader finished");
    });

    rx
}

/// Apply operator commands to `object` until quit, end of input, or
/// `shutdown` resolves.
pub async fn run_console<F>(
    lines: &mut mpsc::UnboundedReceiver<String>,
    object: &SharedObject<DemoRecord>,
    shutdown: F,
) -> ConsoleExit
where
    F: Future<Output = ()>,
{
    tokio::pin!(shutdown);

    loop {
        let line = tokio::select! {
            biased;
            () = &mut shutdown => return ConsoleExit::Shutdown,
            line = lines.recv() => line,
        };
        let Some(line) = line else {
            return ConsoleExit::InputClosed;
        };
        if line.trim().is_empty() {
            continue;
        }
        match ConsoleCommand::parse(&line) {
            Ok(ConsoleCommand::Text(value)) => {
                object.update(|record| record.test_data_string = value);
            }
            Ok(ConsoleCommand::Int(value)) => {
                object.update(|record| record.test_data_int = value);
            }
            Ok(ConsoleCommand::Show) => print_record(&object.snapshot()),
            Ok(ConsoleCommand::Quit) => return ConsoleExit::Quit,
            Err(msg) => warn!(%msg, "ignoring input"),
        }
    }
}

/// Print `record` on one line of stdout.
pub fn print_record(record: &DemoRecord) {
    println!(
        "{}: TestDataString={:?} TestDataInt={}",
        record.object_name, record.test_data_string, record.test_data_int
    );
}

use std::error::Error;
use std::fmt;

use crate::consts::LINE_MAX;

/// One console command, parsed from a single input line. LED numbers and
/// duty percentages are carried as typed by the operator; range checks
/// happen at dispatch time, against the live bank.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    On(i64),
    Off(i64),
    AllOn,
    AllOff,
    Duty(i64, i64),
    AllDuty(i64),
    Status,
    Help,
    Kill,
}

/// Everything the operator can get wrong. All of these are recoverable:
/// the message is reported back over the console and no LED state changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    EmptyLine,
    WhitespaceOnly,
    LineTooLong,
    BadLedIndex { max: usize },
    BadDutyPercent,
    Invalid,
}

impl fmt::Display for CommandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyLine => write!(f, "ERROR: Empty line received!"),
            Self::WhitespaceOnly => write!(f, "ERROR: Line is only whitespace!"),
            Self::LineTooLong => write!(f, "ERROR: Line longer than {LINE_MAX} characters!"),
            Self::BadLedIndex { max } => {
                write!(f, "ERROR: Specified LED must be integer from 1 to {max}")
            }
            Self::BadDutyPercent => {
                write!(f, "ERROR: Duty percentage must be integer within [0,100]")
            }
            Self::Invalid => write!(
                f,
                "ERROR: Invalid line sent. Check your command and parameter values. \
                 Make sure there are no extra characters."
            ),
        }
    }
}

impl Error for CommandError {}

/// Splits a line into whitespace-delimited words and matches it against
/// the command table. Every command requires an exact word count; extra
/// trailing words invalidate it. `kill` is the exception and matches on
/// its verb alone.
pub fn parse(line: &str) -> Result<Command, CommandError> {
    if line.is_empty() {
        return Err(CommandError::EmptyLine);
    }
    let mut words = line.split_whitespace();
    let Some(verb) = words.next() else {
        return Err(CommandError::WhitespaceOnly);
    };
    let args: Vec<&str> = words.collect();

    let command = match (verb, args.as_slice()) {
        ("on", [n]) => Command::On(int(n)?),
        ("off", [n]) => Command::Off(int(n)?),
        ("allon", []) => Command::AllOn,
        ("alloff", []) => Command::AllOff,
        ("duty", [n, p]) => Command::Duty(int(n)?, int(p)?),
        ("allduty", [p]) => Command::AllDuty(int(p)?),
        ("status", []) => Command::Status,
        ("help", []) => Command::Help,
        ("kill", _) => Command::Kill,
        _ => return Err(CommandError::Invalid),
    };
    Ok(command)
}

fn int(word: &str) -> Result<i64, CommandError> {
    word.parse().map_err(|_| CommandError::Invalid)
}

use bytes::{Buf, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::watch;
use tokio::time::sleep;
use tracing::{error, info};

use crate::command::{self, Command, CommandError};
use crate::consts::{LINE_MAX, LOOP_PACE};
use crate::led::LedBank;
use crate::pwm::PwmOutput;

/// Why the dispatch loop ended. `Kill` covers the kill command, a closed
/// transport and an external shutdown request; all of them exit cleanly.
/// `SafetyFault` means a logically-off channel was caught producing a
/// signal and the process must report failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopExit {
    Kill,
    SafetyFault,
}

enum Flow {
    Continue,
    Kill,
}

const BANNER: &str = "\n*****************************\
                      \nSerial interface initialized!\
                      \n*****************************\n\n";

const PROMPT: &str = "\n**************************************\
                      \nEnter command ('help' to view manual):\n";

/// Processes console commands one line at a time until the operator kills
/// the program or an off-state verification fails. Each iteration handles
/// exactly one line to completion, then re-checks every channel against
/// its live hardware duty before the next line is accepted.
pub async fn run<R, W, P>(
    mut reader: R,
    mut writer: W,
    mut bank: LedBank<P>,
    mut shutdown: watch::Receiver<bool>,
) -> LoopExit
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
    P: PwmOutput,
{
    report(&mut writer, BANNER).await;
    report_status(&mut writer, &bank).await;
    report(&mut writer, &help_text(bank.len())).await;

    let mut lines = LineReader::new();
    loop {
        report(&mut writer, PROMPT).await;

        let line = tokio::select! {
            line = lines.next_line(&mut reader) => line,
            _ = shutdown.changed() => {
                info!("shutdown requested, deactivating all LEDs");
                bank.all_off();
                return LoopExit::Kill;
            }
        };
        let Some(line) = line else {
            info!("command transport closed, deactivating all LEDs");
            bank.all_off();
            return LoopExit::Kill;
        };

        match execute(&mut writer, &mut bank, line).await {
            Ok(Flow::Continue) => {}
            Ok(Flow::Kill) => {
                report(&mut writer, "Deactivating LEDs and killing program...\n").await;
                bank.all_off();
                report(&mut writer, "\n\n**************PROGRAM TERMINATED**************\n").await;
                return LoopExit::Kill;
            }
            Err(error) => report(&mut writer, &format!("{error}\n")).await,
        }

        // every iteration ends by proving that "off" still means a dead
        // output, no matter which command just ran
        if let Err(fault) = bank.verify_off_outputs() {
            error!("off-state verification failed: {fault}");
            report(&mut writer, &format!("FATAL ERROR: {fault} Disconnect power!\n")).await;
            bank.all_off();
            return LoopExit::SafetyFault;
        }

        sleep(LOOP_PACE).await;
    }
}

async fn execute<W, P>(
    writer: &mut W,
    bank: &mut LedBank<P>,
    line: Result<String, CommandError>,
) -> Result<Flow, CommandError>
where
    W: AsyncWrite + Unpin,
    P: PwmOutput,
{
    let line = line?;
    let parsed = command::parse(&line);
    if !matches!(parsed, Err(CommandError::EmptyLine | CommandError::WhitespaceOnly)) {
        report(writer, &format!("\nLine received: {line}\n\n")).await;
    }

    match parsed? {
        Command::On(number) => {
            let index = valid_led(number, bank.len())?;
            report(writer, &format!("Turning on LED {number}...\n")).await;
            bank.channel_mut(index).turn_on();
        }
        Command::Off(number) => {
            let index = valid_led(number, bank.len())?;
            report(writer, &format!("Turning off LED {number}...\n")).await;
            bank.channel_mut(index).turn_off();
        }
        Command::AllOn => {
            report(writer, "Turning on all LEDs...\n").await;
            bank.all_on();
        }
        Command::AllOff => {
            report(writer, "Turning off all LEDs...\n").await;
            bank.all_off();
        }
        Command::Duty(number, percent) => {
            let index = valid_led(number, bank.len())?;
            let duty = valid_duty(percent)?;
            report(writer, &format!("Setting LED {number} to {percent}%\n")).await;
            bank.channel_mut(index).set_duty(duty);
        }
        Command::AllDuty(percent) => {
            let duty = valid_duty(percent)?;
            report(writer, &format!("Setting all LEDs to {percent}%\n")).await;
            bank.set_all_duty(duty);
        }
        Command::Status => report_status(writer, bank).await,
        Command::Help => report(writer, &help_text(bank.len())).await,
        Command::Kill => return Ok(Flow::Kill),
    }
    Ok(Flow::Continue)
}

fn valid_led(number: i64, led_count: usize) -> Result<usize, CommandError> {
    if number < 1 || number > led_count as i64 {
        return Err(CommandError::BadLedIndex { max: led_count });
    }
    Ok(number as usize - 1)
}

fn valid_duty(percent: i64) -> Result<f64, CommandError> {
    if !(0..=100).contains(&percent) {
        return Err(CommandError::BadDutyPercent);
    }
    Ok(percent as f64 / 100.0)
}

async fn report<W: AsyncWrite + Unpin>(writer: &mut W, text: &str) {
    if let Err(error) = writer.write_all(text.as_bytes()).await {
        error!("failed to write to command transport: {error}");
    }
}

async fn report_status<W, P>(writer: &mut W, bank: &LedBank<P>)
where
    W: AsyncWrite + Unpin,
    P: PwmOutput,
{
    let mut text = String::from("\nLED status:\n\n");
    for (number, led) in bank.iter().enumerate().map(|(i, led)| (i + 1, led)) {
        let live = match led.get_api_duty() {
            Ok(duty) => format!("{}%", duty * 100.0),
            Err(error) => {
                error!("duty readback failed for {}: {error}", led.label());
                String::from("unreadable")
            }
        };
        text.push_str(&format!(
            "* LED{number} ({}): set_duty = {}%, current_duty = {}, {}\n",
            led.label(),
            led.get_duty() * 100.0,
            live,
            if led.is_on() { "ON" } else { "OFF" },
        ));
    }
    report(writer, &text).await;
}

fn help_text(led_count: usize) -> String {
    format!(
        "\nList of commands:\n\n\
         on # -> Turns LED # on (e.g. on 1)\n\
         off # -> Turns LED # off (e.g. off 2)\n\
         allon -> Turns all LEDs on\n\
         alloff -> Turns all LEDs off\n\n\
         duty # % -> Sets LED # duty cycle to % (0 to 100) (e.g. duty 1 50)\n\
         allduty % -> Sets all LED duty cycles to % (0 to 100) (e.g. allduty 25)\n\n\
         status -> Prints LED status\n\
         help -> Prints help menu\n\n\
         kill -> Turns off all LEDs and ends the program\n\
         \nNotes:\n\
         - All command parameters must be entered as integers (no decimals)\n\
         - LEDs are numbered 1 to {led_count}\n\
         - Duty percentages are numbered 0 to 100\n\
         - Command lines with extra words/characters are invalid\n\n"
    )
}

/// Accumulates transport bytes and hands out newline-terminated lines,
/// adapted to a bounded line length: once a line outgrows `LINE_MAX` it is
/// reported and its remaining bytes are dropped through the terminator.
struct LineReader {
    buffer: BytesMut,
    discarding: bool,
}

impl LineReader {
    fn new() -> Self {
        Self {
            buffer: BytesMut::new(),
            discarding: false,
        }
    }

    /// Next complete line from the transport, with the terminator and any
    /// trailing carriage return stripped. `None` means the transport is
    /// gone; a partial line at that point is dropped.
    async fn next_line<R: AsyncRead + Unpin>(
        &mut self,
        reader: &mut R,
    ) -> Option<Result<String, CommandError>> {
        loop {
            if let Some(line) = self.take_line() {
                return Some(line);
            }
            let mut chunk = [0u8; 256];
            match reader.read(&mut chunk).await {
                Ok(0) => return None,
                Ok(n) => self.buffer.extend_from_slice(&chunk[..n]),
                Err(error) => {
                    error!("transport read failed: {error}");
                    return None;
                }
            }
        }
    }

    fn take_line(&mut self) -> Option<Result<String, CommandError>> {
        loop {
            let terminator = self.buffer.iter().position(|&b| b == b'\n');
            if self.discarding {
                match terminator {
                    Some(end) => {
                        // tail of an already-reported oversized line
                        self.buffer.advance(end + 1);
                        self.discarding = false;
                        continue;
                    }
                    None => {
                        self.buffer.clear();
                        return None;
                    }
                }
            }
            return match terminator {
                Some(end) => {
                    let mut line = self.buffer.split_to(end + 1);
                    line.truncate(line.len() - 1);
                    if line.last() == Some(&b'\r') {
                        line.truncate(line.len() - 1);
                    }
                    if line.len() > LINE_MAX {
                        return Some(Err(CommandError::LineTooLong));
                    }
                    match std::str::from_utf8(&line) {
                        Ok(text) => Some(Ok(text.to_string())),
                        Err(_) => Some(Err(CommandError::Invalid)),
                    }
                }
                None if self.buffer.len() > LINE_MAX => {
                    self.buffer.clear();
                    self.discarding = true;
                    Some(Err(CommandError::LineTooLong))
                }
                None => None,
            };
        }
    }
}

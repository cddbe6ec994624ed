use std::error::Error;
use std::process::ExitCode;

use tokio::sync::watch;
use tokio_serial::{DataBits, Parity, SerialPortBuilderExt, StopBits};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

mod command;
mod consts;
mod dispatcher;
mod led;
mod pwm;

use crate::dispatcher::LoopExit;
use crate::led::{LedBank, LedChannel};
use crate::pwm::HardwarePwm;

#[tokio::main]
async fn main() -> Result<ExitCode, Box<dyn Error + Send + Sync>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let mut channels = Vec::with_capacity(consts::LED_CHANNELS.len());
    for &(channel, label) in consts::LED_CHANNELS {
        let out = HardwarePwm::open(channel, consts::LED_PWM_FREQUENCY)?;
        channels.push(LedChannel::new(out, label, consts::LED_PWM_FREQUENCY)?);
    }
    let bank = LedBank::new(channels);
    info!("initialized {} LED channels", bank.len());

    let serial = tokio_serial::new(consts::SERIAL_DEVICE, consts::SERIAL_BAUD)
        .data_bits(DataBits::Eight)
        .parity(Parity::None)
        .stop_bits(StopBits::One)
        .open_native_async()?;
    info!("listening on {} at {} baud", consts::SERIAL_DEVICE, consts::SERIAL_BAUD);
    let (reader, writer) = tokio::io::split(serial);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    {
        let shutdown_tx = shutdown_tx.clone();
        tokio::spawn(async move {
            if let Err(error) = tokio::signal::ctrl_c().await {
                error!("failed to install Ctrl+C handler: {error}");
                return;
            }
            let _ = shutdown_tx.send(true);
        });
    }

    match dispatcher::run(reader, writer, bank, shutdown_rx).await {
        LoopExit::Kill => Ok(ExitCode::SUCCESS),
        LoopExit::SafetyFault => Ok(ExitCode::FAILURE),
    }
}

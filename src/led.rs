use std::error::Error;
use std::fmt;

use tracing::error;

use crate::consts::DUTY_EPSILON;
use crate::pwm::PwmOutput;

/// One PWM-driven LED and the software's belief about it. The output is
/// only ever energized while `on` is set; a logically-off channel must
/// read back a zero duty from the hardware.
///
/// Owns its output exclusively. Not cloneable: two channels driving one
/// physical output would defeat the state tracking.
pub struct LedChannel<P: PwmOutput> {
    out: P,
    duty: f64,
    on: bool,
    label: String,
}

impl<P: PwmOutput> LedChannel<P> {
    /// Configures the output and forces it low before handing it over.
    pub fn new(
        mut out: P,
        label: impl Into<String>,
        frequency_hz: f64,
    ) -> Result<Self, Box<dyn Error + Send + Sync>> {
        out.configure(frequency_hz)?;
        out.write(0.0)?;
        Ok(Self {
            out,
            duty: 0.0,
            on: false,
            label: label.into(),
        })
    }

    /// Energizes the output at the cached duty. Skips the hardware write
    /// when already on to avoid a redundant signal glitch.
    pub fn turn_on(&mut self) {
        if !self.on {
            self.apply(self.duty);
        }
        self.on = true;
    }

    /// De-energizes the output. The zero write is issued even when the
    /// channel already believes it is off.
    pub fn turn_off(&mut self) {
        self.on = false;
        self.apply(0.0);
    }

    /// Caches a new duty, clamped to [0.0, 1.0]. Applied to the hardware
    /// immediately only while on; otherwise it takes effect at the next
    /// `turn_on`.
    pub fn set_duty(&mut self, duty: f64) {
        self.duty = duty.clamp(0.0, 1.0);
        if self.on {
            self.apply(self.duty);
        }
    }

    /// Last commanded duty, as cached in software.
    pub fn get_duty(&self) -> f64 {
        self.duty
    }

    /// Duty the peripheral is actually generating. Can disagree with
    /// `get_duty` if the driver misbehaves.
    pub fn get_api_duty(&self) -> Result<f64, Box<dyn Error + Send + Sync>> {
        self.out.read()
    }

    pub fn is_on(&self) -> bool {
        self.on
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    fn apply(&mut self, duty: f64) {
        if let Err(error) = self.out.write(duty) {
            error!("failed to write duty cycle for {}: {error}", self.label);
        }
    }
}

impl<P: PwmOutput> Drop for LedChannel<P> {
    fn drop(&mut self) {
        // never release the output while it is energized
        self.turn_off();
    }
}

/// Raised by the off-state verification when a logically-off channel is
/// still producing a signal, or when its live duty cannot be read at all.
#[derive(Debug)]
pub enum OutputFault {
    Stuck { label: String, duty: f64 },
    ReadFailed { label: String, error: Box<dyn Error + Send + Sync> },
}

impl fmt::Display for OutputFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stuck { label, duty } => {
                write!(f, "LED {label} not turned off successfully (live duty {duty}).")
            }
            Self::ReadFailed { label, error } => {
                write!(f, "LED {label} duty readback failed ({error}).")
            }
        }
    }
}

impl Error for OutputFault {}

/// Fixed set of LED channels, built once at startup and never resized.
/// Console commands address channels 1..=N in construction order.
pub struct LedBank<P: PwmOutput> {
    channels: Vec<LedChannel<P>>,
}

impl<P: PwmOutput> LedBank<P> {
    pub fn new(channels: Vec<LedChannel<P>>) -> Self {
        Self { channels }
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &LedChannel<P>> {
        self.channels.iter()
    }

    /// Zero-based access; callers validate console indices first.
    pub fn channel_mut(&mut self, index: usize) -> &mut LedChannel<P> {
        &mut self.channels[index]
    }

    pub fn all_on(&mut self) {
        for led in &mut self.channels {
            led.turn_on();
        }
    }

    pub fn all_off(&mut self) {
        for led in &mut self.channels {
            led.turn_off();
        }
    }

    pub fn set_all_duty(&mut self, duty: f64) {
        for led in &mut self.channels {
            led.set_duty(duty);
        }
    }

    /// Confirms every logically-off channel reads back a zero duty from
    /// the hardware. A readback failure counts as a fault: the invariant
    /// cannot be shown to hold.
    pub fn verify_off_outputs(&self) -> Result<(), OutputFault> {
        for led in &self.channels {
            if led.is_on() {
                continue;
            }
            match led.get_api_duty() {
                Ok(duty) if duty.abs() <= DUTY_EPSILON => {}
                Ok(duty) => {
                    return Err(OutputFault::Stuck {
                        label: led.label().to_string(),
                        duty,
                    })
                }
                Err(error) => {
                    return Err(OutputFault::ReadFailed {
                        label: led.label().to_string(),
                        error,
                    })
                }
            }
        }
        Ok(())
    }
}

use std::error::Error;

use rppal::pwm;
use tracing::debug;

/// Restricted capability over one hardware PWM output: set the base
/// frequency, write a normalized duty value, read back the duty the
/// peripheral is actually generating.
pub trait PwmOutput {
    fn configure(&mut self, frequency_hz: f64) -> Result<(), Box<dyn Error + Send + Sync>>;
    fn write(&mut self, duty: f64) -> Result<(), Box<dyn Error + Send + Sync>>;
    fn read(&self) -> Result<f64, Box<dyn Error + Send + Sync>>;
}

/// Sysfs hardware PWM channel. Software PWM on a plain GPIO pin is not
/// supported: it has no duty readback, which the off-state verification
/// needs.
pub struct HardwarePwm {
    pwm: pwm::Pwm,
}

impl HardwarePwm {
    pub fn open(channel: pwm::Channel, frequency_hz: f64) -> Result<Self, Box<dyn Error + Send + Sync>> {
        let pwm = pwm::Pwm::with_frequency(channel, frequency_hz, 0.0, pwm::Polarity::Normal, true)?;
        debug!("opened {channel:?} at {frequency_hz} Hz");
        Ok(Self { pwm })
    }
}

impl PwmOutput for HardwarePwm {
    fn configure(&mut self, frequency_hz: f64) -> Result<(), Box<dyn Error + Send + Sync>> {
        let duty = self.pwm.duty_cycle()?;
        self.pwm.set_frequency(frequency_hz, duty)?;
        Ok(())
    }

    fn write(&mut self, duty: f64) -> Result<(), Box<dyn Error + Send + Sync>> {
        self.pwm.set_duty_cycle(duty)?;
        Ok(())
    }

    fn read(&self) -> Result<f64, Box<dyn Error + Send + Sync>> {
        Ok(self.pwm.duty_cycle()?)
    }
}

#[cfg(test)]
pub mod mock {
    use std::error::Error;
    use std::sync::{Arc, Mutex};

    use super::PwmOutput;

    #[derive(Debug, Default)]
    pub struct MockState {
        pub duty: f64,
        pub frequency: f64,
        pub writes: usize,
        pub fail_reads: bool,
    }

    /// Host-side stand-in for a hardware channel. State is shared with the
    /// test so duty and write counts stay observable after the channel has
    /// been moved into a bank, and so a stuck output can be simulated by
    /// poking `duty` directly.
    pub struct MockPwm {
        state: Arc<Mutex<MockState>>,
    }

    impl MockPwm {
        pub fn new() -> (Self, Arc<Mutex<MockState>>) {
            let state = Arc::new(Mutex::new(MockState::default()));
            (Self { state: Arc::clone(&state) }, state)
        }
    }

    impl PwmOutput for MockPwm {
        fn configure(&mut self, frequency_hz: f64) -> Result<(), Box<dyn Error + Send + Sync>> {
            self.state.lock().unwrap().frequency = frequency_hz;
            Ok(())
        }

        fn write(&mut self, duty: f64) -> Result<(), Box<dyn Error + Send + Sync>> {
            let mut state = self.state.lock().unwrap();
            state.writes += 1;
            state.duty = duty;
            Ok(())
        }

        fn read(&self) -> Result<f64, Box<dyn Error + Send + Sync>> {
            let state = self.state.lock().unwrap();
            if state.fail_reads {
                return Err("duty readback unavailable".into());
            }
            Ok(state.duty)
        }
    }
}

use std::time::Duration;

use rppal::pwm::Channel;

// Serial console: 8-bit data, no parity, one command per newline-terminated
// line (no carriage return required).
pub const SERIAL_DEVICE: &str = "/dev/ttyAMA0";
pub const SERIAL_BAUD: u32 = 9600;

pub const LED_PWM_FREQUENCY: f64 = 50.0; // Hz

// LEDs are numbered 1..=N on the console in the order listed here.
#[cfg(not(feature = "pi5_hardware"))]
pub const LED_CHANNELS: &[(Channel, &str)] = &[
    (Channel::Pwm0, "PWM0/GPIO18"),
    (Channel::Pwm1, "PWM1/GPIO19"),
];

#[cfg(feature = "pi5_hardware")]
pub const LED_CHANNELS: &[(Channel, &str)] = &[
    (Channel::Pwm0, "PWM0/GPIO12"),
    (Channel::Pwm1, "PWM1/GPIO13"),
    (Channel::Pwm2, "PWM2/GPIO18"),
    (Channel::Pwm3, "PWM3/GPIO19"),
];

/// Longest accepted command line, terminator excluded.
pub const LINE_MAX: usize = 127;

/// Delay between dispatch iterations.
pub const LOOP_PACE: Duration = Duration::from_millis(100);

/// Tolerance for the off-state duty readback check. The sysfs interface
/// stores the duty as integer nanoseconds, so anything above this is a
/// real signal rather than rounding noise.
pub const DUTY_EPSILON: f64 = 1e-6;

// actuator.rs

use embedded_hal::digital::{OutputPin, PinState};

use crate::*;

/// The line goes high while the soil is drier than the threshold.
pub fn should_water(moisture: u16, threshold: u16) -> bool {
    moisture < threshold
}

/// Single digital output (pump relay or "needs water" LED).
pub struct Actuator<P> {
    pin: P,
    level: bool,
}

impl<P: OutputPin> Actuator<P> {
    pub fn new(pin: P) -> Self {
        Actuator { pin, level: false }
    }

    pub fn apply(&mut self, moisture: u16, threshold: u16) -> anyhow::Result<bool> {
        let high = should_water(moisture, threshold);
        self.set(high)?;
        if high {
            info!("Moisture level {moisture} is low (< {threshold})");
        } else {
            info!("Moisture level {moisture} is sufficient");
        }
        Ok(high)
    }

    /// Drive the line to its safe, low state.
    pub fn release(&mut self) -> anyhow::Result<()> {
        self.set(false)
    }

    pub fn is_high(&self) -> bool {
        self.level
    }

    fn set(&mut self, high: bool) -> anyhow::Result<()> {
        self.pin
            .set_state(PinState::from(high))
            .map_err(|e| anyhow::anyhow!("GPIO write failed: {e:?}"))?;
        self.level = high;
        Ok(())
    }
}


// EOF

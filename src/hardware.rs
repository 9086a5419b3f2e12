// hardware.rs

use embedded_hal::digital::OutputPin;
use linux_embedded_hal::{
    gpio_cdev::{Chip, LineRequestFlags},
    CdevPin, Delay, I2cdev,
};

use crate::*;

const GPIO_CONSUMER: &str = "plantmon";

/// Every device the monitor touches. Built once at startup and lent to
/// each cycle by `&mut`, so capture and sensing never overlap.
pub struct HardwareContext<C, S, P>
where
    C: Camera,
    S: SoilSensor,
    P: OutputPin,
{
    pub camera: C,
    pub sensor: S,
    pub actuator: Actuator<P>,
    released: bool,
}

impl<C, S, P> HardwareContext<C, S, P>
where
    C: Camera,
    S: SoilSensor,
    P: OutputPin,
{
    pub fn new(mut camera: C, sensor: S, pin: P) -> anyhow::Result<Self> {
        let mut actuator = Actuator::new(pin);
        actuator.release()?;
        camera.start()?;
        Ok(HardwareContext {
            camera,
            sensor,
            actuator,
            released: false,
        })
    }

    /// Output line low, camera stopped. Safe to call more than once.
    pub fn release(&mut self) {
        if self.released {
            return;
        }
        if let Err(e) = self.actuator.release() {
            error!("Cannot reset output line: {e:#}");
        }
        self.camera.stop();
        self.released = true;
        info!("Hardware released.");
    }

    pub fn is_released(&self) -> bool {
        self.released
    }
}

impl<C, S, P> Drop for HardwareContext<C, S, P>
where
    C: Camera,
    S: SoilSensor,
    P: OutputPin,
{
    fn drop(&mut self) {
        self.release();
    }
}

pub type LinuxHardware = HardwareContext<StillCamera, Seesaw<I2cdev, Delay>, CdevPin>;

/// Open the real devices named in the config.
pub fn open_linux(config: &MyConfig) -> anyhow::Result<LinuxHardware> {
    let mut chip = Chip::new(&config.gpio_chip)
        .with_context(|| format!("cannot open {}", config.gpio_chip.display()))?;
    let handle = chip
        .get_line(config.gpio_line)?
        .request(LineRequestFlags::OUTPUT, 0, GPIO_CONSUMER)
        .with_context(|| format!("cannot request GPIO line {}", config.gpio_line))?;
    let pin = CdevPin::new(handle)?;
    info!(
        "GPIO line {} on {} ready",
        config.gpio_line,
        config.gpio_chip.display()
    );

    let i2c = I2cdev::new(&config.i2c_bus)
        .with_context(|| format!("cannot open {}", config.i2c_bus.display()))?;
    let mut sensor = Seesaw::new(i2c, Delay, config.sensor_addr);
    match sensor.begin() {
        Ok(id) => info!(
            "Soil sensor {id:#04x} found at {:#04x} on {}",
            config.sensor_addr,
            config.i2c_bus.display()
        ),
        Err(e) => bail!(
            "no soil sensor at {:#04x} on {}: {e:?}",
            config.sensor_addr,
            config.i2c_bus.display()
        ),
    }

    let camera = StillCamera::new(config.camera_cmd.clone());
    HardwareContext::new(camera, sensor, pin)
}


// EOF

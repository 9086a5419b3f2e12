// measure.rs

use embedded_hal::{delay::DelayNs, i2c::I2c};

const STATUS_BASE: u8 = 0x00;
const STATUS_HW_ID: u8 = 0x01;
const STATUS_TEMP: u8 = 0x04;
const STATUS_SWRST: u8 = 0x7f;

const TOUCH_BASE: u8 = 0x0f;
const TOUCH_CHANNEL_OFFSET: u8 = 0x10;

const HW_ID_SAMD09: u8 = 0x55;
// ATtiny817/807/816/806
const HW_ID_ATTINY8X7: core::ops::RangeInclusive<u8> = 0x84..=0x89;

const CONVERSION_DELAY_US: u32 = 5_000;
const RESET_DELAY_MS: u32 = 500;
const MOISTURE_MAX: u16 = 4095;
const MOISTURE_RETRIES: usize = 3;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SensorReading {
    pub moisture: u16,
    pub temperature: f32,
}

pub trait SoilSensor {
    fn read(&mut self) -> anyhow::Result<SensorReading>;
}

// Besides bus errors, the seesaw can answer with the wrong chip id
// or keep returning out-of-range capacitance values.
#[derive(Debug)]
pub enum MeasurementError<E> {
    I2c(E),
    UnknownHardware(u8),
    InvalidMoisture(u16),
}

impl<E> From<E> for MeasurementError<E> {
    fn from(value: E) -> Self {
        MeasurementError::I2c(value)
    }
}

/// Adafruit seesaw capacitive soil sensor.
pub struct Seesaw<I2C, D> {
    i2c: I2C,
    delay: D,
    addr: u8,
}

impl<I2C, D> Seesaw<I2C, D>
where
    I2C: I2c,
    D: DelayNs,
{
    pub fn new(i2c: I2C, delay: D, addr: u8) -> Self {
        Seesaw { i2c, delay, addr }
    }

    /// Software reset, then check that a seesaw chip answers.
    pub fn begin(&mut self) -> Result<u8, MeasurementError<I2C::Error>> {
        self.i2c
            .write(self.addr, &[STATUS_BASE, STATUS_SWRST, 0xff])?;
        self.delay.delay_ms(RESET_DELAY_MS);

        let mut id = [0u8; 1];
        self.read_register(STATUS_BASE, STATUS_HW_ID, &mut id, CONVERSION_DELAY_US)?;
        match id[0] {
            HW_ID_SAMD09 => Ok(id[0]),
            x if HW_ID_ATTINY8X7.contains(&x) => Ok(x),
            x => Err(MeasurementError::UnknownHardware(x)),
        }
    }

    pub fn moisture(&mut self) -> Result<u16, MeasurementError<I2C::Error>> {
        let mut value = self.moisture_once()?;
        let mut retries = 0;
        while value > MOISTURE_MAX {
            if retries == MOISTURE_RETRIES {
                return Err(MeasurementError::InvalidMoisture(value));
            }
            retries += 1;
            value = self.moisture_once()?;
        }
        Ok(value)
    }

    pub fn temperature(&mut self) -> Result<f32, MeasurementError<I2C::Error>> {
        let mut buf = [0u8; 4];
        self.read_register(STATUS_BASE, STATUS_TEMP, &mut buf, CONVERSION_DELAY_US)?;
        buf[0] &= 0x3f;
        Ok(u32::from_be_bytes(buf) as f32 / 65536.0)
    }

    pub fn release(self) -> I2C {
        self.i2c
    }

    fn moisture_once(&mut self) -> Result<u16, I2C::Error> {
        let mut buf = [0u8; 2];
        self.read_register(TOUCH_BASE, TOUCH_CHANNEL_OFFSET, &mut buf, CONVERSION_DELAY_US)?;
        self.delay.delay_ms(1);
        Ok(u16::from_be_bytes(buf))
    }

    fn read_register(
        &mut self,
        base: u8,
        reg: u8,
        buf: &mut [u8],
        delay_us: u32,
    ) -> Result<(), I2C::Error> {
        self.i2c.write(self.addr, &[base, reg])?;
        self.delay.delay_us(delay_us);
        self.i2c.read(self.addr, buf)
    }
}

impl<I2C, D> SoilSensor for Seesaw<I2C, D>
where
    I2C: I2c,
    D: DelayNs,
{
    fn read(&mut self) -> anyhow::Result<SensorReading> {
        let moisture = self
            .moisture()
            .map_err(|e| anyhow::anyhow!("moisture read failed: {e:?}"))?;
        let temperature = self
            .temperature()
            .map_err(|e| anyhow::anyhow!("temperature read failed: {e:?}"))?;
        Ok(SensorReading {
            moisture,
            temperature,
        })
    }
}


// EOF

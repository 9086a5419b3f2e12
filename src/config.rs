// config.rs

use std::{convert::Infallible, fmt, str::FromStr};

use clap::Parser;

use crate::*;

pub const DEFAULT_MQTT_PORT: u16 = 8883;
pub const DEFAULT_THING_NAME: &str = "PlantMonitor";
pub const DEFAULT_CLIENT_ID: &str = "PlantHealthPublisher";

const DEFAULT_API_PORT: u16 = 3000;
const DEFAULT_API_URL: &str = "https://plant.id/api/v3/health_assessment";
const DEFAULT_API_TIMEOUT: u64 = 60;
const DEFAULT_POLL_DELAY: u64 = 10;
const DEFAULT_SHADOW_TIMEOUT: u64 = 5;

pub const DEFAULT_THRESHOLD: u16 = 300;
pub const DEFAULT_GPIO_LINE: u32 = 17;

/// Plant.id API key. Never shows up in logs or the config endpoint.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiKey(String);

impl ApiKey {
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl FromStr for ApiKey {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(ApiKey(s.to_string()))
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiKey(<redacted>)")
    }
}

impl Serialize for ApiKey {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str("<redacted>")
    }
}

fn default_api_port() -> u16 {
    option_env!("API_PORT")
        .unwrap_or("-")
        .parse()
        .unwrap_or(DEFAULT_API_PORT)
}

fn default_api_url() -> String {
    option_env!("PLANT_ID_API_URL")
        .unwrap_or(DEFAULT_API_URL)
        .into()
}

fn parse_i2c_addr(s: &str) -> Result<u8, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u8::from_str_radix(hex, 16),
        None => s.parse(),
    };
    match parsed {
        Ok(a) if a <= 0x7f => Ok(a),
        Ok(a) => Err(format!("{a:#x} is not a 7-bit I2C address")),
        Err(e) => Err(format!("cannot parse I2C address {s:?}: {e}")),
    }
}

#[derive(Clone, Debug, Parser, Serialize)]
#[command(
    name = "plantmon",
    about = "Plant health monitor: camera diagnosis, soil sensing and AWS IoT shadow reporting",
    version,
    args_override_self = true
)]
pub struct MyConfig {
    /// AWS IoT device data endpoint
    #[arg(short, long)]
    pub endpoint: String,

    /// Root CA file path
    #[arg(short = 'r', long = "rootCA")]
    pub root_ca: PathBuf,

    /// Certificate file path
    #[arg(short, long)]
    pub cert: PathBuf,

    /// Private key file path
    #[arg(short, long)]
    pub key: PathBuf,

    /// MQTT port
    #[arg(short, long, default_value_t = DEFAULT_MQTT_PORT)]
    pub port: u16,

    /// Targeted thing name
    #[arg(short = 'n', long = "thingName", default_value = DEFAULT_THING_NAME)]
    pub thing_name: String,

    /// MQTT client id
    #[arg(short = 'i', long = "clientId", visible_alias = "id", default_value = DEFAULT_CLIENT_ID)]
    pub client_id: String,

    /// Plant.id API key
    #[arg(long, env = "PLANT_ID_API_KEY", hide_env_values = true)]
    pub api_key: ApiKey,

    /// Plant.id health assessment endpoint
    #[arg(long, env = "PLANT_ID_API_URL", default_value_t = default_api_url())]
    pub api_url: String,

    /// Classification request timeout in seconds
    #[arg(long, default_value_t = DEFAULT_API_TIMEOUT)]
    pub api_timeout: u64,

    /// Seconds to sleep between monitoring cycles
    #[arg(long, default_value_t = DEFAULT_POLL_DELAY)]
    pub delay: u64,

    /// Moisture level below which the output line is driven high
    #[arg(long, default_value_t = DEFAULT_THRESHOLD)]
    pub threshold: u16,

    /// I2C bus device of the soil sensor
    #[arg(long, default_value = "/dev/i2c-1")]
    pub i2c_bus: PathBuf,

    /// Soil sensor I2C address
    #[arg(long, default_value = "0x36", value_parser = parse_i2c_addr)]
    pub sensor_addr: u8,

    /// GPIO chip device of the output line
    #[arg(long, default_value = "/dev/gpiochip0")]
    pub gpio_chip: PathBuf,

    /// Output line offset on the GPIO chip
    #[arg(long, default_value_t = DEFAULT_GPIO_LINE)]
    pub gpio_line: u32,

    /// Where each captured image is written
    #[arg(long, default_value = "captured_image.jpg")]
    pub image_path: PathBuf,

    /// Still capture command
    #[arg(long, default_value = "rpicam-still")]
    pub camera_cmd: String,

    /// Status API listen port
    #[arg(long, default_value_t = default_api_port())]
    pub api_port: u16,

    /// Seconds to wait for a shadow update response
    #[arg(long, default_value_t = DEFAULT_SHADOW_TIMEOUT)]
    pub shadow_timeout: u64,
}

impl MyConfig {
    pub fn poll_delay(&self) -> Duration {
        Duration::from_secs(self.delay)
    }

    pub fn api_timeout(&self) -> Duration {
        Duration::from_secs(self.api_timeout)
    }

    pub fn shadow_timeout(&self) -> Duration {
        Duration::from_secs(self.shadow_timeout)
    }
}


// EOF

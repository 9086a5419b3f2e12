// lib.rs

pub use std::{
    net,
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

pub use anyhow::{bail, Context};
pub use log::*;
pub use serde::{Deserialize, Serialize};
pub use tokio::{
    sync::RwLock,
    time::{sleep, Duration},
};

mod config;
pub use config::*;

mod state;
pub use state::*;

mod camera;
pub use camera::*;

mod classify;
pub use classify::*;

mod measure;
pub use measure::*;

mod actuator;
pub use actuator::*;

mod hardware;
pub use hardware::*;

mod shadow;
pub use shadow::*;

mod mqtt;
pub use mqtt::*;

mod monitor;
pub use monitor::*;

mod apiserver;
pub use apiserver::*;

pub const FW_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Latest observations, as served by the status API.
#[derive(Clone, Debug, Default, Serialize)]
pub struct PlantData {
    pub timestamp: i64,
    pub last_update: String,
    pub cycles: u64,
    pub disease: Option<String>,
    pub probability: Option<f64>,
    pub moisture: Option<u16>,
    pub temperature: Option<f32>,
    pub watering: bool,
}

impl PlantData {
    pub fn new() -> Self {
        PlantData {
            last_update: "-".to_string(),
            ..Default::default()
        }
    }

    pub fn record_diagnosis(&mut self, diagnosis: &DiagnosisResult) {
        self.disease = Some(diagnosis.name.clone());
        self.probability = Some(diagnosis.probability);
        self.touch();
    }

    pub fn record_reading(&mut self, reading: &SensorReading, watering: bool) {
        self.moisture = Some(reading.moisture);
        self.temperature = Some(reading.temperature);
        self.watering = watering;
        self.touch();
    }

    fn touch(&mut self) {
        let now = chrono::Local::now();
        self.timestamp = now.timestamp();
        self.last_update = now.format("%Y-%m-%d %H:%M:%S %Z").to_string();
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct Uptime {
    pub uptime: u64,
    pub uptime_s: String,
}

impl Uptime {
    pub fn from_secs(secs: u64) -> Self {
        let (d, rem) = (secs / 86400, secs % 86400);
        let (h, m, s) = (rem / 3600, (rem % 3600) / 60, rem % 60);
        Uptime {
            uptime: secs,
            uptime_s: format!("{d}d {h:02}h {m:02}m {s:02}s"),
        }
    }
}


// EOF

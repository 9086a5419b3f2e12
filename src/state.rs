// state.rs

use std::time::Instant;

use crate::*;

pub struct MyState {
    pub config: MyConfig,
    pub started: Instant,
    pub api_cnt: AtomicU64,
    pub mqtt_up: RwLock<bool>,
    pub data: RwLock<PlantData>,
}

impl MyState {
    pub fn new(config: MyConfig) -> Self {
        MyState {
            config,
            started: Instant::now(),
            api_cnt: AtomicU64::new(0),
            mqtt_up: RwLock::new(false),
            data: RwLock::new(PlantData::new()),
        }
    }

    pub fn uptime(&self) -> Uptime {
        Uptime::from_secs(self.started.elapsed().as_secs())
    }
}

// EOF

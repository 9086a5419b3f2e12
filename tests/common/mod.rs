// tests/common/mod.rs
#![allow(dead_code)]

use std::{
    collections::VecDeque,
    convert::Infallible,
    sync::{atomic::AtomicBool, Mutex},
};

use clap::Parser;
use embedded_hal::digital::{ErrorType, OutputPin};
use plantmon::*;

pub fn test_config(extra: &[&str]) -> MyConfig {
    let mut args = vec![
        "plantmon",
        "-e",
        "example-ats.iot.eu-west-1.amazonaws.com",
        "-r",
        "root-CA.crt",
        "-c",
        "plant.cert.pem",
        "-k",
        "plant.private.key",
        "--api-key",
        "test-key",
    ];
    args.extend_from_slice(extra);
    MyConfig::try_parse_from(args).unwrap()
}

pub fn scratch_file(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!("plantmon-it-{}-{name}", std::process::id()))
}

/// Writes fixed bytes as the "photo", or fails on demand.
pub struct FakeCamera {
    pub image: Option<Vec<u8>>,
    pub running: Arc<AtomicBool>,
    pub captures: Arc<AtomicU64>,
}

impl FakeCamera {
    pub fn new(image: Option<&[u8]>) -> Self {
        FakeCamera {
            image: image.map(|b| b.to_vec()),
            running: Arc::new(AtomicBool::new(false)),
            captures: Arc::new(AtomicU64::new(0)),
        }
    }
}

impl Camera for FakeCamera {
    fn start(&mut self) -> anyhow::Result<()> {
        self.running.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn capture(&mut self, path: &Path) -> anyhow::Result<()> {
        self.captures.fetch_add(1, Ordering::SeqCst);
        match &self.image {
            Some(b) => Ok(std::fs::write(path, b)?),
            None => bail!("camera timed out"),
        }
    }

    fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

/// Replays scripted readings; `None` entries are bus failures.
pub struct FakeSensor {
    pub readings: VecDeque<Option<SensorReading>>,
}

impl FakeSensor {
    pub fn always(moisture: u16, temperature: f32) -> Self {
        FakeSensor {
            readings: VecDeque::from(vec![
                Some(SensorReading {
                    moisture,
                    temperature
                });
                64
            ]),
        }
    }
}

impl SoilSensor for FakeSensor {
    fn read(&mut self) -> anyhow::Result<SensorReading> {
        match self.readings.pop_front().flatten() {
            Some(r) => Ok(r),
            None => bail!("i2c nack"),
        }
    }
}

#[derive(Clone, Default)]
pub struct FakeLine {
    pub high: Arc<AtomicBool>,
    pub history: Arc<Mutex<Vec<bool>>>,
}

impl ErrorType for FakeLine {
    type Error = Infallible;
}

impl OutputPin for FakeLine {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        self.high.store(false, Ordering::SeqCst);
        self.history.lock().unwrap().push(false);
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        self.high.store(true, Ordering::SeqCst);
        self.history.lock().unwrap().push(true);
        Ok(())
    }
}

pub enum Verdict {
    Diagnose(DiagnosisResult),
    Empty,
}

pub struct FakeClassifier {
    pub verdict: Verdict,
    pub calls: Arc<AtomicU64>,
}

impl FakeClassifier {
    pub fn diagnosing(name: &str, probability: f64) -> Self {
        FakeClassifier {
            verdict: Verdict::Diagnose(DiagnosisResult {
                name: name.into(),
                probability,
            }),
            calls: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn failing() -> Self {
        FakeClassifier {
            verdict: Verdict::Empty,
            calls: Arc::new(AtomicU64::new(0)),
        }
    }
}

impl Classifier for FakeClassifier {
    async fn assess(&self, image: &EncodedImage) -> Result<DiagnosisResult, ClassifyError> {
        assert!(!image.is_empty());
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.verdict {
            Verdict::Diagnose(d) => Ok(d.clone()),
            Verdict::Empty => Err(ClassifyError::NoSuggestions),
        }
    }
}

#[derive(Clone, Default)]
pub struct RecordingReporter {
    pub docs: Arc<Mutex<Vec<ShadowDocument>>>,
}

impl ShadowReporter for RecordingReporter {
    async fn report(&self, doc: ShadowDocument) -> anyhow::Result<()> {
        self.docs.lock().unwrap().push(doc);
        Ok(())
    }
}

// EOF

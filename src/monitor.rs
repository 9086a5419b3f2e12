// monitor.rs

use std::future::Future;

use embedded_hal::digital::OutputPin;

use crate::*;

#[derive(Clone, Debug)]
pub struct MonitorSettings {
    pub image_path: PathBuf,
    pub threshold: u16,
    pub delay: Duration,
}

impl From<&MyConfig> for MonitorSettings {
    fn from(config: &MyConfig) -> Self {
        MonitorSettings {
            image_path: config.image_path.clone(),
            threshold: config.threshold,
            delay: config.poll_delay(),
        }
    }
}

/// What one pass through the pipeline produced.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CycleReport {
    pub captured: bool,
    pub diagnosis: Option<DiagnosisResult>,
    pub reading: Option<SensorReading>,
    pub watering: Option<bool>,
}

/// The capture → classify → report → sense → actuate → report loop.
pub struct Monitor<C, S, P, K, R>
where
    C: Camera,
    S: SoilSensor,
    P: OutputPin,
    K: Classifier,
    R: ShadowReporter,
{
    hw: HardwareContext<C, S, P>,
    classifier: K,
    reporter: R,
    state: Arc<MyState>,
    settings: MonitorSettings,
}

impl<C, S, P, K, R> Monitor<C, S, P, K, R>
where
    C: Camera,
    S: SoilSensor,
    P: OutputPin,
    K: Classifier,
    R: ShadowReporter,
{
    pub fn new(
        hw: HardwareContext<C, S, P>,
        classifier: K,
        reporter: R,
        state: Arc<MyState>,
        settings: MonitorSettings,
    ) -> Self {
        Monitor {
            hw,
            classifier,
            reporter,
            state,
            settings,
        }
    }

    pub fn hardware(&self) -> &HardwareContext<C, S, P> {
        &self.hw
    }

    /// Cycle until `shutdown` resolves, then put the hardware in its safe state.
    pub async fn run<F>(&mut self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        info!(
            "Entering monitor loop, threshold {} every {:?}",
            self.settings.threshold, self.settings.delay
        );

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    warn!("Monitor interrupted.");
                    break;
                }
                _ = self.cycle() => {}
            }
        }
        self.hw.release();
    }

    async fn cycle(&mut self) {
        self.run_once().await;
        sleep(self.settings.delay).await;
    }

    pub async fn run_once(&mut self) -> CycleReport {
        let mut report = CycleReport::default();

        if let Some(image) = acquire_image(&mut self.hw.camera, &self.settings.image_path).await {
            report.captured = true;
            report.diagnosis = self.diagnose(&image).await;
        } else {
            warn!("No image this cycle, skipping diagnosis.");
        }

        match self.hw.sensor.read() {
            Ok(reading) => {
                info!(
                    "Moisture {} temperature {:.1}C",
                    reading.moisture, reading.temperature
                );
                report.reading = Some(reading);
                report.watering = self.actuate(&reading).await;
                self.publish(ShadowDocument::sensors(&reading)).await;
            }
            Err(e) => error!("Sensor read failed: {e:#}"),
        }

        self.state.data.write().await.cycles += 1;
        report
    }

    async fn diagnose(&mut self, image: &EncodedImage) -> Option<DiagnosisResult> {
        match self.classifier.assess(image).await {
            Ok(diagnosis) => {
                info!(
                    "Most likely disease: {} ({})",
                    diagnosis.name, diagnosis.probability
                );
                self.state.data.write().await.record_diagnosis(&diagnosis);
                self.publish(ShadowDocument::disease(&diagnosis)).await;
                Some(diagnosis)
            }
            Err(e) => {
                error!("Health assessment failed: {e}");
                None
            }
        }
    }

    async fn actuate(&mut self, reading: &SensorReading) -> Option<bool> {
        let watering = match self
            .hw
            .actuator
            .apply(reading.moisture, self.settings.threshold)
        {
            Ok(w) => Some(w),
            Err(e) => {
                error!("Actuation failed: {e:#}");
                None
            }
        };
        self.state
            .data
            .write()
            .await
            .record_reading(reading, self.hw.actuator.is_high());
        watering
    }

    async fn publish(&self, doc: ShadowDocument) {
        if let Err(e) = self.reporter.report(doc).await {
            error!("Shadow update not sent: {e:#}");
        }
    }
}

// EOF

// camera.rs

use std::process::Stdio;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use tokio::process::Command;

use crate::*;

/// Base64 text of one captured image.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EncodedImage(String);

impl EncodedImage {
    pub fn encode(raw: &[u8]) -> Self {
        EncodedImage(STANDARD.encode(raw))
    }

    pub fn decode(&self) -> anyhow::Result<Vec<u8>> {
        Ok(STANDARD.decode(&self.0)?)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[allow(async_fn_in_trait)]
pub trait Camera {
    fn start(&mut self) -> anyhow::Result<()>;
    async fn capture(&mut self, path: &Path) -> anyhow::Result<()>;
    fn stop(&mut self);
    fn is_running(&self) -> bool;
}

/// Still camera driven through the libcamera `rpicam-still` tool.
pub struct StillCamera {
    cmd: String,
    running: bool,
}

impl StillCamera {
    pub fn new<S: Into<String>>(cmd: S) -> Self {
        StillCamera {
            cmd: cmd.into(),
            running: false,
        }
    }
}

impl Camera for StillCamera {
    fn start(&mut self) -> anyhow::Result<()> {
        let out = std::process::Command::new(&self.cmd)
            .arg("--list-cameras")
            .stdin(Stdio::null())
            .output()
            .with_context(|| format!("cannot run {}", self.cmd))?;

        // the tool prints the camera list to stderr on some releases
        let listing = format!(
            "{}{}",
            String::from_utf8_lossy(&out.stdout),
            String::from_utf8_lossy(&out.stderr)
        );
        if !out.status.success() || listing.contains("No cameras available") {
            bail!("no camera detected by {}", self.cmd);
        }

        info!("Camera started.");
        self.running = true;
        Ok(())
    }

    async fn capture(&mut self, path: &Path) -> anyhow::Result<()> {
        if !self.running {
            bail!("camera is not started");
        }

        let out = Command::new(&self.cmd)
            .args(["--nopreview", "--immediate", "-o"])
            .arg(path)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .with_context(|| format!("cannot run {}", self.cmd))?;

        if !out.status.success() {
            bail!(
                "{} exited with {}: {}",
                self.cmd,
                out.status,
                String::from_utf8_lossy(&out.stderr).trim()
            );
        }
        Ok(())
    }

    fn stop(&mut self) {
        if self.running {
            info!("Camera stopped.");
        }
        self.running = false;
    }

    fn is_running(&self) -> bool {
        self.running
    }
}

/// Capture one still into `path`, read it back and Base64-encode it.
/// Failures are logged and come back as `None`.
pub async fn acquire_image<C: Camera>(camera: &mut C, path: &Path) -> Option<EncodedImage> {
    if let Err(e) = camera.capture(path).await {
        error!("Image capture failed: {e:#}");
        return None;
    }
    info!("Image saved to {}", path.display());

    let raw = match std::fs::read(path) {
        Ok(b) if b.is_empty() => {
            error!("Captured image {} is empty", path.display());
            return None;
        }
        Ok(b) => b,
        Err(e) => {
            error!("Cannot read captured image {}: {e}", path.display());
            return None;
        }
    };

    let img = EncodedImage::encode(&raw);
    info!(
        "Image encoded to Base64 ({} -> {} bytes)",
        raw.len(),
        img.len()
    );
    Some(img)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FileCamera {
        bytes: Option<Vec<u8>>,
    }

    impl Camera for FileCamera {
        fn start(&mut self) -> anyhow::Result<()> {
            Ok(())
        }
        async fn capture(&mut self, path: &Path) -> anyhow::Result<()> {
            match &self.bytes {
                Some(b) => Ok(std::fs::write(path, b)?),
                None => bail!("sensor timeout"),
            }
        }
        fn stop(&mut self) {}
        fn is_running(&self) -> bool {
            true
        }
    }

    fn scratch(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("plantmon-{}-{name}", std::process::id()))
    }

    #[test]
    fn base64_round_trip() {
        let raw: Vec<u8> = (0..=255u8).chain([0xff, 0xd8, 0xff, 0xe0]).collect();
        let img = EncodedImage::encode(&raw);
        assert_eq!(img.decode().unwrap(), raw);
        assert_eq!(EncodedImage::encode(b"leaf").as_str(), "bGVhZg==");
    }

    #[tokio::test]
    async fn acquire_encodes_captured_file() {
        let path = scratch("ok.jpg");
        let mut cam = FileCamera {
            bytes: Some(b"\xff\xd8jpeg".to_vec()),
        };
        let img = acquire_image(&mut cam, &path).await.unwrap();
        assert_eq!(img.decode().unwrap(), b"\xff\xd8jpeg");
        std::fs::remove_file(path).ok();
    }

    #[tokio::test]
    async fn acquire_reports_capture_failure_as_none() {
        let path = scratch("fail.jpg");
        let mut cam = FileCamera { bytes: None };
        assert!(acquire_image(&mut cam, &path).await.is_none());
    }

    #[tokio::test]
    async fn acquire_rejects_empty_capture() {
        let path = scratch("empty.jpg");
        let mut cam = FileCamera {
            bytes: Some(Vec::new()),
        };
        assert!(acquire_image(&mut cam, &path).await.is_none());
        std::fs::remove_file(path).ok();
    }

    #[tokio::test]
    async fn still_camera_refuses_capture_before_start() {
        let mut cam = StillCamera::new("rpicam-still");
        assert!(!cam.is_running());
        assert!(cam.capture(&scratch("never.jpg")).await.is_err());
    }
}

// EOF

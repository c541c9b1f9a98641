use image::RgbImage;
use std::path::PathBuf;
use std::process::Command;
use tokio::runtime::{Handle, RuntimeFlavor};

use crate::camera::VideoSource;
use crate::error::{CaptureError, CaptureResult};

/// Raspberry Pi camera via the `rpicam-still` (or legacy `raspistill`) tools.
pub struct LibcameraSource {
    width: u32,
    height: u32,
    snapshot_path: PathBuf,
    tool: Option<&'static str>,
}

impl LibcameraSource {
    pub fn new(width: u32, height: u32) -> Self {
        let tool = Self::detect_tool();
        match tool {
            Some(tool) => log::info!("Raspberry Pi camera available via {}", tool),
            None => log::warn!("Neither rpicam-still nor raspistill found, camera will report not ready"),
        }
        Self {
            width,
            height,
            snapshot_path: std::env::temp_dir().join("fortune_cam_snapshot.jpg"),
            tool,
        }
    }

    fn detect_tool() -> Option<&'static str> {
        off_runtime(|| {
            if Command::new("rpicam-still").arg("--help").output().is_ok() {
                Some("rpicam-still")
            } else if Command::new("raspistill").arg("-?").output().is_ok() {
                Some("raspistill")
            } else {
                None
            }
        })
    }

    pub fn is_available(&self) -> bool {
        self.tool.is_some()
    }

    fn snapshot_args(&self, tool: &str) -> Vec<String> {
        let path = self.snapshot_path.to_string_lossy().into_owned();
        let (width, height) = (self.width.to_string(), self.height.to_string());
        match tool {
            "raspistill" => vec![
                "-o".into(), path,
                "-w".into(), width,
                "-h".into(), height,
                "-t".into(), "100".into(),
                "-n".into(),
            ],
            _ => vec![
                "-o".into(), path,
                "--width".into(), width,
                "--height".into(), height,
                "--immediate".into(),
                "--nopreview".into(),
                "--timeout".into(), "100".into(),
            ],
        }
    }
}

impl VideoSource for LibcameraSource {
    fn name(&self) -> &str {
        self.tool.unwrap_or("libcamera (unavailable)")
    }

    fn natural_size(&self) -> (u32, u32) {
        if self.is_available() {
            (self.width, self.height)
        } else {
            (0, 0)
        }
    }

    fn grab_frame(&mut self) -> CaptureResult<RgbImage> {
        let tool = self.tool.ok_or(CaptureError::DeviceNotReady)?;

        if self.snapshot_path.exists() {
            let _ = std::fs::remove_file(&self.snapshot_path);
        }

        let args = self.snapshot_args(tool);
        log::debug!("Snapshot command: {} {}", tool, args.join(" "));
        let output = off_runtime(|| Command::new(tool).args(&args).output())
            .map_err(|e| CaptureError::Device(format!("{} failed to start: {}", tool, e)))?;

        if !output.status.success() {
            log::warn!("{} stderr: {}", tool, String::from_utf8_lossy(&output.stderr));
            return Err(CaptureError::Device(format!("{} exited with {}", tool, output.status)));
        }

        let frame = image::open(&self.snapshot_path)
            .map_err(|e| CaptureError::Device(format!("failed to load snapshot: {}", e)))?
            .to_rgb8();
        let _ = std::fs::remove_file(&self.snapshot_path);

        log::debug!("Snapshot captured: {}x{}", frame.width(), frame.height());
        Ok(frame)
    }
}

/// Run a blocking child process without stalling the other tasks on a
/// multi-thread runtime worker.
fn off_runtime<T>(f: impl FnOnce() -> T) -> T {
    match Handle::try_current() {
        Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => {
            tokio::task::block_in_place(f)
        }
        _ => f(),
    }
}

impl Drop for LibcameraSource {
    fn drop(&mut self) {
        if self.snapshot_path.exists() {
            let _ = std::fs::remove_file(&self.snapshot_path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rpicam_args_carry_size() {
        let source = LibcameraSource {
            width: 1280,
            height: 720,
            snapshot_path: PathBuf::from("/tmp/snap.jpg"),
            tool: Some("rpicam-still"),
        };
        let args = source.snapshot_args("rpicam-still");
        assert!(args.windows(2).any(|w| w[0] == "--width" && w[1] == "1280"));
        assert!(args.windows(2).any(|w| w[0] == "--height" && w[1] == "720"));
        assert_eq!(source.natural_size(), (1280, 720));
    }

    #[test]
    fn test_off_runtime_without_runtime() {
        assert_eq!(off_runtime(|| 7), 7);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_off_runtime_lets_other_tasks_progress() {
        let (tx, rx) = std::sync::mpsc::channel();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            let _ = tx.send("tick");
        });
        // Blocks this thread until a task on another worker has run
        let got = off_runtime(|| rx.recv_timeout(std::time::Duration::from_secs(5)));
        assert_eq!(got, Ok("tick"));
    }

    #[test]
    fn test_unavailable_camera_is_not_ready() {
        let mut source = LibcameraSource {
            width: 1280,
            height: 720,
            snapshot_path: PathBuf::from("/tmp/snap.jpg"),
            tool: None,
        };
        assert_eq!(source.natural_size(), (0, 0));
        assert!(matches!(source.grab_frame(), Err(CaptureError::DeviceNotReady)));
    }
}

//! [`CaptureBridge`] – HTTP frame ingestion plus a blocking consumer call.
//!
//! ```rust,no_run
//! use sensorbridge_runtime::{CaptureBridge, CaptureConfig};
//!
//! let mut bridge = CaptureBridge::start(CaptureConfig::default()).unwrap();
//! let (pixels, metadata) = bridge.get_next_image();
//! println!("{:?} {}", pixels.shape(), metadata["capture_epoch"]);
//! bridge.stop().unwrap();
//! ```

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use sensorbridge_hal::{ImageDecoder, RasterDecoder};
use sensorbridge_middleware::LatestSlot;
use sensorbridge_server::capture::{self, CaptureState, DEFAULT_MAX_BODY_BYTES};
use sensorbridge_server::{DEFAULT_CAPTURE_PORT, DEFAULT_SHUTDOWN_TIMEOUT, ServerHandle, http};
use sensorbridge_types::{BridgeError, CapturedFrame, IntensityGrid, Metadata};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureConfig {
    pub addr: SocketAddr,
    pub max_body_bytes: usize,
    pub shutdown_timeout: Duration,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from((Ipv4Addr::UNSPECIFIED, DEFAULT_CAPTURE_PORT)),
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
        }
    }
}

/// Consumer side of the frame slot.
///
/// Frames are handed out at most once.  Any number of receivers may exist,
/// but each frame goes to exactly one of them.
#[derive(Clone)]
pub struct FrameReceiver {
    frames: Arc<LatestSlot<CapturedFrame>>,
}

impl FrameReceiver {
    /// Block until a frame is published, then return it reduced to one
    /// channel.  Waits forever if no frame ever arrives; use
    /// [`recv_timeout`](Self::recv_timeout) where that matters.
    pub fn recv(&self) -> (IntensityGrid, Metadata) {
        reduce(self.frames.take_blocking())
    }

    /// Like [`recv`](Self::recv) but gives up after `timeout`.
    pub fn recv_timeout(&self, timeout: Duration) -> Option<(IntensityGrid, Metadata)> {
        self.frames.take_timeout(timeout).map(reduce)
    }

    /// Take a pending frame without waiting.
    pub fn try_recv(&self) -> Option<(IntensityGrid, Metadata)> {
        self.frames.try_take().map(reduce)
    }
}

fn reduce(frame: CapturedFrame) -> (IntensityGrid, Metadata) {
    debug!(frame_id = %frame.id, "frame handed to consumer");
    frame.into_reduced()
}

/// Running capture bridge.  Stops its server on [`stop`](Self::stop) or drop.
pub struct CaptureBridge {
    receiver: FrameReceiver,
    server: ServerHandle,
    shutdown_timeout: Duration,
}

impl CaptureBridge {
    /// Start with the default `image`-crate decoder.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Bind`] if the address is unavailable.
    pub fn start(config: CaptureConfig) -> Result<Self, BridgeError> {
        Self::start_with_decoder(config, Arc::new(RasterDecoder::new()))
    }

    pub fn start_with_decoder(
        config: CaptureConfig,
        decoder: Arc<dyn ImageDecoder>,
    ) -> Result<Self, BridgeError> {
        let frames = Arc::new(LatestSlot::new());
        let state = CaptureState::new(Arc::clone(&frames), decoder)
            .with_max_body_bytes(config.max_body_bytes);
        let server = http::spawn("capture", config.addr, capture::router(state))?;
        Ok(Self {
            receiver: FrameReceiver { frames },
            server,
            shutdown_timeout: config.shutdown_timeout,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.server.local_addr()
    }

    /// A receiver that can be moved to a consumer thread.
    pub fn receiver(&self) -> FrameReceiver {
        self.receiver.clone()
    }

    /// Block until the next frame arrives; see [`FrameReceiver::recv`].
    pub fn get_next_image(&self) -> (IntensityGrid, Metadata) {
        self.receiver.recv()
    }

    pub fn get_next_image_timeout(&self, timeout: Duration) -> Option<(IntensityGrid, Metadata)> {
        self.receiver.recv_timeout(timeout)
    }

    /// Stop accepting uploads, finish in-flight ones, release the socket.
    ///
    /// A frame already published stays available to receivers.
    pub fn stop(&mut self) -> Result<(), BridgeError> {
        self.server.stop(self.shutdown_timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
    use sensorbridge_types::{CAPTURE_EPOCH_KEY, now_epoch};
    use std::io::Cursor;
    use std::thread;

    fn local_config() -> CaptureConfig {
        CaptureConfig {
            addr: SocketAddr::from((Ipv4Addr::LOCALHOST, 0)),
            shutdown_timeout: Duration::from_secs(2),
            ..CaptureConfig::default()
        }
    }

    fn png(w: u32, h: u32, rgb: [u8; 3]) -> Vec<u8> {
        let mut buf = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(RgbImage::from_pixel(w, h, Rgb(rgb)))
            .write_to(&mut buf, ImageFormat::Png)
            .unwrap();
        buf.into_inner()
    }

    fn url(bridge: &CaptureBridge) -> String {
        format!("http://{}/capture", bridge.local_addr())
    }

    #[test]
    fn black_png_reaches_consumer_as_zero_grid() {
        let mut bridge = CaptureBridge::start(local_config()).unwrap();
        let before = now_epoch();

        let resp = reqwest::blocking::Client::new()
            .post(url(&bridge))
            .header("Content-Type", "image/png")
            .body(png(4, 4, [0, 0, 0]))
            .send()
            .unwrap();
        assert_eq!(resp.status(), 200);
        let body: serde_json::Value = resp.json().unwrap();
        assert_eq!(body, serde_json::json!({"status": "success"}));

        let (pixels, meta) = bridge
            .get_next_image_timeout(Duration::from_secs(2))
            .expect("frame must arrive");
        assert_eq!(pixels.shape(), (4, 4));
        assert!(pixels.data.iter().all(|&v| v == 0.0));
        assert!(meta[CAPTURE_EPOCH_KEY].as_f64().unwrap() >= before);
        bridge.stop().unwrap();
    }

    #[test]
    fn blocked_consumer_wakes_on_upload() {
        let mut bridge = CaptureBridge::start(local_config()).unwrap();
        let receiver = bridge.receiver();
        let consumer = thread::spawn(move || receiver.recv());

        thread::sleep(Duration::from_millis(50));
        let resp = reqwest::blocking::Client::new()
            .post(url(&bridge))
            .header("Content-Type", "image/png")
            .header("X-Metadata", r#"{"probe":"p-7"}"#)
            .header("X-Metadata-Content-Type", "application/json")
            .body(png(2, 3, [30, 60, 90]))
            .send()
            .unwrap();
        assert!(resp.status().is_success());

        let (pixels, meta) = consumer.join().unwrap();
        assert_eq!(pixels.shape(), (3, 2));
        assert!(pixels.data.iter().all(|&v| (v - 60.0).abs() < 1e-4));
        assert_eq!(meta["probe"], "p-7");
        bridge.stop().unwrap();
    }

    #[test]
    fn unsupported_upload_keeps_pending_frame() {
        let mut bridge = CaptureBridge::start(local_config()).unwrap();
        let client = reqwest::blocking::Client::new();
        client
            .post(url(&bridge))
            .header("Content-Type", "image/png")
            .body(png(5, 1, [0, 0, 0]))
            .send()
            .unwrap();

        let resp = client
            .post(url(&bridge))
            .header("Content-Type", "text/plain")
            .body("hello")
            .send()
            .unwrap();
        let body: serde_json::Value = resp.json().unwrap();
        assert_eq!(body["message"], "Unsupported content type: text/plain");

        let (pixels, _) = bridge.receiver().try_recv().unwrap();
        assert_eq!(pixels.shape(), (1, 5));
        bridge.stop().unwrap();
    }

    #[test]
    fn timeout_variant_returns_none_when_idle() {
        let mut bridge = CaptureBridge::start(local_config()).unwrap();
        assert!(bridge.get_next_image_timeout(Duration::from_millis(20)).is_none());
        bridge.stop().unwrap();
    }

    #[test]
    fn stop_refuses_new_connections() {
        let mut bridge = CaptureBridge::start(local_config()).unwrap();
        let target = url(&bridge);
        bridge.stop().unwrap();
        let result = reqwest::blocking::Client::new()
            .post(target)
            .header("Content-Type", "image/png")
            .body(png(1, 1, [0, 0, 0]))
            .send();
        assert!(result.is_err());
    }
}

use crate::config::{CameraConfig, FacingPreference};
use crate::encoder::{self, DataUri, EncodeError, Frame};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::instrument;

const DEFAULT_ZOOM_MIN: f64 = 1.0;
const DEFAULT_ZOOM_MAX: f64 = 3.0;
const DEFAULT_ZOOM_STEP: f64 = 0.1;

#[derive(Error, Debug)]
pub enum CameraError {
    #[error("Permission denied: {0}")]
    PermissionDenied(String),
    #[error("No camera device available: {0}")]
    NoDevice(String),
    #[error("Constraints cannot be satisfied: {0}")]
    ConstraintNotSatisfied(String),
    #[error("Failed to read frame: {0}")]
    ReadFrameFailed(String),
    #[error("Camera is not started")]
    NoActiveStream,
    #[error("Zoom is not supported by this track")]
    ZoomUnsupported,
    #[error("Failed to apply zoom: {0}")]
    ZoomFailed(String),
    #[error("Failed to encode frame: {0}")]
    Encode(#[from] EncodeError),
    #[error("Frame encoding task failed: {0}")]
    EncodeTask(#[from] tokio::task::JoinError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FacingMode {
    User,
    Environment,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CameraConstraints {
    pub facing: FacingMode,
    /// When false the device may fall back to any other camera.
    pub facing_required: bool,
    pub ideal_width: u32,
    pub ideal_height: u32,
}

impl CameraConstraints {
    pub fn from_config(config: &CameraConfig) -> Self {
        let (facing, facing_required) = match config.facing {
            FacingPreference::User => (FacingMode::User, true),
            FacingPreference::Environment => (FacingMode::Environment, false),
            FacingPreference::Auto if is_ios_device(&config.device_hint) => {
                (FacingMode::User, true)
            }
            FacingPreference::Auto => (FacingMode::Environment, false),
        };

        Self {
            facing,
            facing_required,
            ideal_width: config.ideal_width,
            ideal_height: config.ideal_height,
        }
    }
}

fn is_ios_device(device_hint: &str) -> bool {
    let hint = device_hint.to_lowercase();
    hint.contains("iphone") || hint.contains("ipad")
}

/// Zoom range as reported by the device. Any bound may be missing.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ZoomCapability {
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub step: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ZoomControl {
    pub min: f64,
    pub max: f64,
    pub step: f64,
    pub value: f64,
}

impl ZoomControl {
    pub fn from_capability(capability: &ZoomCapability) -> Self {
        let reported = |v: Option<f64>| v.filter(|v| *v != 0.0);
        let min = reported(capability.min).unwrap_or(DEFAULT_ZOOM_MIN);
        let max = reported(capability.max).unwrap_or(DEFAULT_ZOOM_MAX);
        let step = reported(capability.step).unwrap_or(DEFAULT_ZOOM_STEP);

        Self {
            min,
            max,
            step,
            value: 1.0_f64.max(min).min(max),
        }
    }
}

/// A live video track bound to the capture source.
pub trait VideoTrack: Send {
    fn read_frame(&mut self) -> Result<Frame, CameraError>;
    /// Native frame size, if the device reports one.
    fn native_size(&self) -> Option<(u32, u32)>;
    fn zoom_capability(&self) -> Option<ZoomCapability>;
    fn apply_zoom(&mut self, zoom: f64) -> Result<(), CameraError>;
}

pub trait CameraDevice: Send + Sync {
    fn open(&self, constraints: &CameraConstraints) -> Result<Box<dyn VideoTrack>, CameraError>;
}

/// Device used when the crate is built without a camera backend.
pub struct UnavailableDevice;

impl CameraDevice for UnavailableDevice {
    fn open(&self, _constraints: &CameraConstraints) -> Result<Box<dyn VideoTrack>, CameraError> {
        Err(CameraError::NoDevice(
            "built without a camera backend (enable the `opencv` feature)".into(),
        ))
    }
}

pub struct Camera {
    device: Box<dyn CameraDevice>,
    constraints: CameraConstraints,
    stream: Mutex<Option<Box<dyn VideoTrack>>>,
}

impl Camera {
    pub fn new(device: Box<dyn CameraDevice>, constraints: CameraConstraints) -> Self {
        Self {
            device,
            constraints,
            stream: Mutex::new(None),
        }
    }

    /// Opens a stream and binds it, replacing any previous one. Returns the
    /// zoom control to expose when the track supports zoom.
    #[instrument(skip(self))]
    pub async fn start(&self) -> Result<Option<ZoomControl>, CameraError> {
        let track = self.device.open(&self.constraints)?;
        let zoom = track
            .zoom_capability()
            .map(|capability| ZoomControl::from_capability(&capability));

        let mut stream = self.stream.lock().await;
        if stream.replace(track).is_some() {
            tracing::debug!("Replaced previously bound stream");
        }
        tracing::info!("Camera stream bound, zoom available: {}", zoom.is_some());

        Ok(zoom)
    }

    pub async fn is_streaming(&self) -> bool {
        self.stream.lock().await.is_some()
    }

    #[instrument(skip(self))]
    pub async fn apply_zoom(&self, zoom: f64) -> Result<(), CameraError> {
        let mut stream = self.stream.lock().await;
        let track = stream.as_mut().ok_or(CameraError::NoActiveStream)?;
        if track.zoom_capability().is_none() {
            return Err(CameraError::ZoomUnsupported);
        }
        track.apply_zoom(zoom)
    }

    /// Captures the current frame as a PNG data-URI.
    #[instrument(skip(self))]
    pub async fn capture_frame(&self) -> Result<DataUri, CameraError> {
        let (frame, native_size) = {
            let mut stream = self.stream.lock().await;
            let track = stream.as_mut().ok_or(CameraError::NoActiveStream)?;
            (track.read_frame()?, track.native_size())
        };

        // Resize and PNG encode are CPU bound.
        let payload =
            tokio::task::spawn_blocking(move || encoder::encode_frame(&frame, native_size))
                .await??;
        Ok(payload)
    }
}

use crate::camera::{
    CameraConstraints, CameraDevice, CameraError, FacingMode, VideoTrack, ZoomCapability,
};
use crate::config::CameraConfig;
use crate::encoder::Frame;
use opencv::{core::Mat, imgproc, prelude::*, videoio};

impl From<opencv::Error> for CameraError {
    fn from(err: opencv::Error) -> Self {
        CameraError::ReadFrameFailed(err.to_string())
    }
}

/// Local capture devices reached through OpenCV. Facing modes map to the
/// configured front and back device indices.
pub struct OpencvDevice {
    front_index: i32,
    back_index: i32,
}

impl OpencvDevice {
    pub fn new(config: &CameraConfig) -> Self {
        Self {
            front_index: config.front_device_index,
            back_index: config.back_device_index,
        }
    }

    fn index_for(&self, facing: FacingMode) -> i32 {
        match facing {
            FacingMode::User => self.front_index,
            FacingMode::Environment => self.back_index,
        }
    }

    fn open_index(
        &self,
        index: i32,
        constraints: &CameraConstraints,
    ) -> Result<videoio::VideoCapture, CameraError> {
        let mut capture = videoio::VideoCapture::new(index, videoio::CAP_ANY)
            .map_err(|e| CameraError::NoDevice(e.to_string()))?;
        if !capture.is_opened()? {
            return Err(CameraError::NoDevice(format!("device {} could not be opened", index)));
        }

        // Ideal sizes: the driver may pick something else.
        capture.set(videoio::CAP_PROP_FRAME_WIDTH, constraints.ideal_width as f64)?;
        capture.set(videoio::CAP_PROP_FRAME_HEIGHT, constraints.ideal_height as f64)?;
        Ok(capture)
    }
}

impl CameraDevice for OpencvDevice {
    fn open(&self, constraints: &CameraConstraints) -> Result<Box<dyn VideoTrack>, CameraError> {
        let preferred = self.index_for(constraints.facing);
        let capture = match self.open_index(preferred, constraints) {
            Ok(capture) => capture,
            Err(err) if constraints.facing_required => {
                return Err(CameraError::ConstraintNotSatisfied(format!(
                    "{:?} camera unavailable: {}",
                    constraints.facing, err
                )))
            }
            Err(err) => {
                let fallback = match constraints.facing {
                    FacingMode::User => self.back_index,
                    FacingMode::Environment => self.front_index,
                };
                if fallback == preferred {
                    return Err(err);
                }
                tracing::warn!("Preferred camera unavailable ({}), trying device {}", err, fallback);
                self.open_index(fallback, constraints)?
            }
        };

        Ok(Box::new(OpencvTrack { capture }))
    }
}

pub struct OpencvTrack {
    capture: videoio::VideoCapture,
}

impl VideoTrack for OpencvTrack {
    fn read_frame(&mut self) -> Result<Frame, CameraError> {
        let mut frame = Mat::default();
        if !self.capture.read(&mut frame)? || frame.empty() {
            return Err(CameraError::ReadFrameFailed("empty frame".into()));
        }

        let mut rgb = Mat::default();
        imgproc::cvt_color_def(&frame, &mut rgb, imgproc::COLOR_BGR2RGB)?;
        let rgb = if rgb.is_continuous() { rgb } else { rgb.try_clone()? };

        Ok(Frame::new(
            rgb.cols() as u32,
            rgb.rows() as u32,
            rgb.data_bytes()?.to_vec(),
        ))
    }

    fn native_size(&self) -> Option<(u32, u32)> {
        let width = self.capture.get(videoio::CAP_PROP_FRAME_WIDTH).ok()?;
        let height = self.capture.get(videoio::CAP_PROP_FRAME_HEIGHT).ok()?;
        (width > 0.0 && height > 0.0).then_some((width as u32, height as u32))
    }

    fn zoom_capability(&self) -> Option<ZoomCapability> {
        // Backends without zoom report 0 or -1; OpenCV exposes no bounds.
        match self.capture.get(videoio::CAP_PROP_ZOOM) {
            Ok(zoom) if zoom > 0.0 => Some(ZoomCapability::default()),
            _ => None,
        }
    }

    fn apply_zoom(&mut self, zoom: f64) -> Result<(), CameraError> {
        match self.capture.set(videoio::CAP_PROP_ZOOM, zoom) {
            Ok(true) => Ok(()),
            Ok(false) => Err(CameraError::ZoomFailed(format!("driver refused zoom {}", zoom))),
            Err(err) => Err(CameraError::ZoomFailed(err.to_string())),
        }
    }
}

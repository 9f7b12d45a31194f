use crate::camera::{
    CameraConstraints, CameraDevice, CameraError, VideoTrack, ZoomCapability, ZoomControl,
};
use crate::encoder::Frame;
use crate::page::{Display, Notice};
use parking_lot::Mutex;

#[derive(Debug, Clone, PartialEq)]
pub enum PageEvent {
    Text(String, String),
    Image(String, String),
    Zoom(String, Option<ZoomControl>),
    Notice(Notice),
    Navigate(String),
}

#[derive(Default)]
pub struct RecordingDisplay {
    events: Mutex<Vec<PageEvent>>,
}

impl RecordingDisplay {
    pub fn events(&self) -> Vec<PageEvent> {
        self.events.lock().clone()
    }

    pub fn notices(&self) -> Vec<Notice> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                PageEvent::Notice(notice) => Some(notice),
                _ => None,
            })
            .collect()
    }
}

impl Display for RecordingDisplay {
    fn set_text(&self, element: &str, text: &str) {
        self.events
            .lock()
            .push(PageEvent::Text(element.into(), text.into()));
    }

    fn set_image(&self, element: &str, url: &str) {
        self.events
            .lock()
            .push(PageEvent::Image(element.into(), url.into()));
    }

    fn set_zoom_control(&self, element: &str, control: Option<&ZoomControl>) {
        self.events
            .lock()
            .push(PageEvent::Zoom(element.into(), control.copied()));
    }

    fn notify(&self, notice: &Notice) {
        self.events.lock().push(PageEvent::Notice(notice.clone()));
    }

    fn navigate(&self, url: &str) {
        self.events.lock().push(PageEvent::Navigate(url.into()));
    }
}

#[derive(Debug, Clone)]
pub struct FakeTrack {
    frame: Frame,
    native_size: Option<(u32, u32)>,
    zoom: Option<ZoomCapability>,
}

impl FakeTrack {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            frame: Frame::solid(width, height, [10, 20, 30]),
            native_size: Some((width, height)),
            zoom: None,
        }
    }

    pub fn with_zoom(mut self, zoom: ZoomCapability) -> Self {
        self.zoom = Some(zoom);
        self
    }

    pub fn without_native_size(mut self) -> Self {
        self.native_size = None;
        self
    }
}

impl VideoTrack for FakeTrack {
    fn read_frame(&mut self) -> Result<Frame, CameraError> {
        Ok(self.frame.clone())
    }

    fn native_size(&self) -> Option<(u32, u32)> {
        self.native_size
    }

    fn zoom_capability(&self) -> Option<ZoomCapability> {
        self.zoom
    }

    fn apply_zoom(&mut self, _zoom: f64) -> Result<(), CameraError> {
        Ok(())
    }
}

pub enum FakeDevice {
    Track(FakeTrack),
    Failing(fn() -> CameraError),
}

impl FakeDevice {
    pub fn with_track(track: FakeTrack) -> Self {
        FakeDevice::Track(track)
    }

    pub fn failing(error: fn() -> CameraError) -> Self {
        FakeDevice::Failing(error)
    }
}

impl CameraDevice for FakeDevice {
    fn open(&self, _constraints: &CameraConstraints) -> Result<Box<dyn VideoTrack>, CameraError> {
        match self {
            FakeDevice::Track(track) => Ok(Box::new(track.clone())),
            FakeDevice::Failing(error) => Err(error()),
        }
    }
}

use crate::camera::ZoomControl;
use crate::config::ElementIds;
use std::{fmt, sync::Arc};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Success,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub text: String,
}

impl Notice {
    pub fn info(text: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Info,
            text: text.into(),
        }
    }

    pub fn success(text: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Success,
            text: text.into(),
        }
    }

    pub fn warning(text: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Warning,
            text: text.into(),
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Error,
            text: text.into(),
        }
    }
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self.level {
            NoticeLevel::Info => "info",
            NoticeLevel::Success => "ok",
            NoticeLevel::Warning => "warning",
            NoticeLevel::Error => "error",
        };
        write!(f, "[{}] {}", tag, self.text)
    }
}

/// Rendering surface behind the page. Element ids have already been resolved
/// by [`Page`] when these are called.
pub trait Display: Send + Sync {
    fn set_text(&self, element: &str, text: &str);
    fn set_image(&self, element: &str, url: &str);
    fn set_zoom_control(&self, element: &str, control: Option<&ZoomControl>);
    fn notify(&self, notice: &Notice);
    fn navigate(&self, url: &str);
}

#[derive(Clone)]
pub struct Page {
    display: Arc<dyn Display>,
    ids: ElementIds,
}

impl Page {
    pub fn new(display: Arc<dyn Display>, ids: ElementIds) -> Self {
        Self { display, ids }
    }

    pub fn ids(&self) -> &ElementIds {
        &self.ids
    }

    pub fn has_video(&self) -> bool {
        self.ids.video.is_some()
    }

    pub fn show_result(&self, text: &str) {
        match &self.ids.result {
            Some(id) => self.display.set_text(id, text),
            None => tracing::debug!("No result element, dropping message"),
        }
    }

    pub fn show_captured_image(&self, url: &str) {
        if let Some(id) = &self.ids.captured_image {
            self.display.set_image(id, url);
        }
    }

    pub fn show_zoom_control(&self, control: &ZoomControl) {
        if let Some(id) = &self.ids.zoom_slider {
            self.display.set_zoom_control(id, Some(control));
        }
    }

    pub fn hide_zoom_control(&self) {
        if let Some(id) = &self.ids.zoom_slider {
            self.display.set_zoom_control(id, None);
        }
    }

    pub fn notify(&self, notice: Notice) {
        match notice.level {
            NoticeLevel::Error => tracing::error!("{}", notice.text),
            NoticeLevel::Warning => tracing::warn!("{}", notice.text),
            _ => tracing::info!("{}", notice.text),
        }
        self.display.notify(&notice);
    }

    pub fn navigate(&self, url: &str) {
        tracing::info!("Navigating to {}", url);
        self.display.navigate(url);
    }
}

/// Writes page updates to stdout.
pub struct ConsoleDisplay;

impl Display for ConsoleDisplay {
    fn set_text(&self, element: &str, text: &str) {
        println!("#{}: {}", element, text);
    }

    fn set_image(&self, element: &str, url: &str) {
        println!("#{}: <img src=\"{}\">", element, url);
    }

    fn set_zoom_control(&self, element: &str, control: Option<&ZoomControl>) {
        match control {
            Some(c) => println!(
                "#{}: zoom {} (min {}, max {}, step {})",
                element, c.value, c.min, c.max, c.step
            ),
            None => println!("#{}: hidden", element),
        }
    }

    fn notify(&self, notice: &Notice) {
        println!("{}", notice);
    }

    fn navigate(&self, url: &str) {
        println!("open {}", url);
    }
}

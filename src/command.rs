use crate::abi::Address;
use crate::config::{Credentials, ElementIds};
use crate::detector::LogoDetector;
use std::{path::PathBuf, str::FromStr};
use thiserror::Error;

pub const HELP: &str = "\
commands:
  start                     restart the camera stream
  detect                    capture a frame and detect the logo
  choose <path>             select an image file
  upload                    detect the logo in the selected file
  zoom <value>              set the camera zoom
  connect                   connect the wallet
  detections                list my recorded detections
  detection <addr> <index>  read one recorded detection
  view                      open the detections gallery
  login [user pass]         sign in to the backend
  help                      show this message
  quit                      exit";

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Start,
    Detect,
    Choose(PathBuf),
    Upload,
    Zoom(f64),
    Connect,
    Detections,
    Detection { user: Address, index: u64 },
    View,
    Login(Option<(String, String)>),
    Help,
    Quit,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseCommandError {
    #[error("Empty command")]
    Empty,
    #[error("Unknown command `{0}`, type `help` for the list")]
    Unknown(String),
    #[error("Usage: {0}")]
    Usage(&'static str),
}

impl FromStr for Command {
    type Err = ParseCommandError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut words = line.split_whitespace();
        let name = words.next().ok_or(ParseCommandError::Empty)?;
        let args: Vec<&str> = words.collect();

        let command = match (name, args.as_slice()) {
            ("start", []) => Command::Start,
            ("detect", []) => Command::Detect,
            ("upload", []) => Command::Upload,
            ("connect", []) => Command::Connect,
            ("detections", []) => Command::Detections,
            ("view", []) => Command::View,
            ("help", []) => Command::Help,
            ("quit" | "exit", []) => Command::Quit,
            ("choose", []) => return Err(ParseCommandError::Usage("choose <path>")),
            // Paths may contain spaces.
            ("choose", _) => Command::Choose(PathBuf::from(args.join(" "))),
            ("zoom", [value]) => Command::Zoom(
                value
                    .parse()
                    .map_err(|_| ParseCommandError::Usage("zoom <value>"))?,
            ),
            ("detection", [user, index]) => {
                let usage = ParseCommandError::Usage("detection <addr> <index>");
                Command::Detection {
                    user: user.parse().map_err(|_| usage.clone())?,
                    index: index.parse().map_err(|_| usage)?,
                }
            }
            ("login", []) => Command::Login(None),
            ("login", [user, pass]) => Command::Login(Some((user.to_string(), pass.to_string()))),
            ("zoom", _) => return Err(ParseCommandError::Usage("zoom <value>")),
            ("detection", _) => return Err(ParseCommandError::Usage("detection <addr> <index>")),
            ("login", _) => return Err(ParseCommandError::Usage("login [user pass]")),
            (
                "start" | "detect" | "upload" | "connect" | "detections" | "view" | "help" | "quit"
                | "exit",
                _,
            ) => return Err(ParseCommandError::Usage("command takes no arguments")),
            (other, _) => return Err(ParseCommandError::Unknown(other.to_string())),
        };

        Ok(command)
    }
}

impl Command {
    /// Whether the page surface behind this command exists. Commands whose
    /// control is absent are ignored.
    pub fn is_enabled(&self, ids: &ElementIds) -> bool {
        match self {
            Command::Start => ids.video.is_some(),
            Command::Detect => ids.video.is_some() && ids.detect_button.is_some(),
            Command::Choose(_) => ids.file_input.is_some(),
            Command::Upload => ids.file_input.is_some() && ids.upload_button.is_some(),
            Command::Zoom(_) => ids.zoom_slider.is_some(),
            Command::Connect | Command::Detections | Command::Detection { .. } => {
                ids.connect_wallet_button.is_some()
            }
            Command::View => ids.view_detections_button.is_some(),
            Command::Login(_) | Command::Help | Command::Quit => true,
        }
    }
}

/// Runs one command against the detector. Failures have already been
/// reported on the page, so only the outcome is logged here.
pub async fn dispatch(detector: &LogoDetector, command: Command) {
    if !command.is_enabled(detector.page().ids()) {
        tracing::debug!("Ignoring {:?}, its control is not on the page", command);
        return;
    }

    let outcome = match command {
        Command::Start => detector.start_camera().await.map(|_| ()),
        Command::Detect => detector.detect_logo().await.map(|_| ()),
        Command::Choose(path) => {
            detector.choose_file(path);
            Ok(())
        }
        Command::Upload => detector.upload_and_detect().await.map(|_| ()),
        Command::Zoom(value) => {
            detector.set_zoom(value).await;
            Ok(())
        }
        Command::Connect => detector.connect_wallet().await.map(|_| ()),
        Command::Detections => detector.list_my_detections().await.map(|_| ()),
        Command::Detection { user, index } => detector.detection_at(user, index).await.map(|_| ()),
        Command::View => {
            detector.view_detections();
            Ok(())
        }
        Command::Login(credentials) => {
            let credentials =
                credentials.map(|(username, password)| Credentials { username, password });
            detector.login(credentials).await
        }
        Command::Help => {
            println!("{}", HELP);
            Ok(())
        }
        Command::Quit => Ok(()),
    };

    if let Err(err) = outcome {
        tracing::debug!("Command failed ({:?}): {}", err.kind(), err);
    }
}

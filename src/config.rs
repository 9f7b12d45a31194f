use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(deserialize_with = "deserialize_log_level")]
    pub log_level: LogLevel,
    pub backend: BackendConfig,
    #[serde(default)]
    pub camera: CameraConfig,
    #[serde(default)]
    pub element_ids: ElementIds,
    pub wallet: Option<WalletConfig>,
    pub contract: Option<ContractConfig>,
}

fn deserialize_log_level<'de, D>(deserializer: D) -> Result<LogLevel, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    s.try_into().map_err(serde::de::Error::custom)
}

#[derive(Debug, Deserialize, Clone)]
pub struct BackendConfig {
    pub base_url: String,
    #[serde(default = "default_predict_path")]
    pub predict_path: String,
    #[serde(default = "default_images_path")]
    pub images_path: String,
    #[serde(default = "default_login_path")]
    pub login_path: String,
    pub credentials: Option<Credentials>,
}

fn default_predict_path() -> String {
    "/predict".into()
}

fn default_images_path() -> String {
    "/images".into()
}

fn default_login_path() -> String {
    "/login".into()
}

impl BackendConfig {
    pub fn url_for(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    pub fn predict_url(&self) -> String {
        self.url_for(&self.predict_path)
    }

    pub fn images_url(&self) -> String {
        self.url_for(&self.images_path)
    }

    pub fn login_url(&self) -> String {
        self.url_for(&self.login_path)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum FacingPreference {
    User,
    Environment,
    #[default]
    Auto,
}

#[derive(Clone, Deserialize, Debug)]
pub struct CameraConfig {
    #[serde(default)]
    pub facing: FacingPreference,
    /// Free-form description of the host device, used by the `auto` facing heuristic.
    #[serde(default)]
    pub device_hint: String,
    #[serde(default = "default_ideal_width")]
    pub ideal_width: u32,
    #[serde(default = "default_ideal_height")]
    pub ideal_height: u32,
    #[serde(default)]
    pub front_device_index: i32,
    #[serde(default)]
    pub back_device_index: i32,
}

fn default_ideal_width() -> u32 {
    1920
}

fn default_ideal_height() -> u32 {
    1080
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            facing: FacingPreference::default(),
            device_hint: String::new(),
            ideal_width: default_ideal_width(),
            ideal_height: default_ideal_height(),
            front_device_index: 0,
            back_device_index: 0,
        }
    }
}

/// Identifiers of the page surfaces the client drives. A `None` disables the
/// matching feature; a partially given section disables everything it omits.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct ElementIds {
    pub video: Option<String>,
    pub zoom_slider: Option<String>,
    pub result: Option<String>,
    pub captured_image: Option<String>,
    pub file_input: Option<String>,
    pub upload_button: Option<String>,
    pub detect_button: Option<String>,
    pub connect_wallet_button: Option<String>,
    pub view_detections_button: Option<String>,
}

impl Default for ElementIds {
    fn default() -> Self {
        Self {
            video: Some("video".into()),
            zoom_slider: Some("zoomSlider".into()),
            result: Some("result".into()),
            captured_image: Some("captured_image".into()),
            file_input: Some("fileInput".into()),
            upload_button: Some("uploadbtn".into()),
            detect_button: Some("detectBtn".into()),
            connect_wallet_button: Some("connectWalletBtn".into()),
            view_detections_button: Some("viewDetectionsBtn".into()),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct WalletConfig {
    pub provider_url: String,
    #[serde(default)]
    pub account_index: usize,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ContractConfig {
    pub address: String,
    #[serde(default = "default_confirmation_poll_ms")]
    pub confirmation_poll_ms: u64,
}

fn default_confirmation_poll_ms() -> u64 {
    1000
}

#[derive(Debug, Deserialize, Clone)]
pub enum Environment {
    Local,
    Production,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Local => "local",
            Environment::Production => "production",
        }
    }
}

impl TryFrom<String> for Environment {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        match s.to_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "production" => Ok(Self::Production),
            other => Err(format!(
                "{} is not a supported environment. Use either `local` or `production`.",
                other
            )),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub enum LogLevel {
    Debug,
    Info,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
        }
    }
}

impl TryFrom<String> for LogLevel {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        match s.to_lowercase().as_str() {
            "debug" => Ok(Self::Debug),
            "info" => Ok(Self::Info),
            other => Err(format!(
                "{} is not a supported minimum log level. Use either `debug` or `info`.",
                other
            )),
        }
    }
}

pub fn get_configuration() -> Result<Config, config::ConfigError> {
    let base_path = std::env::current_dir()
        .map_err(|e| config::ConfigError::Message(format!("no working directory: {}", e)))?;
    let configuration_directory = base_path.join("configuration");

    let environment: Environment = std::env::var("APP_ENVIRONMENT")
        .unwrap_or_else(|_| "local".into())
        .try_into()
        .map_err(config::ConfigError::Message)?;

    let config = config::Config::builder()
        .add_source(config::File::from(
            configuration_directory.join("base.yaml"),
        ))
        .add_source(config::File::from(
            configuration_directory.join(format!("{}.yaml", environment.as_str())),
        ))
        .add_source(
            config::Environment::with_prefix("LL")
                .prefix_separator("_")
                .separator("__"),
        )
        .build()?;

    let config: Config = config.try_deserialize::<Config>()?;

    Ok(config)
}

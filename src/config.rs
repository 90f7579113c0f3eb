use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    #[serde(deserialize_with = "deserialize_log_level")]
    pub log_level: LogLevel,
    pub detect_service: DetectServiceConfig,
    #[serde(default)]
    pub camera: CameraConfig,
    #[serde(default)]
    pub capture: CaptureConfig,
    #[serde(default)]
    pub notices: NoticesConfig,
}

fn deserialize_log_level<'de, D>(deserializer: D) -> Result<LogLevel, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    s.try_into().map_err(serde::de::Error::custom)
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn get_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct DetectServiceConfig {
    /// Full URL of the remote detect endpoint, e.g. `http://localhost:5000/detect`.
    pub url: String,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_field_name")]
    pub field_name: String,
}

fn default_timeout_ms() -> u64 {
    10_000
}

fn default_field_name() -> String {
    "file".to_string()
}

impl DetectServiceConfig {
    pub fn get_timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CameraSourceConfig {
    Webcam {
        #[serde(default)]
        index: i32,
    },
    Images {
        path: PathBuf,
        /// How long each image stays on screen.
        #[serde(default = "default_hold_ms")]
        hold_ms: u64,
    },
}

fn default_hold_ms() -> u64 {
    1000
}

impl Default for CameraSourceConfig {
    fn default() -> Self {
        CameraSourceConfig::Webcam { index: 0 }
    }
}

#[derive(Clone, Deserialize, Debug)]
pub struct CameraConfig {
    #[serde(default)]
    pub source: CameraSourceConfig,
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
    #[serde(default = "default_stream_fps")]
    pub stream_fps: u64,
}

fn default_width() -> u32 {
    640
}

fn default_height() -> u32 {
    480
}

fn default_stream_fps() -> u64 {
    30
}

fn fps_to_delay_ms(fps: u64) -> u64 {
    (1000.0 / fps.max(1) as f64).round() as u64
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            source: CameraSourceConfig::default(),
            width: default_width(),
            height: default_height(),
            stream_fps: default_stream_fps(),
        }
    }
}

impl CameraConfig {
    pub fn get_stream_delay_ms(&self) -> u64 {
        fps_to_delay_ms(self.stream_fps)
    }

    /// Age after which readers get a new frame instead of the cached one.
    pub fn get_frame_interval(&self) -> Duration {
        match &self.source {
            CameraSourceConfig::Images { hold_ms, .. } => Duration::from_millis(*hold_ms),
            CameraSourceConfig::Webcam { .. } => Duration::from_millis(self.get_stream_delay_ms()),
        }
    }
}

/// Which of several overlapping responses is allowed to update the overlay.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ResponseOrdering {
    /// Whichever response completes last wins, even if it was issued earlier.
    #[default]
    LastArrived,
    /// Responses older than the newest applied one are dropped.
    LastIssued,
}

#[derive(Clone, Deserialize, Debug)]
pub struct CaptureConfig {
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u8,
    #[serde(default)]
    pub ordering: ResponseOrdering,
}

fn default_interval_ms() -> u64 {
    800
}

fn default_jpeg_quality() -> u8 {
    40
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_interval_ms(),
            jpeg_quality: default_jpeg_quality(),
            ordering: ResponseOrdering::default(),
        }
    }
}

impl CaptureConfig {
    pub fn get_interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms.max(1))
    }
}

#[derive(Clone, Deserialize, Debug)]
pub struct NoticesConfig {
    #[serde(default = "default_notice_capacity")]
    pub capacity: usize,
}

fn default_notice_capacity() -> usize {
    32
}

impl Default for NoticesConfig {
    fn default() -> Self {
        Self {
            capacity: default_notice_capacity(),
        }
    }
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
        .map_err(|e| config::ConfigError::Message(format!("current directory: {}", e)))?;
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
            config::Environment::with_prefix("RV")
                .prefix_separator("_")
                .separator("__"),
        )
        .build()?;

    let config: Config = config.try_deserialize::<Config>()?;

    Ok(config)
}

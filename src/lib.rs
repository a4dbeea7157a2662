pub mod capability;
pub mod capture;
pub mod codec;
pub mod converter;
pub mod display;
pub mod error;
pub mod frame;
pub mod pipeline;
pub mod utils;

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::codec::ColorOrder;
use crate::error::Result;
use crate::frame::{BitDepth, Color, Dimensions};
use crate::pipeline::ResizeMode;

/// Prefix of the environment variables overriding the configuration file,
/// e.g. `DMDGRAPH__GRAPH__WIDTH=256`.
pub const ENV_PREFIX: &str = "DMDGRAPH";

/// Everything needed to build one render graph
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub graph: GraphConfig,
    pub source: SourceConfig,
    pub destinations: Vec<DestinationConfig>,
    #[serde(default)]
    pub colorization: Option<ColorizationConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    pub name: String,
    pub width: u32,
    pub height: u32,
    pub resize: ResizeMode,
    pub flip_horizontal: bool,
    pub flip_vertical: bool,
    /// Tint of gray frames
    pub color: Color,
    pub palette: Option<Vec<Color>>,
    /// Zero disables idle handling
    pub idle_timeout_ms: u64,
    /// Shown instead of blanking when idle
    pub idle_image: Option<PathBuf>,
}

/// Where frames come from
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SourceConfig {
    Pipe {
        path: PathBuf,
        width: u32,
        height: u32,
        depth: BitDepth,
        #[serde(default)]
        planes: bool,
    },
    Network {
        address: String,
    },
    Image {
        path: PathBuf,
        depth: BitDepth,
    },
}

/// Where frames go. Ports are device paths or `auto`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DestinationConfig {
    PlaneDevice {
        port: String,
        #[serde(default = "default_width")]
        width: u32,
        #[serde(default = "default_height")]
        height: u32,
    },
    RgbMatrix {
        port: String,
        width: u32,
        height: u32,
        #[serde(default)]
        color_order: ColorOrder,
    },
    Virtual {
        #[serde(default = "default_virtual_name")]
        name: String,
    },
}

/// Per-game palettes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColorizationConfig {
    pub palette_dir: PathBuf,
}

fn default_width() -> u32 {
    128
}

fn default_height() -> u32 {
    32
}

fn default_virtual_name() -> String {
    "virtual".into()
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            name: "dmd".into(),
            width: default_width(),
            height: default_height(),
            resize: ResizeMode::Nearest,
            flip_horizontal: false,
            flip_vertical: false,
            color: Color::ORANGE_RED,
            palette: None,
            idle_timeout_ms: 0,
            idle_image: None,
        }
    }
}

impl GraphConfig {
    pub fn dimensions(&self) -> Dimensions {
        Dimensions::new(self.width, self.height)
    }

    pub fn idle_timeout(&self) -> Option<Duration> {
        (self.idle_timeout_ms > 0).then(|| Duration::from_millis(self.idle_timeout_ms))
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            graph: GraphConfig::default(),
            source: SourceConfig::Pipe {
                path: PathBuf::from("/tmp/dmdgraph.pipe"),
                width: default_width(),
                height: default_height(),
                depth: BitDepth::Gray2,
                planes: false,
            },
            destinations: vec![DestinationConfig::Virtual {
                name: default_virtual_name(),
            }],
            colorization: None,
        }
    }
}

impl Config {
    /// Reads a TOML file, then applies `DMDGRAPH__*` environment overrides.
    pub fn load(path: &Path) -> Result<Self> {
        let config = config::Config::builder()
            .add_source(config::File::from(path))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;
        Ok(config)
    }
}

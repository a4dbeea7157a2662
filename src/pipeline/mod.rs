//! Render graph orchestration.
//!
//! [`from_config`] turns a resolved [`Config`] into a ready graph: it opens
//! the source, the device ports and the colorization folder, so every
//! construction error surfaces before anything is started.

pub mod collection;
pub mod graph;
pub mod processor;
pub mod stats;
pub mod transform;

use std::path::Path;
use std::sync::Arc;

use tracing::{info, instrument};

use crate::capture::pipe::PipeFormat;
use crate::capture::{image, ImageSource, NetworkSource, PipeSource, Source};
use crate::converter::{PaletteDirLoader, SwitchingConverter};
use crate::display::{Destination, PlaneDevice, RgbMatrix, VirtualDmd, VirtualDmdView};
use crate::error::Result;
use crate::frame::{BitDepth, Dimensions};
use crate::utils;
use crate::{Config, DestinationConfig, SourceConfig};

pub use collection::RenderGraphCollection;
pub use graph::{
    GraphOptions, GraphState, IdleOptions, RenderGraph, RenderGraphBuilder, MAX_CONVERSION_FAILURES,
};
pub use processor::{MonochromeProcessor, Processor, TransformProcessor};
pub use stats::{GraphStats, StatsSnapshot};
pub use transform::ResizeMode;

/// A graph built from configuration plus the views of its virtual displays.
pub struct ConfiguredGraph {
    pub graph: RenderGraph,
    pub views: Vec<VirtualDmdView>,
}

#[instrument(skip(config), fields(graph = %config.graph.name))]
pub fn from_config(config: &Config) -> Result<ConfiguredGraph> {
    let dim = config.graph.dimensions();
    let idle = match config.graph.idle_timeout() {
        Some(timeout) => Some(IdleOptions {
            timeout,
            image: match &config.graph.idle_image {
                // idle pictures are rendered like any other frame, so RGB keeps the colors
                Some(path) => Some(image::load_frame(path, dim, BitDepth::Rgb24)?),
                None => None,
            },
        }),
        None => None,
    };
    let options = GraphOptions {
        dimensions: Some(dim),
        resize: config.graph.resize,
        flip_horizontal: config.graph.flip_horizontal,
        flip_vertical: config.graph.flip_vertical,
        color: config.graph.color,
        palette: config.graph.palette.clone(),
        idle,
    };

    let mut builder = RenderGraph::builder(config.graph.name.as_str())
        .boxed_source(build_source(&config.source, dim)?)
        .options(options);

    let mut views = Vec::new();
    for destination in &config.destinations {
        let (destination, view) = build_destination(destination, config)?;
        views.extend(view);
        builder = builder.destination(destination);
    }

    if let Some(colorization) = &config.colorization {
        info!("Colorizations from {}", colorization.palette_dir.display());
        builder = builder.colorization(
            Arc::new(SwitchingConverter::new(config.graph.color)),
            Arc::new(PaletteDirLoader::new(&colorization.palette_dir)),
        );
    }

    Ok(ConfiguredGraph {
        graph: builder.build()?,
        views,
    })
}

fn build_source(config: &SourceConfig, dim: Dimensions) -> Result<Box<dyn Source>> {
    let source: Box<dyn Source> = match config {
        SourceConfig::Pipe {
            path,
            width,
            height,
            depth,
            planes,
        } => {
            let format = PipeFormat {
                dimensions: Dimensions::new(*width, *height),
                depth: *depth,
                planes: *planes,
            };
            format.dimensions.validate()?;
            Box::new(PipeSource::open(path, format)?)
        }
        SourceConfig::Network { address } => Box::new(NetworkSource::new(address.as_str())),
        SourceConfig::Image { path, depth } => Box::new(ImageSource::open(path, dim, *depth)?),
    };
    Ok(source)
}

fn build_destination(
    config: &DestinationConfig,
    graph: &Config,
) -> Result<(Arc<dyn Destination>, Option<VirtualDmdView>)> {
    Ok(match config {
        DestinationConfig::PlaneDevice { port, width, height } => {
            let port = utils::resolve_port(port)?;
            let device = PlaneDevice::new(&port.path, port.open()?, Dimensions::new(*width, *height))?;
            (Arc::new(device), None)
        }
        DestinationConfig::RgbMatrix {
            port,
            width,
            height,
            color_order,
        } => {
            let port = utils::resolve_port(port)?;
            let matrix = RgbMatrix::new(
                &port.path,
                port.open()?,
                Dimensions::new(*width, *height),
                *color_order,
            )?;
            (Arc::new(matrix), None)
        }
        DestinationConfig::Virtual { name } => {
            let (dmd, view) = VirtualDmd::new(name.as_str(), graph.graph.color);
            (Arc::new(dmd), Some(view))
        }
    })
}

/// Opens the configuration at `path`, or the default one when there is none.
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => Config::load(path),
        None => Ok(Config::default()),
    }
}

//! Still pictures.

use std::path::{Path, PathBuf};

use image::imageops::FilterType;
use tracing::{debug, info, instrument};

use crate::capture::{already_started, FrameSink, Source};
use crate::codec;
use crate::error::Result;
use crate::frame::{BitDepth, Dimensions, DmdFrame, Frame};

/// Decodes a PNG or JPEG into a frame of `dim`, quantized to gray shades
/// by luminosity unless `depth` is RGB24.
#[instrument]
pub fn load_frame(path: &Path, dim: Dimensions, depth: BitDepth) -> Result<DmdFrame> {
    dim.validate()?;
    let picture = image::open(path)?;
    debug!(
        "Decoded {} ({}x{})",
        path.display(),
        picture.width(),
        picture.height()
    );
    let picture = if picture.width() == dim.width && picture.height() == dim.height {
        picture
    } else {
        picture.resize_exact(dim.width, dim.height, FilterType::Triangle)
    };
    let rgb = picture.to_rgb8().into_raw();
    let frame = match depth {
        BitDepth::Rgb24 => Frame::new(dim, depth, rgb)?,
        gray => Frame::new(dim, gray, codec::rgb24_to_gray(&rgb, gray.num_colors())?)?,
    };
    Ok(DmdFrame::from(frame))
}

/// Emits a single picture when started.
pub struct ImageSource {
    path: PathBuf,
    frame: DmdFrame,
    started: bool,
}

impl ImageSource {
    pub fn open(path: impl Into<PathBuf>, dim: Dimensions, depth: BitDepth) -> Result<Self> {
        let path = path.into();
        let frame = load_frame(&path, dim, depth)?;
        Ok(Self {
            path,
            frame,
            started: false,
        })
    }

    pub fn frame(&self) -> &DmdFrame {
        &self.frame
    }
}

impl Source for ImageSource {
    fn name(&self) -> &str {
        self.path.to_str().unwrap_or("image")
    }

    fn start(&mut self, sink: FrameSink) -> Result<()> {
        if self.started {
            return Err(already_started("running"));
        }
        self.started = true;
        info!("Showing {}", self.path.display());
        sink.frame(self.frame.clone())
    }

    fn stop(&mut self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::FrameFormat;
    use image::{Rgb, RgbImage};

    #[test]
    fn quantizes_pictures() {
        let path = std::env::temp_dir().join(format!("dmdgraph-image-{}.png", std::process::id()));
        let mut picture = RgbImage::new(4, 2);
        for (x, _, pixel) in picture.enumerate_pixels_mut() {
            *pixel = if x < 2 { Rgb([0, 0, 0]) } else { Rgb([255, 255, 255]) };
        }
        picture.save(&path).unwrap();

        let frame = load_frame(&path, Dimensions::new(4, 2), BitDepth::Gray4).unwrap();
        assert_eq!(frame.format(), FrameFormat::Gray(BitDepth::Gray4));
        assert_eq!(frame.raster().data(), &[0, 0, 15, 15, 0, 0, 15, 15][..]);

        let source = ImageSource::open(&path, Dimensions::new(4, 2), BitDepth::Rgb24).unwrap();
        assert_eq!(source.frame().format(), FrameFormat::Rgb24);
        assert_eq!(source.frame().raster().data().len(), 24);

        std::fs::remove_file(path).unwrap();
    }

    #[test]
    fn missing_file_is_a_construction_error() {
        assert!(ImageSource::open("/nonexistent/idle.png", Dimensions::new(128, 32), BitDepth::Gray4).is_err());
    }
}

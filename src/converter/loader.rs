use std::path::{Path, PathBuf};

use tracing::{debug, info, instrument};

use crate::converter::{Converter, PaletteColorizer};
use crate::error::{DmdError, Result};
use crate::frame::palette::parse_palette;

/// Resolves a game name to a colorization.
pub trait ColorizationLoader: Send + Sync {
    /// `Ok(None)` means the game has no colorization.
    fn load(&self, game_name: &str) -> Result<Option<Box<dyn Converter>>>;
}

/// Looks for palette files in a colorization folder.
///
/// `<dir>/<game>.pal` is tried first, then `<dir>/<game>/<game>.pal`.
#[derive(Debug, Clone)]
pub struct PaletteDirLoader {
    dir: PathBuf,
}

impl PaletteDirLoader {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn candidates(&self, game_name: &str) -> Vec<PathBuf> {
        let file = format!("{}.pal", game_name);
        vec![self.dir.join(&file), self.dir.join(game_name).join(&file)]
    }
}

fn validate_game_name(game_name: &str) -> Result<()> {
    let valid = !game_name.is_empty()
        && game_name != "."
        && game_name != ".."
        && !game_name.contains(['/', '\\', '\0']);
    if valid {
        Ok(())
    } else {
        Err(DmdError::Protocol(format!("invalid game name {:?}", game_name)))
    }
}

impl ColorizationLoader for PaletteDirLoader {
    #[instrument(skip(self))]
    fn load(&self, game_name: &str) -> Result<Option<Box<dyn Converter>>> {
        validate_game_name(game_name)?;
        let Some(path) = self.candidates(game_name).into_iter().find(|p| p.is_file()) else {
            debug!("No palette for {} in {}", game_name, self.dir.display());
            return Ok(None);
        };
        let text = std::fs::read_to_string(&path)?;
        let palette = parse_palette(&text)?;
        let colorizer = PaletteColorizer::new(game_name, &palette)?;
        info!(
            "Loaded {} colors for {} from {}",
            palette.len(),
            game_name,
            path.display()
        );
        Ok(Some(Box::new(colorizer)))
    }
}

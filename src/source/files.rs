use image::ImageReader;
use std::path::{Path, PathBuf};

use crate::error::SourceError;
use crate::models::Frame;

/// Ordered list of image files with a cursor
#[derive(Debug, Clone, Default)]
pub struct StaticSource {
    paths: Vec<PathBuf>,
    cursor: usize,
}

impl StaticSource {
    pub fn new(paths: Vec<PathBuf>) -> Self {
        Self { paths, cursor: 0 }
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }

    pub fn current_path(&self) -> Option<&Path> {
        self.paths.get(self.cursor).map(PathBuf::as_path)
    }

    /// Move the cursor by `direction`. Returns false, leaving the cursor
    /// alone, if that would leave the list.
    pub fn step(&mut self, direction: isize) -> bool {
        let Some(target) = self.cursor.checked_add_signed(direction) else {
            return false;
        };
        if target >= self.paths.len() {
            return false;
        }
        self.cursor = target;
        true
    }

    /// Decode the image at `index`
    pub fn load(&self, index: usize) -> Result<Frame, SourceError> {
        let path = self.paths.get(index).ok_or(SourceError::IndexOutOfRange {
            index,
            len: self.paths.len(),
        })?;
        let image = ImageReader::open(path)
            .map_err(|e| SourceError::FileRead {
                path: path.clone(),
                reason: e.to_string(),
            })?
            .decode()
            .map_err(|e| SourceError::FileRead {
                path: path.clone(),
                reason: e.to_string(),
            })?;
        Ok(Frame::new(image))
    }

    pub fn load_current(&self) -> Result<Frame, SourceError> {
        self.load(self.cursor)
    }
}

use std::path::{Path, PathBuf};

use image::imageops::FilterType;
use image::{GenericImageView, RgbImage};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum TextureError {
    #[error("failed to open texture {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("failed to save texture {path}: {source}")]
    Save {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("failed to create directory {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("texture of {width}x{height} needs {expected} values, got {actual}")]
    Size {
        width: u32,
        height: u32,
        expected: usize,
        actual: usize,
    },
}

/// RGB image with linear `f32` channels in `[0, 1]`, stored pixel-interleaved.
#[derive(Debug, Clone, PartialEq)]
pub struct Texture {
    width: u32,
    height: u32,
    data: Vec<f32>,
}

impl Texture {
    pub const CHANNELS: usize = 3;

    /// Black texture of the given size.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            data: vec![0.0; pixel_count(width, height) * Self::CHANNELS],
        }
    }

    pub fn from_rgb(width: u32, height: u32, data: Vec<f32>) -> Result<Self, TextureError> {
        let expected = pixel_count(width, height) * Self::CHANNELS;
        if data.len() != expected {
            return Err(TextureError::Size {
                width,
                height,
                expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    /// Decodes an image file, resampling it to `size` when given.
    pub fn open(path: &Path, size: Option<(u32, u32)>) -> Result<Self, TextureError> {
        let mut image = image::open(path).map_err(|source| TextureError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        let (width, height) = image.dimensions();
        if let Some((target_w, target_h)) = size {
            if (width, height) != (target_w, target_h) {
                debug!(
                    path = %path.display(),
                    from = %format!("{width}x{height}"),
                    to = %format!("{target_w}x{target_h}"),
                    "resampling texture"
                );
                image = image.resize_exact(target_w, target_h, FilterType::Triangle);
            }
        }
        Ok(Self::from_image(&image.to_rgb8()))
    }

    pub fn from_image(image: &RgbImage) -> Self {
        let data = image
            .as_raw()
            .iter()
            .map(|&value| f32::from(value) / 255.0)
            .collect();
        Self {
            width: image.width(),
            height: image.height(),
            data,
        }
    }

    pub fn to_image(&self) -> RgbImage {
        let bytes = self
            .data
            .iter()
            .map(|&value| (value.clamp(0.0, 1.0) * 255.0).round() as u8)
            .collect();
        // Length is fixed by construction.
        RgbImage::from_raw(self.width, self.height, bytes)
            .unwrap_or_else(|| RgbImage::new(self.width, self.height))
    }

    /// Encodes the texture, picking the format from the file extension.
    pub fn save(&self, path: &Path) -> Result<(), TextureError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| TextureError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        self.to_image()
            .save(path)
            .map_err(|source| TextureError::Save {
                path: path.to_path_buf(),
                source,
            })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixel_count(&self) -> usize {
        pixel_count(self.width, self.height)
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<[f32; 3]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let base = (y as usize * self.width as usize + x as usize) * Self::CHANNELS;
        Some([self.data[base], self.data[base + 1], self.data[base + 2]])
    }

    pub(crate) fn replace(&mut self, width: u32, height: u32, data: Vec<f32>) {
        self.width = width;
        self.height = height;
        self.data = data;
    }
}

fn pixel_count(width: u32, height: u32) -> usize {
    width as usize * height as usize
}

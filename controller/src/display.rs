use std::path::{Path, PathBuf};

use embedded_graphics::prelude::Size;
use image::{GrayImage, Luma};
use thiserror::Error;
use tracing::{debug, info};

use epaper_dnd_common::BitmapPlane;

pub const PRIMARY_FILE: &str = "epaper_black.png";
pub const ACCENT_FILE: &str = "epaper_red.png";

#[derive(Debug, Error)]
pub enum DisplayError {
    #[error("display i/o failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to write plane image: {0}")]
    Image(#[from] image::ImageError),
    #[error("display device error: {0}")]
    Device(String),
    #[error("frame is {actual:?}, panel is {expected:?}")]
    SizeMismatch { expected: Size, actual: Size },
}

pub trait Display: Send {
    fn name(&self) -> &'static str;

    fn size(&self) -> Size;

    fn initialize(&mut self) -> Result<(), DisplayError>;

    fn clear(&mut self) -> Result<(), DisplayError>;

    fn show_frame(&mut self, primary: &BitmapPlane, accent: &BitmapPlane)
        -> Result<(), DisplayError>;

    fn sleep(&mut self) -> Result<(), DisplayError>;
}

impl<D: Display + ?Sized> Display for Box<D> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn size(&self) -> Size {
        (**self).size()
    }

    fn initialize(&mut self) -> Result<(), DisplayError> {
        (**self).initialize()
    }

    fn clear(&mut self) -> Result<(), DisplayError> {
        (**self).clear()
    }

    fn show_frame(
        &mut self,
        primary: &BitmapPlane,
        accent: &BitmapPlane,
    ) -> Result<(), DisplayError> {
        (**self).show_frame(primary, accent)
    }

    fn sleep(&mut self) -> Result<(), DisplayError> {
        (**self).sleep()
    }
}

pub fn check_size(expected: Size, plane: &BitmapPlane) -> Result<(), DisplayError> {
    let actual = Size::new(plane.width(), plane.height());
    if actual != expected {
        return Err(DisplayError::SizeMismatch { expected, actual });
    }
    Ok(())
}

#[derive(Debug)]
pub struct SimulatedDisplay {
    output_dir: PathBuf,
    size: Size,
    frames_written: u64,
}

impl SimulatedDisplay {
    pub fn new(output_dir: impl Into<PathBuf>, size: Size) -> Self {
        Self {
            output_dir: output_dir.into(),
            size,
            frames_written: 0,
        }
    }

    pub fn primary_path(&self) -> PathBuf {
        self.output_dir.join(PRIMARY_FILE)
    }

    pub fn accent_path(&self) -> PathBuf {
        self.output_dir.join(ACCENT_FILE)
    }

    pub fn frames_written(&self) -> u64 {
        self.frames_written
    }

    fn write_planes(
        &self,
        primary: &BitmapPlane,
        accent: &BitmapPlane,
    ) -> Result<(), DisplayError> {
        save_plane(primary, &self.primary_path())?;
        save_plane(accent, &self.accent_path())?;
        Ok(())
    }
}

impl Display for SimulatedDisplay {
    fn name(&self) -> &'static str {
        "simulated"
    }

    fn size(&self) -> Size {
        self.size
    }

    fn initialize(&mut self) -> Result<(), DisplayError> {
        std::fs::create_dir_all(&self.output_dir)?;
        Ok(())
    }

    fn clear(&mut self) -> Result<(), DisplayError> {
        let blank = BitmapPlane::new(self.size.width, self.size.height);
        self.write_planes(&blank, &blank)
    }

    fn show_frame(
        &mut self,
        primary: &BitmapPlane,
        accent: &BitmapPlane,
    ) -> Result<(), DisplayError> {
        check_size(self.size, primary)?;
        check_size(self.size, accent)?;
        self.write_planes(primary, accent)?;
        self.frames_written += 1;
        info!(
            "simulated frame {} saved to {} and {}",
            self.frames_written(),
            self.primary_path().display(),
            self.accent_path().display()
        );
        Ok(())
    }

    fn sleep(&mut self) -> Result<(), DisplayError> {
        debug!("simulated display sleeping");
        Ok(())
    }
}

fn plane_image(plane: &BitmapPlane) -> GrayImage {
    GrayImage::from_fn(plane.width(), plane.height(), |x, y| {
        if plane.is_ink(x, y) {
            Luma([0])
        } else {
            Luma([255])
        }
    })
}

fn save_plane(plane: &BitmapPlane, path: &Path) -> Result<(), DisplayError> {
    plane_image(plane).save(path)?;
    Ok(())
}

use anyhow::Result;
use image::RgbImage;

use crate::detect::result::Detection;

/// Object detector backend: the model behind the detection stage.
///
/// Backends receive a decoded RGB frame and return every box they find, in
/// frame pixel coordinates. Thresholding, class filtering and drawing are done
/// by `DetectionStage`, so backends should not pre-filter beyond what the
/// model itself requires.
///
/// Calls may be slow; the pipeline bounds them with a timeout and runs them on
/// a dedicated thread, hence `Send`.
pub trait DetectorBackend: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    fn detect(&mut self, image: &RgbImage) -> Result<Vec<Detection>>;

    /// Optional warm-up hook.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}

impl<B: DetectorBackend + ?Sized> DetectorBackend for Box<B> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn detect(&mut self, image: &RgbImage) -> Result<Vec<Detection>> {
        (**self).detect(image)
    }

    fn warm_up(&mut self) -> Result<()> {
        (**self).warm_up()
    }
}

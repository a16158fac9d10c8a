use anyhow::Result;

use crate::config::PipelineConfig;
use crate::detect::annotate::{decode_jpeg, draw_detections, encode_jpeg};
use crate::detect::backend::DetectorBackend;
use crate::detect::result::Detection;

/// Per-run policy applied to raw backend output.
#[derive(Clone, Debug, PartialEq)]
pub struct StageOptions {
    pub confidence_threshold: f32,
    pub target_classes: Vec<String>,
    pub jpeg_quality: u8,
}

impl StageOptions {
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            confidence_threshold: config.confidence_threshold,
            target_classes: config.target_classes.clone(),
            jpeg_quality: config.jpeg_quality,
        }
    }

    pub fn keeps(&self, detection: &Detection) -> bool {
        detection.confidence >= self.confidence_threshold
            && (self.target_classes.is_empty()
                || self
                    .target_classes
                    .iter()
                    .any(|wanted| wanted.eq_ignore_ascii_case(&detection.class_name)))
    }
}

impl Default for StageOptions {
    fn default() -> Self {
        Self::from_config(&PipelineConfig::default())
    }
}

/// Output of one stage pass.
#[derive(Clone, Debug)]
pub struct Annotated {
    pub jpeg: Vec<u8>,
    pub detections: Vec<Detection>,
}

/// `jpeg -> (annotated jpeg, detections)`.
///
/// Wraps a backend with decoding, filtering, drawing and re-encoding. When
/// nothing survives the filter the original bytes are passed through
/// untouched.
pub struct DetectionStage {
    backend: Box<dyn DetectorBackend>,
}

impl DetectionStage {
    pub fn new<B: DetectorBackend + 'static>(backend: B) -> Self {
        Self {
            backend: Box::new(backend),
        }
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    pub fn warm_up(&mut self) -> Result<()> {
        self.backend.warm_up()
    }

    pub fn process(&mut self, jpeg: &[u8], options: &StageOptions) -> Result<Annotated> {
        let mut image = decode_jpeg(jpeg)?;
        let mut detections = self.backend.detect(&image)?;
        detections.retain(|detection| options.keeps(detection));

        if detections.is_empty() {
            return Ok(Annotated {
                jpeg: jpeg.to_vec(),
                detections,
            });
        }

        draw_detections(&mut image, &detections);
        Ok(Annotated {
            jpeg: encode_jpeg(&image, options.jpeg_quality)?,
            detections,
        })
    }
}

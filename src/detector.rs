//! Object detection and jersey reading boundaries.
//!
//! The pipeline only needs something that turns a frame image into labelled boxes. Inference
//! runtimes plug in through [`TensorRuntime`]; [`YoloDetector`] does the YOLOv8 pre and post
//! processing around it. [`OnnxRuntime`] runs exported `.onnx` models on ONNX Runtime.
//! Recorded detection streams can stand in for a model.

use std::collections::HashMap;
use std::fs;
use std::io::Read;
use std::path::Path;

use anyhow::{Context, Result};
use image::RgbImage;
use image::imageops::FilterType;
use ort::session::{Session, builder::GraphOptimizationLevel};
use ort::value::Tensor;
use tracing::{debug, info};

use crate::detection::{
    DetectedObject, FrameDetection, YOLO_CONFIDENCE_THRESHOLD, YOLO_INPUT_SIZE, decode_yolov8,
};
use crate::error::ToolError;

/// COCO box rows plus class rows in a YOLOv8 head.
const YOLO_ROWS: usize = 4 + 80;
/// First field of an ONNX `ModelProto` (`ir_version`, varint) encodes as 0x08.
const ONNX_FIRST_BYTE: u8 = 0x08;

pub trait ObjectDetector: Send {
    fn detect(&mut self, frame_path: &Path) -> Result<Vec<DetectedObject>>;

    fn name(&self) -> &str;
}

/// Reads a shirt number off a person box. `None` when unreadable.
pub trait JerseyOcr: Send {
    fn read_number(&mut self, frame: &FrameDetection, person: &DetectedObject) -> Option<u32>;
}

/// Runs a model on a `[1, 3, size, size]` CHW tensor and returns the flattened first output.
pub trait TensorRuntime: Send {
    fn run(&mut self, input: &[f32], size: u32) -> Result<Vec<f32>>;
}

/// Resize to the model input and lay out as normalized CHW floats.
pub fn preprocess(img: &RgbImage, size: u32) -> Vec<f32> {
    let resized = image::imageops::resize(img, size, size, FilterType::Triangle);
    let plane = (size * size) as usize;
    let mut out = vec![0.0_f32; 3 * plane];
    for (x, y, px) in resized.enumerate_pixels() {
        let i = (y * size + x) as usize;
        out[i] = f32::from(px[0]) / 255.0;
        out[plane + i] = f32::from(px[1]) / 255.0;
        out[2 * plane + i] = f32::from(px[2]) / 255.0;
    }
    out
}

/// CPU ONNX Runtime session over the model's first input and output.
pub struct OnnxRuntime {
    session: Session,
}

impl OnnxRuntime {
    /// A runtime that cannot start is a missing tool; a file it cannot parse is a bad model.
    pub fn load(model_path: &Path) -> Result<Self> {
        let builder = Session::builder()
            .and_then(|b| b.with_optimization_level(GraphOptimizationLevel::Level3))
            .map_err(|err| ToolError::DetectorUnavailable(err.to_string()))?;
        let session = builder
            .commit_from_file(model_path)
            .map_err(|err| ToolError::ModelFormat(format!("{}: {err}", model_path.display())))?;
        info!(path = %model_path.display(), "onnx session ready");
        Ok(Self { session })
    }
}

impl TensorRuntime for OnnxRuntime {
    fn run(&mut self, input: &[f32], size: u32) -> Result<Vec<f32>> {
        let side = size as usize;
        let shape = [1, 3, side, side];
        let input_value = Tensor::from_array((shape, input.to_vec()))
            .context("build input tensor")?;
        let outputs = self
            .session
            .run(ort::inputs![input_value])
            .context("onnx inference")?;
        let (output_shape, data) = outputs[0]
            .try_extract_tensor::<f32>()
            .context("read output tensor")?;
        debug!(shape = ?output_shape, len = data.len(), "model output");
        Ok(data.to_vec())
    }
}

pub struct YoloDetector<R: TensorRuntime> {
    runtime: R,
    threshold: f32,
}

impl<R: TensorRuntime> YoloDetector<R> {
    pub fn new(runtime: R) -> Self {
        Self {
            runtime,
            threshold: YOLO_CONFIDENCE_THRESHOLD,
        }
    }
}

impl<R: TensorRuntime> ObjectDetector for YoloDetector<R> {
    fn detect(&mut self, frame_path: &Path) -> Result<Vec<DetectedObject>> {
        let img = image::open(frame_path)
            .with_context(|| format!("open frame {}", frame_path.display()))?
            .to_rgb8();
        let input = preprocess(&img, YOLO_INPUT_SIZE);
        let output = self.runtime.run(&input, YOLO_INPUT_SIZE)?;
        let candidates = output.len() / YOLO_ROWS;
        Ok(decode_yolov8(
            &output,
            candidates,
            img.width(),
            img.height(),
            self.threshold,
        ))
    }

    fn name(&self) -> &str {
        "yolov8"
    }
}

/// Replays detections recorded earlier, keyed by frame index. Frame `frame_0007.jpg` is index 6.
pub struct RecordedDetector {
    by_index: HashMap<u32, Vec<DetectedObject>>,
}

impl RecordedDetector {
    pub fn new(frames: Vec<FrameDetection>) -> Self {
        let by_index = frames
            .into_iter()
            .map(|f| (f.frame_index, f.objects))
            .collect();
        Self { by_index }
    }
}

/// Zero-based index from an extracted frame name like `frame_0001.jpg`.
pub fn frame_index_from_path(path: &Path) -> Option<u32> {
    let stem = path.file_stem()?.to_str()?;
    let n: u32 = stem.strip_prefix("frame_")?.parse().ok()?;
    n.checked_sub(1)
}

impl ObjectDetector for RecordedDetector {
    fn detect(&mut self, frame_path: &Path) -> Result<Vec<DetectedObject>> {
        let index = frame_index_from_path(frame_path)
            .with_context(|| format!("unrecognized frame name {}", frame_path.display()))?;
        Ok(self.by_index.get(&index).cloned().unwrap_or_default())
    }

    fn name(&self) -> &str {
        "recorded"
    }
}

pub trait DetectorLoader: Send + Sync {
    /// Missing or malformed models must surface as [`ToolError`] so the run can degrade.
    fn load(&self, model_path: &Path) -> Result<Box<dyn ObjectDetector>>;
}

/// Cheap sanity check before handing a file to an inference runtime.
pub fn validate_model_file(path: &Path) -> Result<()> {
    let mut file = match fs::File::open(path) {
        Ok(f) => f,
        Err(_) => return Err(ToolError::ModelMissing(path.display().to_string()).into()),
    };
    let mut first = [0u8; 1];
    let read = file
        .read(&mut first)
        .map_err(|err| ToolError::ModelFormat(format!("{}: {err}", path.display())))?;
    if read == 0 || first[0] != ONNX_FIRST_BYTE {
        return Err(ToolError::ModelFormat(format!(
            "{} is not an ONNX model; export it with `yolo export format=onnx`",
            path.display()
        ))
        .into());
    }
    Ok(())
}

/// `.json` paths load a recorded detection stream. Anything else must be an ONNX model, run
/// through [`OnnxRuntime`].
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultDetectorLoader;

impl DetectorLoader for DefaultDetectorLoader {
    fn load(&self, model_path: &Path) -> Result<Box<dyn ObjectDetector>> {
        let is_json = model_path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("json"));
        if is_json {
            let raw = fs::read_to_string(model_path)
                .map_err(|_| ToolError::ModelMissing(model_path.display().to_string()))?;
            let frames: Vec<FrameDetection> = serde_json::from_str(&raw)
                .map_err(|err| ToolError::ModelFormat(format!("{}: {err}", model_path.display())))?;
            info!(frames = frames.len(), path = %model_path.display(), "loaded recorded detections");
            return Ok(Box::new(RecordedDetector::new(frames)));
        }

        validate_model_file(model_path)?;
        debug!(path = %model_path.display(), "model file looks valid");
        let runtime = OnnxRuntime::load(model_path)?;
        Ok(Box::new(YoloDetector::new(runtime)))
    }
}

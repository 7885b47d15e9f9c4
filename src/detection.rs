use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::pitch::FieldPoint;

pub const PERSON_LABEL: &str = "person";
pub const BALL_LABEL: &str = "sports ball";

pub const YOLO_INPUT_SIZE: u32 = 640;
pub const YOLO_CONFIDENCE_THRESHOLD: f32 = 0.25;
const YOLO_BOX_ROWS: usize = 4;

/// One bounding box reported by the detector, in source-image pixel space.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectedObject {
    pub label: String,
    pub confidence: f32,
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl DetectedObject {
    pub fn is_person(&self) -> bool {
        self.label == PERSON_LABEL
    }

    pub fn is_ball(&self) -> bool {
        self.label == BALL_LABEL
    }

    pub fn center(&self) -> (f32, f32) {
        (self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    /// Box centre normalized against the observed frame extent.
    pub fn normalized_center(&self, extent: FrameExtent) -> FieldPoint {
        let (cx, cy) = self.center();
        FieldPoint::new(
            f64::from(cx) / f64::from(extent.width),
            f64::from(cy) / f64::from(extent.height),
        )
    }
}

/// Detector output for one sampled frame. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameDetection {
    pub frame_index: u32,
    pub timestamp_seconds: u32,
    #[serde(default)]
    pub objects: Vec<DetectedObject>,
    /// Source image, when the frame is still on disk. Only colour/OCR sampling reads it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frame_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameExtent {
    pub width: f32,
    pub height: f32,
}

impl FrameDetection {
    pub fn new(frame_index: u32, timestamp_seconds: u32, objects: Vec<DetectedObject>) -> Self {
        Self {
            frame_index,
            timestamp_seconds,
            objects,
            frame_path: None,
        }
    }

    /// Highest-confidence ball box, if any.
    pub fn ball(&self) -> Option<&DetectedObject> {
        self.objects
            .iter()
            .filter(|o| o.is_ball())
            .max_by(|a, b| a.confidence.total_cmp(&b.confidence))
    }

    pub fn has_ball(&self) -> bool {
        self.objects.iter().any(DetectedObject::is_ball)
    }

    pub fn persons(&self) -> Vec<&DetectedObject> {
        self.objects.iter().filter(|o| o.is_person()).collect()
    }

    /// There is no camera calibration, so the frame is measured by the furthest box edge seen
    /// in it. Never smaller than one pixel on either axis.
    pub fn extent(&self) -> FrameExtent {
        let width = self
            .objects
            .iter()
            .map(|o| o.x + o.width)
            .fold(1.0_f32, f32::max);
        let height = self
            .objects
            .iter()
            .map(|o| o.y + o.height)
            .fold(1.0_f32, f32::max);
        FrameExtent { width, height }
    }
}

/// Frames the classifier walks: every frame with a ball, in timestamp order. When the stream has
/// no ball at all, a uniformly decimated subsample (about ten frames) is used instead.
pub fn candidate_frames(frames: &[FrameDetection]) -> Vec<&FrameDetection> {
    let mut with_ball: Vec<&FrameDetection> = frames.iter().filter(|f| f.has_ball()).collect();
    if !with_ball.is_empty() {
        with_ball.sort_by_key(|f| f.timestamp_seconds);
        return with_ball;
    }

    let step = (frames.len() / 10).max(1);
    let mut sampled: Vec<&FrameDetection> = frames.iter().step_by(step).collect();
    sampled.sort_by_key(|f| f.timestamp_seconds);
    sampled
}

/// Peak simultaneous person count, clamped to a plausible 10..=22 squad size.
pub fn estimate_player_count(frames: &[FrameDetection]) -> usize {
    let peak = frames
        .iter()
        .map(|f| f.objects.iter().filter(|o| o.is_person()).count())
        .max()
        .unwrap_or(22);
    peak.clamp(10, 22)
}

pub fn coco_label(class_id: usize) -> &'static str {
    const COCO_CLASSES: [&str; 80] = [
        "person",
        "bicycle",
        "car",
        "motorcycle",
        "airplane",
        "bus",
        "train",
        "truck",
        "boat",
        "traffic light",
        "fire hydrant",
        "stop sign",
        "parking meter",
        "bench",
        "bird",
        "cat",
        "dog",
        "horse",
        "sheep",
        "cow",
        "elephant",
        "bear",
        "zebra",
        "giraffe",
        "backpack",
        "umbrella",
        "handbag",
        "tie",
        "suitcase",
        "frisbee",
        "skis",
        "snowboard",
        "sports ball",
        "kite",
        "baseball bat",
        "baseball glove",
        "skateboard",
        "surfboard",
        "tennis racket",
        "bottle",
        "wine glass",
        "cup",
        "fork",
        "knife",
        "spoon",
        "bowl",
        "banana",
        "apple",
        "sandwich",
        "orange",
        "broccoli",
        "carrot",
        "hot dog",
        "pizza",
        "donut",
        "cake",
        "chair",
        "couch",
        "potted plant",
        "bed",
        "dining table",
        "toilet",
        "tv",
        "laptop",
        "mouse",
        "remote",
        "keyboard",
        "cell phone",
        "microwave",
        "oven",
        "toaster",
        "sink",
        "refrigerator",
        "book",
        "clock",
        "vase",
        "scissors",
        "teddy bear",
        "hair drier",
        "toothbrush",
    ];
    COCO_CLASSES.get(class_id).copied().unwrap_or("unknown")
}

/// Decode a raw YOLOv8 head (`[1, 4 + classes, candidates]`, row-major) into pixel-space boxes.
///
/// Box rows hold centre x/y and width/height in model-input pixels; they are rescaled to the
/// original image. Candidates whose best class score is below `threshold` are dropped. No NMS is
/// applied: the event heuristics only ever look at the best ball and the nearest person.
pub fn decode_yolov8(
    output: &[f32],
    candidates: usize,
    image_width: u32,
    image_height: u32,
    threshold: f32,
) -> Vec<DetectedObject> {
    if candidates == 0 || output.len() % candidates != 0 {
        return Vec::new();
    }
    let rows = output.len() / candidates;
    if rows <= YOLO_BOX_ROWS {
        return Vec::new();
    }

    let at = |row: usize, i: usize| output[row * candidates + i];
    let sx = image_width as f32 / YOLO_INPUT_SIZE as f32;
    let sy = image_height as f32 / YOLO_INPUT_SIZE as f32;

    let mut out = Vec::new();
    for i in 0..candidates {
        let mut best_score = 0.0_f32;
        let mut best_class = 0usize;
        for row in YOLO_BOX_ROWS..rows {
            let score = at(row, i);
            if score > best_score {
                best_score = score;
                best_class = row - YOLO_BOX_ROWS;
            }
        }
        if best_score < threshold {
            continue;
        }

        let (cx, cy, w, h) = (at(0, i), at(1, i), at(2, i), at(3, i));
        out.push(DetectedObject {
            label: coco_label(best_class).to_string(),
            confidence: best_score,
            x: (cx - w / 2.0) * sx,
            y: (cy - h / 2.0) * sy,
            width: w * sx,
            height: h * sy,
        });
    }
    out
}

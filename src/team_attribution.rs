use std::path::{Path, PathBuf};

use image::RgbImage;
use tracing::debug;

use crate::detection::{DetectedObject, FrameDetection};
use crate::roster::{ReferenceColors, Rgb, Team};

/// Share of the box height skipped from the top before the jersey starts (head).
const JERSEY_TOP: f32 = 0.15;
/// Share of the box height sampled as jersey.
const JERSEY_SPAN: f32 = 0.40;
const GRID_COLUMNS: u32 = 10;
const GRID_ROWS: u32 = 5;

/// Reads a representative jersey colour for a person box. Implementations may fail silently;
/// attribution then falls back to field position.
pub trait ColorSampler: Send {
    fn sample(&mut self, frame: &FrameDetection, person: &DetectedObject) -> Option<Rgb>;
}

/// Samples colours from the frame image on disk, keeping the last decoded frame around since
/// consecutive lookups usually hit the same file.
#[derive(Default)]
pub struct ImageColorSampler {
    cached: Option<(PathBuf, RgbImage)>,
}

impl ImageColorSampler {
    pub fn new() -> Self {
        Self::default()
    }

    fn image_for(&mut self, path: &Path) -> Option<&RgbImage> {
        let hit = self.cached.as_ref().is_some_and(|(p, _)| p == path);
        if !hit {
            match image::open(path) {
                Ok(img) => self.cached = Some((path.to_path_buf(), img.to_rgb8())),
                Err(err) => {
                    debug!(path = %path.display(), %err, "frame image unreadable for colour sampling");
                    return None;
                }
            }
        }
        self.cached.as_ref().map(|(_, img)| img)
    }
}

impl ColorSampler for ImageColorSampler {
    fn sample(&mut self, frame: &FrameDetection, person: &DetectedObject) -> Option<Rgb> {
        let path = frame.frame_path.as_deref()?;
        let img = self.image_for(path)?;
        Some(average_jersey_color(img, person))
    }
}

/// Mean colour over a uniform grid in the torso band of `person`. Degenerate or off-image boxes
/// give neutral gray.
pub fn average_jersey_color(img: &RgbImage, person: &DetectedObject) -> Rgb {
    let (img_w, img_h) = img.dimensions();
    let x0 = person.x.max(0.0) as u32;
    let y0 = person.y.max(0.0) as u32;
    if x0 >= img_w || y0 >= img_h || person.width <= 0.0 || person.height <= 0.0 {
        return Rgb::GRAY;
    }
    let width = (person.width as u32).min(img_w - x0);
    let height = (person.height as u32).min(img_h - y0);

    let band_top = y0 + (height as f32 * JERSEY_TOP) as u32;
    let band_height = (height as f32 * JERSEY_SPAN) as u32;
    let step_x = (width / GRID_COLUMNS).max(1);
    let step_y = (band_height / GRID_ROWS).max(1);

    let (mut sr, mut sg, mut sb, mut n) = (0u64, 0u64, 0u64, 0u64);
    let mut sx = x0;
    while sx < x0 + width && sx < img_w {
        let mut sy = band_top;
        while sy < band_top + band_height && sy < img_h {
            let px = img.get_pixel(sx, sy);
            sr += u64::from(px[0]);
            sg += u64::from(px[1]);
            sb += u64::from(px[2]);
            n += 1;
            sy += step_y;
        }
        sx += step_x;
    }

    if n == 0 {
        return Rgb::GRAY;
    }
    Rgb::new((sr / n) as u8, (sg / n) as u8, (sb / n) as u8)
}

/// Left half of the pitch is Home, right half is Away.
pub fn team_by_position(x: f64) -> Team {
    if x < 0.5 { Team::Home } else { Team::Away }
}

pub fn team_by_color(sample: Rgb, colors: ReferenceColors) -> Team {
    if sample.distance(colors.home) < sample.distance(colors.away) {
        Team::Home
    } else {
        Team::Away
    }
}

/// Decides which side a detected person plays for. Always returns a team.
pub struct TeamAttributor {
    colors: Option<ReferenceColors>,
    sampler: Option<Box<dyn ColorSampler>>,
}

impl TeamAttributor {
    pub fn new(colors: Option<ReferenceColors>, sampler: Option<Box<dyn ColorSampler>>) -> Self {
        Self { colors, sampler }
    }

    pub fn positional() -> Self {
        Self::new(None, None)
    }

    /// `field_x` is the normalized horizontal position used when colour is unavailable.
    pub fn attribute(
        &mut self,
        frame: &FrameDetection,
        person: Option<&DetectedObject>,
        field_x: f64,
    ) -> Team {
        if let (Some(colors), Some(person), Some(sampler)) =
            (self.colors, person, self.sampler.as_mut())
            && let Some(sample) = sampler.sample(frame, person)
        {
            return team_by_color(sample, colors);
        }
        team_by_position(field_x)
    }
}

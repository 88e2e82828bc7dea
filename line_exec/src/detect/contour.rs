//! Contour based line detector for camera images
//!
//! The line is found as the largest blob in a band at the bottom centre of the frame, the part of
//! the image the robot is about to drive over.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use image::{DynamicImage, GenericImageView, GrayImage, Luma, Rgb, RgbImage};
use imageproc::{
    contours::{find_contours, BorderType, Contour},
    distance_transform::Norm,
    drawing::{draw_filled_circle_mut, draw_hollow_rect_mut},
    morphology,
    point::Point,
    rect::Rect,
};
use log::{debug, info};
use serde::Deserialize;

use super::{ConfigError, DetectError, Detector, Polarity};
use crate::eqpt::RawFrame;

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Radius of the square opening element, 2 gives a 5x5 square.
const OPEN_RADIUS: u8 = 2;

/// Value of foreground pixels in the binary image.
const FOREGROUND: u8 = 255;

const ROI_COLOUR: Rgb<u8> = Rgb([255, 255, 0]);
const CONTOUR_COLOUR: Rgb<u8> = Rgb([0, 255, 0]);
const CENTROID_COLOUR: Rgb<u8> = Rgb([255, 0, 0]);
const CENTROID_RADIUS_PX: i32 = 6;

/// BT.601 luma weights in 14 bit fixed point (0.299, 0.587, 0.114).
const LUMA_WEIGHTS: [u32; 3] = [4899, 9617, 1868];
const LUMA_SHIFT: u32 = 14;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Parameters for the [`ContourDetector`].
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct ContourParams {
    /// Intensity separating the line from the floor.
    pub threshold: u8,

    /// Whether the line is darker or lighter than the floor.
    pub polarity: Polarity,

    /// Blobs smaller than this are treated as noise.
    ///
    /// Units: pixels squared
    pub min_contour_area: f64,

    /// Keep an annotated copy of the last frame for diagnostics.
    pub debug_draw: bool,
}

/// Finds the centroid of the largest contour in the region of interest.
pub struct ContourDetector {
    params: ContourParams,
    last_debug_image: Option<RgbImage>,
}

/// Region of interest within a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Roi {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Raw spatial moments of a polygon, up to first order.
#[derive(Debug, Clone, Copy, Default)]
struct Moments {
    m00: f64,
    m10: f64,
    m01: f64,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Default for ContourParams {
    fn default() -> Self {
        Self {
            threshold: 120,
            polarity: Polarity::Dark,
            min_contour_area: 300.0,
            debug_draw: false,
        }
    }
}

impl Roi {
    /// The bottom half, middle half of a `width` x `height` frame.
    pub fn centre_bottom(width: u32, height: u32) -> Self {
        Self {
            x: width / 4,
            y: height / 2,
            width: 3 * width / 4 - width / 4,
            height: height - height / 2,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

impl ContourDetector {
    pub fn new(params: ContourParams) -> Result<Self, ConfigError> {
        if !params.min_contour_area.is_finite() || params.min_contour_area < 0.0 {
            return Err(ConfigError::InvalidMinArea(params.min_contour_area));
        }

        info!("Contour detector initialised with {:?}", params);

        Ok(Self {
            params,
            last_debug_image: None,
        })
    }

    /// Find the steering direction towards the line in the image.
    ///
    /// Images too small to hold a region of interest give `0.0`, as does an image with no line in
    /// it.
    pub fn detect_image(&mut self, image: &DynamicImage) -> Result<f64, DetectError> {
        if self.params.debug_draw {
            self.last_debug_image = None;
        }

        let (w, h) = image.dimensions();
        let roi = Roi::centre_bottom(w, h);
        if roi.is_empty() {
            debug!("Image {}x{} too small for a region of interest", w, h);
            return Ok(0.0);
        }

        let roi_rgb = image.crop_imm(roi.x, roi.y, roi.width, roi.height).to_rgb8();
        let gray = bt601_luma(&roi_rgb);
        let binary = morphology::open(&self.binarise(&gray), Norm::LInf, OPEN_RADIUS);

        let contours = find_contours::<i32>(&binary);
        let external: Vec<&Contour<i32>> = contours
            .iter()
            .filter(|c| matches!(c.border_type, BorderType::Outer) && c.parent.is_none())
            .collect();

        if external.is_empty() {
            debug!("No contours found");
            return Ok(0.0);
        }

        let (contour, moments) = external
            .iter()
            .map(|c| (*c, polygon_moments(&c.points)))
            .fold(None, |best: Option<(&Contour<i32>, Moments)>, (c, m)| match best {
                Some((_, bm)) if bm.area() >= m.area() => best,
                _ => Some((c, m)),
            })
            .ok_or_else(|| DetectError::Perception(String::from("contour selection failed")))?;

        debug!(
            "Found {} contours, largest area={:.2}",
            external.len(),
            moments.area()
        );

        if !moments.m00.is_finite() || !moments.m10.is_finite() || !moments.m01.is_finite() {
            return Err(DetectError::Perception(format!(
                "non-finite contour moments {:?}",
                moments
            )));
        }

        if moments.area() < self.params.min_contour_area {
            debug!("Contour too small");
            return Ok(0.0);
        }

        if moments.m00 == 0.0 {
            return Ok(0.0);
        }

        let cx = (moments.m10 / moments.m00).trunc();
        let roi_centre_x = roi.width as f64 / 2.0;

        let steering = util::maths::clamp_abs(-(cx - roi_centre_x) / roi_centre_x, 1.0);

        debug!("cx={} steering={:.3}", cx, steering);

        if self.params.debug_draw {
            let cy = (moments.m01 / moments.m00).trunc();
            self.last_debug_image = Some(draw_debug(image, &roi, contour, (cx, cy)));
        }

        Ok(steering)
    }

    /// Threshold the image so that line pixels are foreground.
    fn binarise(&self, gray: &GrayImage) -> GrayImage {
        let threshold = self.params.threshold;
        let polarity = self.params.polarity;

        GrayImage::from_fn(gray.width(), gray.height(), |x, y| {
            let v = gray.get_pixel(x, y)[0];
            let on_line = match polarity {
                Polarity::Dark => v <= threshold,
                Polarity::Light => v > threshold,
            };

            Luma([if on_line { FOREGROUND } else { 0 }])
        })
    }
}

impl Detector for ContourDetector {
    fn detect(&mut self, frame: &RawFrame) -> Result<f64, DetectError> {
        match frame {
            RawFrame::Image(image) => self.detect_image(image),
            RawFrame::Grayscale(_) => Err(DetectError::InvalidInput(String::from(
                "contour detector requires an image, got grayscale readings",
            ))),
        }
    }

    fn debug_image(&self) -> Option<&RgbImage> {
        self.last_debug_image.as_ref()
    }
}

impl Moments {
    fn area(&self) -> f64 {
        self.m00.abs()
    }
}

// ------------------------------------------------------------------------------------------------
// FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Moments of the closed polygon through `points`, by Green's theorem.
///
/// The sign of all three moments follows the winding direction, so ratios between them are
/// unaffected by it.
fn polygon_moments(points: &[Point<i32>]) -> Moments {
    let n = points.len();
    if n < 3 {
        return Moments::default();
    }

    let mut m = Moments::default();
    for i in 0..n {
        let p = points[i];
        let q = points[(i + 1) % n];
        let (px, py, qx, qy) = (p.x as f64, p.y as f64, q.x as f64, q.y as f64);

        let cross = px * qy - qx * py;
        m.m00 += cross;
        m.m10 += (px + qx) * cross;
        m.m01 += (py + qy) * cross;
    }

    Moments {
        m00: m.m00 / 2.0,
        m10: m.m10 / 6.0,
        m01: m.m01 / 6.0,
    }
}

/// Grayscale with BT.601 weights, rounded to nearest.
///
/// `image`'s own conversion uses Rec. 709 weights, which moves coloured lines relative to the
/// threshold.
fn bt601_luma(rgb: &RgbImage) -> GrayImage {
    GrayImage::from_fn(rgb.width(), rgb.height(), |x, y| {
        let Rgb([r, g, b]) = *rgb.get_pixel(x, y);
        let sum = LUMA_WEIGHTS[0] * r as u32
            + LUMA_WEIGHTS[1] * g as u32
            + LUMA_WEIGHTS[2] * b as u32;

        Luma([((sum + (1 << (LUMA_SHIFT - 1))) >> LUMA_SHIFT) as u8])
    })
}

/// Copy of the frame with the region of interest, contour and centroid drawn on.
fn draw_debug(
    image: &DynamicImage,
    roi: &Roi,
    contour: &Contour<i32>,
    centroid_roi: (f64, f64),
) -> RgbImage {
    let mut debug_img = image.to_rgb8();

    draw_hollow_rect_mut(
        &mut debug_img,
        Rect::at(roi.x as i32, roi.y as i32).of_size(roi.width, roi.height),
        ROI_COLOUR,
    );

    for p in contour.points.iter() {
        let x = (p.x + roi.x as i32) as u32;
        let y = (p.y + roi.y as i32) as u32;
        if x < debug_img.width() && y < debug_img.height() {
            debug_img.put_pixel(x, y, CONTOUR_COLOUR);
        }
    }

    draw_filled_circle_mut(
        &mut debug_img,
        (
            centroid_roi.0 as i32 + roi.x as i32,
            centroid_roi.1 as i32 + roi.y as i32,
        ),
        CENTROID_RADIUS_PX,
        CENTROID_COLOUR,
    );

    debug_img
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

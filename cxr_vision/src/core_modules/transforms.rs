// THEORY:
// The `transforms` module is the augmentation layer between a decoded radiograph and
// the tensor handed to a model. It has two kinds of stage:
//
// 1.  **Image stages** (`ImageTransform`): RGB image in, RGB image out. Resizing,
//     flips, rotations, crops and colour jitter all live here. Random stages draw
//     from the generator passed to `apply`, never from a global one, so a seeded
//     generator reproduces the exact same augmentation.
// 2.  **Tensor stages**: after the image stages, `Compose` converts to an
//     `ImageTensor` (ToTensor) and optionally standardises it (`Normalize`).
//
// Splitting the two kinds in the type system means a pipeline can never apply an
// image operation to a tensor or normalise twice. Parameters are validated when a
// stage is built, so `apply` only fails on inputs it cannot process (empty images).

use std::fmt;

use image::imageops::{self, FilterType};
use image::{Rgb, RgbImage};
use rand::seq::SliceRandom;
use rand::{Rng, RngCore};
use serde::Serialize;

use crate::core_modules::pixel::pixel::Pixel;
use crate::core_modules::tensor::ImageTensor;
use crate::error::{Error, Result};

pub const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
pub const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Side length of the square images fed to the model.
pub const MODEL_INPUT_SIZE: u32 = 224;

/// An RGB-to-RGB image stage.
pub trait ImageTransform: Send + Sync + fmt::Debug {
    fn apply(&self, image: RgbImage, rng: &mut dyn RngCore) -> Result<RgbImage>;
}

fn invalid(message: impl Into<String>) -> Error {
    Error::InvalidTransform(message.into())
}

// ---------------------------------------------------------------------------
// Resize
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Size {
    Exact { height: u32, width: u32 },
    /// Scale so the shorter side has this length, keeping the aspect ratio.
    ShorterSide(u32),
}

impl Size {
    /// Output (width, height) for an input of `width` x `height`.
    pub fn target(&self, width: u32, height: u32) -> (u32, u32) {
        match *self {
            Size::Exact { height: h, width: w } => (w, h),
            Size::ShorterSide(side) if width <= height => {
                (side, (side as u64 * height as u64 / width.max(1) as u64) as u32)
            }
            Size::ShorterSide(side) => {
                ((side as u64 * width as u64 / height.max(1) as u64) as u32, side)
            }
        }
    }
}

/// Bilinear resize.
#[derive(Debug, Clone)]
pub struct Resize {
    size: Size,
}

impl Resize {
    pub fn new(size: Size) -> Result<Self> {
        let valid = match size {
            Size::Exact { height, width } => height > 0 && width > 0,
            Size::ShorterSide(side) => side > 0,
        };
        if !valid {
            return Err(invalid(format!("resize target {size:?} has a zero dimension")));
        }
        Ok(Self { size })
    }
}

impl ImageTransform for Resize {
    fn apply(&self, image: RgbImage, _rng: &mut dyn RngCore) -> Result<RgbImage> {
        let (width, height) = self.size.target(image.width(), image.height());
        if (width, height) == image.dimensions() {
            return Ok(image);
        }
        Ok(imageops::resize(&image, width, height, FilterType::Triangle))
    }
}

// ---------------------------------------------------------------------------
// Flip and rotation
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct RandomHorizontalFlip {
    p: f64,
}

impl RandomHorizontalFlip {
    pub fn new(p: f64) -> Result<Self> {
        if !(0.0..=1.0).contains(&p) {
            return Err(invalid(format!("flip probability {p} is outside [0, 1]")));
        }
        Ok(Self { p })
    }
}

impl Default for RandomHorizontalFlip {
    fn default() -> Self {
        Self { p: 0.5 }
    }
}

impl ImageTransform for RandomHorizontalFlip {
    fn apply(&self, image: RgbImage, rng: &mut dyn RngCore) -> Result<RgbImage> {
        if rng.gen_bool(self.p) {
            Ok(imageops::flip_horizontal(&image))
        } else {
            Ok(image)
        }
    }
}

/// Rotates by an angle drawn uniformly from `[-degrees, degrees]`.
#[derive(Debug, Clone)]
pub struct RandomRotation {
    degrees: f32,
}

impl RandomRotation {
    pub fn new(degrees: f32) -> Result<Self> {
        if !degrees.is_finite() || degrees < 0.0 {
            return Err(invalid(format!("rotation range {degrees} must be a non-negative angle")));
        }
        Ok(Self { degrees })
    }
}

impl ImageTransform for RandomRotation {
    fn apply(&self, image: RgbImage, rng: &mut dyn RngCore) -> Result<RgbImage> {
        if self.degrees == 0.0 {
            return Ok(image);
        }
        let angle = rng.gen_range(-self.degrees..=self.degrees);
        Ok(rotate(&image, angle))
    }
}

/// Counter-clockwise rotation about the image centre on the same canvas.
/// Nearest-neighbour sampling; uncovered pixels are black.
pub fn rotate(image: &RgbImage, degrees: f32) -> RgbImage {
    let (width, height) = image.dimensions();
    let cx = (width as f32 - 1.0) * 0.5;
    let cy = (height as f32 - 1.0) * 0.5;
    let (sin, cos) = degrees.to_radians().sin_cos();

    RgbImage::from_fn(width, height, |x, y| {
        let dx = x as f32 - cx;
        let dy = y as f32 - cy;
        let sx = (cos * dx - sin * dy + cx).round();
        let sy = (sin * dx + cos * dy + cy).round();
        if sx >= 0.0 && sy >= 0.0 && sx < width as f32 && sy < height as f32 {
            *image.get_pixel(sx as u32, sy as u32)
        } else {
            Rgb([0, 0, 0])
        }
    })
}

// ---------------------------------------------------------------------------
// Random resized crop
// ---------------------------------------------------------------------------

const CROP_ATTEMPTS: usize = 10;

/// Crops a random region (area fraction in `scale`, aspect ratio in `ratio`) and
/// resizes it to `size` x `size`.
#[derive(Debug, Clone)]
pub struct RandomResizedCrop {
    size: u32,
    scale: (f64, f64),
    ratio: (f64, f64),
}

/// A crop window in pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropWindow {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl RandomResizedCrop {
    pub fn new(size: u32, scale: (f64, f64), ratio: (f64, f64)) -> Result<Self> {
        if size == 0 {
            return Err(invalid("crop size must be positive"));
        }
        if !(scale.0 > 0.0 && scale.0 <= scale.1 && scale.1 <= 1.0) {
            return Err(invalid(format!("crop scale {scale:?} must satisfy 0 < min <= max <= 1")));
        }
        if !(ratio.0 > 0.0 && ratio.0 <= ratio.1) {
            return Err(invalid(format!("crop ratio {ratio:?} must satisfy 0 < min <= max")));
        }
        Ok(Self { size, scale, ratio })
    }

    pub fn with_size(size: u32) -> Result<Self> {
        Self::new(size, (0.08, 1.0), (3.0 / 4.0, 4.0 / 3.0))
    }

    /// Picks the crop window for an image of `width` x `height`.
    pub fn window(&self, width: u32, height: u32, rng: &mut dyn RngCore) -> CropWindow {
        let area = width as f64 * height as f64;
        let log_ratio = (self.ratio.0.ln(), self.ratio.1.ln());

        for _ in 0..CROP_ATTEMPTS {
            let target_area = area * rng.gen_range(self.scale.0..=self.scale.1);
            let aspect = rng.gen_range(log_ratio.0..=log_ratio.1).exp();
            let w = (target_area * aspect).sqrt().round() as u32;
            let h = (target_area / aspect).sqrt().round() as u32;

            if w > 0 && h > 0 && w <= width && h <= height {
                return CropWindow {
                    x: rng.gen_range(0..=width - w),
                    y: rng.gen_range(0..=height - h),
                    width: w,
                    height: h,
                };
            }
        }

        // Fall back to the largest centred window whose aspect is within range.
        let in_ratio = width as f64 / height as f64;
        let (w, h) = if in_ratio < self.ratio.0 {
            (width, ((width as f64 / self.ratio.0).round() as u32).clamp(1, height))
        } else if in_ratio > self.ratio.1 {
            (((height as f64 * self.ratio.1).round() as u32).clamp(1, width), height)
        } else {
            (width, height)
        };
        CropWindow {
            x: (width - w) / 2,
            y: (height - h) / 2,
            width: w,
            height: h,
        }
    }
}

impl ImageTransform for RandomResizedCrop {
    fn apply(&self, image: RgbImage, rng: &mut dyn RngCore) -> Result<RgbImage> {
        let window = self.window(image.width(), image.height(), rng);
        let cropped =
            imageops::crop_imm(&image, window.x, window.y, window.width, window.height).to_image();
        Ok(imageops::resize(&cropped, self.size, self.size, FilterType::Triangle))
    }
}

// ---------------------------------------------------------------------------
// Colour jitter
// ---------------------------------------------------------------------------

/// Random brightness, contrast, saturation and hue changes, applied in random order.
#[derive(Debug, Clone)]
pub struct ColorJitter {
    brightness: Option<(f32, f32)>,
    contrast: Option<(f32, f32)>,
    saturation: Option<(f32, f32)>,
    hue: Option<(f32, f32)>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Adjustment {
    Brightness(f32),
    Contrast(f32),
    Saturation(f32),
    Hue(f32),
}

impl ColorJitter {
    pub fn new(brightness: f32, contrast: f32, saturation: f32, hue: f32) -> Result<Self> {
        for (name, value) in [
            ("brightness", brightness),
            ("contrast", contrast),
            ("saturation", saturation),
            ("hue", hue),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(invalid(format!("{name} jitter {value} must be non-negative")));
            }
        }
        if hue > 0.5 {
            return Err(invalid(format!("hue jitter {hue} must be at most 0.5")));
        }
        Ok(Self::from_strengths(brightness, contrast, saturation, hue))
    }

    fn from_strengths(brightness: f32, contrast: f32, saturation: f32, hue: f32) -> Self {
        let factor_range = |x: f32| (x > 0.0).then(|| ((1.0 - x).max(0.0), 1.0 + x));
        Self {
            brightness: factor_range(brightness),
            contrast: factor_range(contrast),
            saturation: factor_range(saturation),
            hue: (hue > 0.0).then_some((-hue, hue)),
        }
    }

    fn sample_adjustments(&self, rng: &mut dyn RngCore) -> Vec<Adjustment> {
        let mut order = [0usize, 1, 2, 3];
        order.shuffle(&mut *rng);

        let mut draw = |range: Option<(f32, f32)>| range.map(|(lo, hi)| rng.gen_range(lo..=hi));
        let factors = [
            draw(self.brightness).map(Adjustment::Brightness),
            draw(self.contrast).map(Adjustment::Contrast),
            draw(self.saturation).map(Adjustment::Saturation),
            draw(self.hue).map(Adjustment::Hue),
        ];
        order.iter().filter_map(|&i| factors[i]).collect()
    }
}

fn adjust(pixels: &mut [Pixel], adjustment: Adjustment) {
    match adjustment {
        Adjustment::Brightness(factor) => {
            let black = Pixel::grey(0.0);
            pixels.iter_mut().for_each(|p| *p = p.blend(&black, factor));
        }
        Adjustment::Contrast(factor) => {
            let mean = pixels.iter().map(Pixel::luminance).sum::<f32>() / pixels.len().max(1) as f32;
            let grey = Pixel::grey(mean);
            pixels.iter_mut().for_each(|p| *p = p.blend(&grey, factor));
        }
        Adjustment::Saturation(factor) => {
            pixels
                .iter_mut()
                .for_each(|p| *p = p.blend(&Pixel::grey(p.luminance()), factor));
        }
        Adjustment::Hue(shift) => {
            pixels.iter_mut().for_each(|p| {
                let (h, s, v) = p.to_hsv();
                *p = Pixel::from_hsv(h + shift, s, v);
            });
        }
    }
}

impl ImageTransform for ColorJitter {
    fn apply(&self, image: RgbImage, rng: &mut dyn RngCore) -> Result<RgbImage> {
        let adjustments = self.sample_adjustments(rng);
        if adjustments.is_empty() {
            return Ok(image);
        }

        let (width, height) = image.dimensions();
        let mut pixels: Vec<Pixel> = image.pixels().map(Pixel::from).collect();
        for adjustment in adjustments {
            adjust(&mut pixels, adjustment);
        }

        let mut out = RgbImage::new(width, height);
        for (dst, src) in out.pixels_mut().zip(pixels) {
            *dst = src.into();
        }
        Ok(out)
    }
}

// ---------------------------------------------------------------------------
// Tensor stages and composition
// ---------------------------------------------------------------------------

/// Per-channel standardisation of a tensor.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Normalize {
    pub mean: [f32; 3],
    pub std: [f32; 3],
}

impl Normalize {
    pub fn new(mean: [f32; 3], std: [f32; 3]) -> Result<Self> {
        if mean.iter().chain(&std).any(|v| !v.is_finite()) {
            return Err(invalid("normalisation parameters must be finite"));
        }
        if std.contains(&0.0) {
            return Err(invalid(format!("normalisation std {std:?} contains zero")));
        }
        Ok(Self { mean, std })
    }

    pub fn imagenet() -> Self {
        Self {
            mean: IMAGENET_MEAN,
            std: IMAGENET_STD,
        }
    }
}

/// Image stages, then ToTensor, then an optional `Normalize`.
#[derive(Debug, Default)]
pub struct Compose {
    stages: Vec<Box<dyn ImageTransform>>,
    normalize: Option<Normalize>,
}

impl Compose {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn then(mut self, stage: impl ImageTransform + 'static) -> Self {
        self.stages.push(Box::new(stage));
        self
    }

    pub fn normalized(mut self, params: Normalize) -> Self {
        self.normalize = Some(params);
        self
    }

    pub fn normalization(&self) -> Option<&Normalize> {
        self.normalize.as_ref()
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Runs the image stages only.
    pub fn apply_image(&self, image: RgbImage, rng: &mut dyn RngCore) -> Result<RgbImage> {
        if image.width() == 0 || image.height() == 0 {
            return Err(invalid("cannot transform an empty image"));
        }
        self.stages
            .iter()
            .try_fold(image, |image, stage| stage.apply(image, rng))
    }

    pub fn apply(&self, image: RgbImage, rng: &mut dyn RngCore) -> Result<ImageTensor> {
        let image = self.apply_image(image, rng)?;
        let mut tensor = ImageTensor::from_rgb(&image);
        if let Some(params) = &self.normalize {
            tensor.normalize(params);
        }
        Ok(tensor)
    }
}

/// The two pipelines used by the loader.
///
/// - standard: Resize(224x224), ToTensor, Normalize(ImageNet)
/// - augment: RandomHorizontalFlip, RandomRotation(15), RandomResizedCrop(224,
///   scale 0.5-1.0), ColorJitter(0.1 each), ToTensor, Normalize(ImageNet)
pub fn get_transforms(augment: bool) -> Compose {
    let compose = if augment {
        Compose::new()
            .then(RandomHorizontalFlip::default())
            .then(RandomRotation { degrees: 15.0 })
            .then(RandomResizedCrop {
                size: MODEL_INPUT_SIZE,
                scale: (0.5, 1.0),
                ratio: (3.0 / 4.0, 4.0 / 3.0),
            })
            .then(ColorJitter::from_strengths(0.1, 0.1, 0.1, 0.1))
    } else {
        Compose::new().then(Resize {
            size: Size::Exact {
                height: MODEL_INPUT_SIZE,
                width: MODEL_INPUT_SIZE,
            },
        })
    };
    compose.normalized(Normalize::imagenet())
}

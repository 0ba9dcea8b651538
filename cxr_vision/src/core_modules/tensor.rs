// THEORY:
// `ImageTensor` is the channel-major (CHW) float buffer that a model consumes. It
// is produced from an RGB image by `from_rgb` (values scaled into [0, 1]) and is
// optionally standardised per channel by a `Normalize` stage.
//
// It is intentionally not a general tensor library: it only knows the shape of an
// image and the two conversions the sample pipeline needs in each direction.

use image::{Rgb, RgbImage};
use serde::Serialize;

use crate::core_modules::transforms::Normalize;

pub const RGB_CHANNELS: usize = 3;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImageTensor {
    pub channels: usize,
    pub height: usize,
    pub width: usize,
    #[serde(skip)]
    pub data: Vec<f32>,
}

impl ImageTensor {
    /// Converts an 8-bit RGB image into a CHW tensor with values in [0, 1].
    pub fn from_rgb(image: &RgbImage) -> Self {
        let (width, height) = (image.width() as usize, image.height() as usize);
        let plane = width * height;
        let mut data = vec![0.0f32; RGB_CHANNELS * plane];

        for (i, pixel) in image.pixels().enumerate() {
            for c in 0..RGB_CHANNELS {
                data[c * plane + i] = pixel[c] as f32 / 255.0;
            }
        }

        Self {
            channels: RGB_CHANNELS,
            height,
            width,
            data,
        }
    }

    pub fn shape(&self) -> (usize, usize, usize) {
        (self.channels, self.height, self.width)
    }

    pub fn get(&self, channel: usize, y: usize, x: usize) -> Option<f32> {
        if channel >= self.channels || y >= self.height || x >= self.width {
            return None;
        }
        self.data
            .get(channel * self.height * self.width + y * self.width + x)
            .copied()
    }

    /// `(v - mean[c]) / std[c]` for every value of channel `c`.
    pub fn normalize(&mut self, params: &Normalize) {
        self.for_each_channel(|c, v| (v - params.mean[c]) / params.std[c]);
    }

    /// Inverse of `normalize`.
    pub fn denormalize(&mut self, params: &Normalize) {
        self.for_each_channel(|c, v| v * params.std[c] + params.mean[c]);
    }

    /// Converts back to 8-bit RGB: `v * 255`, rounded and clamped to 0..=255.
    pub fn to_rgb_image(&self) -> RgbImage {
        let plane = self.height * self.width;
        let byte = |c: usize, i: usize| -> u8 {
            let channel = c.min(self.channels.saturating_sub(1));
            let v = self.data.get(channel * plane + i).copied().unwrap_or(0.0);
            (v * 255.0).round().clamp(0.0, 255.0) as u8
        };

        RgbImage::from_fn(self.width as u32, self.height as u32, |x, y| {
            let i = y as usize * self.width + x as usize;
            Rgb([byte(0, i), byte(1, i), byte(2, i)])
        })
    }

    fn for_each_channel(&mut self, f: impl Fn(usize, f32) -> f32) {
        let plane = self.height * self.width;
        if plane == 0 {
            return;
        }
        for (c, values) in self.data.chunks_mut(plane).enumerate() {
            let c = c.min(RGB_CHANNELS - 1);
            for v in values {
                *v = f(c, *v);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn checker() -> RgbImage {
        RgbImage::from_fn(3, 2, |x, y| Rgb([(x * 100) as u8, (y * 255) as u8, 51]))
    }

    #[test]
    fn to_tensor_is_channel_major_and_scaled() {
        let tensor = ImageTensor::from_rgb(&checker());
        assert_eq!(tensor.shape(), (3, 2, 3));
        assert_eq!(tensor.get(0, 0, 2), Some(200.0 / 255.0));
        assert_eq!(tensor.get(1, 1, 0), Some(1.0));
        assert_eq!(tensor.get(2, 1, 1), Some(0.2));
        assert_eq!(tensor.get(3, 0, 0), None);
    }

    #[test]
    fn normalize_then_denormalize_restores_image() {
        let image = checker();
        let params = Normalize::imagenet();
        let mut tensor = ImageTensor::from_rgb(&image);
        tensor.normalize(&params);

        let expected = (0.2 - params.mean[2]) / params.std[2];
        assert!((tensor.get(2, 0, 0).unwrap() - expected).abs() < 1e-6);

        tensor.denormalize(&params);
        assert_eq!(tensor.to_rgb_image(), image);
    }

    #[test]
    fn out_of_range_values_are_clamped_when_converting() {
        let tensor = ImageTensor {
            channels: 3,
            height: 1,
            width: 1,
            data: vec![-0.5, 2.0, 0.5],
        };
        assert_eq!(tensor.to_rgb_image().get_pixel(0, 0).0, [0, 255, 128]);
    }
}

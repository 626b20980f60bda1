//! Image transform pipelines for training and evaluation.
//!
//! Both pipelines end in the same resize-to-square plus per-channel
//! normalization, producing CHW float data ready for tensor construction.
//! The training pipeline additionally applies stochastic augmentation
//! (crop, flips, rotation, color jitter) driven by a caller-supplied RNG.

use image::{imageops::FilterType, DynamicImage, ImageBuffer, Rgb, RgbImage};
use rand::Rng;

use crate::config::DataSettings;

/// Deterministic evaluation transform: resize then normalize.
///
/// Applying it twice to the same decoded image yields identical output.
#[derive(Debug, Clone)]
pub struct EvalTransform {
    pub size: u32,
    pub mean: [f32; 3],
    pub std: [f32; 3],
}

impl EvalTransform {
    pub fn from_settings(data: &DataSettings) -> Self {
        Self {
            size: data.image_size,
            mean: data.normalize_mean,
            std: data.normalize_std,
        }
    }

    /// Produce normalized CHW floats of length `3 * size * size`.
    pub fn apply(&self, image: &DynamicImage) -> Vec<f32> {
        let resized = image.resize_exact(self.size, self.size, FilterType::Triangle);
        normalize_chw(&resized.to_rgb8(), &self.mean, &self.std)
    }
}

/// Stochastic training transform.
///
/// The image is first resized to `size + margin` so the random crop sees
/// genuine spatial variation, then cropped back to `size`, flipped,
/// rotated within a small angle, color-jittered, and normalized.
#[derive(Debug, Clone)]
pub struct TrainTransform {
    pub size: u32,
    pub margin: u32,
    pub mean: [f32; 3],
    pub std: [f32; 3],
    pub rotation_degrees: f32,
    pub jitter: f32,
    pub hue_jitter: f32,
}

impl TrainTransform {
    pub fn from_settings(data: &DataSettings) -> Self {
        Self {
            size: data.image_size,
            margin: data.crop_margin,
            mean: data.normalize_mean,
            std: data.normalize_std,
            rotation_degrees: 20.0,
            jitter: 0.2,
            hue_jitter: 0.1,
        }
    }

    /// Produce normalized CHW floats of length `3 * size * size`.
    ///
    /// The output length is shape-stable regardless of which augmentations
    /// fire for a given RNG draw.
    pub fn apply<R: Rng>(&self, image: &DynamicImage, rng: &mut R) -> Vec<f32> {
        let enlarged = self.size + self.margin;
        let resized = image.resize_exact(enlarged, enlarged, FilterType::Triangle);
        let mut rgb = random_crop(&resized.to_rgb8(), self.size, rng);

        if rng.gen_bool(0.5) {
            rgb = image::imageops::flip_horizontal(&rgb);
        }
        if rng.gen_bool(0.5) {
            rgb = image::imageops::flip_vertical(&rgb);
        }

        if self.rotation_degrees > 0.0 {
            let angle = rng.gen_range(-self.rotation_degrees..=self.rotation_degrees);
            if angle.abs() > 0.1 {
                rgb = rotate_bilinear(&rgb, angle);
            }
        }

        if self.jitter > 0.0 {
            let brightness = rng.gen_range(1.0 - self.jitter..=1.0 + self.jitter);
            rgb = adjust_brightness(&rgb, brightness);
            let contrast = rng.gen_range(1.0 - self.jitter..=1.0 + self.jitter);
            rgb = adjust_contrast(&rgb, contrast);
            let saturation = rng.gen_range(1.0 - self.jitter..=1.0 + self.jitter);
            rgb = adjust_saturation(&rgb, saturation);
        }
        if self.hue_jitter > 0.0 {
            let hue = rng.gen_range(-self.hue_jitter..=self.hue_jitter);
            rgb = shift_hue(&rgb, hue * 360.0);
        }

        normalize_chw(&rgb, &self.mean, &self.std)
    }
}

/// Scale pixels to [0, 1], subtract the channel mean, divide by the
/// channel std, and lay the result out channel-major (CHW).
fn normalize_chw(rgb: &RgbImage, mean: &[f32; 3], std: &[f32; 3]) -> Vec<f32> {
    let (width, height) = rgb.dimensions();
    let plane = (width * height) as usize;
    let mut data = vec![0.0f32; 3 * plane];

    for (x, y, pixel) in rgb.enumerate_pixels() {
        let idx = (y * width + x) as usize;
        for c in 0..3 {
            data[c * plane + idx] = (pixel[c] as f32 / 255.0 - mean[c]) / std[c];
        }
    }

    data
}

fn random_crop<R: Rng>(rgb: &RgbImage, size: u32, rng: &mut R) -> RgbImage {
    let (width, height) = rgb.dimensions();
    if width <= size || height <= size {
        return image::imageops::resize(rgb, size, size, FilterType::Triangle);
    }

    let x = rng.gen_range(0..=(width - size));
    let y = rng.gen_range(0..=(height - size));
    image::imageops::crop_imm(rgb, x, y, size, size).to_image()
}

/// Rotate around the image center with bilinear sampling. Pixels that
/// sample outside the source are filled black.
fn rotate_bilinear(rgb: &RgbImage, angle_degrees: f32) -> RgbImage {
    let (width, height) = rgb.dimensions();
    let theta = angle_degrees.to_radians();
    let (sin, cos) = theta.sin_cos();
    let cx = (width as f32 - 1.0) / 2.0;
    let cy = (height as f32 - 1.0) / 2.0;

    ImageBuffer::from_fn(width, height, |x, y| {
        let dx = x as f32 - cx;
        let dy = y as f32 - cy;
        // Inverse mapping: destination pixel back to source coordinates.
        let sx = cx + dx * cos + dy * sin;
        let sy = cy - dx * sin + dy * cos;
        sample_bilinear(rgb, sx, sy)
    })
}

fn sample_bilinear(rgb: &RgbImage, x: f32, y: f32) -> Rgb<u8> {
    let (width, height) = rgb.dimensions();
    if x < 0.0 || y < 0.0 || x > (width - 1) as f32 || y > (height - 1) as f32 {
        return Rgb([0, 0, 0]);
    }

    let x0 = x.floor() as u32;
    let y0 = y.floor() as u32;
    let x1 = (x0 + 1).min(width - 1);
    let y1 = (y0 + 1).min(height - 1);
    let fx = x - x0 as f32;
    let fy = y - y0 as f32;

    let p00 = rgb.get_pixel(x0, y0);
    let p10 = rgb.get_pixel(x1, y0);
    let p01 = rgb.get_pixel(x0, y1);
    let p11 = rgb.get_pixel(x1, y1);

    let mut out = [0u8; 3];
    for c in 0..3 {
        let top = p00[c] as f32 * (1.0 - fx) + p10[c] as f32 * fx;
        let bottom = p01[c] as f32 * (1.0 - fx) + p11[c] as f32 * fx;
        out[c] = (top * (1.0 - fy) + bottom * fy).clamp(0.0, 255.0) as u8;
    }
    Rgb(out)
}

fn adjust_brightness(rgb: &RgbImage, factor: f32) -> RgbImage {
    let (width, height) = rgb.dimensions();
    ImageBuffer::from_fn(width, height, |x, y| {
        let pixel = rgb.get_pixel(x, y);
        Rgb([
            (pixel[0] as f32 * factor).clamp(0.0, 255.0) as u8,
            (pixel[1] as f32 * factor).clamp(0.0, 255.0) as u8,
            (pixel[2] as f32 * factor).clamp(0.0, 255.0) as u8,
        ])
    })
}

fn adjust_contrast(rgb: &RgbImage, factor: f32) -> RgbImage {
    let (width, height) = rgb.dimensions();
    let total = (width * height) as f32;
    let mut sum = 0.0;
    for pixel in rgb.pixels() {
        sum += (pixel[0] as f32 + pixel[1] as f32 + pixel[2] as f32) / 3.0;
    }
    let mean = sum / total;

    ImageBuffer::from_fn(width, height, |x, y| {
        let pixel = rgb.get_pixel(x, y);
        Rgb([
            (mean + factor * (pixel[0] as f32 - mean)).clamp(0.0, 255.0) as u8,
            (mean + factor * (pixel[1] as f32 - mean)).clamp(0.0, 255.0) as u8,
            (mean + factor * (pixel[2] as f32 - mean)).clamp(0.0, 255.0) as u8,
        ])
    })
}

fn adjust_saturation(rgb: &RgbImage, factor: f32) -> RgbImage {
    let (width, height) = rgb.dimensions();
    ImageBuffer::from_fn(width, height, |x, y| {
        let pixel = rgb.get_pixel(x, y);
        let gray = 0.299 * pixel[0] as f32 + 0.587 * pixel[1] as f32 + 0.114 * pixel[2] as f32;
        Rgb([
            (gray + factor * (pixel[0] as f32 - gray)).clamp(0.0, 255.0) as u8,
            (gray + factor * (pixel[1] as f32 - gray)).clamp(0.0, 255.0) as u8,
            (gray + factor * (pixel[2] as f32 - gray)).clamp(0.0, 255.0) as u8,
        ])
    })
}

fn shift_hue(rgb: &RgbImage, degrees: f32) -> RgbImage {
    let (width, height) = rgb.dimensions();
    ImageBuffer::from_fn(width, height, |x, y| {
        let pixel = rgb.get_pixel(x, y);
        let (h, s, v) = rgb_to_hsv(pixel[0], pixel[1], pixel[2]);
        let shifted = (h + degrees).rem_euclid(360.0);
        hsv_to_rgb(shifted, s, v)
    })
}

fn rgb_to_hsv(r: u8, g: u8, b: u8) -> (f32, f32, f32) {
    let r = r as f32 / 255.0;
    let g = g as f32 / 255.0;
    let b = b as f32 / 255.0;
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let delta = max - min;

    let h = if delta == 0.0 {
        0.0
    } else if max == r {
        60.0 * (((g - b) / delta).rem_euclid(6.0))
    } else if max == g {
        60.0 * ((b - r) / delta + 2.0)
    } else {
        60.0 * ((r - g) / delta + 4.0)
    };
    let s = if max == 0.0 { 0.0 } else { delta / max };

    (h, s, max)
}

fn hsv_to_rgb(h: f32, s: f32, v: f32) -> Rgb<u8> {
    let c = v * s;
    let x = c * (1.0 - ((h / 60.0).rem_euclid(2.0) - 1.0).abs());
    let m = v - c;

    let (r, g, b) = match h {
        h if h < 60.0 => (c, x, 0.0),
        h if h < 120.0 => (x, c, 0.0),
        h if h < 180.0 => (0.0, c, x),
        h if h < 240.0 => (0.0, x, c),
        h if h < 300.0 => (x, 0.0, c),
        _ => (c, 0.0, x),
    };

    Rgb([
        ((r + m) * 255.0).clamp(0.0, 255.0) as u8,
        ((g + m) * 255.0).clamp(0.0, 255.0) as u8,
        ((b + m) * 255.0).clamp(0.0, 255.0) as u8,
    ])
}

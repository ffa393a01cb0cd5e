//! Image noise transform applied to CAPTCHA library images.

use image::{DynamicImage, Rgb, RgbImage};
use rand::Rng;

/// Add per-channel uniform noise in `[-intensity, +intensity]`, clamped to
/// `[0, 255]`.
pub fn add_uniform_noise(source: &DynamicImage, intensity: i32) -> RgbImage {
    let source = source.to_rgb8();
    let mut rng = rand::rng();
    let mut noised = RgbImage::new(source.width(), source.height());
    for (x, y, pixel) in source.enumerate_pixels() {
        let [r, g, b] = pixel.0;
        noised.put_pixel(
            x,
            y,
            Rgb([
                noisy_channel(r, intensity, &mut rng),
                noisy_channel(g, intensity, &mut rng),
                noisy_channel(b, intensity, &mut rng),
            ]),
        );
    }
    noised
}

fn noisy_channel(channel: u8, intensity: i32, rng: &mut impl Rng) -> u8 {
    let noise = rng.random_range(-intensity..=intensity);
    (channel as i32 + noise).clamp(0, 255) as u8
}

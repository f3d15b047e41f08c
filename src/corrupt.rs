//! Input corruptions for the fuzzing phase.
//!
//! Three independent corruptions are applied in sequence to an in-memory
//! image: channel-order shuffling, additive Gaussian noise and a single
//! randomly placed occlusion rectangle. The corrupted buffer is fed straight
//! to the detector and never written to disk.

use image::{Rgb, RgbImage};
use rand::seq::SliceRandom;
use rand::Rng;
use rand::RngExt;
use rand_distr::{Distribution, Normal};

/// Default noise standard deviation, in 8-bit pixel values.
pub const DEFAULT_NOISE_SIGMA: f64 = 25.0;

/// Applies all three corruptions in sequence.
pub fn corrupt_image<R: Rng>(image: &mut RgbImage, noise_sigma: f64, rng: &mut R) {
    shuffle_channels(image, rng);
    add_gaussian_noise(image, noise_sigma, rng);
    occlude_random_rect(image, rng);
}

/// Reorders the color channels of every pixel by one random permutation.
pub fn shuffle_channels<R: Rng>(image: &mut RgbImage, rng: &mut R) {
    let mut order = [0usize, 1, 2];
    order.shuffle(rng);

    for pixel in image.pixels_mut() {
        let Rgb(channels) = *pixel;
        *pixel = Rgb([channels[order[0]], channels[order[1]], channels[order[2]]]);
    }
}

/// Adds zero-mean Gaussian noise to every channel, clamped to the valid
/// pixel range.
pub fn add_gaussian_noise<R: Rng>(image: &mut RgbImage, sigma: f64, rng: &mut R) {
    if sigma <= 0.0 {
        return;
    }
    let normal = Normal::new(0.0, sigma).expect("sigma checked positive and finite");

    for pixel in image.pixels_mut() {
        for channel in pixel.0.iter_mut() {
            let noisy = *channel as f64 + normal.sample(rng);
            *channel = noisy.clamp(0.0, 255.0) as u8;
        }
    }
}

/// Paints one filled black rectangle at a random position, with random width
/// and height of up to half the image's.
pub fn occlude_random_rect<R: Rng>(image: &mut RgbImage, rng: &mut R) {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return;
    }

    let max_w = (width / 2).max(1);
    let max_h = (height / 2).max(1);
    let rect_w = rng.random_range(1..=max_w);
    let rect_h = rng.random_range(1..=max_h);
    let x0 = rng.random_range(0..width);
    let y0 = rng.random_range(0..height);

    for y in y0..(y0 + rect_h).min(height) {
        for x in x0..(x0 + rect_w).min(width) {
            image.put_pixel(x, y, Rgb([0, 0, 0]));
        }
    }
}

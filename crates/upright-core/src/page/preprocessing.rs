//! Image preprocessing for orientation analysis.

use std::borrow::Cow;

use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, GrayImage};
use ndarray::{Array1, Array2, Axis, s};
use tracing::debug;

use crate::models::config::AnalysisConfig;

/// Binary ink mask of a page: 1.0 where there is ink, 0.0 for background.
///
/// Rows follow the image's y axis, columns its x axis.
#[derive(Debug, Clone)]
pub struct InkMask {
    mask: Array2<f64>,
}

impl InkMask {
    /// Wrap a precomputed mask of 0.0/1.0 values.
    pub fn from_array(mask: Array2<f64>) -> Self {
        Self { mask }
    }

    pub fn width(&self) -> usize {
        self.mask.ncols()
    }

    pub fn height(&self) -> usize {
        self.mask.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.mask.is_empty()
    }

    /// Fraction of all pixels that carry ink.
    pub fn ink_fraction(&self) -> f64 {
        self.mask.mean().unwrap_or(0.0)
    }

    /// Ink density of each row (row sum / width).
    pub fn row_density(&self) -> Array1<f64> {
        self.mask
            .mean_axis(Axis(1))
            .unwrap_or_else(|| Array1::zeros(self.height()))
    }

    /// Ink density of each column (column sum / height).
    pub fn column_density(&self) -> Array1<f64> {
        self.mask
            .mean_axis(Axis(0))
            .unwrap_or_else(|| Array1::zeros(self.width()))
    }

    /// Ink density of the rows in `[from, to)`, clamped to the mask.
    pub fn band_density(&self, from: usize, to: usize) -> f64 {
        let to = to.min(self.height());
        if from >= to || self.width() == 0 {
            return 0.0;
        }
        self.mask.slice(s![from..to, ..]).mean().unwrap_or(0.0)
    }
}

/// Image preprocessor for the analysis stages.
pub struct ImagePreprocessor {
    /// Longest side used for layout and margin analysis.
    work_size: u32,
    /// Minimum grayscale range for a page to carry any ink.
    min_contrast: u8,
    /// Side of the local window for adaptive thresholding.
    block_size: u32,
    /// How much darker than its neighbourhood a pixel must be to count as ink.
    offset: u32,
}

impl ImagePreprocessor {
    /// Create a new preprocessor with default settings.
    pub fn new() -> Self {
        Self {
            work_size: 1600,
            min_contrast: 32,
            block_size: 35,
            offset: 15,
        }
    }

    /// Create a preprocessor from analysis settings.
    pub fn from_config(config: &AnalysisConfig) -> Self {
        Self::new()
            .with_work_size(config.work_size)
            .with_min_contrast(config.min_contrast)
    }

    /// Set the analysis work size.
    pub fn with_work_size(mut self, size: u32) -> Self {
        self.work_size = size.max(1);
        self
    }

    /// Set the minimum contrast.
    pub fn with_min_contrast(mut self, contrast: u8) -> Self {
        self.min_contrast = contrast;
        self
    }

    /// Downscale to the work size and binarise.
    pub fn binarize(&self, image: &DynamicImage) -> InkMask {
        let work = self.fit_within(image, self.work_size);
        let gray = work.to_luma8();
        let (width, height) = gray.dimensions();

        if width == 0 || height == 0 {
            return InkMask::from_array(Array2::zeros((height as usize, width as usize)));
        }

        let mut histogram = [0u64; 256];
        let (mut lo, mut hi) = (u8::MAX, u8::MIN);
        for pixel in gray.pixels() {
            let v = pixel[0];
            histogram[v as usize] += 1;
            lo = lo.min(v);
            hi = hi.max(v);
        }

        if hi - lo < self.min_contrast {
            debug!("Contrast {} below {}, page has no ink", hi - lo, self.min_contrast);
            return InkMask::from_array(Array2::zeros((height as usize, width as usize)));
        }

        let threshold = otsu_threshold(&histogram, u64::from(width) * u64::from(height));
        let local_mean = self.local_means(&gray);

        let mask = Array2::from_shape_fn((height as usize, width as usize), |(y, x)| {
            let v = u32::from(gray.get_pixel(x as u32, y as u32)[0]);
            let global = v <= u32::from(threshold);
            let adaptive = v + self.offset < local_mean[[y, x]];
            if global || adaptive { 1.0 } else { 0.0 }
        });

        let mask = InkMask::from_array(mask);
        debug!(
            "Binarized {}x{} (otsu threshold {}): ink fraction {:.4}",
            width,
            height,
            threshold,
            mask.ink_fraction()
        );
        mask
    }

    /// Scale down so the longest side is at most `max_side`.
    pub fn fit_within<'a>(&self, image: &'a DynamicImage, max_side: u32) -> Cow<'a, DynamicImage> {
        let (width, height) = image.dimensions();
        let (new_width, new_height) = self.calculate_resize_dimensions(width, height, max_side);
        if (new_width, new_height) == (width, height) {
            return Cow::Borrowed(image);
        }
        debug!("Downscaling {}x{} to {}x{}", width, height, new_width, new_height);
        Cow::Owned(image.resize_exact(new_width, new_height, FilterType::Triangle))
    }

    /// Scale up so the longest side is at least `min_side`.
    ///
    /// Faint or small scans score noticeably better after a modest upscale.
    pub fn fit_at_least<'a>(&self, image: &'a DynamicImage, min_side: u32) -> Cow<'a, DynamicImage> {
        let (width, height) = image.dimensions();
        let long_side = width.max(height);
        if long_side == 0 || long_side >= min_side {
            return Cow::Borrowed(image);
        }
        let scale = min_side as f32 / long_side as f32;
        let new_width = ((width as f32 * scale) as u32).max(1);
        let new_height = ((height as f32 * scale) as u32).max(1);
        debug!("Upscaling {}x{} to {}x{}", width, height, new_width, new_height);
        Cow::Owned(image.resize_exact(new_width, new_height, FilterType::Triangle))
    }

    fn calculate_resize_dimensions(
        &self,
        width: u32,
        height: u32,
        target_size: u32,
    ) -> (u32, u32) {
        let max_dim = width.max(height);

        if max_dim <= target_size {
            return (width, height);
        }

        let scale = target_size as f32 / max_dim as f32;
        let new_width = (width as f32 * scale) as u32;
        let new_height = (height as f32 * scale) as u32;

        (new_width.max(1), new_height.max(1))
    }

    /// Mean grayscale value of the block around every pixel, via an integral image.
    fn local_means(&self, image: &GrayImage) -> Array2<u32> {
        let (width, height) = image.dimensions();
        let (w, h) = (width as usize, height as usize);

        let mut integral = Array2::<u64>::zeros((h + 1, w + 1));
        for y in 0..h {
            let mut row_sum = 0u64;
            for x in 0..w {
                row_sum += u64::from(image.get_pixel(x as u32, y as u32)[0]);
                integral[[y + 1, x + 1]] = integral[[y, x + 1]] + row_sum;
            }
        }

        let half = (self.block_size / 2) as usize;
        Array2::from_shape_fn((h, w), |(y, x)| {
            let y0 = y.saturating_sub(half);
            let y1 = (y + half + 1).min(h);
            let x0 = x.saturating_sub(half);
            let x1 = (x + half + 1).min(w);

            let sum = integral[[y1, x1]] + integral[[y0, x0]] - integral[[y0, x1]] - integral[[y1, x0]];
            let count = ((y1 - y0) * (x1 - x0)) as u64;
            (sum / count) as u32
        })
    }
}

impl Default for ImagePreprocessor {
    fn default() -> Self {
        Self::new()
    }
}

/// Otsu's threshold: the gray level maximising between-class variance.
fn otsu_threshold(histogram: &[u64; 256], total: u64) -> u8 {
    let sum_all: f64 = histogram
        .iter()
        .enumerate()
        .map(|(level, &count)| level as f64 * count as f64)
        .sum();

    let mut sum_background = 0.0;
    let mut weight_background = 0u64;
    let mut best_variance = 0.0;
    let mut threshold = 0u8;

    for (level, &count) in histogram.iter().enumerate() {
        weight_background += count;
        if weight_background == 0 {
            continue;
        }
        let weight_foreground = total - weight_background;
        if weight_foreground == 0 {
            break;
        }

        sum_background += level as f64 * count as f64;
        let mean_background = sum_background / weight_background as f64;
        let mean_foreground = (sum_all - sum_background) / weight_foreground as f64;
        let between = weight_background as f64
            * weight_foreground as f64
            * (mean_background - mean_foreground).powi(2);

        if between > best_variance {
            best_variance = between;
            threshold = level as u8;
        }
    }

    threshold
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    #[test]
    fn test_resize_dimensions() {
        let preprocessor = ImagePreprocessor::new();

        // Image smaller than target
        let (w, h) = preprocessor.calculate_resize_dimensions(500, 300, 1600);
        assert_eq!((w, h), (500, 300));

        // Image larger than target
        let (w, h) = preprocessor.calculate_resize_dimensions(3200, 1800, 1600);
        assert_eq!(w, 1600);
        assert!(h < 1600);
    }

    #[test]
    fn test_blank_page_has_no_ink() {
        let blank = DynamicImage::ImageLuma8(GrayImage::from_pixel(120, 80, Luma([250])));
        let mask = ImagePreprocessor::new().binarize(&blank);
        assert_eq!(mask.ink_fraction(), 0.0);
        assert_eq!((mask.width(), mask.height()), (120, 80));
    }

    #[test]
    fn test_dark_block_is_ink() {
        let mut img = GrayImage::from_pixel(100, 100, Luma([255]));
        for y in 40..60 {
            for x in 10..90 {
                img.put_pixel(x, y, Luma([20]));
            }
        }
        let mask = ImagePreprocessor::new().binarize(&DynamicImage::ImageLuma8(img));

        let rows = mask.row_density();
        assert!(rows[50] > 0.75);
        assert_eq!(rows[10], 0.0);
        assert!((mask.ink_fraction() - 0.16).abs() < 0.01);
        assert!(mask.band_density(40, 60) > 0.75);
        assert_eq!(mask.band_density(0, 20), 0.0);
    }

    #[test]
    fn test_otsu_splits_bimodal_histogram() {
        let mut histogram = [0u64; 256];
        histogram[30] = 500;
        histogram[220] = 1500;
        let t = otsu_threshold(&histogram, 2000);
        assert!((30..220).contains(&t));
    }

    #[test]
    fn test_fit_at_least_upscales_small_images() {
        let small = DynamicImage::ImageLuma8(GrayImage::new(300, 150));
        let preprocessor = ImagePreprocessor::new();
        let scaled = preprocessor.fit_at_least(&small, 900);
        assert_eq!(scaled.dimensions(), (900, 450));

        let big = DynamicImage::ImageLuma8(GrayImage::new(1000, 500));
        assert!(matches!(preprocessor.fit_at_least(&big, 900), Cow::Borrowed(_)));
    }
}

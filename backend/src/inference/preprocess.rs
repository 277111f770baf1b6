use image::imageops::FilterType;
use image::{DynamicImage, ImageReader};
use ndarray::Array4;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

use super::InferenceError;

/// ImageNet channel means in BGR order, as used by VGG-style `caffe` preprocessing.
const CAFFE_BGR_MEANS: [f32; 3] = [103.939, 116.779, 123.68];

/// Pixel normalization expected by a model. The two schemes are not
/// interchangeable: a model must be fed exactly the one it was trained with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Normalization {
    /// Divide every channel by 255.
    Rescale,
    /// RGB to BGR, then subtract the ImageNet channel means. No scaling.
    Caffe,
}

impl Normalization {
    fn apply(self, rgb: [u8; 3]) -> [f32; 3] {
        match self {
            Normalization::Rescale => rgb.map(|v| v as f32 / 255.0),
            Normalization::Caffe => [
                rgb[2] as f32 - CAFFE_BGR_MEANS[0],
                rgb[1] as f32 - CAFFE_BGR_MEANS[1],
                rgb[0] as f32 - CAFFE_BGR_MEANS[2],
            ],
        }
    }
}

impl fmt::Display for Normalization {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Normalization::Rescale => write!(f, "rescale"),
            Normalization::Caffe => write!(f, "caffe"),
        }
    }
}

/// Memory layout of the input tensor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TensorLayout {
    /// `[batch, height, width, channels]`, the Keras convention.
    #[default]
    Nhwc,
    /// `[batch, channels, height, width]`, the PyTorch convention.
    Nchw,
}

impl fmt::Display for TensorLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TensorLayout::Nhwc => write!(f, "nhwc"),
            TensorLayout::Nchw => write!(f, "nchw"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Preprocessing {
    pub width: u32,
    pub height: u32,
    pub normalization: Normalization,
    pub layout: TensorLayout,
}

impl Preprocessing {
    /// Decodes the stored upload and turns it into a batch of one.
    pub fn load_tensor(&self, path: &Path) -> Result<Array4<f32>, InferenceError> {
        let image = ImageReader::open(path)
            .map_err(|e| InferenceError::Decode(e.to_string()))?
            .with_guessed_format()
            .map_err(|e| InferenceError::Decode(e.to_string()))?
            .decode()
            .map_err(|e| InferenceError::Decode(e.to_string()))?;
        Ok(self.to_tensor(&image))
    }

    pub fn to_tensor(&self, image: &DynamicImage) -> Array4<f32> {
        // Plain stretch to the target size, no aspect-preserving crop.
        let resized = image
            .resize_exact(self.width, self.height, FilterType::Nearest)
            .to_rgb8();

        let (w, h) = (self.width as usize, self.height as usize);
        let mut tensor = match self.layout {
            TensorLayout::Nhwc => Array4::<f32>::zeros((1, h, w, 3)),
            TensorLayout::Nchw => Array4::<f32>::zeros((1, 3, h, w)),
        };

        for (x, y, pixel) in resized.enumerate_pixels() {
            let values = self.normalization.apply(pixel.0);
            let (x, y) = (x as usize, y as usize);
            for (c, value) in values.into_iter().enumerate() {
                match self.layout {
                    TensorLayout::Nhwc => tensor[[0, y, x, c]] = value,
                    TensorLayout::Nchw => tensor[[0, c, y, x]] = value,
                }
            }
        }
        tensor
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn solid(width: u32, height: u32, rgb: [u8; 3]) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb(rgb)))
    }

    fn preprocessing(normalization: Normalization, layout: TensorLayout) -> Preprocessing {
        Preprocessing {
            width: 224,
            height: 224,
            normalization,
            layout,
        }
    }

    #[test]
    fn rescale_maps_full_intensity_to_one() {
        let tensor = preprocessing(Normalization::Rescale, TensorLayout::Nhwc)
            .to_tensor(&solid(10, 30, [255, 0, 51]));

        assert_eq!(tensor.shape(), &[1, 224, 224, 3]);
        assert_eq!(tensor[[0, 5, 7, 0]], 1.0);
        assert_eq!(tensor[[0, 5, 7, 1]], 0.0);
        assert!((tensor[[0, 223, 223, 2]] - 0.2).abs() < 1e-6);
    }

    #[test]
    fn caffe_swaps_to_bgr_and_subtracts_means() {
        let tensor = preprocessing(Normalization::Caffe, TensorLayout::Nhwc)
            .to_tensor(&solid(300, 300, [200, 100, 50]));

        assert!((tensor[[0, 0, 0, 0]] - (50.0 - 103.939)).abs() < 1e-4);
        assert!((tensor[[0, 0, 0, 1]] - (100.0 - 116.779)).abs() < 1e-4);
        assert!((tensor[[0, 0, 0, 2]] - (200.0 - 123.68)).abs() < 1e-4);
    }

    #[test]
    fn nchw_layout_puts_channels_first() {
        let tensor = preprocessing(Normalization::Rescale, TensorLayout::Nchw)
            .to_tensor(&solid(64, 64, [0, 255, 0]));

        assert_eq!(tensor.shape(), &[1, 3, 224, 224]);
        assert_eq!(tensor[[0, 0, 100, 100]], 0.0);
        assert_eq!(tensor[[0, 1, 100, 100]], 1.0);
    }

    #[test]
    fn grayscale_input_is_expanded_to_three_channels() {
        let gray = DynamicImage::ImageLuma8(image::GrayImage::from_pixel(
            20,
            20,
            image::Luma([255]),
        ));
        let tensor = preprocessing(Normalization::Rescale, TensorLayout::Nhwc).to_tensor(&gray);
        assert_eq!(tensor[[0, 0, 0, 0]], 1.0);
        assert_eq!(tensor[[0, 0, 0, 2]], 1.0);
    }

    #[test]
    fn load_tensor_rejects_non_image_bytes() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        std::io::Write::write_all(&mut file, b"definitely not a png").unwrap();

        let result =
            preprocessing(Normalization::Rescale, TensorLayout::Nhwc).load_tensor(file.path());
        assert!(matches!(result, Err(InferenceError::Decode(_))));
    }
}

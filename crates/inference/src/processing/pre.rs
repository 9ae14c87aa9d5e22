use crate::config::DEFAULT_INPUT_SIZE;
use crate::errors::InferenceError;
use crate::processing::post::TransformParams;
use common::span;
use fast_image_resize::{
    FilterType, PixelType, ResizeAlg, ResizeOptions, Resizer,
    images::{Image, ImageRef},
};
use image::RgbImage;
use ndarray::{Array, IxDyn};

const LETTERBOX_COLOR: u8 = 114;

/// Letterboxes RGB images onto a square canvas and converts them to the
/// NCHW `[0, 1]` float tensor YOLO exports expect.
///
/// Holds no buffers, so one instance can serve concurrent requests.
#[derive(Debug, Clone)]
pub struct PreProcessor {
    pub input_size: u32,
}

pub struct PreprocessResult {
    pub input: Array<f32, IxDyn>,
    pub transform: TransformParams,
}

impl PreProcessor {
    pub fn new(input_size: u32) -> Self {
        Self { input_size }
    }

    pub fn preprocess(&self, image: &RgbImage) -> Result<PreprocessResult, InferenceError> {
        let _s = span!("preprocess_image");

        if self.input_size == 0 {
            return Err(InferenceError::Preprocess(
                "input size must be at least 1".to_string(),
            ));
        }

        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return Err(InferenceError::Preprocess(format!(
                "image has no pixels ({}x{})",
                width, height
            )));
        }

        tracing::trace!(width, height, input_size = self.input_size, "Preprocessing image");

        let (letterboxed, scale, offset_x, offset_y) =
            self.resize_and_letterbox(image.as_raw(), width, height)?;

        let input = self.normalize(&letterboxed)?;

        Ok(PreprocessResult {
            input,
            transform: TransformParams {
                orig_width: width,
                orig_height: height,
                scale,
                offset_x,
                offset_y,
            },
        })
    }

    fn resize_and_letterbox(
        &self,
        pixels: &[u8],
        width: u32,
        height: u32,
    ) -> Result<(Vec<u8>, f32, f32, f32), InferenceError> {
        let _s = span!("resize_and_letterbox");

        let side = self.input_size;
        let scale = (side as f32 / width as f32).min(side as f32 / height as f32);
        let new_width = ((width as f32 * scale).round() as u32).clamp(1, side);
        let new_height = ((height as f32 * scale).round() as u32).clamp(1, side);

        let offset_x = (side - new_width) / 2;
        let offset_y = (side - new_height) / 2;

        let src = ImageRef::new(width, height, pixels, PixelType::U8x3)
            .map_err(|e| InferenceError::Preprocess(e.to_string()))?;

        let mut resized = Image::new(new_width, new_height, PixelType::U8x3);

        Resizer::new()
            .resize(
                &src,
                &mut resized,
                &ResizeOptions::new().resize_alg(ResizeAlg::Convolution(FilterType::Bilinear)),
            )
            .map_err(|e| InferenceError::Preprocess(e.to_string()))?;

        let mut letterboxed = vec![LETTERBOX_COLOR; (side * side * 3) as usize];
        let resized_data = resized.buffer();
        let stride = side * 3;
        let row_len = (new_width * 3) as usize;

        for y in 0..new_height {
            let src_row = (y * new_width * 3) as usize;
            let dst_row = ((y + offset_y) * stride + offset_x * 3) as usize;

            letterboxed[dst_row..dst_row + row_len]
                .copy_from_slice(&resized_data[src_row..src_row + row_len]);
        }

        Ok((letterboxed, scale, offset_x as f32, offset_y as f32))
    }

    fn normalize(&self, letterboxed: &[u8]) -> Result<Array<f32, IxDyn>, InferenceError> {
        let _s = span!("normalize");

        let side = self.input_size as usize;
        let spatial = side * side;

        let mut output = vec![0.0f32; 3 * spatial];

        for (i, px) in letterboxed.chunks_exact(3).enumerate() {
            output[i] = px[0] as f32 / 255.0;
            output[i + spatial] = px[1] as f32 / 255.0;
            output[i + 2 * spatial] = px[2] as f32 / 255.0;
        }

        Array::from_shape_vec(IxDyn(&[1, 3, side, side]), output)
            .map_err(|e| InferenceError::Preprocess(e.to_string()))
    }
}

impl Default for PreProcessor {
    fn default() -> Self {
        Self::new(DEFAULT_INPUT_SIZE)
    }
}

use crate::encode::PixelOrder;
use ab_glyph::{FontArc, PxScale};
use image::{Rgb, RgbImage};
use imageproc::{
    drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut, text_size},
    rect::Rect,
};
use std::path::Path;
use thiserror::Error;

const EMBEDDED_FONT: &[u8] = include_bytes!("../assets/DejaVuSans.ttf");

pub const DEFAULT_LINE_WIDTH: u32 = 2;
pub const DEFAULT_FONT_SIZE: f32 = 20.0;
const LABEL_PADDING: u32 = 2;
const TEXT_COLOR: Rgb<u8> = Rgb([255, 255, 255]);

// Ultralytics plotting palette
const PALETTE: [[u8; 3]; 20] = [
    [0xFF, 0x38, 0x38],
    [0xFF, 0x9D, 0x97],
    [0xFF, 0x70, 0x1F],
    [0xFF, 0xB2, 0x1D],
    [0xCF, 0xD2, 0x31],
    [0x48, 0xF9, 0x0A],
    [0x92, 0xCC, 0x17],
    [0x3D, 0xDB, 0x86],
    [0x1A, 0x93, 0x34],
    [0x00, 0xD4, 0xBB],
    [0x2C, 0x99, 0xA8],
    [0x00, 0xC2, 0xFF],
    [0x34, 0x45, 0x93],
    [0x64, 0x73, 0xFF],
    [0x00, 0x18, 0xEC],
    [0x84, 0x38, 0xFF],
    [0x52, 0x00, 0x85],
    [0xCB, 0x38, 0xFF],
    [0xFF, 0x95, 0xC8],
    [0xFF, 0x37, 0xC7],
];

#[derive(Error, Debug)]
pub enum AnnotateError {
    #[error("Failed to read font {path}: {source}")]
    FontIo {
        path: String,
        source: std::io::Error,
    },
    #[error("Invalid font data: {0}")]
    InvalidFont(String),
}

/// One box to draw, in image pixel coordinates.
pub struct Annotation<'a> {
    pub class_id: usize,
    pub label: &'a str,
    pub confidence: f32,
    pub bbox: [f32; 4],
}

/// Annotated raster together with its channel order.
pub struct Annotated {
    pub image: RgbImage,
    pub order: PixelOrder,
}

pub struct Annotator {
    font: FontArc,
    scale: PxScale,
    line_width: u32,
}

pub fn class_color(class_id: usize) -> Rgb<u8> {
    Rgb(PALETTE[class_id % PALETTE.len()])
}

impl Annotator {
    pub fn new(font: FontArc, font_size: f32, line_width: u32) -> Self {
        Self {
            font,
            scale: PxScale::from(font_size),
            line_width: line_width.max(1),
        }
    }

    /// Annotator using the embedded DejaVu Sans, or `font_path` when given.
    ///
    /// DejaVu Sans has no Hangul, so Korean class names need a CJK font
    /// through `font_path`.
    pub fn load(
        font_path: Option<&str>,
        font_size: f32,
        line_width: u32,
    ) -> Result<Self, AnnotateError> {
        let font = match font_path {
            Some(path) => {
                let data = std::fs::read(Path::new(path)).map_err(|source| AnnotateError::FontIo {
                    path: path.to_string(),
                    source,
                })?;
                FontArc::try_from_vec(data).map_err(|e| AnnotateError::InvalidFont(e.to_string()))?
            }
            None => FontArc::try_from_slice(EMBEDDED_FONT)
                .map_err(|e| AnnotateError::InvalidFont(e.to_string()))?,
        };

        Ok(Self::new(font, font_size, line_width))
    }

    /// Draw every annotation onto `image`. The result is always RGB.
    pub fn render(&self, mut image: RgbImage, annotations: &[Annotation<'_>]) -> Annotated {
        let _s = tracing::info_span!("render_annotations", boxes = annotations.len()).entered();

        if image.width() > 0 && image.height() > 0 {
            for annotation in annotations {
                self.draw_box_with_label(&mut image, annotation);
            }
        }

        Annotated {
            image,
            order: PixelOrder::Rgb,
        }
    }

    fn draw_box_with_label(&self, image: &mut RgbImage, annotation: &Annotation<'_>) {
        let (w, h) = (image.width() as i32, image.height() as i32);
        let color = class_color(annotation.class_id);

        let [bx1, by1, bx2, by2] = annotation.bbox;
        let x_min = (bx1.floor() as i32).clamp(0, w - 1);
        let y_min = (by1.floor() as i32).clamp(0, h - 1);
        let x_max = (bx2.ceil() as i32).clamp(0, w - 1);
        let y_max = (by2.ceil() as i32).clamp(0, h - 1);

        // Nested rectangles, each one pixel further in
        for t in 0..self.line_width as i32 {
            let width = x_max - x_min + 1 - 2 * t;
            let height = y_max - y_min + 1 - 2 * t;
            if width <= 0 || height <= 0 {
                break;
            }
            let rect = Rect::at(x_min + t, y_min + t).of_size(width as u32, height as u32);
            draw_hollow_rect_mut(image, rect, color);
        }

        let label = format!("{} {:.2}", annotation.label, annotation.confidence);
        let (text_width, text_height) = text_size(self.scale, &self.font, &label);

        let strip_width = (text_width + 2 * LABEL_PADDING).min((w - x_min) as u32);
        let strip_height = (text_height + 2 * LABEL_PADDING).min(h as u32);

        // Above the box when it fits, otherwise just inside its top edge
        let strip_y = if y_min >= strip_height as i32 {
            y_min - strip_height as i32
        } else {
            y_min.min(h - strip_height as i32)
        };

        if strip_width > 0 && strip_height > 0 {
            let rect = Rect::at(x_min, strip_y).of_size(strip_width, strip_height);
            draw_filled_rect_mut(image, rect, color);
        }

        draw_text_mut(
            image,
            TEXT_COLOR,
            x_min + LABEL_PADDING as i32,
            strip_y + LABEL_PADDING as i32,
            self.scale,
            &self.font,
            &label,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn annotator() -> Annotator {
        Annotator::load(None, DEFAULT_FONT_SIZE, DEFAULT_LINE_WIDTH).unwrap()
    }

    fn grey(width: u32, height: u32) -> RgbImage {
        RgbImage::from_pixel(width, height, Rgb([90, 90, 90]))
    }

    /// Palette wraps around by class id
    #[test]
    fn test_class_color_is_deterministic() {
        assert_eq!(class_color(0), Rgb([0xFF, 0x38, 0x38]));
        assert_eq!(class_color(20), class_color(0));
        assert_ne!(class_color(1), class_color(0));
    }

    /// No annotations leaves the pixels untouched
    #[test]
    fn test_render_without_detections_is_identity() {
        let image = grey(64, 48);
        let annotated = annotator().render(image.clone(), &[]);
        assert_eq!(annotated.order, PixelOrder::Rgb);
        assert_eq!(annotated.image, image);
    }

    /// Box edges are stroked two pixels wide in the class colour
    #[test]
    fn test_render_draws_box_outline() {
        let annotated = annotator().render(
            grey(200, 200),
            &[Annotation {
                class_id: 3,
                label: "bulgogi",
                confidence: 0.87,
                bbox: [50.0, 100.0, 150.0, 180.0],
            }],
        );
        let color = class_color(3);
        let img = &annotated.image;

        // Bottom edge, both stroke rows
        assert_eq!(*img.get_pixel(100, 180), color);
        assert_eq!(*img.get_pixel(100, 179), color);
        // Right edge
        assert_eq!(*img.get_pixel(150, 150), color);
        assert_eq!(*img.get_pixel(149, 150), color);
        // Interior untouched
        assert_eq!(*img.get_pixel(100, 150), Rgb([90, 90, 90]));
        // Label strip sits above the box
        assert_eq!(*img.get_pixel(51, 99), color);
    }

    /// Boxes touching the image edges and degenerate boxes never panic
    #[test]
    fn test_render_handles_edge_and_degenerate_boxes() {
        let annotations = [
            Annotation {
                class_id: 0,
                label: "kimchi",
                confidence: 0.5,
                bbox: [0.0, 0.0, 32.0, 24.0],
            },
            Annotation {
                class_id: 1,
                label: "japchae",
                confidence: 0.99,
                bbox: [31.0, 23.0, 32.0, 24.0],
            },
            Annotation {
                class_id: 2,
                label: "tteokbokki",
                confidence: 0.6,
                bbox: [10.0, 10.0, 10.0, 10.0],
            },
        ];
        let annotated = annotator().render(grey(32, 24), &annotations);
        assert_eq!(annotated.image.dimensions(), (32, 24));
    }

    /// Glyphs missing from the font (Hangul in DejaVu Sans) draw as
    /// placeholders without panicking
    #[test]
    fn test_render_label_with_missing_glyphs() {
        let annotated = annotator().render(
            grey(120, 120),
            &[Annotation {
                class_id: 5,
                label: "비빔밥",
                confidence: 0.75,
                bbox: [20.0, 40.0, 100.0, 100.0],
            }],
        );
        assert_eq!(annotated.image.dimensions(), (120, 120));
    }

    /// A missing font file is a load error
    #[test]
    fn test_missing_font_file() {
        let result = Annotator::load(Some("/nonexistent/font.ttf"), 20.0, 2);
        assert!(matches!(result, Err(AnnotateError::FontIo { .. })));
    }
}

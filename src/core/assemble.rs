use crate::domain::model::{Document, ImageSource, OverlayImage};
use crate::utils::error::{DiffError, Result};
use chrono::{Datelike, Timelike, Utc};
use flate2::write::ZlibEncoder;
use flate2::Compression;
use image::{ImageFormat, RgbaImage};
use pdf_writer::{Content, Date, Filter, Finish, Name, Pdf, Rect, Ref, TextStr};
use std::io::Write;

const IMAGE_NAME: Name<'static> = Name(b"Im1");

/// 將每張疊圖放進一頁 PDF。所有頁面尺寸取最大寬與最大高，圖片貼齊左上角，不置中也不縮放。
#[derive(Debug, Clone)]
pub struct DocumentAssembler {
    title: String,
}

impl DocumentAssembler {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
        }
    }

    pub fn assemble(&self, images: &[OverlayImage]) -> Result<Document> {
        if images.is_empty() {
            return Err(DiffError::NoCommonLayers);
        }

        let decoded = images
            .iter()
            .map(|overlay| decode(overlay).map(|pixels| (overlay, pixels)))
            .collect::<Result<Vec<_>>>()?;

        let (max_w, max_h) = page_size(decoded.iter().map(|(_, pixels)| pixels.dimensions()));
        tracing::debug!(
            "Assembling {} page(s) at {}x{} pt",
            decoded.len(),
            max_w,
            max_h
        );

        let mut next_id = 1;
        let mut alloc = || {
            let id = Ref::new(next_id);
            next_id += 1;
            id
        };

        let catalog_id = alloc();
        let page_tree_id = alloc();
        let info_id = alloc();

        let mut pdf = Pdf::new();
        let mut page_ids = Vec::with_capacity(decoded.len());

        for (_, pixels) in &decoded {
            let page_id = alloc();
            let image_id = alloc();
            let content_id = alloc();
            page_ids.push(page_id);

            let (width, height) = pixels.dimensions();
            let mut page = pdf.page(page_id);
            page.media_box(Rect::new(0.0, 0.0, max_w as f32, max_h as f32));
            page.parent(page_tree_id);
            page.contents(content_id);
            page.resources().x_objects().pair(IMAGE_NAME, image_id);
            page.finish();

            let encoded = deflate(&flatten_on_white(pixels))?;
            let mut image = pdf.image_xobject(image_id, &encoded);
            image.filter(Filter::FlateDecode);
            image.width(width as i32);
            image.height(height as i32);
            image.color_space().device_rgb();
            image.bits_per_component(8);
            image.finish();

            // PDF 原點在左下，換算成左上角對齊
            let mut content = Content::new();
            content.save_state();
            content.transform([
                width as f32,
                0.0,
                0.0,
                height as f32,
                0.0,
                (max_h - height) as f32,
            ]);
            content.x_object(IMAGE_NAME);
            content.restore_state();
            pdf.stream(content_id, &content.finish());
        }

        pdf.catalog(catalog_id).pages(page_tree_id);
        pdf.pages(page_tree_id)
            .kids(page_ids.iter().copied())
            .count(page_ids.len() as i32);

        let now = Utc::now();
        pdf.document_info(info_id)
            .title(TextStr(&self.title))
            .producer(TextStr(concat!("gerber-diff ", env!("CARGO_PKG_VERSION"))))
            .creation_date(
                Date::new(now.year() as u16)
                    .month(now.month() as u8)
                    .day(now.day() as u8)
                    .hour(now.hour() as u8)
                    .minute(now.minute() as u8)
                    .second(now.second() as u8)
                    .utc_offset_hour(0),
            );

        Ok(Document {
            bytes: pdf.finish(),
            page_size: (max_w, max_h),
            pages: decoded
                .iter()
                .map(|(overlay, _)| overlay.layer.clone())
                .collect(),
        })
    }
}

/// Largest width and largest height, taken independently.
pub fn page_size(dimensions: impl IntoIterator<Item = (u32, u32)>) -> (u32, u32) {
    dimensions
        .into_iter()
        .fold((0, 0), |(max_w, max_h), (w, h)| (max_w.max(w), max_h.max(h)))
}

fn decode(overlay: &OverlayImage) -> Result<RgbaImage> {
    let image = match &overlay.source {
        ImageSource::Memory(bytes) => image::load_from_memory_with_format(bytes, ImageFormat::Png)?,
        ImageSource::File(path) => image::open(path)?,
    };
    Ok(image.to_rgba8())
}

fn flatten_on_white(pixels: &RgbaImage) -> Vec<u8> {
    let mut rgb = Vec::with_capacity(pixels.width() as usize * pixels.height() as usize * 3);
    for pixel in pixels.pixels() {
        let [r, g, b, a] = pixel.0;
        let alpha = u32::from(a);
        for channel in [r, g, b] {
            let blended = (u32::from(channel) * alpha + 255 * (255 - alpha) + 127) / 255;
            rgb.push(blended as u8);
        }
    }
    rgb
}

fn deflate(data: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::LayerId;
    use image::Rgba;
    use std::io::Cursor;

    fn png(width: u32, height: u32) -> Vec<u8> {
        let image = RgbaImage::from_pixel(width, height, Rgba([255, 0, 0, 128]));
        let mut bytes = Cursor::new(Vec::new());
        image.write_to(&mut bytes, ImageFormat::Png).unwrap();
        bytes.into_inner()
    }

    fn overlay(layer: &str, width: u32, height: u32) -> OverlayImage {
        OverlayImage {
            layer: LayerId::from(layer),
            label: layer.to_string(),
            source: ImageSource::Memory(png(width, height)),
        }
    }

    fn count(haystack: &[u8], needle: &[u8]) -> usize {
        haystack.windows(needle.len()).filter(|w| *w == needle).count()
    }

    #[test]
    fn test_page_size_takes_each_dimension_independently() {
        assert_eq!(page_size([(100, 200), (300, 50)]), (300, 200));
        assert_eq!(page_size([(10, 10)]), (10, 10));
    }

    #[test]
    fn test_assemble_sizes_every_page_to_largest_image() {
        let images = vec![overlay("GTL", 100, 200), overlay("GBL", 300, 50)];

        let document = DocumentAssembler::new("diff").assemble(&images).unwrap();

        assert_eq!(document.page_size, (300, 200));
        assert_eq!(document.pages, vec![LayerId::from("GTL"), LayerId::from("GBL")]);
        assert!(document.bytes.starts_with(b"%PDF-"));
        assert_eq!(count(&document.bytes, b"/MediaBox [0 0 300 200]"), 2);
        let pages = count(&document.bytes, b"/Type /Page") - count(&document.bytes, b"/Type /Pages");
        assert_eq!(pages, 2);
    }

    #[test]
    fn test_assemble_reads_images_from_disk() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let path = temp_dir.path().join("GTO.png");
        std::fs::write(&path, png(40, 30)).unwrap();

        let images = vec![OverlayImage {
            layer: LayerId::from("GTO"),
            label: "Top Silk".to_string(),
            source: ImageSource::File(path),
        }];
        let document = DocumentAssembler::new("diff").assemble(&images).unwrap();

        assert_eq!(document.page_size, (40, 30));
        assert_eq!(document.pages.len(), 1);
    }

    #[test]
    fn test_assemble_without_images_fails() {
        assert!(matches!(
            DocumentAssembler::new("diff").assemble(&[]),
            Err(DiffError::NoCommonLayers)
        ));
    }

    #[test]
    fn test_corrupt_image_is_reported() {
        let images = vec![OverlayImage {
            layer: LayerId::from("GTL"),
            label: "GTL".to_string(),
            source: ImageSource::Memory(b"definitely not png".to_vec()),
        }];
        assert!(matches!(
            DocumentAssembler::new("diff").assemble(&images),
            Err(DiffError::Image(_))
        ));
    }

    #[test]
    fn test_flatten_blends_over_white() {
        let pixels = RgbaImage::from_pixel(1, 1, Rgba([0, 0, 255, 0]));
        assert_eq!(flatten_on_white(&pixels), vec![255, 255, 255]);

        let pixels = RgbaImage::from_pixel(1, 1, Rgba([0, 0, 255, 255]));
        assert_eq!(flatten_on_white(&pixels), vec![0, 0, 255]);
    }
}

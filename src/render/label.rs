use font8x8::{UnicodeFonts, BASIC_FONTS};
use image::{Rgba, RgbaImage};

const GLYPH: u32 = 8;
const MARGIN: u32 = 4;
const INK: Rgba<u8> = Rgba([0, 0, 0, 255]);
const BACKDROP: Rgba<u8> = Rgba([255, 255, 255, 255]);

/// 在圖片左上角燒入圖層名稱。字型大小隨圖片高度放大，超出邊界的部分直接裁掉。
pub fn burn_label(image: &mut RgbaImage, text: &str) {
    if text.is_empty() {
        return;
    }
    let scale = (image.height() / 400).clamp(1, 8);
    let glyphs: Vec<[u8; 8]> = text
        .chars()
        .map(|ch| BASIC_FONTS.get(ch).or_else(|| BASIC_FONTS.get('?')).unwrap_or([0; 8]))
        .collect();

    let text_w = glyphs.len() as u32 * GLYPH * scale;
    let text_h = GLYPH * scale;
    fill_rect(image, 0, 0, text_w + MARGIN * 2, text_h + MARGIN * 2, BACKDROP);

    for (index, glyph) in glyphs.iter().enumerate() {
        let origin_x = MARGIN + index as u32 * GLYPH * scale;
        for (row, bits) in glyph.iter().enumerate() {
            for col in 0..GLYPH {
                // bit 0 是最左邊的像素
                if bits & (1 << col) != 0 {
                    fill_rect(
                        image,
                        origin_x + col * scale,
                        MARGIN + row as u32 * scale,
                        scale,
                        scale,
                        INK,
                    );
                }
            }
        }
    }
}

fn fill_rect(image: &mut RgbaImage, x: u32, y: u32, w: u32, h: u32, color: Rgba<u8>) {
    let x_end = x.saturating_add(w).min(image.width());
    let y_end = y.saturating_add(h).min(image.height());
    for py in y.min(y_end)..y_end {
        for px in x.min(x_end)..x_end {
            image.put_pixel(px, py, color);
        }
    }
}

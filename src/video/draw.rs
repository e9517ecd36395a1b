//! Raster annotation primitives: rectangles and 5x7 bitmap text

use super::frame::Raster;

/// Glyph cell width including one column of spacing
const GLYPH_ADVANCE: i32 = 6;
const GLYPH_WIDTH: i32 = 5;
const GLYPH_HEIGHT: i32 = 7;

/// Outline of the rectangle spanning `left..=right` x `top..=bottom`
pub fn draw_rect(
    image: &mut Raster,
    left: i32,
    top: i32,
    right: i32,
    bottom: i32,
    thickness: i32,
    color: [u8; 3],
) {
    for t in 0..thickness.max(1) {
        let (l, tp, r, b) = (left + t, top + t, right - t, bottom - t);
        if l > r || tp > b {
            break;
        }
        for x in l..=r {
            image.put(x, tp, color);
            image.put(x, b, color);
        }
        for y in tp..=b {
            image.put(l, y, color);
            image.put(r, y, color);
        }
    }
}

pub fn fill_rect(image: &mut Raster, left: i32, top: i32, right: i32, bottom: i32, color: [u8; 3]) {
    let left = left.max(0);
    let top = top.max(0);
    let right = right.min(image.width() as i32 - 1);
    let bottom = bottom.min(image.height() as i32 - 1);
    for y in top..=bottom {
        for x in left..=right {
            image.put(x, y, color);
        }
    }
}

/// Pixel width of `text` rendered at `scale`
pub fn text_width(text: &str, scale: u32) -> i32 {
    let chars = text.chars().count() as i32;
    if chars == 0 {
        return 0;
    }
    (chars * GLYPH_ADVANCE - 1) * scale.max(1) as i32
}

/// Pixel height of one line of text at `scale`
pub fn text_height(scale: u32) -> i32 {
    GLYPH_HEIGHT * scale.max(1) as i32
}

/// Render `text` with its top-left corner at (x, y)
///
/// Lowercase letters are drawn as uppercase; characters without a glyph
/// leave a blank cell.
pub fn draw_text(image: &mut Raster, x: i32, y: i32, text: &str, scale: u32, color: [u8; 3]) {
    let scale = scale.max(1) as i32;
    let mut pen_x = x;
    for ch in text.chars().flat_map(|c| c.to_uppercase()) {
        if let Some(glyph) = glyph_bits(ch) {
            for (row, pattern) in glyph.iter().enumerate() {
                for col in 0..GLYPH_WIDTH {
                    if (pattern >> (GLYPH_WIDTH - 1 - col)) & 1 == 0 {
                        continue;
                    }
                    let px = pen_x + col * scale;
                    let py = y + row as i32 * scale;
                    for dy in 0..scale {
                        for dx in 0..scale {
                            image.put(px + dx, py + dy, color);
                        }
                    }
                }
            }
        }
        pen_x += GLYPH_ADVANCE * scale;
    }
}

/// Text on a filled background box, clamped into the raster
pub fn draw_label(
    image: &mut Raster,
    x: i32,
    y: i32,
    text: &str,
    scale: u32,
    fg: [u8; 3],
    bg: [u8; 3],
) {
    let pad = scale.max(1) as i32;
    let w = text_width(text, scale);
    let h = text_height(scale);
    let x = x.clamp(0, (image.width() as i32 - w - 2 * pad).max(0));
    let y = y.clamp(0, (image.height() as i32 - h - 2 * pad).max(0));
    fill_rect(image, x, y, x + w + 2 * pad - 1, y + h + 2 * pad - 1, bg);
    draw_text(image, x + pad, y + pad, text, scale, fg);
}

fn glyph_bits(ch: char) -> Option<[u8; 7]> {
    let bits = match ch {
        'A' => [0b01110, 0b10001, 0b10001, 0b11111, 0b10001, 0b10001, 0b10001],
        'B' => [0b11110, 0b10001, 0b10001, 0b11110, 0b10001, 0b10001, 0b11110],
        'C' => [0b01110, 0b10001, 0b10000, 0b10000, 0b10000, 0b10001, 0b01110],
        'D' => [0b11100, 0b10010, 0b10001, 0b10001, 0b10001, 0b10010, 0b11100],
        'E' => [0b11111, 0b10000, 0b11110, 0b10000, 0b10000, 0b10000, 0b11111],
        'F' => [0b11111, 0b10000, 0b11110, 0b10000, 0b10000, 0b10000, 0b10000],
        'G' => [0b01110, 0b10001, 0b10000, 0b10111, 0b10001, 0b10001, 0b01111],
        'H' => [0b10001, 0b10001, 0b10001, 0b11111, 0b10001, 0b10001, 0b10001],
        'I' => [0b01110, 0b00100, 0b00100, 0b00100, 0b00100, 0b00100, 0b01110],
        'J' => [0b00111, 0b00010, 0b00010, 0b00010, 0b00010, 0b10010, 0b01100],
        'K' => [0b10001, 0b10010, 0b10100, 0b11000, 0b10100, 0b10010, 0b10001],
        'L' => [0b10000, 0b10000, 0b10000, 0b10000, 0b10000, 0b10000, 0b11111],
        'M' => [0b10001, 0b11011, 0b10101, 0b10101, 0b10001, 0b10001, 0b10001],
        'N' => [0b10001, 0b11001, 0b10101, 0b10101, 0b10011, 0b10001, 0b10001],
        'O' => [0b01110, 0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b01110],
        'P' => [0b11110, 0b10001, 0b10001, 0b11110, 0b10000, 0b10000, 0b10000],
        'Q' => [0b01110, 0b10001, 0b10001, 0b10001, 0b10101, 0b10010, 0b01101],
        'R' => [0b11110, 0b10001, 0b10001, 0b11110, 0b10100, 0b10010, 0b10001],
        'S' => [0b01111, 0b10000, 0b01110, 0b00001, 0b00001, 0b10001, 0b01110],
        'T' => [0b11111, 0b00100, 0b00100, 0b00100, 0b00100, 0b00100, 0b00100],
        'U' => [0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b01110],
        'V' => [0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b01010, 0b00100],
        'W' => [0b10001, 0b10001, 0b10001, 0b10101, 0b10101, 0b10101, 0b01010],
        'X' => [0b10001, 0b10001, 0b01010, 0b00100, 0b01010, 0b10001, 0b10001],
        'Y' => [0b10001, 0b10001, 0b01010, 0b00100, 0b00100, 0b00100, 0b00100],
        'Z' => [0b11111, 0b00001, 0b00010, 0b00100, 0b01000, 0b10000, 0b11111],
        '0' => [0b01110, 0b10001, 0b10011, 0b10101, 0b11001, 0b10001, 0b01110],
        '1' => [0b00100, 0b01100, 0b00100, 0b00100, 0b00100, 0b00100, 0b01110],
        '2' => [0b01110, 0b10001, 0b00001, 0b00010, 0b00100, 0b01000, 0b11111],
        '3' => [0b11110, 0b00001, 0b00001, 0b01110, 0b00001, 0b00001, 0b11110],
        '4' => [0b00010, 0b00110, 0b01010, 0b10010, 0b11111, 0b00010, 0b00010],
        '5' => [0b11111, 0b10000, 0b11110, 0b00001, 0b00001, 0b10001, 0b01110],
        '6' => [0b00110, 0b01000, 0b10000, 0b11110, 0b10001, 0b10001, 0b01110],
        '7' => [0b11111, 0b00001, 0b00010, 0b00100, 0b01000, 0b01000, 0b01000],
        '8' => [0b01110, 0b10001, 0b10001, 0b01110, 0b10001, 0b10001, 0b01110],
        '9' => [0b01110, 0b10001, 0b10001, 0b01111, 0b00001, 0b00010, 0b01100],
        '%' => [0b10001, 0b10010, 0b00100, 0b01000, 0b10010, 0b10001, 0b00000],
        '.' => [0, 0, 0, 0, 0, 0b00110, 0b00110],
        ',' => [0, 0, 0, 0, 0b00110, 0b00100, 0b01000],
        ':' => [0, 0b00110, 0b00110, 0, 0b00110, 0b00110, 0],
        '-' => [0, 0, 0, 0b11111, 0, 0, 0],
        '_' => [0, 0, 0, 0, 0, 0, 0b11111],
        '=' => [0, 0, 0b11111, 0, 0b11111, 0, 0],
        '/' => [0b00001, 0b00010, 0b00010, 0b00100, 0b01000, 0b01000, 0b10000],
        '(' => [0b00010, 0b00100, 0b01000, 0b01000, 0b01000, 0b00100, 0b00010],
        ')' => [0b01000, 0b00100, 0b00010, 0b00010, 0b00010, 0b00100, 0b01000],
        '!' => [0b00100, 0b00100, 0b00100, 0b00100, 0b00100, 0, 0b00100],
        '?' => [0b01110, 0b10001, 0b00001, 0b00010, 0b00100, 0, 0b00100],
        '\'' => [0b00100, 0b00100, 0b01000, 0, 0, 0, 0],
        '#' => [0b01010, 0b01010, 0b11111, 0b01010, 0b11111, 0b01010, 0b01010],
        ' ' => [0; 7],
        _ => return None,
    };
    Some(bits)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn count_color(raster: &Raster, color: [u8; 3]) -> usize {
        raster
            .data()
            .chunks_exact(3)
            .filter(|px| *px == color)
            .count()
    }

    #[test]
    fn test_rect_outline() {
        let mut raster = Raster::solid(10, 10, [0, 0, 0]).unwrap();
        draw_rect(&mut raster, 2, 2, 5, 5, 1, [0, 255, 0]);
        assert_eq!(raster.get(2, 2), Some([0, 255, 0]));
        assert_eq!(raster.get(5, 3), Some([0, 255, 0]));
        assert_eq!(raster.get(3, 3), Some([0, 0, 0]));
        // 4x4 box outline has 12 pixels
        assert_eq!(count_color(&raster, [0, 255, 0]), 12);
    }

    #[test]
    fn test_rect_clipped_at_edges() {
        let mut raster = Raster::solid(4, 4, [0, 0, 0]).unwrap();
        draw_rect(&mut raster, -3, -3, 10, 10, 2, [9, 9, 9]);
        draw_rect(&mut raster, 1, 1, 0, 0, 1, [7, 7, 7]);
        assert_eq!(count_color(&raster, [7, 7, 7]), 0);
    }

    #[test]
    fn test_text_renders_pixels() {
        let mut raster = Raster::solid(40, 10, [0, 0, 0]).unwrap();
        draw_text(&mut raster, 0, 0, "Hi", 1, [255, 255, 255]);
        assert!(count_color(&raster, [255, 255, 255]) > 0);
        assert_eq!(text_width("Hi", 1), 11);
        assert_eq!(text_width("Hi", 2), 22);
        assert_eq!(text_height(3), 21);
    }

    #[test]
    fn test_label_stays_inside() {
        let mut raster = Raster::solid(20, 12, [0, 0, 0]).unwrap();
        draw_label(&mut raster, 100, 100, "AB", 1, [255, 255, 255], [1, 2, 3]);
        assert!(count_color(&raster, [1, 2, 3]) > 0);
        assert!(count_color(&raster, [255, 255, 255]) > 0);
    }
}

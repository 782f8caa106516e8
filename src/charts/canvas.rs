use std::panic;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use plotters::coord::Shift;
use plotters::prelude::*;
use plotters_backend::{
    text_anchor, BackendColor, BackendCoord, BackendStyle, BackendTextStyle, DrawingBackend,
    DrawingErrorKind, FontTransform,
};

use super::glyphs::{self, GLYPH_ADVANCE, GLYPH_WIDTH};
use crate::error::InsightError;
use crate::models::NormalizedTable;

pub type Canvas<'a> = DrawingArea<GlyphBackend<BitMapBackend<'a>>, Shift>;

pub const CAPTION_FONT: (&str, u32) = ("sans-serif", 30);
pub const LABEL_FONT: (&str, u32) = ("sans-serif", 16);

/// Qualitative palette for per-topic series.
pub const SERIES_COLORS: [RGBColor; 10] = [
    RGBColor(31, 119, 180),
    RGBColor(255, 127, 14),
    RGBColor(44, 160, 44),
    RGBColor(214, 39, 40),
    RGBColor(148, 103, 189),
    RGBColor(140, 86, 75),
    RGBColor(227, 119, 194),
    RGBColor(127, 127, 127),
    RGBColor(188, 189, 34),
    RGBColor(23, 190, 207),
];

pub fn series_color(index: usize) -> RGBColor {
    SERIES_COLORS[index % SERIES_COLORS.len()]
}

pub fn ensure_rows(chart: &'static str, table: &NormalizedTable) -> Result<(), InsightError> {
    if table.is_empty() {
        return Err(InsightError::render(chart, "no submissions to plot"));
    }
    Ok(())
}

/// Largest side of any chart canvas, in pixels.
pub const MAX_EXTENT: u32 = 3000;
/// Vertical room one line of label text needs.
pub const LABEL_PITCH: f64 = 18.0;
const MAX_TITLE_CHARS: usize = 32;

/// Canvas side for `count` items of `per_item` pixels plus `fixed`, clamped
/// to `min..=MAX_EXTENT`. Past the cap the items shrink to fit.
pub fn fitted_extent(count: usize, per_item: u32, fixed: u32, min: u32) -> u32 {
    let wanted = (count as u64)
        .saturating_mul(u64::from(per_item))
        .saturating_add(u64::from(fixed));
    wanted.clamp(u64::from(min), u64::from(MAX_EXTENT)) as u32
}

/// Label every n-th item so labels `pitch` pixels apart keep `needed` pixels
/// between them.
pub fn label_stride(pitch: f64, needed: f64) -> usize {
    if pitch >= needed {
        return 1;
    }
    ((needed / pitch.max(1e-3)).ceil() as usize).max(1)
}

pub fn shorten(title: &str) -> String {
    if title.chars().count() <= MAX_TITLE_CHARS {
        return title.to_string();
    }
    let head: String = title.chars().take(MAX_TITLE_CHARS - 3).collect();
    format!("{head}...")
}

/// Allocate a pixel buffer of `size`, let `draw` paint it, and return the
/// PNG encoding as base64. The buffer lives only for this call; panics from
/// the drawing code are reported as render errors for `chart`.
pub fn render_base64<F>(chart: &'static str, size: (u32, u32), draw: F) -> Result<String, InsightError>
where
    F: for<'a> FnOnce(&Canvas<'a>) -> anyhow::Result<()>,
{
    let png = panic::catch_unwind(panic::AssertUnwindSafe(|| paint(size, draw)))
        .map_err(|_| InsightError::render(chart, "drawing backend panicked"))?
        .map_err(|err| InsightError::render(chart, format!("{err:#}")))?;
    Ok(STANDARD.encode(png))
}

fn paint<F>(size: (u32, u32), draw: F) -> anyhow::Result<Vec<u8>>
where
    F: for<'a> FnOnce(&Canvas<'a>) -> anyhow::Result<()>,
{
    let (width, height) = size;
    let mut pixels = vec![0u8; width as usize * height as usize * 3];
    {
        let root = GlyphBackend::new(BitMapBackend::with_buffer(&mut pixels, size))
            .into_drawing_area();
        root.fill(&WHITE)?;
        draw(&root)?;
        root.present()?;
    }
    encode_png(&pixels, width, height)
}

fn encode_png(pixels: &[u8], width: u32, height: u32) -> anyhow::Result<Vec<u8>> {
    let mut out = Vec::new();
    let mut encoder = png::Encoder::new(&mut out, width, height);
    encoder.set_color(png::ColorType::Rgb);
    encoder.set_depth(png::BitDepth::Eight);
    let mut writer = encoder.write_header()?;
    writer.write_image_data(pixels)?;
    writer.finish()?;
    Ok(out)
}

/// Backend wrapper that draws all text with the built-in bitmap face and
/// forwards every other primitive to `inner`.
pub struct GlyphBackend<DB> {
    inner: DB,
}

impl<DB> GlyphBackend<DB> {
    pub fn new(inner: DB) -> Self {
        Self { inner }
    }
}

impl<DB: DrawingBackend> DrawingBackend for GlyphBackend<DB> {
    type ErrorType = DB::ErrorType;

    fn get_size(&self) -> (u32, u32) {
        self.inner.get_size()
    }

    fn ensure_prepared(&mut self) -> Result<(), DrawingErrorKind<Self::ErrorType>> {
        self.inner.ensure_prepared()
    }

    fn present(&mut self) -> Result<(), DrawingErrorKind<Self::ErrorType>> {
        self.inner.present()
    }

    fn draw_pixel(
        &mut self,
        point: BackendCoord,
        color: BackendColor,
    ) -> Result<(), DrawingErrorKind<Self::ErrorType>> {
        self.inner.draw_pixel(point, color)
    }

    fn draw_line<S: BackendStyle>(
        &mut self,
        from: BackendCoord,
        to: BackendCoord,
        style: &S,
    ) -> Result<(), DrawingErrorKind<Self::ErrorType>> {
        self.inner.draw_line(from, to, style)
    }

    fn draw_rect<S: BackendStyle>(
        &mut self,
        upper_left: BackendCoord,
        bottom_right: BackendCoord,
        style: &S,
        fill: bool,
    ) -> Result<(), DrawingErrorKind<Self::ErrorType>> {
        self.inner.draw_rect(upper_left, bottom_right, style, fill)
    }

    fn draw_path<S: BackendStyle, I: IntoIterator<Item = BackendCoord>>(
        &mut self,
        path: I,
        style: &S,
    ) -> Result<(), DrawingErrorKind<Self::ErrorType>> {
        self.inner.draw_path(path, style)
    }

    fn draw_circle<S: BackendStyle>(
        &mut self,
        center: BackendCoord,
        radius: u32,
        style: &S,
        fill: bool,
    ) -> Result<(), DrawingErrorKind<Self::ErrorType>> {
        self.inner.draw_circle(center, radius, style, fill)
    }

    fn fill_polygon<S: BackendStyle, I: IntoIterator<Item = BackendCoord>>(
        &mut self,
        vert: I,
        style: &S,
    ) -> Result<(), DrawingErrorKind<Self::ErrorType>> {
        self.inner.fill_polygon(vert, style)
    }

    fn draw_text<TStyle: BackendTextStyle>(
        &mut self,
        text: &str,
        style: &TStyle,
        pos: BackendCoord,
    ) -> Result<(), DrawingErrorKind<Self::ErrorType>> {
        let color = style.color();
        if color.alpha == 0.0 || text.trim().is_empty() {
            return Ok(());
        }

        let scale = glyphs::scale_for(style.size());
        let (width, height) = glyphs::text_extent(text, scale);
        let anchor = style.anchor();
        let dx = match anchor.h_pos {
            text_anchor::HPos::Left => 0,
            text_anchor::HPos::Center => -width / 2,
            text_anchor::HPos::Right => -width,
        };
        let dy = match anchor.v_pos {
            text_anchor::VPos::Top => 0,
            text_anchor::VPos::Center => -height / 2,
            text_anchor::VPos::Bottom => -height,
        };

        // Offsets are laid out unrotated, then turned about `pos`.
        let transform = style.transform();
        let mut cursor_x = dx;
        for ch in text.chars() {
            if let Some(rows) = glyphs::glyph(ch) {
                for (row, bits) in rows.iter().enumerate() {
                    for col in 0..GLYPH_WIDTH {
                        if bits & (1 << (GLYPH_WIDTH - 1 - col)) != 0 {
                            let origin = (cursor_x + col * scale, dy + row as i32 * scale);
                            self.fill_block(pos, origin, scale, &transform, color)?;
                        }
                    }
                }
            }
            cursor_x += GLYPH_ADVANCE * scale;
        }
        Ok(())
    }

    fn estimate_text_size<TStyle: BackendTextStyle>(
        &self,
        text: &str,
        style: &TStyle,
    ) -> Result<(u32, u32), DrawingErrorKind<Self::ErrorType>> {
        let (width, height) = glyphs::text_extent(text, glyphs::scale_for(style.size()));
        Ok((width.max(0) as u32, height.max(0) as u32))
    }
}

impl<DB: DrawingBackend> GlyphBackend<DB> {
    fn fill_block(
        &mut self,
        pos: BackendCoord,
        origin: (i32, i32),
        scale: i32,
        transform: &FontTransform,
        color: BackendColor,
    ) -> Result<(), DrawingErrorKind<DB::ErrorType>> {
        for dx in 0..scale {
            for dy in 0..scale {
                let (x, y) = rotate(transform, origin.0 + dx, origin.1 + dy);
                self.inner.draw_pixel((pos.0 + x, pos.1 + y), color)?;
            }
        }
        Ok(())
    }
}

fn rotate(transform: &FontTransform, x: i32, y: i32) -> (i32, i32) {
    match transform {
        FontTransform::None => (x, y),
        FontTransform::Rotate90 => (-y, x),
        FontTransform::Rotate180 => (-x, -y),
        FontTransform::Rotate270 => (y, -x),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Decode a base64 PNG and return its dimensions and RGB pixels.
    pub(crate) fn decode(image: &str) -> (u32, u32, Vec<u8>) {
        let bytes = STANDARD.decode(image).expect("valid base64");
        let decoder = png::Decoder::new(std::io::Cursor::new(bytes));
        let mut reader = decoder.read_info().expect("valid png header");
        let mut pixels = vec![0; reader.output_buffer_size()];
        let info = reader.next_frame(&mut pixels).expect("valid png frame");
        pixels.truncate(info.buffer_size());
        (info.width, info.height, pixels)
    }

    #[test]
    fn extents_stay_within_cap() {
        assert_eq!(fitted_extent(2, 48, 160, 360), 360);
        assert_eq!(fitted_extent(10, 48, 160, 360), 640);
        assert_eq!(fitted_extent(3000, 48, 160, 360), MAX_EXTENT);
        assert_eq!(fitted_extent(usize::MAX, u32::MAX, u32::MAX, 400), MAX_EXTENT);
    }

    #[test]
    fn crowded_labels_are_thinned() {
        assert_eq!(label_stride(48.0, LABEL_PITCH), 1);
        assert_eq!(label_stride(9.0, LABEL_PITCH), 2);
        assert_eq!(label_stride(1.5, LABEL_PITCH), 12);
        assert!(label_stride(0.0, LABEL_PITCH) > 1);
    }

    #[test]
    fn long_titles_are_shortened() {
        let title = "An Extremely Long Quiz Title About Thermodynamics";
        let short = shorten(title);
        assert_eq!(short.chars().count(), MAX_TITLE_CHARS);
        assert!(short.ends_with("..."));
        assert_eq!(shorten("Optics"), "Optics");
    }

    #[test]
    fn blank_canvas_is_white_png() {
        let image = render_base64("blank", (40, 20), |_| Ok(())).unwrap();
        let (width, height, pixels) = decode(&image);
        assert_eq!((width, height), (40, 20));
        assert!(pixels.iter().all(|&channel| channel == 255));
    }

    #[test]
    fn text_is_drawn_without_system_fonts() {
        let image = render_base64("text", (120, 40), |root| {
            root.draw_text("Score 42%", &TextStyle::from(LABEL_FONT.into_font()).color(&BLACK), (4, 10))?;
            Ok(())
        })
        .unwrap();
        let (_, _, pixels) = decode(&image);
        assert!(pixels.iter().any(|&channel| channel == 0));
    }

    #[test]
    fn rotation_turns_offsets_about_the_anchor() {
        assert_eq!(rotate(&FontTransform::None, 3, 1), (3, 1));
        assert_eq!(rotate(&FontTransform::Rotate90, 3, 1), (-1, 3));
        assert_eq!(rotate(&FontTransform::Rotate180, 3, 1), (-3, -1));
        assert_eq!(rotate(&FontTransform::Rotate270, 3, 1), (1, -3));
    }

    #[test]
    fn drawing_errors_become_render_errors() {
        let err = render_base64("failing", (10, 10), |_| anyhow::bail!("boom")).unwrap_err();
        assert!(matches!(err, InsightError::Render { chart: "failing", .. }));
        assert!(err.to_string().contains("boom"));
    }

    #[test]
    fn panics_become_render_errors() {
        let err = render_base64("panicky", (10, 10), |_| panic!("backend exploded")).unwrap_err();
        assert!(matches!(err, InsightError::Render { chart: "panicky", .. }));
    }
}

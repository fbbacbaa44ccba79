mod canvas;
mod error;
mod font;
mod measure;
mod options;
mod paint;
mod raster;
mod surface;
mod types;

pub use canvas::{Canvas, Command, Drawing};
pub use error::LabelError;
pub use font::{
    DEFAULT_FONT_FAMILY, DEFAULT_FONT_SIZE, DEFAULT_LINE_HEIGHT, Font, FontRegistry, FontSpec,
    LineHeight, to_font, to_fonts,
};
pub use measure::{
    SizeCache, bitmap_size, calculate_label_size, fingerprint, measure_label_size, resolve_size,
};
pub use options::{
    Bitmap, BorderRadius, BoxOptions, CornerRadii, Corners, LabelContent, LabelOptions, LineCap,
    LineJoin, OneOrMany, Shadow, SizeSpec, TextAlign, TextBaseline,
};
pub use paint::{
    apply_rotation, clamp_corner_radii, line_positions, paint_box, paint_label, pick,
    resolve_opacity, text_anchor_x,
};
pub use raster::{RasterConfig, rasterize, render_png};
pub use surface::{Surface, SurfaceGuard};
pub use types::{Color, Point, Pt, Rect, Size};

/// Convenience wrapper over [`measure_label_size`], [`paint_box`],
/// [`paint_label`] and [`apply_rotation`] for callers that place a label by
/// its center: the box is the measured size plus `padding` on each side,
/// centered on `center` and rotated by `rotation` degrees around it.
///
/// Returns the box rect that was painted. Callers with their own placement
/// should use the underlying operations directly.
pub fn draw_label<S: Surface + ?Sized>(
    surface: &mut S,
    cache: &mut SizeCache,
    center: Point,
    padding: Pt,
    rotation: f32,
    box_options: &BoxOptions,
    label: &LabelOptions,
) -> Rect {
    let content = measure_label_size(surface, cache, label);
    let width = content.width + padding * 2;
    let height = content.height + padding * 2;
    let rect = Rect {
        x: center.x - width / 2,
        y: center.y - height / 2,
        width,
        height,
    };
    let inner = Rect {
        x: rect.x + padding,
        y: rect.y + padding,
        width: content.width,
        height: content.height,
    };

    let mut guard = SurfaceGuard::new(surface);
    apply_rotation(&mut *guard, center, rotation);
    paint_box(&mut *guard, &rect, box_options);
    paint_label(&mut *guard, &inner, label);
    rect
}

use crate::font::Font;
use crate::options::{Bitmap, CornerRadii, LineCap, LineJoin, Shadow, TextAlign, TextBaseline};
use crate::types::{Color, Pt, Rect};
use std::ops::{Deref, DerefMut};

/// 2D drawing surface with a canvas-style state stack.
///
/// Painting functions in this crate only talk to this trait; [`crate::Canvas`]
/// records calls for later rasterization, tests plug in counting stubs.
pub trait Surface {
    fn save(&mut self);
    fn restore(&mut self);

    fn translate(&mut self, x: Pt, y: Pt);
    fn rotate(&mut self, angle_radians: f32);

    fn set_fill_color(&mut self, color: Color);
    fn set_stroke_color(&mut self, color: Color);
    fn set_line_width(&mut self, width: Pt);
    fn set_line_cap(&mut self, cap: LineCap);
    fn set_line_join(&mut self, join: LineJoin);
    fn set_miter_limit(&mut self, limit: Pt);
    fn set_dash(&mut self, pattern: Vec<Pt>, phase: Pt);
    /// Applies the `Some` fields of `shadow`; `None` fields keep the current value.
    fn set_shadow(&mut self, shadow: Shadow);
    fn set_global_alpha(&mut self, alpha: f32);

    fn set_font(&mut self, font: &Font);
    fn set_text_align(&mut self, align: TextAlign);
    fn set_text_baseline(&mut self, baseline: TextBaseline);
    /// Advance width of `text` in the active font.
    fn measure_text(&self, text: &str) -> Pt;
    /// True when text is measured and drawn through pre-rasterized glyph sprites.
    fn uses_text_sprites(&self) -> bool {
        false
    }

    fn begin_path(&mut self);
    fn close_path(&mut self);
    fn add_rounded_rect(&mut self, rect: Rect, radii: CornerRadii);
    fn fill(&mut self);
    fn stroke(&mut self);

    /// Paints `text` immediately with the fill color.
    fn fill_text(&mut self, text: &str, x: Pt, y: Pt);
    /// Appends the outline of `text` to the current path without painting it.
    fn text_path(&mut self, text: &str, x: Pt, y: Pt);

    /// Draws `bitmap` stretched into `dest`.
    fn draw_image(&mut self, bitmap: &Bitmap, dest: Rect);
}

/// Saves surface state on creation and restores it on drop, so every exit
/// path of a paint call leaves the surface as it found it.
pub struct SurfaceGuard<'a, S: Surface + ?Sized> {
    surface: &'a mut S,
}

impl<'a, S: Surface + ?Sized> SurfaceGuard<'a, S> {
    pub fn new(surface: &'a mut S) -> Self {
        surface.save();
        Self { surface }
    }
}

impl<S: Surface + ?Sized> Deref for SurfaceGuard<'_, S> {
    type Target = S;

    fn deref(&self) -> &S {
        self.surface
    }
}

impl<S: Surface + ?Sized> DerefMut for SurfaceGuard<'_, S> {
    fn deref_mut(&mut self) -> &mut S {
        self.surface
    }
}

impl<S: Surface + ?Sized> Drop for SurfaceGuard<'_, S> {
    fn drop(&mut self) {
        self.surface.restore();
    }
}

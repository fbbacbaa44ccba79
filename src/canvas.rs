use crate::font::{Font, FontRegistry, FontSpec, fallback_text_width, to_font};
use crate::options::{Bitmap, CornerRadii, LineCap, LineJoin, Shadow, TextAlign, TextBaseline};
use crate::surface::Surface;
use crate::types::{Color, Pt, Rect, Size};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    SaveState,
    RestoreState,
    Translate(Pt, Pt),
    Rotate(f32),
    SetFillColor(Color),
    SetStrokeColor(Color),
    SetLineWidth(Pt),
    SetLineCap(LineCap),
    SetLineJoin(LineJoin),
    SetMiterLimit(Pt),
    SetDash {
        pattern: Vec<Pt>,
        phase: Pt,
    },
    SetShadow(Shadow),
    // Values outside 0..1 are clamped.
    SetGlobalAlpha(f32),
    SetFont(Font),
    SetTextAlign(TextAlign),
    SetTextBaseline(TextBaseline),
    BeginPath,
    ClosePath,
    RoundedRect {
        rect: Rect,
        radii: CornerRadii,
    },
    Fill,
    Stroke,
    FillText {
        x: Pt,
        y: Pt,
        text: String,
    },
    // Adds glyph outlines to the current path; painted by a later Stroke.
    TextPath {
        x: Pt,
        y: Pt,
        text: String,
    },
    DrawImage {
        dest: Rect,
        source: String,
    },
}

/// Recorded drawing, ready for [`crate::rasterize`].
#[derive(Debug, Clone)]
pub struct Drawing {
    pub size: Size,
    pub commands: Vec<Command>,
}

#[derive(Debug, Clone)]
struct GraphicsState {
    fill_color: Color,
    stroke_color: Color,
    line_width: Pt,
    font: Font,
}

impl GraphicsState {
    fn initial() -> Self {
        Self {
            fill_color: Color::BLACK,
            stroke_color: Color::BLACK,
            line_width: Pt::from_f32(1.0),
            font: to_font(&FontSpec::default()),
        }
    }
}

/// Command-recording surface. Text is measured against the attached
/// [`FontRegistry`], or a width estimate when none is attached.
pub struct Canvas {
    size: Size,
    commands: Vec<Command>,
    state_stack: Vec<GraphicsState>,
    current_state: GraphicsState,
    fonts: Option<Arc<FontRegistry>>,
    text_sprites: bool,
}

impl Canvas {
    pub fn new(size: Size) -> Self {
        Self {
            size,
            commands: Vec::new(),
            state_stack: Vec::new(),
            current_state: GraphicsState::initial(),
            fonts: None,
            text_sprites: false,
        }
    }

    pub fn with_fonts(size: Size, fonts: Arc<FontRegistry>) -> Self {
        let mut canvas = Self::new(size);
        canvas.fonts = Some(fonts);
        canvas
    }

    /// Marks the canvas as drawing text through glyph sprites, which keys
    /// measurements separately from native text.
    pub fn set_text_sprites(&mut self, enabled: bool) {
        self.text_sprites = enabled;
    }

    pub fn size(&self) -> Size {
        self.size
    }

    pub fn fonts(&self) -> Option<&Arc<FontRegistry>> {
        self.fonts.as_ref()
    }

    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    pub fn command_count(&self) -> usize {
        self.commands.len()
    }

    pub fn state_depth(&self) -> usize {
        self.state_stack.len()
    }

    pub fn active_font(&self) -> &Font {
        &self.current_state.font
    }

    pub fn finish(self) -> Drawing {
        Drawing {
            size: self.size,
            commands: self.commands,
        }
    }
}

impl Surface for Canvas {
    fn save(&mut self) {
        self.state_stack.push(self.current_state.clone());
        self.commands.push(Command::SaveState);
    }

    fn restore(&mut self) {
        if let Some(state) = self.state_stack.pop() {
            self.current_state = state;
            self.commands.push(Command::RestoreState);
        }
    }

    fn translate(&mut self, x: Pt, y: Pt) {
        self.commands.push(Command::Translate(x, y));
    }

    fn rotate(&mut self, angle_radians: f32) {
        self.commands.push(Command::Rotate(angle_radians));
    }

    fn set_fill_color(&mut self, color: Color) {
        if self.current_state.fill_color == color {
            return;
        }
        self.current_state.fill_color = color;
        self.commands.push(Command::SetFillColor(color));
    }

    fn set_stroke_color(&mut self, color: Color) {
        if self.current_state.stroke_color == color {
            return;
        }
        self.current_state.stroke_color = color;
        self.commands.push(Command::SetStrokeColor(color));
    }

    fn set_line_width(&mut self, width: Pt) {
        let width = if width < Pt::ZERO { Pt::ZERO } else { width };
        if self.current_state.line_width == width {
            return;
        }
        self.current_state.line_width = width;
        self.commands.push(Command::SetLineWidth(width));
    }

    fn set_line_cap(&mut self, cap: LineCap) {
        self.commands.push(Command::SetLineCap(cap));
    }

    fn set_line_join(&mut self, join: LineJoin) {
        self.commands.push(Command::SetLineJoin(join));
    }

    fn set_miter_limit(&mut self, limit: Pt) {
        let limit = if limit < Pt::ZERO { Pt::ZERO } else { limit };
        self.commands.push(Command::SetMiterLimit(limit));
    }

    fn set_dash(&mut self, pattern: Vec<Pt>, phase: Pt) {
        self.commands.push(Command::SetDash { pattern, phase });
    }

    fn set_shadow(&mut self, shadow: Shadow) {
        self.commands.push(Command::SetShadow(shadow));
    }

    fn set_global_alpha(&mut self, alpha: f32) {
        let alpha = if alpha.is_finite() {
            alpha.clamp(0.0, 1.0)
        } else {
            1.0
        };
        self.commands.push(Command::SetGlobalAlpha(alpha));
    }

    fn set_font(&mut self, font: &Font) {
        if self.current_state.font.string == font.string {
            return;
        }
        self.current_state.font = font.clone();
        self.commands.push(Command::SetFont(font.clone()));
    }

    fn set_text_align(&mut self, align: TextAlign) {
        self.commands.push(Command::SetTextAlign(align));
    }

    fn set_text_baseline(&mut self, baseline: TextBaseline) {
        self.commands.push(Command::SetTextBaseline(baseline));
    }

    fn measure_text(&self, text: &str) -> Pt {
        let font = &self.current_state.font;
        match &self.fonts {
            Some(registry) => registry.measure_text_width(&font.family, font.size, text),
            None => fallback_text_width(font.size, text),
        }
    }

    fn uses_text_sprites(&self) -> bool {
        self.text_sprites
    }

    fn begin_path(&mut self) {
        self.commands.push(Command::BeginPath);
    }

    fn close_path(&mut self) {
        self.commands.push(Command::ClosePath);
    }

    fn add_rounded_rect(&mut self, rect: Rect, radii: CornerRadii) {
        self.commands.push(Command::RoundedRect { rect, radii });
    }

    fn fill(&mut self) {
        self.commands.push(Command::Fill);
    }

    fn stroke(&mut self) {
        self.commands.push(Command::Stroke);
    }

    fn fill_text(&mut self, text: &str, x: Pt, y: Pt) {
        self.commands.push(Command::FillText {
            x,
            y,
            text: text.to_string(),
        });
    }

    fn text_path(&mut self, text: &str, x: Pt, y: Pt) {
        self.commands.push(Command::TextPath {
            x,
            y,
            text: text.to_string(),
        });
    }

    fn draw_image(&mut self, bitmap: &Bitmap, dest: Rect) {
        self.commands.push(Command::DrawImage {
            dest,
            source: bitmap.source.clone(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redundant_state_changes_are_not_recorded() {
        let mut canvas = Canvas::new(Size::new(10.0, 10.0));
        canvas.set_fill_color(Color::BLACK);
        canvas.set_line_width(Pt::from_f32(1.0));
        canvas.set_fill_color(Color::WHITE);
        canvas.set_fill_color(Color::WHITE);
        assert_eq!(canvas.commands(), &[Command::SetFillColor(Color::WHITE)]);
    }

    #[test]
    fn restore_reverts_tracked_state() {
        let mut canvas = Canvas::new(Size::new(10.0, 10.0));
        canvas.save();
        canvas.set_fill_color(Color::WHITE);
        canvas.restore();
        canvas.set_fill_color(Color::WHITE);
        assert_eq!(
            canvas.commands(),
            &[
                Command::SaveState,
                Command::SetFillColor(Color::WHITE),
                Command::RestoreState,
                Command::SetFillColor(Color::WHITE),
            ]
        );
    }

    #[test]
    fn unbalanced_restore_is_ignored() {
        let mut canvas = Canvas::new(Size::new(10.0, 10.0));
        canvas.restore();
        assert!(canvas.commands().is_empty());
    }

    #[test]
    fn measure_text_uses_active_font_size() {
        let mut canvas = Canvas::new(Size::new(10.0, 10.0));
        let small = canvas.measure_text("ab");
        canvas.set_font(&to_font(&FontSpec::new().size(24.0)));
        let large = canvas.measure_text("ab");
        assert_eq!(small, Pt::from_f32(14.4));
        assert_eq!(large, Pt::from_f32(28.8));
    }

    #[test]
    fn global_alpha_is_clamped() {
        let mut canvas = Canvas::new(Size::new(10.0, 10.0));
        canvas.set_global_alpha(3.0);
        canvas.set_global_alpha(f32::NAN);
        assert_eq!(
            canvas.commands(),
            &[Command::SetGlobalAlpha(1.0), Command::SetGlobalAlpha(1.0)]
        );
    }
}

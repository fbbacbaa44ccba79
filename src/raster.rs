use crate::canvas::{Command, Drawing};
use crate::error::LabelError;
use crate::font::{Font, FontRegistry, FontSpec, detect_direction, to_font};
use crate::options::{CornerRadii, LineCap, LineJoin, TextAlign, TextBaseline, parse_data_uri};
use crate::types::{Color, Pt, Rect};
use rustybuzz::{Face as HbFace, UnicodeBuffer};
use std::collections::HashMap;
use std::path::{Path as FsPath, PathBuf};
use tiny_skia::{
    FillRule, FilterQuality, Paint, Path, PathBuilder, Pixmap, PixmapPaint, Stroke, StrokeDash,
    Transform,
};
use ttf_parser::{GlyphId, OutlineBuilder};

// Cubic control distance for a quarter circle of radius 1.
const KAPPA: f32 = 0.552_284_8;

/// Output settings for [`rasterize`].
#[derive(Debug, Clone)]
pub struct RasterConfig {
    width: u32,
    height: u32,
    scale: f32,
    background: Color,
    shape_text: bool,
    font_dirs: Vec<PathBuf>,
    font_files: Vec<PathBuf>,
}

impl RasterConfig {
    /// Output of `width` x `height` drawing units at scale 1 on a transparent background.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            scale: 1.0,
            background: Color::TRANSPARENT,
            shape_text: true,
            font_dirs: Vec::new(),
            font_files: Vec::new(),
        }
    }

    pub fn for_drawing(drawing: &Drawing) -> Self {
        let width = drawing.size.width.to_f32().ceil().max(0.0) as u32;
        let height = drawing.size.height.to_f32().ceil().max(0.0) as u32;
        Self::new(width, height)
    }

    /// Device pixels per drawing unit.
    pub fn scale(mut self, scale: f32) -> Self {
        self.scale = scale;
        self
    }

    pub fn background(mut self, color: Color) -> Self {
        self.background = color;
        self
    }

    pub fn shape_text(mut self, enabled: bool) -> Self {
        self.shape_text = enabled;
        self
    }

    pub fn register_font_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.font_dirs.push(path.into());
        self
    }

    pub fn register_font_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.font_files.push(path.into());
        self
    }

    /// Builds a registry from the configured font dirs and files.
    pub fn load_fonts(&self) -> FontRegistry {
        let mut registry = FontRegistry::new();
        registry.set_shape_text(self.shape_text);
        for dir in &self.font_dirs {
            registry.register_dir(dir);
        }
        for file in &self.font_files {
            registry.register_file(file);
        }
        registry
    }

    fn pixel_size(&self) -> Result<(u32, u32), LabelError> {
        if !self.scale.is_finite() || self.scale <= 0.0 {
            return Err(LabelError::InvalidConfiguration(format!(
                "raster scale must be > 0, got {}",
                self.scale
            )));
        }
        let width = (self.width as f32 * self.scale).round();
        let height = (self.height as f32 * self.scale).round();
        if width < 1.0 || height < 1.0 || width > u32::MAX as f32 || height > u32::MAX as f32 {
            return Err(LabelError::InvalidConfiguration(format!(
                "invalid raster size {}x{} at scale {}",
                self.width, self.height, self.scale
            )));
        }
        Ok((width as u32, height as u32))
    }
}

#[derive(Clone)]
struct ShadowState {
    color: Color,
    blur: f32,
    offset_x: f32,
    offset_y: f32,
}

impl ShadowState {
    // Same rule as HTML canvas: visible color plus blur or an offset.
    fn is_visible(&self) -> bool {
        !self.color.is_transparent()
            && (self.blur != 0.0 || self.offset_x != 0.0 || self.offset_y != 0.0)
    }
}

#[derive(Clone)]
struct RasterState {
    transform: Transform,
    fill_color: Color,
    stroke_color: Color,
    line_width: Pt,
    line_cap: LineCap,
    line_join: LineJoin,
    miter_limit: Pt,
    dash_pattern: Vec<Pt>,
    dash_phase: Pt,
    shadow: ShadowState,
    global_alpha: f32,
    font: Font,
    text_align: TextAlign,
    text_baseline: TextBaseline,
}

impl Default for RasterState {
    fn default() -> Self {
        Self {
            transform: Transform::identity(),
            fill_color: Color::BLACK,
            stroke_color: Color::BLACK,
            line_width: Pt::from_f32(1.0),
            line_cap: LineCap::Butt,
            line_join: LineJoin::Miter,
            miter_limit: Pt::from_f32(10.0),
            dash_pattern: Vec::new(),
            dash_phase: Pt::ZERO,
            shadow: ShadowState {
                color: Color::TRANSPARENT,
                blur: 0.0,
                offset_x: 0.0,
                offset_y: 0.0,
            },
            global_alpha: 1.0,
            font: to_font(&FontSpec::default()),
            text_align: TextAlign::Start,
            text_baseline: TextBaseline::Alphabetic,
        }
    }
}

#[derive(Clone, Copy)]
enum PaintOp {
    Fill,
    Stroke,
}

struct Rasterizer<'a> {
    pixmap: Pixmap,
    scale: f32,
    fonts: Option<&'a FontRegistry>,
    shape_text: bool,
    state: RasterState,
    stack: Vec<RasterState>,
    path: PathBuilder,
    images: HashMap<String, Option<Pixmap>>,
}

/// Replays a recorded drawing onto a new pixmap.
pub fn rasterize(
    drawing: &Drawing,
    config: &RasterConfig,
    fonts: Option<&FontRegistry>,
) -> Result<Pixmap, LabelError> {
    let (width, height) = config.pixel_size()?;
    let mut pixmap = Pixmap::new(width, height).ok_or_else(|| {
        LabelError::InvalidConfiguration(format!("invalid raster size {width}x{height}"))
    })?;
    pixmap.fill(to_sk_color(config.background, 1.0));

    let mut rasterizer = Rasterizer {
        pixmap,
        scale: config.scale,
        fonts,
        shape_text: config.shape_text,
        state: RasterState::default(),
        stack: Vec::new(),
        path: PathBuilder::new(),
        images: HashMap::new(),
    };
    for cmd in &drawing.commands {
        rasterizer.apply(cmd);
    }
    Ok(rasterizer.pixmap)
}

pub fn render_png(
    drawing: &Drawing,
    config: &RasterConfig,
    fonts: Option<&FontRegistry>,
) -> Result<Vec<u8>, LabelError> {
    rasterize(drawing, config, fonts)?
        .encode_png()
        .map_err(|e| LabelError::Asset(format!("png encode failed: {e}")))
}

impl Rasterizer<'_> {
    fn device_transform(&self) -> Transform {
        Transform::from_scale(self.scale, self.scale).pre_concat(self.state.transform)
    }

    fn apply(&mut self, cmd: &Command) {
        match cmd {
            Command::SaveState => self.stack.push(self.state.clone()),
            Command::RestoreState => {
                if let Some(restored) = self.stack.pop() {
                    self.state = restored;
                }
            }
            Command::Translate(x, y) => {
                self.state.transform = self
                    .state
                    .transform
                    .pre_concat(Transform::from_translate(x.to_f32(), y.to_f32()));
            }
            Command::Rotate(angle) => {
                let deg = angle.to_degrees();
                self.state.transform = self.state.transform.pre_concat(Transform::from_rotate(deg));
            }
            Command::SetFillColor(color) => self.state.fill_color = *color,
            Command::SetStrokeColor(color) => self.state.stroke_color = *color,
            Command::SetLineWidth(width) => self.state.line_width = width.max(Pt::ZERO),
            Command::SetLineCap(cap) => self.state.line_cap = *cap,
            Command::SetLineJoin(join) => self.state.line_join = *join,
            Command::SetMiterLimit(limit) => self.state.miter_limit = limit.max(Pt::ZERO),
            Command::SetDash { pattern, phase } => {
                self.state.dash_pattern = pattern.clone();
                self.state.dash_phase = *phase;
            }
            Command::SetShadow(shadow) => {
                let current = &mut self.state.shadow;
                if let Some(color) = shadow.color {
                    current.color = color;
                }
                if let Some(blur) = shadow.blur.filter(|v| v.is_finite() && *v >= 0.0) {
                    current.blur = blur;
                }
                if let Some(x) = shadow.offset_x.filter(|v| v.is_finite()) {
                    current.offset_x = x;
                }
                if let Some(y) = shadow.offset_y.filter(|v| v.is_finite()) {
                    current.offset_y = y;
                }
            }
            Command::SetGlobalAlpha(alpha) => self.state.global_alpha = alpha.clamp(0.0, 1.0),
            Command::SetFont(font) => self.state.font = font.clone(),
            Command::SetTextAlign(align) => self.state.text_align = *align,
            Command::SetTextBaseline(baseline) => self.state.text_baseline = *baseline,
            Command::BeginPath => self.path = PathBuilder::new(),
            Command::ClosePath => self.path.close(),
            Command::RoundedRect { rect, radii } => rounded_rect_path(&mut self.path, rect, radii),
            Command::Fill => {
                if let Some(path) = self.path.clone().finish() {
                    self.paint_path(&path, PaintOp::Fill);
                }
            }
            Command::Stroke => {
                if let Some(path) = self.path.clone().finish() {
                    self.paint_path(&path, PaintOp::Stroke);
                }
            }
            Command::FillText { x, y, text } => {
                let mut builder = PathBuilder::new();
                if self.append_text(&mut builder, text, x.to_f32(), y.to_f32()) {
                    if let Some(path) = builder.finish() {
                        self.paint_path(&path, PaintOp::Fill);
                    }
                }
            }
            Command::TextPath { x, y, text } => {
                let mut builder = std::mem::take(&mut self.path);
                self.append_text(&mut builder, text, x.to_f32(), y.to_f32());
                self.path = builder;
            }
            Command::DrawImage { dest, source } => self.draw_image(dest, source),
        }
    }

    fn paint_path(&mut self, path: &Path, op: PaintOp) {
        let transform = self.device_transform();
        let (color, stroke) = match op {
            PaintOp::Fill => (self.state.fill_color, None),
            PaintOp::Stroke => {
                if self.state.line_width <= Pt::ZERO {
                    return;
                }
                (self.state.stroke_color, Some(build_stroke(&self.state)))
            }
        };
        if self.state.shadow.is_visible() {
            self.paint_shadow(path, stroke.as_ref(), transform);
        }
        let paint = solid_paint(color, self.state.global_alpha);
        match stroke {
            Some(stroke) => self.pixmap.stroke_path(path, &paint, &stroke, transform, None),
            None => self
                .pixmap
                .fill_path(path, &paint, FillRule::Winding, transform, None),
        }
    }

    fn paint_shadow(&mut self, path: &Path, stroke: Option<&Stroke>, transform: Transform) {
        let shadow = &self.state.shadow;
        let Some(mut layer) = Pixmap::new(self.pixmap.width(), self.pixmap.height()) else {
            return;
        };
        let paint = solid_paint(shadow.color, self.state.global_alpha);
        match stroke {
            Some(stroke) => layer.stroke_path(path, &paint, stroke, transform, None),
            None => layer.fill_path(path, &paint, FillRule::Winding, transform, None),
        }
        // blur is a standard deviation times two, in unscaled units
        box_blur(&mut layer, shadow.blur * 0.5 * self.scale);
        let dx = (shadow.offset_x * self.scale).round() as i32;
        let dy = (shadow.offset_y * self.scale).round() as i32;
        self.pixmap.draw_pixmap(
            dx,
            dy,
            layer.as_ref(),
            &PixmapPaint::default(),
            Transform::identity(),
            None,
        );
    }

    /// Appends glyph outlines of `text` anchored per the current alignment
    /// and baseline. Returns false when no face is available.
    fn append_text(&self, builder: &mut PathBuilder, text: &str, x: f32, y: f32) -> bool {
        let font = &self.state.font;
        let Some(face_data) = self
            .fonts
            .and_then(|registry| registry.resolve(&font.family))
        else {
            log::debug!(
                "skipping text '{}': no face for '{}'",
                text,
                font.family
            );
            return false;
        };
        let Ok(face) = ttf_parser::Face::parse(&face_data.data, 0) else {
            log::debug!("skipping text '{}': unparsable face '{}'", text, face_data.name);
            return false;
        };
        let font_size = font.size.to_f32();
        let layout = layout_text_glyphs(&face_data.data, text, font_size, self.shape_text);
        let units_per_em = face.units_per_em().max(1) as f32;
        let unit = font_size / units_per_em;

        let origin_x = match self.state.text_align {
            TextAlign::Left | TextAlign::Start => x,
            TextAlign::Center => x - layout.advance / 2.0,
            TextAlign::Right | TextAlign::End => x - layout.advance,
        };
        let ascent = face.ascender() as f32 * unit;
        let descent = face.descender() as f32 * unit;
        let baseline_y = match self.state.text_baseline {
            TextBaseline::Alphabetic => y,
            TextBaseline::Top => y + ascent,
            TextBaseline::Middle => y + (ascent + descent) / 2.0,
            TextBaseline::Bottom => y + descent,
        };

        for placement in layout.glyphs {
            let mut sink = GlyphPathBuilder {
                builder: &mut *builder,
                origin_x: origin_x + placement.offset_x,
                origin_y: baseline_y - placement.offset_y,
                scale: unit,
            };
            let _ = face.outline_glyph(GlyphId(placement.glyph_id), &mut sink);
        }
        true
    }

    fn draw_image(&mut self, dest: &Rect, source: &str) {
        let transform = self.device_transform();
        let alpha = self.state.global_alpha;
        let image = self
            .images
            .entry(source.to_string())
            .or_insert_with(|| load_image_pixmap(source));
        let Some(image) = image.as_ref() else {
            log::debug!("skipping bitmap '{}': not decodable", source);
            return;
        };
        let src_w = image.width() as f32;
        let src_h = image.height() as f32;
        let sx = dest.width.to_f32() / src_w;
        let sy = dest.height.to_f32() / src_h;
        let image_ts = Transform::from_row(sx, 0.0, 0.0, sy, dest.x.to_f32(), dest.y.to_f32());
        let mut paint = PixmapPaint::default();
        paint.quality = FilterQuality::Bilinear;
        paint.opacity = alpha;
        self.pixmap.draw_pixmap(
            0,
            0,
            image.as_ref(),
            &paint,
            transform.pre_concat(image_ts),
            None,
        );
    }
}

/// Clockwise rounded rectangle from the top-left corner. Corners with a zero
/// radius are square.
fn rounded_rect_path(builder: &mut PathBuilder, rect: &Rect, radii: &CornerRadii) {
    let x = rect.x.to_f32();
    let y = rect.y.to_f32();
    let right = x + rect.width.to_f32();
    let bottom = y + rect.height.to_f32();
    let tl = radii.top_left.to_f32();
    let tr = radii.top_right.to_f32();
    let br = radii.bottom_right.to_f32();
    let bl = radii.bottom_left.to_f32();

    builder.move_to(x + tl, y);
    builder.line_to(right - tr, y);
    if tr > 0.0 {
        builder.cubic_to(right - tr + tr * KAPPA, y, right, y + tr - tr * KAPPA, right, y + tr);
    }
    builder.line_to(right, bottom - br);
    if br > 0.0 {
        builder.cubic_to(
            right,
            bottom - br + br * KAPPA,
            right - br + br * KAPPA,
            bottom,
            right - br,
            bottom,
        );
    }
    builder.line_to(x + bl, bottom);
    if bl > 0.0 {
        builder.cubic_to(x + bl - bl * KAPPA, bottom, x, bottom - bl + bl * KAPPA, x, bottom - bl);
    }
    builder.line_to(x, y + tl);
    if tl > 0.0 {
        builder.cubic_to(x, y + tl - tl * KAPPA, x + tl - tl * KAPPA, y, x + tl, y);
    }
}

#[derive(Clone, Copy)]
struct GlyphPlacement {
    glyph_id: u16,
    offset_x: f32,
    offset_y: f32,
}

struct TextLayout {
    glyphs: Vec<GlyphPlacement>,
    advance: f32,
}

fn layout_text_glyphs(font_data: &[u8], text: &str, font_size: f32, shape_text: bool) -> TextLayout {
    if !shape_text {
        return layout_text_glyphs_unshaped(font_data, text, font_size);
    }
    let Some(face) = HbFace::from_slice(font_data, 0) else {
        return layout_text_glyphs_unshaped(font_data, text, font_size);
    };
    let hb_units = face.units_per_em().max(1) as f32;
    let mut buffer = UnicodeBuffer::new();
    buffer.set_direction(detect_direction(text));
    buffer.push_str(text);
    let output = rustybuzz::shape(&face, &[], buffer);
    let infos = output.glyph_infos();
    let positions = output.glyph_positions();
    if infos.is_empty() || infos.len() != positions.len() {
        return layout_text_glyphs_unshaped(font_data, text, font_size);
    }

    let mut glyphs = Vec::with_capacity(infos.len());
    let mut pen_x = 0.0f32;
    let mut pen_y = 0.0f32;
    for (info, pos) in infos.iter().zip(positions.iter()) {
        let gid = info.glyph_id as u16;
        if gid != 0 {
            glyphs.push(GlyphPlacement {
                glyph_id: gid,
                offset_x: pen_x + (pos.x_offset as f32 / hb_units) * font_size,
                offset_y: pen_y + (pos.y_offset as f32 / hb_units) * font_size,
            });
        }
        pen_x += (pos.x_advance as f32 / hb_units) * font_size;
        pen_y += (pos.y_advance as f32 / hb_units) * font_size;
    }
    TextLayout {
        glyphs,
        advance: pen_x,
    }
}

fn layout_text_glyphs_unshaped(font_data: &[u8], text: &str, font_size: f32) -> TextLayout {
    let Ok(face) = ttf_parser::Face::parse(font_data, 0) else {
        return TextLayout {
            glyphs: Vec::new(),
            advance: 0.0,
        };
    };
    let units_per_em = face.units_per_em().max(1) as f32;

    let mut glyphs = Vec::new();
    let mut pen_x = 0.0f32;
    for ch in text.chars() {
        let gid = face.glyph_index(ch).map(|id| id.0).unwrap_or(0);
        if gid == 0 {
            pen_x += font_size * 0.5;
            continue;
        }
        glyphs.push(GlyphPlacement {
            glyph_id: gid,
            offset_x: pen_x,
            offset_y: 0.0,
        });
        let advance_units = face.glyph_hor_advance(GlyphId(gid)).unwrap_or(0) as f32;
        let mut adv = (advance_units / units_per_em) * font_size;
        if adv <= 0.0 {
            adv = font_size * 0.5;
        }
        pen_x += adv;
    }
    TextLayout {
        glyphs,
        advance: pen_x,
    }
}

/// Font units are y-up; the drawing surface is y-down.
struct GlyphPathBuilder<'a> {
    builder: &'a mut PathBuilder,
    origin_x: f32,
    origin_y: f32,
    scale: f32,
}

impl GlyphPathBuilder<'_> {
    fn map(&self, x: f32, y: f32) -> (f32, f32) {
        (self.origin_x + x * self.scale, self.origin_y - y * self.scale)
    }
}

impl OutlineBuilder for GlyphPathBuilder<'_> {
    fn move_to(&mut self, x: f32, y: f32) {
        let (x, y) = self.map(x, y);
        self.builder.move_to(x, y);
    }

    fn line_to(&mut self, x: f32, y: f32) {
        let (x, y) = self.map(x, y);
        self.builder.line_to(x, y);
    }

    fn quad_to(&mut self, x1: f32, y1: f32, x: f32, y: f32) {
        let (x1, y1) = self.map(x1, y1);
        let (x, y) = self.map(x, y);
        self.builder.quad_to(x1, y1, x, y);
    }

    fn curve_to(&mut self, x1: f32, y1: f32, x2: f32, y2: f32, x: f32, y: f32) {
        let (x1, y1) = self.map(x1, y1);
        let (x2, y2) = self.map(x2, y2);
        let (x, y) = self.map(x, y);
        self.builder.cubic_to(x1, y1, x2, y2, x, y);
    }

    fn close(&mut self) {
        self.builder.close();
    }
}

fn build_stroke(state: &RasterState) -> Stroke {
    let mut stroke = Stroke::default();
    stroke.width = state.line_width.to_f32().max(0.0);
    stroke.miter_limit = state.miter_limit.to_f32().max(0.0);
    stroke.line_cap = match state.line_cap {
        LineCap::Butt => tiny_skia::LineCap::Butt,
        LineCap::Round => tiny_skia::LineCap::Round,
        LineCap::Square => tiny_skia::LineCap::Square,
    };
    stroke.line_join = match state.line_join {
        LineJoin::Miter => tiny_skia::LineJoin::Miter,
        LineJoin::Round => tiny_skia::LineJoin::Round,
        LineJoin::Bevel => tiny_skia::LineJoin::Bevel,
    };

    if !state.dash_pattern.is_empty() {
        let mut pattern: Vec<f32> = state
            .dash_pattern
            .iter()
            .map(|p| p.to_f32().max(0.0))
            .collect();
        if pattern.len() % 2 == 1 {
            let copy = pattern.clone();
            pattern.extend(copy);
        }
        if let Some(dash) = StrokeDash::new(pattern, state.dash_phase.to_f32()) {
            stroke.dash = Some(dash);
        }
    }

    stroke
}

fn solid_paint(color: Color, alpha: f32) -> Paint<'static> {
    let mut paint = Paint::default();
    paint.set_color(to_sk_color(color, alpha));
    paint.anti_alias = true;
    paint
}

fn to_sk_color(color: Color, alpha: f32) -> tiny_skia::Color {
    let r = color.r.clamp(0.0, 1.0);
    let g = color.g.clamp(0.0, 1.0);
    let b = color.b.clamp(0.0, 1.0);
    let a = (color.a * alpha).clamp(0.0, 1.0);
    tiny_skia::Color::from_rgba(r, g, b, a)
        .unwrap_or_else(|| tiny_skia::Color::from_rgba8(0, 0, 0, 255))
}

/// Approximates a Gaussian blur of standard deviation `sigma` (device
/// pixels) with three box blur passes per axis.
fn box_blur(pixmap: &mut Pixmap, sigma: f32) {
    if !sigma.is_finite() || sigma <= 0.0 {
        return;
    }
    // Radius never exceeds the pixmap extent.
    let sigma = sigma.min(pixmap.width().max(pixmap.height()) as f32);
    let ideal_width = (12.0 * sigma * sigma / 3.0 + 1.0).sqrt();
    let radius = ((ideal_width - 1.0) / 2.0).round() as usize;
    if radius == 0 {
        return;
    }
    let width = pixmap.width() as usize;
    let height = pixmap.height() as usize;
    let data = pixmap.data_mut();
    let mut scratch = vec![0u8; data.len()];
    for _ in 0..3 {
        blur_pass(data, &mut scratch, width, height, radius, true);
        blur_pass(&scratch, data, width, height, radius, false);
    }
}

// Writes the horizontal (or vertical) running average of `src` into `dst`.
// Premultiplied channels blur independently.
fn blur_pass(
    src: &[u8],
    dst: &mut [u8],
    width: usize,
    height: usize,
    radius: usize,
    horizontal: bool,
) {
    let (lines, len) = if horizontal {
        (height, width)
    } else {
        (width, height)
    };
    let index = |line: usize, pos: usize| -> usize {
        if horizontal {
            (line * width + pos) * 4
        } else {
            (pos * width + line) * 4
        }
    };
    let window = (radius * 2 + 1) as u64;
    for line in 0..lines {
        let mut sums = [0u64; 4];
        for pos in 0..=radius.min(len.saturating_sub(1)) {
            let i = index(line, pos);
            for c in 0..4 {
                sums[c] += src[i + c] as u64;
            }
        }
        for pos in 0..len {
            let i = index(line, pos);
            for c in 0..4 {
                dst[i + c] = (sums[c] / window).min(255) as u8;
            }
            let enter = pos + radius + 1;
            if enter < len {
                let j = index(line, enter);
                for c in 0..4 {
                    sums[c] += src[j + c] as u64;
                }
            }
            if pos >= radius {
                let j = index(line, pos - radius);
                for c in 0..4 {
                    sums[c] -= src[j + c] as u64;
                }
            }
        }
    }
}

fn load_image_pixmap(source: &str) -> Option<Pixmap> {
    if let Some((mime, data)) = parse_data_uri(source) {
        return decode_image_to_pixmap(&data, Some(&mime));
    }
    let bytes = std::fs::read(FsPath::new(source)).ok()?;
    decode_image_to_pixmap(&bytes, None)
}

fn decode_image_to_pixmap(data: &[u8], mime: Option<&str>) -> Option<Pixmap> {
    let guessed_format = if let Some(mime) = mime {
        if mime.contains("png") {
            Some(image::ImageFormat::Png)
        } else if mime.contains("jpeg") || mime.contains("jpg") {
            Some(image::ImageFormat::Jpeg)
        } else {
            None
        }
    } else {
        image::guess_format(data).ok()
    };

    let decoded = if let Some(fmt) = guessed_format {
        image::load_from_memory_with_format(data, fmt).ok()?
    } else {
        image::load_from_memory(data).ok()?
    };
    let rgba = decoded.to_rgba8();
    let (width, height) = rgba.dimensions();
    let mut pixmap = Pixmap::new(width, height)?;
    let src = rgba.as_raw();
    let dst = pixmap.data_mut();
    for (src_px, dst_px) in src.chunks_exact(4).zip(dst.chunks_exact_mut(4)) {
        let a = src_px[3];
        dst_px[0] = premul_u8(src_px[0], a);
        dst_px[1] = premul_u8(src_px[1], a);
        dst_px[2] = premul_u8(src_px[2], a);
        dst_px[3] = a;
    }
    Some(pixmap)
}

fn premul_u8(channel: u8, alpha: u8) -> u8 {
    let prod = (channel as u16) * (alpha as u16) + 127;
    ((prod + (prod >> 8)) >> 8) as u8
}

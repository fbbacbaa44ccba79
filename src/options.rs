use crate::error::LabelError;
use crate::font::FontSpec;
use crate::types::{Color, Pt};
use base64::Engine;
use std::path::Path;

/// A single option value or one value per line.
#[derive(Debug, Clone, PartialEq)]
pub enum OneOrMany<T> {
    One(T),
    Many(Vec<T>),
}

impl<T> OneOrMany<T> {
    /// Broadcasts a singleton into a slice of one.
    pub fn as_slice(&self) -> &[T] {
        match self {
            OneOrMany::One(value) => std::slice::from_ref(value),
            OneOrMany::Many(values) => values.as_slice(),
        }
    }
}

impl<T: Default> Default for OneOrMany<T> {
    fn default() -> Self {
        OneOrMany::One(T::default())
    }
}

impl From<FontSpec> for OneOrMany<FontSpec> {
    fn from(value: FontSpec) -> Self {
        OneOrMany::One(value)
    }
}

impl From<Color> for OneOrMany<Color> {
    fn from(value: Color) -> Self {
        OneOrMany::One(value)
    }
}

impl<T> From<Vec<T>> for OneOrMany<T> {
    fn from(values: Vec<T>) -> Self {
        OneOrMany::Many(values)
    }
}

/// Image or canvas-like content. `source` is a file path or a `data:` URI
/// the rasterizer can decode.
#[derive(Debug, Clone, PartialEq)]
pub struct Bitmap {
    pub source: String,
    pub width: Pt,
    pub height: Pt,
    /// Intrinsic element opacity, used when the label sets none.
    pub opacity: Option<f32>,
}

impl Bitmap {
    pub fn new(source: impl Into<String>, width: f32, height: f32) -> Self {
        Self {
            source: source.into(),
            width: Pt::from_f32(width),
            height: Pt::from_f32(height),
            opacity: None,
        }
    }

    pub fn with_opacity(mut self, opacity: f32) -> Self {
        self.opacity = Some(opacity);
        self
    }

    /// Reads the natural dimensions of an image file or `data:` URI.
    pub fn load(source: impl Into<String>) -> Result<Self, LabelError> {
        let source = source.into();
        let (width, height) = if let Some((_, data)) = parse_data_uri(&source) {
            let decoded = image::load_from_memory(&data)
                .map_err(|e| LabelError::Asset(format!("image decode failed: {e}")))?;
            (decoded.width(), decoded.height())
        } else {
            let path = Path::new(&source);
            if !path.exists() {
                return Err(LabelError::Io(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("image not found: {source}"),
                )));
            }
            image::image_dimensions(path)
                .map_err(|e| LabelError::Asset(format!("image probe failed: {e}")))?
        };
        Ok(Self::new(source, width as f32, height as f32))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum LabelContent {
    Text(Vec<String>),
    Bitmap(Bitmap),
}

impl LabelContent {
    pub fn is_bitmap(&self) -> bool {
        matches!(self, LabelContent::Bitmap(_))
    }

    pub fn as_bitmap(&self) -> Option<&Bitmap> {
        match self {
            LabelContent::Bitmap(bitmap) => Some(bitmap),
            LabelContent::Text(_) => None,
        }
    }
}

impl Default for LabelContent {
    fn default() -> Self {
        LabelContent::Text(Vec::new())
    }
}

impl From<&str> for LabelContent {
    fn from(value: &str) -> Self {
        LabelContent::Text(vec![value.to_string()])
    }
}

impl From<String> for LabelContent {
    fn from(value: String) -> Self {
        LabelContent::Text(vec![value])
    }
}

impl From<Vec<String>> for LabelContent {
    fn from(value: Vec<String>) -> Self {
        LabelContent::Text(value)
    }
}

impl From<Vec<&str>> for LabelContent {
    fn from(value: Vec<&str>) -> Self {
        LabelContent::Text(value.into_iter().map(str::to_string).collect())
    }
}

impl From<Bitmap> for LabelContent {
    fn from(value: Bitmap) -> Self {
        LabelContent::Bitmap(value)
    }
}

/// Explicit size override for bitmap content.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub enum SizeSpec {
    #[default]
    Auto,
    Absolute(f32),
    /// Percentage of the natural dimension.
    Percent(f32),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TextAlign {
    Start,
    Left,
    #[default]
    Center,
    End,
    Right,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TextBaseline {
    Top,
    #[default]
    Alphabetic,
    Middle,
    Bottom,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LineCap {
    #[default]
    Butt,
    Round,
    Square,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LineJoin {
    #[default]
    Miter,
    Round,
    Bevel,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Corners {
    pub top_left: f32,
    pub top_right: f32,
    pub bottom_left: f32,
    pub bottom_right: f32,
}

impl Corners {
    pub fn all(radius: f32) -> Self {
        Self {
            top_left: radius,
            top_right: radius,
            bottom_left: radius,
            bottom_right: radius,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BorderRadius {
    All(f32),
    PerCorner(Corners),
}

impl Default for BorderRadius {
    fn default() -> Self {
        BorderRadius::All(0.0)
    }
}

impl BorderRadius {
    pub fn to_corners(self) -> Corners {
        match self {
            BorderRadius::All(radius) => Corners::all(radius),
            BorderRadius::PerCorner(corners) => corners,
        }
    }
}

/// Per-corner radii after clamping, in surface units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CornerRadii {
    pub top_left: Pt,
    pub top_right: Pt,
    pub bottom_left: Pt,
    pub bottom_right: Pt,
}

impl CornerRadii {
    pub const ZERO: CornerRadii = CornerRadii {
        top_left: Pt::ZERO,
        top_right: Pt::ZERO,
        bottom_left: Pt::ZERO,
        bottom_right: Pt::ZERO,
    };

    pub fn is_zero(&self) -> bool {
        *self == CornerRadii::ZERO
    }
}

/// Shadow state. `None` fields leave the surface's current value in place.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Shadow {
    pub color: Option<Color>,
    pub blur: Option<f32>,
    pub offset_x: Option<f32>,
    pub offset_y: Option<f32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BoxOptions {
    pub background_color: Color,
    pub border_width: f32,
    pub border_color: Color,
    pub border_dash: Vec<f32>,
    pub border_dash_offset: f32,
    pub border_cap_style: Option<LineCap>,
    pub border_join_style: Option<LineJoin>,
    pub border_radius: BorderRadius,
    pub border_shadow_color: Option<Color>,
    pub background_shadow_color: Option<Color>,
    pub shadow_blur: Option<f32>,
    pub shadow_offset_x: Option<f32>,
    pub shadow_offset_y: Option<f32>,
}

impl Default for BoxOptions {
    fn default() -> Self {
        Self {
            background_color: Color::TRANSPARENT,
            border_width: 0.0,
            border_color: Color::BLACK,
            border_dash: Vec::new(),
            border_dash_offset: 0.0,
            border_cap_style: None,
            border_join_style: None,
            border_radius: BorderRadius::default(),
            border_shadow_color: Some(Color::TRANSPARENT),
            background_shadow_color: Some(Color::TRANSPARENT),
            shadow_blur: Some(0.0),
            shadow_offset_x: Some(0.0),
            shadow_offset_y: Some(0.0),
        }
    }
}

impl BoxOptions {
    pub fn background_color(mut self, color: Color) -> Self {
        self.background_color = color;
        self
    }

    pub fn border(mut self, width: f32, color: Color) -> Self {
        self.border_width = width;
        self.border_color = color;
        self
    }

    pub fn border_dash(mut self, dash: Vec<f32>, offset: f32) -> Self {
        self.border_dash = dash;
        self.border_dash_offset = offset;
        self
    }

    pub fn border_radius(mut self, radius: BorderRadius) -> Self {
        self.border_radius = radius;
        self
    }

    pub fn shadow(mut self, color: Color, blur: f32, offset_x: f32, offset_y: f32) -> Self {
        self.background_shadow_color = Some(color);
        self.shadow_blur = Some(blur);
        self.shadow_offset_x = Some(offset_x);
        self.shadow_offset_y = Some(offset_y);
        self
    }

    pub fn border_shadow_color(mut self, color: Color) -> Self {
        self.border_shadow_color = Some(color);
        self
    }

    pub(crate) fn shadow_style(&self) -> Shadow {
        Shadow {
            color: self.background_shadow_color,
            blur: self.shadow_blur,
            offset_x: self.shadow_offset_x,
            offset_y: self.shadow_offset_y,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LabelOptions {
    pub content: LabelContent,
    pub font: OneOrMany<FontSpec>,
    pub color: OneOrMany<Color>,
    pub text_stroke_width: f32,
    pub text_stroke_color: Option<Color>,
    pub text_align: TextAlign,
    pub opacity: Option<f32>,
    pub width: SizeSpec,
    pub height: SizeSpec,
}

impl Default for LabelOptions {
    fn default() -> Self {
        Self {
            content: LabelContent::default(),
            font: OneOrMany::default(),
            color: OneOrMany::One(Color::BLACK),
            text_stroke_width: 0.0,
            text_stroke_color: None,
            text_align: TextAlign::default(),
            opacity: None,
            width: SizeSpec::Auto,
            height: SizeSpec::Auto,
        }
    }
}

impl LabelOptions {
    pub fn new(content: impl Into<LabelContent>) -> Self {
        Self {
            content: content.into(),
            ..Self::default()
        }
    }

    pub fn font(mut self, font: impl Into<OneOrMany<FontSpec>>) -> Self {
        self.font = font.into();
        self
    }

    pub fn color(mut self, color: impl Into<OneOrMany<Color>>) -> Self {
        self.color = color.into();
        self
    }

    pub fn text_stroke(mut self, width: f32, color: Color) -> Self {
        self.text_stroke_width = width;
        self.text_stroke_color = Some(color);
        self
    }

    pub fn text_align(mut self, align: TextAlign) -> Self {
        self.text_align = align;
        self
    }

    pub fn opacity(mut self, opacity: f32) -> Self {
        self.opacity = Some(opacity);
        self
    }

    pub fn size(mut self, width: SizeSpec, height: SizeSpec) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    /// Stroke width as used by layout math; non-finite or negative widths count as zero.
    pub(crate) fn stroke_width(&self) -> Pt {
        Pt::from_f32(self.text_stroke_width).max(Pt::ZERO)
    }
}

pub(crate) fn parse_data_uri(uri: &str) -> Option<(String, Vec<u8>)> {
    if !uri.starts_with("data:") {
        return None;
    }
    let (header, payload) = uri.split_once(',')?;
    let mime = header
        .trim_start_matches("data:")
        .split(';')
        .next()
        .filter(|v| !v.is_empty())
        .unwrap_or("application/octet-stream")
        .to_string();
    let data = if header.contains(";base64") {
        base64::engine::general_purpose::STANDARD
            .decode(payload)
            .ok()?
    } else {
        payload.as_bytes().to_vec()
    };
    Some((mime, data))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbaImage;

    fn png_data_uri(width: u32, height: u32) -> String {
        let img = RgbaImage::new(width, height);
        let mut bytes = Vec::new();
        img.write_to(
            &mut std::io::Cursor::new(&mut bytes),
            image::ImageFormat::Png,
        )
        .unwrap();
        format!(
            "data:image/png;base64,{}",
            base64::engine::general_purpose::STANDARD.encode(bytes)
        )
    }

    #[test]
    fn content_kind_is_decided_by_variant() {
        assert!(!LabelContent::from("hello").is_bitmap());
        assert!(!LabelContent::from(vec!["a", "b"]).is_bitmap());
        let bitmap = LabelContent::from(Bitmap::new("logo.png", 10.0, 10.0));
        assert!(bitmap.is_bitmap());
        assert_eq!(bitmap.as_bitmap().map(|b| b.source.as_str()), Some("logo.png"));
    }

    #[test]
    fn one_or_many_broadcasts_singleton() {
        let one = OneOrMany::One(3);
        assert_eq!(one.as_slice(), &[3]);
        let many: OneOrMany<i32> = vec![1, 2].into();
        assert_eq!(many.as_slice(), &[1, 2]);
    }

    #[test]
    fn bitmap_load_reads_data_uri_dimensions() {
        let bitmap = Bitmap::load(png_data_uri(3, 5)).unwrap();
        assert_eq!(bitmap.width, Pt::from_f32(3.0));
        assert_eq!(bitmap.height, Pt::from_f32(5.0));
        assert_eq!(bitmap.opacity, None);
    }

    #[test]
    fn bitmap_load_missing_file_is_io_error() {
        let err = Bitmap::load("definitely-missing-label-image.png").unwrap_err();
        assert!(matches!(err, LabelError::Io(_)));
    }

    #[test]
    fn parse_data_uri_base64_decodes_payload() {
        let (mime, data) = parse_data_uri("data:text/plain;base64,SGVsbG8=").unwrap();
        assert_eq!(mime, "text/plain");
        assert_eq!(data, b"Hello");
    }

    #[test]
    fn negative_stroke_width_counts_as_zero() {
        let options = LabelOptions::new("x").text_stroke(-2.0, Color::BLACK);
        assert_eq!(options.stroke_width(), Pt::ZERO);
    }
}

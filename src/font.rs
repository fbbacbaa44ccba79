use crate::error::LabelError;
use crate::options::OneOrMany;
use crate::types::Pt;
use rustybuzz::{Direction as HbDirection, Face as HbFace, UnicodeBuffer};
use std::collections::{HashMap, VecDeque};
use std::fs;
use std::path::Path;
use std::sync::Mutex;

pub const DEFAULT_FONT_FAMILY: &str = "'Helvetica Neue', 'Helvetica', 'Arial', sans-serif";
pub const DEFAULT_FONT_SIZE: f32 = 12.0;
pub const DEFAULT_LINE_HEIGHT: f32 = 1.2;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LineHeight {
    /// Multiple of the font size.
    Multiplier(f32),
    Pixels(f32),
    Percent(f32),
    Normal,
}

impl LineHeight {
    fn resolve(self, size: Pt) -> Pt {
        match self {
            LineHeight::Multiplier(factor) if factor.is_finite() => size * factor,
            LineHeight::Pixels(px) if px.is_finite() => Pt::from_f32(px),
            LineHeight::Percent(pct) if pct.is_finite() => size * (pct / 100.0),
            _ => size * DEFAULT_LINE_HEIGHT,
        }
    }
}

/// Raw font option as supplied by the caller. Unset fields take the chart defaults.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FontSpec {
    pub family: Option<String>,
    pub size: Option<f32>,
    pub style: Option<String>,
    pub weight: Option<String>,
    pub line_height: Option<LineHeight>,
}

impl FontSpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn family(mut self, family: impl Into<String>) -> Self {
        self.family = Some(family.into());
        self
    }

    pub fn size(mut self, size: f32) -> Self {
        self.size = Some(size);
        self
    }

    pub fn style(mut self, style: impl Into<String>) -> Self {
        self.style = Some(style.into());
        self
    }

    pub fn weight(mut self, weight: impl Into<String>) -> Self {
        self.weight = Some(weight.into());
        self
    }

    pub fn line_height(mut self, line_height: LineHeight) -> Self {
        self.line_height = Some(line_height);
        self
    }
}

/// Resolved font descriptor. `string` is the render string the surface is
/// configured with and the identity used in measurement fingerprints.
#[derive(Debug, Clone, PartialEq)]
pub struct Font {
    pub family: String,
    pub size: Pt,
    pub style: Option<String>,
    pub weight: Option<String>,
    pub line_height: Pt,
    pub string: String,
}

pub fn to_font(spec: &FontSpec) -> Font {
    let size = spec
        .size
        .filter(|v| v.is_finite() && *v > 0.0)
        .unwrap_or(DEFAULT_FONT_SIZE);
    let size = Pt::from_f32(size);
    let family = spec
        .family
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .unwrap_or(DEFAULT_FONT_FAMILY)
        .to_string();
    let style = spec.style.clone().filter(|v| !v.trim().is_empty());
    let weight = spec.weight.clone().filter(|v| !v.trim().is_empty());
    let line_height = spec
        .line_height
        .unwrap_or(LineHeight::Multiplier(DEFAULT_LINE_HEIGHT))
        .resolve(size);

    let mut string = String::new();
    if let Some(style) = &style {
        string.push_str(style);
        string.push(' ');
    }
    if let Some(weight) = &weight {
        string.push_str(weight);
        string.push(' ');
    }
    string.push_str(&format!("{}px {}", size, family));

    Font {
        family,
        size,
        style,
        weight,
        line_height,
        string,
    }
}

pub fn to_fonts(specs: &OneOrMany<FontSpec>) -> Vec<Font> {
    specs.as_slice().iter().map(to_font).collect()
}

/// Splits a CSS family list into unquoted candidates, in priority order.
pub(crate) fn family_candidates(family: &str) -> Vec<String> {
    family
        .split(',')
        .map(normalize_name)
        .filter(|v| !v.is_empty())
        .collect()
}

#[derive(Debug, Clone, Hash, PartialEq, Eq)]
struct TextWidthKey {
    font_index: usize,
    size_milli: i64,
    text: String,
}

#[derive(Debug)]
struct TextWidthCache {
    map: HashMap<TextWidthKey, Pt>,
    order: VecDeque<TextWidthKey>,
    max_entries: usize,
}

impl TextWidthCache {
    fn new(max_entries: usize) -> Self {
        Self {
            map: HashMap::new(),
            order: VecDeque::new(),
            max_entries,
        }
    }

    fn get(&self, key: &TextWidthKey) -> Option<Pt> {
        self.map.get(key).copied()
    }

    fn insert(&mut self, key: TextWidthKey, value: Pt) {
        if self.map.contains_key(&key) {
            return;
        }
        self.map.insert(key.clone(), value);
        self.order.push_back(key);
        while self.map.len() > self.max_entries {
            if let Some(old) = self.order.pop_front() {
                self.map.remove(&old);
            } else {
                break;
            }
        }
    }
}

#[derive(Debug)]
pub struct FontRegistry {
    fonts: Vec<RegisteredFont>,
    lookup: HashMap<String, usize>,
    shape_text: bool,
    text_width_cache: Mutex<TextWidthCache>,
}

#[derive(Debug)]
pub(crate) struct RegisteredFont {
    pub(crate) name: String,
    pub(crate) data: Vec<u8>,
    metrics: FontMetrics,
}

#[derive(Debug)]
struct FontMetrics {
    first_char: u8,
    last_char: u8,
    widths: Vec<u16>,
    missing_width: u16,
}

impl Default for FontRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl FontRegistry {
    pub fn new() -> Self {
        Self {
            fonts: Vec::new(),
            lookup: HashMap::new(),
            shape_text: true,
            text_width_cache: Mutex::new(TextWidthCache::new(20_000)),
        }
    }

    /// When disabled, widths come from the per-character advance table only.
    pub fn set_shape_text(&mut self, enabled: bool) {
        self.shape_text = enabled;
    }

    pub fn is_empty(&self) -> bool {
        self.fonts.is_empty()
    }

    pub fn register_dir(&mut self, path: impl AsRef<Path>) {
        let path = path.as_ref();
        let Ok(entries) = fs::read_dir(path) else {
            return;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_file() {
                self.register_file(path);
            }
        }
    }

    pub fn register_file(&mut self, path: impl AsRef<Path>) {
        let path = path.as_ref();
        let Some(ext) = path.extension().and_then(|v| v.to_str()) else {
            return;
        };
        let ext = ext.to_ascii_lowercase();
        if ext != "ttf" && ext != "otf" {
            return;
        }
        let Ok(data) = fs::read(path) else {
            return;
        };
        let source = path.to_string_lossy().into_owned();
        if let Err(err) = self.register_bytes(data, Some(&source)) {
            log::debug!("skipping font file {}: {}", path.display(), err);
        }
    }

    pub fn register_bytes(
        &mut self,
        data: Vec<u8>,
        source_name: Option<&str>,
    ) -> Result<String, LabelError> {
        let source = source_name.unwrap_or("EmbeddedFont");
        let Ok(face) = ttf_parser::Face::parse(&data, 0) else {
            return Err(LabelError::Asset(format!(
                "invalid font data for {source}"
            )));
        };

        let (name, aliases) = font_names(&face, Path::new(source));
        let metrics = FontMetrics::from_face(&face);
        let index = self.fonts.len();
        self.fonts.push(RegisteredFont {
            name: name.clone(),
            data,
            metrics,
        });

        let mut all_aliases = Vec::new();
        all_aliases.push(name.clone());
        all_aliases.extend(aliases);
        for alias in all_aliases {
            let key = normalize_name(&alias);
            if key.is_empty() || self.lookup.contains_key(&key) {
                continue;
            }
            self.lookup.insert(key, index);
        }

        Ok(name)
    }

    fn resolve_index(&self, family: &str) -> Option<usize> {
        let candidates = family_candidates(family);
        if let Some(index) = candidates
            .iter()
            .find_map(|candidate| self.lookup.get(candidate).copied())
        {
            return Some(index);
        }
        // Generic and unknown families land on the first registered face.
        if self.fonts.is_empty() {
            return None;
        }
        log::trace!("no registered face for '{}', using '{}'", family, self.fonts[0].name);
        Some(0)
    }

    /// Resolves the first registered face in a CSS family list, or the first
    /// registered face at all when none of the names match.
    pub(crate) fn resolve(&self, family: &str) -> Option<&RegisteredFont> {
        self.resolve_index(family)
            .and_then(|index| self.fonts.get(index))
    }

    pub fn measure_text_width(&self, family: &str, font_size: Pt, text: &str) -> Pt {
        let Some(index) = self.resolve_index(family) else {
            return fallback_text_width(font_size, text);
        };
        let cache_key = TextWidthKey {
            font_index: index,
            size_milli: font_size.to_milli_i64(),
            text: text.to_string(),
        };
        if let Ok(cache) = self.text_width_cache.lock() {
            if let Some(value) = cache.get(&cache_key) {
                return value;
            }
        }
        let Some(font) = self.fonts.get(index) else {
            return fallback_text_width(font_size, text);
        };
        let value = if !self.shape_text || font.metrics.is_within_basic_latin(text) {
            font.metrics.measure_text_width(font_size, text)
        } else {
            measure_text_width_shaped(font, font_size, text)
                .unwrap_or_else(|| font.metrics.measure_text_width(font_size, text))
        };
        if let Ok(mut cache) = self.text_width_cache.lock() {
            cache.insert(cache_key, value);
        }
        value
    }
}

/// Width estimate used when no registered face matches the family list.
pub(crate) fn fallback_text_width(font_size: Pt, text: &str) -> Pt {
    let char_width = (font_size * 0.6).max(Pt::from_f32(1.0));
    char_width * (text.chars().count() as i32)
}

impl FontMetrics {
    fn from_face(face: &ttf_parser::Face<'_>) -> Self {
        let units_per_em = face.units_per_em().max(1);
        let scale = 1000.0 / units_per_em as f32;
        let first_char = 32u8;
        let last_char = 255u8;
        let widths = build_widths(face, scale, first_char, last_char);
        let missing_width = widths
            .get((b' ' - first_char) as usize)
            .copied()
            .unwrap_or(0);
        Self {
            first_char,
            last_char,
            widths,
            missing_width,
        }
    }

    fn advance_for_char(&self, ch: char) -> u16 {
        let code = ch as u32;
        let first = self.first_char as u32;
        let last = self.last_char as u32;
        if code < first || code > last {
            return self.missing_width;
        }
        let idx = (code - first) as usize;
        self.widths.get(idx).copied().unwrap_or(self.missing_width)
    }

    fn measure_text_width(&self, font_size: Pt, text: &str) -> Pt {
        let total_units = text.chars().fold(0i32, |acc, ch| {
            acc.saturating_add(self.advance_for_char(ch) as i32)
        });
        if total_units <= 0 {
            return Pt::ZERO;
        }
        font_size.mul_ratio(total_units, 1000)
    }

    fn is_within_basic_latin(&self, text: &str) -> bool {
        let first = self.first_char as u32;
        let last = self.last_char as u32;
        text.chars().all(|ch| {
            let code = ch as u32;
            code >= first && code <= last
        })
    }
}

fn build_widths(face: &ttf_parser::Face<'_>, scale: f32, first: u8, last: u8) -> Vec<u16> {
    let mut widths = Vec::with_capacity((last - first) as usize + 1);
    for code in first..=last {
        let width = char::from_u32(code as u32)
            .and_then(|ch| face.glyph_index(ch))
            .and_then(|id| face.glyph_hor_advance(id))
            .unwrap_or(0);
        let scaled = (width as f32 * scale).round() as i32;
        widths.push(scaled.clamp(0, u16::MAX as i32) as u16);
    }
    widths
}

fn measure_text_width_shaped(font: &RegisteredFont, font_size: Pt, text: &str) -> Option<Pt> {
    let face = HbFace::from_slice(&font.data, 0)?;
    let units_per_em = face.units_per_em().max(1) as i64;

    let mut buffer = UnicodeBuffer::new();
    buffer.set_direction(detect_direction(text));
    buffer.push_str(text);
    let output = rustybuzz::shape(&face, &[], buffer);
    let positions = output.glyph_positions();
    if positions.is_empty() {
        return None;
    }
    let mut total_units: i32 = 0;
    for pos in positions {
        let adv = (((pos.x_advance as i64) * 1000 + (units_per_em / 2)) / units_per_em) as i32;
        total_units = total_units.saturating_add(adv);
    }
    if total_units <= 0 {
        return Some(Pt::ZERO);
    }
    Some(font_size.mul_ratio(total_units, 1000))
}

pub(crate) fn detect_direction(text: &str) -> HbDirection {
    for ch in text.chars() {
        let code = ch as u32;
        let rtl = matches!(
            code,
            0x0590..=0x08FF
                | 0xFB1D..=0xFDFF
                | 0xFE70..=0xFEFF
                | 0x1EE00..=0x1EEFF
        );
        if rtl {
            return HbDirection::RightToLeft;
        }
    }
    HbDirection::LeftToRight
}

fn font_names(face: &ttf_parser::Face<'_>, path: &Path) -> (String, Vec<String>) {
    use ttf_parser::name::name_id;

    let mut family = None;
    let mut full = None;
    let mut post = None;

    for entry in face.names() {
        let Some(name) = entry.to_string() else {
            continue;
        };
        match entry.name_id {
            name_id::TYPOGRAPHIC_FAMILY | name_id::FAMILY => {
                if family.is_none() {
                    family = Some(name);
                }
            }
            name_id::FULL_NAME => {
                if full.is_none() {
                    full = Some(name);
                }
            }
            name_id::POST_SCRIPT_NAME => {
                if post.is_none() {
                    post = Some(name);
                }
            }
            _ => {}
        }
    }

    let stem = path
        .file_stem()
        .and_then(|v| v.to_str())
        .map(|v| v.to_string());
    let primary = family
        .clone()
        .or_else(|| full.clone())
        .or_else(|| post.clone())
        .or_else(|| stem.clone())
        .unwrap_or_else(|| "EmbeddedFont".to_string());

    let mut aliases = Vec::new();
    for candidate in [family, full, post, stem].into_iter().flatten() {
        if candidate != primary {
            aliases.push(candidate);
        }
    }

    (primary, aliases)
}

fn normalize_name(name: &str) -> String {
    name.trim()
        .trim_matches('"')
        .trim_matches('\'')
        .to_ascii_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn to_font_applies_defaults() {
        let font = to_font(&FontSpec::default());
        assert_eq!(font.size, Pt::from_f32(12.0));
        assert_eq!(font.family, DEFAULT_FONT_FAMILY);
        assert_eq!(font.line_height, Pt::from_f32(14.4));
        assert_eq!(font.string, format!("12px {DEFAULT_FONT_FAMILY}"));
    }

    #[test]
    fn to_font_builds_render_string_with_style_and_weight() {
        let font = to_font(
            &FontSpec::new()
                .family("Arial")
                .size(16.0)
                .style("italic")
                .weight("bold"),
        );
        assert_eq!(font.string, "italic bold 16px Arial");
    }

    #[test]
    fn line_height_variants_resolve_against_size() {
        let size = Pt::from_f32(10.0);
        assert_eq!(LineHeight::Multiplier(2.0).resolve(size), Pt::from_f32(20.0));
        assert_eq!(LineHeight::Pixels(13.0).resolve(size), Pt::from_f32(13.0));
        assert_eq!(LineHeight::Percent(150.0).resolve(size), Pt::from_f32(15.0));
        assert_eq!(LineHeight::Normal.resolve(size), Pt::from_f32(12.0));
        assert_eq!(
            LineHeight::Multiplier(f32::NAN).resolve(size),
            Pt::from_f32(12.0)
        );
    }

    #[test]
    fn non_positive_size_falls_back_to_default() {
        let font = to_font(&FontSpec::new().size(-4.0));
        assert_eq!(font.size, Pt::from_f32(DEFAULT_FONT_SIZE));
    }

    #[test]
    fn family_candidates_strip_quotes_and_lowercase() {
        assert_eq!(
            family_candidates(DEFAULT_FONT_FAMILY),
            vec!["helvetica neue", "helvetica", "arial", "sans-serif"]
        );
    }

    #[test]
    fn unresolved_family_uses_fallback_width() {
        let registry = FontRegistry::new();
        let width = registry.measure_text_width("Nope", Pt::from_f32(10.0), "abcd");
        assert_eq!(width, Pt::from_f32(24.0));
    }

    fn dejavu_font_path(file_name: &str) -> PathBuf {
        PathBuf::from("/usr/share/fonts/truetype/dejavu").join(file_name)
    }

    fn dejavu_registry() -> (FontRegistry, String) {
        let path = dejavu_font_path("DejaVuSans.ttf");
        let bytes = fs::read(&path).expect("read dejavu sans");
        let mut registry = FontRegistry::new();
        let name = registry
            .register_bytes(bytes, Some(path.to_string_lossy().as_ref()))
            .expect("register dejavu sans");
        (registry, name)
    }

    #[test]
    fn registered_face_names_and_aliases_resolve() {
        let (registry, name) = dejavu_registry();
        assert_eq!(name, "DejaVu Sans");
        assert!(registry.resolve("'DejaVu Sans', serif").is_some());
        assert!(registry.resolve("DejaVuSans").is_some());
    }

    #[test]
    fn registered_face_measures_from_its_own_advances() {
        let (registry, name) = dejavu_registry();
        let size = Pt::from_f32(16.0);
        let width = registry.measure_text_width(&name, size, "Hello");
        assert!(width > Pt::ZERO);
        assert_ne!(width, fallback_text_width(size, "Hello"));
        assert!(
            registry.measure_text_width(&name, size, "Hello, world") > width,
            "longer text measures wider"
        );
    }

    #[test]
    fn shaped_measurement_covers_text_outside_the_table() {
        let (registry, name) = dejavu_registry();
        let width = registry.measure_text_width(&name, Pt::from_f32(12.0), "Ωμέγα");
        assert!(width > Pt::ZERO);
    }

    #[test]
    fn generic_family_resolves_to_first_registered_face() {
        let (registry, name) = dejavu_registry();
        let size = Pt::from_f32(16.0);
        let named = registry.measure_text_width(&name, size, "Hello");
        assert_eq!(
            registry.measure_text_width(DEFAULT_FONT_FAMILY, size, "Hello"),
            named
        );
        assert_eq!(registry.measure_text_width("serif", size, "Hello"), named);
        assert!(registry.resolve(DEFAULT_FONT_FAMILY).is_some());
    }

    #[test]
    fn invalid_font_bytes_are_rejected() {
        let mut registry = FontRegistry::new();
        let err = registry
            .register_bytes(vec![0, 1, 2, 3], Some("broken.ttf"))
            .unwrap_err();
        assert!(matches!(err, LabelError::Asset(_)));
        assert!(registry.is_empty());
    }

    #[test]
    fn text_width_cache_evicts_oldest_entries() {
        let mut cache = TextWidthCache::new(2);
        let key = |text: &str| TextWidthKey {
            font_index: 0,
            size_milli: 12_000,
            text: text.to_string(),
        };
        cache.insert(key("a"), Pt::from_f32(1.0));
        cache.insert(key("b"), Pt::from_f32(2.0));
        cache.insert(key("c"), Pt::from_f32(3.0));
        assert_eq!(cache.get(&key("a")), None);
        assert_eq!(cache.get(&key("c")), Some(Pt::from_f32(3.0)));
    }
}

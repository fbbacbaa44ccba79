//! Label footprint measurement with a fingerprint-keyed size cache.

use crate::font::{Font, to_fonts};
use crate::options::{Bitmap, LabelContent, LabelOptions, SizeSpec};
use crate::paint::pick;
use crate::surface::{Surface, SurfaceGuard};
use crate::types::{Pt, Size};
use std::collections::{HashMap, VecDeque};

/// Memoized label sizes keyed by [`fingerprint`].
///
/// Owned by one rendering context. Unbounded by default; a capacity turns on
/// FIFO eviction of the oldest fingerprint.
#[derive(Debug, Default)]
pub struct SizeCache {
    map: HashMap<String, Size>,
    order: VecDeque<String>,
    max_entries: Option<usize>,
}

impl SizeCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(max_entries: usize) -> Self {
        Self {
            map: HashMap::new(),
            order: VecDeque::new(),
            max_entries: Some(max_entries.max(1)),
        }
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<Size> {
        self.map.get(key).copied()
    }

    fn insert(&mut self, key: String, value: Size) {
        if self.map.contains_key(&key) {
            return;
        }
        self.map.insert(key.clone(), value);
        self.order.push_back(key);
        let Some(max_entries) = self.max_entries else {
            return;
        };
        while self.map.len() > max_entries {
            let Some(old) = self.order.pop_front() else {
                break;
            };
            log::debug!("label size cache evicted '{}'", old);
            self.map.remove(&old);
        }
    }
}

/// Cache key for text content. Colors are not part of the key since they
/// do not change the measured size.
pub fn fingerprint(lines: &[String], fonts: &[Font], stroke_width: Pt, sprites: bool) -> String {
    let mut key = lines.join(",");
    for font in fonts {
        key.push_str(&font.string);
    }
    key.push_str(&stroke_width.to_string());
    if sprites {
        key.push_str("-spriting");
    }
    key
}

/// Prefers an explicit override over the natural dimension.
pub fn resolve_size(natural: Pt, spec: SizeSpec) -> Pt {
    match spec {
        SizeSpec::Absolute(value) if value.is_finite() => Pt::from_f32(value),
        SizeSpec::Percent(pct) if pct.is_finite() => natural * (pct / 100.0),
        _ => natural,
    }
}

pub fn bitmap_size(bitmap: &Bitmap, width: SizeSpec, height: SizeSpec) -> Size {
    Size {
        width: resolve_size(bitmap.width, width),
        height: resolve_size(bitmap.height, height),
    }
}

/// Computes the footprint of `lines`. Height starts at the stroke width and
/// adds each line's line height; width is the widest line plus the stroke.
/// The active font is restored before returning.
pub fn calculate_label_size<S: Surface + ?Sized>(
    surface: &mut S,
    lines: &[String],
    fonts: &[Font],
    stroke_width: Pt,
) -> Size {
    let mut surface = SurfaceGuard::new(surface);
    let mut width = Pt::ZERO;
    let mut height = stroke_width;
    for (index, text) in lines.iter().enumerate() {
        let Some(font) = pick(fonts, index) else {
            break;
        };
        surface.set_font(font);
        width = width.max(surface.measure_text(text) + stroke_width);
        height += font.line_height;
    }
    Size { width, height }
}

/// Measures the footprint of a label. Bitmap content is sized from its own
/// dimensions and never touches `cache`.
pub fn measure_label_size<S: Surface + ?Sized>(
    surface: &mut S,
    cache: &mut SizeCache,
    options: &LabelOptions,
) -> Size {
    let lines = match &options.content {
        LabelContent::Bitmap(bitmap) => {
            return bitmap_size(bitmap, options.width, options.height);
        }
        LabelContent::Text(lines) => lines,
    };
    let fonts = to_fonts(&options.font);
    let stroke_width = options.stroke_width();
    let key = fingerprint(lines, &fonts, stroke_width, surface.uses_text_sprites());
    if let Some(size) = cache.get(&key) {
        log::trace!("label size cache hit '{}'", key);
        return size;
    }
    let size = calculate_label_size(surface, lines, &fonts, stroke_width);
    log::debug!(
        "label size cache miss '{}' -> {}x{}",
        key,
        size.width,
        size.height
    );
    cache.insert(key, size);
    size
}

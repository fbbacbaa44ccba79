use crate::font::{Font, to_fonts};
use crate::options::{
    BorderRadius, BoxOptions, CornerRadii, LabelContent, LabelOptions, LineJoin, Shadow,
    TextAlign, TextBaseline,
};
use crate::surface::{Surface, SurfaceGuard};
use crate::types::{Color, Point, Pt, Rect};

/// Element `index` of `sequence`, reusing the last element once `index`
/// runs past the end. `None` only for an empty sequence.
pub fn pick<T>(sequence: &[T], index: usize) -> Option<&T> {
    sequence.get(index.min(sequence.len().saturating_sub(1)))
}

/// Opacity from the label option, else the content's own; clamped to
/// `[0, 1]`, or `1` when neither is a finite number.
pub fn resolve_opacity(value: Option<f32>, fallback: Option<f32>) -> f32 {
    value
        .filter(|v| v.is_finite())
        .or(fallback.filter(|v| v.is_finite()))
        .map(|v| v.clamp(0.0, 1.0))
        .unwrap_or(1.0)
}

pub fn text_anchor_x(rect: &Rect, align: TextAlign) -> Pt {
    match align {
        TextAlign::Center => rect.x + rect.width / 2,
        TextAlign::End | TextAlign::Right => rect.x + rect.width,
        TextAlign::Start | TextAlign::Left => rect.x,
    }
}

/// Clamps every corner into `[0, min(width, height) / 2]`.
pub fn clamp_corner_radii(radius: BorderRadius, rect: &Rect) -> CornerRadii {
    let max = (rect.width.min(rect.height) / 2).max(Pt::ZERO);
    let corners = radius.to_corners();
    let clamp = |value: f32| Pt::from_f32(value).clamp(Pt::ZERO, max);
    CornerRadii {
        top_left: clamp(corners.top_left),
        top_right: clamp(corners.top_right),
        bottom_left: clamp(corners.bottom_left),
        bottom_right: clamp(corners.bottom_right),
    }
}

/// Vertical anchor of each line: each line is centered on its own slot,
/// slots stacked by line height starting at `y`.
pub fn line_positions(y: Pt, fonts: &[Font], count: usize) -> Vec<Pt> {
    let mut positions = Vec::with_capacity(count);
    let mut offset = Pt::ZERO;
    for index in 0..count {
        let Some(font) = pick(fonts, index) else {
            break;
        };
        positions.push(y + font.line_height / 2 + offset);
        offset += font.line_height;
    }
    positions
}

fn set_shadow_style<S: Surface + ?Sized>(surface: &mut S, options: &BoxOptions) {
    surface.set_shadow(options.shadow_style());
}

fn set_border_style<S: Surface + ?Sized>(surface: &mut S, options: &BoxOptions) -> bool {
    let width = options.border_width;
    if width == 0.0 || width.is_nan() {
        return false;
    }
    surface.set_line_cap(options.border_cap_style.unwrap_or_default());
    surface.set_dash(
        options.border_dash.iter().map(|v| Pt::from_f32(*v)).collect(),
        Pt::from_f32(options.border_dash_offset),
    );
    surface.set_line_join(options.border_join_style.unwrap_or_default());
    surface.set_line_width(Pt::from_f32(width));
    surface.set_stroke_color(options.border_color);
    true
}

/// Paints the label background: filled, optionally rounded, bordered and
/// shadowed. The border stroke casts `border_shadow_color` instead of the
/// background shadow color.
pub fn paint_box<S: Surface + ?Sized>(surface: &mut S, rect: &Rect, options: &BoxOptions) {
    let mut surface = SurfaceGuard::new(surface);
    set_shadow_style(&mut *surface, options);
    let stroke = set_border_style(&mut *surface, options);
    surface.set_fill_color(options.background_color);
    surface.begin_path();
    surface.add_rounded_rect(*rect, clamp_corner_radii(options.border_radius, rect));
    surface.close_path();
    surface.fill();
    if stroke {
        surface.set_shadow(Shadow {
            color: options.border_shadow_color,
            ..Shadow::default()
        });
        surface.stroke();
    }
}

fn set_text_stroke_style<S: Surface + ?Sized>(surface: &mut S, options: &LabelOptions) -> bool {
    let width = options.stroke_width();
    if width <= Pt::ZERO {
        return false;
    }
    surface.set_line_join(LineJoin::Round);
    surface.set_miter_limit(Pt::from_i32(2));
    surface.set_line_width(width);
    if let Some(color) = options.text_stroke_color {
        surface.set_stroke_color(color);
    }
    true
}

/// Outline pass: every line goes into one path, stroked once.
fn apply_label_decoration<S: Surface + ?Sized>(
    surface: &mut S,
    origin: Point,
    lines: &[String],
    fonts: &[Font],
) {
    surface.begin_path();
    let positions = line_positions(origin.y, fonts, lines.len());
    for (index, (text, y)) in lines.iter().zip(positions).enumerate() {
        if let Some(font) = pick(fonts, index) {
            surface.set_font(font);
        }
        surface.text_path(text, origin.x, y);
    }
    surface.stroke();
}

fn apply_label_content<S: Surface + ?Sized>(
    surface: &mut S,
    origin: Point,
    lines: &[String],
    fonts: &[Font],
    colors: &[Color],
) {
    let positions = line_positions(origin.y, fonts, lines.len());
    for (index, (text, y)) in lines.iter().zip(positions).enumerate() {
        surface.begin_path();
        if let Some(font) = pick(fonts, index) {
            surface.set_font(font);
        }
        if let Some(color) = pick(colors, index) {
            surface.set_fill_color(*color);
        }
        surface.fill_text(text, origin.x, y);
    }
}

/// Paints label content into `rect`: a bitmap stretched to the full bounds,
/// or text lines with per-line font/color and an optional outline.
pub fn paint_label<S: Surface + ?Sized>(surface: &mut S, rect: &Rect, options: &LabelOptions) {
    let lines = match &options.content {
        LabelContent::Bitmap(bitmap) => {
            let mut surface = SurfaceGuard::new(surface);
            surface.set_global_alpha(resolve_opacity(options.opacity, bitmap.opacity));
            surface.draw_image(bitmap, *rect);
            return;
        }
        LabelContent::Text(lines) => lines,
    };
    let fonts = to_fonts(&options.font);
    let colors = options.color.as_slice();
    let origin = Point {
        x: text_anchor_x(rect, options.text_align),
        y: rect.y + options.stroke_width() / 2,
    };

    let mut surface = SurfaceGuard::new(surface);
    surface.set_text_baseline(TextBaseline::Middle);
    surface.set_text_align(options.text_align);
    if set_text_stroke_style(&mut *surface, options) {
        apply_label_decoration(&mut *surface, origin, lines, &fonts);
    }
    apply_label_content(&mut *surface, origin, lines, &fonts, colors);
}

/// Rotates subsequent drawing by `degrees` around `pivot`. Zero or NaN is a no-op.
pub fn apply_rotation<S: Surface + ?Sized>(surface: &mut S, pivot: Point, degrees: f32) {
    if degrees == 0.0 || degrees.is_nan() {
        return;
    }
    surface.translate(pivot.x, pivot.y);
    surface.rotate(degrees.to_radians());
    surface.translate(-pivot.x, -pivot.y);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::{Canvas, Command};
    use crate::font::{FontSpec, LineHeight, to_font};
    use crate::options::{Bitmap, Corners, LineCap};
    use crate::types::Size;

    fn canvas() -> Canvas {
        Canvas::new(Size::new(200.0, 200.0))
    }

    fn sized_font(size: f32, line_height: f32) -> FontSpec {
        FontSpec::new()
            .family("Test")
            .size(size)
            .line_height(LineHeight::Pixels(line_height))
    }

    fn fill_texts(commands: &[Command]) -> Vec<(String, Pt)> {
        commands
            .iter()
            .filter_map(|cmd| match cmd {
                Command::FillText { text, y, .. } => Some((text.clone(), *y)),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn pick_clamps_to_last_element() {
        let values = [1, 2];
        assert_eq!(pick(&values, 0), Some(&1));
        assert_eq!(pick(&values, 1), Some(&2));
        assert_eq!(pick(&values, 7), Some(&2));
        let empty: [i32; 0] = [];
        assert_eq!(pick(&empty, 0), None);
    }

    #[test]
    fn opacity_fallback_chain() {
        assert_eq!(resolve_opacity(None, Some(0.5)), 0.5);
        assert_eq!(resolve_opacity(Some(2.0), None), 1.0);
        assert_eq!(resolve_opacity(None, None), 1.0);
        assert_eq!(resolve_opacity(Some(-1.0), Some(0.5)), 0.0);
        assert_eq!(resolve_opacity(Some(f32::NAN), Some(0.25)), 0.25);
    }

    #[test]
    fn radius_clamped_to_half_of_smaller_side() {
        let rect = Rect::new(0.0, 0.0, 40.0, 20.0);
        let radii = clamp_corner_radii(BorderRadius::All(100.0), &rect);
        let ten = Pt::from_f32(10.0);
        assert_eq!(
            radii,
            CornerRadii {
                top_left: ten,
                top_right: ten,
                bottom_left: ten,
                bottom_right: ten,
            }
        );
    }

    #[test]
    fn radius_clamp_handles_degenerate_rects_and_bad_values() {
        let empty = Rect::new(5.0, 5.0, 0.0, 0.0);
        assert!(clamp_corner_radii(BorderRadius::All(8.0), &empty).is_zero());
        let negative = Rect::new(0.0, 0.0, -10.0, 30.0);
        assert!(clamp_corner_radii(BorderRadius::All(8.0), &negative).is_zero());
        let rect = Rect::new(0.0, 0.0, 40.0, 40.0);
        let radii = clamp_corner_radii(
            BorderRadius::PerCorner(Corners {
                top_left: -3.0,
                top_right: f32::NAN,
                bottom_left: 4.0,
                bottom_right: 50.0,
            }),
            &rect,
        );
        assert_eq!(radii.top_left, Pt::ZERO);
        assert_eq!(radii.top_right, Pt::ZERO);
        assert_eq!(radii.bottom_left, Pt::from_f32(4.0));
        assert_eq!(radii.bottom_right, Pt::from_f32(20.0));
    }

    #[test]
    fn anchor_follows_alignment() {
        let rect = Rect::new(10.0, 0.0, 100.0, 20.0);
        assert_eq!(text_anchor_x(&rect, TextAlign::Left), Pt::from_f32(10.0));
        assert_eq!(text_anchor_x(&rect, TextAlign::Start), Pt::from_f32(10.0));
        assert_eq!(text_anchor_x(&rect, TextAlign::Center), Pt::from_f32(60.0));
        assert_eq!(text_anchor_x(&rect, TextAlign::Right), Pt::from_f32(110.0));
        assert_eq!(text_anchor_x(&rect, TextAlign::End), Pt::from_f32(110.0));
    }

    #[test]
    fn box_without_border_fills_only() {
        let mut canvas = canvas();
        let options = BoxOptions::default().background_color(Color::WHITE);
        let rect = Rect::new(0.0, 0.0, 40.0, 20.0);
        paint_box(&mut canvas, &rect, &options);
        assert_eq!(
            canvas.commands(),
            &[
                Command::SaveState,
                Command::SetShadow(options.shadow_style()),
                Command::SetFillColor(Color::WHITE),
                Command::BeginPath,
                Command::RoundedRect {
                    rect,
                    radii: CornerRadii::ZERO,
                },
                Command::ClosePath,
                Command::Fill,
                Command::RestoreState,
            ]
        );
    }

    #[test]
    fn box_border_strokes_with_border_shadow_color() {
        let mut canvas = canvas();
        let border_shadow = Color::rgba(1.0, 0.0, 0.0, 0.5);
        let options = BoxOptions::default()
            .border(2.0, Color::rgb(0.0, 0.0, 1.0))
            .border_dash(vec![4.0, 2.0], 1.0)
            .border_radius(BorderRadius::All(100.0))
            .shadow(Color::rgba(0.0, 0.0, 0.0, 0.3), 4.0, 2.0, 2.0)
            .border_shadow_color(border_shadow);
        let rect = Rect::new(0.0, 0.0, 40.0, 20.0);
        paint_box(&mut canvas, &rect, &options);
        let cmds = canvas.commands();
        assert!(cmds.contains(&Command::SetLineCap(LineCap::Butt)));
        assert!(cmds.contains(&Command::SetLineJoin(LineJoin::Miter)));
        assert!(cmds.contains(&Command::SetDash {
            pattern: vec![Pt::from_f32(4.0), Pt::from_f32(2.0)],
            phase: Pt::from_f32(1.0),
        }));
        assert!(cmds.contains(&Command::SetLineWidth(Pt::from_f32(2.0))));
        let fill = cmds.iter().position(|c| *c == Command::Fill).unwrap();
        let stroke = cmds.iter().position(|c| *c == Command::Stroke).unwrap();
        assert!(fill < stroke);
        assert_eq!(
            cmds[stroke - 1],
            Command::SetShadow(Shadow {
                color: Some(border_shadow),
                ..Shadow::default()
            })
        );
        assert!(cmds.iter().any(|c| matches!(
            c,
            Command::RoundedRect { radii, .. } if radii.top_left == Pt::from_f32(10.0)
        )));
        assert_eq!(cmds.last(), Some(&Command::RestoreState));
        assert_eq!(canvas.state_depth(), 0);
    }

    #[test]
    fn bitmap_label_draws_stretched_with_resolved_alpha() {
        let mut canvas = canvas();
        let bitmap = Bitmap::new("logo.png", 8.0, 8.0).with_opacity(0.4);
        let rect = Rect::new(10.0, 10.0, 50.0, 20.0);
        paint_label(&mut canvas, &rect, &LabelOptions::new(bitmap));
        assert_eq!(
            canvas.commands(),
            &[
                Command::SaveState,
                Command::SetGlobalAlpha(0.4),
                Command::DrawImage {
                    dest: rect,
                    source: "logo.png".to_string(),
                },
                Command::RestoreState,
            ]
        );
    }

    #[test]
    fn lines_stack_by_line_height() {
        let mut canvas = canvas();
        let options = LabelOptions::new(vec!["A", "B"])
            .font(vec![sized_font(8.0, 10.0), sized_font(16.0, 20.0)])
            .text_align(TextAlign::Left);
        paint_label(&mut canvas, &Rect::new(0.0, 0.0, 50.0, 30.0), &options);
        assert_eq!(
            fill_texts(canvas.commands()),
            vec![
                ("A".to_string(), Pt::from_f32(5.0)),
                ("B".to_string(), Pt::from_f32(20.0)),
            ]
        );
        assert!(canvas
            .commands()
            .contains(&Command::SetTextBaseline(TextBaseline::Middle)));
    }

    #[test]
    fn single_font_and_color_apply_to_every_line() {
        let mut canvas = canvas();
        let red = Color::rgb(1.0, 0.0, 0.0);
        let options = LabelOptions::new(vec!["a", "b", "c"])
            .font(sized_font(10.0, 10.0))
            .color(red);
        paint_label(&mut canvas, &Rect::new(0.0, 0.0, 50.0, 30.0), &options);
        let fonts = canvas
            .commands()
            .iter()
            .filter(|c| matches!(c, Command::SetFont(_)))
            .count();
        assert_eq!(fonts, 1);
        let colors: Vec<_> = canvas
            .commands()
            .iter()
            .filter_map(|c| match c {
                Command::SetFillColor(color) => Some(*color),
                _ => None,
            })
            .collect();
        assert_eq!(colors, vec![red]);
        assert_eq!(fill_texts(canvas.commands()).len(), 3);
    }

    #[test]
    fn third_line_reuses_second_font() {
        let fonts = vec![
            to_font(&sized_font(8.0, 10.0)),
            to_font(&sized_font(16.0, 20.0)),
        ];
        assert_eq!(pick(&fonts, 2), Some(&fonts[1]));
        let positions = line_positions(Pt::ZERO, &fonts, 3);
        assert_eq!(
            positions,
            vec![Pt::from_f32(5.0), Pt::from_f32(20.0), Pt::from_f32(40.0)]
        );
    }

    #[test]
    fn outline_accumulates_one_path_and_strokes_once() {
        let mut canvas = canvas();
        let options = LabelOptions::new(vec!["A", "B"])
            .font(sized_font(10.0, 10.0))
            .text_stroke(4.0, Color::WHITE)
            .text_align(TextAlign::Left);
        paint_label(&mut canvas, &Rect::new(0.0, 0.0, 50.0, 30.0), &options);
        let cmds = canvas.commands();
        assert_eq!(cmds.iter().filter(|c| **c == Command::Stroke).count(), 1);
        assert!(cmds.contains(&Command::SetLineJoin(LineJoin::Round)));
        assert!(cmds.contains(&Command::SetMiterLimit(Pt::from_i32(2))));
        assert!(cmds.contains(&Command::SetStrokeColor(Color::WHITE)));

        let outlines: Vec<Pt> = cmds
            .iter()
            .filter_map(|c| match c {
                Command::TextPath { y, .. } => Some(*y),
                _ => None,
            })
            .collect();
        let fills: Vec<Pt> = fill_texts(cmds).into_iter().map(|(_, y)| y).collect();
        // start anchor is shifted down by half the stroke width
        assert_eq!(outlines, vec![Pt::from_f32(7.0), Pt::from_f32(17.0)]);
        assert_eq!(outlines, fills);

        let stroke = cmds.iter().position(|c| *c == Command::Stroke).unwrap();
        let last_outline = cmds
            .iter()
            .rposition(|c| matches!(c, Command::TextPath { .. }))
            .unwrap();
        let first_fill = cmds
            .iter()
            .position(|c| matches!(c, Command::FillText { .. }))
            .unwrap();
        assert!(last_outline < stroke && stroke < first_fill);
    }

    #[test]
    fn zero_stroke_skips_outline_pass() {
        let mut canvas = canvas();
        paint_label(
            &mut canvas,
            &Rect::new(0.0, 0.0, 50.0, 30.0),
            &LabelOptions::new("x"),
        );
        assert!(!canvas
            .commands()
            .iter()
            .any(|c| matches!(c, Command::TextPath { .. } | Command::Stroke)));
        assert_eq!(canvas.state_depth(), 0);
    }

    #[test]
    fn zero_rotation_issues_no_transform() {
        let mut canvas = canvas();
        apply_rotation(&mut canvas, Point::new(10.0, 10.0), 0.0);
        assert!(canvas.commands().is_empty());
    }

    #[test]
    fn rotation_pivots_around_point() {
        let mut canvas = canvas();
        apply_rotation(&mut canvas, Point::new(10.0, 20.0), 90.0);
        assert_eq!(
            canvas.commands(),
            &[
                Command::Translate(Pt::from_f32(10.0), Pt::from_f32(20.0)),
                Command::Rotate(90f32.to_radians()),
                Command::Translate(Pt::from_f32(-10.0), Pt::from_f32(-20.0)),
            ]
        );
    }
}

use annolabel::{
    BoxOptions, Canvas, Color, Command, FontSpec, LabelOptions, LineHeight, Point, Pt,
    RasterConfig, Size, SizeCache, SizeSpec, draw_label, measure_label_size, rasterize,
};

fn label() -> LabelOptions {
    LabelOptions::new(vec!["first", "second line"])
        .font(FontSpec::new().size(10.0).line_height(LineHeight::Pixels(14.0)))
}

#[test]
fn draw_label_centers_padded_box() {
    let mut canvas = Canvas::new(Size::new(200.0, 100.0));
    let mut cache = SizeCache::new();
    let rect = draw_label(
        &mut canvas,
        &mut cache,
        Point::new(100.0, 50.0),
        Pt::from_f32(4.0),
        0.0,
        &BoxOptions::default().background_color(Color::WHITE),
        &label(),
    );

    // fallback measurement is 0.6 * size per char: "second line" is 66 wide
    assert_eq!(rect.width, Pt::from_f32(74.0));
    assert_eq!(rect.height, Pt::from_f32(36.0));
    assert_eq!(rect.x, Pt::from_f32(63.0));
    assert_eq!(rect.y, Pt::from_f32(32.0));
    assert_eq!(cache.len(), 1);
    assert_eq!(canvas.state_depth(), 0);

    let texts: Vec<&str> = canvas
        .commands()
        .iter()
        .filter_map(|cmd| match cmd {
            Command::FillText { text, .. } => Some(text.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(texts, vec!["first", "second line"]);
}

#[test]
fn second_measurement_is_served_from_cache() {
    let mut canvas = Canvas::new(Size::new(10.0, 10.0));
    let mut cache = SizeCache::with_capacity(4);
    let first = measure_label_size(&mut canvas, &mut cache, &label());
    let commands_after_first = canvas.command_count();
    let second = measure_label_size(&mut canvas, &mut cache, &label());
    assert_eq!(first, second);
    assert_eq!(canvas.command_count(), commands_after_first);
}

#[test]
fn explicit_size_does_not_change_text_measurement() {
    let mut canvas = Canvas::new(Size::new(10.0, 10.0));
    let mut cache = SizeCache::new();
    let sized = label().size(SizeSpec::Absolute(500.0), SizeSpec::Auto);
    let natural = measure_label_size(&mut canvas, &mut cache, &label());
    assert_eq!(measure_label_size(&mut canvas, &mut cache, &sized), natural);
}

#[test]
fn rotated_label_box_rasterizes() {
    let mut canvas = Canvas::new(Size::new(100.0, 100.0));
    let mut cache = SizeCache::new();
    draw_label(
        &mut canvas,
        &mut cache,
        Point::new(50.0, 50.0),
        Pt::from_f32(2.0),
        90.0,
        &BoxOptions::default().background_color(Color::rgb(0.0, 0.0, 1.0)),
        &LabelOptions::new("wide label text").font(FontSpec::new().size(10.0)),
    );
    let drawing = canvas.finish();
    let pixmap = rasterize(
        &drawing,
        &RasterConfig::for_drawing(&drawing).background(Color::WHITE),
        None,
    )
    .unwrap();

    // the box is wider than tall; after a quarter turn it is taller than wide
    let blue = |x: u32, y: u32| {
        let px = pixmap.pixel(x, y).unwrap();
        px.blue() == 255 && px.red() == 0
    };
    assert!(blue(50, 50));
    assert!(blue(50, 15));
    assert!(!blue(15, 50));
}

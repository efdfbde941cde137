use super::*;

const PNG_MAGIC: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a];

#[test]
fn test_parse_color_forms() {
    assert_eq!(parse_color("#FC5200"), Some(Rgb([0xfc, 0x52, 0x00])));
    assert_eq!(parse_color("#fff"), Some(Rgb::WHITE));
    assert_eq!(parse_color("C1"), Some(CYCLE[1]));
    assert_eq!(parse_color("tab:orange"), Some(CYCLE[1]));
    assert_eq!(parse_color("white"), Some(Rgb::WHITE));
    assert_eq!(parse_color("not-a-color"), None);
}

#[test]
fn test_dark_detection() {
    assert!(Rgb([0x11, 0x11, 0x11]).is_dark());
    assert!(!Rgb::WHITE.is_dark());
}

#[test]
fn test_blank_figure() {
    let mut figure = Figure::default();
    assert!(figure.is_blank());
    figure.current_panel_mut().marks.push(Mark::new(
        MarkKind::Line,
        vec![Cell::Int(1), Cell::Int(2)],
        vec![3.0, 4.0],
    ));
    assert!(!figure.is_blank());
}

#[test]
fn test_reset_builds_grid() {
    let mut figure = Figure::default();
    figure.reset(12.0, 4.0, 1, 2);
    assert_eq!(figure.panels.len(), 2);
    figure.panel_mut(5);
    assert_eq!(figure.current, 1);
}

#[test]
fn test_render_produces_png() {
    let mut figure = Figure::new(4.0, 3.0);
    figure.facecolor = parse_color("#000000");
    let panel = figure.current_panel_mut();
    panel.facecolor = parse_color("#111111");
    panel.title = Some("Weekly Mileage".to_string());
    panel.grid = parse_color("#333333");
    let mut bars = Mark::new(
        MarkKind::Bar,
        vec![Cell::Str("Mon".into()), Cell::Str("Tue".into())],
        vec![3.1, 5.0],
    );
    bars.color = parse_color("#FC5200");
    panel.marks.push(bars);

    let bytes = render_png(&figure).unwrap();
    assert_eq!(&bytes[..8], &PNG_MAGIC);
}

#[test]
fn test_render_dates_and_lines() {
    let mut figure = Figure::default();
    let day = |d: u32| Cell::Time(crate::table::midnight(
        chrono::NaiveDate::from_ymd_opt(2024, 5, d).unwrap(),
    ));
    let panel = figure.current_panel_mut();
    panel.marks.push(Mark::new(
        MarkKind::Line,
        vec![day(1), day(3), day(9)],
        vec![8.5, 8.1, f64::NAN],
    ));
    panel.marks.push(Mark::new(MarkKind::HLine, vec![], vec![8.3]));
    panel.legend = true;
    let bytes = render_png(&figure).unwrap();
    assert_eq!(&bytes[..8], &PNG_MAGIC);
}

#[test]
fn test_glyph_metrics() {
    assert_eq!(glyphs::text_width("", 1), 0);
    assert_eq!(glyphs::text_width("ab", 1), 11);
    assert_eq!(glyphs::text_width("ab", 2), 22);
    assert!(!glyphs::text_pixels("A", 1).is_empty());
    assert!(glyphs::text_pixels(" ", 1).is_empty());
}

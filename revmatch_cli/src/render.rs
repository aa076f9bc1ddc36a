use std::fmt;
use std::ops::Range;
use std::panic;
use std::path::{Path, PathBuf};

use anyhow::Result;
use plotters::coord::Shift;
use plotters::prelude::*;
use plotters::series::DashedLineSeries;
use plotters::style::{FontDesc, FontFamily, FontStyle};
use revmatch::{gear_color, GearCurve, LegendEntry, Rgb, RpmRange, Segments};

const LINE_WIDTH: u32 = 2;
const REVMATCH_ALPHA: f64 = 0.8;

#[derive(Clone, Copy, Debug)]
pub enum ChartKind {
    Png,
    Svg,
}

impl fmt::Display for ChartKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChartKind::Png => f.write_str("PNG"),
            ChartKind::Svg => f.write_str("SVG"),
        }
    }
}

pub struct TimeSeriesChart<'a> {
    pub segments: &'a Segments,
    pub legend: &'a [LegendEntry],
    pub bounds: Option<RpmRange>,
    pub size: (u32, u32),
}

impl TimeSeriesChart<'_> {
    /// Tight X range over all points; Y from the configured window if any.
    fn ranges(&self) -> (Range<f64>, Range<f64>) {
        let xs = self.segments.all_points().map(|p| p.0);
        let x_range = tight_range(xs);
        let y_range = match self.bounds {
            Some(range) => range.min as f64..range.max as f64,
            None => tight_range(self.segments.all_points().map(|p| p.1)),
        };
        (x_range, y_range)
    }
}

/// Run a render closure, turning backend panics (missing fonts and the
/// like) into ordinary errors.
pub fn render_guard<F>(render: F) -> Result<(), String>
where
    F: FnOnce() -> Result<()>,
{
    panic::catch_unwind(panic::AssertUnwindSafe(render))
        .map_err(|_| "plotting backend panicked".to_string())?
        .map_err(|err| format!("plotting error: {}", err))
}

pub fn render_time_series(chart: &TimeSeriesChart, path: &Path, kind: ChartKind) -> Result<()> {
    match kind {
        ChartKind::Png => {
            draw_time_series(BitMapBackend::new(path, chart.size).into_drawing_area(), chart)
        }
        ChartKind::Svg => {
            draw_time_series(SVGBackend::new(path, chart.size).into_drawing_area(), chart)
        }
    }
}

pub fn render_ratio_chart(
    curve: &GearCurve,
    size: (u32, u32),
    path: &Path,
    kind: ChartKind,
) -> Result<()> {
    match kind {
        ChartKind::Png => draw_ratio_chart(BitMapBackend::new(path, size).into_drawing_area(), curve),
        ChartKind::Svg => draw_ratio_chart(SVGBackend::new(path, size).into_drawing_area(), curve),
    }
}

/// `ratios.png` -> `ratios_gear3.png`
pub fn derive_gear_path(base: &Path, gear: u32) -> PathBuf {
    let stem = base.file_stem().and_then(|s| s.to_str()).unwrap_or("ratios");
    let ext = base.extension().and_then(|s| s.to_str()).unwrap_or("png");
    base.with_file_name(format!("{}_gear{}.{}", stem, gear, ext))
}

fn rgb(color: Rgb) -> RGBColor {
    RGBColor(color.0, color.1, color.2)
}

fn line_style(color: RGBAColor) -> ShapeStyle {
    ShapeStyle {
        color,
        filled: false,
        stroke_width: LINE_WIDTH,
    }
}

fn tight_range<I: Iterator<Item = f64>>(values: I) -> Range<f64> {
    let (lo, hi) = values
        .filter(|v| v.is_finite())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
            (lo.min(v), hi.max(v))
        });
    if !lo.is_finite() {
        return 0.0..1.0;
    }
    if hi - lo < f64::EPSILON {
        return (lo - 1.0)..(hi + 1.0);
    }
    lo..hi
}

fn draw_time_series<DB>(area: DrawingArea<DB, Shift>, chart: &TimeSeriesChart) -> Result<()>
where
    DB: DrawingBackend,
    DB::ErrorType: 'static,
{
    area.fill(&WHITE)?;
    let (x_range, y_range) = chart.ranges();

    let mut cc = ChartBuilder::on(&area)
        .caption(
            "RPM and RevMatch vs Time",
            FontDesc::new(FontFamily::SansSerif, 26.0, FontStyle::Bold),
        )
        .margin(20)
        .set_label_area_size(LabelAreaPosition::Left, 70)
        .set_label_area_size(LabelAreaPosition::Bottom, 40)
        .build_cartesian_2d(x_range, y_range)?;

    let axis_font = FontDesc::new(FontFamily::SansSerif, 18.0, FontStyle::Normal);
    cc.configure_mesh()
        .light_line_style(BLACK.mix(0.05))
        .bold_line_style(BLACK.mix(0.3))
        .x_desc("Time")
        .y_desc("RPM")
        // time ticks are raw logger timestamps; only the axis title is useful
        .x_label_formatter(&|_| String::new())
        .y_label_formatter(&|v| format!("{:.0}", v))
        .axis_desc_style(axis_font.clone())
        .label_style(axis_font.color(&BLACK.mix(0.85)))
        .draw()?;

    for seg in &chart.segments.rpm {
        let style = line_style(rgb(gear_color(seg.gear())).to_rgba());
        cc.draw_series(LineSeries::new(seg.points().iter().copied(), style))?;
    }

    // drawn second so targets sit on top of the RPM trace
    for seg in &chart.segments.revmatch {
        let style = line_style(rgb(gear_color(seg.gear())).mix(REVMATCH_ALPHA));
        cc.draw_series(DashedLineSeries::new(
            seg.points().iter().copied(),
            10,
            6,
            style,
        ))?;
    }

    for entry in chart.legend {
        let color = rgb(entry.color);
        let dashed = entry.revmatch;
        cc.draw_series(std::iter::empty::<PathElement<(f64, f64)>>())?
            .label(entry.label.as_str())
            .legend(move |(x, y)| {
                let tail = if dashed {
                    line_style(color.mix(REVMATCH_ALPHA))
                } else {
                    line_style(TRANSPARENT)
                };
                EmptyElement::at((x, y))
                    + PathElement::new(vec![(0, 0), (16, 0)], line_style(color.to_rgba()))
                    + PathElement::new(vec![(22, 0), (28, 0)], tail)
                    + PathElement::new(vec![(32, 0), (38, 0)], tail)
            });
    }

    cc.configure_series_labels()
        .background_style(WHITE.mix(0.8))
        .border_style(BLACK.mix(0.3))
        .label_font(FontDesc::new(FontFamily::SansSerif, 16.0, FontStyle::Normal).color(&BLACK))
        .legend_area_size(44)
        .position(SeriesLabelPosition::UpperRight)
        .draw()?;

    area.present()?;
    Ok(())
}

fn draw_ratio_chart<DB>(area: DrawingArea<DB, Shift>, curve: &GearCurve) -> Result<()>
where
    DB: DrawingBackend,
    DB::ErrorType: 'static,
{
    area.fill(&WHITE)?;

    let x_range = tight_range(
        curve
            .theoretical
            .iter()
            .chain(curve.fitted.iter())
            .map(|p| p.0),
    );
    let y_range = tight_range(
        curve
            .theoretical
            .iter()
            .chain(curve.fitted.iter())
            .map(|p| p.1),
    );

    let mut cc = ChartBuilder::on(&area)
        .caption(
            format!("Gear {}: theoretical vs measured RPM", curve.gear),
            FontDesc::new(FontFamily::SansSerif, 24.0, FontStyle::Bold),
        )
        .margin(20)
        .set_label_area_size(LabelAreaPosition::Left, 60)
        .set_label_area_size(LabelAreaPosition::Bottom, 45)
        .build_cartesian_2d(x_range, y_range)?;

    cc.configure_mesh()
        .light_line_style(BLACK.mix(0.05))
        .bold_line_style(BLACK.mix(0.3))
        .x_desc("RPM")
        .y_desc("MPH")
        .x_label_formatter(&|v| format!("{:.0}", v))
        .y_label_formatter(&|v| format!("{:.0}", v))
        .label_style(FontDesc::new(FontFamily::SansSerif, 16.0, FontStyle::Normal))
        .draw()?;

    let theoretical = line_style(RED.to_rgba());
    cc.draw_series(LineSeries::new(curve.theoretical.iter().copied(), theoretical))?
        .label("Theoretical RPM")
        .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 30, y)], theoretical));

    let fitted = line_style(BLUE.to_rgba());
    cc.draw_series(LineSeries::new(curve.fitted.iter().copied(), fitted))?
        .label("Measured RPM (linear fit)")
        .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 30, y)], fitted));

    cc.configure_series_labels()
        .background_style(WHITE.mix(0.8))
        .border_style(BLACK.mix(0.3))
        .label_font(FontDesc::new(FontFamily::SansSerif, 16.0, FontStyle::Normal).color(&BLACK))
        .position(SeriesLabelPosition::UpperLeft)
        .draw()?;

    area.present()?;
    Ok(())
}

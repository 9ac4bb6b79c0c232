/*!
 * Every chart on a dashboard is a widget. A widget owns the aggregation that feeds it, rebuilds its data from
 * scratch on every update, and renders an SVG through plotters. Rendering hands back a `ChartHandle` which the
 * caller owns: it knows where the chart was written and what clicking each element should open.
 */

use std::{
    fs,
    io::ErrorKind,
    path::{Path, PathBuf},
};

use anyhow::Context;
use plotters::{chart::ChartBuilder, coord::Shift, prelude::*};
use tracing::debug;

use crate::{fields::Record, navigation::ListAction};

pub mod bar;
pub mod distribution;
pub mod heatmap;
pub mod scatter;
pub mod tickets;

/// A chart that can be fed records and asked to draw itself
pub trait Widget {
    /// Short name, used for the output file and for addressing the chart
    fn name(&self) -> &str;
    /// Rebuild the chart data from a fresh set of records
    fn update(&mut self, records: &[Record]);
    /// Render an SVG into `out_dir`. Returns `None` when there is no data to draw.
    fn plot(&self, out_dir: &Path) -> anyhow::Result<Option<ChartHandle>>;
}

/// The graph dimensions
const SVG_SIZE: (u32, u32) = (1024, 768);
/// The default margin percentage for a graph
const DEFAULT_GRAPH_MARGIN: i32 = 2;
/// The default left label size
const LABEL_SIZE_LEFT: i32 = 9;
/// The default bottom label size
const LABEL_SIZE_BOTTOM: i32 = 14;
/// The default font size for the chart title
const CHART_NAME_FONT_PCT_SIZE: i32 = 5;
/// Additional y axis to add above the tallest bar, to make way for the value labels
const HEADROOM_CHART_MAX: f64 = 0.10;
/// Bar colour for charts that don't pick their own
const DEFAULT_BAR_COLOR: RGBColor = RGBColor(0x36, 0xA2, 0xEB);

/// A rendered chart. Dropping the handle leaves the file in place; `dispose` removes it.
#[derive(Debug, Clone, PartialEq)]
pub struct ChartHandle {
    path: PathBuf,
    title: String,
    labels: Vec<String>,
    targets: Vec<Option<ListAction>>,
}

impl ChartHandle {
    pub fn new(path: PathBuf, title: impl Into<String>, labels: Vec<String>, targets: Vec<Option<ListAction>>) -> Self {
        ChartHandle { path, title: title.into(), labels, targets }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    /// element labels, in drawing order
    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// The action for clicking the element at `idx`, if that element navigates anywhere
    pub fn click(&self, idx: usize) -> Option<&ListAction> {
        self.targets.get(idx)?.as_ref()
    }

    /// Remove the rendered chart. A file that's already gone is not an error.
    pub fn dispose(self) -> anyhow::Result<()> {
        debug!("disposing {}", self.path.display());
        match fs::remove_file(&self.path) {
            Err(e) if e.kind() != ErrorKind::NotFound => {
                Err(e).with_context(|| format!("could not remove {}", self.path.display()))
            }
            _ => Ok(()),
        }
    }
}

/// Where a widget named `fname` writes its chart
fn plot_path(out_dir: &Path, fname: &str) -> PathBuf {
    out_dir.join(format!("{}_plot.svg", fname))
}

/// Helper to set up the base graph object
fn setup_graph<'a, 'b, DB: DrawingBackend>(name: &str, root: &'a DrawingArea<DB, Shift>, label_left_size: i32) -> ChartBuilder<'a, 'b, DB> {
    let mut chart_new = ChartBuilder::on(root);
    chart_new
        .caption(name, ("sans-serif", (CHART_NAME_FONT_PCT_SIZE).percent_height()))
        .set_label_area_size(LabelAreaPosition::Left, (label_left_size).percent())
        .set_label_area_size(LabelAreaPosition::Bottom, (LABEL_SIZE_BOTTOM).percent())
        .margin((DEFAULT_GRAPH_MARGIN).percent());

    chart_new
}

/// Value label for a count or total: the rounded value and its share of `total`.
/// With nothing to take a share of, the value is shown as-is.
pub fn share_label(value: f64, total: f64) -> String {
    if total == 0.0 {
        return format!("{}", value);
    }
    format!("{} ({:.1}%)", value.round(), (value / total) * 100.0)
}

/// Like `share_label`, but empty slices get no label at all.
pub fn slice_label(value: f64, total: f64) -> String {
    if value == 0.0 || total == 0.0 {
        String::new()
    } else {
        share_label(value, total)
    }
}

/// Value label for an average
pub fn average_label(value: f64) -> String {
    format!("{:.2}", value)
}

/// lowest and highest y value to draw, always including zero and leaving room for labels
fn y_range(values: &[f64]) -> (f64, f64) {
    let max = values.iter().copied().fold(0.0, f64::max);
    let min = values.iter().copied().fold(0.0, f64::min);
    let span = if max - min == 0.0 { 1.0 } else { max - min };
    let headroom = span * HEADROOM_CHART_MAX;
    let low = if min < 0.0 { min - headroom } else { 0.0 };
    (low, max + headroom)
}

/// Draw a labelled bar chart into `path`.
fn gen_bar_graph(
    path: &Path,
    title: &str,
    y_desc: &str,
    bars: &[(String, f64)],
    color: RGBColor,
    value_label: impl Fn(f64) -> String,
) -> anyhow::Result<()> {
    debug!("writing {}...", path.display());
    let labels: Vec<&str> = bars.iter().map(|(l, _)| l.as_str()).collect();
    let values: Vec<f64> = bars.iter().map(|(_, v)| *v).collect();
    let (min, max) = y_range(&values);

    let root = SVGBackend::new(path, SVG_SIZE).into_drawing_area();
    root.fill(&WHITE)?;

    let mut chart = setup_graph(title, &root, LABEL_SIZE_LEFT);
    let mut chart_con = chart.build_cartesian_2d((0usize..labels.len()).into_segmented(), min..max)?;

    let x_fmt = |v: &SegmentValue<usize>| match v {
        SegmentValue::CenterOf(idx) => labels.get(*idx).map(|l| l.to_string()).unwrap_or_default(),
        _ => String::new(),
    };
    chart_con
        .configure_mesh()
        .disable_x_mesh()
        .x_labels(labels.len())
        .x_label_formatter(&x_fmt)
        .y_desc(y_desc)
        .draw()?;

    chart_con.draw_series(
        Histogram::vertical(&chart_con)
            .style(color.mix(0.9).filled())
            .margin(8)
            .data(values.iter().enumerate().map(|(idx, v)| (idx, *v))),
    )?;

    let label_style = TextStyle::from(("sans-serif", 12).into_font()).color(&BLACK);
    chart_con.draw_series(values.iter().enumerate().map(|(idx, v)| {
        Text::new(value_label(*v), (SegmentValue::CenterOf(idx), *v), label_style.clone())
    }))?;

    root.present().context("could not write file")?;
    Ok(())
}

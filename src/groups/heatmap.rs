use std::path::Path;

use anyhow::Context;
use plotters::{
    prelude::*,
    style::text_anchor::{HPos, Pos, VPos},
};
use tracing::debug;

use crate::{
    correlation::{build, color_for, pearson_coefficients, CoefficientMap, Matrix, Metric, Rgb},
    fields::Record,
};
use super::{plot_path, setup_graph, ChartHandle, Widget, SVG_SIZE};

/// The left label area needs to fit "Ticket Count"
const LABEL_SIZE_LEFT: i32 = 14;
/// Cells stronger than this get white text, the fill is too dark for black
const DARK_CELL_THRESHOLD: f64 = 0.45;

impl From<Rgb> for RGBColor {
    fn from(value: Rgb) -> Self {
        RGBColor(value.0, value.1, value.2)
    }
}

fn cell_text_color(val: f64) -> &'static RGBColor {
    if val.abs() > DARK_CELL_THRESHOLD {
        &WHITE
    } else {
        &BLACK
    }
}

/// The correlation heatmap. It is either loaded with a precomputed coefficient map,
/// or fed per-customer average rows and computes the coefficients itself.
pub struct CorrelationHeatmap {
    fname: String,
    title: String,
    alphabet: Vec<Metric>,
    coeffs: CoefficientMap,
}

impl CorrelationHeatmap {
    pub fn new(coeffs: CoefficientMap) -> Self {
        CorrelationHeatmap {
            fname: "correlation".to_string(),
            title: "Correlation Matrix (Pearson)".to_string(),
            alphabet: Metric::ALL.to_vec(),
            coeffs,
        }
    }

    /// Restrict or reorder the axes
    pub fn with_alphabet(mut self, alphabet: &[Metric]) -> Self {
        self.alphabet = alphabet.to_vec();
        self
    }

    pub fn coefficients(&self) -> &CoefficientMap {
        &self.coeffs
    }

    pub fn matrix(&self) -> Matrix {
        build(&self.coeffs, &self.alphabet)
    }

    /// plain text rendering of the matrix, one row per metric
    pub fn table(&self) -> String {
        let matrix = self.matrix();
        let mut out = format!("{:>14}", "");
        for metric in matrix.alphabet() {
            out.push_str(&format!("{:>14}", metric.label()));
        }
        out.push('\n');
        for (label, row) in matrix.rows() {
            out.push_str(&format!("{:>14}", label));
            for val in row {
                out.push_str(&format!("{:>14.3}", val));
            }
            out.push('\n');
        }
        out
    }
}

impl Widget for CorrelationHeatmap {
    fn name(&self) -> &str {
        &self.fname
    }

    /// Treat the records as per-customer average rows and recompute every coefficient
    fn update(&mut self, records: &[Record]) {
        self.coeffs = pearson_coefficients(records);
    }

    fn plot(&self, out_dir: &Path) -> anyhow::Result<Option<ChartHandle>> {
        if self.coeffs.is_empty() || self.alphabet.is_empty() {
            return Ok(None);
        }

        let matrix = self.matrix();
        let size = matrix.size();
        let labels: Vec<&str> = matrix.alphabet().iter().map(|m| m.label()).collect();
        let path = plot_path(out_dir, &self.fname);
        debug!("writing {}...", path.display());

        let root = SVGBackend::new(&path, SVG_SIZE).into_drawing_area();
        root.fill(&WHITE)?;

        let mut chart = setup_graph(&self.title, &root, LABEL_SIZE_LEFT);
        let mut chart_con = chart.build_cartesian_2d((0usize..size).into_segmented(), (0usize..size).into_segmented())?;

        // row 0 goes at the top
        let flip = |row: usize| size - 1 - row;
        let x_fmt = |v: &SegmentValue<usize>| match v {
            SegmentValue::CenterOf(idx) => labels.get(*idx).map(|l| l.to_string()).unwrap_or_default(),
            _ => String::new(),
        };
        let y_fmt = |v: &SegmentValue<usize>| match v {
            SegmentValue::CenterOf(idx) if *idx < size => labels[flip(*idx)].to_string(),
            _ => String::new(),
        };
        chart_con
            .configure_mesh()
            .disable_mesh()
            .x_labels(size)
            .y_labels(size)
            .x_label_formatter(&x_fmt)
            .y_label_formatter(&y_fmt)
            .draw()?;

        chart_con.draw_series(matrix.cells().map(|(row, col, val)| {
            let y = flip(row);
            let color: RGBColor = color_for(val).into();
            Rectangle::new(
                [(SegmentValue::Exact(col), SegmentValue::Exact(y)), (SegmentValue::Exact(col + 1), SegmentValue::Exact(y + 1))],
                color.filled(),
            )
        }))?;

        let cell_font = ("sans-serif", 14).into_font();
        chart_con.draw_series(matrix.cells().map(|(row, col, val)| {
            let style = TextStyle::from(cell_font.clone())
                .color(cell_text_color(val))
                .pos(Pos::new(HPos::Center, VPos::Center));
            Text::new(format!("{:.3}", val), (SegmentValue::CenterOf(col), SegmentValue::CenterOf(flip(row))), style)
        }))?;

        root.present().context("could not write file")?;

        let names = labels.iter().map(|l| l.to_string()).collect();
        // heatmap cells don't navigate anywhere
        Ok(Some(ChartHandle::new(path.clone(), self.title.clone(), names, Vec::new())))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Map, Value};

    use super::*;

    fn coeffs(value: Value) -> CoefficientMap {
        let raw: Map<String, Value> = serde_json::from_value(value).unwrap_or_default();
        CoefficientMap::from(&raw)
    }

    #[test]
    fn test_heatmap_renders_cells() -> anyhow::Result<()> {
        let heatmap = CorrelationHeatmap::new(coeffs(json!({"corr_ticket_priority": 0.42, "corr_point_rating": -0.75})));
        let dir = tempfile::tempdir()?;
        let handle = heatmap.plot(dir.path())?.ok_or_else(|| anyhow::anyhow!("expected a chart"))?;

        let svg = std::fs::read_to_string(handle.path())?;
        assert!(svg.contains("0.420"));
        assert!(svg.contains("-0.750"));
        assert!(svg.contains("1.000"));
        assert_eq!(handle.labels().len(), 7);
        assert!(handle.click(0).is_none());
        Ok(())
    }

    #[test]
    fn test_dark_cells_get_white_text() {
        assert_eq!(cell_text_color(1.0), &WHITE);
        assert_eq!(cell_text_color(-0.46), &WHITE);
        assert_eq!(cell_text_color(0.45), &BLACK);
        assert_eq!(cell_text_color(0.0), &BLACK);
    }

    #[test]
    fn test_empty_coefficients_render_nothing() -> anyhow::Result<()> {
        let mut heatmap = CorrelationHeatmap::new(CoefficientMap::default());
        let dir = tempfile::tempdir()?;
        assert!(heatmap.plot(dir.path())?.is_none());

        // no average rows at all
        heatmap.update(&[]);
        assert!(heatmap.coefficients().is_empty());
        assert!(heatmap.plot(dir.path())?.is_none());
        Ok(())
    }

    #[test]
    fn test_table_and_update_from_rows() -> anyhow::Result<()> {
        let mut heatmap = CorrelationHeatmap::new(CoefficientMap::default()).with_alphabet(&[Metric::Ticket, Metric::Priority]);
        let rows: Vec<Record> = serde_json::from_value(json!([
            {"ticket_count": 1, "avg_priority": 1},
            {"ticket_count": 2, "avg_priority": 2},
        ]))?;
        heatmap.update(&rows);
        assert_eq!(heatmap.coefficients().len(), 21);

        let table = heatmap.table();
        let lines: Vec<&str> = table.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].contains("Ticket Count") && lines[0].contains("Priority"));
        assert!(lines[1].trim_start().starts_with("Ticket Count"));
        assert!(lines[1].ends_with("1.000         1.000"));
        Ok(())
    }
}

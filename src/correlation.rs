/*!
 * Correlation data: the fixed metric alphabet, the sparse coefficient map the correlation run produces,
 * and the dense symmetric matrix the heatmap is drawn from.
 *
 * Coefficients are stored under a single direction per pair (`corr_ticket_priority` but never
 * `corr_priority_ticket`), so resolving a cell looks the pair up both ways.
 */

use std::{collections::HashMap, fmt::Display, str::FromStr};

use anyhow::anyhow;
use serde_json::{Map, Number, Value};
use tracing::debug;

use crate::{
    fields::{self, Record},
    stat::{aggregate, Aggregation, Tally, ValueSource},
};

const KEY_PREFIX: &str = "corr_";

/// Field naming the customer a ticket belongs to
pub const CUSTOMER_FIELD: &str = "customer_name_id";

/// Ticket fields the per-customer averages are computed from
pub const AVERAGE_FIELDS: [&str; 8] = [
    CUSTOMER_FIELD,
    "priority",
    "complexity",
    "submitted_date",
    "progress_date",
    "finish_date",
    "min_point",
    "customer_rating",
];

const PRIORITY_SCORES: [(&str, f64); 3] = [("low", 1.0), ("medium", 2.0), ("high", 3.0)];
const COMPLEXITY_SCORES: [(&str, f64); 4] = [("none", 0.0), ("low", 1.0), ("medium", 1.5), ("high", 2.0)];
const RATING_SCORES: [(&str, f64); 6] =
    [("no", 0.0), ("worst", 1.0), ("bad", 2.0), ("medium", 3.0), ("good", 4.0), ("excellent", 5.0)];

const SECONDS_PER_HOUR: f64 = 3600.0;

/// One of the per-customer averaged metrics that correlations are computed between.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Metric {
    Ticket,
    Priority,
    Complexity,
    Response,
    Resolution,
    Rating,
    Point,
}

impl Metric {
    /// Display order of the heatmap axes.
    pub const ALL: [Metric; 7] = [
        Metric::Ticket,
        Metric::Priority,
        Metric::Complexity,
        Metric::Response,
        Metric::Resolution,
        Metric::Rating,
        Metric::Point,
    ];

    /// Order the correlation run stores pairs in; the first of each pair names the key.
    const STORAGE_ORDER: [Metric; 7] = [
        Metric::Ticket,
        Metric::Priority,
        Metric::Complexity,
        Metric::Response,
        Metric::Resolution,
        Metric::Point,
        Metric::Rating,
    ];

    /// identifier used inside `corr_<a>_<b>` keys
    pub fn key(&self) -> &'static str {
        match self {
            Metric::Ticket => "ticket",
            Metric::Priority => "priority",
            Metric::Complexity => "complexity",
            Metric::Response => "response",
            Metric::Resolution => "resolution",
            Metric::Rating => "rating",
            Metric::Point => "point",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Metric::Ticket => "Ticket Count",
            Metric::Priority => "Priority",
            Metric::Complexity => "Complexity",
            Metric::Response => "Response",
            Metric::Resolution => "Resolution",
            Metric::Rating => "Rating",
            Metric::Point => "Point",
        }
    }

    /// the column of a per-customer averages row holding this metric
    pub fn source_field(&self) -> &'static str {
        match self {
            Metric::Ticket => "ticket_count",
            Metric::Priority => "avg_priority",
            Metric::Complexity => "avg_complexity",
            Metric::Response => "avg_response_time",
            Metric::Resolution => "avg_resolution_time",
            Metric::Rating => "avg_rating",
            Metric::Point => "avg_point",
        }
    }

    /// How this metric is averaged per customer from ticket records
    fn aggregation(&self) -> Aggregation {
        match self {
            Metric::Ticket => Aggregation::count(CUSTOMER_FIELD),
            Metric::Priority => {
                Aggregation::average(CUSTOMER_FIELD, ValueSource::score("priority", &PRIORITY_SCORES, Some(0.0)))
            }
            Metric::Complexity => {
                Aggregation::average(CUSTOMER_FIELD, ValueSource::score("complexity", &COMPLEXITY_SCORES, Some(0.0)))
            }
            Metric::Response => {
                Aggregation::average(CUSTOMER_FIELD, ValueSource::elapsed_hours("submitted_date", "progress_date"))
            }
            Metric::Resolution => {
                Aggregation::average(CUSTOMER_FIELD, ValueSource::elapsed_hours("progress_date", "finish_date"))
            }
            Metric::Rating => {
                Aggregation::average(CUSTOMER_FIELD, ValueSource::score("customer_rating", &RATING_SCORES, None))
            }
            Metric::Point => Aggregation::average(CUSTOMER_FIELD, ValueSource::field("min_point")).skip_zero(),
        }
    }
}

impl Display for Metric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.key())
    }
}

impl FromStr for Metric {
    type Err = anyhow::Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Metric::ALL
            .iter()
            .copied()
            .find(|m| m.key() == s)
            .ok_or_else(|| anyhow!("unknown metric {}", s))
    }
}

/// Split a `corr_<a>_<b>` key into its metric pair.
fn parse_key(key: &str) -> Option<(Metric, Metric)> {
    let (a, b) = key.strip_prefix(KEY_PREFIX)?.split_once('_')?;
    Some((a.parse().ok()?, b.parse().ok()?))
}

/// Sparse, directional pairwise coefficients.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CoefficientMap {
    table: HashMap<(Metric, Metric), f64>,
}

impl From<&Map<String, Value>> for CoefficientMap {
    /// Unknown keys and values that aren't numbers are skipped.
    fn from(raw: &Map<String, Value>) -> Self {
        let mut coeffs = CoefficientMap::default();
        for (key, val) in raw {
            let Some((a, b)) = parse_key(key) else {
                debug!("skipping {}", key);
                continue;
            };
            match fields::numeric(val) {
                Some(num) => coeffs.insert(a, b, num),
                None => debug!("key {} is not a number", key),
            }
        }
        coeffs
    }
}

impl CoefficientMap {
    pub fn insert(&mut self, a: Metric, b: Metric, value: f64) {
        self.table.insert((a, b), value);
    }

    /// the coefficient stored under exactly this direction
    pub fn get(&self, a: Metric, b: Metric) -> Option<f64> {
        self.table.get(&(a, b)).copied()
    }

    /// Look the pair up in either direction; a pair nobody computed reads as 0.0.
    pub fn resolve(&self, a: Metric, b: Metric) -> f64 {
        self.get(a, b).or_else(|| self.get(b, a)).unwrap_or(0.0)
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Back to the `corr_<a>_<b>` object form, sorted by key.
    pub fn to_json(&self) -> Map<String, Value> {
        let mut pairs: Vec<_> = self.table.iter().collect();
        pairs.sort_by_key(|((a, b), _)| (*a, *b));
        pairs
            .into_iter()
            .map(|((a, b), v)| {
                let num = Number::from_f64(*v).map(Value::Number).unwrap_or(Value::Null);
                (format!("{}{}_{}", KEY_PREFIX, a, b), num)
            })
            .collect()
    }
}

/// A dense square matrix over an ordered metric alphabet.
#[derive(Debug, Clone, PartialEq)]
pub struct Matrix {
    alphabet: Vec<Metric>,
    cells: Vec<Vec<f64>>,
}

impl Matrix {
    pub fn alphabet(&self) -> &[Metric] {
        &self.alphabet
    }

    pub fn size(&self) -> usize {
        self.alphabet.len()
    }

    #[cfg(test)]
    pub fn get(&self, row: usize, col: usize) -> Option<f64> {
        self.cells.get(row)?.get(col).copied()
    }

    /// Table rows: display label plus the row's values.
    pub fn rows(&self) -> Vec<(&'static str, &[f64])> {
        self.alphabet.iter().zip(&self.cells).map(|(m, row)| (m.label(), row.as_slice())).collect()
    }

    /// every cell as (row, col, value)
    pub fn cells(&self) -> impl Iterator<Item = (usize, usize, f64)> + '_ {
        self.cells
            .iter()
            .enumerate()
            .flat_map(|(i, row)| row.iter().enumerate().map(move |(j, v)| (i, j, *v)))
    }
}

/// Resolve `coeffs` into a full matrix over `alphabet`.
///
/// The diagonal is exactly 1.0, every off-diagonal cell comes from [`CoefficientMap::resolve`],
/// and values are passed through without clamping.
pub fn build(coeffs: &CoefficientMap, alphabet: &[Metric]) -> Matrix {
    let cells = alphabet
        .iter()
        .enumerate()
        .map(|(i, a)| {
            alphabet
                .iter()
                .enumerate()
                .map(|(j, b)| if i == j { 1.0 } else { coeffs.resolve(*a, *b) })
                .collect()
        })
        .collect();

    Matrix { alphabet: alphabet.to_vec(), cells }
}

/// An 8-bit RGB triple.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rgb(pub u8, pub u8, pub u8);

pub const WHITE_RGB: Rgb = Rgb(255, 255, 255);
/// endpoint for a coefficient of +1
pub const COOL_RGB: Rgb = Rgb(0, 153, 102);
/// endpoint for a coefficient of -1
pub const HOT_RGB: Rgb = Rgb(244, 67, 54);

fn lerp_channel(from: u8, to: u8, t: f64) -> u8 {
    (from as f64 + (to as f64 - from as f64) * t).round() as u8
}

/// Heatmap colour for a coefficient: white at zero, fading linearly to the cool endpoint
/// for positive values and the hot endpoint for negative ones. Input is clamped to [-1, 1].
pub fn color_for(v: f64) -> Rgb {
    let v = if v.is_nan() { 0.0 } else { v.clamp(-1.0, 1.0) };
    if v == 0.0 {
        return WHITE_RGB;
    }

    let (end, t) = if v > 0.0 { (COOL_RGB, v) } else { (HOT_RGB, -v) };
    Rgb(
        lerp_channel(WHITE_RGB.0, end.0, t),
        lerp_channel(WHITE_RGB.1, end.1, t),
        lerp_channel(WHITE_RGB.2, end.2, t),
    )
}

/// Pearson r between two equally sized columns, None when it's undefined.
fn pearson(xs: &[f64], ys: &[f64]) -> Option<f64> {
    let n = xs.len();
    if n < 2 || n != ys.len() {
        return None;
    }
    let mean_x = xs.iter().sum::<f64>() / n as f64;
    let mean_y = ys.iter().sum::<f64>() / n as f64;

    let (mut cov, mut var_x, mut var_y) = (0.0, 0.0, 0.0);
    for (x, y) in xs.iter().zip(ys) {
        let (dx, dy) = (x - mean_x, y - mean_y);
        cov += dx * dy;
        var_x += dx * dx;
        var_y += dy * dy;
    }

    let denom = (var_x * var_y).sqrt();
    if denom == 0.0 {
        None
    } else {
        Some(cov / denom)
    }
}

/// Average every metric per customer, one row per customer with at least one ticket.
///
/// Priority and complexity average over all of a customer's tickets, unscored ones as 0.
/// Response, resolution, points and rating only average over tickets that have them;
/// a customer with none of those reads 0. Times are in seconds.
pub fn averages_per_customer(tickets: &[Record]) -> Vec<Record> {
    let columns: Vec<(Metric, Tally)> = Metric::ALL.iter().map(|m| (*m, aggregate(tickets, &m.aggregation()))).collect();
    let Some((_, customers)) = columns.iter().find(|(m, _)| *m == Metric::Ticket) else {
        return Vec::new();
    };

    let rows: Vec<Record> = customers
        .iter()
        .map(|(customer, _)| {
            let mut row = Record::new();
            row.insert("customer_id".to_string(), Value::String(customer.clone()));
            for (metric, tally) in &columns {
                let mut val = tally.get(customer).unwrap_or(0.0);
                if matches!(metric, Metric::Response | Metric::Resolution) {
                    val *= SECONDS_PER_HOUR;
                }
                let num = Number::from_f64(val).map(Value::Number).unwrap_or(Value::Null);
                row.insert(metric.source_field().to_string(), num);
            }
            row
        })
        .collect();
    debug!("averaged {} tickets into {} customer rows", tickets.len(), rows.len());
    rows
}

/// Compute the coefficient map from per-customer average rows.
///
/// Missing values count as 0. One direction is stored per pair; pairs whose coefficient is
/// undefined (fewer than two rows, or a constant column) are stored as 0.0.
/// With no rows at all there is nothing to correlate and the map is empty.
pub fn pearson_coefficients(rows: &[Record]) -> CoefficientMap {
    if rows.is_empty() {
        debug!("no average rows, nothing to correlate");
        return CoefficientMap::default();
    }

    let columns: HashMap<Metric, Vec<f64>> = Metric::ALL
        .iter()
        .map(|m| {
            let col = rows.iter().map(|r| fields::field_number(r, m.source_field()).unwrap_or(0.0)).collect();
            (*m, col)
        })
        .collect();

    let mut coeffs = CoefficientMap::default();
    for (i, a) in Metric::STORAGE_ORDER.iter().enumerate() {
        for b in &Metric::STORAGE_ORDER[i + 1..] {
            let r = pearson(&columns[a], &columns[b]).unwrap_or(0.0);
            coeffs.insert(*a, *b, r);
        }
    }
    debug!("computed {} coefficients from {} rows", coeffs.len(), rows.len());
    coeffs
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn raw(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => Map::new(),
        }
    }

    #[test]
    fn test_two_metric_example() {
        let coeffs = CoefficientMap::from(&raw(json!({"corr_ticket_priority": 0.42})));
        let matrix = build(&coeffs, &[Metric::Ticket, Metric::Priority]);

        assert_eq!(matrix.rows(), vec![("Ticket Count", &[1.0, 0.42][..]), ("Priority", &[0.42, 1.0][..])]);
    }

    #[test]
    fn test_symmetric_with_unit_diagonal() {
        let coeffs = CoefficientMap::from(&raw(json!({
            "corr_ticket_priority": 0.42,
            "corr_point_rating": -0.8,
            "corr_response_complexity": 0.1,
            "corr_resolution_ticket": "0.25",
            "id": 4,
            "calculation_date": "2024-01-01 00:00:00",
        })));
        assert_eq!(coeffs.len(), 4);

        let matrix = build(&coeffs, &Metric::ALL);
        assert_eq!(matrix.size(), 7);
        for (i, j, v) in matrix.cells() {
            if i == j {
                assert_eq!(v, 1.0);
            }
            assert_eq!(Some(v), matrix.get(j, i));
        }
        assert_eq!(coeffs.resolve(Metric::Rating, Metric::Point), -0.8);
        assert_eq!(coeffs.resolve(Metric::Ticket, Metric::Resolution), 0.25);
    }

    #[test]
    fn test_missing_pair_is_zero() {
        let coeffs = CoefficientMap::from(&raw(json!({"corr_ticket_priority": 0.42})));
        let matrix = build(&coeffs, &[Metric::Complexity, Metric::Point]);
        assert_eq!(matrix.get(0, 1), Some(0.0));
        assert_eq!(matrix.get(1, 0), Some(0.0));
    }

    #[test]
    fn test_out_of_range_passes_through() {
        let coeffs = CoefficientMap::from(&raw(json!({"corr_rating_point": 1.7})));
        let matrix = build(&coeffs, &[Metric::Rating, Metric::Point]);
        assert_eq!(matrix.get(1, 0), Some(1.7));
    }

    #[test]
    fn test_json_round_trip_keys() {
        let mut coeffs = CoefficientMap::default();
        coeffs.insert(Metric::Point, Metric::Rating, 0.5);
        let json = coeffs.to_json();
        assert_eq!(json.get("corr_point_rating"), Some(&json!(0.5)));
        assert_eq!(CoefficientMap::from(&json), coeffs);
    }

    #[test]
    fn test_color_endpoints() {
        assert_eq!(color_for(0.0), WHITE_RGB);
        assert_eq!(color_for(1.0), COOL_RGB);
        assert_eq!(color_for(-1.0), HOT_RGB);
        assert_eq!(color_for(3.0), COOL_RGB);
        assert_eq!(color_for(-7.5), HOT_RGB);
        assert_eq!(color_for(f64::NAN), WHITE_RGB);
    }

    #[test]
    fn test_color_interpolates() {
        assert_eq!(color_for(0.5), Rgb(128, 204, 179));
        assert_eq!(color_for(-0.5), Rgb(250, 161, 155));
    }

    #[test]
    fn test_pearson_coefficients() {
        let rows: Vec<Record> = serde_json::from_value(json!([
            {"ticket_count": 1, "avg_priority": 2.0, "avg_point": 30, "avg_rating": 5},
            {"ticket_count": 2, "avg_priority": 4.0, "avg_point": 20, "avg_rating": 5},
            {"ticket_count": 3, "avg_priority": 6.0, "avg_point": 10, "avg_rating": 5},
        ]))
        .unwrap_or_default();
        let coeffs = pearson_coefficients(&rows);

        // 21 pairs, one direction each
        assert_eq!(coeffs.len(), 21);
        assert!((coeffs.resolve(Metric::Ticket, Metric::Priority) - 1.0).abs() < 1e-12);
        assert!((coeffs.resolve(Metric::Ticket, Metric::Point) + 1.0).abs() < 1e-12);
        // constant column
        assert_eq!(coeffs.get(Metric::Point, Metric::Rating), Some(0.0));
        assert_eq!(coeffs.get(Metric::Rating, Metric::Point), None);
    }

    #[test]
    fn test_no_rows_no_coefficients() {
        assert!(pearson_coefficients(&[]).is_empty());
        assert!(averages_per_customer(&[]).is_empty());
    }

    #[test]
    fn test_averages_per_customer() -> anyhow::Result<()> {
        let tickets: Vec<Record> = serde_json::from_value(json!([
            {
                "customer_name_id": [1, "Acme"], "priority": "high", "complexity": "medium", "customer_rating": "good",
                "submitted_date": "2024-01-01 08:00:00", "progress_date": "2024-01-01 09:00:00",
                "finish_date": "2024-01-01 11:00:00", "min_point": 10
            },
            {
                "customer_name_id": [1, "Acme"], "priority": "low", "complexity": false, "customer_rating": false,
                "submitted_date": "2024-01-02 08:00:00", "progress_date": false, "finish_date": false, "min_point": 0
            },
            {
                "customer_name_id": [2, "Globex"], "priority": false, "complexity": "high", "customer_rating": "no",
                "submitted_date": "2024-01-03 08:00:00", "progress_date": false, "finish_date": false, "min_point": 4
            },
            {"customer_name_id": false, "priority": "high"},
        ]))?;
        let rows = averages_per_customer(&tickets);
        assert_eq!(rows.len(), 2);

        let acme = &rows[0];
        assert_eq!(acme["customer_id"], json!("Acme"));
        assert_eq!(acme["ticket_count"], json!(2.0));
        assert_eq!(acme["avg_priority"], json!(2.0));
        assert_eq!(acme["avg_complexity"], json!(0.75));
        assert_eq!(acme["avg_response_time"], json!(3600.0));
        assert_eq!(acme["avg_resolution_time"], json!(7200.0));
        assert_eq!(acme["avg_point"], json!(10.0));
        assert_eq!(acme["avg_rating"], json!(4.0));

        let globex = &rows[1];
        assert_eq!(globex["avg_priority"], json!(0.0));
        assert_eq!(globex["avg_complexity"], json!(2.0));
        assert_eq!(globex["avg_response_time"], json!(0.0));
        assert_eq!(globex["avg_rating"], json!(0.0));

        let coeffs = pearson_coefficients(&rows);
        assert_eq!(coeffs.len(), 21);
        assert!((coeffs.resolve(Metric::Priority, Metric::Complexity) + 1.0).abs() < 1e-12);
        Ok(())
    }

    #[test]
    fn test_pearson_needs_two_rows() {
        let rows: Vec<Record> = serde_json::from_value(json!([{"ticket_count": 4, "avg_priority": 1}])).unwrap_or_default();
        let coeffs = pearson_coefficients(&rows);
        assert_eq!(coeffs.resolve(Metric::Ticket, Metric::Priority), 0.0);
    }
}

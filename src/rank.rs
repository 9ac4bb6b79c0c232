use std::cmp::Ordering;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// Sort direction for a ranked series. The top-N window always follows the direction:
/// descending keeps the largest values, ascending the smallest.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[value(alias = "asc")]
    Ascending,
    #[default]
    #[value(alias = "desc")]
    Descending,
}

/// Order two values in `order`. NaN sorts last in both directions.
fn compare(a: f64, b: f64, order: SortOrder) -> Ordering {
    a.is_nan().cmp(&b.is_nan()).then_with(|| match order {
        SortOrder::Ascending => a.total_cmp(&b),
        SortOrder::Descending => b.total_cmp(&a),
    })
}

/// Sort a keyed series by value and keep at most `limit` entries.
///
/// The sort is stable, so equal values keep the order they had in `series`.
/// NaN values go after every real value, so a top-N window only reaches them when it has to.
pub fn select<I, S>(series: I, order: SortOrder, limit: Option<usize>) -> Vec<(String, f64)>
where
    I: IntoIterator<Item = (S, f64)>,
    S: Into<String>,
{
    let mut ranked: Vec<(String, f64)> = series.into_iter().map(|(l, v)| (l.into(), v)).collect();

    ranked.sort_by(|a, b| compare(a.1, b.1, order));

    if let Some(n) = limit {
        ranked.truncate(n);
    }
    ranked
}

/*!
 * Filter predicates and record-list actions. Charts never navigate anywhere themselves; for every
 * element they build the action that opening a filtered record list would need.
 */

use chrono::NaiveDate;
use serde::{Serialize, Serializer};
use serde_json::Value;

use crate::fields::{self, Record};

/// The record model every ticket list action points at.
pub const TICKET_MODEL: &str = "ticket.name";
/// Per-customer cluster assignments of a k-means run
pub const KMEANS_RESULT_MODEL: &str = "kmeans.result";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Eq,
    Ilike,
    Gte,
    Lte,
}

impl Operator {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operator::Eq => "=",
            Operator::Ilike => "ilike",
            Operator::Gte => ">=",
            Operator::Lte => "<=",
        }
    }
}

impl Serialize for Operator {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// A single `(field, operator, value)` triple. Serializes as a three element array.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Condition(pub String, pub Operator, pub Value);

impl Condition {
    pub fn new(field: impl Into<String>, op: Operator, value: impl Into<Value>) -> Self {
        Condition(field.into(), op, value.into())
    }

    /// Evaluate against a record. Range operators compare timestamps (or numbers),
    /// `=` compares the group label, `ilike` is a case-insensitive substring match on it.
    /// A reference compared to a number with `=` matches on its id.
    pub fn matches(&self, record: &Record) -> bool {
        let Condition(field, op, expected) = self;
        let Some(actual) = fields::get_root_elem(record, field) else {
            return false;
        };

        match op {
            Operator::Gte | Operator::Lte => {
                let ordering = match (fields::timestamp(actual), fields::timestamp(expected)) {
                    (Some(a), Some(e)) => a.partial_cmp(&e),
                    _ => fields::numeric(actual).zip(fields::numeric(expected)).and_then(|(a, e)| a.partial_cmp(&e)),
                };
                match ordering {
                    Some(ord) if *op == Operator::Gte => ord.is_ge(),
                    Some(ord) => ord.is_le(),
                    None => false,
                }
            }
            Operator::Eq if expected.is_number() && fields::reference_id(actual).is_some() => {
                fields::reference_id(actual) == expected.as_f64()
            }
            Operator::Eq => match (fields::group_label(actual), fields::group_label(expected)) {
                (Some(a), Some(e)) => a == e,
                (None, None) => true,
                _ => false,
            },
            Operator::Ilike => match (fields::group_label(actual), expected.as_str()) {
                (Some(a), Some(e)) => a.to_lowercase().contains(&e.to_lowercase()),
                _ => false,
            },
        }
    }
}

/// A conjunction of conditions.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Domain(Vec<Condition>);

impl From<Vec<Condition>> for Domain {
    fn from(value: Vec<Condition>) -> Self {
        Domain(value)
    }
}

impl Domain {
    /// Every record whose `field` falls within the two dates, both days inclusive.
    pub fn date_range(field: &str, start: NaiveDate, end: NaiveDate) -> Self {
        Domain(vec![
            Condition::new(field, Operator::Gte, format!("{} 00:00:00", start.format("%Y-%m-%d"))),
            Condition::new(field, Operator::Lte, format!("{} 23:59:59", end.format("%Y-%m-%d"))),
        ])
    }

    /// this domain followed by the conditions of `other`
    pub fn and(&self, other: Domain) -> Domain {
        let mut conditions = self.0.clone();
        conditions.extend(other.0);
        Domain(conditions)
    }

    pub fn matches(&self, record: &Record) -> bool {
        self.0.iter().all(|c| c.matches(record))
    }
}

/// Radix prefixes a numeric label may carry
const RADIX_PREFIXES: [(&str, u32); 6] = [("0x", 16), ("0X", 16), ("0o", 8), ("0O", 8), ("0b", 2), ("0B", 2)];

/// Mirrors a JavaScript `isNaN` check on a string: surrounding whitespace is ignored,
/// an empty string is zero, and hex, octal and binary literals count as numbers.
pub fn is_numeric_label(label: &str) -> bool {
    let trimmed = label.trim();
    if trimmed.is_empty() {
        return true;
    }
    for (prefix, radix) in RADIX_PREFIXES {
        if let Some(digits) = trimmed.strip_prefix(prefix) {
            return !digits.is_empty() && digits.chars().all(|c| c.is_digit(radix));
        }
    }
    match trimmed.parse::<f64>() {
        Ok(v) if v.is_nan() => false,
        // rust also accepts "inf" and "infinity" in any case, javascript only "Infinity".
        // Overflowing literals like 1e999 are still numbers.
        Ok(v) if v.is_infinite() => {
            let unsigned = trimmed.trim_start_matches(['+', '-']);
            unsigned == "Infinity" || unsigned.starts_with(|c: char| c.is_ascii_digit() || c == '.')
        }
        Ok(_) => true,
        Err(_) => false,
    }
}

/// Predicate for clicking a chart element labelled `label`: an exact match when the label
/// looks like a number, a substring match otherwise.
pub fn click_domain(field: &str, label: &str) -> Domain {
    let op = if is_numeric_label(label) { Operator::Eq } else { Operator::Ilike };
    Domain(vec![Condition::new(field, op, label)])
}

/// Predicate that always matches exactly, used by distribution charts.
pub fn exact_domain(field: &str, value: &str) -> Domain {
    Domain(vec![Condition::new(field, Operator::Eq, value)])
}

/// Everything needed to open a record list scoped to a predicate.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ListAction {
    pub name: String,
    pub model: String,
    pub domain: Domain,
}

impl ListAction {
    pub fn new(name: impl Into<String>, domain: Domain) -> Self {
        ListAction::for_model(TICKET_MODEL, name, domain)
    }

    pub fn for_model(model: &str, name: impl Into<String>, domain: Domain) -> Self {
        ListAction { name: name.into(), model: model.to_string(), domain }
    }
}

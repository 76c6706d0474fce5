//! Purpose: Tagged column values, query literals, and the projected row handed to callers.
//! Exports: `ScalarValue`, `Literal`, `RowView`.
//! Role: Replaces per-call type sniffing with explicit `Number|Text` tags.
//! Invariants: A numeric literal compares by value against numeric columns (or numeric
//! text); a quoted literal always compares exact string forms.
//! Invariants: Column lookups on `RowView` are ASCII case-insensitive.
use std::fmt;

use serde_json::{Map, Number, Value};

#[derive(Clone, Debug, PartialEq)]
pub enum ScalarValue {
    Int(i64),
    Float(f64),
    Text(String),
}

impl ScalarValue {
    fn as_number(&self) -> Option<Numeric> {
        match self {
            ScalarValue::Int(value) => Some(Numeric::Int(*value)),
            ScalarValue::Float(value) => Some(Numeric::Float(*value)),
            ScalarValue::Text(text) => Numeric::parse(text),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ScalarValue::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self.as_number()? {
            Numeric::Int(value) => Some(value),
            Numeric::Float(value) if value.fract() == 0.0 => Some(value as i64),
            Numeric::Float(_) => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        self.as_number().map(Numeric::to_f64)
    }

    pub fn matches(&self, literal: &Literal) -> bool {
        match literal {
            Literal::Number(text) => match (self.as_number(), Numeric::parse(text)) {
                (Some(left), Some(right)) => left.equals(right),
                _ => self.to_string() == *text,
            },
            Literal::Text(text) => self.to_string() == *text,
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            ScalarValue::Int(value) => Value::from(*value),
            ScalarValue::Float(value) => Number::from_f64(*value)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            ScalarValue::Text(text) => Value::String(text.clone()),
        }
    }
}

impl fmt::Display for ScalarValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScalarValue::Int(value) => write!(f, "{value}"),
            ScalarValue::Float(value) => write!(f, "{value}"),
            ScalarValue::Text(text) => f.write_str(text),
        }
    }
}

macro_rules! scalar_from_int {
    ($($ty:ty),*) => {
        $(impl From<$ty> for ScalarValue {
            fn from(value: $ty) -> Self {
                ScalarValue::Int(i64::from(value))
            }
        })*
    };
}

scalar_from_int!(i8, i16, i32, i64, u8, u16, u32);

impl From<f32> for ScalarValue {
    fn from(value: f32) -> Self {
        ScalarValue::Float(f64::from(value))
    }
}

impl From<f64> for ScalarValue {
    fn from(value: f64) -> Self {
        ScalarValue::Float(value)
    }
}

impl From<String> for ScalarValue {
    fn from(value: String) -> Self {
        ScalarValue::Text(value)
    }
}

impl From<&str> for ScalarValue {
    fn from(value: &str) -> Self {
        ScalarValue::Text(value.to_string())
    }
}

/// Right-hand side of a `column = literal` comparison.
#[derive(Clone, Debug, PartialEq)]
pub enum Literal {
    /// Bare numeric token, kept as written.
    Number(String),
    /// Single-quoted string with quotes removed.
    Text(String),
}

impl Literal {
    pub fn text(&self) -> &str {
        match self {
            Literal::Number(text) | Literal::Text(text) => text,
        }
    }

}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Number(text) => f.write_str(text),
            Literal::Text(text) => write!(f, "'{}'", text.replace('\'', "''")),
        }
    }
}

#[derive(Clone, Copy, Debug)]
enum Numeric {
    Int(i64),
    Float(f64),
}

impl Numeric {
    fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        if text.is_empty() {
            return None;
        }
        if let Ok(value) = text.parse::<i64>() {
            return Some(Numeric::Int(value));
        }
        text.parse::<f64>()
            .ok()
            .filter(|value| value.is_finite())
            .map(Numeric::Float)
    }

    fn to_f64(self) -> f64 {
        match self {
            Numeric::Int(value) => value as f64,
            Numeric::Float(value) => value,
        }
    }

    fn equals(self, other: Numeric) -> bool {
        match (self, other) {
            (Numeric::Int(left), Numeric::Int(right)) => left == right,
            (left, right) => left.to_f64() == right.to_f64(),
        }
    }
}

/// One row projected through a table's column extractors, in declared column order.
#[derive(Clone, Debug, PartialEq)]
pub struct RowView {
    key: String,
    columns: Vec<(String, ScalarValue)>,
}

impl RowView {
    pub fn new(key: impl Into<String>, columns: Vec<(String, ScalarValue)>) -> Self {
        Self {
            key: key.into(),
            columns,
        }
    }

    /// Primary key the row was stored under.
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn columns(&self) -> impl Iterator<Item = (&str, &ScalarValue)> {
        self.columns.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn get(&self, column: &str) -> Option<&ScalarValue> {
        self.columns
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(column))
            .map(|(_, value)| value)
    }

    pub fn get_str(&self, column: &str) -> Option<String> {
        self.get(column).map(ToString::to_string)
    }

    pub fn get_i64(&self, column: &str) -> Option<i64> {
        self.get(column).and_then(ScalarValue::as_i64)
    }

    pub fn get_f64(&self, column: &str) -> Option<f64> {
        self.get(column).and_then(ScalarValue::as_f64)
    }

    pub fn to_json(&self) -> Value {
        let mut object = Map::new();
        for (name, value) in &self.columns {
            object.insert(name.clone(), value.to_json());
        }
        Value::Object(object)
    }
}

#[cfg(test)]
mod tests {
    use super::{Literal, RowView, ScalarValue};
    use serde_json::json;

    #[test]
    fn numeric_literals_compare_by_value() {
        let number = |text: &str| Literal::Number(text.to_string());
        assert!(ScalarValue::Int(100).matches(&number("100")));
        assert!(ScalarValue::Int(100).matches(&number("100.0")));
        assert!(ScalarValue::Float(107.6).matches(&number("107.6")));
        assert!(!ScalarValue::Int(101).matches(&number("100")));
        assert!(ScalarValue::Text("0042".into()).matches(&number("42")));
    }

    #[test]
    fn text_literals_compare_string_forms() {
        let text = |value: &str| Literal::Text(value.to_string());
        assert!(ScalarValue::Text("SHIPPED".into()).matches(&text("SHIPPED")));
        assert!(!ScalarValue::Text("SHIPPED".into()).matches(&text("shipped")));
        assert!(ScalarValue::Int(2).matches(&text("2")));
        assert!(!ScalarValue::Int(2).matches(&text("two")));
        assert!(!ScalarValue::Text("7".into()).matches(&text("007")));
        assert!(ScalarValue::Text("007".into()).matches(&text("007")));
        assert!(!ScalarValue::Int(100).matches(&text("100.0")));
    }

    #[test]
    fn row_view_lookups_ignore_case() {
        let row = RowView::new(
            "k1",
            vec![
                ("orderId".to_string(), ScalarValue::Int(100)),
                ("status".to_string(), ScalarValue::from("SHIPPED")),
                ("amount".to_string(), ScalarValue::Float(107.6)),
            ],
        );
        assert_eq!(row.get_i64("ORDERID"), Some(100));
        assert_eq!(row.get_str("Status").as_deref(), Some("SHIPPED"));
        assert_eq!(row.get_f64("amount"), Some(107.6));
        assert_eq!(row.get("missing"), None);
        assert_eq!(
            row.to_json(),
            json!({"orderId": 100, "status": "SHIPPED", "amount": 107.6})
        );
    }

    #[test]
    fn literal_display_requotes_text() {
        assert_eq!(Literal::Text("it's".into()).to_string(), "'it''s'");
        assert_eq!(Literal::Number("-3.5".into()).to_string(), "-3.5");
    }
}

use crate::schema::ScalarType;
use crate::store::Value;
use chrono::NaiveDate;

/// Converts one raw cell to a typed value. Strings pass through untouched;
/// every other type is trimmed first.
pub fn coerce_scalar(
    ty: ScalarType,
    raw: &str,
    date_formats: &[String],
) -> Result<Value, String> {
    match ty {
        ScalarType::String => Ok(Value::Text(raw.to_string())),
        ScalarType::Integer => {
            let s = raw.trim();
            if s.is_empty() {
                return Err("a value is required".to_string());
            }
            s.parse::<i64>()
                .map(Value::Integer)
                .map_err(|_| format!("'{}' value must be an integer", raw))
        }
        ScalarType::Boolean => match raw.trim().to_ascii_lowercase().as_str() {
            "t" | "true" | "1" | "y" | "yes" => Ok(Value::Boolean(true)),
            "f" | "false" | "0" | "n" | "no" => Ok(Value::Boolean(false)),
            _ => Err(format!("'{}' value must be either True or False", raw)),
        },
        ScalarType::Date => {
            let s = raw.trim();
            if s.is_empty() {
                return Err("a value is required".to_string());
            }
            date_formats
                .iter()
                .find_map(|f| NaiveDate::parse_from_str(s, f).ok())
                .map(Value::Date)
                .ok_or_else(|| {
                    format!(
                        "'{}' is not a valid date (accepted formats: {})",
                        raw,
                        date_formats.join(", ")
                    )
                })
        }
    }
}

pub fn check_range(value: &Value, range: Option<(i64, i64)>) -> Result<(), String> {
    match (value, range) {
        (Value::Integer(n), Some((min, max))) if !(min..=max).contains(n) => {
            Err(format!("{} is outside {}..={}", n, min, max))
        }
        _ => Ok(()),
    }
}

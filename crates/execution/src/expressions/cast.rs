use arrow_schema::{DataType, TimeUnit};
use ssq_common::{Result, SsqError};

use crate::value::Value;

/// Whether `CAST(from AS to)` is defined.
pub fn can_cast(from: &DataType, to: &DataType) -> bool {
    use DataType::*;
    if from == to || *from == Null {
        return true;
    }
    match (from, to) {
        (Int32 | Int64 | Float64, Int32 | Int64 | Float64) => true,
        (_, Utf8) => true,
        (Utf8, Boolean | Int32 | Int64 | Float64 | Time32(TimeUnit::Millisecond)) => true,
        _ => false,
    }
}

/// Cast one value. Null stays null; unparseable or out-of-range input is an
/// execution error for the row.
pub fn cast_value(value: Value, to: &DataType) -> Result<Value> {
    if value.is_null() || value.data_type() == *to {
        return Ok(value);
    }
    let out = match (&value, to) {
        (_, DataType::Utf8) => Some(Value::Utf8(value.to_string())),
        (Value::Int32(v), DataType::Int64) => Some(Value::Int64(i64::from(*v))),
        (Value::Int32(v), DataType::Float64) => Some(Value::Float64(f64::from(*v))),
        (Value::Int64(v), DataType::Int32) => i32::try_from(*v).ok().map(Value::Int32),
        (Value::Int64(v), DataType::Float64) => Some(Value::Float64(*v as f64)),
        (Value::Float64(v), DataType::Int32) => float_to_int(*v)
            .and_then(|i| i32::try_from(i).ok())
            .map(Value::Int32),
        (Value::Float64(v), DataType::Int64) => float_to_int(*v).map(Value::Int64),
        (Value::Utf8(s), DataType::Boolean) => match s.trim().to_ascii_lowercase().as_str() {
            "true" => Some(Value::Boolean(true)),
            "false" => Some(Value::Boolean(false)),
            _ => None,
        },
        (Value::Utf8(s), DataType::Int32) => s.trim().parse().ok().map(Value::Int32),
        (Value::Utf8(s), DataType::Int64) => s.trim().parse().ok().map(Value::Int64),
        (Value::Utf8(s), DataType::Float64) => s.trim().parse().ok().map(Value::Float64),
        (Value::Utf8(s), DataType::Time32(TimeUnit::Millisecond)) => {
            parse_time_literal(s).ok().map(Value::Time)
        }
        _ => None,
    };
    out.ok_or_else(|| SsqError::Execution(format!("cannot cast {value:?} to {to:?}")))
}

fn float_to_int(v: f64) -> Option<i64> {
    let t = v.trunc();
    (t.is_finite() && t >= i64::MIN as f64 && t < i64::MAX as f64).then_some(t as i64)
}

/// Parse `HH:MM[:SS[.fff]]` into milliseconds since midnight.
pub fn parse_time_literal(text: &str) -> Result<i32> {
    let invalid = || SsqError::TypeResolution(format!("invalid TIME literal '{text}'"));
    let (clock, fraction) = match text.trim().split_once('.') {
        Some((c, f)) => (c, Some(f)),
        None => (text.trim(), None),
    };
    let parts = clock.split(':').collect::<Vec<_>>();
    if !(2..=3).contains(&parts.len()) {
        return Err(invalid());
    }
    let field = |s: &str, max: i32| -> Result<i32> {
        if s.len() != 2 || !s.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }
        let v = s.parse::<i32>().map_err(|_| invalid())?;
        if v > max {
            return Err(invalid());
        }
        Ok(v)
    };
    let hours = field(parts[0], 23)?;
    let minutes = field(parts[1], 59)?;
    let seconds = match parts.get(2) {
        Some(s) => field(s, 59)?,
        None if fraction.is_some() => return Err(invalid()),
        None => 0,
    };
    let millis = match fraction {
        Some(f) if !f.is_empty() && f.len() <= 3 && f.bytes().all(|b| b.is_ascii_digit()) => {
            // ".5" is 500ms
            format!("{f:0<3}").parse::<i32>().map_err(|_| invalid())?
        }
        Some(_) => return Err(invalid()),
        None => 0,
    };
    Ok(((hours * 60 + minutes) * 60 + seconds) * 1000 + millis)
}

//! Built-in scalar functions.
//!
//! All built-ins return null when any argument is null.

use std::sync::Arc;

use arrow_schema::DataType;
use ssq_common::{Result, SsqError};

use crate::udf::ScalarFunction;
use crate::value::Value;

type Signature = fn(&[DataType]) -> Result<DataType>;
type Body = fn(&[Value]) -> Result<Value>;

struct BuiltinFunction {
    name: &'static str,
    signature: Signature,
    body: Body,
}

impl ScalarFunction for BuiltinFunction {
    fn name(&self) -> &str {
        self.name
    }

    fn return_type(&self, arg_types: &[DataType]) -> Result<DataType> {
        (self.signature)(arg_types)
    }

    fn invoke(&self, args: &[Value]) -> Result<Value> {
        if args.iter().any(Value::is_null) {
            return Ok(Value::Null);
        }
        (self.body)(args)
    }
}

pub(crate) fn builtin_functions() -> Vec<Arc<dyn ScalarFunction>> {
    let defs = [
        BuiltinFunction {
            name: "UCASE",
            signature: |args| unary_string(args, DataType::Utf8),
            body: |args| Ok(Value::Utf8(string_arg(args, 0)?.to_uppercase())),
        },
        BuiltinFunction {
            name: "LCASE",
            signature: |args| unary_string(args, DataType::Utf8),
            body: |args| Ok(Value::Utf8(string_arg(args, 0)?.to_lowercase())),
        },
        BuiltinFunction {
            name: "TRIM",
            signature: |args| unary_string(args, DataType::Utf8),
            body: |args| Ok(Value::Utf8(string_arg(args, 0)?.trim().to_string())),
        },
        BuiltinFunction {
            name: "LEN",
            signature: |args| unary_string(args, DataType::Int32),
            body: |args| {
                let n = string_arg(args, 0)?.chars().count();
                Ok(Value::Int32(i32::try_from(n).unwrap_or(i32::MAX)))
            },
        },
        BuiltinFunction {
            name: "CONCAT",
            signature: concat_signature,
            body: |args| {
                let mut out = String::new();
                for i in 0..args.len() {
                    out.push_str(string_arg(args, i)?);
                }
                Ok(Value::Utf8(out))
            },
        },
        BuiltinFunction {
            name: "ABS",
            signature: abs_signature,
            body: |args| match &args[0] {
                Value::Int32(v) => v.checked_abs().map(Value::Int32).ok_or_else(overflow),
                Value::Int64(v) => v.checked_abs().map(Value::Int64).ok_or_else(overflow),
                Value::Float64(v) => Ok(Value::Float64(v.abs())),
                other => Err(unexpected(other)),
            },
        },
        BuiltinFunction {
            name: "ROUND",
            signature: round_signature,
            body: |args| match &args[0] {
                Value::Float64(v) => Ok(Value::Int64(v.round() as i64)),
                other => other.as_i64().map(Value::Int64).ok_or_else(|| unexpected(other)),
            },
        },
        BuiltinFunction {
            name: "SUBSTRING",
            signature: substring_signature,
            body: substring,
        },
    ];
    defs.into_iter()
        .map(|f| Arc::new(f) as Arc<dyn ScalarFunction>)
        .collect()
}

fn is_string(dt: &DataType) -> bool {
    matches!(dt, DataType::Utf8 | DataType::Null)
}

fn is_integer(dt: &DataType) -> bool {
    matches!(dt, DataType::Int32 | DataType::Int64 | DataType::Null)
}

fn arity(args: &[DataType], min: usize, max: usize) -> Result<()> {
    if args.len() < min || args.len() > max {
        let expected = if min == max {
            min.to_string()
        } else if max == usize::MAX {
            format!("at least {min}")
        } else {
            format!("{min} to {max}")
        };
        return Err(SsqError::TypeResolution(format!(
            "expects {expected} argument(s), got {}",
            args.len()
        )));
    }
    Ok(())
}

fn unary_string(args: &[DataType], out: DataType) -> Result<DataType> {
    arity(args, 1, 1)?;
    if !is_string(&args[0]) {
        return Err(SsqError::TypeResolution(format!(
            "expects a string argument, got {:?}",
            args[0]
        )));
    }
    Ok(out)
}

fn concat_signature(args: &[DataType]) -> Result<DataType> {
    arity(args, 2, usize::MAX)?;
    if let Some(bad) = args.iter().find(|dt| !is_string(dt)) {
        return Err(SsqError::TypeResolution(format!(
            "expects string arguments, got {bad:?}"
        )));
    }
    Ok(DataType::Utf8)
}

fn abs_signature(args: &[DataType]) -> Result<DataType> {
    arity(args, 1, 1)?;
    match &args[0] {
        DataType::Int32 | DataType::Int64 | DataType::Float64 => Ok(args[0].clone()),
        DataType::Null => Ok(DataType::Float64),
        other => Err(SsqError::TypeResolution(format!(
            "expects a numeric argument, got {other:?}"
        ))),
    }
}

fn round_signature(args: &[DataType]) -> Result<DataType> {
    arity(args, 1, 1)?;
    match &args[0] {
        DataType::Int32 | DataType::Int64 | DataType::Float64 | DataType::Null => {
            Ok(DataType::Int64)
        }
        other => Err(SsqError::TypeResolution(format!(
            "expects a numeric argument, got {other:?}"
        ))),
    }
}

fn substring_signature(args: &[DataType]) -> Result<DataType> {
    arity(args, 2, 3)?;
    if !is_string(&args[0]) || !args[1..].iter().all(is_integer) {
        return Err(SsqError::TypeResolution(format!(
            "expects (string, int[, int]), got {args:?}"
        )));
    }
    Ok(DataType::Utf8)
}

/// `SUBSTRING(s, pos[, len])` with a 1-based `pos`, clamped to the string.
fn substring(args: &[Value]) -> Result<Value> {
    let s = string_arg(args, 0)?;
    let pos = int_arg(args, 1)?;
    let chars = s.chars().collect::<Vec<_>>();
    let start = usize::try_from(pos.max(1) - 1)
        .unwrap_or(0)
        .min(chars.len());
    let end = match args.get(2) {
        Some(_) => {
            let len = usize::try_from(int_arg(args, 2)?.max(0)).unwrap_or(0);
            start.saturating_add(len).min(chars.len())
        }
        None => chars.len(),
    };
    Ok(Value::Utf8(chars[start..end].iter().collect()))
}

fn string_arg(args: &[Value], i: usize) -> Result<&str> {
    args[i].as_str().ok_or_else(|| unexpected(&args[i]))
}

fn int_arg(args: &[Value], i: usize) -> Result<i64> {
    args[i].as_i64().ok_or_else(|| unexpected(&args[i]))
}

fn unexpected(v: &Value) -> SsqError {
    SsqError::Execution(format!("unexpected argument value {v:?}"))
}

fn overflow() -> SsqError {
    SsqError::Execution("integer overflow".to_string())
}

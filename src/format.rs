//! Substitution of typed arguments into query text.
//!
//! The native client has no parameter binding, so arguments are rendered as
//! SQL literals and spliced into the query in place of `?` placeholders.
//! String literals are quoted but not escaped.

use crate::dsn::Location;
use crate::error::{Result, RtdbError};
use crate::types::{Value, is_zero_time};

/// Layout of date/time literals.
pub const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

/// Number of `?` placeholders in `query`.
pub fn count_placeholders(query: &str) -> usize {
    query.matches('?').count()
}

/// Renders one argument as a SQL literal.
///
/// # Arguments
/// * `value` - Argument to render
/// * `location` - Time zone used for date/time literals
pub fn format_literal(value: &Value, location: &Location) -> Result<String> {
    match value {
        Value::Null => Ok("NULL".to_string()),
        Value::Bool(b) => Ok(if *b { "true" } else { "false" }.to_string()),
        Value::Int32(v) => Ok(v.to_string()),
        Value::Int64(v) => Ok(v.to_string()),
        Value::UInt64(v) => Ok(v.to_string()),
        Value::Float32(v) => Ok(v.to_string()),
        Value::Float64(v) => Ok(v.to_string()),
        Value::String(s) => Ok(format!("'{}'", s)),
        Value::DateTime(dt) if is_zero_time(dt) => Err(RtdbError::unsupported_argument(
            "zero datetime has no literal form",
        )),
        Value::DateTime(dt) => Ok(format!("'{}'", location.format(dt, DATETIME_FORMAT))),
        other => Err(RtdbError::unsupported_argument(format!(
            "cannot render {} argument as a literal",
            other.type_name()
        ))),
    }
}

/// Replaces each `?` in `query`, left to right, with the literal form of the
/// matching argument.
///
/// Fails with an argument count mismatch when the number of placeholders
/// differs from the number of arguments. Placeholders appearing inside a
/// substituted literal are left alone.
pub fn format_args(query: &str, args: &[Value], location: &Location) -> Result<String> {
    let placeholders = count_placeholders(query);
    if placeholders != args.len() {
        return Err(RtdbError::argument_count(placeholders, args.len()));
    }

    let literals = args
        .iter()
        .map(|arg| format_literal(arg, location))
        .collect::<Result<Vec<_>>>()?;

    let extra: usize = literals.iter().map(String::len).sum();
    let mut out = String::with_capacity(query.len() + extra);
    let mut literals = literals.into_iter();
    let mut rest = query;
    while let Some(pos) = rest.find('?') {
        out.push_str(&rest[..pos]);
        if let Some(literal) = literals.next() {
            out.push_str(&literal);
        }
        rest = &rest[pos + 1..];
    }
    out.push_str(rest);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use chrono::{DateTime, TimeZone, Utc};

    #[test]
    fn test_format_string_argument() {
        let query = format_args("select * from t where name = ?", &["bar".into()], &Location::Utc).unwrap();
        assert_eq!(query, "select * from t where name = 'bar'");
    }

    #[test]
    fn test_format_count_mismatch() {
        let err = format_args("select ? , ?", &[1i32.into()], &Location::Utc).unwrap_err();
        assert_eq!(
            err.kind(),
            &ErrorKind::ArgumentCountMismatch { placeholders: 2, arguments: 1 }
        );
        let err = format_args("select 1", &[1i32.into()], &Location::Utc).unwrap_err();
        assert_eq!(
            err.kind(),
            &ErrorKind::ArgumentCountMismatch { placeholders: 0, arguments: 1 }
        );
    }

    #[test]
    fn test_format_scalar_literals() {
        let args = vec![
            Value::Int32(-3),
            Value::Int64(1 << 40),
            Value::UInt64(u64::MAX),
            Value::Float32(1.5),
            Value::Float64(0.1),
            Value::Bool(true),
            Value::Bool(false),
            Value::Null,
        ];
        let query = format_args("?,?,?,?,?,?,?,?", &args, &Location::Utc).unwrap();
        assert_eq!(
            query,
            "-3,1099511627776,18446744073709551615,1.5,0.1,true,false,NULL"
        );
    }

    #[test]
    fn test_format_datetime_literal() {
        let dt = Utc.with_ymd_and_hms(2024, 3, 9, 7, 5, 1).unwrap() + chrono::Duration::milliseconds(42);
        assert_eq!(
            format_literal(&Value::DateTime(dt), &Location::Utc).unwrap(),
            "'2024-03-09 07:05:01.042'"
        );
        assert_eq!(
            format_literal(&Value::DateTime(dt), &Location::Zone(chrono_tz::Asia::Shanghai)).unwrap(),
            "'2024-03-09 15:05:01.042'"
        );
    }

    #[test]
    fn test_format_zero_datetime_unsupported() {
        let zero = DateTime::parse_from_rfc3339("0001-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let err = format_args("?", &[Value::DateTime(zero)], &Location::Utc).unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::UnsupportedArgumentType(_)));
    }

    #[test]
    fn test_format_bytes_unsupported() {
        let err = format_literal(&Value::Bytes(vec![1, 2]), &Location::Utc).unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::UnsupportedArgumentType(_)));
        assert_eq!(format_literal(&Value::from(None::<Vec<u8>>), &Location::Utc).unwrap(), "NULL");
        assert!(format_literal(&Value::Undecodable, &Location::Utc).is_err());
    }

    #[test]
    fn test_format_strings_are_not_escaped() {
        let query = format_args("insert into t values (?)", &["it's".into()], &Location::Utc).unwrap();
        assert_eq!(query, "insert into t values ('it's')");
    }

    #[test]
    fn test_format_does_not_rescan_literals() {
        let query = format_args(
            "select * from t where a = ? and b = ?",
            &["what?".into(), 2i32.into()],
            &Location::Utc,
        )
        .unwrap();
        assert_eq!(query, "select * from t where a = 'what?' and b = 2");
    }

    #[test]
    fn test_format_no_placeholders_no_args() {
        assert_eq!(format_args("select 1", &[], &Location::Utc).unwrap(), "select 1");
    }

    #[test]
    fn test_count_placeholders() {
        assert_eq!(count_placeholders("select ? from t where x = ? and y = ?"), 3);
        assert_eq!(count_placeholders("select 1"), 0);
    }
}

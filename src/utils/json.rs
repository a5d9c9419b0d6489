use chrono::NaiveDate;
use serde_json::Value;

pub enum NullableValue {
    Omitted,
    Null,
    String(String),
}

pub fn classify_nullable(optional_value: Option<&Value>) -> Result<NullableValue, String> {
    match optional_value {
        None => Ok(NullableValue::Omitted),
        Some(Value::Null) => Ok(NullableValue::Null),
        Some(Value::String(s)) => Ok(NullableValue::String(s.to_owned())),
        Some(other) => Err(format!("expected string or null, got {other}")),
    }
}

pub enum NullableDate {
    Omitted,
    Null,
    Date(NaiveDate),
}

pub fn classify_nullable_date(optional_value: Option<&Value>) -> Result<NullableDate, String> {
    match classify_nullable(optional_value)? {
        NullableValue::Omitted => Ok(NullableDate::Omitted),
        NullableValue::Null => Ok(NullableDate::Null),
        NullableValue::String(raw) => raw
            .parse::<NaiveDate>()
            .map(NullableDate::Date)
            .map_err(|_| format!("expected YYYY-MM-DD date, got {raw}")),
    }
}

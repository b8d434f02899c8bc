//! History helper filters
//!
//! Available in spec templates and assertion macros, operating on the JSON
//! form of a history (a list of event maps).
//!
//! ```jinja
//! {% macro no_errors(actual) -%}
//!   {% for e in actual | errors %}{{ e.stmt.sql }} failed; {% endfor %}
//! {%- endmacro %}
//! ```

use minijinja::{Error, ErrorKind, Value};

fn select(history: &Value, keep: impl Fn(&Value) -> Result<bool, Error>) -> Result<Value, Error> {
    let mut events = Vec::new();
    for event in history.try_iter()? {
        if keep(&event)? {
            events.push(event);
        }
    }
    Ok(Value::from(events))
}

fn attr_str(value: &Value, path: &[&str]) -> Result<Option<String>, Error> {
    let mut current = value.clone();
    for key in path {
        current = current.get_attr(key)?;
        if current.is_undefined() || current.is_none() {
            return Ok(None);
        }
    }
    Ok(current.as_str().map(str::to_string))
}

/// `history | returned` - only returned events
pub fn returned(history: Value) -> Result<Value, Error> {
    select(&history, |event| {
        Ok(attr_str(event, &["kind"])?.as_deref() == Some("returned"))
    })
}

/// `history | errors` - returned events whose statement failed
pub fn errors(history: Value) -> Result<Value, Error> {
    select(&history, |event| {
        Ok(attr_str(event, &["result", "type"])?.as_deref() == Some("error"))
    })
}

/// `history | session("s1")` - events of one session
pub fn session(history: Value, name: &str) -> Result<Value, Error> {
    select(&history, |event| {
        Ok(attr_str(event, &["stmt", "session"])?.as_deref() == Some(name))
    })
}

/// `event | cells` - rows of a returned query event, or an error
pub fn cells(event: Value) -> Result<Value, Error> {
    let result = event.get_attr("result")?;
    if attr_str(&result, &["type"])?.as_deref() != Some("rows") {
        return Err(Error::new(
            ErrorKind::InvalidOperation,
            "cells() expects a returned query event",
        ));
    }
    result.get_attr("rows")
}

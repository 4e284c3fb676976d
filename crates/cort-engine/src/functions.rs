//! Global template functions

use minijinja::value::Rest;
use minijinja::{Error, ErrorKind, State, Value};
use std::cell::Cell;

/// Maximum recursion depth for tpl
const MAX_TPL_DEPTH: usize = 10;

thread_local! {
    /// Nesting depth of tpl calls; nested renders run on the same thread
    static TPL_DEPTH: Cell<usize> = const { Cell::new(0) };
}

fn invalid(message: impl Into<String>) -> Error {
    Error::new(ErrorKind::InvalidOperation, message.into())
}

/// Fail with a custom error message
///
/// Usage: {{ fail("replicas must be positive") }}
pub fn fail(message: String) -> Result<Value, Error> {
    Err(invalid(message))
}

/// Create a dict from key-value pairs
///
/// Usage: {{ dict("app", name, "tier", "web") }}
pub fn dict(args: Vec<Value>) -> Result<Value, Error> {
    if !args.len().is_multiple_of(2) {
        return Err(invalid(
            "dict requires an even number of arguments (key-value pairs)",
        ));
    }

    let mut map = serde_json::Map::new();
    for chunk in args.chunks(2) {
        let key = chunk[0]
            .as_str()
            .ok_or_else(|| invalid("dict keys must be strings"))?;
        let value = serde_json::to_value(&chunk[1]).map_err(|e| invalid(e.to_string()))?;
        map.insert(key.to_string(), value);
    }

    Ok(Value::from_serialize(serde_json::Value::Object(map)))
}

pub fn list(args: Vec<Value>) -> Value {
    Value::from(args)
}

/// Get a key with a default if undefined
///
/// Usage: {{ get(labels, "app", "unknown") }}
pub fn get(obj: Value, key: String, default: Option<Value>) -> Value {
    match obj.get_attr(&key) {
        Ok(v) if !v.is_undefined() => v,
        _ => default.unwrap_or(Value::UNDEFINED),
    }
}

/// Deep get along a key path, the last argument is the default
///
/// Usage: {{ dig(config, "database", "port", 5432) }}
pub fn dig(dict: Value, keys_and_default: Rest<Value>) -> Result<Value, Error> {
    let args: &[Value] = &keys_and_default;

    let Some((default, keys)) = args.split_last() else {
        return Err(invalid("dig requires at least one key and a default value"));
    };

    let mut current = dict;
    for key in keys {
        let next = match (key.as_str(), key.as_i64()) {
            (Some(k), _) => current.get_attr(k),
            (None, Some(idx)) => current.get_item(&Value::from(idx)),
            _ => return Ok(default.clone()),
        };
        match next {
            Ok(v) if !v.is_undefined() && !v.is_none() => current = v,
            _ => return Ok(default.clone()),
        }
    }

    Ok(current)
}

/// First non-empty value
///
/// Usage: {{ coalesce(override, fallback, "default") }}
pub fn coalesce(args: Vec<Value>) -> Value {
    args.into_iter()
        .find(|arg| {
            !arg.is_undefined() && !arg.is_none() && !arg.as_str().is_some_and(str::is_empty)
        })
        .unwrap_or(Value::UNDEFINED)
}

/// Usage: {{ ternary("on", "off", enabled) }}
pub fn ternary(true_val: Value, false_val: Value, condition: Value) -> Value {
    if condition.is_true() { true_val } else { false_val }
}

pub fn tostring(value: Value) -> String {
    match value.as_str() {
        Some(s) => s.to_string(),
        None => value.to_string(),
    }
}

pub fn toint(value: Value) -> Result<i64, Error> {
    if let Some(n) = value.as_i64() {
        Ok(n)
    } else if let Some(s) = value.as_str() {
        s.trim()
            .parse::<i64>()
            .map_err(|_| invalid(format!("cannot convert '{}' to int", s)))
    } else {
        Err(invalid(format!("cannot convert {} to int", value.kind())))
    }
}

/// Printf-style formatting
///
/// Usage: {{ printf("%s-%d", name, index) }}
///
/// Supports %s, %d, %v and %% specifiers.
pub fn printf(format: String, args: Vec<Value>) -> Result<String, Error> {
    let mut result = String::with_capacity(format.len() + args.len() * 10);
    let mut chars = format.chars();
    let mut args = args.iter();

    while let Some(c) = chars.next() {
        if c != '%' {
            result.push(c);
            continue;
        }

        let spec = match chars.next() {
            Some('%') => {
                result.push('%');
                continue;
            }
            Some(spec) => spec,
            None => {
                result.push('%');
                break;
            }
        };

        let arg = args
            .next()
            .ok_or_else(|| invalid("not enough arguments for format string"))?;
        match (spec, arg.as_i64()) {
            ('d', Some(n)) => result.push_str(&n.to_string()),
            _ => result.push_str(&tostring(arg.clone())),
        }
    }

    Ok(result)
}

/// Evaluate a string as a template
///
/// Usage: {{ tpl(hostTemplate, {"name": deployment_name()}) }}
///
/// Nested evaluation is limited to a depth of 10.
pub fn tpl(state: &State, template: String, context: Value) -> Result<String, Error> {
    if !template.contains("{{") && !template.contains("{%") {
        return Ok(template);
    }

    let depth = TPL_DEPTH.with(|d| {
        d.set(d.get() + 1);
        d.get()
    });

    let result = if depth > MAX_TPL_DEPTH {
        Err(invalid(format!(
            "tpl recursion depth {} exceeded maximum {}",
            depth, MAX_TPL_DEPTH
        )))
    } else {
        state.env().render_str(&template, context).map_err(|e| {
            invalid(format!(
                "tpl error (depth {}): {:#} in \"{}\"",
                depth,
                e,
                truncate_for_error(&template, 60)
            ))
        })
    };

    TPL_DEPTH.with(|d| d.set(d.get().saturating_sub(1)));
    result
}

fn truncate_for_error(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        format!("{}...", s.chars().take(max_chars).collect::<String>())
    }
}

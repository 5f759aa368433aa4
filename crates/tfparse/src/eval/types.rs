//! conversion of variable values to their declared type
use hcl::{Expression, ObjectKey, Value};

/// Convert `value` to the type constraint `constraint` where terraform would
///
/// Primitives are converted between each other (`789` to `"789"` for `string`), collections are
/// converted element-wise. Values that can not be converted are returned unchanged.
pub(crate) fn coerce(value: Value, constraint: &Expression) -> Value {
    match constraint {
        Expression::Variable(primitive) => coerce_primitive(value, primitive.as_str()),
        // legacy quoted types
        Expression::String(primitive) => coerce_primitive(value, primitive),
        Expression::TemplateExpr(template_expr) => {
            coerce_primitive(value, &template_expr.to_string())
        }
        Expression::FuncCall(func_call) => {
            let Some(element) = func_call.args.first() else {
                return value;
            };

            match (func_call.name.as_str(), value) {
                ("list" | "set", Value::Array(items)) => Value::Array(
                    items
                        .into_iter()
                        .map(|item| coerce(item, element))
                        .collect(),
                ),
                ("map", Value::Object(entries)) => Value::Object(
                    entries
                        .into_iter()
                        .map(|(key, item)| (key, coerce(item, element)))
                        .collect(),
                ),
                ("object", Value::Object(entries)) => coerce_object(entries, element),
                ("optional", value) => coerce(value, element),
                (_, value) => value,
            }
        }
        _ => value,
    }
}

fn coerce_object(mut entries: hcl::value::Map<String, Value>, attributes: &Expression) -> Value {
    let Expression::Object(attributes) = attributes else {
        return Value::Object(entries);
    };

    for (key, constraint) in attributes {
        let name = match key {
            ObjectKey::Identifier(ident) => ident.to_string(),
            ObjectKey::Expression(Expression::String(s)) => s.clone(),
            ObjectKey::Expression(Expression::Variable(variable)) => variable.to_string(),
            _ => continue,
        };

        if let Some(item) = entries.get_mut(&name) {
            *item = coerce(std::mem::replace(item, Value::Null), constraint);
        }
    }

    Value::Object(entries)
}

fn coerce_primitive(value: Value, primitive: &str) -> Value {
    match (primitive, value) {
        ("string", Value::Number(n)) => Value::String(n.to_string()),
        ("string", Value::Bool(b)) => Value::String(b.to_string()),
        ("number", Value::String(s)) => parse_number(&s).unwrap_or(Value::String(s)),
        ("bool", Value::String(s)) => match s.as_str() {
            "true" => Value::Bool(true),
            "false" => Value::Bool(false),
            _ => Value::String(s),
        },
        (_, value) => value,
    }
}

fn parse_number(s: &str) -> Option<Value> {
    let s = s.trim();
    if let Ok(n) = s.parse::<i64>() {
        return Some(Value::from(n));
    }

    s.parse::<f64>()
        .ok()
        .and_then(hcl::Number::from_f64)
        .map(Value::Number)
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    fn constraint(src: &str) -> Expression {
        let expr: hcl_edit::expr::Expression = src.parse().expect("valid type expression");
        expr.into()
    }

    #[test]
    fn primitives() {
        assert_eq!(coerce(Value::from(789i64), &constraint("string")), Value::from("789"));
        assert_eq!(coerce(Value::from(789i64), &constraint(r#""string""#)), Value::from("789"));
        assert_eq!(coerce(Value::Bool(true), &constraint("string")), Value::from("true"));
        assert_eq!(coerce(Value::from("3"), &constraint("number")), Value::from(3i64));
        assert_eq!(coerce(Value::from("false"), &constraint("bool")), Value::Bool(false));
    }

    #[test]
    fn unconvertible_values_are_kept() {
        assert_eq!(coerce(Value::from("abc"), &constraint("number")), Value::from("abc"));
        assert_eq!(coerce(Value::from("yes"), &constraint("bool")), Value::from("yes"));
        assert_eq!(coerce(Value::from(1i64), &constraint("any")), Value::from(1i64));
    }

    #[test]
    fn collections() {
        assert_eq!(
            coerce(
                Value::from(vec![Value::from(1i64), Value::Bool(true)]),
                &constraint("list(string)")
            ),
            Value::from(vec!["1", "true"])
        );

        let mut entries = hcl::value::Map::new();
        entries.insert("port".to_string(), Value::from("8080"));
        entries.insert("name".to_string(), Value::from(1i64));
        let coerced = coerce(
            Value::Object(entries),
            &constraint("object({ port = number, name = optional(string) })"),
        );

        let mut expected = hcl::value::Map::new();
        expected.insert("port".to_string(), Value::from(8080i64));
        expected.insert("name".to_string(), Value::from("1"));
        assert_eq!(coerced, Value::Object(expected));
    }
}

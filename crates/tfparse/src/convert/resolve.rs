//! attribute values, reconstructed where the evaluator gave up
use crate::eval::FunctionRegistry;
use crate::model::{BlockKind, ConfigAttribute, ConfigBlock, ConfigModule};
use crate::value::{normalize, EvaluatedValue};
use crate::visit::{traversal_path, VisitTraversals};
use hcl::eval::{Context, Evaluate};
use hcl::expr::{FuncCall, TemplateExpr};
use hcl::template::{Element, Template};
use hcl::{Expression, ObjectKey, Traversal, TraversalOperator, Value};
use serde_json::Value as Json;
use std::collections::BTreeSet;

/// Traversal roots that never name a block
const NON_BLOCK_ROOTS: &[&str] = &["var", "local", "path", "terraform", "count", "each", "self"];

pub struct AttributeResolver<'a> {
    module: &'a ConfigModule,
    functions: &'a FunctionRegistry,
}

impl<'a> AttributeResolver<'a> {
    pub fn new(module: &'a ConfigModule, functions: &'a FunctionRegistry) -> Self {
        Self { module, functions }
    }

    /// Json value of `attribute`
    ///
    /// Blocks referenced by the attribute's expression are added to `references`.
    pub fn resolve(
        &self,
        attribute: &ConfigAttribute,
        block: &ConfigBlock,
        references: &mut BTreeSet<String>,
    ) -> Json {
        self.collect_references(&attribute.expr, references);

        if matches!(block.kind, BlockKind::Variable) && attribute.name == "type" {
            return Json::String(type_name(&attribute.expr));
        }

        if !attribute.value.is_unknown() {
            if let Some(value) = normalize(&attribute.value) {
                return value;
            }
        }

        tracing::debug!(
            attribute=%attribute.name,
            block=%block.full_name,
            "value not known, reconstructing from expression"
        );

        match &attribute.expr {
            Expression::TemplateExpr(template_expr) => template_value(attribute, template_expr),
            Expression::Traversal(traversal) => {
                scope_reference(&attribute.expr, traversal).unwrap_or(Json::Null)
            }
            Expression::FuncCall(func_call) => self.function_value(func_call),
            _ if attribute.value.is_unknown() => Json::Null,
            _ => Json::String(attribute.raw.clone()),
        }
    }

    fn collect_references(&self, expr: &Expression, references: &mut BTreeSet<String>) {
        expr.visit_traversals(&mut |traversal: &Traversal| {
            if let Some(address) = reference_address(&traversal_path(traversal)) {
                references.insert(self.module.qualify(&address));
            }
        });
    }

    /// Call a function with whatever can be made of its arguments
    fn function_value(&self, func_call: &FuncCall) -> Json {
        let name = func_call.name.as_str();
        if !self.functions.contains(name) {
            tracing::debug!(function=%name, "unknown function");
            return Json::Null;
        }

        let args = func_call
            .args
            .iter()
            .map(|arg| self.argument(arg))
            .collect();

        match self.functions.call(name, args) {
            Ok(value) => normalize(&EvaluatedValue::from(value)).unwrap_or(Json::Null),
            Err(error) => {
                tracing::debug!(function=%name, %error, "function call failed");
                Json::Null
            }
        }
    }

    fn argument(&self, arg: &Expression) -> Value {
        match arg {
            Expression::Object(object) => Value::Object(
                object
                    .iter()
                    .map(|(key, value)| {
                        (
                            object_key(key),
                            constant(value).unwrap_or(Value::Null),
                        )
                    })
                    .collect(),
            ),
            Expression::Traversal(traversal) => self
                .stored_value(traversal)
                .unwrap_or_else(|| Value::Object(hcl::value::Map::new())),
            Expression::TemplateExpr(template_expr) => {
                Value::String(template_expr.to_string())
            }
            other => constant(other).unwrap_or(Value::Null),
        }
    }

    /// Value of a `var.*` or `local.*` traversal as recorded in the module
    fn stored_value(&self, traversal: &Traversal) -> Option<Value> {
        let Expression::Variable(root) = &traversal.expr else {
            return None;
        };

        let mut operators = traversal.operators.iter();
        let Some(TraversalOperator::GetAttr(name)) = operators.next() else {
            return None;
        };

        let mut value = match root.as_str() {
            "var" => self.module.variables.get(name.as_str())?,
            "local" => self.module.locals.get(name.as_str())?,
            _ => return None,
        };

        for operator in operators {
            let TraversalOperator::GetAttr(attr) = operator else {
                return None;
            };

            let EvaluatedValue::Map(entries) = value else {
                return None;
            };
            value = entries.get(attr.as_str())?;
        }

        if value.is_unknown() {
            return None;
        }

        Some(value.to_hcl_lossy())
    }
}

/// Best-effort rendering of a string template
fn template_value(attribute: &ConfigAttribute, template_expr: &TemplateExpr) -> Json {
    if !attribute.raw.is_empty() && attribute.raw != "null" {
        return Json::String(attribute.raw.clone());
    }

    let Ok(template) = Template::from_expr(template_expr) else {
        return Json::Null;
    };

    let mut parts = vec![];
    for element in template.elements() {
        match element {
            Element::Literal(literal) => parts.push(literal.clone()),
            Element::Interpolation(interpolation) => {
                interpolation
                    .expr
                    .visit_traversals(&mut |traversal: &Traversal| {
                        let path = traversal_path(traversal);
                        if !path.is_empty() {
                            parts.push(format!("${{{}}}", path.join(".")));
                        }
                    });
            }
            Element::Directive(_) => {}
        }
    }

    if parts.is_empty() {
        return Json::String(format!(
            "<template with {} parts>",
            template.elements().len()
        ));
    }

    Json::String(parts.concat())
}

/// `{__attribute__, __type__, __name__, __ref__}` for a traversal into another block
fn scope_reference(expr: &Expression, traversal: &Traversal) -> Option<Json> {
    let path = traversal_path(traversal);
    if path.len() < 2 {
        return None;
    }

    let mut object = serde_json::Map::new();
    object.insert(
        "__attribute__".to_string(),
        Json::String(crate::eval::expression_source(expr)),
    );

    let path = match path.split_first() {
        Some((first, rest)) if first == "data" => rest,
        _ => path.as_slice(),
    };

    match path {
        [resource_type, name, _, ..] => {
            object.insert("__type__".to_string(), Json::String(resource_type.clone()));
            object.insert("__name__".to_string(), Json::String(name.clone()));
            object.insert(
                "__ref__".to_string(),
                Json::String(format!("{resource_type}.{name}")),
            );
        }
        [_, name] => {
            object.insert("__name__".to_string(), Json::String(name.clone()));
        }
        _ => {}
    }

    Some(Json::Object(object))
}

/// Address of the block a traversal points into
///
/// `aws_vpc.main.id` -> `aws_vpc.main`, `data.aws_region.current.name` -> `data.aws_region.current`,
/// `module.network.vpc_id` -> `module.network`
fn reference_address(path: &[String]) -> Option<String> {
    match path {
        [root, ..] if NON_BLOCK_ROOTS.contains(&root.as_str()) => None,
        [data, resource_type, name, ..] if data == "data" => {
            Some(format!("data.{resource_type}.{name}"))
        }
        [data, ..] if data == "data" => None,
        [module, name, ..] if module == "module" => Some(format!("module.{name}")),
        [resource_type, name, ..] => Some(format!("{resource_type}.{name}")),
        _ => None,
    }
}

/// Type constraint of a `variable` in its source notation
fn type_name(expr: &Expression) -> String {
    match expr {
        Expression::Variable(variable) => variable.as_str().to_string(),
        // legacy quoted types
        Expression::String(s) => s.clone(),
        Expression::TemplateExpr(template_expr) => template_expr.to_string(),
        Expression::FuncCall(func_call) => {
            let args: Vec<_> = func_call.args.iter().map(type_name).collect();
            format!("{}({})", func_call.name, args.join(","))
        }
        Expression::Array(items) => {
            let items: Vec<_> = items.iter().map(type_name).collect();
            format!("[{}]", items.join(","))
        }
        Expression::Object(object) => {
            let entries: Vec<_> = object
                .iter()
                .map(|(key, value)| format!("{}={}", object_key(key), type_name(value)))
                .collect();
            format!("{{{}}}", entries.join(","))
        }
        other => crate::eval::expression_source(other),
    }
}

fn object_key(key: &ObjectKey) -> String {
    match key {
        ObjectKey::Expression(Expression::String(s)) => s.clone(),
        other => other.to_string(),
    }
}

/// Value of an expression that does not depend on anything
fn constant(expr: &Expression) -> Option<Value> {
    expr.evaluate(&Context::new()).ok()
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::model::SourceRange;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn parse_expr(src: &str) -> Expression {
        let expr: hcl_edit::expr::Expression = src.parse().expect("valid expression");
        expr.into()
    }

    fn attribute(name: &str, src: &str, value: EvaluatedValue, raw: &str) -> ConfigAttribute {
        ConfigAttribute::new(name.to_string(), value, parse_expr(src), raw.to_string())
    }

    fn resource() -> ConfigBlock {
        ConfigBlock::new(
            BlockKind::Resource,
            vec!["aws_iam_role".into(), "admin".into()],
            SourceRange::new("main.tf".into(), 1, 3),
        )
    }

    fn module() -> ConfigModule {
        let mut module = ConfigModule::new(vec![], vec![]);
        module.locals.insert(
            "tags".into(),
            EvaluatedValue::Map([("Environment".to_string(), "sandbox".into())].into_iter().collect()),
        );
        module
    }

    fn resolve(attribute: &ConfigAttribute) -> (Json, BTreeSet<String>) {
        let module = module();
        let functions = FunctionRegistry::builtin();
        let resolver = AttributeResolver::new(&module, &functions);
        let mut references = BTreeSet::new();
        let value = resolver.resolve(attribute, &resource(), &mut references);
        (value, references)
    }

    #[test]
    fn known_values_are_normalized() {
        let (value, references) = resolve(&attribute(
            "max_session_duration",
            "3600",
            EvaluatedValue::Number(3600.0),
            "3600",
        ));

        assert_eq!(value, json!(3600));
        assert!(references.is_empty());
    }

    #[test]
    fn direct_reference_to_data_source() {
        let (value, references) = resolve(&attribute(
            "permissions_boundary",
            "data.aws_caller_identity.current.account_id",
            EvaluatedValue::Unknown,
            "data.aws_caller_identity.current.account_id",
        ));

        assert_eq!(
            value,
            json!({
                "__attribute__": "data.aws_caller_identity.current.account_id",
                "__type__": "aws_caller_identity",
                "__name__": "current",
                "__ref__": "aws_caller_identity.current",
            })
        );
        assert_eq!(
            references,
            BTreeSet::from(["data.aws_caller_identity.current".to_string()])
        );
    }

    #[test]
    fn two_segment_reference() {
        let (value, references) = resolve(&attribute(
            "tags",
            "var.additional_tags",
            EvaluatedValue::Unknown,
            "var.additional_tags",
        ));

        assert_eq!(
            value,
            json!({"__attribute__": "var.additional_tags", "__name__": "additional_tags"})
        );
        assert!(references.is_empty());
    }

    #[test]
    fn template_uses_raw_rendering() {
        let raw = "arn:aws:iam::${data.aws_caller_identity.current.account_id}:policy/Boundary";
        let (value, _) = resolve(&attribute(
            "policy",
            r#""arn:aws:iam::${data.aws_caller_identity.current.account_id}:policy/Boundary""#,
            EvaluatedValue::Unknown,
            raw,
        ));

        assert_eq!(value, json!(raw));
    }

    #[test]
    fn template_reconstructed_without_raw() {
        let (value, _) = resolve(&attribute(
            "name",
            r#""${aws_s3_bucket.logs.bucket}-replica""#,
            EvaluatedValue::Unknown,
            "",
        ));

        assert_eq!(value, json!("${aws_s3_bucket.logs.bucket}-replica"));
    }

    #[test]
    fn template_without_renderable_parts() {
        let src = r#""%{ if var.enabled }on%{ endif }""#;
        let Expression::TemplateExpr(template_expr) = parse_expr(src) else {
            panic!("quoted template expected");
        };
        let elements = Template::from_expr(&template_expr)
            .expect("valid template")
            .elements()
            .len();

        let (value, _) = resolve(&attribute("state", src, EvaluatedValue::Unknown, ""));

        assert_eq!(value, json!(format!("<template with {elements} parts>")));
    }

    #[test]
    fn function_call_with_unknown_arguments() {
        let (value, references) = resolve(&attribute(
            "tags",
            "merge(local.tags, { ApplyTimeVal = aws_db_instance.main.arn })",
            EvaluatedValue::Unknown,
            "",
        ));

        assert_eq!(
            value,
            json!({"Environment": "sandbox", "ApplyTimeVal": null})
        );
        assert_eq!(
            references,
            BTreeSet::from(["aws_db_instance.main".to_string()])
        );
    }

    #[test]
    fn unknown_variable_becomes_empty_object() {
        let (value, _) = resolve(&attribute(
            "tags",
            r#"merge(var.missing, { Name = "x" })"#,
            EvaluatedValue::Unknown,
            "",
        ));

        assert_eq!(value, json!({"Name": "x"}));
    }

    #[test]
    fn unknown_function() {
        let (value, _) = resolve(&attribute(
            "policy",
            "jsonencode(local.tags)",
            EvaluatedValue::Unknown,
            "",
        ));

        assert_eq!(value, Json::Null);
    }

    #[test]
    fn other_unknown_shapes_are_null() {
        let (value, references) = resolve(&attribute(
            "enabled",
            "aws_s3_bucket.logs.versioning ? true : false",
            EvaluatedValue::Unknown,
            "aws_s3_bucket.logs.versioning ? true : false",
        ));

        assert_eq!(value, Json::Null);
        assert_eq!(references, BTreeSet::from(["aws_s3_bucket.logs".to_string()]));
    }

    #[test]
    fn variable_type_names() {
        let module = module();
        let functions = FunctionRegistry::builtin();
        let resolver = AttributeResolver::new(&module, &functions);
        let variable = ConfigBlock::new(
            BlockKind::Variable,
            vec!["subnets".into()],
            SourceRange::new("variables.tf".into(), 1, 3),
        );

        let type_of = |src: &str| {
            resolver.resolve(
                &attribute("type", src, EvaluatedValue::Unknown, src),
                &variable,
                &mut BTreeSet::new(),
            )
        };

        assert_eq!(type_of("string"), json!("string"));
        assert_eq!(type_of("list(string)"), json!("list(string)"));
        assert_eq!(type_of("map(object({ name = string }))"), json!("map(object({name=string}))"));
        assert_eq!(type_of(r#""string""#), json!("string"));
    }

    #[test]
    fn references_are_module_qualified() {
        let module = ConfigModule::new(vec!["network".into()], vec![]);
        let functions = FunctionRegistry::builtin();
        let resolver = AttributeResolver::new(&module, &functions);
        let mut references = BTreeSet::new();

        resolver.resolve(
            &attribute(
                "vpc_id",
                "aws_vpc.main.id",
                EvaluatedValue::String("x".into()),
                "x",
            ),
            &resource(),
            &mut references,
        );

        assert_eq!(
            references,
            BTreeSet::from(["module.network.aws_vpc.main".to_string()])
        );
    }
}

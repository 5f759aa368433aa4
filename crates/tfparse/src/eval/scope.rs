//! names visible to expressions while evaluating a module
use super::functions::{value_to_string, FunctionRegistry};
use crate::value::EvaluatedValue;
use hcl::eval::{Context, Evaluate};
use hcl::template::{Element, Template};
use hcl::{Expression, ObjectKey, Value};

type Map = hcl::value::Map<String, Value>;

/// Everything an expression inside a module can refer to
#[derive(Debug, Clone, Default)]
pub(crate) struct Scope {
    /// `var.*`
    pub vars: Map,
    /// `local.*`
    pub locals: Map,
    /// `<type>.<name>`
    pub resources: Map,
    /// `data.<type>.<name>`
    pub data: Map,
    /// `module.<name>.<output>`
    pub modules: Map,
    /// `path.*`
    pub path: Map,
    /// `terraform.*`
    pub terraform: Map,
    /// `count`, `each` and dynamic block iterators
    pub iteration: Map,
}

impl Scope {
    pub fn new(workspace: &str, path_module: &str, path_cwd: &str) -> Self {
        let mut scope = Scope::default();
        scope.path.insert("module".into(), path_module.into());
        scope.path.insert("root".into(), ".".into());
        scope.path.insert("cwd".into(), path_cwd.into());
        scope.terraform.insert("workspace".into(), workspace.into());
        scope
    }

    /// A copy of this scope with an additional iteration variable
    pub fn with_iteration(&self, name: &str, value: Value) -> Scope {
        let mut scope = self.clone();
        scope.iteration.insert(name.to_string(), value);
        scope
    }

    pub fn context(&self, functions: &FunctionRegistry) -> Context<'static> {
        let mut context = Context::new();
        functions.declare_into(&mut context);

        // resource types are declared first so that reserved names always win
        for (resource_type, instances) in &self.resources {
            context.declare_var(resource_type.as_str(), instances.clone());
        }

        context.declare_var("var", Value::Object(self.vars.clone()));
        context.declare_var("local", Value::Object(self.locals.clone()));
        context.declare_var("data", Value::Object(self.data.clone()));
        context.declare_var("module", Value::Object(self.modules.clone()));
        context.declare_var("path", Value::Object(self.path.clone()));
        context.declare_var("terraform", Value::Object(self.terraform.clone()));

        for (name, value) in &self.iteration {
            context.declare_var(name.as_str(), value.clone());
        }

        context
    }
}

/// Evaluate as much of an expression as possible
///
/// Objects and lists keep the entries that could be evaluated, everything else that fails to
/// evaluate becomes [EvaluatedValue::Unknown].
pub(crate) fn evaluate_partial(expr: &Expression, context: &Context) -> EvaluatedValue {
    match expr.evaluate(context) {
        Ok(value) => value.into(),
        Err(errors) => {
            tracing::trace!(%errors, "expression not fully evaluated");

            match expr {
                Expression::Object(object) => EvaluatedValue::Map(
                    object
                        .iter()
                        .map(|(key, value)| {
                            (object_key_name(key, context), evaluate_partial(value, context))
                        })
                        .collect(),
                ),
                Expression::Array(items) => EvaluatedValue::List(
                    items
                        .iter()
                        .map(|item| evaluate_partial(item, context))
                        .collect(),
                ),
                Expression::Parenthesis(inner) => evaluate_partial(inner, context),
                _ => EvaluatedValue::Unknown,
            }
        }
    }
}

/// Name of an object key, evaluating it if it is an expression
pub(crate) fn object_key_name(key: &ObjectKey, context: &Context) -> String {
    match key {
        ObjectKey::Identifier(ident) => ident.to_string(),
        ObjectKey::Expression(Expression::String(s)) => s.clone(),
        ObjectKey::Expression(expr) => match expr.evaluate(context) {
            Ok(Value::String(s)) => s,
            _ => expression_source(expr),
        },
        #[allow(unreachable_patterns)]
        other => other.to_string(),
    }
}

/// HCL source form of an expression
pub(crate) fn expression_source(expr: &Expression) -> String {
    hcl::format::to_string(expr).unwrap_or_default()
}

/// Best-effort textual rendering of an expression
///
/// Templates get every interpolation that can be evaluated substituted, the others are kept as
/// `${...}`. Any other expression is rendered in its source form.
pub(crate) fn render_raw(expr: &Expression, context: &Context) -> String {
    let Expression::TemplateExpr(template_expr) = expr else {
        return expression_source(expr);
    };

    let Ok(template) = Template::from_expr(template_expr) else {
        return template_expr.to_string();
    };

    let mut rendered = String::new();
    for element in template.elements() {
        match element {
            Element::Literal(literal) => rendered.push_str(literal),
            Element::Interpolation(interpolation) => {
                let value = interpolation
                    .expr
                    .evaluate(context)
                    .ok()
                    .and_then(|value| value_to_string(&value));

                match value {
                    Some(value) => rendered.push_str(&value),
                    None => {
                        rendered.push_str("${");
                        rendered.push_str(&expression_source(&interpolation.expr));
                        rendered.push('}');
                    }
                }
            }
            // directives are kept verbatim
            Element::Directive(_) => return template_expr.to_string(),
        }
    }

    rendered
}

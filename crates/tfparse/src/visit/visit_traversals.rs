use super::Visit;
use hcl::{
    template::{Directive, Element},
    Expression, Operation, Template, Traversal, TraversalOperator,
};

/// Recursively visit all [hcl::Traversal]s
pub trait VisitTraversals {
    fn visit_traversals(&self, visitor: &mut dyn Visit<Traversal>);
}

impl VisitTraversals for Expression {
    fn visit_traversals(&self, visitor: &mut dyn Visit<Traversal>) {
        match self {
            Expression::Variable(variable) => {
                // a standalone variable is a traversal with no operators...kind of
                let traversal = Traversal::new(
                    Expression::Variable(variable.clone()),
                    Vec::<TraversalOperator>::new(),
                );
                visitor.visit(&traversal);
            }
            Expression::Traversal(traversal) => {
                visitor.visit(traversal);
                // the root variable is part of this traversal already
                if !matches!(traversal.expr, Expression::Variable(_)) {
                    traversal.expr.visit_traversals(visitor);
                }
                for operator in &traversal.operators {
                    if let TraversalOperator::Index(index) = operator {
                        index.visit_traversals(visitor);
                    }
                }
            }
            Expression::Array(array) => {
                for expr in array {
                    expr.visit_traversals(visitor);
                }
            }
            Expression::Object(object) => {
                for value in object.values() {
                    value.visit_traversals(visitor);
                }
            }
            Expression::TemplateExpr(template_expr) => {
                match Template::from_expr(template_expr) {
                    Ok(template) => template.visit_traversals(visitor),
                    Err(err) => tracing::trace!(%err, "unparsable template"),
                }
            }
            Expression::FuncCall(func_call) => {
                for arg in &func_call.args {
                    arg.visit_traversals(visitor);
                }
            }
            Expression::Parenthesis(expr) => {
                expr.visit_traversals(visitor);
            }
            Expression::Conditional(cond) => {
                cond.cond_expr.visit_traversals(visitor);
                cond.true_expr.visit_traversals(visitor);
                cond.false_expr.visit_traversals(visitor);
            }
            Expression::Operation(operation) => match operation.as_ref() {
                Operation::Binary(binop) => {
                    binop.lhs_expr.visit_traversals(visitor);
                    binop.rhs_expr.visit_traversals(visitor);
                }
                Operation::Unary(unop) => {
                    unop.expr.visit_traversals(visitor);
                }
            },
            Expression::ForExpr(forexpr) => {
                forexpr.collection_expr.visit_traversals(visitor);
                forexpr
                    .key_expr
                    .iter()
                    .for_each(|e| e.visit_traversals(visitor));
                forexpr.value_expr.visit_traversals(visitor);
                forexpr
                    .cond_expr
                    .iter()
                    .for_each(|e| e.visit_traversals(visitor));
            }
            _ => {}
        }
    }
}

impl VisitTraversals for Template {
    fn visit_traversals(&self, visitor: &mut dyn Visit<Traversal>) {
        for element in self.elements() {
            match element {
                Element::Interpolation(interpolation) => {
                    interpolation.expr.visit_traversals(visitor);
                }
                Element::Directive(directive) => match directive {
                    Directive::If(ifdir) => {
                        ifdir.cond_expr.visit_traversals(visitor);
                        ifdir.true_template.visit_traversals(visitor);
                        ifdir
                            .false_template
                            .iter()
                            .for_each(|t| t.visit_traversals(visitor));
                    }
                    Directive::For(fordir) => {
                        fordir.collection_expr.visit_traversals(visitor);
                        fordir.template.visit_traversals(visitor);
                    }
                },
                Element::Literal(_) => {}
            }
        }
    }
}

/// Root variable and the leading `.attr` names of a traversal
///
/// `aws_s3_bucket.logs[0].arn` yields `["aws_s3_bucket", "logs"]`.
pub fn traversal_path(traversal: &Traversal) -> Vec<String> {
    let Expression::Variable(var) = &traversal.expr else {
        return vec![];
    };

    let mut path = vec![var.as_str().to_string()];
    for operator in &traversal.operators {
        let TraversalOperator::GetAttr(ident) = operator else {
            break;
        };

        path.push(ident.as_str().to_string());
    }

    path
}

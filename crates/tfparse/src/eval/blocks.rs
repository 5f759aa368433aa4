//! materialization of hcl blocks into [ConfigBlock]s
use super::functions::FunctionRegistry;
use super::scope::{evaluate_partial, render_raw, Scope};
use crate::hcl_documents::Source;
use crate::model::{BlockKind, ConfigAttribute, ConfigBlock, SourceRange};
use hcl::eval::{Context, Evaluate};
use hcl::{Expression, Value};
use hcl_edit::structure::{Block, Body, Structure};

/// Key of a single `count` or `for_each` instance
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum InstanceKey {
    Index(usize),
    Key(String),
}

impl InstanceKey {
    fn suffix(&self) -> String {
        match self {
            InstanceKey::Index(index) => format!("[{index}]"),
            InstanceKey::Key(key) => format!("[{key:?}]"),
        }
    }
}

/// One instance of a root block together with the scope its body is evaluated in
#[derive(Debug, Clone)]
pub(crate) struct Instance {
    pub key: Option<InstanceKey>,
    pub scope: Scope,
}

pub(crate) struct BlockBuilder<'a> {
    pub functions: &'a FunctionRegistry,
    /// `module.a.module.b`, empty for the root module
    pub address_prefix: String,
}

impl BlockBuilder<'_> {
    /// Instances of a root block as requested by its `count` or `for_each` meta-argument
    ///
    /// A meta-argument that can not be evaluated yields a single instance without key.
    pub fn instances(&self, block: &Block, scope: &Scope) -> Vec<Instance> {
        let context = scope.context(self.functions);

        if let Some(count) = attribute_expr(&block.body, "count") {
            match count.evaluate(&context) {
                Ok(Value::Number(count)) => {
                    let count = count.as_f64().unwrap_or_default().max(0.0) as usize;
                    return (0..count)
                        .map(|index| {
                            let mut object = hcl::value::Map::new();
                            object.insert("index".to_string(), Value::from(index as i64));
                            Instance {
                                key: Some(InstanceKey::Index(index)),
                                scope: scope.with_iteration("count", Value::Object(object)),
                            }
                        })
                        .collect();
                }
                Ok(other) => tracing::debug!(?other, "count is not a number"),
                Err(errors) => tracing::debug!(%errors, "count not known"),
            }
        }

        if let Some(for_each) = attribute_expr(&block.body, "for_each") {
            match for_each.evaluate(&context) {
                Ok(value) => {
                    if let Some(items) = iteration_items(&value) {
                        return items
                            .into_iter()
                            .map(|(key, value)| {
                                // sets of strings are keyed by their elements
                                let key = match (&value, key) {
                                    (Value::String(s), Value::Number(_)) => s.clone(),
                                    (_, key) => super::functions::value_to_string(&key)
                                        .unwrap_or_default(),
                                };

                                Instance {
                                    key: Some(InstanceKey::Key(key.clone())),
                                    scope: scope
                                        .with_iteration("each", iterator_object(key.into(), value)),
                                }
                            })
                            .collect();
                    }
                    tracing::debug!(?value, "for_each is not a collection");
                }
                Err(errors) => tracing::debug!(%errors, "for_each not known"),
            }
        }

        vec![Instance {
            key: None,
            scope: scope.clone(),
        }]
    }

    /// Materialize one instance of a root block
    pub fn root_block(
        &self,
        source: &Source,
        block: &Block,
        kind: BlockKind,
        instance: &Instance,
    ) -> ConfigBlock {
        let labels = labels_of(block);
        let range = range_of(source, block);

        let address = kind.descriptor(&labels);
        let descriptor = match &instance.key {
            Some(key) => format!("{address}{}", key.suffix()),
            None => address.clone(),
        };

        let seed = format!(
            "{}|{}|{}",
            qualify(&self.address_prefix, &descriptor),
            range.filename,
            range.start_line
        );

        let mut config_block = ConfigBlock::new(kind, labels, range)
            .with_id(block_id(&seed))
            .with_descriptor(descriptor)
            .with_full_name(qualify(&self.address_prefix, &address));

        let context = instance.scope.context(self.functions);
        self.fill_body(&mut config_block, source, &block.body, &instance.scope, &context, &seed);

        config_block
    }

    fn fill_body(
        &self,
        target: &mut ConfigBlock,
        source: &Source,
        body: &Body,
        scope: &Scope,
        context: &Context,
        seed: &str,
    ) {
        let parent_kind = target.kind.clone();
        let parent_full_name = target.full_name.clone();

        for (position, structure) in body.iter().enumerate() {
            match structure {
                Structure::Attribute(attribute) => {
                    target.attributes.push(self.attribute(
                        attribute.key.value().as_str(),
                        attribute.value.clone().into(),
                        context,
                    ));
                }
                Structure::Block(block) => {
                    let ident = block.ident.value().as_str();
                    let seed = format!("{seed}/{ident}#{position}");

                    match BlockKind::nested(ident, &parent_kind) {
                        BlockKind::Template => target.children.extend(self.template_blocks(
                            source,
                            block,
                            &parent_full_name,
                            scope,
                            context,
                            &seed,
                        )),
                        kind => target.children.push(self.nested_block(
                            source,
                            block,
                            kind,
                            &parent_full_name,
                            scope,
                            context,
                            &seed,
                        )),
                    }
                }
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn nested_block(
        &self,
        source: &Source,
        block: &Block,
        kind: BlockKind,
        parent_full_name: &str,
        scope: &Scope,
        context: &Context,
        seed: &str,
    ) -> ConfigBlock {
        let labels = labels_of(block);
        let full_name = format!("{parent_full_name}.{}", kind.descriptor(&labels));

        let mut child = ConfigBlock::new(kind, labels, range_of(source, block))
            .with_id(block_id(seed))
            .with_full_name(full_name);

        self.fill_body(&mut child, source, &block.body, scope, context, seed);
        child
    }

    /// Expand a `dynamic` block
    ///
    /// Yields the template itself (with its `content` as only child) followed by one generated
    /// block per element of `for_each`.
    fn template_blocks(
        &self,
        source: &Source,
        block: &Block,
        parent_full_name: &str,
        scope: &Scope,
        context: &Context,
        seed: &str,
    ) -> Vec<ConfigBlock> {
        let labels = labels_of(block);
        let Some(name) = labels.first().cloned() else {
            tracing::warn!(filename=%source.filename, "dynamic block without label");
            return vec![];
        };

        let content = block.body.iter().find_map(|structure| match structure {
            Structure::Block(block) if block.ident.value().as_str() == "content" => Some(block),
            _ => None,
        });

        let iterator = match attribute_expr(&block.body, "iterator") {
            Some(Expression::Variable(variable)) => variable.as_str().to_string(),
            _ => name.clone(),
        };

        let items = attribute_expr(&block.body, "for_each")
            .and_then(|expr| expr.evaluate(context).ok())
            .and_then(|value| iteration_items(&value));

        let mut template = ConfigBlock::new(BlockKind::Template, labels, range_of(source, block))
            .with_id(block_id(seed))
            .with_full_name(format!("{parent_full_name}.dynamic.{name}"))
            .with_repetitions(items.as_ref().map_or(0, Vec::len));

        for attribute in block.body.attributes() {
            template.attributes.push(self.attribute(
                attribute.key.value().as_str(),
                attribute.value.clone().into(),
                context,
            ));
        }

        let Some(content) = content else {
            tracing::debug!(%name, "dynamic block without content");
            return vec![template];
        };

        let template_full_name = template.full_name.clone();
        template.children.push(self.nested_block(
            source,
            content,
            BlockKind::TemplateBody,
            &template_full_name,
            scope,
            context,
            &format!("{seed}/content"),
        ));

        let mut generated = vec![template];
        for (index, (key, value)) in items.into_iter().flatten().enumerate() {
            let scope = scope.with_iteration(&iterator, iterator_object(key, value));
            let context = scope.context(self.functions);
            let seed = format!("{seed}[{index}]");

            let mut copy = ConfigBlock::new(
                BlockKind::Nested(name.clone()),
                vec![],
                range_of(source, content),
            )
            .with_id(block_id(&seed))
            .with_descriptor(format!("dynamic.{name}"))
            .with_full_name(format!("{parent_full_name}.{name}"));

            self.fill_body(&mut copy, source, &content.body, &scope, &context, &seed);
            generated.push(copy);
        }

        generated
    }

    fn attribute(&self, name: &str, expr: Expression, context: &Context) -> ConfigAttribute {
        let value = evaluate_partial(&expr, context);
        let raw = render_raw(&expr, context);
        ConfigAttribute::new(name.to_string(), value, expr, raw)
    }
}

/// The value a block is visible as to other expressions (`aws_vpc.main`)
///
/// Only known attributes are included. Nested blocks become lists of objects and `id` defaults
/// to the block id.
pub(crate) fn block_value(block: &ConfigBlock) -> Value {
    let mut object = hcl::value::Map::new();

    for attribute in &block.attributes {
        if let Some(value) = attribute.value.to_hcl() {
            object.insert(attribute.name.clone(), value);
        }
    }

    for child in &block.children {
        if matches!(child.kind, BlockKind::Template | BlockKind::TemplateBody) {
            continue;
        }

        let entry = object
            .entry(child.kind.as_str().to_string())
            .or_insert_with(|| Value::Array(vec![]));
        if let Value::Array(items) = entry {
            items.push(block_value(child));
        }
    }

    if !block.id.is_empty() {
        object
            .entry("id".to_string())
            .or_insert_with(|| Value::from(block.id.clone()));
    }

    Value::Object(object)
}

/// Expression of a direct attribute of `body`
pub(crate) fn attribute_expr(body: &Body, name: &str) -> Option<Expression> {
    body.attributes()
        .find(|attribute| attribute.key.value().as_str() == name)
        .map(|attribute| attribute.value.clone().into())
}

pub(crate) fn labels_of(block: &Block) -> Vec<String> {
    block
        .labels
        .iter()
        .map(|label| label.as_str().to_string())
        .collect()
}

fn range_of(source: &Source, block: &Block) -> SourceRange {
    let (start_line, end_line) = source.line_range(block);
    SourceRange::new(source.filename.clone(), start_line, end_line)
}

/// Key/value pairs of a collection: object entries or list elements by index
fn iteration_items(value: &Value) -> Option<Vec<(Value, Value)>> {
    match value {
        Value::Object(object) => Some(
            object
                .iter()
                .map(|(key, value)| (Value::from(key.clone()), value.clone()))
                .collect(),
        ),
        Value::Array(items) => Some(
            items
                .iter()
                .enumerate()
                .map(|(index, value)| (Value::from(index as i64), value.clone()))
                .collect(),
        ),
        _ => None,
    }
}

/// `{ key = ..., value = ... }` as bound to `each` and dynamic block iterators
fn iterator_object(key: Value, value: Value) -> Value {
    let mut object = hcl::value::Map::new();
    object.insert("key".to_string(), key);
    object.insert("value".to_string(), value);
    Value::Object(object)
}

pub(crate) fn qualify(prefix: &str, address: &str) -> String {
    if prefix.is_empty() {
        address.to_string()
    } else {
        format!("{prefix}.{address}")
    }
}

/// Deterministic block id
fn block_id(seed: &str) -> String {
    uuid::Uuid::new_v5(&uuid::Uuid::NAMESPACE_URL, seed.as_bytes()).to_string()
}

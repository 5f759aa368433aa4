//! evaluation of a single module directory and its module calls
use super::blocks::{attribute_expr, block_value, labels_of, BlockBuilder, Instance, InstanceKey};
use super::functions::FunctionRegistry;
use super::scope::{evaluate_partial, Scope};
use super::types::coerce;
use super::EvaluationError;
use crate::hcl_documents::{HclDocuments, Source};
use crate::model::{BlockKind, ConfigBlock, ConfigModule};
use crate::options::Options;
use crate::value::EvaluatedValue;
use crate::visit::{traversal_path, VisitTraversals};
use hcl::eval::Evaluate;
use hcl::{Traversal, Value};
use hcl_edit::structure::Block;
use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};

type Map = hcl::value::Map<String, Value>;

/// Deepest module call chain that is followed
const MAX_MODULE_DEPTH: usize = 16;

/// Module call arguments that are not input variables
const MODULE_META_ARGUMENTS: &[&str] = &[
    "source",
    "version",
    "providers",
    "count",
    "for_each",
    "depends_on",
];

/// Variable values of the root module: `terraform.tfvars`, `*.auto.tfvars`, then `vars_paths`
pub(crate) fn root_variables(root: &Path, options: &Options) -> Result<Map, EvaluationError> {
    let mut files = vec![];

    let default_file = root.join("terraform.tfvars");
    if default_file.is_file() {
        files.push(default_file);
    }

    let read_dir = std::fs::read_dir(root).map_err(|source| EvaluationError::Io {
        path: root.to_path_buf(),
        source,
    })?;

    let mut auto_files = vec![];
    for dir_entry in read_dir.flatten() {
        if dir_entry
            .file_name()
            .to_string_lossy()
            .ends_with(".auto.tfvars")
        {
            auto_files.push(dir_entry.path());
        }
    }
    auto_files.sort();
    files.extend(auto_files);

    files.extend(options.vars_paths.iter().map(|path| root.join(path)));

    let mut variables = Map::new();
    for path in files {
        tracing::debug!(path=%path.display(), "loading variables");

        let text = std::fs::read_to_string(&path).map_err(|source| EvaluationError::Io {
            path: path.clone(),
            source,
        })?;

        let values: Map = hcl::from_str(&text)
            .map_err(|source| EvaluationError::TfVars { path, source })?;
        variables.extend(values);
    }

    Ok(variables)
}

/// `.terraform/modules/modules.json`, written by `terraform init`
#[derive(Debug, Default, serde::Deserialize)]
pub(crate) struct ModuleManifest {
    #[serde(rename = "Modules", default)]
    modules: Vec<ManifestEntry>,
}

#[derive(Debug, serde::Deserialize)]
struct ManifestEntry {
    #[serde(rename = "Key")]
    key: String,
    #[serde(rename = "Dir")]
    dir: String,
}

impl ModuleManifest {
    pub fn load(root: &Path) -> Result<Self, EvaluationError> {
        let path = root.join(".terraform").join("modules").join("modules.json");
        if !path.is_file() {
            return Ok(Self::default());
        }

        let text = std::fs::read_to_string(&path).map_err(|source| EvaluationError::Io {
            path: path.clone(),
            source,
        })?;

        serde_json::from_str(&text).map_err(|source| EvaluationError::ModuleManifest { path, source })
    }

    /// Installed directory of the module call at `module_path`
    fn directory(&self, root: &Path, module_path: &[String]) -> Option<PathBuf> {
        let key = module_path.join(".");
        self.modules
            .iter()
            .find(|entry| entry.key == key)
            .map(|entry| root.join(&entry.dir))
    }
}

pub(crate) struct ModuleEvaluator<'a> {
    pub root: &'a Path,
    pub options: &'a Options,
    pub functions: &'a FunctionRegistry,
    pub manifest: &'a ModuleManifest,
}

impl ModuleEvaluator<'_> {
    /// Evaluate the module in `directory` and all modules it calls
    ///
    /// The evaluated module is pushed to `modules` before its children. Returns the values of the
    /// module's outputs.
    #[tracing::instrument(skip_all, fields(module=%module_path.join(".")))]
    pub fn evaluate(
        &self,
        directory: &Path,
        module_path: Vec<String>,
        inputs: Map,
        modules: &mut Vec<ConfigModule>,
    ) -> Result<Map, EvaluationError> {
        let mut documents = HclDocuments::default();
        documents.load_directory(directory, self.root, self.options.stop_on_hcl_error)?;

        for (source, attribute) in documents.attributes() {
            tracing::warn!(
                filename=%source.filename,
                name=%attribute.key.value().as_str(),
                "ignoring attribute outside of a block"
            );
        }

        let path_module = match directory.strip_prefix(self.root) {
            Ok(relative) if relative.as_os_str().is_empty() => ".".to_string(),
            Ok(relative) => relative.to_string_lossy().into_owned(),
            Err(_) => directory.to_string_lossy().into_owned(),
        };

        let mut scope = Scope::new(
            &self.options.workspace_name,
            &path_module,
            &self.root.to_string_lossy(),
        );

        let builder = BlockBuilder {
            functions: self.functions,
            address_prefix: ConfigModule::new(module_path.clone(), vec![]).address_prefix(),
        };

        self.declare_variables(&documents, inputs, &mut scope);
        self.refresh(&documents, &builder, &mut scope);

        let index = modules.len();
        modules.push(ConfigModule::default());

        for (name, block) in call_order(&documents) {
            if let Some(outputs) = self.evaluate_call(directory, &module_path, &name, block, &scope, modules)? {
                scope.modules.insert(name, Value::Object(outputs));
                // arguments of the next call may read locals built from these outputs
                self.refresh(&documents, &builder, &mut scope);
            }
        }

        let blocks = materialize(&documents, &builder, &scope);
        let outputs = outputs(&documents, &scope, self.functions);

        let mut module = ConfigModule::new(module_path, blocks);
        module.variables = scope
            .vars
            .iter()
            .map(|(name, value)| (name.clone(), EvaluatedValue::from(value.clone())))
            .collect();
        module.locals = local_values(&documents, &scope, self.functions);

        modules[index] = module;
        Ok(outputs)
    }

    fn declare_variables(&self, documents: &HclDocuments, mut inputs: Map, scope: &mut Scope) {
        let context = scope.context(self.functions);

        for (_, block) in documents.blocks() {
            if block.ident.value().as_str() != "variable" {
                continue;
            }

            let Some(name) = labels_of(block).into_iter().next() else {
                continue;
            };

            let constraint = attribute_expr(&block.body, "type");
            let coerce_declared = |value: Value| match &constraint {
                Some(constraint) => coerce(value, constraint),
                None => value,
            };

            if let Some(value) = inputs.shift_remove(&name) {
                scope.vars.insert(name, coerce_declared(value));
                continue;
            }

            let default = attribute_expr(&block.body, "default").map(|expr| expr.evaluate(&context));
            match default {
                Some(Ok(value)) => {
                    scope.vars.insert(name, coerce_declared(value));
                }
                Some(Err(errors)) => tracing::debug!(%name, %errors, "variable default not known"),
                None => tracing::debug!(%name, "variable without value"),
            }
        }

        for name in inputs.keys() {
            tracing::debug!(%name, "value for undeclared variable");
        }
    }

    /// Re-evaluate locals, resources and data sources with what is currently known
    fn refresh(&self, documents: &HclDocuments, builder: &BlockBuilder, scope: &mut Scope) {
        // a resource may depend on a local that depends on another resource
        for _ in 0..2 {
            resolve_locals(documents, scope, self.functions);

            let mut resources = Map::new();
            let mut data = Map::new();

            for (source, block) in documents.blocks() {
                let kind = BlockKind::root(block.ident.value().as_str());
                let target = match kind {
                    BlockKind::Resource => &mut resources,
                    BlockKind::Data => &mut data,
                    _ => continue,
                };

                let labels = labels_of(block);
                let [resource_type, name, ..] = labels.as_slice() else {
                    continue;
                };

                let value = instances_value(builder, source, block, kind, scope);
                let Value::Object(types) = target
                    .entry(resource_type.clone())
                    .or_insert_with(|| Value::Object(Map::new()))
                else {
                    continue;
                };
                types.insert(name.clone(), value);
            }

            scope.resources = resources;
            scope.data = data;
        }
    }

    /// Evaluate a module call, `None` if the module can not be found
    fn evaluate_call(
        &self,
        directory: &Path,
        module_path: &[String],
        name: &str,
        block: &Block,
        scope: &Scope,
        modules: &mut Vec<ConfigModule>,
    ) -> Result<Option<Map>, EvaluationError> {
        let mut child_path = module_path.to_vec();
        child_path.push(name.to_string());

        if child_path.len() > MAX_MODULE_DEPTH {
            tracing::warn!(module=%child_path.join("."), "module nesting too deep");
            return Ok(None);
        }

        let context = scope.context(self.functions);

        let Some(Ok(Value::String(source))) =
            attribute_expr(&block.body, "source").map(|expr| expr.evaluate(&context))
        else {
            tracing::warn!(module=%name, "module without a known source");
            return Ok(None);
        };

        let child_directory = if source.starts_with("./") || source.starts_with("../") {
            Some(directory.join(&source))
        } else {
            self.manifest.directory(self.root, &child_path)
        };

        let Some(child_directory) = child_directory.filter(|dir| dir.is_dir()) else {
            tracing::warn!(module=%name, %source, "module source not available locally");
            return Ok(None);
        };
        let child_directory =
            child_directory
                .canonicalize()
                .map_err(|source| EvaluationError::Io {
                    path: child_directory.clone(),
                    source,
                })?;

        let mut inputs = Map::new();
        for attribute in block.body.attributes() {
            let key = attribute.key.value().as_str();
            if MODULE_META_ARGUMENTS.contains(&key) {
                continue;
            }

            let expr: hcl::Expression = attribute.value.clone().into();
            match evaluate_partial(&expr, &context).to_hcl() {
                Some(value) => {
                    inputs.insert(key.to_string(), value);
                }
                None => tracing::debug!(module=%name, input=%key, "input not known"),
            }
        }

        let outputs = self.evaluate(&child_directory, child_path, inputs, modules)?;
        Ok(Some(outputs))
    }
}

/// Module calls of a module, each one after the calls whose outputs its arguments read
///
/// Outputs read through locals count as well. Calls in a dependency cycle keep their source order.
fn call_order(documents: &HclDocuments) -> Vec<(String, &Block)> {
    let local_modules = local_module_dependencies(documents);

    let mut pending: Vec<(String, &Block, BTreeSet<String>)> = documents
        .blocks()
        .filter(|(_, block)| block.ident.value().as_str() == "module")
        .filter_map(|(_, block)| {
            let name = labels_of(block).into_iter().next()?;

            let mut dependencies = BTreeSet::new();
            for attribute in block.body.attributes() {
                let expr: hcl::Expression = attribute.value.clone().into();
                dependencies.extend(modules_read_by(&expr, &local_modules));
            }
            dependencies.remove(&name);

            Some((name, block, dependencies))
        })
        .collect();

    let calls: BTreeSet<String> = pending.iter().map(|(name, ..)| name.clone()).collect();
    let mut ordered: Vec<(String, &Block)> = vec![];

    while !pending.is_empty() {
        let ready = pending.iter().position(|(_, _, dependencies)| {
            dependencies.iter().all(|dependency| {
                !calls.contains(dependency) || ordered.iter().any(|(done, _)| done == dependency)
            })
        });

        let index = ready.unwrap_or_else(|| {
            tracing::warn!(module=%pending[0].0, "cyclic module dependency");
            0
        });

        let (name, block, _) = pending.remove(index);
        ordered.push((name, block));
    }

    ordered
}

/// Module calls each local reads outputs of, directly or through other locals
fn local_module_dependencies(documents: &HclDocuments) -> HashMap<String, BTreeSet<String>> {
    let mut direct = vec![];
    for attribute in documents
        .blocks()
        .filter(|(_, block)| block.ident.value().as_str() == "locals")
        .flat_map(|(_, block)| block.body.attributes())
    {
        let expr: hcl::Expression = attribute.value.clone().into();

        let mut modules = BTreeSet::new();
        let mut locals = BTreeSet::new();
        expr.visit_traversals(&mut |traversal: &Traversal| {
            match traversal_path(traversal).as_slice() {
                [root, name, ..] if root == "module" => {
                    modules.insert(name.clone());
                }
                [root, name, ..] if root == "local" => {
                    locals.insert(name.clone());
                }
                _ => {}
            }
        });

        direct.push((attribute.key.value().as_str().to_string(), modules, locals));
    }

    let mut resolved: HashMap<String, BTreeSet<String>> = direct
        .iter()
        .map(|(name, modules, _)| (name.clone(), modules.clone()))
        .collect();

    loop {
        let mut changed = false;

        for (name, _, locals) in &direct {
            let inherited: BTreeSet<String> = locals
                .iter()
                .filter_map(|local| resolved.get(local))
                .flatten()
                .cloned()
                .collect();

            let entry = resolved.entry(name.clone()).or_default();
            let before = entry.len();
            entry.extend(inherited);
            changed |= entry.len() != before;
        }

        if !changed {
            break;
        }
    }

    resolved
}

fn modules_read_by(
    expr: &hcl::Expression,
    local_modules: &HashMap<String, BTreeSet<String>>,
) -> BTreeSet<String> {
    let mut modules = BTreeSet::new();

    expr.visit_traversals(&mut |traversal: &Traversal| {
        match traversal_path(traversal).as_slice() {
            [root, name, ..] if root == "module" => {
                modules.insert(name.clone());
            }
            [root, name, ..] if root == "local" => {
                if let Some(read) = local_modules.get(name) {
                    modules.extend(read.iter().cloned());
                }
            }
            _ => {}
        }
    });

    modules
}

/// Evaluate `locals` until no more values become known
fn resolve_locals(documents: &HclDocuments, scope: &mut Scope, functions: &FunctionRegistry) {
    let expressions: Vec<(String, hcl::Expression)> = documents
        .blocks()
        .filter(|(_, block)| block.ident.value().as_str() == "locals")
        .flat_map(|(_, block)| block.body.attributes())
        .map(|attribute| {
            (
                attribute.key.value().as_str().to_string(),
                attribute.value.clone().into(),
            )
        })
        .collect();

    for _ in 0..=expressions.len() {
        let context = scope.context(functions);
        let mut changed = false;

        for (name, expr) in &expressions {
            let Ok(value) = expr.evaluate(&context) else {
                continue;
            };

            if scope.locals.get(name) != Some(&value) {
                scope.locals.insert(name.clone(), value);
                changed = true;
            }
        }

        if !changed {
            break;
        }
    }
}

/// Final, possibly partial, values of all locals
fn local_values(
    documents: &HclDocuments,
    scope: &Scope,
    functions: &FunctionRegistry,
) -> indexmap::IndexMap<String, EvaluatedValue> {
    let context = scope.context(functions);

    documents
        .blocks()
        .filter(|(_, block)| block.ident.value().as_str() == "locals")
        .flat_map(|(_, block)| block.body.attributes())
        .map(|attribute| {
            let expr: hcl::Expression = attribute.value.clone().into();
            (
                attribute.key.value().as_str().to_string(),
                evaluate_partial(&expr, &context),
            )
        })
        .collect()
}

/// Value of a resource or data source as seen by other expressions
///
/// `count` instances become a list and `for_each` instances an object.
fn instances_value(
    builder: &BlockBuilder,
    source: &Source,
    block: &Block,
    kind: BlockKind,
    scope: &Scope,
) -> Value {
    let instances = builder.instances(block, scope);

    let values = instances.iter().map(|instance| {
        let config_block = builder.root_block(source, block, kind.clone(), instance);
        (instance.key.clone(), block_value(&config_block))
    });

    match instances.first().and_then(|instance| instance.key.clone()) {
        None if instances.len() == 1 => values
            .map(|(_, value)| value)
            .next()
            .unwrap_or(Value::Null),
        Some(InstanceKey::Key(_)) => Value::Object(
            values
                .filter_map(|(key, value)| match key {
                    Some(InstanceKey::Key(key)) => Some((key, value)),
                    _ => None,
                })
                .collect(),
        ),
        _ => Value::Array(values.map(|(_, value)| value).collect()),
    }
}

/// All root blocks of the module, with `count` and `for_each` expanded
fn materialize(documents: &HclDocuments, builder: &BlockBuilder, scope: &Scope) -> Vec<ConfigBlock> {
    let mut blocks = vec![];

    for (source, block) in documents.blocks() {
        let kind = BlockKind::root(block.ident.value().as_str());

        let instances = match kind {
            BlockKind::Resource | BlockKind::Data | BlockKind::Module => {
                builder.instances(block, scope)
            }
            _ => vec![Instance {
                key: None,
                scope: scope.clone(),
            }],
        };

        for instance in &instances {
            blocks.push(builder.root_block(source, block, kind.clone(), instance));
        }
    }

    blocks
}

/// Values of the module's `output` blocks
fn outputs(documents: &HclDocuments, scope: &Scope, functions: &FunctionRegistry) -> Map {
    let context = scope.context(functions);
    let mut outputs = Map::new();

    for (_, block) in documents.blocks() {
        if block.ident.value().as_str() != "output" {
            continue;
        }

        let Some(name) = labels_of(block).into_iter().next() else {
            continue;
        };

        match attribute_expr(&block.body, "value").map(|expr| expr.evaluate(&context)) {
            Some(Ok(value)) => {
                outputs.insert(name, value);
            }
            Some(Err(errors)) => tracing::debug!(%name, %errors, "output not known"),
            None => tracing::debug!(%name, "output without value"),
        }
    }

    outputs
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::hcl_documents;
    use pretty_assertions::assert_eq;

    fn order(documents: &HclDocuments) -> Vec<String> {
        call_order(documents)
            .into_iter()
            .map(|(name, _)| name)
            .collect()
    }

    #[test]
    fn calls_follow_their_dependencies() {
        let documents = hcl_documents! {r#"
        module "bucket" {
          source       = "./bucket"
          default_tags = module.tags.tags
          logging      = local.log_target
        }

        locals {
          log_target = local.log_bucket
          log_bucket = module.logs.bucket
        }

        module "logs" {
          source = "./logs"
          tags   = module.tags.tags
        }

        module "tags" {
          source = "./tags"
        }
        "#};

        assert_eq!(order(&documents), vec!["tags", "logs", "bucket"]);
    }

    #[test]
    fn independent_calls_keep_source_order() {
        let documents = hcl_documents! {r#"
        module "b" {
          source = "./b"
        }

        module "a" {
          source = "./a"
          name   = var.name
        }
        "#};

        assert_eq!(order(&documents), vec!["b", "a"]);
    }

    #[test]
    fn cycles_keep_source_order() {
        let documents = hcl_documents! {r#"
        module "a" {
          source = "./a"
          input  = module.b.out
        }

        module "b" {
          source = "./b"
          input  = module.a.out
        }
        "#};

        assert_eq!(order(&documents), vec!["a", "b"]);
    }
}

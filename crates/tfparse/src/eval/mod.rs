//! evaluation of terraform module directories
//!
//! An [Evaluator] turns a directory of `.tf` files into the [crate::model] tree consumed by
//! [crate::convert]. [HclEvaluator] is the bundled implementation:
//!
//! - documents are loaded with [hcl_edit] (we need the spans for line numbers)
//! - expressions are evaluated with [hcl::eval] against a [scope::Scope] holding `var`, `local`,
//!   resources, data sources and module outputs
//! - whatever can not be evaluated is kept as [crate::value::EvaluatedValue::Unknown]
//! - `count`, `for_each` and `dynamic` blocks are expanded
//! - local child modules (and those installed by `terraform init`) are evaluated recursively
use crate::hcl_documents::LoadError;
use crate::model::ConfigModule;
use crate::options::Options;
use std::path::{Path, PathBuf};

mod blocks;
pub mod functions;
mod modules;
mod scope;
mod types;

pub use functions::FunctionRegistry;
pub(crate) use scope::expression_source;

/// Result of evaluating a root module
#[derive(Debug, Default)]
pub struct Evaluation {
    /// root module first, child modules depth-first after their parent
    pub modules: Vec<ConfigModule>,
    /// functions expressions were evaluated with
    pub functions: FunctionRegistry,
}

/// Produces the evaluated configuration tree of a directory
pub trait Evaluator {
    fn evaluate(&self, root: &Path, options: &Options) -> Result<Evaluation, EvaluationError>;
}

#[derive(thiserror::Error, Debug)]
pub enum EvaluationError {
    #[error("open {}: no such file or directory", path.display())]
    NotFound { path: PathBuf },
    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error(transparent)]
    Load(#[from] LoadError),
    #[error("unable to read variables from {}: {source}", path.display())]
    TfVars { path: PathBuf, source: hcl::Error },
    #[error("invalid module manifest {}: {source}", path.display())]
    ModuleManifest {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// Evaluator built on [hcl_edit] and [hcl::eval]
#[derive(Debug, Clone)]
pub struct HclEvaluator {
    functions: FunctionRegistry,
}

impl Default for HclEvaluator {
    fn default() -> Self {
        Self {
            functions: FunctionRegistry::builtin(),
        }
    }
}

impl HclEvaluator {
    /// Evaluator with a custom function registry
    pub fn with_functions(functions: FunctionRegistry) -> Self {
        Self { functions }
    }
}

impl Evaluator for HclEvaluator {
    #[tracing::instrument(skip_all, fields(root=%root.display()))]
    fn evaluate(&self, root: &Path, options: &Options) -> Result<Evaluation, EvaluationError> {
        let root = root.canonicalize().map_err(|source| match source.kind() {
            std::io::ErrorKind::NotFound => EvaluationError::NotFound {
                path: root.to_path_buf(),
            },
            _ => EvaluationError::Io {
                path: root.to_path_buf(),
                source,
            },
        })?;

        let _base_directory = functions::BaseDirectory::enter(&root);

        if options.allow_downloads {
            tracing::warn!("remote modules can not be downloaded, only installed modules are used");
        }

        let variables = modules::root_variables(&root, options)?;
        let manifest = modules::ModuleManifest::load(&root)?;

        let evaluator = modules::ModuleEvaluator {
            root: &root,
            options,
            functions: &self.functions,
            manifest: &manifest,
        };

        let mut modules = vec![];
        evaluator.evaluate(&root, vec![], variables, &mut modules)?;

        tracing::debug!(modules = modules.len(), "evaluation complete");

        Ok(Evaluation {
            modules,
            functions: self.functions.clone(),
        })
    }
}

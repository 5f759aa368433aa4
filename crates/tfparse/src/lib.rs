//! # tfparse - terraform to json
//!
//! Converts a directory of terraform configuration into a single json document that policy
//! tooling can query without understanding terraform.
//!
//! ## Introduction for developers
//!
//! ### HCL Terms
//!
//! In hcl terms...
//! - a file gets parsed as a `body`
//! - ...which is just a list of `structures`
//! - ...where there are two kinds:
//!   - `attribute`: a "key = value" pair
//!   - or `block`:
//!     - 1 `identifier`
//!     - followed by 0 or more `labels`
//!     - and a `body` enclosed in `{` and `}`
//!
//! ```hcl
//! resource "aws_s3_bucket" "logs" {
//!   bucket = "${var.prefix}-logs"
//!
//!   versioning {
//!     enabled = true
//!   }
//! }
//! ```
//!
//! ### Loading files
//!
//! Every `*.tf` file of a module directory is parsed as a `body` ([hcl_edit::structure::Body]) and
//! stored in [hcl_documents::HclDocuments] together with its [hcl_documents::Source], which turns
//! byte spans into line numbers.
//!
//! ### Evaluation
//!
//! see [eval::HclEvaluator]
//!
//! Variables, locals, resources, data sources and module outputs are made available to
//! [hcl::eval]. Whatever can not be evaluated (`aws_instance.web.id` is only known after apply) is
//! kept as [value::EvaluatedValue::Unknown] next to the original expression. `count`, `for_each`
//! and `dynamic` blocks are expanded and child modules are evaluated recursively. The result is a
//! tree of [model::ConfigModule]s.
//!
//! ### Conversion
//!
//! see [convert::convert]
//!
//! The tree is flattened into a json object keyed by resource type (or block kind). Unknown values
//! get a best effort replacement derived from their expression, every object carries a `__tfmeta`
//! with its source location and the blocks it references.
//!
//! ### Entry points
//!
//! - [load_from_path] for rust callers
//! - [ffi] for everything else
//! - the `tfparse` binary
use std::path::Path;

pub mod convert;
pub mod eval;
pub mod ffi;
pub mod hcl_documents;
pub mod model;
pub mod options;
pub mod value;
mod visit;

use eval::{EvaluationError, Evaluator, HclEvaluator};
pub use options::Options;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Evaluation(#[from] EvaluationError),
    #[error("unable to serialize output: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Convert the terraform module in `root` to json
///
/// Logs go to the sink of [Options::log_sink].
pub fn load_from_path(root: impl AsRef<Path>, options: &Options) -> Result<serde_json::Value, Error> {
    load_from_path_with_sink(root, options, &options.log_sink())
}

/// Like [load_from_path], logging to `sink`
pub fn load_from_path_with_sink(
    root: impl AsRef<Path>,
    options: &Options,
    sink: &tracing::Dispatch,
) -> Result<serde_json::Value, Error> {
    tracing::dispatcher::with_default(sink, || {
        load_with_evaluator(&HclEvaluator::default(), root.as_ref(), options)
    })
}

/// Convert with any [Evaluator]
pub fn load_with_evaluator(
    evaluator: &impl Evaluator,
    root: &Path,
    options: &Options,
) -> Result<serde_json::Value, Error> {
    let evaluation = evaluator.evaluate(root, options)?;
    Ok(convert::convert(&evaluation)?)
}

/// Compact json text, as handed out over [ffi]
pub(crate) fn load_json_string(root: impl AsRef<Path>, options: &Options) -> Result<String, Error> {
    let json = load_from_path(root, options)?;
    Ok(serde_json::to_string(&json)?)
}

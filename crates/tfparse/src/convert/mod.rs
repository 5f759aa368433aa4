//! conversion of the evaluated tree into a single json document
//!
//! Every root block of every module is emitted under its emission key (the resource or data source
//! type, the block kind for everything else). Nested blocks are emitted inside their parent, a
//! kind that occurs once is a plain object, more than once an array.
//!
//! ```json
//! {
//!   "aws_s3_bucket": [{
//!     "bucket": "logs",
//!     "versioning": { "enabled": true, "id": "...", "__tfmeta": {...} },
//!     "id": "...",
//!     "__tfmeta": {
//!       "filename": "main.tf", "line_start": 1, "line_end": 8,
//!       "label": "aws_s3_bucket", "path": "aws_s3_bucket.logs", "type": "resource",
//!       "references": [{ "id": "...", "label": "aws_kms_key", "name": "logs" }]
//!     }
//!   }]
//! }
//! ```
use crate::eval::Evaluation;
use crate::model::{BlockKind, ConfigBlock, ConfigModule};
use indexmap::IndexMap;
use serde_json::Value as Json;
use std::collections::BTreeSet;

pub mod output;
pub mod paths;
pub mod reconcile;
pub mod references;
pub mod resolve;

use output::{BlockObject, ConversionOutput, Field, TfMeta};
use paths::PathBuilder;
use reconcile::reconcile;
use references::ReferenceTracker;
use resolve::AttributeResolver;

/// Convert all modules of an evaluation
///
/// Every call starts with fresh reference and path state.
#[tracing::instrument(skip_all, fields(modules = evaluation.modules.len()))]
pub fn convert(evaluation: &Evaluation) -> Result<Json, serde_json::Error> {
    let mut converter = Converter::default();

    for module in &evaluation.modules {
        let resolver = AttributeResolver::new(module, &evaluation.functions);
        for block in &module.blocks {
            converter.visit_root(module, &resolver, block);
        }
    }

    let Converter {
        mut output,
        references,
        ..
    } = converter;

    // every block is known now
    references.finalize(&mut output);
    output.into_json()
}

#[derive(Debug, Default)]
struct Converter {
    output: ConversionOutput,
    references: ReferenceTracker,
    paths: PathBuilder,
}

impl Converter {
    fn visit_root(&mut self, module: &ConfigModule, resolver: &AttributeResolver, block: &ConfigBlock) {
        self.references.record_block(block);

        let block_type = match &block.kind {
            BlockKind::Resource | BlockKind::Data => Some(block.kind.to_string()),
            BlockKind::Module
            | BlockKind::Variable
            | BlockKind::Output
            | BlockKind::Locals
            | BlockKind::Provider
            | BlockKind::Terraform
            | BlockKind::Moved
            | BlockKind::Import
            | BlockKind::Removed
            | BlockKind::Check => None,
            BlockKind::Unknown(ident) => {
                tracing::warn!(
                    %ident,
                    filename=%block.range.filename,
                    line=block.range.start_line,
                    "skipping unrecognized block"
                );
                return;
            }
            BlockKind::Template | BlockKind::TemplateBody | BlockKind::Nested(_) => {
                tracing::debug!(kind=%block.kind, "skipping nested block kind at module root");
                return;
            }
        };

        let prefix = module.address_prefix();
        assert!(
            block.full_name.starts_with(&prefix),
            "block {} is not part of module {prefix}",
            block.full_name
        );

        let path = self.paths.build_path(block, None, &prefix);

        let meta = TfMeta {
            label: block.type_label().map(str::to_string),
            path: Some(path.clone()),
            block_type,
            ..TfMeta::located(block)
        };

        let object = self.build_object(resolver, block, meta, &path);

        let key = match block.kind {
            BlockKind::Resource | BlockKind::Data => {
                block.type_label().unwrap_or(block.kind.as_str())
            }
            _ => block.kind.as_str(),
        };
        self.output.push(key, object);
    }

    fn build_object(
        &mut self,
        resolver: &AttributeResolver,
        block: &ConfigBlock,
        meta: TfMeta,
        path: &str,
    ) -> BlockObject {
        let meta = self.output.add_meta(meta);

        let mut references = BTreeSet::new();
        let mut fields = IndexMap::new();
        for attribute in &block.attributes {
            let value = resolver.resolve(attribute, block, &mut references);
            fields.insert(attribute.name.clone(), Field::Value(value));
        }
        self.references.record_references(references, meta);

        for child in &block.children {
            self.references.record_block(child);
            if child.kind.is_template() {
                // never visited, the generated copies are emitted instead
                self.record_subtree(child);
            }
        }

        let mut groups: IndexMap<&str, Vec<BlockObject>> = IndexMap::new();
        for child in reconcile(&block.children) {
            if matches!(child.kind, BlockKind::TemplateBody) {
                continue;
            }

            let child_path = self.paths.build_path(child, Some(block), path);
            tracing::trace!(path=%child_path, "nested block");

            let object = self.build_object(resolver, child, TfMeta::located(child), &child_path);
            groups.entry(child.kind.as_str()).or_default().push(object);
        }

        for (kind, mut objects) in groups {
            let field = match objects.len() {
                1 => Field::Block(objects.remove(0)),
                _ => Field::Blocks(objects),
            };

            if fields.insert(kind.to_string(), field).is_some() {
                tracing::debug!(block=%block.full_name, %kind, "nested block replaces attribute");
            }
        }

        BlockObject {
            fields,
            id: (!block.id.is_empty()).then(|| block.id.clone()),
            meta,
        }
    }

    fn record_subtree(&mut self, block: &ConfigBlock) {
        for child in &block.children {
            self.references.record_block(child);
            self.record_subtree(child);
        }
    }
}

//! block addresses
use crate::model::{BlockKind, ConfigBlock};
use std::collections::HashMap;

/// Computes the `__tfmeta.path` of blocks
///
/// Children of resources are indexed by how many siblings of the same name came before them,
/// so one builder must be used for a whole conversion.
#[derive(Debug, Default)]
pub struct PathBuilder {
    sibling_counts: HashMap<String, usize>,
}

impl PathBuilder {
    pub fn build_path(
        &mut self,
        block: &ConfigBlock,
        parent: Option<&ConfigBlock>,
        parent_path: &str,
    ) -> String {
        let is_template_body = matches!(block.kind, BlockKind::TemplateBody);

        let descriptor = if is_template_body {
            block.kind.as_str()
        } else {
            block
                .descriptor
                .strip_prefix("dynamic.")
                .unwrap_or(&block.descriptor)
        };

        if parent_path.is_empty() {
            return descriptor.to_string();
        }

        if is_template_body && parent.is_some_and(|parent| parent.kind.is_template()) {
            return parent_path.to_string();
        }

        let path = format!("{parent_path}.{descriptor}");

        match parent {
            Some(parent) if matches!(parent.kind, BlockKind::Resource) => {
                let count = self.sibling_counts.entry(path.clone()).or_default();
                let indexed = format!("{path}[{count}]");
                *count += 1;
                indexed
            }
            _ => path,
        }
    }
}

//! cross-block references
//!
//! References are collected while the tree is walked but can only be resolved once every block
//! is known, a block may refer to one that is visited later.
use super::output::{ConversionOutput, MetaHandle, ReferenceEntry};
use crate::model::ConfigBlock;
use std::collections::{BTreeSet, HashMap};

#[derive(Debug, Default)]
pub struct ReferenceTracker {
    /// full block name to the entry emitted when it is referenced
    identities: HashMap<String, ReferenceEntry>,
    pending: Vec<(Vec<String>, MetaHandle)>,
}

impl ReferenceTracker {
    /// Make `block` available as reference target
    pub fn record_block(&mut self, block: &ConfigBlock) {
        // instances of a counted block share their name, the first one wins
        self.identities
            .entry(block.full_name.clone())
            .or_insert_with(|| reference_entry(block));
    }

    /// Remember the outgoing references of the block owning `meta`
    pub fn record_references(&mut self, references: BTreeSet<String>, meta: MetaHandle) {
        if references.is_empty() {
            return;
        }

        self.pending.push((references.into_iter().collect(), meta));
    }

    /// Attach every resolvable reference to its `__tfmeta`
    pub fn finalize(self, output: &mut ConversionOutput) {
        for (references, meta) in self.pending {
            let resolved: Vec<_> = references
                .iter()
                .filter_map(|reference| {
                    let entry = self.identities.get(reference).cloned();
                    if entry.is_none() {
                        tracing::trace!(%reference, "dropping unresolved reference");
                    }
                    entry
                })
                .collect();

            if !resolved.is_empty() {
                output.meta_mut(meta).references = resolved;
            }
        }
    }
}

fn reference_entry(block: &ConfigBlock) -> ReferenceEntry {
    let (label, name) = match block.labels.as_slice() {
        [label, name, ..] => (label.clone(), name.clone()),
        [name] => (block.kind.to_string(), name.clone()),
        [] => (block.kind.to_string(), String::new()),
    };

    ReferenceEntry {
        id: block.id.clone(),
        label,
        name,
    }
}

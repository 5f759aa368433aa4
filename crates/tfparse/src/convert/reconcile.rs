//! reconciliation of `dynamic` block expansions
use crate::model::ConfigBlock;

/// Children of a block that should be emitted
///
/// Templates are dropped, their repetition count is remembered. A child that starts before the
/// end of the last accepted child is a generated copy and is only kept while the remembered
/// count lasts.
pub fn reconcile(children: &[ConfigBlock]) -> Vec<&ConfigBlock> {
    let mut expected_duplicates: isize = 0;
    let mut max_line = 0;
    let mut kept = vec![];

    for child in children {
        if child.kind.is_template() {
            expected_duplicates += child.repetitions as isize;
            continue;
        }

        if child.range.start_line >= max_line {
            max_line = child.range.end_line;
            kept.push(child);
            continue;
        }

        expected_duplicates -= 1;
        if expected_duplicates > 0 {
            kept.push(child);
        } else {
            tracing::trace!(descriptor=%child.descriptor, "dropping surplus copy");
        }
    }

    kept
}

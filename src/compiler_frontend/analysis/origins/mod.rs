//! Origin tracking.
//!
//! Inside a function body an origin is a set of targets: local bindings, the
//! external labels of the signature and static storage. Targets are indexed in a
//! `TargetSpace` so sets are plain bitsets.

mod tracker;

pub(crate) use tracker::{
    ArgumentOrigin, CallOrigins, EscapeCheck, check_escape, check_unique_labels,
    instantiate_call_labels,
};

use crate::compiler_frontend::analysis::bit_set::BitSet;
use crate::compiler_frontend::analysis::conventions::OriginLabel;
use crate::compiler_frontend::ir::ir_nodes::LocalId;
use crate::compiler_frontend::string_interning::StringTable;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum OriginTarget {
    Local(LocalId),
    Label(OriginLabel),
    Static,
}

impl OriginTarget {
    pub fn display(&self, local_name: impl Fn(LocalId) -> String, string_table: &StringTable) -> String {
        match self {
            OriginTarget::Local(local) => local_name(*local),
            OriginTarget::Label(label) => label.display(string_table),
            OriginTarget::Static => "static".to_owned(),
        }
    }
}

/// Index space for one function: locals first, then signature labels, then static storage.
#[derive(Debug, Clone)]
pub(crate) struct TargetSpace {
    local_count: usize,
    labels: Vec<OriginLabel>,
}

impl TargetSpace {
    pub(crate) fn new(local_count: usize, labels: Vec<OriginLabel>) -> Self {
        Self {
            local_count,
            labels,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.local_count + self.labels.len() + 1
    }

    pub(crate) fn local_count(&self) -> usize {
        self.local_count
    }

    pub(crate) fn static_index(&self) -> usize {
        self.local_count + self.labels.len()
    }

    pub(crate) fn label_index(&self, label: OriginLabel) -> Option<usize> {
        if label == OriginLabel::Static {
            return Some(self.static_index());
        }

        self.labels
            .iter()
            .position(|known| *known == label)
            .map(|position| self.local_count + position)
    }

    pub(crate) fn target(&self, index: usize) -> OriginTarget {
        if index < self.local_count {
            return OriginTarget::Local(LocalId(index as u32));
        }

        match self.labels.get(index - self.local_count) {
            Some(label) => OriginTarget::Label(*label),
            None => OriginTarget::Static,
        }
    }

    pub(crate) fn empty(&self) -> TargetSet {
        TargetSet(BitSet::empty(self.len()))
    }

    pub(crate) fn local(&self, local: LocalId) -> TargetSet {
        TargetSet(BitSet::singleton(self.len(), local.0 as usize))
    }

    /// Unknown labels fall back to static storage, which is always allowed to escape.
    /// Callers only pass labels taken from the same signature, so this never triggers.
    pub(crate) fn label(&self, label: OriginLabel) -> TargetSet {
        let index = self.label_index(label).unwrap_or(self.static_index());
        TargetSet(BitSet::singleton(self.len(), index))
    }

    pub(crate) fn static_storage(&self) -> TargetSet {
        TargetSet(BitSet::singleton(self.len(), self.static_index()))
    }

    pub(crate) fn targets(&self, set: &TargetSet) -> Vec<OriginTarget> {
        set.0.iter_ones().map(|index| self.target(index)).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct TargetSet(BitSet);

impl TargetSet {
    pub(crate) fn union_with(&mut self, other: &TargetSet) -> bool {
        self.0.union_with(&other.0)
    }

    pub(crate) fn contains(&self, index: usize) -> bool {
        self.0.contains(index)
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub(crate) fn count(&self) -> usize {
        self.0.count()
    }

    pub(crate) fn indices(&self) -> impl Iterator<Item = usize> + '_ {
        self.0.iter_ones()
    }

    /// Local bindings in this set, in id order
    pub(crate) fn locals(&self, space: &TargetSpace) -> Vec<LocalId> {
        self.0
            .iter_ones()
            .take_while(|index| *index < space.local_count())
            .map(|index| LocalId(index as u32))
            .collect()
    }

    pub(crate) fn intersects(&self, other: &TargetSet) -> bool {
        self.0.intersects(&other.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn targets_are_laid_out_locals_then_labels_then_static() {
        let space = TargetSpace::new(
            3,
            vec![OriginLabel::Anonymous(0), OriginLabel::Anonymous(1)],
        );

        assert_eq!(space.len(), 6);
        assert_eq!(space.target(1), OriginTarget::Local(LocalId(1)));
        assert_eq!(
            space.target(4),
            OriginTarget::Label(OriginLabel::Anonymous(1))
        );
        assert_eq!(space.target(space.static_index()), OriginTarget::Static);
        assert_eq!(space.label_index(OriginLabel::Static), Some(5));
    }

    #[test]
    fn union_reports_growth_and_lists_locals() {
        let space = TargetSpace::new(4, vec![OriginLabel::Anonymous(0)]);
        let mut set = space.local(LocalId(2));

        assert!(set.union_with(&space.local(LocalId(0))));
        assert!(!set.union_with(&space.local(LocalId(0))));
        assert!(set.union_with(&space.label(OriginLabel::Anonymous(0))));

        assert_eq!(set.locals(&space), vec![LocalId(0), LocalId(2)]);
        assert_eq!(set.count(), 3);
        assert_eq!(
            space.targets(&set).last(),
            Some(&OriginTarget::Label(OriginLabel::Anonymous(0)))
        );
    }
}

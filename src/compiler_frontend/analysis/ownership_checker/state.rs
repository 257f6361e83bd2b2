use crate::compiler_frontend::analysis::bit_set::BitSet;
use crate::compiler_frontend::analysis::conventions::ResolvedSignature;
use crate::compiler_frontend::analysis::origins::TargetSet;
use crate::compiler_frontend::analysis::ownership_checker::layout::{FunctionLayout, Storage};
use crate::compiler_frontend::compiler_errors::DiagnosticKind;
use crate::compiler_frontend::ir::ir_nodes::{LocalId, LocalKind};
use crate::compiler_frontend::ir::ir_types::TypeTable;
use crate::compiler_frontend::ir::text_location::TextLocation;
use serde::Serialize;
use std::ops::Range;

/// Initialization state of one leaf, as the set of states it may be in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub(crate) struct LocalMode(u8);

impl LocalMode {
    pub(crate) const UNINIT: Self = Self(0b001);
    pub(crate) const INIT: Self = Self(0b010);
    pub(crate) const MOVED: Self = Self(0b100);

    pub(crate) fn contains(self, other: Self) -> bool {
        (self.0 & other.0) == other.0
    }

    pub(crate) fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    pub(crate) fn may_be_init(self) -> bool {
        self.contains(Self::INIT)
    }

    /// Reading is only allowed when every path initialized the leaf
    pub(crate) fn read_check(self) -> Result<(), DiagnosticKind> {
        if self == Self::INIT {
            return Ok(());
        }

        if !self.may_be_init() {
            if self.contains(Self::MOVED) {
                return Err(DiagnosticKind::UseAfterMove);
            }
            return Err(DiagnosticKind::UseOfUninitializedValue);
        }

        if self.contains(Self::MOVED) {
            Err(DiagnosticKind::PossibleUseAfterMove)
        } else {
            Err(DiagnosticKind::UseOfUninitializedValue)
        }
    }
}

/// Forward dataflow state: leaf initialization plus the origins of every local.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct FlowState {
    leaves: Vec<LocalMode>,
    origins: Vec<TargetSet>,

    /// Leaves that were given a value on some path, kept through moves and drops
    assigned: BitSet,

    /// Locals whose held references may be used to mutate
    mutable_refs: BitSet,

    /// Where the references a local holds were created, sorted
    def_sites: Vec<Vec<TextLocation>>,
}

impl FlowState {
    pub(crate) fn new_uninitialized(layout: &FunctionLayout) -> Self {
        let local_count = layout.local_count();
        Self {
            leaves: vec![LocalMode::UNINIT; layout.leaves.len()],
            assigned: BitSet::empty(layout.leaves.len()),
            origins: vec![layout.targets.empty(); local_count],
            mutable_refs: BitSet::empty(local_count),
            def_sites: vec![Vec::new(); local_count],
        }
    }

    /// State on function entry: parameters and statics are initialized,
    /// outputs are not, and borrowed values point into their external labels.
    pub(crate) fn entry(layout: &FunctionLayout, types: &TypeTable, signature: &ResolvedSignature) -> Self {
        let mut state = Self::new_uninitialized(layout);

        for local in &layout.locals {
            let initialized = match local.storage {
                Storage::Output => false,
                Storage::Static => true,
                Storage::Owned | Storage::Borrowed { .. } => {
                    matches!(local.kind, LocalKind::Param(_))
                }
            };

            if initialized {
                state.set_modes(local.leaves(), LocalMode::INIT);
                state.mark_assigned(local.leaves());
            }

            if !local.carries_origins {
                continue;
            }

            let targets = match local.storage {
                Storage::Static => layout.targets.static_storage(),
                Storage::Output => continue,
                Storage::Borrowed { label, .. } => layout.targets.label(label),
                Storage::Owned => {
                    let LocalKind::Param(index) = local.kind else {
                        continue;
                    };
                    match signature.params.get(index as usize) {
                        Some(param) => layout.targets.label(param.label),
                        None => continue,
                    }
                }
            };

            let mutable = types.holds_mutable_references(local.ty) == Some(true);
            state.set_origin(local.id, targets, mutable, local.location);
        }

        state
    }

    pub(crate) fn mode(&self, leaf: usize) -> LocalMode {
        self.leaves.get(leaf).copied().unwrap_or(LocalMode::UNINIT)
    }

    /// Union of the modes of a leaf range
    pub(crate) fn modes(&self, leaves: Range<usize>) -> Option<LocalMode> {
        leaves
            .map(|leaf| self.mode(leaf))
            .reduce(LocalMode::union)
    }

    pub(crate) fn set_modes(&mut self, leaves: Range<usize>, mode: LocalMode) {
        for leaf in leaves {
            if let Some(slot) = self.leaves.get_mut(leaf) {
                *slot = mode;
            }
        }
    }

    pub(crate) fn mark_assigned(&mut self, leaves: Range<usize>) {
        for leaf in leaves {
            self.assigned.insert(leaf);
        }
    }

    /// A declaration starts a fresh binding, even when a loop reaches it again
    pub(crate) fn clear_assigned(&mut self, leaves: Range<usize>) {
        for leaf in leaves {
            self.assigned.remove(leaf);
        }
    }

    /// Whether any of the leaves was written on some path to this point
    pub(crate) fn any_assigned(&self, mut leaves: impl Iterator<Item = usize>) -> bool {
        leaves.any(|leaf| self.assigned.contains(leaf))
    }

    pub(crate) fn origins(&self) -> &[TargetSet] {
        &self.origins
    }

    pub(crate) fn origin(&self, local: LocalId) -> Option<&TargetSet> {
        self.origins.get(local.0 as usize)
    }

    pub(crate) fn holds_mutable_reference(&self, local: LocalId) -> bool {
        self.mutable_refs.contains(local.0 as usize)
    }

    pub(crate) fn def_sites(&self, local: LocalId) -> &[TextLocation] {
        self.def_sites
            .get(local.0 as usize)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Replace what a local points into after a whole-value write
    pub(crate) fn set_origin(&mut self, local: LocalId, targets: TargetSet, mutable: bool, site: TextLocation) {
        let index = local.0 as usize;
        let Some(slot) = self.origins.get_mut(index) else {
            return;
        };
        *slot = targets;

        if mutable {
            self.mutable_refs.insert(index);
        } else {
            self.mutable_refs.remove(index);
        }

        if let Some(sites) = self.def_sites.get_mut(index) {
            sites.clear();
            sites.push(site);
        }
    }

    /// Add to what a local points into after a partial write or a call that may store into it
    pub(crate) fn extend_origin(&mut self, local: LocalId, targets: &TargetSet, mutable: bool, site: TextLocation) {
        let index = local.0 as usize;
        let Some(slot) = self.origins.get_mut(index) else {
            return;
        };

        if !slot.union_with(targets) && !(mutable && !self.mutable_refs.contains(index)) {
            return;
        }

        if mutable {
            self.mutable_refs.insert(index);
        }

        if let Some(sites) = self.def_sites.get_mut(index) {
            if let Err(position) = sites.binary_search(&site) {
                sites.insert(position, site);
            }
        }
    }

    pub(crate) fn clear_origin(&mut self, local: LocalId, empty: TargetSet) {
        let index = local.0 as usize;
        if let Some(slot) = self.origins.get_mut(index) {
            *slot = empty;
        }
        self.mutable_refs.remove(index);
        if let Some(sites) = self.def_sites.get_mut(index) {
            sites.clear();
        }
    }

    pub(crate) fn join(&self, other: &Self) -> Self {
        let leaves = self
            .leaves
            .iter()
            .zip(other.leaves.iter())
            .map(|(left, right)| left.union(*right))
            .collect();

        let mut assigned = self.assigned.clone();
        assigned.union_with(&other.assigned);

        let origins = self
            .origins
            .iter()
            .zip(other.origins.iter())
            .map(|(left, right)| {
                let mut joined = left.clone();
                joined.union_with(right);
                joined
            })
            .collect();

        let mut mutable_refs = self.mutable_refs.clone();
        mutable_refs.union_with(&other.mutable_refs);

        let def_sites = self
            .def_sites
            .iter()
            .zip(other.def_sites.iter())
            .map(|(left, right)| {
                let mut joined = left.clone();
                joined.extend(right.iter().copied());
                joined.sort();
                joined.dedup();
                joined
            })
            .collect();

        Self {
            leaves,
            assigned,
            origins,
            mutable_refs,
            def_sites,
        }
    }
}

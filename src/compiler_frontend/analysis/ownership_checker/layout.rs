use crate::compiler_frontend::analysis::conventions::{Convention, OriginLabel, ResolvedSignature};
use crate::compiler_frontend::analysis::origins::TargetSpace;
use crate::compiler_frontend::compiler_errors::CompilerError;
use crate::compiler_frontend::ir::ir_nodes::{
    FieldId, FunctionBody, FunctionDecl, FunctionRole, LocalId, LocalKind, Place, TypeId,
};
use crate::compiler_frontend::ir::ir_types::TypeTable;
use crate::compiler_frontend::ir::text_location::TextLocation;
use crate::compiler_frontend::string_interning::StringId;
use crate::return_compiler_error;
use std::ops::Range;

/// Who owns the storage behind a local.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Storage {
    /// Owned by this function, destroyed here unless moved away
    Owned,
    /// Uninitialized on entry, must be initialized by every normal return
    Output,
    /// Owned by the caller
    Borrowed { mutable: bool, label: OriginLabel },
    Static,
}

#[derive(Debug, Clone)]
pub(crate) struct LocalInfo {
    pub id: LocalId,
    pub name: StringId,
    pub ty: TypeId,
    pub mutable: bool,
    pub kind: LocalKind,
    pub storage: Storage,
    pub first_leaf: usize,
    pub leaf_count: usize,

    /// The value holds references, so the local carries an origin
    pub carries_origins: bool,
    pub is_reference: bool,

    /// Destroyed field by field, never through its type's destructor.
    /// Only the receiver inside its own type's destructor.
    pub field_wise: bool,
    pub location: TextLocation,
}

impl LocalInfo {
    pub(crate) fn leaves(&self) -> Range<usize> {
        self.first_leaf..self.first_leaf + self.leaf_count
    }

    pub(crate) fn is_droppable(&self) -> bool {
        matches!(self.storage, Storage::Owned | Storage::Output) && !self.is_reference
    }
}

/// A unit of initialization tracking: a field path that is not split any further.
#[derive(Debug, Clone)]
pub(crate) struct LeafInfo {
    pub local: LocalId,
    pub path: Vec<FieldId>,
    pub ty: TypeId,
    pub needs_drop: bool,
    pub is_reference: bool,
}

/// A place after walking its projection through the type table.
#[derive(Debug, Clone)]
pub(crate) struct PlaceInfo {
    pub local: LocalId,

    /// Fields inside the local's own storage, up to the first dereference
    pub direct_path: Vec<FieldId>,
    pub through_reference: bool,
    pub ty: TypeId,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum LeafCover {
    /// The place is made of these whole leaves
    Leaves(Range<usize>),
    /// The place lies strictly inside one leaf that cannot be split
    Inside(usize),
}

impl LeafCover {
    pub(crate) fn indices(&self) -> Range<usize> {
        match self {
            LeafCover::Leaves(range) => range.clone(),
            LeafCover::Inside(index) => *index..*index + 1,
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct FunctionLayout {
    pub locals: Vec<LocalInfo>,
    pub leaves: Vec<LeafInfo>,
    pub targets: TargetSpace,
}

impl FunctionLayout {
    pub(crate) fn build(
        types: &TypeTable,
        function: &FunctionDecl,
        signature: &ResolvedSignature,
        body: &FunctionBody,
        field_sensitive: bool,
    ) -> Result<Self, CompilerError> {
        let mut locals = Vec::with_capacity(body.locals.len());
        let mut leaves = Vec::with_capacity(body.locals.len());

        for (index, local) in body.locals.iter().enumerate() {
            if local.id.0 as usize != index {
                return_compiler_error!(
                    "Local '{}' is stored at index {}, local ids must match their position",
                    local.id,
                    index
                );
            }

            let storage = match local.kind {
                LocalKind::Var | LocalKind::Temp => Storage::Owned,
                LocalKind::Result => Storage::Output,
                LocalKind::Static => Storage::Static,
                LocalKind::Param(param_index) => {
                    let Some(param) = signature.params.get(param_index as usize) else {
                        return_compiler_error!(
                            "Local '{}' claims to be parameter {} but the signature has {}",
                            local.id,
                            param_index,
                            signature.params.len()
                        );
                    };

                    match param.convention {
                        Convention::Borrow(label) => Storage::Borrowed {
                            mutable: false,
                            label,
                        },
                        Convention::MutableBorrow(label) => Storage::Borrowed {
                            mutable: true,
                            label,
                        },
                        Convention::Consume => Storage::Owned,
                        Convention::UninitializedOutput => Storage::Output,
                    }
                }
            };

            let field_wise = matches!(function.role, FunctionRole::Destructor(receiver) if receiver == local.ty)
                && local.kind == LocalKind::Param(0);

            let first_leaf = leaves.len();
            flatten(
                types,
                local.id,
                local.ty,
                &mut Vec::new(),
                field_sensitive,
                field_wise,
                &mut leaves,
            );

            locals.push(LocalInfo {
                id: local.id,
                name: local.name,
                ty: local.ty,
                mutable: local.mutable,
                kind: local.kind,
                storage,
                first_leaf,
                leaf_count: leaves.len() - first_leaf,
                carries_origins: types.carries_origins(local.ty),
                is_reference: types.is_reference(local.ty),
                field_wise,
                location: local.location,
            });
        }

        let mut labels = signature
            .labels
            .iter()
            .map(|info| info.label)
            .filter(|label| *label != OriginLabel::Static)
            .collect::<Vec<_>>();

        if let Some(label) = signature.result_label() {
            if label != OriginLabel::Static && !labels.contains(&label) {
                labels.push(label);
            }
        }

        Ok(FunctionLayout {
            targets: TargetSpace::new(locals.len(), labels),
            locals,
            leaves,
        })
    }

    pub(crate) fn local(&self, local: LocalId) -> Result<&LocalInfo, CompilerError> {
        match self.locals.get(local.0 as usize) {
            Some(info) => Ok(info),
            None => {
                return_compiler_error!("Unknown local '{}'", local);
            }
        }
    }

    pub(crate) fn local_count(&self) -> usize {
        self.locals.len()
    }

    /// Walk a place's projection, dereferencing references implicitly.
    pub(crate) fn resolve_place(&self, types: &TypeTable, place: &Place) -> Result<PlaceInfo, CompilerError> {
        let local = self.local(place.local)?;
        let mut ty = local.ty;
        let mut direct_path = Vec::with_capacity(place.projection.len());
        let mut through_reference = false;

        for field in &place.projection {
            if let Some((pointee, _)) = types.reference_info(ty) {
                through_reference = true;
                ty = pointee;
            }

            let Some(decl) = types.field(ty, *field) else {
                return_compiler_error!(
                    "Place on local '{}' projects field {} of a type without it",
                    place.local,
                    field.0
                );
            };

            if !through_reference {
                direct_path.push(*field);
            }
            ty = decl.ty;
        }

        Ok(PlaceInfo {
            local: place.local,
            direct_path,
            through_reference,
            ty,
        })
    }

    /// Leaves of `local` covered by the field path `path`.
    pub(crate) fn cover(&self, local: LocalId, path: &[FieldId]) -> Result<LeafCover, CompilerError> {
        let info = self.local(local)?;
        let range = info.leaves();

        let mut start = None;
        let mut end = range.start;
        for index in range.clone() {
            if self.leaves[index].path.starts_with(path) {
                if start.is_none() {
                    start = Some(index);
                }
                end = index + 1;
            }
        }

        if let Some(start) = start {
            return Ok(LeafCover::Leaves(start..end));
        }

        for index in range {
            if path.starts_with(&self.leaves[index].path) {
                return Ok(LeafCover::Inside(index));
            }
        }

        return_compiler_error!(
            "Field path {:?} does not exist on local '{}'",
            path,
            local
        );
    }
}

fn flatten(
    types: &TypeTable,
    local: LocalId,
    ty: TypeId,
    path: &mut Vec<FieldId>,
    field_sensitive: bool,
    split_through_destructor: bool,
    leaves: &mut Vec<LeafInfo>,
) {
    // Self containing structs are rejected before lowering, the depth check keeps this finite anyway
    let splittable = field_sensitive
        && path.len() <= types.len()
        && (split_through_destructor || types.user_destructor(ty).is_none());

    if splittable {
        if let Some(decl) = types.struct_decl(ty) {
            if !decl.fields.is_empty() {
                for (index, field) in decl.fields.iter().enumerate() {
                    path.push(FieldId(index as u32));
                    flatten(types, local, field.ty, path, field_sensitive, false, leaves);
                    path.pop();
                }
                return;
            }
        }
    }

    leaves.push(LeafInfo {
        local,
        path: path.clone(),
        ty,
        needs_drop: types.needs_drop(ty),
        is_reference: types.is_reference(ty),
    });
}

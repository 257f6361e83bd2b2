use crate::compiler_frontend::analysis::origins::TargetSpace;
use crate::compiler_frontend::ir::ir_nodes::{FieldId, FunctionBody, LocalId, Place, TypeId};
use crate::compiler_frontend::ir::ir_types::TypeTable;
use crate::compiler_frontend::string_interning::StringTable;

/// Source-level names for the ids a diagnostic mentions.
#[derive(Clone, Copy)]
pub(super) struct OwnershipDiagnostics<'a> {
    body: &'a FunctionBody,
    types: &'a TypeTable,
    string_table: &'a StringTable,
}

impl<'a> OwnershipDiagnostics<'a> {
    pub(super) fn new(body: &'a FunctionBody, types: &'a TypeTable, string_table: &'a StringTable) -> Self {
        Self {
            body,
            types,
            string_table,
        }
    }

    pub(super) fn local_name(&self, local_id: LocalId) -> String {
        self.body
            .local(local_id)
            .map(|local| self.string_table.resolve(local.name).to_owned())
            .unwrap_or_else(|| format!("{}", local_id))
    }

    /// `p.inner.x` style name, stepping through references the same way places do
    pub(super) fn path_name(&self, local_id: LocalId, path: &[FieldId]) -> String {
        let mut name = self.local_name(local_id);
        let Some(mut ty) = self.body.local(local_id).map(|local| local.ty) else {
            return name;
        };

        for field in path {
            if let Some((pointee, _)) = self.types.reference_info(ty) {
                ty = pointee;
            }

            match self.types.field(ty, *field) {
                Some(decl) => {
                    name.push('.');
                    name.push_str(self.string_table.resolve(decl.name));
                    ty = decl.ty;
                }
                None => {
                    name.push_str(&format!(".{}", field.0));
                }
            }
        }

        name
    }

    pub(super) fn place_name(&self, place: &Place) -> String {
        self.path_name(place.local, &place.projection)
    }

    pub(super) fn field_path(&self, local_id: LocalId, path: &[FieldId]) -> String {
        if path.is_empty() {
            return String::new();
        }

        let full = self.path_name(local_id, path);
        let root = self.local_name(local_id);
        full.strip_prefix(&root)
            .map(|rest| rest.trim_start_matches('.').to_owned())
            .unwrap_or(full)
    }

    pub(super) fn target_name(&self, space: &TargetSpace, index: usize) -> String {
        space
            .target(index)
            .display(|local| self.local_name(local), self.string_table)
    }

    pub(super) fn type_name(&self, ty: TypeId) -> &'a str {
        self.types.display_name(ty, self.string_table)
    }

    pub(super) fn string_table(&self) -> &'a StringTable {
        self.string_table
    }
}

use crate::compiler_frontend::ir::ir_nodes::{FieldId, FunctionId, RefKind, TypeId};
use crate::compiler_frontend::ir::text_location::TextLocation;
use crate::compiler_frontend::string_interning::{StringId, StringTable};
use serde::Serialize;

pub const INT_TYPE: TypeId = TypeId(0);
pub const BOOL_TYPE: TypeId = TypeId(1);
pub const STR_TYPE: TypeId = TypeId(2);
pub const GENERIC_TYPE: TypeId = TypeId(3);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Destructor {
    /// Nothing to run
    Trivial,
    /// Runtime provided, e.g. freeing a string buffer
    Builtin,
    /// A user `__del__`
    User(FunctionId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TypeCapabilities {
    pub copy_op: bool,
    pub destructor: Destructor,
    pub take_op: bool,

    /// Small and side-effect free to copy, may live in registers
    pub register_passable: bool,
}

impl TypeCapabilities {
    pub const fn trivial() -> Self {
        TypeCapabilities {
            copy_op: true,
            destructor: Destructor::Trivial,
            take_op: false,
            register_passable: true,
        }
    }

    pub const fn move_only() -> Self {
        TypeCapabilities {
            copy_op: false,
            destructor: Destructor::Trivial,
            take_op: false,
            register_passable: false,
        }
    }

    pub const fn copyable() -> Self {
        TypeCapabilities {
            copy_op: true,
            destructor: Destructor::Trivial,
            take_op: false,
            register_passable: false,
        }
    }

    pub fn with_destructor(mut self, destructor: Destructor) -> Self {
        self.destructor = destructor;
        self
    }

    pub fn with_take(mut self) -> Self {
        self.take_op = true;
        self
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FieldDecl {
    pub name: StringId,
    pub ty: TypeId,

    /// Index into the owning struct's origin parameters for reference fields
    pub origin: Option<usize>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StructOriginParam {
    pub name: StringId,
    pub mutability: RefKind,
}

#[derive(Debug, Clone, Serialize)]
pub struct StructDecl {
    pub fields: Vec<FieldDecl>,
    pub origin_params: Vec<StructOriginParam>,
}

#[derive(Debug, Clone, Serialize)]
pub enum TypeKind {
    Int,
    Bool,
    Str,
    /// Wildcard used by overloads, matches any argument type
    Generic,
    Struct(StructDecl),
    Reference {
        pointee: TypeId,
        mutability: ReferenceMutability,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ReferenceMutability {
    Immutable,
    Mutable,
    /// Takes the mutability of whatever reference is stored into it
    Parametric,
}

#[derive(Debug, Clone, Serialize)]
pub struct TypeDecl {
    pub id: TypeId,
    pub name: StringId,
    pub kind: TypeKind,
    pub capabilities: TypeCapabilities,
    pub location: TextLocation,
}

#[derive(Debug, Clone, Serialize)]
pub struct TypeTable {
    types: Vec<TypeDecl>,
}

impl TypeTable {
    /// A table holding the builtin types at their fixed ids
    pub fn with_builtins(string_table: &mut StringTable) -> Self {
        let mut table = TypeTable { types: Vec::new() };

        table.push(
            string_table.intern("Int"),
            TypeKind::Int,
            TypeCapabilities::trivial(),
        );
        table.push(
            string_table.intern("Bool"),
            TypeKind::Bool,
            TypeCapabilities::trivial(),
        );
        table.push(
            string_table.intern("Str"),
            TypeKind::Str,
            TypeCapabilities::copyable().with_destructor(Destructor::Builtin),
        );
        table.push(
            string_table.intern("Generic"),
            TypeKind::Generic,
            TypeCapabilities::move_only(),
        );

        table
    }

    pub fn push(
        &mut self,
        name: StringId,
        kind: TypeKind,
        capabilities: TypeCapabilities,
    ) -> TypeId {
        let id = TypeId(self.types.len() as u32);
        self.types.push(TypeDecl {
            id,
            name,
            kind,
            capabilities,
            location: TextLocation::default(),
        });
        id
    }

    pub fn get(&self, id: TypeId) -> Option<&TypeDecl> {
        self.types.get(id.0 as usize)
    }

    pub fn get_mut(&mut self, id: TypeId) -> Option<&mut TypeDecl> {
        self.types.get_mut(id.0 as usize)
    }

    pub fn iter(&self) -> impl Iterator<Item = &TypeDecl> {
        self.types.iter()
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// Find an existing reference type or register a new one
    pub fn reference_to(
        &mut self,
        pointee: TypeId,
        mutability: ReferenceMutability,
        string_table: &mut StringTable,
    ) -> TypeId {
        let existing = self.types.iter().find(|decl| {
            matches!(
                decl.kind,
                TypeKind::Reference { pointee: p, mutability: m } if p == pointee && m == mutability
            )
        });

        if let Some(decl) = existing {
            return decl.id;
        }

        let prefix = match mutability {
            ReferenceMutability::Immutable => "ref",
            ReferenceMutability::Mutable => "mut ref",
            ReferenceMutability::Parametric => "ref[_]",
        };
        let name = format!("{} {}", prefix, self.display_name(pointee, string_table));
        let name = string_table.intern(&name);

        self.push(
            name,
            TypeKind::Reference {
                pointee,
                mutability,
            },
            TypeCapabilities::trivial(),
        )
    }

    pub fn display_name<'a>(&self, id: TypeId, string_table: &'a StringTable) -> &'a str {
        match self.get(id) {
            Some(decl) => string_table.resolve(decl.name),
            None => "<unknown type>",
        }
    }

    pub fn struct_decl(&self, id: TypeId) -> Option<&StructDecl> {
        match self.get(id).map(|decl| &decl.kind) {
            Some(TypeKind::Struct(decl)) => Some(decl),
            _ => None,
        }
    }

    pub fn field(&self, id: TypeId, field: FieldId) -> Option<&FieldDecl> {
        self.struct_decl(id)?.fields.get(field.0 as usize)
    }

    pub fn field_named(&self, id: TypeId, name: StringId) -> Option<FieldId> {
        self.struct_decl(id)?
            .fields
            .iter()
            .position(|field| field.name == name)
            .map(|index| FieldId(index as u32))
    }

    pub fn reference_info(&self, id: TypeId) -> Option<(TypeId, ReferenceMutability)> {
        match self.get(id).map(|decl| &decl.kind) {
            Some(TypeKind::Reference {
                pointee,
                mutability,
            }) => Some((*pointee, *mutability)),
            _ => None,
        }
    }

    pub fn is_reference(&self, id: TypeId) -> bool {
        self.reference_info(id).is_some()
    }

    pub fn is_generic(&self, id: TypeId) -> bool {
        matches!(self.get(id).map(|decl| &decl.kind), Some(TypeKind::Generic))
    }

    pub fn capabilities(&self, id: TypeId) -> TypeCapabilities {
        self.get(id)
            .map(|decl| decl.capabilities)
            .unwrap_or_else(TypeCapabilities::move_only)
    }

    pub fn is_copyable(&self, id: TypeId) -> bool {
        self.capabilities(id).copy_op
    }

    pub fn user_destructor(&self, id: TypeId) -> Option<FunctionId> {
        match self.capabilities(id).destructor {
            Destructor::User(function) => Some(function),
            Destructor::Trivial | Destructor::Builtin => None,
        }
    }

    /// Whether destroying a value of this type runs any code at all
    pub fn needs_drop(&self, id: TypeId) -> bool {
        self.needs_drop_inner(id, 0)
    }

    fn needs_drop_inner(&self, id: TypeId, depth: usize) -> bool {
        // Struct recursion without indirection is rejected by the front end, this is a backstop.
        if depth > self.types.len() {
            return false;
        }

        let Some(decl) = self.get(id) else {
            return false;
        };

        if decl.capabilities.destructor != Destructor::Trivial {
            return true;
        }

        match &decl.kind {
            TypeKind::Struct(struct_decl) => struct_decl
                .fields
                .iter()
                .any(|field| self.needs_drop_inner(field.ty, depth + 1)),
            _ => false,
        }
    }

    /// Whether values of this type hold references and so carry origins
    pub fn carries_origins(&self, id: TypeId) -> bool {
        self.carries_origins_inner(id, 0)
    }

    fn carries_origins_inner(&self, id: TypeId, depth: usize) -> bool {
        if depth > self.types.len() {
            return false;
        }

        match self.get(id).map(|decl| &decl.kind) {
            Some(TypeKind::Reference { .. }) => true,
            Some(TypeKind::Struct(struct_decl)) => {
                !struct_decl.origin_params.is_empty()
                    || struct_decl
                        .fields
                        .iter()
                        .any(|field| self.carries_origins_inner(field.ty, depth + 1))
            }
            _ => false,
        }
    }

    /// Whether any reference this type carries may be used to mutate
    pub fn holds_mutable_references(&self, id: TypeId) -> Option<bool> {
        match self.get(id).map(|decl| &decl.kind) {
            Some(TypeKind::Reference { mutability, .. }) => match mutability {
                ReferenceMutability::Immutable => Some(false),
                ReferenceMutability::Mutable => Some(true),
                ReferenceMutability::Parametric => None,
            },
            Some(TypeKind::Struct(struct_decl)) => Some(
                struct_decl
                    .origin_params
                    .iter()
                    .any(|param| param.mutability.is_mutable()),
            ),
            _ => Some(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair_type(table: &mut TypeTable, strings: &mut StringTable) -> TypeId {
        let lo = strings.intern("lo");
        let hi = strings.intern("hi");
        let name = strings.intern("Pair");
        table.push(
            name,
            TypeKind::Struct(StructDecl {
                fields: vec![
                    FieldDecl {
                        name: lo,
                        ty: INT_TYPE,
                        origin: None,
                    },
                    FieldDecl {
                        name: hi,
                        ty: STR_TYPE,
                        origin: None,
                    },
                ],
                origin_params: Vec::new(),
            }),
            TypeCapabilities::move_only(),
        )
    }

    #[test]
    fn builtins_live_at_fixed_ids() {
        let mut strings = StringTable::new();
        let table = TypeTable::with_builtins(&mut strings);

        assert_eq!(table.display_name(INT_TYPE, &strings), "Int");
        assert_eq!(table.display_name(STR_TYPE, &strings), "Str");
        assert!(table.is_copyable(INT_TYPE));
        assert!(!table.needs_drop(INT_TYPE));
        assert!(table.needs_drop(STR_TYPE));
        assert!(table.is_generic(GENERIC_TYPE));
    }

    #[test]
    fn aggregates_need_drop_through_their_fields() {
        let mut strings = StringTable::new();
        let mut table = TypeTable::with_builtins(&mut strings);
        let pair = pair_type(&mut table, &mut strings);

        assert!(table.needs_drop(pair));
        assert!(!table.carries_origins(pair));
        assert_eq!(
            table.field_named(pair, strings.intern("hi")),
            Some(FieldId(1))
        );
    }

    #[test]
    fn reference_types_are_deduplicated() {
        let mut strings = StringTable::new();
        let mut table = TypeTable::with_builtins(&mut strings);

        let first = table.reference_to(STR_TYPE, ReferenceMutability::Mutable, &mut strings);
        let second = table.reference_to(STR_TYPE, ReferenceMutability::Mutable, &mut strings);
        let shared = table.reference_to(STR_TYPE, ReferenceMutability::Immutable, &mut strings);

        assert_eq!(first, second);
        assert_ne!(first, shared);
        assert!(table.carries_origins(first));
        assert_eq!(table.holds_mutable_references(first), Some(true));
        assert_eq!(table.display_name(shared, &strings), "ref Str");
    }
}

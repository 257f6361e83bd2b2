//! ============================================================
//!                     Ownership IR
//! ============================================================
//! A fully resolved, typed control-flow graph per function.
//!  - All names are interned, all types resolved to TypeIds
//!  - Locals are explicit, parameters included
//!  - Every statement has a module-unique StmtId
//!  - Transfer intent (`x^`) is explicit in operands
//!
//! The ownership checker never sees source syntax. A front end lowers its AST
//! into this form (see `ir_builder`) and the checker reports back in terms of
//! LocalIds, StmtIds and BlockIds.
//!
//! Index conventions: `LocalId(i)` is `body.locals[i]`, `BlockId(i)` is
//! `body.blocks[i]` and `FunctionId(i)` is `module.functions[i]`.

use crate::compiler_frontend::ir::ir_types::TypeTable;
use crate::compiler_frontend::ir::text_location::TextLocation;
use crate::compiler_frontend::string_interning::{StringId, StringTable};
use serde::Serialize;

// ============================================================
// Stable IDs
// ============================================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct FunctionId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct BlockId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct LocalId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct StmtId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct TypeId(pub u32);

/// Index of a field inside its struct declaration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct FieldId(pub u32);

impl std::fmt::Display for FunctionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "fn{}", self.0)
    }
}

impl std::fmt::Display for BlockId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "bb{}", self.0)
    }
}

impl std::fmt::Display for LocalId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "_{}", self.0)
    }
}

impl std::fmt::Display for StmtId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "s{}", self.0)
    }
}

// ============================================================
// Module
// ============================================================
#[derive(Debug, Clone, Serialize)]
pub struct IrModule {
    pub types: TypeTable,
    pub functions: Vec<FunctionDecl>,
    #[serde(skip)]
    pub string_table: StringTable,
}

impl IrModule {
    pub fn function(&self, id: FunctionId) -> Option<&FunctionDecl> {
        self.functions.get(id.0 as usize)
    }

    pub fn functions_named(&self, name: StringId) -> impl Iterator<Item = &FunctionDecl> + '_ {
        self.functions
            .iter()
            .filter(move |function| function.name == name)
    }

    pub fn name(&self, id: StringId) -> &str {
        self.string_table.resolve(id)
    }
}

// ============================================================
// Functions
// ============================================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FunctionRole {
    Plain,
    /// `__init__` style: the first parameter is the uninitialized receiver
    Constructor(TypeId),
    /// `__del__` style: the first parameter is the owned receiver
    Destructor(TypeId),
}

#[derive(Debug, Clone, Serialize)]
pub struct FunctionDecl {
    pub id: FunctionId,
    pub name: StringId,
    pub role: FunctionRole,
    pub signature: FunctionSignature,

    /// None for external declarations that only provide a signature
    pub body: Option<FunctionBody>,
    pub location: TextLocation,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct FunctionSignature {
    pub origin_params: Vec<OriginParam>,
    pub params: Vec<Parameter>,
    pub result: Option<ResultDecl>,
}

impl FunctionSignature {
    pub fn origin_param(&self, name: StringId) -> Option<&OriginParam> {
        self.origin_params.iter().find(|param| param.name == name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum OriginMutability {
    Immutable,
    Mutable,
    /// Decided at each call site from the mutability of the bound arguments
    Parametric,
}

/// A named origin parameter such as `a` in `fn longest[a](x: ref[a] Str, ...)`.
#[derive(Debug, Clone, Serialize)]
pub struct OriginParam {
    pub name: StringId,
    pub mutability: OriginMutability,

    /// Callers must bind this origin to exactly one target
    pub unique: bool,
    pub location: TextLocation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ParamKeyword {
    Read,
    Mut,
    Owned,
    Out,
    Ref,
}

#[derive(Debug, Clone, Serialize)]
pub struct Parameter {
    pub name: StringId,
    pub ty: TypeId,
    pub keyword: ParamKeyword,

    /// Origin parameter this argument is tied to, if the signature names one
    pub origin: Option<StringId>,
    pub location: TextLocation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ResultKeyword {
    Owned,
    Ref,
    Out,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ResultOrigin {
    Named(StringId),
    Static,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResultDecl {
    pub ty: TypeId,
    pub keyword: ResultKeyword,
    pub origin: Option<ResultOrigin>,
    pub location: TextLocation,
}

// ============================================================
// Bodies
// ============================================================
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FunctionBody {
    pub locals: Vec<LocalDecl>,
    pub blocks: Vec<BasicBlock>,
    pub entry: BlockId,
}

impl FunctionBody {
    pub fn local(&self, id: LocalId) -> Option<&LocalDecl> {
        self.locals.get(id.0 as usize)
    }

    pub fn block(&self, id: BlockId) -> Option<&BasicBlock> {
        self.blocks.get(id.0 as usize)
    }

    pub fn param_local(&self, index: u32) -> Option<LocalId> {
        self.locals
            .iter()
            .find(|local| local.kind == LocalKind::Param(index))
            .map(|local| local.id)
    }

    pub fn result_local(&self) -> Option<LocalId> {
        self.locals
            .iter()
            .find(|local| local.kind == LocalKind::Result)
            .map(|local| local.id)
    }

    pub fn statement_count(&self) -> usize {
        self.blocks.iter().map(|block| block.statements.len()).sum()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum LocalKind {
    Var,
    /// Compiler generated temporary
    Temp,
    Param(u32),
    /// Storage for an `out` result
    Result,
    /// Process-wide storage, always initialized and never destroyed
    Static,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LocalDecl {
    pub id: LocalId,
    pub name: StringId,
    pub ty: TypeId,
    pub mutable: bool,
    pub kind: LocalKind,
    pub location: TextLocation,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BasicBlock {
    pub id: BlockId,
    pub statements: Vec<Statement>,
    pub terminator: Terminator,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Statement {
    pub id: StmtId,
    pub kind: StatementKind,
    pub location: TextLocation,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum StatementKind {
    /// `var x` or `var x = value`
    Let {
        local: LocalId,
        value: Option<Rvalue>,
    },

    Assign {
        target: Place,
        value: Rvalue,
    },

    Call {
        target: CallTarget,
        args: Vec<Operand>,
        destination: Option<Place>,
    },

    /// Evaluated for effect, the value is discarded
    Expr(Rvalue),

    /// Only produced by drop lowering
    Drop(DropStatement),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum CallTarget {
    Function(FunctionId),
    /// Resolved against every function with this name
    Overloaded(StringId),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DropStatement {
    pub subject: DropSubject,

    /// Guarded by the runtime drop flag of the subject
    pub conditional: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum DropSubject {
    Binding {
        local: LocalId,
        field_path: Vec<FieldId>,
    },
    /// The value a reference points at, destroyed before it is overwritten
    Referent(Place),
    /// An unnamed value produced by the statement the drop follows
    Temporary { ty: TypeId },
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct Place {
    pub local: LocalId,

    /// Field accesses, projecting through a reference dereferences it
    pub projection: Vec<FieldId>,
}

impl Place {
    pub fn local(local: LocalId) -> Self {
        Place {
            local,
            projection: Vec::new(),
        }
    }

    pub fn field(mut self, field: FieldId) -> Self {
        self.projection.push(field);
        self
    }

    pub fn is_whole_local(&self) -> bool {
        self.projection.is_empty()
    }
}

impl From<LocalId> for Place {
    fn from(local: LocalId) -> Self {
        Place::local(local)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Constant {
    Int(i64),
    Bool(bool),
    Str(StringId),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Operand {
    /// Plain use, copies or borrows depending on where it appears
    Use(Place),
    /// Explicit transfer marker `x^`
    Transfer(Place),
    Constant(Constant),
}

impl Operand {
    pub fn place(&self) -> Option<&Place> {
        match self {
            Operand::Use(place) | Operand::Transfer(place) => Some(place),
            Operand::Constant(_) => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum RefKind {
    Immutable,
    Mutable,
}

impl RefKind {
    pub fn is_mutable(self) -> bool {
        self == RefKind::Mutable
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum BinaryOperator {
    Add,
    Subtract,
    Multiply,
    Equal,
    NotEqual,
    LessThan,
    And,
    Or,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Rvalue {
    Use(Operand),
    Ref {
        place: Place,
        mutability: RefKind,
    },
    /// `then_place if condition else else_place`, producing a reference
    Select {
        condition: Operand,
        then_place: Place,
        else_place: Place,
        mutability: RefKind,
    },
    Construct {
        ty: TypeId,
        fields: Vec<Operand>,
    },
    BinaryOp {
        op: BinaryOperator,
        left: Operand,
        right: Operand,
    },
    /// Destructive take, leaves the source valid but empty
    Take(Place),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Terminator {
    pub kind: TerminatorKind,
    pub location: TextLocation,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum TerminatorKind {
    Goto(BlockId),
    Branch {
        condition: Operand,
        then_block: BlockId,
        else_block: BlockId,
    },
    Return(Option<Operand>),
    /// Error exit
    Raise(Option<Operand>),
    Unreachable,
}

impl TerminatorKind {
    pub fn successors(&self) -> Vec<BlockId> {
        match self {
            TerminatorKind::Goto(target) => vec![*target],
            TerminatorKind::Branch {
                then_block,
                else_block,
                ..
            } => {
                if then_block == else_block {
                    vec![*then_block]
                } else {
                    vec![*then_block, *else_block]
                }
            }
            TerminatorKind::Return(_) | TerminatorKind::Raise(_) | TerminatorKind::Unreachable => {
                Vec::new()
            }
        }
    }

    pub fn retarget(&mut self, from: BlockId, to: BlockId) {
        match self {
            TerminatorKind::Goto(target) => {
                if *target == from {
                    *target = to;
                }
            }
            TerminatorKind::Branch {
                then_block,
                else_block,
                ..
            } => {
                if *then_block == from {
                    *then_block = to;
                }
                if *else_block == from {
                    *else_block = to;
                }
            }
            TerminatorKind::Return(_) | TerminatorKind::Raise(_) | TerminatorKind::Unreachable => {}
        }
    }
}

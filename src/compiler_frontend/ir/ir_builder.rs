//! Programmatic construction of ownership IR.
//!
//! Front ends lower into the IR through these builders, and the checker tests
//! use them to write small programs directly.

use crate::compiler_frontend::compiler_errors::CompilerError;
use crate::compiler_frontend::ir::ir_nodes::{
    BasicBlock, BinaryOperator, BlockId, CallTarget, Constant, FieldId, FunctionBody,
    FunctionDecl, FunctionId, FunctionRole, FunctionSignature, IrModule, LocalDecl, LocalId,
    LocalKind, Operand, OriginMutability, OriginParam, ParamKeyword, Parameter, Place, RefKind,
    ResultDecl, ResultKeyword, ResultOrigin, Rvalue, Statement, StatementKind, StmtId, Terminator,
    TerminatorKind, TypeId,
};
use crate::compiler_frontend::ir::ir_types::{
    Destructor, FieldDecl, ReferenceMutability, StructDecl, StructOriginParam, TypeCapabilities,
    TypeKind, TypeTable,
};
use crate::compiler_frontend::ir::text_location::TextLocation;
use crate::compiler_frontend::string_interning::{StringId, StringTable};
use crate::return_compiler_error;
use crate::settings::LOCALS_CAPACITY;

pub struct ModuleBuilder {
    types: TypeTable,
    functions: Vec<FunctionDecl>,
    string_table: StringTable,
    next_statement: u32,
}

impl Default for ModuleBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ModuleBuilder {
    pub fn new() -> Self {
        let mut string_table = StringTable::new();
        let types = TypeTable::with_builtins(&mut string_table);

        ModuleBuilder {
            types,
            functions: Vec::new(),
            string_table,
            next_statement: 0,
        }
    }

    pub fn intern(&mut self, name: &str) -> StringId {
        self.string_table.intern(name)
    }

    pub fn types(&self) -> &TypeTable {
        &self.types
    }

    /// Declare a struct without origin parameters.
    pub fn declare_struct(
        &mut self,
        name: &str,
        fields: &[(&str, TypeId)],
        capabilities: TypeCapabilities,
    ) -> TypeId {
        let fields = fields
            .iter()
            .map(|(field_name, ty)| (*field_name, *ty, None))
            .collect::<Vec<_>>();
        self.declare_struct_with_origins(name, &[], &fields, capabilities)
    }

    /// Declare a struct whose reference fields are tied to its origin parameters.
    /// Each field names the index of its origin parameter, if it holds a reference.
    pub fn declare_struct_with_origins(
        &mut self,
        name: &str,
        origin_params: &[(&str, RefKind)],
        fields: &[(&str, TypeId, Option<usize>)],
        capabilities: TypeCapabilities,
    ) -> TypeId {
        let origin_params = origin_params
            .iter()
            .map(|(param_name, mutability)| StructOriginParam {
                name: self.string_table.intern(param_name),
                mutability: *mutability,
            })
            .collect::<Vec<_>>();

        let fields = fields
            .iter()
            .map(|(field_name, ty, origin)| FieldDecl {
                name: self.string_table.intern(field_name),
                ty: *ty,
                origin: *origin,
            })
            .collect::<Vec<_>>();

        let name = self.string_table.intern(name);
        self.types.push(
            name,
            TypeKind::Struct(StructDecl {
                fields,
                origin_params,
            }),
            capabilities,
        )
    }

    pub fn reference(&mut self, pointee: TypeId, mutability: ReferenceMutability) -> TypeId {
        self.types
            .reference_to(pointee, mutability, &mut self.string_table)
    }

    pub fn field(&mut self, ty: TypeId, name: &str) -> Option<FieldId> {
        let name = self.string_table.intern(name);
        self.types.field_named(ty, name)
    }

    pub fn set_destructor(&mut self, ty: TypeId, destructor: FunctionId) {
        if let Some(decl) = self.types.get_mut(ty) {
            decl.capabilities.destructor = Destructor::User(destructor);
        }
    }

    pub fn set_capabilities(&mut self, ty: TypeId, capabilities: TypeCapabilities) {
        if let Some(decl) = self.types.get_mut(ty) {
            decl.capabilities = capabilities;
        }
    }

    pub fn function(&mut self, name: &str) -> FunctionBuilder<'_> {
        let name = self.string_table.intern(name);
        let id = FunctionId(self.functions.len() as u32);

        let entry = BlockId(0);
        FunctionBuilder {
            module: self,
            id,
            name,
            role: FunctionRole::Plain,
            signature: FunctionSignature::default(),
            locals: Vec::with_capacity(LOCALS_CAPACITY),
            blocks: vec![PendingBlock::new(entry)],
            current: entry,
            location: TextLocation::default(),
        }
    }

    pub fn str_constant(&mut self, text: &str) -> Operand {
        Operand::Constant(Constant::Str(self.string_table.intern(text)))
    }

    pub fn finish(self) -> IrModule {
        IrModule {
            types: self.types,
            functions: self.functions,
            string_table: self.string_table,
        }
    }

    fn next_statement_id(&mut self) -> StmtId {
        let id = StmtId(self.next_statement);
        self.next_statement += 1;
        id
    }
}

struct PendingBlock {
    id: BlockId,
    statements: Vec<Statement>,
    terminator: Option<Terminator>,
}

impl PendingBlock {
    fn new(id: BlockId) -> Self {
        PendingBlock {
            id,
            statements: Vec::new(),
            terminator: None,
        }
    }
}

pub struct FunctionBuilder<'m> {
    module: &'m mut ModuleBuilder,
    id: FunctionId,
    name: StringId,
    role: FunctionRole,
    signature: FunctionSignature,
    locals: Vec<LocalDecl>,
    blocks: Vec<PendingBlock>,
    current: BlockId,
    location: TextLocation,
}

impl<'m> FunctionBuilder<'m> {
    pub fn id(&self) -> FunctionId {
        self.id
    }

    pub fn module(&mut self) -> &mut ModuleBuilder {
        &mut *self.module
    }

    pub fn role(&mut self, role: FunctionRole) -> &mut Self {
        self.role = role;
        self
    }

    /// Subsequent statements and declarations are attributed to this source line.
    pub fn at_line(&mut self, line: i32) -> &mut Self {
        self.location = TextLocation::new_just_line(line);
        self
    }

    pub fn origin_param(&mut self, name: &str, mutability: OriginMutability) -> StringId {
        self.push_origin_param(name, mutability, false)
    }

    /// An origin parameter that callers must bind to a single target.
    pub fn unique_origin_param(&mut self, name: &str, mutability: OriginMutability) -> StringId {
        self.push_origin_param(name, mutability, true)
    }

    fn push_origin_param(
        &mut self,
        name: &str,
        mutability: OriginMutability,
        unique: bool,
    ) -> StringId {
        let name = self.module.intern(name);
        self.signature.origin_params.push(OriginParam {
            name,
            mutability,
            unique,
            location: self.location,
        });
        name
    }

    pub fn param(&mut self, name: &str, ty: TypeId, keyword: ParamKeyword) -> LocalId {
        self.param_with_origin(name, ty, keyword, None)
    }

    pub fn param_with_origin(
        &mut self,
        name: &str,
        ty: TypeId,
        keyword: ParamKeyword,
        origin: Option<&str>,
    ) -> LocalId {
        let name_id = self.module.intern(name);
        let origin = origin.map(|origin| self.module.intern(origin));
        let index = self.signature.params.len() as u32;

        self.signature.params.push(Parameter {
            name: name_id,
            ty,
            keyword,
            origin,
            location: self.location,
        });

        let mutable = matches!(keyword, ParamKeyword::Mut | ParamKeyword::Out | ParamKeyword::Owned);
        self.push_local(name_id, ty, mutable, LocalKind::Param(index))
    }

    /// Declare the function result. `out` results get a Result local to write into.
    pub fn result(
        &mut self,
        ty: TypeId,
        keyword: ResultKeyword,
        origin: Option<ResultOrigin>,
    ) -> Option<LocalId> {
        self.signature.result = Some(ResultDecl {
            ty,
            keyword,
            origin,
            location: self.location,
        });

        if keyword == ResultKeyword::Out {
            let name = self.module.intern("__result");
            return Some(self.push_local(name, ty, true, LocalKind::Result));
        }

        None
    }

    pub fn named_origin(&mut self, name: &str) -> ResultOrigin {
        ResultOrigin::Named(self.module.intern(name))
    }

    pub fn local(&mut self, name: &str, ty: TypeId, mutable: bool) -> LocalId {
        let name = self.module.intern(name);
        self.push_local(name, ty, mutable, LocalKind::Var)
    }

    pub fn temp(&mut self, ty: TypeId) -> LocalId {
        let name = format!("%{}", self.locals.len());
        let name = self.module.intern(&name);
        self.push_local(name, ty, true, LocalKind::Temp)
    }

    pub fn static_local(&mut self, name: &str, ty: TypeId, mutable: bool) -> LocalId {
        let name = self.module.intern(name);
        self.push_local(name, ty, mutable, LocalKind::Static)
    }

    fn push_local(&mut self, name: StringId, ty: TypeId, mutable: bool, kind: LocalKind) -> LocalId {
        let id = LocalId(self.locals.len() as u32);
        self.locals.push(LocalDecl {
            id,
            name,
            ty,
            mutable,
            kind,
            location: self.location,
        });
        id
    }

    pub fn new_block(&mut self) -> BlockId {
        let id = BlockId(self.blocks.len() as u32);
        self.blocks.push(PendingBlock::new(id));
        id
    }

    pub fn switch_to(&mut self, block: BlockId) -> &mut Self {
        self.current = block;
        self
    }

    pub fn current_block(&self) -> BlockId {
        self.current
    }

    // ------------------------------------------------------------
    // Statements
    // ------------------------------------------------------------
    pub fn declare(&mut self, local: LocalId) -> StmtId {
        self.push_statement(StatementKind::Let { local, value: None })
    }

    pub fn let_(&mut self, local: LocalId, value: Rvalue) -> StmtId {
        self.push_statement(StatementKind::Let {
            local,
            value: Some(value),
        })
    }

    pub fn assign(&mut self, target: impl Into<Place>, value: Rvalue) -> StmtId {
        self.push_statement(StatementKind::Assign {
            target: target.into(),
            value,
        })
    }

    pub fn call(
        &mut self,
        function: FunctionId,
        args: Vec<Operand>,
        destination: Option<Place>,
    ) -> StmtId {
        self.push_statement(StatementKind::Call {
            target: CallTarget::Function(function),
            args,
            destination,
        })
    }

    pub fn call_overloaded(
        &mut self,
        name: &str,
        args: Vec<Operand>,
        destination: Option<Place>,
    ) -> StmtId {
        let name = self.module.intern(name);
        self.push_statement(StatementKind::Call {
            target: CallTarget::Overloaded(name),
            args,
            destination,
        })
    }

    pub fn expr(&mut self, value: Rvalue) -> StmtId {
        self.push_statement(StatementKind::Expr(value))
    }

    fn push_statement(&mut self, kind: StatementKind) -> StmtId {
        let id = self.module.next_statement_id();
        let location = self.location;

        if let Some(block) = self.blocks.get_mut(self.current.0 as usize) {
            block.statements.push(Statement { id, kind, location });
        }

        id
    }

    // ------------------------------------------------------------
    // Terminators
    // ------------------------------------------------------------
    pub fn goto(&mut self, target: BlockId) {
        self.terminate(TerminatorKind::Goto(target));
    }

    pub fn branch(&mut self, condition: Operand, then_block: BlockId, else_block: BlockId) {
        self.terminate(TerminatorKind::Branch {
            condition,
            then_block,
            else_block,
        });
    }

    pub fn ret(&mut self, value: Option<Operand>) {
        self.terminate(TerminatorKind::Return(value));
    }

    pub fn raise(&mut self, value: Option<Operand>) {
        self.terminate(TerminatorKind::Raise(value));
    }

    pub fn unreachable(&mut self) {
        self.terminate(TerminatorKind::Unreachable);
    }

    fn terminate(&mut self, kind: TerminatorKind) {
        let location = self.location;
        if let Some(block) = self.blocks.get_mut(self.current.0 as usize) {
            block.terminator = Some(Terminator { kind, location });
        }
    }

    /// Finish a function with a body. Every block must have a terminator.
    pub fn finish(self) -> Result<FunctionId, CompilerError> {
        let mut blocks = Vec::with_capacity(self.blocks.len());
        for pending in self.blocks {
            let Some(terminator) = pending.terminator else {
                return_compiler_error!(
                    "Block '{}' of function '{}' has no terminator",
                    pending.id,
                    self.module.string_table.resolve(self.name)
                );
            };

            blocks.push(BasicBlock {
                id: pending.id,
                statements: pending.statements,
                terminator,
            });
        }

        let body = FunctionBody {
            locals: self.locals,
            blocks,
            entry: BlockId(0),
        };

        Ok(Self::push_function(
            self.module,
            self.id,
            self.name,
            self.role,
            self.signature,
            Some(body),
            self.location,
        ))
    }

    /// Finish a signature-only declaration, such as a runtime provided function.
    pub fn finish_external(self) -> FunctionId {
        Self::push_function(
            self.module,
            self.id,
            self.name,
            self.role,
            self.signature,
            None,
            self.location,
        )
    }

    fn push_function(
        module: &mut ModuleBuilder,
        id: FunctionId,
        name: StringId,
        role: FunctionRole,
        signature: FunctionSignature,
        body: Option<FunctionBody>,
        location: TextLocation,
    ) -> FunctionId {
        module.functions.push(FunctionDecl {
            id,
            name,
            role,
            signature,
            body,
            location,
        });
        id
    }
}

// ------------------------------------------------------------
// Small constructors that keep builder call sites readable
// ------------------------------------------------------------
impl Operand {
    pub fn copy(place: impl Into<Place>) -> Self {
        Operand::Use(place.into())
    }

    pub fn transfer(place: impl Into<Place>) -> Self {
        Operand::Transfer(place.into())
    }

    pub fn int(value: i64) -> Self {
        Operand::Constant(Constant::Int(value))
    }

    pub fn bool(value: bool) -> Self {
        Operand::Constant(Constant::Bool(value))
    }
}

impl Rvalue {
    pub fn use_of(place: impl Into<Place>) -> Self {
        Rvalue::Use(Operand::Use(place.into()))
    }

    pub fn transfer(place: impl Into<Place>) -> Self {
        Rvalue::Use(Operand::Transfer(place.into()))
    }

    pub fn int(value: i64) -> Self {
        Rvalue::Use(Operand::int(value))
    }

    pub fn bool(value: bool) -> Self {
        Rvalue::Use(Operand::bool(value))
    }

    pub fn borrow(place: impl Into<Place>) -> Self {
        Rvalue::Ref {
            place: place.into(),
            mutability: RefKind::Immutable,
        }
    }

    pub fn borrow_mut(place: impl Into<Place>) -> Self {
        Rvalue::Ref {
            place: place.into(),
            mutability: RefKind::Mutable,
        }
    }

    pub fn add(left: Operand, right: Operand) -> Self {
        Rvalue::BinaryOp {
            op: BinaryOperator::Add,
            left,
            right,
        }
    }
}

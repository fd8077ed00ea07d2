//! Instruction IR emitted by exception-handling lowering.
//!
//! Lowered code is a flat instruction sequence per function. Protected
//! regions are delimited by [`Instr::RegionStart`]/[`Instr::RegionEnd`]
//! markers; the end marker carries what unwinding does when an exception
//! leaves the region. Region nesting for unwinding follows the explicit
//! `parent` recorded on the start marker, which lets deferred handler code
//! sit physically inside the function's terminate region while its own
//! cleanups still unwind to the scope that encloses the `try` statement.

mod pretty;

pub use pretty::{format_function, format_instr};

use std::fmt;
use std::rc::Rc;

use crate::diagnostics::Span;
use crate::eh::MatchingDescriptor;
use crate::types::Ty;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LocalId(pub usize);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LabelId(pub usize);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RegionId(pub usize);

impl fmt::Display for LocalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "_{}", self.0)
    }
}

impl fmt::Display for LabelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "L{}", self.0)
    }
}

impl fmt::Display for RegionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "r{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LocalKind {
    /// Declared in source (catch parameters).
    User,
    /// Compiler temporary holding an evaluated value.
    Temp,
    /// Compiler-introduced binding with a fixed role, such as the exception
    /// context alias or an exception-specification type array.
    Artificial,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LocalDecl {
    pub name: Option<String>,
    pub ty: Ty,
    pub kind: LocalKind,
    pub span: Option<Span>,
}

impl LocalDecl {
    #[must_use]
    pub fn new(name: Option<String>, ty: Ty, kind: LocalKind, span: Option<Span>) -> Self {
        Self {
            name,
            ty,
            kind,
            span,
        }
    }
}

/// Fields of the runtime's exception context record, in layout order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ContextField {
    EhInfo,
    Value,
    Type,
    Cleanup,
    Caught,
    Next,
    Handlers,
}

impl ContextField {
    pub const ALL: [ContextField; 7] = [
        ContextField::EhInfo,
        ContextField::Value,
        ContextField::Type,
        ContextField::Cleanup,
        ContextField::Caught,
        ContextField::Next,
        ContextField::Handlers,
    ];

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            ContextField::EhInfo => "eh_info",
            ContextField::Value => "value",
            ContextField::Type => "type",
            ContextField::Cleanup => "cleanup",
            ContextField::Caught => "caught",
            ContextField::Next => "next",
            ContextField::Handlers => "handlers",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Operand {
    Local(LocalId),
    Int(i128),
    Null,
    /// Address of a type-info object used as a matching key.
    Descriptor(MatchingDescriptor),
    /// Address of a function.
    FnAddr(String),
    AddrOf(Box<Operand>),
    Deref(Box<Operand>),
    Field(Box<Operand>, ContextField),
    Convert { value: Box<Operand>, ty: Ty },
    Aggregate(Vec<Operand>),
    /// Value already lowered by the expression collaborator.
    Opaque(String),
}

impl Operand {
    #[must_use]
    pub fn opaque(text: impl Into<String>) -> Self {
        Operand::Opaque(text.into())
    }

    #[must_use]
    pub fn addr_of(self) -> Self {
        Operand::AddrOf(Box::new(self))
    }

    #[must_use]
    pub fn deref(self) -> Self {
        Operand::Deref(Box::new(self))
    }

    #[must_use]
    pub fn field(self, field: ContextField) -> Self {
        Operand::Field(Box::new(self), field)
    }

    #[must_use]
    pub fn convert(self, ty: Ty) -> Self {
        Operand::Convert {
            value: Box::new(self),
            ty,
        }
    }

    /// Innermost local the operand is computed from, if any.
    #[must_use]
    pub fn base_local(&self) -> Option<LocalId> {
        match self {
            Operand::Local(local) => Some(*local),
            Operand::AddrOf(inner) | Operand::Deref(inner) | Operand::Field(inner, _) => {
                inner.base_local()
            }
            Operand::Convert { value, .. } => value.base_local(),
            _ => None,
        }
    }
}

/// Signature of a declared function.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FnSignature {
    pub params: Vec<Ty>,
    pub ret: Ty,
    /// Calls never return normally.
    pub noreturn: bool,
}

impl FnSignature {
    #[must_use]
    pub fn new(params: Vec<Ty>, ret: Ty) -> Self {
        Self {
            params,
            ret,
            noreturn: false,
        }
    }

    #[must_use]
    pub fn noreturn(mut self) -> Self {
        self.noreturn = true;
        self
    }
}

/// An external function declared on behalf of generated code.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FnDecl {
    pub symbol: String,
    pub signature: FnSignature,
    pub external: bool,
    pub public: bool,
    pub artificial: bool,
}

/// Shared handle to a declared function.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FnHandle(Rc<FnDecl>);

impl FnHandle {
    #[must_use]
    pub fn new(decl: FnDecl) -> Self {
        Self(Rc::new(decl))
    }

    #[must_use]
    pub fn symbol(&self) -> &str {
        &self.0.symbol
    }

    #[must_use]
    pub fn signature(&self) -> &FnSignature {
        &self.0.signature
    }

    #[must_use]
    pub fn decl(&self) -> &FnDecl {
        &self.0
    }

    #[must_use]
    pub fn ptr_eq(&self, other: &FnHandle) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Callee {
    Runtime(FnHandle),
    /// A front-end function such as a destructor.
    Symbol(String),
}

impl Callee {
    #[must_use]
    pub fn symbol(&self) -> &str {
        match self {
            Callee::Runtime(handle) => handle.symbol(),
            Callee::Symbol(symbol) => symbol,
        }
    }

    #[must_use]
    pub fn diverges(&self) -> bool {
        match self {
            Callee::Runtime(handle) => handle.signature().noreturn,
            Callee::Symbol(_) => false,
        }
    }
}

/// What unwinding does when an exception leaves a protected region.
#[derive(Clone, Debug, PartialEq)]
pub enum RegionAction {
    /// Call `terminate`; nothing after it runs.
    Terminate(FnHandle),
    /// Run the instructions, then keep unwinding into the parent region.
    Cleanup(Vec<Instr>),
    /// Consult the function's handler table for this region.
    Dispatch,
    /// Nothing to run; keep unwinding into the parent region. Lets code
    /// opt out of the regions it physically sits in.
    Forward,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Instr {
    StorageLive(LocalId),
    StorageDead(LocalId),
    Assign {
        dest: LocalId,
        value: Operand,
    },
    /// Construct an object in place; `ctor` is `None` for a bitwise copy.
    Init {
        place: Operand,
        value: Operand,
        ctor: Option<String>,
    },
    Call {
        dest: Option<LocalId>,
        callee: Callee,
        args: Vec<Operand>,
    },
    /// Statement lowered by the statement collaborator.
    Stmt(String),
    RegionStart {
        region: RegionId,
        parent: Option<RegionId>,
    },
    RegionEnd {
        region: RegionId,
        action: RegionAction,
    },
    Label(LabelId),
    Jump(LabelId),
    Return,
}

impl Instr {
    /// Control never continues to the next instruction.
    #[must_use]
    pub fn diverges(&self) -> bool {
        match self {
            Instr::Jump(_) | Instr::Return => true,
            Instr::Call { callee, .. } => callee.diverges(),
            _ => false,
        }
    }

    #[must_use]
    pub fn called_symbol(&self) -> Option<&str> {
        match self {
            Instr::Call { callee, .. } => Some(callee.symbol()),
            _ => None,
        }
    }
}

/// What a handler accepts.
#[derive(Clone, Debug, PartialEq)]
pub enum HandlerMatch {
    Type(MatchingDescriptor),
    CatchAll,
}

impl HandlerMatch {
    #[must_use]
    pub fn accepts(&self, thrown: &MatchingDescriptor) -> bool {
        match self {
            HandlerMatch::CatchAll => true,
            HandlerMatch::Type(descriptor) => descriptor == thrown,
        }
    }
}

/// One row of a function's handler table.
#[derive(Clone, Debug, PartialEq)]
pub struct HandlerEntry {
    pub region: RegionId,
    pub accepts: HandlerMatch,
    pub label: LabelId,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FunctionKind {
    Normal,
    Constructor,
    Destructor,
}

impl FunctionKind {
    #[must_use]
    pub fn is_ctor_or_dtor(self) -> bool {
        matches!(self, FunctionKind::Constructor | FunctionKind::Destructor)
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            FunctionKind::Normal => "fn",
            FunctionKind::Constructor => "ctor",
            FunctionKind::Destructor => "dtor",
        }
    }
}

/// A function after EH lowering and its epilogue.
#[derive(Clone, Debug, PartialEq)]
pub struct LoweredFunction {
    pub name: String,
    pub kind: FunctionKind,
    pub locals: Vec<LocalDecl>,
    pub instrs: Vec<Instr>,
    pub handlers: Vec<HandlerEntry>,
}

impl LoweredFunction {
    #[must_use]
    pub fn local(&self, id: LocalId) -> Option<&LocalDecl> {
        self.locals.get(id.0)
    }

    /// Local declared with `name`, searching from the most recent.
    #[must_use]
    pub fn local_named(&self, name: &str) -> Option<LocalId> {
        self.locals
            .iter()
            .rposition(|decl| decl.name.as_deref() == Some(name))
            .map(LocalId)
    }

    /// Symbols of every call in emission order.
    pub fn called_symbols(&self) -> impl Iterator<Item = &str> {
        self.instrs.iter().filter_map(Instr::called_symbol)
    }

    #[must_use]
    pub fn count_calls(&self, symbol: &str) -> usize {
        self.called_symbols().filter(|called| *called == symbol).count()
    }

    #[must_use]
    pub fn position(&self, predicate: impl Fn(&Instr) -> bool) -> Option<usize> {
        self.instrs.iter().position(predicate)
    }

    #[must_use]
    pub fn region_action(&self, region: RegionId) -> Option<&RegionAction> {
        self.instrs.iter().find_map(|instr| match instr {
            Instr::RegionEnd { region: id, action } if *id == region => Some(action),
            _ => None,
        })
    }

    #[must_use]
    pub fn region_parent(&self, region: RegionId) -> Option<RegionId> {
        self.instrs.iter().find_map(|instr| match instr {
            Instr::RegionStart { region: id, parent } if *id == region => *parent,
            _ => None,
        })
    }

    #[must_use]
    pub fn handlers_for(&self, region: RegionId) -> Vec<&HandlerEntry> {
        self.handlers
            .iter()
            .filter(|entry| entry.region == region)
            .collect()
    }
}

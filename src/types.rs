//! Type model consumed by exception-handling lowering.
//!
//! The lowering core does not type-check anything itself. It only needs a
//! handful of structural questions answered (is this a pointer, what does it
//! decay to, which qualifiers sit on the outermost level) plus a few semantic
//! ones that belong to the front end proper. The latter are expressed through
//! the [`TypeSystem`] trait; [`TypeTable`] is a small in-memory implementation
//! used by tests, benches and embedders without a full front end.

use std::collections::HashMap;
use std::fmt;

/// `const`/`volatile` qualifiers attached to one level of a type.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Qualifiers {
    pub is_const: bool,
    pub is_volatile: bool,
}

impl Qualifiers {
    pub const NONE: Self = Self {
        is_const: false,
        is_volatile: false,
    };

    pub const CONST: Self = Self {
        is_const: true,
        is_volatile: false,
    };

    #[must_use]
    pub fn is_empty(self) -> bool {
        !self.is_const && !self.is_volatile
    }
}

/// Builtin arithmetic types.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Primitive {
    Bool,
    Char,
    Short,
    Int,
    Long,
    ULong,
    Float,
    Double,
}

impl Primitive {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Primitive::Bool => "bool",
            Primitive::Char => "char",
            Primitive::Short => "short",
            Primitive::Int => "int",
            Primitive::Long => "long",
            Primitive::ULong => "unsigned long",
            Primitive::Float => "float",
            Primitive::Double => "double",
        }
    }

    #[must_use]
    pub fn size(self) -> u64 {
        match self {
            Primitive::Bool | Primitive::Char => 1,
            Primitive::Short => 2,
            Primitive::Int | Primitive::Float => 4,
            Primitive::Long | Primitive::ULong | Primitive::Double => 8,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct FnTy {
    pub ret: Ty,
    pub params: Vec<Ty>,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum TyKind {
    Void,
    Primitive(Primitive),
    /// Class, struct or union named by its fully qualified name.
    Class(String),
    Pointer(Box<Ty>),
    Reference(Box<Ty>),
    Array { element: Box<Ty>, len: Option<u64> },
    Function(Box<FnTy>),
    /// Upstream type error. Lowering propagates it without further diagnostics.
    Error,
}

/// A (possibly qualified) source type.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Ty {
    pub kind: TyKind,
    pub quals: Qualifiers,
}

impl Ty {
    #[must_use]
    pub fn new(kind: TyKind) -> Self {
        Self {
            kind,
            quals: Qualifiers::NONE,
        }
    }

    #[must_use]
    pub fn void() -> Self {
        Self::new(TyKind::Void)
    }

    #[must_use]
    pub fn primitive(primitive: Primitive) -> Self {
        Self::new(TyKind::Primitive(primitive))
    }

    #[must_use]
    pub fn int() -> Self {
        Self::primitive(Primitive::Int)
    }

    #[must_use]
    pub fn size_t() -> Self {
        Self::primitive(Primitive::ULong)
    }

    #[must_use]
    pub fn class(name: impl Into<String>) -> Self {
        Self::new(TyKind::Class(name.into()))
    }

    #[must_use]
    pub fn pointer_to(pointee: Ty) -> Self {
        Self::new(TyKind::Pointer(Box::new(pointee)))
    }

    #[must_use]
    pub fn reference_to(referent: Ty) -> Self {
        Self::new(TyKind::Reference(Box::new(referent)))
    }

    #[must_use]
    pub fn array_of(element: Ty, len: Option<u64>) -> Self {
        Self::new(TyKind::Array {
            element: Box::new(element),
            len,
        })
    }

    #[must_use]
    pub fn function(ret: Ty, params: Vec<Ty>) -> Self {
        Self::new(TyKind::Function(Box::new(FnTy { ret, params })))
    }

    #[must_use]
    pub fn error() -> Self {
        Self::new(TyKind::Error)
    }

    /// `void *`, the type every payload is passed as.
    #[must_use]
    pub fn void_ptr() -> Self {
        Self::pointer_to(Self::void())
    }

    #[must_use]
    pub fn with_quals(mut self, quals: Qualifiers) -> Self {
        self.quals = quals;
        self
    }

    #[must_use]
    pub fn with_const(mut self) -> Self {
        self.quals.is_const = true;
        self
    }

    #[must_use]
    pub fn with_volatile(mut self) -> Self {
        self.quals.is_volatile = true;
        self
    }

    #[must_use]
    pub fn is_error(&self) -> bool {
        matches!(self.kind, TyKind::Error)
    }

    #[must_use]
    pub fn is_void(&self) -> bool {
        matches!(self.kind, TyKind::Void)
    }

    #[must_use]
    pub fn is_pointer(&self) -> bool {
        matches!(self.kind, TyKind::Pointer(_))
    }

    #[must_use]
    pub fn is_reference(&self) -> bool {
        matches!(self.kind, TyKind::Reference(_))
    }

    #[must_use]
    pub fn is_class(&self) -> bool {
        matches!(self.kind, TyKind::Class(_))
    }

    /// Element type of a pointer or referent of a reference.
    #[must_use]
    pub fn target(&self) -> Option<&Ty> {
        match &self.kind {
            TyKind::Pointer(inner) | TyKind::Reference(inner) => Some(inner),
            _ => None,
        }
    }

    /// The unqualified version of this type. Only the outermost level loses
    /// its qualifiers; `const int *` keeps the `const` on its pointee.
    #[must_use]
    pub fn main_variant(&self) -> Ty {
        Ty {
            kind: self.kind.clone(),
            quals: Qualifiers::NONE,
        }
    }

    /// Strips one level of reference, if any.
    #[must_use]
    pub fn non_reference(&self) -> Ty {
        match &self.kind {
            TyKind::Reference(inner) => (**inner).clone(),
            _ => self.clone(),
        }
    }

    /// Value type of an expression after lvalue-to-rvalue, array-to-pointer
    /// and function-to-pointer conversions.
    #[must_use]
    pub fn decay(&self) -> Ty {
        let value = self.non_reference();
        match value.kind {
            TyKind::Array { element, .. } => Ty::pointer_to(*element),
            TyKind::Function(_) => Ty::pointer_to(value),
            _ => value,
        }
    }

    #[must_use]
    pub fn canonical_name(&self) -> String {
        self.to_string()
    }
}

fn write_quals(f: &mut fmt::Formatter<'_>, quals: Qualifiers, leading: bool) -> fmt::Result {
    let mut parts = Vec::new();
    if quals.is_const {
        parts.push("const");
    }
    if quals.is_volatile {
        parts.push("volatile");
    }
    if parts.is_empty() {
        return Ok(());
    }
    if leading {
        write!(f, "{} ", parts.join(" "))
    } else {
        write!(f, " {}", parts.join(" "))
    }
}

impl fmt::Display for Ty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            TyKind::Pointer(inner) => {
                write!(f, "{inner}*")?;
                write_quals(f, self.quals, false)
            }
            TyKind::Reference(inner) => write!(f, "{inner}&"),
            TyKind::Array { element, len } => match len {
                Some(len) => write!(f, "{element}[{len}]"),
                None => write!(f, "{element}[]"),
            },
            TyKind::Function(func) => {
                let params = func
                    .params
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(", ");
                write!(f, "{}({params})", func.ret)
            }
            TyKind::Void => {
                write_quals(f, self.quals, true)?;
                f.write_str("void")
            }
            TyKind::Primitive(primitive) => {
                write_quals(f, self.quals, true)?;
                f.write_str(primitive.as_str())
            }
            TyKind::Class(name) => {
                write_quals(f, self.quals, true)?;
                f.write_str(name)
            }
            TyKind::Error => f.write_str("<error>"),
        }
    }
}

/// Front-end services the lowering core delegates to.
pub trait TypeSystem {
    /// Whether objects of `ty` can be created (`complete_type_or_else`).
    fn is_complete(&self, ty: &Ty) -> bool;

    /// Size in bytes of a complete object type.
    fn size_of(&self, ty: &Ty) -> Option<u64>;

    /// Mangled destructor symbol for class types with a destructor.
    fn destructor(&self, ty: &Ty) -> Option<String>;

    /// Copy constructor used to copy a value of `ty` into fresh storage,
    /// `None` for trivially copyable types.
    fn copy_constructor(&self, ty: &Ty) -> Option<String>;

    /// Whether initialising an object of `ty` runs user code.
    fn needs_constructing(&self, ty: &Ty) -> bool {
        self.copy_constructor(ty).is_some()
    }

    /// Symbol of the runtime type-info object describing `ty`.
    fn type_info_symbol(&self, ty: &Ty) -> String {
        type_info_symbol_for(ty)
    }
}

/// Default naming scheme for type-info objects.
#[must_use]
pub fn type_info_symbol_for(ty: &Ty) -> String {
    let mut symbol = String::from("__tinfo.");
    for ch in ty.canonical_name().chars() {
        match ch {
            ' ' => symbol.push('_'),
            '*' => symbol.push('P'),
            '&' => symbol.push('R'),
            '(' | ')' | '[' | ']' | ',' => symbol.push('.'),
            other => symbol.push(other),
        }
    }
    symbol
}

/// Class facts registered with a [`TypeTable`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ClassInfo {
    pub size: u64,
    pub destructor: Option<String>,
    pub copy_constructor: Option<String>,
}

impl ClassInfo {
    #[must_use]
    pub fn new(size: u64) -> Self {
        Self {
            size,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_destructor(mut self, symbol: impl Into<String>) -> Self {
        self.destructor = Some(symbol.into());
        self
    }

    #[must_use]
    pub fn with_copy_constructor(mut self, symbol: impl Into<String>) -> Self {
        self.copy_constructor = Some(symbol.into());
        self
    }
}

/// In-memory [`TypeSystem`] keyed by class name.
///
/// Classes that are only declared (forward declarations) are incomplete.
#[derive(Debug, Clone)]
pub struct TypeTable {
    classes: HashMap<String, Option<ClassInfo>>,
    pointer_size: u64,
}

impl TypeTable {
    #[must_use]
    pub fn new() -> Self {
        Self {
            classes: HashMap::new(),
            pointer_size: 8,
        }
    }

    #[must_use]
    pub fn with_pointer_size(mut self, size: u64) -> Self {
        self.pointer_size = size;
        self
    }

    /// Forward-declares `name`; it stays incomplete until defined.
    pub fn declare_class(&mut self, name: impl Into<String>) {
        self.classes.entry(name.into()).or_insert(None);
    }

    pub fn define_class(&mut self, name: impl Into<String>, info: ClassInfo) {
        self.classes.insert(name.into(), Some(info));
    }

    fn class_info(&self, ty: &Ty) -> Option<&ClassInfo> {
        match &ty.kind {
            TyKind::Class(name) => self.classes.get(name).and_then(Option::as_ref),
            _ => None,
        }
    }
}

impl Default for TypeTable {
    fn default() -> Self {
        Self::new()
    }
}

impl TypeSystem for TypeTable {
    fn is_complete(&self, ty: &Ty) -> bool {
        match &ty.kind {
            TyKind::Void => false,
            TyKind::Class(_) => self.class_info(ty).is_some(),
            TyKind::Array { element, len } => len.is_some() && self.is_complete(element),
            TyKind::Primitive(_)
            | TyKind::Pointer(_)
            | TyKind::Reference(_)
            | TyKind::Function(_)
            | TyKind::Error => true,
        }
    }

    fn size_of(&self, ty: &Ty) -> Option<u64> {
        match &ty.kind {
            TyKind::Primitive(primitive) => Some(primitive.size()),
            TyKind::Pointer(_) | TyKind::Reference(_) => Some(self.pointer_size),
            TyKind::Class(_) => self.class_info(ty).map(|info| info.size),
            TyKind::Array { element, len } => {
                let len = (*len)?;
                self.size_of(element).map(|size| size * len)
            }
            TyKind::Void | TyKind::Function(_) | TyKind::Error => None,
        }
    }

    fn destructor(&self, ty: &Ty) -> Option<String> {
        self.class_info(ty).and_then(|info| info.destructor.clone())
    }

    fn copy_constructor(&self, ty: &Ty) -> Option<String> {
        self.class_info(ty)
            .and_then(|info| info.copy_constructor.clone())
    }
}

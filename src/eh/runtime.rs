//! Runtime contract registry.
//!
//! Generated code calls into a fixed set of runtime entry points. Each one is
//! declared the first time lowering needs it and reused afterwards; the
//! registry belongs to a single translation unit.

use std::collections::HashMap;

use tracing::debug;

use crate::ir::{FnDecl, FnHandle, FnSignature};
use crate::types::Ty;

/// Name of the runtime's exception context record.
pub const CONTEXT_RECORD: &str = "cp_eh_info";

/// Mode flag passed to a destructor invoked as an exception cleanup.
pub const CLEANUP_DTOR_MODE: i128 = 2;

/// The entry points the lowering core emits calls to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RuntimeEntry {
    /// `__eh_alloc(size) -> void*`
    AllocException,
    /// `__cp_push_exception(value, type, cleanup)`; starts unwinding.
    PushException,
    /// `__start_cp_handler() -> cp_eh_info*`
    StartHandler,
    /// `__cp_pop_exception(cp_eh_info*)`
    PopException,
    /// `__uncatch_exception()`; rethrows the active exception.
    UncatchException,
    /// `__check_eh_spec(count, types)`
    CheckEhSpec,
    /// `terminate()`
    Terminate,
}

impl RuntimeEntry {
    pub const ALL: [RuntimeEntry; 7] = [
        RuntimeEntry::AllocException,
        RuntimeEntry::PushException,
        RuntimeEntry::StartHandler,
        RuntimeEntry::PopException,
        RuntimeEntry::UncatchException,
        RuntimeEntry::CheckEhSpec,
        RuntimeEntry::Terminate,
    ];

    #[must_use]
    pub fn symbol(self, honor_std: bool) -> &'static str {
        match self {
            RuntimeEntry::AllocException => "__eh_alloc",
            RuntimeEntry::PushException => "__cp_push_exception",
            RuntimeEntry::StartHandler => "__start_cp_handler",
            RuntimeEntry::PopException => "__cp_pop_exception",
            RuntimeEntry::UncatchException => "__uncatch_exception",
            RuntimeEntry::CheckEhSpec => "__check_eh_spec",
            RuntimeEntry::Terminate if honor_std => "std::terminate",
            RuntimeEntry::Terminate => "terminate",
        }
    }

    #[must_use]
    pub fn signature(self) -> FnSignature {
        match self {
            RuntimeEntry::AllocException => FnSignature::new(vec![Ty::size_t()], Ty::void_ptr()),
            RuntimeEntry::PushException => FnSignature::new(
                vec![Ty::void_ptr(), Ty::void_ptr(), cleanup_fn_type()],
                Ty::void(),
            )
            .noreturn(),
            RuntimeEntry::StartHandler => FnSignature::new(Vec::new(), context_ptr_type()),
            RuntimeEntry::PopException => {
                FnSignature::new(vec![context_ptr_type()], Ty::void())
            }
            RuntimeEntry::UncatchException => {
                FnSignature::new(Vec::new(), Ty::void()).noreturn()
            }
            RuntimeEntry::CheckEhSpec => FnSignature::new(
                vec![
                    Ty::int(),
                    Ty::pointer_to(Ty::pointer_to(Ty::void().with_const())),
                ],
                Ty::void(),
            )
            .noreturn(),
            RuntimeEntry::Terminate => FnSignature::new(Vec::new(), Ty::void()).noreturn(),
        }
    }
}

/// `void (*)(void *, int)`: the shape every exception cleanup is called with.
#[must_use]
pub fn cleanup_fn_type() -> Ty {
    Ty::pointer_to(Ty::function(Ty::void(), vec![Ty::void_ptr(), Ty::int()]))
}

/// `cp_eh_info *`
#[must_use]
pub fn context_ptr_type() -> Ty {
    Ty::pointer_to(Ty::class(CONTEXT_RECORD))
}

/// Per-unit cache of declared runtime functions.
#[derive(Debug)]
pub struct RuntimeRegistry {
    honor_std: bool,
    declared: HashMap<String, FnHandle>,
    order: Vec<String>,
}

impl RuntimeRegistry {
    #[must_use]
    pub fn new(honor_std: bool) -> Self {
        Self {
            honor_std,
            declared: HashMap::new(),
            order: Vec::new(),
        }
    }

    pub fn resolve(&mut self, entry: RuntimeEntry) -> FnHandle {
        let symbol = entry.symbol(self.honor_std);
        self.resolve_named(symbol, entry.signature())
    }

    /// Returns the handle for `symbol`, declaring it on first use.
    ///
    /// # Panics
    ///
    /// Panics when `symbol` was already declared with a different signature.
    pub fn resolve_named(&mut self, symbol: &str, signature: FnSignature) -> FnHandle {
        if let Some(existing) = self.declared.get(symbol) {
            assert!(
                existing.signature() == &signature,
                "runtime entry `{symbol}` redeclared with a different signature"
            );
            return existing.clone();
        }
        debug!(target: "eh", entry = symbol, "declaring runtime entry point");
        let handle = FnHandle::new(FnDecl {
            symbol: symbol.to_string(),
            signature,
            external: true,
            public: true,
            artificial: true,
        });
        self.declared.insert(symbol.to_string(), handle.clone());
        self.order.push(symbol.to_string());
        handle
    }

    #[must_use]
    pub fn lookup(&self, symbol: &str) -> Option<&FnHandle> {
        self.declared.get(symbol)
    }

    /// Declared symbols in declaration order.
    #[must_use]
    pub fn declared_symbols(&self) -> &[String] {
        &self.order
    }

    /// Forgets every declaration; the next unit starts from scratch.
    pub fn reset(&mut self) {
        self.declared.clear();
        self.order.clear();
    }
}

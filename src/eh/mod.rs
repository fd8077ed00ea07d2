//! Exception-handling lowering.
//!
//! A [`TranslationUnit`] owns everything that lives for one unit: the runtime
//! registry, diagnostics and the type-info symbols handlers refer to. Each
//! function is lowered through a [`FunctionLowering`] obtained from the unit.
//! The statement collaborator drives it, emitting its own code through
//! [`FunctionLowering::emit_user`] and calling the throw, try, catch and
//! exception-specification entry points at the matching syntactic points.
//! [`FunctionLowering::finish`] runs the epilogue and hands the function back
//! to the unit.
//!
//! Handler bodies are not emitted where they appear. Each catch block is built
//! in its own instruction sequence and queued; the epilogue places all queued
//! handlers after the function body inside one terminate-protected region.

use tracing::trace;

use crate::diagnostics::Span;
use crate::ir::{
    Callee, FunctionKind, HandlerEntry, Instr, LabelId, LocalDecl, LocalId, LocalKind, Operand,
    RegionAction, RegionId,
};
use crate::types::{Ty, TypeSystem};

mod descriptor;
mod runtime;
mod unit;

pub use descriptor::{MatchingDescriptor, describe, normalize, type_identity};
pub use runtime::{
    CLEANUP_DTOR_MODE, CONTEXT_RECORD, RuntimeEntry, RuntimeRegistry, cleanup_fn_type,
    context_ptr_type,
};
pub use unit::{TranslationUnit, UnitArtifact};

use scope::CleanupScope;

macro_rules! function_lowering_impl {
    ($($items:tt)*) => {
        impl<'u, 't> FunctionLowering<'u, 't> {
            $($items)*
        }
    };
}

mod catch;
mod epilogue;
mod protect;
mod scope;
mod spec;
mod throw;
mod try_block;

pub use catch::{CatchBlock, CatchParam, CatchState};
pub use throw::{ThrowLowering, ThrowOperand};
pub use try_block::TryBlock;

/// Name of the local aliasing the runtime's exception context in a handler.
pub const CONTEXT_LOCAL: &str = "__exception_info";

/// Handler blocks waiting for the function epilogue, in completion order.
#[derive(Debug, Default)]
pub struct PendingCatchSequence {
    blocks: Vec<Vec<Instr>>,
}

impl PendingCatchSequence {
    pub fn push(&mut self, block: Vec<Instr>) {
        self.blocks.push(block);
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    fn into_instrs(self) -> Vec<Instr> {
        self.blocks.into_iter().flatten().collect()
    }
}

#[derive(Debug)]
struct Sequence {
    instrs: Vec<Instr>,
    reachable: bool,
}

impl Sequence {
    fn new() -> Self {
        Self {
            instrs: Vec::new(),
            reachable: true,
        }
    }
}

/// Per-function lowering context.
pub struct FunctionLowering<'u, 't> {
    unit: &'u mut TranslationUnit<'t>,
    name: String,
    kind: FunctionKind,
    locals: Vec<LocalDecl>,
    sequences: Vec<Sequence>,
    scopes: Vec<CleanupScope>,
    regions: Vec<RegionId>,
    handlers: Vec<HandlerEntry>,
    pending: PendingCatchSequence,
    next_label: usize,
    next_region: usize,
}

impl<'u, 't> FunctionLowering<'u, 't> {
    pub(crate) fn new(unit: &'u mut TranslationUnit<'t>, name: String, kind: FunctionKind) -> Self {
        trace!(target: "eh", function = %name, kind = kind.as_str(), "begin function");
        Self {
            unit,
            name,
            kind,
            locals: Vec::new(),
            sequences: vec![Sequence::new()],
            scopes: Vec::new(),
            regions: Vec::new(),
            handlers: Vec::new(),
            pending: PendingCatchSequence::default(),
            next_label: 0,
            next_region: 0,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn kind(&self) -> FunctionKind {
        self.kind
    }

    #[must_use]
    pub fn types(&self) -> &'t dyn TypeSystem {
        self.unit.types()
    }

    #[must_use]
    pub fn unit(&self) -> &TranslationUnit<'t> {
        &*self.unit
    }

    #[must_use]
    pub fn pending(&self) -> &PendingCatchSequence {
        &self.pending
    }

    #[must_use]
    pub fn local_decl(&self, local: LocalId) -> Option<&LocalDecl> {
        self.locals.get(local.0)
    }

    /// Whether control can reach the next emitted instruction.
    #[must_use]
    pub fn is_reachable(&self) -> bool {
        self.current().reachable
    }

    pub fn new_label(&mut self) -> LabelId {
        let label = LabelId(self.next_label);
        self.next_label += 1;
        label
    }

    pub(crate) fn emit(&mut self, instr: Instr) {
        let sequence = self.current_mut();
        let diverges = instr.diverges();
        if let Instr::Label(_) = instr {
            sequence.reachable = true;
        }
        sequence.instrs.push(instr);
        if diverges {
            sequence.reachable = false;
        }
    }

    pub(crate) fn runtime(&mut self, entry: RuntimeEntry) -> crate::ir::FnHandle {
        self.unit.registry_mut().resolve(entry)
    }

    pub(crate) fn call_runtime(&mut self, entry: RuntimeEntry, dest: Option<LocalId>, args: Vec<Operand>) {
        let handle = self.runtime(entry);
        self.emit(Instr::Call {
            dest,
            callee: Callee::Runtime(handle),
            args,
        });
    }

    /// Opens a protected region nested in the innermost open one.
    pub(crate) fn open_region(&mut self) -> RegionId {
        let parent = self.regions.last().copied();
        self.open_region_in(parent)
    }

    /// Opens a region that sits physically inside the innermost open one but
    /// unwinds to `parent`.
    pub(crate) fn open_region_in(&mut self, parent: Option<RegionId>) -> RegionId {
        let region = RegionId(self.next_region);
        self.next_region += 1;
        self.emit(Instr::RegionStart { region, parent });
        self.regions.push(region);
        region
    }

    pub(crate) fn close_region(&mut self, region: RegionId, action: RegionAction) {
        let innermost = self.regions.pop();
        assert_eq!(
            innermost,
            Some(region),
            "protected regions must close innermost first"
        );
        self.emit(Instr::RegionEnd { region, action });
    }

    /// Type is complete, a pointer or reference to a complete type, or a
    /// pointer to (possibly qualified) `void`.
    pub(crate) fn complete_ptr_ref_or_void_ptr(&self, ty: &Ty) -> bool {
        if ty.is_error() {
            return false;
        }
        let types = self.types();
        match ty.target() {
            Some(inner) if ty.is_pointer() => inner.is_void() || types.is_complete(inner),
            Some(inner) => types.is_complete(inner),
            None => types.is_complete(ty),
        }
    }

    fn current(&self) -> &Sequence {
        let Some(sequence) = self.sequences.last() else {
            unreachable!("function lowering always has a base sequence");
        };
        sequence
    }

    fn current_mut(&mut self) -> &mut Sequence {
        let Some(sequence) = self.sequences.last_mut() else {
            unreachable!("function lowering always has a base sequence");
        };
        sequence
    }

    /// Starts emitting into a fresh sequence that will be queued instead of
    /// placed inline.
    fn begin_deferred(&mut self) {
        self.sequences.push(Sequence::new());
    }

    fn end_deferred(&mut self) -> Vec<Instr> {
        assert!(
            self.sequences.len() > 1,
            "no deferred sequence is being built"
        );
        self.sequences
            .pop()
            .map(|sequence| sequence.instrs)
            .unwrap_or_default()
    }

    fn push_local(&mut self, decl: LocalDecl) -> LocalId {
        let id = LocalId(self.locals.len());
        self.locals.push(decl);
        id
    }
}

/// `dtor(&object, CLEANUP_DTOR_MODE)`, the call a cleanup makes to destroy
/// a local.
fn destructor_call(dtor: String, object: LocalId) -> Instr {
    Instr::Call {
        dest: None,
        callee: Callee::Symbol(dtor),
        args: vec![
            Operand::Local(object).addr_of(),
            Operand::Int(CLEANUP_DTOR_MODE),
        ],
    }
}

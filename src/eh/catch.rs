use super::*;
use crate::ir::{ContextField, HandlerMatch};
use tracing::{debug, trace};

/// A declared catch parameter, `catch (T name)`.
#[derive(Clone, Debug)]
pub struct CatchParam {
    pub name: Option<String>,
    pub ty: Ty,
    pub span: Option<Span>,
}

impl CatchParam {
    #[must_use]
    pub fn new(name: impl Into<String>, ty: Ty) -> Self {
        Self {
            name: Some(name.into()),
            ty,
            span: None,
        }
    }

    /// `catch (T)` without a name.
    #[must_use]
    pub fn unnamed(ty: Ty) -> Self {
        Self {
            name: None,
            ty,
            span: None,
        }
    }

    #[must_use]
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = Some(span);
        self
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CatchState {
    OpeningScope,
    ContextBound,
    ParameterBound,
    BodyExecuting,
    ClosingScopes,
    Done,
}

/// A handler whose body is being lowered.
#[derive(Debug)]
pub struct CatchBlock {
    label: LabelId,
    accepts: HandlerMatch,
    context: LocalId,
    param: Option<LocalId>,
    state: CatchState,
    continue_to: LabelId,
    function_try: bool,
}

impl CatchBlock {
    #[must_use]
    pub fn label(&self) -> LabelId {
        self.label
    }

    #[must_use]
    pub fn accepts(&self) -> &HandlerMatch {
        &self.accepts
    }

    /// The `__exception_info` alias.
    #[must_use]
    pub fn context(&self) -> LocalId {
        self.context
    }

    #[must_use]
    pub fn param(&self) -> Option<LocalId> {
        self.param
    }

    #[must_use]
    pub fn state(&self) -> CatchState {
        self.state
    }
}

function_lowering_impl! {
    /// Opens a handler for `try_block`. Returns `None` when exceptions are
    /// disabled.
    ///
    /// A parameter whose type is neither complete nor a pointer/reference to
    /// a complete type nor a pointer to `void` is dropped and the handler
    /// catches everything.
    pub fn start_catch_block(
        &mut self,
        try_block: &TryBlock,
        param: Option<CatchParam>,
    ) -> Option<CatchBlock> {
        let span = param.as_ref().and_then(|param| param.span);
        if !self.unit.doing_eh(span) {
            return None;
        }
        let region = try_block.region?;
        let param = param.filter(|param| {
            let valid = self.complete_ptr_ref_or_void_ptr(&param.ty);
            if !valid {
                debug!(target: "eh", ty = %param.ty, "catch parameter dropped; handler catches everything");
            }
            valid
        });

        let label = self.new_label();
        let accepts = match &param {
            Some(param) => HandlerMatch::Type(self.unit.describe_ref(&param.ty)),
            None => HandlerMatch::CatchAll,
        };
        self.begin_deferred();
        self.emit(Instr::Label(label));
        self.push_scope();
        self.handlers.push(HandlerEntry {
            region,
            accepts: accepts.clone(),
            label,
        });
        trace!(target: "eh", function = %self.name, %label, state = ?CatchState::OpeningScope);

        let context = self.declare_local(
            Some(CONTEXT_LOCAL.to_string()),
            context_ptr_type(),
            LocalKind::Artificial,
            span,
        );
        self.call_runtime(RuntimeEntry::StartHandler, Some(context), Vec::new());
        let pop = self.runtime(RuntimeEntry::PopException);
        self.register_cleanup(vec![Instr::Call {
            dest: None,
            callee: Callee::Runtime(pop),
            args: vec![Operand::Local(context)],
        }]);
        trace!(target: "eh", function = %self.name, %label, state = ?CatchState::ContextBound);

        self.push_scope();
        let param = param.map(|param| self.initialize_handler_parm(context, param));
        trace!(target: "eh", function = %self.name, %label, state = ?CatchState::ParameterBound);

        Some(CatchBlock {
            label,
            accepts,
            context,
            param,
            state: CatchState::BodyExecuting,
            continue_to: try_block.after,
            function_try: try_block.function_try,
        })
    }

    /// Closes the handler and queues its code for the epilogue.
    pub fn end_catch_block(&mut self, mut block: CatchBlock) {
        block.state = CatchState::ClosingScopes;
        if block.function_try && self.kind.is_ctor_or_dtor() && self.is_reachable() {
            debug!(target: "eh", function = %self.name, "implicit rethrow at end of function-try handler");
            self.lower_throw(None, None);
        }
        self.pop_scope();
        self.pop_scope();
        if self.is_reachable() {
            self.emit(Instr::Jump(block.continue_to));
        }
        let instrs = self.end_deferred();
        self.pending.push(instrs);
        block.state = CatchState::Done;
        trace!(target: "eh", function = %self.name, label = %block.label, state = ?block.state);
    }

    /// Lowers a whole handler, with `body` emitting its statements.
    /// Returns the handler's label, or `None` when exceptions are disabled.
    pub fn lower_catch(
        &mut self,
        try_block: &TryBlock,
        param: Option<CatchParam>,
        body: impl FnOnce(&mut Self, &CatchBlock),
    ) -> Option<LabelId> {
        let block = self.start_catch_block(try_block, param)?;
        let label = block.label;
        body(self, &block);
        self.end_catch_block(block);
        Some(label)
    }

    /// Binds the catch parameter from the exception's payload. Pointers and
    /// references bind to the payload directly; other types are copied from
    /// a reference to it.
    fn initialize_handler_parm(&mut self, context: LocalId, param: CatchParam) -> LocalId {
        let decl_ty = param.ty;
        let by_value = !(decl_ty.is_pointer() || decl_ty.is_reference());
        let init_ty = if by_value {
            Ty::reference_to(decl_ty.clone())
        } else {
            decl_ty.clone()
        };
        let reference_to_pointer =
            decl_ty.is_reference() && decl_ty.target().is_some_and(Ty::is_pointer);

        let slot = Operand::Local(context).deref().field(ContextField::Value);
        let payload = if reference_to_pointer { slot.addr_of() } else { slot };
        let value = payload.convert(init_ty);

        let local = self.declare_local(param.name, decl_ty.clone(), LocalKind::User, param.span);
        let types = self.types();
        if by_value && types.needs_constructing(&decl_ty) {
            let ctor = types.copy_constructor(&decl_ty);
            self.protect_with_terminate(|this| {
                this.emit(Instr::Init {
                    place: Operand::Local(local),
                    value,
                    ctor,
                });
            });
        } else {
            self.emit(Instr::Init {
                place: Operand::Local(local),
                value,
                ctor: None,
            });
        }

        if by_value {
            if let Some(dtor) = types.destructor(&decl_ty) {
                self.register_cleanup(vec![destructor_call(dtor, local)]);
            }
        }
        local
    }
}

use super::*;

#[derive(Debug)]
struct RegisteredCleanup {
    region: RegionId,
    /// Where unwinding continues once the cleanup has run.
    parent: Option<RegionId>,
    instrs: Vec<Instr>,
}

/// A lexical scope and the cleanups that must run when control leaves it.
#[derive(Debug, Default)]
pub(crate) struct CleanupScope {
    cleanups: Vec<RegisteredCleanup>,
    locals: Vec<LocalId>,
}

function_lowering_impl! {
    pub fn push_scope(&mut self) {
        self.scopes.push(CleanupScope::default());
    }

    /// Closes the innermost scope. Cleanups run in reverse registration
    /// order on the fall-through path; each one also stays attached to its
    /// region for the unwind path.
    pub fn pop_scope(&mut self) {
        let Some(scope) = self.scopes.pop() else {
            return;
        };
        for cleanup in scope.cleanups.into_iter().rev() {
            self.close_region(cleanup.region, RegionAction::Cleanup(cleanup.instrs.clone()));
            if self.is_reachable() {
                for instr in cleanup.instrs {
                    self.emit(instr);
                }
            }
        }
        if self.is_reachable() {
            for local in scope.locals.into_iter().rev() {
                self.emit(Instr::StorageDead(local));
            }
        }
    }

    /// Registers `cleanup` to run whenever control leaves the innermost
    /// scope, including by an exception. Everything emitted afterwards in
    /// the scope is covered.
    pub fn register_cleanup(&mut self, cleanup: Vec<Instr>) -> RegionId {
        assert!(!self.scopes.is_empty(), "cleanups need an open scope");
        let parent = self.regions.last().copied();
        let region = self.open_region_in(parent);
        if let Some(scope) = self.scopes.last_mut() {
            scope.cleanups.push(RegisteredCleanup {
                region,
                parent,
                instrs: cleanup,
            });
        }
        region
    }

    pub fn declare_local(
        &mut self,
        name: Option<String>,
        ty: Ty,
        kind: LocalKind,
        span: Option<Span>,
    ) -> LocalId {
        let local = self.push_local(LocalDecl::new(name, ty, kind, span));
        self.emit(Instr::StorageLive(local));
        if let Some(scope) = self.scopes.last_mut() {
            scope.locals.push(local);
        }
        local
    }

    /// Emits a statement lowered by the caller.
    pub fn emit_user(&mut self, text: impl Into<String>) {
        self.emit(Instr::Stmt(text.into()));
    }

    /// Emits a `return`, running the cleanups of every open scope first,
    /// innermost first.
    ///
    /// The return path is still inside every cleanup region. Each inline
    /// copy gets a forwarding region that unwinds straight to the parent of
    /// the cleanup's own region, so a cleanup that raises is not run again
    /// while the ones outside it still are.
    pub fn emit_return(&mut self) {
        let cleanups: Vec<(Option<RegionId>, Vec<Instr>)> = self
            .scopes
            .iter()
            .rev()
            .flat_map(|scope| scope.cleanups.iter().rev())
            .map(|cleanup| (cleanup.parent, cleanup.instrs.clone()))
            .collect();
        for (parent, instrs) in cleanups {
            let exit = self.open_region_in(parent);
            for instr in instrs {
                self.emit(instr);
            }
            self.close_region(exit, RegionAction::Forward);
        }
        self.emit(Instr::Return);
    }

    /// Runs `body` in a fresh scope.
    pub fn scoped<R>(&mut self, body: impl FnOnce(&mut Self) -> R) -> R {
        self.push_scope();
        let result = body(self);
        self.pop_scope();
        result
    }
}

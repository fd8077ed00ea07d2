use super::*;
use crate::config::UnwindModel;
use crate::ir::LoweredFunction;
use tracing::debug;

function_lowering_impl! {
    /// Ends the function: closes scopes left open by the caller, flushes
    /// queued handlers behind the function body and hands the result to the
    /// unit.
    ///
    /// Queued handlers are laid out as
    /// `jump end; region { handlers } terminate; end:`. Under setjmp/longjmp
    /// unwinding the region markers are left out.
    ///
    /// # Panics
    ///
    /// Panics when a catch block was started but never ended.
    pub fn finish(mut self) -> &'u LoweredFunction {
        assert!(
            self.sequences.len() == 1,
            "catch block still open when finishing `{}`",
            self.name
        );
        while !self.scopes.is_empty() {
            self.pop_scope();
        }

        let pending = std::mem::take(&mut self.pending);
        if !pending.is_empty() {
            debug!(
                target: "eh",
                function = %self.name,
                handlers = pending.len(),
                "flushing deferred handlers"
            );
            let funcend = self.new_label();
            self.emit(Instr::Jump(funcend));
            let handlers = pending.into_instrs();
            let model = self.unit.config().unwind_model;
            match model {
                UnwindModel::Tables => self.protect_with_terminate(|this| {
                    for instr in handlers {
                        this.emit(instr);
                    }
                }),
                UnwindModel::SetjmpLongjmp => {
                    for instr in handlers {
                        self.emit(instr);
                    }
                }
            }
            self.emit(Instr::Label(funcend));
        }

        let FunctionLowering {
            unit,
            name,
            kind,
            locals,
            mut sequences,
            handlers,
            ..
        } = self;
        let instrs = sequences.pop().map(|sequence| sequence.instrs).unwrap_or_default();
        unit.push_function(LoweredFunction {
            name,
            kind,
            locals,
            instrs,
            handlers,
        })
    }
}

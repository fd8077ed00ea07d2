use super::*;
use tracing::debug;

function_lowering_impl! {
    /// Opens the try block guarding a function body with an exception
    /// specification.
    pub fn begin_eh_spec(&mut self, span: Option<Span>) -> TryBlock {
        self.begin_try_block(span)
    }

    /// Closes the body and adds the catch-all handler that hands the
    /// in-flight exception and the declared types to `__check_eh_spec`. The
    /// runtime rethrows a permitted exception and terminates otherwise.
    ///
    /// Types are passed in declaration order, duplicates included. Types that
    /// failed upstream are left out.
    pub fn end_eh_spec(&mut self, raises: &[Ty], try_block: TryBlock) {
        self.finish_try_block(&try_block);
        if let Some(block) = self.start_catch_block(&try_block, None) {
            let descriptors: Vec<Operand> = raises
                .iter()
                .map(|ty| self.unit.describe_ref(ty))
                .filter(|descriptor| !descriptor.is_error())
                .map(Operand::Descriptor)
                .collect();
            let count = descriptors.len();
            let element = Ty::pointer_to(Ty::void().with_const());
            let array = self.declare_local(
                None,
                Ty::array_of(element.clone(), Some(count as u64)),
                LocalKind::Artificial,
                None,
            );
            self.emit(Instr::Assign {
                dest: array,
                value: Operand::Aggregate(descriptors),
            });
            debug!(target: "eh", function = %self.name, count, "checking exception specification");
            self.call_runtime(
                RuntimeEntry::CheckEhSpec,
                None,
                vec![
                    Operand::Int(count as i128),
                    Operand::Local(array).convert(Ty::pointer_to(element)),
                ],
            );
            self.end_catch_block(block);
        }
        self.finish_handler_sequence(try_block);
    }

    /// Lowers a function body under `raises`; `None` leaves it unchecked.
    pub fn lower_eh_spec(&mut self, raises: Option<&[Ty]>, body: impl FnOnce(&mut Self)) {
        let Some(raises) = raises else {
            body(self);
            return;
        };
        let try_block = self.begin_eh_spec(None);
        body(self);
        self.end_eh_spec(raises, try_block);
    }
}

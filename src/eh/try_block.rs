use super::*;
use tracing::trace;

/// An open `try` statement.
///
/// The protected region covers the statements between
/// [`FunctionLowering::begin_try_block`] and
/// [`FunctionLowering::finish_try_block`]; handlers started afterwards
/// register against it.
#[derive(Clone, Debug)]
pub struct TryBlock {
    pub(crate) region: Option<RegionId>,
    pub(crate) after: LabelId,
    pub(crate) function_try: bool,
}

impl TryBlock {
    /// `None` when exceptions are disabled and no region was opened.
    #[must_use]
    pub fn region(&self) -> Option<RegionId> {
        self.region
    }

    /// Label placed after the last handler.
    #[must_use]
    pub fn continuation(&self) -> LabelId {
        self.after
    }

    #[must_use]
    pub fn is_function_try(&self) -> bool {
        self.function_try
    }
}

function_lowering_impl! {
    pub fn begin_try_block(&mut self, span: Option<Span>) -> TryBlock {
        self.start_try(span, false)
    }

    /// A try block wrapping a whole function body. Its handlers rethrow on
    /// fall-through when the function is a constructor or destructor.
    pub fn begin_function_try_block(&mut self, span: Option<Span>) -> TryBlock {
        self.start_try(span, true)
    }

    /// Ends the protected statements and dispatches escaping exceptions to
    /// the handlers registered for this block.
    pub fn finish_try_block(&mut self, try_block: &TryBlock) {
        let Some(region) = try_block.region else {
            return;
        };
        self.close_region(region, RegionAction::Dispatch);
        if self.is_reachable() {
            self.emit(Instr::Jump(try_block.after));
        }
    }

    /// Places the continuation label once every handler of `try_block` was
    /// lowered.
    ///
    /// # Panics
    ///
    /// Panics when the block has no handler.
    pub fn finish_handler_sequence(&mut self, try_block: TryBlock) {
        let Some(region) = try_block.region else {
            return;
        };
        assert!(
            self.handlers.iter().any(|entry| entry.region == region),
            "try block {region} has no handlers"
        );
        self.emit(Instr::Label(try_block.after));
    }

    fn start_try(&mut self, span: Option<Span>, function_try: bool) -> TryBlock {
        let after = self.new_label();
        if !self.unit.doing_eh(span) {
            return TryBlock {
                region: None,
                after,
                function_try,
            };
        }
        let region = self.open_region();
        trace!(target: "eh", function = %self.name, %region, function_try, "begin try block");
        TryBlock {
            region: Some(region),
            after,
            function_try,
        }
    }
}

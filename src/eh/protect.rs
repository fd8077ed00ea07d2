use super::*;

function_lowering_impl! {
    /// Runs `body` inside a protected region whose unwind action is `action`.
    pub fn protect<R>(&mut self, action: RegionAction, body: impl FnOnce(&mut Self) -> R) -> R {
        let region = self.open_region();
        let result = body(self);
        self.close_region(region, action);
        result
    }

    /// Runs `body` so that any exception escaping it calls `terminate`
    /// instead of unwinding further.
    pub fn protect_with_terminate<R>(&mut self, body: impl FnOnce(&mut Self) -> R) -> R {
        let terminate = self.runtime(RuntimeEntry::Terminate);
        self.protect(RegionAction::Terminate(terminate), body)
    }
}

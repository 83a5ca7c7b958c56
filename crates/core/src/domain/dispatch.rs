// Cross-queue dispatch outcome

/// Outcome of work submitted with `post_for_result`
///
/// `count()` follows the scripting convention: 1 for a normal result,
/// 0 when no result was produced, negative on failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchResult<T> {
    /// The work ran and produced a value
    Completed(T),
    /// The work never ran (queue dropped with the item still pending)
    NoResult,
    /// The work panicked; carries the panic message
    Failed(String),
}

impl<T> DispatchResult<T> {
    pub fn count(&self) -> i32 {
        match self {
            DispatchResult::Completed(_) => 1,
            DispatchResult::NoResult => 0,
            DispatchResult::Failed(_) => -1,
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, DispatchResult::Completed(_))
    }

    pub fn value(self) -> Option<T> {
        match self {
            DispatchResult::Completed(value) => Some(value),
            _ => None,
        }
    }

    /// Split into `(count, value, diagnostic)`
    pub fn into_parts(self) -> (i32, Option<T>, Option<String>) {
        let count = self.count();
        match self {
            DispatchResult::Completed(value) => (count, Some(value), None),
            DispatchResult::NoResult => (count, None, None),
            DispatchResult::Failed(message) => (count, None, Some(message)),
        }
    }
}

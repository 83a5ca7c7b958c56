// Work Item

/// A deferred, zero-argument unit of execution, moved into a queue
pub type Work = Box<dyn FnOnce() + Send + 'static>;

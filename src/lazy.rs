use crate::{Error, Result, metrics};
use std::fmt;
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex, OnceLock, PoisonError};

type Outcome<T> = std::result::Result<T, Arc<Error>>;

/// Boxed factory type used when the caller does not name one.
pub type BoxedFactory<T> = Box<dyn FnOnce() -> Result<T> + Send>;

/// A deferred computation that runs its factory at most once.
///
/// The first call to [`Lazy::get_value`] runs the factory while every other
/// caller blocks on the same instance. Afterwards all callers observe the same
/// value, or a clone of the same shared error. A failed factory is never
/// retried; build a new `Lazy` to try again.
///
/// `Lazy` is `Sync` whenever both `T` and `F` are `Send`, so one instance can
/// be shared between threads. Factories that capture session handles are not
/// `Send` and stay on the session's thread.
pub struct Lazy<T, F = BoxedFactory<T>> {
    factory: Mutex<Option<F>>,
    outcome: OnceLock<Outcome<T>>,
}

impl<T, F> Lazy<T, F>
where
    F: FnOnce() -> Result<T>,
{
    pub fn new(factory: F) -> Self {
        Self {
            factory: Mutex::new(Some(factory)),
            outcome: OnceLock::new(),
        }
    }

    /// A lazy whose construction failed. The factory never runs and every
    /// evaluation returns `err`.
    pub fn failed(err: Error) -> Self {
        let outcome = OnceLock::new();
        let _ = outcome.set(Err(Arc::new(err)));
        Self {
            factory: Mutex::new(None),
            outcome,
        }
    }

    /// True once the factory has completed successfully.
    pub fn is_value_created(&self) -> bool {
        matches!(self.outcome.get(), Some(Ok(_)))
    }

    /// Runs the factory on first use and returns the memoized outcome.
    pub fn get_value(&self) -> Result<&T> {
        self.outcome
            .get_or_init(|| self.run_factory())
            .as_ref()
            .map_err(|err| Error::Deferred(Arc::clone(err)))
    }

    /// The computed value, without triggering evaluation.
    pub fn value(&self) -> Option<&T> {
        self.outcome.get().and_then(|outcome| outcome.as_ref().ok())
    }

    /// Evaluates if needed and hands back ownership of the value.
    pub fn into_value(self) -> Result<T> {
        let _ = self.outcome.get_or_init(|| self.run_factory());
        match self.outcome.into_inner() {
            Some(Ok(value)) => Ok(value),
            Some(Err(err)) => Err(Error::Deferred(err)),
            None => Err(Error::precondition("lazy value was never initialised")),
        }
    }

    fn run_factory(&self) -> Outcome<T> {
        // the lock is only contended if a previous factory panicked
        let factory = self
            .factory
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(factory) = factory else {
            return Err(Arc::new(Error::precondition(
                "lazy factory was consumed by an earlier panicked evaluation",
            )));
        };

        metrics::metrics()
            .lazy_evaluations_total
            .fetch_add(1, Ordering::Relaxed);
        tracing::debug!(target: "docsession::lazy", "evaluating deferred operation");
        factory().map_err(|err| {
            tracing::debug!(target: "docsession::lazy", error = %err, "deferred operation failed");
            Arc::new(err)
        })
    }
}

impl<T: fmt::Debug, F> fmt::Debug for Lazy<T, F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut dbg = f.debug_struct("Lazy");
        match self.outcome.get() {
            None => dbg.field("state", &"pending"),
            Some(Ok(value)) => dbg.field("value", value),
            Some(Err(err)) => dbg.field("error", err),
        };
        dbg.finish()
    }
}

//! Change listener invoked after each round that pulled changes

/// Trait for reacting to a completed change round.
///
/// Called synchronously by the sync loop. Implementations usually rebuild a
/// merged view from [`CacheStore`](crate::cache::CacheStore). An error stops
/// the loop and is returned to the caller of `run`.
pub trait ChangeListener: Send + Sync {
    fn on_change(&self) -> anyhow::Result<()>;
}

/// A listener that invokes a closure.
pub struct FnChangeListener<F>
where
    F: Fn() -> anyhow::Result<()> + Send + Sync,
{
    f: F,
}

impl<F> FnChangeListener<F>
where
    F: Fn() -> anyhow::Result<()> + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

impl<F> ChangeListener for FnChangeListener<F>
where
    F: Fn() -> anyhow::Result<()> + Send + Sync,
{
    fn on_change(&self) -> anyhow::Result<()> {
        (self.f)()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_fn_listener() {
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = calls.clone();

        let listener = FnChangeListener::new(move || {
            calls_clone.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        listener.on_change().unwrap();
        listener.on_change().unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_fn_listener_error() {
        let listener = FnChangeListener::new(|| -> anyhow::Result<()> {
            Err(anyhow::anyhow!("no config available"))
        });
        let err = listener.on_change().unwrap_err();
        assert_eq!(err.to_string(), "no config available");
    }
}

/// Runs a closure when dropped, including when the owning future is cancelled.
#[must_use = "the closure runs as soon as the guard is dropped"]
pub struct DropGuard<F: FnOnce()>(Option<F>);

impl<F: FnOnce()> DropGuard<F> {
    pub fn new(f: F) -> Self {
        Self(Some(f))
    }
}

impl<F: FnOnce()> Drop for DropGuard<F> {
    fn drop(&mut self) {
        if let Some(f) = self.0.take() {
            f();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn runs_once_when_task_is_aborted() {
        let runs = Arc::new(AtomicUsize::new(0));
        let task = {
            let runs = runs.clone();
            tokio::spawn(async move {
                let _guard = DropGuard::new(move || {
                    runs.fetch_add(1, Ordering::SeqCst);
                });
                std::future::pending::<()>().await;
            })
        };
        tokio::task::yield_now().await;
        task.abort();
        let _ = task.await;
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }
}

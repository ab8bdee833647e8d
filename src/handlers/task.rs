use tokio::task::JoinHandle;

/// Aborts the task when dropped, so whoever owns the handle owns the task.
pub struct AutoCancelTask<T>(pub JoinHandle<T>);

impl<T> AutoCancelTask<T> {
    pub fn spawn<F>(future: F) -> Self
    where
        F: std::future::Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        Self(tokio::spawn(future))
    }
}

impl<T> Drop for AutoCancelTask<T> {
    fn drop(&mut self) {
        self.0.abort();
    }
}

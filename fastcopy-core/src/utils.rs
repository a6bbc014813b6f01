use tokio::task::JoinHandle;

/// Append a trailing slash if missing.
///
/// Directory paths handed to the storage backend must end with `/`.
#[must_use]
pub fn ensure_end_slash(s: &str) -> String {
    if s.ends_with('/') {
        s.to_string()
    } else {
        format!("{s}/")
    }
}

/// Join a directory and a file name with exactly one `/` between them.
#[must_use]
pub fn join_path(dir: &str, name: &str) -> String {
    let dir = dir.trim_end_matches('/');
    let name = name.trim_start_matches('/');
    if dir.is_empty() {
        name.to_string()
    } else {
        format!("{dir}/{name}")
    }
}

/// Owns a background task and aborts it when dropped.
pub struct AbortJoinHandle<T>(JoinHandle<T>);

impl<T> AbortJoinHandle<T> {
    #[must_use]
    pub const fn new(handle: JoinHandle<T>) -> Self {
        Self(handle)
    }
}

impl<T> Drop for AbortJoinHandle<T> {
    fn drop(&mut self) {
        self.0.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::{ensure_end_slash, join_path, AbortJoinHandle};

    #[test]
    fn must_join_paths() {
        assert_eq!(join_path("/data/in", "a.bin"), "/data/in/a.bin");
        assert_eq!(join_path("/data/in/", "a.bin"), "/data/in/a.bin");
        assert_eq!(join_path("/data/in//", "/a.bin"), "/data/in/a.bin");
        assert_eq!(join_path("", "a.bin"), "a.bin");
        assert_eq!(join_path("/", "a.bin"), "a.bin");
    }

    #[test]
    fn must_ensure_end_slash() {
        assert_eq!(ensure_end_slash("/data"), "/data/");
        assert_eq!(ensure_end_slash("/data/"), "/data/");
    }

    #[tokio::test]
    async fn must_abort_task_on_drop() {
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        let handle = AbortJoinHandle::new(tokio::spawn(async move {
            let _tx = tx;
            std::future::pending::<()>().await;
        }));

        drop(handle);
        assert!(rx.await.is_err());
    }
}

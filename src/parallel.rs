//! Indexed fork/join over a scoped thread pool.

use scoped_threadpool::Pool;

/// Runs `task(index, count)` for every `index` in `0..count` and waits for all
/// of them to finish.
///
/// With `count <= 1` the single task runs on the calling thread. Otherwise a
/// pool of `count` threads is created for the call, so `task` may borrow from
/// the caller's stack.
///
/// # Examples
///
/// ```
/// use std::sync::atomic::{AtomicUsize, Ordering};
/// use offheap_map::parallel::fork;
///
/// let sum = AtomicUsize::new(0);
/// fork(4, |index, _count| {
///     sum.fetch_add(index, Ordering::Relaxed);
/// });
/// assert_eq!(sum.into_inner(), 0 + 1 + 2 + 3);
/// ```
pub fn fork<F>(count: usize, task: F)
where
    F: Fn(usize, usize) + Sync,
{
    if count <= 1 {
        task(0, 1);
        return;
    }

    let threads = u32::try_from(count).unwrap_or(u32::MAX);
    let mut pool = Pool::new(threads);
    let task = &task;
    pool.scoped(|scope| {
        for index in 0..count {
            scope.execute(move || task(index, count));
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_fork_runs_every_index_once() {
        let seen = Mutex::new(Vec::new());
        fork(6, |index, count| {
            assert_eq!(count, 6);
            seen.lock().unwrap().push(index);
        });
        let mut seen = seen.into_inner().unwrap();
        seen.sort_unstable();
        assert_eq!(seen, vec![0, 1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_fork_single_task_runs_inline() {
        let caller = std::thread::current().id();
        fork(0, |index, count| {
            assert_eq!((index, count), (0, 1));
            assert_eq!(std::thread::current().id(), caller);
        });
    }
}

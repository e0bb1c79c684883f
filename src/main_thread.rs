// SPDX-License-Identifier: LGPL-3.0-or-later OR MPL-2.0
// This file is a part of `undercoat`.
//
// `undercoat` is free software: you can redistribute it and/or modify it under the
// terms of either:
//
// * GNU Lesser General Public License as published by the Free Software Foundation, either
//   version 3 of the License, or (at your option) any later version.
// * Mozilla Public License as published by the Mozilla Foundation, version 2.
//
// `undercoat` is distributed in the hope that it will be useful, but WITHOUT ANY
// WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR
// PURPOSE. See the GNU Lesser General Public License or the Mozilla Public License for more
// details.
//
// You should have received a copy of the GNU Lesser General Public License and the Mozilla
// Public License along with `undercoat`. If not, see <https://www.gnu.org/licenses/>.

//! Routing of deferred releases back to the main thread.
//!
//! Backends may tear down pattern callbacks on any thread, but image handles
//! captured by those callbacks must be released on the thread that owns the
//! graphics stack. A [`MainThreadQueue`] carries those releases home.

use std::sync::mpsc;

/// A deferred unit of work to run on the main thread.
pub type Task = Box<dyn FnOnce() + Send>;

/// The sending half of a main-thread task queue.
#[derive(Clone)]
pub struct MainThreadQueue {
    tx: mpsc::Sender<Task>,
}

impl MainThreadQueue {
    /// Creates the queue and its draining half.
    pub fn new() -> (Self, MainThreadRunner) {
        let (tx, rx) = mpsc::channel();
        (Self { tx }, MainThreadRunner { rx })
    }

    /// Posts a task. Silently dropped if the runner is gone, in which case
    /// the process is tearing down anyway.
    pub fn post(&self, task: Task) {
        let _ = self.tx.send(task);
    }
}

/// Drains posted tasks; owned by the main loop.
pub struct MainThreadRunner {
    rx: mpsc::Receiver<Task>,
}

impl MainThreadRunner {
    /// Runs everything posted so far and returns how many tasks ran.
    pub fn run_pending(&self) -> usize {
        let mut count = 0;
        while let Ok(task) = self.rx.try_recv() {
            task();
            count += 1;
        }
        count
    }
}

/// A value whose final release is posted to the main thread.
///
/// While alive it hands out references on whatever thread holds it; when the
/// last holder drops it, the contained value travels to the main thread to
/// die there.
pub(crate) struct MainThreadReleased<T: Send + 'static> {
    value: Option<T>,
    queue: Option<MainThreadQueue>,
}

impl<T: Send + 'static> MainThreadReleased<T> {
    pub(crate) fn new(value: T, queue: Option<MainThreadQueue>) -> Self {
        Self {
            value: Some(value),
            queue,
        }
    }

    pub(crate) fn get(&self) -> &T {
        self.value.as_ref().unwrap()
    }
}

impl<T: Send + 'static> Drop for MainThreadReleased<T> {
    fn drop(&mut self) {
        if let (Some(value), Some(queue)) = (self.value.take(), self.queue.as_ref()) {
            queue.post(Box::new(move || drop(value)));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn tasks_run_in_post_order() {
        let (queue, runner) = MainThreadQueue::new();
        let log = Arc::new(std::sync::Mutex::new(Vec::new()));

        for i in 0..3 {
            let log = log.clone();
            queue.post(Box::new(move || log.lock().unwrap().push(i)));
        }

        assert_eq!(runner.run_pending(), 3);
        assert_eq!(*log.lock().unwrap(), vec![0, 1, 2]);
    }

    #[test]
    fn release_travels_to_the_queue() {
        struct Canary(Arc<AtomicUsize>);
        impl Drop for Canary {
            fn drop(&mut self) {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }

        let drops = Arc::new(AtomicUsize::new(0));
        let (queue, runner) = MainThreadQueue::new();

        let guard = MainThreadReleased::new(Canary(drops.clone()), Some(queue));
        drop(guard);

        // Not dropped until the main loop drains the queue.
        assert_eq!(drops.load(Ordering::SeqCst), 0);
        assert_eq!(runner.run_pending(), 1);
        assert_eq!(drops.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn no_queue_drops_in_place() {
        struct Canary(Arc<AtomicUsize>);
        impl Drop for Canary {
            fn drop(&mut self) {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }

        let drops = Arc::new(AtomicUsize::new(0));
        let guard = MainThreadReleased::new(Canary(drops.clone()), None);
        drop(guard);
        assert_eq!(drops.load(Ordering::SeqCst), 1);
    }
}

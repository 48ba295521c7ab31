use core::cell::RefCell;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::signal::Signal;

use micromouse_x::queue;

/// Bounded queue shared between tasks and interrupt context.
///
/// Every operation except [`Queue::receive`] returns immediately; `receive` waits for an item.
pub struct Queue<T, const N: usize> {
    inner: Mutex<CriticalSectionRawMutex, RefCell<queue::Queue<T, N>>>,
    item_sent: Signal<CriticalSectionRawMutex, ()>,
}

impl<T, const N: usize> Queue<T, N> {
    pub const fn new() -> Self {
        Self {
            inner: Mutex::new(RefCell::new(queue::Queue::new())),
            item_sent: Signal::new(),
        }
    }

    fn with<R>(&self, f: impl FnOnce(&mut queue::Queue<T, N>) -> R) -> R {
        self.inner.lock(|inner| f(&mut inner.borrow_mut()))
    }

    pub fn send(&self, item: T) -> Result<(), T> {
        self.with(|queue| queue.send(item))?;
        self.item_sent.signal(());
        Ok(())
    }

    pub fn send_front(&self, item: T) -> Result<(), T> {
        self.with(|queue| queue.send_front(item))?;
        self.item_sent.signal(());
        Ok(())
    }

    /// Sends, replacing the newest item if full.
    pub fn overwrite(&self, item: T) {
        self.with(|queue| queue.overwrite(item));
        self.item_sent.signal(());
    }

    pub fn try_receive(&self) -> Option<T> {
        self.with(|queue| queue.receive())
    }

    pub async fn receive(&self) -> T {
        loop {
            if let Some(item) = self.try_receive() {
                return item;
            }
            self.item_sent.wait().await;
        }
    }

    pub fn waiting(&self) -> usize {
        self.with(|queue| queue.waiting())
    }

    pub fn available(&self) -> usize {
        self.with(|queue| queue.available())
    }

    pub fn reset(&self) {
        self.with(|queue| queue.reset());
        self.item_sent.reset();
    }
}

impl<T: Clone, const N: usize> Queue<T, N> {
    pub fn peek(&self) -> Option<T> {
        self.with(|queue| queue.peek().cloned())
    }
}

use heapless::Deque;

/// Fixed-capacity FIFO for passing messages between the control loop and the tasks feeding it.
///
/// A queue of length 1 used with [`Queue::overwrite`] behaves as a mailbox that always holds the
/// most recent message.
pub struct Queue<T, const N: usize> {
    items: Deque<T, N>,
}

impl<T, const N: usize> Queue<T, N> {
    pub const fn new() -> Self {
        Self {
            items: Deque::new(),
        }
    }

    /// Appends to the back. Hands the item back if the queue is full.
    pub fn send(&mut self, item: T) -> Result<(), T> {
        self.items.push_back(item)
    }

    /// Puts the item ahead of everything already queued.
    pub fn send_front(&mut self, item: T) -> Result<(), T> {
        self.items.push_front(item)
    }

    /// Appends to the back, dropping the newest queued item if there is no room.
    pub fn overwrite(&mut self, item: T) {
        if self.items.is_full() {
            self.items.pop_back();
        }
        let _ = self.items.push_back(item);
    }

    pub fn receive(&mut self) -> Option<T> {
        self.items.pop_front()
    }

    pub fn peek(&self) -> Option<&T> {
        self.items.front()
    }

    /// Number of queued items.
    pub fn waiting(&self) -> usize {
        self.items.len()
    }

    /// Number of free slots.
    pub fn available(&self) -> usize {
        N - self.items.len()
    }

    pub fn reset(&mut self) {
        self.items.clear();
    }
}

impl<T, const N: usize> Default for Queue<T, N> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn items_come_out_in_order() {
        let mut queue = Queue::<u8, 3>::new();
        assert_eq!(queue.send(1), Ok(()));
        assert_eq!(queue.send(2), Ok(()));
        assert_eq!(queue.send_front(0), Ok(()));
        assert_eq!(queue.send(3), Err(3));
        assert_eq!(queue.peek(), Some(&0));
        assert_eq!(queue.receive(), Some(0));
        assert_eq!(queue.receive(), Some(1));
        assert_eq!(queue.receive(), Some(2));
        assert_eq!(queue.receive(), None);
    }

    #[test]
    fn counts_waiting_and_available() {
        let mut queue = Queue::<u8, 4>::new();
        assert_eq!(queue.available(), 4);
        queue.send(1).unwrap();
        queue.send(2).unwrap();
        assert_eq!(queue.waiting(), 2);
        assert_eq!(queue.available(), 2);
        queue.reset();
        assert_eq!(queue.waiting(), 0);
        assert_eq!(queue.available(), 4);
    }

    #[test]
    fn overwrite_keeps_latest_in_mailbox() {
        let mut mailbox = Queue::<u8, 1>::new();
        mailbox.overwrite(1);
        mailbox.overwrite(2);
        assert_eq!(mailbox.waiting(), 1);
        assert_eq!(mailbox.receive(), Some(2));

        let mut queue = Queue::<u8, 2>::new();
        queue.overwrite(1);
        queue.overwrite(2);
        queue.overwrite(3);
        assert_eq!(queue.receive(), Some(1));
        assert_eq!(queue.receive(), Some(3));
    }

    #[test]
    fn send_front_on_full_queue_is_rejected() {
        let mut queue = Queue::<u8, 2>::new();
        queue.send(1).unwrap();
        queue.send(2).unwrap();
        assert_eq!(queue.send_front(0), Err(0));
        assert_eq!(queue.waiting(), 2);
        assert_eq!(queue.available(), 0);
        assert_eq!(queue.receive(), Some(1));
        assert_eq!(queue.send_front(0), Ok(()));
        assert_eq!(queue.receive(), Some(0));
        assert_eq!(queue.receive(), Some(2));
    }
}

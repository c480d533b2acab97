//! Fixed-capacity ring of recent call outcomes.
//!
//! Feeds only the reported error rate; state transitions never read it.

/// Sliding window of success/failure outcomes, oldest evicted first.
#[derive(Debug, Clone)]
pub struct OutcomeWindow {
    slots: Box<[bool]>,
    next: usize,
    len: usize,
    failures: usize,
}

impl OutcomeWindow {
    /// A window holding at most `capacity` outcomes (minimum 1).
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: vec![true; capacity.max(1)].into_boxed_slice(),
            next: 0,
            len: 0,
            failures: 0,
        }
    }

    pub fn record(&mut self, success: bool) {
        if self.len == self.slots.len() {
            if !self.slots[self.next] {
                self.failures -= 1;
            }
        } else {
            self.len += 1;
        }

        self.slots[self.next] = success;
        if !success {
            self.failures += 1;
        }
        self.next = (self.next + 1) % self.slots.len();
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn failures(&self) -> usize {
        self.failures
    }

    /// Failures divided by recorded outcomes; 0.0 when empty.
    pub fn error_rate(&self) -> f64 {
        if self.len == 0 {
            0.0
        } else {
            self.failures as f64 / self.len as f64
        }
    }

    pub fn clear(&mut self) {
        self.next = 0;
        self.len = 0;
        self.failures = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_rate_before_full() {
        let mut window = OutcomeWindow::new(10);
        assert_eq!(window.error_rate(), 0.0);

        window.record(true);
        window.record(false);
        window.record(false);
        window.record(true);

        assert_eq!(window.len(), 4);
        assert_eq!(window.failures(), 2);
        assert_eq!(window.error_rate(), 0.5);
    }

    #[test]
    fn test_evicts_oldest() {
        let mut window = OutcomeWindow::new(3);
        window.record(false);
        window.record(false);
        window.record(true);
        assert_eq!(window.failures(), 2);

        // Pushes out the first failure.
        window.record(true);
        assert_eq!(window.len(), 3);
        assert_eq!(window.failures(), 1);

        window.record(true);
        window.record(true);
        assert_eq!(window.failures(), 0);
        assert_eq!(window.error_rate(), 0.0);
    }

    #[test]
    fn test_clear_and_zero_capacity() {
        let mut window = OutcomeWindow::new(0);
        assert_eq!(window.capacity(), 1);

        window.record(false);
        assert_eq!(window.error_rate(), 1.0);

        window.clear();
        assert!(window.is_empty());
        window.record(true);
        assert_eq!(window.failures(), 0);
    }
}

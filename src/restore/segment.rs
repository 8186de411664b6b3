use std::sync::Condvar;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::PoisonError;

/// Fixed size bit set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Bitmap {
    words: Vec<u64>,
    len: usize,
}

impl Bitmap {
    pub(crate) fn new(len: usize) -> Self {
        Self {
            words: vec![0; len.div_ceil(64)],
            len,
        }
    }

    pub(crate) fn get(&self, i: usize) -> bool {
        self.words[i / 64] & (1 << (i % 64)) != 0
    }

    pub(crate) fn set(&mut self, i: usize) {
        self.words[i / 64] |= 1 << (i % 64);
    }

    pub(crate) fn clear(&mut self, i: usize) {
        self.words[i / 64] &= !(1 << (i % 64));
    }

    pub(crate) fn count(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    pub(crate) fn is_full(&self) -> bool {
        self.count() == self.len
    }
}

/// Outcome of [`Segment::claim`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Claim {
    /// The page is restored; nothing to do.
    Restored,

    /// The caller owns the page and must `complete` or `abandon` it.
    Claimed,
}

#[derive(Debug)]
struct Bits {
    /// Set once the page content is durable on the volume.
    restored: Bitmap,

    /// Set while one thread reconstructs the page.
    in_progress: Bitmap,
}

/// Restore progress of `page_count` consecutive pages starting at
/// `first_page`.
#[derive(Debug)]
pub(crate) struct Segment {
    first_page: u32,
    page_count: u32,
    bits: Mutex<Bits>,
    cond: Condvar,
}

impl Segment {
    pub(crate) fn new(first_page: u32, page_count: u32) -> Self {
        Self {
            first_page,
            page_count,
            bits: Mutex::new(Bits {
                restored: Bitmap::new(page_count as usize),
                in_progress: Bitmap::new(page_count as usize),
            }),
            cond: Condvar::new(),
        }
    }

    pub(crate) fn first_page(&self) -> u32 {
        self.first_page
    }

    pub(crate) fn last_page(&self) -> u32 {
        self.first_page + self.page_count - 1
    }

    fn lock(&self) -> MutexGuard<'_, Bits> {
        self.bits.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn slot(&self, page: u32) -> usize {
        debug_assert!(page >= self.first_page && page <= self.last_page());
        (page - self.first_page) as usize
    }

    pub(crate) fn is_restored(&self, page: u32) -> bool {
        self.lock().restored.get(self.slot(page))
    }

    pub(crate) fn restored_count(&self) -> usize {
        self.lock().restored.count()
    }

    pub(crate) fn is_done(&self) -> bool {
        self.lock().restored.is_full()
    }

    /// Take ownership of restoring `page`, waiting while another thread
    /// holds it.
    pub(crate) fn claim(&self, page: u32) -> Claim {
        let i = self.slot(page);

        let mut bits = self.lock();
        loop {
            if bits.restored.get(i) {
                return Claim::Restored;
            }
            if !bits.in_progress.get(i) {
                bits.in_progress.set(i);
                return Claim::Claimed;
            }
            bits = self.cond.wait(bits).unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Mark claimed pages as restored. Their content must be durable.
    pub(crate) fn complete(&self, pages: &[u32]) {
        {
            let mut bits = self.lock();
            for p in pages {
                let i = self.slot(*p);
                bits.in_progress.clear(i);
                bits.restored.set(i);
            }
        }
        self.cond.notify_all();
    }

    /// Give up claimed pages after a failure.
    pub(crate) fn abandon(&self, pages: &[u32]) {
        {
            let mut bits = self.lock();
            for p in pages {
                bits.in_progress.clear(self.slot(*p));
            }
        }
        self.cond.notify_all();
    }

    /// Wait until `page` is restored. Returns `false` if `stopped` turns true
    /// first.
    pub(crate) fn wait_restored(&self, page: u32, stopped: impl Fn() -> bool) -> bool {
        let i = self.slot(page);

        let mut bits = self.lock();
        loop {
            if bits.restored.get(i) {
                return true;
            }
            if stopped() {
                return false;
            }
            bits = self.cond.wait(bits).unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Wake every waiter, e.g. after the restore failed.
    pub(crate) fn wake_all(&self) {
        let _bits = self.lock();
        self.cond.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    use super::Bitmap;
    use super::Claim;
    use super::Segment;

    #[test]
    fn test_bitmap() {
        let mut b = Bitmap::new(70);
        b.set(0);
        b.set(69);
        assert!(b.get(69));
        assert!(!b.get(68));
        assert_eq!(2, b.count());

        b.clear(0);
        assert_eq!(1, b.count());
        assert!(!b.is_full());
    }

    #[test]
    fn test_claim_waits_for_owner() {
        let seg = Arc::new(Segment::new(10, 4));

        assert_eq!(Claim::Claimed, seg.claim(12));

        let h = {
            let seg = seg.clone();
            thread::spawn(move || seg.claim(12))
        };

        thread::sleep(Duration::from_millis(20));
        seg.complete(&[12]);

        assert_eq!(Claim::Restored, h.join().unwrap());
        assert!(seg.is_restored(12));
        assert_eq!(1, seg.restored_count());
        assert_eq!(13, seg.last_page());
    }

    #[test]
    fn test_abandon_lets_others_claim() {
        let seg = Segment::new(0, 2);
        assert_eq!(Claim::Claimed, seg.claim(1));
        seg.abandon(&[1]);
        assert_eq!(Claim::Claimed, seg.claim(1));
        assert!(!seg.wait_restored(0, || true));
    }
}

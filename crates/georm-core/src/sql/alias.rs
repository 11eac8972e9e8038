//! Table alias allocation for one statement.

/// Hands out `t0`, `t1`, ... in order.
#[derive(Debug, Default)]
pub struct AliasAllocator {
    next: usize,
}

impl AliasAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate the next alias.
    pub fn next(&mut self) -> String {
        let alias = format!("t{}", self.next);
        self.next += 1;
        alias
    }

    /// Number of aliases handed out so far.
    pub fn allocated(&self) -> usize {
        self.next
    }
}

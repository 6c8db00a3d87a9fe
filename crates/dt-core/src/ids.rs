use core::fmt;
use core::num::NonZeroU64;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_KEY: AtomicU64 = AtomicU64::new(1);

/// Process-unique key minted for every declared state, input, var,
/// parameter and node.
///
/// Keys survive freezing, so handles taken while building stay valid on the
/// frozen model. Two builders never share a key.
///
/// `NonZero` keeps `Option<Key>` the same size as `Key`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Key(NonZeroU64);

impl Key {
    pub fn fresh() -> Self {
        let raw = NEXT_KEY.fetch_add(1, Ordering::Relaxed);
        // the counter starts at 1 and would need 2^64 mints to wrap
        Self(NonZeroU64::new(raw).unwrap_or(NonZeroU64::MIN))
    }

    pub fn get(self) -> u64 {
        self.0.get()
    }
}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Key({})", self.0)
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_are_unique() {
        let a = Key::fresh();
        let b = Key::fresh();
        assert_ne!(a, b);
        assert!(b.get() > a.get());
    }

    #[test]
    fn option_key_is_small() {
        assert_eq!(
            core::mem::size_of::<Key>(),
            core::mem::size_of::<Option<Key>>()
        );
    }
}

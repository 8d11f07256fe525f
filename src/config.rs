//! Process-wide configuration for the frameworks.
//!
//! The only mutable setting is the thread cap. Everything else is a constant
//! that the frameworks use when they size buffers and decide whether to fork.

use std::sync::atomic::{AtomicUsize, Ordering};

/// Below this estimated operation count a framework call runs single-threaded.
pub const THREADING_THRESHOLD: usize = 70_000;

/// Maximum number of samples in a Scan line buffer. Longer lines are processed in sections.
pub const MAX_BUFFER_SIZE: usize = 256 * 1024;

/// A dimension with at most this many pixels is considered small when picking a processing dimension.
pub const SMALL_IMAGE: usize = 63;

/// Declares a small set of on/off flags combined with `|` and queried with `contains`.
macro_rules! option_set {
    (
        $(#[$meta:meta])*
        $name:ident { $($(#[$flag_meta:meta])* $flag:ident = $bit:expr,)* }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
        pub struct $name(u32);

        impl $name {
            pub const NONE: $name = $name(0);
            $($(#[$flag_meta])* pub const $flag: $name = $name(1 << $bit);)*

            /// True if every flag in `other` is also set here.
            pub fn contains(self, other: $name) -> bool {
                self.0 & other.0 == other.0
            }

            pub fn is_empty(self) -> bool {
                self.0 == 0
            }
        }

        impl std::ops::BitOr for $name {
            type Output = $name;

            fn bitor(self, rhs: $name) -> $name {
                $name(self.0 | rhs.0)
            }
        }

        impl std::ops::BitOrAssign for $name {
            fn bitor_assign(&mut self, rhs: $name) {
                self.0 |= rhs.0;
            }
        }
    };
}

pub(crate) use option_set;

static MAX_THREADS: AtomicUsize = AtomicUsize::new(0);

/// Sets the maximum number of threads a framework call may use.
///
/// `0` restores the default, which is the size of the rayon global pool.
pub fn set_number_of_threads(n: usize) {
    MAX_THREADS.store(n, Ordering::Relaxed);
}

/// Returns the maximum number of threads a framework call may use.
pub fn number_of_threads() -> usize {
    match MAX_THREADS.load(Ordering::Relaxed) {
        0 => rayon::current_num_threads().max(1),
        n => n,
    }
}

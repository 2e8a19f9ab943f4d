/*!
    Opaque stream handle type.
*/

use std::fmt;

/**
    Opaque identifier for one attached stream.

    Allocated by the registry at attach time and carried by value through
    FFmpeg from attach to every callback invocation. A handle is only a
    lookup key; once detached it resolves to nothing and callbacks using it
    fall back to their miss behavior.
*/
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StreamHandle(u64);

impl StreamHandle {
    pub(crate) const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /**
        The raw numeric value of this handle.
    */
    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for StreamHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "stream#{}", self.0)
    }
}

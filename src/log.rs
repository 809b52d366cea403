//! Logging shims.
//!
//! Payload builds must not carry `tracing` callsite metadata (it lives in static data), so
//! the engine logs through these macros, which only expand to `tracing` events when the
//! `std` feature is enabled.

macro_rules! trace {
    ($($arg:tt)*) => {
        #[cfg(feature = "std")]
        {
            ::tracing::trace!($($arg)*);
        }
    };
}

macro_rules! debug {
    ($($arg:tt)*) => {
        #[cfg(feature = "std")]
        {
            ::tracing::debug!($($arg)*);
        }
    };
}

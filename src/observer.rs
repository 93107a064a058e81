//! Progress/diagnostic reporting hook (spec §6): the core never writes to
//! stdout/stderr directly, so a caller can run it inside a GUI, a server, or
//! a batch job without hijacking its output streams. Threaded into
//! [`crate::merge::three_way_merge`], [`crate::restriction::Restriction::validate_against_edge`],
//! and [`crate::revision::make_roster_for_revision`], each of which calls
//! [`Observer::warn`] at the point it returns a recoverable error or
//! surfaces an unresolved conflict.

/// Callback surface the core reports through during a long operation (a
/// merge, a cset application over a large roster). The default impl
/// forwards to the `log` crate at the matching level, the way a caller with
/// no UI of its own would want.
pub trait Observer {
    fn warn(&mut self, message: &str);
    fn progress(&mut self, message: &str);
    fn debug(&mut self, message: &str);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct LogObserver;

impl Observer for LogObserver {
    fn warn(&mut self, message: &str) {
        log::warn!("{message}");
    }

    fn progress(&mut self, message: &str) {
        log::info!("{message}");
    }

    fn debug(&mut self, message: &str) {
        log::debug!("{message}");
    }
}

/// An `Observer` that discards everything, for callers that don't care.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullObserver;

impl Observer for NullObserver {
    fn warn(&mut self, _message: &str) {}
    fn progress(&mut self, _message: &str) {}
    fn debug(&mut self, _message: &str) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_observer_does_not_panic() {
        let mut obs = NullObserver;
        obs.warn("x");
        obs.progress("y");
        obs.debug("z");
    }
}

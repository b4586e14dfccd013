//! # Game System Lifecycle
//!
//! The per-frame contract a host drives its systems through. The dispatch
//! core hooks into it so the response router runs exactly once per tick on
//! the host's own thread.
//!
//! ```rust,ignore
//! struct Audio;
//!
//! impl GameSystem for Audio {
//!     fn name(&self) -> &'static str { "audio" }
//!     fn on_update(&mut self) { /* mix one frame */ }
//! }
//! ```

/// A component ticked by the host once per frame.
///
/// `on_start` runs once before the first frame, `on_update` once per frame,
/// and `on_destroy` once at teardown in the same order systems were added.
pub trait GameSystem: Send {
    /// Name used in logs.
    fn name(&self) -> &'static str;

    /// Called once before the first frame.
    fn on_start(&mut self) {}

    /// Called once per frame.
    fn on_update(&mut self);

    /// Called once at teardown.
    fn on_destroy(&mut self) {}
}

//! Rebuild coalescing over the session's lifecycle flags.

/// Lifecycle flags. Only the session writes them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionFlags {
    pub is_shutting_down: bool,
    pub is_rebuilding: bool,
    pub pending_rebuild: bool,
    pub is_invoking: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RebuildRequest {
    /// No rebuild running; start one now.
    Start,
    /// A rebuild is running; one more will follow it.
    Coalesced,
    /// Shutting down; nothing new starts.
    Ignored,
}

impl SessionFlags {
    pub fn request_rebuild(&mut self) -> RebuildRequest {
        if self.is_shutting_down {
            return RebuildRequest::Ignored;
        }
        if self.is_rebuilding {
            self.pending_rebuild = true;
            return RebuildRequest::Coalesced;
        }
        self.is_rebuilding = true;
        RebuildRequest::Start
    }

    /// Close the running cycle. Returns true when a coalesced follow-up starts
    /// immediately, in which case `is_rebuilding` stays set.
    pub fn finish_rebuild(&mut self) -> bool {
        let again = self.pending_rebuild && !self.is_shutting_down;
        self.pending_rebuild = false;
        self.is_rebuilding = again;
        again
    }

    /// Whether a line of user input may start an invocation.
    pub fn accepts_input(&self) -> bool {
        !self.is_shutting_down && !self.is_rebuilding
    }
}

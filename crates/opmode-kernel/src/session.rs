//! [`Session`] – the read-only view of a running session handed to every
//! lifecycle hook.

use std::rc::Rc;

use opmode_types::{FlagSet, Phase, SessionMeta};

use crate::registry::FeatureRegistry;

/// State of the session a hook is being called for.
///
/// Features may use [`Session::registry`] to register or deregister other
/// features mid-phase; such changes take effect at the next phase boundary.
pub struct Session {
    phase: Phase,
    meta: SessionMeta,
    flags: FlagSet,
    registry: Rc<FeatureRegistry>,
}

impl Session {
    /// Open a session in [`Phase::PreInit`], freezing the flags from `meta`.
    pub fn open(meta: SessionMeta, registry: Rc<FeatureRegistry>) -> Self {
        let flags = meta.flag_set();
        Self {
            phase: Phase::PreInit,
            meta,
            flags,
            registry,
        }
    }

    /// Move to `phase`.  Ordering is the driver's responsibility.
    pub fn advance(&mut self, phase: Phase) {
        self.phase = phase;
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn flags(&self) -> &FlagSet {
        &self.flags
    }

    pub fn meta(&self) -> &SessionMeta {
        &self.meta
    }

    pub fn registry(&self) -> &Rc<FeatureRegistry> {
        &self.registry
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("phase", &self.phase)
            .field("name", &self.meta.name)
            .field("flags", &self.flags)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_freezes_flags_from_meta() {
        let meta = SessionMeta::new("TeleOp").with_flag("teleop").with_flag("red");
        let session = Session::open(meta, FeatureRegistry::shared());
        assert_eq!(session.phase(), Phase::PreInit);
        assert_eq!(session.flags().len(), 2);
        assert_eq!(session.meta().name, "TeleOp");
    }

    #[test]
    fn advance_updates_phase() {
        let mut session = Session::open(SessionMeta::new("Auto"), FeatureRegistry::shared());
        session.advance(Phase::PostInit);
        assert_eq!(session.phase(), Phase::PostInit);
    }
}

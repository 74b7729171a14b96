//! [`SessionDriver`] – the ten-phase session state machine.
//!
//! The driver fires the lifecycle phases of one session at a time, strictly
//! in order:
//!
//! ```text
//! pre_init → post_init → (pre_init_loop → post_init_loop)*
//!          → pre_start → post_start → (pre_loop → post_loop)*
//!          → pre_stop  → post_stop
//! ```
//!
//! At every phase it dispatches the matching hook to each active feature, in
//! activation order, and then lets the registry admit whatever became pending
//! meanwhile.  A feature registered while a phase is being dispatched is
//! therefore first eligible for the *next* phase.
//!
//! `pre_init` additionally freezes the session flags and queues every
//! candidate; `post_stop` empties the active set.

use std::rc::Rc;

use opmode_kernel::{Feature, FeatureRegistry, Session};
use opmode_types::{FeatureError, Phase, SessionMeta};
use tracing::{debug, info};

/// Drives sessions against a shared [`FeatureRegistry`].
pub struct SessionDriver {
    registry: Rc<FeatureRegistry>,
    session: Option<Session>,
    phase: Option<Phase>,
}

impl SessionDriver {
    pub fn new(registry: Rc<FeatureRegistry>) -> Self {
        Self {
            registry,
            session: None,
            phase: None,
        }
    }

    pub fn registry(&self) -> &Rc<FeatureRegistry> {
        &self.registry
    }

    /// The most recently entered phase, or `None` before the first session.
    pub fn phase(&self) -> Option<Phase> {
        self.phase
    }

    /// The open session, between `pre_init` and `post_stop`.
    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    /// Open a session described by `meta` and fire `pre_init`.
    ///
    /// # Errors
    ///
    /// Returns [`FeatureError::PhaseOrder`] if a session is already running.
    pub fn pre_init(&mut self, meta: SessionMeta) -> Result<(), FeatureError> {
        self.check(Phase::PreInit)?;

        let session = Session::open(meta, Rc::clone(&self.registry));
        info!(
            session = %session.meta().name,
            flags = %session.flags(),
            "session starting"
        );
        self.registry.open_session(session.flags().clone());
        self.registry.drain_pending();

        self.session = Some(session);
        self.phase = Some(Phase::PreInit);
        self.dispatch(Phase::PreInit);
        Ok(())
    }

    pub fn post_init(&mut self) -> Result<(), FeatureError> {
        self.enter(Phase::PostInit)
    }

    pub fn pre_init_loop(&mut self) -> Result<(), FeatureError> {
        self.enter(Phase::PreInitLoop)
    }

    pub fn post_init_loop(&mut self) -> Result<(), FeatureError> {
        self.enter(Phase::PostInitLoop)
    }

    pub fn pre_start(&mut self) -> Result<(), FeatureError> {
        self.enter(Phase::PreStart)
    }

    pub fn post_start(&mut self) -> Result<(), FeatureError> {
        self.enter(Phase::PostStart)
    }

    pub fn pre_loop(&mut self) -> Result<(), FeatureError> {
        self.enter(Phase::PreLoop)
    }

    pub fn post_loop(&mut self) -> Result<(), FeatureError> {
        self.enter(Phase::PostLoop)
    }

    pub fn pre_stop(&mut self) -> Result<(), FeatureError> {
        self.enter(Phase::PreStop)
    }

    /// Fire `post_stop` and close the session.  Candidates stay registered
    /// for the next session.
    pub fn post_stop(&mut self) -> Result<(), FeatureError> {
        self.enter(Phase::PostStop)?;
        self.registry.close_session();
        if let Some(session) = self.session.take() {
            info!(session = %session.meta().name, "session finished");
        }
        Ok(())
    }

    fn check(&self, phase: Phase) -> Result<(), FeatureError> {
        if phase.may_follow(self.phase) {
            Ok(())
        } else {
            Err(FeatureError::PhaseOrder {
                from: self.phase,
                to: phase,
            })
        }
    }

    fn enter(&mut self, phase: Phase) -> Result<(), FeatureError> {
        self.check(phase)?;
        if let Some(session) = self.session.as_mut() {
            session.advance(phase);
        }
        self.phase = Some(phase);
        self.dispatch(phase);
        Ok(())
    }

    /// Call the `phase` hook on every active feature, then admit pending
    /// features.
    fn dispatch(&self, phase: Phase) {
        let Some(session) = self.session.as_ref() else {
            return;
        };

        let active = self.registry.active_features();
        debug!(%phase, features = active.len(), "dispatching phase");
        for feature in &active {
            // Deregistered by an earlier hook of this phase.
            if !self.registry.is_active(feature) {
                continue;
            }
            call_hook(feature.as_ref(), phase, session);
        }

        self.registry.drain_pending();
    }
}

fn call_hook(feature: &dyn Feature, phase: Phase, session: &Session) {
    match phase {
        Phase::PreInit => feature.pre_init(session),
        Phase::PostInit => feature.post_init(session),
        Phase::PreInitLoop => feature.pre_init_loop(session),
        Phase::PostInitLoop => feature.post_init_loop(session),
        Phase::PreStart => feature.pre_start(session),
        Phase::PostStart => feature.post_start(session),
        Phase::PreLoop => feature.pre_loop(session),
        Phase::PostLoop => feature.post_loop(session),
        Phase::PreStop => feature.pre_stop(session),
        Phase::PostStop => feature.post_stop(session),
    }
}

impl std::fmt::Debug for SessionDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionDriver")
            .field("phase", &self.phase)
            .field("session", &self.session)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::marker::PhantomData;

    use opmode_kernel::{Dependencies, Dependency, FeatureRef};

    // ------------------------------------------------------------------
    // Test doubles
    // ------------------------------------------------------------------

    type Log = Rc<RefCell<Vec<String>>>;

    struct Lift;
    struct Claw;
    struct Auto;

    /// Appends `"<label>:<phase>"` to a shared log from every hook.
    struct Recorder<M> {
        label: &'static str,
        deps: Dependencies,
        log: Log,
        _marker: PhantomData<M>,
    }

    impl<M: 'static> Recorder<M> {
        fn new(label: &'static str, deps: Dependencies, log: &Log) -> FeatureRef {
            Rc::new(Self {
                label,
                deps,
                log: Rc::clone(log),
                _marker: PhantomData,
            })
        }

        fn record(&self, session: &Session) {
            self.log
                .borrow_mut()
                .push(format!("{}:{}", self.label, session.phase()));
        }
    }

    impl<M: 'static> Feature for Recorder<M> {
        fn dependencies(&self) -> &[Dependency] {
            &self.deps
        }
        fn pre_init(&self, s: &Session) {
            self.record(s)
        }
        fn post_init(&self, s: &Session) {
            self.record(s)
        }
        fn pre_init_loop(&self, s: &Session) {
            self.record(s)
        }
        fn post_init_loop(&self, s: &Session) {
            self.record(s)
        }
        fn pre_start(&self, s: &Session) {
            self.record(s)
        }
        fn post_start(&self, s: &Session) {
            self.record(s)
        }
        fn pre_loop(&self, s: &Session) {
            self.record(s)
        }
        fn post_loop(&self, s: &Session) {
            self.record(s)
        }
        fn pre_stop(&self, s: &Session) {
            self.record(s)
        }
        fn post_stop(&self, s: &Session) {
            self.record(s)
        }
    }

    /// Registers `child` from its `post_init` hook.
    struct Spawner {
        deps: Dependencies,
        child: FeatureRef,
    }

    impl Feature for Spawner {
        fn dependencies(&self) -> &[Dependency] {
            &self.deps
        }

        fn post_init(&self, session: &Session) {
            session.registry().register(&self.child).unwrap();
        }
    }

    fn yields<F: Feature + 'static>() -> Dependencies {
        Dependencies::of::<F>().yields().build().unwrap()
    }

    fn needs_flag<F: Feature + 'static>(flag: &str) -> Dependencies {
        Dependencies::of::<F>()
            .includes_at_least_one_of([flag])
            .build()
            .unwrap()
    }

    fn entries(log: &Log) -> Vec<String> {
        log.borrow().clone()
    }

    fn run_minimal_session(driver: &mut SessionDriver, meta: SessionMeta) {
        driver.pre_init(meta).unwrap();
        driver.post_init().unwrap();
        driver.pre_start().unwrap();
        driver.post_start().unwrap();
        driver.pre_stop().unwrap();
        driver.post_stop().unwrap();
    }

    // ------------------------------------------------------------------
    // Tests
    // ------------------------------------------------------------------

    #[test]
    fn hooks_follow_phase_and_activation_order() {
        let log: Log = Rc::default();
        let registry = FeatureRegistry::shared();
        let late = Recorder::<Lift>::new("late", yields::<Recorder<Lift>>(), &log);
        let early = Recorder::<Claw>::new("early", needs_flag::<Recorder<Claw>>("teleop"), &log);
        registry.register(&late).unwrap();
        registry.register(&early).unwrap();

        let mut driver = SessionDriver::new(Rc::clone(&registry));
        driver.pre_init(SessionMeta::new("TeleOp").with_flag("teleop")).unwrap();
        driver.post_init().unwrap();
        driver.pre_init_loop().unwrap();
        driver.post_init_loop().unwrap();
        driver.pre_start().unwrap();
        driver.post_start().unwrap();
        driver.pre_loop().unwrap();
        driver.post_loop().unwrap();
        driver.pre_stop().unwrap();
        driver.post_stop().unwrap();

        let mut expected = Vec::new();
        for phase in [
            "pre_init",
            "post_init",
            "pre_init_loop",
            "post_init_loop",
            "pre_start",
            "post_start",
            "pre_loop",
            "post_loop",
            "pre_stop",
            "post_stop",
        ] {
            expected.push(format!("early:{phase}"));
            expected.push(format!("late:{phase}"));
        }
        assert_eq!(entries(&log), expected);
    }

    #[test]
    fn unresolved_feature_receives_no_hooks() {
        let log: Log = Rc::default();
        let registry = FeatureRegistry::shared();
        let auto = Recorder::<Auto>::new("auto", needs_flag::<Recorder<Auto>>("auto"), &log);
        registry.register(&auto).unwrap();

        let mut driver = SessionDriver::new(Rc::clone(&registry));
        run_minimal_session(&mut driver, SessionMeta::new("TeleOp").with_flag("teleop"));

        assert!(entries(&log).is_empty());
    }

    #[test]
    fn out_of_order_phase_is_rejected() {
        let registry = FeatureRegistry::shared();
        let mut driver = SessionDriver::new(registry);

        let err = driver.post_init().unwrap_err();
        assert!(matches!(
            err,
            FeatureError::PhaseOrder {
                from: None,
                to: Phase::PostInit
            }
        ));

        driver.pre_init(SessionMeta::new("Auto")).unwrap();
        assert!(driver.pre_start().is_err());
        assert!(driver.pre_init(SessionMeta::new("Again")).is_err());
        assert!(driver.pre_loop().is_err());
        assert_eq!(driver.phase(), Some(Phase::PreInit));
    }

    #[test]
    fn loop_pairs_may_repeat_or_be_skipped() {
        let registry = FeatureRegistry::shared();
        let mut driver = SessionDriver::new(registry);
        driver.pre_init(SessionMeta::new("Auto")).unwrap();
        driver.post_init().unwrap();
        for _ in 0..3 {
            driver.pre_init_loop().unwrap();
            driver.post_init_loop().unwrap();
        }
        driver.pre_start().unwrap();
        driver.post_start().unwrap();
        driver.pre_stop().unwrap();
        driver.post_stop().unwrap();
        assert_eq!(driver.phase(), Some(Phase::PostStop));
        assert!(driver.session().is_none());
    }

    #[test]
    fn feature_registered_mid_phase_joins_next_phase() {
        let log: Log = Rc::default();
        let registry = FeatureRegistry::shared();
        let child = Recorder::<Lift>::new("child", yields::<Recorder<Lift>>(), &log);
        let spawner: FeatureRef = Rc::new(Spawner {
            deps: yields::<Spawner>(),
            child: Rc::clone(&child),
        });
        registry.register(&spawner).unwrap();

        let mut driver = SessionDriver::new(Rc::clone(&registry));
        driver.pre_init(SessionMeta::new("TeleOp")).unwrap();
        driver.post_init().unwrap();
        assert!(registry.is_active(&child));
        driver.pre_start().unwrap();

        assert_eq!(entries(&log), vec!["child:pre_start".to_string()]);
    }

    #[test]
    fn post_stop_resets_session_but_keeps_candidates() {
        let log: Log = Rc::default();
        let registry = FeatureRegistry::shared();
        let drive = Recorder::<Claw>::new("drive", needs_flag::<Recorder<Claw>>("teleop"), &log);
        registry.register(&drive).unwrap();

        let mut driver = SessionDriver::new(Rc::clone(&registry));
        run_minimal_session(&mut driver, SessionMeta::new("TeleOp").with_flag("teleop"));
        assert!(registry.active_features().is_empty());
        assert!(registry.flags().is_none());
        assert!(registry.is_registered(&drive));

        log.borrow_mut().clear();
        run_minimal_session(&mut driver, SessionMeta::new("Auto").with_flag("auto"));
        assert!(entries(&log).is_empty());

        run_minimal_session(&mut driver, SessionMeta::new("TeleOp").with_flag("teleop"));
        assert_eq!(entries(&log).len(), 6);
    }

    #[test]
    fn session_exposes_phase_and_flags_to_hooks() {
        let registry = FeatureRegistry::shared();
        let mut driver = SessionDriver::new(Rc::clone(&registry));
        driver
            .pre_init(SessionMeta::new("TeleOp").with_flag("teleop"))
            .unwrap();
        let session = driver.session().unwrap();
        assert_eq!(session.phase(), Phase::PreInit);
        assert!(session.flags().contains(&"teleop".into()));
        assert_eq!(registry.flags(), Some(session.flags().clone()));
    }
}

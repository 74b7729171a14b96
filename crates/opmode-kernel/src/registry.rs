//! [`FeatureRegistry`] – weakly-held feature sets and admission queue.
//!
//! The registry tracks three collections:
//!
//! | Collection | Lifetime | Purpose |
//! |---|---|---|
//! | candidates | process | every registered feature |
//! | pending | until the next phase boundary | features awaiting resolution |
//! | active | one session | resolved features, in activation order |
//!
//! All three hold [`Weak`] references: dropping the last [`FeatureRef`] to a
//! feature removes it everywhere, silently.
//!
//! Every method takes `&self`.  Internal state is borrowed only for the
//! duration of each call and never while a resolution runs, so dependency
//! output callbacks and lifecycle hooks are free to call back into the
//! registry (for instance to register a feature they just built).

use std::cell::RefCell;
use std::collections::{BTreeMap, VecDeque};
use std::rc::{Rc, Weak};

use opmode_types::{FailureSet, FeatureError, FeatureId, FlagSet};
use tracing::{debug, info, warn};

use crate::feature::{Feature, FeatureIdentity, FeatureRef, feature_id, weak_id};
use crate::resolver::{Resolution, Resolver};

#[derive(Default)]
struct RegistryState {
    candidates: Vec<Weak<dyn Feature>>,
    pending: VecDeque<Weak<dyn Feature>>,
    active: Vec<Weak<dyn Feature>>,
    /// `Some` while a session is open.
    flags: Option<FlagSet>,
    last_failures: BTreeMap<FeatureId, FailureSet>,
}

impl RegistryState {
    fn prune(&mut self) {
        self.candidates.retain(|w| w.strong_count() > 0);
        self.pending.retain(|w| w.strong_count() > 0);
        self.active.retain(|w| w.strong_count() > 0);
    }

    fn is_active(&self, id: FeatureId) -> bool {
        self.active
            .iter()
            .any(|w| w.strong_count() > 0 && weak_id(w) == id)
    }
}

/// Registry of every feature known to the process, plus the per-session
/// pending and active sets.
///
/// # Example
///
/// ```
/// use std::rc::Rc;
///
/// use opmode_kernel::{Dependencies, Dependency, Feature, FeatureRef, FeatureRegistry};
/// use opmode_types::FlagSet;
///
/// struct Drive { deps: Dependencies }
/// impl Feature for Drive {
///     fn dependencies(&self) -> &[Dependency] { &self.deps }
/// }
///
/// let registry = FeatureRegistry::new();
/// let drive: FeatureRef = Rc::new(Drive {
///     deps: Dependencies::of::<Drive>()
///         .includes_at_least_one_of(["teleop"])
///         .build()
///         .unwrap(),
/// });
/// registry.register(&drive).unwrap();
///
/// registry.open_session(["teleop"].into_iter().collect());
/// registry.drain_pending();
/// assert!(registry.is_active(&drive));
///
/// registry.close_session();
/// assert!(!registry.is_active(&drive));
/// assert_eq!(registry.candidate_count(), 1);
/// ```
#[derive(Default)]
pub struct FeatureRegistry {
    state: RefCell<RegistryState>,
}

impl FeatureRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty registry behind an `Rc`, ready to be shared with a
    /// session driver.
    pub fn shared() -> Rc<Self> {
        Rc::new(Self::new())
    }

    /// Register `feature` as a candidate.  While a session is open it is also
    /// queued for admission at the next phase boundary.
    ///
    /// Registering the same instance twice is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`FeatureError::SelfReference`] when one of the feature's
    /// dependencies names its own kind.
    pub fn register(&self, feature: &FeatureRef) -> Result<(), FeatureError> {
        let kind = feature.kind();
        for dep in feature.dependencies() {
            dep.condition().check_owner(kind)?;
        }

        let id = feature_id(feature);
        let mut state = self.state.borrow_mut();
        state.prune();
        if state.candidates.iter().any(|w| weak_id(w) == id) {
            debug!(feature = kind.name(), "feature already registered");
            return Ok(());
        }

        state.candidates.push(Rc::downgrade(feature));
        if state.flags.is_some() {
            state.pending.push_back(Rc::downgrade(feature));
        }
        debug!(
            feature = kind.name(),
            pending = state.flags.is_some(),
            "feature registered"
        );
        Ok(())
    }

    /// Remove `feature` from the candidate, pending and active sets.
    ///
    /// # Errors
    ///
    /// Returns [`FeatureError::NotRegistered`] when `feature` is not a
    /// registered candidate.
    pub fn deregister(&self, feature: &FeatureRef) -> Result<(), FeatureError> {
        let id = feature_id(feature);
        let mut state = self.state.borrow_mut();
        state.prune();

        let Some(pos) = state.candidates.iter().position(|w| weak_id(w) == id) else {
            warn!(feature = feature.kind().name(), "deregistering unknown feature");
            return Err(FeatureError::NotRegistered(feature.kind().name()));
        };
        state.candidates.remove(pos);
        state.pending.retain(|w| weak_id(w) != id);
        state.active.retain(|w| weak_id(w) != id);
        debug!(feature = feature.kind().name(), "feature deregistered");
        Ok(())
    }

    /// Open a session with `flags`: clear the active set and queue every live
    /// candidate for admission.
    pub fn open_session(&self, flags: FlagSet) {
        let mut state = self.state.borrow_mut();
        state.prune();
        state.active.clear();
        state.last_failures.clear();
        state.pending = state.candidates.iter().cloned().collect();
        info!(
            flags = %flags,
            candidates = state.candidates.len(),
            "feature session opened"
        );
        state.flags = Some(flags);
    }

    /// Close the session: forget the active and pending sets and the flags.
    /// Candidates are kept for the next session.
    pub fn close_session(&self) {
        let mut state = self.state.borrow_mut();
        state.active.clear();
        state.pending.clear();
        state.flags = None;
        debug!("feature session closed");
    }

    /// Resolve the pending queue against the active set and promote the
    /// newly resolved features into it, in resolution order.
    ///
    /// Pending features that fail to resolve leave the queue; they remain
    /// candidates and are reconsidered when the next session opens.  Without
    /// an open session this does nothing.
    pub fn drain_pending(&self) -> Resolution {
        let (pending, active, flags) = {
            let mut state = self.state.borrow_mut();
            let Some(flags) = state.flags.clone() else {
                return Resolution::default();
            };
            let pending: Vec<Weak<dyn Feature>> = state.pending.drain(..).collect();
            let mut seen = Vec::with_capacity(pending.len());
            let pending: Vec<FeatureRef> = pending
                .iter()
                .filter_map(Weak::upgrade)
                .filter(|f| {
                    let id = feature_id(f);
                    if state.is_active(id) || seen.contains(&id) {
                        return false;
                    }
                    seen.push(id);
                    true
                })
                .collect();
            let active: Vec<FeatureRef> = state.active.iter().filter_map(Weak::upgrade).collect();
            (pending, active, flags)
        };

        if pending.is_empty() {
            return Resolution::default();
        }

        let mut resolution = Resolver::new(&flags, &active).resolve(pending);

        let mut state = self.state.borrow_mut();
        // Output callbacks may have deregistered features while the engine ran.
        resolution.resolved.retain(|feature| {
            let id = feature_id(feature);
            let registered = state.candidates.iter().any(|w| weak_id(w) == id);
            if !registered {
                debug!(
                    feature = feature.kind().name(),
                    "feature deregistered during resolution, not activated"
                );
            }
            registered
        });
        for feature in &resolution.resolved {
            state.active.push(Rc::downgrade(feature));
        }
        for (id, failures) in &resolution.failures {
            state.last_failures.insert(*id, failures.clone());
        }
        for feature in &resolution.resolved {
            state.last_failures.remove(&feature_id(feature));
        }
        info!(
            activated = ?resolution.resolved_names(),
            unresolved = resolution.unresolved.len(),
            "pending features drained"
        );
        for feature in &resolution.unresolved {
            if let Some(failures) = resolution.failures_for(feature) {
                for failure in failures {
                    debug!(%failure, "feature not activated");
                }
            }
        }
        resolution
    }

    /// Check that every feature in `features` resolves against `flags` and
    /// the current active set, without changing any state or firing output
    /// callbacks.  Features already active count as resolved.
    ///
    /// # Errors
    ///
    /// Returns [`FeatureError::Unresolved`] carrying every failure of every
    /// requested feature that did not resolve.
    pub fn check_features(
        &self,
        flags: &FlagSet,
        features: &[FeatureRef],
    ) -> Result<(), FeatureError> {
        let active = self.active_features();
        let requested: Vec<FeatureRef> = {
            let state = self.state.borrow();
            features
                .iter()
                .filter(|f| !state.is_active(feature_id(f)))
                .cloned()
                .collect()
        };

        let resolution = Resolver::new(flags, &active).dry_run().resolve(requested);
        if resolution.unresolved.is_empty() {
            return Ok(());
        }

        let failures = resolution
            .unresolved
            .iter()
            .filter_map(|f| resolution.failures_for(f))
            .flat_map(|set| set.iter().cloned())
            .collect();
        Err(FeatureError::Unresolved(failures))
    }

    /// Live active features, in activation order.
    pub fn active_features(&self) -> Vec<FeatureRef> {
        self.state
            .borrow()
            .active
            .iter()
            .filter_map(Weak::upgrade)
            .collect()
    }

    pub fn is_active(&self, feature: &FeatureRef) -> bool {
        self.state.borrow().is_active(feature_id(feature))
    }

    pub fn is_registered(&self, feature: &FeatureRef) -> bool {
        let id = feature_id(feature);
        self.state
            .borrow()
            .candidates
            .iter()
            .any(|w| w.strong_count() > 0 && weak_id(w) == id)
    }

    /// Number of live candidates.
    pub fn candidate_count(&self) -> usize {
        self.state
            .borrow()
            .candidates
            .iter()
            .filter(|w| w.strong_count() > 0)
            .count()
    }

    /// Number of live features waiting for the next phase boundary.
    pub fn pending_count(&self) -> usize {
        self.state
            .borrow()
            .pending
            .iter()
            .filter(|w| w.strong_count() > 0)
            .count()
    }

    /// Flags of the open session, if any.
    pub fn flags(&self) -> Option<FlagSet> {
        self.state.borrow().flags.clone()
    }

    /// Failures of features that did not activate during the current
    /// session, as of the latest drain.
    pub fn failures_for(&self, feature: &FeatureRef) -> Option<FailureSet> {
        self.state
            .borrow()
            .last_failures
            .get(&feature_id(feature))
            .cloned()
    }
}

impl std::fmt::Debug for FeatureRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.borrow();
        f.debug_struct("FeatureRegistry")
            .field("candidates", &state.candidates.len())
            .field("pending", &state.pending.len())
            .field("active", &state.active.len())
            .field("flags", &state.flags)
            .finish()
    }
}

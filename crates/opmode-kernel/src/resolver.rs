//! [`Resolver`] – the fixpoint dependency resolution engine.
//!
//! Given a list of unresolved features, the features already active and the
//! session flags, the resolver works out which features activate and in what
//! order.
//!
//! # Algorithm
//!
//! The engine runs in *rounds*.  Each round walks the still-unresolved
//! features in their original order and evaluates **every** dependency of
//! each one (so a single run reports all unmet requirements, not just the
//! first).  A feature whose dependencies all hold is appended to the resolved
//! list straight away, which makes it visible to the features evaluated after
//! it in the same round.
//!
//! When a round resolves nothing the engine switches into *yielding* mode
//! and tries again; this is what lets [`Yields`][crate::Condition::Yields]
//! and [`YieldsTo`][crate::Condition::YieldsTo] features sink below every
//! feature that can resolve on its own.  A round without progress while
//! already yielding ends the run, and every feature still unresolved is
//! reported as deadlocked.
//!
//! With `N` input features the run takes at most `N + 2` rounds.
//!
//! # Example
//!
//! ```
//! use std::rc::Rc;
//!
//! use opmode_kernel::{Dependencies, Dependency, Feature, FeatureRef, Resolver};
//! use opmode_types::{FeatureKind, FlagSet};
//!
//! struct Drive { deps: Dependencies }
//! impl Feature for Drive {
//!     fn dependencies(&self) -> &[Dependency] { &self.deps }
//! }
//!
//! struct Telemetry { deps: Dependencies }
//! impl Feature for Telemetry {
//!     fn dependencies(&self) -> &[Dependency] { &self.deps }
//! }
//!
//! let telemetry: FeatureRef = Rc::new(Telemetry {
//!     deps: Dependencies::of::<Telemetry>().yields().build().unwrap(),
//! });
//! let drive: FeatureRef = Rc::new(Drive {
//!     deps: Dependencies::of::<Drive>()
//!         .includes_at_least_one_of(["teleop"])
//!         .build()
//!         .unwrap(),
//! });
//!
//! let flags: FlagSet = ["teleop"].into_iter().collect();
//! let resolution = Resolver::new(&flags, &[]).resolve([telemetry, drive]);
//!
//! assert_eq!(resolution.resolved_names(), vec!["Drive", "Telemetry"]);
//! ```

use std::collections::BTreeMap;

use opmode_types::{DependencyFailure, FailureSet, FeatureId, FlagSet};
use tracing::debug;

use crate::dependency::ResolutionContext;
use crate::feature::{Feature, FeatureIdentity, FeatureRef, feature_id};

// ─────────────────────────────────────────────────────────────────────────────
// Resolution
// ─────────────────────────────────────────────────────────────────────────────

/// Outcome of one engine run.
#[derive(Default)]
pub struct Resolution {
    /// Newly resolved features, in resolution order.
    pub resolved: Vec<FeatureRef>,
    /// Features that never resolved, in input order.
    pub unresolved: Vec<FeatureRef>,
    /// Failures of every unresolved feature.  Resolved features have no entry.
    pub failures: BTreeMap<FeatureId, FailureSet>,
    /// Number of rounds the run took.
    pub rounds: usize,
}

impl Resolution {
    pub fn failures_for(&self, feature: &FeatureRef) -> Option<&FailureSet> {
        self.failures.get(&feature_id(feature))
    }

    pub fn is_resolved(&self, feature: &FeatureRef) -> bool {
        let id = feature_id(feature);
        self.resolved.iter().any(|f| feature_id(f) == id)
    }

    pub fn resolved_names(&self) -> Vec<&'static str> {
        self.resolved.iter().map(|f| f.kind().name()).collect()
    }
}

impl std::fmt::Debug for Resolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resolution")
            .field("resolved", &self.resolved_names())
            .field(
                "unresolved",
                &self
                    .unresolved
                    .iter()
                    .map(|f| f.kind().name())
                    .collect::<Vec<_>>(),
            )
            .field("failures", &self.failures)
            .field("rounds", &self.rounds)
            .finish()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Resolver
// ─────────────────────────────────────────────────────────────────────────────

/// Fixpoint solver over a fixed flag set and active-feature context.
pub struct Resolver<'a> {
    flags: &'a FlagSet,
    active: &'a [FeatureRef],
    dry_run: bool,
}

impl<'a> Resolver<'a> {
    pub fn new(flags: &'a FlagSet, active: &'a [FeatureRef]) -> Self {
        Self {
            flags,
            active,
            dry_run: false,
        }
    }

    /// Evaluate without firing any dependency output callbacks.
    pub fn dry_run(mut self) -> Self {
        self.dry_run = true;
        self
    }

    /// Run the engine to its fixpoint.  Never fails: features that cannot
    /// resolve are reported in [`Resolution::failures`].
    pub fn resolve(&self, features: impl IntoIterator<Item = FeatureRef>) -> Resolution {
        let mut unresolved: Vec<FeatureRef> = features.into_iter().collect();
        let mut resolved: Vec<FeatureRef> = Vec::new();
        let mut failures: BTreeMap<FeatureId, FailureSet> = BTreeMap::new();
        let mut yielding = false;
        let mut rounds = 0;

        while !unresolved.is_empty() {
            rounds += 1;
            let before = unresolved.len();

            for feature in std::mem::take(&mut unresolved) {
                let ctx = ResolutionContext {
                    flags: self.flags,
                    active: self.active,
                    resolved: &resolved,
                    yielding,
                };
                let id = feature_id(&feature);
                match self.evaluate(&feature, &ctx) {
                    Ok(()) => {
                        failures.remove(&id);
                        resolved.push(feature);
                    }
                    Err(round_failures) => {
                        failures.insert(id, round_failures);
                        unresolved.push(feature);
                    }
                }
            }

            let progressed = unresolved.len() != before;
            debug!(
                round = rounds,
                yielding,
                resolved = before - unresolved.len(),
                remaining = unresolved.len(),
                "resolution round complete"
            );

            if !progressed {
                if yielding {
                    break;
                }
                yielding = true;
            }
        }

        for feature in &unresolved {
            debug!(feature = feature.kind().name(), "feature deadlocked");
            failures
                .entry(feature_id(feature))
                .or_default()
                .insert(DependencyFailure::deadlock(feature_id(feature), feature.kind()));
        }

        Resolution {
            resolved,
            unresolved,
            failures,
            rounds,
        }
    }

    /// Evaluate every dependency of `feature`, firing callbacks of the ones
    /// that hold.  `Err` carries this round's failures.
    fn evaluate(
        &self,
        feature: &FeatureRef,
        ctx: &ResolutionContext<'_>,
    ) -> Result<(), FailureSet> {
        let id = feature_id(feature);
        let kind = feature.kind();
        let deps = feature.dependencies();
        let mut round_failures = FailureSet::new();

        for dep in deps {
            match dep.resolve_or_fail(id, kind, ctx) {
                Ok(output) => {
                    if !self.dry_run {
                        dep.emit(output);
                    }
                }
                Err(failure) => {
                    round_failures.insert(failure);
                }
            }
        }

        if deps.is_empty() || !round_failures.is_empty() {
            Err(round_failures)
        } else {
            Ok(())
        }
    }
}

/// Shorthand for `Resolver::new(flags, active).resolve(unresolved)`.
pub fn resolve(
    unresolved: impl IntoIterator<Item = FeatureRef>,
    active: &[FeatureRef],
    flags: &FlagSet,
) -> Resolution {
    Resolver::new(flags, active).resolve(unresolved)
}

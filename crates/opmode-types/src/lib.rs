//! `opmode-types` – shared vocabulary for the feature resolution stack.
//!
//! Everything in here is plain data: session [`Flag`]s, the ten lifecycle
//! [`Phase`]s, feature identities ([`FeatureKind`], [`FeatureId`]) and the
//! failure / error types that the kernel and runtime report.

use std::any::TypeId;
use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Message attached to every feature still unresolved when the engine stops.
pub const DEADLOCK_MESSAGE: &str = "resolution attempt resulted in a deadlock";

// ─────────────────────────────────────────────────────────────────────────────
// Flags
// ─────────────────────────────────────────────────────────────────────────────

/// An opaque session marker (e.g. `"teleop"`, `"autonomous"`, `"red_alliance"`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Flag(String);

impl Flag {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Flag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Flag {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for Flag {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// The de-duplicated set of [`Flag`]s describing one session.
///
/// Harvested once when the session opens and never mutated afterwards.
/// Iteration order is the flags' sort order, which keeps every evaluation
/// over the set deterministic.
///
/// ```
/// use opmode_types::{Flag, FlagSet};
///
/// let flags: FlagSet = ["teleop", "teleop", "red"].into_iter().collect();
/// assert_eq!(flags.len(), 2);
/// assert!(flags.contains(&Flag::new("red")));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FlagSet(BTreeSet<Flag>);

impl FlagSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, flag: &Flag) -> bool {
        self.0.contains(flag)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Flag> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<F: Into<Flag>> FromIterator<F> for FlagSet {
    fn from_iter<I: IntoIterator<Item = F>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

impl fmt::Display for FlagSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.0.iter().map(Flag::as_str).collect();
        write!(f, "{{{}}}", names.join(", "))
    }
}

/// Descriptive metadata of one session, supplied by whoever starts it.
///
/// The flags listed here are harvested into the session's [`FlagSet`] when
/// the session opens.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionMeta {
    pub name: String,
    #[serde(default)]
    pub flags: Vec<Flag>,
}

impl SessionMeta {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            flags: Vec::new(),
        }
    }

    pub fn with_flag(mut self, flag: impl Into<Flag>) -> Self {
        self.flags.push(flag.into());
        self
    }

    pub fn flag_set(&self) -> FlagSet {
        self.flags.iter().cloned().collect()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Phases
// ─────────────────────────────────────────────────────────────────────────────

/// The ten lifecycle phases of a session, in firing order.
///
/// The `*InitLoop` and `*Loop` pairs may repeat any number of times
/// (including zero); every other phase fires exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    PreInit,
    PostInit,
    PreInitLoop,
    PostInitLoop,
    PreStart,
    PostStart,
    PreLoop,
    PostLoop,
    PreStop,
    PostStop,
}

impl Phase {
    /// Return `true` when `self` may be entered directly after `previous`.
    ///
    /// `previous == None` means no session is open; only [`Phase::PreInit`]
    /// may follow it. A finished session (`Some(PostStop)`) may be followed
    /// by a fresh [`Phase::PreInit`].
    pub fn may_follow(self, previous: Option<Phase>) -> bool {
        use Phase::*;
        matches!(
            (previous, self),
            (None | Some(PostStop), PreInit)
                | (Some(PreInit), PostInit)
                | (Some(PostInit | PostInitLoop), PreInitLoop | PreStart)
                | (Some(PreInitLoop), PostInitLoop)
                | (Some(PreStart), PostStart)
                | (Some(PostStart | PostLoop), PreLoop | PreStop)
                | (Some(PreLoop), PostLoop)
                | (Some(PreStop), PostStop)
        )
    }

    pub fn name(self) -> &'static str {
        match self {
            Phase::PreInit => "pre_init",
            Phase::PostInit => "post_init",
            Phase::PreInitLoop => "pre_init_loop",
            Phase::PostInitLoop => "post_init_loop",
            Phase::PreStart => "pre_start",
            Phase::PostStart => "post_start",
            Phase::PreLoop => "pre_loop",
            Phase::PostLoop => "post_loop",
            Phase::PreStop => "pre_stop",
            Phase::PostStop => "post_stop",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Feature identity
// ─────────────────────────────────────────────────────────────────────────────

/// The concrete Rust type of a feature, used by type-based dependencies.
///
/// Two kinds are equal when their [`TypeId`]s are equal; the name is only
/// carried for diagnostics.
#[derive(Debug, Clone, Copy)]
pub struct FeatureKind {
    id: TypeId,
    name: &'static str,
}

impl FeatureKind {
    pub fn of<T: ?Sized + 'static>() -> Self {
        let full = std::any::type_name::<T>();
        // Keep the last path segment, ignoring any generic arguments.
        let base = full.split('<').next().unwrap_or(full);
        let name = base.rsplit("::").next().unwrap_or(base);
        Self {
            id: TypeId::of::<T>(),
            name,
        }
    }

    pub fn type_id(&self) -> TypeId {
        self.id
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl PartialEq for FeatureKind {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for FeatureKind {}

impl std::hash::Hash for FeatureKind {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Display for FeatureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// Identity of one feature instance: the address of its shared allocation.
///
/// Only meaningful while the instance is alive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FeatureId(usize);

impl FeatureId {
    pub fn from_ptr<T: ?Sized>(ptr: *const T) -> Self {
        Self(ptr.cast::<()>() as usize)
    }
}

impl fmt::Display for FeatureId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Failures
// ─────────────────────────────────────────────────────────────────────────────

/// Structured record of one unmet dependency.
///
/// Equality only considers the feature identity and the message, so the same
/// failure observed in two rounds collapses into one diagnostic.
#[derive(Debug, Clone)]
pub struct DependencyFailure {
    pub feature: FeatureId,
    pub feature_name: &'static str,
    pub message: String,
    pub unmet: Vec<String>,
}

impl DependencyFailure {
    pub fn new(
        feature: FeatureId,
        kind: FeatureKind,
        message: impl Into<String>,
        unmet: Vec<String>,
    ) -> Self {
        Self {
            feature,
            feature_name: kind.name(),
            message: message.into(),
            unmet,
        }
    }

    /// The synthetic failure given to features left over when the engine stops.
    pub fn deadlock(feature: FeatureId, kind: FeatureKind) -> Self {
        Self::new(feature, kind, DEADLOCK_MESSAGE, Vec::new())
    }

    pub fn is_deadlock(&self) -> bool {
        self.message == DEADLOCK_MESSAGE
    }
}

impl PartialEq for DependencyFailure {
    fn eq(&self, other: &Self) -> bool {
        self.feature == other.feature && self.message == other.message
    }
}

impl Eq for DependencyFailure {}

impl fmt::Display for DependencyFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.feature_name, self.message)?;
        if !self.unmet.is_empty() {
            write!(f, " [{}]", self.unmet.join(", "))?;
        }
        Ok(())
    }
}

/// Insertion-ordered set of [`DependencyFailure`]s for one feature.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FailureSet(Vec<DependencyFailure>);

impl FailureSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `failure` unless an equal one is already present.
    /// Returns `true` when the set changed.
    pub fn insert(&mut self, failure: DependencyFailure) -> bool {
        if self.0.contains(&failure) {
            return false;
        }
        self.0.push(failure);
        true
    }

    pub fn iter(&self) -> std::slice::Iter<'_, DependencyFailure> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn is_deadlocked(&self) -> bool {
        self.0.iter().any(DependencyFailure::is_deadlock)
    }
}

impl FromIterator<DependencyFailure> for FailureSet {
    fn from_iter<I: IntoIterator<Item = DependencyFailure>>(iter: I) -> Self {
        let mut set = Self::new();
        for failure in iter {
            set.insert(failure);
        }
        set
    }
}

impl<'a> IntoIterator for &'a FailureSet {
    type Item = &'a DependencyFailure;
    type IntoIter = std::slice::Iter<'a, DependencyFailure>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl IntoIterator for FailureSet {
    type Item = DependencyFailure;
    type IntoIter = std::vec::IntoIter<DependencyFailure>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Errors
// ─────────────────────────────────────────────────────────────────────────────

/// Errors raised by the registry, the session driver and dependency builders.
///
/// Resolution itself never produces one of these: unresolved features are
/// reported as data. Only [`FeatureError::Unresolved`] turns that data into an
/// error, for callers that explicitly asked for an assertion.
#[derive(Error, Debug)]
pub enum FeatureError {
    #[error("{feature} declares a {dependency} dependency on itself")]
    SelfReference {
        feature: &'static str,
        dependency: &'static str,
    },

    #[error("{0} binds an output callback before declaring any dependency")]
    DetachedOutput(&'static str),

    #[error("feature {0} is not registered")]
    NotRegistered(&'static str),

    #[error("{}", describe_unresolved(.0))]
    Unresolved(Vec<DependencyFailure>),

    #[error("phase {to} cannot follow {}", .from.map_or("<no session>", Phase::name))]
    PhaseOrder { from: Option<Phase>, to: Phase },
}

fn describe_unresolved(failures: &[DependencyFailure]) -> String {
    let mut out = String::from("features failed to resolve:");
    for failure in failures {
        out.push_str("\n  - ");
        out.push_str(&failure.to_string());
    }
    out
}

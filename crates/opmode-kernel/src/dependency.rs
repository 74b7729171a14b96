//! [`Dependency`] – the predicate algebra a [`Feature`] uses to declare when it
//! should activate.
//!
//! Every dependency wraps one [`Condition`] from a closed set:
//!
//! | Condition | Succeeds when | Output |
//! |---|---|---|
//! | [`IncludesAtLeastOneOf`] | ≥1 listed flag is present | matched flags |
//! | [`IncludesExactlyOneOf`] | exactly one distinct listed flag is present | that flag |
//! | [`ExcludesFlags`] | no listed flag is present | – |
//! | [`DependsOnOneOf`] | a feature of a listed kind is in context | first match |
//! | [`MutuallyExclusiveWith`] | no feature of a listed kind is in context | – |
//! | [`Yields`] | the engine is yielding | – |
//! | [`YieldsTo`] | yielding *and* a listed kind is in context | matched features |
//!
//! A dependency may carry an output callback which receives the matched data
//! the first time the condition succeeds, and never again.
//!
//! [`IncludesAtLeastOneOf`]: Condition::IncludesAtLeastOneOf
//! [`IncludesExactlyOneOf`]: Condition::IncludesExactlyOneOf
//! [`ExcludesFlags`]: Condition::ExcludesFlags
//! [`DependsOnOneOf`]: Condition::DependsOnOneOf
//! [`MutuallyExclusiveWith`]: Condition::MutuallyExclusiveWith
//! [`Yields`]: Condition::Yields
//! [`YieldsTo`]: Condition::YieldsTo

use std::cell::Cell;
use std::fmt;
use std::ops::Deref;
use std::rc::Rc;

use opmode_types::{DependencyFailure, FeatureError, FeatureId, FeatureKind, Flag, FlagSet};

use crate::feature::{Feature, FeatureIdentity, FeatureRef, feature_names};

const MISSING_FLAGS: &str = "none of the required flags were present";
const TOO_MANY_FLAGS: &str = "more than one of the exclusive flags were present";
const EXCLUDED_FLAGS: &str = "excluded flags were present";
const MISSING_FEATURES: &str = "none of the required features were activated";
const EXCLUDED_FEATURES: &str = "excluded features were activated";
const WAITING: &str = "waiting for other features to resolve";
const MISSING_YIELD_TARGETS: &str = "none of the yielded-to features were activated";

// ─────────────────────────────────────────────────────────────────────────────
// Evaluation context
// ─────────────────────────────────────────────────────────────────────────────

/// Everything a [`Condition`] may look at while being evaluated.
pub struct ResolutionContext<'a> {
    /// The session's flags.
    pub flags: &'a FlagSet,
    /// Features that were active before this engine run started.
    pub active: &'a [FeatureRef],
    /// Features resolved so far in this engine run, in resolution order.
    pub resolved: &'a [FeatureRef],
    /// Whether the engine has entered its yielding phase.
    pub yielding: bool,
}

impl<'a> ResolutionContext<'a> {
    /// Active features followed by features resolved in this run.
    pub fn features(&self) -> impl Iterator<Item = &'a FeatureRef> + use<'a> {
        self.active.iter().chain(self.resolved.iter())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Output
// ─────────────────────────────────────────────────────────────────────────────

/// Data produced by a succeeding [`Condition`].
#[derive(Clone)]
pub enum DependencyOutput {
    None,
    Flag(Flag),
    Flags(Vec<Flag>),
    Feature(FeatureRef),
    Features(Vec<FeatureRef>),
}

impl fmt::Debug for DependencyOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DependencyOutput::None => f.write_str("None"),
            DependencyOutput::Flag(flag) => f.debug_tuple("Flag").field(flag).finish(),
            DependencyOutput::Flags(flags) => f.debug_tuple("Flags").field(flags).finish(),
            DependencyOutput::Feature(feature) => f
                .debug_tuple("Feature")
                .field(&feature.kind().name())
                .finish(),
            DependencyOutput::Features(features) => f
                .debug_tuple("Features")
                .field(&feature_names(features))
                .finish(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Condition
// ─────────────────────────────────────────────────────────────────────────────

/// The closed set of activation conditions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Condition {
    IncludesAtLeastOneOf(Vec<Flag>),
    IncludesExactlyOneOf(Vec<Flag>),
    ExcludesFlags(Vec<Flag>),
    DependsOnOneOf(Vec<FeatureKind>),
    MutuallyExclusiveWith(Vec<FeatureKind>),
    Yields,
    YieldsTo(Vec<FeatureKind>),
}

/// Why a condition did not hold: a message and the unmet requirement names.
type Unmet = (&'static str, Vec<String>);

impl Condition {
    pub fn name(&self) -> &'static str {
        match self {
            Condition::IncludesAtLeastOneOf(_) => "includes_at_least_one_of",
            Condition::IncludesExactlyOneOf(_) => "includes_exactly_one_of",
            Condition::ExcludesFlags(_) => "excludes_flags",
            Condition::DependsOnOneOf(_) => "depends_on_one_of",
            Condition::MutuallyExclusiveWith(_) => "mutually_exclusive_with",
            Condition::Yields => "yields",
            Condition::YieldsTo(_) => "yields_to",
        }
    }

    /// Reject conditions that name their own feature kind where that can
    /// never be meaningful.
    pub fn check_owner(&self, owner: FeatureKind) -> Result<(), FeatureError> {
        match self {
            Condition::DependsOnOneOf(kinds) | Condition::MutuallyExclusiveWith(kinds)
                if kinds.contains(&owner) =>
            {
                Err(FeatureError::SelfReference {
                    feature: owner.name(),
                    dependency: self.name(),
                })
            }
            _ => Ok(()),
        }
    }

    fn evaluate(&self, ctx: &ResolutionContext<'_>) -> Result<DependencyOutput, Unmet> {
        match self {
            Condition::IncludesAtLeastOneOf(flags) => {
                let found: Vec<Flag> = distinct(flags)
                    .into_iter()
                    .filter(|flag| ctx.flags.contains(flag))
                    .cloned()
                    .collect();
                if found.is_empty() {
                    Err((MISSING_FLAGS, flag_names(distinct(flags))))
                } else {
                    Ok(DependencyOutput::Flags(found))
                }
            }

            Condition::IncludesExactlyOneOf(flags) => {
                let found: Vec<&Flag> = distinct(flags)
                    .into_iter()
                    .filter(|flag| ctx.flags.contains(flag))
                    .collect();
                match found.as_slice() {
                    [] => Err((MISSING_FLAGS, flag_names(distinct(flags)))),
                    [only] => Ok(DependencyOutput::Flag((*only).clone())),
                    [_, excess @ ..] => Err((TOO_MANY_FLAGS, flag_names(excess.to_vec()))),
                }
            }

            Condition::ExcludesFlags(flags) => {
                let found: Vec<&Flag> = distinct(flags)
                    .into_iter()
                    .filter(|flag| ctx.flags.contains(flag))
                    .collect();
                if found.is_empty() {
                    Ok(DependencyOutput::None)
                } else {
                    Err((EXCLUDED_FLAGS, flag_names(found)))
                }
            }

            Condition::DependsOnOneOf(kinds) => ctx
                .features()
                .find(|feature| kinds.contains(&feature.kind()))
                .map(|feature| DependencyOutput::Feature(Rc::clone(feature)))
                .ok_or_else(|| (MISSING_FEATURES, kind_names(distinct(kinds)))),

            Condition::MutuallyExclusiveWith(kinds) => {
                let found: Vec<&FeatureKind> = distinct(kinds)
                    .into_iter()
                    .filter(|kind| ctx.features().any(|f| f.kind() == **kind))
                    .collect();
                if found.is_empty() {
                    Ok(DependencyOutput::None)
                } else {
                    Err((EXCLUDED_FEATURES, kind_names(found)))
                }
            }

            Condition::Yields => {
                if ctx.yielding {
                    Ok(DependencyOutput::None)
                } else {
                    Err((WAITING, Vec::new()))
                }
            }

            Condition::YieldsTo(kinds) => {
                if !ctx.yielding {
                    return Err((WAITING, kind_names(distinct(kinds))));
                }
                let found: Vec<FeatureRef> = ctx
                    .features()
                    .filter(|feature| kinds.contains(&feature.kind()))
                    .cloned()
                    .collect();
                if found.is_empty() {
                    Err((MISSING_YIELD_TARGETS, kind_names(distinct(kinds))))
                } else {
                    Ok(DependencyOutput::Features(found))
                }
            }
        }
    }
}

fn distinct<T: PartialEq>(items: &[T]) -> Vec<&T> {
    let mut out: Vec<&T> = Vec::with_capacity(items.len());
    for item in items {
        if !out.contains(&item) {
            out.push(item);
        }
    }
    out
}

fn flag_names(flags: Vec<&Flag>) -> Vec<String> {
    flags.into_iter().map(ToString::to_string).collect()
}

fn kind_names(kinds: Vec<&FeatureKind>) -> Vec<String> {
    kinds.into_iter().map(ToString::to_string).collect()
}

// ─────────────────────────────────────────────────────────────────────────────
// Dependency
// ─────────────────────────────────────────────────────────────────────────────

type OutputCallback = Box<dyn FnOnce(DependencyOutput)>;

/// One [`Condition`] plus its optional, write-once output callback.
pub struct Dependency {
    condition: Condition,
    on_output: Cell<Option<OutputCallback>>,
}

impl Dependency {
    pub fn new(condition: Condition) -> Self {
        Self {
            condition,
            on_output: Cell::new(None),
        }
    }

    /// Build a dependency whose `callback` receives the matched data the
    /// first time `condition` succeeds.
    pub fn with_output(
        condition: Condition,
        callback: impl FnOnce(DependencyOutput) + 'static,
    ) -> Self {
        Self {
            condition,
            on_output: Cell::new(Some(Box::new(callback))),
        }
    }

    pub fn condition(&self) -> &Condition {
        &self.condition
    }

    /// Evaluate the condition.  `None` means it does not currently hold.
    pub fn resolve(&self, ctx: &ResolutionContext<'_>) -> Option<DependencyOutput> {
        self.condition.evaluate(ctx).ok()
    }

    /// Evaluate the condition on behalf of `owner`, turning a miss into a
    /// structured [`DependencyFailure`].
    pub fn resolve_or_fail(
        &self,
        owner: FeatureId,
        kind: FeatureKind,
        ctx: &ResolutionContext<'_>,
    ) -> Result<DependencyOutput, DependencyFailure> {
        self.condition
            .evaluate(ctx)
            .map_err(|(message, unmet)| DependencyFailure::new(owner, kind, message, unmet))
    }

    /// Hand `output` to the bound callback, consuming it.  Later calls are
    /// no-ops.
    pub(crate) fn emit(&self, output: DependencyOutput) {
        if let Some(callback) = self.on_output.take() {
            callback(output);
        }
    }

    fn bind(&mut self, callback: OutputCallback) {
        self.on_output = Cell::new(Some(callback));
    }
}

impl fmt::Debug for Dependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Dependency").field(&self.condition).finish()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Dependencies builder
// ─────────────────────────────────────────────────────────────────────────────

/// The ordered dependency list owned by a feature.
///
/// Dereferences to `[Dependency]` so it can be returned directly from
/// [`Feature::dependencies`].
#[derive(Debug, Default)]
pub struct Dependencies(Vec<Dependency>);

impl Dependencies {
    /// Start building the dependency list of feature type `F`.
    pub fn of<F: Feature + 'static>() -> DependenciesBuilder {
        DependenciesBuilder {
            owner: FeatureKind::of::<F>(),
            deps: Vec::new(),
            error: None,
        }
    }
}

impl Deref for Dependencies {
    type Target = [Dependency];

    fn deref(&self) -> &[Dependency] {
        &self.0
    }
}

/// Builder returned by [`Dependencies::of`].
///
/// Self-referencing conditions are remembered and reported by
/// [`build`][DependenciesBuilder::build], so a misdeclared feature can never
/// be constructed.
///
/// ```
/// use opmode_kernel::{Dependencies, Dependency, Feature};
/// use opmode_types::{FeatureError, FeatureKind};
///
/// struct Odometry;
/// impl Feature for Odometry {
///     fn dependencies(&self) -> &[Dependency] { &[] }
/// }
///
/// let err = Dependencies::of::<Odometry>()
///     .depends_on_one_of([FeatureKind::of::<Odometry>()])
///     .build()
///     .unwrap_err();
/// assert!(matches!(err, FeatureError::SelfReference { .. }));
/// ```
pub struct DependenciesBuilder {
    owner: FeatureKind,
    deps: Vec<Dependency>,
    error: Option<FeatureError>,
}

impl DependenciesBuilder {
    /// Append an arbitrary condition.
    pub fn with(mut self, condition: Condition) -> Self {
        if self.error.is_none()
            && let Err(e) = condition.check_owner(self.owner)
        {
            self.error = Some(e);
        }
        self.deps.push(Dependency::new(condition));
        self
    }

    pub fn includes_at_least_one_of<I>(self, flags: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<Flag>,
    {
        self.with(Condition::IncludesAtLeastOneOf(collect_flags(flags)))
    }

    pub fn includes_exactly_one_of<I>(self, flags: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<Flag>,
    {
        self.with(Condition::IncludesExactlyOneOf(collect_flags(flags)))
    }

    pub fn excludes_flags<I>(self, flags: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<Flag>,
    {
        self.with(Condition::ExcludesFlags(collect_flags(flags)))
    }

    pub fn depends_on_one_of(self, kinds: impl IntoIterator<Item = FeatureKind>) -> Self {
        self.with(Condition::DependsOnOneOf(kinds.into_iter().collect()))
    }

    pub fn mutually_exclusive_with(self, kinds: impl IntoIterator<Item = FeatureKind>) -> Self {
        self.with(Condition::MutuallyExclusiveWith(kinds.into_iter().collect()))
    }

    pub fn yields(self) -> Self {
        self.with(Condition::Yields)
    }

    pub fn yields_to(self, kinds: impl IntoIterator<Item = FeatureKind>) -> Self {
        self.with(Condition::YieldsTo(kinds.into_iter().collect()))
    }

    /// Bind `callback` to the most recently added dependency, replacing any
    /// callback bound to it before.  On an empty builder the callback has
    /// nothing to attach to and [`build`][Self::build] fails.
    pub fn on_output(mut self, callback: impl FnOnce(DependencyOutput) + 'static) -> Self {
        match self.deps.last_mut() {
            Some(last) => last.bind(Box::new(callback)),
            None if self.error.is_none() => {
                self.error = Some(FeatureError::DetachedOutput(self.owner.name()));
            }
            None => {}
        }
        self
    }

    /// Finish the list.
    ///
    /// # Errors
    ///
    /// Returns [`FeatureError::SelfReference`] if a `depends_on_one_of` or
    /// `mutually_exclusive_with` condition names the owning feature type, and
    /// [`FeatureError::DetachedOutput`] if `on_output` was called before any
    /// condition was added.
    pub fn build(self) -> Result<Dependencies, FeatureError> {
        match self.error {
            Some(e) => Err(e),
            None => Ok(Dependencies(self.deps)),
        }
    }
}

fn collect_flags<I>(flags: I) -> Vec<Flag>
where
    I: IntoIterator,
    I::Item: Into<Flag>,
{
    flags.into_iter().map(Into::into).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    // ------------------------------------------------------------------
    // Test doubles
    // ------------------------------------------------------------------

    struct Drive;
    impl Feature for Drive {
        fn dependencies(&self) -> &[Dependency] {
            &[]
        }
    }

    struct Arm;
    impl Feature for Arm {
        fn dependencies(&self) -> &[Dependency] {
            &[]
        }
    }

    struct Vision;
    impl Feature for Vision {
        fn dependencies(&self) -> &[Dependency] {
            &[]
        }
    }

    fn flags(names: &[&str]) -> FlagSet {
        names.iter().copied().collect()
    }

    fn ctx<'a>(
        flags: &'a FlagSet,
        active: &'a [FeatureRef],
        resolved: &'a [FeatureRef],
        yielding: bool,
    ) -> ResolutionContext<'a> {
        ResolutionContext {
            flags,
            active,
            resolved,
            yielding,
        }
    }

    fn fail(dep: &Dependency, ctx: &ResolutionContext<'_>) -> DependencyFailure {
        let owner = FeatureId::from_ptr(std::ptr::null::<u8>());
        dep.resolve_or_fail(owner, FeatureKind::of::<Vision>(), ctx)
            .unwrap_err()
    }

    fn unmet(failure: &DependencyFailure) -> Vec<&str> {
        failure.unmet.iter().map(String::as_str).collect()
    }

    // ------------------------------------------------------------------
    // Flag conditions
    // ------------------------------------------------------------------

    #[test]
    fn at_least_one_of_outputs_matched_subset() {
        let set = flags(&["teleop", "red"]);
        let dep = Dependency::new(Condition::IncludesAtLeastOneOf(vec![
            "auto".into(),
            "red".into(),
            "teleop".into(),
        ]));
        match dep.resolve(&ctx(&set, &[], &[], false)) {
            Some(DependencyOutput::Flags(found)) => {
                assert_eq!(found, vec![Flag::new("red"), Flag::new("teleop")]);
            }
            other => panic!("unexpected output {other:?}"),
        }
    }

    #[test]
    fn at_least_one_of_fails_listing_required_flags() {
        let set = flags(&[]);
        let dep = Dependency::new(Condition::IncludesAtLeastOneOf(vec!["a".into(), "b".into()]));
        let failure = fail(&dep, &ctx(&set, &[], &[], false));
        assert_eq!(failure.message, MISSING_FLAGS);
        assert_eq!(unmet(&failure), vec!["a", "b"]);
    }

    #[test]
    fn exactly_one_of_with_no_match_lists_every_candidate() {
        let set = flags(&[]);
        let dep = Dependency::new(Condition::IncludesExactlyOneOf(vec!["x".into(), "y".into()]));
        let failure = fail(&dep, &ctx(&set, &[], &[], false));
        assert_eq!(failure.message, MISSING_FLAGS);
        assert_eq!(unmet(&failure), vec!["x", "y"]);
    }

    #[test]
    fn exactly_one_of_with_both_flags_lists_the_excess() {
        let set = flags(&["x", "y"]);
        let dep = Dependency::new(Condition::IncludesExactlyOneOf(vec!["x".into(), "y".into()]));
        let failure = fail(&dep, &ctx(&set, &[], &[], false));
        assert_eq!(failure.message, TOO_MANY_FLAGS);
        assert_eq!(unmet(&failure), vec!["y"]);
    }

    #[test]
    fn exactly_one_of_excess_skips_absent_candidates() {
        let set = flags(&["x", "z"]);
        let dep = Dependency::new(Condition::IncludesExactlyOneOf(vec![
            "x".into(),
            "y".into(),
            "z".into(),
        ]));
        let failure = fail(&dep, &ctx(&set, &[], &[], false));
        assert_eq!(failure.message, TOO_MANY_FLAGS);
        assert_eq!(unmet(&failure), vec!["z"]);
    }

    #[test]
    fn exactly_one_of_counts_distinct_flags() {
        let set = flags(&["x"]);
        let dep = Dependency::new(Condition::IncludesExactlyOneOf(vec!["x".into(), "x".into()]));
        match dep.resolve(&ctx(&set, &[], &[], false)) {
            Some(DependencyOutput::Flag(flag)) => assert_eq!(flag, Flag::new("x")),
            other => panic!("unexpected output {other:?}"),
        }
    }

    #[test]
    fn excludes_flags_lists_offenders() {
        let set = flags(&["teleop", "red"]);
        let dep = Dependency::new(Condition::ExcludesFlags(vec!["red".into(), "blue".into()]));
        let failure = fail(&dep, &ctx(&set, &[], &[], false));
        assert_eq!(failure.message, EXCLUDED_FLAGS);
        assert_eq!(unmet(&failure), vec!["red"]);

        let clean = flags(&["teleop"]);
        assert!(matches!(
            dep.resolve(&ctx(&clean, &[], &[], false)),
            Some(DependencyOutput::None)
        ));
    }

    // ------------------------------------------------------------------
    // Feature conditions
    // ------------------------------------------------------------------

    #[test]
    fn depends_on_one_of_returns_first_match_in_context_order() {
        let set = flags(&[]);
        let arm: FeatureRef = Rc::new(Arm);
        let drive: FeatureRef = Rc::new(Drive);
        let active = [Rc::clone(&arm)];
        let resolved = [Rc::clone(&drive)];
        let dep = Dependency::new(Condition::DependsOnOneOf(vec![
            FeatureKind::of::<Drive>(),
            FeatureKind::of::<Arm>(),
        ]));
        match dep.resolve(&ctx(&set, &active, &resolved, false)) {
            Some(DependencyOutput::Feature(found)) => assert!(Rc::ptr_eq(&found, &arm)),
            other => panic!("unexpected output {other:?}"),
        }
    }

    #[test]
    fn depends_on_one_of_fails_naming_required_kinds() {
        let set = flags(&[]);
        let dep = Dependency::new(Condition::DependsOnOneOf(vec![FeatureKind::of::<Drive>()]));
        let failure = fail(&dep, &ctx(&set, &[], &[], false));
        assert_eq!(failure.message, MISSING_FEATURES);
        assert_eq!(unmet(&failure), vec!["Drive"]);
    }

    #[test]
    fn mutually_exclusive_lists_present_kinds() {
        let set = flags(&[]);
        let resolved: [FeatureRef; 1] = [Rc::new(Drive)];
        let dep = Dependency::new(Condition::MutuallyExclusiveWith(vec![
            FeatureKind::of::<Arm>(),
            FeatureKind::of::<Drive>(),
        ]));
        let failure = fail(&dep, &ctx(&set, &[], &resolved, false));
        assert_eq!(failure.message, EXCLUDED_FEATURES);
        assert_eq!(unmet(&failure), vec!["Drive"]);
        assert!(dep.resolve(&ctx(&set, &[], &[], false)).is_some());
    }

    // ------------------------------------------------------------------
    // Yield conditions
    // ------------------------------------------------------------------

    #[test]
    fn yields_only_succeeds_while_yielding() {
        let set = flags(&[]);
        let dep = Dependency::new(Condition::Yields);
        assert!(dep.resolve(&ctx(&set, &[], &[], false)).is_none());
        assert!(matches!(
            dep.resolve(&ctx(&set, &[], &[], true)),
            Some(DependencyOutput::None)
        ));
    }

    #[test]
    fn yields_to_needs_yielding_and_a_present_target() {
        let set = flags(&[]);
        let active: [FeatureRef; 2] = [Rc::new(Arm), Rc::new(Drive)];
        let dep = Dependency::new(Condition::YieldsTo(vec![FeatureKind::of::<Drive>()]));

        assert_eq!(fail(&dep, &ctx(&set, &active, &[], false)).message, WAITING);
        assert_eq!(
            fail(&dep, &ctx(&set, &[], &[], true)).message,
            MISSING_YIELD_TARGETS
        );
        match dep.resolve(&ctx(&set, &active, &[], true)) {
            Some(DependencyOutput::Features(found)) => {
                assert_eq!(found.len(), 1);
                assert!(Rc::ptr_eq(&found[0], &active[1]));
            }
            other => panic!("unexpected output {other:?}"),
        }
    }

    // ------------------------------------------------------------------
    // Builder and callbacks
    // ------------------------------------------------------------------

    #[test]
    fn builder_rejects_self_dependency() {
        let err = Dependencies::of::<Drive>()
            .yields()
            .depends_on_one_of([FeatureKind::of::<Drive>()])
            .build()
            .unwrap_err();
        assert!(matches!(
            err,
            FeatureError::SelfReference {
                feature: "Drive",
                dependency: "depends_on_one_of"
            }
        ));
    }

    #[test]
    fn builder_rejects_self_exclusion() {
        let result = Dependencies::of::<Arm>()
            .mutually_exclusive_with([FeatureKind::of::<Drive>(), FeatureKind::of::<Arm>()])
            .build();
        assert!(matches!(result, Err(FeatureError::SelfReference { .. })));
    }

    #[test]
    fn builder_rejects_callback_without_dependency() {
        let err = Dependencies::of::<Arm>()
            .on_output(|_| {})
            .yields()
            .build()
            .unwrap_err();
        assert!(matches!(err, FeatureError::DetachedOutput("Arm")));
        assert_eq!(
            err.to_string(),
            "Arm binds an output callback before declaring any dependency"
        );
    }

    #[test]
    fn builder_keeps_declaration_order() {
        let deps = Dependencies::of::<Arm>()
            .includes_at_least_one_of(["teleop"])
            .depends_on_one_of([FeatureKind::of::<Drive>()])
            .yields()
            .build()
            .unwrap();
        let names: Vec<&str> = deps.iter().map(|d| d.condition().name()).collect();
        assert_eq!(
            names,
            vec!["includes_at_least_one_of", "depends_on_one_of", "yields"]
        );
    }

    #[test]
    fn output_callback_fires_once() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        let deps = Dependencies::of::<Arm>()
            .includes_exactly_one_of(["x", "y"])
            .on_output(move |out| sink.borrow_mut().push(out))
            .build()
            .unwrap();

        deps[0].emit(DependencyOutput::Flag(Flag::new("x")));
        deps[0].emit(DependencyOutput::Flag(Flag::new("y")));

        let seen = seen.borrow();
        assert_eq!(seen.len(), 1);
        assert!(matches!(&seen[0], DependencyOutput::Flag(f) if f.as_str() == "x"));
    }

    #[test]
    fn failure_records_owner_identity() {
        let set = flags(&[]);
        let owner: FeatureRef = Rc::new(Arm);
        let id = crate::feature::feature_id(&owner);
        let dep = Dependency::new(Condition::Yields);
        let failure = dep
            .resolve_or_fail(id, owner.kind(), &ctx(&set, &[], &[], false))
            .unwrap_err();
        assert_eq!(failure.feature, id);
        assert_eq!(failure.feature_name, "Arm");
    }
}

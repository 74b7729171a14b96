//! [`Feature`] – the contract every pluggable unit of behavior implements.
//!
//! A feature declares *when* it wants to run through its
//! [`dependencies`][Feature::dependencies] and *what* it does through ten
//! lifecycle hooks, one per [`Phase`][opmode_types::Phase].  Every hook
//! defaults to a no-op so a feature only overrides the phases it cares about.
//!
//! Features are shared as [`FeatureRef`] (`Rc<dyn Feature>`).  The registry
//! only ever holds weak references, so the owner of the `Rc` decides how long
//! the feature lives.
//!
//! # Example
//!
//! ```
//! use std::cell::Cell;
//! use std::rc::Rc;
//!
//! use opmode_kernel::{Dependencies, Dependency, Feature, FeatureIdentity, FeatureRef, Session};
//!
//! struct LoopCounter {
//!     deps: Dependencies,
//!     ticks: Cell<u32>,
//! }
//!
//! impl Feature for LoopCounter {
//!     fn dependencies(&self) -> &[Dependency] {
//!         &self.deps
//!     }
//!
//!     fn post_loop(&self, _session: &Session) {
//!         self.ticks.set(self.ticks.get() + 1);
//!     }
//! }
//!
//! let counter: FeatureRef = Rc::new(LoopCounter {
//!     deps: Dependencies::of::<LoopCounter>().yields().build().unwrap(),
//!     ticks: Cell::new(0),
//! });
//! assert_eq!(counter.kind().name(), "LoopCounter");
//! ```

use std::rc::{Rc, Weak};

use opmode_types::{FeatureId, FeatureKind};

use crate::dependency::Dependency;
use crate::session::Session;

/// Shared handle to a feature.
pub type FeatureRef = Rc<dyn Feature>;

/// Exposes the concrete type of a feature through a trait object.
///
/// Implemented automatically for every [`Feature`]; never implement it by
/// hand.
pub trait FeatureIdentity {
    fn kind(&self) -> FeatureKind;
}

impl<T: Feature + 'static> FeatureIdentity for T {
    fn kind(&self) -> FeatureKind {
        FeatureKind::of::<T>()
    }
}

/// A unit of behavior that activates itself based on its declared
/// dependencies and receives lifecycle hooks while active.
pub trait Feature: FeatureIdentity {
    /// The ordered conditions that must all hold for this feature to
    /// activate.  An empty slice means the feature never activates.
    fn dependencies(&self) -> &[Dependency];

    fn pre_init(&self, _session: &Session) {}
    fn post_init(&self, _session: &Session) {}
    fn pre_init_loop(&self, _session: &Session) {}
    fn post_init_loop(&self, _session: &Session) {}
    fn pre_start(&self, _session: &Session) {}
    fn post_start(&self, _session: &Session) {}
    fn pre_loop(&self, _session: &Session) {}
    fn post_loop(&self, _session: &Session) {}
    fn pre_stop(&self, _session: &Session) {}
    fn post_stop(&self, _session: &Session) {}
}

/// Identity of a live feature.
pub fn feature_id(feature: &FeatureRef) -> FeatureId {
    FeatureId::from_ptr(Rc::as_ptr(feature))
}

/// Identity of a possibly reclaimed feature.
pub(crate) fn weak_id(feature: &Weak<dyn Feature>) -> FeatureId {
    FeatureId::from_ptr(Weak::as_ptr(feature))
}

/// Human-readable names for a list of features, in order.
pub(crate) fn feature_names<'a>(
    features: impl IntoIterator<Item = &'a FeatureRef>,
) -> Vec<String> {
    features
        .into_iter()
        .map(|f| f.kind().name().to_string())
        .collect()
}

//! `opmode-kernel` – Feature Resolution Core
//!
//! Decides which features take part in a session.  It does not run the
//! session; it evaluates declarations and keeps the books.
//!
//! # Modules
//!
//! - [`feature`] – [`Feature`][feature::Feature]: the contract every
//!   pluggable unit of behavior implements (dependency list plus ten
//!   lifecycle hooks).
//! - [`dependency`] – [`Dependency`][dependency::Dependency] and
//!   [`Condition`][dependency::Condition]: the predicate algebra features use
//!   to declare when they activate, with the
//!   [`Dependencies`][dependency::Dependencies] builder that rejects
//!   self-referencing declarations.
//! - [`resolver`] – [`Resolver`][resolver::Resolver]: the deterministic
//!   fixpoint engine that turns a pool of features into an activation order,
//!   with yield-based soft ordering and deadlock reporting.
//! - [`registry`] – [`FeatureRegistry`][registry::FeatureRegistry]: weakly
//!   held candidate, pending and active sets, fed to the resolver at every
//!   phase boundary.
//! - [`session`] – [`Session`][session::Session]: the read-only handle passed
//!   to lifecycle hooks.

pub mod dependency;
pub mod feature;
pub mod registry;
pub mod resolver;
pub mod session;

pub use dependency::{
    Condition, Dependencies, DependenciesBuilder, Dependency, DependencyOutput, ResolutionContext,
};
pub use feature::{Feature, FeatureIdentity, FeatureRef, feature_id};
pub use registry::FeatureRegistry;
pub use resolver::{Resolution, Resolver, resolve};
pub use session::Session;

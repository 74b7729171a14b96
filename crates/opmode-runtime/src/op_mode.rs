//! [`OpMode`] – a session body driven through the full phase sequence.
//!
//! An op mode supplies the program's own work for each stage of a session;
//! [`SessionDriver::run_op_mode`] wraps every call in the matching pre/post
//! phase pair so the active features see the whole lifecycle:
//!
//! | Op mode call | Surrounding phases |
//! |---|---|
//! | `init` | `pre_init` / `post_init` |
//! | `init_loop` × `init_loops` | `pre_init_loop` / `post_init_loop` |
//! | `start` | `pre_start` / `post_start` |
//! | `run_loop` × `loops` | `pre_loop` / `post_loop` |
//! | `stop` | `pre_stop` / `post_stop` |

use opmode_kernel::Session;
use opmode_types::{FeatureError, SessionMeta};
use tracing::info;

use crate::driver::SessionDriver;

/// Program-level body of a session.  Only [`OpMode::run_loop`] is required.
pub trait OpMode {
    fn init(&mut self, _session: &Session) {}
    fn init_loop(&mut self, _session: &Session) {}
    fn start(&mut self, _session: &Session) {}
    fn run_loop(&mut self, session: &Session);
    fn stop(&mut self, _session: &Session) {}
}

/// How many iterations of each loop stage a run performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunPlan {
    pub init_loops: usize,
    pub loops: usize,
}

impl Default for RunPlan {
    fn default() -> Self {
        Self {
            init_loops: 0,
            loops: 1,
        }
    }
}

impl SessionDriver {
    /// Run one complete session around `op`.
    ///
    /// # Errors
    ///
    /// Returns [`FeatureError::PhaseOrder`] if the driver is already in the
    /// middle of a session.
    pub fn run_op_mode(
        &mut self,
        op: &mut dyn OpMode,
        meta: SessionMeta,
        plan: RunPlan,
    ) -> Result<(), FeatureError> {
        let name = meta.name.clone();

        self.pre_init(meta)?;
        if let Some(session) = self.session() {
            op.init(session);
        }
        self.post_init()?;

        for _ in 0..plan.init_loops {
            self.pre_init_loop()?;
            if let Some(session) = self.session() {
                op.init_loop(session);
            }
            self.post_init_loop()?;
        }

        self.pre_start()?;
        if let Some(session) = self.session() {
            op.start(session);
        }
        self.post_start()?;

        for _ in 0..plan.loops {
            self.pre_loop()?;
            if let Some(session) = self.session() {
                op.run_loop(session);
            }
            self.post_loop()?;
        }

        self.pre_stop()?;
        if let Some(session) = self.session() {
            op.stop(session);
        }
        self.post_stop()?;

        info!(
            op_mode = %name,
            init_loops = plan.init_loops,
            loops = plan.loops,
            "op mode finished"
        );
        Ok(())
    }
}

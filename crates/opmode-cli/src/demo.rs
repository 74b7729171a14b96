//! Sample robot features used by the `opmode` binary.
//!
//! | Feature | Activates when |
//! |---|---|
//! | `Drivetrain` | `teleop` or `auto` |
//! | `GamepadDrive` | `Drivetrain` active and `teleop` |
//! | `PathFollower` | `auto`, `Drivetrain` active, no `manual` |
//! | `ManualArm` | `teleop` or `auto`, `PathFollower` not active |
//! | `AllianceLights` | exactly one of `red` / `blue` |
//! | `TelemetryLog` | after everything else settles |
//! | `FrameDump` | after `TelemetryLog` activates |

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use opmode_kernel::{
    Dependencies, Dependency, DependencyOutput, Feature, FeatureIdentity, FeatureRef, Session,
};
use opmode_runtime::OpMode;
use opmode_types::{FeatureError, FeatureKind};

/// Lines written by the sample features as they run.
pub type Journal = Rc<RefCell<Vec<String>>>;

fn note(journal: &Journal, line: String) {
    journal.borrow_mut().push(line);
}

// ─────────────────────────────────────────────────────────────────────────────
// Features
// ─────────────────────────────────────────────────────────────────────────────

pub struct Drivetrain {
    deps: Dependencies,
    journal: Journal,
    loops: Cell<u32>,
}

impl Feature for Drivetrain {
    fn dependencies(&self) -> &[Dependency] {
        &self.deps
    }

    fn pre_init(&self, _session: &Session) {
        self.loops.set(0);
    }

    fn post_loop(&self, _session: &Session) {
        self.loops.set(self.loops.get() + 1);
    }

    fn post_stop(&self, _session: &Session) {
        note(
            &self.journal,
            format!("Drivetrain: ran {} loop(s)", self.loops.get()),
        );
    }
}

pub struct GamepadDrive {
    deps: Dependencies,
    journal: Journal,
}

impl Feature for GamepadDrive {
    fn dependencies(&self) -> &[Dependency] {
        &self.deps
    }

    fn post_start(&self, _session: &Session) {
        note(&self.journal, "GamepadDrive: driver control enabled".into());
    }
}

pub struct PathFollower {
    deps: Dependencies,
    journal: Journal,
}

impl Feature for PathFollower {
    fn dependencies(&self) -> &[Dependency] {
        &self.deps
    }

    fn post_start(&self, _session: &Session) {
        note(&self.journal, "PathFollower: following trajectory".into());
    }
}

pub struct ManualArm {
    deps: Dependencies,
    journal: Journal,
}

impl Feature for ManualArm {
    fn dependencies(&self) -> &[Dependency] {
        &self.deps
    }

    fn pre_stop(&self, _session: &Session) {
        note(&self.journal, "ManualArm: arm parked".into());
    }
}

pub struct AllianceLights {
    deps: Dependencies,
    journal: Journal,
    alliance: Rc<RefCell<Option<String>>>,
}

impl Feature for AllianceLights {
    fn dependencies(&self) -> &[Dependency] {
        &self.deps
    }

    fn post_init(&self, _session: &Session) {
        let color = self.alliance.borrow().clone().unwrap_or_default();
        note(&self.journal, format!("AllianceLights: showing {color}"));
    }
}

pub struct TelemetryLog {
    deps: Dependencies,
    journal: Journal,
}

impl Feature for TelemetryLog {
    fn dependencies(&self) -> &[Dependency] {
        &self.deps
    }

    fn post_start(&self, session: &Session) {
        let active = session.registry().active_features().len();
        note(
            &self.journal,
            format!("TelemetryLog: streaming {active} active feature(s)"),
        );
    }
}

pub struct FrameDump {
    deps: Dependencies,
    journal: Journal,
}

impl Feature for FrameDump {
    fn dependencies(&self) -> &[Dependency] {
        &self.deps
    }

    fn pre_stop(&self, session: &Session) {
        note(
            &self.journal,
            format!("FrameDump: saved frames for {}", session.meta().name),
        );
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Rig
// ─────────────────────────────────────────────────────────────────────────────

/// Owns the sample features.  Dropping the rig drops every feature, which
/// removes them from any registry they were registered with.
pub struct DemoRig {
    pub features: Vec<FeatureRef>,
    pub journal: Journal,
}

impl DemoRig {
    /// Build every sample feature, in registration order.
    pub fn build() -> Result<Self, FeatureError> {
        let journal: Journal = Rc::default();
        let alliance = Rc::new(RefCell::new(None));
        let alliance_out = Rc::clone(&alliance);

        let features: Vec<FeatureRef> = vec![
            Rc::new(Drivetrain {
                deps: Dependencies::of::<Drivetrain>()
                    .includes_at_least_one_of(["teleop", "auto"])
                    .build()?,
                journal: Rc::clone(&journal),
                loops: Cell::new(0),
            }),
            Rc::new(GamepadDrive {
                deps: Dependencies::of::<GamepadDrive>()
                    .depends_on_one_of([FeatureKind::of::<Drivetrain>()])
                    .includes_at_least_one_of(["teleop"])
                    .build()?,
                journal: Rc::clone(&journal),
            }),
            Rc::new(PathFollower {
                deps: Dependencies::of::<PathFollower>()
                    .includes_at_least_one_of(["auto"])
                    .depends_on_one_of([FeatureKind::of::<Drivetrain>()])
                    .excludes_flags(["manual"])
                    .build()?,
                journal: Rc::clone(&journal),
            }),
            Rc::new(ManualArm {
                deps: Dependencies::of::<ManualArm>()
                    .includes_at_least_one_of(["teleop", "auto"])
                    .mutually_exclusive_with([FeatureKind::of::<PathFollower>()])
                    .build()?,
                journal: Rc::clone(&journal),
            }),
            Rc::new(AllianceLights {
                deps: Dependencies::of::<AllianceLights>()
                    .includes_exactly_one_of(["red", "blue"])
                    .on_output(move |out| {
                        if let DependencyOutput::Flag(flag) = out {
                            *alliance_out.borrow_mut() = Some(flag.to_string());
                        }
                    })
                    .build()?,
                journal: Rc::clone(&journal),
                alliance,
            }),
            Rc::new(TelemetryLog {
                deps: Dependencies::of::<TelemetryLog>().yields().build()?,
                journal: Rc::clone(&journal),
            }),
            Rc::new(FrameDump {
                deps: Dependencies::of::<FrameDump>()
                    .yields_to([FeatureKind::of::<TelemetryLog>()])
                    .build()?,
                journal: Rc::clone(&journal),
            }),
        ];

        Ok(Self { features, journal })
    }

    pub fn journal_lines(&self) -> Vec<String> {
        self.journal.borrow().clone()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Op mode
// ─────────────────────────────────────────────────────────────────────────────

/// Records which features were active once the session started.
#[derive(Debug, Default)]
pub struct DemoOpMode {
    pub activated: Vec<String>,
    pub loops: usize,
}

impl OpMode for DemoOpMode {
    fn start(&mut self, session: &Session) {
        self.activated = session
            .registry()
            .active_features()
            .iter()
            .map(|f| f.kind().name().to_string())
            .collect();
    }

    fn run_loop(&mut self, _session: &Session) {
        self.loops += 1;
    }
}

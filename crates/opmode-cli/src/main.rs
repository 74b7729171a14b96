//! `opmode-cli` – Feature Activation Demo
//!
//! Runs one session of the sample robot features and reports what happened:
//!
//! 1. Loads the session profile from `--profile <path>` or
//!    `~/.opmode/session.toml` (built-in defaults when absent), then applies
//!    `OPMODE_*` environment overrides.
//! 2. Registers the sample features from [`demo`].
//! 3. With `--check`, validates that every feature would activate under the
//!    profile's flags and prints each failure.  Otherwise drives a full
//!    session and prints the activation order, the features left out and
//!    the reason for each, and the features' own journal.

mod config;
mod demo;

use std::path::PathBuf;
use std::process::ExitCode;
use std::rc::Rc;

use colored::Colorize;
use tracing::warn;

use opmode_kernel::{FeatureIdentity, FeatureRegistry};
use opmode_runtime::{SessionDriver, init_tracing};
use opmode_types::FeatureError;

use config::SessionProfile;
use demo::{DemoOpMode, DemoRig};

#[derive(Debug, Default)]
struct Args {
    profile: Option<PathBuf>,
    check: bool,
    help: bool,
}

fn parse_args(args: impl IntoIterator<Item = String>) -> Result<Args, String> {
    let mut parsed = Args::default();
    let mut args = args.into_iter();
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--profile" | "-p" => {
                let path = args
                    .next()
                    .ok_or_else(|| "--profile requires a path".to_string())?;
                parsed.profile = Some(PathBuf::from(path));
            }
            "--check" => parsed.check = true,
            "--help" | "-h" => parsed.help = true,
            other => return Err(format!("unknown argument `{other}`")),
        }
    }
    Ok(parsed)
}

fn main() -> ExitCode {
    let _guard = init_tracing("opmode");

    let args = match parse_args(std::env::args().skip(1)) {
        Ok(args) => args,
        Err(e) => {
            eprintln!("{}: {}", "Error".red().bold(), e);
            print_usage();
            return ExitCode::from(2);
        }
    };
    if args.help {
        print_usage();
        return ExitCode::SUCCESS;
    }

    print_banner();

    let profile = load_profile(args.profile);
    match run(&profile, args.check) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("{}: {}", "Error".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}

fn load_profile(explicit: Option<PathBuf>) -> SessionProfile {
    let path = explicit.unwrap_or_else(config::profile_path);
    let mut profile = match config::load_from(&path) {
        Ok(Some(profile)) => {
            println!(
                "  Profile loaded from {}",
                path.display().to_string().bold()
            );
            profile
        }
        Ok(None) => {
            println!(
                "  No profile at {}; using defaults.",
                path.display().to_string().dimmed()
            );
            SessionProfile::default()
        }
        Err(e) => {
            warn!(error = %e, "profile could not be loaded");
            println!("{}: {}", "Profile error".red(), e);
            println!("  Using defaults.");
            SessionProfile::default()
        }
    };
    config::apply_env_overrides(&mut profile);
    profile
}

/// Returns `Ok(false)` when the check found features that cannot activate.
fn run(profile: &SessionProfile, check_only: bool) -> Result<bool, FeatureError> {
    let rig = DemoRig::build()?;
    let registry = FeatureRegistry::shared();
    for feature in &rig.features {
        registry.register(feature)?;
    }

    let meta = profile.meta();
    println!(
        "  Session {} with flags {}\n",
        meta.name.bold(),
        meta.flag_set().to_string().cyan()
    );

    if check_only {
        return Ok(report_check(registry.check_features(&meta.flag_set(), &rig.features)));
    }

    let mut driver = SessionDriver::new(Rc::clone(&registry));
    let mut op = DemoOpMode::default();
    driver.run_op_mode(&mut op, meta, profile.plan())?;

    println!("{}", "  Activation order".bold());
    for (i, name) in op.activated.iter().enumerate() {
        println!("    {}. {}", i + 1, name.green());
    }

    let left_out: Vec<_> = rig
        .features
        .iter()
        .filter(|f| !op.activated.iter().any(|n| n == f.kind().name()))
        .collect();
    if !left_out.is_empty() {
        println!("\n{}", "  Not activated".bold());
        for feature in left_out {
            println!("    {}", feature.kind().name().yellow());
            for failure in registry.failures_for(feature).into_iter().flatten() {
                println!("      - {}", failure.to_string().dimmed());
            }
        }
    }

    println!("\n{}", "  Journal".bold());
    for line in rig.journal_lines() {
        println!("    {line}");
    }
    println!("\n  {} {} loop(s) completed", "✓".green().bold(), op.loops);
    Ok(true)
}

fn report_check(result: Result<(), FeatureError>) -> bool {
    match result {
        Ok(()) => {
            println!("  {} every feature activates", "✓".green().bold());
            true
        }
        Err(FeatureError::Unresolved(failures)) => {
            println!("  {} some features cannot activate:", "✗".red().bold());
            for failure in &failures {
                println!("    - {failure}");
            }
            false
        }
        Err(e) => {
            println!("  {} {}", "✗".red().bold(), e);
            false
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Banner
// ─────────────────────────────────────────────────────────────────────────────

fn print_banner() {
    println!();
    println!(
        "  {} {}",
        "opmode".bold().cyan(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
    println!("  Declarative feature activation");
    println!();
}

fn print_usage() {
    println!("Usage: opmode [--profile <path>] [--check]");
    println!();
    println!("  -p, --profile <path>  session profile (default ~/.opmode/session.toml)");
    println!("      --check           only verify that every feature can activate");
    println!("  -h, --help            print this message");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Result<Args, String> {
        parse_args(list.iter().map(|s| s.to_string()))
    }

    #[test]
    fn parses_profile_and_check() {
        let parsed = args(&["--profile", "/tmp/auto.toml", "--check"]).unwrap();
        assert_eq!(parsed.profile, Some(PathBuf::from("/tmp/auto.toml")));
        assert!(parsed.check);
        assert!(!parsed.help);
    }

    #[test]
    fn profile_without_path_is_an_error() {
        assert!(args(&["--profile"]).is_err());
    }

    #[test]
    fn unknown_argument_is_rejected() {
        let err = args(&["--fast"]).unwrap_err();
        assert!(err.contains("--fast"));
    }

    #[test]
    fn run_succeeds_with_default_profile() {
        assert!(run(&SessionProfile::default(), false).unwrap());
    }

    #[test]
    fn check_fails_without_any_alliance() {
        let profile = SessionProfile {
            flags: vec!["teleop".into()],
            ..SessionProfile::default()
        };
        assert!(!run(&profile, true).unwrap());
    }
}

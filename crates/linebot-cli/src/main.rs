//! `linebot-cli` – command line front end for the line-following robot.
//!
//! This binary:
//!
//! 1. Checks for `~/.linebot/config.toml`; runs a **First-Run Wizard** when
//!    the file is absent.
//! 2. Builds simulated hardware from the `[demo]` section and hands it to a
//!    [`Supervisor`].
//! 3. Drops the user into an **interactive REPL** with slash-commands
//!    (`/start`, `/stop`, `/status`, `/threshold`, `/settings`, `/help`).
//! 4. Intercepts **Ctrl-C** to stop the running behaviour, which leaves the
//!    motors off and the servos centred, before exiting.

mod config;
mod demo;
mod repl;

use colored::Colorize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{info, warn};

use linebot_runtime::Supervisor;

fn main() {
    // RUST_LOG filters, LINEBOT_LOG_FORMAT=json switches to JSON lines and
    // OTEL_EXPORTER_OTLP_ENDPOINT enables span export.  User-facing output
    // still uses println! for UX consistency.
    let _telemetry = linebot_runtime::init_tracing("linebot");

    print_banner();

    // ── Configuration ─────────────────────────────────────────────────────
    let cfg = match config::load() {
        Ok(None) => run_first_run_wizard(),
        Ok(Some(cfg)) => {
            println!(
                "  Config loaded from {}",
                config::config_path().display().to_string().bold()
            );
            cfg
        }
        Err(e) => {
            println!("{}: {}", "Config error".red(), e);
            println!("  Using default configuration.");
            config::Config::default()
        }
    };

    // ── Hardware + supervisor ─────────────────────────────────────────────
    let (hardware, _handles) = match demo::build(&cfg.robot, &cfg.demo) {
        Ok(built) => built,
        Err(e) => {
            eprintln!("{}: {}", "Cannot build simulated hardware".red(), e);
            std::process::exit(1);
        }
    };
    let supervisor = match Supervisor::new(cfg.robot.clone(), hardware) {
        Ok(sup) => Arc::new(Mutex::new(sup)),
        Err(e) => {
            eprintln!("{}: {}", "Cannot start supervisor".red(), e);
            std::process::exit(1);
        }
    };
    info!(
        threshold_mm = cfg.robot.obstacle.threshold_mm,
        escalation = %cfg.robot.tracking.escalation,
        "supervisor ready on simulated hardware"
    );
    println!("  Running on {} hardware.", "simulated".yellow());

    // ── Shared shutdown flag ──────────────────────────────────────────────
    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_clone = shutdown.clone();

    // ── Ctrl-C handler ────────────────────────────────────────────────────
    let sup_ctrlc = supervisor.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        println!();
        println!("{}", "⚠  Ctrl-C received – stopping the robot …".yellow().bold());

        let stopped = sup_ctrlc.lock().unwrap_or_else(|e| e.into_inner()).stop();
        if stopped {
            println!("{}", "  ✓ Motors off, servos centred.".green());
        } else {
            println!("{}", "  ✗ Behaviour did not return the hardware in time.".red());
        }
        println!("{}", "  Press Enter to exit.".dimmed());

        shutdown_clone.store(true, Ordering::SeqCst);
    }) {
        warn!(error = %e, "Failed to install Ctrl-C handler; the robot will only stop via /stop or /quit");
    }

    println!();
    println!("  Type {} for a list of commands.\n", "/help".bold().cyan());

    // ── Interactive REPL ──────────────────────────────────────────────────
    repl::run(supervisor.clone(), shutdown);

    supervisor.lock().unwrap_or_else(|e| e.into_inner()).stop();
}

// ─────────────────────────────────────────────────────────────────────────────
// First-Run Wizard
// ─────────────────────────────────────────────────────────────────────────────

fn run_first_run_wizard() -> config::Config {
    println!();
    println!("{}", "  ╔══════════════════════════════════════╗".bold().cyan());
    println!("{}", "  ║       linebot First-Run Wizard       ║".bold().cyan());
    println!("{}", "  ╚══════════════════════════════════════╝".bold().cyan());
    println!();
    println!("  No configuration found.  Press Enter to keep a default.\n");

    let mut cfg = config::Config::default();
    repl::prompt_robot_settings(&mut cfg);

    match config::save(&cfg) {
        Ok(()) => println!(
            "\n  {} Config saved to {}\n",
            "✓".green().bold(),
            config::config_path().display().to_string().bold()
        ),
        Err(e) => println!("{}: {}", "Error saving config".red(), e),
    }
    cfg
}

// ─────────────────────────────────────────────────────────────────────────────
// Banner
// ─────────────────────────────────────────────────────────────────────────────

fn print_banner() {
    println!();
    println!("{}", r#"    __    _            __          __ "#.bold().cyan());
    println!("{}", r#"   / /   (_)___  ___  / /_  ____  / /_"#.bold().cyan());
    println!("{}", r#"  / /   / / __ \/ _ \/ __ \/ __ \/ __/"#.bold().cyan());
    println!("{}", r#" / /___/ / / / /  __/ /_/ / /_/ / /_  "#.bold().cyan());
    println!("{}", r#"/_____/_/_/ /_/\___/_.___/\____/\__/  "#.bold().cyan());
    println!();
    println!(
        "  {} {}",
        "linebot".bold(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
    println!("  Line-following robot control core");
    println!();
}

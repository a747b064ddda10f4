//! REPL – Read-Eval-Print Loop for the linebot interactive shell.
//!
//! Supported slash-commands:
//!   /help                         – show this list
//!   /start [tracking|obstacle|arrows] – start a behaviour (default: tracking)
//!   /stop                         – stop the running behaviour
//!   /status                       – print the status snapshot
//!   /threshold <mm>               – change the obstacle threshold live
//!   /settings                     – interactively edit `~/.linebot/config.toml`
//!   /quit | /exit                 – stop the robot and exit the CLI

use colored::Colorize;
use std::io::{self, BufRead, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use linebot_runtime::{EscalationPolicy, Supervisor};
use linebot_types::{BehaviorKind, Distance, RobotStatus};

use crate::config::{self, Config};

/// A parsed slash-command.
#[derive(Debug, Clone, PartialEq)]
pub enum ReplCommand {
    Help,
    Start(BehaviorKind),
    Stop,
    Status,
    Threshold(f32),
    Settings,
    Quit,
}

/// Parse one input line.
pub fn parse(line: &str) -> Result<ReplCommand, String> {
    let mut words = line.split_whitespace();
    let head = words.next().unwrap_or_default();
    let arg = words.next();
    if words.next().is_some() {
        return Err(format!("Too many arguments for {head}"));
    }

    match (head, arg) {
        ("/help", None) => Ok(ReplCommand::Help),
        ("/start", None) => Ok(ReplCommand::Start(BehaviorKind::LineTracking)),
        ("/start", Some(which)) => parse_behavior(which).map(ReplCommand::Start),
        ("/stop", None) => Ok(ReplCommand::Stop),
        ("/status", None) => Ok(ReplCommand::Status),
        ("/threshold", Some(mm)) => mm
            .parse::<f32>()
            .map(ReplCommand::Threshold)
            .map_err(|_| format!("'{mm}' is not a distance in millimetres")),
        ("/threshold", None) => Err("Usage: /threshold <mm>".to_string()),
        ("/settings", None) => Ok(ReplCommand::Settings),
        ("/quit" | "/exit", None) => Ok(ReplCommand::Quit),
        ("/help" | "/stop" | "/status" | "/settings" | "/quit" | "/exit", Some(_)) => {
            Err(format!("{head} takes no arguments"))
        }
        (other, _) => Err(format!("Unknown command '{other}'")),
    }
}

fn parse_behavior(s: &str) -> Result<BehaviorKind, String> {
    match s.to_ascii_lowercase().as_str() {
        "tracking" | "line" | "line-tracking" => Ok(BehaviorKind::LineTracking),
        "obstacle" | "obstacles" | "obstacle-avoidance" => Ok(BehaviorKind::ObstacleAvoidance),
        "arrows" | "arrow" | "maze" | "arrow-navigation" => Ok(BehaviorKind::ArrowNavigation),
        other => Err(format!(
            "Unknown behaviour '{other}' (expected tracking, obstacle or arrows)"
        )),
    }
}

/// Entry point for the interactive REPL.
///
/// `shutdown` is polled each iteration; when set the REPL exits cleanly.
pub fn run(supervisor: Arc<Mutex<Supervisor>>, shutdown: Arc<AtomicBool>) {
    let stdin = io::stdin();
    let mut stdout = io::stdout();

    loop {
        if shutdown.load(Ordering::SeqCst) {
            break;
        }

        print!("{} ", "linebot>".bold().cyan());
        stdout.flush().ok();

        let mut line = String::new();
        match stdin.lock().read_line(&mut line) {
            Ok(0) => break, // EOF
            Ok(_) => {}
            Err(e) => {
                eprintln!("{}: {}", "Read error".red(), e);
                break;
            }
        }

        let input = line.trim();
        if input.is_empty() {
            continue;
        }

        let command = match parse(input) {
            Ok(command) => command,
            Err(e) => {
                println!("{} Type {} for available commands.", e.red(), "/help".bold());
                continue;
            }
        };

        let mut sup = supervisor.lock().unwrap_or_else(|e| e.into_inner());
        match command {
            ReplCommand::Help => cmd_help(),
            ReplCommand::Start(kind) => cmd_start(&mut sup, kind),
            ReplCommand::Stop => cmd_stop(&mut sup),
            ReplCommand::Status => print_status(&sup.status()),
            ReplCommand::Threshold(mm) => cmd_threshold(&sup, mm),
            ReplCommand::Settings => cmd_settings(),
            ReplCommand::Quit => {
                sup.stop();
                println!("{}", "Goodbye.".green());
                shutdown.store(true, Ordering::SeqCst);
                break;
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Command handlers
// ─────────────────────────────────────────────────────────────────────────────

fn cmd_help() {
    println!();
    println!("{}", "linebot Commands".bold().underline());
    println!("  {}  – start a behaviour (default: tracking)", "/start [tracking|obstacle|arrows]".bold().cyan());
    println!("  {}                              – stop the running behaviour", "/stop".bold().cyan());
    println!("  {}                            – print the status snapshot", "/status".bold().cyan());
    println!("  {}                    – change the obstacle threshold", "/threshold <mm>".bold().cyan());
    println!("  {}                          – edit ~/.linebot/config.toml", "/settings".bold().cyan());
    println!("  {}                       – stop the robot and exit", "/quit  /exit".bold().cyan());
    println!();
}

fn cmd_start(sup: &mut Supervisor, kind: BehaviorKind) {
    match sup.start_behavior(kind) {
        Ok(()) => println!("{} {}", "✓ Started".green(), kind.to_string().bold()),
        Err(e) => println!("{}: {}", "Cannot start".red(), e),
    }
}

fn cmd_stop(sup: &mut Supervisor) {
    let was = sup.behavior();
    if !sup.is_running() && was == BehaviorKind::Idle {
        println!("{}", "Nothing is running.".dimmed());
        return;
    }
    if sup.stop() {
        println!("{} {}", "✓ Stopped".green(), was.to_string().bold());
    } else {
        println!(
            "{} {} did not hand the hardware back in time; restart the CLI.",
            "Warning:".yellow(),
            was.to_string().bold()
        );
    }
}

fn cmd_threshold(sup: &Supervisor, mm: f32) {
    match sup.set_obstacle_threshold(Distance::from_mm(mm)) {
        Ok(()) => println!("{} {} mm", "✓ Obstacle threshold set to".green(), mm.to_string().bold()),
        Err(e) => println!("{}: {}", "Rejected".red(), e),
    }
}

fn cmd_settings() {
    let mut cfg = load_config_or_default();

    println!("{}", "Settings Editor".bold().underline());
    println!("  (changes apply the next time linebot starts)");
    prompt_robot_settings(&mut cfg);

    match config::save(&cfg) {
        Ok(()) => println!(
            "{} {}",
            "✓ Settings saved to".green(),
            config::config_path().display().to_string().bold()
        ),
        Err(e) => println!("{}: {}", "Error saving config".red(), e),
    }
}

/// Prompt for the handful of settings worth changing interactively.  Also
/// used by the first-run wizard.
pub fn prompt_robot_settings(cfg: &mut Config) {
    let robot = &mut cfg.robot;

    let threshold = robot.obstacle.threshold_mm;
    let raw = prompt_str(&format!("  Obstacle threshold mm [{threshold}]: "), &threshold.to_string());
    match raw.parse::<f32>() {
        Ok(mm) if mm.is_finite() && mm > 0.0 => robot.obstacle.threshold_mm = mm,
        _ => warn_keep(&raw, &threshold.to_string()),
    }

    let ceiling = robot.tracking.lost_ceiling;
    let raw = prompt_str(&format!("  Lost-cycle ceiling    [{ceiling}]: "), &ceiling.to_string());
    match raw.parse::<u32>() {
        Ok(n) => robot.tracking.lost_ceiling = n,
        Err(_) => warn_keep(&raw, &ceiling.to_string()),
    }

    let escalation = robot.tracking.escalation;
    let raw = prompt_str(
        &format!("  After recovery fails (resume / extreme) [{escalation}]: "),
        &escalation.to_string(),
    );
    match raw.parse::<EscalationPolicy>() {
        Ok(policy) => robot.tracking.escalation = policy,
        Err(_) => warn_keep(&raw, &escalation.to_string()),
    }
}

fn print_status(status: &RobotStatus) {
    let running = if status.running {
        "running".green().bold()
    } else {
        "stopped".dimmed()
    };
    let threshold = status
        .obstacle_threshold
        .millimetres()
        .map(|mm| format!("{mm} mm"))
        .unwrap_or_else(|| "none".to_string());

    println!("{}", "Robot Status".bold().underline());
    println!("  Behaviour        : {} ({})", status.behavior.to_string().yellow(), running);
    println!("  Sensors (L M R)  : {}", pattern_bits(status).bold());
    println!("  Steering angle   : {:.0}°", status.last_steering_angle);
    println!("  Lost streak      : {}", status.lost_streak);
    println!("  Recovering       : {}", status.recovery_in_progress);
    println!("  Obstacle limit   : {}", threshold);
    let s = &status.stats;
    println!(
        "  Recoveries       : {} attempted, {} succeeded, {} failed, {} extreme",
        s.recoveries_attempted, s.recoveries_succeeded, s.recoveries_failed, s.extreme_attempted
    );
    println!("  Line detections  : {}", s.ir_detections);
    println!("  Obstacles avoided: {}", s.obstacles_avoided);
    let n = &status.navigation;
    println!(
        "  Arrows           : {} read ({} left, {} right), {} walls, {} reversals",
        n.arrows_detected, n.left_turns, n.right_turns, n.obstacles_reached, n.reversals
    );
    if !status.hardware_available {
        println!("  {} hardware was not returned by the last behaviour", "Warning:".yellow());
    }
    println!("  Updated          : {}", status.updated_at.to_rfc3339().dimmed());
}

fn pattern_bits(status: &RobotStatus) -> String {
    let p = status.current_sensors;
    [p.left, p.middle, p.right]
        .iter()
        .map(|&on| if on { '1' } else { '0' })
        .collect()
}

// ─────────────────────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────────────────────

fn load_config_or_default() -> Config {
    match config::load() {
        Ok(Some(c)) => c,
        Ok(None) => Config::default(),
        Err(e) => {
            println!("{}: {} – using defaults", "Config error".red(), e);
            Config::default()
        }
    }
}

fn warn_keep(raw: &str, kept: &str) {
    println!("  {} '{}' is not valid, keeping {}", "Warning:".yellow(), raw, kept);
}

/// Prompt for a string value.  Returns `default` when the user presses Enter.
pub fn prompt_str(msg: &str, default: &str) -> String {
    print!("{}", msg);
    io::stdout().flush().ok();

    let mut line = String::new();
    match io::stdin().lock().read_line(&mut line) {
        Ok(_) => {
            let trimmed = line.trim().to_string();
            if trimmed.is_empty() {
                default.to_string()
            } else {
                trimmed
            }
        }
        Err(_) => default.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_start_defaults_to_tracking() {
        assert_eq!(parse("/start"), Ok(ReplCommand::Start(BehaviorKind::LineTracking)));
        assert_eq!(
            parse("/start obstacle"),
            Ok(ReplCommand::Start(BehaviorKind::ObstacleAvoidance))
        );
        assert_eq!(
            parse("  /start   ARROWS "),
            Ok(ReplCommand::Start(BehaviorKind::ArrowNavigation))
        );
        assert!(parse("/start dance").is_err());
    }

    #[test]
    fn parse_threshold_needs_a_number() {
        assert_eq!(parse("/threshold 250"), Ok(ReplCommand::Threshold(250.0)));
        assert!(parse("/threshold").is_err());
        assert!(parse("/threshold near").is_err());
    }

    #[test]
    fn parse_simple_commands() {
        assert_eq!(parse("/help"), Ok(ReplCommand::Help));
        assert_eq!(parse("/stop"), Ok(ReplCommand::Stop));
        assert_eq!(parse("/status"), Ok(ReplCommand::Status));
        assert_eq!(parse("/settings"), Ok(ReplCommand::Settings));
        assert_eq!(parse("/quit"), Ok(ReplCommand::Quit));
        assert_eq!(parse("/exit"), Ok(ReplCommand::Quit));
    }

    #[test]
    fn parse_rejects_unknown_and_extra_arguments() {
        assert!(parse("/fly").is_err());
        assert!(parse("/stop now").is_err());
        assert!(parse("/start tracking fast").is_err());
    }

    #[test]
    fn pattern_bits_reads_left_to_right() {
        let status = RobotStatus {
            current_sensors: linebot_types::SensorPattern::new(true, false, false),
            ..RobotStatus::default()
        };
        assert_eq!(pattern_bits(&status), "100");
    }
}

use std::fs;

use anyhow::{Context, Result};
use cleanup_engine::scripted::ScriptedHost;
use cleanup_engine::{CleanupConfig, CleanupSession, ReferenceCollaborators, RunReport};
use cleanup_formats::{SceneFile, TrialScript};

mod cli;

fn main() -> Result<()> {
    let args = cli::parse()?;
    env_logger::init();

    let mut config =
        CleanupConfig::from_json_file(args.config.as_deref()).context("loading session config")?;
    if let Some(mode) = args.execution_mode {
        config.execution_mode = mode;
    }
    if let Some(dir) = &args.snapshot_dir {
        config.snapshot_dir = dir.clone();
    }
    if let Some(trials) = args.trials {
        config.max_number_of_trials = trials;
    }

    let scene = SceneFile::from_json_file(&args.scene)?;
    let script = match &args.script {
        Some(path) => TrialScript::from_json_file(path)?,
        None => TrialScript::default(),
    };

    let mut session = CleanupSession::new(
        config,
        scene,
        Box::new(ReferenceCollaborators::default()),
    )?;
    session.initialize()?;

    let mut host = ScriptedHost::new(script);
    let mut frames = 0u64;
    while !session.is_finished() && frames < args.max_frames {
        host.step(&mut session);
        session.tick(args.frame_dt)?;
        for message in session.take_outgoing() {
            log::info!("moderator -> robot: {message}");
        }
        frames += 1;
    }
    if !session.is_finished() {
        log::warn!("Stopped after {frames} frames with trials remaining");
    }

    let report = session.teardown();
    print_summary(&report);

    if let Some(path) = args.report_json {
        if let Some(parent) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating report directory {}", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(&report).context("serializing run report")?;
        fs::write(&path, json).with_context(|| format!("writing {}", path.display()))?;
        println!("Run report written to {}", path.display());
    }

    Ok(())
}

fn print_summary(report: &RunReport) {
    println!("Interactive Cleanup ({})", report.execution_mode);
    for trial in &report.trials {
        println!(
            "  trial {:02} [{}] target={} destination={} deployment={:?} score={}{}",
            trial.trial,
            trial.environment,
            trial.grasping_target.as_deref().unwrap_or("-"),
            trial.destination.as_deref().unwrap_or("-"),
            trial.deployment,
            trial.score,
            if trial.timed_out { " (time up)" } else { "" }
        );
        if let Some(snapshot) = &trial.snapshot {
            if let Some(error) = &snapshot.error {
                println!("    snapshot {} failed: {error}", snapshot.path.display());
            }
        }
    }
    println!("Total score: {}", report.total_score);
}

use crate::core::models::ActiveSessions;
use crate::core::sessions::SessionRegistry;
use crate::core::settings::Settings;
use anyhow::Result;
use chrono::Utc;

pub fn run(settings: &Settings, json: bool) -> Result<()> {
    let registry = SessionRegistry::in_dir(&settings.sessions_dir);
    tracing::info!(path = ?registry.path(), "Reading session registry");

    let sessions = registry.active_sessions(Utc::now(), settings.sessions.max_concurrent);

    if json {
        println!("{}", serde_json::to_string_pretty(&sessions)?);
    } else {
        print_text_output(&sessions);
    }

    Ok(())
}

fn format_idle(seconds: i64) -> String {
    if seconds <= 0 {
        return "now".to_string();
    }

    let total_minutes = seconds / 60;
    let days = total_minutes / (24 * 60);
    let hours = (total_minutes % (24 * 60)) / 60;
    let minutes = total_minutes % 60;

    if days > 0 {
        format!("{}d {}h ago", days, hours)
    } else if hours > 0 {
        format!("{}h {:02}m ago", hours, minutes)
    } else if minutes > 0 {
        format!("{}m ago", minutes)
    } else {
        format!("{}s ago", seconds)
    }
}

fn print_text_output(sessions: &ActiveSessions) {
    println!(
        "{} of {} sessions active ({:.0}%)",
        sessions.count, sessions.max_concurrent, sessions.percentage_utilized
    );

    for session in &sessions.sessions {
        println!("  {:<40} last active {}", session.id, format_idle(session.duration));
    }
}

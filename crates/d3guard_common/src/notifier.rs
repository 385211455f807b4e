//! Desktop notifications for logged-in users
//!
//! Best effort only. The drift monitor runs as root from a timer or a
//! package hook, so it finds graphical sessions through `loginctl` and runs
//! `notify-send` as each session's user against that user's session bus.
//! Nothing here may fail a repair run.

use crate::command::CommandRunner;
use crate::error::D3Error;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Notification urgency level
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Urgency {
    Low,
    Normal,
    Critical,
}

impl Urgency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Urgency::Low => "low",
            Urgency::Normal => "normal",
            Urgency::Critical => "critical",
        }
    }
}

pub trait Notifier: Send + Sync {
    /// Returns how many sessions were notified
    fn notify(&self, title: &str, body: &str, urgency: Urgency) -> Result<usize, D3Error>;
}

/// Active graphical login session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserSession {
    pub id: String,
    pub uid: u32,
    pub user: String,
}

pub struct DesktopNotifier {
    runner: Arc<dyn CommandRunner>,
}

impl DesktopNotifier {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self { runner }
    }

    /// Graphical sessions from `loginctl list-sessions`
    pub fn active_sessions(&self) -> Result<Vec<UserSession>, D3Error> {
        let output = self
            .runner
            .run_checked("loginctl", &["list-sessions", "--no-legend"])?;

        let mut sessions = Vec::new();
        for line in output.stdout.lines() {
            let parts: Vec<&str> = line.split_whitespace().collect();
            if parts.len() < 3 {
                continue;
            }
            let Ok(uid) = parts[1].parse::<u32>() else {
                continue;
            };
            if self.is_graphical(parts[0]) {
                sessions.push(UserSession {
                    id: parts[0].to_string(),
                    uid,
                    user: parts[2].to_string(),
                });
            }
        }
        Ok(sessions)
    }

    fn is_graphical(&self, session: &str) -> bool {
        let output = match self.runner.run_checked(
            "loginctl",
            &["show-session", session, "-p", "Type", "-p", "Active", "--value"],
        ) {
            Ok(output) => output,
            Err(e) => {
                debug!("loginctl show-session {}: {}", session, e);
                return false;
            }
        };
        let mut values = output.stdout.lines().map(str::trim);
        let kind = values.next().unwrap_or("");
        let active = values.next().unwrap_or("");
        matches!(kind, "x11" | "wayland") && active == "yes"
    }
}

impl Notifier for DesktopNotifier {
    fn notify(&self, title: &str, body: &str, urgency: Urgency) -> Result<usize, D3Error> {
        let mut sent = 0;
        for session in self.active_sessions()? {
            let bus = format!("DBUS_SESSION_BUS_ADDRESS=unix:path=/run/user/{}/bus", session.uid);
            let result = self.runner.run_checked(
                "runuser",
                &[
                    "-u",
                    &session.user,
                    "--",
                    "env",
                    &bus,
                    "notify-send",
                    "--urgency",
                    urgency.as_str(),
                    "--icon",
                    "dialog-warning",
                    "--app-name",
                    "d3guard",
                    title,
                    body,
                ],
            );
            match result {
                Ok(_) => {
                    info!("notification sent to {} (session {})", session.user, session.id);
                    sent += 1;
                }
                Err(e) => warn!("failed to notify {}: {}", session.user, e),
            }
        }
        Ok(sent)
    }
}

//! Notification dispatch.
//!
//! The notifier is the outbound edge of the pipeline: it receives one
//! `Notification` per warning and is expected to show it somewhere. Dispatch
//! is best-effort; a notifier that cannot display a message logs and moves on.

use std::future::Future;
use std::sync::{Arc, Mutex};

use crate::alert::thresholds::Notification;
use crate::cities::CityId;
use crate::logging::{self, LogSource};

/// Displays warnings to the user.
pub trait Notifier: Send + Sync {
    fn notify(&self, city: CityId, notification: &Notification) -> impl Future<Output = ()> + Send;
}

/// Writes notifications to the service log.
#[derive(Debug, Clone, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    async fn notify(&self, city: CityId, notification: &Notification) {
        logging::warn(
            LogSource::Notifier,
            Some(city),
            &format!("{}: {}", notification.title, notification.message),
        );
    }
}

/// Fires a desktop notification via `notify-send`, then logs it.
/// Silently degrades to logging if `notify-send` is not installed.
#[derive(Debug, Clone, Default)]
pub struct DesktopNotifier;

impl Notifier for DesktopNotifier {
    async fn notify(&self, city: CityId, notification: &Notification) {
        let spawned = tokio::process::Command::new("notify-send")
            .args([
                "--urgency",
                "critical",
                "--app-name",
                "aqmon",
                notification.title.as_str(),
                notification.message.as_str(),
            ])
            .status()
            .await;

        if let Err(e) = spawned {
            logging::debug(
                LogSource::Notifier,
                Some(city),
                &format!("notify-send unavailable: {}", e),
            );
        }
        LogNotifier.notify(city, notification).await;
    }
}

/// Either of the built-in notifiers, chosen from configuration.
#[derive(Debug, Clone)]
pub enum AnyNotifier {
    Log(LogNotifier),
    Desktop(DesktopNotifier),
}

impl AnyNotifier {
    pub fn from_config(desktop: bool) -> Self {
        if desktop {
            AnyNotifier::Desktop(DesktopNotifier)
        } else {
            AnyNotifier::Log(LogNotifier)
        }
    }
}

impl Notifier for AnyNotifier {
    async fn notify(&self, city: CityId, notification: &Notification) {
        match self {
            AnyNotifier::Log(n) => n.notify(city, notification).await,
            AnyNotifier::Desktop(n) => n.notify(city, notification).await,
        }
    }
}

/// Keeps every notification in memory. Used by tests and the `verify` surface.
#[derive(Debug, Clone, Default)]
pub struct RecordingNotifier {
    sent: Arc<Mutex<Vec<(CityId, Notification)>>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<(CityId, Notification)> {
        self.sent.lock().map(|v| v.clone()).unwrap_or_default()
    }
}

impl Notifier for RecordingNotifier {
    async fn notify(&self, city: CityId, notification: &Notification) {
        if let Ok(mut sent) = self.sent.lock() {
            sent.push((city, notification.clone()));
        }
    }
}

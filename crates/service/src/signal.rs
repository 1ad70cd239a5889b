//! OS signals that force a full resync.

use std::sync::Arc;

use tokio::task::JoinHandle;
#[cfg(unix)]
use tracing::info;
use tracing::warn;

use crate::AuthzSyncService;

/// Subscribes `service` to each named signal (`SIGUSR2`, `USR2`, ...).
///
/// Signals that are unknown or cannot be registered are logged and skipped.
/// Returns one task per registered signal.
pub fn spawn_signal_listener(
    service: &Arc<AuthzSyncService>,
    signals: &[String],
) -> Vec<JoinHandle<()>> {
    signals
        .iter()
        .filter_map(|name| listen(service, name))
        .collect()
}

#[cfg(unix)]
fn listen(service: &Arc<AuthzSyncService>, name: &str) -> Option<JoinHandle<()>> {
    use tokio::signal::unix::signal;

    let Some(kind) = unix::kind(name) else {
        warn!(signal = name, "unknown signal, resync will not be triggered by it");
        return None;
    };

    let mut stream = match signal(kind) {
        Ok(stream) => stream,
        Err(err) => {
            warn!(signal = name, %err, "failed to register signal handler");
            return None;
        }
    };

    info!(signal = name, "listening for resync signal");

    let service = Arc::clone(service);
    let name = name.to_owned();

    Some(tokio::spawn(async move {
        while stream.recv().await.is_some() {
            let _ = service.on_signal(&name);
        }
    }))
}

#[cfg(not(unix))]
fn listen(_service: &Arc<AuthzSyncService>, name: &str) -> Option<JoinHandle<()>> {
    warn!(signal = name, "resync signals are only supported on unix");
    None
}

#[cfg(unix)]
mod unix {
    use tokio::signal::unix::SignalKind;

    pub(super) fn kind(name: &str) -> Option<SignalKind> {
        let name = name.trim().to_ascii_uppercase();
        let name = name.strip_prefix("SIG").unwrap_or(&name);

        let kind = match name {
            "HUP" => SignalKind::hangup(),
            "USR1" => SignalKind::user_defined1(),
            "USR2" => SignalKind::user_defined2(),
            "ALRM" => SignalKind::alarm(),
            "WINCH" => SignalKind::window_change(),
            _ => return None,
        };

        Some(kind)
    }

}

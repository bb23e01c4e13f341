use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use plugin_runner::CancellationToken;
use tracing::warn;

/// Exit status used when a second signal arrives before the run has wound down.
const FORCED_EXIT_CODE: i32 = 130;

/// Time the runner gets to kill the plugin before a forced exit. `process::exit`
/// skips destructors, so `kill_on_drop` cannot be relied on past this point.
const FORCED_EXIT_GRACE: Duration = Duration::from_millis(250);

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
enum SignalAction {
    Cancel,
    ForceExit,
}

/// Cancels `token` on the first termination signal (SIGINT, SIGTERM, SIGHUP,
/// SIGQUIT); the plugin is killed by the runner in response. A second signal
/// exits shortly after, once the kill has had a chance to go out.
pub fn install(token: CancellationToken) {
    let received = Arc::new(AtomicUsize::new(0));

    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let kinds = [
            (SignalKind::interrupt(), "SIGINT"),
            (SignalKind::terminate(), "SIGTERM"),
            (SignalKind::hangup(), "SIGHUP"),
            (SignalKind::quit(), "SIGQUIT"),
        ];
        for (kind, name) in kinds {
            let mut stream = match signal(kind) {
                Ok(stream) => stream,
                Err(err) => {
                    warn!(signal = name, error = %err, "failed to install signal handler");
                    continue;
                }
            };
            let token = token.clone();
            let received = Arc::clone(&received);
            tokio::spawn(async move {
                while stream.recv().await.is_some() {
                    handle(name, &token, &received).await;
                }
            });
        }
    }

    #[cfg(not(unix))]
    {
        tokio::spawn(async move {
            while tokio::signal::ctrl_c().await.is_ok() {
                handle("ctrl-c", &token, &received).await;
            }
        });
    }
}

async fn handle(name: &str, token: &CancellationToken, received: &AtomicUsize) {
    if on_signal(name, token, received) == SignalAction::ForceExit {
        tokio::time::sleep(FORCED_EXIT_GRACE).await;
        std::process::exit(FORCED_EXIT_CODE);
    }
}

fn on_signal(name: &str, token: &CancellationToken, received: &AtomicUsize) -> SignalAction {
    // Every signal cancels; a repeat only adds the forced exit.
    token.cancel();
    if received.fetch_add(1, Ordering::AcqRel) >= 1 {
        warn!(signal = name, "second signal received; exiting");
        SignalAction::ForceExit
    } else {
        warn!(signal = name, "Aborting");
        SignalAction::Cancel
    }
}

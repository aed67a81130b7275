use console::Term;
use gha_exporter::ShutdownTrigger;

/// Wait for Ctrl+C, or SIGTERM on unix.
async fn termination_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    result = tokio::signal::ctrl_c() => {
                        if let Err(e) = result {
                            tracing::error!("Failed to listen for Ctrl+C: {}", e);
                            std::future::pending::<()>().await;
                        }
                    }
                    _ = sigterm.recv() => {}
                }
                return;
            }
            Err(e) => tracing::warn!("Failed to install SIGTERM handler: {}", e),
        }
    }

    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for Ctrl+C: {}", e);
        std::future::pending::<()>().await;
    }
}

/// Set up the signal handler for graceful shutdown.
///
/// The first signal trips `trigger`; collectors stop at their next wait and
/// the metrics server drains. A second Ctrl+C force-quits with status 130.
pub(crate) fn setup_shutdown_handler(trigger: ShutdownTrigger) {
    tokio::spawn(async move {
        termination_signal().await;

        let is_tty = Term::stdout().is_term();
        if is_tty {
            eprintln!("\n\nShutdown requested, finishing current operations...");
            eprintln!("Press Ctrl+C again to force quit.");
        } else {
            tracing::warn!("Shutdown requested, finishing current operations");
        }

        trigger.trigger();

        if tokio::signal::ctrl_c().await.is_err() {
            return;
        }

        if is_tty {
            eprintln!("Force quit!");
        }
        std::process::exit(130);
    });
}

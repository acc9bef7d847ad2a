use circuitwatch_core::display::StatusFrame;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Print every new status frame to stdout until cancelled or the monitor
/// drops its display.
pub async fn print_frames(mut rx: watch::Receiver<StatusFrame>, token: CancellationToken) {
    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            changed = rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let frame = rx.borrow_and_update().clone();
                println!("{}", render(&frame));
            }
        }
    }
}

/// Stdout printing is on unless the variable is set to a false value.
pub fn stdout_enabled(value: Option<&str>) -> bool {
    !matches!(value.map(str::trim), Some("0" | "false" | "no" | "off"))
}

pub async fn join(printer: Option<JoinHandle<()>>) {
    if let Some(printer) = printer {
        if let Err(e) = printer.await {
            tracing::warn!(error = %e, "status printer task failed");
        }
    }
}

fn render(frame: &StatusFrame) -> String {
    if frame.metrics.is_some() {
        frame.to_string()
    } else {
        format!("[{}] {}", frame.phase, frame)
    }
}

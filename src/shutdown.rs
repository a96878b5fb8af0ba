//! Cancellation helpers over a `watch::Receiver<bool>` shutdown signal.

use std::time::Duration;
use tokio::sync::watch;

/// Resolve once the signal flips to `true` or the sender is dropped.
pub async fn cancelled(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stop| *stop).await;
}

pub fn is_cancelled(shutdown: &watch::Receiver<bool>) -> bool {
    *shutdown.borrow()
}

/// Sleep for `duration` unless cancelled first. Returns true if cancelled.
pub async fn sleep_or_cancel(duration: Duration, shutdown: &mut watch::Receiver<bool>) -> bool {
    tokio::select! {
        _ = cancelled(shutdown) => true,
        _ = tokio::time::sleep(duration) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_sleep_or_cancel() {
        let (tx, mut rx) = watch::channel(false);
        assert!(!sleep_or_cancel(Duration::from_millis(5), &mut rx).await);
        tx.send(true).unwrap();
        assert!(sleep_or_cancel(Duration::from_secs(60), &mut rx).await);
        assert!(is_cancelled(&rx));
    }

    #[tokio::test]
    async fn test_dropped_sender_counts_as_cancelled() {
        let (tx, mut rx) = watch::channel(false);
        drop(tx);
        assert!(sleep_or_cancel(Duration::from_secs(60), &mut rx).await);
    }
}

use std::time::Duration;

use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use roost_types::models::PushNotification;

use crate::provider::PushProvider;

const MAX_ATTEMPTS: u32 = 3;
const SEND_TIMEOUT: Duration = Duration::from_secs(10);
const RETRY_DELAY: Duration = Duration::from_secs(2);

/// Run the fanout loop until the sending side is dropped. One
/// notification at a time; a failed dispatch is retried with a delay
/// and dropped (with an error log) once attempts are exhausted; a
/// failure never reaches the message path.
pub fn spawn<P: PushProvider>(
    provider: P,
    mut jobs: UnboundedReceiver<PushNotification>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(job) = jobs.recv().await {
            dispatch(&provider, job).await;
        }
        debug!("push worker shutting down");
    })
}

async fn dispatch<P: PushProvider>(provider: &P, job: PushNotification) {
    if job.tokens.is_empty() {
        return;
    }
    for attempt in 1..=MAX_ATTEMPTS {
        let result = tokio::time::timeout(
            SEND_TIMEOUT,
            provider.send_to_tokens(&job.tokens, &job.title, &job.body, &job.data),
        )
        .await;

        match result {
            Ok(Ok(outcomes)) => {
                debug!(tokens = outcomes.len(), attempt, "push delivered");
                return;
            }
            Ok(Err(e)) => {
                warn!(attempt, "push dispatch failed: {e:#}");
            }
            Err(_) => {
                warn!(attempt, "push dispatch timed out");
            }
        }
        if attempt < MAX_ATTEMPTS {
            tokio::time::sleep(RETRY_DELAY).await;
        }
    }
    error!(
        tokens = job.tokens.len(),
        "push notification dropped after {MAX_ATTEMPTS} attempts"
    );
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;
    use crate::provider::TokenOutcome;

    struct FlakyProvider {
        fail_first: u32,
        calls: AtomicU32,
        delivered: Mutex<Vec<Vec<String>>>,
    }

    impl PushProvider for FlakyProvider {
        async fn send_to_tokens(
            &self,
            tokens: &[String],
            _title: &str,
            _body: &str,
            _data: &HashMap<String, String>,
        ) -> anyhow::Result<Vec<TokenOutcome>> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.fail_first {
                anyhow::bail!("transient push failure");
            }
            self.delivered
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .push(tokens.to_vec());
            Ok(tokens
                .iter()
                .map(|t| TokenOutcome::Delivered(t.clone()))
                .collect())
        }
    }

    fn job(tokens: &[&str]) -> PushNotification {
        PushNotification {
            tokens: tokens.iter().map(|t| t.to_string()).collect(),
            title: "alice".into(),
            body: "hello".into(),
            data: HashMap::new(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn retries_transient_failures_then_delivers() {
        let provider = FlakyProvider {
            fail_first: 2,
            calls: AtomicU32::new(0),
            delivered: Mutex::new(Vec::new()),
        };
        dispatch(&provider, job(&["t1", "t2"])).await;
        assert_eq!(provider.calls.load(Ordering::SeqCst), 3);
        let delivered = provider.delivered.lock().unwrap();
        assert_eq!(delivered.len(), 1);
        assert_eq!(delivered[0], vec!["t1", "t2"]);
    }

    #[tokio::test(start_paused = true)]
    async fn drops_after_exhausting_attempts() {
        let provider = FlakyProvider {
            fail_first: u32::MAX,
            calls: AtomicU32::new(0),
            delivered: Mutex::new(Vec::new()),
        };
        dispatch(&provider, job(&["t1"])).await;
        assert_eq!(provider.calls.load(Ordering::SeqCst), MAX_ATTEMPTS);
        assert!(provider.delivered.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn worker_drains_the_queue_and_stops_on_close() {
        let provider = FlakyProvider {
            fail_first: 0,
            calls: AtomicU32::new(0),
            delivered: Mutex::new(Vec::new()),
        };
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        tx.send(job(&["t1"])).unwrap();
        tx.send(job(&["t2"])).unwrap();
        drop(tx);

        // Provider moves into the task, so inspect counts via the job
        // stream having been fully consumed before the task exits.
        let handle = spawn(provider, rx);
        handle.await.unwrap();
    }
}

//! GPU broadcast hub (C12, §4.12): a process-wide fan-out of canonicalized
//! GPU snapshots to every subscriber, isolating a slow reader from the rest.

use std::time::Duration;

use tokio::sync::{mpsc, Mutex};

use voice_agent_core::{canonicalize_gpu_snapshot, GpuSnapshot};

const FETCH_TIMEOUT: Duration = Duration::from_secs(5);

pub struct GpuHub {
    client: reqwest::Client,
    fetch_url: Option<String>,
    subscribers: Mutex<Vec<mpsc::Sender<GpuSnapshot>>>,
    loaded_models: Mutex<Vec<String>>,
    last: Mutex<Option<GpuSnapshot>>,
}

impl GpuHub {
    pub fn new(client: reqwest::Client, fetch_url: Option<String>) -> Self {
        Self {
            client,
            fetch_url,
            subscribers: Mutex::new(Vec::new()),
            loaded_models: Mutex::new(Vec::new()),
            last: Mutex::new(None),
        }
    }

    /// Registers a capacity-1 subscriber channel, seeded with the last
    /// published snapshot (if any) so a new subscriber sees the current
    /// state immediately, then every subsequent change (§4.12, §6).
    pub async fn subscribe(&self) -> mpsc::Receiver<GpuSnapshot> {
        let (tx, rx) = mpsc::channel(1);
        if let Some(snapshot) = self.last.lock().await.clone() {
            let _ = tx.try_send(snapshot);
        }
        self.subscribers.lock().await.push(tx);
        rx
    }

    pub async fn set_loaded_models(&self, models: Vec<String>) {
        *self.loaded_models.lock().await = models;
    }

    /// The most recently published snapshot, if any (§6 `GET /api/gpu`).
    pub async fn current(&self) -> Option<GpuSnapshot> {
        self.last.lock().await.clone()
    }

    async fn fetch_raw(&self) -> Option<GpuSnapshot> {
        let url = self.fetch_url.as_ref()?;
        let request = self.client.get(url).send();
        match tokio::time::timeout(FETCH_TIMEOUT, request).await {
            Ok(Ok(response)) => response.json::<GpuSnapshot>().await.ok(),
            Ok(Err(err)) => {
                tracing::warn!(error = %err, "gpu snapshot fetch failed");
                None
            }
            Err(_) => {
                tracing::warn!("gpu snapshot fetch timed out");
                None
            }
        }
    }

    /// Fetches an upstream snapshot, canonicalizes it and fans it out to
    /// every subscriber. A full subscriber buffer drops the update for that
    /// subscriber only (§4.12 slow-consumer isolation); a fetch failure is a
    /// null broadcast (§7 non-fatal list), returning `None`.
    pub async fn broadcast(&self) -> Option<GpuSnapshot> {
        let raw = self.fetch_raw().await?;
        Some(self.publish(raw).await)
    }

    /// Canonicalizes and fans out a snapshot that was already obtained
    /// elsewhere, e.g. the `{gpu: ...}` envelope on an orchestrator response
    /// (§4.13). Skips the upstream fetch entirely. Returns the canonicalized
    /// snapshot so callers (e.g. `GET /api/gpu`) can hand it back directly.
    pub async fn publish(&self, raw: GpuSnapshot) -> GpuSnapshot {
        let models = self.loaded_models.lock().await.clone();
        let snapshot = canonicalize_gpu_snapshot(raw, &models);
        *self.last.lock().await = Some(snapshot.clone());

        let mut subscribers = self.subscribers.lock().await;
        subscribers.retain(|tx| !tx.is_closed());
        for tx in subscribers.iter() {
            if tx.try_send(snapshot.clone()).is_err() {
                tracing::debug!("gpu hub: subscriber buffer full, dropping update for it");
            }
        }
        snapshot
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use voice_agent_core::GpuProcess;

    fn snapshot(ollama_processes: usize) -> GpuSnapshot {
        GpuSnapshot {
            vram_total_mb: 8000,
            vram_used_mb: 400,
            processes: (0..ollama_processes)
                .map(|i| GpuProcess { pid: i as u32, name: "ollama".into(), vram_mb: 200 })
                .collect(),
        }
    }

    #[tokio::test]
    async fn publish_canonicalizes_and_fans_out_to_every_subscriber() {
        let hub = GpuHub::new(reqwest::Client::new(), None);
        hub.set_loaded_models(vec!["llama3".to_string()]).await;

        let mut rx_a = hub.subscribe().await;
        let mut rx_b = hub.subscribe().await;

        hub.publish(snapshot(1)).await;

        let received_a = rx_a.recv().await.unwrap();
        let received_b = rx_b.recv().await.unwrap();
        assert_eq!(received_a.processes[0].name, "llama3");
        assert_eq!(received_b.processes[0].name, "llama3");
    }

    #[tokio::test]
    async fn unread_capacity_one_buffer_drops_the_second_update() {
        let hub = GpuHub::new(reqwest::Client::new(), None);
        let mut rx = hub.subscribe().await;

        hub.publish(snapshot(0)).await;
        hub.publish(snapshot(0)).await;

        rx.recv().await.unwrap();
        assert!(rx.try_recv().is_err(), "second publish should have been dropped, not queued");
    }

    #[tokio::test]
    async fn closed_subscribers_are_pruned_on_publish() {
        let hub = GpuHub::new(reqwest::Client::new(), None);
        {
            let rx = hub.subscribe().await;
            drop(rx);
        }
        let mut live_rx = hub.subscribe().await;

        hub.publish(snapshot(0)).await;
        assert!(live_rx.recv().await.is_some());
        assert_eq!(hub.subscribers.lock().await.len(), 1);
    }
}

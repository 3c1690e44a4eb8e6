//! Randomized device candidate ring.
//!
//! A [`DeviceRing`] turns a list of candidate devices into a stream of
//! device ids in randomized order, each candidate emitted exactly once.
//! The randomization avoids deterministic hot-spotting: repeated
//! placements over the same cluster walk the devices in different
//! orders.
//!
//! The stream is produced concurrently with its consumption: one
//! background task pushes ids onto a bounded channel and exits when all
//! candidates are out or when the consumer signals it is done. The
//! consumer must always call [`DeviceRing::close`] (dropping the ring
//! does it too) — including on the success path — so the producer task
//! never outlives the placement pass.

use mason_types::{DeviceAndNode, DeviceId};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use tokio::sync::{mpsc, oneshot};
use tracing::trace;

/// A stream of candidate device ids in randomized order.
pub struct DeviceRing {
    rx: mpsc::Receiver<DeviceId>,
    done: Option<oneshot::Sender<()>>,
}

impl DeviceRing {
    /// Shuffle `candidates` and start the producer task.
    ///
    /// `seed` is an opaque value (typically a fresh brick id folded to a
    /// `u64`) mixed with per-call entropy, so two rings built from the
    /// same seed are not required to agree on an order.
    pub fn start(candidates: &[DeviceAndNode], seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed ^ rand::rng().random::<u64>());
        let mut ids: Vec<DeviceId> = candidates.iter().map(|dan| dan.device).collect();
        ids.shuffle(&mut rng);

        let (tx, rx) = mpsc::channel(1);
        let (done_tx, mut done_rx) = oneshot::channel();

        tokio::spawn(async move {
            for id in ids {
                tokio::select! {
                    _ = &mut done_rx => {
                        trace!("ring canceled by consumer");
                        return;
                    }
                    res = tx.send(id) => {
                        if res.is_err() {
                            // Receiver dropped without an explicit close.
                            return;
                        }
                    }
                }
            }
            trace!("ring exhausted");
        });

        Self {
            rx,
            done: Some(done_tx),
        }
    }

    /// Pull the next candidate, or `None` once the ring is exhausted.
    pub async fn next(&mut self) -> Option<DeviceId> {
        self.rx.recv().await
    }

    /// Signal the producer that no more candidates are wanted.
    ///
    /// Idempotent; also invoked on drop.
    pub fn close(&mut self) {
        if let Some(done) = self.done.take() {
            let _ = done.send(());
        }
        self.rx.close();
    }
}

impl Drop for DeviceRing {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use mason_types::NodeId;

    use super::*;

    fn candidates(n: u8) -> Vec<DeviceAndNode> {
        (0..n)
            .map(|i| DeviceAndNode {
                device: DeviceId::from([i; 16]),
                node: NodeId::from([i; 16]),
                zone: 1,
            })
            .collect()
    }

    async fn drain(ring: &mut DeviceRing) -> Vec<DeviceId> {
        let mut out = Vec::new();
        while let Some(id) = ring.next().await {
            out.push(id);
        }
        out
    }

    #[tokio::test]
    async fn test_emits_each_candidate_exactly_once() {
        let cands = candidates(16);
        let mut ring = DeviceRing::start(&cands, 42);
        let out = drain(&mut ring).await;
        ring.close();

        assert_eq!(out.len(), cands.len());
        let unique: HashSet<_> = out.iter().collect();
        assert_eq!(unique.len(), cands.len());
    }

    #[tokio::test]
    async fn test_empty_candidate_list() {
        let mut ring = DeviceRing::start(&[], 7);
        assert_eq!(ring.next().await, None);
    }

    #[tokio::test]
    async fn test_close_mid_stream_stops_producer() {
        let cands = candidates(32);
        let mut ring = DeviceRing::start(&cands, 1);
        let first = ring.next().await;
        assert!(first.is_some());
        ring.close();
        assert_eq!(ring.next().await, None);
    }

    #[tokio::test]
    async fn test_orders_differ_across_runs() {
        // With 16 candidates the odds of five identical shuffles are
        // negligible; any difference passes.
        let cands = candidates(16);
        let mut ring = DeviceRing::start(&cands, 99);
        let baseline = drain(&mut ring).await;

        let mut saw_different = false;
        for _ in 0..5 {
            let mut ring = DeviceRing::start(&cands, 99);
            if drain(&mut ring).await != baseline {
                saw_different = true;
                break;
            }
        }
        assert!(saw_different, "ring produced the same order every run");
    }
}

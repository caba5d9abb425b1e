//! Shared test doubles.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use attend_core::messages::OutboundMessage;
use attend_core::ReferenceIdentity;

use crate::error::{DeliveryError, StoreError};
use crate::traits::{ReferenceStore, Transport};

/// Transport double recording every delivered message, with a switchable
/// failure mode and an optional per-send delay.
pub(crate) struct MockTransport {
    pub sent: Mutex<Vec<OutboundMessage>>,
    pub fail: AtomicBool,
    delay: Duration,
}

impl MockTransport {
    pub(crate) fn new(fail: bool) -> Arc<Self> {
        Arc::new(Self {
            sent: Mutex::new(Vec::new()),
            fail: AtomicBool::new(fail),
            delay: Duration::ZERO,
        })
    }

    pub(crate) fn slow(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            sent: Mutex::new(Vec::new()),
            fail: AtomicBool::new(false),
            delay,
        })
    }

    pub(crate) fn sent_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }

    pub(crate) fn messages(&self) -> Vec<OutboundMessage> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&self, message: &OutboundMessage) -> Result<(), DeliveryError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(DeliveryError("socket closed".into()));
        }
        self.sent.lock().unwrap().push(message.clone());
        Ok(())
    }
}

/// Reference store backed by a fixed in-memory population.
pub(crate) struct StaticReferenceStore {
    population: Vec<ReferenceIdentity>,
}

impl StaticReferenceStore {
    pub(crate) fn new(population: Vec<ReferenceIdentity>) -> Self {
        Self { population }
    }
}

#[async_trait]
impl ReferenceStore for StaticReferenceStore {
    async fn load_reference_population(&self) -> Result<Vec<ReferenceIdentity>, StoreError> {
        Ok(self.population.clone())
    }
}

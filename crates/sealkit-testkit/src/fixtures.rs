//! Test fixtures and helpers.
//!
//! Common setup code for integration tests: an engine over an in-memory
//! policy store, a manual clock, and a scratch directory for plaintext and
//! sealed files.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::mpsc::UnboundedReceiver;

use sealkit::{EngineConfig, EngineEvent, ProtectionEngine};
use sealkit_core::{ChatId, ContactId, Direction, ManualClock, MsgId};
use sealkit_keys::PeerShare;
use sealkit_policy::{MemoryPolicyStore, NewMessage};

/// A test fixture: engine, event receiver, manual clock, scratch dir.
pub struct TestFixture {
    pub engine: ProtectionEngine<MemoryPolicyStore>,
    pub events: UnboundedReceiver<EngineEvent>,
    pub clock: Arc<ManualClock>,
    pub dir: tempfile::TempDir,
}

impl TestFixture {
    /// Create a fixture with the default configuration, clock at zero.
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    /// Create a fixture with an explicit configuration.
    pub fn with_config(config: EngineConfig) -> Self {
        let clock = Arc::new(ManualClock::new(0));
        let (engine, events) =
            ProtectionEngine::with_clock(MemoryPolicyStore::new(), config, clock.clone());
        Self {
            engine,
            events,
            clock,
            dir: tempfile::tempdir().expect("tempdir"),
        }
    }

    /// Write a plaintext file into the scratch directory.
    pub fn write_plaintext(&self, name: &str, content: &[u8]) -> PathBuf {
        let path = self.dir.path().join(name);
        std::fs::write(&path, content).expect("write plaintext");
        path
    }

    /// Register an outgoing protected media message with a 600s window.
    pub async fn register_media(&self, msg: i64, chat: i64, path: &Path, name: &str) {
        let msg = NewMessage::text(MsgId(msg), ChatId(chat), ContactId(10), "attached")
            .with_media(path.display().to_string(), name, 600, true, true)
            .protected(2);
        self.engine
            .register_message(msg, Direction::Outgoing)
            .await
            .expect("register message");
    }

    /// Record enough peer shares to meet a threshold of `need`.
    pub fn fill_peer_shares(&self, chat: ChatId, need: u8) {
        for i in 0..need {
            self.engine
                .record_peer_share(chat, PeerShare::new(ContactId(100 + i as i64), [i; 32]))
                .expect("record share");
        }
    }

    /// Drain every event emitted so far.
    pub fn drain_events(&mut self) -> Vec<EngineEvent> {
        let mut out = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            out.push(event);
        }
        out
    }
}

impl Default for TestFixture {
    fn default() -> Self {
        Self::new()
    }
}

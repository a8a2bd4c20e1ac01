//! In-process fleet: one memory ledger, N peers behind a loopback copier,
//! and an owner engine.

#![allow(dead_code)]

mod faulty;

pub use faulty::FaultyLedger;

use std::sync::Arc;
use std::time::Duration;

use provestor::challenge::ChallengeConfig;
use provestor::copier::LoopbackCopier;
use provestor::crypto::pdp::pairing::PairingParams;
use provestor::crypto::pdp::Algorithm;
use provestor::crypto::Identity;
use provestor::encryptor::AesEncryptor;
use provestor::ledger::{unix_nanos, File, LedgerGateway, NodeOperateOptions, NANOS_PER_DAY};
use provestor::maintenance::register_node;
use provestor::peer::PeerService;
use provestor::pipeline::{PipelineConfig, WriteOptions};
use provestor::storage::MemoryStorage;
use provestor::{Engine, EngineConfig, MemoryLedger};
use tokio_util::sync::CancellationToken;

pub const PASSWORD: &str = "owner-secret";

pub struct TestPeer {
    pub identity: Identity,
    pub storage: Arc<MemoryStorage>,
    pub service: Arc<PeerService>,
}

impl TestPeer {
    pub fn id(&self) -> String {
        self.identity.id()
    }
}

pub struct Fleet {
    pub ledger: Arc<MemoryLedger>,
    pub params: Arc<PairingParams>,
    pub copier: Arc<LoopbackCopier>,
    pub peers: Vec<TestPeer>,
    pub owner: Engine,
    pub owner_storage: Arc<MemoryStorage>,
    pub config: EngineConfig,
}

pub fn config(algorithm: Algorithm, block_size: usize) -> EngineConfig {
    EngineConfig {
        challenge: ChallengeConfig {
            algorithm,
            ..Default::default()
        },
        pipeline: PipelineConfig {
            block_size,
            retry_interval: Duration::from_millis(10),
            retry_timeout: Duration::from_millis(30),
            ..Default::default()
        },
        ..Default::default()
    }
}

impl Fleet {
    pub async fn new(peers: usize, config: EngineConfig) -> Self {
        let params = Arc::new(PairingParams::new());
        let ledger = Arc::new(MemoryLedger::new(params.clone()));
        let copier = Arc::new(LoopbackCopier::new());

        let mut out = Vec::with_capacity(peers);
        for i in 0..peers {
            let identity = Identity::generate().unwrap();
            let storage = Arc::new(MemoryStorage::new());
            let service = Arc::new(PeerService::new(identity.id(), storage.clone(), ledger.clone()));
            copier.register(service.clone());
            register_node(&identity, ledger.as_ref(), &format!("peer-{}", i), "loopback")
                .await
                .unwrap();
            out.push(TestPeer {
                identity,
                storage,
                service,
            });
        }

        let owner_storage = Arc::new(MemoryStorage::new());
        let owner = Engine::new(
            Identity::generate().unwrap(),
            ledger.clone(),
            owner_storage.clone(),
            copier.clone(),
            Arc::new(AesEncryptor::new(PASSWORD).unwrap()),
            params.clone(),
            config.clone(),
        );

        Self {
            ledger,
            params,
            copier,
            peers: out,
            owner,
            owner_storage,
            config,
        }
    }

    /// Engine acting as peer `i`, for answering and reaping.
    pub fn peer_engine(&self, i: usize) -> Engine {
        Engine::new(
            self.peers[i].identity.clone(),
            self.ledger.clone(),
            self.peers[i].storage.clone(),
            self.copier.clone(),
            Arc::new(AesEncryptor::new("peer").unwrap()),
            self.params.clone(),
            self.config.clone(),
        )
    }

    /// The owner again, talking to `ledger` instead of the fleet ledger.
    pub fn owner_via(&self, ledger: Arc<dyn LedgerGateway>) -> Engine {
        Engine::new(
            (*self.owner.handles().identity).clone(),
            ledger,
            self.owner_storage.clone(),
            self.copier.clone(),
            Arc::new(AesEncryptor::new(PASSWORD).unwrap()),
            self.params.clone(),
            self.config.clone(),
        )
    }

    pub fn peer_index(&self, node_id: &str) -> usize {
        self.peers
            .iter()
            .position(|p| p.id() == node_id)
            .expect("peer is part of the fleet")
    }

    pub async fn set_offline(&self, i: usize) {
        let identity = &self.peers[i].identity;
        let nonce = unix_nanos();
        let signature = identity
            .sign(NodeOperateOptions::message(&identity.id(), nonce).as_bytes())
            .unwrap();
        self.ledger
            .node_offline(NodeOperateOptions {
                node_id: identity.id(),
                nonce,
                current_time: nonce,
                signature,
            })
            .await
            .unwrap();
    }

    pub async fn write(&self, namespace: &str, name: &str, data: &[u8], ttl_ns: i64) -> File {
        self.owner
            .write(
                data,
                WriteOptions {
                    namespace: namespace.to_string(),
                    name: name.to_string(),
                    description: String::new(),
                    expire_time: unix_nanos() + ttl_ns,
                    algorithm: None,
                },
                &CancellationToken::new(),
            )
            .await
            .unwrap()
    }

    pub async fn file(&self, file_id: &str) -> File {
        self.ledger.get_file_by_id(file_id, unix_nanos()).await.unwrap()
    }
}

pub fn random_bytes(len: usize) -> Vec<u8> {
    use rand::RngCore;
    let mut data = vec![0u8; len];
    rand::thread_rng().fill_bytes(&mut data);
    data
}

pub const DAY: i64 = NANOS_PER_DAY;

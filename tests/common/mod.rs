//! Common test utilities
//!
//! A scripted remote service: every client built by [`FakeRemote`] pops its
//! login and fetch outcomes from shared queues (defaulting to success) and
//! records each call, so tests can assert on which identity and egress were
//! used and in what order.

#![allow(dead_code)]

use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use minion::models::{Coordinate, Egress, Identity};
use minion::pool::SessionPool;
use minion::remote::{
    ClientFactory, MapCell, MapObjectsResponse, RemoteClient, RemoteError, WildCreature,
};
use minion::scanner::{RateGate, ScanOrchestrator, ScanSettings};
use minion::status::StatusRegistry;
use minion::storage::{ResourceStore, SqliteStore};

/// One remote call observed by the fake
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Login { identity: String, egress: i64, force: bool },
    Fetch { identity: String, egress: i64 },
}

/// Scripted outcome of a fetch
pub enum FetchStep {
    Respond(Result<MapObjectsResponse, RemoteError>),
    /// Never answers; only a deadline gets the caller out
    Hang,
}

type FetchHook = Box<dyn Fn(&str, i64) + Send + Sync>;

#[derive(Default)]
pub struct FakeRemote {
    logins: Mutex<VecDeque<Result<(), RemoteError>>>,
    fetches: Mutex<VecDeque<FetchStep>>,
    calls: Mutex<Vec<Call>>,
    fetch_delay: Mutex<Duration>,
    on_fetch: Mutex<Option<FetchHook>>,
    in_flight: Mutex<HashSet<String>>,
    overlaps: AtomicUsize,
}

impl FakeRemote {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push_login(&self, outcome: Result<(), RemoteError>) {
        self.logins.lock().unwrap().push_back(outcome);
    }

    pub fn push_fetch(&self, outcome: Result<MapObjectsResponse, RemoteError>) {
        self.fetches
            .lock()
            .unwrap()
            .push_back(FetchStep::Respond(outcome));
    }

    pub fn push_hang(&self) {
        self.fetches.lock().unwrap().push_back(FetchStep::Hang);
    }

    /// Make every fetch take `delay` before answering
    pub fn set_fetch_delay(&self, delay: Duration) {
        *self.fetch_delay.lock().unwrap() = delay;
    }

    /// Run `hook(identity, egress)` at the start of every fetch
    pub fn on_fetch(&self, hook: impl Fn(&str, i64) + Send + Sync + 'static) {
        *self.on_fetch.lock().unwrap() = Some(Box::new(hook));
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    /// Egress ids used for fetches, in order
    pub fn fetch_egress(&self) -> Vec<i64> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Fetch { egress, .. } => Some(egress),
                Call::Login { .. } => None,
            })
            .collect()
    }

    /// Number of times a fetch started while another fetch with the same
    /// identity or egress was still running
    pub fn overlaps(&self) -> usize {
        self.overlaps.load(Ordering::SeqCst)
    }
}

pub struct FakeClient {
    remote: Arc<FakeRemote>,
    identity: String,
    egress: i64,
}

#[async_trait]
impl RemoteClient for FakeClient {
    async fn login(
        &mut self,
        identity: &Identity,
        egress: &Egress,
        force: bool,
    ) -> Result<(), RemoteError> {
        self.identity = identity.name.clone();
        self.egress = egress.id;
        self.remote.calls.lock().unwrap().push(Call::Login {
            identity: identity.name.clone(),
            egress: egress.id,
            force,
        });
        self.remote
            .logins
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Ok(()))
    }

    fn move_to(&mut self, _coordinate: Coordinate) {}

    async fn fetch_map_objects(&mut self) -> Result<MapObjectsResponse, RemoteError> {
        let remote = Arc::clone(&self.remote);
        remote.calls.lock().unwrap().push(Call::Fetch {
            identity: self.identity.clone(),
            egress: self.egress,
        });

        if let Some(hook) = remote.on_fetch.lock().unwrap().as_ref() {
            hook(&self.identity, self.egress);
        }

        let _guard = InFlight::enter(
            &remote,
            [
                format!("identity:{}", self.identity),
                format!("egress:{}", self.egress),
            ],
        );

        let step = remote.fetches.lock().unwrap().pop_front();
        let delay = *remote.fetch_delay.lock().unwrap();
        match step {
            Some(FetchStep::Hang) => std::future::pending().await,
            Some(FetchStep::Respond(outcome)) => {
                tokio::time::sleep(delay).await;
                outcome
            }
            None => {
                tokio::time::sleep(delay).await;
                Ok(MapObjectsResponse::default())
            }
        }
    }
}

/// Marks an identity and egress busy for the lifetime of one fetch, even
/// when the fetch future is dropped by a deadline
struct InFlight<'a> {
    remote: &'a FakeRemote,
    keys: [String; 2],
}

impl<'a> InFlight<'a> {
    fn enter(remote: &'a FakeRemote, keys: [String; 2]) -> Self {
        let mut in_flight = remote.in_flight.lock().unwrap();
        for key in &keys {
            if !in_flight.insert(key.clone()) {
                remote.overlaps.fetch_add(1, Ordering::SeqCst);
            }
        }
        drop(in_flight);
        Self { remote, keys }
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        let mut in_flight = self.remote.in_flight.lock().unwrap();
        for key in &self.keys {
            in_flight.remove(key);
        }
    }
}

/// Binds every new session to the shared [`FakeRemote`]
pub struct FakeFactory(pub Arc<FakeRemote>);

impl ClientFactory for FakeFactory {
    fn create(&self, identity: &Identity, egress: &Egress) -> Box<dyn RemoteClient> {
        Box::new(FakeClient {
            remote: Arc::clone(&self.0),
            identity: identity.name.clone(),
            egress: egress.id,
        })
    }
}

/// Everything a scan test needs, wired together
pub struct Harness {
    pub store: Arc<SqliteStore>,
    pub remote: Arc<FakeRemote>,
    pub orchestrator: Arc<ScanOrchestrator>,
}

/// Settings that keep tests fast: short waits, no cooldown
pub fn fast_settings() -> ScanSettings {
    ScanSettings {
        acquire_wait: Duration::from_millis(20),
        cooldown: Duration::ZERO,
        query_timeout: Duration::from_secs(2),
    }
}

/// Seed `identities` identities named `trainer{i}` and egress ids `1..=egress`
pub fn seeded_store(identities: usize, egress: usize) -> Arc<SqliteStore> {
    let store = Arc::new(SqliteStore::in_memory().unwrap());
    for i in 0..identities {
        store
            .add_identity(&Identity::new(format!("trainer{i}"), "secret"))
            .unwrap();
    }
    for id in 1..=egress {
        store.add_egress(id as i64).unwrap();
    }
    store
}

pub fn harness(identities: usize, egress: usize, settings: ScanSettings) -> Harness {
    let store = seeded_store(identities, egress);
    let remote = FakeRemote::new();

    let pool = SessionPool::new(store.clone(), Arc::new(FakeFactory(Arc::clone(&remote))), 64);
    let orchestrator = ScanOrchestrator::new(
        Arc::new(pool),
        store.clone(),
        StatusRegistry::new(),
        Arc::new(RateGate::per_second(1000.0).unwrap()),
        settings,
    );

    Harness {
        store,
        remote,
        orchestrator: Arc::new(orchestrator),
    }
}

/// A response with one wild creature at `at`
pub fn creature_response(encounter_id: u64, at: Coordinate) -> MapObjectsResponse {
    MapObjectsResponse {
        cells: vec![MapCell {
            wild_creatures: vec![WildCreature {
                encounter_id,
                species: 25,
                lat: at.lat,
                lng: at.lng,
                time_till_hidden_ms: 15 * 60 * 1000,
            }],
            forts: vec![],
        }],
    }
}

pub fn berlin() -> Coordinate {
    Coordinate::new(52.5200, 13.4050)
}

/// Let zero-cooldown release tasks run
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(30)).await;
}

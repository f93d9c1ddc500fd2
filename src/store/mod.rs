//! The sync adapter: one subscribe/save/delete contract over either backend.

use async_std::task::{self, JoinHandle};
use log::*;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::config::Config;
use crate::emitter::{Emitter, Listener};
use crate::error::{Error, Result};
use crate::models::{Deletable, Entity, Kind, PollVote};

pub mod local;
pub mod remote;

use local::{FileStorage, LocalStore, MemoryStorage, Storage};
use remote::RemoteStore;

/**
 * Data directory value that keeps the local fallback in memory only
 */
pub const IN_MEMORY: &str = ":memory:";

/**
 * Receives every backend failure the adapter swallows
 */
pub trait Reporter: Send + Sync {
    fn report(&self, context: &str, error: &Error);
}

pub struct LogReporter;

impl Reporter for LogReporter {
    fn report(&self, context: &str, error: &Error) {
        error!("Failed to {}: {}", context, error);
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Remote,
    Local,
}

#[derive(Clone)]
enum Backend {
    Remote(Arc<RemoteStore>),
    Local(Arc<LocalStore>),
}

/**
 * Handle for the UI to access every synchronized collection
 *
 * The backend is chosen once when the adapter is built and never changes.
 * Clones share the backend, so a clone behaves like another tab
 */
#[derive(Clone)]
pub struct Adapter {
    backend: Backend,
    reporter: Arc<dyn Reporter>,
}

impl Adapter {
    pub async fn from_config(config: &Config, reporter: Arc<dyn Reporter>) -> Result<Self> {
        if config.remote.is_configured() {
            info!("Using remote document store, project {}", config.remote.project_id);
            let store = RemoteStore::connect(&config.remote)?;
            if let Err(err) = store.ensure_schema().await {
                reporter.report("prepare the remote store", &err);
            }
            Ok(Self::remote(store, reporter))
        }
        else {
            let storage: Arc<dyn Storage> = if config.data_dir.as_os_str() == IN_MEMORY {
                warn!("Remote store not configured, keeping data in memory only");
                Arc::new(MemoryStorage::new())
            }
            else {
                warn!(
                    "Remote store not configured, keeping data locally in {:?}",
                    config.data_dir
                );
                Arc::new(FileStorage::new(config.data_dir.clone()))
            };
            Ok(Self::local(storage, Arc::new(Emitter::new()), reporter))
        }
    }

    pub fn local(storage: Arc<dyn Storage>, emitter: Arc<Emitter>, reporter: Arc<dyn Reporter>) -> Self {
        Self {
            backend: Backend::Local(Arc::new(LocalStore::new(storage, emitter))),
            reporter,
        }
    }

    pub fn remote(store: RemoteStore, reporter: Arc<dyn Reporter>) -> Self {
        Self {
            backend: Backend::Remote(Arc::new(store)),
            reporter,
        }
    }

    pub fn mode(&self) -> Mode {
        match self.backend {
            Backend::Remote(_) => Mode::Remote,
            Backend::Local(_) => Mode::Local,
        }
    }

    /**
     * Whether the remote store answered the last request, always false locally
     */
    pub fn is_connected(&self) -> bool {
        match &self.backend {
            Backend::Remote(store) => store.is_online(),
            Backend::Local(_) => false,
        }
    }

    fn settle(&self, context: &str, result: Result<()>) -> bool {
        match result {
            Ok(()) => true,
            Err(err) => {
                self.reporter.report(context, &err);
                false
            }
        }
    }

    /**
     * Deliver the ordered collection now and after every change, until the
     * returned handle is released
     */
    pub fn subscribe<T, F>(&self, on_change: F) -> Subscription
    where
        T: Entity,
        F: Fn(Vec<T>) + Send + Sync + 'static,
    {
        match &self.backend {
            Backend::Local(store) => {
                let active = Arc::new(AtomicBool::new(true));
                let live = active.clone();
                let reader = store.clone();
                let reporter = self.reporter.clone();
                let deliver: Listener = Arc::new(move || {
                    if !live.load(Ordering::SeqCst) {
                        return;
                    }
                    match reader.read::<T>() {
                        Ok(items) => on_change(items),
                        Err(err) => reporter.report(&format!("read {}", T::KIND.collection()), &err),
                    }
                });

                let emitter = store.emitter().clone();
                let id = emitter.listen(T::KIND, deliver.clone());
                deliver();

                Subscription {
                    inner: Some(Inner::Local {
                        active,
                        emitter,
                        kind: T::KIND,
                        id,
                    }),
                }
            }
            Backend::Remote(store) => {
                let active = Arc::new(AtomicBool::new(true));
                let task = store
                    .clone()
                    .watch(self.reporter.clone(), active.clone(), on_change);

                Subscription {
                    inner: Some(Inner::Remote { active, task }),
                }
            }
        }
    }

    /**
     * One ordered snapshot of a collection
     */
    pub async fn fetch<T: Entity>(&self) -> Result<Vec<T>> {
        match &self.backend {
            Backend::Local(store) => store.read::<T>(),
            Backend::Remote(store) => store.list::<T>().await,
        }
    }

    /**
     * Insert or wholly replace the record with the same id
     */
    pub async fn save<T: Entity>(&self, entity: &T) -> bool {
        let result = match &self.backend {
            Backend::Local(store) => store.save(entity),
            Backend::Remote(store) => store.upsert(entity).await,
        };
        self.settle(&format!("save {} {}", T::KIND.collection(), entity.id()), result)
    }

    pub async fn delete<T: Deletable>(&self, id: &str) -> bool {
        let result = match &self.backend {
            Backend::Local(store) => store.delete::<T>(id),
            Backend::Remote(store) => store.remove(T::KIND, id).await,
        };
        self.settle(
            &format!("delete {} {}", T::KIND.collection(), id),
            result.map(|removed| {
                if !removed {
                    debug!("Nothing to delete for {} in {}", id, T::KIND.collection());
                }
            }),
        )
    }

    /**
     * Record a participant's choice in a poll, keyed by participant and poll
     *
     * The stored vote decides which option loses a count, `previous_option_id`
     * is only checked against it
     */
    pub async fn save_poll_vote(&self, vote: &PollVote, previous_option_id: Option<&str>) -> bool {
        let mut vote = vote.clone();
        vote.id = PollVote::key(&vote.participant_id, &vote.poll_id);

        let result = match &self.backend {
            Backend::Local(store) => store.cast_poll_vote(&vote, previous_option_id),
            Backend::Remote(store) => store.cast_poll_vote(&vote, previous_option_id).await,
        };
        self.settle(&format!("save poll vote {}", vote.id), result)
    }
}

/**
 * Decide which option a vote change moves away from
 */
pub(crate) fn resolve_previous(stored: Option<&PollVote>, claimed: Option<&str>) -> Option<String> {
    match (stored, claimed) {
        (Some(stored), Some(claimed)) if stored.option_id != claimed => {
            warn!(
                "Vote {} claims previous option {} but {} is stored",
                stored.id, claimed, stored.option_id
            );
            Some(stored.option_id.clone())
        }
        (Some(stored), _) => Some(stored.option_id.clone()),
        (None, Some(claimed)) => {
            warn!("No vote is stored, ignoring claimed previous option {}", claimed);
            None
        }
        (None, None) => None,
    }
}

enum Inner {
    Local {
        active: Arc<AtomicBool>,
        emitter: Arc<Emitter>,
        kind: Kind,
        id: u64,
    },
    Remote {
        active: Arc<AtomicBool>,
        task: JoinHandle<()>,
    },
}

/**
 * Live subscription; releasing it (explicitly or by dropping) stops delivery
 */
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    inner: Option<Inner>,
}

impl Subscription {
    pub fn unsubscribe(mut self) {
        self.release();
    }

    fn release(&mut self) {
        match self.inner.take() {
            Some(Inner::Local {
                active,
                emitter,
                kind,
                id,
            }) => {
                active.store(false, Ordering::SeqCst);
                emitter.forget(kind, id);
            }
            Some(Inner::Remote { active, task }) => {
                active.store(false, Ordering::SeqCst);
                task::spawn(async move {
                    task.cancel().await;
                });
            }
            None => {}
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        failures: Mutex<Vec<String>>,
    }

    impl Reporter for Recorder {
        fn report(&self, context: &str, error: &Error) {
            self.failures
                .lock()
                .unwrap()
                .push(format!("{}: {}", context, error));
        }
    }

    fn adapter() -> (Adapter, Arc<Recorder>) {
        let recorder = Arc::new(Recorder::default());
        let adapter = Adapter::local(
            Arc::new(MemoryStorage::new()),
            Arc::new(Emitter::new()),
            recorder.clone(),
        );
        (adapter, recorder)
    }

    /**
     * Subscribe and keep every delivered snapshot
     */
    fn record<T: Entity>(adapter: &Adapter) -> (Subscription, Arc<Mutex<Vec<Vec<T>>>>) {
        let seen = Arc::new(Mutex::new(vec![]));
        let sink = seen.clone();
        let subscription = adapter.subscribe(move |items: Vec<T>| sink.lock().unwrap().push(items));
        (subscription, seen)
    }

    fn latest<T: Clone>(seen: &Arc<Mutex<Vec<Vec<T>>>>) -> Vec<T> {
        seen.lock().unwrap().last().cloned().unwrap_or_default()
    }

    fn participant(id: &str, name: &str) -> Participant {
        Participant {
            id: id.to_string(),
            name: name.to_string(),
            avatar: String::new(),
            interests: String::new(),
            wishes: vec![Gift::blank(), Gift::blank(), Gift::blank()],
        }
    }

    fn vote(voter: &str, guess: &str) -> Vote {
        Vote {
            id: voter.to_string(),
            voter_name: voter.to_uppercase(),
            guess_id: guess.to_string(),
            guess_name: guess.to_uppercase(),
        }
    }

    fn song(id: &str, created_at: i64) -> MusicRequest {
        MusicRequest {
            id: id.to_string(),
            title: format!("Song {}", id),
            artist: "Kevin MacLeod".to_string(),
            track_id: None,
            audio_url: None,
            thumbnail: None,
            requester_id: "p1".to_string(),
            requester_name: "Ana".to_string(),
            created_at,
        }
    }

    fn option(id: &str, poll: &str) -> PollOption {
        PollOption {
            id: id.to_string(),
            poll_id: poll.to_string(),
            name: id.to_uppercase(),
            votes: 0,
        }
    }

    fn ballot(participant: &str, poll: &str, option: &str) -> PollVote {
        PollVote {
            id: String::new(),
            poll_id: poll.to_string(),
            option_id: option.to_string(),
            participant_id: participant.to_string(),
            participant_name: participant.to_uppercase(),
            option_name: option.to_uppercase(),
        }
    }

    async fn counters(adapter: &Adapter) -> Vec<(String, i64)> {
        adapter
            .fetch::<PollOption>()
            .await
            .unwrap()
            .into_iter()
            .map(|o| (o.id, o.votes))
            .collect()
    }

    async fn poll_fixture(adapter: &Adapter) {
        for id in &["turkey", "farofa", "pudding"] {
            assert!(adapter.save(&option(id, "best-dish")).await);
        }
        assert!(adapter.save(&option("elsewhere", "best-costume")).await);
    }

    #[test]
    fn resolve_previous_prefers_stored_vote() {
        let stored = ballot("p1", "poll", "a");
        assert_eq!(resolve_previous(Some(&stored), Some("b")).as_deref(), Some("a"));
        assert_eq!(resolve_previous(Some(&stored), None).as_deref(), Some("a"));
        assert_eq!(resolve_previous(None, Some("b")), None);
        assert_eq!(resolve_previous(None, None), None);
    }

    #[async_std::test]
    async fn unconfigured_remote_selects_local_fallback() {
        let config = Config::from_lookup(|key| match key {
            "NORTHPOLE_DATA_DIR" => Some(IN_MEMORY.to_string()),
            _ => None,
        })
        .unwrap();
        let adapter = Adapter::from_config(&config, Arc::new(LogReporter)).await.unwrap();

        assert_eq!(adapter.mode(), Mode::Local);
        assert!(!adapter.is_connected());
        assert!(adapter.save(&participant("p1", "Ana")).await);
        assert_eq!(adapter.fetch::<Participant>().await.unwrap().len(), 1);
    }

    #[async_std::test]
    async fn subscribe_delivers_current_collection_immediately() {
        let (adapter, _) = adapter();
        let ana = participant("p1", "Ana");
        assert!(adapter.save(&ana).await);

        let (_subscription, seen) = record::<Participant>(&adapter);

        assert_eq!(seen.lock().unwrap().len(), 1);
        assert_eq!(latest(&seen), vec![ana]);
    }

    #[async_std::test]
    async fn second_save_replaces_whole_record() {
        let (adapter, _) = adapter();
        let (_subscription, seen) = record::<Participant>(&adapter);

        let mut first = participant("p1", "Ana");
        first.interests = "knitting".to_string();
        assert!(adapter.save(&first).await);

        let second = participant("p1", "Ana Maria");
        assert!(adapter.save(&second).await);

        assert_eq!(latest(&seen), vec![second]);
    }

    #[async_std::test]
    async fn revote_keeps_one_record_per_voter() {
        let (adapter, _) = adapter();
        for (id, name) in &[("p1", "Ana"), ("p2", "Bia"), ("p3", "Caio")] {
            assert!(adapter.save(&participant(id, name)).await);
        }

        assert!(adapter.save(&vote("p1", "p2")).await);
        assert!(adapter.save(&vote("p1", "p3")).await);

        let votes = adapter.fetch::<Vote>().await.unwrap();
        assert_eq!(votes.len(), 1);
        assert_eq!(votes[0].id, "p1");
        assert_eq!(votes[0].guess_id, "p3");
    }

    #[async_std::test]
    async fn music_is_delivered_oldest_first() {
        let (adapter, _) = adapter();
        let (_subscription, seen) = record::<MusicRequest>(&adapter);

        for (id, at) in &[("t2", 200), ("t3", 300), ("t1", 100)] {
            assert!(adapter.save(&song(id, *at)).await);
        }

        let ids: Vec<String> = latest(&seen).into_iter().map(|m| m.id).collect();
        assert_eq!(ids, vec!["t1", "t2", "t3"]);
    }

    #[async_std::test]
    async fn secrets_are_delivered_newest_first() {
        let (adapter, _) = adapter();
        let (_subscription, seen) = record::<SecretMessage>(&adapter);

        for (id, at) in &[("older", 1), ("newer", 2)] {
            let message = SecretMessage {
                id: id.to_string(),
                sender: "Anônimo".to_string(),
                recipient: "Bia".to_string(),
                content: "Feliz Natal".to_string(),
                created_at: *at,
            };
            assert!(adapter.save(&message).await);
        }

        let ids: Vec<String> = latest(&seen).into_iter().map(|m| m.id).collect();
        assert_eq!(ids, vec!["newer", "older"]);
    }

    #[async_std::test]
    async fn delete_is_broadcast() {
        let (adapter, _) = adapter();
        assert!(adapter.save(&song("a", 1)).await);
        assert!(adapter.save(&song("b", 2)).await);
        let (_subscription, seen) = record::<MusicRequest>(&adapter);

        assert!(adapter.delete::<MusicRequest>("a").await);

        let ids: Vec<String> = latest(&seen).into_iter().map(|m| m.id).collect();
        assert_eq!(ids, vec!["b"]);
        // deleting twice is not a failure
        assert!(adapter.delete::<MusicRequest>("a").await);
    }

    #[async_std::test]
    async fn unsubscribe_stops_delivery() {
        let (adapter, _) = adapter();
        let other_tab = adapter.clone();
        let (subscription, seen) = record::<Vote>(&adapter);

        assert!(other_tab.save(&vote("p1", "p2")).await);
        assert_eq!(seen.lock().unwrap().len(), 2);

        subscription.unsubscribe();
        assert!(other_tab.save(&vote("p2", "p1")).await);
        assert_eq!(seen.lock().unwrap().len(), 2);
    }

    #[async_std::test]
    async fn dropping_subscription_releases_listener() {
        let storage = Arc::new(MemoryStorage::new());
        let emitter = Arc::new(Emitter::new());
        let adapter = Adapter::local(storage, emitter.clone(), Arc::new(LogReporter));

        {
            let _subscription = adapter.subscribe(|_: Vec<Poll>| {});
            assert_eq!(emitter.listener_count(Kind::Polls), 1);
        }
        assert_eq!(emitter.listener_count(Kind::Polls), 0);
    }

    #[async_std::test]
    async fn tabs_sharing_storage_see_each_other() {
        let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new());
        let emitter = Arc::new(Emitter::new());
        let first = Adapter::local(storage.clone(), emitter.clone(), Arc::new(LogReporter));
        let second = Adapter::local(storage, emitter, Arc::new(LogReporter));

        let (_subscription, seen) = record::<FoodItem>(&second);
        let food = FoodItem {
            id: "f1".to_string(),
            name: "Farofa".to_string(),
            caption: String::new(),
            image: "data:image/jpeg;base64,AAAA".to_string(),
            contributor_name: "Ana".to_string(),
            contributor_avatar: String::new(),
        };
        assert!(first.save(&food).await);

        assert_eq!(latest(&seen), vec![food]);
    }

    #[async_std::test]
    async fn saved_entity_survives_reload() {
        let dir = tempfile::tempdir().unwrap();
        let open = || {
            Adapter::local(
                Arc::new(FileStorage::new(dir.path())),
                Arc::new(Emitter::new()),
                Arc::new(LogReporter),
            )
        };

        let mut ana = participant("p1", "Ana");
        ana.wishes[0].title = "Meias".to_string();
        assert!(open().save(&ana).await);

        let (_subscription, seen) = record::<Participant>(&open());
        assert_eq!(latest(&seen), vec![ana]);
    }

    #[async_std::test]
    async fn failed_local_write_is_reported_and_not_broadcast() {
        let recorder = Arc::new(Recorder::default());
        let adapter = Adapter::local(
            Arc::new(MemoryStorage::with_quota(16)),
            Arc::new(Emitter::new()),
            recorder.clone(),
        );
        let (_subscription, seen) = record::<Participant>(&adapter);

        assert!(!adapter.save(&participant("p1", "Ana")).await);

        assert_eq!(seen.lock().unwrap().len(), 1);
        assert!(latest(&seen).is_empty());
        let failures = recorder.failures.lock().unwrap();
        assert_eq!(failures.len(), 1);
        assert!(failures[0].contains("quota"));
    }

    #[async_std::test]
    async fn corrupt_collection_leaves_callback_uninvoked() {
        let storage = Arc::new(MemoryStorage::new());
        storage.set(Kind::Votes.storage_key(), "[{\"id\":").unwrap();
        let recorder = Arc::new(Recorder::default());
        let adapter = Adapter::local(storage, Arc::new(Emitter::new()), recorder.clone());

        let (_subscription, seen) = record::<Vote>(&adapter);

        assert!(seen.lock().unwrap().is_empty());
        assert_eq!(recorder.failures.lock().unwrap().len(), 1);
    }

    #[async_std::test]
    async fn poll_vote_change_moves_exactly_one_count() {
        let (adapter, _) = adapter();
        poll_fixture(&adapter).await;

        assert!(adapter.save_poll_vote(&ballot("p1", "best-dish", "turkey"), None).await);
        assert!(adapter.save_poll_vote(&ballot("p2", "best-dish", "turkey"), None).await);
        assert!(
            adapter
                .save_poll_vote(&ballot("p1", "best-dish", "farofa"), Some("turkey"))
                .await
        );

        assert_eq!(
            counters(&adapter).await,
            vec![
                ("turkey".to_string(), 1),
                ("farofa".to_string(), 1),
                ("pudding".to_string(), 0),
                ("elsewhere".to_string(), 0),
            ]
        );

        let votes = adapter.fetch::<PollVote>().await.unwrap();
        assert_eq!(votes.len(), 2);
        let total: i64 = counters(&adapter).await.iter().map(|(_, n)| n).sum();
        assert_eq!(total, votes.len() as i64);
    }

    #[async_std::test]
    async fn poll_votes_are_keyed_by_participant_and_poll() {
        let (adapter, _) = adapter();
        poll_fixture(&adapter).await;

        let mut forged = ballot("p1", "best-dish", "turkey");
        forged.id = "whatever".to_string();
        assert!(adapter.save_poll_vote(&forged, None).await);
        // caller forgets the previous option, the stored vote still wins
        assert!(adapter.save_poll_vote(&ballot("p1", "best-dish", "pudding"), None).await);

        let votes = adapter.fetch::<PollVote>().await.unwrap();
        assert_eq!(votes.len(), 1);
        assert_eq!(votes[0].id, "p1_best-dish");
        assert_eq!(votes[0].option_id, "pudding");

        let counts = counters(&adapter).await;
        assert!(counts.contains(&("turkey".to_string(), 0)));
        assert!(counts.contains(&("pudding".to_string(), 1)));
    }

    #[async_std::test]
    async fn same_option_revote_changes_no_counter() {
        let (adapter, _) = adapter();
        poll_fixture(&adapter).await;

        assert!(adapter.save_poll_vote(&ballot("p1", "best-dish", "turkey"), None).await);
        assert!(
            adapter
                .save_poll_vote(&ballot("p1", "best-dish", "turkey"), Some("turkey"))
                .await
        );

        assert!(counters(&adapter).await.contains(&("turkey".to_string(), 1)));
    }

    #[async_std::test]
    async fn vote_for_option_of_another_poll_writes_nothing() {
        let (adapter, recorder) = adapter();
        poll_fixture(&adapter).await;

        assert!(!adapter.save_poll_vote(&ballot("p1", "best-dish", "elsewhere"), None).await);
        assert!(!adapter.save_poll_vote(&ballot("p1", "best-dish", "missing"), None).await);

        assert!(adapter.fetch::<PollVote>().await.unwrap().is_empty());
        assert!(counters(&adapter).await.iter().all(|(_, n)| *n == 0));
        assert_eq!(recorder.failures.lock().unwrap().len(), 2);
    }

    #[async_std::test]
    async fn poll_vote_signals_both_collections() {
        let (adapter, _) = adapter();
        poll_fixture(&adapter).await;
        let (_options, option_snapshots) = record::<PollOption>(&adapter);
        let (_votes, vote_snapshots) = record::<PollVote>(&adapter);

        assert!(adapter.save_poll_vote(&ballot("p1", "best-dish", "farofa"), None).await);

        assert_eq!(option_snapshots.lock().unwrap().len(), 2);
        assert_eq!(vote_snapshots.lock().unwrap().len(), 2);
        assert_eq!(latest(&vote_snapshots)[0].option_id, "farofa");
    }

    #[async_std::test]
    async fn claimed_previous_option_without_stored_vote_is_ignored() {
        let (adapter, _) = adapter();
        poll_fixture(&adapter).await;

        assert!(
            adapter
                .save_poll_vote(&ballot("p1", "best-dish", "turkey"), Some("farofa"))
                .await
        );

        let counts = counters(&adapter).await;
        assert!(counts.contains(&("turkey".to_string(), 1)));
        assert!(counts.contains(&("farofa".to_string(), 0)));
        let total: i64 = counts.iter().map(|(_, n)| n).sum();
        assert_eq!(total, adapter.fetch::<PollVote>().await.unwrap().len() as i64);
    }

    #[async_std::test]
    async fn vote_that_does_not_fit_leaves_counters_alone() {
        let seeded = vec![option("turkey", "best-dish")];
        let room = Kind::PollOptions.storage_key().len() + serde_json::to_string(&seeded).unwrap().len();
        let recorder = Arc::new(Recorder::default());
        let adapter = Adapter::local(
            Arc::new(MemoryStorage::with_quota(room + 8)),
            Arc::new(Emitter::new()),
            recorder.clone(),
        );
        assert!(adapter.save(&seeded[0]).await);
        let (_subscription, seen) = record::<PollOption>(&adapter);

        assert!(!adapter.save_poll_vote(&ballot("p1", "best-dish", "turkey"), None).await);

        assert_eq!(counters(&adapter).await, vec![("turkey".to_string(), 0)]);
        assert!(adapter.fetch::<PollVote>().await.unwrap().is_empty());
        assert_eq!(seen.lock().unwrap().len(), 1);
        assert_eq!(recorder.failures.lock().unwrap().len(), 1);
    }

    #[async_std::test]
    async fn released_subscription_misses_a_signal_already_in_flight() {
        let (adapter, _) = adapter();
        let doomed: Arc<Mutex<Option<Subscription>>> = Arc::new(Mutex::new(None));
        let slot = doomed.clone();
        // registered first, so it runs before the other listener on each signal
        let _releaser = adapter.subscribe(move |_: Vec<Vote>| {
            slot.lock().unwrap().take();
        });
        let (subscription, seen) = record::<Vote>(&adapter);
        *doomed.lock().unwrap() = Some(subscription);

        assert!(adapter.save(&vote("p1", "p2")).await);

        assert!(doomed.lock().unwrap().is_none());
        assert_eq!(seen.lock().unwrap().len(), 1);
    }
}

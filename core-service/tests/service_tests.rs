//! Service bootstrap and plugin lifecycle.

use async_trait::async_trait;
use core_runtime::config::CoreConfig;
use core_runtime::events::{CoreEvent, PluginEvent};
use core_playback::PlayerState;
use core_service::{CoreService, PluginRegistry};
use mockall::{mock, predicate::*};
use plugin_traits::{
    ConfigScope, ConfigStorageAdapter, MemoryConfigStorage, NoResource, Playback,
    PlaybackCompletion, Plugin, PluginError, ProgressFeedback, Provider, Resource, Result, Song,
    Suggester, User,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

mock! {
    pub Feedback {}

    impl ProgressFeedback for Feedback {
        fn state(&self, message: &str);
        fn warning(&self, message: &str);
    }
}

fn quiet_feedback() -> MockFeedback {
    let mut feedback = MockFeedback::new();
    feedback.expect_state().return_const(());
    feedback.expect_warning().return_const(());
    feedback
}

fn song(id: &str) -> Song {
    Song::builder(id, "local")
        .title(format!("Track {id}"))
        .build()
        .unwrap()
}

#[derive(Default)]
struct SilentPlayback {
    completion: PlaybackCompletion,
}

#[async_trait]
impl Playback for SilentPlayback {
    async fn play(&self) -> Result<()> {
        Ok(())
    }

    async fn pause(&self) -> Result<()> {
        Ok(())
    }

    async fn wait_for_finish(&self) {
        self.completion.wait().await;
    }

    async fn close(&self) -> Result<()> {
        self.completion.finish();
        Ok(())
    }
}

#[derive(Default)]
struct LocalProvider {
    closed: AtomicBool,
}

#[async_trait]
impl Plugin for LocalProvider {
    fn id(&self) -> &str {
        "local"
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

#[async_trait]
impl Provider for LocalProvider {
    async fn search(&self, _query: &str, _offset: usize) -> Result<Vec<Song>> {
        Ok(Vec::new())
    }

    async fn lookup(&self, song_id: &str) -> Result<Song> {
        Ok(song(song_id))
    }

    async fn load_song(&self, _song: &Song) -> Result<Arc<dyn Resource>> {
        Ok(Arc::new(NoResource))
    }

    async fn supply_playback(
        &self,
        _song: &Song,
        _resource: Arc<dyn Resource>,
    ) -> Result<Arc<dyn Playback>> {
        Ok(Arc::new(SilentPlayback::default()))
    }
}

/// Needs an `api_key` setting to come up.
struct RemoteSuggester;

#[async_trait]
impl Plugin for RemoteSuggester {
    fn id(&self) -> &str {
        "remote"
    }

    async fn configure(&self, config: &HashMap<String, String>) -> Result<()> {
        if config.contains_key("api_key") {
            Ok(())
        } else {
            Err(PluginError::Configuration("missing api_key".into()))
        }
    }
}

#[async_trait]
impl Suggester for RemoteSuggester {
    async fn suggest_next(&self) -> Result<Song> {
        Ok(song("suggested"))
    }

    async fn next_suggestions(&self, max: usize) -> Result<Vec<Song>> {
        Ok(vec![song("suggested"); max.min(1)])
    }

    async fn remove_suggestion(&self, _song: &Song) -> Result<()> {
        Ok(())
    }
}

#[tokio::test]
async fn test_registry_disables_failing_plugin() {
    let registry = PluginRegistry::new();
    registry.register_provider(Arc::new(LocalProvider::default()));
    registry.register_suggester(Arc::new(RemoteSuggester));

    let mut feedback = MockFeedback::new();
    feedback.expect_state().return_const(());
    feedback
        .expect_warning()
        .with(function(|message: &str| message.contains("remote")))
        .times(1)
        .return_const(());

    let report = registry.initialize_all(None, &feedback).await;

    assert_eq!(report.initialized, vec!["local".to_string()]);
    assert_eq!(report.disabled.len(), 1);
    assert_eq!(report.disabled[0].0, "remote");
    assert!(registry.suggester_ids().is_empty());
    assert_eq!(registry.provider_ids().len(), 1);
}

#[tokio::test]
async fn test_plugin_config_comes_from_its_scope() {
    let storage = MemoryConfigStorage::new();
    storage
        .store(
            &ConfigScope::Plugin("remote".into()),
            &HashMap::from([("api_key".to_string(), "secret".to_string())]),
        )
        .await
        .unwrap();

    let registry = PluginRegistry::new();
    registry.register_suggester(Arc::new(RemoteSuggester));

    let report = registry
        .initialize_all(Some(&storage as &dyn ConfigStorageAdapter), &quiet_feedback())
        .await;

    assert_eq!(report.initialized, vec!["remote".to_string()]);
    assert!(report.disabled.is_empty());
}

#[tokio::test]
async fn test_from_registry_drops_failing_suggester() {
    let registry = Arc::new(PluginRegistry::new());
    registry.register_provider(Arc::new(LocalProvider::default()));
    registry.register_suggester(Arc::new(RemoteSuggester));

    let core = CoreService::from_registry(
        Arc::clone(&registry),
        CoreConfig::builder().suggester_id("remote"),
        &quiet_feedback(),
    )
    .await
    .unwrap();

    // The disabled suggester is gone before the player is built.
    assert!(core.suggester().is_none());
    assert!(registry.suggester_ids().is_empty());

    core.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_bootstrap_applies_stored_settings() {
    let storage = Arc::new(MemoryConfigStorage::new());
    storage
        .store(
            &ConfigScope::General,
            &HashMap::from([
                ("player.history_capacity".to_string(), "2".to_string()),
                ("cache.max_entries".to_string(), "8".to_string()),
            ]),
        )
        .await
        .unwrap();

    let registry = Arc::new(PluginRegistry::new());
    registry.register_provider(Arc::new(LocalProvider::default()));
    let config = CoreConfig::builder()
        .plugin_lookup(registry)
        .config_storage(storage)
        .build()
        .unwrap();

    let core = CoreService::bootstrap(config).await.unwrap();

    assert_eq!(core.config().player.history_capacity, 2);
    assert_eq!(core.config().cache.max_entries, 8);
    assert_eq!(core.history().capacity(), 2);

    core.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_bootstrap_rejects_malformed_setting() {
    let storage = Arc::new(MemoryConfigStorage::new());
    storage
        .store(
            &ConfigScope::General,
            &HashMap::from([("cache.max_entries".to_string(), "lots".to_string())]),
        )
        .await
        .unwrap();

    let config = CoreConfig::builder()
        .plugin_lookup(Arc::new(PluginRegistry::new()))
        .config_storage(storage)
        .build()
        .unwrap();

    let result = CoreService::bootstrap(config).await;

    assert!(matches!(
        result,
        Err(core_service::CoreError::Runtime(
            core_runtime::Error::InvalidSetting { .. }
        ))
    ));
}

#[tokio::test]
async fn test_enqueue_play_and_shutdown() {
    let provider = Arc::new(LocalProvider::default());
    let registry = Arc::new(PluginRegistry::new());
    registry.register_provider(provider.clone());

    let core = CoreService::from_registry(
        Arc::clone(&registry),
        CoreConfig::builder(),
        &quiet_feedback(),
    )
    .await
    .unwrap();
    let mut events = core.event_bus().subscribe();
    let mut states = core.player().subscribe();

    // a song enqueued while stopped starts playing on its own
    assert!(core.enqueue(song("1"), User::new("alice")));
    let state = tokio::time::timeout(
        Duration::from_secs(5),
        states.wait_for(|state| matches!(state, PlayerState::Play(_))),
    )
    .await
    .unwrap()
    .unwrap()
    .clone();
    assert_eq!(state.entry().map(|entry| entry.song().id()), Some("1"));
    assert!(core.queue().is_empty());

    tokio::time::timeout(Duration::from_secs(5), async {
        while core.history().is_empty() {
            tokio::task::yield_now().await;
        }
    })
    .await
    .unwrap();

    core.shutdown().await.unwrap();
    assert!(core.player().is_closed());
    assert!(core.cache().is_closed());
    assert!(provider.closed.load(Ordering::SeqCst));

    let mut saw_close = false;
    while let Ok(event) = events.try_recv() {
        if let CoreEvent::Plugin(PluginEvent::Closed { plugin_id }) = event {
            saw_close |= plugin_id == "local";
        }
    }
    assert!(saw_close);
}

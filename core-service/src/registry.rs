//! In-memory plugin registry.
//!
//! The host discovers and constructs plugins; the registry only keeps them by
//! id, runs their lifecycle and drops the ones that fail to come up.

use core_runtime::events::{CoreEvent, EventBus, PluginEvent};
use parking_lot::RwLock;
use plugin_traits::{
    ConfigScope, ConfigStorageAdapter, Plugin, PluginLookup, ProgressFeedback, Provider,
    ProviderId, Result as PluginResult, Suggester,
};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Outcome of [`PluginRegistry::initialize_all`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InitReport {
    pub initialized: Vec<String>,
    /// Plugin id and the reason it was disabled.
    pub disabled: Vec<(String, String)>,
}

/// Providers and suggesters by id.
#[derive(Default)]
pub struct PluginRegistry {
    providers: RwLock<BTreeMap<ProviderId, Arc<dyn Provider>>>,
    suggesters: RwLock<BTreeMap<String, Arc<dyn Suggester>>>,
    event_bus: RwLock<Option<Arc<EventBus>>>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set event bus for plugin lifecycle events.
    pub fn with_event_bus(self, event_bus: Arc<EventBus>) -> Self {
        self.set_event_bus(event_bus);
        self
    }

    /// Publish lifecycle events on `event_bus` from now on.
    pub fn set_event_bus(&self, event_bus: Arc<EventBus>) {
        *self.event_bus.write() = Some(event_bus);
    }

    /// Register a provider under its provider id, replacing any previous one.
    pub fn register_provider(&self, provider: Arc<dyn Provider>) {
        let id = provider.provider_id();
        debug!(provider = %id, "Registering provider");
        if self.providers.write().insert(id.clone(), provider).is_some() {
            warn!(provider = %id, "Replaced provider with the same id");
        }
    }

    /// Register a suggester under its plugin id, replacing any previous one.
    pub fn register_suggester(&self, suggester: Arc<dyn Suggester>) {
        let id = suggester.id().to_string();
        debug!(suggester = %id, "Registering suggester");
        if self.suggesters.write().insert(id.clone(), suggester).is_some() {
            warn!(suggester = %id, "Replaced suggester with the same id");
        }
    }

    pub fn provider_ids(&self) -> Vec<ProviderId> {
        self.providers.read().keys().cloned().collect()
    }

    pub fn suggester_ids(&self) -> Vec<String> {
        self.suggesters.read().keys().cloned().collect()
    }

    /// Configure and initialize every registered plugin.
    ///
    /// Each plugin gets the entries of its own [`ConfigScope::Plugin`] scope.
    /// A plugin that fails is reported through `feedback`, removed from the
    /// registry and listed in the report; the others are not affected.
    pub async fn initialize_all(
        &self,
        storage: Option<&dyn ConfigStorageAdapter>,
        feedback: &dyn ProgressFeedback,
    ) -> InitReport {
        let providers: Vec<_> = self
            .providers
            .read()
            .iter()
            .map(|(id, provider)| (id.clone(), Arc::clone(provider)))
            .collect();
        let suggesters: Vec<_> = self
            .suggesters
            .read()
            .iter()
            .map(|(id, suggester)| (id.clone(), Arc::clone(suggester)))
            .collect();

        let mut report = InitReport::default();

        for (id, provider) in providers {
            match bring_up(provider.as_ref(), storage, feedback).await {
                Ok(()) => self.initialized(provider.id(), &mut report),
                Err(reason) => {
                    self.providers.write().remove(&id);
                    self.disabled(provider.id(), reason, feedback, &mut report);
                }
            }
        }

        for (id, suggester) in suggesters {
            match bring_up(suggester.as_ref(), storage, feedback).await {
                Ok(()) => self.initialized(&id, &mut report),
                Err(reason) => {
                    self.suggesters.write().remove(&id);
                    self.disabled(&id, reason, feedback, &mut report);
                }
            }
        }

        info!(
            initialized = report.initialized.len(),
            disabled = report.disabled.len(),
            "Plugins initialized"
        );
        report
    }

    /// Close every plugin, logging failures.
    pub async fn close_all(&self) {
        let providers: Vec<_> = self.providers.read().values().cloned().collect();
        let suggesters: Vec<_> = self.suggesters.read().values().cloned().collect();

        for provider in providers {
            let result = provider.close().await;
            self.closed(provider.id(), result);
        }
        for suggester in suggesters {
            let result = suggester.close().await;
            self.closed(suggester.id(), result);
        }
    }

    fn initialized(&self, id: &str, report: &mut InitReport) {
        debug!(plugin = id, "Plugin initialized");
        report.initialized.push(id.to_string());
        self.emit(PluginEvent::Initialized {
            plugin_id: id.to_string(),
        });
    }

    fn disabled(
        &self,
        id: &str,
        reason: String,
        feedback: &dyn ProgressFeedback,
        report: &mut InitReport,
    ) {
        warn!(plugin = id, reason = %reason, "Disabling plugin");
        feedback.warning(&format!("Plugin {id} was disabled: {reason}"));
        self.emit(PluginEvent::Disabled {
            plugin_id: id.to_string(),
            reason: reason.clone(),
        });
        report.disabled.push((id.to_string(), reason));
    }

    fn closed(&self, id: &str, result: PluginResult<()>) {
        if let Err(e) = result {
            warn!(plugin = id, error = %e, "Failed to close plugin");
        }
        self.emit(PluginEvent::Closed {
            plugin_id: id.to_string(),
        });
    }

    fn emit(&self, event: PluginEvent) {
        if let Some(bus) = self.event_bus.read().as_ref() {
            let _ = bus.emit(CoreEvent::Plugin(event));
        }
    }
}

/// Load the plugin's config, configure and initialize it.
async fn bring_up<P>(
    plugin: &P,
    storage: Option<&dyn ConfigStorageAdapter>,
    feedback: &dyn ProgressFeedback,
) -> std::result::Result<(), String>
where
    P: Plugin + ?Sized,
{
    feedback.state(&format!("Initializing {}", plugin.name()));

    let config = match storage {
        Some(storage) => storage
            .load(&ConfigScope::Plugin(plugin.id().to_string()))
            .await
            .map_err(|e| format!("config could not be loaded: {e}"))?,
        None => HashMap::new(),
    };

    plugin
        .configure(&config)
        .await
        .map_err(|e| e.to_string())?;
    plugin.initialize(feedback).await.map_err(|e| e.to_string())
}

impl PluginLookup for PluginRegistry {
    fn provider(&self, id: &ProviderId) -> Option<Arc<dyn Provider>> {
        self.providers.read().get(id).cloned()
    }

    fn suggester(&self, id: &str) -> Option<Arc<dyn Suggester>> {
        self.suggesters.read().get(id).cloned()
    }
}

impl fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginRegistry")
            .field("providers", &self.provider_ids())
            .field("suggesters", &self.suggester_ids())
            .finish()
    }
}

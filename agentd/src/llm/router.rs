//! Model router: logical model id → adapter

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::debug;

use super::{AnthropicClient, LlmClient, LlmError, OpenAIClient};
use crate::config::{Config, ProviderKind};

/// Static lookup table built once at startup
///
/// Each model maps to exactly one adapter; adapters are shared between the
/// models of the same vendor.
#[derive(Default, Clone)]
pub struct ModelRouter {
    routes: BTreeMap<String, Arc<dyn LlmClient>>,
}

impl ModelRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the table from the `models` and `providers` configuration
    ///
    /// Only vendors referenced by at least one model get an adapter.
    pub fn from_config(config: &Config) -> Result<Self, LlmError> {
        debug!(model_count = config.models.len(), "ModelRouter::from_config: called");
        let mut adapters: BTreeMap<ProviderKind, Arc<dyn LlmClient>> = BTreeMap::new();
        let mut router = Self::new();

        for (model, kind) in &config.models {
            let adapter = match adapters.get(kind) {
                Some(adapter) => adapter.clone(),
                None => {
                    debug!(provider = %kind, "ModelRouter::from_config: creating adapter");
                    let adapter: Arc<dyn LlmClient> = match kind {
                        ProviderKind::OpenAi => Arc::new(OpenAIClient::from_config(&config.providers.openai)?),
                        ProviderKind::Anthropic => Arc::new(AnthropicClient::from_config(&config.providers.anthropic)?),
                        ProviderKind::OpenRouter => Arc::new(OpenAIClient::openrouter(&config.providers.openrouter)?),
                    };
                    adapters.insert(*kind, adapter.clone());
                    adapter
                }
            };
            router.register(model.clone(), adapter);
        }

        Ok(router)
    }

    /// Map a model to an adapter, returning the adapter it replaced
    pub fn register(&mut self, model: impl Into<String>, client: Arc<dyn LlmClient>) -> Option<Arc<dyn LlmClient>> {
        let model = model.into();
        debug!(%model, provider = %client.provider_name(), "ModelRouter::register: called");
        self.routes.insert(model, client)
    }

    /// Builder form of [`register`](Self::register)
    pub fn with_model(mut self, model: impl Into<String>, client: Arc<dyn LlmClient>) -> Self {
        self.register(model, client);
        self
    }

    /// Get the adapter responsible for a model
    pub fn resolve(&self, model: &str) -> Result<Arc<dyn LlmClient>, LlmError> {
        self.routes.get(model).cloned().ok_or_else(|| {
            debug!(%model, "ModelRouter::resolve: no adapter");
            LlmError::UnknownModel(model.to_string())
        })
    }

    /// All routable model ids, sorted
    pub fn list_models(&self) -> Vec<String> {
        self.routes.keys().cloned().collect()
    }

    /// Vendor name for a model, if routable
    pub fn provider_name_for(&self, model: &str) -> Option<&str> {
        self.routes.get(model).map(|client| client.provider_name())
    }

    pub fn contains(&self, model: &str) -> bool {
        self.routes.contains_key(model)
    }
}

impl std::fmt::Debug for ModelRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_map()
            .entries(self.routes.iter().map(|(model, client)| (model, client.provider_name())))
            .finish()
    }
}

use std::sync::Arc;

use docchat_cache::CacheLayer;
use docchat_context::ContextSelector;
use docchat_llm::{Generator, Retriever};
use docchat_persist::{InMemoryMessageStore, MessageStore};

use crate::assembler::AnswerAssembler;
use crate::config::Settings;
use crate::error::{EngineError, Result};
use crate::service::ChatService;
use crate::stats::StatisticsAggregator;

pub struct ChatServiceBuilder {
    settings: Settings,
    store: Option<Arc<dyn MessageStore>>,
    cache: Option<CacheLayer>,
    retriever: Option<Arc<dyn Retriever>>,
    generator: Option<Arc<dyn Generator>>,
}

impl ChatServiceBuilder {
    pub fn new() -> Self {
        Self {
            settings: Settings::default(),
            store: None,
            cache: None,
            retriever: None,
            generator: None,
        }
    }

    pub fn settings(mut self, settings: Settings) -> Self {
        self.settings = settings;
        self
    }

    /// Defaults to an in-memory store
    pub fn store(mut self, store: Arc<dyn MessageStore>) -> Self {
        self.store = Some(store);
        self
    }

    #[cfg(feature = "mongodb")]
    pub async fn mongodb(mut self, uri: &str, database: &str) -> Result<Self> {
        let store = docchat_persist::MongoMessageStore::connect(uri, database).await?;
        self.store = Some(Arc::new(store));
        Ok(self)
    }

    /// Defaults to an in-memory cache built from the `[cache]` settings
    pub fn cache(mut self, cache: CacheLayer) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn retriever(mut self, retriever: Arc<dyn Retriever>) -> Self {
        self.retriever = Some(retriever);
        self
    }

    pub fn generator(mut self, generator: Arc<dyn Generator>) -> Self {
        self.generator = Some(generator);
        self
    }

    /// Use the OpenAI-compatible generator described by the `[generator]` settings
    pub fn openai_generator(mut self) -> Result<Self> {
        let generator = self.settings.generator.openai()?;
        self.generator = Some(Arc::new(generator));
        Ok(self)
    }

    pub fn build(self) -> Result<ChatService> {
        let retriever = self
            .retriever
            .ok_or_else(|| EngineError::Configuration("retriever is required".to_string()))?;
        let generator = self
            .generator
            .ok_or_else(|| EngineError::Configuration("generator is required".to_string()))?;
        let store = self
            .store
            .unwrap_or_else(|| Arc::new(InMemoryMessageStore::new()) as Arc<dyn MessageStore>);
        let cache = self
            .cache
            .unwrap_or_else(|| CacheLayer::from_config(&self.settings.cache));

        Ok(ChatService {
            selector: ContextSelector::new(store.clone()),
            store,
            cache,
            retriever,
            generator,
            assembler: AnswerAssembler::new(&self.settings.answer),
            aggregator: StatisticsAggregator::new(&self.settings.stats, &self.settings.answer),
            generator_timeout: self.settings.answer.generator_timeout(),
            context: self.settings.context,
        })
    }
}

impl Default for ChatServiceBuilder {
    fn default() -> Self {
        Self::new()
    }
}

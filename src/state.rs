use std::sync::Arc;
use tokio::task::JoinHandle;

use crate::{
    config::{EngineConfig, WsConfig},
    services::{
        audit::{AuditSink, QueuedAuditSink, TracingAuditSink},
        channel_service::ChannelService,
        conversation_service::ConversationService,
        engagement::EngagementService,
        group_service::GroupService,
        message_service::MessageService,
        read_tracker::ReadTracker,
    },
    store::{ChatStore, MemoryStore},
    websocket::ConnectionRegistry,
};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn ChatStore>,
    pub registry: ConnectionRegistry,
    pub audit: QueuedAuditSink,
    pub engine: Arc<EngineConfig>,
    pub ws: WsConfig,
    pub conversations: ConversationService,
    pub messages: MessageService,
    pub reads: ReadTracker,
    pub groups: GroupService,
    pub channels: ChannelService,
    pub engagement: EngagementService,
}

impl AppState {
    /// Wire every service over one store and one room registry.
    ///
    /// Spawns the audit worker, so it must run inside a tokio runtime.
    pub fn new(
        store: Arc<dyn ChatStore>,
        audit_sink: Arc<dyn AuditSink>,
        audit_capacity: usize,
        engine: EngineConfig,
        ws: WsConfig,
    ) -> (Self, JoinHandle<()>) {
        let engine = Arc::new(engine);
        let registry = ConnectionRegistry::new();
        let (audit, audit_worker) = QueuedAuditSink::spawn(audit_sink, audit_capacity);

        let conversations = ConversationService::new(store.clone(), audit.clone());
        let messages = MessageService::new(
            store.clone(),
            conversations.clone(),
            registry.clone(),
            audit.clone(),
            engine.clone(),
        );
        let reads = ReadTracker::new(store.clone(), conversations.clone(), registry.clone());
        let groups = GroupService::new(store.clone(), audit.clone());
        let channels = ChannelService::new(store.clone(), audit.clone(), engine.clone());
        let engagement = EngagementService::new(
            store.clone(),
            conversations.clone(),
            messages.clone(),
            registry.clone(),
            audit.clone(),
            engine.clone(),
        );

        let state = Self {
            store,
            registry,
            audit,
            engine,
            ws,
            conversations,
            messages,
            reads,
            groups,
            channels,
            engagement,
        };
        (state, audit_worker)
    }

    /// Memory-backed state with audit records going to the log.
    pub fn in_memory(engine: EngineConfig) -> Self {
        let (state, _worker) = Self::new(
            Arc::new(MemoryStore::new()),
            Arc::new(TracingAuditSink),
            1024,
            engine,
            WsConfig::default(),
        );
        state
    }
}

// Pillar node assembly
//
// Builds the handler context and mediator from a configuration. The
// transport-facing pieces are injected so tests and embedders can swap the
// HTTP implementations for in-process ones.

use crate::alarm::{AlarmDispatcher, AlarmPolicy, BusAlarmDispatcher};
use crate::audit::{AuditTrailManager, MemoryAuditTrail};
use crate::bus::{HttpMessageBus, MessageBus};
use crate::config::{ArchiveType, CacheType, PillarConfig};
use crate::error::Result;
use crate::exchange::{FileExchange, HttpFileExchange};
use crate::handlers::HandlerContext;
use crate::mediator::PillarMediator;
use crate::response::ResponseFactory;
use crate::storage::locks::FileLocks;
use crate::storage::{
    ChecksumStore, FileArchive, FileSystemArchive, MemoryArchive, MemoryChecksumStore,
    SqliteChecksumStore, StorageModel,
};
use std::sync::Arc;
use tracing::info;

/// Collaborators a pillar talks to outside its own storage
pub struct Components {
    pub bus: Arc<dyn MessageBus>,
    pub exchange: Arc<dyn FileExchange>,
    pub alarms: Arc<dyn AlarmDispatcher>,
    pub audit: Arc<dyn AuditTrailManager>,
}

/// A running pillar: configuration plus its mediator
pub struct PillarNode {
    config: Arc<PillarConfig>,
    mediator: Arc<PillarMediator>,
}

impl PillarNode {
    /// Builds a node with HTTP transports, as configured.
    pub fn from_config(config: PillarConfig) -> Result<Self> {
        let bus: Arc<dyn MessageBus> = Arc::new(HttpMessageBus::new(
            config.exchange_timeout(),
            config.pillar.alarm_destination.clone(),
        )?);
        let components = Components {
            alarms: Arc::new(BusAlarmDispatcher::new(bus.clone())),
            bus,
            exchange: Arc::new(HttpFileExchange::new(config.exchange_timeout())?),
            audit: Arc::new(MemoryAuditTrail::new(config.pillar.pillar_id.clone())),
        };
        let archive = Self::open_archive(&config)?;
        let cache = Self::open_cache(&config)?;
        Self::assemble(config, archive, cache, components)
    }

    /// Builds a node around the given storage and collaborators. `archive`
    /// is ignored for a checksum pillar.
    pub fn assemble(
        config: PillarConfig,
        archive: Arc<dyn FileArchive>,
        cache: Arc<dyn ChecksumStore>,
        components: Components,
    ) -> Result<Self> {
        config.validate()?;
        let default_spec = config.default_checksum_spec()?;

        let model = if config.is_checksum_pillar() {
            StorageModel::checksum_only(cache, default_spec)
        } else {
            StorageModel::full(archive, cache, default_spec, config.pillar.min_size_left)
        };

        let pillar_id = config.pillar.pillar_id.clone();
        info!(
            "Assembling {:?} pillar '{}' for collections {:?}",
            config.pillar.pillar_type, pillar_id, config.pillar.collection_ids
        );

        let config = Arc::new(config);
        let ctx = HandlerContext {
            model,
            responses: ResponseFactory::new(
                pillar_id.clone(),
                config.pillar.receiver_destination.clone(),
            ),
            bus: components.bus,
            exchange: components.exchange,
            alarms: AlarmPolicy::new(config.pillar.alarm_level, pillar_id, components.alarms),
            audit: components.audit,
            locks: FileLocks::new(),
            config: config.clone(),
        };

        Ok(Self {
            config,
            mediator: Arc::new(PillarMediator::new(Arc::new(ctx))),
        })
    }

    fn open_archive(config: &PillarConfig) -> Result<Arc<dyn FileArchive>> {
        Ok(match config.storage.archive {
            ArchiveType::Filesystem => Arc::new(FileSystemArchive::new(
                &config.storage.archive_dir,
                &config.pillar.collection_ids,
            )?),
            ArchiveType::Memory => Arc::new(MemoryArchive::new(config.storage.memory_capacity)),
        })
    }

    fn open_cache(config: &PillarConfig) -> Result<Arc<dyn ChecksumStore>> {
        Ok(match config.checksum.cache {
            CacheType::Memory => Arc::new(MemoryChecksumStore::new()),
            CacheType::Sqlite => {
                Arc::new(SqliteChecksumStore::new(config.checksum.database_path.clone())?)
            }
        })
    }

    pub fn config(&self) -> &PillarConfig {
        &self.config
    }

    pub fn mediator(&self) -> Arc<PillarMediator> {
        self.mediator.clone()
    }
}

use log::{debug, info};
use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use crate::dialect::Dialect;
use crate::error::{Error, Result};
use crate::provider::{Provider, ProviderRegistry};
use crate::sql::SqlGenerationHelper;
use crate::storage::{ConnectionPool, ConnectionSettings, RelationalConnection, SessionPool};
use crate::types::{TypeMapper, TypeMapping};
use crate::update::{BatchExecutor, CommandBatchBuilder};

pub const DEFAULT_MAX_BATCH_SIZE: usize = 1000;

/// The services a provider hands to the host, wired once at startup.
///
/// The type mapper is frozen at build time and shared; builders and
/// connections are created per unit of work.
pub struct ProviderServices {
    provider: String,
    mapper: Arc<TypeMapper>,
    helper: SqlGenerationHelper,
    pool: Option<Arc<dyn ConnectionPool>>,
    settings: ConnectionSettings,
    max_batch_size: usize,
    retry_connection_lost: bool,
}

impl ProviderServices {
    /// Start wiring the services of `provider`.
    pub fn builder(provider: &dyn Provider) -> Result<ProviderServicesBuilder> {
        let mut mapper = TypeMapper::new();
        provider.register_type_mappings(&mut mapper)?;
        Ok(ProviderServicesBuilder {
            provider: provider.name().to_string(),
            dialect: provider.dialect(),
            mapper,
            pool: None,
            settings: ConnectionSettings::default(),
            max_batch_size: DEFAULT_MAX_BATCH_SIZE,
            retry_connection_lost: true,
        })
    }

    /// Wire the provider named in `config`. A pool is created when a DSN is
    /// known, either `dsn` or the one from the `[connection]` table.
    pub fn from_config(
        registry: &ProviderRegistry,
        config: &Config,
        dsn: Option<&str>,
    ) -> Result<Self> {
        let name = config.settings.provider.as_str();
        let provider = registry
            .get(name)
            .ok_or_else(|| Error::Config(format!("unknown provider '{}'", name)))?;
        let mut builder = Self::builder(provider)?
            .connection_settings(config.connection_settings())
            .max_batch_size(config.batch.max_batch_size)
            .retry_connection_lost(config.batch.retry_connection_lost);
        if let Some(overrides) = &config.dialect {
            builder = builder.dialect(overrides.apply(provider.dialect()));
        }
        if let Some(dsn) = dsn.or(config.connection.dsn.as_deref()) {
            let connector = provider.connector(dsn)?;
            let pool = SessionPool::with_connect_timeout(
                connector,
                config.connection.pool_size,
                config.connection_settings().checkout_timeout,
            );
            builder = builder.pool(Arc::new(pool));
        }
        builder.build()
    }

    pub fn provider_name(&self) -> &str {
        &self.provider
    }

    pub fn type_mapper(&self) -> &Arc<TypeMapper> {
        &self.mapper
    }

    pub fn sql_helper(&self) -> &SqlGenerationHelper {
        &self.helper
    }

    pub fn max_batch_size(&self) -> usize {
        self.max_batch_size
    }

    /// A fresh builder for one batch.
    pub fn batch_builder(&self) -> CommandBatchBuilder {
        CommandBatchBuilder::new(self.helper.clone(), self.max_batch_size)
    }

    pub fn batch_executor(&self) -> BatchExecutor {
        if self.retry_connection_lost {
            BatchExecutor::new()
        } else {
            BatchExecutor::without_retry()
        }
    }

    /// A new connection handle over the shared pool.
    pub fn connection(&self) -> Result<RelationalConnection> {
        let pool = self
            .pool
            .as_ref()
            .ok_or_else(|| Error::Config("no connection pool configured".into()))?;
        Ok(RelationalConnection::new(Arc::clone(pool), self.settings))
    }
}

/// Collects overrides before the type mapper is frozen.
pub struct ProviderServicesBuilder {
    provider: String,
    dialect: Dialect,
    mapper: TypeMapper,
    pool: Option<Arc<dyn ConnectionPool>>,
    settings: ConnectionSettings,
    max_batch_size: usize,
    retry_connection_lost: bool,
}

impl ProviderServicesBuilder {
    pub fn dialect(mut self, dialect: Dialect) -> Self {
        self.dialect = dialect;
        self
    }

    /// Register an extra type mapping on top of the provider's own.
    pub fn type_mapping(mut self, mapping: TypeMapping) -> Result<Self> {
        self.mapper.register(mapping)?;
        Ok(self)
    }

    pub fn pool(mut self, pool: Arc<dyn ConnectionPool>) -> Self {
        self.pool = Some(pool);
        self
    }

    pub fn connection_settings(mut self, settings: ConnectionSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn command_timeout(mut self, timeout: Duration) -> Self {
        self.settings.command_timeout = Some(timeout);
        self
    }

    pub fn max_batch_size(mut self, size: usize) -> Self {
        self.max_batch_size = size;
        self
    }

    pub fn retry_connection_lost(mut self, retry: bool) -> Self {
        self.retry_connection_lost = retry;
        self
    }

    pub fn build(self) -> Result<ProviderServices> {
        if self.max_batch_size == 0 {
            return Err(Error::Config("max_batch_size must be at least 1".into()));
        }
        if self.dialect.max_parameters == 0 {
            return Err(Error::Config(format!(
                "dialect '{}' allows no bind parameters",
                self.dialect.name
            )));
        }
        if self.dialect.max_identifier_length == 0 {
            return Err(Error::Config(format!(
                "dialect '{}' allows no identifiers",
                self.dialect.name
            )));
        }
        debug!(
            "dialect {}: {} placeholders, multi-row {}",
            self.dialect.name, self.dialect.placeholder, self.dialect.multi_row
        );
        let mapper = Arc::new(self.mapper);
        let helper = SqlGenerationHelper::new(self.dialect, Arc::clone(&mapper));
        info!(
            "provider '{}' ready ({} type mappings)",
            self.provider,
            mapper.mappings().count()
        );
        Ok(ProviderServices {
            provider: self.provider,
            mapper,
            helper,
            pool: self.pool,
            settings: self.settings,
            max_batch_size: self.max_batch_size,
            retry_connection_lost: self.retry_connection_lost,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::provider::get_default_provider_registry;
    use crate::test_support::{apply_configuration, scripted_pool};
    use crate::types::{ColumnType, NativeType};
    use crate::update::CommandOperation;

    fn postgres() -> ProviderServicesBuilder {
        let registry = get_default_provider_registry();
        ProviderServices::builder(registry.get("postgres").unwrap()).unwrap()
    }

    #[test]
    fn connection_requires_a_pool() {
        let services = postgres().build().unwrap();
        assert_eq!(services.connection().err().unwrap().kind(), ErrorKind::Config);
    }

    #[test]
    fn test_configuration_hook_is_a_no_op() {
        let (pool, _handle) = scripted_pool(1);
        let services = apply_configuration(postgres().pool(pool)).build().unwrap();
        assert_eq!(services.provider_name(), "postgres");
        assert_eq!(services.max_batch_size(), DEFAULT_MAX_BATCH_SIZE);
        assert!(services.connection().is_ok());
    }

    #[test]
    fn conflicting_extra_mapping_is_rejected() {
        let err = postgres()
            .type_mapping(TypeMapping::new(ColumnType::Integer, NativeType::I32, "integer"))
            .err()
            .unwrap();
        assert_eq!(err.kind(), ErrorKind::DuplicateMapping);
    }

    #[test]
    fn zero_batch_size_is_rejected() {
        let err = postgres().max_batch_size(0).build().err().unwrap();
        assert_eq!(err.kind(), ErrorKind::Config);
    }

    #[test]
    fn dialect_override_changes_grouping() {
        let services = postgres().dialect(Dialect::ansi()).build().unwrap();
        let mut builder = services.batch_builder();
        for id in 0..3 {
            builder
                .append(CommandOperation::insert("t").value("id", crate::types::TypedValue::integer(id)))
                .unwrap();
        }
        assert_eq!(builder.build().unwrap().round_trips(), 3);
    }
}

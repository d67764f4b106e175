use arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use lancedb::{Connection, Table};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, error, info};

use super::{Collection, UPDATED_AT_COLUMN, VECTOR_COLUMN, map_store_error};
use crate::config::Config;
use crate::{RecommenderError, Result};

/// Process-wide handle on the LanceDB connection.
///
/// Built once at start-up and shared by every store and index through an
/// `Arc`. The underlying connection is established on the first call to
/// [`StoreClient::connect`] and reused afterwards.
pub struct StoreClient {
    uri: String,
    connection: OnceCell<Connection>,
}

impl StoreClient {
    /// Create an unconnected client for the given URI
    #[inline]
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            connection: OnceCell::new(),
        }
    }

    /// Resolve the store location from configuration and connect
    ///
    /// Local paths are created if missing; URIs with a scheme (`s3://`,
    /// `gs://`, ...) are passed to LanceDB untouched.
    #[inline]
    pub async fn open(config: &Config) -> Result<Self> {
        let uri = match config.store.uri.as_deref() {
            Some(uri) if uri.contains("://") => uri.to_string(),
            Some(path) => Self::prepare_local_path(Path::new(path))?,
            None => Self::prepare_local_path(&config.vector_database_path())?,
        };

        let client = Self::new(uri);
        client.connect().await?;
        Ok(client)
    }

    fn prepare_local_path(path: &Path) -> Result<String> {
        std::fs::create_dir_all(path).map_err(|e| {
            RecommenderError::Database(format!(
                "Failed to create vector database directory {}: {}",
                path.display(),
                e
            ))
        })?;
        Ok(format!("file://{}", path.display()))
    }

    #[inline]
    pub fn uri(&self) -> &str {
        &self.uri
    }

    #[inline]
    pub fn is_connected(&self) -> bool {
        self.connection.initialized()
    }

    /// Establish the connection, or return the existing one
    #[inline]
    pub async fn connect(&self) -> Result<&Connection> {
        self.connection
            .get_or_try_init(|| async {
                debug!("Connecting to LanceDB at {}", self.uri);
                let connection = lancedb::connect(&self.uri).execute().await.map_err(|e| {
                    error!("Failed to connect to LanceDB at {}: {}", self.uri, e);
                    RecommenderError::StoreUnavailable(format!(
                        "Failed to connect to LanceDB at {}: {}",
                        self.uri, e
                    ))
                })?;
                info!("Connected to vector store at {}", self.uri);
                Ok::<_, RecommenderError>(connection)
            })
            .await
    }

    #[inline]
    pub async fn table_names(&self) -> Result<Vec<String>> {
        self.connect()
            .await?
            .table_names()
            .execute()
            .await
            .map_err(|e| RecommenderError::StoreUnavailable(format!("Failed to list tables: {}", e)))
    }

    /// Open the latest version of a collection's table
    pub(crate) async fn open_table(&self, collection: Collection) -> Result<Table> {
        self.connect()
            .await?
            .open_table(collection.table_name())
            .execute()
            .await
            .map_err(|e| {
                map_store_error(
                    format_args!("Failed to open {} table", collection.table_name()),
                    e,
                )
            })
    }

    /// Create the collection's table if missing, or check its dimension
    pub(crate) async fn ensure_collection(
        &self,
        collection: Collection,
        dimension: usize,
    ) -> Result<()> {
        let table_names = self.table_names().await?;

        if table_names.iter().any(|name| name == collection.table_name()) {
            let existing = self.detect_vector_dimension(collection).await?;
            if existing != dimension {
                error!(
                    "Table {} stores {}-dimensional vectors but {} are configured",
                    collection.table_name(),
                    existing,
                    dimension
                );
                return Err(RecommenderError::DimensionMismatch {
                    expected: dimension,
                    actual: existing,
                });
            }
            debug!(
                "Table {} already exists with {} dimensions",
                collection.table_name(),
                existing
            );
            return Ok(());
        }

        self.connect()
            .await?
            .create_empty_table(collection.table_name(), Self::schema(collection, dimension))
            .execute()
            .await
            .map_err(|e| {
                map_store_error(
                    format_args!("Failed to create {} table", collection.table_name()),
                    e,
                )
            })?;

        info!(
            "Created {} table with {} dimensions",
            collection.table_name(),
            dimension
        );
        Ok(())
    }

    async fn detect_vector_dimension(&self, collection: Collection) -> Result<usize> {
        let table = self.open_table(collection).await?;
        let schema = table
            .schema()
            .await
            .map_err(|e| map_store_error("Failed to get table schema", e))?;

        schema
            .fields()
            .iter()
            .find_map(|field| match field.data_type() {
                DataType::FixedSizeList(_, size) if field.name() == VECTOR_COLUMN => {
                    usize::try_from(*size).ok()
                }
                _ => None,
            })
            .ok_or_else(|| {
                RecommenderError::Database(format!(
                    "Could not find {} column in {} table",
                    VECTOR_COLUMN,
                    collection.table_name()
                ))
            })
    }

    /// Whether a collection's vector column carries an ANN index
    #[inline]
    pub async fn has_vector_index(&self, collection: Collection) -> Result<bool> {
        let table = self.open_table(collection).await?;
        let indices = table
            .list_indices()
            .await
            .map_err(|e| map_store_error("Failed to list indices", e))?;

        Ok(indices
            .iter()
            .any(|index| index.columns.iter().any(|column| column == VECTOR_COLUMN)))
    }

    /// Arrow schema shared by both collections
    #[inline]
    pub fn schema(collection: Collection, dimension: usize) -> SchemaRef {
        Arc::new(Schema::new(vec![
            Field::new(collection.key_field(), DataType::Utf8, false),
            Field::new(
                VECTOR_COLUMN,
                DataType::FixedSizeList(
                    Arc::new(Field::new("item", DataType::Float32, false)),
                    dimension as i32,
                ),
                false,
            ),
            Field::new(UPDATED_AT_COLUMN, DataType::Utf8, false),
        ]))
    }
}

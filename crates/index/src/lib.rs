pub mod embeddings;
pub mod loader;
pub mod memory;
pub mod neo4j_index;
pub mod store;
pub mod summary;

pub use embeddings::{Embedder, EmbeddingClient};
pub use loader::{GraphLoader, LoadReport};
pub use memory::MemoryGraph;
pub use neo4j_index::Neo4jStore;
pub use store::{GraphStats, GraphStore, PendingEmbedding};

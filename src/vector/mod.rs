pub mod adapter;
pub mod backend;
pub mod document;
pub mod registry;
pub mod sqlite;

pub use adapter::VectorStoreAdapter;
pub use backend::{ParentStore, ScoredDocument, VectorBackend, VectorRecord};
pub use document::{matches_filter, Document, DocumentMetadata, SearchFilter};
pub use registry::VectorStoreRegistry;

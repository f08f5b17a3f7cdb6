pub mod pipeline;
pub mod sanitize;
pub mod splitter;

pub use pipeline::{chunk_doc_id, EmbeddingRequest, IngestReport, IngestionPipeline};

pub mod config;
pub mod core;
pub mod graph;
pub mod handlers;
pub mod utils;

pub use config::Configuration;
pub use core::{ExtractionResult, ParserClient, RelationExtractor, Triplet, TripletCollection, TripletExtractor};
pub use graph::RelationGraph;
pub use handlers::DocumentProcessor;
pub use utils::GraphSerializer;

pub mod document;
pub mod extractor;
pub mod parser_client;

pub use document::{Document, PosTag, Sentence, Token};
pub use extractor::{
    ExtractionResult, RelationExtractor, Triplet, TripletCollection, TripletExtractor,
};
pub use parser_client::{ExtractionError, ParserClient};

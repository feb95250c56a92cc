pub mod documents;
pub mod keywords;
pub mod rag_index;
pub mod registry;
pub mod similarity;

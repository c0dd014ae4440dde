pub mod corpus;
pub mod dispatch;
pub mod eval;
pub mod index;
pub mod persist;
pub mod phrase;
pub mod tokenizer;
pub mod vector;

/// Ordinal position of a document in the loaded corpus snapshot.
pub type DocId = u32;

pub use corpus::{load_corpus, Document};
pub use dispatch::{SearchEngine, SearchHit, SearchMode, SearchOutcome};
pub use eval::{evaluate, Evaluation, JudgmentSource, RelevanceJudgments};
pub use index::PositionalIndex;
pub use persist::{IndexMeta, IndexPaths};

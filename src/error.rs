use thiserror::Error;

#[derive(Error, Debug)]
pub enum GazetteerError {
    #[error("lookup error: {0}")]
    Lookup(#[from] crate::geotree::LookupError),
    #[error("index error: {0}")]
    Index(#[from] crate::index::IndexError),
    #[error("search error: {0}")]
    Search(#[from] crate::search::SearchError),
    #[error("Tantivy error: {0}")]
    Tantivy(#[from] tantivy::TantivyError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("init logging error: {0}")]
    InitLogging(#[from] tracing_subscriber::filter::ParseError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, GazetteerError>;

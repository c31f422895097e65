use thiserror::Error;

#[derive(Error, Debug)]
pub enum LibraryError {
    #[error("Invalid tag id: {0:?}")]
    InvalidTag(String),

    #[error("Manifest parse error for tag {tag_id}: {source}")]
    ManifestParse {
        tag_id: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Missing {file} for tag {tag_id}")]
    MissingArtifact { tag_id: String, file: &'static str },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, LibraryError>;

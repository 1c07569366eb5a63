use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExportError {
    /// Index buffers use 16 bit components, so larger indices cannot be encoded.
    #[error("vertex index {index} exceeds the maximum index buffer value of 65535")]
    IndexRangeExceeded { index: u32 },

    #[error("accessor {name} has already been populated")]
    AccessorRepopulated { name: String },

    #[error("accessor {name} is referenced by the document but was never populated")]
    UnpopulatedAccessor { name: String },

    #[error("mesh {name} has no vertex positions")]
    MissingPositions { name: String },

    #[error("error writing binary buffer data")]
    Binrw(#[from] binrw::Error),

    #[error("error serializing JSON document")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum SaveGltfError {
    #[error("error writing files")]
    Io(#[from] std::io::Error),

    #[error("error creating glTF document")]
    Export(#[from] ExportError),
}

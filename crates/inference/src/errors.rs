use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum InferenceError {
    #[error("Model file not found: {0}")]
    ModelNotFound(String),

    #[error("Failed to load model: {0}")]
    ModelLoad(String),

    #[error("Model has no class names: no `names` metadata and no labels file")]
    MissingLabels,

    #[error("Invalid class names: {0}")]
    InvalidLabels(String),

    #[error("IO error: {0}")]
    IoError(#[from] io::Error),

    #[error("Inference failed: {0}")]
    Runtime(String),

    #[error("Unexpected output shape {0:?}, expected [1, 4 + classes, anchors]")]
    OutputShape(Vec<usize>),

    #[error("Preprocessing failed: {0}")]
    Preprocess(String),

    #[error("Invalid inference configuration: {0}")]
    InvalidConfig(String),
}

use std::fs;
use std::path::{Path, PathBuf};

use base64::Engine;
use base64::engine::general_purpose::STANDARD;

#[derive(Debug, thiserror::Error)]
pub enum FatalError {
    #[error("image not found: {}", .0.display())]
    MissingImage(PathBuf),

    #[error("failed to read image {}", .path.display())]
    UnreadableImage {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub fn encode_image(path: &Path) -> Result<String, FatalError> {
    if !path.is_file() {
        return Err(FatalError::MissingImage(path.to_path_buf()));
    }

    let bytes = fs::read(path).map_err(|source| FatalError::UnreadableImage {
        path: path.to_path_buf(),
        source,
    })?;

    Ok(STANDARD.encode(bytes))
}

pub fn image_data_url(path: &Path) -> Result<String, FatalError> {
    Ok(format!("data:image/jpeg;base64,{}", encode_image(path)?))
}

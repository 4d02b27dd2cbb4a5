//! API handlers
//!
//! Author: hephaex@gmail.com

pub mod captions;
pub mod embeddings;
pub mod health;
pub mod search;

use crate::error::AppError;
use base64::Engine as _;

/// Decode a base64 image, accepting `data:image/...;base64,` prefixes
pub(crate) fn decode_image(encoded: &str) -> Result<Vec<u8>, AppError> {
    let payload = match encoded.split_once(";base64,") {
        Some((prefix, data)) if prefix.starts_with("data:") => data,
        _ => encoded,
    };

    let bytes = base64::engine::general_purpose::STANDARD
        .decode(payload.trim())
        .map_err(|e| AppError::BadRequest(format!("Image is not valid base64: {e}")))?;

    if bytes.is_empty() {
        return Err(AppError::BadRequest("No image provided".to_string()));
    }
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_image() {
        assert_eq!(decode_image("AQID").unwrap(), vec![1, 2, 3]);
        assert_eq!(
            decode_image("data:image/png;base64,AQID").unwrap(),
            vec![1, 2, 3]
        );
        assert!(matches!(
            decode_image("not base64!").unwrap_err(),
            AppError::BadRequest(_)
        ));
        assert!(matches!(decode_image("").unwrap_err(), AppError::BadRequest(_)));
    }
}

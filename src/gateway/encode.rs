//! Image encoding: raw bytes → base64 for the multimodal request body.
//!
//! Photos are sent as-is. Re-encoding a JPEG would only add artefacts, and the
//! providers accept JPEG, PNG and WebP directly.
//! `detail: "high"` instructs GPT-4-class models to use the full tile budget;
//! without it small print on receipts is lost.

use crate::input::ImageInput;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::ImageData;
use tracing::debug;

/// Detail level requested for every image.
pub const IMAGE_DETAIL: &str = "high";

/// Base64 of the image bytes.
pub fn encode_base64(image: &ImageInput) -> String {
    let b64 = STANDARD.encode(&image.bytes);
    debug!("Encoded {} → {} bytes base64", image.id, b64.len());
    b64
}

/// `data:` URL accepted by OpenAI-compatible `image_url` parts.
pub fn data_url(image: &ImageInput) -> String {
    format!("data:{};base64,{}", image.media_type, encode_base64(image))
}

/// `ImageData` for `edgequake-llm` providers.
pub fn to_image_data(image: &ImageInput) -> ImageData {
    ImageData::new(encode_base64(image), image.media_type.as_str()).with_detail(IMAGE_DETAIL)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_url_has_media_type_prefix() {
        let img = ImageInput::new("r.jpg", vec![0xFF, 0xD8, 0xFF], "image/jpeg");
        let url = data_url(&img);
        assert!(url.starts_with("data:image/jpeg;base64,"));
        let decoded = STANDARD
            .decode(url.trim_start_matches("data:image/jpeg;base64,"))
            .expect("valid base64");
        assert_eq!(decoded, vec![0xFF, 0xD8, 0xFF]);
    }

    #[test]
    fn image_data_keeps_mime_type() {
        let img = ImageInput::new("r.png", vec![1, 2, 3], "image/png");
        let data = to_image_data(&img);
        assert_eq!(data.mime_type, "image/png");
        assert!(!data.data.is_empty());
    }
}

//! Artifact - 完了したジョブの成果物（バイナリ）

/// The binary output of a completed job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    media_type: String,
    bytes: Vec<u8>,
}

impl Artifact {
    pub const SVG: &'static str = "image/svg+xml";

    pub fn new(media_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            media_type: media_type.into(),
            bytes,
        }
    }

    pub fn svg(document: String) -> Self {
        Self::new(Self::SVG, document.into_bytes())
    }

    pub fn media_type(&self) -> &str {
        &self.media_type
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// File extension conventionally used for this media type.
    pub fn extension(&self) -> &'static str {
        match self.media_type.as_str() {
            Self::SVG => "svg",
            "image/png" => "png",
            "application/json" => "json",
            _ => "bin",
        }
    }
}

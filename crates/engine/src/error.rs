/// Failures from decoding or rasterizing a document. Supersession is not an
/// error and never shows up here.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("pdfium: {0}")]
    Pdfium(String),

    #[error("pdfium unavailable: {0}")]
    Unavailable(String),

    #[error("archive: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("image: {0}")]
    Image(#[from] image::ImageError),

    #[error("epub: {0}")]
    Epub(String),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("page {page} out of range (1..={total})")]
    PageOutOfRange { page: u32, total: u32 },

    #[error("pixel buffer does not match {width}x{height}")]
    InvalidBitmap { width: u32, height: u32 },
}

/// Result type alias for query-option operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for query options and their serialized form.
///
/// Search expressions never produce errors: input that does not parse is
/// dropped, so only the option model can fail.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
   /// Page length must be greater than zero.
   #[error("page length must be greater than zero")]
   InvalidPageSize,

   /// Page start is not a multiple of the page length.
   #[error("page start {start} is not a multiple of page length {length}")]
   UnalignedPageStart { start: u64, length: u32 },

   /// Serialized options are not in the `|field|field|…|` shape.
   #[error("malformed serialized query options: {0}")]
   MalformedOptions(String),

   /// Serialized options carry the wrong number of fields.
   #[error("serialized query options have {found} fields, expected {expected}")]
   FieldCountMismatch { found: usize, expected: usize },

   /// A serialized field could not be converted to its type.
   #[error("invalid value '{value}' for query option '{field}'")]
   InvalidField { field: &'static str, value: String },
}

impl Error {
   /// Extract a structured error code from the error type.
   pub fn error_code(&self) -> String {
      match self {
         Error::InvalidPageSize => "INVALID_PAGE_SIZE".to_string(),
         Error::UnalignedPageStart { .. } => "UNALIGNED_PAGE_START".to_string(),
         Error::MalformedOptions(_) => "MALFORMED_OPTIONS".to_string(),
         Error::FieldCountMismatch { .. } => "FIELD_COUNT_MISMATCH".to_string(),
         Error::InvalidField { .. } => "INVALID_OPTION_FIELD".to_string(),
      }
   }
}

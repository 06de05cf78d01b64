// Record framing, parsing and writing
pub mod canonical;
pub mod framer;
pub mod reader;
pub mod writer;

// File sessions and multi-file operations
pub mod aggregate;
pub mod paths;
pub mod session;

// Shared literals, errors, logging helpers
pub mod constants;
pub mod error;
pub mod utils;

// Re-export main types for convenience
pub use aggregate::{count, dump, load, Load};
pub use canonical::{content_digest, to_canonical_string, ContentDigest};
pub use error::{Result, StoreError};
pub use framer::RecordFramer;
pub use paths::resolve_patterns;
pub use reader::RecordReader;
pub use session::{OpenMode, StoreOptions, StoreOutput, StoreSession};
pub use writer::RecordWriter;

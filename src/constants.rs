/// Models offered when the backend cannot be reached or reports none.
pub const FALLBACK_MODELS: &str = "llama2,codellama,mistral";

pub const DEFAULT_BACKEND_URL: &str = "http://localhost:11434";
pub const DEFAULT_MODEL: &str = "llama2";

/// Upload extensions accepted regardless of compiled document support.
pub const TEXT_EXTENSIONS: &[&str] = &[
    "txt", "md", "py", "js", "html", "css", "json", "xml", "csv",
];
pub const PDF_EXTENSIONS: &[&str] = &["pdf"];
pub const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "bmp", "webp"];
pub const OFFICE_EXTENSIONS: &[&str] = &["docx", "xlsx", "pptx"];

pub const MAX_FILE_SIZE: usize = 16 * 1024 * 1024;
/// Ceiling on the decompressed size of any one entry read from an office package.
pub const MAX_OFFICE_ENTRY_SIZE: u64 = 32 * 1024 * 1024;

/// Database defaults
pub const DB_PRAGMAS: &[&str] = &[
    "PRAGMA journal_mode = WAL",
    "PRAGMA synchronous = NORMAL",
    "PRAGMA busy_timeout = 5000",
];

pub const SESSION_COOKIE: &str = "session_id";
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Formatting guidance appended to every prompt sent to the model.
pub const FORMAT_GUIDELINES: &str = "- **Bold text** for emphasis
- `code snippets` for technical terms
- ```language blocks``` for code examples
- Clear headings and bullet points where appropriate";

pub const IMAGE_VISION_NOTE: &str =
    "Note: For image analysis, please use a vision-capable model like llava.";

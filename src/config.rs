use crate::constants::*;
use clap::Parser;
use serde::Serialize;
use std::collections::BTreeSet;

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    #[arg(long, default_value_t = 5000)]
    pub port: u16,
    #[arg(long, default_value = "0.0.0.0")]
    pub host: String,
    #[arg(long, default_value = "chat_app.db")]
    pub database: String,
    #[arg(long, default_value = "uploads")]
    pub upload_dir: String,
    #[arg(long, default_value = "static")]
    pub static_dir: String,
    #[arg(long, env = "OLLAMA_BASE_URL", default_value = DEFAULT_BACKEND_URL)]
    pub backend_url: String,
    /// Bearer token for hosted backends; can be replaced at runtime via the admin endpoint.
    #[arg(long, env = "BACKEND_API_KEY")]
    pub api_key: Option<String>,
    #[arg(long, default_value = DEFAULT_MODEL)]
    pub default_model: String,
    #[arg(long, value_delimiter = ',', default_value = FALLBACK_MODELS)]
    pub fallback_models: Vec<String>,
    #[arg(long, default_value_t = 120)]
    pub request_timeout_secs: u64,
    #[arg(long, default_value_t = 10)]
    pub list_timeout_secs: u64,
    #[arg(long, default_value_t = 10)]
    pub connect_timeout_secs: u64,
    #[arg(long, default_value_t = MAX_FILE_SIZE)]
    pub max_file_size: usize,
    #[arg(long, default_value_t = 10)]
    pub context_limit: i64,
    #[arg(long, default_value_t = 50)]
    pub history_limit: i64,
    #[arg(long, default_value = "logs")]
    pub log_dir: String,
    #[arg(long, default_value_t = false)]
    pub json_logs: bool,
}

impl Args {
    pub fn max_file_size_mb(&self) -> usize {
        self.max_file_size / (1024 * 1024)
    }
}

/// Optional document and rendering support, fixed at build time through cargo
/// features and detected once at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Capabilities {
    pub markdown: bool,
    pub pdf: bool,
    pub image: bool,
    pub office: bool,
}

impl Capabilities {
    pub fn detect() -> Self {
        Self {
            markdown: cfg!(feature = "markdown"),
            pdf: cfg!(feature = "pdf"),
            image: cfg!(feature = "image"),
            office: cfg!(feature = "office"),
        }
    }

    /// Plain-text uploads and the from-scratch formatter only.
    pub fn basic() -> Self {
        Self {
            markdown: false,
            pdf: false,
            image: false,
            office: false,
        }
    }

    pub fn allowed_extensions(&self) -> BTreeSet<&'static str> {
        let mut exts: BTreeSet<&'static str> = TEXT_EXTENSIONS.iter().copied().collect();
        if self.pdf {
            exts.extend(PDF_EXTENSIONS);
        }
        if self.image {
            exts.extend(IMAGE_EXTENSIONS);
        }
        if self.office {
            exts.extend(OFFICE_EXTENSIONS);
        }
        exts
    }

    pub fn feature_names(&self) -> Vec<&'static str> {
        let mut features = Vec::new();
        if self.markdown {
            features.push("Markdown formatting");
        }
        if self.pdf {
            features.push("PDF processing");
        }
        if self.image {
            features.push("Image processing");
        }
        if self.office {
            features.push("Office documents");
        }
        features
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_capabilities_only_allow_text() {
        let exts = Capabilities::basic().allowed_extensions();
        assert!(exts.contains("txt"));
        assert!(exts.contains("csv"));
        assert!(!exts.contains("pdf"));
        assert!(!exts.contains("png"));
        assert!(!exts.contains("docx"));
    }

    #[test]
    fn test_full_capabilities_extend_extensions() {
        let caps = Capabilities {
            markdown: true,
            pdf: true,
            image: true,
            office: true,
        };
        let exts = caps.allowed_extensions();
        for ext in ["pdf", "png", "webp", "docx", "xlsx", "pptx"] {
            assert!(exts.contains(ext), "missing {}", ext);
        }
        assert_eq!(caps.feature_names().len(), 4);
    }

    #[test]
    fn test_args_defaults() {
        let args = Args::parse_from(["colloquy"]);
        assert_eq!(args.port, 5000);
        assert_eq!(args.database, "chat_app.db");
        assert_eq!(args.fallback_models, vec!["llama2", "codellama", "mistral"]);
        assert_eq!(args.max_file_size_mb(), 16);
        assert_eq!(args.context_limit, 10);
    }
}

use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Extraction families. A closed set: every supported format maps onto one
/// variant, and the extractor dispatches on nothing else.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileKind {
    /// Read as-is (source code, config, markdown, plain text).
    PlainText,
    /// Word-processing container (.docx).
    WordDocument,
    /// Spreadsheet container (.xlsx and friends).
    Spreadsheet,
    /// Presentation container (.pptx).
    Presentation,
    /// Page-described document (.pdf).
    PageDescribed,
    /// Known format without a parser (legacy Office, .odt, .rtf).
    Unsupported,
    /// Everything else: fingerprinted, never vectorized.
    Binary,
}

impl FileKind {
    /// Whether text extraction can produce comparable content.
    #[must_use]
    pub const fn is_extractable(self) -> bool {
        !matches!(self, Self::Binary | Self::Unsupported)
    }
}

/// Spreadsheet extensions calamine can open.
const SPREADSHEET_EXTENSIONS: &[&str] = &["xlsx", "xls", "xlsm", "xlsb", "ods"];

/// Legacy or niche document formats with no parser wired up.
const UNSUPPORTED_EXTENSIONS: &[&str] = &["doc", "ppt", "odt", "rtf"];

/// Source code and config extensions always treated as plain text.
const TEXT_EXTENSIONS: &[&str] = &[
    // Scripting
    "py", "pyw", "pyi", "rb", "rake", "pl", "pm", "lua", "sh", "bash", "zsh", "fish", "ps1",
    "bat", "cmd", // Systems
    "c", "h", "cpp", "hpp", "cc", "hh", "cxx", "hxx", "rs", "go", "zig", // JVM / .NET
    "java", "kt", "kts", "scala", "cs", "csx", "groovy", "gradle",
    // JavaScript / TypeScript / web
    "js", "jsx", "ts", "tsx", "mjs", "cjs", "html", "htm", "css", "scss", "sass", "less",
    "php", "phtml", // Data / config
    "json", "xml", "yaml", "yml", "toml", "ini", "cfg", "conf", "env", "sql", "csv", "tsv",
    // Prose
    "md", "markdown", "txt", "text", "rst", "asciidoc", "adoc", "log", // Other
    "r", "jl", "swift", "m", "mm", "cmake", "dockerfile", "makefile",
];

/// Config files commonly shipped without an extension.
const TEXT_FILENAMES: &[&str] = &[
    "dockerfile",
    "makefile",
    "gemfile",
    "rakefile",
    "procfile",
    ".gitignore",
    ".dockerignore",
    ".env",
    ".editorconfig",
];

/// Classify a file into its extraction family.
///
/// Pure with respect to configuration: extension tables first, then known
/// extensionless names, then a UTF-8 sniff of the first KiB. Files that
/// cannot be opened for sniffing classify as `Binary`; the fingerprint pass
/// will surface the real read error.
#[must_use]
pub fn classify(path: &Path) -> FileKind {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();

    match ext.as_str() {
        "docx" => return FileKind::WordDocument,
        "pptx" => return FileKind::Presentation,
        "pdf" => return FileKind::PageDescribed,
        _ => {}
    }
    if SPREADSHEET_EXTENSIONS.contains(&ext.as_str()) {
        return FileKind::Spreadsheet;
    }
    if UNSUPPORTED_EXTENSIONS.contains(&ext.as_str()) {
        return FileKind::Unsupported;
    }
    if TEXT_EXTENSIONS.contains(&ext.as_str()) {
        return FileKind::PlainText;
    }

    let filename = path
        .file_name()
        .and_then(|n| n.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    if TEXT_FILENAMES.contains(&filename.as_str()) {
        return FileKind::PlainText;
    }

    if sniff_utf8(path) {
        FileKind::PlainText
    } else {
        FileKind::Binary
    }
}

/// Whether the first KiB decodes as UTF-8 without NUL bytes.
fn sniff_utf8(path: &Path) -> bool {
    let Ok(mut file) = File::open(path) else {
        return false;
    };
    let mut buf = [0u8; 1024];
    let Ok(read) = file.read(&mut buf) else {
        return false;
    };
    let head = &buf[..read];
    if head.contains(&0) {
        return false;
    }
    match std::str::from_utf8(head) {
        Ok(_) => true,
        // A multi-byte sequence cut off at the buffer edge still counts.
        Err(e) => e.valid_up_to() + 4 > read,
    }
}

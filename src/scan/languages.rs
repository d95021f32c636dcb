//! Code file recognition and language hints.

use std::path::Path;

/// Extensions scanned when none are configured.
pub const DEFAULT_EXTENSIONS: &[&str] = &["ts", "js", "tsx", "jsx", "py", "java", "cpp", "cs"];

pub fn default_extensions() -> Vec<String> {
    DEFAULT_EXTENSIONS.iter().map(|e| e.to_string()).collect()
}

fn extension(path: &str) -> Option<&str> {
    Path::new(path).extension().and_then(|e| e.to_str())
}

/// True if `path` ends in one of `extensions` (with or without a leading dot).
pub fn is_code_file(path: &str, extensions: &[String]) -> bool {
    match extension(path) {
        Some(ext) => extensions.iter().any(|e| e.trim_start_matches('.') == ext),
        None => false,
    }
}

/// Language hint passed to the analysis service.
pub fn language_for_path(path: &str) -> &'static str {
    match extension(path) {
        Some("js") | Some("jsx") => "JavaScript",
        Some("ts") | Some("tsx") => "TypeScript",
        Some("py") => "Python",
        Some("java") => "Java",
        Some("cpp") => "C++",
        Some("cs") => "C#",
        _ => "Unknown",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_code_file() {
        let exts = default_extensions();
        assert!(is_code_file("src/lib/queue.ts", &exts));
        assert!(is_code_file("App.tsx", &exts));
        assert!(is_code_file("main.cpp", &exts));
        assert!(!is_code_file("README.md", &exts));
        assert!(!is_code_file("Makefile", &exts));
        assert!(!is_code_file("types.d.ts.map", &exts));
    }

    #[test]
    fn test_configured_extensions_accept_dots() {
        let exts = vec![".rs".to_string(), "go".to_string()];
        assert!(is_code_file("src/main.rs", &exts));
        assert!(is_code_file("cmd/main.go", &exts));
        assert!(!is_code_file("index.ts", &exts));
    }

    #[test]
    fn test_language_for_path() {
        assert_eq!(language_for_path("a.js"), "JavaScript");
        assert_eq!(language_for_path("a.jsx"), "JavaScript");
        assert_eq!(language_for_path("a.ts"), "TypeScript");
        assert_eq!(language_for_path("a.tsx"), "TypeScript");
        assert_eq!(language_for_path("a.py"), "Python");
        assert_eq!(language_for_path("A.java"), "Java");
        assert_eq!(language_for_path("a.cpp"), "C++");
        assert_eq!(language_for_path("a.cs"), "C#");
        assert_eq!(language_for_path("a.rb"), "Unknown");
    }
}

//! Supported guest languages and the container image each one runs in
//!
//! Every image is a pinned Alpine-based tag so that busybox `base64` is always
//! available to decode the payload inside the container.

use crate::errors::SandboxError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LanguageSpec {
    /// Identifier accepted in tool input.
    pub id: &'static str,
    pub image: &'static str,
    /// Invocation that reads the decoded program from stdin.
    pub interpreter: &'static str,
}

const CATALOG: &[LanguageSpec] = &[
    LanguageSpec {
        id: "python",
        image: "python:3.12-alpine",
        interpreter: "python3 -",
    },
    LanguageSpec {
        id: "javascript",
        image: "node:20-alpine",
        interpreter: "node -",
    },
    LanguageSpec {
        id: "bash",
        image: "bash:5.2",
        interpreter: "bash -s",
    },
    LanguageSpec {
        id: "sh",
        image: "alpine:3.20",
        interpreter: "sh -s",
    },
];

/// Read-only table from language identifier to image and interpreter.
#[derive(Debug, Clone, Copy, Default)]
pub struct LanguageCatalog;

impl LanguageCatalog {
    pub fn new() -> Self {
        Self
    }

    /// Exact, case-sensitive lookup so the catalog agrees with the schema enum.
    pub fn resolve(&self, language: &str) -> Result<&'static LanguageSpec, SandboxError> {
        CATALOG
            .iter()
            .find(|spec| spec.id == language)
            .ok_or_else(|| SandboxError::UnsupportedLanguage(language.to_string()))
    }

    pub fn identifiers(&self) -> Vec<&'static str> {
        CATALOG.iter().map(|spec| spec.id).collect()
    }

    pub fn entries(&self) -> &'static [LanguageSpec] {
        CATALOG
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_known_languages() {
        let catalog = LanguageCatalog::new();

        let python = catalog.resolve("python").unwrap();
        assert_eq!(python.image, "python:3.12-alpine");
        assert!(python.interpreter.starts_with("python3"));

        let bash = catalog.resolve("bash").unwrap();
        assert!(bash.image.starts_with("bash:"));

        let js = catalog.resolve("javascript").unwrap();
        assert!(js.image.starts_with("node:"));
    }

    #[test]
    fn test_resolve_rejects_unknown_languages() {
        let catalog = LanguageCatalog::new();
        for language in ["cobol", "", "Python", " python", "python3", "rust"] {
            let err = catalog.resolve(language).unwrap_err();
            assert!(matches!(err, SandboxError::UnsupportedLanguage(ref l) if l == language));
        }
    }

    #[test]
    fn test_images_are_pinned() {
        for spec in LanguageCatalog::new().entries() {
            assert!(!spec.image.ends_with(":latest"), "{} uses latest", spec.id);
            assert!(spec.image.contains(':'), "{} has no tag", spec.id);
        }
    }

    #[test]
    fn test_identifiers_are_unique() {
        let mut ids = LanguageCatalog::new().identifiers();
        let total = ids.len();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), total);
    }
}

//! Injection-proof command construction for guest programs
//!
//! Guest source never appears in the shell line. It is base64 encoded and the
//! container decodes it and pipes it into the interpreter, so the only variable
//! part of the command is drawn from the base64 alphabet.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use super::languages::LanguageSpec;

/// Builds the argv for a container. Pure: equal inputs give byte-identical output.
#[derive(Debug, Clone, Copy, Default)]
pub struct CommandBuilder;

impl CommandBuilder {
    pub fn new() -> Self {
        Self
    }

    pub fn build(&self, language: &LanguageSpec, source: &str) -> Vec<String> {
        let encoded = STANDARD.encode(source.as_bytes());
        vec![
            "sh".to_string(),
            "-c".to_string(),
            format!(
                "printf '%s' '{}' | base64 -d | {}",
                encoded, language.interpreter
            ),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executors::languages::LanguageCatalog;

    fn extract_payload(argv: &[String]) -> String {
        let line = &argv[2];
        let start = line.find("printf '%s' '").unwrap() + "printf '%s' '".len();
        let end = start + line[start..].find('\'').unwrap();
        line[start..end].to_string()
    }

    fn nasty_sources() -> Vec<&'static str> {
        vec![
            "print(42)",
            "",
            "   \n\t  ",
            "echo 'single' \"double\" `backtick`",
            "true && rm -rf / ; echo $(whoami) | cat",
            "line one\nline two\r\nline three\n",
            "'; exit 1; echo '",
            "\\x00 \\n $HOME ${PATH} !! * ? [a-z] ~",
            "héllo wörld ✓ 日本語",
        ]
    }

    #[test]
    fn test_argv_shape() {
        let catalog = LanguageCatalog::new();
        let python = catalog.resolve("python").unwrap();
        let argv = CommandBuilder::new().build(python, "print(42)");

        assert_eq!(argv.len(), 3);
        assert_eq!(argv[0], "sh");
        assert_eq!(argv[1], "-c");
        assert!(argv[2].ends_with("| base64 -d | python3 -"));
    }

    #[test]
    fn test_payload_round_trips_for_all_languages() {
        let catalog = LanguageCatalog::new();
        let builder = CommandBuilder::new();

        for spec in catalog.entries() {
            for source in nasty_sources() {
                let argv = builder.build(spec, source);
                let decoded = STANDARD.decode(extract_payload(&argv)).unwrap();
                assert_eq!(String::from_utf8(decoded).unwrap(), source);
            }
        }
    }

    #[test]
    fn test_source_never_appears_in_shell_line() {
        let catalog = LanguageCatalog::new();
        let builder = CommandBuilder::new();
        let spec = catalog.resolve("bash").unwrap();

        for source in nasty_sources().into_iter().filter(|s| s.trim().len() > 2) {
            let argv = builder.build(spec, source);
            assert!(!argv[2].contains(source), "source leaked into: {}", argv[2]);
            let payload = extract_payload(&argv);
            assert!(payload
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '/' | '=')));
        }
    }

    #[test]
    fn test_build_is_deterministic() {
        let catalog = LanguageCatalog::new();
        let builder = CommandBuilder::new();
        let spec = catalog.resolve("javascript").unwrap();
        let source = "console.log(`a ${1 + 1}`)";

        assert_eq!(builder.build(spec, source), builder.build(spec, source));
    }

    #[test]
    fn test_shell_family_pipes_into_secondary_shell() {
        let catalog = LanguageCatalog::new();
        let argv = CommandBuilder::new().build(catalog.resolve("sh").unwrap(), "echo hi");
        assert!(argv[2].ends_with("| base64 -d | sh -s"));
    }
}

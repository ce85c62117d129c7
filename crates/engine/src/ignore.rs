use crate::error::{EngineError, Result};
use globset::{GlobBuilder, GlobSet, GlobSetBuilder};

/// Compiled ignore set, matched against filenames only (never full paths).
///
/// Patterns are globs (`*.tmp`, `.DS_Store`); matching is case-insensitive,
/// so a wildcard-free pattern behaves as a case-insensitive exact filename
/// match.
#[derive(Debug)]
pub struct IgnorePatterns {
    patterns: Vec<String>,
    set: GlobSet,
}

impl IgnorePatterns {
    /// Compile a pattern list, rejecting malformed globs.
    pub fn compile(patterns: &[String]) -> Result<Self> {
        let mut builder = GlobSetBuilder::new();
        for pattern in patterns {
            let glob = GlobBuilder::new(pattern)
                .case_insensitive(true)
                .build()
                .map_err(|e| EngineError::InvalidPattern(format!("{pattern}: {e}")))?;
            builder.add(glob);
        }
        let set = builder
            .build()
            .map_err(|e| EngineError::InvalidPattern(e.to_string()))?;
        Ok(Self {
            patterns: patterns.to_vec(),
            set,
        })
    }

    #[must_use]
    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }

    #[must_use]
    pub fn is_ignored(&self, filename: &str) -> bool {
        !self.patterns.is_empty() && self.set.is_match(filename)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compile(patterns: &[&str]) -> IgnorePatterns {
        let owned: Vec<String> = patterns.iter().map(ToString::to_string).collect();
        IgnorePatterns::compile(&owned).unwrap()
    }

    #[test]
    fn wildcards_match_by_extension() {
        let set = compile(&["*.tmp", "*.log"]);
        assert!(set.is_ignored("build.tmp"));
        assert!(set.is_ignored("server.log"));
        assert!(!set.is_ignored("report.txt"));
    }

    #[test]
    fn exact_patterns_match_case_insensitively() {
        let set = compile(&[".DS_Store"]);
        assert!(set.is_ignored(".DS_Store"));
        assert!(set.is_ignored(".ds_store"));
        assert!(!set.is_ignored("DS_Store.bak"));
    }

    #[test]
    fn empty_set_ignores_nothing() {
        let set = compile(&[]);
        assert!(!set.is_ignored("anything.tmp"));
    }

    #[test]
    fn malformed_glob_is_rejected() {
        let err = IgnorePatterns::compile(&["[".to_string()]).unwrap_err();
        assert!(matches!(err, EngineError::InvalidPattern(_)));
    }
}

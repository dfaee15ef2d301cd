// Purpose: Immutable set of standard-library import paths treated as resolved before discovery.
// Inputs/Outputs: Built from `go list std` output or from literal paths in tests.
// Invariants: Never mutated after construction; shared by reference across a whole run.

use std::collections::BTreeSet;

#[derive(Debug, Clone, Default)]
pub struct StdBaseline {
    paths: BTreeSet<String>,
}

impl StdBaseline {
    pub fn from_paths<I, S>(paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            paths: paths.into_iter().map(Into::into).collect(),
        }
    }

    // One import path per line; surrounding whitespace and blank lines are ignored.
    pub fn from_go_list(text: &str) -> Self {
        Self::from_paths(
            text.lines()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .map(str::to_string),
        )
    }

    pub fn contains(&self, import_path: &str) -> bool {
        self.paths.contains(import_path)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.paths.iter().map(|s| s.as_str())
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::StdBaseline;

    #[test]
    fn parses_go_list_output() {
        let b = StdBaseline::from_go_list("fmt\n  net/http \n\n\nos\r\n");
        assert_eq!(b.len(), 3);
        assert!(b.contains("fmt"));
        assert!(b.contains("net/http"));
        assert!(b.contains("os"));
        assert!(!b.contains("non_std"));
    }
}

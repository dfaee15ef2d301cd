// Purpose: Parse the `go.mod` directives the resolver needs (module, go, require).
// Inputs/Outputs: go.mod text in; module path + requirement list out.
// Invariants: Required versions are valid `v`-prefixed semantic versions (pseudo-versions included).
// Gotchas: Other directives are tolerated and skipped, including their block forms.

use std::fs;
use std::path::Path;

use crate::pkg::error::{ResolveError, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModFile {
    pub module: String,
    pub go: Option<String>,
    pub require: Vec<Require>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Require {
    pub module: String,
    pub version: String,
}

fn strip_comment(line: &str) -> &str {
    match line.find("//") {
        Some(i) => &line[..i],
        None => line,
    }
}

fn unquote(tok: &str) -> &str {
    tok.strip_prefix('"')
        .and_then(|t| t.strip_suffix('"'))
        .unwrap_or(tok)
}

pub fn is_valid_module_version(v: &str) -> bool {
    v.strip_prefix('v')
        .map(|rest| semver::Version::parse(rest).is_ok())
        .unwrap_or(false)
}

impl ModFile {
    pub fn read(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|e| ResolveError::io(path, e))?;
        Self::parse(&text).map_err(|msg| ResolveError::parse(path, msg))
    }

    pub fn parse(text: &str) -> std::result::Result<Self, String> {
        let mut module = None;
        let mut go = None;
        let mut require = Vec::new();
        let mut block: Option<String> = None;

        for (idx, raw) in text.lines().enumerate() {
            let lineno = idx + 1;
            let line = strip_comment(raw).trim();
            if line.is_empty() {
                continue;
            }

            if let Some(verb) = block.as_deref() {
                if line == ")" {
                    block = None;
                    continue;
                }
                if verb == "require" {
                    require.push(parse_require(line, lineno)?);
                }
                continue;
            }

            let (verb, rest) = match line.split_once(char::is_whitespace) {
                Some((v, r)) => (v, r.trim()),
                None => (line, ""),
            };
            if rest == "(" {
                block = Some(verb.to_string());
                continue;
            }
            match verb {
                "module" => {
                    if module.is_some() {
                        return Err(format!("line {}: repeated module directive", lineno));
                    }
                    let m = unquote(rest);
                    if m.is_empty() || m.contains(char::is_whitespace) {
                        return Err(format!("line {}: invalid module path '{}'", lineno, rest));
                    }
                    module = Some(m.to_string());
                }
                "go" => go = Some(rest.to_string()),
                "require" => require.push(parse_require(rest, lineno)?),
                "replace" | "exclude" | "retract" | "toolchain" | "godebug" => {}
                other => return Err(format!("line {}: unknown directive '{}'", lineno, other)),
            }
        }

        if let Some(verb) = block {
            return Err(format!("unterminated {} block", verb));
        }
        let module = module.ok_or_else(|| "missing module directive".to_string())?;
        Ok(Self {
            module,
            go,
            require,
        })
    }
}

fn parse_require(spec: &str, lineno: usize) -> std::result::Result<Require, String> {
    let parts: Vec<&str> = spec.split_whitespace().collect();
    let [module, version] = parts.as_slice() else {
        return Err(format!(
            "line {}: usage: require module/path v1.2.3, got '{}'",
            lineno, spec
        ));
    };
    if !is_valid_module_version(version) {
        return Err(format!(
            "line {}: invalid version '{}' for {}",
            lineno, version, module
        ));
    }
    Ok(Require {
        module: unquote(module).to_string(),
        version: version.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pkg::testutil::{temp_dir, write_file};

    #[test]
    fn parses_module_go_and_requires() {
        let text = r#"
// leading comment
module example.com/app

go 1.22

require example.com/single v1.0.0

require (
	example.com/lib v0.3.0 // indirect
	"example.com/quoted" v2.1.0+incompatible
	golang.org/x/mod v0.0.0-20240101000000-abcdefabcdef
)

replace example.com/lib => ../lib

exclude (
	example.com/bad v1.0.0
)
"#;
        let mf = ModFile::parse(text).expect("parse");
        assert_eq!(mf.module, "example.com/app");
        assert_eq!(mf.go.as_deref(), Some("1.22"));
        let mods: Vec<(&str, &str)> = mf
            .require
            .iter()
            .map(|r| (r.module.as_str(), r.version.as_str()))
            .collect();
        assert_eq!(
            mods,
            vec![
                ("example.com/single", "v1.0.0"),
                ("example.com/lib", "v0.3.0"),
                ("example.com/quoted", "v2.1.0+incompatible"),
                ("golang.org/x/mod", "v0.0.0-20240101000000-abcdefabcdef"),
            ]
        );
    }

    #[test]
    fn rejects_malformed_files() {
        assert!(ModFile::parse("go 1.22\n").is_err());
        assert!(ModFile::parse("module a\nmodule b\n").is_err());
        assert!(ModFile::parse("module a\nrequire b 1.0.0\n").is_err());
        assert!(ModFile::parse("module a\nrequire b\n").is_err());
        assert!(ModFile::parse("module a\nrequire (\nb v1.0.0\n").is_err());
        assert!(ModFile::parse("module a\nfrobnicate x\n").is_err());
    }

    #[test]
    fn read_maps_errors_to_paths() {
        let root = temp_dir("modfile");
        let p = write_file(&root, "go.mod", "require x v1.0.0\n");
        match ModFile::read(&p) {
            Err(ResolveError::Parse { path, message }) => {
                assert_eq!(path, p);
                assert!(message.contains("missing module"));
            }
            other => panic!("expected parse error, got {:?}", other),
        }
        assert!(matches!(
            ModFile::read(&root.join("absent.mod")),
            Err(ResolveError::Io { .. })
        ));
        let _ = std::fs::remove_dir_all(root);
    }
}

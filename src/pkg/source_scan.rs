// Purpose: Extract the package clause and import declarations from a Go source file header.
// Inputs/Outputs: Source text in, package name + import paths out.
// Invariants: Only the header is lexed; anything after the last import declaration is never inspected.
// Gotchas: Newlines are skipped rather than turned into semicolons; import specs stay unambiguous.

use std::iter::Peekable;
use std::path::Path;
use std::str::CharIndices;

use crate::pkg::error::{ResolveError, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceHeader {
    pub package: String,
    pub imports: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Tok {
    Ident(String),
    Str(String),
    Dot,
    LParen,
    RParen,
    Semi,
    Other(char),
    Eof,
}

struct Lexer<'a> {
    src: &'a str,
    chars: Peekable<CharIndices<'a>>,
}

impl<'a> Lexer<'a> {
    fn new(src: &'a str) -> Self {
        Self {
            src,
            chars: src.char_indices().peekable(),
        }
    }

    fn skip_trivia(&mut self) -> std::result::Result<(), String> {
        loop {
            match self.chars.peek() {
                Some(&(_, c)) if c.is_whitespace() || c == '\u{feff}' => {
                    self.chars.next();
                }
                Some(&(i, '/')) => {
                    let next = self.src[i + 1..].chars().next();
                    match next {
                        Some('/') => {
                            for (_, c) in self.chars.by_ref() {
                                if c == '\n' {
                                    break;
                                }
                            }
                        }
                        Some('*') => {
                            self.chars.next();
                            self.chars.next();
                            let mut prev = '\0';
                            let mut closed = false;
                            for (_, c) in self.chars.by_ref() {
                                if prev == '*' && c == '/' {
                                    closed = true;
                                    break;
                                }
                                prev = c;
                            }
                            if !closed {
                                return Err("comment not terminated".to_string());
                            }
                        }
                        _ => return Ok(()),
                    }
                }
                _ => return Ok(()),
            }
        }
    }

    fn next_tok(&mut self) -> std::result::Result<Tok, String> {
        self.skip_trivia()?;
        let Some((_, c)) = self.chars.next() else {
            return Ok(Tok::Eof);
        };
        match c {
            '.' => Ok(Tok::Dot),
            '(' => Ok(Tok::LParen),
            ')' => Ok(Tok::RParen),
            ';' => Ok(Tok::Semi),
            '"' => self.interpreted_string(),
            '`' => {
                let mut s = String::new();
                for (_, c) in self.chars.by_ref() {
                    if c == '`' {
                        return Ok(Tok::Str(s));
                    }
                    s.push(c);
                }
                Err("raw string literal not terminated".to_string())
            }
            c if c.is_alphabetic() || c == '_' => {
                let mut s = String::from(c);
                while let Some(&(_, c)) = self.chars.peek() {
                    if c.is_alphanumeric() || c == '_' {
                        s.push(c);
                        self.chars.next();
                    } else {
                        break;
                    }
                }
                Ok(Tok::Ident(s))
            }
            other => Ok(Tok::Other(other)),
        }
    }

    fn interpreted_string(&mut self) -> std::result::Result<Tok, String> {
        let mut s = String::new();
        while let Some((_, c)) = self.chars.next() {
            match c {
                '"' => return Ok(Tok::Str(s)),
                '\n' => break,
                '\\' => match self.chars.next() {
                    Some((_, '\\')) => s.push('\\'),
                    Some((_, '"')) => s.push('"'),
                    Some((_, 'n')) => s.push('\n'),
                    Some((_, 't')) => s.push('\t'),
                    Some((_, other)) => {
                        return Err(format!("unsupported escape sequence '\\{}'", other));
                    }
                    None => break,
                },
                c => s.push(c),
            }
        }
        Err("string literal not terminated".to_string())
    }
}

pub fn parse_header(src: &str) -> std::result::Result<SourceHeader, String> {
    let mut lx = Lexer::new(src);
    match lx.next_tok()? {
        Tok::Ident(kw) if kw == "package" => {}
        _ => return Err("expected 'package', found something else".to_string()),
    }
    let package = match lx.next_tok()? {
        Tok::Ident(name) => name,
        _ => return Err("expected package name".to_string()),
    };

    let mut imports = Vec::new();
    loop {
        match lx.next_tok()? {
            Tok::Semi => continue,
            Tok::Ident(kw) if kw == "import" => {}
            _ => break,
        }
        let first = lx.next_tok()?;
        if first != Tok::LParen {
            imports.push(import_spec(&mut lx, first)?);
            continue;
        }
        loop {
            match lx.next_tok()? {
                Tok::Semi => continue,
                Tok::RParen => break,
                Tok::Eof => return Err("import declaration not terminated".to_string()),
                t => imports.push(import_spec(&mut lx, t)?),
            }
        }
    }
    Ok(SourceHeader { package, imports })
}

fn import_spec(lx: &mut Lexer<'_>, first: Tok) -> std::result::Result<String, String> {
    let path_tok = match first {
        Tok::Ident(_) | Tok::Dot => lx.next_tok()?,
        t => t,
    };
    match path_tok {
        Tok::Str(p) if p.is_empty() => Err("empty import path".to_string()),
        Tok::Str(p) => Ok(p),
        other => Err(format!("malformed import spec near {:?}", other)),
    }
}

pub fn parse_file_header(path: &Path, src: &str) -> Result<SourceHeader> {
    parse_header(src).map_err(|msg| ResolveError::parse(path, msg))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_and_grouped_imports() {
        let src = r#"// Package x does things.
package x

import "fmt"
import (
	"os"
	str "strings"
	. "math"
	_ "embed"; "net/http"
	`example.com/raw`
)

func main() { import_not_really := "nope" }
"#;
        let h = parse_header(src).expect("parse");
        assert_eq!(h.package, "x");
        assert_eq!(
            h.imports,
            vec![
                "fmt",
                "os",
                "strings",
                "math",
                "embed",
                "net/http",
                "example.com/raw"
            ]
        );
    }

    #[test]
    fn header_stops_at_first_declaration() {
        let src = "/* block\n comment */ package main\n\nvar s = \"unterminated\nimport \"later\"\n";
        let h = parse_header(src).expect("parse");
        assert_eq!(h.package, "main");
        assert!(h.imports.is_empty());
    }

    #[test]
    fn malformed_headers_are_rejected() {
        assert!(parse_header("").is_err());
        assert!(parse_header("func main() {}").is_err());
        assert!(parse_header("package").is_err());
        assert!(parse_header("package x\nimport (\n\"fmt\"\n").is_err());
        assert!(parse_header("package x\nimport \"\"").is_err());
        assert!(parse_header("package x\nimport foo bar").is_err());
        assert!(parse_header("/* never closed\npackage x").is_err());
        assert!(parse_header("package x\nimport \"fmt").is_err());
    }

    #[test]
    fn parse_file_header_reports_path() {
        let err = parse_file_header(Path::new("/src/bad.go"), "nope").unwrap_err();
        assert!(matches!(err, ResolveError::Parse { .. }));
        assert!(err.to_string().contains("/src/bad.go"));
    }
}

// Purpose: Decide whether a source file participates in a build for a given target platform.
// Inputs/Outputs: File names and `//go:build` lines in, booleans (or a parse message) out.
// Invariants: Filename suffixes only constrain when they name a known OS/arch.
// Gotchas: android/illumos/ios also satisfy linux/solaris/darwin respectively.

use regex::Regex;
use std::sync::LazyLock;

const KNOWN_OS: &[&str] = &[
    "aix", "android", "darwin", "dragonfly", "freebsd", "hurd", "illumos", "ios", "js", "linux",
    "nacl", "netbsd", "openbsd", "plan9", "solaris", "wasip1", "windows", "zos",
];

const UNIX_OS: &[&str] = &[
    "aix", "android", "darwin", "dragonfly", "freebsd", "hurd", "illumos", "ios", "linux",
    "netbsd", "openbsd", "solaris",
];

const KNOWN_ARCH: &[&str] = &[
    "386",
    "amd64",
    "amd64p32",
    "arm",
    "armbe",
    "arm64",
    "arm64be",
    "loong64",
    "mips",
    "mipsle",
    "mips64",
    "mips64le",
    "mips64p32",
    "mips64p32le",
    "ppc",
    "ppc64",
    "ppc64le",
    "riscv",
    "riscv64",
    "s390",
    "s390x",
    "sparc",
    "sparc64",
    "wasm",
];

static BUILD_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^//go:build\s+(.+?)\s*$").expect("valid go:build regex"));

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildContext {
    pub os: String,
    pub arch: String,
    pub toolchain: String,
}

impl BuildContext {
    pub fn new(os: impl Into<String>, arch: impl Into<String>, toolchain: impl Into<String>) -> Self {
        Self {
            os: os.into(),
            arch: arch.into(),
            toolchain: toolchain.into(),
        }
    }

    fn toolchain_minor(&self) -> Option<u32> {
        let rest = self.toolchain.strip_prefix("go1")?;
        let rest = match rest.strip_prefix('.') {
            Some(r) => r,
            None => return Some(0),
        };
        let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
        digits.parse().ok()
    }

    pub fn match_tag(&self, tag: &str) -> bool {
        if tag == self.os || tag == self.arch {
            return true;
        }
        match tag {
            "linux" if self.os == "android" => true,
            "solaris" if self.os == "illumos" => true,
            "darwin" if self.os == "ios" => true,
            "unix" => UNIX_OS.contains(&self.os.as_str()),
            "gc" => true,
            _ => self.match_release_tag(tag),
        }
    }

    fn match_release_tag(&self, tag: &str) -> bool {
        let Some(rest) = tag.strip_prefix("go1.") else {
            return false;
        };
        let Ok(minor) = rest.parse::<u32>() else {
            return false;
        };
        match self.toolchain_minor() {
            Some(have) => minor <= have,
            None => true,
        }
    }

    pub fn good_os_arch_file(&self, file_name: &str) -> bool {
        let mut name = file_name;
        if let Some(dot) = name.find('.') {
            name = &name[..dot];
        }
        let Some(i) = name.find('_') else {
            return true;
        };
        let mut parts: Vec<&str> = name[i..].split('_').collect();
        if parts.last() == Some(&"test") {
            parts.pop();
        }
        let n = parts.len();
        if n >= 2 && KNOWN_OS.contains(&parts[n - 2]) && KNOWN_ARCH.contains(&parts[n - 1]) {
            return self.match_tag(parts[n - 2]) && self.match_tag(parts[n - 1]);
        }
        if n >= 1 && (KNOWN_OS.contains(&parts[n - 1]) || KNOWN_ARCH.contains(&parts[n - 1])) {
            return self.match_tag(parts[n - 1]);
        }
        true
    }

    pub fn eval_build_expr(&self, expr: &str) -> Result<bool, String> {
        let tokens = tokenize(expr)?;
        let mut p = ExprParser {
            tokens: &tokens,
            pos: 0,
            ctx: self,
        };
        let v = p.parse_or()?;
        if p.pos != tokens.len() {
            return Err(format!("unexpected token in build constraint: {}", expr));
        }
        Ok(v)
    }
}

// Returns the `//go:build` expression from the comment block preceding the package clause.
pub fn find_build_line(src: &str) -> Option<&str> {
    let mut in_block = false;
    for line in src.lines() {
        let t = line.trim();
        if in_block {
            if let Some(end) = t.find("*/") {
                if !t[end + 2..].trim().is_empty() {
                    return None;
                }
                in_block = false;
            }
            continue;
        }
        if t.is_empty() {
            continue;
        }
        if let Some(rest) = t.strip_prefix("/*") {
            match rest.find("*/") {
                // Code after the comment on the same line ends the header.
                Some(end) if !rest[end + 2..].trim().is_empty() => return None,
                Some(_) => {}
                None => in_block = true,
            }
            continue;
        }
        if !t.starts_with("//") {
            return None;
        }
        if let Some(c) = BUILD_LINE.captures(t) {
            return c.get(1).map(|m| m.as_str());
        }
    }
    None
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Tok {
    Tag(String),
    Not,
    And,
    Or,
    LParen,
    RParen,
}

fn tokenize(expr: &str) -> Result<Vec<Tok>, String> {
    let mut out = Vec::new();
    let mut chars = expr.chars().peekable();
    while let Some(&c) = chars.peek() {
        match c {
            ' ' | '\t' => {
                chars.next();
            }
            '!' => {
                chars.next();
                out.push(Tok::Not);
            }
            '(' => {
                chars.next();
                out.push(Tok::LParen);
            }
            ')' => {
                chars.next();
                out.push(Tok::RParen);
            }
            '&' | '|' => {
                chars.next();
                if chars.next() != Some(c) {
                    return Err(format!("invalid operator in build constraint: {}", expr));
                }
                out.push(if c == '&' { Tok::And } else { Tok::Or });
            }
            c if c.is_alphanumeric() || c == '_' || c == '.' => {
                let mut tag = String::new();
                while let Some(&c) = chars.peek() {
                    if c.is_alphanumeric() || c == '_' || c == '.' {
                        tag.push(c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                out.push(Tok::Tag(tag));
            }
            other => {
                return Err(format!(
                    "invalid character '{}' in build constraint: {}",
                    other, expr
                ));
            }
        }
    }
    Ok(out)
}

struct ExprParser<'a> {
    tokens: &'a [Tok],
    pos: usize,
    ctx: &'a BuildContext,
}

impl ExprParser<'_> {
    fn peek(&self) -> Option<&Tok> {
        self.tokens.get(self.pos)
    }

    fn parse_or(&mut self) -> Result<bool, String> {
        let mut v = self.parse_and()?;
        while self.peek() == Some(&Tok::Or) {
            self.pos += 1;
            let rhs = self.parse_and()?;
            v = v || rhs;
        }
        Ok(v)
    }

    fn parse_and(&mut self) -> Result<bool, String> {
        let mut v = self.parse_not()?;
        while self.peek() == Some(&Tok::And) {
            self.pos += 1;
            let rhs = self.parse_not()?;
            v = v && rhs;
        }
        Ok(v)
    }

    fn parse_not(&mut self) -> Result<bool, String> {
        if self.peek() == Some(&Tok::Not) {
            self.pos += 1;
            return Ok(!self.parse_not()?);
        }
        self.parse_atom()
    }

    fn parse_atom(&mut self) -> Result<bool, String> {
        match self.tokens.get(self.pos) {
            Some(Tok::LParen) => {
                self.pos += 1;
                let v = self.parse_or()?;
                if self.peek() != Some(&Tok::RParen) {
                    return Err("missing ')' in build constraint".to_string());
                }
                self.pos += 1;
                Ok(v)
            }
            Some(Tok::Tag(t)) => {
                self.pos += 1;
                Ok(self.ctx.match_tag(t))
            }
            _ => Err("expected build tag".to_string()),
        }
    }
}

//! Matching of container entry names against declared paths.
//!
//! Declared paths are either exact names or globs. Globs are translated to
//! anchored regular expressions once, at library load; paths that mention the
//! container's own file name are translated per container.
//!
//! | Glob                  | Meaning                                    |
//! |-----------------------|--------------------------------------------|
//! | `*`                   | any run of characters except `/`           |
//! | `?`                   | one character except `/`                   |
//! | `**`                  | any run of characters, including `/`       |
//! | `**/`                 | zero or more leading directories           |
//! | `{a,b}`               | either alternative                         |
//! | `{containerFileName}` | container file name without its extension  |

use crate::error::{Result, SignatureError};
use regex::Regex;
use std::path::Path;

const CONTAINER_FILE_NAME: &str = "containerFileName";

/// A declared entry path, as loaded from signature definitions.
#[derive(Debug, Clone)]
pub enum PathPattern {
    /// Compared byte for byte with each entry name.
    Exact(String),
    /// A glob independent of the container.
    Glob { source: String, regex: Regex },
    /// A path that mentions `{containerFileName}`.
    Templated { source: String, has_wildcards: bool },
}

/// A declared path resolved for one container.
#[derive(Debug, Clone)]
pub enum BoundPath {
    Exact(String),
    Glob(Regex),
    /// The path refers to the container's file name, which is unknown.
    Unresolvable,
}

impl PathPattern {
    /// Parse a declared path. Trailing `/` characters are removed first.
    pub fn parse(path: &str) -> Result<Self> {
        let path = normalize_entry_name(path);
        if path.is_empty() {
            return Err(SignatureError::Definition(
                "entry path must not be empty".to_string(),
            ));
        }

        let template = format!("{{{}}}", CONTAINER_FILE_NAME);
        if path.contains(&template) {
            // validate the remaining glob syntax up front
            glob_to_regex(path, Some("x"))?;
            let has_wildcards = has_glob_syntax(&path.replace(&template, ""));
            return Ok(PathPattern::Templated {
                source: path.to_string(),
                has_wildcards,
            });
        }

        if has_glob_syntax(path) {
            let regex = compile_regex(&glob_to_regex(path, None)?)?;
            return Ok(PathPattern::Glob {
                source: path.to_string(),
                regex,
            });
        }

        Ok(PathPattern::Exact(path.to_string()))
    }

    pub fn source(&self) -> &str {
        match self {
            PathPattern::Exact(source)
            | PathPattern::Glob { source, .. }
            | PathPattern::Templated { source, .. } => source,
        }
    }

    /// Resolve the pattern for a container with the given file name.
    pub fn bind(&self, container_name: Option<&str>) -> BoundPath {
        match self {
            PathPattern::Exact(name) => BoundPath::Exact(name.clone()),
            PathPattern::Glob { regex, .. } => BoundPath::Glob(regex.clone()),
            PathPattern::Templated {
                source,
                has_wildcards,
            } => {
                let Some(stem) = container_name.map(container_stem) else {
                    return BoundPath::Unresolvable;
                };

                if !has_wildcards {
                    let template = format!("{{{}}}", CONTAINER_FILE_NAME);
                    return BoundPath::Exact(source.replace(&template, &stem));
                }

                match glob_to_regex(source, Some(&stem)).and_then(|re| compile_regex(&re)) {
                    Ok(regex) => BoundPath::Glob(regex),
                    Err(err) => {
                        tracing::warn!(path = %source, error = %err, "Could not resolve entry path");
                        BoundPath::Unresolvable
                    }
                }
            }
        }
    }
}

impl PartialEq for PathPattern {
    fn eq(&self, other: &Self) -> bool {
        self.source() == other.source()
    }
}

impl Eq for PathPattern {}

impl BoundPath {
    #[inline]
    pub fn matches(&self, entry_name: &str) -> bool {
        match self {
            BoundPath::Exact(name) => name == entry_name,
            BoundPath::Glob(regex) => regex.is_match(entry_name),
            BoundPath::Unresolvable => false,
        }
    }

    /// Whether any one matching entry can satisfy the path on its own.
    pub fn is_wildcard(&self) -> bool {
        matches!(self, BoundPath::Glob(_))
    }
}

/// Strip trailing `/` from an entry or declared path.
pub fn normalize_entry_name(name: &str) -> &str {
    name.trim_end_matches('/')
}

/// The container's file name without directories and without its last extension.
pub fn container_stem(container_name: &str) -> String {
    let file_name = Path::new(container_name)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(container_name);

    match file_name.rfind('.') {
        Some(dot) if dot > 0 => file_name[..dot].to_string(),
        _ => file_name.to_string(),
    }
}

fn has_glob_syntax(path: &str) -> bool {
    path.contains(|c: char| matches!(c, '*' | '?' | '{'))
}

fn compile_regex(pattern: &str) -> Result<Regex> {
    Regex::new(pattern)
        .map_err(|e| SignatureError::Definition(format!("invalid entry path pattern: {}", e)))
}

/// Translate a glob into an anchored regular expression.
fn glob_to_regex(glob: &str, stem: Option<&str>) -> Result<String> {
    let chars: Vec<char> = glob.chars().collect();
    let mut out = String::with_capacity(glob.len() * 2 + 2);
    out.push('^');

    let mut i = 0;
    while i < chars.len() {
        match chars[i] {
            '*' if chars.get(i + 1) == Some(&'*') => {
                if chars.get(i + 2) == Some(&'/') {
                    out.push_str("(?:.*/)?");
                    i += 3;
                } else {
                    out.push_str(".*");
                    i += 2;
                }
                continue;
            }
            '*' => out.push_str("[^/]*"),
            '?' => out.push_str("[^/]"),
            '{' => {
                let close = chars[i..]
                    .iter()
                    .position(|&c| c == '}')
                    .map(|p| i + p)
                    .ok_or_else(|| {
                        SignatureError::Definition(format!("unterminated '{{' in entry path {}", glob))
                    })?;
                let body: String = chars[i + 1..close].iter().collect();

                if body == CONTAINER_FILE_NAME {
                    let stem = stem.ok_or_else(|| {
                        SignatureError::Definition(format!(
                            "entry path {} needs the container file name",
                            glob
                        ))
                    })?;
                    out.push_str(&regex::escape(stem));
                } else {
                    let alternatives: Vec<String> =
                        body.split(',').map(regex::escape).collect();
                    out.push_str("(?:");
                    out.push_str(&alternatives.join("|"));
                    out.push(')');
                }
                i = close + 1;
                continue;
            }
            c => out.push_str(&regex::escape(c.encode_utf8(&mut [0u8; 4]))),
        }
        i += 1;
    }

    out.push('$');
    Ok(out)
}

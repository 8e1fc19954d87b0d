//! SPICE subcircuit netlist parser.
//!
//! Supports `.subckt`/`.ends`, `X` instances with optional `key=value`
//! parameters, `.include`, and `.end`. Lines starting with `*` are comments,
//! `$` starts an inline comment, and `+` continues the previous line.

use std::path::{Path, PathBuf};

use arcstr::ArcStr;
use thiserror::Error;

use super::{Instance, Library, Subckt};

/// Directives that are accepted but have no effect on the netlist.
const IGNORED_DIRECTIVES: [&str; 6] = [".title", ".option", ".options", ".lib", ".global", ".param"];

/// A SPICE token.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum Token {
    /// A word with a leading dot, such as `.subckt`.
    ///
    /// Case is preserved.
    Directive(ArcStr),
    /// Any other word.
    Ident(ArcStr),
    /// An equal sign.
    Equals,
}

/// One logical line: a physical line plus any `+` continuation lines.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct LogicalLine {
    /// The 1-based line number of the first physical line.
    pub line: usize,
    pub tokens: Vec<Token>,
}

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("line {line}: unexpected `.ends` outside of a subcircuit")]
    UnexpectedEnds { line: usize },

    #[error("line {line}: `.subckt {name}` opened inside subcircuit `{parent}`")]
    NestedSubckt {
        line: usize,
        name: ArcStr,
        parent: ArcStr,
    },

    #[error("subcircuit `{name}` opened on line {line} is never closed")]
    UnterminatedSubckt { line: usize, name: ArcStr },

    #[error("line {line}: `.ends {found}` closes subcircuit `{expected}`")]
    MismatchedEnds {
        line: usize,
        expected: ArcStr,
        found: ArcStr,
    },

    #[error("line {line}: unsupported element type `{kind}`")]
    UnsupportedElement { line: usize, kind: char },

    #[error("line {line}: unsupported directive `{directive}`")]
    UnsupportedDirective { line: usize, directive: ArcStr },

    #[error("line {line}: {reason}")]
    InvalidLine { line: usize, reason: String },

    #[error("line {line}: line continuation without a preceding line")]
    LeadingContinuation { line: usize },

    #[error("relative include `{0}` has no enclosing file to resolve against")]
    UnexpectedRelativePath(ArcStr),

    #[error("include cycle through `{0:?}`")]
    IncludeCycle(PathBuf),

    #[error("failed to read file at path `{path:?}`: {err}")]
    FailedToRead {
        path: PathBuf,
        #[source]
        err: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, ParseError>;

#[derive(Default)]
enum ReaderState {
    #[default]
    Top,
    Subckt { line: usize, subckt: Subckt },
}

/// Parses SPICE netlists into a [`Library`].
#[derive(Default)]
pub struct Parser {
    lib: Library,
    include_stack: Vec<PathBuf>,
    state: ReaderState,
}

impl Parser {
    /// Parses the file at `path`, following `.include` directives.
    pub fn parse_file(path: impl AsRef<Path>) -> Result<Library> {
        let mut parser = Self::default();
        parser.parse_file_inner(path.as_ref())?;
        Ok(parser.lib)
    }

    /// Parses netlist text.
    ///
    /// Relative `.include` paths are rejected, since there is no file to
    /// resolve them against.
    pub fn parse(data: &str) -> Result<Library> {
        let mut parser = Self::default();
        parser.parse_inner(data)?;
        Ok(parser.lib)
    }

    fn parse_file_inner(&mut self, path: &Path) -> Result<()> {
        // The include stack holds canonical paths, so `a/../b.spice` and
        // `b.spice` are the same file.
        let path = std::fs::canonicalize(path).map_err(|err| ParseError::FailedToRead {
            path: path.into(),
            err,
        })?;
        if self.include_stack.contains(&path) {
            return Err(ParseError::IncludeCycle(path));
        }
        log::debug!("reading SPICE file: {:?}", path);
        let data = std::fs::read_to_string(&path).map_err(|err| ParseError::FailedToRead {
            path: path.clone(),
            err,
        })?;
        self.include_stack.push(path);
        let res = self.parse_inner(&data);
        self.include_stack.pop();
        res
    }

    fn parse_inner(&mut self, data: &str) -> Result<()> {
        // Each file is parsed independently; a subckt may not span files.
        let outer = std::mem::take(&mut self.state);

        for line in tokenize(data)? {
            if !self.parse_line(line)? {
                break;
            }
        }

        if let ReaderState::Subckt { line, subckt } = std::mem::replace(&mut self.state, outer) {
            return Err(ParseError::UnterminatedSubckt {
                line,
                name: subckt.name,
            });
        }
        Ok(())
    }

    /// Returns `false` once `.end` is reached.
    fn parse_line(&mut self, line: LogicalLine) -> Result<bool> {
        let LogicalLine { line: num, tokens } = line;
        match &tokens[0] {
            Token::Directive(d) => {
                let directive = d.to_ascii_lowercase();
                match directive.as_str() {
                    ".subckt" => self.open_subckt(num, &tokens)?,
                    ".ends" => self.close_subckt(num, &tokens)?,
                    ".include" | ".inc" => {
                        let path = ident(num, &tokens, 1, "`.include` requires a path")?;
                        self.include(path.trim_matches(|c| c == '"' || c == '\''))?;
                    }
                    ".end" => return Ok(false),
                    d if IGNORED_DIRECTIVES.contains(&d) => {
                        log::debug!("line {num}: ignoring directive `{d}`");
                    }
                    _ => {
                        return Err(ParseError::UnsupportedDirective {
                            line: num,
                            directive: d.clone(),
                        })
                    }
                }
            }
            Token::Ident(id) => {
                let kind = id.chars().next().map(|c| c.to_ascii_uppercase());
                if kind != Some('X') {
                    return Err(ParseError::UnsupportedElement {
                        line: num,
                        kind: kind.unwrap_or(' '),
                    });
                }
                let inst = parse_instance(num, &tokens)?;
                match &mut self.state {
                    ReaderState::Top => self.lib.top_instances.push(inst),
                    ReaderState::Subckt { subckt, .. } => subckt.instances.push(inst),
                }
            }
            Token::Equals => {
                return Err(ParseError::InvalidLine {
                    line: num,
                    reason: "line starts with `=`".to_string(),
                })
            }
        }
        Ok(true)
    }

    fn open_subckt(&mut self, line: usize, tokens: &[Token]) -> Result<()> {
        let name = ident(line, tokens, 1, "`.subckt` requires a name")?.clone();
        if let ReaderState::Subckt { subckt, .. } = &self.state {
            return Err(ParseError::NestedSubckt {
                line,
                name,
                parent: subckt.name.clone(),
            });
        }
        // Parameter defaults (`name=value`) after the ports are dropped.
        let end = tokens
            .iter()
            .position(|t| *t == Token::Equals)
            .map(|i| i - 1)
            .unwrap_or(tokens.len());
        let ports = tokens[2..end.max(2)]
            .iter()
            .map(|t| token_ident(line, t).cloned())
            .collect::<Result<Vec<_>>>()?;
        self.state = ReaderState::Subckt {
            line,
            subckt: Subckt::new(name, ports),
        };
        Ok(())
    }

    fn close_subckt(&mut self, line: usize, tokens: &[Token]) -> Result<()> {
        match std::mem::take(&mut self.state) {
            ReaderState::Top => Err(ParseError::UnexpectedEnds { line }),
            ReaderState::Subckt { subckt, .. } => {
                if let Some(Token::Ident(found)) = tokens.get(1) {
                    if *found != subckt.name {
                        return Err(ParseError::MismatchedEnds {
                            line,
                            expected: subckt.name,
                            found: found.clone(),
                        });
                    }
                }
                self.lib.add_cell(subckt);
                Ok(())
            }
        }
    }

    fn include(&mut self, path: &str) -> Result<()> {
        let path = Path::new(path);
        let resolved = if path.is_relative() {
            let root = self
                .include_stack
                .last()
                .ok_or_else(|| {
                    ParseError::UnexpectedRelativePath(ArcStr::from(path.to_string_lossy().as_ref()))
                })?;
            root.parent().unwrap_or(Path::new("")).join(path)
        } else {
            path.to_path_buf()
        };
        self.lib.includes.push(resolved.clone());
        self.parse_file_inner(&resolved)
    }
}

/// Parses `Xname net... child [key=value...]`.
fn parse_instance(line: usize, tokens: &[Token]) -> Result<Instance> {
    // The child is the last token before the first `key=value` pair.
    let child_idx = match tokens.iter().position(|t| *t == Token::Equals) {
        Some(pos) if pos >= 2 => pos - 2,
        Some(_) => {
            return Err(ParseError::InvalidLine {
                line,
                reason: "instance parameter without a subcircuit name".to_string(),
            })
        }
        None => tokens.len() - 1,
    };
    if child_idx == 0 {
        return Err(ParseError::InvalidLine {
            line,
            reason: "instance has no subcircuit name".to_string(),
        });
    }

    let name = token_ident(line, &tokens[0])?.clone();
    let child = token_ident(line, &tokens[child_idx])?.clone();
    let connections = tokens[1..child_idx]
        .iter()
        .map(|t| token_ident(line, t).cloned())
        .collect::<Result<Vec<_>>>()?;

    let rest = &tokens[child_idx + 1..];
    if rest.len() % 3 != 0 {
        return Err(ParseError::InvalidLine {
            line,
            reason: "malformed instance parameters".to_string(),
        });
    }
    let params = rest
        .chunks(3)
        .map(|chunk| match chunk {
            [Token::Ident(k), Token::Equals, Token::Ident(v)] => Ok((k.clone(), v.clone())),
            _ => Err(ParseError::InvalidLine {
                line,
                reason: "expected `key=value` parameter".to_string(),
            }),
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(Instance {
        name,
        child,
        connections,
        params,
    })
}

fn ident<'a>(line: usize, tokens: &'a [Token], idx: usize, reason: &str) -> Result<&'a ArcStr> {
    match tokens.get(idx) {
        Some(Token::Ident(id)) => Ok(id),
        _ => Err(ParseError::InvalidLine {
            line,
            reason: reason.to_string(),
        }),
    }
}

fn token_ident(line: usize, token: &Token) -> Result<&ArcStr> {
    match token {
        Token::Ident(id) => Ok(id),
        tok => Err(ParseError::InvalidLine {
            line,
            reason: format!("unexpected token {tok:?}"),
        }),
    }
}

/// Splits netlist text into logical lines of tokens.
///
/// Comment and blank lines produce nothing.
pub fn tokenize(data: &str) -> Result<Vec<LogicalLine>> {
    let mut lines: Vec<LogicalLine> = Vec::new();

    for (i, raw) in data.lines().enumerate() {
        let trimmed = raw.trim_start();
        if trimmed.is_empty() || trimmed.starts_with('*') {
            continue;
        }
        let content = match trimmed.find('$') {
            Some(pos) => &trimmed[..pos],
            None => trimmed,
        };

        if let Some(cont) = content.strip_prefix('+') {
            let last = lines
                .last_mut()
                .ok_or(ParseError::LeadingContinuation { line: i + 1 })?;
            tokenize_into(cont, &mut last.tokens);
            continue;
        }

        let mut tokens = Vec::new();
        tokenize_into(content, &mut tokens);
        if !tokens.is_empty() {
            lines.push(LogicalLine {
                line: i + 1,
                tokens,
            });
        }
    }

    Ok(lines)
}

fn tokenize_into(s: &str, tokens: &mut Vec<Token>) {
    for word in s.split_whitespace() {
        let mut parts = word.split('=').peekable();
        while let Some(part) = parts.next() {
            if !part.is_empty() {
                tokens.push(if part.starts_with('.') && tokens.is_empty() {
                    Token::Directive(part.into())
                } else {
                    Token::Ident(part.into())
                });
            }
            if parts.peek().is_some() {
                tokens.push(Token::Equals);
            }
        }
    }
}

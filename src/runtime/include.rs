use std::collections::{BTreeMap, HashMap, VecDeque};
use std::fmt;
use std::str::FromStr;

use super::error::{Error, Result};

/// Which relations to eager-load, rooted at `table`.
///
/// Written as `orders{customers,line_items{products}}`; a bare name means
/// nothing below it is loaded.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct IncludeSpec {
    table: String,
    includes: BTreeMap<String, IncludeSpec>,
}

impl IncludeSpec {
    pub fn new(table: impl Into<String>) -> Self {
        IncludeSpec {
            table: table.into(),
            includes: BTreeMap::new(),
        }
    }

    pub fn with(mut self, sub: IncludeSpec) -> Self {
        self.include(sub);
        self
    }

    /// Add `sub` under its own table name, merging with an existing entry.
    pub fn include(&mut self, sub: IncludeSpec) {
        match self.includes.get_mut(&sub.table) {
            Some(existing) => {
                for (_, nested) in sub.includes {
                    existing.include(nested);
                }
            }
            None => {
                self.includes.insert(sub.table.clone(), sub);
            }
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn get(&self, table: &str) -> Option<&IncludeSpec> {
        self.includes.get(table)
    }

    pub fn is_empty(&self) -> bool {
        self.includes.is_empty()
    }

    /// Whether loading `self` also loads everything `other` asks for.
    pub fn covers(&self, other: &IncludeSpec) -> bool {
        self.table == other.table
            && other
                .includes
                .iter()
                .all(|(name, sub)| self.includes.get(name).is_some_and(|s| s.covers(sub)))
    }

    pub fn iter(&self) -> impl Iterator<Item = &IncludeSpec> {
        self.includes.values()
    }

    pub fn parse(text: &str) -> std::result::Result<Self, ParseIncludeError> {
        let mut parser = Parser {
            chars: text.char_indices().peekable(),
            text,
        };
        let spec = parser.spec()?;
        parser.skip_ws();
        match parser.chars.next() {
            None => Ok(spec),
            Some((pos, c)) => Err(ParseIncludeError::Unexpected { pos, found: c }),
        }
    }
}

impl fmt::Display for IncludeSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.table)?;
        if self.includes.is_empty() {
            return Ok(());
        }
        f.write_str("{")?;
        for (i, sub) in self.includes.values().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{}", sub)?;
        }
        f.write_str("}")
    }
}

impl FromStr for IncludeSpec {
    type Err = ParseIncludeError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        IncludeSpec::parse(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseIncludeError {
    #[error("expected a table name at {pos}")]
    ExpectedName { pos: usize },
    #[error("unexpected '{found}' at {pos}")]
    Unexpected { pos: usize, found: char },
    #[error("unterminated '{{'")]
    Unterminated,
}

struct Parser<'a> {
    chars: std::iter::Peekable<std::str::CharIndices<'a>>,
    text: &'a str,
}

impl Parser<'_> {
    fn skip_ws(&mut self) {
        while self.chars.next_if(|(_, c)| c.is_whitespace()).is_some() {}
    }

    fn name(&mut self) -> std::result::Result<String, ParseIncludeError> {
        self.skip_ws();
        let start = match self.chars.peek() {
            Some((pos, _)) => *pos,
            None => self.text.len(),
        };
        let mut end = start;
        while let Some((pos, c)) = self.chars.next_if(|(_, c)| c.is_alphanumeric() || *c == '_') {
            end = pos + c.len_utf8();
        }
        if end == start {
            return Err(ParseIncludeError::ExpectedName { pos: start });
        }
        Ok(self.text[start..end].to_string())
    }

    fn spec(&mut self) -> std::result::Result<IncludeSpec, ParseIncludeError> {
        let mut spec = IncludeSpec::new(self.name()?);
        self.skip_ws();
        if self.chars.next_if(|(_, c)| *c == '{').is_none() {
            return Ok(spec);
        }
        self.skip_ws();
        if self.chars.next_if(|(_, c)| *c == '}').is_some() {
            return Ok(spec);
        }
        loop {
            spec.include(self.spec()?);
            self.skip_ws();
            match self.chars.next() {
                Some((_, ',')) => continue,
                Some((_, '}')) => return Ok(spec),
                Some((pos, c)) => return Err(ParseIncludeError::Unexpected { pos, found: c }),
                None => return Err(ParseIncludeError::Unterminated),
            }
        }
    }
}

/// Direct adjacency between tables, as seen by include specs.
pub trait IncludeGraph {
    fn adjacent(&self, table: &str) -> Vec<&str>;

    fn is_neighbor(&self, table: &str, other: &str) -> bool {
        self.adjacent(table).iter().any(|n| *n == other)
    }

    /// Tables between `from` and `to` on a shortest path, or `None` when
    /// `to` can't be reached at all.
    fn path_between(&self, from: &str, to: &str) -> Option<Vec<String>> {
        let mut parent: HashMap<String, String> = HashMap::new();
        let mut queue = VecDeque::from([from.to_string()]);
        while let Some(next) = queue.pop_front() {
            for n in self.adjacent(&next) {
                if n == from || parent.contains_key(n) {
                    continue;
                }
                parent.insert(n.to_string(), next.clone());
                if n == to {
                    let mut path = Vec::new();
                    let mut at = next.clone();
                    while let Some(up) = parent.get(&at) {
                        path.push(at.clone());
                        at = up.clone();
                    }
                    path.reverse();
                    return Some(path);
                }
                queue.push_back(n.to_string());
            }
        }
        None
    }
}

/// The form emitted into generated code: `(table, neighbors)` pairs.
impl IncludeGraph for [(&str, &[&str])] {
    fn adjacent(&self, table: &str) -> Vec<&str> {
        self.iter()
            .find(|(t, _)| *t == table)
            .map(|(_, n)| n.to_vec())
            .unwrap_or_default()
    }
}

/// Check `spec` against `graph` before anything is loaded: the root must be
/// `expected`, and every nested key a direct neighbor of its parent. A key
/// that is only reachable further out is reported with the tables to nest
/// it under.
pub fn validate_includes<G: IncludeGraph + ?Sized>(
    graph: &G,
    expected: &str,
    spec: &IncludeSpec,
) -> Result<()> {
    if spec.table() != expected {
        return Err(Error::IncludeTableMismatch {
            expected: expected.to_string(),
            found: spec.table().to_string(),
        });
    }
    for sub in spec.iter() {
        if !graph.is_neighbor(expected, sub.table()) {
            return Err(Error::IncludeNotReachable {
                table: expected.to_string(),
                include: sub.table().to_string(),
                via: graph.path_between(expected, sub.table()).unwrap_or_default(),
            });
        }
        validate_includes(graph, sub.table(), sub)?;
    }
    Ok(())
}

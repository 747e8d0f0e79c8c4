//! Light Path Expression mini-language (spec.md §6): a regular expression
//! over path tokens (`C E B D S T V R`, plus `.`, alternation, Kleene star,
//! `+`/`?`, character classes and grouping) that gates which contributions
//! reach a given output channel.

use std::iter::Peekable;
use std::str::Chars;

/// A single light-path token, e.g. `C` (camera vertex), `D` (diffuse
/// scatter), `R` (reflect event), `E` (emission vertex) — spec.md §6/§9
/// scenario S6 (`"C D R E"`).
pub type Token = char;

#[derive(Debug, thiserror::Error)]
pub enum LpeParseError {
    #[error("unexpected end of LPE expression")]
    UnexpectedEnd,
    #[error("expected '{expected}' at position {pos}")]
    Expected { expected: char, pos: usize },
}

#[derive(Debug, Clone)]
enum Node {
    Lit(Token),
    Any,
    Class(Vec<Token>, bool),
    Concat(Vec<Node>),
    Alt(Vec<Node>),
    Star(Box<Node>),
    Plus(Box<Node>),
    Opt(Box<Node>),
}

/// A compiled LPE expression. Matching is a backtracking search over the
/// token sequence (paths are at most a few dozen tokens long, so this is
/// simpler and fast enough relative to building a full automaton).
#[derive(Debug, Clone)]
pub struct LpeExpr {
    root: Node,
    source: String,
}

impl LpeExpr {
    pub fn compile(expr: &str) -> Result<Self, LpeParseError> {
        let mut parser = Parser {
            chars: expr.chars().peekable(),
            pos: 0,
        };
        let root = parser.parse_alt()?;
        Ok(Self {
            root,
            source: expr.to_string(),
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Whether the full token sequence is accepted, anchored at both ends
    /// (spec.md §6: "iff the regex accepts the path token sequence
    /// left-to-right").
    pub fn matches(&self, path: &[Token]) -> bool {
        match_node(&self.root, path, 0, &|p| p == path.len())
    }
}

struct Parser<'a> {
    chars: Peekable<Chars<'a>>,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn next(&mut self) -> Option<char> {
        let c = self.chars.next();
        if c.is_some() {
            self.pos += 1;
        }
        c
    }

    fn peek(&mut self) -> Option<char> {
        self.chars.peek().copied()
    }

    fn expect(&mut self, expected: char) -> Result<(), LpeParseError> {
        match self.next() {
            Some(c) if c == expected => Ok(()),
            _ => Err(LpeParseError::Expected {
                expected,
                pos: self.pos,
            }),
        }
    }

    fn parse_alt(&mut self) -> Result<Node, LpeParseError> {
        let mut branches = vec![self.parse_concat()?];
        while self.peek() == Some('|') {
            self.next();
            branches.push(self.parse_concat()?);
        }
        Ok(if branches.len() == 1 {
            branches.pop().unwrap()
        } else {
            Node::Alt(branches)
        })
    }

    fn parse_concat(&mut self) -> Result<Node, LpeParseError> {
        let mut parts = Vec::new();
        while let Some(c) = self.peek() {
            if c == '|' || c == ')' {
                break;
            }
            parts.push(self.parse_repeat()?);
        }
        Ok(if parts.len() == 1 {
            parts.pop().unwrap()
        } else {
            Node::Concat(parts)
        })
    }

    fn parse_repeat(&mut self) -> Result<Node, LpeParseError> {
        let atom = self.parse_atom()?;
        Ok(match self.peek() {
            Some('*') => {
                self.next();
                Node::Star(Box::new(atom))
            }
            Some('+') => {
                self.next();
                Node::Plus(Box::new(atom))
            }
            Some('?') => {
                self.next();
                Node::Opt(Box::new(atom))
            }
            _ => atom,
        })
    }

    fn parse_atom(&mut self) -> Result<Node, LpeParseError> {
        match self.next().ok_or(LpeParseError::UnexpectedEnd)? {
            '(' => {
                let inner = self.parse_alt()?;
                self.expect(')')?;
                Ok(inner)
            }
            '.' => Ok(Node::Any),
            '[' => self.parse_class(),
            c => Ok(Node::Lit(c)),
        }
    }

    fn parse_class(&mut self) -> Result<Node, LpeParseError> {
        let negated = if self.peek() == Some('^') {
            self.next();
            true
        } else {
            false
        };
        let mut set = Vec::new();
        while let Some(c) = self.peek() {
            if c == ']' {
                break;
            }
            set.push(c);
            self.next();
        }
        self.expect(']')?;
        Ok(Node::Class(set, negated))
    }
}

fn match_node(node: &Node, path: &[Token], pos: usize, cont: &dyn Fn(usize) -> bool) -> bool {
    match node {
        Node::Lit(c) => path.get(pos) == Some(c) && cont(pos + 1),
        Node::Any => pos < path.len() && cont(pos + 1),
        Node::Class(set, negated) => match path.get(pos) {
            Some(ch) => (set.contains(ch) != *negated) && cont(pos + 1),
            None => false,
        },
        Node::Concat(parts) => match_concat(parts, 0, path, pos, cont),
        Node::Alt(branches) => branches.iter().any(|b| match_node(b, path, pos, cont)),
        Node::Opt(inner) => match_node(inner, path, pos, cont) || cont(pos),
        Node::Star(inner) => match_star(inner, path, pos, cont),
        Node::Plus(inner) => match_node(inner, path, pos, &|p| match_star(inner, path, p, cont)),
    }
}

fn match_concat(
    parts: &[Node],
    idx: usize,
    path: &[Token],
    pos: usize,
    cont: &dyn Fn(usize) -> bool,
) -> bool {
    if idx == parts.len() {
        cont(pos)
    } else {
        match_node(&parts[idx], path, pos, &|p| {
            match_concat(parts, idx + 1, path, p, cont)
        })
    }
}

fn match_star(inner: &Node, path: &[Token], pos: usize, cont: &dyn Fn(usize) -> bool) -> bool {
    let advanced = match_node(inner, path, pos, &|p| {
        if p > pos {
            match_star(inner, path, p, cont)
        } else {
            cont(p)
        }
    });
    advanced || cont(pos)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn camera_dot_star_matches_any_camera_started_path() {
        let e = LpeExpr::compile("C.*").unwrap();
        assert!(e.matches(&['C', 'D', 'R', 'E']));
        assert!(!e.matches(&['B', 'E']));
    }

    #[test]
    fn scatter_class_followed_by_emission() {
        let e = LpeExpr::compile("C[DS]+E").unwrap();
        assert!(e.matches(&['C', 'D', 'E']));
        assert!(e.matches(&['C', 'D', 'S', 'E']));
        assert!(!e.matches(&['C', 'V', 'E']));
    }

    #[test]
    fn scenario_s6_lpe_match() {
        let path = ['C', 'D', 'R', 'E'];
        let accept = LpeExpr::compile("CD.*E").unwrap();
        let reject = LpeExpr::compile("CS.*E").unwrap();
        assert!(accept.matches(&path));
        assert!(!reject.matches(&path));
    }

    #[test]
    fn alternation_and_grouping() {
        let e = LpeExpr::compile("C(D|S)E").unwrap();
        assert!(e.matches(&['C', 'D', 'E']));
        assert!(e.matches(&['C', 'S', 'E']));
        assert!(!e.matches(&['C', 'V', 'E']));
    }
}

//! Boolean expression filter over document name, size, and tags.
//!
//! Recognized forms: `n == 'lit'`, `n != 'lit'`, `n =~ 'regex'`,
//! `s <op> int` for `< <= == >= > !=`, the tag calls `t('x')` (any),
//! `ti('x','y')` (all), `nt('x')` (none) with their long aliases
//! `tag`/`tagInclusive`/`noTag`, parentheses, and `&&`/`||` with `&&`
//! binding tighter. The empty expression matches everything.

mod parse;

use regex::Regex;

use crate::error::Result;

/// Candidate document projected out of the name index for evaluation.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    /// Opaque server name, carried through so survivors can be queried.
    pub encoded_name: String,
    /// Decrypted plaintext name.
    pub name: String,
    pub tags: Vec<String>,
    /// Plaintext size in bytes.
    pub size: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SizeOp {
    Lt,
    Le,
    Eq,
    Ge,
    Gt,
    Ne,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TagFn {
    /// True when any named tag is present.
    Any,
    /// True when every named tag is present.
    All,
    /// True when no named tag is present.
    None,
}

#[derive(Debug)]
pub(crate) enum Expr {
    Or(Box<Expr>, Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    NameEq(String),
    NameNe(String),
    NameMatch(Regex),
    Size(SizeOp, i64),
    Tags(TagFn, Vec<String>),
}

impl Expr {
    fn matches(&self, doc: &Document) -> bool {
        match self {
            Expr::Or(a, b) => a.matches(doc) || b.matches(doc),
            Expr::And(a, b) => a.matches(doc) && b.matches(doc),
            Expr::NameEq(lit) => doc.name == *lit,
            Expr::NameNe(lit) => doc.name != *lit,
            Expr::NameMatch(re) => re.is_match(&doc.name),
            Expr::Size(op, n) => match op {
                SizeOp::Lt => doc.size < *n,
                SizeOp::Le => doc.size <= *n,
                SizeOp::Eq => doc.size == *n,
                SizeOp::Ge => doc.size >= *n,
                SizeOp::Gt => doc.size > *n,
                SizeOp::Ne => doc.size != *n,
            },
            Expr::Tags(f, args) => match f {
                TagFn::Any => args.iter().any(|t| doc.tags.iter().any(|d| d == t)),
                TagFn::All => args.iter().all(|t| doc.tags.iter().any(|d| d == t)),
                TagFn::None => !args.iter().any(|t| doc.tags.iter().any(|d| d == t)),
            },
        }
    }
}

/// Evaluate `expression` against every document and return the survivors.
pub fn filter_documents(expression: &str, documents: &[Document]) -> Result<Vec<Document>> {
    let expression = expression.trim();
    if expression.is_empty() {
        return Ok(documents.to_vec());
    }

    let expr = parse::parse(expression)?;
    Ok(documents
        .iter()
        .filter(|doc| expr.matches(doc))
        .cloned()
        .collect())
}

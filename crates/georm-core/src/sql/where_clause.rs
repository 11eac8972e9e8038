//! WHERE clause accumulation with nested groups.

use georm_proto::LogicalOperator;

use crate::error::Error;

#[derive(Debug, Default)]
struct Frame {
    parts: Vec<String>,
    pending: Option<LogicalOperator>,
}

impl Frame {
    fn push(&mut self, predicate: String) {
        if self.parts.is_empty() {
            self.parts.push(predicate);
        } else {
            let op = self.pending.unwrap_or_default();
            self.parts.push(format!("{} {}", op.as_sql(), predicate));
        }
        self.pending = None;
    }

    fn render(&self) -> String {
        self.parts.join(" ")
    }
}

/// Builds a predicate tree from a flat stream of predicates, connectors and
/// group boundaries.
///
/// A connector applies to the next predicate pushed into the same group; a
/// later connector replaces one that was never used, so a criterion that
/// produced no predicate leaves no dangling operator. Groups that end up
/// empty are discarded.
#[derive(Debug)]
pub struct WhereClause {
    frames: Vec<Frame>,
}

impl Default for WhereClause {
    fn default() -> Self {
        Self {
            frames: vec![Frame::default()],
        }
    }
}

impl WhereClause {
    pub fn new() -> Self {
        Self::default()
    }

    fn top(&mut self) -> &mut Frame {
        let last = self.frames.len() - 1;
        &mut self.frames[last]
    }

    /// Add a predicate to the current group.
    pub fn push(&mut self, predicate: impl Into<String>) {
        self.top().push(predicate.into());
    }

    /// Set the connector for the next predicate of the current group.
    pub fn operator(&mut self, op: LogicalOperator) {
        self.top().pending = Some(op);
    }

    pub fn start_group(&mut self) {
        self.frames.push(Frame::default());
    }

    pub fn end_group(&mut self) -> Result<(), Error> {
        if self.frames.len() < 2 {
            return Err(Error::Internal("unbalanced where group".to_string()));
        }
        let frame = self.frames.pop().unwrap_or_default();
        if !frame.parts.is_empty() {
            self.top().push(format!("({})", frame.render()));
        }
        Ok(())
    }

    pub fn depth(&self) -> usize {
        self.frames.len() - 1
    }

    pub fn is_empty(&self) -> bool {
        self.frames.iter().all(|f| f.parts.is_empty())
    }

    /// Rendered predicate without the `WHERE` keyword.
    pub fn render(&self) -> Result<Option<String>, Error> {
        if self.depth() != 0 {
            return Err(Error::Internal(format!(
                "{} where group(s) left open",
                self.depth()
            )));
        }
        let root = &self.frames[0];
        if root.parts.is_empty() {
            Ok(None)
        } else {
            Ok(Some(root.render()))
        }
    }
}

//! Infers parent/child relationships between tool invocations.
//!
//! The backend never says which task a tool call belongs to. Placement is
//! derived from arrival order alone: a call nests under a task invocation that
//! is still active (no text has followed it), and calls are dealt out across
//! several active tasks by the cumulative number of children they already
//! hold. The rotation counter is the sum over all active tasks, so a busy task
//! can temporarily receive more than its share.

use crate::timeline::ContentUnit;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attribution {
    /// The id is already present in the open message.
    Duplicate,
    /// Insert as a new top-level unit.
    TopLevel,
    /// Append to the nested list of the top-level unit at this index.
    Nested { parent_index: usize },
}

#[derive(Debug, Clone)]
pub struct ToolAttributionResolver {
    parent_tool_name: String,
}

impl ToolAttributionResolver {
    pub fn new(parent_tool_name: impl Into<String>) -> Self {
        Self {
            parent_tool_name: parent_tool_name.into(),
        }
    }

    pub fn is_parent(&self, tool_name: &str) -> bool {
        tool_name == self.parent_tool_name
    }

    /// Decides where invocation `tool_id` of `tool_name` goes, given the units
    /// of the assistant message currently receiving stream content.
    pub fn resolve(&self, units: &[ContentUnit], tool_id: &str, tool_name: &str) -> Attribution {
        if contains_invocation(units, tool_id) {
            return Attribution::Duplicate;
        }
        if self.is_parent(tool_name) {
            return Attribution::TopLevel;
        }

        let active = self.active_parents(units);
        if active.is_empty() {
            return Attribution::TopLevel;
        }

        let total: usize = active
            .iter()
            .filter_map(|&index| units[index].as_tool_invocation())
            .map(|parent| parent.nested.len())
            .sum();
        Attribution::Nested {
            parent_index: active[total % active.len()],
        }
    }

    /// Indices of parent invocations not yet followed by a text unit, in
    /// message order.
    fn active_parents(&self, units: &[ContentUnit]) -> Vec<usize> {
        let mut active = Vec::new();
        for (index, unit) in units.iter().enumerate().rev() {
            match unit {
                ContentUnit::Text { .. } => break,
                ContentUnit::ToolInvocation(invocation) if self.is_parent(&invocation.name) => {
                    active.push(index);
                }
                _ => {}
            }
        }
        active.reverse();
        active
    }
}

fn contains_invocation(units: &[ContentUnit], tool_id: &str) -> bool {
    units
        .iter()
        .filter_map(ContentUnit::as_tool_invocation)
        .any(|invocation| {
            invocation.id == tool_id || invocation.nested.iter().any(|child| child.id == tool_id)
        })
}

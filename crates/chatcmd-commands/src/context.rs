//! Per-message resolution state and the context handed to handlers

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::atom::{ExecutedCommand, Line};
use crate::error::{CommandError, Result};
use crate::types::{CommandStyle, Scope};

/// Identifies a resolution slot within one message
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SlotId(pub u64);

impl fmt::Display for SlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Identifies one handler invocation within one message
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct InvocationId(pub u64);

impl fmt::Display for InvocationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Who sent a message and where
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageContext {
    pub sender: u64,
    pub scope: Scope,
    /// Message the inbound message replied to, if any
    pub quote: Option<i64>,
}

impl MessageContext {
    pub fn new(sender: u64, scope: Scope) -> Self {
        Self {
            sender,
            scope,
            quote: None,
        }
    }

    pub fn with_quote(mut self, message_id: i64) -> Self {
        self.quote = Some(message_id);
        self
    }
}

/// Mutable resolution state for a single message
///
/// Created once per inbound message and dropped after rendering. A slot is
/// allocated when its atom is discovered and filled exactly once when the
/// atom is resolved: `Some` for an executed command, `None` when the site
/// fell back to literal text.
#[derive(Debug)]
pub struct ExecuteContext {
    message: MessageContext,
    next_slot_id: u64,
    slots: BTreeMap<SlotId, Option<Arc<ExecutedCommand>>>,
    next_invocation_id: u64,
}

impl ExecuteContext {
    pub fn new(message: MessageContext) -> Self {
        Self {
            message,
            next_slot_id: 0,
            slots: BTreeMap::new(),
            next_invocation_id: 0,
        }
    }

    pub fn message(&self) -> &MessageContext {
        &self.message
    }

    /// Reserve the next slot id
    pub fn allocate_slot(&mut self) -> SlotId {
        let id = SlotId(self.next_slot_id);
        self.next_slot_id += 1;
        id
    }

    /// Write a slot's final value
    pub fn fill_slot(&mut self, id: SlotId, value: Option<Arc<ExecutedCommand>>) -> Result<()> {
        if id.0 >= self.next_slot_id {
            return Err(CommandError::UnknownSlot(id));
        }
        if self.slots.contains_key(&id) {
            return Err(CommandError::SlotAlreadyFilled(id));
        }
        self.slots.insert(id, value);
        Ok(())
    }

    /// A filled slot; `None` while pending or never allocated
    pub fn slot(&self, id: SlotId) -> Option<&Option<Arc<ExecutedCommand>>> {
        self.slots.get(&id)
    }

    /// Number of slots allocated so far
    pub fn slot_count(&self) -> u64 {
        self.next_slot_id
    }

    /// Executed commands in slot order
    pub fn executed(&self) -> impl Iterator<Item = &Arc<ExecutedCommand>> {
        self.slots.values().flatten()
    }

    pub(crate) fn begin_invocation(&mut self) -> InvocationId {
        let id = InvocationId(self.next_invocation_id);
        self.next_invocation_id += 1;
        id
    }

    /// Number of handler invocations so far
    pub fn invocation_count(&self) -> u64 {
        self.next_invocation_id
    }
}

/// Extra context available to a line command that owns its line
#[derive(Debug, Clone, Copy)]
pub struct LineInfo<'a> {
    /// Resolved non-owner lines between this command and the next owner
    pub following_lines: &'a [Line],
    /// Number of owner commands in the message
    pub owner_count: usize,
    /// 1-based line number of this command
    pub line_number: usize,
}

/// Context object passed to a command handler
pub struct InvocationContext<'a> {
    pub message: &'a MessageContext,
    pub slot_id: SlotId,
    pub invocation_id: InvocationId,
    pub style: CommandStyle,
    pub is_await: bool,
    pub prefix: &'a str,
    pub keyword: &'a str,
    pub line: Option<LineInfo<'a>>,
    claimed: bool,
    reported_error: Option<String>,
}

impl<'a> InvocationContext<'a> {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        message: &'a MessageContext,
        slot_id: SlotId,
        invocation_id: InvocationId,
        style: CommandStyle,
        is_await: bool,
        prefix: &'a str,
        keyword: &'a str,
        line: Option<LineInfo<'a>>,
    ) -> Self {
        Self {
            message,
            slot_id,
            invocation_id,
            style,
            is_await,
            prefix,
            keyword,
            line,
            claimed: false,
            reported_error: None,
        }
    }

    /// Mark this invocation as handled even if it returns nothing
    pub fn claim_executed(&mut self) {
        self.claimed = true;
    }

    /// Report an error meant for the end user
    pub fn report_error(&mut self, message: impl Into<String>) {
        self.reported_error = Some(message.into());
    }

    pub fn is_claimed(&self) -> bool {
        self.claimed
    }

    pub(crate) fn take_reported_error(&mut self) -> Option<String> {
        self.reported_error.take()
    }
}

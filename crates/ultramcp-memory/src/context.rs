//! Token-budget context pruning

use serde::Serialize;

use crate::store::{ConversationFile, ConversationMessage};

/// Share of the token budget allocated to messages.
pub const MESSAGE_TOKEN_RATIO: f64 = 0.7;

/// Share of the token budget allocated to files.
pub const FILE_TOKEN_RATIO: f64 = 0.3;

/// A session view reduced to fit a token budget.
#[derive(Debug, Clone, Serialize)]
pub struct ConversationContext {
    /// Messages in chronological order
    pub messages: Vec<ConversationMessage>,

    /// Files by recency of access
    pub files: Vec<ConversationFile>,

    /// Token total of the returned view
    pub total_tokens: usize,

    /// True when any count came from the chars/4 fallback
    pub approximate: bool,

    /// True when the view was reduced to fit the budget
    pub pruned: bool,
}

/// Select messages newest-first until one no longer fits, then stop.
///
/// `costs` is in chronological order; the kept indices come back in
/// chronological order too. The walk never skips forward past an
/// over-budget message to a smaller older one, so the returned suffix is
/// contiguous in recency.
pub(crate) fn select_messages(costs: &[usize], budget: usize) -> Vec<usize> {
    let mut remaining = budget;
    let mut kept = Vec::new();

    for (index, cost) in costs.iter().enumerate().rev() {
        if *cost > remaining {
            break;
        }
        remaining -= cost;
        kept.push(index);
    }

    kept.reverse();
    kept
}

/// Select files in the given (recency) order until one no longer fits.
pub(crate) fn select_files(costs: &[usize], budget: usize) -> Vec<usize> {
    let mut remaining = budget;
    let mut kept = Vec::new();

    for (index, cost) in costs.iter().enumerate() {
        if *cost > remaining {
            break;
        }
        remaining -= cost;
        kept.push(index);
    }

    kept
}

/// Split a total budget into the fixed message/file shares.
pub(crate) fn split_budget(max_tokens: usize) -> (usize, usize) {
    let message_budget = (max_tokens as f64 * MESSAGE_TOKEN_RATIO) as usize;
    let file_budget = (max_tokens as f64 * FILE_TOKEN_RATIO) as usize;
    (message_budget, file_budget)
}

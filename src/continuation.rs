//! Continuation controller.
//!
//! Drives one chunk's conversation until the service reports completion,
//! the continuation cap is reached, or a call fails:
//!
//! 1. Check the cancel flag, then send the conversation with a bounded wait.
//! 2. Append the reply as an assistant turn and record the fragment.
//! 3. Error or timeout → [`RunOutcome::Failed`]; nothing of the chunk is kept.
//! 4. Complete → [`RunOutcome::Complete`].
//! 5. Incomplete and under the cap → append the continue instruction as a
//!    user turn and go to 1. At the cap → [`RunOutcome::Incomplete`] with
//!    the fragments gathered so far.
//!
//! A run makes at most `max_continuations + 1` calls whatever the service
//! does. Generic errors are never retried here.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::conversation::Conversation;
use crate::models::Fragment;
use crate::transform::{strip_sentinel, TransformClient, TransformError};

#[derive(Debug, Clone)]
pub struct ContinuationSettings {
    pub max_continuations: u32,
    /// User turn appended before every continuation call.
    pub continue_prompt: String,
    pub sentinel: String,
    /// Upper bound on a single call, including the response body.
    pub call_timeout: Duration,
}

/// Externally triggered abort, shared between the signal handler and the
/// pipeline. Checked before every call and between chunks.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the flag. Returns `true` if this call set it, `false` if it was
    /// already set.
    pub fn cancel(&self) -> bool {
        !self.0.swap(true, Ordering::SeqCst)
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Terminal status of one chunk's run.
#[derive(Debug)]
pub enum RunOutcome {
    Complete(Vec<Fragment>),
    /// The cap was reached while the service still reported incompleteness.
    Incomplete(Vec<Fragment>),
    Failed(TransformError),
}

/// Run the continuation loop for one chunk.
///
/// `conversation` must already hold the system instruction and the chunk's
/// user turn; it is consumed because it belongs to this chunk only.
/// `on_continuation` is called with the 1-based round number before each
/// continuation call.
pub async fn run(
    client: &dyn TransformClient,
    mut conversation: Conversation,
    settings: &ContinuationSettings,
    cancel: &CancelFlag,
    mut on_continuation: impl FnMut(u32),
) -> RunOutcome {
    let mut fragments = Vec::new();
    let mut continuations = 0u32;

    loop {
        if cancel.is_cancelled() {
            return RunOutcome::Failed(TransformError::Cancelled);
        }

        let fragment =
            match tokio::time::timeout(settings.call_timeout, client.send(&conversation)).await {
                Err(_) => return RunOutcome::Failed(TransformError::Timeout(settings.call_timeout)),
                Ok(Err(e)) => return RunOutcome::Failed(e),
                Ok(Ok(fragment)) => fragment,
            };

        // Empty assistant turns are rejected by some services; a reply that
        // was only the sentinel goes back as the sentinel.
        if fragment.text.is_empty() {
            conversation.push_assistant(settings.sentinel.clone());
        } else {
            conversation.push_assistant(fragment.text.clone());
        }
        let complete = fragment.is_complete();
        fragments.push(fragment);

        if complete {
            return RunOutcome::Complete(fragments);
        }
        if continuations >= settings.max_continuations {
            return RunOutcome::Incomplete(fragments);
        }

        continuations += 1;
        on_continuation(continuations);
        conversation.push_user(settings.continue_prompt.clone());
    }
}

/// Join pieces in order, inserting a newline between two pieces only when
/// the earlier one does not already end with one. Empty pieces are skipped.
pub fn join_pieces<'a>(pieces: impl IntoIterator<Item = &'a str>) -> String {
    let mut out = String::new();
    for piece in pieces {
        if piece.is_empty() {
            continue;
        }
        if !out.is_empty() && !out.ends_with('\n') {
            out.push('\n');
        }
        out.push_str(piece);
    }
    out
}

/// Reassemble a chunk's output from its fragments. The result contains no
/// occurrence of `sentinel`.
pub fn assemble(fragments: &[Fragment], sentinel: &str) -> String {
    let joined = join_pieces(fragments.iter().map(|f| f.text.as_str()));
    strip_sentinel(&joined, sentinel).0
}

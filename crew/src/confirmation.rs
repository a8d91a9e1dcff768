//! Human confirmation gates
//!
//! A task that requires confirmation suspends after producing its answer
//! until a [`ConfirmationGate`] answers. Three gates are provided:
//!
//! - [`InteractiveConfirmation`]: prompts on the console (default for the CLI)
//! - [`ChannelConfirmation`]: the answer arrives from another component via
//!   [`ChannelConfirmation::submit`] (web hooks, bots, tests)
//! - [`AutoApproveConfirmation`]: approves everything (CI, `--non-interactive`)
//!
//! No gate applies a timeout. A confirmation that never arrives stalls the
//! run.

use std::io::{self, BufRead, BufReader, Write};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::{mpsc, oneshot, Mutex};

use crate::error::{PipelineError, Result};

/// A request for a human decision on a task's answer
#[derive(Debug, Clone)]
pub struct ConfirmationRequest {
    /// Unique per task attempt, e.g. `task-1-attempt-0`
    pub id: String,
    pub task_index: usize,
    pub role: String,
    pub description: String,
    /// The answer awaiting confirmation
    pub output: String,
}

impl ConfirmationRequest {
    pub fn new(
        task_index: usize,
        attempt: usize,
        role: impl Into<String>,
        description: impl Into<String>,
        output: impl Into<String>,
    ) -> Self {
        Self {
            id: format!("task-{}-attempt-{}", task_index, attempt),
            task_index,
            role: role.into(),
            description: description.into(),
            output: output.into(),
        }
    }
}

/// Result of a confirmation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Confirmation {
    /// Accept the answer; the task completes
    Approved,
    /// Send the answer back with feedback
    Revise(String),
    /// Stop the pipeline
    Rejected(Option<String>),
}

/// Source of confirmation signals
#[async_trait]
pub trait ConfirmationGate: Send + Sync {
    /// Suspend until a decision for `request` arrives
    async fn confirm(&self, request: ConfirmationRequest) -> Result<Confirmation>;

    /// Name used in logs
    fn name(&self) -> &str;
}

/// Approves every request (for testing/CI)
pub struct AutoApproveConfirmation;

#[async_trait]
impl ConfirmationGate for AutoApproveConfirmation {
    async fn confirm(&self, request: ConfirmationRequest) -> Result<Confirmation> {
        tracing::info!(
            request_id = %request.id,
            role = %request.role,
            "auto-approved (non-interactive mode)"
        );
        Ok(Confirmation::Approved)
    }

    fn name(&self) -> &str {
        "auto-approve"
    }
}

/// Rejects every request (for testing)
pub struct RejectConfirmation;

#[async_trait]
impl ConfirmationGate for RejectConfirmation {
    async fn confirm(&self, request: ConfirmationRequest) -> Result<Confirmation> {
        tracing::info!(request_id = %request.id, "auto-rejected (testing mode)");
        Ok(Confirmation::Rejected(Some("rejected by policy".to_string())))
    }

    fn name(&self) -> &str {
        "reject"
    }
}

/// Console prompt; concurrent tasks take turns at the terminal
///
/// Answers are read by a dedicated thread and handed over line by line, so
/// a prompt abandoned by an aborted run never holds up runtime shutdown.
pub struct InteractiveConfirmation {
    /// Locked for a whole prompt
    lines: Mutex<mpsc::Receiver<io::Result<String>>>,
}

impl InteractiveConfirmation {
    /// Prompt on stdout and read answers from stdin
    pub fn new() -> io::Result<Self> {
        Self::with_reader(BufReader::new(io::stdin()))
    }

    /// Prompt on stdout and read answers from `reader`
    pub fn with_reader<R>(reader: R) -> io::Result<Self>
    where
        R: BufRead + Send + 'static,
    {
        let (tx, rx) = mpsc::channel(1);
        std::thread::Builder::new()
            .name("confirmation-input".to_string())
            .spawn(move || {
                for line in reader.lines() {
                    if tx.blocking_send(line).is_err() {
                        break;
                    }
                }
            })?;

        Ok(Self {
            lines: Mutex::new(rx),
        })
    }
}

/// Interpret a line typed at the confirmation prompt
pub fn parse_response(input: &str) -> Confirmation {
    let trimmed = input.trim();
    match trimmed.to_lowercase().as_str() {
        "" | "y" | "yes" | "approve" => Confirmation::Approved,
        "n" | "no" | "reject" => Confirmation::Rejected(None),
        lowered => match lowered.strip_prefix("reject ") {
            Some(_) => Confirmation::Rejected(Some(trimmed["reject ".len()..].trim().to_string())),
            None => Confirmation::Revise(trimmed.to_string()),
        },
    }
}

fn print_prompt(request: &ConfirmationRequest) -> io::Result<()> {

    println!("\n{}", "═".repeat(60));
    println!("  CONFIRMATION: {} (task {})", request.role, request.task_index + 1);
    println!("{}\n", "═".repeat(60));
    println!("{}\n", request.output);
    println!("{}", "─".repeat(60));
    println!("Options:");
    println!("  [Enter/y]     - Approve and complete the task");
    println!("  [reject TEXT] - Reject and stop the pipeline");
    println!("  [any text]    - Feedback; the agent revises its answer");
    println!();
    print!("Your choice: ");
    io::stdout().flush()
}

#[async_trait]
impl ConfirmationGate for InteractiveConfirmation {
    async fn confirm(&self, request: ConfirmationRequest) -> Result<Confirmation> {
        let mut lines = self.lines.lock().await;
        print_prompt(&request).map_err(|e| PipelineError::io("<stdout>", e))?;

        let input = match lines.recv().await {
            Some(line) => line.map_err(|e| PipelineError::io("<stdin>", e))?,
            None => {
                return Err(PipelineError::io(
                    "<stdin>",
                    io::Error::new(io::ErrorKind::UnexpectedEof, "input closed before a decision"),
                ));
            }
        };

        println!("{}", "═".repeat(60));
        Ok(parse_response(&input))
    }

    fn name(&self) -> &str {
        "interactive"
    }
}

/// No request is pending under the given id
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("no pending confirmation with id '{0}'")]
pub struct UnknownConfirmation(pub String);

/// Receiving side of a [`ChannelConfirmation`]: one message per suspended task
pub type ConfirmationInbox = mpsc::UnboundedReceiver<ConfirmationRequest>;

/// Confirmation delivered through a channel by an external component
///
/// Works by:
/// 1. Store a oneshot sender under the request id
/// 2. Publish the request on the inbox
/// 3. The external component calls [`submit`](Self::submit)
/// 4. The suspended task resumes with that decision
#[derive(Clone)]
pub struct ChannelConfirmation {
    pending: Arc<DashMap<String, oneshot::Sender<Confirmation>>>,
    notify: mpsc::UnboundedSender<ConfirmationRequest>,
}

impl ChannelConfirmation {
    pub fn new() -> (Self, ConfirmationInbox) {
        let (notify, inbox) = mpsc::unbounded_channel();
        let gate = Self {
            pending: Arc::new(DashMap::new()),
            notify,
        };
        (gate, inbox)
    }

    /// Deliver a decision for a pending request
    pub fn submit(
        &self,
        request_id: &str,
        decision: Confirmation,
    ) -> std::result::Result<(), UnknownConfirmation> {
        match self.pending.remove(request_id) {
            Some((_, sender)) => {
                // The waiting task may have been cancelled
                let _ = sender.send(decision);
                Ok(())
            }
            None => Err(UnknownConfirmation(request_id.to_string())),
        }
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn is_pending(&self, request_id: &str) -> bool {
        self.pending.contains_key(request_id)
    }
}

#[async_trait]
impl ConfirmationGate for ChannelConfirmation {
    async fn confirm(&self, request: ConfirmationRequest) -> Result<Confirmation> {
        let request_id = request.id.clone();
        let (tx, rx) = oneshot::channel();
        self.pending.insert(request_id.clone(), tx);

        tracing::info!(request_id = %request_id, role = %request.role, "waiting for confirmation");
        if self.notify.send(request).is_err() {
            tracing::warn!(request_id = %request_id, "confirmation inbox dropped");
        }

        match rx.await {
            Ok(decision) => Ok(decision),
            Err(_) => {
                self.pending.remove(&request_id);
                Ok(Confirmation::Rejected(Some(
                    "confirmation channel closed".to_string(),
                )))
            }
        }
    }

    fn name(&self) -> &str {
        "channel"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn request(index: usize) -> ConfirmationRequest {
        ConfirmationRequest::new(index, 0, "Venue Coordinator", "Find a venue", "Pier 27")
    }

    #[test]
    fn test_request_ids_are_per_attempt() {
        let first = ConfirmationRequest::new(1, 0, "r", "d", "o");
        let second = ConfirmationRequest::new(1, 1, "r", "d", "o");
        assert_eq!(first.id, "task-1-attempt-0");
        assert_ne!(first.id, second.id);
    }

    #[test]
    fn test_parse_response() {
        assert_eq!(parse_response("\n"), Confirmation::Approved);
        assert_eq!(parse_response("YES"), Confirmation::Approved);
        assert_eq!(parse_response("no"), Confirmation::Rejected(None));
        assert_eq!(
            parse_response("reject Budget is too high"),
            Confirmation::Rejected(Some("Budget is too high".to_string()))
        );
        assert_eq!(
            parse_response("Pick a venue closer to downtown"),
            Confirmation::Revise("Pick a venue closer to downtown".to_string())
        );
    }

    #[tokio::test]
    async fn test_auto_approve() {
        let decision = AutoApproveConfirmation.confirm(request(0)).await.unwrap();
        assert_eq!(decision, Confirmation::Approved);
    }

    #[tokio::test]
    async fn test_reject_gate() {
        let decision = RejectConfirmation.confirm(request(0)).await.unwrap();
        assert!(matches!(decision, Confirmation::Rejected(Some(_))));
    }

    #[tokio::test]
    async fn test_channel_confirmation_waits_for_submit() {
        let (gate, mut inbox) = ChannelConfirmation::new();
        let responder = gate.clone();

        tokio::spawn(async move {
            let pending = inbox.recv().await.unwrap();
            tokio::time::sleep(Duration::from_millis(50)).await;
            assert!(responder.is_pending(&pending.id));
            responder
                .submit(&pending.id, Confirmation::Revise("cheaper".to_string()))
                .unwrap();
        });

        let decision = gate.confirm(request(0)).await.unwrap();
        assert_eq!(decision, Confirmation::Revise("cheaper".to_string()));
        assert_eq!(gate.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_channel_confirmation_stays_suspended() {
        let (gate, _inbox) = ChannelConfirmation::new();
        let waiting = tokio::time::timeout(Duration::from_millis(100), gate.confirm(request(2))).await;

        assert!(waiting.is_err(), "confirmation must not resolve without a signal");
    }

    #[tokio::test]
    async fn test_interactive_reads_one_line_per_prompt() {
        let gate = InteractiveConfirmation::with_reader(io::Cursor::new("\nmake it cheaper\n")).unwrap();

        assert_eq!(gate.confirm(request(0)).await.unwrap(), Confirmation::Approved);
        assert_eq!(
            gate.confirm(request(1)).await.unwrap(),
            Confirmation::Revise("make it cheaper".to_string())
        );

        // Closed input is an error, not a silent approval
        let err = gate.confirm(request(2)).await.unwrap_err();
        assert!(matches!(err, PipelineError::Io { .. }));
    }

    #[test]
    fn test_submit_unknown_id() {
        let (gate, _inbox) = ChannelConfirmation::new();
        let err = gate.submit("task-9-attempt-0", Confirmation::Approved).unwrap_err();
        assert_eq!(err, UnknownConfirmation("task-9-attempt-0".to_string()));
    }
}

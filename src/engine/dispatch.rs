use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use crate::error::{MapError, Result};

use super::MapId;
use super::commands::{Arg, Command, FromOutcome, Operation, Outcome};

/// Resolution state of one deferred command.
#[derive(Debug, Clone, PartialEq)]
pub enum SlotState {
    Pending,
    Resolved(Outcome),
    Failed(MapError),
}

/// Forward reference to the result of a queued command.
///
/// Tokens stay readable after their batch has drained; the queue itself keeps
/// nothing once the pass is over.
#[derive(Clone)]
pub struct ResultToken {
    batch: u64,
    position: usize,
    cell: Arc<Mutex<SlotState>>,
}

impl ResultToken {
    fn new(batch: u64, position: usize) -> Self {
        Self {
            batch,
            position,
            cell: Arc::new(Mutex::new(SlotState::Pending)),
        }
    }

    pub fn batch(&self) -> u64 {
        self.batch
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn state(&self) -> SlotState {
        self.cell
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn is_pending(&self) -> bool {
        matches!(self.state(), SlotState::Pending)
    }

    /// The command's outcome, or the error it failed with.
    pub fn outcome(&self) -> Result<Outcome> {
        match self.state() {
            SlotState::Pending => Err(MapError::UnresolvedToken {
                position: self.position,
            }),
            SlotState::Resolved(outcome) => Ok(outcome),
            SlotState::Failed(error) => Err(error),
        }
    }

    pub(crate) fn settle(&self, state: SlotState) {
        *self.cell.lock().unwrap_or_else(PoisonError::into_inner) = state;
    }
}

impl fmt::Debug for ResultToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResultToken")
            .field("batch", &self.batch)
            .field("position", &self.position)
            .field("state", &self.state())
            .finish()
    }
}

/// What `MapEngine::submit` hands back.
#[derive(Debug, Clone)]
pub enum Submission {
    Ready(Outcome),
    Pending(ResultToken),
}

impl Submission {
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending(_))
    }

    pub fn token(&self) -> Option<&ResultToken> {
        match self {
            Self::Pending(token) => Some(token),
            Self::Ready(_) => None,
        }
    }

    pub fn outcome(&self) -> Result<Outcome> {
        match self {
            Self::Ready(outcome) => Ok(outcome.clone()),
            Self::Pending(token) => token.outcome(),
        }
    }

    /// Feed this result into a later command, deferred or not.
    pub fn into_arg<T: FromOutcome>(self) -> Result<Arg<T>> {
        match self {
            Self::Pending(token) => Ok(Arg::Token(token)),
            Self::Ready(outcome) => T::from_outcome(outcome)
                .map(Arg::Value)
                .ok_or(MapError::UnexpectedOutcome {
                    expected: T::EXPECTED,
                }),
        }
    }
}

pub(crate) struct WorkItem {
    pub map: MapId,
    pub command: Command,
    pub token: ResultToken,
}

/// FIFO of commands submitted before the engine became ready.
#[derive(Default)]
pub struct WorkQueue {
    items: Vec<WorkItem>,
    batch: u64,
}

impl WorkQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, map: MapId, command: Command) -> ResultToken {
        let token = ResultToken::new(self.batch, self.items.len());
        self.items.push(WorkItem {
            map,
            command,
            token: token.clone(),
        });
        token
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn batch(&self) -> u64 {
        self.batch
    }

    /// Hand the current batch over for draining and open the next one.
    pub(crate) fn take(&mut self) -> (u64, Vec<WorkItem>) {
        let batch = self.batch;
        self.batch += 1;
        (batch, std::mem::take(&mut self.items))
    }
}

impl fmt::Debug for WorkQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkQueue")
            .field("batch", &self.batch)
            .field("len", &self.items.len())
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DrainFailure {
    pub position: usize,
    pub map: MapId,
    pub operation: Operation,
    pub error: MapError,
}

/// Summary of one pass over the work queue.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DrainReport {
    pub batch: u64,
    pub executed: usize,
    pub failed: Vec<DrainFailure>,
    /// Skipped after an earlier failure under `DrainPolicy::Abort`.
    pub aborted: usize,
    /// Dropped because the engine was locked.
    pub discarded: usize,
}

impl DrainReport {
    pub fn new(batch: u64) -> Self {
        Self {
            batch,
            ..Self::default()
        }
    }

    pub fn is_clean(&self) -> bool {
        self.failed.is_empty() && self.aborted == 0 && self.discarded == 0
    }

    pub fn total(&self) -> usize {
        self.executed + self.failed.len() + self.aborted + self.discarded
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::overlay::OverlayId;

    #[test]
    fn tokens_address_positions_within_a_batch() {
        let mut queue = WorkQueue::new();
        let first = queue.push(MapId(0), Command::GetZoom);
        let second = queue.push(MapId(0), Command::GetCenter);
        assert_eq!((first.batch(), first.position()), (0, 0));
        assert_eq!((second.batch(), second.position()), (0, 1));

        let (batch, items) = queue.take();
        assert_eq!(batch, 0);
        assert_eq!(items.len(), 2);
        assert!(queue.is_empty());
        assert_eq!(queue.push(MapId(0), Command::GetZoom).batch(), 1);
    }

    #[test]
    fn settled_token_is_visible_through_clones() {
        let mut queue = WorkQueue::new();
        let token = queue.push(MapId(0), Command::GetZoom);
        let (_, items) = queue.take();

        assert_eq!(
            token.outcome(),
            Err(MapError::UnresolvedToken { position: 0 })
        );
        items[0].token.settle(SlotState::Resolved(Outcome::Zoom(7)));
        drop(items);
        assert_eq!(token.outcome(), Ok(Outcome::Zoom(7)));
    }

    #[test]
    fn failed_dependency_is_reported_by_position() {
        let mut queue = WorkQueue::new();
        let token = queue.push(MapId(0), Command::GetZoom);
        token.settle(SlotState::Failed(MapError::IdNotFound("x".into())));

        let arg: Arg<OverlayId> = Arg::Token(token);
        assert_eq!(
            arg.resolve(),
            Err(MapError::DependencyFailed {
                position: 0,
                source: Box::new(MapError::IdNotFound("x".into())),
            })
        );
    }

    #[test]
    fn ready_submission_converts_to_value_arg() {
        let submission = Submission::Ready(Outcome::Id("p1".into()));
        let arg: Arg<OverlayId> = submission.clone().into_arg().unwrap();
        assert_eq!(arg.resolve(), Ok("p1".to_string()));

        let mismatch = submission.into_arg::<u8>().unwrap_err();
        assert_eq!(mismatch, MapError::UnexpectedOutcome { expected: "zoom" });
    }

    #[test]
    fn report_totals_every_outcome() {
        let mut report = DrainReport::new(3);
        report.executed = 2;
        report.aborted = 1;
        assert_eq!(report.total(), 3);
        assert!(!report.is_clean());
    }
}

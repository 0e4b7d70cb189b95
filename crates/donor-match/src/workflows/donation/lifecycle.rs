//! Shared machinery for the request and match state machines.
//!
//! Each status enum declares its outgoing edges; [`StatusLog`] owns the current status
//! together with the append-only history and refuses any edge the graph does not list.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::domain::{EntityKind, StatusEntry};

/// Status of a record governed by a fixed transition graph.
pub trait LifecycleStatus: Copy + Eq + std::fmt::Debug + 'static {
    const ENTITY: EntityKind;

    /// Outgoing edges of the graph; empty for terminal statuses.
    fn successors(self) -> &'static [Self];

    fn label(self) -> &'static str;

    fn is_terminal(self) -> bool {
        self.successors().is_empty()
    }

    fn can_transition_to(self, target: Self) -> bool {
        self.successors().contains(&target)
    }
}

/// Rejected edge, either absent from the graph or leaving a terminal status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidTransition {
    pub entity: EntityKind,
    pub from: &'static str,
    pub to: &'static str,
    pub terminal: bool,
}

impl fmt::Display for InvalidTransition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} cannot move from {} to {}", self.entity, self.from, self.to)?;
        if self.terminal {
            write!(f, " ({} is terminal)", self.from)?;
        }
        Ok(())
    }
}

impl std::error::Error for InvalidTransition {}

impl InvalidTransition {
    pub fn between<S: LifecycleStatus>(from: S, to: S) -> Self {
        Self {
            entity: S::ENTITY,
            from: from.label(),
            to: to.label(),
            terminal: from.is_terminal(),
        }
    }
}

/// Current status plus the ordered log of every status the record has held.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusLog<S> {
    current: S,
    entries: Vec<StatusEntry<S>>,
}

impl<S: LifecycleStatus> StatusLog<S> {
    pub fn start(initial: S, actor: &str, at: DateTime<Utc>, note: Option<String>) -> Self {
        Self {
            current: initial,
            entries: vec![StatusEntry {
                status: initial,
                actor: actor.to_string(),
                at,
                note,
            }],
        }
    }

    pub fn current(&self) -> S {
        self.current
    }

    pub fn entries(&self) -> &[StatusEntry<S>] {
        &self.entries
    }

    pub fn is_terminal(&self) -> bool {
        self.current.is_terminal()
    }

    pub fn advance(
        &mut self,
        target: S,
        actor: &str,
        note: Option<String>,
        at: DateTime<Utc>,
    ) -> Result<&StatusEntry<S>, InvalidTransition> {
        if !self.current.can_transition_to(target) {
            return Err(InvalidTransition::between(self.current, target));
        }

        self.current = target;
        let index = self.entries.len();
        self.entries.push(StatusEntry {
            status: target,
            actor: actor.to_string(),
            at,
            note,
        });
        Ok(&self.entries[index])
    }
}

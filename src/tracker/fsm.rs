//! Declarative, statically validated transition table for the edge
//! tracker (spec §4.4, §9 design note): reject any duplicate
//! `(event, source)` pair at construction, never at run time.

use std::collections::HashMap;

use super::TrackerError;
use crate::tree::Level;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum State {
    Started,
    Presumptive,
    AtOneStepFork,
    Bisecting,
    Merging,
    OpeningSubchallenge,
    AddingSubchallengeLeaf,
    AwaitingSubchallengeResolution,
    AtOneStepProof,
    Confirming,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Event {
    IsPresumptive,
    AtOneStepFork,
    Bisect,
    Success,
    AlreadyExists,
    OpenSubchallenge,
    ActOneStepProof,
    AddLeaf,
    Await,
    LostPresumptive,
    ConfirmWinner,
}

/// The facts a guard predicate is evaluated against. Built fresh by the
/// tracker each tick from the current tree/chain state.
#[derive(Debug, Clone, Copy)]
pub struct GuardContext {
    pub is_presumptive_successor: bool,
    pub has_rival: bool,
    pub interval_len_one: bool,
    pub level: Level,
}

type Guard = fn(&GuardContext) -> bool;

fn always(_: &GuardContext) -> bool {
    true
}

fn is_presumptive(ctx: &GuardContext) -> bool {
    ctx.is_presumptive_successor
}

fn is_one_step_fork(ctx: &GuardContext) -> bool {
    ctx.interval_len_one && ctx.has_rival
}

fn is_plain_bisect(ctx: &GuardContext) -> bool {
    !is_presumptive(ctx) && !is_one_step_fork(ctx)
}

fn above_small_step(ctx: &GuardContext) -> bool {
    ctx.level != Level::SmallStep
}

fn at_small_step(ctx: &GuardContext) -> bool {
    ctx.level == Level::SmallStep
}

struct TableEntry {
    target: State,
    guard: Guard,
}

/// `(Event, State) -> (State, Guard)` built once per tracker instance
/// (spec §4.4's table, literally transcribed).
pub struct TransitionTable {
    entries: HashMap<(Event, State), TableEntry>,
}

impl TransitionTable {
    pub fn standard() -> Result<Self, TrackerError> {
        Self::build(vec![
            (Event::IsPresumptive, State::Started, State::Presumptive, is_presumptive as Guard),
            (Event::AtOneStepFork, State::Started, State::AtOneStepFork, is_one_step_fork as Guard),
            (Event::Bisect, State::Started, State::Bisecting, is_plain_bisect as Guard),
            (Event::Success, State::Bisecting, State::Started, always as Guard),
            (Event::AlreadyExists, State::Bisecting, State::Merging, always as Guard),
            (Event::Success, State::Merging, State::Started, always as Guard),
            (Event::OpenSubchallenge, State::AtOneStepFork, State::OpeningSubchallenge, above_small_step as Guard),
            (Event::ActOneStepProof, State::AtOneStepFork, State::AtOneStepProof, at_small_step as Guard),
            (Event::AddLeaf, State::OpeningSubchallenge, State::AddingSubchallengeLeaf, always as Guard),
            (Event::Await, State::AddingSubchallengeLeaf, State::AwaitingSubchallengeResolution, always as Guard),
            (Event::LostPresumptive, State::Presumptive, State::Started, always as Guard),
            (Event::ConfirmWinner, State::AtOneStepProof, State::Confirming, always as Guard),
        ])
    }

    fn build(rows: Vec<(Event, State, State, Guard)>) -> Result<Self, TrackerError> {
        let mut entries = HashMap::new();
        for (event, source, target, guard) in rows {
            if entries
                .insert((event, source), TableEntry { target, guard })
                .is_some()
            {
                return Err(TrackerError::Fatal(format!(
                    "duplicate transition table entry for ({event:?}, {source:?})"
                )));
            }
        }
        Ok(TransitionTable { entries })
    }

    /// Looks up `(event, source)`; errors `WrongState` if absent or if
    /// the entry's guard rejects `ctx`.
    pub fn apply(
        &self,
        event: Event,
        source: State,
        ctx: &GuardContext,
    ) -> Result<State, TrackerError> {
        let entry = self.entries.get(&(event, source)).ok_or_else(|| {
            TrackerError::WrongState(format!("no transition for ({event:?}, {source:?})"))
        })?;
        if !(entry.guard)(ctx) {
            return Err(TrackerError::WrongState(format!(
                "guard rejected ({event:?}, {source:?})"
            )));
        }
        Ok(entry.target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_table_builds_without_duplicates() {
        TransitionTable::standard().unwrap();
    }

    #[test]
    fn bisect_is_rejected_when_presumptive() {
        let table = TransitionTable::standard().unwrap();
        let ctx = GuardContext {
            is_presumptive_successor: true,
            has_rival: false,
            interval_len_one: false,
            level: Level::Block,
        };
        assert!(table.apply(Event::Bisect, State::Started, &ctx).is_err());
        assert_eq!(
            table.apply(Event::IsPresumptive, State::Started, &ctx).unwrap(),
            State::Presumptive
        );
    }

    #[test]
    fn one_step_fork_routes_by_level() {
        let table = TransitionTable::standard().unwrap();
        let small_step_ctx = GuardContext {
            is_presumptive_successor: false,
            has_rival: true,
            interval_len_one: true,
            level: Level::SmallStep,
        };
        assert_eq!(
            table
                .apply(Event::ActOneStepProof, State::AtOneStepFork, &small_step_ctx)
                .unwrap(),
            State::AtOneStepProof
        );
        assert!(table
            .apply(Event::OpenSubchallenge, State::AtOneStepFork, &small_step_ctx)
            .is_err());

        let block_ctx = GuardContext {
            level: Level::Block,
            ..small_step_ctx
        };
        assert_eq!(
            table
                .apply(Event::OpenSubchallenge, State::AtOneStepFork, &block_ctx)
                .unwrap(),
            State::OpeningSubchallenge
        );
    }

    #[test]
    fn duplicate_event_source_pair_is_rejected_at_construction() {
        let err = TransitionTable::build(vec![
            (Event::Bisect, State::Started, State::Bisecting, always as Guard),
            (Event::Bisect, State::Started, State::Presumptive, always as Guard),
        ])
        .unwrap_err();
        assert!(matches!(err, TrackerError::Fatal(_)));
    }
}

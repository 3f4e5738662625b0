//! Per-partition sequence state machine.
//!
//! The reduced state is never stored. It is folded from the partition's committed history
//! each time an append is validated, under the partition lock.

use chrono::{DateTime, NaiveTime, Utc};
use serde::Serialize;
use thiserror::Error;
use utoipa::ToSchema;

use crate::business_date::BusinessCalendar;
use crate::models::AttendanceEventType;

/// Typed rejection of a candidate event.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerViolation {
    #[error("You have already clocked in for today.")]
    DoubleClockIn,
    #[error("You have not clocked in for today.")]
    NoOpenShift,
    #[error("You cannot log out before {minimum}. Local time is {local_time}.")]
    EarlyClockOut {
        local_time: NaiveTime,
        minimum: NaiveTime,
    },
    #[error("You cannot start another break until the previous break has ended.")]
    BreakAlreadyOpen,
    #[error("You cannot end a break because no break has started.")]
    NoOpenBreak,
    #[error("You cannot start lunch until the previous lunch has ended.")]
    LunchAlreadyOpen,
    #[error("You cannot end lunch because no lunch has started.")]
    NoOpenLunch,
    #[error("Event at {attempted} is earlier than the latest recorded event at {latest}.")]
    OutOfOrderEvent {
        latest: DateTime<Utc>,
        attempted: DateTime<Utc>,
    },
    #[error("Attendance for this day has been closed.")]
    PartitionSealed,
}

impl LedgerViolation {
    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::DoubleClockIn => "DOUBLE_CLOCK_IN",
            Self::NoOpenShift => "NO_OPEN_SHIFT",
            Self::EarlyClockOut { .. } => "EARLY_CLOCK_OUT",
            Self::BreakAlreadyOpen => "BREAK_ALREADY_OPEN",
            Self::NoOpenBreak => "NO_OPEN_BREAK",
            Self::LunchAlreadyOpen => "LUNCH_ALREADY_OPEN",
            Self::NoOpenLunch => "NO_OPEN_LUNCH",
            Self::OutOfOrderEvent { .. } => "OUT_OF_ORDER_EVENT",
            Self::PartitionSealed => "PARTITION_SEALED",
        }
    }
}

/// Facts reduced from a partition's ordered history.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, ToSchema)]
pub struct PartitionState {
    pub has_open_shift: bool,
    pub has_open_break: bool,
    pub has_open_lunch: bool,
    pub clock_in_count: u32,
    pub last_event_type: Option<AttendanceEventType>,
    pub last_event_at: Option<DateTime<Utc>>,
}

impl PartitionState {
    /// Lenient fold: applies every event without validating it.
    pub fn fold<I>(events: I) -> Self
    where
        I: IntoIterator<Item = (AttendanceEventType, DateTime<Utc>)>,
    {
        let mut state = Self::default();
        for (event_type, ts) in events {
            state.apply(event_type, ts);
        }
        state
    }

    /// Checks ordering and the transition table. Time-of-day policy is not applied here.
    pub fn check(
        &self,
        event_type: AttendanceEventType,
        ts: DateTime<Utc>,
    ) -> Result<(), LedgerViolation> {
        if let Some(latest) = self.last_event_at {
            if ts < latest {
                return Err(LedgerViolation::OutOfOrderEvent {
                    latest,
                    attempted: ts,
                });
            }
        }

        use AttendanceEventType::*;
        match event_type {
            ClockIn if self.clock_in_count > 0 => Err(LedgerViolation::DoubleClockIn),
            ClockOut if !self.has_open_shift => Err(LedgerViolation::NoOpenShift),
            BreakStart | LunchStart if !self.has_open_shift => Err(LedgerViolation::NoOpenShift),
            BreakStart if self.has_open_break => Err(LedgerViolation::BreakAlreadyOpen),
            BreakEnd if !self.has_open_break => Err(LedgerViolation::NoOpenBreak),
            LunchStart if self.has_open_lunch => Err(LedgerViolation::LunchAlreadyOpen),
            LunchEnd if !self.has_open_lunch => Err(LedgerViolation::NoOpenLunch),
            _ => Ok(()),
        }
    }

    /// Advances the reduced state by one event.
    pub fn apply(&mut self, event_type: AttendanceEventType, ts: DateTime<Utc>) {
        use AttendanceEventType::*;
        match event_type {
            ClockIn => {
                self.clock_in_count += 1;
                self.has_open_shift = true;
            }
            ClockOut => self.has_open_shift = false,
            BreakStart => self.has_open_break = true,
            BreakEnd => self.has_open_break = false,
            LunchStart => self.has_open_lunch = true,
            LunchEnd => self.has_open_lunch = false,
        }
        self.last_event_type = Some(event_type);
        self.last_event_at = Some(match self.last_event_at {
            Some(previous) if previous > ts => previous,
            _ => ts,
        });
    }
}

/// Position and reason of the first event a strict replay rejects.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("event #{index} ({event_type}) rejected on replay: {violation}")]
pub struct ReplayFailure {
    pub index: usize,
    pub event_type: AttendanceEventType,
    pub violation: LedgerViolation,
}

/// Strict replay from empty state. Used by the integrity audit.
pub fn replay<I>(events: I) -> Result<PartitionState, ReplayFailure>
where
    I: IntoIterator<Item = (AttendanceEventType, DateTime<Utc>)>,
{
    let mut state = PartitionState::default();
    for (index, (event_type, ts)) in events.into_iter().enumerate() {
        state.check(event_type, ts).map_err(|violation| ReplayFailure {
            index,
            event_type,
            violation,
        })?;
        state.apply(event_type, ts);
    }
    Ok(state)
}

/// Full intake validation: transition table, ordering and the clock-out time floor.
#[derive(Debug, Clone, Copy)]
pub struct SequenceRules {
    pub calendar: BusinessCalendar,
    pub min_clock_out_local: NaiveTime,
}

impl SequenceRules {
    pub fn validate(
        &self,
        state: &PartitionState,
        event_type: AttendanceEventType,
        ts: DateTime<Utc>,
    ) -> Result<(), LedgerViolation> {
        state.check(event_type, ts)?;

        if event_type == AttendanceEventType::ClockOut {
            let local_time = self.calendar.local_time(ts);
            if local_time < self.min_clock_out_local {
                return Err(LedgerViolation::EarlyClockOut {
                    local_time,
                    minimum: self.min_clock_out_local,
                });
            }
        }

        Ok(())
    }
}

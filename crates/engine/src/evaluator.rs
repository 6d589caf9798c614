//! Pure step evaluation: given an ordered step list and a membership's
//! cursor, decide what to send next. No side effects, no I/O.

use chrono::{DateTime, Duration, Utc};

use drip_core::campaign::SequenceStep;

/// What the runner should do for one membership.
#[derive(Debug, Clone, PartialEq)]
pub enum NextAction<'a> {
    /// Send this step now.
    Send(&'a SequenceStep),
    /// The cursor is at or past the end of the sequence.
    SequenceComplete,
}

/// Evaluate the next step for a membership. `current_step` counts the steps
/// already sent, so it doubles as the index of the step to send now.
pub fn next_step(steps: &[SequenceStep], current_step: u32) -> NextAction<'_> {
    match steps.get(current_step as usize) {
        Some(step) => NextAction::Send(step),
        None => NextAction::SequenceComplete,
    }
}

/// The due time for step 0 relative to enrollment (or a reset). Step 0's
/// delay is the initial wait; `None` when it is zero or there are no steps,
/// meaning due at the next pass.
pub fn initial_due(steps: &[SequenceStep], from: DateTime<Utc>) -> Option<DateTime<Utc>> {
    steps
        .first()
        .filter(|step| step.delay_secs > 0)
        .map(|step| from + Duration::seconds(step.delay_secs as i64))
}

/// The due time for the step following `sent_index`, or `None` when the step
/// just sent was the last one.
pub fn due_after_send(
    steps: &[SequenceStep],
    sent_index: u32,
    now: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    steps
        .get(sent_index as usize + 1)
        .map(|next| now + Duration::seconds(next.delay_secs as i64))
}

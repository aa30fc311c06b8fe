//! Form status aggregation.
//!
//! Precedence, highest first: any VALIDATING, any INVALID, any VALID, else the
//! caller-supplied default. The result depends only on how many fields are in
//! each status, never on iteration order.

use formstate_types::{FieldStatus, FormRecord, FormStatus};

/// Number of fields per status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatusCounts {
    pub initial: usize,
    pub validating: usize,
    pub valid: usize,
    pub invalid: usize,
}

impl StatusCounts {
    pub fn tally(statuses: impl IntoIterator<Item = FieldStatus>) -> Self {
        statuses
            .into_iter()
            .fold(Self::default(), |mut counts, status| {
                match status {
                    FieldStatus::Initial => counts.initial += 1,
                    FieldStatus::Validating => counts.validating += 1,
                    FieldStatus::Valid => counts.valid += 1,
                    FieldStatus::Invalid => counts.invalid += 1,
                }
                counts
            })
    }

    #[must_use]
    pub fn resolve(&self, default: FormStatus) -> FormStatus {
        if self.validating > 0 {
            FormStatus::Validating
        } else if self.invalid > 0 {
            FormStatus::Invalid
        } else if self.valid > 0 {
            FormStatus::Valid
        } else {
            default
        }
    }
}

/// Aggregate field statuses into a form status.
///
/// `default` applies when there are no fields or all of them are INITIAL.
pub fn aggregate_status(
    statuses: impl IntoIterator<Item = FieldStatus>,
    default: FormStatus,
) -> FormStatus {
    StatusCounts::tally(statuses).resolve(default)
}

/// Next status for `form` after one of its fields changed.
///
/// SUBMITTING is sticky: field transitions never move a submitting form.
#[must_use]
pub fn next_form_status(form: &FormRecord, default: FormStatus) -> FormStatus {
    if form.status() == FormStatus::Submitting {
        FormStatus::Submitting
    } else {
        aggregate_status(form.field_statuses(), default)
    }
}

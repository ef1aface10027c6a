//! Access rules for submissions, reviews and administrative content
//!
//! Pure functions over an [`Actor`] and the record in question; handlers
//! load the records and turn a `false` into 403.

use crate::db::reviews::Review;
use crate::db::submissions::Submission;
use cfp_common::time;
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Who is asking
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Actor {
    pub user_guid: Uuid,
    pub is_superuser: bool,
    /// Member of the Programme Committee group
    pub is_committee: bool,
}

/// Age limits, in calendar days
#[derive(Debug, Clone, Copy)]
pub struct Windows {
    pub edit_days: i64,
    pub review_days: i64,
}

impl Actor {
    pub fn owns_submission(&self, submission: &Submission) -> bool {
        submission.user_guid == self.user_guid
    }

    pub fn owns_review(&self, review: &Review) -> bool {
        review.user_guid == self.user_guid
    }

    pub fn is_admin(&self) -> bool {
        self.is_superuser
    }
}

pub fn can_view_submission(actor: &Actor, submission: &Submission) -> bool {
    actor.is_superuser || actor.is_committee || actor.owns_submission(submission)
}

pub fn can_list_submissions(actor: &Actor) -> bool {
    actor.is_superuser || actor.is_committee
}

/// Owners may edit until the submission is `edit_days` old
pub fn can_edit_submission(
    actor: &Actor,
    submission: &Submission,
    windows: Windows,
    now: DateTime<Utc>,
) -> bool {
    actor.owns_submission(submission)
        && time::age_in_days(&submission.submitted_on, &now) < windows.edit_days
}

pub fn can_create_review(
    actor: &Actor,
    submission: &Submission,
    has_reviewed: bool,
    windows: Windows,
    now: DateTime<Utc>,
) -> bool {
    if has_reviewed {
        return false;
    }
    actor.is_superuser
        || (actor.is_committee
            && time::age_in_days(&submission.submitted_on, &now) < windows.review_days)
}

/// Update and delete share the same rule
pub fn can_modify_review(actor: &Actor, review: &Review, windows: Windows, now: DateTime<Utc>) -> bool {
    actor.is_superuser
        || (actor.is_committee
            && actor.owns_review(review)
            && time::age_in_days(&review.submitted_on, &now) < windows.review_days)
}

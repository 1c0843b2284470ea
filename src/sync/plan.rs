//! Submit-or-resume decision for one sync call
//!
//! The decision is a state machine resolved exactly once per sync, never
//! re-evaluated mid-run.

use crate::state::StreamBookmark;

/// How this sync call obtains its report job
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobPlan {
    /// No reusable job: submit a fresh report request
    Submit,
    /// Resume the bookmarked job: skip submission and re-fetch its stable
    /// file descriptor list
    Resume {
        /// Server-assigned id of the job to resume
        report_id: String,
    },
}

impl JobPlan {
    /// Resolve the plan from the stream's bookmark.
    ///
    /// A bookmarked job is resumed when its id is present and its file set
    /// is not exhausted; an unknown file count means the job was submitted
    /// but never observed ready, so polling resumes. An exhausted job
    /// (offset equals file count) is discarded and a new report submitted.
    /// Date-window validity is enforced before this point, so a bookmark
    /// that reaches plan resolution always describes a current window.
    pub fn resolve(bookmark: &StreamBookmark) -> JobPlan {
        match (&bookmark.report_id, bookmark.file_count) {
            (Some(report_id), None) => JobPlan::Resume {
                report_id: report_id.clone(),
            },
            (Some(report_id), Some(count)) if bookmark.offset < count => JobPlan::Resume {
                report_id: report_id.clone(),
            },
            _ => JobPlan::Submit,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn bookmark(report_id: Option<&str>, file_count: Option<usize>, offset: usize) -> StreamBookmark {
        StreamBookmark {
            date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            report_id: report_id.map(str::to_string),
            file_count,
            offset,
        }
    }

    #[test]
    fn test_no_job_submits() {
        assert_eq!(JobPlan::resolve(&bookmark(None, None, 0)), JobPlan::Submit);
    }

    #[test]
    fn test_unfinished_job_resumes() {
        assert_eq!(
            JobPlan::resolve(&bookmark(Some("J1"), Some(2), 1)),
            JobPlan::Resume {
                report_id: "J1".to_string()
            }
        );
    }

    #[test]
    fn test_submitted_but_never_ready_resumes_polling() {
        assert_eq!(
            JobPlan::resolve(&bookmark(Some("J1"), None, 0)),
            JobPlan::Resume {
                report_id: "J1".to_string()
            }
        );
    }

    #[test]
    fn test_exhausted_job_resubmits() {
        assert_eq!(
            JobPlan::resolve(&bookmark(Some("J1"), Some(2), 2)),
            JobPlan::Submit
        );
    }
}

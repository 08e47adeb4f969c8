use std::sync::Arc;

use chrono::Utc;

use crate::error::{CommentError, CommentResult};
use crate::models::{NewReport, Report};
use crate::notify::{dispatch, AlertKind, ModerationAlert, ModerationNotifier};
use crate::repo::{CommentRepo, ReportRepo, Repo};

#[derive(Clone)]
pub struct ReportLedger {
    repo: Arc<dyn Repo>,
    notifier: Arc<dyn ModerationNotifier>,
}

impl ReportLedger {
    pub fn new(repo: Arc<dyn Repo>, notifier: Arc<dyn ModerationNotifier>) -> Self {
        Self { repo, notifier }
    }

    pub async fn has_reported(&self, comment_id: &str, reporter: &str) -> CommentResult<bool> {
        Ok(self.repo.get_report(comment_id, reporter).await?.is_some())
    }

    /// The reporter's own entry, if any.
    pub async fn get(&self, comment_id: &str, reporter: &str) -> CommentResult<Option<Report>> {
        Ok(self.repo.get_report(comment_id, reporter).await?)
    }

    /// File a report. A second report by the same reporter overwrites the first.
    pub async fn report(&self, comment_id: &str, reporter: &str, new: NewReport) -> CommentResult<Report> {
        let comment = self.repo.get_comment(comment_id).await?;
        if comment.author == reporter {
            return Err(CommentError::SelfReport);
        }
        let kind = if comment.has_reported(reporter) { AlertKind::Revised } else { AlertKind::Filed };
        self.store(comment_id, reporter, new, kind).await
    }

    /// Revise an existing report. `owner` is the reporter the request path
    /// names; it must be the acting identity.
    pub async fn update_report(&self, comment_id: &str, reporter: &str, owner: &str, new: NewReport) -> CommentResult<Report> {
        if reporter != owner {
            return Err(CommentError::NotReporter);
        }
        let comment = self.repo.get_comment(comment_id).await?;
        if comment.author == reporter {
            return Err(CommentError::SelfReport);
        }
        if !comment.has_reported(reporter) {
            return Err(CommentError::NotReporter);
        }
        self.store(comment_id, reporter, new, AlertKind::Revised).await
    }

    async fn store(&self, comment_id: &str, reporter: &str, new: NewReport, kind: AlertKind) -> CommentResult<Report> {
        let report = Report { reporter_id: reporter.to_string(), category: new.category, message: new.message };
        let report = self.repo.upsert_report(comment_id, report).await?;
        tracing::info!(comment_id, reporter, category = %report.category, ?kind, "report stored");
        match kind {
            AlertKind::Filed => metrics::increment_counter!("margin_reports_filed_total"),
            AlertKind::Revised => metrics::increment_counter!("margin_reports_revised_total"),
        }
        dispatch(
            self.notifier.clone(),
            ModerationAlert {
                comment_id: comment_id.to_string(),
                reporter_id: report.reporter_id.clone(),
                category: report.category,
                message: report.message.clone(),
                kind,
                at: Utc::now(),
            },
        );
        Ok(report)
    }
}

use std::sync::Arc;

use chrono::Utc;

use crate::error::{CommentError, CommentResult};
use crate::models::{Comment, TargetKind, UpdateComment, MAX_COMMENT_LENGTH};
use crate::repo::{CommentRepo, Repo};
use crate::resolver::TargetResolver;

#[derive(Clone)]
pub struct CommentService {
    repo: Arc<dyn Repo>,
    resolver: TargetResolver,
}

pub fn validate_content(content: &str) -> CommentResult<()> {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        return Err(CommentError::Invalid("comment content cannot be empty".into()));
    }
    if trimmed.chars().count() > MAX_COMMENT_LENGTH {
        return Err(CommentError::Invalid(format!(
            "comment content exceeds maximum length of {MAX_COMMENT_LENGTH} characters"
        )));
    }
    Ok(())
}

impl CommentService {
    pub fn new(repo: Arc<dyn Repo>) -> Self {
        let resolver = TargetResolver::new(repo.clone());
        Self { repo, resolver }
    }

    pub async fn get(&self, id: &str) -> CommentResult<Comment> {
        Ok(self.repo.get_comment(id).await?)
    }

    pub async fn create(&self, author: &str, target_id: &str, content: String) -> CommentResult<Comment> {
        validate_content(&content)?;
        let target = self.resolver.resolve(target_id).await?;
        if !target.can_comment(author) {
            return Err(CommentError::NotAuthorized);
        }
        let comment = Comment::new(author.to_string(), target.id().to_string(), target.node().id.clone(), content);
        let comment = self.repo.insert_comment(comment).await?;
        tracing::info!(comment_id = %comment.id, target = %comment.target_id, kind = target.kind().as_str(), "comment created");
        metrics::increment_counter!("margin_comments_created_total");
        Ok(comment)
    }

    pub async fn edit(&self, mut comment: Comment, author: &str, content: String) -> CommentResult<Comment> {
        if !comment.can_edit(author) {
            return Err(CommentError::NotAuthorized);
        }
        if comment.is_deleted {
            return Err(CommentError::InvalidState);
        }
        validate_content(&content)?;
        apply_edit(&mut comment, content);
        let comment = self.repo.commit_comment(&comment).await?;
        metrics::increment_counter!("margin_comments_edited_total");
        Ok(comment)
    }

    /// Soft delete. Deleting a deleted comment is a no-op.
    pub async fn delete(&self, mut comment: Comment, author: &str) -> CommentResult<Comment> {
        if !comment.can_edit(author) {
            return Err(CommentError::NotAuthorized);
        }
        if comment.is_deleted {
            return Ok(comment);
        }
        comment.is_deleted = true;
        let comment = self.repo.commit_comment(&comment).await?;
        tracing::info!(comment_id = %comment.id, "comment deleted");
        metrics::increment_counter!("margin_comments_deleted_total");
        Ok(comment)
    }

    /// Undeleting an active comment is a no-op.
    pub async fn undelete(&self, mut comment: Comment, author: &str) -> CommentResult<Comment> {
        if !comment.can_edit(author) {
            return Err(CommentError::NotAuthorized);
        }
        if !comment.is_deleted {
            return Ok(comment);
        }
        comment.is_deleted = false;
        let comment = self.repo.commit_comment(&comment).await?;
        tracing::info!(comment_id = %comment.id, "comment undeleted");
        metrics::increment_counter!("margin_comments_undeleted_total");
        Ok(comment)
    }

    /// Apply a combined update in one commit: undelete, then the content edit
    /// (only when the content changes), then delete. Editing an active comment
    /// and deleting it in one request keeps the new content. Editing a deleted
    /// comment without undeleting it is `InvalidState`.
    pub async fn apply_update(&self, mut comment: Comment, author: &str, update: UpdateComment) -> CommentResult<Comment> {
        if !comment.can_edit(author) {
            return Err(CommentError::NotAuthorized);
        }
        let was_deleted = comment.is_deleted;
        if update.deleted == Some(false) {
            comment.is_deleted = false;
        }
        let mut edited = false;
        if let Some(content) = update.content {
            if content != comment.content {
                // a deleted comment must be undeleted in the same request to be edited
                if was_deleted && update.deleted != Some(false) {
                    return Err(CommentError::InvalidState);
                }
                validate_content(&content)?;
                apply_edit(&mut comment, content);
                edited = true;
            }
        }
        if update.deleted == Some(true) {
            comment.is_deleted = true;
        }
        if !edited && comment.is_deleted == was_deleted {
            return Ok(comment);
        }
        let comment = self.repo.commit_comment(&comment).await?;
        if edited {
            metrics::increment_counter!("margin_comments_edited_total");
        }
        if comment.is_deleted != was_deleted {
            tracing::info!(comment_id = %comment.id, deleted = comment.is_deleted, "comment deletion flag changed");
        }
        Ok(comment)
    }

    /// Variant label of the comment's target, for rendering.
    pub async fn target_type(&self, comment: &Comment) -> CommentResult<TargetKind> {
        self.resolver.resolve_kind(&comment.target_id).await
    }

    pub async fn list_for_node(&self, node_id: &str, deleted: Option<bool>) -> CommentResult<Vec<Comment>> {
        Ok(self.repo.list_by_node(node_id, deleted).await?)
    }

    pub async fn replies(&self, comment_id: &str) -> CommentResult<Vec<Comment>> {
        Ok(self.repo.list_by_target(comment_id).await?)
    }
}

fn apply_edit(comment: &mut Comment, content: String) {
    comment.content = content;
    comment.is_modified = true;
    comment.modified_at = Utc::now();
}

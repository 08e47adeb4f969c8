use std::sync::Arc;

use crate::error::{CommentError, CommentResult};
use crate::models::{Comment, Node, ReferentKind, TargetKind};
use crate::repo::{CommentRepo, GuidRepo, NodeRepo, RepoError, Repo};

/// A resolved comment target.
#[derive(Debug, Clone)]
pub enum Target {
    Node(Node),
    Comment { comment: Comment, node: Node },
}

impl Target {
    pub fn kind(&self) -> TargetKind {
        match self {
            Target::Node(_) => TargetKind::ContentContainer,
            Target::Comment { .. } => TargetKind::Comment,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            Target::Node(node) => &node.id,
            Target::Comment { comment, .. } => &comment.id,
        }
    }

    /// Node owning the thread a new comment on this target joins.
    pub fn node(&self) -> &Node {
        match self {
            Target::Node(node) => node,
            Target::Comment { node, .. } => node,
        }
    }

    /// Comment policy, delegated to the owning node for replies.
    pub fn can_comment(&self, user: &str) -> bool {
        self.node().can_comment(user)
    }
}

/// Read-only adapter over the guid registry.
#[derive(Clone)]
pub struct TargetResolver {
    repo: Arc<dyn Repo>,
}

impl TargetResolver {
    pub fn new(repo: Arc<dyn Repo>) -> Self {
        Self { repo }
    }

    /// Only the variant, without loading the entity.
    pub async fn resolve_kind(&self, id: &str) -> CommentResult<TargetKind> {
        let record = self.repo.get_guid(id).await?.ok_or(CommentError::TargetNotFound)?;
        match record.kind {
            ReferentKind::Node => Ok(TargetKind::ContentContainer),
            ReferentKind::Comment => Ok(TargetKind::Comment),
            ReferentKind::File | ReferentKind::User => Err(CommentError::InvalidTargetKind),
        }
    }

    pub async fn resolve(&self, id: &str) -> CommentResult<Target> {
        match self.resolve_kind(id).await? {
            TargetKind::ContentContainer => {
                let node = self.repo.get_node(id).await.map_err(missing_target)?;
                Ok(Target::Node(node))
            }
            TargetKind::Comment => {
                let comment = self.repo.get_comment(id).await.map_err(missing_target)?;
                let node = self.repo.get_node(&comment.node_id).await.map_err(missing_target)?;
                Ok(Target::Comment { comment, node })
            }
        }
    }
}

// A registered guid whose entity is gone is a dangling target.
fn missing_target(e: RepoError) -> CommentError {
    match e {
        RepoError::NotFound => CommentError::TargetNotFound,
        other => other.into(),
    }
}

#[cfg(all(test, feature = "inmem-store"))]
mod tests {
    use super::*;
    use crate::models::{CommentLevel, NewNode};
    use crate::repo::inmem::InMemRepo;
    use crate::repo::{CommentRepo, GuidRepo, NodeRepo};

    async fn setup() -> (Arc<InMemRepo>, TargetResolver, Node) {
        let repo = Arc::new(InMemRepo::new());
        let node = repo
            .create_node("owner", NewNode {
                title: "Project".into(),
                is_public: true,
                comment_level: CommentLevel::Public,
                contributors: vec![],
            })
            .await
            .unwrap();
        let resolver = TargetResolver::new(repo.clone());
        (repo, resolver, node)
    }

    #[tokio::test]
    async fn resolves_node_and_comment() {
        let (repo, resolver, node) = setup().await;
        let target = resolver.resolve(&node.id).await.unwrap();
        assert_eq!(target.kind(), TargetKind::ContentContainer);

        let c = repo
            .insert_comment(Comment::new("owner".into(), node.id.clone(), node.id.clone(), "hi".into()))
            .await
            .unwrap();
        let target = resolver.resolve(&c.id).await.unwrap();
        assert_eq!(target.kind(), TargetKind::Comment);
        assert_eq!(target.node().id, node.id);
    }

    #[tokio::test]
    async fn unknown_and_foreign_kinds() {
        let (repo, resolver, _) = setup().await;
        assert!(matches!(resolver.resolve("zzzzz").await, Err(CommentError::TargetNotFound)));
        let file = repo.register_guid(ReferentKind::File).await.unwrap();
        assert!(matches!(resolver.resolve(&file.id).await, Err(CommentError::InvalidTargetKind)));
    }
}

#![cfg(feature = "inmem-store")]

use std::sync::Arc;

use margin::comments::CommentService;
use margin::error::CommentError;
use margin::models::{CommentLevel, NewNode, Node, ReferentKind, TargetKind, UpdateComment};
use margin::repo::inmem::InMemRepo;
use margin::repo::{GuidRepo, NodeRepo};

async fn setup(level: CommentLevel, is_public: bool) -> (Arc<InMemRepo>, CommentService, Node) {
    let repo = Arc::new(InMemRepo::new());
    let node = repo
        .create_node("owner", NewNode {
            title: "Project".into(),
            is_public,
            comment_level: level,
            contributors: vec!["alice".into()],
        })
        .await
        .unwrap();
    let service = CommentService::new(repo.clone());
    (repo, service, node)
}

#[tokio::test]
async fn create_starts_active() {
    let (_, svc, node) = setup(CommentLevel::Public, true).await;
    let c = svc.create("alice", &node.id, "hello world".into()).await.unwrap();
    assert!(!c.is_deleted);
    assert!(!c.is_modified);
    assert_eq!(c.content, "hello world");
    assert_eq!(c.created_at, c.modified_at);
    assert_eq!(c.target_id, node.id);
    assert_eq!(c.node_id, node.id);
    assert_eq!(svc.target_type(&c).await.unwrap(), TargetKind::ContentContainer);
}

#[tokio::test]
async fn reply_joins_parent_thread() {
    let (_, svc, node) = setup(CommentLevel::Public, true).await;
    let parent = svc.create("alice", &node.id, "top".into()).await.unwrap();
    let reply = svc.create("bob", &parent.id, "reply".into()).await.unwrap();
    assert_eq!(reply.target_id, parent.id);
    assert_eq!(reply.node_id, node.id);
    assert_eq!(svc.target_type(&reply).await.unwrap(), TargetKind::Comment);
    assert_eq!(svc.replies(&parent.id).await.unwrap().len(), 1);
    assert_eq!(svc.list_for_node(&node.id, None).await.unwrap().len(), 2);
}

#[tokio::test]
async fn create_rejects_bad_targets_and_content() {
    let (repo, svc, node) = setup(CommentLevel::Public, true).await;
    assert!(matches!(svc.create("alice", "zzzzz", "x".into()).await, Err(CommentError::TargetNotFound)));

    let file = repo.register_guid(ReferentKind::File).await.unwrap();
    assert!(matches!(svc.create("alice", &file.id, "x".into()).await, Err(CommentError::InvalidTargetKind)));

    assert!(matches!(svc.create("alice", &node.id, "   ".into()).await, Err(CommentError::Invalid(_))));
    assert!(svc.list_for_node(&node.id, None).await.unwrap().is_empty());
}

#[tokio::test]
async fn comment_policy_is_enforced_without_partial_write() {
    let (_, svc, private) = setup(CommentLevel::Private, true).await;
    assert!(matches!(svc.create("stranger", &private.id, "hi".into()).await, Err(CommentError::NotAuthorized)));
    assert!(svc.list_for_node(&private.id, None).await.unwrap().is_empty());

    // replies inherit the node's policy
    let top = svc.create("alice", &private.id, "contributors only".into()).await.unwrap();
    assert!(matches!(svc.create("stranger", &top.id, "hi".into()).await, Err(CommentError::NotAuthorized)));
    assert!(svc.replies(&top.id).await.unwrap().is_empty());

    let (_, svc, hidden) = setup(CommentLevel::Public, false).await;
    assert!(matches!(svc.create("stranger", &hidden.id, "hi".into()).await, Err(CommentError::NotAuthorized)));
    assert!(svc.create("alice", &hidden.id, "hi".into()).await.is_ok());
}

#[tokio::test]
async fn edit_active_comment() {
    let (_, svc, node) = setup(CommentLevel::Public, true).await;
    let c = svc.create("alice", &node.id, "original".into()).await.unwrap();
    let created = c.modified_at;

    let edited = svc.edit(c, "alice", "updated text".into()).await.unwrap();
    assert_eq!(edited.content, "updated text");
    assert!(edited.is_modified);
    assert!(edited.modified_at >= created);
    assert!(!edited.is_deleted);

    // modified flag never reverts
    let again = svc.edit(edited, "alice", "original".into()).await.unwrap();
    assert!(again.is_modified);
}

#[tokio::test]
async fn only_author_may_mutate() {
    let (_, svc, node) = setup(CommentLevel::Public, true).await;
    let c = svc.create("alice", &node.id, "mine".into()).await.unwrap();
    assert!(matches!(svc.edit(c.clone(), "bob", "x".into()).await, Err(CommentError::NotAuthorized)));
    assert!(matches!(svc.delete(c.clone(), "bob").await, Err(CommentError::NotAuthorized)));
    assert!(matches!(svc.undelete(c.clone(), "bob").await, Err(CommentError::NotAuthorized)));
    assert!(matches!(
        svc.apply_update(c, "bob", UpdateComment { content: None, deleted: Some(true) }).await,
        Err(CommentError::NotAuthorized)
    ));
}

#[tokio::test]
async fn delete_then_edit_is_invalid_state() {
    let (_, svc, node) = setup(CommentLevel::Public, true).await;
    let c = svc.create("alice", &node.id, "before".into()).await.unwrap();
    let deleted = svc.delete(c, "alice").await.unwrap();
    assert!(deleted.is_deleted);

    assert!(matches!(svc.edit(deleted.clone(), "alice", "after".into()).await, Err(CommentError::InvalidState)));
    let stored = svc.get(&deleted.id).await.unwrap();
    assert_eq!(stored.content, "before");
    assert!(!stored.is_modified);
}

#[tokio::test]
async fn delete_and_undelete_are_idempotent() {
    let (_, svc, node) = setup(CommentLevel::Public, true).await;
    let c = svc.create("alice", &node.id, "x".into()).await.unwrap();

    let once = svc.delete(c, "alice").await.unwrap();
    let twice = svc.delete(once.clone(), "alice").await.unwrap();
    assert!(twice.is_deleted);
    assert_eq!(twice.version, once.version);

    let back = svc.undelete(twice, "alice").await.unwrap();
    assert!(!back.is_deleted);
    let back_again = svc.undelete(back.clone(), "alice").await.unwrap();
    assert_eq!(back_again.version, back.version);
    assert!(!back_again.is_modified);
}

#[tokio::test]
async fn combined_update_delete_wins() {
    let (_, svc, node) = setup(CommentLevel::Public, true).await;
    let c = svc.create("alice", &node.id, "draft".into()).await.unwrap();

    let out = svc
        .apply_update(c, "alice", UpdateComment { content: Some("final".into()), deleted: Some(true) })
        .await
        .unwrap();
    assert!(out.is_deleted);
    assert!(out.is_modified);
    assert_eq!(out.content, "final");

    // edit without undelete stays rejected, even when the request repeats the delete
    assert!(matches!(
        svc.apply_update(out.clone(), "alice", UpdateComment { content: Some("again".into()), deleted: None }).await,
        Err(CommentError::InvalidState)
    ));
    assert!(matches!(
        svc.apply_update(out.clone(), "alice", UpdateComment { content: Some("rewritten".into()), deleted: Some(true) })
            .await,
        Err(CommentError::InvalidState)
    ));
    let stored = svc.get(&out.id).await.unwrap();
    assert_eq!(stored.content, "final");
    assert!(stored.is_deleted);

    // undelete and edit in one request
    let restored = svc
        .apply_update(out, "alice", UpdateComment { content: Some("again".into()), deleted: Some(false) })
        .await
        .unwrap();
    assert!(!restored.is_deleted);
    assert_eq!(restored.content, "again");
}

#[tokio::test]
async fn unchanged_content_is_not_an_edit() {
    let (_, svc, node) = setup(CommentLevel::Public, true).await;
    let c = svc.create("alice", &node.id, "same".into()).await.unwrap();
    let out = svc
        .apply_update(c.clone(), "alice", UpdateComment { content: Some("same".into()), deleted: None })
        .await
        .unwrap();
    assert!(!out.is_modified);
    assert_eq!(out.version, c.version);
}

#[tokio::test]
async fn stale_write_surfaces_conflict() {
    let (_, svc, node) = setup(CommentLevel::Public, true).await;
    let c = svc.create("alice", &node.id, "x".into()).await.unwrap();
    let first = svc.get(&c.id).await.unwrap();
    let second = svc.get(&c.id).await.unwrap();

    svc.edit(first, "alice", "winner".into()).await.unwrap();
    let err = svc.delete(second, "alice").await.unwrap_err();
    assert!(matches!(err, CommentError::Conflict));
    assert!(err.is_retryable());
    assert!(!svc.get(&c.id).await.unwrap().is_deleted);
}

#[tokio::test]
async fn dangling_target_reports_not_found() {
    let (repo, svc, _) = setup(CommentLevel::Public, true).await;
    // guid registered as a comment that was never stored
    let orphan = repo.register_guid(ReferentKind::Comment).await.unwrap();
    assert!(matches!(svc.create("alice", &orphan.id, "x".into()).await, Err(CommentError::TargetNotFound)));
}

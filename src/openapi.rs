use crate::models::{
    CommentLevel, CommentOut, NewComment, NewNode, NewReport, Node, ReportCategory, ReportOut, TargetKind,
    UpdateComment,
};
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::routes::create_node,
        crate::routes::get_node,
        crate::routes::list_node_comments,
        crate::routes::create_comment,
        crate::routes::get_comment,
        crate::routes::update_comment,
        crate::routes::delete_comment,
        crate::routes::restore_comment,
        crate::routes::list_replies,
        crate::routes::list_reports,
        crate::routes::create_report,
        crate::routes::get_report,
        crate::routes::update_report,
    ),
    components(schemas(
        Node, NewNode, CommentLevel,
        NewComment, UpdateComment, CommentOut, TargetKind,
        NewReport, ReportOut, ReportCategory
    )),
    tags(
        (name = "nodes", description = "Content containers"),
        (name = "comments", description = "Comment lifecycle"),
        (name = "reports", description = "Abuse reports"),
    )
)]
pub struct ApiDoc;

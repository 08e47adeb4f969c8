use std::sync::Arc;
use actix_web::{web, HttpResponse};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Deserialize;

use crate::auth::Auth;
use crate::comments::CommentService;
use crate::error::{ApiError, CommentError};
use crate::models::*;
use crate::notify::ModerationNotifier;
use crate::rate_limit::RateLimiterFacade;
use crate::reports::ReportLedger;
use crate::repo::{NodeRepo, Repo};

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/v1")
            .service(web::resource("/nodes").route(web::post().to(create_node)))
            .service(web::resource("/nodes/{id}").route(web::get().to(get_node)))
            .service(web::resource("/nodes/{id}/comments").route(web::get().to(list_node_comments)))
            .service(web::resource("/comments").route(web::post().to(create_comment)))
            .service(
                web::resource("/comments/{id}")
                    .route(web::get().to(get_comment))
                    .route(web::patch().to(update_comment))
                    .route(web::delete().to(delete_comment)),
            )
            .service(web::resource("/comments/{id}/restore").route(web::post().to(restore_comment)))
            .service(web::resource("/comments/{id}/replies").route(web::get().to(list_replies)))
            .service(
                web::resource("/comments/{id}/reports")
                    .route(web::get().to(list_reports))
                    .route(web::post().to(create_report)),
            )
            .service(
                web::resource("/comments/{id}/reports/{user_id}")
                    .route(web::get().to(get_report))
                    .route(web::put().to(update_report))
                    .route(web::patch().to(update_report)),
            ),
    );
    cfg.route("/metrics", web::get().to(render_metrics));
}

#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<dyn Repo>,
    pub comments: CommentService,
    pub reports: ReportLedger,
    pub limiter: RateLimiterFacade,
    pub metrics: Option<PrometheusHandle>,
}

impl AppState {
    pub fn new(repo: Arc<dyn Repo>, notifier: Arc<dyn ModerationNotifier>) -> Self {
        Self {
            comments: CommentService::new(repo.clone()),
            reports: ReportLedger::new(repo.clone(), notifier),
            repo,
            limiter: RateLimiterFacade::disabled(),
            metrics: None,
        }
    }

    pub fn with_rate_limiter(mut self, limiter: RateLimiterFacade) -> Self {
        self.limiter = limiter;
        self
    }

    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }
}

#[derive(Debug, Deserialize)]
pub struct CommentListParams {
    pub deleted: Option<bool>,
}

// Load a comment the viewer may see; invisible comments are reported as missing.
async fn load_visible(data: &AppState, id: &str, viewer: Option<&str>) -> Result<Comment, ApiError> {
    let comment = data.comments.get(id).await?;
    let node = data.repo.get_node(&comment.node_id).await?;
    if !node.can_view(viewer) {
        return Err(CommentError::NotFound.into());
    }
    Ok(comment)
}

async fn render(data: &AppState, comment: &Comment, viewer: Option<&str>) -> Result<CommentOut, ApiError> {
    let kind = data.comments.target_type(comment).await?;
    Ok(CommentOut::render(comment, kind, viewer))
}

async fn render_all(data: &AppState, comments: &[Comment], viewer: Option<&str>) -> Result<Vec<CommentOut>, ApiError> {
    let mut out = Vec::with_capacity(comments.len());
    for c in comments {
        out.push(render(data, c, viewer).await?);
    }
    Ok(out)
}

#[utoipa::path(
    post,
    path = "/api/v1/nodes",
    tag = "nodes",
    request_body = NewNode,
    responses(
        (status = 201, description = "Node created", body = Node),
        (status = 401, description = "Authorization required")
    )
)]
pub async fn create_node(auth: Auth, data: web::Data<AppState>, payload: web::Json<NewNode>) -> Result<HttpResponse, ApiError> {
    let new = payload.into_inner();
    if new.title.trim().is_empty() {
        return Err(ApiError::BadRequest("title cannot be empty".into()));
    }
    let node = data.repo.create_node(auth.user_id(), new).await?;
    Ok(HttpResponse::Created().json(node))
}

#[utoipa::path(
    get,
    path = "/api/v1/nodes/{id}",
    tag = "nodes",
    params(("id" = String, Path, description = "Node guid")),
    responses(
        (status = 200, description = "Node", body = Node),
        (status = 404, description = "Node not found")
    )
)]
pub async fn get_node(auth: Option<Auth>, data: web::Data<AppState>, path: web::Path<String>) -> Result<HttpResponse, ApiError> {
    let viewer = auth.as_ref().map(|a| a.user_id());
    let node = data.repo.get_node(&path.into_inner()).await?;
    if !node.can_view(viewer) { return Err(CommentError::NotFound.into()); }
    Ok(HttpResponse::Ok().json(node))
}

#[utoipa::path(
    get,
    path = "/api/v1/nodes/{id}/comments",
    tag = "comments",
    params(
        ("id" = String, Path, description = "Node guid"),
        ("deleted" = Option<bool>, Query, description = "Filter on the deletion flag")
    ),
    responses(
        (status = 200, description = "Comments of the node, oldest first", body = [CommentOut]),
        (status = 404, description = "Node not found")
    )
)]
pub async fn list_node_comments(
    auth: Option<Auth>,
    data: web::Data<AppState>,
    path: web::Path<String>,
    query: web::Query<CommentListParams>,
) -> Result<HttpResponse, ApiError> {
    let viewer = auth.as_ref().map(|a| a.user_id());
    let node = data.repo.get_node(&path.into_inner()).await?;
    if !node.can_view(viewer) { return Err(CommentError::NotFound.into()); }
    let comments = data.comments.list_for_node(&node.id, query.deleted).await?;
    Ok(HttpResponse::Ok().json(render_all(&data, &comments, viewer).await?))
}

#[utoipa::path(
    post,
    path = "/api/v1/comments",
    tag = "comments",
    request_body = NewComment,
    responses(
        (status = 201, description = "Comment created", body = CommentOut),
        (status = 403, description = "Not allowed to comment on the target"),
        (status = 404, description = "Target not found"),
        (status = 429, description = "Rate limited")
    )
)]
pub async fn create_comment(auth: Auth, data: web::Data<AppState>, payload: web::Json<NewComment>) -> Result<HttpResponse, ApiError> {
    let user = auth.user_id();
    if !data.limiter.allow_comment(user) { return Err(ApiError::TooManyRequests); }
    let NewComment { target_id, content } = payload.into_inner();
    let comment = data.comments.create(user, &target_id, content).await?;
    Ok(HttpResponse::Created().json(render(&data, &comment, Some(user)).await?))
}

#[utoipa::path(
    get,
    path = "/api/v1/comments/{id}",
    tag = "comments",
    params(("id" = String, Path, description = "Comment guid")),
    responses(
        (status = 200, description = "Comment", body = CommentOut),
        (status = 404, description = "Comment or its target not found")
    )
)]
pub async fn get_comment(auth: Option<Auth>, data: web::Data<AppState>, path: web::Path<String>) -> Result<HttpResponse, ApiError> {
    let viewer = auth.as_ref().map(|a| a.user_id());
    let comment = load_visible(&data, &path.into_inner(), viewer).await?;
    Ok(HttpResponse::Ok().json(render(&data, &comment, viewer).await?))
}

#[utoipa::path(
    patch,
    path = "/api/v1/comments/{id}",
    tag = "comments",
    params(("id" = String, Path, description = "Comment guid")),
    request_body = UpdateComment,
    responses(
        (status = 200, description = "Comment updated", body = CommentOut),
        (status = 403, description = "Not the author"),
        (status = 409, description = "Concurrent modification, retry"),
        (status = 422, description = "Edit of a deleted comment")
    )
)]
pub async fn update_comment(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<String>,
    payload: web::Json<UpdateComment>,
) -> Result<HttpResponse, ApiError> {
    let user = auth.user_id();
    let comment = load_visible(&data, &path.into_inner(), Some(user)).await?;
    let comment = data.comments.apply_update(comment, user, payload.into_inner()).await?;
    Ok(HttpResponse::Ok().json(render(&data, &comment, Some(user)).await?))
}

#[utoipa::path(
    delete,
    path = "/api/v1/comments/{id}",
    tag = "comments",
    params(("id" = String, Path, description = "Comment guid")),
    responses(
        (status = 204, description = "Comment soft-deleted"),
        (status = 403, description = "Not the author"),
        (status = 409, description = "Concurrent modification, retry")
    )
)]
pub async fn delete_comment(auth: Auth, data: web::Data<AppState>, path: web::Path<String>) -> Result<HttpResponse, ApiError> {
    let user = auth.user_id();
    let comment = load_visible(&data, &path.into_inner(), Some(user)).await?;
    data.comments.delete(comment, user).await?;
    Ok(HttpResponse::NoContent().finish())
}

#[utoipa::path(
    post,
    path = "/api/v1/comments/{id}/restore",
    tag = "comments",
    params(("id" = String, Path, description = "Comment guid")),
    responses(
        (status = 200, description = "Comment undeleted", body = CommentOut),
        (status = 403, description = "Not the author")
    )
)]
pub async fn restore_comment(auth: Auth, data: web::Data<AppState>, path: web::Path<String>) -> Result<HttpResponse, ApiError> {
    let user = auth.user_id();
    let comment = load_visible(&data, &path.into_inner(), Some(user)).await?;
    let comment = data.comments.undelete(comment, user).await?;
    Ok(HttpResponse::Ok().json(render(&data, &comment, Some(user)).await?))
}

#[utoipa::path(
    get,
    path = "/api/v1/comments/{id}/replies",
    tag = "comments",
    params(("id" = String, Path, description = "Comment guid")),
    responses(
        (status = 200, description = "Direct replies, oldest first", body = [CommentOut]),
        (status = 404, description = "Comment not found")
    )
)]
pub async fn list_replies(auth: Option<Auth>, data: web::Data<AppState>, path: web::Path<String>) -> Result<HttpResponse, ApiError> {
    let viewer = auth.as_ref().map(|a| a.user_id());
    let parent = load_visible(&data, &path.into_inner(), viewer).await?;
    let replies = data.comments.replies(&parent.id).await?;
    Ok(HttpResponse::Ok().json(render_all(&data, &replies, viewer).await?))
}

// ---------------- Abuse reports -----------------------------------

#[utoipa::path(
    get,
    path = "/api/v1/comments/{id}/reports",
    tag = "reports",
    params(("id" = String, Path, description = "Comment guid")),
    responses(
        (status = 200, description = "The caller's own report, if any", body = [ReportOut]),
        (status = 404, description = "Comment not found")
    )
)]
pub async fn list_reports(auth: Auth, data: web::Data<AppState>, path: web::Path<String>) -> Result<HttpResponse, ApiError> {
    let user = auth.user_id();
    let comment = load_visible(&data, &path.into_inner(), Some(user)).await?;
    let own: Vec<ReportOut> = data.reports.get(&comment.id, user).await?.into_iter().map(ReportOut::from).collect();
    Ok(HttpResponse::Ok().json(own))
}

#[utoipa::path(
    post,
    path = "/api/v1/comments/{id}/reports",
    tag = "reports",
    params(("id" = String, Path, description = "Comment guid")),
    request_body = NewReport,
    responses(
        (status = 201, description = "Report filed", body = ReportOut),
        (status = 404, description = "Comment not found"),
        (status = 422, description = "Already reported, or own comment"),
        (status = 429, description = "Rate limited")
    )
)]
pub async fn create_report(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<String>,
    payload: web::Json<NewReport>,
) -> Result<HttpResponse, ApiError> {
    let user = auth.user_id();
    let comment = load_visible(&data, &path.into_inner(), Some(user)).await?;
    // First contact only; revisions go through the per-reporter resource.
    if data.reports.has_reported(&comment.id, user).await? {
        return Err(CommentError::AlreadyReported.into());
    }
    if !data.limiter.allow_report(user) { return Err(ApiError::TooManyRequests); }
    let report = data.reports.report(&comment.id, user, payload.into_inner()).await?;
    Ok(HttpResponse::Created().json(ReportOut::from(report)))
}

#[utoipa::path(
    get,
    path = "/api/v1/comments/{id}/reports/{user_id}",
    tag = "reports",
    params(
        ("id" = String, Path, description = "Comment guid"),
        ("user_id" = String, Path, description = "Reporter identity")
    ),
    responses(
        (status = 200, description = "Report", body = ReportOut),
        (status = 404, description = "No such report visible to the caller")
    )
)]
pub async fn get_report(auth: Auth, data: web::Data<AppState>, path: web::Path<(String, String)>) -> Result<HttpResponse, ApiError> {
    let (comment_id, owner) = path.into_inner();
    if owner != auth.user_id() {
        return Err(CommentError::NotFound.into());
    }
    let comment = load_visible(&data, &comment_id, Some(&owner)).await?;
    let report = data.reports.get(&comment.id, &owner).await?.ok_or(CommentError::NotFound)?;
    Ok(HttpResponse::Ok().json(ReportOut::from(report)))
}

#[utoipa::path(
    put,
    path = "/api/v1/comments/{id}/reports/{user_id}",
    tag = "reports",
    params(
        ("id" = String, Path, description = "Comment guid"),
        ("user_id" = String, Path, description = "Reporter identity; must be the caller")
    ),
    request_body = NewReport,
    responses(
        (status = 200, description = "Report revised", body = ReportOut),
        (status = 404, description = "Comment not found"),
        (status = 422, description = "Not the reporter, or own comment")
    )
)]
pub async fn update_report(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<(String, String)>,
    payload: web::Json<NewReport>,
) -> Result<HttpResponse, ApiError> {
    let (comment_id, owner) = path.into_inner();
    let user = auth.user_id();
    let comment = load_visible(&data, &comment_id, Some(user)).await?;
    if !data.limiter.allow_report(user) { return Err(ApiError::TooManyRequests); }
    let report = data.reports.update_report(&comment.id, user, &owner, payload.into_inner()).await?;
    Ok(HttpResponse::Ok().json(ReportOut::from(report)))
}

pub async fn render_metrics(data: web::Data<AppState>) -> HttpResponse {
    match &data.metrics {
        Some(handle) => HttpResponse::Ok().content_type("text/plain; version=0.0.4").body(handle.render()),
        None => HttpResponse::NotFound().finish(),
    }
}

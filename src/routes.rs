use std::sync::Arc;

use actix_web::{web, HttpResponse};
use chrono::Utc;
use serde::Deserialize;
use tracing::{debug, info};
use utoipa::ToSchema;

use crate::error::ApiError;
use crate::models::*;
use crate::params::Params;
use crate::password;
use crate::repo::Repo;
use crate::response::{respond, Answer, Sentinel, StatusMode};
use crate::validate::Validator;

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api")
            .service(
                web::resource("/threads/{board}")
                    .route(web::post().to(create_thread))
                    .route(web::get().to(list_threads))
                    .route(web::delete().to(delete_thread))
                    .route(web::put().to(report_thread)),
            )
            .service(
                web::resource("/replies/{board}")
                    .route(web::post().to(create_reply))
                    .route(web::get().to(get_thread_replies))
                    .route(web::delete().to(delete_reply))
                    .route(web::put().to(report_reply)),
            ),
    );
    cfg.route("/healthz", web::get().to(health));
}

#[derive(Clone)]
pub struct AppState { pub repo: Arc<dyn Repo>, pub status_mode: StatusMode }

impl AppState {
    pub fn new(repo: Arc<dyn Repo>, status_mode: StatusMode) -> Self {
        Self { repo, status_mode }
    }
}

// Request body shapes, for the API docs. Fields are read through `Params`
// so JSON, form and query input are all accepted.

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateThreadRequest {
    pub text: String,
    pub delete_password: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct DeleteThreadRequest {
    pub thread_id: i64,
    pub delete_password: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ReportThreadRequest {
    pub thread_id: i64,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateReplyRequest {
    pub thread_id: i64,
    pub text: String,
    pub delete_password: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct DeleteReplyRequest {
    pub thread_id: i64,
    pub reply_id: i64,
    pub delete_password: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ReportReplyRequest {
    pub thread_id: i64,
    pub reply_id: i64,
}

const TEXT_REQUIRED: &str = "Text message is required";
const PASSWORD_REQUIRED: &str = "Delete password is required";
const THREAD_ID_REQUIRED: &str = "Thread id is required";
const REPLY_ID_REQUIRED: &str = "Reply id is required";

// ---------------- Threads -----------------------------------------

#[utoipa::path(
    post,
    path = "/api/threads/{board}",
    params(("board" = String, Path, description = "Board name; created on first post")),
    request_body = CreateThreadRequest,
    responses(
        (status = 200, description = "Thread created (201 in strict mode)", body = ThreadView),
    )
)]
pub async fn create_thread(data: web::Data<AppState>, path: web::Path<String>, params: Params) -> HttpResponse {
    respond(data.status_mode, post_thread(data.repo.as_ref(), &path, &params).await)
}

async fn post_thread(repo: &dyn Repo, board: &str, params: &Params) -> Result<Answer, ApiError> {
    let mut v = Validator::new(params);
    let board = v.board(board);
    let text = v.text("text", TEXT_REQUIRED);
    let secret = v.required("delete_password", PASSWORD_REQUIRED);
    v.finish()?;

    repo.upsert_board(&board).await?;
    let thread = repo
        .create_thread(NewThread { boardname: board, text, delete_password: password::digest(&secret)? })
        .await?;
    info!(board = %thread.boardname, thread_id = thread.id, "thread created");
    Answer::created(&ThreadView::from(&thread))
}

#[utoipa::path(
    get,
    path = "/api/threads/{board}",
    params(("board" = String, Path, description = "Board name")),
    responses(
        (status = 200, description = "Ten most recent threads, three most recent replies each", body = [ThreadWithReplies]),
    )
)]
pub async fn list_threads(data: web::Data<AppState>, path: web::Path<String>, params: Params) -> HttpResponse {
    respond(data.status_mode, board_listing(data.repo.as_ref(), &path, &params).await)
}

async fn board_listing(repo: &dyn Repo, board: &str, params: &Params) -> Result<Answer, ApiError> {
    let mut v = Validator::new(params);
    let board = v.board(board);
    v.finish()?;

    let threads = repo.list_threads(&board, THREAD_LIST_LIMIT).await?;
    let mut listing = Vec::with_capacity(threads.len());
    for thread in &threads {
        let replies = repo.list_replies(thread.id, Some(REPLY_PREVIEW_LIMIT)).await?;
        listing.push(ThreadWithReplies::new(thread, &replies));
    }
    Answer::json(&listing)
}

#[utoipa::path(
    delete,
    path = "/api/threads/{board}",
    params(("board" = String, Path, description = "Board name")),
    request_body = DeleteThreadRequest,
    responses(
        (status = 200, description = "Plain text `success` or `incorrect password`", body = String, content_type = "text/plain"),
    )
)]
pub async fn delete_thread(data: web::Data<AppState>, path: web::Path<String>, params: Params) -> HttpResponse {
    respond(data.status_mode, remove_thread(data.repo.as_ref(), &path, &params).await)
}

async fn remove_thread(repo: &dyn Repo, board: &str, params: &Params) -> Result<Answer, ApiError> {
    let mut v = Validator::new(params);
    let board = v.board(board);
    let thread_id = v.id("thread_id", THREAD_ID_REQUIRED);
    let secret = v.required("delete_password", PASSWORD_REQUIRED);
    v.finish()?;

    let thread = repo.find_thread(&board, thread_id).await?;
    if !password::verify(&thread.delete_password, &secret) {
        debug!(board = %board, thread_id, "thread delete refused: password mismatch");
        return Err(ApiError::Unauthorized);
    }
    repo.delete_thread(&board, thread.id).await?;
    info!(board = %board, thread_id, "thread deleted");
    Ok(Answer::Text(Sentinel::Success))
}

#[utoipa::path(
    put,
    path = "/api/threads/{board}",
    params(("board" = String, Path, description = "Board name")),
    request_body = ReportThreadRequest,
    responses(
        (status = 200, description = "Plain text `reported`", body = String, content_type = "text/plain"),
    )
)]
pub async fn report_thread(data: web::Data<AppState>, path: web::Path<String>, params: Params) -> HttpResponse {
    respond(data.status_mode, flag_thread(data.repo.as_ref(), &path, &params).await)
}

async fn flag_thread(repo: &dyn Repo, board: &str, params: &Params) -> Result<Answer, ApiError> {
    let mut v = Validator::new(params);
    let board = v.board(board);
    let thread_id = v.id("thread_id", THREAD_ID_REQUIRED);
    v.finish()?;

    repo.report_thread(&board, thread_id).await?;
    info!(board = %board, thread_id, "thread reported");
    Ok(Answer::Text(Sentinel::Reported))
}

// ---------------- Replies -----------------------------------------

#[utoipa::path(
    post,
    path = "/api/replies/{board}",
    params(("board" = String, Path, description = "Board name")),
    request_body = CreateReplyRequest,
    responses(
        (status = 200, description = "Reply created (201 in strict mode)", body = ReplyView),
    )
)]
pub async fn create_reply(data: web::Data<AppState>, path: web::Path<String>, params: Params) -> HttpResponse {
    respond(data.status_mode, post_reply(data.repo.as_ref(), &path, &params).await)
}

async fn post_reply(repo: &dyn Repo, board: &str, params: &Params) -> Result<Answer, ApiError> {
    let mut v = Validator::new(params);
    let board = v.board(board);
    let thread_id = v.id("thread_id", THREAD_ID_REQUIRED);
    let text = v.text("text", TEXT_REQUIRED);
    let secret = v.required("delete_password", PASSWORD_REQUIRED);
    v.finish()?;

    let reply = repo
        .create_reply(NewReply {
            boardname: board.clone(),
            thread_id,
            text,
            delete_password: password::digest(&secret)?,
        })
        .await?;
    info!(board = %board, thread_id, reply_id = reply.id, "reply created");
    Answer::created(&ReplyView::from(&reply))
}

#[utoipa::path(
    get,
    path = "/api/replies/{board}",
    params(
        ("board" = String, Path, description = "Board name"),
        ("thread_id" = i64, Query, description = "Thread id"),
    ),
    responses(
        (status = 200, description = "The thread with all of its replies", body = ThreadWithReplies),
    )
)]
pub async fn get_thread_replies(data: web::Data<AppState>, path: web::Path<String>, params: Params) -> HttpResponse {
    respond(data.status_mode, thread_page(data.repo.as_ref(), &path, &params).await)
}

async fn thread_page(repo: &dyn Repo, board: &str, params: &Params) -> Result<Answer, ApiError> {
    let mut v = Validator::new(params);
    let board = v.board(board);
    let thread_id = v.id("thread_id", THREAD_ID_REQUIRED);
    v.finish()?;

    let thread = repo.find_thread(&board, thread_id).await?;
    let replies = repo.list_replies(thread.id, None).await?;
    Answer::json(&ThreadWithReplies::new(&thread, &replies))
}

#[utoipa::path(
    delete,
    path = "/api/replies/{board}",
    params(("board" = String, Path, description = "Board name")),
    request_body = DeleteReplyRequest,
    responses(
        (status = 200, description = "Plain text `success` or `incorrect password`", body = String, content_type = "text/plain"),
    )
)]
pub async fn delete_reply(data: web::Data<AppState>, path: web::Path<String>, params: Params) -> HttpResponse {
    respond(data.status_mode, remove_reply(data.repo.as_ref(), &path, &params).await)
}

async fn remove_reply(repo: &dyn Repo, board: &str, params: &Params) -> Result<Answer, ApiError> {
    let mut v = Validator::new(params);
    let board = v.board(board);
    let thread_id = v.id("thread_id", THREAD_ID_REQUIRED);
    let reply_id = v.id("reply_id", REPLY_ID_REQUIRED);
    let secret = v.required("delete_password", PASSWORD_REQUIRED);
    v.finish()?;

    let thread = repo.find_thread(&board, thread_id).await?;
    let reply = repo.find_reply(thread.id, reply_id).await?;
    if !password::verify(&reply.delete_password, &secret) {
        debug!(board = %board, thread_id, reply_id, "reply delete refused: password mismatch");
        return Err(ApiError::Unauthorized);
    }
    // the owning thread keeps its bump time
    repo.soft_delete_reply(thread.id, reply.id, Utc::now()).await?;
    info!(board = %board, thread_id, reply_id, "reply deleted");
    Ok(Answer::Text(Sentinel::Success))
}

#[utoipa::path(
    put,
    path = "/api/replies/{board}",
    params(("board" = String, Path, description = "Board name")),
    request_body = ReportReplyRequest,
    responses(
        (status = 200, description = "Plain text `reported`", body = String, content_type = "text/plain"),
    )
)]
pub async fn report_reply(data: web::Data<AppState>, path: web::Path<String>, params: Params) -> HttpResponse {
    respond(data.status_mode, flag_reply(data.repo.as_ref(), &path, &params).await)
}

async fn flag_reply(repo: &dyn Repo, board: &str, params: &Params) -> Result<Answer, ApiError> {
    let mut v = Validator::new(params);
    let board = v.board(board);
    let thread_id = v.id("thread_id", THREAD_ID_REQUIRED);
    let reply_id = v.id("reply_id", REPLY_ID_REQUIRED);
    v.finish()?;

    let thread = repo.find_thread(&board, thread_id).await?;
    repo.report_reply(thread.id, reply_id).await?;
    info!(board = %board, thread_id, reply_id, "reply reported");
    Ok(Answer::Text(Sentinel::Reported))
}

// ---------------- Health ------------------------------------------

pub async fn health(data: web::Data<AppState>) -> HttpResponse {
    let result = match data.repo.ping().await {
        Ok(()) => Answer::json(&serde_json::json!({ "status": "ok" })),
        Err(e) => Err(e.into()),
    };
    respond(data.status_mode, result)
}

use crate::error::{ApiErrorBody, ValidationErrorBody};
use crate::models::{ReplyView, ThreadView, ThreadWithReplies};
use crate::routes::{
    CreateReplyRequest, CreateThreadRequest, DeleteReplyRequest, DeleteThreadRequest,
    ReportReplyRequest, ReportThreadRequest,
};
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::routes::create_thread,
        crate::routes::list_threads,
        crate::routes::delete_thread,
        crate::routes::report_thread,
        crate::routes::create_reply,
        crate::routes::get_thread_replies,
        crate::routes::delete_reply,
        crate::routes::report_reply,
    ),
    components(schemas(
        ThreadView, ReplyView, ThreadWithReplies,
        CreateThreadRequest, DeleteThreadRequest, ReportThreadRequest,
        CreateReplyRequest, DeleteReplyRequest, ReportReplyRequest,
        ApiErrorBody, ValidationErrorBody,
    )),
    tags(
        (name = "threads", description = "Thread operations"),
        (name = "replies", description = "Reply operations"),
    )
)]
pub struct ApiDoc;

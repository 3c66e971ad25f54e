#![cfg(feature = "inmem-store")]

use std::sync::Arc;
use std::time::Duration;

use actix_web::{test, web, App};
use board_api::repo::inmem::InMemRepo;
use board_api::{config, AppState, SecurityHeaders, StatusMode};
use serde_json::{json, Value};

macro_rules! app {
    ($mode:expr) => {
        test::init_service(
            App::new()
                .wrap(SecurityHeaders::default())
                .app_data(web::Data::new(AppState::new(Arc::new(InMemRepo::ephemeral()), $mode)))
                .configure(config),
        )
        .await
    };
}

fn text_of(bytes: web::Bytes) -> String {
    String::from_utf8(bytes.to_vec()).unwrap()
}

async fn pause() {
    actix_web::rt::time::sleep(Duration::from_millis(5)).await;
}

// Mirrors the client workflow end to end: post, list, reply, delete, report.
#[actix_web::test]
async fn thread_and_reply_lifecycle() {
    let app = app!(StatusMode::Compat);
    let board = "sample";
    let text = format!("sample_test_{}", uuid::Uuid::new_v4());

    // POST thread
    let req = test::TestRequest::post()
        .uri(&format!("/api/threads/{board}"))
        .set_json(json!({"text": text, "delete_password": "delete_me"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
    let created: Value = test::read_body_json(resp).await;
    assert_eq!(created["text"], text.as_str());
    assert_eq!(created["boardname"], board);
    assert_eq!(created["created_on"], created["bumped_on"]);
    assert!(created.get("delete_password").is_none());
    assert!(created.get("reported").is_none());
    let thread_id = created["id"].as_i64().unwrap();

    // GET threads
    let req = test::TestRequest::get().uri(&format!("/api/threads/{board}")).to_request();
    let threads: Value = test::call_and_read_body_json(&app, req).await;
    let first = &threads[0];
    assert_eq!(first["text"], text.as_str());
    assert_eq!(first["id"], thread_id);
    assert_eq!(first["bumped_on"], first["created_on"]);
    for hidden in ["delete_password", "reported", "boardname"] {
        assert!(first.get(hidden).is_none(), "{hidden} leaked");
    }
    assert_eq!(first["replies"], json!([]));

    // POST reply
    pause().await;
    let req = test::TestRequest::post()
        .uri(&format!("/api/replies/{board}"))
        .set_json(json!({"thread_id": thread_id, "text": "a reply", "delete_password": "delete_me"}))
        .to_request();
    let reply: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(reply["thread_id"], thread_id);
    assert!(reply.get("delete_password").is_none());
    let reply_id = reply["id"].as_i64().unwrap();

    // GET replies: thread bumped, reply listed
    let req = test::TestRequest::get()
        .uri(&format!("/api/replies/{board}?thread_id={thread_id}"))
        .to_request();
    let thread: Value = test::call_and_read_body_json(&app, req).await;
    assert_ne!(thread["bumped_on"], thread["created_on"]);
    assert_eq!(thread["bumped_on"], reply["created_on"]);
    assert!(thread.get("delete_password").is_none());
    assert_eq!(thread["replies"][0]["thread_id"], thread["id"]);
    assert_eq!(thread["replies"][0]["id"], reply_id);
    let bumped_on = thread["bumped_on"].clone();

    // DELETE reply with wrong password
    let req = test::TestRequest::delete()
        .uri(&format!("/api/replies/{board}"))
        .set_json(json!({"thread_id": thread_id, "reply_id": reply_id, "delete_password": "wrong_password"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
    assert_eq!(text_of(test::read_body(resp).await), "incorrect password");

    let req = test::TestRequest::get()
        .uri(&format!("/api/replies/{board}?thread_id={thread_id}"))
        .to_request();
    let thread: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(thread["replies"][0]["text"], "a reply");

    // DELETE reply with the right password
    pause().await;
    let req = test::TestRequest::delete()
        .uri(&format!("/api/replies/{board}"))
        .set_json(json!({"thread_id": thread_id, "reply_id": reply_id, "delete_password": "delete_me"}))
        .to_request();
    assert_eq!(text_of(test::call_and_read_body(&app, req).await), "success");

    // PUT reply
    let req = test::TestRequest::put()
        .uri(&format!("/api/replies/{board}"))
        .set_json(json!({"thread_id": thread_id, "reply_id": reply_id}))
        .to_request();
    assert_eq!(text_of(test::call_and_read_body(&app, req).await), "reported");

    // soft-deleted reply keeps its id; the thread is not re-bumped
    let req = test::TestRequest::get()
        .uri(&format!("/api/replies/{board}?thread_id={thread_id}"))
        .to_request();
    let thread: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(thread["replies"][0]["text"], "[deleted]");
    assert_eq!(thread["replies"][0]["id"], reply_id);
    assert_eq!(thread["bumped_on"], bumped_on);

    // DELETE thread: wrong then right password
    let req = test::TestRequest::delete()
        .uri(&format!("/api/threads/{board}"))
        .set_json(json!({"thread_id": thread_id, "delete_password": "nope"}))
        .to_request();
    assert_eq!(text_of(test::call_and_read_body(&app, req).await), "incorrect password");

    let req = test::TestRequest::delete()
        .uri(&format!("/api/threads/{board}"))
        .set_json(json!({"thread_id": thread_id, "delete_password": "delete_me"}))
        .to_request();
    assert_eq!(text_of(test::call_and_read_body(&app, req).await), "success");

    // PUT on the deleted thread
    let req = test::TestRequest::put()
        .uri(&format!("/api/threads/{board}"))
        .set_json(json!({"thread_id": thread_id}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body, json!({"error": "Thread is not found."}));
}

#[actix_web::test]
async fn form_encoded_bodies_are_accepted() {
    let app = app!(StatusMode::Compat);

    let req = test::TestRequest::post()
        .uri("/api/threads/forms")
        .set_form([("text", "from a form"), ("delete_password", "pw")])
        .to_request();
    let thread: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(thread["text"], "from a form");
    let id = thread["id"].as_i64().unwrap().to_string();

    let req = test::TestRequest::put()
        .uri("/api/threads/forms")
        .set_form([("thread_id", id.as_str())])
        .to_request();
    assert_eq!(text_of(test::call_and_read_body(&app, req).await), "reported");
}

#[actix_web::test]
async fn board_listing_limits_threads_and_replies() {
    let app = app!(StatusMode::Compat);

    let mut ids = Vec::new();
    for i in 0..12 {
        let req = test::TestRequest::post()
            .uri("/api/threads/busy")
            .set_json(json!({"text": format!("thread {i}"), "delete_password": "pw"}))
            .to_request();
        let t: Value = test::call_and_read_body_json(&app, req).await;
        ids.push(t["id"].as_i64().unwrap());
    }
    let req = test::TestRequest::post()
        .uri("/api/threads/other")
        .set_json(json!({"text": "not on busy", "delete_password": "pw"}))
        .to_request();
    test::call_service(&app, req).await;

    let newest = *ids.last().unwrap();
    for i in 0..5 {
        let req = test::TestRequest::post()
            .uri("/api/replies/busy")
            .set_json(json!({"thread_id": newest, "text": format!("reply {i}"), "delete_password": "pw"}))
            .to_request();
        test::call_service(&app, req).await;
    }

    let req = test::TestRequest::get().uri("/api/threads/busy").to_request();
    let threads: Value = test::call_and_read_body_json(&app, req).await;
    let threads = threads.as_array().unwrap();
    assert_eq!(threads.len(), 10);
    assert_eq!(threads[0]["id"], newest);
    assert!(threads.iter().all(|t| t["text"] != "not on busy"));
    assert!(threads.iter().all(|t| t["replies"].as_array().unwrap().len() <= 3));

    let replies: Vec<_> = threads[0]["replies"]
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["text"].as_str().unwrap().to_owned())
        .collect();
    assert_eq!(replies, ["reply 4", "reply 3", "reply 2"]);

    // the single-thread view returns every reply
    let req = test::TestRequest::get()
        .uri(&format!("/api/replies/busy?thread_id={newest}"))
        .to_request();
    let thread: Value = test::call_and_read_body_json(&app, req).await;
    let all: Vec<_> = thread["replies"]
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["text"].as_str().unwrap().to_owned())
        .collect();
    assert_eq!(all, ["reply 4", "reply 3", "reply 2", "reply 1", "reply 0"]);
}

#[actix_web::test]
async fn missing_fields_produce_field_errors() {
    let app = app!(StatusMode::Compat);

    let req = test::TestRequest::post()
        .uri("/api/threads/b")
        .set_json(json!({"text": ""}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["errors"]["text"]["msg"], "Text message is required");
    assert_eq!(body["errors"]["delete_password"]["msg"], "Delete password is required");

    let req = test::TestRequest::delete()
        .uri("/api/replies/b")
        .set_json(json!({"thread_id": "abc", "delete_password": "pw"}))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["errors"]["thread_id"]["msg"], "Thread id must be a positive integer");
    assert_eq!(body["errors"]["reply_id"]["msg"], "Reply id is required");

    // nothing was created by the rejected post
    let req = test::TestRequest::get().uri("/api/threads/b").to_request();
    let threads: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(threads, json!([]));
}

#[actix_web::test]
async fn not_found_cases_create_nothing() {
    let app = app!(StatusMode::Compat);

    let req = test::TestRequest::post()
        .uri("/api/threads/real")
        .set_json(json!({"text": "op", "delete_password": "pw"}))
        .to_request();
    let t: Value = test::call_and_read_body_json(&app, req).await;
    let id = t["id"].as_i64().unwrap();

    // reply on an unknown thread
    let req = test::TestRequest::post()
        .uri("/api/replies/real")
        .set_json(json!({"thread_id": id + 100, "text": "x", "delete_password": "pw"}))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body, json!({"error": "Thread is not found."}));

    // thread exists, but not on this board
    let req = test::TestRequest::get()
        .uri(&format!("/api/replies/elsewhere?thread_id={id}"))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body, json!({"error": "Thread is not found."}));

    // report an unknown reply
    let req = test::TestRequest::put()
        .uri("/api/replies/real")
        .set_json(json!({"thread_id": id, "reply_id": 77}))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body, json!({"error": "Reply is not found."}));

    // delete an unknown thread
    let req = test::TestRequest::delete()
        .uri("/api/threads/real")
        .set_json(json!({"thread_id": id + 100, "delete_password": "pw"}))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body, json!({"error": "Thread is not found."}));

    // delete a real thread through the wrong board
    let req = test::TestRequest::delete()
        .uri("/api/threads/elsewhere")
        .set_json(json!({"thread_id": id, "delete_password": "pw"}))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body, json!({"error": "Thread is not found."}));

    // delete an unknown reply
    let req = test::TestRequest::delete()
        .uri("/api/replies/real")
        .set_json(json!({"thread_id": id, "reply_id": 77, "delete_password": "pw"}))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body, json!({"error": "Reply is not found."}));

    let req = test::TestRequest::get().uri(&format!("/api/replies/real?thread_id={id}")).to_request();
    let thread: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(thread["replies"], json!([]));
    assert_eq!(thread["bumped_on"], thread["created_on"]);
}

#[actix_web::test]
async fn strict_mode_uses_status_codes() {
    let app = app!(StatusMode::Strict);

    let req = test::TestRequest::post()
        .uri("/api/threads/s")
        .set_json(json!({"text": "op", "delete_password": "pw"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 201);
    let t: Value = test::read_body_json(resp).await;
    let id = t["id"].as_i64().unwrap();

    let req = test::TestRequest::post().uri("/api/threads/s").set_json(json!({})).to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 400);

    let req = test::TestRequest::delete()
        .uri("/api/threads/s")
        .set_json(json!({"thread_id": id, "delete_password": "bad"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 403);
    assert_eq!(text_of(test::read_body(resp).await), "incorrect password");

    let req = test::TestRequest::put()
        .uri("/api/threads/s")
        .set_json(json!({"thread_id": id + 1}))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 404);

    let req = test::TestRequest::put()
        .uri("/api/threads/s")
        .set_json(json!({"thread_id": id}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
    assert_eq!(text_of(test::read_body(resp).await), "reported");
}

#[actix_web::test]
async fn health_and_api_cache_headers() {
    let app = app!(StatusMode::Compat);

    let req = test::TestRequest::get().uri("/healthz").to_request();
    let resp = test::call_service(&app, req).await;
    assert!(resp.status().is_success());
    assert!(resp.headers().get("cache-control").is_none());
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body, json!({"status": "ok"}));

    let req = test::TestRequest::get().uri("/api/threads/any").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.headers().get("cache-control").unwrap(), "no-store");
}

//! HTTP surface: submission intake, admin CRUD, chat history, media upload
//! and the Telegram webhook, composed as warp filters.

use std::convert::Infallible;
use std::sync::Arc;

use bytes::BufMut;
use futures_util::TryStreamExt;
use log::error;
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;
use warp::http::StatusCode;
use warp::multipart::FormData;
use warp::{Filter, Rejection, Reply};

use crate::bot::Bot;
use crate::models::{ChatUser, SubmissionDetail, SubmissionStatus};
use crate::notifier::Notifier;
use crate::relay::Relay;
use crate::store::{NewSubmission, Store};
use crate::telegram::Update;
use crate::uploads::MediaStore;

/// JSON bodies carry base64 images, so the cap is generous.
const JSON_BODY_LIMIT: u64 = 20 * 1024 * 1024;

/// Multipart cap: 25MB of file plus form overhead.
const MULTIPART_LIMIT: u64 = 26 * 1024 * 1024;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("Server not configured with TELEGRAM_BOT_TOKEN/TELEGRAM_ADMIN_CHAT_ID")]
    BotUnconfigured,
    #[error("{0}")]
    Transport(&'static str),
}

impl warp::reject::Reject for ApiError {}

fn reject(err: ApiError) -> Rejection {
    warp::reject::custom(err)
}

/// Shared handles every handler can reach.
#[derive(Clone)]
pub struct AppContext {
    pub store: Arc<Store>,
    pub relay: Relay,
    pub notifier: Notifier,
    pub bot: Option<Bot>,
    pub media: Arc<MediaStore>,
}

fn with_ctx(ctx: AppContext) -> impl Filter<Extract = (AppContext,), Error = Infallible> + Clone {
    warp::any().map(move || ctx.clone())
}

fn json_body<T: serde::de::DeserializeOwned + Send>(
) -> impl Filter<Extract = (T,), Error = Rejection> + Clone {
    warp::body::content_length_limit(JSON_BODY_LIMIT).and(warp::body::json())
}

pub fn routes(ctx: AppContext) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    let root = warp::path::end().and(warp::get()).map(|| {
        warp::reply::json(&json!({ "ok": true, "message": "Pennysavia backend running" }))
    });

    let submit_giftcard = warp::path!("api" / "submit-giftcard")
        .and(warp::post())
        .and(json_body())
        .and(with_ctx(ctx.clone()))
        .and_then(submit_giftcard);

    let submit_dwt = warp::path!("api" / "submit-dwt-purchase")
        .and(warp::post())
        .and(json_body())
        .and(with_ctx(ctx.clone()))
        .and_then(submit_dwt_purchase);

    let send_telegram = warp::path!("api" / "send-telegram")
        .and(warp::post())
        .and(json_body())
        .and(with_ctx(ctx.clone()))
        .and_then(send_telegram);

    let submissions_list = warp::path!("api" / "admin" / "submissions")
        .and(warp::get())
        .and(with_ctx(ctx.clone()))
        .and_then(list_submissions);

    let submissions_patch = warp::path!("api" / "admin" / "submissions" / u64)
        .and(warp::patch())
        .and(json_body())
        .and(with_ctx(ctx.clone()))
        .and_then(patch_submission);

    let users_list = warp::path!("api" / "admin" / "users")
        .and(warp::get())
        .and(with_ctx(ctx.clone()))
        .and_then(list_users);

    let users_patch = warp::path!("api" / "admin" / "users" / String)
        .and(warp::patch())
        .and(json_body())
        .and(with_ctx(ctx.clone()))
        .and_then(patch_user);

    let admin_message = warp::path!("api" / "admin" / "message")
        .and(warp::post())
        .and(json_body())
        .and(with_ctx(ctx.clone()))
        .and_then(admin_message);

    let upload = warp::path!("api" / "upload")
        .and(warp::post())
        .and(warp::multipart::form().max_length(MULTIPART_LIMIT))
        .and(with_ctx(ctx.clone()))
        .and_then(upload);

    let messages_list = warp::path!("api" / "messages")
        .and(warp::get())
        .and(with_ctx(ctx.clone()))
        .and_then(list_messages);

    let telegram_webhook = warp::path!("api" / "telegram" / "webhook")
        .and(warp::post())
        .and(json_body())
        .and(with_ctx(ctx))
        .and_then(telegram_webhook);

    root.or(submit_giftcard)
        .or(submit_dwt)
        .or(send_telegram)
        .or(submissions_list)
        .or(submissions_patch)
        .or(users_list)
        .or(users_patch)
        .or(admin_message)
        .or(upload)
        .or(messages_list)
        .or(telegram_webhook)
}

// ---------------------------------------------------------------------------
// Submission intake
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GiftCardRequest {
    full_name: Option<String>,
    email: Option<String>,
    phone: Option<String>,
    amount: Option<f64>,
    #[serde(default)]
    images: Vec<String>,
    user_id: Option<String>,
    user_name: Option<String>,
}

async fn submit_giftcard(req: GiftCardRequest, ctx: AppContext) -> Result<impl Reply, Rejection> {
    let (Some(full_name), Some(email), Some(phone), Some(amount)) =
        (req.full_name, req.email, req.phone, req.amount)
    else {
        return Err(reject(ApiError::Validation(
            "Missing required fields".to_string(),
        )));
    };
    if full_name.trim().is_empty()
        || email.trim().is_empty()
        || phone.trim().is_empty()
        || req.images.len() < 2
    {
        return Err(reject(ApiError::Validation(
            "Missing required fields".to_string(),
        )));
    }

    let submission = ctx
        .store
        .create_submission(NewSubmission {
            name: full_name,
            email,
            phone,
            user_id: req.user_id,
            user_name: req.user_name,
            detail: SubmissionDetail::GiftCard {
                amount,
                images: req.images,
            },
        })
        .await;

    // Best-effort; the intake result does not depend on Telegram.
    ctx.notifier.dispatch(submission.clone());

    Ok(warp::reply::json(&json!({
        "ok": true,
        "message": "Gift card submission received",
        "submissionId": submission.id,
    })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DwtPurchaseRequest {
    name: Option<String>,
    email: Option<String>,
    phone: Option<String>,
    amount: Option<u32>,
    price: Option<f64>,
    image: Option<String>,
    user_id: Option<String>,
}

async fn submit_dwt_purchase(
    req: DwtPurchaseRequest,
    ctx: AppContext,
) -> Result<impl Reply, Rejection> {
    let (Some(name), Some(email), Some(phone), Some(amount), Some(price), Some(image)) = (
        req.name, req.email, req.phone, req.amount, req.price, req.image,
    ) else {
        return Err(reject(ApiError::Validation(
            "Missing required fields".to_string(),
        )));
    };
    if name.trim().is_empty() || email.trim().is_empty() || phone.trim().is_empty() {
        return Err(reject(ApiError::Validation(
            "Missing required fields".to_string(),
        )));
    }

    let submission = ctx
        .store
        .create_submission(NewSubmission {
            name,
            email,
            phone,
            user_id: req.user_id,
            user_name: None,
            detail: SubmissionDetail::TokenPurchase {
                amount,
                price,
                image,
            },
        })
        .await;

    ctx.notifier.dispatch(submission.clone());

    Ok(warp::reply::json(&json!({
        "ok": true,
        "message": "DWT purchase request submitted",
        "submissionId": submission.id,
    })))
}

#[derive(Debug, Deserialize)]
struct SendTelegramRequest {
    #[serde(default)]
    images: Vec<String>,
    code: Option<String>,
}

async fn send_telegram(req: SendTelegramRequest, ctx: AppContext) -> Result<impl Reply, Rejection> {
    if !ctx.notifier.is_configured() {
        return Err(reject(ApiError::BotUnconfigured));
    }
    if req.images.is_empty() {
        return Err(reject(ApiError::Validation("No images provided".to_string())));
    }
    let code = req.code.unwrap_or_default();
    if let Err(e) = ctx.notifier.forward_gift_code(&code, &req.images).await {
        error!("Telegram send error: {e}");
        return Err(reject(ApiError::Transport("Failed to forward to Telegram")));
    }
    Ok(warp::reply::json(&json!({ "ok": true })))
}

// ---------------------------------------------------------------------------
// Admin CRUD
// ---------------------------------------------------------------------------

async fn list_submissions(ctx: AppContext) -> Result<impl Reply, Rejection> {
    let submissions = ctx.store.submissions().await;
    Ok(warp::reply::json(&json!({ "submissions": submissions })))
}

#[derive(Debug, Deserialize)]
struct StatusPatch {
    status: SubmissionStatus,
}

async fn patch_submission(
    id: u64,
    patch: StatusPatch,
    ctx: AppContext,
) -> Result<impl Reply, Rejection> {
    let submission = ctx
        .store
        .set_submission_status(id, patch.status)
        .await
        .map_err(|_| reject(ApiError::NotFound("Submission")))?;
    Ok(warp::reply::json(&json!({ "ok": true, "submission": submission })))
}

async fn list_users(ctx: AppContext) -> Result<impl Reply, Rejection> {
    let users = ctx.store.users().await;
    Ok(warp::reply::json(&json!({ "users": users })))
}

#[derive(Debug, Deserialize)]
struct UserPatch {
    role: Option<String>,
    banned: Option<bool>,
}

async fn patch_user(id: String, patch: UserPatch, ctx: AppContext) -> Result<impl Reply, Rejection> {
    let user = ctx
        .store
        .update_user(&id, patch.role, patch.banned)
        .await
        .map_err(|_| reject(ApiError::NotFound("User")))?;
    Ok(warp::reply::json(&json!({ "ok": true, "user": user })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AdminMessageRequest {
    to_user_id: Option<String>,
    from_user: Option<ChatUser>,
    text: Option<String>,
}

async fn admin_message(req: AdminMessageRequest, ctx: AppContext) -> Result<impl Reply, Rejection> {
    let (Some(to_user_id), Some(text)) = (req.to_user_id, req.text) else {
        return Err(reject(ApiError::Validation(
            "Missing toUserId or text".to_string(),
        )));
    };
    let from_user = req.from_user.or_else(|| {
        Some(ChatUser {
            id: None,
            user_name: Some("Admin".to_string()),
        })
    });
    let msg = ctx.relay.send_private(&to_user_id, from_user, text).await;
    Ok(warp::reply::json(&json!({ "ok": true, "msg": msg })))
}

// ---------------------------------------------------------------------------
// Media + history + webhook
// ---------------------------------------------------------------------------

async fn upload(form: FormData, ctx: AppContext) -> Result<impl Reply, Rejection> {
    let mut parts = form;
    while let Some(part) = parts.try_next().await.map_err(|e| {
        error!("Multipart read error: {e}");
        reject(ApiError::Validation("Invalid multipart body".to_string()))
    })? {
        if part.name() != "file" {
            continue;
        }
        let filename = part.filename().unwrap_or("upload.bin").to_string();
        let content = part
            .stream()
            .try_fold(Vec::new(), |mut acc, data| async move {
                acc.put(data);
                Ok(acc)
            })
            .await
            .map_err(|e| {
                error!("Upload stream error: {e}");
                reject(ApiError::Validation("Failed to read upload".to_string()))
            })?;
        let url = ctx
            .media
            .save(&filename, content)
            .await
            .map_err(|e| reject(ApiError::Validation(e)))?;
        return Ok(warp::reply::json(&json!({ "ok": true, "url": url })));
    }
    Err(reject(ApiError::Validation("No file uploaded".to_string())))
}

async fn list_messages(ctx: AppContext) -> Result<impl Reply, Rejection> {
    let messages = ctx.store.messages().await;
    Ok(warp::reply::json(&json!({ "messages": messages })))
}

async fn telegram_webhook(update: Update, ctx: AppContext) -> Result<impl Reply, Rejection> {
    // Telegram retries non-200 responses, so the webhook acknowledges even
    // when the bot is unconfigured.
    if let Some(bot) = &ctx.bot {
        bot.handle_update(&ctx.store, update).await;
    }
    Ok(warp::reply::json(&json!({ "ok": true })))
}

// ---------------------------------------------------------------------------
// Rejection mapping
// ---------------------------------------------------------------------------

pub async fn handle_rejection(err: Rejection) -> Result<impl Reply, Infallible> {
    let (status, message) = if let Some(api) = err.find::<ApiError>() {
        let status = match api {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BotUnconfigured | ApiError::Transport(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        (status, api.to_string())
    } else if err.is_not_found() {
        (StatusCode::NOT_FOUND, "Not found".to_string())
    } else if err
        .find::<warp::filters::body::BodyDeserializeError>()
        .is_some()
    {
        (StatusCode::BAD_REQUEST, "Invalid request body".to_string())
    } else if err.find::<warp::reject::PayloadTooLarge>().is_some() {
        (StatusCode::PAYLOAD_TOO_LARGE, "Payload too large".to_string())
    } else if err.find::<warp::reject::MethodNotAllowed>().is_some() {
        (StatusCode::METHOD_NOT_ALLOWED, "Method not allowed".to_string())
    } else {
        error!("Unhandled rejection: {err:?}");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Internal server error".to_string(),
        )
    };
    let body = warp::reply::json(&json!({ "error": message }));
    Ok(warp::reply::with_status(body, status))
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use tokio::sync::mpsc;

    use super::*;
    use crate::models::{dwt_tokens, User};

    async fn test_ctx() -> AppContext {
        let store = Arc::new(Store::new());
        let dir = std::env::temp_dir().join("pennysavia-test-api").join(
            Utc::now()
                .timestamp_nanos_opt()
                .unwrap_or_default()
                .to_string(),
        );
        AppContext {
            store: store.clone(),
            relay: Relay::new(store),
            notifier: Notifier::disabled(),
            bot: None,
            media: Arc::new(MediaStore::new(dir).await.unwrap()),
        }
    }

    fn api(ctx: AppContext) -> impl Filter<Extract = impl Reply, Error = Infallible> + Clone {
        routes(ctx).recover(handle_rejection)
    }

    fn giftcard_body() -> serde_json::Value {
        json!({
            "fullName": "Ann",
            "email": "a@x.com",
            "phone": "555",
            "amount": 250,
            "images": ["aGVsbG8=", "d29ybGQ="],
        })
    }

    #[tokio::test]
    async fn giftcard_intake_then_approval_scenario() {
        let ctx = test_ctx().await;
        let routes = api(ctx.clone());

        let res = warp::test::request()
            .method("POST")
            .path("/api/submit-giftcard")
            .json(&giftcard_body())
            .reply(&routes)
            .await;
        assert_eq!(res.status(), 200);
        let body: serde_json::Value = serde_json::from_slice(res.body()).unwrap();
        assert_eq!(body["ok"], true);
        let id = body["submissionId"].as_u64().unwrap();

        let submissions = ctx.store.submissions().await;
        assert_eq!(submissions.len(), 1);
        assert_eq!(submissions[0].status, SubmissionStatus::Pending);
        match &submissions[0].detail {
            SubmissionDetail::GiftCard { amount, images } => {
                assert_eq!(dwt_tokens(*amount), 5);
                assert_eq!(images.len(), 2);
            }
            other => panic!("unexpected detail: {other:?}"),
        }

        let res = warp::test::request()
            .method("PATCH")
            .path(&format!("/api/admin/submissions/{id}"))
            .json(&json!({ "status": "approved" }))
            .reply(&routes)
            .await;
        assert_eq!(res.status(), 200);

        // The decision sticks across reads.
        assert_eq!(
            ctx.store.submission(id).await.unwrap().status,
            SubmissionStatus::Approved
        );
        assert_eq!(
            ctx.store.submission(id).await.unwrap().status,
            SubmissionStatus::Approved
        );
    }

    #[tokio::test]
    async fn giftcard_intake_requires_two_images() {
        let ctx = test_ctx().await;
        let routes = api(ctx.clone());

        let mut body = giftcard_body();
        body["images"] = json!(["only-one"]);
        let res = warp::test::request()
            .method("POST")
            .path("/api/submit-giftcard")
            .json(&body)
            .reply(&routes)
            .await;
        assert_eq!(res.status(), 400);
        assert!(ctx.store.submissions().await.is_empty());
    }

    #[tokio::test]
    async fn giftcard_intake_rejects_missing_fields() {
        let ctx = test_ctx().await;
        let routes = api(ctx.clone());

        let res = warp::test::request()
            .method("POST")
            .path("/api/submit-giftcard")
            .json(&json!({ "fullName": "Ann", "amount": 250 }))
            .reply(&routes)
            .await;
        assert_eq!(res.status(), 400);
        let body: serde_json::Value = serde_json::from_slice(res.body()).unwrap();
        assert_eq!(body["error"], "Missing required fields");
        assert!(ctx.store.submissions().await.is_empty());
    }

    #[tokio::test]
    async fn dwt_purchase_intake_records_token_purchase() {
        let ctx = test_ctx().await;
        let routes = api(ctx.clone());

        let res = warp::test::request()
            .method("POST")
            .path("/api/submit-dwt-purchase")
            .json(&json!({
                "name": "Bob",
                "email": "b@x.com",
                "phone": "556",
                "amount": 3,
                "price": 150.0,
                "image": "/uploads/proof.jpg",
                "userId": "u2",
            }))
            .reply(&routes)
            .await;
        assert_eq!(res.status(), 200);

        let submissions = ctx.store.submissions().await;
        assert_eq!(submissions.len(), 1);
        match &submissions[0].detail {
            SubmissionDetail::TokenPurchase { amount, price, .. } => {
                assert_eq!(*amount, 3);
                assert_eq!(*price, 150.0);
            }
            other => panic!("unexpected detail: {other:?}"),
        }
    }

    #[tokio::test]
    async fn patch_unknown_submission_is_404() {
        let ctx = test_ctx().await;
        let routes = api(ctx.clone());

        let res = warp::test::request()
            .method("PATCH")
            .path("/api/admin/submissions/999")
            .json(&json!({ "status": "approved" }))
            .reply(&routes)
            .await;
        assert_eq!(res.status(), 404);
        let body: serde_json::Value = serde_json::from_slice(res.body()).unwrap();
        assert_eq!(body["error"], "Submission not found");
    }

    #[tokio::test]
    async fn user_patch_toggles_role_and_ban() {
        let ctx = test_ctx().await;
        ctx.store
            .add_user(User {
                id: "u1".to_string(),
                user_name: Some("ann".to_string()),
                full_name: None,
                email: None,
                role: "user".to_string(),
                banned: false,
            })
            .await;
        let routes = api(ctx.clone());

        let res = warp::test::request()
            .method("PATCH")
            .path("/api/admin/users/u1")
            .json(&json!({ "role": "admin", "banned": true }))
            .reply(&routes)
            .await;
        assert_eq!(res.status(), 200);
        let body: serde_json::Value = serde_json::from_slice(res.body()).unwrap();
        assert_eq!(body["user"]["role"], "admin");
        assert_eq!(body["user"]["banned"], true);

        let res = warp::test::request()
            .method("PATCH")
            .path("/api/admin/users/nobody")
            .json(&json!({ "banned": true }))
            .reply(&routes)
            .await;
        assert_eq!(res.status(), 404);
    }

    #[tokio::test]
    async fn admin_message_reaches_private_room_and_log() {
        let ctx = test_ctx().await;
        let (tx, mut rx) = mpsc::unbounded_channel();
        ctx.relay.register("conn".to_string(), tx).await;
        ctx.relay
            .join_room(
                "conn",
                "global",
                Some(&ChatUser {
                    id: Some("u9".to_string()),
                    user_name: Some("Nina".to_string()),
                }),
            )
            .await;
        let routes = api(ctx.clone());

        let res = warp::test::request()
            .method("POST")
            .path("/api/admin/message")
            .json(&json!({ "toUserId": "u9", "text": "hello from admin" }))
            .reply(&routes)
            .await;
        assert_eq!(res.status(), 200);
        let body: serde_json::Value = serde_json::from_slice(res.body()).unwrap();
        assert_eq!(body["msg"]["room"], "user:u9");
        assert_eq!(body["msg"]["user"]["userName"], "Admin");

        let delivered = rx.try_recv().unwrap();
        let event: serde_json::Value =
            serde_json::from_str(delivered.to_str().unwrap()).unwrap();
        assert_eq!(event["event"], "chatMessage");
        assert_eq!(event["text"], "hello from admin");
        assert_eq!(event["private"], true);

        let log = ctx.store.messages().await;
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].room, "user:u9");
    }

    #[tokio::test]
    async fn admin_message_requires_recipient_and_text() {
        let ctx = test_ctx().await;
        let routes = api(ctx);
        let res = warp::test::request()
            .method("POST")
            .path("/api/admin/message")
            .json(&json!({ "text": "no recipient" }))
            .reply(&routes)
            .await;
        assert_eq!(res.status(), 400);
    }

    #[tokio::test]
    async fn messages_endpoint_returns_log() {
        let ctx = test_ctx().await;
        ctx.relay
            .publish_text("global", None, "logged".to_string())
            .await;
        let routes = api(ctx);

        let res = warp::test::request()
            .method("GET")
            .path("/api/messages")
            .reply(&routes)
            .await;
        assert_eq!(res.status(), 200);
        let body: serde_json::Value = serde_json::from_slice(res.body()).unwrap();
        assert_eq!(body["messages"][0]["text"], "logged");
    }

    #[tokio::test]
    async fn send_telegram_without_bot_is_500() {
        let ctx = test_ctx().await;
        let routes = api(ctx);
        let res = warp::test::request()
            .method("POST")
            .path("/api/send-telegram")
            .json(&json!({ "code": "XXXX", "images": ["aGk="] }))
            .reply(&routes)
            .await;
        assert_eq!(res.status(), 500);
    }

    #[tokio::test]
    async fn webhook_acknowledges_without_configured_bot() {
        let ctx = test_ctx().await;
        let routes = api(ctx);
        let res = warp::test::request()
            .method("POST")
            .path("/api/telegram/webhook")
            .json(&json!({ "update_id": 1 }))
            .reply(&routes)
            .await;
        assert_eq!(res.status(), 200);
    }

    #[tokio::test]
    async fn upload_round_trips_through_media_store() {
        let ctx = test_ctx().await;
        let routes = api(ctx.clone());

        let boundary = "----test-boundary";
        let body = format!(
            "--{boundary}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"note.ogg\"\r\nContent-Type: audio/ogg\r\n\r\nvoice-bytes\r\n--{boundary}--\r\n"
        );
        let res = warp::test::request()
            .method("POST")
            .path("/api/upload")
            .header(
                "content-type",
                format!("multipart/form-data; boundary={boundary}"),
            )
            .header("content-length", body.len())
            .body(body)
            .reply(&routes)
            .await;
        assert_eq!(res.status(), 200);
        let reply: serde_json::Value = serde_json::from_slice(res.body()).unwrap();
        assert_eq!(reply["ok"], true);
        let url = reply["url"].as_str().unwrap();
        assert!(url.starts_with("/uploads/"));
        assert!(url.ends_with(".ogg"));
    }

    #[tokio::test]
    async fn root_reports_liveness() {
        let ctx = test_ctx().await;
        let routes = api(ctx);
        let res = warp::test::request().method("GET").path("/").reply(&routes).await;
        assert_eq!(res.status(), 200);
        let body: serde_json::Value = serde_json::from_slice(res.body()).unwrap();
        assert_eq!(body["ok"], true);
    }
}

use crate::application::use_cases::sql_chat::SqlChatPipeline;
use crate::domain::message::OutboundMessage;
use crate::infrastructure::config::ServerConfig;
use crate::infrastructure::logging::LogBuffer;
use crate::interfaces::session::ChatSession;
use actix_cors::Cors;
use actix_web::{dev::Server, get, post, web, App, HttpResponse, HttpServer, Responder};
use serde_json::json;
use std::sync::Arc;
use tokio::sync::mpsc;

pub struct HttpState {
    pub pipeline: Arc<SqlChatPipeline>,
    pub logs: Arc<LogBuffer>,
}

/// Runs one chat request and answers with every message it produced, in
/// order. The last element has `is_last_message` set.
#[post("/chat")]
async fn chat(data: web::Data<HttpState>, body: String) -> impl Responder {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut session = ChatSession::new(data.pipeline.clone(), data.logs.clone(), tx);
    session.handle_message(&body).await;
    drop(session);

    let mut messages: Vec<OutboundMessage> = Vec::new();
    while let Some(message) = rx.recv().await {
        messages.push(message);
    }
    HttpResponse::Ok().json(messages)
}

#[get("/schema")]
async fn schema(data: web::Data<HttpState>) -> impl Responder {
    match data.pipeline.store().introspect().await {
        Ok(snapshot) => HttpResponse::Ok().json(snapshot),
        Err(e) => {
            data.logs
                .push("ERROR", "HttpApi", &format!("Schema introspection failed: {}", e));
            HttpResponse::InternalServerError().body(e.to_string())
        }
    }
}

#[get("/logs")]
async fn get_logs(data: web::Data<HttpState>) -> impl Responder {
    HttpResponse::Ok().json(data.logs.snapshot())
}

#[get("/health")]
async fn health(data: web::Data<HttpState>) -> impl Responder {
    let store = data.pipeline.store();
    HttpResponse::Ok().json(json!({
        "status": "ok",
        "store": store.dialect(),
        "comments": store.supports_comments(),
    }))
}

fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api")
            .service(chat)
            .service(schema)
            .service(get_logs)
            .service(health),
    );
}

pub fn start_server(state: HttpState, config: &ServerConfig) -> std::io::Result<Server> {
    let state = web::Data::new(state);

    let server = HttpServer::new(move || {
        let cors = Cors::permissive();

        App::new()
            .wrap(cors)
            .app_data(state.clone())
            .configure(configure)
    })
    .bind((config.host.as_str(), config.port))?
    .run();

    Ok(server)
}

mod api;
mod bot;
mod config;
mod events;
mod models;
mod notifier;
mod relay;
mod store;
mod telegram;
mod uploads;

use std::sync::Arc;

use log::info;
use warp::Filter;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    env_logger::init();

    let config = config::Config::from_env();

    let store = Arc::new(store::Store::new());
    let media = Arc::new(
        uploads::MediaStore::new(config.upload_dir.clone())
            .await
            .expect("Failed to create upload directory"),
    );
    let relay = relay::Relay::new(store.clone());
    let notifier = notifier::Notifier::new(config.telegram.as_ref());
    let bot = config.telegram.as_ref().map(bot::Bot::new);

    let ctx = api::AppContext {
        store,
        relay: relay.clone(),
        notifier,
        bot,
        media,
    };

    let ws_route = warp::path("ws")
        .and(warp::ws())
        .map(move |ws: warp::ws::Ws| {
            let relay = relay.clone();
            ws.on_upgrade(move |socket| {
                let relay = relay.clone();
                async move {
                    relay.handle_connection(socket).await;
                }
            })
        });

    let uploads_route = warp::path("uploads").and(warp::fs::dir(config.upload_dir.clone()));

    let cors = warp::cors()
        .allow_any_origin()
        .allow_headers(vec!["content-type"])
        .allow_methods(vec!["GET", "POST", "PATCH", "OPTIONS"]);

    let routes = api::routes(ctx)
        .or(ws_route)
        .or(uploads_route)
        .recover(api::handle_rejection)
        .with(cors);

    info!("✅ Pennysavia backend listening on port {}", config.port);
    warp::serve(routes).run(([0, 0, 0, 0], config.port)).await;
}

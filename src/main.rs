use actix_cors::Cors;
use actix_web::{App, HttpServer, web};
use actix_web::middleware::Logger;
use actix_web::web::Data;
use actix::Actor;
use env_logger::Env;

use lanshare::config::Config;
use lanshare::db::Db;
use lanshare::registry::Registry;
use lanshare::routes::{files as files_routes, health as health_routes};
use lanshare::storage::Storage;
use lanshare::ws::server::Broadcaster;
use lanshare::ws::session::ws_route;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Init logger to show info by default, but can be overridden by RUST_LOG
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();
    let cfg = Config::from_env_config();

    let db = Db::connect_and_migrate(&cfg.database_path).await
        .expect("database init failed");
    let storage = Storage::new(&cfg.uploads_dir)
        .expect("create uploads dir");
    let registry = Registry::new(storage, db);

    let broadcaster = Broadcaster::new().start();
    log::info!("Starting server at {}", cfg.listen);

    let listen_addr = cfg.listen.clone();
    HttpServer::new(move || {
        let cors = Cors::permissive()
            .allowed_methods(vec!["GET", "POST", "DELETE"])
            .max_age(3600);

        App::new()
            .wrap(Logger::default())
            .wrap(cors)
            .app_data(Data::new(cfg.clone()))
            .app_data(Data::new(registry.clone()))
            .app_data(Data::new(broadcaster.clone()))
            .route("/upload", web::post().to(files_routes::upload_file))
            .route("/files", web::get().to(files_routes::list_files))
            .route("/file/{storage_key}", web::delete().to(files_routes::delete_file))
            .route("/uploads/{storage_key}", web::get().to(files_routes::get_file))
            .route("/ws", web::get().to(ws_route))
            .route("/health", web::get().to(health_routes::health_check))
            .service(actix_files::Files::new("/", "./static").index_file("index.html"))
    })
    .bind(listen_addr)?
    .run()
    .await
}

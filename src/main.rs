// src/main.rs
use actix_web::{App, HttpServer, middleware::Logger, web};
use materials_entitlements::billing::SubscriptionSync;
use materials_entitlements::config::Config;
use materials_entitlements::db::PgStore;
use materials_entitlements::paywall;
use materials_entitlements::search::SearchService;
use materials_entitlements::store::{EntitlementStore, MemoryStore};
use std::sync::Arc;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::from_default_env())
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("Failed to set tracing subscriber");

    tracing::info!("Starting materials entitlement service");

    dotenv::dotenv().ok();
    let config = Config::from_env().expect("Failed to load config from environment");

    let store: Arc<dyn EntitlementStore> = match &config.database_url {
        Some(url) => Arc::new(
            PgStore::connect(url)
                .await
                .expect("Failed to connect to Postgres"),
        ),
        None => {
            tracing::warn!("DATABASE_URL not set, usage is kept in memory only");
            Arc::new(MemoryStore::new())
        }
    };

    let store = web::Data::from(store);
    let sync = web::Data::new(SubscriptionSync::from_config(&config));
    let search = web::Data::new(SearchService::from_config(&config));
    let bind_address = config.bind_address.clone();
    let config = web::Data::new(config);

    tracing::info!("Listening on {}", bind_address);

    HttpServer::new(move || {
        App::new()
            .app_data(store.clone())
            .app_data(sync.clone())
            .app_data(search.clone())
            .app_data(config.clone())
            .wrap(Logger::default())
            .configure(paywall::init_routes)
    })
    .bind(bind_address)?
    .run()
    .await
}

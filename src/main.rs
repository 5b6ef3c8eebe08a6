use actix_web::{middleware::Logger, App, HttpServer};
use env_logger::{Builder, Env};
use log::{error, info};

use tweet_api::config::Config;
use tweet_api::{seed, AppState};

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv::dotenv().ok();
    Builder::from_env(Env::default().default_filter_or("info"))
        .format_timestamp_secs()
        .init();

    info!("Starting tweet backend...");
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid configuration: {}", e);
            return Err(std::io::Error::new(std::io::ErrorKind::InvalidInput, e));
        }
    };

    let state = AppState::in_memory(&config);

    if config.seed_users > 0 {
        if let Err(e) = seed::seed(
            &state.users,
            &state.tweets,
            config.seed_users,
            config.seed_tweets_per_user,
        )
        .await
        {
            error!("Seeding failed: {}", e);
        }
    }

    info!("Listening on {} with {} workers", config.bind_addr, config.workers);
    HttpServer::new(move || {
        let state = state.clone();
        App::new()
            .wrap(Logger::default())
            .configure(move |cfg| state.configure(cfg))
    })
    .workers(config.workers)
    .bind(&config.bind_addr)?
    .run()
    .await
}

use std::{future::IntoFuture, process, sync::Arc, time::Duration};

use sabor::{
    application::{
        access_tokens::{AccessTokenService, IssueTokenCommand},
        auth::AuthService,
        error::AppError,
        interactions::InteractionService,
        recipes::RecipeService,
        repos::{AccessTokensRepo, InteractionsRepo, RecipesRepo, UsersRepo},
        uploads::{ObjectStore, UploadService},
        users::UserService,
    },
    cache::{CacheTrigger, KvCache, KvStore, MemoryStore, RedisStore},
    config::{self, KvBackend},
    infra::{
        cdn::CdnClient,
        db::PostgresRepositories,
        error::InfraError,
        http::{self, AdminState, ApiRateLimiter, ApiState, HealthState},
        storage::S3ObjectStore,
        telemetry,
    },
};
use tokio::{signal, sync::watch, try_join};
use tracing::{Dispatch, Level, dispatcher, error, info, warn};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()?;

    let command = cli_args
        .command
        .unwrap_or(config::Command::Serve(Box::<config::ServeArgs>::default()));

    telemetry::init(&settings.logging)?;

    match command {
        config::Command::Serve(_) => run_serve(settings).await,
        config::Command::Token(args) => match args.command {
            config::TokenCommand::Issue(args) => run_issue_token(settings, args).await,
        },
        config::Command::Cache(args) => match args.command {
            config::CacheCommand::PurgeAll => run_purge_all(settings).await,
        },
    }
}

/// KV store selected by `kv.backend`, plus the redis handle when one exists
/// so shutdown can close its pool.
fn init_kv(settings: &config::Settings) -> Result<(KvCache, Option<RedisStore>), AppError> {
    match settings.kv.backend {
        KvBackend::Redis => {
            let store = RedisStore::new(&settings.kv.redis).map_err(InfraError::from)?;
            let kv = KvCache::new(Arc::new(store.clone()) as Arc<dyn KvStore>);
            Ok((kv, Some(store)))
        }
        KvBackend::Memory => {
            info!(
                target = "sabor::cache",
                max_entries = settings.cache.memory_max_entries,
                "no redis host configured; using in-process kv store"
            );
            let store = MemoryStore::with_capacity(settings.cache.memory_capacity());
            Ok((KvCache::new(Arc::new(store)), None))
        }
    }
}

fn init_trigger(settings: &config::Settings, kv: KvCache) -> Result<CacheTrigger, AppError> {
    let cdn = CdnClient::new(settings.cdn.clone())?;
    if !cdn.is_configured() {
        info!(target = "sabor::cdn", "cdn purge disabled; zone or token missing");
    }
    Ok(CacheTrigger::new(kv, cdn))
}

async fn init_repositories(settings: &config::Settings) -> Result<PostgresRepositories, AppError> {
    let url = settings.database.url.as_deref().ok_or_else(|| {
        AppError::from(InfraError::configuration(
            "database.url is required (set SABOR__DATABASE__URL or --database-url)",
        ))
    })?;

    let pool = PostgresRepositories::connect(url, settings.database.max_connections.get())
        .await
        .map_err(|err| InfraError::database(format!("failed to connect: {err}")))?;
    PostgresRepositories::run_migrations(&pool)
        .await
        .map_err(|err| InfraError::database(format!("failed to run migrations: {err}")))?;

    Ok(PostgresRepositories::new(pool))
}

async fn init_uploads(settings: &config::Settings) -> UploadService {
    let store = S3ObjectStore::connect(&settings.storage)
        .await
        .map(|store| Arc::new(store) as Arc<dyn ObjectStore>);
    if store.is_none() {
        info!(target = "sabor::uploads", "object storage not configured; uploads disabled");
    }
    UploadService::new(store, settings.storage.origin_base())
        .with_public_base(settings.cdn.public_url.clone())
        .with_max_bytes(settings.storage.max_upload_bytes)
}

fn limiter(limit: &config::RateLimitSettings) -> Arc<ApiRateLimiter> {
    Arc::new(ApiRateLimiter::new(
        Duration::from_secs(u64::from(limit.window_seconds.get())),
        limit.max_requests.get(),
    ))
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let (kv, redis) = init_kv(&settings)?;
    let trigger = init_trigger(&settings, kv.clone())?;
    let repositories = Arc::new(init_repositories(&settings).await?);

    let recipes_repo: Arc<dyn RecipesRepo> = repositories.clone();
    let users_repo: Arc<dyn UsersRepo> = repositories.clone();
    let tokens_repo: Arc<dyn AccessTokensRepo> = repositories.clone();
    let interactions_repo: Arc<dyn InteractionsRepo> = repositories.clone();

    let uploads = init_uploads(&settings).await;
    let tokens = Arc::new(
        AccessTokenService::new(users_repo.clone(), tokens_repo)
            .with_lifetimes(settings.auth.lifetimes),
    );

    let api_state = ApiState {
        recipes: Arc::new(RecipeService::new(recipes_repo.clone(), uploads.clone())),
        interactions: Arc::new(InteractionService::new(recipes_repo, interactions_repo)),
        users: Arc::new(UserService::new(users_repo.clone(), uploads.clone())),
        auth: Arc::new(AuthService::new(users_repo, tokens.clone())),
        tokens,
        uploads: Arc::new(uploads),
        cdn: trigger.cdn().clone(),
        pagination: settings.pagination,
        rate_limiter: limiter(&settings.rate_limit),
        login_limiter: limiter(&settings.auth.login_limit),
        cache: settings.cache.clone(),
        kv,
        trigger: trigger.clone(),
    };
    let health_state = HealthState::new(repositories.clone());
    let admin_state = AdminState {
        trigger,
        storage: settings.storage.clone(),
    };

    let result = serve_http(&settings, api_state, health_state, admin_state).await;

    if let Some(redis) = redis {
        redis.close();
    }
    repositories.close().await;
    info!(target = "sabor::server", "shutdown complete");

    result
}

async fn serve_http(
    settings: &config::Settings,
    api_state: ApiState,
    health_state: HealthState,
    admin_state: AdminState,
) -> Result<(), AppError> {
    let public_router = http::build_public_router(api_state, health_state);
    let admin_router = http::build_admin_router(admin_state);

    let public_listener = tokio::net::TcpListener::bind(settings.server.public_addr)
        .await
        .map_err(InfraError::from)?;
    let admin_listener = tokio::net::TcpListener::bind(settings.server.admin_addr)
        .await
        .map_err(InfraError::from)?;

    info!(
        target = "sabor::server",
        public = %settings.server.public_addr,
        admin = %settings.server.admin_addr,
        "listening"
    );

    let (stop_tx, stop_rx) = watch::channel(false);
    let public_server = axum::serve(public_listener, public_router.into_make_service())
        .with_graceful_shutdown(stopped(stop_rx.clone()));
    let admin_server = axum::serve(admin_listener, admin_router.into_make_service())
        .with_graceful_shutdown(stopped(stop_rx));

    let servers = async { try_join!(public_server.into_future(), admin_server.into_future()) };
    tokio::pin!(servers);

    tokio::select! {
        result = &mut servers => {
            result.map_err(|err| AppError::unexpected(format!("server error: {err}")))?;
            return Ok(());
        }
        () = shutdown_signal() => {
            let _ = stop_tx.send(true);
        }
    }

    match tokio::time::timeout(settings.server.graceful_shutdown, servers).await {
        Ok(result) => {
            result.map_err(|err| AppError::unexpected(format!("server error: {err}")))?;
        }
        Err(_) => warn!(
            target = "sabor::server",
            grace_seconds = settings.server.graceful_shutdown.as_secs(),
            "graceful shutdown deadline elapsed; dropping open connections"
        ),
    }
    Ok(())
}

async fn stopped(mut stop: watch::Receiver<bool>) {
    let _ = stop.wait_for(|stop| *stop).await;
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            warn!(target = "sabor::server", error = %err, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                warn!(target = "sabor::server", error = %err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
    info!(target = "sabor::server", "shutdown signal received");
}

async fn run_issue_token(
    settings: config::Settings,
    args: config::IssueTokenArgs,
) -> Result<(), AppError> {
    let repositories = Arc::new(init_repositories(&settings).await?);
    let service = AccessTokenService::new(repositories.clone(), repositories.clone());

    let issued = service
        .issue(IssueTokenCommand {
            email: args.email,
            name: args.name,
            expires_in_days: args.expires_in_days,
        })
        .await;
    repositories.close().await;
    let issued = issued?;

    info!(
        target = "sabor::token",
        user_id = %issued.user.id,
        expires_at = ?issued.expires_at,
        "access token issued"
    );
    println!("{}", issued.token);
    Ok(())
}

async fn run_purge_all(settings: config::Settings) -> Result<(), AppError> {
    let (kv, redis) = init_kv(&settings)?;
    let mut trigger = init_trigger(&settings, kv)?;
    if settings.kv.backend == KvBackend::Memory {
        warn!(
            target = "sabor::cache",
            "in-process kv store belongs to the server; only the cdn tier is purged"
        );
        trigger = trigger.skipping_kv();
    }

    let report = trigger.purge_everything().await;
    if let Some(redis) = redis {
        redis.close();
    }

    let rendered = serde_json::to_string_pretty(&report)
        .map_err(|err| AppError::unexpected(format!("failed to render purge report: {err}")))?;
    println!("{rendered}");

    if report.any_succeeded() {
        Ok(())
    } else {
        Err(AppError::unexpected("no cache tier was purged"))
    }
}

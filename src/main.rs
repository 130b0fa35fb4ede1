use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use blog_backend::{
    AppState,
    auth::{AuthService, CredentialKeyring, TokenIssuer},
    cache::{MemorySessionStore, RedisSessionStore, SessionStore},
    config::{Config, NotifierKind, SessionStoreKind},
    database::PgAccountStore,
    infrastructure::{HttpQrCodeProvider, LogNotifier, RedisNotifier, SessionNotifier},
    middleware::{RateLimiter, log_errors, rate_limit},
    qr_login::QrLoginService,
    routes,
};
use sqlx::Executor;
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// 内存会话存储的过期清理间隔
const PURGE_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() {
    // 初始化日志
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // 加载配置
    let config = Config::from_env().expect("Failed to load configuration");
    tracing::info!("Loaded configuration: {:?}", config);

    #[cfg(debug_assertions)]
    tracing::info!("Running in debug mode with CORS enabled");

    #[cfg(not(debug_assertions))]
    tracing::info!("Running in production mode with CORS disabled");

    // 设置数据库连接池
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .acquire_timeout(config.request_deadline())
        .after_connect(|conn, _meta| {
            Box::pin(async move {
                conn.execute("SET application_name = 'blog_auth';").await?;
                Ok(())
            })
        })
        .connect(&config.database_url)
        .await
        .expect("Failed to connect to Postgres");

    // 设置 Redis 客户端
    let redis = Arc::new(
        redis::Client::open(config.redis_url.clone()).expect("Failed to create Redis client"),
    );

    // 凭据密钥与令牌签发
    let keyring = Arc::new(
        CredentialKeyring::new(&config.credential_keys, config.credential_key_version)
            .expect("Invalid credential keys"),
    );
    let auth = AuthService::new(
        Arc::new(PgAccountStore::new(pool)),
        keyring,
        TokenIssuer::from_config(&config),
    );

    // 扫码会话存储
    let sessions: Arc<dyn SessionStore> = match config.session_store {
        SessionStoreKind::Redis => Arc::new(RedisSessionStore::new(redis.clone())),
        SessionStoreKind::Memory => {
            let store = Arc::new(MemorySessionStore::new());
            let purged = store.clone();
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(PURGE_INTERVAL);
                loop {
                    ticker.tick().await;
                    let removed = purged.purge_expired();
                    if removed > 0 {
                        tracing::debug!("purged {} expired qr sessions", removed);
                    }
                }
            });
            store
        }
    };
    let notifier: Arc<dyn SessionNotifier> = match config.notifier {
        NotifierKind::Log => Arc::new(LogNotifier),
        NotifierKind::Redis => Arc::new(RedisNotifier::new(redis.clone())),
    };
    let provider = HttpQrCodeProvider::new(
        config.qr_provider_url.clone(),
        config.qr_provider_timeout(),
    )
    .expect("Failed to build qr code provider");

    // 设置应用状态
    let state = AppState {
        qr_login: QrLoginService::new(
            sessions,
            Arc::new(provider),
            notifier,
            auth.clone(),
            config.qr_session_ttl(),
        ),
        auth,
        request_deadline: config.request_deadline(),
    };

    // 设置限流器
    let rate_limiter = Arc::new(RateLimiter::new(redis, &config));

    // 创建基础路由
    let router = Router::new().nest(&config.api_base_uri, routes::router(state));

    // 添加日志中间件和限流中间件
    let router = router.layer(axum::middleware::from_fn(log_errors)).layer(
        axum::middleware::from_fn_with_state(rate_limiter, rate_limit),
    );

    // 根据编译模式决定是否添加CORS
    #[cfg(debug_assertions)]
    let router = {
        tracing::debug!("Adding CORS layer for development mode");
        router.layer(tower_http::cors::CorsLayer::permissive())
    };

    // 启动服务器
    let addr = SocketAddr::new(
        config.server_host.parse().unwrap_or_else(|_| {
            tracing::warn!("Invalid server_host, falling back to dual-stack default");
            IpAddr::V6(std::net::Ipv6Addr::UNSPECIFIED)
        }),
        config.server_port,
    );
    tracing::info!("Server listening on {}", addr);
    axum::serve(
        tokio::net::TcpListener::bind(&addr)
            .await
            .expect("Failed to bind"),
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .expect("Failed to start server");
}

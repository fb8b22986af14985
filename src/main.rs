use bookshelf::auth::{CredentialHasher, RedisRevocationStore, TokenAuthenticator, TokenCodec};
use bookshelf::configuration::get_configuration;
use bookshelf::principals::PgPrincipalStore;
use bookshelf::startup::run;
use bookshelf::telemetry::init_telemetry;
use sqlx::postgres::PgPoolOptions;
use std::net::TcpListener;
use std::sync::Arc;

fn startup_error(kind: std::io::ErrorKind, message: &str) -> std::io::Error {
    std::io::Error::new(kind, message.to_string())
}

#[tokio::main]
async fn main() -> std::io::Result<()> {
    // 구조화된 로깅 초기화
    init_telemetry("info");

    tracing::info!("Starting application");

    // 설정 로드
    let configuration = match get_configuration() {
        Ok(config) => {
            tracing::info!("Configuration loaded successfully");
            config
        }
        Err(e) => {
            tracing::error!("Failed to read configuration: {}", e);
            return Err(startup_error(
                std::io::ErrorKind::InvalidInput,
                "Configuration error",
            ));
        }
    };

    // 토큰 코덱: 비밀키/알고리즘/만료 설정 검증
    let codec = TokenCodec::new(&configuration.jwt).map_err(|e| {
        tracing::error!("Invalid JWT settings: {}", e);
        startup_error(std::io::ErrorKind::InvalidInput, "JWT configuration error")
    })?;

    // 데이터베이스 연결 풀 생성
    let connection_string = configuration.database.connection_string();
    tracing::info!("Attempting to connect to database");

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&connection_string)
        .await
        .map_err(|e| {
            tracing::error!("Failed to create connection pool: {}", e);
            startup_error(
                std::io::ErrorKind::ConnectionRefused,
                "Database connection error",
            )
        })?;

    tracing::info!("Database connection pool created successfully");

    // 토큰 폐기 목록 (Redis)
    let revocations = RedisRevocationStore::connect(
        &configuration.redis.url,
        configuration.jwt.revocation_ttl(),
    )
    .await
    .map_err(|e| {
        tracing::error!("Failed to connect to revocation store: {}", e);
        startup_error(
            std::io::ErrorKind::ConnectionRefused,
            "Revocation store connection error",
        )
    })?;

    tracing::info!("Revocation store connected successfully");

    // 비밀번호 해시 (bcrypt 기본 비용)
    let hasher = CredentialHasher::with_default_cost().map_err(|e| {
        tracing::error!("Invalid bcrypt settings: {}", e);
        startup_error(std::io::ErrorKind::InvalidInput, "Password hasher configuration error")
    })?;

    let authenticator = TokenAuthenticator::new(codec, Arc::new(revocations));
    let principals = Arc::new(PgPrincipalStore::new(pool));

    // 서버 주소 설정
    let address = format!(
        "{}:{}",
        configuration.application.host, configuration.application.port
    );
    tracing::info!("Binding server to address: {}", address);

    let listener = TcpListener::bind(&address)?;
    tracing::info!("Server listening on: {}", address);

    // 서버 실행
    let server = run(listener, principals, authenticator, hasher)?;
    tracing::info!("Server started successfully");

    server.await
}

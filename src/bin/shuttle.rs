use std::sync::Arc;

use cloudassistant_gateway::{
    config::AppConfig,
    handlers::build_router,
    store::{FileKvStore, InMemoryKvStore, KvStore},
    AppState,
};
use shuttle_runtime::SecretStore;

// Platform secret name -> configuration variable.
const SECRET_MAPPING: &[(&str, &str)] = &[
    ("GOOGLE_CLIENT_ID", "APP__OAUTH__CLIENT_ID"),
    ("GOOGLE_CLIENT_SECRET", "APP__OAUTH__CLIENT_SECRET"),
    ("GEMINI_API_URL", "APP__GEMINI__API_URL"),
    ("GEMINI_API_KEY", "APP__GEMINI__API_KEY"),
    ("SERVER__PUBLIC_URL", "APP__SERVER__PUBLIC_URL"),
    ("SECURITY__VALIDATE_STATE", "APP__SECURITY__VALIDATE_STATE"),
    ("SECURITY__ALLOW_EMAIL_FALLBACK", "APP__SECURITY__ALLOW_EMAIL_FALLBACK"),
];

#[shuttle_runtime::main]
async fn shuttle(#[shuttle_runtime::Secrets] secrets: SecretStore) -> shuttle_axum::ShuttleAxum {
    for (secret, variable) in SECRET_MAPPING {
        if let Some(value) = secrets.get(secret) {
            std::env::set_var(variable, value);
        }
    }

    std::env::set_var(
        "APP__SECURITY__USE_IN_MEMORY",
        secrets
            .get("SECURITY__USE_IN_MEMORY")
            .unwrap_or_else(|| "true".to_owned()),
    );

    let config = AppConfig::load()?;
    let kv: Arc<dyn KvStore> = if config.security.use_in_memory {
        Arc::new(InMemoryKvStore::new())
    } else {
        Arc::new(FileKvStore::new(&config.security.token_store_path)?)
    };
    let state = Arc::new(AppState::new(config, kv)?);

    Ok(build_router(state).into())
}

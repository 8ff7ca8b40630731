use serde_json::json;
use sqlx::PgPool;
use url::Url;

pub fn client() -> reqwest::Client {
    reqwest::Client::new()
}

pub fn exit_error(message: &str, docs_hint: Option<&str>) -> ! {
    let mut err = json!({
        "error": "cli_error",
        "message": message
    });
    if let Some(hint) = docs_hint {
        err["docs_hint"] = json!(hint);
    }
    eprintln!("{}", serde_json::to_string_pretty(&err).unwrap_or_default());
    std::process::exit(1);
}

/// Print any serializable value, such as rows read from the database.
pub fn print_serialized<T: serde::Serialize>(value: &T) {
    match serde_json::to_value(value) {
        Ok(json) => print_json(&json),
        Err(e) => exit_error(&format!("Failed to render output: {e}"), None),
    }
}

pub fn print_json(value: &serde_json::Value) {
    match serde_json::to_string_pretty(value) {
        Ok(text) => println!("{text}"),
        Err(e) => exit_error(&format!("Failed to render output: {e}"), None),
    }
}

/// Parse and normalize an API base URL (no trailing slash).
pub fn parse_base_url(raw: &str) -> Url {
    match Url::parse(raw.trim_end_matches('/')) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => url,
        Ok(url) => exit_error(
            &format!("Unsupported URL scheme '{}' in {raw}", url.scheme()),
            Some("Use an http:// or https:// base URL"),
        ),
        Err(e) => exit_error(&format!("Invalid URL {raw}: {e}"), None),
    }
}

/// `base` joined with an absolute API path, without a doubled slash.
pub fn endpoint(base: &Url, path: &str) -> String {
    format!("{}{path}", base.as_str().trim_end_matches('/'))
}

/// Direct database connection for bootstrap commands.
pub async fn connect_db() -> PgPool {
    let database_url = match std::env::var("DATABASE_URL") {
        Ok(url) if !url.trim().is_empty() => url,
        _ => exit_error(
            "DATABASE_URL must be set for org, agent, call, lead and booking commands",
            Some("These commands read and write the database directly"),
        ),
    };

    match sqlx::postgres::PgPoolOptions::new()
        .max_connections(1)
        .connect(&database_url)
        .await
    {
        Ok(pool) => pool,
        Err(e) => exit_error(&format!("Failed to connect to database: {e}"), None),
    }
}

/// Send an unauthenticated GET and print the JSON body. Exit codes: 0 for
/// 2xx, 1 for 4xx, 2 for 5xx, 3 when the server is unreachable.
pub async fn api_get(api_url: &str, path: &str) -> i32 {
    let url = endpoint(&parse_base_url(api_url), path);

    tracing::debug!(%url, "sending request");
    let resp = match client().get(&url).send().await {
        Ok(r) => r,
        Err(e) => {
            let err = json!({
                "error": "connection_error",
                "message": format!("{e}"),
                "docs_hint": "Is the API server running? Check VOXLEAD_API_URL."
            });
            eprintln!("{}", serde_json::to_string_pretty(&err).unwrap_or_default());
            return 3;
        }
    };

    let status = resp.status().as_u16();
    let exit_code = match status {
        200..=299 => 0,
        400..=499 => 1,
        _ => 2,
    };

    let body: serde_json::Value = match resp.json().await {
        Ok(v) => v,
        Err(e) => json!({"raw_error": format!("Failed to parse response as JSON: {e}")}),
    };

    if exit_code == 0 {
        print_json(&body);
    } else {
        eprintln!("{}", serde_json::to_string_pretty(&body).unwrap_or_default());
    }
    exit_code
}

use std::sync::Arc;

use color_eyre::Result;
use tether_core::connection::ConnectionResult;
use tether_verify::ConnectionVerifier;
use tracing::debug;

use crate::{config, storage};

/// Run a connection test and print the outcome as JSON.
pub async fn handle(id: &str, user: &str, config: &config::Config) -> Result<()> {
    let repo = storage::repo_from_config(config)?;
    let middleware = repo.middleware().clone();
    let engine = config.engine.engine();
    debug!(binary = %engine.binary().display(), "using transfer engine");
    let verifier = ConnectionVerifier::new(
        repo,
        middleware,
        Arc::new(engine),
        config.engine.settings(),
    );
    let result = verifier.test_connection_str(id, user).await?;
    println!("{}", render(&result)?);
    Ok(())
}

fn render(result: &ConnectionResult) -> Result<String> {
    Ok(serde_json::to_string_pretty(result)?)
}

#[cfg(test)]
mod tests {
    use tether_core::connection::ErrorCode;

    use super::*;

    #[test]
    fn renders_failure_with_code() {
        let result = ConnectionResult::failed("refused", ErrorCode::Connection, "dial tcp: refused");
        let json: serde_json::Value =
            serde_json::from_str(&render(&result).expect("render")).expect("json");
        assert_eq!(json["success"], false);
        assert_eq!(json["error"]["code"], "CONNECTION");
    }

    #[test]
    fn success_omits_error() {
        let json: serde_json::Value =
            serde_json::from_str(&render(&ConnectionResult::succeeded()).expect("render"))
                .expect("json");
        assert_eq!(json["success"], true);
        assert!(json.get("error").is_none());
    }
}

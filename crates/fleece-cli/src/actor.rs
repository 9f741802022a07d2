//! Actor identity resolution for mutating commands.
//!
//! The resolution chain: `--actor` flag > `FLEECE_ACTOR` env > user config
//! `actor` > `USER` env > `"unknown"`. Every mutation is stamped with the
//! resolved actor, so resolution never fails.

use std::env;

/// Identity used when nothing else is configured.
pub const UNKNOWN_ACTOR: &str = "unknown";

/// Environment reader trait for dependency injection in tests.
trait EnvReader {
    fn get(&self, key: &str) -> Option<String>;
}

/// Real environment reader.
struct RealEnv;

impl EnvReader for RealEnv {
    fn get(&self, key: &str) -> Option<String> {
        env::var(key).ok()
    }
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn resolve_actor_with(
    cli_flag: Option<&str>,
    configured: Option<&str>,
    env: &dyn EnvReader,
) -> String {
    non_empty(cli_flag)
        .or_else(|| non_empty(env.get("FLEECE_ACTOR").as_deref()))
        .or_else(|| non_empty(configured))
        .or_else(|| non_empty(env.get("USER").as_deref()))
        .unwrap_or_else(|| UNKNOWN_ACTOR.to_string())
}

/// Resolve the actor from the flag, environment and user config.
pub fn resolve_actor(cli_flag: Option<&str>, configured: Option<&str>) -> String {
    resolve_actor_with(cli_flag, configured, &RealEnv)
}

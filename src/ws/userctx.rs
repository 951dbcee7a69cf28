use moka::sync::Cache;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tracing::info;

use crate::db::store::{ReportStore, UserRow};
use crate::models::Collaborator;

static USER_CTX_CACHE: OnceLock<Cache<String, Collaborator>> = OnceLock::new();

fn get_user_ctx_cache() -> &'static Cache<String, Collaborator> {
    USER_CTX_CACHE.get_or_init(|| {
        Cache::builder()
            .max_capacity(100_000)
            .time_to_idle(Duration::from_secs(5 * 60))
            .build()
    })
}

/// Warm up the identity cache. Should be called once at startup.
pub fn init_user_ctx_cache() {
    get_user_ctx_cache();
    info!("User identity cache initialized");
}

/// Number of cached identities, for diagnostics.
pub fn entry_count() -> u64 {
    get_user_ctx_cache().entry_count()
}

fn to_collaborator(row: &UserRow) -> Collaborator {
    Collaborator {
        user_id: row.id.clone(),
        display_name: row.display_name.clone(),
        role: row.role.clone(),
    }
}

/// Resolve user ids to display identities, serving from the cache and
/// batch-fetching the misses from the store. Unknown ids are skipped.
pub async fn resolve_collaborators(
    store: &Arc<dyn ReportStore>,
    user_ids: &[String],
) -> Result<Vec<Collaborator>, anyhow::Error> {
    let cache = get_user_ctx_cache();

    let mut resolved: HashMap<String, Collaborator> = HashMap::new();
    let mut missing: Vec<String> = Vec::new();
    for uid in user_ids {
        match cache.get(uid) {
            Some(ctx) => {
                resolved.insert(uid.clone(), ctx);
            }
            None => missing.push(uid.clone()),
        }
    }

    if !missing.is_empty() {
        info!(
            "Identity cache miss for {} collaborator(s). Refreshing from store.",
            missing.len()
        );
        let rows = store.load_users_by_ids(&missing).await?;
        for row in &rows {
            let ctx = to_collaborator(row);
            cache.insert(row.id.clone(), ctx.clone());
            resolved.insert(row.id.clone(), ctx);
        }
    }

    // Preserve the requested ordering.
    Ok(user_ids
        .iter()
        .filter_map(|uid| resolved.get(uid).cloned())
        .collect())
}

use crate::error::{ErrorKind, Result};
use crate::pipeline::open_shards;
use exn::ResultExt;
use std::path::Path;
use tracing::instrument;
use voxport_shard::Value;

const RESOLVE_ACCOUNT: &str = include_str!("../../queries/resolve_account.sql");

/// Map an account name or alias to the account's canonical identifier using
/// the contact shards.
#[instrument(skip(root, extension))]
pub(crate) async fn resolve(root: &Path, prefix: &str, extension: &str, account: &str) -> Result<String> {
    let mut contacts = open_shards(root, prefix, extension).await?;
    let params = [Value::from(account), Value::from(account)];
    let found = contacts.select_one(RESOLVE_ACCOUNT, &params).await;
    contacts.close().await;
    let Some(row) = found.or_raise(|| ErrorKind::Query("resolving the account"))? else {
        exn::bail!(ErrorKind::AccountNotFound(account.to_string()));
    };
    let resolved: String = row.get("UserName").or_raise(|| ErrorKind::AccountNotFound(account.to_string()))?;
    if resolved != account {
        tracing::info!(alias = account, account = %resolved, "Resolved alias to account");
    }
    Ok(resolved)
}

/// The account names the output directory, so it must be a single plain path
/// component.
pub(crate) fn check_directory_name(account: &str) -> Result<()> {
    let invalid = account.is_empty() || account == "." || account == ".." || account.contains(['/', '\\', '\0']);
    if invalid {
        exn::bail!(ErrorKind::InvalidAccount(account.to_string()));
    }
    Ok(())
}

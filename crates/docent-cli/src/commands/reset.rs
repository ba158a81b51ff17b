//! Reset command

use super::open_store;
use crate::app::ResetArgs;
use anyhow::Result;
use docent_core::{Config, DocentError};

pub async fn run(args: ResetArgs, config: &Config) -> Result<()> {
    if !args.yes {
        return Err(DocentError::InvalidInput(
            "reset deletes every indexed chunk; pass --yes to confirm".into(),
        )
        .into());
    }

    let store = open_store(config)?;
    let before = store.count().await?;
    store.delete_collection().await?;
    println!(
        "Reset collection '{}' ({} chunks removed)",
        config.store.collection, before
    );
    Ok(())
}

use anyhow::Result;
use mariadb_monitor::cli::{actions, start};

#[tokio::main]
async fn main() -> Result<()> {
    let action = start()?;

    actions::run::handle(action).await?;

    Ok(())
}

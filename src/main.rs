use chain_notifier::env::{Env, setup_tracing};
use chain_notifier::launch;
use clap::Parser;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv_override().ok();
    let env = Env::try_parse()?;
    setup_tracing(&env);

    launch(env).await
}

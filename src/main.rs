use anyhow::{Context, Result};
use ircbot::{config, Bot, Message, Session};
use std::path::PathBuf;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_target(false)
        .init();

    if let Err(e) = run().await {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }

    Ok(())
}

async fn run() -> Result<()> {
    let path = std::env::args_os().nth(1).map(PathBuf::from);
    let cfg = config::load_config(path.as_deref())?;

    let mut bot = Bot::new(cfg);
    bot.add_action("PRIVMSG", log_privmsg);
    tracing::info!("starting\n{}", bot);

    let session = bot.connect().await.context("Failed to connect")?;
    tracing::info!("session ready\n{}", session.status());

    tokio::select! {
        result = session.closed() => result.context("Session terminated")?,
        signal = tokio::signal::ctrl_c() => {
            signal.context("Failed to listen for ctrl-c")?;
            session.disconnect();
            session.closed().await?;
        }
    }

    Ok(())
}

fn log_privmsg(_session: &Session, message: &Message) -> Result<()> {
    tracing::info!(
        from = %message.nick,
        to = %message.channel,
        "{}",
        message.args.join(" ").trim_start_matches(':')
    );
    Ok(())
}

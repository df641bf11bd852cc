//! wc-bridge: replays a WalletConnect v2 relay script through the session bridge

use std::sync::Arc;

use eyre::{eyre, WrapErr};
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{info, warn};
use wc_bridge_adapters::{
    spawn_provider, BridgeConfig, BridgeHandle, ChainCatalogAdapter, ChannelDecisionAdapter,
    DecisionPrompt, SessionStoreAdapter, WalletConnectAdapter,
};
use wc_bridge_core::{Response, ResponseError, SessionProvider, TransportEvent};

mod script;

use script::ScriptStep;

#[tokio::main]
async fn main() -> eyre::Result<()> {
    // Initialize logging; stdout carries the relay calls
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let path = std::env::args()
        .nth(1)
        .ok_or_else(|| eyre!("usage: wc-bridge <script.jsonl>"))?;
    let config = BridgeConfig::from_env()?;
    let steps = script::parse(
        &std::fs::read_to_string(&path).wrap_err_with(|| format!("reading {path}"))?,
    )?;
    info!(
        script = %path,
        steps = steps.len(),
        accounts = config.accounts.len(),
        auto_approve = config.auto_approve,
        "Starting wc-bridge"
    );

    let transport = WalletConnectAdapter::in_memory();
    let store = match &config.store_path {
        Some(path) => SessionStoreAdapter::open(path)?,
        None => SessionStoreAdapter::in_memory(),
    };
    let (decisions, mut prompts) = ChannelDecisionAdapter::new();
    let provider = Arc::new(SessionProvider::new(
        transport.clone(),
        store,
        decisions,
        ChainCatalogAdapter::from_config(&config),
        config.accounts.clone(),
    ));
    let (handle, task) = spawn_provider(Arc::clone(&provider), config.input_buffer);

    for (line, step) in steps {
        // The in-process relay only knows sessions the script settles.
        if let ScriptStep::Relay(TransportEvent::SessionSettle(session)) = &step {
            transport.insert_session(session.clone())?;
        }
        handle
            .send(step.into_input())
            .await
            .wrap_err_with(|| format!("script line {line}"))?;
        answer_prompts(&handle, &mut prompts, config.auto_approve).await?;
        for call in transport.take_calls()? {
            println!("{}", serde_json::to_string(&call)?);
        }
    }

    drop(handle);
    task.await?;
    info!(sessions = provider.sessions()?.len(), "script finished");
    Ok(())
}

/// Answers prompts until the provider goes quiet. Proposals follow the
/// auto-approve setting; signing is always refused.
async fn answer_prompts(
    handle: &BridgeHandle,
    prompts: &mut UnboundedReceiver<DecisionPrompt>,
    auto_approve: bool,
) -> eyre::Result<()> {
    loop {
        handle.flush().await?;
        let mut answered = false;
        while let Ok(prompt) = prompts.try_recv() {
            match prompt {
                DecisionPrompt::Proposal(prompt) => {
                    info!(
                        proposal_id = %prompt.proposal.id,
                        dapp = %prompt.summary.name,
                        servers = prompt.summary.servers.len(),
                        approve = auto_approve,
                        "proposal decision"
                    );
                    handle.decide(&prompt.proposal.id, auto_approve).await?;
                    answered = true;
                }
                DecisionPrompt::Action(prompt) => {
                    info!(
                        request_id = prompt.request.id,
                        method = %prompt.request.method,
                        chain = %prompt.server.name,
                        "refusing to sign"
                    );
                    handle
                        .respond(prompt.request, Response::from(ResponseError::RequestRejected))
                        .await?;
                    answered = true;
                }
                DecisionPrompt::Failure(reason) => warn!(%reason, "bridge failure"),
            }
        }
        if !answered {
            return Ok(());
        }
    }
}

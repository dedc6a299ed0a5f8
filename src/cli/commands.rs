use crate::{
    cli::args::InvokeArgs,
    core::{config::BridgeConfig, entities::ToolRequest, handler::RequestHandler},
    server, Result,
};
use anyhow::{anyhow, Context};
use std::io::Write;
use std::sync::Arc;
use tracing::info;

pub async fn serve(config: BridgeConfig) -> Result<()> {
    info!(
        name = %config.name,
        command = %config.template,
        timeout = ?config.timeout,
        "starting bridge"
    );
    let handler = RequestHandler::new(Arc::new(config));
    server::serve(handler).await?;
    Ok(())
}

/// Run one request and print the response JSON on stdout.
///
/// Failure responses are printed too; the command then exits non-zero.
pub async fn invoke(config: BridgeConfig, args: InvokeArgs) -> Result<()> {
    let mut request = ToolRequest::new(config.name.clone(), args.prompt);
    if let Some(cwd) = args.cwd {
        request = request.with_cwd(cwd);
    }
    if let Some(risk) = args.risk {
        request = request.with_risk(risk);
    }

    let handler = RequestHandler::new(Arc::new(config));
    let response = handler.handle(request).await;

    let rendered =
        serde_json::to_string_pretty(&response).context("failed to render tool response")?;
    let mut stdout = std::io::stdout().lock();
    writeln!(stdout, "{}", rendered).context("failed to write tool response")?;
    stdout.flush().context("failed to flush stdout")?;

    match response.failure_kind() {
        None => Ok(()),
        Some(kind) => Err(anyhow!("invocation failed: {}", kind)),
    }
}

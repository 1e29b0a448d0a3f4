//! Command implementations.
//!
//! Each subcommand runs against one [`GatewayClient`]. The chat command is a
//! line-oriented loop over stdin that prints answers as they stream in.

use std::collections::BTreeMap;
use std::io::Write;

use anyhow::{bail, Context};
use crossterm::style::Stylize;
use docseek_client::{
    ChatError, ChatSession, ClientConfig, GatewayClient, PageOutcome, ResourceController,
    SearchController, TurnStatus,
};
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::render;

/// REPL commands understood by `chat`.
const CHAT_HELP: &str = "commands: /clear forget the conversation, /history list turns, /quit exit";

/// Parse a `key=value` filter. Values that parse as JSON keep their type.
pub fn parse_filter(raw: &str) -> anyhow::Result<(String, serde_json::Value)> {
    let Some((key, value)) = raw.split_once('=') else {
        bail!("filter must look like key=value, got {raw:?}");
    };
    let key = key.trim();
    if key.is_empty() {
        bail!("filter key is empty in {raw:?}");
    }
    let value = serde_json::from_str(value.trim())
        .unwrap_or_else(|_| serde_json::Value::String(value.trim().to_string()));
    Ok((key.to_string(), value))
}

/// Application state shared by the subcommands.
pub struct App {
    client: GatewayClient,
    config: ClientConfig,
}

impl App {
    /// Create the app, building the HTTP client from `config`.
    pub fn new(config: ClientConfig) -> anyhow::Result<Self> {
        let client = GatewayClient::new(&config).context("invalid client configuration")?;
        Ok(Self { client, config })
    }

    // =========================================================================
    // Search
    // =========================================================================

    /// Search and print up to `pages` pages of results.
    pub async fn search(&self, query: &str, filters: &[String], pages: usize) -> anyhow::Result<()> {
        let filters = if filters.is_empty() {
            None
        } else {
            Some(
                filters
                    .iter()
                    .map(|raw| parse_filter(raw))
                    .collect::<anyhow::Result<BTreeMap<_, _>>>()?,
            )
        };

        let mut controller = SearchController::new(self.client.clone(), &self.config);
        let Some(mut outcome) = controller.search(query, filters, false).await else {
            bail!("query is empty");
        };

        let mut printed = 0;
        for page in 1..=pages.max(1) {
            if outcome == PageOutcome::Failed {
                let message = controller.session().error().unwrap_or("unknown error");
                bail!("search failed: {message}");
            }

            let session = controller.session();
            for (i, result) in session.results().iter().enumerate().skip(printed) {
                println!("{}", render::search_result(i + 1, result));
            }
            printed = session.results().len();

            if page == pages.max(1) {
                break;
            }
            match controller.load_more().await {
                Some(next) => outcome = next,
                None => break,
            }
        }

        let session = controller.session();
        println!(
            "{}",
            render::search_footer(
                session.results().len(),
                session.total(),
                session.has_more(),
                controller.search_time_ms()
            )
        );
        Ok(())
    }

    // =========================================================================
    // Resources
    // =========================================================================

    /// List indexed resources, following pages when `all` is set.
    pub async fn resources(&self, all: bool) -> anyhow::Result<()> {
        let mut controller = ResourceController::new(self.client.clone(), &self.config);

        let mut outcome = controller.refresh().await;
        loop {
            if outcome == PageOutcome::Failed {
                let message = controller.session().error().unwrap_or("unknown error");
                bail!("listing failed: {message}");
            }
            if !all {
                break;
            }
            match controller.load_more().await {
                Some(next) => outcome = next,
                None => break,
            }
        }

        let session = controller.session();
        for resource in session.results() {
            println!("{}", render::resource(resource));
        }
        let more = if session.has_more() { ", use --all for the rest" } else { "" };
        println!(
            "{}",
            format!("{} of {} resources{more}", session.results().len(), session.total()).dark_grey()
        );
        Ok(())
    }

    /// Print every chunk of a resource.
    pub async fn chunks(&self, resource_id: &str) -> anyhow::Result<()> {
        let chunks = self.client.resource_chunks(resource_id).await?;
        for chunk in &chunks {
            println!("{}", render::chunk(chunk));
        }
        println!("{}", format!("{} chunks", chunks.len()).dark_grey());
        Ok(())
    }

    /// Delete a resource.
    pub async fn delete(&self, resource_id: &str) -> anyhow::Result<()> {
        let response = self.client.delete_resource(resource_id).await?;
        println!(
            "{} ({} chunks deleted)",
            response.message, response.chunks_deleted
        );
        Ok(())
    }

    /// Print backend health. Fails if any service is down.
    pub async fn health(&self) -> anyhow::Result<()> {
        let health = self.client.health().await?;
        println!("{}", render::health(&health));
        if !health.all_services_ready() {
            bail!("backend is degraded");
        }
        Ok(())
    }

    // =========================================================================
    // Chat
    // =========================================================================

    /// Interactive chat loop over stdin.
    ///
    /// Ctrl-C stops the answer being streamed and keeps what arrived.
    pub async fn chat(&self) -> anyhow::Result<()> {
        let mut session = ChatSession::new(self.client.clone());
        let mut lines = BufReader::new(tokio::io::stdin()).lines();

        println!("{}", CHAT_HELP.dark_grey());
        loop {
            print!("{} ", ">".bold().green());
            std::io::stdout().flush()?;

            let Some(line) = lines.next_line().await? else {
                break;
            };
            let line = line.trim();
            match line {
                "" => continue,
                "/quit" | "/exit" => break,
                "/clear" => {
                    session.clear();
                    println!("{}", "conversation cleared".dark_grey());
                    continue;
                }
                "/history" => {
                    for turn in session.conversation().turns() {
                        println!("{}: {}", turn.role, render::preview(&turn.content, 80));
                    }
                    continue;
                }
                _ => {}
            }

            let mut printed = 0;
            let result = tokio::select! {
                result = session.send_message_with(line, |turn| {
                    if turn.status == TurnStatus::Errored {
                        return;
                    }
                    print!("{}", render::new_text(turn, printed));
                    printed = turn.content.len();
                    let _ = std::io::stdout().flush();
                }) => Some(result),
                _ = tokio::signal::ctrl_c() => None,
            };
            println!();

            match result {
                Some(Ok(report)) => {
                    if let Some(turn) = session.conversation().turn(report.turn_id) {
                        print!("{}", render::turn_trailer(turn, &report));
                    }
                }
                Some(Err(ChatError::Conversation(e))) => {
                    println!("{}", e.to_string().yellow());
                }
                Some(Err(e)) => {
                    tracing::debug!(error = %e, "Chat turn failed");
                    if let Some(turn) = session.conversation().turns().last() {
                        println!("{}", turn.content.as_str().red());
                    }
                    println!("{}", e.to_string().dark_grey());
                }
                None => {
                    session.cancel();
                    println!("{}", "(stopped)".dark_grey());
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_keeps_json_types() {
        let (key, value) = parse_filter("page_number=3").unwrap();
        assert_eq!(key, "page_number");
        assert_eq!(value, serde_json::json!(3));

        let (_, value) = parse_filter("file_name = tax.pdf").unwrap();
        assert_eq!(value, serde_json::json!("tax.pdf"));
    }

    #[test]
    fn filter_requires_key_and_value() {
        assert!(parse_filter("tax.pdf").is_err());
        assert!(parse_filter("=x").is_err());
    }

    #[test]
    fn app_rejects_bad_url() {
        assert!(App::new(ClientConfig::with_base_url("ftp://docs")).is_err());
    }
}

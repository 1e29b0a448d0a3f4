//! Docseek CLI - chat with and search an indexed document collection.
//!
//! This is the entry point for the `docseek` binary.

mod app;
mod render;

use clap::{Parser, Subcommand};
use docseek_client::ClientConfig;
use tracing_subscriber::EnvFilter;

use app::App;

/// Docseek CLI - chat with and search an indexed document collection.
#[derive(Parser, Debug)]
#[command(name = "docseek")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Backend URL.
    #[arg(long, env = "DOCSEEK_URL", default_value = "http://localhost:8000")]
    url: String,

    /// Timeout in seconds for non-streaming requests.
    #[arg(long, env = "DOCSEEK_TIMEOUT", default_value_t = 30)]
    timeout: u64,

    /// Search results per page.
    #[arg(long, env = "DOCSEEK_PAGE_SIZE", default_value_t = 10)]
    page_size: usize,

    /// Candidates the backend re-ranks per search.
    #[arg(long, env = "DOCSEEK_TOP_K", default_value_t = 10)]
    top_k: u32,

    /// Enable debug logging.
    #[arg(long, default_value = "false")]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Ask questions about the indexed documents.
    Chat,

    /// Semantic search over the indexed documents.
    Search {
        /// Search query.
        query: String,

        /// Metadata filter as key=value. Repeatable.
        #[arg(long = "filter", short = 'f')]
        filters: Vec<String>,

        /// Number of pages to fetch.
        #[arg(long, default_value_t = 1)]
        pages: usize,
    },

    /// List indexed resources.
    Resources {
        /// Follow every page of the listing.
        #[arg(long)]
        all: bool,
    },

    /// Show the chunks of a resource.
    Chunks {
        /// Resource ID.
        resource_id: String,
    },

    /// Delete a resource and its chunks.
    Delete {
        /// Resource ID.
        resource_id: String,
    },

    /// Check backend health.
    Health,
}

impl Args {
    fn client_config(&self) -> ClientConfig {
        ClientConfig {
            request_timeout_seconds: self.timeout,
            search_page_size: self.page_size,
            search_top_k: self.top_k,
            ..ClientConfig::with_base_url(&self.url)
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse arguments
    let args = Args::parse();

    // Initialize logging. Output goes to stderr so answers on stdout stay clean.
    let filter = if args.debug {
        EnvFilter::new("docseek_cli=debug,docseek_client=debug,warn")
    } else {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("docseek_cli=info,docseek_client=info,warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let app = App::new(args.client_config())?;
    tracing::debug!(url = %args.url, "Using backend");

    match &args.command {
        Command::Chat => app.chat().await,
        Command::Search {
            query,
            filters,
            pages,
        } => app.search(query, filters, *pages).await,
        Command::Resources { all } => app.resources(*all).await,
        Command::Chunks { resource_id } => app.chunks(resource_id).await,
        Command::Delete { resource_id } => app.delete(resource_id).await,
        Command::Health => app.health().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn args_map_onto_client_config() {
        let args = Args::parse_from([
            "docseek",
            "--url",
            "https://docs.example.com/",
            "--page-size",
            "25",
            "search",
            "tax",
            "-f",
            "file_name=a.pdf",
        ]);
        let config = args.client_config();

        assert_eq!(config.normalized_base_url(), "https://docs.example.com");
        assert_eq!(config.search_page_size, 25);
        assert_eq!(config.resources_page_size, 20);
        assert!(matches!(
            args.command,
            Command::Search { ref filters, pages: 1, .. } if filters.len() == 1
        ));
    }
}

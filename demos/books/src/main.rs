//! Serves a small books schema over HTTP.

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Context;
use axum::Router;
use clap::Parser;
use graphql_edge::Configuration;
use graphql_edge::GraphQLHandler;
use graphql_edge::Resolvers;
use graphql_edge::configuration::generate_config_schema;
use graphql_edge::logging::TracingLogger;
use serde_json_bytes::json;
use tracing_subscriber::EnvFilter;

const TYPE_DEFS: &str = r#"
type Book {
  id: Int!
  title: String!
}

type Query {
  books: [Book]!
}
"#;

/// Options for the books server
#[derive(Parser, Debug)]
#[command(name = "books", about = "Serves the books GraphQL schema")]
struct Opt {
    /// Log level (off|error|warn|info|debug|trace).
    #[arg(long = "log", default_value = "info", env = "BOOKS_LOG")]
    log_level: String,

    /// Address to listen on.
    #[arg(long, default_value = "127.0.0.1:4000", env = "BOOKS_LISTEN")]
    listen: SocketAddr,

    /// Handler configuration file (YAML).
    #[arg(short, long = "config", env = "BOOKS_CONFIG_PATH")]
    config_path: Option<PathBuf>,

    /// Prints the configuration schema.
    #[arg(long)]
    schema: bool,
}

fn resolvers() -> Resolvers {
    Resolvers::new().sync_field("Query", "books", |_| {
        Ok(json!([
            { "id": 1, "title": "book01" },
            { "id": 2, "title": "book02" },
        ]))
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let opt = Opt::parse();

    if opt.schema {
        let schema = generate_config_schema();
        println!("{}", serde_json::to_string_pretty(&schema)?);
        return Ok(());
    }

    tracing_subscriber::fmt::fmt()
        .with_env_filter(
            EnvFilter::try_new(&opt.log_level).context("could not parse log configuration")?,
        )
        .init();

    let configuration = match &opt.config_path {
        Some(path) => Configuration::from_file(path)
            .with_context(|| format!("could not load {}", path.display()))?,
        None => Configuration::default(),
    };

    let handler = GraphQLHandler::builder()
        .type_defs(TYPE_DEFS)
        .resolvers(resolvers())
        .configuration(configuration)
        .logger(TracingLogger)
        .build()?;

    let app = Router::new()
        .route_service("/graphql", handler)
        .fallback(|| async { "OK" });

    let listener = tokio::net::TcpListener::bind(opt.listen)
        .await
        .with_context(|| format!("could not listen on {}", opt.listen))?;
    tracing::info!("GraphQL endpoint exposed at http://{}/graphql", opt.listen);
    axum::serve(listener, app).await?;
    Ok(())
}
